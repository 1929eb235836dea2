//! HTTP API for the faucet service

use crate::error::FaucetError;
use crate::metrics;
use crate::service::{DisbursementReceipt, FaucetService};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Claim request body
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub address: String,
}

/// Claim success body
#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub receipt: DisbursementReceipt,
}

/// Build the service router. Every response carries permissive CORS
/// headers, and preflight OPTIONS requests are answered by the layer.
pub fn router(service: Arc<FaucetService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/status", get(status_handler))
        .route("/api/claim", post(claim_handler).fallback(method_not_allowed))
        .layer(cors)
        .with_state(service)
}

/// Claim handler: the single externally-visible engine entry point.
pub async fn claim_handler(
    State(service): State<Arc<FaucetService>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> Response {
    // A missing or malformed body is the same client fault as a bad
    // address string.
    let Ok(Json(request)) = payload else {
        metrics::record_outcome(FaucetError::InvalidAddress.metric_label());
        return FaucetError::InvalidAddress.into_response();
    };

    let origin = origin_key(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    info!("Claim request from {}: address={}", origin, request.address);

    match service.claim(&request.address, &origin).await {
        Ok(receipt) => {
            metrics::record_outcome("granted");
            metrics::record_grant();
            Json(ClaimResponse { ok: true, receipt }).into_response()
        }
        Err(e) => {
            metrics::record_outcome(e.metric_label());
            match &e {
                FaucetError::InvalidAddress
                | FaucetError::AlreadyClaimed
                | FaucetError::RateLimited
                | FaucetError::FaucetEmpty => warn!("Claim denied: {}", e),
                _ => error!("Claim failed: {}", e),
            }
            e.into_response()
        }
    }
}

/// Rate-limit key for a request: the first `X-Forwarded-For` entry when a
/// proxy supplied one, else the peer socket address.
fn origin_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "ok": false, "error": "Method not allowed" })),
    )
        .into_response()
}

/// Status handler
pub async fn status_handler(State(service): State<Arc<FaucetService>>) -> Response {
    match service.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("Status failed: {}", e);
            e.into_response()
        }
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Prometheus metrics handler
pub async fn metrics_handler() -> impl IntoResponse {
    metrics::gather()
}

/// Root handler with service info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Lume Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/claim": "Request the one-time grant",
            "GET /api/status": "Faucet status",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FaucetConfig, Strategy};
    use crate::database::FaucetDatabase;
    use crate::error::FaucetResult;
    use crate::rpc::ChainRpc;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use lume_common::Address;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FakeChain {
        balance: Mutex<u128>,
    }

    #[async_trait]
    impl ChainRpc for FakeChain {
        async fn get_balance(&self, _address: &Address) -> FaucetResult<u128> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn get_transaction_count(&self, _address: &Address) -> FaucetResult<u64> {
            Ok(0)
        }

        async fn get_chain_id(&self) -> FaucetResult<u64> {
            Ok(589)
        }

        async fn send_raw_transaction(&self, _tx_hex: &str) -> FaucetResult<String> {
            Ok("0xfeed".to_string())
        }
    }

    fn test_router() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FaucetConfig {
            private_key: "0x0101010101010101010101010101010101010101010101010101010101010101"
                .to_string(),
            contract_address: Some("0x00000000000000000000000000000000000fa0ce".to_string()),
            strategy: Strategy::Voucher,
            db_path: temp_dir.path().to_str().unwrap().to_string(),
            ..FaucetConfig::default()
        };
        let database = FaucetDatabase::new(&config.db_path).unwrap();
        let rpc = Arc::new(FakeChain {
            balance: Mutex::new(1_000_000_000_000_000_000),
        });
        let service = Arc::new(FaucetService::new(config, database, rpc).unwrap());
        (router(service), temp_dir)
    }

    fn claim_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/claim")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn claim_then_already_claimed() {
        let (app, _dir) = test_router();
        let address = "0xabcdef0123456789abcdef0123456789abcdef01";

        let response = app
            .clone()
            .oneshot(claim_request(&format!("{{\"address\":\"{address}\"}}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert!(body["nonce"].as_str().unwrap().starts_with("0x"));
        assert!(body["sig"].as_str().unwrap().starts_with("0x"));

        let response = app
            .clone()
            .oneshot(claim_request(&format!("{{\"address\":\"{address}\"}}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Already claimed");
    }

    #[tokio::test]
    async fn invalid_and_missing_addresses_are_bad_requests() {
        let (app, _dir) = test_router();

        for body in [
            "{\"address\":\"0xabc\"}",
            "{\"address\":\"\"}",
            "{}",
            "not json",
        ] {
            let response = app.clone().oneshot(claim_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let json = body_json(response).await;
            assert_eq!(json["ok"], false);
            assert_eq!(json["error"], "Invalid address");
        }
    }

    #[tokio::test]
    async fn faucet_empty_maps_to_bad_request() {
        let temp_dir = TempDir::new().unwrap();
        let config = FaucetConfig {
            private_key: "0x0101010101010101010101010101010101010101010101010101010101010101"
                .to_string(),
            contract_address: Some("0x00000000000000000000000000000000000fa0ce".to_string()),
            strategy: Strategy::Voucher,
            db_path: temp_dir.path().to_str().unwrap().to_string(),
            ..FaucetConfig::default()
        };
        let database = FaucetDatabase::new(&config.db_path).unwrap();
        let rpc = Arc::new(FakeChain {
            balance: Mutex::new(0),
        });
        let service = Arc::new(FaucetService::new(config, database, rpc).unwrap());
        let app = router(service);

        let response = app
            .oneshot(claim_request(
                "{\"address\":\"0xabcdef0123456789abcdef0123456789abcdef01\"}",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Faucet empty");
    }

    #[tokio::test]
    async fn non_post_method_is_rejected() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/claim")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn health_and_root_respond() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_balance_and_claims() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_claims"], 0);
        assert_eq!(body["balance"], "1000000000000000000");
    }

    #[test]
    fn origin_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "7.7.7.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(origin_key(&headers, Some(peer)), "7.7.7.7");
        assert_eq!(origin_key(&HeaderMap::new(), Some(peer)), "127.0.0.1");
        assert_eq!(origin_key(&HeaderMap::new(), None), "unknown");
    }
}
