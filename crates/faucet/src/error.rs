//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    /// Client-supplied address is not a well-formed 20-byte hex address.
    #[error("invalid address")]
    InvalidAddress,

    /// The address already holds its one-time grant. Permanent.
    #[error("already claimed")]
    AlreadyClaimed,

    /// The request origin exhausted its window. Retryable after expiry.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Funding balance is below the dispense amount.
    #[error("faucet empty")]
    FaucetEmpty,

    /// Transaction broadcast failed; the claim was not consumed.
    #[error("broadcast failed: {0}")]
    DisbursementFailed(String),

    /// Transport failure, timeout, or JSON-RPC error from the chain
    /// endpoint. Retryable.
    #[error("upstream RPC failure: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    /// Missing or unusable configuration. Fatal.
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Label used for the per-outcome request counter.
    pub fn metric_label(&self) -> &'static str {
        match self {
            FaucetError::InvalidAddress => "invalid_address",
            FaucetError::AlreadyClaimed => "already_claimed",
            FaucetError::RateLimited => "rate_limited",
            FaucetError::FaucetEmpty => "faucet_empty",
            FaucetError::DisbursementFailed(_) => "broadcast_failed",
            FaucetError::Upstream(_) => "upstream",
            FaucetError::Database(_) => "database",
            FaucetError::Misconfigured(_) => "misconfigured",
            FaucetError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        // Bodies are fixed short strings; internal detail stays in the logs.
        let (status, message) = match &self {
            FaucetError::InvalidAddress => {
                (StatusCode::BAD_REQUEST, "Invalid address".to_string())
            }
            FaucetError::AlreadyClaimed => {
                (StatusCode::TOO_MANY_REQUESTS, "Already claimed".to_string())
            }
            FaucetError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests from this IP".to_string(),
            ),
            FaucetError::FaucetEmpty => (StatusCode::BAD_REQUEST, "Faucet empty".to_string()),
            FaucetError::DisbursementFailed(_) | FaucetError::Upstream(_) => {
                (StatusCode::BAD_GATEWAY, "Upstream unavailable".to_string())
            }
            FaucetError::Misconfigured(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Misconfigured: {msg}"),
            ),
            FaucetError::Database(_) | FaucetError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        let body = Json(json!({
            "ok": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
