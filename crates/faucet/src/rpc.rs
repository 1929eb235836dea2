//! JSON-RPC gateway to the chain endpoint.

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use lume_common::Address;
use std::time::Duration;

/// Chain operations the faucet depends on.
///
/// Implemented over HTTP JSON-RPC in production; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Account balance in wei at the latest block.
    async fn get_balance(&self, address: &Address) -> FaucetResult<u128>;

    /// Next transaction nonce for the account.
    async fn get_transaction_count(&self, address: &Address) -> FaucetResult<u64>;

    async fn get_chain_id(&self) -> FaucetResult<u64>;

    /// Broadcast a signed, RLP-encoded transaction; returns the tx hash.
    async fn send_raw_transaction(&self, tx_hex: &str) -> FaucetResult<String>;
}

/// RPC client for interacting with the chain
pub struct HttpRpcClient {
    rpc_url: String,
    client: reqwest::Client,
}

impl HttpRpcClient {
    /// All calls share one bounded timeout; a timed-out call surfaces as
    /// `Upstream`, never as an implicit admit.
    pub fn new(rpc_url: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self { rpc_url, client })
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> FaucetResult<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FaucetError::Upstream(format!("{method} request failed: {e}")))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FaucetError::Upstream(format!("{method} invalid response: {e}")))?;

        if let Some(error) = json.get("error") {
            return Err(FaucetError::Upstream(format!("{method} error: {error}")));
        }

        Ok(json
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn call_quantity(&self, method: &str, params: serde_json::Value) -> FaucetResult<u128> {
        let result = self.call(method, params).await?;
        let text = result
            .as_str()
            .ok_or_else(|| FaucetError::Upstream(format!("{method} returned non-string")))?;
        parse_quantity(text)
            .ok_or_else(|| FaucetError::Upstream(format!("{method} malformed quantity: {text}")))
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(text: &str) -> Option<u128> {
    let digits = text.strip_prefix("0x")?;
    u128::from_str_radix(digits, 16).ok()
}

#[async_trait]
impl ChainRpc for HttpRpcClient {
    async fn get_balance(&self, address: &Address) -> FaucetResult<u128> {
        self.call_quantity(
            "eth_getBalance",
            serde_json::json!([address.to_string(), "latest"]),
        )
        .await
    }

    async fn get_transaction_count(&self, address: &Address) -> FaucetResult<u64> {
        let count = self
            .call_quantity(
                "eth_getTransactionCount",
                serde_json::json!([address.to_string(), "latest"]),
            )
            .await?;
        Ok(count as u64)
    }

    async fn get_chain_id(&self) -> FaucetResult<u64> {
        let id = self.call_quantity("eth_chainId", serde_json::json!([])).await?;
        Ok(id as u64)
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> FaucetResult<String> {
        let result = self
            .call("eth_sendRawTransaction", serde_json::json!([tx_hex]))
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| FaucetError::Upstream("eth_sendRawTransaction returned non-string".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("0xde0b6b3a7640000"), Some(1_000_000_000_000_000_000));
        assert_eq!(parse_quantity("de0b6b3a7640000"), None);
        assert_eq!(parse_quantity("0xzz"), None);
    }
}
