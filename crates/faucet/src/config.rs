//! Faucet configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Disbursement strategy, fixed at startup for the whole deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Broadcast a custodial transfer from the funding account.
    Transfer,
    /// Sign a voucher the recipient redeems through the claim contract.
    Voucher,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transfer" => Ok(Strategy::Transfer),
            "voucher" => Ok(Strategy::Voucher),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Faucet service configuration.
///
/// Built once at process start (environment plus CLI overrides) and passed
/// by reference into every component; nothing reads the environment after
/// startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
    /// Server listen address
    pub server_addr: String,

    /// RPC endpoint for the chain
    pub rpc_url: String,

    /// Expected chain id of the endpoint
    pub chain_id: u64,

    /// Faucet signing key (hex, with or without 0x prefix)
    pub private_key: String,

    /// Claim contract address (voucher strategy)
    pub contract_address: Option<String>,

    /// Disbursement strategy
    pub strategy: Strategy,

    /// Amount granted per claim (in wei)
    pub dispense_amount: String,

    /// Rate limit: maximum requests per origin per time window
    pub max_requests_per_window: u32,

    /// Rate limit: time window in seconds
    pub rate_limit_window_secs: u64,

    /// Timeout for chain RPC calls (seconds)
    pub rpc_timeout_secs: u64,

    /// Gas price for custodial transfers (in wei)
    pub gas_price: String,

    /// Gas limit for custodial transfers
    pub gas_limit: u64,

    /// Database path
    pub db_path: String,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 589,
            private_key: String::new(),
            contract_address: None,
            strategy: Strategy::Voucher,
            dispense_amount: "100000000000000000".to_string(), // 0.1 LUME
            max_requests_per_window: 5,
            rate_limit_window_secs: 3600, // 1 hour
            rpc_timeout_secs: 10,
            gas_price: "1000000000".to_string(), // 1 Gwei
            gas_limit: 21000,
            db_path: "./faucet_data".to_string(),
        }
    }
}

impl FaucetConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FAUCET_SERVER_ADDR") {
            config.server_addr = addr;
        }

        if let Ok(rpc_url) = std::env::var("FAUCET_RPC_URL") {
            config.rpc_url = rpc_url;
        }

        if let Ok(chain_id) = std::env::var("FAUCET_CHAIN_ID") {
            config.chain_id = chain_id.parse().unwrap_or(config.chain_id);
        }

        if let Ok(key) = std::env::var("FAUCET_PRIVATE_KEY") {
            config.private_key = key;
        }

        if let Ok(contract) = std::env::var("FAUCET_CONTRACT_ADDRESS") {
            config.contract_address = Some(contract);
        }

        if let Ok(strategy) = std::env::var("FAUCET_STRATEGY") {
            config.strategy = strategy.parse().unwrap_or(config.strategy);
        }

        if let Ok(amount) = std::env::var("FAUCET_DISPENSE_AMOUNT") {
            config.dispense_amount = amount;
        }

        if let Ok(max_req) = std::env::var("FAUCET_MAX_REQUESTS") {
            config.max_requests_per_window =
                max_req.parse().unwrap_or(config.max_requests_per_window);
        }

        if let Ok(window) = std::env::var("FAUCET_RATE_LIMIT_WINDOW") {
            config.rate_limit_window_secs = window.parse().unwrap_or(config.rate_limit_window_secs);
        }

        if let Ok(timeout) = std::env::var("FAUCET_RPC_TIMEOUT") {
            config.rpc_timeout_secs = timeout.parse().unwrap_or(config.rpc_timeout_secs);
        }

        if let Ok(gas_price) = std::env::var("FAUCET_GAS_PRICE") {
            config.gas_price = gas_price;
        }

        if let Ok(gas_limit) = std::env::var("FAUCET_GAS_LIMIT") {
            config.gas_limit = gas_limit.parse().unwrap_or(config.gas_limit);
        }

        if let Ok(db_path) = std::env::var("FAUCET_DB_PATH") {
            config.db_path = db_path;
        }

        config
    }

    /// Get rate limit duration
    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Get RPC timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}
