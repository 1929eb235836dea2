//! Single-use token faucet for the Lume chain.
//!
//! Given an end-user-supplied address, the service decides whether it is
//! entitled to a one-time grant of a fixed amount and disburses it one of
//! two ways, chosen by configuration:
//! - a custodial transfer broadcast from the funding account, or
//! - a signed voucher the recipient redeems through the on-chain claim
//!   contract.
//!
//! Correctness rests on three pieces of coordinated state: an append-only
//! claim ledger (one grant per address, ever), durable per-origin rate
//! counters, and the funding account balance read fresh per decision.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod rpc;
pub mod service;
pub mod voucher;

pub use config::{FaucetConfig, Strategy};
pub use database::{ClaimRecord, FaucetDatabase};
pub use error::{FaucetError, FaucetResult};
pub use rpc::{ChainRpc, HttpRpcClient};
pub use service::{DisbursementReceipt, FaucetService, FaucetStatus};
pub use voucher::{Voucher, VoucherSigner};
