//! Shared types for the Lume faucet service.

pub mod types;

pub use types::{Address, AddressParseError, ADDRESS_LENGTH};
