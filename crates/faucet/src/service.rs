//! Faucet service core logic: claim authorization and disbursement.

use crate::config::{FaucetConfig, Strategy};
use crate::database::{ClaimRecord, FaucetDatabase};
use crate::error::{FaucetError, FaucetResult};
use crate::rpc::ChainRpc;
use crate::voucher::VoucherSigner;
use k256::ecdsa::SigningKey;
use lume_common::Address;
use rlp::RlpStream;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a successful claim hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DisbursementReceipt {
    /// Custodial transfer: the broadcast transaction hash.
    Transfer {
        #[serde(rename = "txHash")]
        tx_hash: String,
    },
    /// Voucher: nonce and signature the recipient redeems on-chain.
    Voucher { nonce: String, sig: String },
}

/// Faucet status summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FaucetStatus {
    pub faucet_address: String,
    pub strategy: Strategy,
    pub balance: String,
    pub dispense_amount: String,
    pub total_claims: usize,
}

/// Faucet service
pub struct FaucetService {
    config: FaucetConfig,
    database: Arc<FaucetDatabase>,
    rpc: Arc<dyn ChainRpc>,
    signing_key: SigningKey,
    /// Account derived from the signing key; funds custodial transfers.
    funding_address: Address,
    /// Claim contract (voucher strategy); also the balance source there.
    contract_address: Option<Address>,
    voucher_signer: Option<VoucherSigner>,
    dispense_amount: u128,
    gas_price: u128,
}

impl FaucetService {
    /// Create a new faucet service. Fails fast on unusable key material or
    /// amounts rather than surfacing errors per request.
    pub fn new(
        config: FaucetConfig,
        database: FaucetDatabase,
        rpc: Arc<dyn ChainRpc>,
    ) -> FaucetResult<Self> {
        let key_hex = config
            .private_key
            .strip_prefix("0x")
            .unwrap_or(&config.private_key);
        let key_bytes = hex::decode(key_hex)
            .map_err(|e| FaucetError::Misconfigured(format!("private key: {e}")))?;
        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| FaucetError::Misconfigured(format!("private key: {e}")))?;

        let funding_address = derive_address(&signing_key);
        info!("Faucet funding address: {}", funding_address);

        let contract_address = match &config.contract_address {
            Some(raw) => Some(
                raw.parse::<Address>()
                    .map_err(|e| FaucetError::Misconfigured(format!("contract address: {e}")))?,
            ),
            None => None,
        };

        let voucher_signer = match config.strategy {
            Strategy::Voucher => {
                let contract = contract_address.ok_or_else(|| {
                    FaucetError::Misconfigured(
                        "voucher strategy requires a contract address".to_string(),
                    )
                })?;
                Some(VoucherSigner::new(
                    signing_key.clone(),
                    contract,
                    config.chain_id,
                ))
            }
            Strategy::Transfer => None,
        };

        let dispense_amount = config
            .dispense_amount
            .parse::<u128>()
            .map_err(|_| FaucetError::Misconfigured("dispense amount must be wei".to_string()))?;
        if dispense_amount == 0 {
            return Err(FaucetError::Misconfigured(
                "dispense amount must be non-zero".to_string(),
            ));
        }
        let gas_price = config
            .gas_price
            .parse::<u128>()
            .map_err(|_| FaucetError::Misconfigured("gas price must be wei".to_string()))?;

        Ok(Self {
            config,
            database: Arc::new(database),
            rpc,
            signing_key,
            funding_address,
            contract_address,
            voucher_signer,
            dispense_amount,
            gas_price,
        })
    }

    /// Handle one claim request end to end: authorize, disburse, commit.
    pub async fn claim(&self, raw_address: &str, origin: &str) -> FaucetResult<DisbursementReceipt> {
        let address = self.authorize(raw_address, origin).await?;

        let receipt = match self.config.strategy {
            Strategy::Transfer => {
                let tx_hash = self.send_transfer(&address).await?;
                // Commit strictly after broadcast, before responding. A
                // lost race here means a concurrent request already holds
                // the claim; only one caller may observe success.
                let record =
                    ClaimRecord::new(self.config.dispense_amount.clone(), Some(tx_hash.clone()));
                if let Err(e) = self.database.mark_claimed(&address, &record) {
                    warn!("claim for {} raced after broadcast {}", address, tx_hash);
                    return Err(e);
                }
                DisbursementReceipt::Transfer { tx_hash }
            }
            Strategy::Voucher => {
                let signer = self.voucher_signer.as_ref().ok_or_else(|| {
                    FaucetError::Misconfigured("voucher signer not initialized".to_string())
                })?;
                // Signing is local and unobservable until returned; the
                // claim commits immediately afterwards.
                let voucher = signer.issue(&address)?;
                let record = ClaimRecord::new(self.config.dispense_amount.clone(), None);
                self.database.mark_claimed(&address, &record)?;
                DisbursementReceipt::Voucher {
                    nonce: voucher.nonce_hex(),
                    sig: voucher.signature_hex(),
                }
            }
        };

        info!("Granted claim for {}", address);
        Ok(receipt)
    }

    /// Admit or deny a claim attempt. Short-circuits in a fixed order so a
    /// rejected request does as little external work as possible: syntax,
    /// ledger pre-check, rate limit, solvency.
    ///
    /// The rate-limit slot is charged on every syntactically valid,
    /// not-yet-claimed attempt, whatever happens later. The ledger
    /// pre-check is only a fast rejection; the authoritative guard is the
    /// atomic insert at commit time.
    async fn authorize(&self, raw_address: &str, origin: &str) -> FaucetResult<Address> {
        let address: Address = raw_address
            .trim()
            .parse()
            .map_err(|_| FaucetError::InvalidAddress)?;
        if address.is_zero() || address == self.funding_address {
            return Err(FaucetError::InvalidAddress);
        }

        if self.database.has_claimed(&address)? {
            return Err(FaucetError::AlreadyClaimed);
        }

        let (count, allowed) = self.database.check_and_increment(
            origin,
            self.config.max_requests_per_window,
            self.config.rate_limit_window_secs,
        )?;
        if !allowed {
            warn!("Origin {} over rate limit ({} in window)", origin, count);
            return Err(FaucetError::RateLimited);
        }
        debug!("Origin {} at {} requests in window", origin, count);

        let balance = self.rpc.get_balance(self.funding_source()).await?;
        if balance < self.dispense_amount {
            warn!("Faucet balance low: {} wei", balance);
            return Err(FaucetError::FaucetEmpty);
        }

        Ok(address)
    }

    /// The account whose balance backs disbursements: the claim contract
    /// under the voucher strategy, the funding key's account otherwise.
    fn funding_source(&self) -> &Address {
        match (self.config.strategy, &self.contract_address) {
            (Strategy::Voucher, Some(contract)) => contract,
            _ => &self.funding_address,
        }
    }

    /// Build, sign, and broadcast the custodial transfer. Returns as soon
    /// as the broadcast is accepted; confirmation is not awaited.
    async fn send_transfer(&self, to: &Address) -> FaucetResult<String> {
        let nonce = self
            .rpc
            .get_transaction_count(&self.funding_address)
            .await?;
        let chain_id = self.rpc.get_chain_id().await?;
        if chain_id != self.config.chain_id {
            return Err(FaucetError::Misconfigured(format!(
                "endpoint chain id {} does not match configured {}",
                chain_id, self.config.chain_id
            )));
        }

        let raw_tx = encode_signed_transfer(
            &self.signing_key,
            nonce,
            self.gas_price,
            self.config.gas_limit,
            to,
            self.dispense_amount,
            chain_id,
        )?;

        let tx_hash = self
            .rpc
            .send_raw_transaction(&raw_tx)
            .await
            .map_err(|e| FaucetError::DisbursementFailed(e.to_string()))?;

        info!("Transaction sent: {}", tx_hash);
        Ok(tx_hash)
    }

    /// Get faucet status
    pub async fn status(&self) -> FaucetResult<FaucetStatus> {
        let balance = self.rpc.get_balance(self.funding_source()).await?;

        Ok(FaucetStatus {
            faucet_address: self.funding_address.to_string(),
            strategy: self.config.strategy,
            balance: balance.to_string(),
            dispense_amount: self.config.dispense_amount.clone(),
            total_claims: self.database.claim_count(),
        })
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &FaucetDatabase {
        &self.database
    }
}

/// Address of the account controlled by `key`: last 20 bytes of the
/// Keccak-256 of the uncompressed public key.
fn derive_address(key: &SigningKey) -> Address {
    let public_key = key.verifying_key().to_encoded_point(false);
    let hash = keccak_hash::keccak(&public_key.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.0[12..]);
    Address(bytes)
}

/// RLP-encode and sign an EIP-155 legacy value transfer.
fn encode_signed_transfer(
    key: &SigningKey,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: &Address,
    amount: u128,
    chain_id: u64,
) -> FaucetResult<String> {
    let mut unsigned = RlpStream::new_list(9);
    unsigned.append(&nonce);
    unsigned.append(&quantity_bytes(gas_price));
    unsigned.append(&gas_limit);
    unsigned.append(&to.as_bytes().to_vec());
    unsigned.append(&quantity_bytes(amount));
    unsigned.append(&Vec::<u8>::new()); // no calldata on a plain transfer
    unsigned.append(&chain_id);
    unsigned.append(&Vec::<u8>::new());
    unsigned.append(&Vec::<u8>::new());

    let sighash = keccak_hash::keccak(unsigned.out());
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&sighash.0)
        .map_err(|e| FaucetError::Internal(format!("transaction signing: {e}")))?;

    let sig_bytes = signature.to_bytes();
    let v = chain_id * 2 + 35 + recovery_id.to_byte() as u64;

    let mut signed = RlpStream::new_list(9);
    signed.append(&nonce);
    signed.append(&quantity_bytes(gas_price));
    signed.append(&gas_limit);
    signed.append(&to.as_bytes().to_vec());
    signed.append(&quantity_bytes(amount));
    signed.append(&Vec::<u8>::new());
    signed.append(&v);
    signed.append(&trim_leading_zeros(&sig_bytes[..32]));
    signed.append(&trim_leading_zeros(&sig_bytes[32..64]));

    Ok(format!("0x{}", hex::encode(signed.out())))
}

/// Minimal big-endian byte form of a quantity; RLP encodes zero as the
/// empty byte string.
fn quantity_bytes(value: u128) -> Vec<u8> {
    trim_leading_zeros(&value.to_be_bytes())
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
