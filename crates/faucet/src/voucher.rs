//! Voucher issuance: signed, on-chain-redeemable claim authorizations.
//!
//! A voucher never touches the network. The recipient submits
//! `claim(nonce, signature)` to the claim contract, which recomputes the
//! packed message below, verifies the signature against the faucet's
//! public key, and enforces single use of the nonce.

use crate::error::{FaucetError, FaucetResult};
use k256::ecdsa::SigningKey;
use lume_common::Address;
use rand::RngCore;

/// A freshly issued voucher. Only the nonce and signature leave the
/// process; nothing is persisted.
#[derive(Debug, Clone)]
pub struct Voucher {
    pub nonce: [u8; 32],
    pub signature: [u8; 65],
}

impl Voucher {
    pub fn nonce_hex(&self) -> String {
        format!("0x{}", hex::encode(self.nonce))
    }

    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signature))
    }
}

/// Holds the faucet signing key and the claim-message parameters.
pub struct VoucherSigner {
    signing_key: SigningKey,
    contract: Address,
    chain_id: u64,
}

impl VoucherSigner {
    pub fn new(signing_key: SigningKey, contract: Address, chain_id: u64) -> Self {
        Self {
            signing_key,
            contract,
            chain_id,
        }
    }

    /// Issue a voucher for `recipient` with a fresh random nonce.
    pub fn issue(&self, recipient: &Address) -> FaucetResult<Voucher> {
        let mut nonce = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        self.issue_with_nonce(recipient, nonce)
    }

    fn issue_with_nonce(&self, recipient: &Address, nonce: [u8; 32]) -> FaucetResult<Voucher> {
        let digest = claim_digest(recipient, &nonce, &self.contract, self.chain_id);
        let prehash = signed_message_hash(&digest);

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| FaucetError::Internal(format!("voucher signing: {e}")))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();

        Ok(Voucher {
            nonce,
            signature: out,
        })
    }
}

/// Keccak-256 of the solidity-packed claim tuple:
/// `recipient (20) ‖ nonce (32) ‖ contract (20) ‖ chain id (uint256 BE)`.
/// The contract recomputes exactly this layout, so field order and widths
/// are fixed.
fn claim_digest(
    recipient: &Address,
    nonce: &[u8; 32],
    contract: &Address,
    chain_id: u64,
) -> [u8; 32] {
    let mut packed = Vec::with_capacity(20 + 32 + 20 + 32);
    packed.extend_from_slice(recipient.as_bytes());
    packed.extend_from_slice(nonce);
    packed.extend_from_slice(contract.as_bytes());
    let mut chain = [0u8; 32];
    chain[24..].copy_from_slice(&chain_id.to_be_bytes());
    packed.extend_from_slice(&chain);
    keccak_hash::keccak(&packed).0
}

/// `personal_sign` envelope over a 32-byte digest.
fn signed_message_hash(digest: &[u8; 32]) -> [u8; 32] {
    let mut enveloped = Vec::with_capacity(28 + 32);
    enveloped.extend_from_slice(b"\x19Ethereum Signed Message:\n32");
    enveloped.extend_from_slice(digest);
    keccak_hash::keccak(&enveloped).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn test_signer() -> VoucherSigner {
        let signing_key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let contract: Address = "0x00000000000000000000000000000000000fa0ce".parse().unwrap();
        VoucherSigner::new(signing_key, contract, 589)
    }

    fn recipient() -> Address {
        "0xabcdef0123456789abcdef0123456789abcdef01".parse().unwrap()
    }

    #[test]
    fn signature_verifies_for_issued_tuple() {
        let signer = test_signer();
        let voucher = signer.issue(&recipient()).unwrap();

        let digest = claim_digest(&recipient(), &voucher.nonce, &signer.contract, 589);
        let prehash = signed_message_hash(&digest);
        let signature = Signature::from_slice(&voucher.signature[..64]).unwrap();

        let verifying_key = signer.signing_key.verifying_key();
        assert!(verifying_key.verify_prehash(&prehash, &signature).is_ok());
    }

    #[test]
    fn signer_is_recoverable_from_signature() {
        let signer = test_signer();
        let voucher = signer.issue(&recipient()).unwrap();

        let digest = claim_digest(&recipient(), &voucher.nonce, &signer.contract, 589);
        let prehash = signed_message_hash(&digest);
        let signature = Signature::from_slice(&voucher.signature[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(voucher.signature[64] - 27).unwrap();

        let recovered = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id).unwrap();
        assert_eq!(&recovered, signer.signing_key.verifying_key());
    }

    #[test]
    fn altered_fields_fail_verification() {
        let signer = test_signer();
        let voucher = signer.issue(&recipient()).unwrap();
        let signature = Signature::from_slice(&voucher.signature[..64]).unwrap();
        let verifying_key = signer.signing_key.verifying_key();

        // Different recipient
        let other: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let digest = claim_digest(&other, &voucher.nonce, &signer.contract, 589);
        assert!(verifying_key
            .verify_prehash(&signed_message_hash(&digest), &signature)
            .is_err());

        // Different nonce
        let mut nonce = voucher.nonce;
        nonce[0] ^= 1;
        let digest = claim_digest(&recipient(), &nonce, &signer.contract, 589);
        assert!(verifying_key
            .verify_prehash(&signed_message_hash(&digest), &signature)
            .is_err());

        // Different chain id
        let digest = claim_digest(&recipient(), &voucher.nonce, &signer.contract, 590);
        assert!(verifying_key
            .verify_prehash(&signed_message_hash(&digest), &signature)
            .is_err());
    }

    #[test]
    fn nonces_are_fresh_per_issue() {
        let signer = test_signer();
        let a = signer.issue(&recipient()).unwrap();
        let b = signer.issue(&recipient()).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn packed_layout_is_order_sensitive() {
        let nonce = [9u8; 32];
        let contract: Address = "0x00000000000000000000000000000000000fa0ce".parse().unwrap();
        let a = claim_digest(&recipient(), &nonce, &contract, 589);
        let b = claim_digest(&contract, &nonce, &recipient(), 589);
        assert_ne!(a, b);
    }
}
