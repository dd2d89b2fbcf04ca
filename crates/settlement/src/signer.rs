//! Judge key and signature recovery.
//!
//! The judge signs the prefixed payload digest with a deterministic
//! (RFC 6979) recoverable secp256k1 signature. The signer address is the last
//! 20 bytes of the keccak hash of the uncompressed public key, so a ledger
//! contract can check the signature with plain `ecrecover`.

use std::fmt;

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use chess_core::settlement::{keccak256, signing_digest};
use chess_core::{Address, PayloadHash, RecoverableSignature, SettlementPayload};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid judge key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Something that can sign settlement digests on behalf of the judge.
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    /// Ledger address the signatures recover to.
    fn address(&self) -> Address;

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<RecoverableSignature, SignerError>;
}

/// In-process judge key.
pub struct JudgeSigner {
    key: SigningKey,
    address: Address,
}

impl JudgeSigner {
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, SignerError> {
        let key =
            SigningKey::from_slice(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a 32-byte hex secret, with or without `0x`.
    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        Self::from_bytes(&parse_secret(secret)?)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(RecoverableSignature {
            v: 27 + recovery_id.to_byte(),
            r,
            s,
        })
    }

    pub fn sign_payload(
        &self,
        payload: &SettlementPayload,
    ) -> Result<RecoverableSignature, SignerError> {
        self.sign(&payload.signing_digest())
    }
}

impl fmt::Debug for JudgeSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JudgeSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PayloadSigner for JudgeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<RecoverableSignature, SignerError> {
        self.sign(&digest)
    }
}

pub(crate) fn parse_secret(secret: &str) -> Result<[u8; 32], SignerError> {
    let trimmed = secret.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignerError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))
}

/// Ledger address of a public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Drop the 0x04 tag of the uncompressed encoding.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// Address that signed `payload_hash`, as `ecrecover` would report it.
pub fn recover(
    payload_hash: &PayloadHash,
    signature: &RecoverableSignature,
) -> Result<Address, SignerError> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r);
    bytes[32..].copy_from_slice(&signature.s);
    let parsed =
        Signature::from_slice(&bytes).map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id()).ok_or_else(|| {
        SignerError::InvalidSignature(format!("bad recovery byte v = {}", signature.v))
    })?;
    let key =
        VerifyingKey::recover_from_prehash(&signing_digest(payload_hash), &parsed, recovery_id)
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Whether `signature` over `payload_hash` recovers to `expected`.
pub fn verify(
    payload_hash: &PayloadHash,
    signature: &RecoverableSignature,
    expected: Address,
) -> bool {
    recover(payload_hash, signature).is_ok_and(|address| address == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{Beneficiary, GameId};

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn payload() -> SettlementPayload {
        SettlementPayload::new(
            GameId(42),
            Beneficiary::Address(Address([0x11; 20])),
            Address([0xcc; 20]),
        )
    }

    #[test]
    fn address_matches_known_key() {
        let signer = JudgeSigner::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn signatures_are_deterministic_and_recoverable() {
        let signer = JudgeSigner::from_bytes(&[7u8; 32]).unwrap();
        let payload = payload();
        let first = signer.sign_payload(&payload).unwrap();
        let second = signer.sign_payload(&payload).unwrap();
        assert_eq!(first, second);
        assert!(first.v == 27 || first.v == 28);

        assert_eq!(recover(&payload.hash(), &first).unwrap(), signer.address());
        assert!(verify(&payload.hash(), &first, signer.address()));
    }

    #[test]
    fn signature_does_not_verify_for_other_payload() {
        let signer = JudgeSigner::from_bytes(&[7u8; 32]).unwrap();
        let signature = signer.sign_payload(&payload()).unwrap();
        let other = SettlementPayload::new(GameId(42), Beneficiary::Draw, Address([0xcc; 20]));
        assert!(!verify(&other.hash(), &signature, signer.address()));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            JudgeSigner::from_hex("0x1234"),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            JudgeSigner::from_hex("not hex"),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(JudgeSigner::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let signer = JudgeSigner::from_hex(KEY_ONE).unwrap();
        let shown = format!("{signer:?}");
        assert!(shown.contains("0x7e5f4552"));
        assert!(!shown.contains(&"0".repeat(63)));
    }
}
