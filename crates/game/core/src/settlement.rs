//! Canonical settlement payload and signature records.
//!
//! The payload is three 32-byte words: game id, beneficiary (or the draw
//! marker), and the settlement contract address. It is keccak-hashed, the
//! hash is wrapped in the signed-message prefix, and the wrapped value is
//! hashed again to form the digest the judge signs.

use std::fmt;
use std::str::FromStr;

use sha3::{Digest, Keccak256};

use crate::engine::TerminalRecord;
use crate::outcome::Outcome;
use crate::types::{Address, GameId, Timestamp};

/// Domain prefix for a 32-byte signed message.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Marker written in place of a beneficiary for drawn games.
pub const DRAW_MARKER: &[u8; 4] = b"DRAW";

pub const PAYLOAD_LEN: usize = 96;

/// Who the payload pays out to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Beneficiary {
    Address(Address),
    Draw,
}

impl Beneficiary {
    /// Address-shaped words are left-padded; the draw marker is left-aligned,
    /// so the two can never encode to the same word.
    pub fn to_word(self) -> [u8; 32] {
        match self {
            Beneficiary::Address(address) => address.to_word(),
            Beneficiary::Draw => {
                let mut word = [0u8; 32];
                word[..DRAW_MARKER.len()].copy_from_slice(DRAW_MARKER);
                word
            }
        }
    }
}

/// Keccak-256 digest, shown as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct PayloadHash(pub [u8; 32]);

impl PayloadHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadHash({})", self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid 32-byte hex value: {0}")]
pub struct HashParseError(pub String);

impl FromStr for PayloadHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| HashParseError(s.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HashParseError(s.to_string()))?;
        Ok(PayloadHash(bytes))
    }
}

impl TryFrom<String> for PayloadHash {
    type Error = HashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PayloadHash> for String {
    fn from(hash: PayloadHash) -> Self {
        hash.to_hex()
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Fixed-layout settlement payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SettlementPayload {
    pub game_id: GameId,
    pub beneficiary: Beneficiary,
    pub contract: Address,
}

impl SettlementPayload {
    pub fn new(game_id: GameId, beneficiary: Beneficiary, contract: Address) -> Self {
        Self {
            game_id,
            beneficiary,
            contract,
        }
    }

    /// Payload for a terminal record: the winner's address, or the draw marker.
    pub fn for_terminal(record: &TerminalRecord, contract: Address) -> Self {
        Self::new(
            record.game_id,
            beneficiary_of(record.outcome, record),
            contract,
        )
    }

    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..32].copy_from_slice(&self.game_id.to_word());
        bytes[32..64].copy_from_slice(&self.beneficiary.to_word());
        bytes[64..].copy_from_slice(&self.contract.to_word());
        bytes
    }

    /// Keccak-256 of the encoded payload; the replay-guard key.
    pub fn hash(&self) -> PayloadHash {
        PayloadHash(keccak256(&self.encode()))
    }

    /// Digest actually signed: keccak of the prefixed payload hash.
    pub fn signing_digest(&self) -> [u8; 32] {
        signing_digest(&self.hash())
    }
}

pub fn signing_digest(hash: &PayloadHash) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(SIGNED_MESSAGE_PREFIX);
    hasher.update(hash.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn beneficiary_of(outcome: Outcome, record: &TerminalRecord) -> Beneficiary {
    match outcome.winner() {
        Some(color) => Beneficiary::Address(record.participant(color).address),
        None => Beneficiary::Draw,
    }
}

/// Recoverable secp256k1 signature in `(v, r, s)` form, `v` being 27 or 28.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoverableSignature {
    pub v: u8,
    #[cfg_attr(feature = "serde", serde(with = "hex_word"))]
    pub r: [u8; 32],
    #[cfg_attr(feature = "serde", serde(with = "hex_word"))]
    pub s: [u8; 32],
}

impl RecoverableSignature {
    /// 65 bytes: `r ‖ s ‖ v`.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    pub fn recovery_id(&self) -> u8 {
        self.v.saturating_sub(27)
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverableSignature")
            .field("v", &self.v)
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .finish()
    }
}

#[cfg(feature = "serde")]
mod hex_word {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(word: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(word)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);
        let bytes = hex::decode(digits).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// The one signature ever issued for a payload hash.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignatureRecord {
    pub game_id: GameId,
    pub payload: SettlementPayload,
    pub payload_hash: PayloadHash,
    pub signature: RecoverableSignature,
    pub issued_at: Timestamp,
    pub claimed: bool,
    /// Ledger transaction that performed the claim, once confirmed.
    pub claim_tx: Option<String>,
}
