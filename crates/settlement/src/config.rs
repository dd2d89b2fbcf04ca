//! Settlement configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chess_core::Address;
use runtime::RetryPolicy;

use crate::error::{Result, SettlementError};
use crate::signer::{JudgeSigner, parse_secret};

/// Judge key, settlement contract and retry policy.
///
/// Loaded once at startup; the key never leaves the coordinator.
#[derive(Clone)]
pub struct SettlementConfig {
    pub judge_private_key: [u8; 32],
    pub contract_address: Address,
    pub retry: RetryPolicy,
}

impl SettlementConfig {
    pub const JUDGE_KEY_VAR: &'static str = "JUDGE_PRIVATE_KEY";
    pub const CONTRACT_VAR: &'static str = "CHESS_CONTRACT_ADDRESS";

    /// Validate a hex key and contract address.
    pub fn new(judge_private_key: &str, contract_address: &str) -> Result<Self> {
        let judge_private_key = parse_secret(judge_private_key)
            .map_err(|e| SettlementError::Config(format!("{}: {e}", Self::JUDGE_KEY_VAR)))?;
        let contract_address = Address::from_str(contract_address.trim())
            .map_err(|e| SettlementError::Config(format!("{}: {e}", Self::CONTRACT_VAR)))?;
        let config = Self {
            judge_private_key,
            contract_address,
            retry: RetryPolicy::default(),
        };
        // Reject keys outside the curve order now rather than on first claim.
        config.signer()?;
        Ok(config)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `JUDGE_PRIVATE_KEY` - 32-byte hex secp256k1 secret (required)
    /// - `CHESS_CONTRACT_ADDRESS` - 20-byte hex settlement contract (required)
    /// - `SETTLEMENT_RETRY_MAX_ATTEMPTS` - signing/persistence attempts (default: 5)
    /// - `SETTLEMENT_RETRY_TIMEOUT_MS` - per-attempt timeout (default: 5000)
    pub fn from_env() -> Result<Self> {
        let key = required(Self::JUDGE_KEY_VAR)?;
        let contract = required(Self::CONTRACT_VAR)?;
        let mut retry = RetryPolicy::default();
        if let Some(attempts) = optional::<u32>("SETTLEMENT_RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = attempts;
        }
        if let Some(ms) = optional::<u64>("SETTLEMENT_RETRY_TIMEOUT_MS") {
            retry.timeout = Duration::from_millis(ms);
        }
        Ok(Self::new(&key, &contract)?.with_retry(retry))
    }

    pub fn signer(&self) -> Result<JudgeSigner> {
        JudgeSigner::from_bytes(&self.judge_private_key)
            .map_err(|e| SettlementError::Config(format!("{}: {e}", Self::JUDGE_KEY_VAR)))
    }
}

impl fmt::Debug for SettlementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementConfig")
            .field("judge_private_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("retry", &self.retry)
            .finish()
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| SettlementError::Config(format!("{key} is not set")))
}

fn optional<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(target: "settlement::config", key, value = %raw, "ignoring unparsable value");
            None
        }
    }
}
