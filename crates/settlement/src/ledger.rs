//! Ledger verification seam.
//!
//! A claim is only marked on our side once the ledger confirms that the
//! claim transaction executed the settlement call for the expected payload.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use chess_core::{PayloadHash, SignatureRecord};

/// What the ledger says about a claim transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimStatus {
    /// Executed the settlement call for the expected payload.
    Confirmed,
    /// Not (yet) visible or not final.
    Pending,
    /// Reverted, or settled a different payload.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("malformed claim transaction reference: {0}")]
    InvalidReference(String),
}

#[async_trait]
pub trait LedgerVerifier: Send + Sync {
    async fn verify_claim(
        &self,
        claim_tx: &str,
        record: &SignatureRecord,
    ) -> Result<ClaimStatus, LedgerError>;
}

/// Used when no ledger endpoint is configured: nothing is ever confirmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredLedger;

#[async_trait]
impl LedgerVerifier for UnconfiguredLedger {
    async fn verify_claim(
        &self,
        claim_tx: &str,
        _record: &SignatureRecord,
    ) -> Result<ClaimStatus, LedgerError> {
        tracing::debug!(
            target: "settlement::ledger",
            claim_tx,
            "no ledger configured, claim stays pending"
        );
        Ok(ClaimStatus::Pending)
    }
}

/// In-memory ledger for tests and local runs.
#[derive(Debug, Default)]
pub struct MockLedger {
    claims: Mutex<HashMap<String, (PayloadHash, ClaimStatus)>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful settlement call for `payload_hash`.
    pub fn confirm(&self, claim_tx: impl Into<String>, payload_hash: PayloadHash) {
        self.insert(claim_tx.into(), payload_hash, ClaimStatus::Confirmed);
    }

    /// Record a reverted claim.
    pub fn fail(
        &self,
        claim_tx: impl Into<String>,
        payload_hash: PayloadHash,
        reason: impl Into<String>,
    ) {
        self.insert(
            claim_tx.into(),
            payload_hash,
            ClaimStatus::Failed(reason.into()),
        );
    }

    fn insert(&self, claim_tx: String, payload_hash: PayloadHash, status: ClaimStatus) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.insert(claim_tx, (payload_hash, status));
        }
    }
}

#[async_trait]
impl LedgerVerifier for MockLedger {
    async fn verify_claim(
        &self,
        claim_tx: &str,
        record: &SignatureRecord,
    ) -> Result<ClaimStatus, LedgerError> {
        if claim_tx.trim().is_empty() {
            return Err(LedgerError::InvalidReference(claim_tx.to_string()));
        }
        let claims = self
            .claims
            .lock()
            .map_err(|_| LedgerError::Unavailable("mock ledger lock poisoned".into()))?;
        Ok(match claims.get(claim_tx) {
            None => ClaimStatus::Pending,
            Some((hash, _)) if *hash != record.payload_hash => ClaimStatus::Failed(format!(
                "transaction settled payload {hash}, expected {}",
                record.payload_hash
            )),
            Some((_, status)) => status.clone(),
        })
    }
}
