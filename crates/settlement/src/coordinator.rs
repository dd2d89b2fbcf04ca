//! Settlement coordinator.
//!
//! Rebuilds the settlement payload from the stored terminal record, issues at
//! most one judge signature per payload hash, and marks claims once the
//! ledger confirms them. Concurrent requests for the same payload share a
//! single in-flight signing operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use chess_core::{
    Address, Beneficiary, GameId, ParticipantId, PayloadHash, RecoverableSignature,
    SettlementPayload, SignatureRecord, TerminalRecord,
};
use runtime::{
    Event, EventBus, GameRepository, HookError, RetryExhausted, RetryPolicy, SettlementEvent,
    SignatureRepository, SignatureWrite, TerminalHook, TimeSource, WallClock, retry,
};

use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::ledger::{ClaimStatus, LedgerVerifier};
use crate::signer::PayloadSigner;

/// Everything a beneficiary needs to submit a claim on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTicket {
    pub game_id: GameId,
    pub beneficiary: Beneficiary,
    pub contract: Address,
    pub payload_hash: PayloadHash,
    pub signature: RecoverableSignature,
    /// `r ‖ s ‖ v` as 0x-prefixed hex.
    pub signature_hex: String,
    pub judge: Address,
    pub claimed: bool,
}

impl ClaimTicket {
    fn new(record: &SignatureRecord, judge: Address) -> Self {
        Self {
            game_id: record.game_id,
            beneficiary: record.payload.beneficiary,
            contract: record.payload.contract,
            payload_hash: record.payload_hash,
            signature: record.signature,
            signature_hex: format!("0x{}", hex::encode(record.signature.to_bytes())),
            judge,
            claimed: record.claimed,
        }
    }
}

pub struct SettlementCoordinator {
    games: Arc<dyn GameRepository>,
    signatures: Arc<dyn SignatureRepository>,
    signer: Arc<dyn PayloadSigner>,
    ledger: Arc<dyn LedgerVerifier>,
    event_bus: EventBus,
    time: Arc<dyn TimeSource>,
    contract: Address,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<PayloadHash, Arc<OnceCell<SignatureRecord>>>>,
}

impl SettlementCoordinator {
    /// Coordinator signing with the configured judge key.
    pub fn new<R>(
        config: &SettlementConfig,
        repository: Arc<R>,
        ledger: Arc<dyn LedgerVerifier>,
    ) -> Result<Self>
    where
        R: GameRepository + SignatureRepository + 'static,
    {
        let signer = Arc::new(config.signer()?);
        Ok(Self {
            games: repository.clone(),
            signatures: repository,
            signer,
            ledger,
            event_bus: EventBus::new(),
            time: Arc::new(WallClock),
            contract: config.contract_address,
            retry: config.retry.clone(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Publish settlement events on a shared bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Replace the signer, e.g. with a remote key service.
    pub fn with_signer(mut self, signer: Arc<dyn PayloadSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn judge_address(&self) -> Address {
        self.signer.address()
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// The signature for a completed game, issuing it on first request.
    pub async fn get_or_issue_signature(&self, game_id: GameId) -> Result<SignatureRecord> {
        let terminal = self.terminal(game_id).await?;
        self.signature_for(&terminal).await
    }

    /// Already issued signature, if any. Never signs.
    pub async fn signature(&self, game_id: GameId) -> Result<Option<SignatureRecord>> {
        let terminal = self.terminal(game_id).await?;
        let payload_hash = SettlementPayload::for_terminal(&terminal, self.contract).hash();
        self.load_signature(game_id, &payload_hash).await
    }

    /// Claim ticket for `requester`, who must be the winner, the abandonment
    /// beneficiary, or either participant of a drawn game.
    pub async fn claim(&self, game_id: GameId, requester: &ParticipantId) -> Result<ClaimTicket> {
        let terminal = self.terminal(game_id).await?;
        let allowed = match terminal.outcome.winner() {
            Some(color) => terminal.participant(color).id == *requester,
            None => terminal.white.id == *requester || terminal.black.id == *requester,
        };
        if !allowed {
            warn!(
                target: "settlement::audit",
                %game_id,
                requester = %requester,
                outcome = %terminal.outcome,
                "claim requested by non-beneficiary"
            );
            return Err(SettlementError::NotBeneficiary {
                game_id,
                requester: requester.clone(),
            });
        }

        let record = self.signature_for(&terminal).await?;
        Ok(ClaimTicket::new(&record, self.signer.address()))
    }

    /// Mark the game's signature claimed once the ledger confirms `claim_tx`.
    ///
    /// Calling again after success returns the stored record unchanged.
    pub async fn mark_claimed(&self, game_id: GameId, claim_tx: &str) -> Result<SignatureRecord> {
        let terminal = self.terminal(game_id).await?;
        let payload_hash = SettlementPayload::for_terminal(&terminal, self.contract).hash();
        let record = self
            .load_signature(game_id, &payload_hash)
            .await?
            .ok_or(SettlementError::NoSignature(game_id))?;
        if record.claimed {
            debug!(
                target: "settlement::coordinator",
                %game_id,
                claim_tx = record.claim_tx.as_deref().unwrap_or_default(),
                "already claimed"
            );
            return Ok(record);
        }

        let status = tokio::time::timeout(
            self.retry.timeout,
            self.ledger.verify_claim(claim_tx, &record),
        )
        .await
        .map_err(|_| SettlementError::ClaimNotConfirmed {
            game_id,
            claim_tx: claim_tx.to_string(),
            reason: format!("ledger did not answer within {:?}", self.retry.timeout),
        })??;

        match status {
            ClaimStatus::Confirmed => {
                let stored = retry(&self.retry, "mark_claimed", || {
                    self.signatures.mark_claimed(&payload_hash, claim_tx)
                })
                .await
                .map_err(|e| self.exhausted(game_id, e))?;
                info!(
                    target: "settlement::audit",
                    %game_id,
                    payload_hash = %payload_hash,
                    claim_tx,
                    "claim confirmed"
                );
                self.event_bus
                    .publish(Event::Settlement(SettlementEvent::ClaimConfirmed {
                        game_id,
                        payload_hash,
                        claim_tx: claim_tx.to_string(),
                    }));
                Ok(stored)
            }
            ClaimStatus::Pending => {
                debug!(target: "settlement::coordinator", %game_id, claim_tx, "claim pending");
                Err(SettlementError::ClaimNotConfirmed {
                    game_id,
                    claim_tx: claim_tx.to_string(),
                    reason: "pending".into(),
                })
            }
            ClaimStatus::Failed(reason) => {
                warn!(
                    target: "settlement::audit",
                    %game_id,
                    payload_hash = %payload_hash,
                    claim_tx,
                    reason = %reason,
                    "claim rejected by ledger"
                );
                self.event_bus
                    .publish(Event::Settlement(SettlementEvent::ClaimRejected {
                        game_id,
                        reason: reason.clone(),
                    }));
                Err(SettlementError::ClaimNotConfirmed {
                    game_id,
                    claim_tx: claim_tx.to_string(),
                    reason,
                })
            }
        }
    }

    async fn signature_for(&self, terminal: &TerminalRecord) -> Result<SignatureRecord> {
        let payload = SettlementPayload::for_terminal(terminal, self.contract);
        let payload_hash = payload.hash();

        let flight = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(payload_hash)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let result = flight
            .get_or_try_init(|| self.issue(payload))
            .await
            .cloned();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(&payload_hash)
            .is_some_and(|current| Arc::ptr_eq(current, &flight))
        {
            in_flight.remove(&payload_hash);
        }
        result
    }

    async fn issue(&self, payload: SettlementPayload) -> Result<SignatureRecord> {
        let game_id = payload.game_id;
        let payload_hash = payload.hash();
        if let Some(existing) = self.load_signature(game_id, &payload_hash).await? {
            debug!(
                target: "settlement::coordinator",
                %game_id,
                payload_hash = %payload_hash,
                "signature already issued"
            );
            return Ok(existing);
        }

        let digest = payload.signing_digest();
        let signature = retry(&self.retry, "sign_payload", || {
            self.signer.sign_digest(digest)
        })
        .await
        .map_err(|e| {
            error!(
                target: "settlement::coordinator",
                %game_id,
                payload_hash = %payload_hash,
                error = %e,
                "signing failed"
            );
            SettlementError::Signing {
                payload_hash,
                message: e.to_string(),
            }
        })?;

        let record = SignatureRecord {
            game_id,
            payload,
            payload_hash,
            signature,
            issued_at: self.time.now(),
            claimed: false,
            claim_tx: None,
        };
        let write = retry(&self.retry, "save_signature", || {
            self.signatures.save_signature(&record)
        })
        .await
        .map_err(|e| self.exhausted(game_id, e))?;

        match write {
            SignatureWrite::Stored => {
                info!(
                    target: "settlement::audit",
                    %game_id,
                    payload_hash = %payload_hash,
                    beneficiary = ?payload.beneficiary,
                    "signature issued"
                );
                self.event_bus
                    .publish(Event::Settlement(SettlementEvent::SignatureIssued {
                        game_id,
                        payload_hash,
                    }));
                Ok(record)
            }
            SignatureWrite::Existing(existing) => Ok(existing),
        }
    }

    async fn terminal(&self, game_id: GameId) -> Result<TerminalRecord> {
        retry(&self.retry, "load_terminal", || self.games.load_terminal(game_id))
            .await
            .map_err(|e| self.exhausted(game_id, e))?
            .ok_or(SettlementError::NotCompleted(game_id))
    }

    async fn load_signature(
        &self,
        game_id: GameId,
        payload_hash: &PayloadHash,
    ) -> Result<Option<SignatureRecord>> {
        retry(&self.retry, "load_signature", || {
            self.signatures.load_signature(payload_hash)
        })
        .await
        .map_err(|e| self.exhausted(game_id, e))
    }

    fn exhausted<E>(&self, game_id: GameId, error: RetryExhausted<E>) -> SettlementError
    where
        E: fmt::Display + fmt::Debug,
    {
        error!(
            target: "settlement::coordinator",
            %game_id,
            escalate = true,
            error = %error,
            "settlement persistence exhausted retries"
        );
        SettlementError::Persistence(error.to_string())
    }
}

#[async_trait]
impl TerminalHook for SettlementCoordinator {
    fn name(&self) -> &'static str {
        "settlement"
    }

    async fn on_terminal(
        &self,
        record: &TerminalRecord,
        _first_write: bool,
    ) -> std::result::Result<(), HookError> {
        self.signature_for(record)
            .await
            .map(|_| ())
            .map_err(|e| HookError::new(self.name(), e.to_string()))
    }
}
