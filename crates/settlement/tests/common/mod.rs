#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use chess_core::{
    Address, EndReason, GameId, Outcome, Participant, ParticipantId, RecoverableSignature,
    TerminalRecord, Timestamp,
};
use runtime::{GameRepository, InMemoryRepository, RetryPolicy};
use settlement::{JudgeSigner, PayloadSigner, SettlementConfig, SignerError};

pub const JUDGE_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const CONTRACT: &str = "0x00000000000000000000000000000000000000cc";

pub fn alice() -> Participant {
    Participant::new("alice", Address([0xa1; 20]))
}

pub fn bob() -> Participant {
    Participant::new("bob", Address([0xb0; 20]))
}

pub fn id(name: &str) -> ParticipantId {
    ParticipantId::new(name)
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        timeout: Duration::from_millis(500),
    }
}

pub fn config() -> SettlementConfig {
    SettlementConfig::new(JUDGE_KEY, CONTRACT)
        .expect("valid settlement config")
        .with_retry(fast_retry(3))
}

pub fn terminal(game_id: u64, outcome: Outcome) -> TerminalRecord {
    let reason = match outcome {
        Outcome::Draw => EndReason::Agreement,
        Outcome::WhiteTimeout | Outcome::BlackTimeout => EndReason::FlagFall,
        Outcome::Abandoned { .. } => EndReason::Abandonment,
        Outcome::WhiteWins | Outcome::BlackWins => EndReason::Resignation,
    };
    TerminalRecord {
        game_id: GameId(game_id),
        outcome,
        reason,
        white: alice(),
        black: bob(),
        final_fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
        moves: Vec::new(),
        completed_at: Timestamp::from_millis(1_700_000_000_000),
    }
}

pub async fn repository_with(records: &[TerminalRecord]) -> Arc<InMemoryRepository> {
    let repository = Arc::new(InMemoryRepository::new());
    for record in records {
        repository
            .save_terminal(record)
            .await
            .expect("terminal stored");
    }
    repository
}

/// Judge signer that counts calls, can be slowed down, and can fail its
/// first few attempts.
pub struct CountingSigner {
    inner: JudgeSigner,
    calls: AtomicU32,
    failures_left: AtomicU32,
    delay: Duration,
}

impl CountingSigner {
    pub fn new(delay: Duration) -> Arc<Self> {
        Self::failing(0, delay)
    }

    pub fn failing(failures: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: JudgeSigner::from_hex(JUDGE_KEY).expect("valid key"),
            calls: AtomicU32::new(0),
            failures_left: AtomicU32::new(failures),
            delay,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayloadSigner for CountingSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<RecoverableSignature, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(SignerError::Signing("key service unavailable".into()));
        }
        self.inner.sign(&digest)
    }
}
