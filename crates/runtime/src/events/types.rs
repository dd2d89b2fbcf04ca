//! Event payloads published on the bus.

use serde::{Deserialize, Serialize};

use chess_core::{
    GameFairPlay, GameId, GameResult, PayloadHash, SessionEvent, TerminalRecord,
};

/// A session event together with the game it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNotice {
    pub game_id: GameId,
    pub version: u64,
    pub event: SessionEvent,
}

/// Outcome notifier events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeEvent {
    /// Terminal record durably stored (or already present from an earlier try).
    Recorded {
        game_id: GameId,
        result: GameResult,
        first_write: bool,
    },
    /// Persisting the terminal record ran out of retries. Needs an operator.
    Escalated { game_id: GameId, error: String },
    /// Advisory think-time analysis for a finished game.
    FairPlay {
        game_id: GameId,
        report: GameFairPlay,
    },
}

impl OutcomeEvent {
    pub fn game_id(&self) -> GameId {
        match self {
            OutcomeEvent::Recorded { game_id, .. }
            | OutcomeEvent::Escalated { game_id, .. }
            | OutcomeEvent::FairPlay { game_id, .. } => *game_id,
        }
    }

    pub(crate) fn recorded(record: &TerminalRecord, first_write: bool) -> Self {
        OutcomeEvent::Recorded {
            game_id: record.game_id,
            result: GameResult {
                outcome: record.outcome,
                reason: record.reason,
                completed_at: record.completed_at,
            },
            first_write,
        }
    }
}

/// Settlement audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementEvent {
    SignatureIssued {
        game_id: GameId,
        payload_hash: PayloadHash,
    },
    ClaimConfirmed {
        game_id: GameId,
        payload_hash: PayloadHash,
        claim_tx: String,
    },
    ClaimRejected {
        game_id: GameId,
        reason: String,
    },
}
