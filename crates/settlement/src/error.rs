use chess_core::{GameId, ParticipantId, PayloadHash};
use runtime::RepositoryError;

use crate::ledger::LedgerError;
use crate::signer::SignerError;

/// Errors raised by the settlement coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("game {0} has no terminal record")]
    NotCompleted(GameId),

    #[error("{requester} is not a beneficiary of game {game_id}")]
    NotBeneficiary {
        game_id: GameId,
        requester: ParticipantId,
    },

    #[error("no signature issued for game {0}")]
    NoSignature(GameId),

    /// Never returned after a signature was stored.
    #[error("signing payload {payload_hash} failed: {message}")]
    Signing {
        payload_hash: PayloadHash,
        message: String,
    },

    /// Retryable: the ledger has not confirmed the claim.
    #[error("claim {claim_tx} for game {game_id} is not confirmed: {reason}")]
    ClaimNotConfirmed {
        game_id: GameId,
        claim_tx: String,
        reason: String,
    },

    #[error("invalid settlement configuration: {0}")]
    Config(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SettlementError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::Signing { .. }
                | SettlementError::ClaimNotConfirmed { .. }
                | SettlementError::Persistence(_)
                | SettlementError::Ledger(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
