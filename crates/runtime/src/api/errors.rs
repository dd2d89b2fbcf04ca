//! Unified error types surfaced by the runtime API.
//!
//! Move rejections are not errors: they come back inside a
//! [`CommandReply`](super::CommandReply) together with the authoritative
//! snapshot. These variants cover coordination and infrastructure failures.
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use chess_core::{GameId, RestoreError};

pub use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session {0} command channel closed")]
    CommandChannelClosed(GameId),

    #[error("session reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    /// The session inbox stayed full, or the reply did not arrive, in time.
    #[error("session {game_id} did not respond within {after:?}")]
    CommandTimeout { game_id: GameId, after: Duration },

    #[error("session worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    /// A second live session was requested for a game that already has one.
    #[error("game {game_id} already has a session")]
    ConcurrencyViolation { game_id: GameId },

    /// The runtime is stopping and hosts no new sessions.
    #[error("runtime is shutting down")]
    ShuttingDown,

    #[error("game {0} is unknown")]
    UnknownGame(GameId),

    #[error("game {game_id} could not be restored")]
    Restore {
        game_id: GameId,
        #[source]
        source: RestoreError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Retries ran out. The in-memory decision stands; an operator must act.
    #[error("persisting {operation} for game {game_id} failed: {message}")]
    PersistenceExhausted {
        game_id: GameId,
        operation: &'static str,
        message: String,
    },
}
