//! Repository contracts for durable game and settlement data.
//!
//! Every write is idempotent under retry: snapshots keep the highest
//! version seen, terminal records and signatures are first-writer-wins, and
//! marking a signature claimed twice is a no-op.

use async_trait::async_trait;

use chess_core::{GameId, GameRecord, PayloadHash, SignatureRecord, TerminalRecord};

use super::error::Result;

/// Result of a terminal-record write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalWrite {
    /// This call stored the record.
    Recorded,
    /// A record already existed; it is returned unchanged.
    AlreadyRecorded(TerminalRecord),
}

/// Result of a signature write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureWrite {
    Stored,
    /// Another writer got there first; the stored record wins.
    Existing(SignatureRecord),
}

/// Live and finished game state.
#[async_trait]
pub trait GameRepository: Send + Sync {
    /// Latest snapshot of a game, if any.
    async fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>>;

    /// Store a snapshot. A snapshot older than the stored one is ignored.
    async fn save_snapshot(&self, record: &GameRecord) -> Result<()>;

    /// Store the terminal record. At most one ever exists per game.
    async fn save_terminal(&self, record: &TerminalRecord) -> Result<TerminalWrite>;

    async fn load_terminal(&self, game_id: GameId) -> Result<Option<TerminalRecord>>;

    /// Ids of every game with a stored snapshot, ascending.
    async fn list_games(&self) -> Result<Vec<GameId>>;
}

/// Issued settlement signatures, keyed by payload hash.
#[async_trait]
pub trait SignatureRepository: Send + Sync {
    async fn save_signature(&self, record: &SignatureRecord) -> Result<SignatureWrite>;

    async fn load_signature(&self, hash: &PayloadHash) -> Result<Option<SignatureRecord>>;

    /// Mark the signature claimed by `claim_tx`. Returns the stored record.
    /// An already claimed record is returned unchanged.
    async fn mark_claimed(&self, hash: &PayloadHash, claim_tx: &str) -> Result<SignatureRecord>;
}
