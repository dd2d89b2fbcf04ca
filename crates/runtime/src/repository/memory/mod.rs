//! In-memory repository for tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use chess_core::{GameId, GameRecord, PayloadHash, SignatureRecord, TerminalRecord};

use crate::repository::{
    GameRepository, RepositoryError, Result, SignatureRepository, SignatureWrite, TerminalWrite,
};

/// Stores snapshots, terminal records and signatures in process memory.
#[derive(Default)]
pub struct InMemoryRepository {
    games: RwLock<BTreeMap<GameId, GameRecord>>,
    terminals: RwLock<HashMap<GameId, TerminalRecord>>,
    signatures: RwLock<HashMap<PayloadHash, SignatureRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of terminal records stored.
    pub fn terminal_count(&self) -> usize {
        self.terminals.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Number of signatures stored.
    pub fn signature_count(&self) -> usize {
        self.signatures.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GameRepository for InMemoryRepository {
    async fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>> {
        let games = self.games.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(games.get(&game_id).cloned())
    }

    async fn save_snapshot(&self, record: &GameRecord) -> Result<()> {
        let mut games = self
            .games
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        match games.get(&record.game_id) {
            Some(stored) if stored.version > record.version => {}
            _ => {
                games.insert(record.game_id, record.clone());
            }
        }
        Ok(())
    }

    async fn save_terminal(&self, record: &TerminalRecord) -> Result<TerminalWrite> {
        let mut terminals = self
            .terminals
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        if let Some(existing) = terminals.get(&record.game_id) {
            return Ok(TerminalWrite::AlreadyRecorded(existing.clone()));
        }
        terminals.insert(record.game_id, record.clone());
        Ok(TerminalWrite::Recorded)
    }

    async fn load_terminal(&self, game_id: GameId) -> Result<Option<TerminalRecord>> {
        let terminals = self
            .terminals
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(terminals.get(&game_id).cloned())
    }

    async fn list_games(&self) -> Result<Vec<GameId>> {
        let games = self.games.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(games.keys().copied().collect())
    }
}

#[async_trait]
impl SignatureRepository for InMemoryRepository {
    async fn save_signature(&self, record: &SignatureRecord) -> Result<SignatureWrite> {
        let mut signatures = self
            .signatures
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        if let Some(existing) = signatures.get(&record.payload_hash) {
            return Ok(SignatureWrite::Existing(existing.clone()));
        }
        signatures.insert(record.payload_hash, record.clone());
        Ok(SignatureWrite::Stored)
    }

    async fn load_signature(&self, hash: &PayloadHash) -> Result<Option<SignatureRecord>> {
        let signatures = self
            .signatures
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(signatures.get(hash).cloned())
    }

    async fn mark_claimed(&self, hash: &PayloadHash, claim_tx: &str) -> Result<SignatureRecord> {
        let mut signatures = self
            .signatures
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        let record = signatures
            .get_mut(hash)
            .ok_or_else(|| RepositoryError::SignatureNotFound(hash.to_hex()))?;
        if !record.claimed {
            record.claimed = true;
            record.claim_tx = Some(claim_tx.to_string());
        }
        Ok(record.clone())
    }
}
