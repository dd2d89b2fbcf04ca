//! Periodic snapshot persistence.
//!
//! Sessions push their record here after activation, every few plies, on a
//! timer, and on completion. Records queued for the same game are coalesced
//! so only the newest version is written. Writes go through
//! [`retry`](crate::retry::retry); a game whose snapshot cannot be stored
//! keeps playing and the failure is escalated.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use chess_core::{GameId, GameRecord};

use crate::repository::GameRepository;
use crate::retry::{RetryPolicy, retry};

pub struct CheckpointWorker {
    repository: Arc<dyn GameRepository>,
    retry: RetryPolicy,
    checkpoint_rx: mpsc::UnboundedReceiver<GameRecord>,
}

impl CheckpointWorker {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        retry: RetryPolicy,
        checkpoint_rx: mpsc::UnboundedReceiver<GameRecord>,
    ) -> Self {
        Self {
            repository,
            retry,
            checkpoint_rx,
        }
    }

    /// Runs until every sender is dropped, then writes what is still queued.
    pub async fn run(mut self) {
        while let Some(first) = self.checkpoint_rx.recv().await {
            let mut pending: BTreeMap<GameId, GameRecord> = BTreeMap::new();
            Self::stage(&mut pending, first);
            while let Ok(record) = self.checkpoint_rx.try_recv() {
                Self::stage(&mut pending, record);
            }
            for record in pending.into_values() {
                self.save(record).await;
            }
        }
    }

    fn stage(pending: &mut BTreeMap<GameId, GameRecord>, record: GameRecord) {
        match pending.get(&record.game_id) {
            Some(queued) if queued.version >= record.version => {}
            _ => {
                pending.insert(record.game_id, record);
            }
        }
    }

    async fn save(&self, record: GameRecord) {
        let repository = Arc::clone(&self.repository);
        let result = retry(&self.retry, "save_snapshot", || {
            let repository = Arc::clone(&repository);
            let record = record.clone();
            async move { repository.save_snapshot(&record).await }
        })
        .await;

        match result {
            Ok(()) => debug!(
                target: "runtime::checkpoint",
                game_id = %record.game_id,
                version = record.version,
                ply = record.plies(),
                "snapshot stored"
            ),
            Err(exhausted) => error!(
                target: "runtime::checkpoint",
                game_id = %record.game_id,
                version = record.version,
                escalate = true,
                error = %exhausted,
                "snapshot could not be stored"
            ),
        }
    }
}
