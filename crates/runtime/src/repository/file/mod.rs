//! File-based repository.
//!
//! # File Structure
//!
//! ```text
//! {base_dir}/
//!   ├── games/game_{id}.json          latest snapshot (atomic rename)
//!   ├── terminal/terminal_{id}.json   written once (hard-link create)
//!   └── signatures/{payload_hash}.json
//! ```
//!
//! Terminal records and signatures are published with `hard_link`, which
//! fails if the target already exists. That makes the file system itself
//! the unique constraint: concurrent writers cannot both succeed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use chess_core::{GameId, GameRecord, PayloadHash, SignatureRecord, TerminalRecord};

use crate::repository::{
    GameRepository, RepositoryError, Result, SignatureRepository, SignatureWrite, TerminalWrite,
};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct FileRepository {
    base_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        for sub in ["games", "terminal", "signatures"] {
            fs::create_dir_all(base_dir.join(sub))?;
        }
        Ok(Self {
            base_dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn game_path(&self, game_id: GameId) -> PathBuf {
        self.base_dir
            .join("games")
            .join(format!("game_{}.json", game_id.0))
    }

    fn terminal_path(&self, game_id: GameId) -> PathBuf {
        self.base_dir
            .join("terminal")
            .join(format!("terminal_{}.json", game_id.0))
    }

    fn signature_path(&self, hash: &PayloadHash) -> PathBuf {
        self.base_dir
            .join("signatures")
            .join(format!("{}.json", hex::encode(hash.as_bytes())))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RepositoryError::Join(e.to_string()))?
}

fn temp_path(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}.{n}.tmp", std::process::id()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RepositoryError::CorruptedData(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` atomically.
fn write_replace<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp = temp_path(path);
    fs::write(&temp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Create `path` only if it does not exist. Returns whether this call created it.
fn write_unique<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let temp = temp_path(path);
    fs::write(&temp, serde_json::to_vec_pretty(value)?)?;
    let linked = fs::hard_link(&temp, path);
    let _ = fs::remove_file(&temp);
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl GameRepository for FileRepository {
    async fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>> {
        let path = self.game_path(game_id);
        blocking(move || read_json(&path)).await
    }

    async fn save_snapshot(&self, record: &GameRecord) -> Result<()> {
        let path = self.game_path(record.game_id);
        let record = record.clone();
        let lock = Arc::clone(&self.write_lock);
        blocking(move || {
            let _guard = lock.lock().map_err(|_| RepositoryError::LockPoisoned)?;
            if let Some(stored) = read_json::<GameRecord>(&path)?
                && stored.version > record.version
            {
                return Ok(());
            }
            write_replace(&path, &record)?;
            tracing::debug!(
                target: "runtime::repository",
                game_id = record.game_id.0,
                version = record.version,
                "saved snapshot to {}",
                path.display()
            );
            Ok(())
        })
        .await
    }

    async fn save_terminal(&self, record: &TerminalRecord) -> Result<TerminalWrite> {
        let path = self.terminal_path(record.game_id);
        let record = record.clone();
        blocking(move || {
            if write_unique(&path, &record)? {
                return Ok(TerminalWrite::Recorded);
            }
            let existing = read_json::<TerminalRecord>(&path)?.ok_or_else(|| {
                RepositoryError::CorruptedData(format!("{} vanished", path.display()))
            })?;
            Ok(TerminalWrite::AlreadyRecorded(existing))
        })
        .await
    }

    async fn load_terminal(&self, game_id: GameId) -> Result<Option<TerminalRecord>> {
        let path = self.terminal_path(game_id);
        blocking(move || read_json(&path)).await
    }

    async fn list_games(&self) -> Result<Vec<GameId>> {
        let dir = self.base_dir.join("games");
        blocking(move || {
            let mut ids = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let name = entry?.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some(id) = name
                    .strip_prefix("game_")
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .and_then(|id| id.parse::<u64>().ok())
                {
                    ids.push(GameId(id));
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl SignatureRepository for FileRepository {
    async fn save_signature(&self, record: &SignatureRecord) -> Result<SignatureWrite> {
        let path = self.signature_path(&record.payload_hash);
        let record = record.clone();
        blocking(move || {
            if write_unique(&path, &record)? {
                return Ok(SignatureWrite::Stored);
            }
            let existing = read_json::<SignatureRecord>(&path)?.ok_or_else(|| {
                RepositoryError::CorruptedData(format!("{} vanished", path.display()))
            })?;
            Ok(SignatureWrite::Existing(existing))
        })
        .await
    }

    async fn load_signature(&self, hash: &PayloadHash) -> Result<Option<SignatureRecord>> {
        let path = self.signature_path(hash);
        blocking(move || read_json(&path)).await
    }

    async fn mark_claimed(&self, hash: &PayloadHash, claim_tx: &str) -> Result<SignatureRecord> {
        let path = self.signature_path(hash);
        let hash = *hash;
        let claim_tx = claim_tx.to_string();
        let lock = Arc::clone(&self.write_lock);
        blocking(move || {
            let _guard = lock.lock().map_err(|_| RepositoryError::LockPoisoned)?;
            let mut record = read_json::<SignatureRecord>(&path)?
                .ok_or_else(|| RepositoryError::SignatureNotFound(hash.to_hex()))?;
            if !record.claimed {
                record.claimed = true;
                record.claim_tx = Some(claim_tx);
                write_replace(&path, &record)?;
            }
            Ok(record)
        })
        .await
    }
}
