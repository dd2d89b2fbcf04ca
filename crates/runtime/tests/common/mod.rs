#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use chess_core::{
    Address, GameConfig, GameId, GameRecord, Participant, ParticipantId, TerminalRecord, Timestamp,
};
use runtime::repository::Result as RepoResult;
use runtime::{
    Event, GameRepository, InMemoryRepository, ManualClock, RepositoryError, RetryPolicy, Runtime,
    RuntimeConfig, TerminalWrite, Transport,
};

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

pub fn alice() -> Participant {
    Participant::new(ALICE, Address([0xa1; 20]))
}

pub fn bob() -> Participant {
    Participant::new(BOB, Address([0xb0; 20]))
}

pub fn id(name: &str) -> ParticipantId {
    ParticipantId::new(name)
}

pub fn clock() -> ManualClock {
    ManualClock::new(Timestamp::from_millis(1_700_000_000_000))
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        timeout: Duration::from_millis(500),
    }
}

/// Long timers so only explicit triggers checkpoint or reap.
pub fn config() -> RuntimeConfig {
    RuntimeConfig {
        game: GameConfig::with_time_control(60_000, 0),
        checkpoint_interval: Duration::from_secs(3_600),
        completed_linger: Duration::from_secs(3_600),
        retry: fast_retry(4),
        ..RuntimeConfig::default()
    }
}

pub async fn start_runtime(
    clock: &ManualClock,
    repository: Arc<dyn GameRepository>,
    transport: Option<Arc<dyn Transport>>,
) -> Runtime {
    let mut builder = Runtime::builder()
        .config(config())
        .repository(repository)
        .time_source(Arc::new(clock.clone()));
    if let Some(transport) = transport {
        builder = builder.transport(transport);
    }
    builder.build().await.expect("runtime should build")
}

/// Receive until `matches` accepts an event, or panic after two seconds.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<Event>, mut matches: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

/// Poll `check` until it holds, or panic after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition did not hold in time")
}

/// Counts writes and can fail the first few terminal writes.
#[derive(Default)]
pub struct CountingRepository {
    pub inner: InMemoryRepository,
    pub snapshot_writes: AtomicUsize,
    pub terminal_writes: AtomicUsize,
    failures_left: AtomicU32,
    always_fail: bool,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` terminal writes fail.
    pub fn flaky(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Every terminal write fails.
    pub fn broken() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn snapshots(&self) -> usize {
        self.snapshot_writes.load(Ordering::SeqCst)
    }

    pub fn terminals(&self) -> usize {
        self.terminal_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameRepository for CountingRepository {
    async fn load_game(&self, game_id: GameId) -> RepoResult<Option<GameRecord>> {
        self.inner.load_game(game_id).await
    }

    async fn save_snapshot(&self, record: &GameRecord) -> RepoResult<()> {
        self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.save_snapshot(record).await
    }

    async fn save_terminal(&self, record: &TerminalRecord) -> RepoResult<TerminalWrite> {
        self.terminal_writes.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(RepositoryError::Unavailable("disk offline".into()));
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("transient".into()));
        }
        self.inner.save_terminal(record).await
    }

    async fn load_terminal(&self, game_id: GameId) -> RepoResult<Option<TerminalRecord>> {
        self.inner.load_terminal(game_id).await
    }

    async fn list_games(&self) -> RepoResult<Vec<GameId>> {
        self.inner.list_games().await
    }
}

/// Loads of one game never finish; everything else is in memory.
pub struct StallingRepository {
    pub inner: InMemoryRepository,
    pub stalled: GameId,
}

impl StallingRepository {
    pub fn new(stalled: GameId) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            stalled,
        }
    }
}

#[async_trait]
impl GameRepository for StallingRepository {
    async fn load_game(&self, game_id: GameId) -> RepoResult<Option<GameRecord>> {
        if game_id == self.stalled {
            std::future::pending::<()>().await;
        }
        self.inner.load_game(game_id).await
    }

    async fn save_snapshot(&self, record: &GameRecord) -> RepoResult<()> {
        self.inner.save_snapshot(record).await
    }

    async fn save_terminal(&self, record: &TerminalRecord) -> RepoResult<TerminalWrite> {
        self.inner.save_terminal(record).await
    }

    async fn load_terminal(&self, game_id: GameId) -> RepoResult<Option<TerminalRecord>> {
        self.inner.load_terminal(game_id).await
    }

    async fn list_games(&self) -> RepoResult<Vec<GameId>> {
        self.inner.list_games().await
    }
}
