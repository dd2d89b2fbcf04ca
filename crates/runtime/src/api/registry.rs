//! Session registry.
//!
//! The [`SessionRegistry`] owns the one live session worker of every game
//! hosted by this process. Every id maps to a slot that is initialised at
//! most once, so concurrent callers for one game share a single restore or
//! creation and always get handles to the same worker. The map lock only
//! guards slot look-up; repository reads and worker shutdown run outside it,
//! so a slow game never stalls the others.
//!
//! # Design
//!
//! ```text
//! SessionRegistry
//! ├── slots: GameId -> Slot { OnceCell<LiveSession { handle, worker }> }
//! ├── repository: restore source for games not live in memory
//! └── context: channels shared with every session worker, taken on shutdown
//! ```
//!
//! Completed sessions linger for a while so late commands get a proper
//! rejection, then the reaper removes them. A removed game can be brought
//! back from its last snapshot by [`SessionRegistry::get`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chess_core::{GameConfig, GameId, GameRecord, GameSession, Participant};

use super::{Result, RuntimeError, SessionHandle};
use crate::repository::GameRepository;
use crate::retry::{RetryPolicy, retry};
use crate::time::TimeSource;
use crate::workers::{Command, SessionContext, SessionWorker};

/// Everything needed to open a new game.
#[derive(Clone, Debug)]
pub struct GameSetup {
    pub game_id: GameId,
    pub white: Participant,
    /// When present the game starts active; otherwise it waits for
    /// [`SessionHandle::activate`].
    pub black: Option<Participant>,
    /// Falls back to the runtime's game configuration.
    pub config: Option<GameConfig>,
}

impl GameSetup {
    pub fn new(game_id: GameId, white: Participant) -> Self {
        Self {
            game_id,
            white,
            black: None,
            config: None,
        }
    }

    pub fn with_black(mut self, black: Participant) -> Self {
        self.black = Some(black);
        self
    }

    pub fn with_config(mut self, config: GameConfig) -> Self {
        self.config = Some(config);
        self
    }
}

struct LiveSession {
    handle: SessionHandle,
    /// Taken by whoever stops the worker.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LiveSession {
    fn abort(&self) {
        if let Ok(mut worker) = self.worker.try_lock() {
            if let Some(worker) = worker.take() {
                worker.abort();
            }
        }
    }
}

/// One game's place in the registry. Filled at most once; a failed restore
/// or creation leaves it empty for the next caller to retry.
#[derive(Default)]
struct Slot {
    session: OnceCell<LiveSession>,
}

impl Slot {
    fn live(&self) -> Option<SessionHandle> {
        self.session
            .get()
            .filter(|live| live.handle.is_live())
            .map(|live| live.handle.clone())
    }

    /// Initialised, but its worker has exited.
    fn is_stale(&self) -> bool {
        self.session.get().is_some_and(|live| !live.handle.is_live())
    }
}

struct Inner {
    slots: Mutex<HashMap<GameId, Arc<Slot>>>,
    /// `None` once shutdown has begun, so no new worker can hold the
    /// shared channels open.
    context: RwLock<Option<SessionContext>>,
    repository: Arc<dyn GameRepository>,
    time: Arc<dyn TimeSource>,
    retry: RetryPolicy,
    defaults: GameConfig,
    command_buffer_size: usize,
    command_timeout: Duration,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub(crate) fn new(
        context: SessionContext,
        defaults: GameConfig,
        command_buffer_size: usize,
        command_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                repository: Arc::clone(&context.repository),
                time: Arc::clone(&context.time),
                retry: context.retry.clone(),
                context: RwLock::new(Some(context)),
                defaults,
                command_buffer_size: command_buffer_size.max(1),
                command_timeout,
            }),
        }
    }

    /// Create the session for a new game.
    ///
    /// Fails with [`RuntimeError::ConcurrencyViolation`] if the game is live
    /// or already persisted; the existing instance wins.
    pub async fn open(&self, setup: GameSetup) -> Result<SessionHandle> {
        let game_id = setup.game_id;
        let created = AtomicBool::new(false);
        let handle = self
            .resolve(game_id, || self.create_new(setup, &created))
            .await?;
        if !created.load(Ordering::Acquire) {
            warn!(target: "runtime::registry", game_id = %game_id, "duplicate session rejected");
            return Err(RuntimeError::ConcurrencyViolation { game_id });
        }
        Ok(handle)
    }

    /// Live session for the game, restoring it from the repository or
    /// creating it from `setup` as needed.
    pub async fn get_or_create(&self, setup: GameSetup) -> Result<SessionHandle> {
        let game_id = setup.game_id;
        self.resolve(game_id, || self.restore_or_create(setup))
            .await
    }

    /// Live session for an existing game, restored from its last snapshot
    /// if it is not in memory.
    pub async fn get(&self, game_id: GameId) -> Result<SessionHandle> {
        self.resolve(game_id, || self.restore_existing(game_id))
            .await
    }

    /// Live session if this process currently hosts the game.
    pub async fn get_live(&self, game_id: GameId) -> Option<SessionHandle> {
        let slots = self.inner.slots.lock().await;
        slots.get(&game_id).and_then(|slot| slot.live())
    }

    /// Stop the game's worker after it persists its record. Returns whether
    /// the game was live.
    ///
    /// The slot stays registered while the worker flushes, so a concurrent
    /// look-up cannot restore an older snapshot in the meantime.
    pub async fn remove(&self, game_id: GameId) -> Result<bool> {
        let slot = {
            let slots = self.inner.slots.lock().await;
            match slots.get(&game_id) {
                Some(slot) if slot.session.initialized() => Arc::clone(slot),
                _ => return Ok(false),
            }
        };
        let Some(live) = slot.session.get() else {
            return Ok(false);
        };
        let stopped = self.stop(game_id, live).await;
        self.forget(game_id, &slot).await;
        stopped?;
        info!(target: "runtime::registry", game_id = %game_id, "session removed");
        Ok(true)
    }

    pub async fn live_count(&self) -> usize {
        let slots = self.inner.slots.lock().await;
        slots.values().filter(|slot| slot.live().is_some()).count()
    }

    pub async fn live_games(&self) -> Vec<GameId> {
        let slots = self.inner.slots.lock().await;
        let mut games: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| slot.live().is_some())
            .map(|(game_id, _)| *game_id)
            .collect();
        games.sort();
        games
    }

    /// Stop every worker and refuse new ones.
    ///
    /// Dropping the shared context here lets the background workers drain
    /// even while clones of the registry or session handles are still held.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.context.write().await.take();
        let slots: Vec<_> = self.inner.slots.lock().await.drain().collect();
        let mut first_error = None;
        for (game_id, slot) in slots {
            // Waits out an in-flight restore; an empty slot stays empty.
            let live = slot
                .session
                .get_or_try_init(|| async { Err(RuntimeError::ShuttingDown) })
                .await;
            let Ok(live) = live else {
                continue;
            };
            if let Err(error) = self.stop(game_id, live).await {
                warn!(target: "runtime::registry", game_id = %game_id, error = %error, "session did not stop cleanly");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Remove completed games once `linger` has passed.
    pub(crate) async fn reap(self, mut completed_rx: mpsc::UnboundedReceiver<GameId>, linger: Duration) {
        let mut pending = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                game_id = completed_rx.recv() => match game_id {
                    Some(game_id) => {
                        let registry = self.clone();
                        pending.spawn(async move {
                            tokio::time::sleep(linger).await;
                            if let Err(error) = registry.remove(game_id).await {
                                warn!(target: "runtime::registry", game_id = %game_id, error = %error, "reaping failed");
                            }
                        });
                    }
                    None => break,
                },
                Some(_) = pending.join_next(), if !pending.is_empty() => {}
            }
        }
        pending.abort_all();
    }

    /// Initialise the game's slot with `init` unless another caller already
    /// did, and hand out its handle.
    async fn resolve<F, Fut>(&self, game_id: GameId, init: F) -> Result<SessionHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LiveSession>>,
    {
        let slot = self.slot(game_id).await;
        let result = slot
            .session
            .get_or_try_init(init)
            .await
            .map(|live| live.handle.clone());
        if result.is_err() {
            self.discard_empty(game_id, &slot).await;
        }
        result
    }

    /// Slot for the game, replacing one whose worker has exited.
    async fn slot(&self, game_id: GameId) -> Arc<Slot> {
        let mut slots = self.inner.slots.lock().await;
        if let Some(slot) = slots.get(&game_id) {
            if !slot.is_stale() {
                return Arc::clone(slot);
            }
            if let Some(stale) = slots.remove(&game_id) {
                if let Some(live) = stale.session.get() {
                    live.abort();
                }
            }
        }
        Arc::clone(slots.entry(game_id).or_default())
    }

    /// Drop a slot nobody managed to fill and nobody else is waiting on.
    async fn discard_empty(&self, game_id: GameId, slot: &Arc<Slot>) {
        let mut slots = self.inner.slots.lock().await;
        let unused = slots.get(&game_id).is_some_and(|current| {
            Arc::ptr_eq(current, slot)
                && !slot.session.initialized()
                && Arc::strong_count(slot) == 2
        });
        if unused {
            slots.remove(&game_id);
        }
    }

    /// Unregister a slot that was stopped, unless it was already replaced.
    async fn forget(&self, game_id: GameId, slot: &Arc<Slot>) {
        let mut slots = self.inner.slots.lock().await;
        if slots
            .get(&game_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(&game_id);
        }
    }

    async fn create_new(&self, setup: GameSetup, created: &AtomicBool) -> Result<LiveSession> {
        if self.load_game(setup.game_id).await?.is_some() {
            return Err(RuntimeError::ConcurrencyViolation {
                game_id: setup.game_id,
            });
        }
        let live = self.create(setup).await?;
        created.store(true, Ordering::Release);
        Ok(live)
    }

    async fn restore_or_create(&self, setup: GameSetup) -> Result<LiveSession> {
        match self.load_game(setup.game_id).await? {
            Some(record) => self.restore(record).await,
            None => self.create(setup).await,
        }
    }

    async fn restore_existing(&self, game_id: GameId) -> Result<LiveSession> {
        match self.load_game(game_id).await? {
            Some(record) => self.restore(record).await,
            None => Err(RuntimeError::UnknownGame(game_id)),
        }
    }

    async fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>> {
        let repository = Arc::clone(&self.inner.repository);
        retry(&self.inner.retry, "load_game", || {
            let repository = Arc::clone(&repository);
            async move { repository.load_game(game_id).await }
        })
        .await
        .map_err(|exhausted| RuntimeError::PersistenceExhausted {
            game_id,
            operation: "load_game",
            message: exhausted.to_string(),
        })
    }

    /// Whether the outcome of a completed game is already stored.
    async fn terminal_stored(&self, game_id: GameId) -> bool {
        let repository = Arc::clone(&self.inner.repository);
        let stored = retry(&self.inner.retry, "load_terminal", || {
            let repository = Arc::clone(&repository);
            async move { repository.load_terminal(game_id).await }
        })
        .await;
        match stored {
            Ok(stored) => stored.is_some(),
            Err(error) => {
                warn!(target: "runtime::registry", game_id = %game_id, error = %error, "terminal record lookup failed");
                false
            }
        }
    }

    async fn context(&self) -> Result<SessionContext> {
        self.inner
            .context
            .read()
            .await
            .clone()
            .ok_or(RuntimeError::ShuttingDown)
    }

    async fn create(&self, setup: GameSetup) -> Result<LiveSession> {
        let context = self.context().await?;
        let now = self.inner.time.now();
        let config = setup
            .config
            .unwrap_or_else(|| self.inner.defaults.clone());
        let session = match setup.black {
            Some(black) => GameSession::started(setup.game_id, setup.white, black, config, now),
            None => GameSession::new(setup.game_id, setup.white, config, now),
        };
        info!(
            target: "runtime::registry",
            game_id = %setup.game_id,
            status = session.status().as_str(),
            "session created"
        );
        let _ = context.checkpoints.send(session.to_record());
        Ok(self.spawn(context, session, false))
    }

    async fn restore(&self, record: GameRecord) -> Result<LiveSession> {
        let game_id = record.game_id;
        let session = GameSession::from_record(record)
            .map_err(|source| RuntimeError::Restore { game_id, source })?;
        let terminal_stored = session.is_completed() && self.terminal_stored(game_id).await;
        let context = self.context().await?;
        info!(
            target: "runtime::registry",
            game_id = %game_id,
            status = session.status().as_str(),
            ply = session.plies(),
            terminal_stored,
            "session restored"
        );
        Ok(self.spawn(context, session, terminal_stored))
    }

    fn spawn(&self, context: SessionContext, session: GameSession, terminal_stored: bool) -> LiveSession {
        let game_id = session.game_id();
        let (command_tx, command_rx) = mpsc::channel(self.inner.command_buffer_size);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(self.inner.time.now()));
        let worker = SessionWorker::new(session, command_rx, snapshot_tx, context, terminal_stored);
        let worker = tokio::spawn(worker.run());
        LiveSession {
            handle: SessionHandle::new(game_id, command_tx, snapshot_rx, self.inner.command_timeout),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Longest a worker may spend on its final flush before it is aborted.
    fn stop_bound(&self) -> Duration {
        let policy = &self.inner.retry;
        policy
            .timeout
            .saturating_add(policy.max_delay)
            .saturating_mul(policy.max_attempts.max(1))
            .saturating_add(self.inner.command_timeout)
    }

    async fn stop(&self, game_id: GameId, live: &LiveSession) -> Result<()> {
        let bound = self.stop_bound();
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut acknowledged = true;
        if live
            .handle
            .command_sender()
            .send_timeout(Command::Shutdown { reply: reply_tx }, self.inner.command_timeout)
            .await
            .is_ok()
        {
            // The worker flushes with retries before replying.
            match tokio::time::timeout(bound, reply_rx).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    debug!(target: "runtime::registry", game_id = %game_id, "worker exited before acknowledging");
                }
                Err(_) => acknowledged = false,
            }
        }
        let Some(mut worker) = live.worker.lock().await.take() else {
            return Ok(());
        };
        if acknowledged {
            if let Ok(joined) = tokio::time::timeout(self.inner.command_timeout, &mut worker).await {
                return joined.map_err(RuntimeError::WorkerJoin);
            }
        }
        warn!(target: "runtime::registry", game_id = %game_id, after = ?bound, "worker did not stop in time, aborting");
        worker.abort();
        Err(RuntimeError::CommandTimeout { game_id, after: bound })
    }
}
