//! High-level runtime orchestrator.
//!
//! The runtime owns the background workers, wires up the channels between
//! them, and exposes a builder-based API for hosts that accept client
//! connections.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chess_core::{FairPlayPolicy, GameConfig, GameId, ParticipantId};

use crate::api::{
    ChannelTransport, ClientMessage, CommandReply, ConnectionId, GameSetup, Operation, Result,
    RuntimeError, ServerMessage, SessionHandle, SessionRegistry, Transport,
};
use crate::events::{Event, EventBus, Topic};
use crate::hooks::{FairPlayHook, HookRegistry, TerminalHook};
use crate::repository::{GameRepository, InMemoryRepository};
use crate::retry::RetryPolicy;
use crate::time::{TimeSource, WallClock};
use crate::workers::{
    CheckpointWorker, Dispatcher, OutcomeNotifier, Outbound, SessionContext,
};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Rules for games opened without their own configuration.
    pub game: GameConfig,
    /// Bounded inbox of each session worker.
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
    /// Timed snapshot of every session that changed since the last one.
    pub checkpoint_interval: Duration,
    /// Bound on queueing a command and on waiting for its reply.
    pub command_timeout: Duration,
    /// How long a completed session stays live before it is removed.
    pub completed_linger: Duration,
    pub retry: RetryPolicy,
    /// Root of the file repository.
    pub data_dir: PathBuf,
    pub fair_play: FairPlayPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            command_buffer_size: 32,
            event_buffer_size: 256,
            checkpoint_interval: Duration::from_secs(30),
            command_timeout: Duration::from_secs(5),
            completed_linger: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            data_dir: default_data_dir(),
            fair_play: FairPlayPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables (missing or unparsable values keep the default):
    /// - `CHESS_BASE_TIME_MS` - Starting time per side (default: 600000)
    /// - `CHESS_INCREMENT_MS` - Increment per move (default: 0)
    /// - `CHESS_ABANDONMENT_WINDOW_MS` - Inactivity before abandonment (default: 24h)
    /// - `CHESS_CHECKPOINT_EVERY_PLIES` - Plies between checkpoints (default: 10)
    /// - `RUNTIME_COMMAND_BUFFER` - Session inbox size (default: 32)
    /// - `RUNTIME_EVENT_BUFFER` - Event bus capacity per topic (default: 256)
    /// - `RUNTIME_CHECKPOINT_INTERVAL_MS` - Timed checkpoint period (default: 30000)
    /// - `RUNTIME_COMMAND_TIMEOUT_MS` - Command send/reply bound (default: 5000)
    /// - `RUNTIME_COMPLETED_LINGER_MS` - Completed session lifetime (default: 60000)
    /// - `RUNTIME_RETRY_MAX_ATTEMPTS` - Persistence attempts (default: 5)
    /// - `RUNTIME_RETRY_TIMEOUT_MS` - Per-attempt timeout (default: 5000)
    /// - `RUNTIME_DATA_DIR` - File repository root (default: platform data dir)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>("CHESS_BASE_TIME_MS") {
            config.game.base_time_ms = ms.max(1);
        }
        if let Some(ms) = read_env::<u64>("CHESS_INCREMENT_MS") {
            config.game.increment_ms = ms;
        }
        if let Some(ms) = read_env::<u64>("CHESS_ABANDONMENT_WINDOW_MS") {
            config.game.abandonment_window_ms = ms;
        }
        if let Some(plies) = read_env::<u32>("CHESS_CHECKPOINT_EVERY_PLIES") {
            config.game.checkpoint_every_plies = plies.max(1);
        }

        if let Some(size) = read_env::<usize>("RUNTIME_COMMAND_BUFFER") {
            config.command_buffer_size = size.max(1);
        }
        if let Some(size) = read_env::<usize>("RUNTIME_EVENT_BUFFER") {
            config.event_buffer_size = size.max(1);
        }
        if let Some(ms) = read_env::<u64>("RUNTIME_CHECKPOINT_INTERVAL_MS") {
            config.checkpoint_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = read_env::<u64>("RUNTIME_COMMAND_TIMEOUT_MS") {
            config.command_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = read_env::<u64>("RUNTIME_COMPLETED_LINGER_MS") {
            config.completed_linger = Duration::from_millis(ms);
        }
        if let Some(attempts) = read_env::<u32>("RUNTIME_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = read_env::<u64>("RUNTIME_RETRY_TIMEOUT_MS") {
            config.retry.timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(dir) = read_env::<PathBuf>("RUNTIME_DATA_DIR") {
            config.data_dir = dir;
        }

        config
    }
}

/// Platform data directory, e.g. `~/.local/share/chess-arbiter` on Linux.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "chess-arbiter")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

pub(crate) fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "runtime::config", key, value = %raw, "ignoring unparsable value");
            None
        }
    }
}

struct Workers {
    checkpoint: JoinHandle<()>,
    notifier: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

/// Main runtime hosting every live game of this process.
///
/// [`SessionHandle`]s obtained from the runtime are cloneable façades for
/// one game each.
pub struct Runtime {
    config: RuntimeConfig,
    registry: SessionRegistry,
    event_bus: EventBus,
    repository: Arc<dyn GameRepository>,
    outbox: mpsc::UnboundedSender<Outbound>,
    workers: Workers,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn repository(&self) -> Arc<dyn GameRepository> {
        Arc::clone(&self.repository)
    }

    /// Subscribe to events from a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Open a new game. See [`SessionRegistry::open`].
    pub async fn open_game(&self, setup: GameSetup) -> Result<SessionHandle> {
        self.registry.open(setup).await
    }

    /// Session of an existing game, restoring it if needed.
    pub async fn session(&self, game_id: GameId) -> Result<SessionHandle> {
        self.registry.get(game_id).await
    }

    /// Route one inbound client message.
    ///
    /// [`ClientMessage::Sync`] attaches the connection and delivers a full
    /// snapshot. Every other message runs as an operation whose result is
    /// sent back to `connection` before any broadcast it causes.
    pub async fn dispatch(
        &self,
        connection: ConnectionId,
        game_id: GameId,
        participant: ParticipantId,
        message: ClientMessage,
    ) -> Result<CommandReply> {
        debug!(
            target: "runtime::dispatch",
            game_id = %game_id,
            connection = %connection,
            message = message.as_str(),
            "client message"
        );
        let handle = match self.registry.get(game_id).await {
            Ok(handle) => handle,
            Err(error) => {
                self.send_error(&connection, &error);
                return Err(error);
            }
        };

        let result = match Operation::from_message(message) {
            None => handle.connect(participant, connection.clone()).await,
            Some(operation) => {
                handle
                    .apply(participant, Some(connection.clone()), operation)
                    .await
            }
        };
        if let Err(error) = &result {
            self.send_error(&connection, error);
        }
        result
    }

    /// Detach a connection from a game's broadcasts.
    pub async fn disconnect(&self, connection: ConnectionId, game_id: GameId) -> Result<()> {
        match self.registry.get_live(game_id).await {
            Some(handle) => handle.disconnect(connection).await,
            None => Ok(()),
        }
    }

    /// Stop every session, flush snapshots and terminal records, then stop
    /// the workers.
    pub async fn shutdown(self) -> Result<()> {
        let Runtime {
            registry,
            outbox,
            workers,
            ..
        } = self;

        workers.reaper.abort();
        let _ = workers.reaper.await;
        let stopped = registry.shutdown().await;
        drop(registry);
        drop(outbox);

        workers.checkpoint.await.map_err(RuntimeError::WorkerJoin)?;
        workers.notifier.await.map_err(RuntimeError::WorkerJoin)?;
        workers.dispatcher.await.map_err(RuntimeError::WorkerJoin)?;
        info!(target: "runtime", "runtime stopped");
        stopped
    }

    fn send_error(&self, connection: &ConnectionId, error: &RuntimeError) {
        let _ = self.outbox.send(Outbound {
            connection: connection.clone(),
            message: ServerMessage::Error {
                message: error.to_string(),
            },
        });
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    repository: Option<Arc<dyn GameRepository>>,
    transport: Option<Arc<dyn Transport>>,
    event_bus: Option<EventBus>,
    time: Option<Arc<dyn TimeSource>>,
    hooks: HookRegistry,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            repository: None,
            transport: None,
            event_bus: None,
            time: None,
            hooks: HookRegistry::new(),
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable storage. Defaults to an in-memory repository.
    pub fn repository(mut self, repository: Arc<dyn GameRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Outbound message sink. Defaults to a [`ChannelTransport`] with no
    /// connections.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an event bus created earlier, e.g. with the settlement
    /// coordinator.
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Time source for sessions. Defaults to [`WallClock`].
    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Add a terminal hook. Hooks run after the built-in fair-play hook, in
    /// the order they were added.
    pub fn hook(mut self, hook: Arc<dyn TerminalHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Build the runtime and start its workers.
    pub async fn build(self) -> Result<Runtime> {
        let config = self.config;
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::with_capacity(config.event_buffer_size));
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryRepository::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ChannelTransport::new()));
        let time = self.time.unwrap_or_else(|| Arc::new(WallClock));

        let mut hooks = HookRegistry::new().with(Arc::new(FairPlayHook::new(
            config.fair_play,
            event_bus.clone(),
        )));
        for hook in self.hooks.into_hooks() {
            hooks.push(hook);
        }

        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let (checkpoint_tx, checkpoint_rx) = mpsc::unbounded_channel();
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let checkpoint = tokio::spawn(
            CheckpointWorker::new(Arc::clone(&repository), config.retry.clone(), checkpoint_rx)
                .run(),
        );
        let notifier = tokio::spawn(
            OutcomeNotifier::new(
                Arc::clone(&repository),
                config.retry.clone(),
                event_bus.clone(),
                hooks,
            )
            .run(terminal_rx),
        );
        let dispatcher = tokio::spawn(Dispatcher::new(transport, outbox_rx).run());

        let context = SessionContext {
            time,
            event_bus: event_bus.clone(),
            repository: Arc::clone(&repository),
            retry: config.retry.clone(),
            checkpoint_interval: config.checkpoint_interval,
            outbox: outbox_tx.clone(),
            checkpoints: checkpoint_tx,
            terminals: terminal_tx,
            completed: completed_tx,
        };
        let registry = SessionRegistry::new(
            context,
            config.game.clone(),
            config.command_buffer_size,
            config.command_timeout,
        );
        let reaper = tokio::spawn(registry.clone().reap(completed_rx, config.completed_linger));

        info!(
            target: "runtime",
            command_buffer = config.command_buffer_size,
            checkpoint_interval_ms = config.checkpoint_interval.as_millis() as u64,
            "runtime started"
        );

        Ok(Runtime {
            config,
            registry,
            event_bus,
            repository,
            outbox: outbox_tx,
            workers: Workers {
                checkpoint,
                notifier,
                dispatcher,
                reaper,
            },
        })
    }
}
