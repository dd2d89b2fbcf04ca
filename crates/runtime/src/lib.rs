//! Runtime orchestration for authoritative chess sessions.
//!
//! This crate wraps the pure [`chess_core::GameSession`] in a single-writer
//! worker per game and wires it to persistence, transport and the event bus.
//! Hosts embed [`Runtime`], feed it inbound [`ClientMessage`]s, and implement
//! [`Transport`] to receive the [`ServerMessage`]s it pushes back.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`hooks`] runs follow-up work once a terminal record is stored
//! - [`repository`] provides the persistence contracts and adapters
//! - [`retry`] bounds every wait on persistence or signing
//! - `workers` keeps background tasks internal to the crate
pub mod api;
pub mod events;
pub mod hooks;
pub mod repository;
pub mod retry;
pub mod runtime;
pub mod time;

mod workers;

pub use api::{
    ChannelTransport, ClientMessage, CommandReply, ConnectionId, GameSetup, Operation, Result,
    RuntimeError, ServerMessage, SessionHandle, SessionRegistry, Transport, TransportError,
};
pub use events::{Event, EventBus, OutcomeEvent, SessionNotice, SettlementEvent, Topic};
pub use hooks::{FairPlayHook, HookError, HookRegistry, TerminalHook};
pub use repository::{
    FileRepository, GameRepository, InMemoryRepository, RepositoryError, SignatureRepository,
    SignatureWrite, TerminalWrite,
};
pub use retry::{AttemptError, RetryExhausted, RetryPolicy, retry};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig, default_data_dir};
pub use time::{ManualClock, TimeSource, WallClock};
