//! Public runtime API surface.
//!
//! This module gathers the types exposed to consumers of the runtime crate so
//! other layers can stay focused on orchestration, workers, or infrastructure.

pub mod errors;
pub mod handle;
pub mod registry;
pub mod transport;

pub use errors::{Result, RuntimeError};
pub use handle::{CommandReply, Operation, SessionHandle};
pub use registry::{GameSetup, SessionRegistry};
pub use transport::{
    ChannelTransport, ClientMessage, ConnectionId, ServerMessage, Transport, TransportError,
};
