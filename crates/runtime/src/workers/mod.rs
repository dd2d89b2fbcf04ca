//! Background workers owned by the runtime.
//!
//! - [`SessionWorker`]: single writer for one game, one task per live game
//! - [`CheckpointWorker`]: coalesces and persists game snapshots
//! - [`OutcomeNotifier`]: stores terminal records and runs terminal hooks
//! - [`Dispatcher`]: ordered delivery of server messages to connections

mod checkpoint;
mod dispatcher;
mod notifier;
mod session;

pub(crate) use checkpoint::CheckpointWorker;
pub(crate) use dispatcher::{Dispatcher, Outbound};
pub(crate) use notifier::OutcomeNotifier;
pub(crate) use session::{Command, SessionContext, SessionWorker};
