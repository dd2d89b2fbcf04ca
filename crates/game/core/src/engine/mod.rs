//! Game session state machine.
//!
//! [`GameSession`] is the authoritative aggregate for one game: position,
//! clock, committed history and status. It is a plain value with no locking
//! of its own; the runtime gives each session a single owning task so that
//! operations on one game are applied strictly one at a time.
//!
//! States move `pending → active → completed`, and nothing leaves
//! `completed`.

mod errors;
mod events;
mod record;
mod session;

pub use errors::Rejection;
pub use events::{SessionEvent, Step};
pub use record::{
    CommittedMove, GameRecord, GameResult, SessionSnapshot, SessionStatus, TerminalRecord,
};
pub use session::{ACTIVITY_RESOLUTION_MS, GameSession, MAX_CHAT_CHARS, RestoreError};
