//! Board rules: squares and moves, immutable positions, and the validator.

mod moves;
mod position;
mod validator;

pub use moves::{Move, MoveParseError, Promotion, Square};
pub use position::{Position, PositionError, PositionRecord};
pub use validator::{RejectReason, TerminalStatus, apply, terminal_status};
