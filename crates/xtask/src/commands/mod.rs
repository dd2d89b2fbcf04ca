//! Command implementations for xtask
//!
//! Each command is a separate module that implements its own CLI args and execution logic.

mod fairplay;
mod judge_address;
mod read_game;
mod verify_signature;

pub use fairplay::FairPlay;
pub use judge_address::JudgeAddress;
pub use read_game::ReadGame;
pub use verify_signature::VerifySignature;
