//! Deterministic chess rules and wager settlement types.
//!
//! `chess-core` defines the canonical domain (positions, moves, clocks, the
//! game session state machine, settlement payload encoding) as pure APIs
//! that the runtime and offline tools both build on. Nothing in this crate
//! performs I/O or reads the wall clock; every time-dependent operation
//! takes `now` from the caller.
pub mod chess;
pub mod clock;
pub mod config;
pub mod engine;
pub mod fairplay;
pub mod outcome;
pub mod settlement;
pub mod types;

pub use chess::{
    Move, MoveParseError, Position, PositionError, PositionRecord, Promotion, RejectReason,
    Square, TerminalStatus,
};
pub use clock::{Clock, RemainingTime};
pub use config::GameConfig;
pub use engine::{
    CommittedMove, GameRecord, GameResult, GameSession, Rejection, RestoreError, SessionEvent,
    SessionSnapshot, SessionStatus, Step, TerminalRecord,
};
pub use fairplay::{FairPlayPolicy, FairPlayReport, GameFairPlay, Risk, Signal};
pub use outcome::{EndReason, Outcome};
pub use settlement::{
    Beneficiary, PayloadHash, RecoverableSignature, SettlementPayload, SignatureRecord,
};
pub use types::{Address, AddressParseError, Color, GameId, Participant, ParticipantId, Timestamp};
