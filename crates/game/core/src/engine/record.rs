//! Plain data carried out of a session: checkpoints, terminal records, and
//! the read-only snapshot delivered on reconnect.

use crate::chess::Position;
use crate::clock::{Clock, RemainingTime};
use crate::config::GameConfig;
use crate::outcome::{EndReason, Outcome};
use crate::types::{Color, GameId, Participant, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

/// A move accepted into the authoritative history.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommittedMove {
    /// 1-based ply number.
    pub ply: u32,
    pub color: Color,
    pub uci: String,
    /// Time the mover's clock ran before this move was committed.
    pub think_time_ms: u64,
    pub committed_at: Timestamp,
}

/// Full durable state of one game, sufficient to resume play.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameRecord {
    pub game_id: GameId,
    pub config: GameConfig,
    pub white: Participant,
    pub black: Option<Participant>,
    pub status: SessionStatus,
    pub position: Position,
    pub clock: Clock,
    pub moves: Vec<CommittedMove>,
    /// Draw agreement per side, indexed white then black.
    pub draw_agreed: [bool; 2],
    /// Last connection activity per side, indexed white then black.
    pub last_seen: [Option<Timestamp>; 2],
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
    pub result: Option<GameResult>,
    /// Bumped on every accepted mutation.
    pub version: u64,
}

impl GameRecord {
    /// Number of committed plies.
    pub fn plies(&self) -> u32 {
        self.moves.len() as u32
    }
}

/// Final decision of a completed game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameResult {
    pub outcome: Outcome,
    pub reason: EndReason,
    pub completed_at: Timestamp,
}

/// Immutable record of a finished game, written exactly once per game.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TerminalRecord {
    pub game_id: GameId,
    pub outcome: Outcome,
    pub reason: EndReason,
    pub white: Participant,
    pub black: Participant,
    pub final_fen: String,
    pub moves: Vec<CommittedMove>,
    pub completed_at: Timestamp,
}

impl TerminalRecord {
    pub fn plies(&self) -> u32 {
        self.moves.len() as u32
    }

    /// Participant seated as `color`.
    pub fn participant(&self, color: Color) -> &Participant {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// Think times of every committed move, in order.
    pub fn think_times(&self) -> Vec<u64> {
        self.moves.iter().map(|m| m.think_time_ms).collect()
    }

    /// Think times of one side's moves, in order.
    pub fn think_times_of(&self, color: Color) -> Vec<u64> {
        self.moves
            .iter()
            .filter(|m| m.color == color)
            .map(|m| m.think_time_ms)
            .collect()
    }
}

/// Consistent read-only view of a session at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    pub game_id: GameId,
    pub status: SessionStatus,
    pub fen: String,
    pub turn: Color,
    /// Plies committed so far; the next move must carry `ply + 1`.
    pub ply: u32,
    pub clock: RemainingTime,
    pub running: Option<Color>,
    pub last_move: Option<String>,
    pub draw_offered_by: Option<Color>,
    pub result: Option<GameResult>,
    pub version: u64,
    pub taken_at: Timestamp,
}
