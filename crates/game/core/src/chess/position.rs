//! Immutable board position value.
//!
//! [`Position`] wraps the rules engine's position together with the
//! repetition history accumulated since the last irreversible move, so that
//! threefold repetition can be decided from the value alone. Positions are
//! never mutated in place; the validator produces successors.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position as _};

use crate::types::Color;

/// Errors raised while reconstructing a position from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("repetition history does not end with the current position")]
    InconsistentHistory,
}

/// Serializable form of a [`Position`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionRecord {
    pub fen: String,
    pub history: Vec<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "PositionRecord", into = "PositionRecord")
)]
pub struct Position {
    chess: Chess,
    /// Repetition keys since the last irreversible move, current one last.
    history: Vec<String>,
}

impl Position {
    /// Standard starting position.
    pub fn new() -> Self {
        Self::from_chess(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| PositionError::InvalidFen(format!("{e}")))?;
        let chess: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| PositionError::InvalidFen(format!("{e}")))?;
        Ok(Self::from_chess(chess))
    }

    pub fn from_record(record: PositionRecord) -> Result<Self, PositionError> {
        let mut position = Self::from_fen(&record.fen)?;
        if record.history.is_empty() {
            return Ok(position);
        }
        if record.history.last() != position.history.last() {
            return Err(PositionError::InconsistentHistory);
        }
        position.history = record.history;
        Ok(position)
    }

    pub fn to_record(&self) -> PositionRecord {
        PositionRecord {
            fen: self.fen(),
            history: self.history.clone(),
        }
    }

    fn from_chess(chess: Chess) -> Self {
        let key = repetition_key(&chess);
        Self {
            chess,
            history: vec![key],
        }
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.chess.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Color {
        self.chess.turn().into()
    }

    pub fn is_check(&self) -> bool {
        self.chess.is_check()
    }

    /// Plies since the last capture or pawn move.
    pub fn halfmoves(&self) -> u32 {
        self.chess.halfmoves()
    }

    pub fn fullmoves(&self) -> u32 {
        self.chess.fullmoves().get()
    }

    /// How many times the current position has occurred, including now.
    pub fn repetition_count(&self) -> usize {
        match self.history.last() {
            Some(current) => self.history.iter().filter(|key| *key == current).count(),
            None => 0,
        }
    }

    /// All legal moves in coordinate notation, sorted.
    pub fn legal_moves(&self) -> Vec<String> {
        let mut moves: Vec<String> = self
            .chess
            .legal_moves()
            .iter()
            .map(|m| UciMove::from_move(m, CastlingMode::Standard).to_string())
            .collect();
        moves.sort();
        moves
    }

    pub(crate) fn chess(&self) -> &Chess {
        &self.chess
    }

    /// Successor after a move already known to be legal.
    pub(crate) fn successor(&self, m: &shakmaty::Move) -> Position {
        let mut chess = self.chess.clone();
        chess.play_unchecked(m);
        let key = repetition_key(&chess);
        let history = if chess.halfmoves() == 0 {
            vec![key]
        } else {
            let mut history = self.history.clone();
            history.push(key);
            history
        };
        Position { chess, history }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen() == other.fen() && self.history == other.history
    }
}

impl Eq for Position {}

impl TryFrom<PositionRecord> for Position {
    type Error = PositionError;

    fn try_from(record: PositionRecord) -> Result<Self, Self::Error> {
        Position::from_record(record)
    }
}

impl From<Position> for PositionRecord {
    fn from(position: Position) -> Self {
        position.to_record()
    }
}

/// Placement, side to move, castling rights and en passant square: the FEN
/// fields that decide whether two positions repeat.
fn repetition_key(chess: &Chess) -> String {
    let fen = Fen::from_position(chess.clone(), EnPassantMode::Legal).to_string();
    fen.split(' ').take(4).collect::<Vec<_>>().join(" ")
}
