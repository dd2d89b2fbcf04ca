//! Terminal classification of a game.

use crate::chess::TerminalStatus;
use crate::types::Color;

/// How a completed game ended, from the settlement contract's point of view.
///
/// `WhiteTimeout` means white won on time (black's flag fell), and
/// `BlackTimeout` means black won on time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
    WhiteTimeout,
    BlackTimeout,
    Abandoned { beneficiary: Color },
}

impl Outcome {
    /// Decisive win for `winner`.
    pub const fn win_for(winner: Color) -> Self {
        match winner {
            Color::White => Outcome::WhiteWins,
            Color::Black => Outcome::BlackWins,
        }
    }

    /// Win on time for the opponent of `flagged`.
    pub const fn timeout_against(flagged: Color) -> Self {
        match flagged {
            Color::White => Outcome::BlackTimeout,
            Color::Black => Outcome::WhiteTimeout,
        }
    }

    /// Side that receives the stake, `None` for a draw.
    pub const fn winner(&self) -> Option<Color> {
        match self {
            Outcome::WhiteWins | Outcome::WhiteTimeout => Some(Color::White),
            Outcome::BlackWins | Outcome::BlackTimeout => Some(Color::Black),
            Outcome::Abandoned { beneficiary } => Some(*beneficiary),
            Outcome::Draw => None,
        }
    }

    pub const fn is_draw(&self) -> bool {
        matches!(self, Outcome::Draw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::WhiteWins => "white_wins",
            Outcome::BlackWins => "black_wins",
            Outcome::Draw => "draw",
            Outcome::WhiteTimeout => "white_timeout",
            Outcome::BlackTimeout => "black_timeout",
            Outcome::Abandoned { .. } => "abandoned",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Abandoned { beneficiary } => write!(f, "abandoned({beneficiary})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What caused the terminal transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMove,
    ThreefoldRepetition,
    Resignation,
    Agreement,
    FlagFall,
    Abandonment,
}

impl EndReason {
    /// Reason for a board-detected terminal status; `None` if the game goes on.
    pub const fn from_status(status: TerminalStatus) -> Option<Self> {
        match status {
            TerminalStatus::None => None,
            TerminalStatus::Checkmate => Some(EndReason::Checkmate),
            TerminalStatus::Stalemate => Some(EndReason::Stalemate),
            TerminalStatus::InsufficientMaterial => Some(EndReason::InsufficientMaterial),
            TerminalStatus::FiftyMove => Some(EndReason::FiftyMove),
            TerminalStatus::ThreefoldRepetition => Some(EndReason::ThreefoldRepetition),
        }
    }
}
