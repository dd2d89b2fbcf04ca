//! Typed reasons a session refuses an operation.
//!
//! A rejection never mutates the session, with one exception: a lazily
//! detected flag-fall ([`Rejection::Flagged`]) completes the game before the
//! refused operation is reported.

use crate::chess::RejectReason;
use crate::engine::SessionStatus;
use crate::types::Color;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Rejection {
    #[error("requester is not seated in this game")]
    NotAParticipant,

    #[error("game has not started (status {status:?})")]
    NotStarted { status: SessionStatus },

    #[error("game is already completed")]
    GameCompleted,

    #[error("game already has both participants")]
    AlreadyActive,

    #[error("it is not this participant's turn")]
    NotYourTurn,

    #[error("move sequence out of order, expected ply {expected}")]
    SequenceMismatch { expected: u32 },

    #[error("illegal move: {reason}")]
    IllegalMove { reason: RejectReason },

    #[error("{side} ran out of time")]
    Flagged { side: Color },

    #[error("this participant already agreed to a draw")]
    DrawAlreadyOffered,

    #[error("there is no pending draw offer from the opponent")]
    NoDrawOffer,

    #[error("abandonment can only be claimed while the opponent is on move")]
    AbandonmentNotApplicable,

    #[error("opponent has been inactive too briefly, {remaining_ms} ms left")]
    AbandonmentTooEarly { remaining_ms: u64 },

    #[error("chat message is empty")]
    EmptyMessage,

    #[error("chat message exceeds {max} characters")]
    MessageTooLong { max: usize },
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotAParticipant => "not_a_participant",
            Rejection::NotStarted { .. } => "not_started",
            Rejection::GameCompleted => "game_completed",
            Rejection::AlreadyActive => "already_active",
            Rejection::NotYourTurn => "not_your_turn",
            Rejection::SequenceMismatch { .. } => "sequence_mismatch",
            Rejection::IllegalMove { .. } => "illegal_move",
            Rejection::Flagged { .. } => "flagged",
            Rejection::DrawAlreadyOffered => "draw_already_offered",
            Rejection::NoDrawOffer => "no_draw_offer",
            Rejection::AbandonmentNotApplicable => "abandonment_not_applicable",
            Rejection::AbandonmentTooEarly { .. } => "abandonment_too_early",
            Rejection::EmptyMessage => "empty_message",
            Rejection::MessageTooLong { .. } => "message_too_long",
        }
    }

    /// Rejections caused by bad input, as opposed to game timing.
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Rejection::Flagged { .. })
    }
}
