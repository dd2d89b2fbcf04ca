use crate::clock::RemainingTime;
use crate::engine::{GameResult, Rejection};
use crate::types::Color;

/// Something both participants must be told about.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum SessionEvent {
    Activated {
        fen: String,
        clock: RemainingTime,
    },
    MoveCommitted {
        ply: u32,
        color: Color,
        uci: String,
        fen: String,
        clock: RemainingTime,
    },
    DrawOffered {
        by: Color,
    },
    DrawDeclined {
        by: Color,
    },
    Chat {
        from: Color,
        text: String,
    },
    Terminal {
        result: GameResult,
        final_fen: String,
        plies: u32,
    },
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::Activated { .. } => "activated",
            SessionEvent::MoveCommitted { .. } => "move_committed",
            SessionEvent::DrawOffered { .. } => "draw_offered",
            SessionEvent::DrawDeclined { .. } => "draw_declined",
            SessionEvent::Chat { .. } => "chat",
            SessionEvent::Terminal { .. } => "terminal",
        }
    }
}

/// Result of one session operation.
///
/// A step can carry both a rejection and events: a move refused because the
/// mover's flag fell still produces the terminal event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Step {
    pub rejection: Option<Rejection>,
    pub events: Vec<SessionEvent>,
}

impl Step {
    pub(crate) fn accepted(events: Vec<SessionEvent>) -> Self {
        Self {
            rejection: None,
            events,
        }
    }

    pub(crate) fn rejected(rejection: Rejection) -> Self {
        Self {
            rejection: Some(rejection),
            events: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }

    /// The terminal result, if this step completed the game.
    pub fn terminal(&self) -> Option<&GameResult> {
        self.events.iter().find_map(|event| match event {
            SessionEvent::Terminal { result, .. } => Some(result),
            _ => None,
        })
    }

    pub fn into_result(self) -> Result<Vec<SessionEvent>, Rejection> {
        match self.rejection {
            Some(rejection) => Err(rejection),
            None => Ok(self.events),
        }
    }
}
