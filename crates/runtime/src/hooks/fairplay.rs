//! Publishes the think-time report of a finished game.

use async_trait::async_trait;

use chess_core::{FairPlayPolicy, TerminalRecord, fairplay};

use super::{HookError, TerminalHook};
use crate::events::{Event, EventBus, OutcomeEvent};

/// Advisory only: the report never changes the outcome or delays settlement.
pub struct FairPlayHook {
    policy: FairPlayPolicy,
    event_bus: EventBus,
}

impl FairPlayHook {
    pub fn new(policy: FairPlayPolicy, event_bus: EventBus) -> Self {
        Self { policy, event_bus }
    }
}

#[async_trait]
impl TerminalHook for FairPlayHook {
    fn name(&self) -> &'static str {
        "fair_play"
    }

    async fn on_terminal(
        &self,
        record: &TerminalRecord,
        first_write: bool,
    ) -> Result<(), HookError> {
        if !first_write {
            return Ok(());
        }
        let report = fairplay::analyze_game(&self.policy, record);
        if report.max_risk() > chess_core::Risk::Low {
            tracing::warn!(
                target: "runtime::fairplay",
                game_id = %record.game_id,
                white_risk = ?report.white.risk,
                black_risk = ?report.black.risk,
                "think-time pattern flagged for review"
            );
        }
        self.event_bus.publish(Event::Outcome(OutcomeEvent::FairPlay {
            game_id: record.game_id,
            report,
        }));
        Ok(())
    }
}
