//! Outcome notifier.
//!
//! Receives the terminal record of every completed game, stores it exactly
//! once, and then runs the terminal hooks (settlement, fair play). The write
//! is retried with backoff. When retries run out the failure is escalated to
//! operators; the in-memory outcome is never rolled back.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use chess_core::TerminalRecord;

use crate::events::{Event, EventBus, OutcomeEvent};
use crate::hooks::HookRegistry;
use crate::repository::{GameRepository, TerminalWrite};
use crate::retry::{RetryPolicy, retry};

#[derive(Clone)]
pub struct OutcomeNotifier {
    repository: Arc<dyn GameRepository>,
    retry: RetryPolicy,
    event_bus: EventBus,
    hooks: HookRegistry,
}

impl OutcomeNotifier {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        retry: RetryPolicy,
        event_bus: EventBus,
        hooks: HookRegistry,
    ) -> Self {
        Self {
            repository,
            retry,
            event_bus,
            hooks,
        }
    }

    /// Handle records as they arrive, each on its own task so one slow
    /// write does not hold up other games. Waits for in-flight records
    /// once the channel closes.
    pub async fn run(self, mut terminal_rx: mpsc::UnboundedReceiver<TerminalRecord>) {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                record = terminal_rx.recv() => match record {
                    Some(record) => {
                        let notifier = self.clone();
                        in_flight.spawn(async move { notifier.on_terminal(record).await });
                    }
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }
        while in_flight.join_next().await.is_some() {}
    }

    /// Store the record and run hooks. Returns whether the record is stored.
    pub async fn on_terminal(&self, record: TerminalRecord) -> bool {
        let game_id = record.game_id;
        let repository = Arc::clone(&self.repository);
        let written = retry(&self.retry, "save_terminal", || {
            let repository = Arc::clone(&repository);
            let record = record.clone();
            async move { repository.save_terminal(&record).await }
        })
        .await;

        let (stored, first_write) = match written {
            Ok(TerminalWrite::Recorded) => (record, true),
            Ok(TerminalWrite::AlreadyRecorded(existing)) => {
                if existing.outcome != record.outcome {
                    error!(
                        target: "runtime::notifier",
                        game_id = %game_id,
                        stored = %existing.outcome,
                        decided = %record.outcome,
                        escalate = true,
                        "stored outcome differs from the session's decision"
                    );
                }
                (existing, false)
            }
            Err(exhausted) => {
                error!(
                    target: "runtime::notifier",
                    game_id = %game_id,
                    outcome = %record.outcome,
                    escalate = true,
                    error = %exhausted,
                    "terminal record could not be stored"
                );
                self.event_bus
                    .publish(Event::Outcome(OutcomeEvent::Escalated {
                        game_id,
                        error: exhausted.to_string(),
                    }));
                return false;
            }
        };

        info!(
            target: "runtime::notifier",
            game_id = %game_id,
            outcome = %stored.outcome,
            first_write,
            "terminal record stored"
        );
        self.event_bus
            .publish(Event::Outcome(OutcomeEvent::recorded(&stored, first_write)));

        self.hooks.run(&stored, first_write).await;
        true
    }
}
