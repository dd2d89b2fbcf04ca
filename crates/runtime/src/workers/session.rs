//! Session worker that owns the authoritative [`GameSession`] of one game.
//!
//! Receives commands from [`SessionHandle`](crate::api::SessionHandle),
//! applies them strictly one at a time, and fans the resulting events out:
//! server messages to the dispatcher, notices to the event bus, snapshots to
//! the watch channel and the checkpoint worker, and the terminal record to
//! the outcome notifier exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use chess_core::{
    Color, GameId, GameRecord, GameSession, Participant, ParticipantId, Rejection, SessionEvent,
    SessionSnapshot, Step, TerminalRecord, Timestamp,
};

use super::dispatcher::Outbound;
use crate::api::{CommandReply, ConnectionId, Operation, ServerMessage};
use crate::events::{Event, EventBus, SessionNotice};
use crate::repository::GameRepository;
use crate::retry::{RetryPolicy, retry};
use crate::time::TimeSource;

/// Commands that can be sent to a session worker.
pub enum Command {
    Apply {
        participant: ParticipantId,
        origin: Option<ConnectionId>,
        operation: Operation,
        reply: oneshot::Sender<CommandReply>,
    },
    Activate {
        black: Participant,
        reply: oneshot::Sender<CommandReply>,
    },
    CheckClock {
        reply: oneshot::Sender<CommandReply>,
    },
    Connect {
        participant: ParticipantId,
        connection: ConnectionId,
        reply: oneshot::Sender<CommandReply>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Query {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    /// Persist the current record and stop.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Channels and services shared by every session worker.
#[derive(Clone)]
pub struct SessionContext {
    pub time: Arc<dyn TimeSource>,
    pub event_bus: EventBus,
    pub repository: Arc<dyn GameRepository>,
    pub retry: RetryPolicy,
    pub checkpoint_interval: Duration,
    pub outbox: mpsc::UnboundedSender<Outbound>,
    pub checkpoints: mpsc::UnboundedSender<GameRecord>,
    pub terminals: mpsc::UnboundedSender<TerminalRecord>,
    /// Game ids of sessions that reached a terminal state.
    pub completed: mpsc::UnboundedSender<GameId>,
}

pub struct SessionWorker {
    session: GameSession,
    command_rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    context: SessionContext,
    connections: BTreeMap<ConnectionId, Color>,
    checkpointed_ply: u32,
    checkpointed_version: u64,
    terminal_sent: bool,
}

impl SessionWorker {
    pub fn new(
        session: GameSession,
        command_rx: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        context: SessionContext,
        terminal_stored: bool,
    ) -> Self {
        Self {
            checkpointed_ply: session.plies(),
            checkpointed_version: session.version(),
            session,
            command_rx,
            snapshot_tx,
            context,
            connections: BTreeMap::new(),
            terminal_sent: terminal_stored,
        }
    }

    /// Main worker loop. Ends when every handle is dropped or on shutdown.
    pub async fn run(mut self) {
        info!(
            target: "runtime::session",
            game_id = %self.session.game_id(),
            status = self.session.status().as_str(),
            ply = self.session.plies(),
            "session started"
        );

        // A restored game may have completed before its record was stored.
        if self.session.is_completed() {
            if self.terminal_sent {
                let _ = self.context.completed.send(self.session.game_id());
            } else {
                self.forward_terminal();
            }
        }

        let mut checkpoint_tick = tokio::time::interval(self.context.checkpoint_interval);
        checkpoint_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        checkpoint_tick.tick().await;

        loop {
            let flag_deadline = self.flag_deadline();
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.flush().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = checkpoint_tick.tick() => self.checkpoint_if_changed(),
                _ = wait_for(flag_deadline) => {
                    let now = self.context.time.now();
                    let step = self.session.check_clock(now);
                    self.publish(step, now);
                }
            }
        }

        debug!(
            target: "runtime::session",
            game_id = %self.session.game_id(),
            "session stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Apply {
                participant,
                origin,
                operation,
                reply,
            } => {
                let reply_to = origin.clone();
                if let Some(connection) = origin {
                    self.attach(&participant, connection);
                }
                let request = operation.as_str();
                let step = self.apply(&participant, operation);
                self.answer(reply, reply_to, request, step);
            }
            Command::Activate { black, reply } => {
                let now = self.context.time.now();
                let step = self.session.activate(black, now);
                self.answer(reply, None, "activate", step);
            }
            Command::CheckClock { reply } => {
                let now = self.context.time.now();
                let step = self.session.check_clock(now);
                self.answer(reply, None, "check_clock", step);
            }
            Command::Connect {
                participant,
                connection,
                reply,
            } => {
                let now = self.context.time.now();
                let rejection = if self.session.seat_of(&participant).is_some() {
                    if self.session.record_activity(&participant, now) {
                        self.checkpoint_if_changed();
                    }
                    self.attach(&participant, connection.clone());
                    let snapshot = self.session.snapshot(now);
                    self.send(&connection, ServerMessage::Snapshot { snapshot });
                    None
                } else {
                    Some(Rejection::NotAParticipant)
                };
                let _ = reply.send(CommandReply {
                    rejection,
                    snapshot: self.session.snapshot(now),
                });
            }
            Command::Disconnect { connection } => {
                self.connections.remove(&connection);
            }
            Command::Query { reply } => {
                let _ = reply.send(self.session.snapshot(self.context.time.now()));
            }
            Command::Shutdown { .. } => {}
        }
    }

    fn apply(&mut self, participant: &ParticipantId, operation: Operation) -> Step {
        let now = self.context.time.now();
        match operation {
            Operation::SubmitMove(mv) => self.session.submit_move(participant, mv, now),
            Operation::Resign => self.session.resign(participant, now),
            Operation::OfferDraw => self.session.offer_draw(participant, now),
            Operation::AcceptDraw => self.session.accept_draw(participant, now),
            Operation::DeclineDraw => self.session.decline_draw(participant, now),
            Operation::ClaimAbandonment => self.session.claim_abandonment(participant, now),
            Operation::Chat(text) => self.session.chat(participant, &text, now),
        }
    }

    /// Publish the step, then reply. The origin connection gets the result
    /// message ahead of the broadcast.
    fn answer(
        &mut self,
        reply: oneshot::Sender<CommandReply>,
        origin: Option<ConnectionId>,
        request: &'static str,
        step: Step,
    ) {
        let now = self.context.time.now();
        let rejection = step.rejection;
        if let Some(rejection) = rejection {
            debug!(
                target: "runtime::session",
                game_id = %self.session.game_id(),
                request,
                rejection = rejection.as_str(),
                "command rejected"
            );
        }

        let snapshot = self.session.snapshot(now);
        if let Some(connection) = origin {
            self.send(
                &connection,
                ServerMessage::MoveResult {
                    request: request.to_string(),
                    rejection,
                    snapshot: snapshot.clone(),
                },
            );
        }
        self.publish(step, now);

        if reply
            .send(CommandReply {
                rejection,
                snapshot,
            })
            .is_err()
        {
            debug!(
                target: "runtime::session",
                request,
                "reply channel closed (caller dropped)"
            );
        }
    }

    /// Fan events out and advance persistence.
    fn publish(&mut self, step: Step, now: Timestamp) {
        if step.events.is_empty() {
            return;
        }
        let game_id = self.session.game_id();
        let version = self.session.version();

        for event in step.events {
            match &event {
                SessionEvent::MoveCommitted { ply, uci, .. } => {
                    debug!(target: "runtime::session", game_id = %game_id, ply, uci = %uci, "move committed");
                }
                SessionEvent::Terminal { result, plies, .. } => {
                    info!(
                        target: "runtime::session",
                        game_id = %game_id,
                        outcome = result.outcome.as_str(),
                        reason = %result.reason,
                        plies,
                        "game completed"
                    );
                }
                _ => {}
            }

            for message in ServerMessage::from_event(&event) {
                self.broadcast(message);
            }
            self.context
                .event_bus
                .publish(Event::Session(SessionNotice {
                    game_id,
                    version,
                    event,
                }));
        }

        self.snapshot_tx.send_replace(self.session.snapshot(now));

        let every = self.session.record().config.checkpoint_every_plies.max(1);
        if self.session.is_completed()
            || self.session.plies() <= 1
            || self.session.plies() >= self.checkpointed_ply + every
        {
            self.checkpoint_if_changed();
        }
        if self.session.is_completed() {
            self.forward_terminal();
        }
    }

    fn forward_terminal(&mut self) {
        if self.terminal_sent {
            return;
        }
        let Some(record) = self.session.terminal_record() else {
            warn!(
                target: "runtime::session",
                game_id = %self.session.game_id(),
                "completed game has no terminal record"
            );
            return;
        };
        self.terminal_sent = true;
        let game_id = record.game_id;
        if self.context.terminals.send(record).is_err() {
            warn!(target: "runtime::session", game_id = %game_id, "outcome notifier is gone");
        }
        let _ = self.context.completed.send(game_id);
    }

    fn checkpoint_if_changed(&mut self) {
        if self.session.version() == self.checkpointed_version {
            return;
        }
        self.checkpointed_version = self.session.version();
        self.checkpointed_ply = self.session.plies();
        if self.context.checkpoints.send(self.session.to_record()).is_err() {
            warn!(
                target: "runtime::session",
                game_id = %self.session.game_id(),
                "checkpoint worker is gone"
            );
        }
    }

    /// Write the current record straight to the repository before exit,
    /// unless the last checkpoint already carries it.
    async fn flush(&mut self) {
        if self.session.version() == self.checkpointed_version {
            return;
        }
        let record = self.session.to_record();
        let repository = Arc::clone(&self.context.repository);
        let saved = retry(&self.context.retry, "save_snapshot", || {
            let repository = Arc::clone(&repository);
            let record = record.clone();
            async move { repository.save_snapshot(&record).await }
        })
        .await;
        if let Err(error) = saved {
            tracing::error!(
                target: "runtime::session",
                game_id = %record.game_id,
                escalate = true,
                error = %error,
                "final snapshot was not persisted"
            );
        } else {
            self.checkpointed_version = record.version;
        }
    }

    /// Time until the running side's flag falls.
    fn flag_deadline(&self) -> Option<Duration> {
        if self.session.is_completed() {
            return None;
        }
        let clock = self.session.clock();
        let side = clock.running()?;
        let remaining = clock.elapsed(self.context.time.now()).get(side);
        Some(Duration::from_millis(remaining.saturating_add(1)))
    }

    fn attach(&mut self, participant: &ParticipantId, connection: ConnectionId) {
        if let Some(side) = self.session.seat_of(participant) {
            self.connections.insert(connection, side);
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for connection in self.connections.keys() {
            self.send(connection, message.clone());
        }
    }

    fn send(&self, connection: &ConnectionId, message: ServerMessage) {
        let outbound = Outbound {
            connection: connection.clone(),
            message,
        };
        if self.context.outbox.send(outbound).is_err() {
            debug!(target: "runtime::session", "dispatcher is gone, message dropped");
        }
    }
}

async fn wait_for(deadline: Option<Duration>) {
    match deadline {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}
