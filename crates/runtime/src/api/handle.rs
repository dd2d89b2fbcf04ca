//! Cloneable façade for issuing commands to one game session.
//!
//! [`SessionHandle`] hides channel plumbing. Every mutating call is queued on
//! the session's bounded inbox and answered with a [`CommandReply`] carrying
//! the authoritative snapshot, whether the command was accepted or not.
//! [`SessionHandle::snapshot`] reads the last published snapshot without
//! queueing behind pending commands.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use chess_core::{GameId, Move, Participant, ParticipantId, Rejection, SessionSnapshot};

use super::errors::{Result, RuntimeError};
use super::transport::{ClientMessage, ConnectionId};
use crate::workers::Command;

/// A participant operation on a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    SubmitMove(Move),
    Resign,
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    ClaimAbandonment,
    Chat(String),
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SubmitMove(_) => "submit_move",
            Operation::Resign => "resign",
            Operation::OfferDraw => "offer_draw",
            Operation::AcceptDraw => "accept_draw",
            Operation::DeclineDraw => "decline_draw",
            Operation::ClaimAbandonment => "claim_abandonment",
            Operation::Chat(_) => "chat",
        }
    }

    /// `None` for [`ClientMessage::Sync`], which is not an operation.
    pub fn from_message(message: ClientMessage) -> Option<Self> {
        Some(match message {
            ClientMessage::Sync => return None,
            ClientMessage::SubmitMove { mv } => Operation::SubmitMove(mv),
            ClientMessage::Resign => Operation::Resign,
            ClientMessage::OfferDraw => Operation::OfferDraw,
            ClientMessage::AcceptDraw => Operation::AcceptDraw,
            ClientMessage::DeclineDraw => Operation::DeclineDraw,
            ClientMessage::ClaimAbandonment => Operation::ClaimAbandonment,
            ClientMessage::Chat { text } => Operation::Chat(text),
        })
    }
}

/// Answer to a session command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub rejection: Option<Rejection>,
    pub snapshot: SessionSnapshot,
}

impl CommandReply {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Client-facing handle to one live session.
#[derive(Clone)]
pub struct SessionHandle {
    game_id: GameId,
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    timeout: Duration,
}

impl SessionHandle {
    pub(crate) fn new(
        game_id: GameId,
        command_tx: mpsc::Sender<Command>,
        snapshot_rx: watch::Receiver<SessionSnapshot>,
        timeout: Duration,
    ) -> Self {
        Self {
            game_id,
            command_tx,
            snapshot_rx,
            timeout,
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub(crate) fn command_sender(&self) -> &mpsc::Sender<Command> {
        &self.command_tx
    }

    /// Whether the session worker is still running.
    pub fn is_live(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Last published snapshot. Never waits for queued commands.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch channel that updates after every state change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Run `operation` for `participant`. `origin` is the connection that
    /// issued it; it receives the move result message.
    pub async fn apply(
        &self,
        participant: ParticipantId,
        origin: Option<ConnectionId>,
        operation: Operation,
    ) -> Result<CommandReply> {
        self.request(|reply| Command::Apply {
            participant,
            origin,
            operation,
            reply,
        })
        .await
    }

    pub async fn submit_move(&self, participant: ParticipantId, mv: Move) -> Result<CommandReply> {
        self.apply(participant, None, Operation::SubmitMove(mv)).await
    }

    pub async fn resign(&self, participant: ParticipantId) -> Result<CommandReply> {
        self.apply(participant, None, Operation::Resign).await
    }

    pub async fn offer_draw(&self, participant: ParticipantId) -> Result<CommandReply> {
        self.apply(participant, None, Operation::OfferDraw).await
    }

    pub async fn accept_draw(&self, participant: ParticipantId) -> Result<CommandReply> {
        self.apply(participant, None, Operation::AcceptDraw).await
    }

    pub async fn decline_draw(&self, participant: ParticipantId) -> Result<CommandReply> {
        self.apply(participant, None, Operation::DeclineDraw).await
    }

    pub async fn claim_abandonment(&self, participant: ParticipantId) -> Result<CommandReply> {
        self.apply(participant, None, Operation::ClaimAbandonment)
            .await
    }

    pub async fn chat(
        &self,
        participant: ParticipantId,
        text: impl Into<String>,
    ) -> Result<CommandReply> {
        self.apply(participant, None, Operation::Chat(text.into()))
            .await
    }

    /// Seat the second participant and start the clock.
    pub async fn activate(&self, black: Participant) -> Result<CommandReply> {
        self.request(|reply| Command::Activate { black, reply }).await
    }

    /// Detect a flag-fall without a move.
    pub async fn check_clock(&self) -> Result<CommandReply> {
        self.request(|reply| Command::CheckClock { reply }).await
    }

    /// Attach `connection` to the participant's seat and deliver a full
    /// snapshot to it. Also counts as activity against abandonment claims.
    pub async fn connect(
        &self,
        participant: ParticipantId,
        connection: ConnectionId,
    ) -> Result<CommandReply> {
        self.request(|reply| Command::Connect {
            participant,
            connection,
            reply,
        })
        .await
    }

    pub async fn disconnect(&self, connection: ConnectionId) -> Result<()> {
        self.send(Command::Disconnect { connection }).await
    }

    /// Fresh snapshot taken inside the session, after queued commands.
    pub async fn query(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Query { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(reply) => reply.map_err(RuntimeError::ReplyChannelClosed),
            Err(_) => Err(self.timed_out()),
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send_timeout(command, self.timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => self.timed_out(),
                mpsc::error::SendTimeoutError::Closed(_) => {
                    RuntimeError::CommandChannelClosed(self.game_id)
                }
            })
    }

    fn timed_out(&self) -> RuntimeError {
        RuntimeError::CommandTimeout {
            game_id: self.game_id,
            after: self.timeout,
        }
    }
}
