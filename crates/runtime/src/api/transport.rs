//! Transport seam.
//!
//! The runtime does not own sockets. A host delivers inbound
//! [`ClientMessage`]s to [`crate::Runtime::dispatch`] and implements
//! [`Transport`] so the runtime can push [`ServerMessage`]s back. Delivery
//! must be reliable and ordered per connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use chess_core::{
    Color, EndReason, GameResult, Move, Rejection, RemainingTime, SessionEvent, SessionSnapshot,
};

/// Opaque identifier of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages a participant sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach this connection and receive a full snapshot.
    Sync,
    SubmitMove { mv: Move },
    Resign,
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    ClaimAbandonment,
    Chat { text: String },
}

impl ClientMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientMessage::Sync => "sync",
            ClientMessage::SubmitMove { .. } => "submit_move",
            ClientMessage::Resign => "resign",
            ClientMessage::OfferDraw => "offer_draw",
            ClientMessage::AcceptDraw => "accept_draw",
            ClientMessage::DeclineDraw => "decline_draw",
            ClientMessage::ClaimAbandonment => "claim_abandonment",
            ClientMessage::Chat { .. } => "chat",
        }
    }
}

/// Messages the runtime sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to the connection that issued a command. Always carries the
    /// authoritative snapshot, also on rejection.
    MoveResult {
        request: String,
        rejection: Option<Rejection>,
        snapshot: SessionSnapshot,
    },
    GameStarted {
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
    DrawOffer {
        by: Color,
    },
    /// `by` is the side that declined; `None` when both agreed.
    DrawResult {
        accepted: bool,
        by: Option<Color>,
    },
    Chat {
        from: Color,
        text: String,
    },
    TerminalNotice {
        result: GameResult,
        final_fen: String,
        plies: u32,
    },
    Snapshot {
        snapshot: SessionSnapshot,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Broadcast form of a session event.
    pub fn from_event(event: &SessionEvent) -> Vec<Self> {
        match event.clone() {
            SessionEvent::Activated { fen, clock } => vec![ServerMessage::GameStarted { fen, clock }],
            SessionEvent::MoveCommitted {
                ply,
                color,
                uci,
                fen,
                clock,
            } => vec![ServerMessage::MoveCommitted {
                ply,
                color,
                uci,
                fen,
                clock,
            }],
            SessionEvent::DrawOffered { by } => vec![ServerMessage::DrawOffer { by }],
            SessionEvent::DrawDeclined { by } => vec![ServerMessage::DrawResult {
                accepted: false,
                by: Some(by),
            }],
            SessionEvent::Chat { from, text } => vec![ServerMessage::Chat { from, text }],
            SessionEvent::Terminal {
                result,
                final_fen,
                plies,
            } => {
                let mut messages = Vec::with_capacity(2);
                if result.reason == EndReason::Agreement {
                    messages.push(ServerMessage::DrawResult {
                        accepted: true,
                        by: None,
                    });
                }
                messages.push(ServerMessage::TerminalNotice {
                    result,
                    final_fen,
                    plies,
                });
                messages
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("transport failure: {0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, connection: &ConnectionId, message: ServerMessage)
    -> Result<(), TransportError>;
}

/// In-process transport backed by unbounded channels, one per connection.
#[derive(Default)]
pub struct ChannelTransport {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its inbox.
    pub fn connect(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut connections) = self.connections.write() {
            connections.insert(connection, tx);
        }
        rx
    }

    pub fn disconnect(&self, connection: &ConnectionId) {
        if let Ok(mut connections) = self.connections.write() {
            connections.remove(connection);
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(
        &self,
        connection: &ConnectionId,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        let sender = self
            .connections
            .read()
            .map_err(|_| TransportError::Other("connection table poisoned".into()))?
            .get(connection)
            .cloned()
            .ok_or_else(|| TransportError::Closed(connection.clone()))?;
        sender
            .send(message)
            .map_err(|_| TransportError::Closed(connection.clone()))
    }
}
