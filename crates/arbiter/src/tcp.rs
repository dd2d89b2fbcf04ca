//! Line-delimited JSON transport over TCP.
//!
//! Each line is one JSON object. The first line of a connection must be a
//! `hello` naming the game and the participant; identity is taken as given,
//! so deployments put an authenticating proxy in front of this listener.
//! After that, game messages (`submit_move`, `offer_draw`, ...) go to the
//! runtime and settlement requests (`claim`, `mark_claimed`) go to the
//! coordinator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use chess_core::{GameId, Participant, ParticipantId, PayloadHash};
use runtime::{
    ClientMessage, ConnectionId, GameSetup, Runtime, ServerMessage, Transport, TransportError,
};
use settlement::{ClaimTicket, SettlementCoordinator};

/// Requests outside the game protocol.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request {
    Hello {
        game_id: GameId,
        participant: ParticipantId,
    },
    /// Create a game. `black` may join later.
    Open {
        game_id: GameId,
        white: Participant,
        black: Option<Participant>,
    },
    /// Seat black in the hello'd game and start the clock.
    Join { black: Participant },
    Claim,
    MarkClaimed { claim_tx: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Reply {
    Opened {
        game_id: GameId,
    },
    ClaimTicket {
        ticket: ClaimTicket,
    },
    Claimed {
        game_id: GameId,
        payload_hash: PayloadHash,
        claim_tx: String,
    },
    Error {
        message: String,
    },
}

/// Lines queued for one socket before its reader is considered stuck.
pub const OUTBOX_CAPACITY: usize = 256;

/// Outbound side: one bounded writer queue per open socket.
///
/// A peer that stops reading is cut off once its queue fills, instead of
/// buffering broadcasts without limit.
pub struct TcpTransport {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
    capacity: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::with_capacity(OUTBOX_CAPACITY)
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn register(&self, connection: ConnectionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Ok(mut connections) = self.connections.write() {
            connections.insert(connection, tx);
        }
        rx
    }

    fn unregister(&self, connection: &ConnectionId) {
        if let Ok(mut connections) = self.connections.write() {
            connections.remove(connection);
        }
    }

    fn push(&self, connection: &ConnectionId, line: String) -> Result<(), TransportError> {
        let sender = self
            .connections
            .read()
            .map_err(|_| TransportError::Other("connection table poisoned".into()))?
            .get(connection)
            .cloned()
            .ok_or_else(|| TransportError::Closed(connection.clone()))?;
        match sender.try_send(line) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    target: "arbiter::tcp",
                    %connection,
                    capacity = self.capacity,
                    "outbox full, dropping slow connection"
                );
                self.unregister(connection);
                Err(TransportError::Closed(connection.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(TransportError::Closed(connection.clone()))
            }
        }
    }

    fn reply(&self, connection: &ConnectionId, reply: &Reply) {
        match serde_json::to_string(reply) {
            Ok(line) => {
                if let Err(error) = self.push(connection, line) {
                    debug!(target: "arbiter::tcp", %connection, %error, "reply dropped");
                }
            }
            Err(error) => warn!(target: "arbiter::tcp", %connection, %error, "unserializable reply"),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(
        &self,
        connection: &ConnectionId,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        let line =
            serde_json::to_string(&message).map_err(|e| TransportError::Other(e.to_string()))?;
        self.push(connection, line)
    }
}

/// Shared state of the listener.
pub struct Server {
    pub runtime: Arc<Runtime>,
    pub coordinator: Arc<SettlementCoordinator>,
    pub transport: Arc<TcpTransport>,
}

/// Accept connections until `shutdown` flips to true, then close them all.
pub async fn serve(
    listener: TcpListener,
    server: Arc<Server>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let next_id = AtomicU64::new(1);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting connection")?;
                let connection = ConnectionId::new(format!(
                    "tcp-{}",
                    next_id.fetch_add(1, Ordering::Relaxed)
                ));
                info!(target: "arbiter::tcp", %connection, %peer, "connection opened");
                let server = server.clone();
                connections.spawn(async move {
                    if let Err(error) = server.handle_connection(stream, connection.clone()).await {
                        debug!(target: "arbiter::tcp", %connection, error = %error, "connection ended with error");
                    }
                });
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    connections.shutdown().await;
    info!(target: "arbiter::tcp", "listener stopped");
    Ok(())
}

impl Server {
    async fn handle_connection(&self, stream: TcpStream, connection: ConnectionId) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut outbox = self.transport.register(connection.clone());
        let mut writer_task = tokio::spawn(async move {
            while let Some(line) = outbox.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.shutdown().await
        });

        let mut session: Option<(GameId, ParticipantId)> = None;
        let mut lines = BufReader::new(reader).lines();
        // The writer only ends early when the transport cut the peer off.
        let mut writer_result = None;
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                joined = &mut writer_task => {
                    writer_result = Some(joined);
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(error) = self.handle_line(&connection, &mut session, line).await {
                self.transport.reply(
                    &connection,
                    &Reply::Error {
                        message: format!("{error:#}"),
                    },
                );
            }
        }

        if let Some((game_id, _)) = session
            && let Err(error) = self.runtime.disconnect(connection.clone(), game_id).await
        {
            debug!(target: "arbiter::tcp", %connection, %error, "disconnect failed");
        }
        self.transport.unregister(&connection);
        info!(target: "arbiter::tcp", %connection, "connection closed");
        let joined = match writer_result {
            Some(joined) => joined,
            None => writer_task.await,
        };
        joined.context("joining writer")??;
        Ok(())
    }

    async fn handle_line(
        &self,
        connection: &ConnectionId,
        session: &mut Option<(GameId, ParticipantId)>,
        line: &str,
    ) -> Result<()> {
        if let Ok(message) = serde_json::from_str::<ClientMessage>(line) {
            let (game_id, participant) = session.clone().context("send hello first")?;
            // Runtime errors are reported to the connection by the runtime.
            if let Err(error) = self
                .runtime
                .dispatch(connection.clone(), game_id, participant, message)
                .await
            {
                debug!(target: "arbiter::tcp", %connection, %error, "dispatch failed");
            }
            return Ok(());
        }

        let request: Request = serde_json::from_str(line).context("unrecognised message")?;
        match request {
            Request::Hello {
                game_id,
                participant,
            } => {
                *session = Some((game_id, participant.clone()));
                if let Err(error) = self
                    .runtime
                    .dispatch(connection.clone(), game_id, participant, ClientMessage::Sync)
                    .await
                {
                    debug!(target: "arbiter::tcp", %connection, %error, "hello failed");
                }
            }
            Request::Open {
                game_id,
                white,
                black,
            } => {
                let mut setup = GameSetup::new(game_id, white);
                if let Some(black) = black {
                    setup = setup.with_black(black);
                }
                self.runtime.open_game(setup).await?;
                self.transport.reply(connection, &Reply::Opened { game_id });
            }
            Request::Join { black } => {
                let (game_id, _) = session.clone().context("send hello first")?;
                let reply = self.runtime.session(game_id).await?.activate(black).await?;
                let message = ServerMessage::MoveResult {
                    request: "join".into(),
                    rejection: reply.rejection,
                    snapshot: reply.snapshot,
                };
                self.transport.send(connection, message).await?;
            }
            Request::Claim => {
                let (game_id, participant) = session.clone().context("send hello first")?;
                let ticket = self.coordinator.claim(game_id, &participant).await?;
                self.transport.reply(connection, &Reply::ClaimTicket { ticket });
            }
            Request::MarkClaimed { claim_tx } => {
                let (game_id, _) = session.clone().context("send hello first")?;
                let record = self.coordinator.mark_claimed(game_id, &claim_tx).await?;
                self.transport.reply(
                    connection,
                    &Reply::Claimed {
                        game_id,
                        payload_hash: record.payload_hash,
                        claim_tx,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_reader_is_cut_off_when_its_queue_fills() {
        let transport = TcpTransport::with_capacity(2);
        let connection = ConnectionId::new("tcp-1");
        let mut outbox = transport.register(connection.clone());

        transport.push(&connection, "one".into()).unwrap();
        transport.push(&connection, "two".into()).unwrap();
        assert!(matches!(
            transport.push(&connection, "three".into()),
            Err(TransportError::Closed(_))
        ));
        assert!(matches!(
            transport.push(&connection, "four".into()),
            Err(TransportError::Closed(_))
        ));

        // Queued lines still drain, then the writer sees the end.
        assert_eq!(outbox.try_recv().unwrap(), "one");
        assert_eq!(outbox.try_recv().unwrap(), "two");
        assert!(matches!(
            outbox.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn other_connections_keep_their_queue() {
        let transport = TcpTransport::with_capacity(1);
        let slow = ConnectionId::new("tcp-1");
        let fast = ConnectionId::new("tcp-2");
        let _slow_outbox = transport.register(slow.clone());
        let mut fast_outbox = transport.register(fast.clone());

        transport.push(&slow, "a".into()).unwrap();
        assert!(transport.push(&slow, "b".into()).is_err());

        transport.push(&fast, "a".into()).unwrap();
        assert_eq!(fast_outbox.try_recv().unwrap(), "a");
        transport.push(&fast, "b".into()).unwrap();
        assert_eq!(fast_outbox.try_recv().unwrap(), "b");
    }
}
