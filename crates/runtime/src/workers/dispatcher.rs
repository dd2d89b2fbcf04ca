//! Ordered delivery of server messages.
//!
//! Sessions hand messages to the dispatcher and move on; a slow or broken
//! connection never holds up the next command. A single queue keeps the
//! order of messages to each connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ConnectionId, ServerMessage, Transport, TransportError};

pub struct Outbound {
    pub connection: ConnectionId,
    pub message: ServerMessage,
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    outbox_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, outbox_rx: mpsc::UnboundedReceiver<Outbound>) -> Self {
        Self {
            transport,
            outbox_rx,
        }
    }

    /// Runs until every session and the runtime drop their senders.
    pub async fn run(mut self) {
        while let Some(Outbound {
            connection,
            message,
        }) = self.outbox_rx.recv().await
        {
            match self.transport.send(&connection, message).await {
                Ok(()) => {}
                Err(TransportError::Closed(_)) => {
                    debug!(
                        target: "runtime::dispatcher",
                        connection = %connection,
                        "connection closed, message dropped"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        target: "runtime::dispatcher",
                        connection = %connection,
                        error = %error,
                        "delivery failed"
                    );
                }
            }
        }
    }
}
