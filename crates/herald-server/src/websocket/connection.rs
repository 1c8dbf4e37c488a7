//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use herald_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::errors::DeliveryError;

/// One connected WebSocket client.
///
/// The socket itself is owned by the connection's writer task; this handle
/// only holds the sending half of that task's queue.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Remote address label used in notices.
    peer: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    connected_at: Instant,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, peer: impl Into<String>, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            peer: peer.into(),
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Remote address label.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue a text message for the client without waiting.
    ///
    /// On failure the dropped message counter is incremented.
    pub fn send(&self, message: Arc<String>) -> Result<(), DeliveryError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(match e {
                    TrySendError::Full(_) => DeliveryError::QueueFull,
                    TrySendError::Closed(_) => DeliveryError::Closed,
                })
            }
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
