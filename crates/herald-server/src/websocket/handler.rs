//! Per-connection WebSocket session: a writer task fed by the connection's
//! queue and a reader task that turns text frames into chat broadcasts.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use herald_core::{ConnectionId, notices};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::errors::RegistryError;
use crate::signals::ShutdownLatch;

/// Run one client session until either side closes.
///
/// The connection is registered (and announced) on entry and unregistered
/// (and announced) on exit. If the registry already dropped the connection,
/// for example when closing stragglers after a drain, exit is silent.
pub async fn handle_socket(
    socket: WebSocket,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    latch: ShutdownLatch,
    send_queue: usize,
) {
    let id = ConnectionId::new();
    let peer = peer.to_string();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(send_queue.max(1));
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                debug!(conn_id = %writer_id, "socket write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let connection = Arc::new(ClientConnection::new(id.clone(), peer.clone(), tx));
    if let Err(e) = registry.add(connection) {
        warn!(conn_id = %id, error = %e, "could not register connection");
        writer.abort();
        return;
    }
    info!(conn_id = %id, peer, "client connected");

    let reader_registry = Arc::clone(&registry);
    let reader_peer = peer.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let _ = on_text(&reader_registry, &latch, &reader_peer, text.as_str());
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(peer = reader_peer, error = %e, "socket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    match registry.remove(&id) {
        Ok(_) => info!(conn_id = %id, peer, "client disconnected"),
        Err(RegistryError::NotFound(_)) => debug!(conn_id = %id, peer, "connection closed by server"),
        Err(e) => warn!(conn_id = %id, error = %e, "failed to unregister connection"),
    }
}

/// Rebroadcast a chat line from `peer`. Returns whether it was sent.
///
/// Once shutdown has been requested, chat is no longer relayed; the only
/// traffic a draining worker originates is the shutdown notice.
pub fn on_text(registry: &ConnectionRegistry, latch: &ShutdownLatch, peer: &str, text: &str) -> bool {
    if latch.is_requested() {
        debug!(peer, "draining, chat message not relayed");
        return false;
    }
    let report = registry.broadcast(&notices::chat(peer, text));
    debug!(peer, delivered = report.delivered, "chat relayed");
    true
}
