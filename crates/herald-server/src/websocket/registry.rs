//! Live connections of one worker and best-effort fan-out to them.

use std::sync::Arc;

use herald_core::{ConnectionId, notices};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::errors::RegistryError;

/// Result of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members whose queue accepted the message.
    pub delivered: usize,
    /// Members the message could not be handed to.
    pub failed: usize,
}

/// Ordered set of the worker's live connections.
///
/// Members are kept in acceptance order. One mutex serializes membership
/// changes and broadcasts, so a member added or removed mid-broadcast is
/// either fully in or fully out of that broadcast. Sends never block, so the
/// lock is never held across an await.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: Mutex<Vec<Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and announce it to every member, itself included.
    pub fn add(&self, connection: Arc<ClientConnection>) -> Result<BroadcastReport, RegistryError> {
        let mut members = self.members.lock();
        if members.iter().any(|m| m.id == connection.id) {
            return Err(RegistryError::AlreadyRegistered(connection.id.clone()));
        }
        let notice = notices::connected(connection.peer());
        debug!(conn_id = %connection.id, peer = connection.peer(), "connection registered");
        members.push(connection);
        Ok(deliver(&members, &notice))
    }

    /// Unregister a connection and announce its departure to the rest.
    pub fn remove(&self, id: &ConnectionId) -> Result<Arc<ClientConnection>, RegistryError> {
        let mut members = self.members.lock();
        let index = members
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let connection = members.remove(index);
        debug!(
            conn_id = %id,
            peer = connection.peer(),
            age = ?connection.age(),
            "connection unregistered"
        );
        let _ = deliver(&members, &notices::disconnected(connection.peer()));
        Ok(connection)
    }

    /// Send `message` to every current member in order.
    ///
    /// A failed delivery is logged and counted; it neither stops the loop nor
    /// removes the member.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let members = self.members.lock();
        deliver(&members, message)
    }

    /// Take every member out without announcing it.
    ///
    /// Dropping the returned handles closes each connection's queue, which
    /// ends its writer and closes the socket.
    pub fn close_all(&self) -> Vec<Arc<ClientConnection>> {
        let closed = std::mem::take(&mut *self.members.lock());
        if !closed.is_empty() {
            debug!(count = closed.len(), "closing remaining connections");
        }
        closed
    }

    /// Snapshot of the current members in acceptance order.
    pub fn members(&self) -> Vec<Arc<ClientConnection>> {
        self.members.lock().clone()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.lock().iter().any(|m| &m.id == id)
    }
}

fn deliver(members: &[Arc<ClientConnection>], message: &str) -> BroadcastReport {
    let payload = Arc::new(message.to_owned());
    let mut report = BroadcastReport::default();
    for conn in members {
        match conn.send(Arc::clone(&payload)) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    conn_id = %conn.id,
                    peer = conn.peer(),
                    dropped = conn.drop_count(),
                    error = %e,
                    "failed to send message to client"
                );
            }
        }
    }
    debug!(
        recipients = members.len(),
        delivered = report.delivered,
        failed = report.failed,
        "broadcast"
    );
    report
}
