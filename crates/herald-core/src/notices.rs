//! Plain-text notices broadcast to connected clients.

/// Periodic liveness notice sent while a worker is running.
pub const HEARTBEAT: &str = "Server is running...";

/// Notice repeated to every client while a worker drains.
pub const SHUTTING_DOWN: &str = "Server is shutting down, please disconnect.";

/// Announce that `peer` joined.
pub fn connected(peer: &str) -> String {
    format!("Client \"{peer}\" connected.")
}

/// Announce that `peer` left.
pub fn disconnected(peer: &str) -> String {
    format!("Client \"{peer}\" disconnected.")
}

/// Echo a chat line from `peer` to everyone on the worker.
pub fn chat(peer: &str, text: &str) -> String {
    format!("Message from \"{peer}\": {text}")
}
