//! WebSocket connection handling and fan-out.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod registry;
