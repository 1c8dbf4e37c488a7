//! Server configuration.

use herald_settings::HeraldSettings;
use serde::{Deserialize, Serialize};

/// Network configuration for one worker's HTTP server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind. Every worker of one instance binds the same port.
    pub port: u16,
    /// Outbound queue length per connection.
    pub send_queue: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Take the server section of loaded settings.
    pub fn from_settings(settings: &HeraldSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            send_queue: settings.server.send_queue,
            max_message_size: settings.server.max_message_size,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue: 256,
            max_message_size: 64 * 1024,
        }
    }
}
