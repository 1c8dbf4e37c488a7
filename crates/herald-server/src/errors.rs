//! Server error types.

use herald_core::ConnectionId;
use thiserror::Error;

/// Registry membership errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection is not (or no longer) a member.
    #[error("connection {0} is not registered")]
    NotFound(ConnectionId),
    /// The connection is already a member.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

/// Why a message could not be handed to one connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection's outbound queue is full.
    #[error("send queue full")]
    QueueFull,
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
}

/// Errors starting the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host did not resolve to an address.
    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying lookup error.
        #[source]
        source: std::io::Error,
    },
    /// Binding or listening on the shared socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_connection() {
        let err = RegistryError::NotFound(ConnectionId::from("c9"));
        assert_eq!(err.to_string(), "connection c9 is not registered");
    }

    #[test]
    fn delivery_error_display() {
        assert_eq!(DeliveryError::QueueFull.to_string(), "send queue full");
        assert_eq!(DeliveryError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn bind_error_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:80"));
    }
}
