//! # herald-core
//!
//! Foundation types shared by every herald crate:
//!
//! - **IDs**: [`ConnectionId`] for client connections, [`WorkerId`] for worker processes
//! - **Notices**: the plain-text messages broadcast to clients ([`notices`])
//! - **Constants**: protocol-level values shared by workers and the master
//! - **Logging**: `tracing` subscriber setup and a log-capture helper for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;
pub mod notices;

pub use ids::{ConnectionId, WorkerId};
