//! # herald-server
//!
//! One herald worker: an Axum HTTP + `WebSocket` server whose clients all
//! hear each other, plus the state machine that shuts the worker down in
//! step with its siblings.
//!
//! - [`websocket::registry::ConnectionRegistry`]: live connections and best-effort broadcast
//! - [`websocket::heartbeat`]: periodic "running" notice
//! - [`shutdown::ShutdownOrchestrator`]: `Running → Draining → BarrierWait → Terminating`
//! - [`signals`]: SIGINT/SIGTERM only set a latch; the orchestrator does the work
//! - [`server::HeraldServer`]: router, shared listening socket, health endpoint

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod page;
pub mod server;
pub mod shutdown;
pub mod signals;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{DeliveryError, RegistryError, ServerError};
pub use server::HeraldServer;
pub use shutdown::{DrainOutcome, ShutdownOrchestrator, ShutdownState, ShutdownTimings};
pub use signals::ShutdownLatch;
