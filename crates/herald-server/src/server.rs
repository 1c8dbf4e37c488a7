//! `HeraldServer`: Axum HTTP + WebSocket server for one worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use herald_barrier::ShutdownBarrier;
use herald_core::WorkerId;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::page::INDEX_HTML;
use crate::shutdown::{ShutdownOrchestrator, ShutdownStateCell, ShutdownTimings};
use crate::signals::ShutdownLatch;
use crate::websocket::handler::handle_socket;
use crate::websocket::registry::ConnectionRegistry;

/// Pending connections the kernel queues per listening socket.
const LISTEN_BACKLOG: u32 = 1024;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections of this worker.
    pub registry: Arc<ConnectionRegistry>,
    /// Set once shutdown is requested.
    pub latch: ShutdownLatch,
    /// Observable shutdown phase.
    pub state: ShutdownStateCell,
    /// Tracks running WebSocket sessions.
    pub sessions: TaskTracker,
    /// This worker.
    pub worker: WorkerId,
    /// When the worker started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// One worker's HTTP server.
pub struct HeraldServer {
    config: Arc<ServerConfig>,
    worker: WorkerId,
    registry: Arc<ConnectionRegistry>,
    latch: ShutdownLatch,
    state: ShutdownStateCell,
    sessions: TaskTracker,
    start_time: Instant,
}

impl HeraldServer {
    /// Create a server for `worker`.
    pub fn new(config: ServerConfig, worker: WorkerId) -> Self {
        Self {
            config: Arc::new(config),
            worker,
            registry: Arc::new(ConnectionRegistry::new()),
            latch: ShutdownLatch::new(),
            state: ShutdownStateCell::new(),
            sessions: TaskTracker::new(),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            latch: self.latch.clone(),
            state: self.state.clone(),
            sessions: self.sessions.clone(),
            worker: self.worker,
            start_time: self.start_time,
            config: Arc::clone(&self.config),
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Orchestrator wired to this server's registry, latch and state.
    pub fn orchestrator(
        &self,
        barrier: Arc<ShutdownBarrier>,
        timings: ShutdownTimings,
    ) -> ShutdownOrchestrator {
        ShutdownOrchestrator::new(
            self.worker,
            Arc::clone(&self.registry),
            barrier,
            self.latch.clone(),
            timings,
            self.state.clone(),
        )
    }

    /// Resolve the configured host and bind a listener that sibling workers
    /// can bind too.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let resolve_err = |source: std::io::Error| ServerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        };
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(resolve_err)?
            .next()
            .ok_or_else(|| {
                resolve_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses",
                ))
            })?;
        bind_shared(addr).map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
    }

    /// Serve on `listener` until shutdown is requested.
    ///
    /// Once the latch is set the listener stops accepting; sessions already
    /// upgraded keep running until the registry closes them.
    pub fn serve(&self, listener: TcpListener) -> JoinHandle<std::io::Result<()>> {
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.latch.token();
        let pid = self.worker.pid();
        if let Ok(addr) = listener.local_addr() {
            info!(pid, %addr, "listening");
        }
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        })
    }

    /// Close every remaining connection and wait up to `grace` for their
    /// sessions to finish. Returns how many connections were closed.
    pub async fn close_sessions(&self, grace: Duration) -> usize {
        let closed = self.registry.close_all().len();
        let _ = self.sessions.close();
        if tokio::time::timeout(grace, self.sessions.wait()).await.is_err() {
            warn!(pending = self.sessions.len(), "sessions still open after grace period");
        }
        closed
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Shutdown latch.
    pub fn latch(&self) -> &ShutdownLatch {
        &self.latch
    }

    /// Shared shutdown state.
    pub fn state(&self) -> &ShutdownStateCell {
        &self.state
    }

    /// This worker.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Bind `addr` with `SO_REUSEADDR` and, on Unix, `SO_REUSEPORT`, so every
/// worker of one instance listens on the same port and the kernel spreads
/// incoming connections across them.
pub fn bind_shared(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// GET /
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let resp = health::health_check(
        state.worker,
        state.state.get(),
        state.start_time,
        state.registry.len(),
    );
    let code = if resp.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(resp))
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.latch.is_requested() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let AppState {
        registry,
        latch,
        sessions,
        config,
        ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            sessions.track_future(handle_socket(
                socket,
                peer,
                registry,
                latch,
                config.send_queue,
            ))
        })
}
