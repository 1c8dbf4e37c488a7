//! Shutdown latch and the signal listener that sets it.
//!
//! Signal delivery only flips the latch. Everything that follows (stopping
//! the heartbeat, draining, the barrier) runs in the orchestrator's own
//! task, never inside the listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use herald_core::WorkerId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A flag that can be set at most once, observable both synchronously and
/// as a future.
#[derive(Clone, Debug, Default)]
pub struct ShutdownLatch {
    requested: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ShutdownLatch {
    /// Create an unset latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns `true` only for the call that set it.
    pub fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Token cancelled when the latch is set.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Listen for SIGINT and SIGTERM for the rest of the process lifetime and
/// set `latch` on each one. Repeated signals are logged and ignored.
#[cfg(unix)]
pub fn listen(latch: ShutdownLatch, worker: WorkerId) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigint.recv() => "SIGINT",
                else => break,
            };
            on_signal(&latch, worker, name);
        }
    }))
}

/// Listen for Ctrl-C and set `latch` on each one.
#[cfg(not(unix))]
pub fn listen(latch: ShutdownLatch, worker: WorkerId) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            on_signal(&latch, worker, "ctrl-c");
        }
    }))
}

fn on_signal(latch: &ShutdownLatch, worker: WorkerId, name: &str) {
    if latch.request() {
        info!(pid = worker.pid(), signal = name, "shutdown requested");
    } else {
        debug!(pid = worker.pid(), signal = name, "already shutting down, signal ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn initial_latch_is_unset() {
        let latch = ShutdownLatch::new();
        assert!(!latch.is_requested());
        assert!(!latch.token().is_cancelled());
    }

    #[test]
    fn only_first_request_wins() {
        let latch = ShutdownLatch::new();
        assert!(latch.request());
        assert!(!latch.request());
        assert!(!latch.request());
        assert!(latch.is_requested());
    }

    #[test]
    fn clones_share_state() {
        let latch = ShutdownLatch::new();
        let other = latch.clone();
        assert!(other.request());
        assert!(latch.is_requested());
        assert!(!latch.request());
    }

    #[test]
    fn request_cancels_token() {
        let latch = ShutdownLatch::new();
        let token = latch.token();
        let _ = latch.request();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn triggered_resolves_after_request() {
        let latch = ShutdownLatch::new();
        let waiter = latch.clone();
        let handle = tokio::spawn(async move {
            waiter.triggered().await;
            true
        });
        let _ = latch.request();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn triggered_pending_until_request() {
        let latch = ShutdownLatch::new();
        let pending = tokio::time::timeout(Duration::from_millis(20), latch.triggered()).await;
        assert!(pending.is_err());
    }

    #[test]
    fn repeated_signal_is_logged_once_as_request() {
        let (logs, _guard) = herald_core::logging::capture_logs();
        let latch = ShutdownLatch::new();
        let worker = WorkerId::from_pid(77);
        on_signal(&latch, worker, "SIGTERM");
        on_signal(&latch, worker, "SIGINT");
        assert_eq!(logs.count_matching("shutdown requested"), 1);
        assert_eq!(logs.count_matching("already shutting down"), 1);
    }
}
