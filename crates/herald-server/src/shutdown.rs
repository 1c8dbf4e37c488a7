//! Per-worker shutdown state machine.
//!
//! ```text
//! Running ──latch──▶ Draining ──empty or timeout──▶ BarrierWait ──▶ Terminating
//! ```
//!
//! Transitions are monotonic. `start` and `drain` run inside the worker's
//! runtime; `wait_for_siblings` blocks the calling thread and is meant to run
//! after the runtime is gone, so remaining sockets are already closed while
//! the process waits on its siblings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use herald_barrier::{BarrierOutcome, ShutdownBarrier};
use herald_core::{WorkerId, notices};
use herald_settings::ShutdownSettings;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::signals::ShutdownLatch;
use crate::websocket::heartbeat::run_heartbeat;
use crate::websocket::registry::ConnectionRegistry;

/// Lifecycle phase of one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ShutdownState {
    /// Serving clients, heartbeat active.
    Running = 0,
    /// Repeating the shutdown notice until clients leave.
    Draining = 1,
    /// Waiting for sibling workers to finish draining.
    BarrierWait = 2,
    /// Releasing the master.
    Terminating = 3,
}

impl ShutdownState {
    /// Lowercase name used in logs and `/health`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::BarrierWait => "barrier_wait",
            Self::Terminating => "terminating",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            2 => Self::BarrierWait,
            _ => Self::Terminating,
        }
    }
}

impl std::fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, forward-only view of a worker's [`ShutdownState`].
#[derive(Clone, Debug, Default)]
pub struct ShutdownStateCell(Arc<AtomicU8>);

impl ShutdownStateCell {
    /// A cell in [`ShutdownState::Running`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn get(&self) -> ShutdownState {
        ShutdownState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move to `next` if it is strictly later than the current state.
    /// Returns whether the transition happened.
    pub fn advance(&self, next: ShutdownState) -> bool {
        let target = next as u8;
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (target > current).then_some(target)
            })
            .is_ok()
    }
}

/// Timing knobs for the shutdown protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownTimings {
    /// Period of the "running" notice.
    pub heartbeat_interval: Duration,
    /// Period of the shutdown notice while draining.
    pub drain_interval: Duration,
    /// Longest time spent draining.
    pub drain_timeout: Duration,
    /// Barrier re-check period.
    pub barrier_poll_interval: Duration,
    /// Longest time spent waiting on siblings.
    pub barrier_timeout: Duration,
}

impl ShutdownTimings {
    /// Timings from the `shutdown` settings section.
    pub fn from_settings(settings: &ShutdownSettings) -> Self {
        Self {
            heartbeat_interval: settings.heartbeat_interval(),
            drain_interval: settings.drain_interval(),
            drain_timeout: settings.drain_timeout(),
            barrier_poll_interval: settings.barrier_poll_interval(),
            barrier_timeout: settings.barrier_timeout(),
        }
    }
}

impl Default for ShutdownTimings {
    fn default() -> Self {
        Self::from_settings(&ShutdownSettings::default())
    }
}

/// How the drain phase ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every client disconnected.
    Emptied {
        /// Shutdown notices broadcast.
        notices: u32,
        /// Time spent draining.
        elapsed: Duration,
    },
    /// The drain timeout passed with clients still connected.
    TimedOut {
        /// Shutdown notices broadcast.
        notices: u32,
        /// Clients still connected.
        remaining: usize,
        /// Time spent draining.
        elapsed: Duration,
    },
    /// Draining had already happened; nothing was done.
    AlreadyDrained,
}

/// Drives one worker from `Running` to `Terminating`.
pub struct ShutdownOrchestrator {
    worker: WorkerId,
    registry: Arc<ConnectionRegistry>,
    barrier: Arc<ShutdownBarrier>,
    latch: ShutdownLatch,
    timings: ShutdownTimings,
    state: ShutdownStateCell,
    heartbeat_cancel: CancellationToken,
    heartbeat: Option<JoinHandle<u64>>,
}

impl ShutdownOrchestrator {
    /// Create an orchestrator in the `Running` state. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(
        worker: WorkerId,
        registry: Arc<ConnectionRegistry>,
        barrier: Arc<ShutdownBarrier>,
        latch: ShutdownLatch,
        timings: ShutdownTimings,
        state: ShutdownStateCell,
    ) -> Self {
        Self {
            worker,
            registry,
            barrier,
            latch,
            timings,
            state,
            heartbeat_cancel: CancellationToken::new(),
            heartbeat: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ShutdownState {
        self.state.get()
    }

    /// The latch this orchestrator waits on.
    pub fn latch(&self) -> &ShutdownLatch {
        &self.latch
    }

    /// Join the barrier and start the heartbeat. Must run inside a runtime.
    ///
    /// A failed `alive` marker is logged and otherwise ignored: this worker
    /// then does not hold the barrier for its siblings.
    pub fn start(&mut self) {
        let pid = self.worker.pid();
        match self.barrier.mark_alive(self.worker) {
            Ok(()) => info!(pid, dir = %self.barrier.dir().display(), "worker joined shutdown barrier"),
            Err(e) => error!(pid, error = %e, "failed to write alive marker"),
        }

        if self.heartbeat.is_none() {
            self.heartbeat = Some(tokio::spawn(run_heartbeat(
                Arc::clone(&self.registry),
                self.timings.heartbeat_interval,
                self.heartbeat_cancel.clone(),
            )));
        }
    }

    /// Wait for the latch, then drain this worker's clients.
    ///
    /// Repeats the shutdown notice every drain interval until no client is
    /// left or the drain timeout has passed. Only the first call drains.
    pub async fn drain(&mut self) -> DrainOutcome {
        self.latch.triggered().await;
        if !self.state.advance(ShutdownState::Draining) {
            debug!(pid = self.worker.pid(), state = %self.state(), "drain already done");
            return DrainOutcome::AlreadyDrained;
        }
        info!(pid = self.worker.pid(), "graceful shutdown started");
        self.stop_heartbeat().await;

        let started = Instant::now();
        let mut sent: u32 = 0;
        loop {
            let remaining = self.registry.len();
            let elapsed = started.elapsed();
            if remaining == 0 {
                info!(
                    pid = self.worker.pid(),
                    notices = sent,
                    elapsed_ms = millis(elapsed),
                    "all clients disconnected"
                );
                return DrainOutcome::Emptied {
                    notices: sent,
                    elapsed,
                };
            }
            if elapsed > self.timings.drain_timeout {
                warn!(
                    pid = self.worker.pid(),
                    remaining,
                    notices = sent,
                    "drain timeout reached, closing remaining connections"
                );
                return DrainOutcome::TimedOut {
                    notices: sent,
                    remaining,
                    elapsed,
                };
            }

            let _ = self.registry.broadcast(notices::SHUTTING_DOWN);
            sent += 1;
            let time_left = self.timings.drain_timeout.saturating_sub(elapsed);
            info!(
                pid = self.worker.pid(),
                active_connections = remaining,
                time_left_secs = time_left.as_secs(),
                "waiting for clients to disconnect"
            );
            tokio::time::sleep(self.timings.drain_interval).await;
        }
    }

    /// Mark this worker done and block until every sibling is done or the
    /// barrier timeout elapses.
    ///
    /// Returns `None` if this worker already passed the barrier.
    pub fn wait_for_siblings(&self) -> Option<BarrierOutcome> {
        if !self.state.advance(ShutdownState::BarrierWait) {
            debug!(pid = self.worker.pid(), state = %self.state(), "barrier already passed");
            return None;
        }
        let pid = self.worker.pid();
        if let Err(e) = self.barrier.mark_done(self.worker) {
            error!(pid, error = %e, "failed to write done marker");
        }
        info!(pid, "waiting for sibling workers");
        Some(self.barrier.await_all_done(
            self.timings.barrier_poll_interval,
            self.timings.barrier_timeout,
        ))
    }

    /// Release the master. With the production release strategy this ends
    /// the process.
    pub fn terminate(self) {
        let _ = self.state.advance(ShutdownState::Terminating);
        info!(pid = self.worker.pid(), "worker terminating");
        self.barrier.release_master(self.worker);
    }

    async fn stop_heartbeat(&mut self) {
        self.heartbeat_cancel.cancel();
        if let Some(handle) = self.heartbeat.take() {
            match handle.await {
                Ok(beats) => debug!(beats, "heartbeat joined"),
                Err(e) => warn!(error = %e, "heartbeat task failed"),
            }
        }
    }
}

impl Drop for ShutdownOrchestrator {
    fn drop(&mut self) {
        self.heartbeat_cancel.cancel();
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
