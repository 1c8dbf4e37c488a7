//! Worker process: serve clients, then run the shutdown protocol.
//!
//! The async part (serving, heartbeat, drain) runs on a current-thread
//! runtime. That runtime is dropped before the barrier wait, which closes
//! any socket still open, and the wait then blocks the main thread so the
//! process cannot be reaped before its siblings are done.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use herald_barrier::{BarrierOutcome, ShutdownBarrier};
use herald_core::WorkerId;
use herald_core::constants::MASTER_PID_ENV;
use herald_server::{DrainOutcome, HeraldServer, ServerConfig, ShutdownOrchestrator, ShutdownTimings, signals};
use herald_settings::HeraldSettings;
use tracing::{debug, info, warn};

/// How long closed sessions get to flush their close frames.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Run one worker to completion. With the production release strategy this
/// ends the process from inside [`ShutdownOrchestrator::terminate`].
pub fn run(settings: &HeraldSettings, join_barrier: bool) -> Result<()> {
    let worker = WorkerId::current();
    let master = std::env::var(MASTER_PID_ENV).ok();
    let barrier = Arc::new(ShutdownBarrier::new(settings.coordination_dir()));
    prepare_barrier(&barrier, join_barrier, master.as_deref())?;

    let server = HeraldServer::new(ServerConfig::from_settings(settings), worker);
    let timings = ShutdownTimings::from_settings(&settings.shutdown);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build worker runtime")?;
    let orchestrator = runtime.block_on(serve_until_drained(&server, barrier, timings))?;
    drop(runtime);
    debug!(pid = worker.pid(), "worker runtime stopped");

    match orchestrator.wait_for_siblings() {
        Some(BarrierOutcome::AllDone { .. }) | None => {}
        Some(BarrierOutcome::TimedOut { counts, .. }) => warn!(
            pid = worker.pid(),
            done = counts.done,
            alive = counts.alive,
            "proceeding without every sibling"
        ),
    }
    orchestrator.terminate();
    Ok(())
}

/// Set up the coordination directory. A worker without a master is the
/// first worker, so it clears markers left by earlier runs unless told to
/// join a directory shared with other standalone workers.
fn prepare_barrier(barrier: &ShutdownBarrier, join: bool, master: Option<&str>) -> Result<()> {
    let dir = barrier.dir().display().to_string();
    if master.is_none() && !join {
        debug!(dir = %dir, "clearing coordination directory");
        return barrier
            .reset()
            .with_context(|| format!("Failed to reset coordination directory {dir}"));
    }
    barrier
        .ensure()
        .with_context(|| format!("Failed to create coordination directory {dir}"))
}

async fn serve_until_drained(
    server: &HeraldServer,
    barrier: Arc<ShutdownBarrier>,
    timings: ShutdownTimings,
) -> Result<ShutdownOrchestrator> {
    let pid = server.worker().pid();
    let listener = server.bind().await.context("Failed to start listener")?;
    let _signals =
        signals::listen(server.latch().clone(), server.worker()).context("Failed to install signal handlers")?;

    // alive before the first accept, so every client counts toward the barrier
    let mut orchestrator = server.orchestrator(barrier, timings);
    orchestrator.start();
    let serve = server.serve(listener);

    match orchestrator.drain().await {
        DrainOutcome::Emptied { notices, elapsed } => {
            debug!(pid, notices, ?elapsed, "drain finished");
        }
        DrainOutcome::TimedOut { remaining, .. } => {
            info!(pid, remaining, "closing connections that outlived the drain");
        }
        DrainOutcome::AlreadyDrained => {}
    }

    let closed = server.close_sessions(CLOSE_GRACE).await;
    if closed > 0 {
        info!(pid, closed, "remaining connections closed");
    }
    match tokio::time::timeout(CLOSE_GRACE, serve).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(pid, error = %e, "server stopped with error"),
        Ok(Err(e)) => warn!(pid, error = %e, "server task failed"),
        Err(_) => warn!(pid, "server did not stop within the grace period"),
    }
    Ok(orchestrator)
}
