//! Periodic "server is running" broadcast.

use std::sync::Arc;
use std::time::Duration;

use herald_core::notices;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::ConnectionRegistry;

/// Broadcast [`notices::HEARTBEAT`] to every member each `interval` until
/// `cancel` fires. The first beat goes out immediately.
///
/// Returns the number of beats sent.
pub async fn run_heartbeat(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut beats: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(beats, "heartbeat stopped");
                return beats;
            }
            _ = ticker.tick() => {
                let report = registry.broadcast(notices::HEARTBEAT);
                beats += 1;
                debug!(beats, delivered = report.delivered, "heartbeat sent");
            }
        }
    }
}
