//! `/health` endpoint.

use std::time::Instant;

use herald_core::WorkerId;
use serde::Serialize;

use crate::shutdown::ShutdownState;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while running, `"shutting_down"` once shutdown has begun.
    pub status: &'static str,
    /// Current shutdown phase.
    pub state: ShutdownState,
    /// PID of the answering worker.
    pub worker_pid: u32,
    /// Seconds since the worker started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count on this worker.
    pub connections: usize,
}

impl HealthResponse {
    /// Whether the worker still accepts clients.
    pub fn is_serving(&self) -> bool {
        self.state == ShutdownState::Running
    }
}

/// Build a health response from live counters.
pub fn health_check(
    worker: WorkerId,
    state: ShutdownState,
    start_time: Instant,
    connections: usize,
) -> HealthResponse {
    let status = if state == ShutdownState::Running {
        "ok"
    } else {
        "shutting_down"
    };
    HealthResponse {
        status,
        state,
        worker_pid: worker.pid(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> HealthResponse {
        health_check(WorkerId::from_pid(10), ShutdownState::Running, Instant::now(), 0)
    }

    #[test]
    fn status_is_ok_while_running() {
        let resp = running();
        assert_eq!(resp.status, "ok");
        assert!(resp.is_serving());
    }

    #[test]
    fn status_reports_shutdown() {
        let resp = health_check(WorkerId::from_pid(10), ShutdownState::Draining, Instant::now(), 3);
        assert_eq!(resp.status, "shutting_down");
        assert!(!resp.is_serving());
        assert_eq!(resp.connections, 3);
    }

    #[test]
    fn uptime_starts_at_zero() {
        assert!(running().uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(WorkerId::from_pid(1), ShutdownState::Running, start, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(WorkerId::from_pid(321), ShutdownState::BarrierWait, Instant::now(), 2);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "shutting_down");
        assert_eq!(parsed["state"], "barrier_wait");
        assert_eq!(parsed["worker_pid"], 321);
        assert_eq!(parsed["connections"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}
