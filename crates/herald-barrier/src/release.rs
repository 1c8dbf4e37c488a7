//! Telling the master that a worker has left the pool.
//!
//! The master learns about a finished worker from the worker's exit status.
//! Notification and removal from the pool are therefore the same OS-level
//! event; [`ExitRelease`] makes that coupling explicit, and the
//! [`MasterRelease`] seam lets tests observe a release without exiting.

use herald_core::WorkerId;
use herald_core::constants::WORKER_RELEASED_EXIT_CODE;
use tracing::info;

/// Final step of the shutdown protocol.
pub trait MasterRelease: Send + Sync {
    /// Signal the master that `worker` is finished.
    ///
    /// Production implementations do not return.
    fn release(&self, worker: WorkerId);
}

/// Terminates the process with a dedicated non-zero status.
#[derive(Clone, Copy, Debug)]
pub struct ExitRelease {
    code: i32,
}

impl ExitRelease {
    /// Release with [`WORKER_RELEASED_EXIT_CODE`].
    pub const fn new() -> Self {
        Self {
            code: WORKER_RELEASED_EXIT_CODE,
        }
    }

    /// The exit status this release uses.
    pub const fn code(&self) -> i32 {
        self.code
    }
}

impl Default for ExitRelease {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterRelease for ExitRelease {
    fn release(&self, worker: WorkerId) {
        info!(pid = worker.pid(), code = self.code, "releasing master, exiting worker");
        std::process::exit(self.code);
    }
}
