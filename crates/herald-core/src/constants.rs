//! Package-level constants.

/// Current version of herald (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "herald";

/// Exit status a worker uses to tell the master it finished the shutdown
/// barrier and has left the pool.
///
/// The master treats this status as an orderly release; any other non-zero
/// status from a worker is reported as an abnormal exit.
pub const WORKER_RELEASED_EXIT_CODE: i32 = 3;

/// Environment variable the master sets on spawned workers so they skip
/// resetting the coordination directory.
pub const MASTER_PID_ENV: &str = "HERALD_MASTER_PID";
