//! Master process: owns the worker pool for one server instance.
//!
//! The master resets the coordination directory before any worker starts,
//! so workers never race each other on it. It does not respawn workers; an
//! exited worker stays gone. Termination signals are forwarded to every
//! worker once, and the master returns after the last worker has exited.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use herald_barrier::ShutdownBarrier;
use herald_core::WorkerId;
use herald_core::constants::{MASTER_PID_ENV, WORKER_RELEASED_EXIT_CODE};
use herald_server::signals::{self, ShutdownLatch};
use herald_settings::HeraldSettings;
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Environment key that pins workers to the master's coordination directory.
const COORDINATION_DIR_ENV: &str = "HERALD_SHUTDOWN__COORDINATION_DIR";

/// How a worker process ended, from the master's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// Finished the shutdown barrier and released the master.
    Released,
    /// Exited with status 0.
    Clean,
    /// Any other status, or killed by a signal (`None`).
    Abnormal(Option<i32>),
}

impl WorkerExit {
    /// Classify a raw exit code.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(WORKER_RELEASED_EXIT_CODE) => Self::Released,
            Some(0) => Self::Clean,
            other => Self::Abnormal(other),
        }
    }
}

/// Run the master until every worker has exited.
pub fn run(settings: &HeraldSettings, settings_path: Option<&Path>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build master runtime")?;
    runtime.block_on(supervise(settings, settings_path))
}

async fn supervise(settings: &HeraldSettings, settings_path: Option<&Path>) -> Result<()> {
    let master = WorkerId::current();
    let dir = settings.coordination_dir();
    ShutdownBarrier::new(&dir)
        .reset()
        .with_context(|| format!("Failed to reset coordination directory {}", dir.display()))?;

    let latch = ShutdownLatch::new();
    let _signals = signals::listen(latch.clone(), master).context("Failed to install signal handlers")?;

    let exe = std::env::current_exe().context("Failed to locate the herald executable")?;
    let commands =
        (0..settings.server.workers).map(|_| worker_command(&exe, settings, settings_path, &dir, master));
    let mut pool = WorkerPool::start(commands).await?;
    info!(
        pid = master.pid(),
        workers = pool.pids.len(),
        host = %settings.server.host,
        port = settings.server.port,
        dir = %dir.display(),
        "worker pool started"
    );

    let mut forwarded = false;
    loop {
        tokio::select! {
            () = latch.triggered(), if !forwarded => {
                forwarded = true;
                forward_shutdown(&pool.pids);
            }
            joined = pool.children.join_next() => match joined {
                None => break,
                Some(joined) => reap(joined),
            }
        }
    }

    info!(pid = master.pid(), "all workers exited");
    Ok(())
}

type Reaped = (u32, std::io::Result<ExitStatus>);

/// Running worker processes and the tasks waiting on them.
#[derive(Default)]
struct WorkerPool {
    children: JoinSet<Reaped>,
    pids: Vec<u32>,
}

impl WorkerPool {
    /// Spawn one worker per command. If any spawn fails, the workers already
    /// running are terminated and reaped before the error is returned.
    async fn start(commands: impl IntoIterator<Item = Command>) -> Result<Self> {
        let mut pool = Self::default();
        for mut cmd in commands {
            match cmd.spawn() {
                Ok(child) => pool.track(child),
                Err(e) => {
                    error!(started = pool.pids.len(), error = %e, "worker spawn failed, stopping pool");
                    pool.shutdown().await;
                    return Err(e).context("Failed to spawn worker");
                }
            }
        }
        Ok(pool)
    }

    fn track(&mut self, mut child: Child) {
        let Some(pid) = child.id() else {
            warn!("spawned worker exited before its pid was read");
            return;
        };
        self.pids.push(pid);
        let _ = self.children.spawn(async move { (pid, child.wait().await) });
    }

    /// Signal every worker and wait for all of them to exit.
    async fn shutdown(&mut self) {
        forward_shutdown(&self.pids);
        while let Some(joined) = self.children.join_next().await {
            reap(joined);
        }
    }
}

fn reap(joined: Result<Reaped, JoinError>) {
    match joined {
        Ok((pid, Ok(status))) => report_exit(pid, status),
        Ok((pid, Err(e))) => warn!(worker_pid = pid, error = %e, "failed to wait for worker"),
        Err(e) => warn!(error = %e, "worker wait task failed"),
    }
}

/// Command line for one worker, inheriting the master's effective settings.
fn worker_command(
    exe: &Path,
    settings: &HeraldSettings,
    settings_path: Option<&Path>,
    dir: &Path,
    master: WorkerId,
) -> Command {
    let mut cmd = Command::new(exe);
    let _ = cmd
        .arg("worker")
        .arg("--host")
        .arg(&settings.server.host)
        .arg("--port")
        .arg(settings.server.port.to_string());
    if let Some(path) = settings_path {
        let _ = cmd.arg("--settings").arg(path);
    }
    let _ = cmd
        .env(MASTER_PID_ENV, master.to_string())
        .env(COORDINATION_DIR_ENV, dir)
        .stdin(Stdio::null())
        .kill_on_drop(false);
    cmd
}

fn forward_shutdown(pids: &[u32]) {
    info!(workers = pids.len(), "forwarding shutdown to workers");
    for &pid in pids {
        if let Err(e) = send_terminate(pid) {
            // ESRCH: the worker already exited
            warn!(worker_pid = pid, error = %e, "failed to signal worker");
        }
    }
}

fn report_exit(pid: u32, status: ExitStatus) {
    match WorkerExit::from_code(status.code()) {
        WorkerExit::Released => info!(worker_pid = pid, "worker completed shutdown"),
        WorkerExit::Clean => info!(worker_pid = pid, "worker exited"),
        WorkerExit::Abnormal(code) => error!(worker_pid = pid, ?code, %status, "worker exited abnormally"),
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes no pointers; a stale pid only yields ESRCH.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signal forwarding requires a Unix platform",
    ))
}
