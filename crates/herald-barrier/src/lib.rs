//! # herald-barrier
//!
//! A counting barrier shared by independent worker processes through a
//! directory on a common file system.
//!
//! Each worker writes `worker-<pid>.alive` when it starts and
//! `worker-<pid>.done` when it has drained its clients. A worker waiting on
//! the barrier polls the directory until the number of `done` markers
//! reaches the number of `alive` markers, or its timeout elapses.
//!
//! The directory offers no notification primitive, so the barrier polls.
//! Marker writes are published with an atomic rename; readers only ever see
//! complete markers, and anything that is not a marker name is ignored.

#![deny(unsafe_code)]

pub mod errors;
pub mod marker;
pub mod release;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use herald_core::WorkerId;
use tracing::{debug, info, warn};

pub use errors::{BarrierError, Result};
pub use marker::MarkerKind;
pub use release::{ExitRelease, MasterRelease};

/// Marker counts observed in one directory scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkerCounts {
    /// Workers that have started.
    pub alive: usize,
    /// Workers that have finished draining.
    pub done: usize,
}

impl MarkerCounts {
    /// Whether every started worker has finished.
    pub const fn all_done(self) -> bool {
        self.done >= self.alive
    }
}

/// How [`ShutdownBarrier::await_all_done`] ended. Neither case is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Every started worker marked done.
    AllDone {
        /// Counts at the final check.
        counts: MarkerCounts,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The timeout elapsed first; some sibling may have crashed.
    TimedOut {
        /// Counts at the final successful scan.
        counts: MarkerCounts,
        /// Time spent waiting.
        waited: Duration,
    },
}

impl BarrierOutcome {
    /// Whether the barrier resolved before the timeout.
    pub const fn is_all_done(&self) -> bool {
        matches!(self, Self::AllDone { .. })
    }

    /// Time spent in the wait.
    pub const fn waited(&self) -> Duration {
        match self {
            Self::AllDone { waited, .. } | Self::TimedOut { waited, .. } => *waited,
        }
    }
}

/// File-system counting barrier for one server instance.
pub struct ShutdownBarrier {
    dir: PathBuf,
    release: Arc<dyn MasterRelease>,
}

impl ShutdownBarrier {
    /// Barrier over `dir`, releasing the master by exiting the process.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_release(dir, Arc::new(ExitRelease::new()))
    }

    /// Barrier over `dir` with a custom release strategy.
    pub fn with_release(dir: impl Into<PathBuf>, release: Arc<dyn MasterRelease>) -> Self {
        Self {
            dir: dir.into(),
            release,
        }
    }

    /// The coordination directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete any previous contents and recreate an empty directory.
    ///
    /// Run once per server instance, before any worker marks itself alive.
    /// The master does this before spawning workers; running it while
    /// workers are live would erase their markers.
    pub fn reset(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "removed previous coordination directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(BarrierError::Reset {
                    path: self.dir.clone(),
                    source,
                });
            }
        }
        self.ensure()?;
        info!(dir = %self.dir.display(), "coordination directory reset");
        Ok(())
    }

    /// Create the directory if it does not exist. Never deletes anything,
    /// so concurrent callers cannot interfere with each other.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| BarrierError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    /// Write the `alive` marker for `worker`.
    pub fn mark_alive(&self, worker: WorkerId) -> Result<()> {
        self.write_marker(worker, MarkerKind::Alive)
    }

    /// Write the `done` marker for `worker`. Writing it again is a no-op in
    /// effect: the marker is replaced by an identical one.
    pub fn mark_done(&self, worker: WorkerId) -> Result<()> {
        self.write_marker(worker, MarkerKind::Done)
    }

    /// Number of `alive` markers currently in the directory.
    pub fn count_alive(&self) -> Result<usize> {
        self.counts().map(|c| c.alive)
    }

    /// Number of `done` markers currently in the directory.
    pub fn count_done(&self) -> Result<usize> {
        self.counts().map(|c| c.done)
    }

    /// Count both marker kinds in a single scan.
    pub fn counts(&self) -> Result<MarkerCounts> {
        let mut counts = MarkerCounts::default();
        for (_, kind) in self.scan()? {
            match kind {
                MarkerKind::Alive => counts.alive += 1,
                MarkerKind::Done => counts.done += 1,
            }
        }
        Ok(counts)
    }

    /// Workers with an `alive` marker but no `done` marker, sorted by PID.
    pub fn pending_workers(&self) -> Result<Vec<WorkerId>> {
        let markers = self.scan()?;
        let mut pending: Vec<WorkerId> = markers
            .iter()
            .filter(|(_, kind)| *kind == MarkerKind::Alive)
            .map(|(worker, _)| *worker)
            .filter(|worker| !markers.contains(&(*worker, MarkerKind::Done)))
            .collect();
        pending.sort_unstable();
        Ok(pending)
    }

    /// Block the calling thread until every started worker is done, or
    /// `timeout` has elapsed since the call began.
    ///
    /// This is a plain blocking wait, not an async one: its purpose is to keep
    /// the OS process alive until the barrier resolves. Scan failures are
    /// logged and treated as "not yet". The last sleep is clamped to the time
    /// remaining, so the call returns within `timeout` plus one scan.
    pub fn await_all_done(&self, poll_interval: Duration, timeout: Duration) -> BarrierOutcome {
        let start = Instant::now();
        let mut last = MarkerCounts::default();
        loop {
            match self.counts() {
                Ok(counts) => {
                    last = counts;
                    debug!(done = counts.done, alive = counts.alive, "waiting for sibling workers");
                    if counts.all_done() {
                        let waited = start.elapsed();
                        info!(
                            done = counts.done,
                            alive = counts.alive,
                            waited_ms = millis(waited),
                            "all workers completed graceful shutdown"
                        );
                        return BarrierOutcome::AllDone { counts, waited };
                    }
                }
                Err(e) => warn!(error = %e, "barrier scan failed, will retry"),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let pending = self.pending_workers().unwrap_or_default();
                warn!(
                    done = last.done,
                    alive = last.alive,
                    ?pending,
                    timeout_ms = millis(timeout),
                    "timed out waiting for sibling workers"
                );
                return BarrierOutcome::TimedOut {
                    counts: last,
                    waited: elapsed,
                };
            }
            std::thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }

    /// Tell the master this worker is finished. Best-effort and not retried;
    /// with the default strategy this does not return.
    pub fn release_master(&self, worker: WorkerId) {
        self.release.release(worker);
    }

    fn write_marker(&self, worker: WorkerId, kind: MarkerKind) -> Result<()> {
        let path = self.dir.join(marker::file_name(worker, kind));
        let write_err = |source: std::io::Error| BarrierError::WriteMarker {
            path: path.clone(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".marker-")
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        tmp.write_all(kind.as_str().as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        let _ = tmp.persist(&path).map_err(|e| write_err(e.error))?;

        debug!(pid = worker.pid(), %kind, path = %path.display(), "marker written");
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(WorkerId, MarkerKind)>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| BarrierError::Scan {
            path: self.dir.clone(),
            source,
        })?;
        // An entry that vanishes or is unreadable mid-scan is skipped.
        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| marker::parse_file_name(entry.file_name().to_str()?))
            .collect())
    }
}

impl std::fmt::Debug for ShutdownBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownBarrier")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    const W100: WorkerId = WorkerId::from_pid(100);
    const W200: WorkerId = WorkerId::from_pid(200);

    #[derive(Default)]
    struct RecordingRelease {
        released: Mutex<Vec<WorkerId>>,
    }

    impl MasterRelease for RecordingRelease {
        fn release(&self, worker: WorkerId) {
            self.released.lock().push(worker);
        }
    }

    fn make_barrier() -> (TempDir, ShutdownBarrier) {
        let tmp = TempDir::new().unwrap();
        let barrier = ShutdownBarrier::new(tmp.path().join("shutdown-coordination"));
        barrier.reset().unwrap();
        (tmp, barrier)
    }

    #[test]
    fn reset_creates_empty_directory() {
        let (_tmp, barrier) = make_barrier();
        assert!(barrier.dir().is_dir());
        assert_eq!(barrier.counts().unwrap(), MarkerCounts::default());
    }

    #[test]
    fn reset_wipes_previous_markers() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();
        std::fs::write(barrier.dir().join("leftover.txt"), "x").unwrap();

        barrier.reset().unwrap();
        assert_eq!(barrier.count_alive().unwrap(), 0);
        assert_eq!(barrier.count_done().unwrap(), 0);
        assert_eq!(std::fs::read_dir(barrier.dir()).unwrap().count(), 0);
    }

    #[test]
    fn reset_twice_is_harmless() {
        let (_tmp, barrier) = make_barrier();
        barrier.reset().unwrap();
        assert!(barrier.dir().is_dir());
    }

    #[test]
    fn ensure_keeps_existing_markers() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.ensure().unwrap();
        assert_eq!(barrier.count_alive().unwrap(), 1);
    }

    #[test]
    fn mark_alive_is_visible_to_other_observers() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();

        let sibling = ShutdownBarrier::new(barrier.dir());
        assert!(sibling.count_alive().unwrap() >= 1);
        assert_eq!(sibling.pending_workers().unwrap(), vec![W100]);
    }

    #[test]
    fn marker_content_is_kind_token() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();
        let alive = std::fs::read_to_string(barrier.dir().join("worker-100.alive")).unwrap();
        let done = std::fs::read_to_string(barrier.dir().join("worker-100.done")).unwrap();
        assert_eq!(alive, "alive");
        assert_eq!(done, "done");
    }

    #[test]
    fn mark_done_twice_counts_once() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();
        assert_eq!(barrier.count_done().unwrap(), 1);
        barrier.mark_done(W100).unwrap();
        assert_eq!(barrier.count_done().unwrap(), 1);
    }

    #[test]
    fn no_temporary_files_left_behind() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();
        let names: Vec<String> = std::fs::read_dir(barrier.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    #[test]
    fn partial_and_foreign_files_are_ignored() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        // An in-flight write from another worker and an unrelated file.
        std::fs::write(barrier.dir().join(".marker-Xy12ab"), "").unwrap();
        std::fs::write(barrier.dir().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(barrier.dir().join("worker-300.alive.d")).unwrap();

        assert_eq!(
            barrier.counts().unwrap(),
            MarkerCounts { alive: 1, done: 0 }
        );
    }

    #[test]
    fn writing_into_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let barrier = ShutdownBarrier::new(tmp.path().join("never-created"));
        let err = barrier.mark_alive(W100).unwrap_err();
        assert!(matches!(err, BarrierError::WriteMarker { .. }));
    }

    #[test]
    fn scanning_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let barrier = ShutdownBarrier::new(tmp.path().join("never-created"));
        assert!(matches!(barrier.counts(), Err(BarrierError::Scan { .. })));
    }

    #[test]
    fn pending_workers_excludes_done() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W200).unwrap();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();
        assert_eq!(barrier.pending_workers().unwrap(), vec![W200]);
    }

    #[test]
    fn single_worker_resolves_promptly() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_done(W100).unwrap();

        let outcome = barrier.await_all_done(Duration::from_secs(1), Duration::from_secs(30));
        assert!(outcome.is_all_done());
        assert!(outcome.waited() < Duration::from_secs(1));
        assert_eq!(
            outcome,
            BarrierOutcome::AllDone {
                counts: MarkerCounts { alive: 1, done: 1 },
                waited: outcome.waited(),
            }
        );
    }

    #[test]
    fn missing_sibling_waits_for_full_timeout() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_alive(W200).unwrap();
        barrier.mark_done(W100).unwrap();

        let poll = Duration::from_millis(100);
        let timeout = Duration::from_millis(500);
        let started = Instant::now();
        let outcome = barrier.await_all_done(poll, timeout);
        let elapsed = started.elapsed();

        assert!(!outcome.is_all_done());
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(elapsed < timeout + poll + Duration::from_millis(400));
        match outcome {
            BarrierOutcome::TimedOut { counts, .. } => {
                assert_eq!(counts, MarkerCounts { alive: 2, done: 1 });
            }
            BarrierOutcome::AllDone { .. } => panic!("expected timeout"),
        }
    }

    #[test]
    fn zero_timeout_still_checks_once() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        let outcome = barrier.await_all_done(Duration::from_secs(5), Duration::ZERO);
        assert!(!outcome.is_all_done());
        assert!(outcome.waited() < Duration::from_secs(1));
    }

    #[test]
    fn timeout_bound_holds_with_long_poll_interval() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W200).unwrap();

        let started = Instant::now();
        let _ = barrier.await_all_done(Duration::from_secs(10), Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn waiter_resolves_when_sibling_finishes() {
        let (_tmp, barrier) = make_barrier();
        barrier.mark_alive(W100).unwrap();
        barrier.mark_alive(W200).unwrap();
        barrier.mark_done(W100).unwrap();

        let dir = barrier.dir().to_path_buf();
        let sibling = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            ShutdownBarrier::new(dir).mark_done(W200).unwrap();
        });

        let outcome = barrier.await_all_done(Duration::from_millis(50), Duration::from_secs(5));
        sibling.join().unwrap();

        assert!(outcome.is_all_done());
        assert!(outcome.waited() >= Duration::from_millis(150));
        assert!(outcome.waited() < Duration::from_secs(5));
    }

    #[test]
    fn waiter_keeps_polling_while_directory_is_missing() {
        let tmp = TempDir::new().unwrap();
        let barrier = ShutdownBarrier::new(tmp.path().join("late"));
        let outcome = barrier.await_all_done(Duration::from_millis(20), Duration::from_millis(100));
        assert!(!outcome.is_all_done());
        assert!(outcome.waited() >= Duration::from_millis(100));
    }

    #[test]
    fn release_master_uses_strategy() {
        let tmp = TempDir::new().unwrap();
        let release = Arc::new(RecordingRelease::default());
        let barrier = ShutdownBarrier::with_release(tmp.path(), release.clone());
        barrier.release_master(W100);
        assert_eq!(*release.released.lock(), vec![W100]);
    }

    #[test]
    fn all_done_comparison() {
        assert!(MarkerCounts { alive: 0, done: 0 }.all_done());
        assert!(MarkerCounts { alive: 2, done: 2 }.all_done());
        assert!(MarkerCounts { alive: 1, done: 2 }.all_done());
        assert!(!MarkerCounts { alive: 3, done: 2 }.all_done());
    }
}
