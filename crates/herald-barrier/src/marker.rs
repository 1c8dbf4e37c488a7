//! Marker file naming.
//!
//! A marker is `worker-<pid>.<kind>`. Anything else in the directory
//! (temporary files from an in-flight write, editor droppings) is ignored.

use std::fmt;

use herald_core::WorkerId;

const PREFIX: &str = "worker-";

/// What a marker file announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// The worker has started and counts toward the barrier.
    Alive,
    /// The worker finished draining.
    Done,
}

impl MarkerKind {
    /// File extension and file content token.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Done => "done",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "alive" => Some(Self::Alive),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File name of the `kind` marker for `worker`.
pub fn file_name(worker: WorkerId, kind: MarkerKind) -> String {
    format!("{PREFIX}{}.{}", worker.pid(), kind.as_str())
}

/// Parse a directory entry name back into its worker and kind.
pub fn parse_file_name(name: &str) -> Option<(WorkerId, MarkerKind)> {
    let rest = name.strip_prefix(PREFIX)?;
    let (pid, ext) = rest.split_once('.')?;
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let pid: u32 = pid.parse().ok()?;
    Some((WorkerId::from_pid(pid), MarkerKind::parse(ext)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_file_name() {
        assert_eq!(file_name(WorkerId::from_pid(100), MarkerKind::Alive), "worker-100.alive");
    }

    #[test]
    fn done_file_name() {
        assert_eq!(file_name(WorkerId::from_pid(200), MarkerKind::Done), "worker-200.done");
    }

    #[test]
    fn parse_valid_names() {
        assert_eq!(
            parse_file_name("worker-100.alive"),
            Some((WorkerId::from_pid(100), MarkerKind::Alive))
        );
        assert_eq!(
            parse_file_name("worker-7.done"),
            Some((WorkerId::from_pid(7), MarkerKind::Done))
        );
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert_eq!(parse_file_name(".marker-abc123"), None);
        assert_eq!(parse_file_name("worker-.alive"), None);
        assert_eq!(parse_file_name("worker-12.alive.tmp"), None);
        assert_eq!(parse_file_name("worker-12.stale"), None);
        assert_eq!(parse_file_name("worker-+12.done"), None);
        assert_eq!(parse_file_name("worker-abc.done"), None);
        assert_eq!(parse_file_name("README"), None);
    }

    #[test]
    fn kind_display() {
        assert_eq!(MarkerKind::Alive.to_string(), "alive");
        assert_eq!(MarkerKind::Done.to_string(), "done");
    }
}
