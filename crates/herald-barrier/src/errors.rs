//! Barrier error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures touching the coordination directory.
///
/// None of these are fatal to a worker: a worker that cannot write its
/// marker still waits on the barrier, which then ends by timeout.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// Removing the previous directory contents failed.
    #[error("failed to reset coordination directory {path}: {source}")]
    Reset {
        /// Directory being reset.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Creating the directory failed.
    #[error("failed to create coordination directory {path}: {source}")]
    CreateDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing or publishing a marker file failed.
    #[error("failed to write marker {path}: {source}")]
    WriteMarker {
        /// Marker file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Listing the directory failed.
    #[error("failed to scan coordination directory {path}: {source}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for barrier operations.
pub type Result<T> = std::result::Result<T, BarrierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_marker_display_names_path() {
        let err = BarrierError::WriteMarker {
            path: PathBuf::from("/tmp/x/worker-1.done"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("worker-1.done"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;
        let err = BarrierError::Scan {
            path: PathBuf::from("/missing"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }
}
