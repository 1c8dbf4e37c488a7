//! Settings schema.
//!
//! All durations are stored as milliseconds so they survive JSON and
//! environment layers unchanged; accessor methods convert to [`Duration`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldSettings {
    /// Listening endpoint and worker pool.
    pub server: ServerSettings,
    /// Heartbeat, drain and barrier timing.
    pub shutdown: ShutdownSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

impl HeraldSettings {
    /// Directory used for shutdown barrier markers.
    ///
    /// Defaults to `<temp dir>/herald-shutdown-<port>` so two server
    /// instances on different ports never share markers.
    pub fn coordination_dir(&self) -> PathBuf {
        self.shutdown.coordination_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("herald-shutdown-{}", self.server.port))
        })
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.workers == 0 {
            return Err(SettingsError::InvalidValue(
                "server.workers must be at least 1".into(),
            ));
        }
        if self.server.send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.send_queue must be at least 1".into(),
            ));
        }
        let intervals = [
            ("shutdown.heartbeat_interval_ms", self.shutdown.heartbeat_interval_ms),
            ("shutdown.drain_interval_ms", self.shutdown.drain_interval_ms),
            ("shutdown.barrier_poll_interval_ms", self.shutdown.barrier_poll_interval_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{key} must be positive")));
            }
        }
        Ok(())
    }
}

/// Server network and worker pool settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port shared by every worker.
    pub port: u16,
    /// Number of worker processes the master spawns.
    pub workers: usize,
    /// Outbound queue length per connection before messages are dropped.
    pub send_queue: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: 4,
            send_queue: 256,
            max_message_size: 64 * 1024,
        }
    }
}

/// Shutdown protocol timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Override for the barrier marker directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordination_dir: Option<PathBuf>,
    /// Interval between "running" heartbeats while serving.
    pub heartbeat_interval_ms: u64,
    /// Interval between shutdown notices while draining.
    pub drain_interval_ms: u64,
    /// Maximum time spent draining clients.
    pub drain_timeout_ms: u64,
    /// Interval between barrier directory scans.
    pub barrier_poll_interval_ms: u64,
    /// Maximum time spent waiting for sibling workers.
    pub barrier_timeout_ms: u64,
}

impl ShutdownSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Drain notice interval as a [`Duration`].
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Barrier poll interval as a [`Duration`].
    pub fn barrier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_interval_ms)
    }

    /// Barrier timeout as a [`Duration`].
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            coordination_dir: None,
            heartbeat_interval_ms: 10_000,
            drain_interval_ms: 5_000,
            drain_timeout_ms: 30 * 60 * 1000,
            barrier_poll_interval_ms: 5_000,
            barrier_timeout_ms: 30 * 60 * 1000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8000);
        assert_eq!(s.workers, 4);
        assert_eq!(s.send_queue, 256);
    }

    #[test]
    fn default_shutdown_timings() {
        let s = ShutdownSettings::default();
        assert_eq!(s.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(s.drain_interval(), Duration::from_secs(5));
        assert_eq!(s.drain_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(s.barrier_poll_interval(), Duration::from_secs(5));
        assert_eq!(s.barrier_timeout(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn default_logging() {
        let s = LoggingSettings::default();
        assert_eq!(s.level, "info");
        assert!(!s.json);
    }

    #[test]
    fn coordination_dir_defaults_per_port() {
        let mut settings = HeraldSettings::default();
        settings.server.port = 9123;
        let dir = settings.coordination_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with("herald-shutdown-9123"));
    }

    #[test]
    fn coordination_dir_override() {
        let mut settings = HeraldSettings::default();
        settings.shutdown.coordination_dir = Some(PathBuf::from("/var/run/herald"));
        assert_eq!(settings.coordination_dir(), PathBuf::from("/var/run/herald"));
    }

    #[test]
    fn defaults_validate() {
        assert!(HeraldSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut settings = HeraldSettings::default();
        settings.server.workers = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("server.workers"));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut settings = HeraldSettings::default();
        settings.shutdown.barrier_poll_interval_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("barrier_poll_interval_ms"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"server":{"port":9000},"shutdown":{"drain_timeout_ms":1000}}"#;
        let settings: HeraldSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.shutdown.drain_timeout_ms, 1000);
        assert_eq!(settings.shutdown.drain_interval_ms, 5_000);
    }

    #[test]
    fn coordination_dir_omitted_when_unset() {
        let json = serde_json::to_value(HeraldSettings::default()).unwrap();
        assert!(json["shutdown"].get("coordination_dir").is_none());
    }
}
