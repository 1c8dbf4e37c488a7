//! # herald
//!
//! Entry point for both process roles:
//!
//! - `herald serve` runs the master: it resets the coordination directory,
//!   spawns the workers on one shared port, forwards termination signals and
//!   exits once every worker has exited.
//! - `herald worker` runs a single worker. The master spawns these; it can
//!   also be run by hand.

#![deny(unsafe_code)]

mod supervisor;
mod worker;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use herald_core::logging::{LogFormat, init_subscriber};
use herald_settings::HeraldSettings;

/// herald broadcast server.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about = "WebSocket broadcast server with coordinated worker shutdown")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the master and its worker pool.
    Serve(ServeArgs),
    /// Run one worker.
    Worker(WorkerArgs),
}

/// Flags shared by both roles.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct CommonArgs {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.herald/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of worker processes (overrides settings).
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Join the coordination directory as is instead of clearing it. For
    /// standalone workers sharing one port; ignored under a master.
    #[arg(long)]
    join_barrier: bool,
}

impl CommonArgs {
    /// Load settings and apply command-line overrides.
    fn load_settings(&self) -> Result<HeraldSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(herald_settings::settings_path);
        let mut settings = herald_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut HeraldSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

fn init_logging(settings: &HeraldSettings) {
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let mut settings = args.common.load_settings()?;
            if let Some(workers) = args.workers {
                settings.server.workers = workers;
            }
            settings.validate().context("Invalid settings")?;
            init_logging(&settings);
            supervisor::run(&settings, args.common.settings.as_deref())
        }
        Command::Worker(args) => {
            let settings = args.common.load_settings()?;
            init_logging(&settings);
            worker::run(&settings, args.join_barrier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_to_settings() {
        let cli = Cli::parse_from(["herald", "serve"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.common, CommonArgs::default());
        assert_eq!(args.workers, None);
    }

    #[test]
    fn serve_with_overrides() {
        let cli = Cli::parse_from([
            "herald", "serve", "--host", "0.0.0.0", "--port", "9000", "--workers", "2",
        ]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.common.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.common.port, Some(9000));
        assert_eq!(args.workers, Some(2));
    }

    #[test]
    fn worker_join_flag() {
        let cli = Cli::parse_from(["herald", "worker", "--join-barrier"]);
        let Command::Worker(args) = cli.command else {
            panic!("expected worker");
        };
        assert!(args.join_barrier);
    }

    #[test]
    fn worker_settings_path() {
        let cli = Cli::parse_from(["herald", "worker", "--settings", "/tmp/h.json"]);
        let Command::Worker(args) = cli.command else {
            panic!("expected worker");
        };
        assert_eq!(args.common.settings, Some(PathBuf::from("/tmp/h.json")));
        assert!(!args.join_barrier);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["herald"]).is_err());
    }

    #[test]
    fn workers_flag_only_on_serve() {
        assert!(Cli::try_parse_from(["herald", "worker", "--workers", "3"]).is_err());
    }

    #[test]
    fn overrides_replace_settings_values() {
        let mut settings = HeraldSettings::default();
        let args = CommonArgs {
            host: Some("::1".into()),
            port: Some(7000),
            settings: None,
        };
        args.apply(&mut settings);
        assert_eq!(settings.server.host, "::1");
        assert_eq!(settings.server.port, 7000);
    }

    #[test]
    fn no_overrides_keep_settings() {
        let mut settings = HeraldSettings::default();
        CommonArgs::default().apply(&mut settings);
        assert_eq!(settings, HeraldSettings::default());
    }

    #[test]
    fn load_settings_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 8123, "workers": 2}}"#).unwrap();
        let args = CommonArgs {
            host: None,
            port: Some(8124),
            settings: Some(path),
        };
        let settings = args.load_settings().unwrap();
        assert_eq!(settings.server.workers, 2);
        assert_eq!(settings.server.port, 8124);
    }
}
