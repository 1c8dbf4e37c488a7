//! # herald-settings
//!
//! Configuration for herald, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HeraldSettings::default()`]
//! 2. **Settings file**: `~/.herald/settings.json` or an explicit path
//! 3. **Environment variables**: `HERALD_*`, nested with `__`
//!    (e.g. `HERALD_SHUTDOWN__DRAIN_TIMEOUT_MS=60000`)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{ENV_PREFIX, load_settings, load_settings_from_path, settings_path};
pub use types::{HeraldSettings, LoggingSettings, ServerSettings, ShutdownSettings};
