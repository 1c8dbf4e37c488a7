//! Settings loading.
//!
//! Loading flow:
//! 1. Start with compiled [`HeraldSettings::default()`]
//! 2. If the settings file exists, merge its values over the defaults
//! 3. Merge `HERALD_*` environment variables (highest priority)
//! 4. Validate the result
//!
//! Nested keys use a double underscore in environment variables:
//! `HERALD_SERVER__PORT` sets `server.port`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::Result;
use crate::types::HeraldSettings;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "HERALD_";

/// Resolve the path to the default settings file (`~/.herald/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".herald").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HeraldSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file is not an error; defaults and the environment still
/// apply. A file that is not valid JSON, or values of the wrong type,
/// are errors.
pub fn load_settings_from_path(path: &Path) -> Result<HeraldSettings> {
    let mut figment = Figment::from(Serialized::defaults(HeraldSettings::default()));

    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let settings: HeraldSettings = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    settings.validate()?;
    Ok(settings)
}
