//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tl_core::DEFAULT_SAMPLE_INTERVAL_SECS;

use crate::probe::DEFAULT_PROBE_TIMEOUT_SECS;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Seconds between accounting ticks.
    pub tick_interval_secs: u64,
    /// Seconds between foreground app samples.
    pub sample_interval_secs: u64,
    /// Application names never recorded as foreground usage.
    pub excluded_apps: Vec<String>,
    /// Command printing the foreground app name. Overrides the platform default.
    pub probe_command: Option<Vec<String>>,
    /// Seconds a probe may run before its sample is dropped.
    pub probe_timeout_secs: u64,
    /// Lock automatically once a day's usage reaches this many minutes.
    pub daily_limit_minutes: Option<u64>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("tick_interval_secs", &self.tick_interval_secs)
            .field("sample_interval_secs", &self.sample_interval_secs)
            .field("excluded_apps", &self.excluded_apps)
            .field("probe_command", &self.probe_command)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("daily_limit_minutes", &self.daily_limit_minutes)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tl.db"),
            tick_interval_secs: 1,
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            excluded_apps: vec!["tl".to_string()],
            probe_command: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            daily_limit_minutes: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // TL_DATABASE_PATH, TL_DAILY_LIMIT_MINUTES, ...
        figment = figment.merge(Env::prefixed("TL_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for tl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tl"))
}

/// Returns the platform-specific data directory for tl.
///
/// On Linux: `~/.local/share/tl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tl"))
}
