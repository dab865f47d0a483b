//! Run configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.ohsync/
//!   config.yaml   (optional; every field has a default)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The loaded [`Config`] is passed explicitly to the remote adapter and the
//! upload pipeline; nothing reads ambient state after start-up.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::size::parse_size;
use crate::types::Freshness;

pub const DEFAULT_BASE_URL: &str = "https://www.openhumans.org";
pub const DEFAULT_MAX_SIZE: &str = "128m";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings threaded into every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL of the remote store API.
    pub base_url: String,
    /// Largest file to upload or download, e.g. `128m`.
    pub max_size: String,
    /// Fixed worker count for bulk downloads.
    pub workers: usize,
    pub freshness: Freshness,
    /// Per-request timeout for HTTP calls.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_size: DEFAULT_MAX_SIZE.to_string(),
            workers: DEFAULT_WORKERS,
            freshness: Freshness::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// `max_size` in bytes.
    pub fn max_bytes(&self) -> Result<u64, ConfigError> {
        parse_size(&self.max_size)
    }
}

/// `<home>/.ohsync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".ohsync").join("config.yaml")
}

/// Load the config rooted at `home`, or defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.clone(),
        source: e,
    })?;
    // Fail at load time rather than mid-run.
    config.max_bytes()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Atomically save `config` under `home`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let path = config_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(&path, std::io::Error::other("invalid config path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
