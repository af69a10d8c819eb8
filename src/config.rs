//! On-disk configuration for a peer process.
//!
//! Grounded on `patrickett-dryas`'s `config.rs`, which locates a per-app
//! config file under the user's config directory via `dirs::config_dir()`
//! and creates it on first run. Here the file actually carries settings
//! (tracker address, worker cap, timeouts) instead of being an empty stub.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not locate a config directory for this platform")]
    NoConfigDir,
    #[error("io error reading/writing config")]
    Io(#[from] std::io::Error),
    #[error("could not parse config.toml")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config.toml")]
    Serialize(#[from] toml::ser::Error),
}

/// Process-wide settings. All fields have sensible defaults matching the
/// spec's literal constants; the config file only needs to mention the
/// values a deployment wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker_ip: String,
    pub tracker_port: u16,
    pub max_workers: usize,
    pub socket_timeout_secs: u64,
    pub chunk_deadline_secs: u64,
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tracker_ip: "127.0.0.1".to_string(),
            tracker_port: crate::DEFAULT_TRACKER_PORT,
            max_workers: 8,
            socket_timeout_secs: 5,
            chunk_deadline_secs: 10,
            max_attempts: 3,
        }
    }
}

impl Config {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn chunk_deadline(&self) -> Duration {
        Duration::from_secs(self.chunk_deadline_secs)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(env!("CARGO_PKG_NAME"));
        fs::create_dir_all(&path)?;
        path.push(CONFIG_FILE_NAME);
        Ok(path)
    }

    /// Load the config file, creating a default one on first run.
    pub fn load_or_create() -> Result<Config, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = Config::default();
            fs::write(&path, toml::to_string_pretty(&config)?)?;
            return Ok(config);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }
}
