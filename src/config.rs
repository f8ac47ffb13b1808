//! Service configuration.
//!
//! Defaults can be overridden by a TOML file ([`Config::from_file`])
//! and by command-line flags, in that order. A config file that
//! cannot be read or parsed is reported and replaced by the
//! defaults.

use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub read_timeout_millis: u64,
    pub write_timeout_millis: u64,
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            read_timeout_millis: 5000,
            write_timeout_millis: 5000,
            worker_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model_dir: Option<PathBuf>,
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    /// If reading or deserialization fails, the default
    /// configuration is returned.
    pub fn from_file(path: &Path) -> Config {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!("fail to read {}: {err}; fall back to default config", path.display());
                return Config::default();
            }
        };

        match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "fail to deserialize config file {}: {err}; fall back to default config",
                    path.display()
                );
                Config::default()
            }
        }
    }
}
