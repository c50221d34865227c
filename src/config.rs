//! Configuration management for Timechain

use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Read from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "timechain.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Unix seconds. Only used when the data directory has no genesis yet.
    #[serde(default)]
    pub genesis_time: Option<i64>,
    #[serde(default = "default_extra_data")]
    pub extra_data: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            genesis_time: None,
            extra_data: default_extra_data(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Empty disables inbound connections.
    #[serde(default = "default_p2p_listen")]
    pub p2p_listen: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Empty disables the HTTP query surface.
    #[serde(default = "default_rpc_listen")]
    pub rpc_listen: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            p2p_listen: default_p2p_listen(),
            bootstrap_peers: Vec::new(),
            rpc_listen: default_rpc_listen(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Humantime duration such as `2s` or `500ms`; zero or negative disables mining.
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self { interval: default_interval() }
    }
}

impl MinerConfig {
    pub fn interval(&self) -> Result<Duration> {
        parse_interval(&self.interval)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files under `<data_dir>/storage/block`
    #[default]
    File,
    /// Single SQLite database file
    Sqlite,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ChainError::ConfigError("node.data_dir must be set".to_string()));
        }
        self.miner.interval()?;
        Ok(())
    }

    /// Requested genesis time; zero means "unset" like an absent value.
    pub fn genesis_override(&self) -> Option<i64> {
        self.node.genesis_time.filter(|t| *t != 0)
    }
}

/// Parse a mining interval. `0` and negative durations mean disabled and map
/// to [`Duration::ZERO`].
pub fn parse_interval(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw == "0" || raw.starts_with('-') {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(raw)
        .map_err(|e| ChainError::ConfigError(format!("invalid interval {:?}: {}", raw, e)))
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when it
/// exists, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_str = match path {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            ChainError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?,
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).unwrap_or_default(),
    };

    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)?
    };

    config.validate()?;
    Ok(config)
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_extra_data() -> String {
    "vtcnode".to_string()
}

fn default_p2p_listen() -> String {
    "0.0.0.0:30333".to_string()
}

fn default_rpc_listen() -> String {
    "0.0.0.0:8545".to_string()
}

fn default_interval() -> String {
    "2s".to_string()
}
