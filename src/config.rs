//! Server configuration.
//!
//! All fields default so a bare `ringlogd` invocation works; a YAML config
//! file and CLI flags layer on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of command slots in the ring.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Cap on a single assembled line, terminator included.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Flat file mirroring the current log contents. `None` keeps the log
    /// memory-only.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Whether `SEEKTO:<index>,<offset>` directives are honored.
    #[serde(default = "default_true")]
    pub enable_seek: bool,

    /// Periodic timestamp entries.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Configuration for the periodic heartbeat entry. Disabled by default;
/// independent of the seek directive feature.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between timestamp entries.
    #[serde(default = "default_heartbeat_secs")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            capacity: default_capacity(),
            max_line_bytes: default_max_line_bytes(),
            log_file: None,
            enable_seek: true,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.capacity > 0, "capacity must be at least 1");
        anyhow::ensure!(
            self.max_line_bytes > 1,
            "max_line_bytes must leave room for a terminated line"
        );
        Ok(())
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_capacity() -> usize {
    10
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}

fn default_heartbeat_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
