//! Client configuration at `~/.chat-hub/config.toml`.
//!
//! Provides the default hub address, display name, and wire format.
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use chat_core::WireFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Hub host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Hub WebSocket port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Display name to join with (empty = must be given on the command line).
    #[serde(default)]
    pub name: String,

    /// Wire format: "events" or "frames".
    #[serde(default = "default_transport")]
    pub transport: String,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: String::new(),
            transport: default_transport(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_transport() -> String {
    "events".to_string()
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Resolve the wire format from a flag or config value.
pub fn parse_transport(name: &str) -> Result<WireFormat> {
    WireFormat::from_name(name)
        .with_context(|| format!("unknown transport '{name}' (expected events or frames)"))
}
