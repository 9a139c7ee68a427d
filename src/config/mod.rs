mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete Outpost configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutpostConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub buildings: BuildingsConfig,
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5174".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Event fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Events buffered per connection before a slow client lags and is
    /// resynced with a snapshot
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Building command execution
#[derive(Debug, Clone, Deserialize)]
pub struct BuildingsConfig {
    /// Shell used to run building scripts (`<shell> -c <script>`)
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Upper bound for one building command (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Output kept on the building after a command (tail, bytes)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_command_timeout() -> u64 {
    60
}

fn default_max_output_bytes() -> usize {
    16 * 1024
}

impl Default for BuildingsConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            command_timeout_seconds: default_command_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<OutpostConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: OutpostConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load configuration for the server binary.
///
/// Reads the file named by `OUTPOST_CONFIG` when set (defaults otherwise),
/// then applies `OUTPOST_*` environment overrides.
pub fn load_from_env() -> Result<OutpostConfig> {
    let mut config = match std::env::var("OUTPOST_CONFIG") {
        Ok(path) => load_config(path)?,
        Err(_) => OutpostConfig::default(),
    };
    env::apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}
