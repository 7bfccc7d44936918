//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (applied by the binary through clap)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults are used.
//! An explicitly requested file that cannot be read is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Name of the configuration directory under the platform config dir
const CONFIG_DIR_NAME: &str = "jukebox";

/// Name of the configuration file
const CONFIG_FILE_NAME: &str = "config.toml";

/// System-wide fallback location (Linux)
const SYSTEM_CONFIG_PATH: &str = "/etc/jukebox/config.toml";

/// Complete bootstrap configuration
///
/// Every section is optional in the file; absent values take built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub http: HttpConfig,
    pub player: PlayerConfig,
    pub fanout: FanoutConfig,
    pub detector: DetectorConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// Media player connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Bus name of the controlled player instance
    pub bus_name: String,

    /// Upper bound for every player round-trip
    pub timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            bus_name: "org.mpris.MediaPlayer2.vlc".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl PlayerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Snapshot fanout settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Per-subscriber queue capacity
    pub subscriber_capacity: usize,

    /// How long a publish may wait on one full subscriber before disconnecting it
    pub publish_timeout_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 32,
            publish_timeout_ms: 10_000,
        }
    }
}

impl FanoutConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// Change detector settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Capacity of the classified event channel feeding reconciliation
    pub event_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

/// Search provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Extractor program invoked for searches
    pub program: String,

    /// Query template; `{}` is replaced by the user query
    pub query_format: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            query_format: "ytsearch1:{}".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// With `explicit` set, that file must exist and parse. Otherwise the default
    /// locations are searched and a missing file falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    warn!("No configuration file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.player.timeout_ms == 0 {
            return Err(Error::Config("player.timeout_ms must be positive".to_string()));
        }
        if self.fanout.subscriber_capacity == 0 {
            return Err(Error::Config(
                "fanout.subscriber_capacity must be positive".to_string(),
            ));
        }
        if self.detector.event_capacity == 0 {
            return Err(Error::Config(
                "detector.event_capacity must be positive".to_string(),
            ));
        }
        if !self.search.query_format.contains("{}") {
            return Err(Error::Config(
                "search.query_format must contain a {} placeholder".to_string(),
            ));
        }
        Ok(())
    }
}

/// First existing configuration file among the platform locations
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from(SYSTEM_CONFIG_PATH);
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Split a `host:port` listen address
pub fn parse_listen_address(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidInput(format!("{value} is not a valid host:port pair")))?;

    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "{value} is not a valid host:port pair"
        )));
    }

    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidInput(format!("{value} has an out-of-range port")))?;

    Ok((host.to_string(), port))
}
