//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server endpoint, socket options and link timing.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Disable Nagle's algorithm.
    pub tcp_nodelay: bool,
    /// Kernel receive buffer size in bytes.
    pub recv_buffer_size: usize,
    /// Kernel send buffer size in bytes.
    pub send_buffer_size: usize,
    /// Blocking read timeout in milliseconds (0 = none).
    pub recv_timeout_ms: u64,
    /// Blocking write timeout in milliseconds (0 = none).
    pub send_timeout_ms: u64,
    /// Connect attempt timeout in seconds.
    pub connect_timeout_secs: f32,
    /// Connected time between heartbeat pings, in seconds.
    pub heartbeat_interval_secs: f32,
    /// Time allowed for a heartbeat reply, in seconds.
    pub heartbeat_response_timeout_secs: f32,
    /// Payload the server answers heartbeats with. `None` treats any inbound
    /// traffic as a reply.
    pub heartbeat_ack: Option<Vec<u8>>,
    /// Connect attempts before giving up.
    pub max_retries: u32,
    /// Pause between failed attempts, in seconds.
    pub retry_backoff_secs: f32,
    /// Largest frame accepted or produced, header included.
    pub max_frame_len: u16,
    /// Drop the connection on the first write error.
    pub disconnect_on_send_error: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every inbound payload at info level.
    pub log_packets: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tcp_nodelay: true,
            recv_buffer_size: 1024 * 1024,
            send_buffer_size: 1024 * 1024,
            recv_timeout_ms: 30_000,
            send_timeout_ms: 30_000,
            connect_timeout_secs: 6.0,
            heartbeat_interval_secs: 8.0,
            heartbeat_response_timeout_secs: 4.0,
            heartbeat_ack: None,
            max_retries: 3,
            retry_backoff_secs: 0.3,
            max_frame_len: u16::MAX,
            disconnect_on_send_error: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_packets: false,
        }
    }
}

impl NetworkConfig {
    /// Reject values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "network.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_frame_len < 2 {
            return Err(ConfigError::Invalid {
                field: "network.max_frame_len",
                reason: format!("{} cannot hold the 2-byte header", self.max_frame_len),
            });
        }
        let durations = [
            ("network.connect_timeout_secs", self.connect_timeout_secs),
            ("network.heartbeat_interval_secs", self.heartbeat_interval_secs),
            (
                "network.heartbeat_response_timeout_secs",
                self.heartbeat_response_timeout_secs,
            ),
            ("network.retry_backoff_secs", self.retry_backoff_secs),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is not a non-negative number of seconds"),
                });
            }
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.network.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.network.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
