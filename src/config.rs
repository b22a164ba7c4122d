// Startup configuration, loaded once from punch-sync.toml
//
// [client]
// PlayerColor = "Red"
// SocketHost = "localhost"
// SocketPort = 8081
//
// [tracing], [timing] and [reconnect] are optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::condition::Color;
use crate::error::ConfigError;
use crate::logger::TracingConfig;

pub const DEFAULT_CONFIG_PATH: &str = "punch-sync.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Required: a session cannot be built without a color and an endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientConfig {
    pub player_color: Color,
    pub socket_host: String,
    pub socket_port: u16,
}

impl ClientConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.socket_host, self.socket_port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_punch_decay_ms")]
    pub punch_decay_ms: u64,
    #[serde(default = "default_pending_queue_capacity")]
    pub pending_queue_capacity: usize,
}

impl TimingConfig {
    pub fn punch_decay(&self) -> Duration {
        Duration::from_millis(self.punch_decay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            punch_decay_ms: default_punch_decay_ms(),
            pending_queue_capacity: default_pending_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_punch_decay_ms() -> u64 {
    crate::decay_timer::DEFAULT_PUNCH_DECAY.as_millis() as u64
}

fn default_pending_queue_capacity() -> usize {
    crate::outbox::DEFAULT_PENDING_CAPACITY
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    4000
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client.socket_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "SocketHost",
                reason: "must not be empty".to_string(),
            });
        }
        if self.client.socket_port == 0 {
            return Err(ConfigError::Invalid {
                field: "SocketPort",
                reason: "must be a non-zero port".to_string(),
            });
        }
        if self.timing.punch_decay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "punch_decay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timing.pending_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "pending_queue_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(ConfigError::Invalid {
                field: "initial_backoff_ms",
                reason: format!(
                    "{} exceeds max_backoff_ms {}",
                    self.reconnect.initial_backoff_ms, self.reconnect.max_backoff_ms
                ),
            });
        }
        Ok(())
    }
}
