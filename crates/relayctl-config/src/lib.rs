#![deny(unsafe_code)]

//! Configuration loading and validation for relayctl.
//!
//! Loads TOML configuration files and validates them. The [`AppConfig`] type
//! is shared by the daemon (hardware, socket, relay table) and the client
//! (socket, lock file, response timeout).
//!
//! ## TOML Example
//!
//! ```toml
//! [daemon]
//! socket_path = "/tmp/relayctl.sock"
//! backend = "mcp23017"
//! bus_device = "/dev/i2c-1"
//! bus_address = 0x27
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 100
//!
//! [[relays]]
//! name = "valve1"
//! index = 0
//! pin = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reserved pseudo-relay name addressing every configured relay.
pub const ALL_RELAYS: &str = "all";

/// Names a relay may not take. `error` is the key of error responses, so a
/// relay by that name would make an `all` reply indistinguishable from one.
pub const RESERVED_RELAY_NAMES: [&str; 2] = [ALL_RELAYS, "error"];

/// Digital lines on the MCP23017 expander; valid pins are `0..PIN_COUNT`.
pub const PIN_COUNT: u8 = 16;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Client configuration.
    #[serde(default)]
    pub client: ClientConfig,

    /// Retry budget applied to every hardware read or write.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The relay table. Order is preserved for bulk responses.
    #[serde(default = "default_relays")]
    pub relays: Vec<RelayConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            client: ClientConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            relays: default_relays(),
        }
    }
}

/// Configuration for the relay daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Permission bits applied to the socket file after bind.
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Hardware backend: "mcp23017" or "simulated".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// I2C character device the expander is attached to.
    #[serde(default = "default_bus_device")]
    pub bus_device: String,

    /// Bus address of the expander, selected by its A0-A2 jumpers.
    #[serde(default = "default_bus_address")]
    pub bus_address: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            socket_mode: default_socket_mode(),
            backend: default_backend(),
            bus_device: default_bus_device(),
            bus_address: default_bus_address(),
        }
    }
}

fn default_socket_path() -> String {
    "/tmp/relayctl.sock".to_string()
}

fn default_socket_mode() -> u32 {
    0o666
}

fn default_backend() -> String {
    "mcp23017".to_string()
}

fn default_bus_device() -> String {
    "/dev/i2c-1".to_string()
}

fn default_bus_address() -> u16 {
    0x27
}

/// Configuration for the command-line client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Advisory lock file serializing concurrent client invocations.
    #[serde(default = "default_lock_path")]
    pub lock_path: String,

    /// How long to wait for the daemon's response (0 = wait forever).
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            response_timeout_secs: default_response_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// The response timeout, or `None` when disabled.
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs))
    }
}

fn default_lock_path() -> String {
    "/tmp/relayctl-client.lock".to_string()
}

fn default_response_timeout_secs() -> u64 {
    10
}

/// Bounded retry budget for hardware operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "text" or "json" (one object per line).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// A single relay as expressed in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Name clients use to address the relay.
    pub name: String,
    /// Position in bulk responses; indices must form 0..N-1.
    pub index: usize,
    /// Expander pin driving the relay.
    pub pin: u8,
}

impl RelayConfig {
    pub fn new(name: &str, index: usize, pin: u8) -> Self {
        Self {
            name: name.to_string(),
            index,
            pin,
        }
    }
}

/// Relay wiring of the reference PowerController board (hardware v2.4.2):
/// five 24VAC valves and two 12VDC pump feeds.
fn default_relays() -> Vec<RelayConfig> {
    vec![
        RelayConfig::new("farbed", 0, 10),
        RelayConfig::new("nearbed", 1, 6),
        RelayConfig::new("mag", 2, 9),
        RelayConfig::new("plants", 3, 7),
        RelayConfig::new("valve5", 4, 8),
        RelayConfig::new("pump1", 5, 5),
        RelayConfig::new("pump2", 6, 11),
    ]
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.socket_path.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty".to_string(),
            ));
        }
        let valid_backends = ["mcp23017", "simulated"];
        if !valid_backends.contains(&self.daemon.backend.as_str()) {
            return Err(ConfigError::Validation(format!(
                "daemon.backend must be one of {:?}, got {:?}",
                valid_backends, self.daemon.backend
            )));
        }
        if !(0x20..=0x27).contains(&self.daemon.bus_address) {
            return Err(ConfigError::Validation(format!(
                "daemon.bus_address must be in 0x20..=0x27, got {:#04x}",
                self.daemon.bus_address
            )));
        }
        if self.client.lock_path.is_empty() {
            return Err(ConfigError::Validation(
                "client.lock_path must not be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.format must be one of {:?}, got {:?}",
                valid_formats, self.logging.format
            )));
        }

        if self.relays.is_empty() {
            return Err(ConfigError::Validation(
                "at least one relay must be configured".to_string(),
            ));
        }
        for (i, relay) in self.relays.iter().enumerate() {
            if relay.name.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "relays[{i}].name must not be empty"
                )));
            }
            if RESERVED_RELAY_NAMES.contains(&relay.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "relays[{i}].name {:?} is reserved",
                    relay.name
                )));
            }
            if relay.pin >= PIN_COUNT {
                return Err(ConfigError::Validation(format!(
                    "relays[{i}].pin must be below {PIN_COUNT}, got {}",
                    relay.pin
                )));
            }
        }

        Ok(())
    }

    /// Look up a relay entry by name.
    pub fn relay(&self, name: &str) -> Option<&RelayConfig> {
        self.relays.iter().find(|r| r.name == name)
    }
}
