//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use relayctl_config::{AppConfig, RelayConfig};

/// Fluent builder for [`AppConfig`] in tests.
///
/// Starts from the default relay table with the simulated backend and a
/// 1 ms retry delay, so fault-injection tests run fast.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(dir.path().join("relay.sock"))
///     .retry(3, 1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.daemon.backend = "simulated".to_string();
        config.retry.delay_ms = 1;
        config.client.response_timeout_secs = 5;
        Self { config }
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.daemon.socket_path = path.as_ref().display().to_string();
        self
    }

    pub fn lock_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.client.lock_path = path.as_ref().display().to_string();
        self
    }

    pub fn retry(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self.config.retry.delay_ms = delay_ms;
        self
    }

    /// Replace the relay table.
    pub fn relays(mut self, relays: Vec<RelayConfig>) -> Self {
        self.config.relays = relays;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
