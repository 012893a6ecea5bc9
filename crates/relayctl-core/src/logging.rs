//! Tracing subscriber setup for the `relayctl` binary.
//!
//! Logs go to stderr so `relayctl send` keeps stdout for the response.
//! `RUST_LOG`, when set, replaces the configured level entirely.

use relayctl_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Filter directive for the configured `level`, raised by `-v` flags.
pub fn filter_directive(level: &str, verbosity: u8) -> String {
    match verbosity {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LoggingConfig, verbosity: u8) -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level, verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("warn", 0), "warn");
        assert_eq!(filter_directive("warn", 1), "debug");
        assert_eq!(filter_directive("info", 2), "trace");
        assert_eq!(filter_directive("info", 9), "trace");
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init(&config, 0);
        assert!(init(&config, 0).is_err());
    }
}
