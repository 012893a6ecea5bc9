#![deny(unsafe_code)]

//! Shared test utilities for the relayctl workspace.
//!
//! Provides config builders, fault-injecting fake hardware, and an
//! in-process daemon so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! relayctl-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod hardware;

pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use hardware::FlakyHardware;
