#![deny(unsafe_code)]

//! relayctl core: the relay control daemon and its client.
//!
//! The daemon owns the I/O expander that drives a bank of irrigation valves
//! and pumps. Local clients send it one JSON command per connection over a
//! Unix socket; the daemon serializes those commands onto the hardware and
//! wraps every pin read and write in a bounded retry.

/// Package version, reported in startup logs and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock-guarded client used by `relayctl send`.
pub mod client;
/// Daemon lifecycle: startup, signal handling, shutdown.
pub mod daemon;
/// Request execution against the registry and hardware.
pub mod dispatch;
/// Relay hardware interface and its backends.
pub mod hardware;
/// Unix socket transport and message types.
pub mod ipc;
/// Cross-process client lock.
pub mod lock;
/// Tracing subscriber setup.
pub mod logging;
/// Static relay name → pin table.
pub mod registry;
/// Fixed-delay retry for hardware calls.
pub mod retry;

pub use client::{ClientError, RelayClient};
pub use daemon::{Daemon, DaemonError, DaemonState, ShutdownHandle};
pub use dispatch::{DispatchError, Dispatcher};
pub use hardware::{HardwareError, RelayHardware, SimulatedBoard};
pub use ipc::{Action, RelayRequest, RelayResponse, RelayStatus};
pub use lock::ClientLock;
pub use registry::{RelayDefinition, RelayRegistry};
pub use retry::{RetryError, RetryPolicy};
