//! Relay hardware interface and backend selection.
//!
//! The daemon owns exactly one [`RelayHardware`] value for its whole lifetime.
//! Nothing else in the process holds a handle to the bus, and the dispatcher
//! receives the backend explicitly rather than through a global.
//!
//! ## Backends
//!
//! | Backend | Module | Use |
//! |---|---|---|
//! | `mcp23017` | [`mcp23017`] over [`linux_i2c`] | the real expander on `/dev/i2c-N` |
//! | `simulated` | [`simulated`] | development and tests |

pub mod linux_i2c;
pub mod mcp23017;
pub mod simulated;

use std::path::Path;
use std::str::FromStr;

use relayctl_config::DaemonConfig;
use tracing::info;

use crate::retry::{RetryError, RetryPolicy};

pub use mcp23017::{I2cBus, Mcp23017};
pub use simulated::SimulatedBoard;

/// Number of digital lines on the expander (two 8-bit ports).
pub use relayctl_config::PIN_COUNT;

/// Errors from a single hardware operation.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("I2C bus error: {0}")]
    Bus(#[from] std::io::Error),

    #[error("pin {0} is out of range (expander has 16 pins)")]
    InvalidPin(u8),

    #[error("pin {0} is not configured as an output")]
    NotOutput(u8),
}

/// Boolean access to the expander's output pins.
///
/// Implementations perform exactly one bus transaction sequence per call
/// and never retry internally; retries belong to [`RetryPolicy`].
pub trait RelayHardware: Send {
    /// Human-readable backend name (e.g. "mcp23017", "simulated").
    fn name(&self) -> &str;

    /// Switch `pin` to output mode without changing its latched level.
    fn configure_as_output(&mut self, pin: u8) -> Result<(), HardwareError>;

    /// Drive `pin` high (`true`, relay energized) or low.
    fn write(&mut self, pin: u8, energized: bool) -> Result<(), HardwareError>;

    /// Sample the current level of `pin`.
    fn read(&mut self, pin: u8) -> Result<bool, HardwareError>;
}

pub(crate) fn check_pin(pin: u8) -> Result<(), HardwareError> {
    if pin < PIN_COUNT {
        Ok(())
    } else {
        Err(HardwareError::InvalidPin(pin))
    }
}

/// Which backend the daemon should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    Mcp23017,
    Simulated,
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcp23017" => Ok(Self::Mcp23017),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!("unknown hardware backend {other:?}")),
        }
    }
}

/// Open the configured backend.
///
/// Opening the bus is retried under the same policy as every other hardware
/// call; exhaustion here is fatal to daemon startup.
pub fn open_backend(
    preference: BackendPreference,
    config: &DaemonConfig,
    retry: &RetryPolicy,
) -> Result<Box<dyn RelayHardware>, RetryError<HardwareError>> {
    match preference {
        BackendPreference::Simulated => {
            tracing::warn!(backend = "simulated", "Driving a simulated board, no relays will switch");
            Ok(Box::new(SimulatedBoard::new()))
        }
        BackendPreference::Mcp23017 => {
            let device = Path::new(&config.bus_device);
            info!(
                device = %device.display(),
                address = %format!("{:#04x}", config.bus_address),
                "Opening MCP23017 expander"
            );
            let bus = retry.execute("initialize i2c", || {
                linux_i2c::LinuxI2cBus::open(device, config.bus_address).map_err(HardwareError::from)
            })?;
            Ok(Box::new(Mcp23017::new(bus)))
        }
    }
}
