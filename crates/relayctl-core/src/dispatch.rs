//! Command dispatch: turns one decoded request into hardware calls.
//!
//! The [`Dispatcher`] is the only owner of the relay hardware. The daemon
//! wraps it in a mutex, so exactly one request's hardware operations run at
//! a time no matter how many connections are waiting.

use relayctl_config::ALL_RELAYS;
use tracing::{debug, info, warn};

use crate::hardware::{HardwareError, RelayHardware};
use crate::ipc::types::{Action, RelayRequest, RelayResponse, RelayStatus, StatusMap};
use crate::registry::{RelayDefinition, RelayRegistry};
use crate::retry::{RetryError, RetryPolicy};

/// Why a request could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The relay name is not in the registry. No hardware was touched.
    #[error("invalid relay name {0:?}")]
    UnknownRelay(String),

    /// The action is not allowed for the addressed relay. No hardware was
    /// touched.
    #[error("action \"{action}\" is not allowed for relay {relay:?}")]
    InvalidCombination { relay: String, action: Action },

    /// A pin operation failed on every attempt of its retry budget.
    #[error("hardware error: {0}")]
    Hardware(#[from] RetryError<HardwareError>),
}

impl DispatchError {
    /// Protocol errors are rejected before any hardware access.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, DispatchError::Hardware(_))
    }
}

/// Executes requests against the registry and the hardware.
pub struct Dispatcher {
    hardware: Box<dyn RelayHardware>,
    registry: RelayRegistry,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(hardware: Box<dyn RelayHardware>, registry: RelayRegistry, retry: RetryPolicy) -> Self {
        Self {
            hardware,
            registry,
            retry,
        }
    }

    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    pub fn backend_name(&self) -> &str {
        self.hardware.name()
    }

    /// Configure every registered pin as an output.
    ///
    /// Called once at startup. Latched levels are left alone, so a relay
    /// that was energized before a restart stays energized.
    pub fn configure_outputs(&mut self) -> Result<(), RetryError<HardwareError>> {
        let Self {
            hardware,
            registry,
            retry,
        } = self;
        for relay in registry.all() {
            retry.execute(&format!("configure {} (pin {})", relay.name, relay.pin), || {
                hardware.configure_as_output(relay.pin)
            })?;
            debug!(relay = %relay.name, pin = relay.pin, "pin configured as output");
        }
        Ok(())
    }

    /// Execute `request` and render the outcome as a response. Errors become
    /// `{"error": ...}` responses; nothing here is fatal to the daemon.
    pub fn handle(&mut self, request: &RelayRequest) -> RelayResponse {
        let requester = if request.requester.is_empty() {
            "unknown"
        } else {
            request.requester.as_str()
        };
        info!(
            relay = %request.relay,
            action = %request.action,
            requester,
            "request received"
        );

        match self.execute(request) {
            Ok(response) => {
                info!(relay = %request.relay, action = %request.action, requester, "request completed");
                response
            }
            Err(e) => {
                warn!(
                    relay = %request.relay,
                    action = %request.action,
                    requester,
                    protocol = e.is_protocol_error(),
                    error = %e,
                    "request failed"
                );
                RelayResponse::error(e.to_string())
            }
        }
    }

    /// Execute `request`, returning the typed outcome.
    pub fn execute(&mut self, request: &RelayRequest) -> Result<RelayResponse, DispatchError> {
        if request.relay == ALL_RELAYS {
            return match request.action {
                Action::Status => self.read_all(),
                Action::Off => self.switch_all_off(),
                Action::On => Err(DispatchError::InvalidCombination {
                    relay: request.relay.clone(),
                    action: request.action,
                }),
            };
        }

        let relay = self
            .registry
            .resolve(&request.relay)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownRelay(request.relay.clone()))?;
        let status = match request.action {
            Action::On => self.write_then_read(&relay, true)?,
            Action::Off => self.write_then_read(&relay, false)?,
            Action::Status => self.read_pin(&relay)?,
        };
        Ok(RelayResponse::Single {
            relay: relay.name,
            status,
        })
    }

    fn read_all(&mut self) -> Result<RelayResponse, DispatchError> {
        let relays = self.registry.all().to_vec();
        let mut statuses = StatusMap::new();
        for relay in &relays {
            let status = self.read_pin(relay)?;
            statuses.push(relay.name.as_str(), status);
        }
        Ok(RelayResponse::All(statuses))
    }

    fn switch_all_off(&mut self) -> Result<RelayResponse, DispatchError> {
        let relays = self.registry.all().to_vec();
        let mut statuses = StatusMap::new();
        for relay in &relays {
            let status = self.write_then_read(relay, false)?;
            statuses.push(relay.name.as_str(), status);
        }
        Ok(RelayResponse::All(statuses))
    }

    /// Write, then read back so the reported status is what the pin holds.
    fn write_then_read(
        &mut self,
        relay: &RelayDefinition,
        energized: bool,
    ) -> Result<RelayStatus, DispatchError> {
        let hardware = &mut self.hardware;
        self.retry.execute(
            &format!("write {} (pin {}) {}", relay.name, relay.pin, RelayStatus::from(energized)),
            || hardware.write(relay.pin, energized),
        )?;
        self.read_pin(relay)
    }

    fn read_pin(&mut self, relay: &RelayDefinition) -> Result<RelayStatus, DispatchError> {
        let hardware = &mut self.hardware;
        let level = self
            .retry
            .execute(&format!("read {} (pin {})", relay.name, relay.pin), || {
                hardware.read(relay.pin)
            })?;
        Ok(RelayStatus::from(level))
    }
}
