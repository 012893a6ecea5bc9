//! In-memory (development) relay board.
//!
//! Behaves like a 16-line expander: pins must be configured as outputs
//! before they can be driven, and reads return the latched level. Cloning
//! yields a second handle onto the same board, which tests use to inspect
//! pin levels after the daemon has taken ownership.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{HardwareError, RelayHardware, check_pin};

#[derive(Debug, Default)]
struct BoardState {
    /// Bit `n` set = pin `n` driven high.
    levels: u16,
    /// Bit `n` set = pin `n` configured as an output.
    outputs: u16,
    writes: u64,
}

/// Simulated relay board for development and testing.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// A board with every pin low and configured as an input.
    pub fn new() -> Self {
        Self::default()
    }

    /// A board whose listed pins are already energized, as after a daemon
    /// restart with relays left running.
    pub fn with_energized(pins: &[u8]) -> Self {
        let board = Self::new();
        {
            let mut state = board.lock();
            for &pin in pins {
                state.levels |= 1 << (pin % super::PIN_COUNT);
            }
        }
        board
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        // Pin levels stay meaningful even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current level of `pin`, bypassing the output check.
    pub fn energized(&self, pin: u8) -> bool {
        self.lock().levels & (1 << (pin % super::PIN_COUNT)) != 0
    }

    /// Whether `pin` has been configured as an output.
    pub fn is_output(&self, pin: u8) -> bool {
        self.lock().outputs & (1 << (pin % super::PIN_COUNT)) != 0
    }

    /// Total successful writes since the board was created.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }
}

impl RelayHardware for SimulatedBoard {
    fn name(&self) -> &str {
        "simulated"
    }

    fn configure_as_output(&mut self, pin: u8) -> Result<(), HardwareError> {
        check_pin(pin)?;
        self.lock().outputs |= 1 << pin;
        Ok(())
    }

    fn write(&mut self, pin: u8, energized: bool) -> Result<(), HardwareError> {
        check_pin(pin)?;
        let mut state = self.lock();
        if state.outputs & (1 << pin) == 0 {
            return Err(HardwareError::NotOutput(pin));
        }
        if energized {
            state.levels |= 1 << pin;
        } else {
            state.levels &= !(1 << pin);
        }
        state.writes += 1;
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<bool, HardwareError> {
        check_pin(pin)?;
        Ok(self.lock().levels & (1 << pin) != 0)
    }
}
