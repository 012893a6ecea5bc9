//! Fault-injecting relay hardware.
//!
//! [`FlakyHardware`] drives a [`SimulatedBoard`] but can be told to fail
//! upcoming reads and writes, either for a fixed number of calls (a
//! transient bus glitch) or until healed (a dead bus). Clones share the
//! same board and fault plan, so a test keeps one handle while the daemon
//! owns the other.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use relayctl_core::hardware::{HardwareError, RelayHardware, SimulatedBoard};

#[derive(Debug, Default)]
struct FaultPlan {
    fail_next: u32,
    persistent: bool,
    calls: u64,
    injected: u64,
}

/// Simulated board with injectable bus faults on `read`/`write`.
///
/// Pin configuration is never failed, so startup always succeeds.
#[derive(Debug, Clone, Default)]
pub struct FlakyHardware {
    board: SimulatedBoard,
    plan: Arc<Mutex<FaultPlan>>,
}

impl FlakyHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing board, e.g. one with relays already energized.
    pub fn with_board(board: SimulatedBoard) -> Self {
        Self {
            board,
            plan: Arc::default(),
        }
    }

    fn plan(&self) -> MutexGuard<'_, FaultPlan> {
        self.plan.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `n` reads/writes, then behave normally.
    pub fn fail_next(&self, n: u32) {
        self.plan().fail_next = n;
    }

    /// Fail every read/write until [`heal`](Self::heal) is called.
    pub fn fail_always(&self) {
        self.plan().persistent = true;
    }

    pub fn heal(&self) {
        let mut plan = self.plan();
        plan.fail_next = 0;
        plan.persistent = false;
    }

    /// Reads and writes attempted so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.plan().calls
    }

    /// Faults injected so far.
    pub fn injected_faults(&self) -> u64 {
        self.plan().injected
    }

    /// Probe handle onto the underlying board.
    pub fn board(&self) -> &SimulatedBoard {
        &self.board
    }

    fn maybe_fail(&self) -> Result<(), HardwareError> {
        let mut plan = self.plan();
        plan.calls += 1;
        if plan.persistent || plan.fail_next > 0 {
            plan.fail_next = plan.fail_next.saturating_sub(1);
            plan.injected += 1;
            tracing::debug!(injected = plan.injected, "injecting bus fault");
            return Err(HardwareError::Bus(io::Error::other("injected bus fault")));
        }
        Ok(())
    }
}

impl RelayHardware for FlakyHardware {
    fn name(&self) -> &str {
        "flaky"
    }

    fn configure_as_output(&mut self, pin: u8) -> Result<(), HardwareError> {
        self.board.configure_as_output(pin)
    }

    fn write(&mut self, pin: u8, energized: bool) -> Result<(), HardwareError> {
        self.maybe_fail()?;
        self.board.write(pin, energized)
    }

    fn read(&mut self, pin: u8) -> Result<bool, HardwareError> {
        self.maybe_fail()?;
        self.board.read(pin)
    }
}
