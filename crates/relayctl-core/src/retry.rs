//! Bounded retry with a fixed delay.
//!
//! Every individual hardware read or write goes through [`RetryPolicy::execute`].
//! The target failure mode is a short burst of bus noise or contention, so
//! the delay is constant rather than exponential.

use std::time::Duration;

use relayctl_config::RetryConfig;
use tracing::{debug, warn};

/// An operation that failed on every attempt of its budget.
#[derive(Debug, thiserror::Error)]
#[error("{description} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryError<E: std::error::Error + 'static> {
    /// What was being attempted, for diagnostics.
    pub description: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// The error returned by the final attempt.
    #[source]
    pub last_error: E,
}

/// Retry budget: total attempts and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. A budget of zero is treated as a single attempt.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Sleeps the calling thread between attempts, so call this from a
    /// blocking context (the dispatcher runs on tokio's blocking pool).
    pub fn execute<T, E, F>(&self, description: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            debug!(action = description, attempt, "hardware attempt");
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        action = description,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "hardware operation failed, retrying"
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        action = description,
                        attempts = attempt,
                        error = %e,
                        "hardware operation failed, retry budget exhausted"
                    );
                    return Err(RetryError {
                        description: description.to_string(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Instant;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("bus glitch #{0}")]
    struct Glitch(u32);

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_default_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_success_on_first_attempt() {
        let calls = Cell::new(0);
        let result: Result<u8, RetryError<Glitch>> = quick(3).execute("read pin", || {
            calls.set(calls.get() + 1);
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_transient_failures_are_masked() {
        let calls = Cell::new(0);
        let result = quick(3).execute("write pin", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Glitch(calls.get()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhaustion_reports_last_error() {
        let calls = Cell::new(0);
        let err = quick(3)
            .execute("set_pin valve1 True", || -> Result<(), Glitch> {
                calls.set(calls.get() + 1);
                Err(Glitch(calls.get()))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.description, "set_pin valve1 True");
        assert_eq!(err.last_error.0, 3);
        assert!(err.to_string().contains("set_pin valve1 True"));
        assert!(err.to_string().contains("bus glitch #3"));
    }

    #[test]
    fn test_zero_budget_still_attempts_once() {
        let calls = Cell::new(0);
        let _ = quick(0).execute("read pin", || -> Result<(), Glitch> {
            calls.set(calls.get() + 1);
            Err(Glitch(0))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_fixed_delay_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20));
        let start = Instant::now();
        let _ = policy.execute("read pin", || -> Result<(), Glitch> { Err(Glitch(0)) });
        // Two pauses between three attempts, none after the last.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
