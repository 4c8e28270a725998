//! Exponential backoff across consecutive failed ticks.

use std::time::Duration;

/// Consecutive-failure counter and the delay it implies.
///
/// After `n` consecutive failures the next tick waits
/// `min(base * 2^n, max)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffState {
    base: Duration,
    max: Duration,
    consecutive_failures: u32,
    current_delay: Duration,
}

impl BackoffState {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            consecutive_failures: 0,
            current_delay: base,
        }
    }

    /// Count one more failure and return the delay before the next tick.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_delay = self.delay_for(self.consecutive_failures);
        self.current_delay
    }

    /// Back to baseline after a tick that made progress.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.base;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// 2^failures, saturating.
    pub fn multiplier(&self) -> u64 {
        1u64.checked_shl(self.consecutive_failures).unwrap_or(u64::MAX)
    }

    pub fn is_backing_off(&self) -> bool {
        self.consecutive_failures > 0
    }

    fn delay_for(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }
}
