//! Bounded exponential backoff (doubling).
//!
//! Shared by the poll scheduler (per-source interval degradation) and the
//! push channel (reconnect delay).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after `failures` consecutive failures. Zero failures yields the
    /// initial delay; the result never exceeds `max`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let cap = self.max.max(self.initial);
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.initial.checked_mul(factor).map_or(cap, |delay| delay.min(cap))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Stateful wrapper counting consecutive attempts.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: ExponentialBackoff,
    attempts: u32,
}

impl Retry {
    pub fn new(policy: ExponentialBackoff) -> Self {
        Self { policy, attempts: 0 }
    }

    /// Delay for the next attempt, then count it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let policy = ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(300));
        assert_eq!(policy.delay_for(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(300));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn retry_counts_and_resets() {
        let mut retry = Retry::new(ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
        ));
        assert_eq!(retry.next_delay(), Duration::from_millis(100));
        assert_eq!(retry.next_delay(), Duration::from_millis(200));
        assert_eq!(retry.attempts(), 2);
        retry.reset();
        assert_eq!(retry.next_delay(), Duration::from_millis(100));
    }
}
