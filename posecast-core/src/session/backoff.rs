//! Exponential reconnect backoff.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            multiplier: 2,
            max: Duration::from_millis(16_000),
        }
    }
}

/// Delay generator for consecutive failed attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial.min(policy.max),
            attempts: 0,
        }
    }

    /// Delay before the next attempt; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = delay
            .saturating_mul(self.policy.multiplier.max(1))
            .min(self.policy.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.policy.initial.min(self.policy.max);
        self.attempts = 0;
    }

    /// Delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
