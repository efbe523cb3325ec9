//! Pluggable reconnection policies.
//!
//! A policy is pure decision logic: given how many consecutive open
//! attempts have failed, should another be made and after what delay. The
//! connection actor owns the timers; policies never sleep.

use std::time::Duration;

use pillion_core::retry::{exponential_delay, fixed_delay};
use pillion_core::ReconnectConfig;

/// Decides whether and when to retry after a failed open or an unexpected
/// close.
pub trait ReconnectPolicy: Send + Sync + 'static {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the number of consecutive failed open attempts so far,
    /// starting at 1, so a policy with `max_attempts = 5` that denies once
    /// `attempt >= 5` allows five opens in total per connect.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Retry at a fixed interval, up to a fixed number of attempts.
///
/// This is the shipped default (3 s, 5 attempts). Fixed intervals
/// synchronize retry storms when many clients lose the same server;
/// [`ExponentialBackoff`] is the drop-in alternative.
#[derive(Clone, Debug)]
pub struct FixedInterval {
    delay: Duration,
    max_attempts: u32,
}

impl FixedInterval {
    /// A fixed-interval policy.
    #[must_use]
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Build from a [`ReconnectConfig`] (uses `base_delay_ms` capped at
    /// `max_delay_ms`, and `max_attempts`).
    #[must_use]
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            delay: Duration::from_millis(fixed_delay(config.base_delay_ms, config.max_delay_ms)),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy for FixedInterval {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }
}

/// Exponential backoff with jitter, up to a fixed number of attempts.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Build from a [`ReconnectConfig`].
    #[must_use]
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            max_attempts: config.max_attempts,
            jitter_factor: config.jitter_factor,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = exponential_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            rand::random::<f64>(),
        );
        Some(Duration::from_millis(delay))
    }
}
