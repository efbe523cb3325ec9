//! Reconnect configuration and backoff calculation.
//!
//! Portable, sync-only building blocks for the reconnection policies in
//! `pillion-realtime` (which has access to tokio and a PRNG):
//!
//! - [`ReconnectConfig`]: reconnect parameters (attempt cap, delays, jitter)
//! - [`fixed_delay`] / [`exponential_delay`]: delay math
//!
//! The defaults mirror the shipped behavior: a fixed 3-second interval with
//! at most 5 attempts per connect.

use serde::{Deserialize, Serialize};

/// Default maximum open attempts per connect.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 3000;
/// Default maximum delay in milliseconds (exponential policy cap).
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.0;

/// Configuration for reconnect behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Maximum open attempts per connect before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in ms; exponential base (default: 3000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.0).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Fixed-interval delay: the base delay, capped.
#[must_use]
pub fn fixed_delay(base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms.min(max_delay_ms)
}

/// Exponential backoff delay with jitter from explicit randomness.
///
/// Formula: `min(max_delay, base_delay * 2^(attempt - 1)) * (1 + (random*2 - 1) * jitter)`
///
/// # Arguments
///
/// * `attempt` — one-based count of failed attempts so far (1 for the first retry)
/// * `base_delay_ms` — base delay in milliseconds
/// * `max_delay_ms` — maximum delay cap
/// * `jitter_factor` — jitter range (0.0–1.0), applied symmetrically
/// * `random` — a value in `[0.0, 1.0)` from a PRNG
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn exponential_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponent = attempt.saturating_sub(1).min(31);
    let exponential = base_delay_ms.saturating_mul(1u64 << exponent);
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
