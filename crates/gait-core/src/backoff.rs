//! Reconnect backoff policy and delay calculation.
//!
//! Pure, clock-free building blocks for reconnect scheduling. The caller owns
//! the attempt counter and the timer; this module only answers "may I retry,
//! and after how long?":
//!
//! - [`BackoffPolicy`]: Attempt ceiling plus base/cap delays
//! - [`BackoffDecision`]: Outcome of consulting the policy
//! - [`calculate_backoff_delay`]: Capped exponential delay

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum number of automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Attempt ceiling; retry is refused once the counter reaches it (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
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

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

/// Result of consulting a [`BackoffPolicy`] after an abnormal close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffDecision {
    /// Whether another automatic attempt is allowed.
    pub should_retry: bool,
    /// How long to wait before the attempt.
    pub delay: Duration,
}

impl BackoffPolicy {
    /// Decide whether to retry after `attempts` consecutive failed attempts.
    ///
    /// The delay is always computed so callers can log it, even when the
    /// ceiling has been reached.
    pub fn decide(&self, attempts: u32) -> BackoffDecision {
        BackoffDecision {
            should_retry: attempts < self.max_attempts,
            delay: Duration::from_millis(self.delay_ms(attempts)),
        }
    }

    /// Delay in milliseconds for the given attempt count.
    pub fn delay_ms(&self, attempts: u32) -> u64 {
        calculate_backoff_delay(attempts, self.base_delay_ms, self.max_delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate a capped exponential backoff delay.
///
/// Formula: `min(base_delay * 2^attempt, max_delay)`
///
/// Saturates instead of overflowing for large attempt counts.
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(63));
    exponential.min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
