//! Retry eligibility and backoff computation.
//!
//! Both functions are pure: the executor owns the attempt counter and the
//! sleeping, this module only answers "again?" and "how long?".

use crate::config::{BackoffLimits, RequestConfig};
use rand::Rng;
use std::time::Duration;

/// What a finished attempt produced, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptSignal {
    /// A response arrived with this status.
    Status(u16),
    /// The network primitive failed (connection refused, reset, DNS).
    NetworkError,
    /// The per-attempt deadline expired.
    Timeout,
    /// The caller cancelled.
    Aborted,
}

/// Returns `true` when another attempt should be made.
///
/// Requires remaining budget (`attempt < config.retries`) and either a
/// retryable status or a transient network error. Timeouts and cancellation
/// are always terminal.
#[must_use]
pub fn should_retry(signal: AttemptSignal, attempt: u32, config: &RequestConfig) -> bool {
    if attempt >= config.retries {
        return false;
    }
    match signal {
        AttemptSignal::Status(status) => config.retryable_statuses.contains(&status),
        AttemptSignal::NetworkError => true,
        AttemptSignal::Timeout | AttemptSignal::Aborted => false,
    }
}

/// `base * 2^attempt` milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn compute_backoff(attempt: u32, base_ms: u64) -> u64 {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

/// Backoff for `attempt` after applying the optional cap and jitter.
#[must_use]
pub fn backoff_delay(attempt: u32, base_ms: u64, limits: &BackoffLimits) -> Duration {
    let mut delay = compute_backoff(attempt, base_ms);
    if let Some(cap) = limits.max_delay_ms {
        delay = delay.min(cap);
    }
    if limits.jitter && delay > 0 {
        let spread = delay / 10;
        if spread > 0 {
            delay = delay.saturating_add(rand::thread_rng().gen_range(0..=spread));
        }
    }
    Duration::from_millis(delay)
}
