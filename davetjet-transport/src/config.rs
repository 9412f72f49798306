//! Per-call request configuration.
//!
//! A [`RequestConfig`] is immutable for the lifetime of one logical call. It is
//! derived by layering call-site [`ConfigOverrides`] on top of the executor's
//! global defaults via [`RequestConfig::merged`].

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Statuses retried by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// How the terminal response body is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Hand the response back untouched.
    #[default]
    Raw,
    /// Decode the body as JSON.
    Json,
    /// Decode the body as UTF-8 text.
    Text,
    /// Keep the body as an HTML document.
    Html,
}

/// Optional cap and jitter applied on top of the exponential backoff.
///
/// The default applies neither, so delays grow as `base * 2^attempt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffLimits {
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: Option<u64>,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

/// Configuration for a single logical call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-attempt deadline in milliseconds. `0` disables the timer.
    pub timeout_ms: u64,
    /// Additional attempts after the first one.
    pub retries: u32,
    /// HTTP statuses that may be retried.
    pub retryable_statuses: BTreeSet<u16>,
    /// Base delay of the exponential backoff.
    pub retry_backoff_base_ms: u64,
    /// Cap / jitter for the backoff.
    pub backoff: BackoffLimits,
    /// Delay before a "connection is slow" notice. `0` disables the watchdog.
    pub slow_threshold_ms: u64,
    /// Whether this call may raise the slow notice at all.
    pub show_slow_notice: bool,
    /// Minimum spacing between two slow notices, process-wide.
    pub slow_notice_cooldown_ms: u64,
    /// Prefix for user-facing messages.
    pub label: String,
    /// Suppress every user-facing notification for this call.
    pub silent: bool,
    /// Body decoding mode.
    pub response_mode: ResponseMode,
    /// Surface sidecar messages embedded in text/html bodies.
    pub auto_sidecar: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 12_000,
            retries: 0,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            retry_backoff_base_ms: 450,
            backoff: BackoffLimits::default(),
            slow_threshold_ms: 4_000,
            show_slow_notice: true,
            slow_notice_cooldown_ms: 15_000,
            label: String::new(),
            silent: false,
            response_mode: ResponseMode::Raw,
            auto_sidecar: true,
        }
    }
}

impl RequestConfig {
    /// Layer `overrides` on top of `defaults`.
    #[must_use]
    pub fn merged(defaults: &RequestConfig, overrides: &ConfigOverrides) -> Self {
        let mut config = defaults.clone();
        overrides.apply_to(&mut config);
        config
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the backoff cap is zero or a
    /// retryable status is outside `100..=599`.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.backoff.max_delay_ms == Some(0) {
            return Err(TransportError::Config(
                "backoff.max_delay_ms must be > 0 when set".into(),
            ));
        }
        if self.retryable_statuses.iter().any(|s| !(100..=599).contains(s)) {
            return Err(TransportError::Config(
                "retryable_statuses must be valid HTTP status codes".into(),
            ));
        }
        Ok(())
    }

    /// Per-attempt deadline, `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Watchdog delay, `None` when the slow notice is not applicable.
    #[must_use]
    pub fn slow_threshold(&self) -> Option<Duration> {
        (self.show_slow_notice && self.slow_threshold_ms > 0 && !self.silent)
            .then(|| Duration::from_millis(self.slow_threshold_ms))
    }

    /// `"<label>: "` or the empty string.
    #[must_use]
    pub fn message_prefix(&self) -> String {
        if self.label.is_empty() {
            String::new()
        } else {
            format!("{}: ", self.label)
        }
    }
}

/// Partial configuration supplied at a call site or by an intercept policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retryable_statuses: Option<BTreeSet<u16>>,
    pub retry_backoff_base_ms: Option<u64>,
    pub backoff: Option<BackoffLimits>,
    pub slow_threshold_ms: Option<u64>,
    pub show_slow_notice: Option<bool>,
    pub slow_notice_cooldown_ms: Option<u64>,
    pub label: Option<String>,
    pub silent: Option<bool>,
    pub response_mode: Option<ResponseMode>,
    pub auto_sidecar: Option<bool>,
}

impl ConfigOverrides {
    /// Overrides with only a label set.
    #[must_use]
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    /// Combine two override sets; fields set in `other` win.
    #[must_use]
    pub fn layered(mut self, other: &ConfigOverrides) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            timeout_ms,
            retries,
            retryable_statuses,
            retry_backoff_base_ms,
            backoff,
            slow_threshold_ms,
            show_slow_notice,
            slow_notice_cooldown_ms,
            label,
            silent,
            response_mode,
            auto_sidecar
        );
        self
    }

    /// Write every set field into `config`.
    pub fn apply_to(&self, config: &mut RequestConfig) {
        macro_rules! put {
            ($($field:ident),*) => {
                $(if let Some(value) = &self.$field {
                    config.$field = value.clone();
                })*
            };
        }
        put!(
            timeout_ms,
            retries,
            retryable_statuses,
            retry_backoff_base_ms,
            backoff,
            slow_threshold_ms,
            show_slow_notice,
            slow_notice_cooldown_ms,
            label,
            silent,
            response_mode,
            auto_sidecar
        );
    }
}
