//! Error types for the davetjet-transport crate.
//!
//! Two families live here:
//!
//! - [`TransportError`]: setup problems (bad config, unbuildable client,
//!   invalid path pattern). These are returned from constructors.
//! - [`RequestFailure`]: the single terminal failure of a logical call after
//!   the executor has exhausted its retry budget or hit a terminal condition.

use crate::http::HttpResponse;
use serde_json::Value;
use std::fmt;

/// Errors raised while building transport components.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Invalid request or intercept configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A URL or payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A path pattern failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Convenience type alias for transport setup results.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Why a logical call ended without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The per-attempt deadline expired before a response arrived.
    Timeout,
    /// The caller cancelled the call.
    Aborted,
    /// The server answered with a non-2xx status and no retry remained.
    HttpError,
    /// Transport-level failure (connection refused, reset, DNS) after retries.
    NetworkError,
}

impl FailureKind {
    /// Stable lowercase code for logs and wire payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
            Self::HttpError => "http_error",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response body attached to an [`FailureKind::HttpError`] for inspection.
#[derive(Debug, Clone)]
pub enum FailureBody {
    /// Body decoded as JSON (json mode). Undecodable bodies become `{}`.
    Json(Value),
    /// Body as text (text mode).
    Text(String),
    /// Body as HTML source (html mode).
    Html(String),
}

/// Terminal failure of a logical call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RequestFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// HTTP status, present for [`FailureKind::HttpError`].
    pub status: Option<u16>,
    /// Human-readable message (the one that was, or would have been, surfaced).
    pub message: String,
    /// Call label, empty when none was configured.
    pub label: String,
    /// Decoded body for http failures in json/text/html mode.
    pub body: Option<FailureBody>,
    /// The untouched response for http failures in raw mode.
    pub response: Option<HttpResponse>,
}

impl RequestFailure {
    pub(crate) fn new(kind: FailureKind, label: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            label: label.to_owned(),
            body: None,
            response: None,
        }
    }

    pub(crate) fn http(status: u16, label: &str, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(FailureKind::HttpError, label, message)
        }
    }

    /// Returns `true` for caller-initiated cancellation.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.kind == FailureKind::Aborted
    }

    /// Returns `true` when the deadline expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let err = TransportError::Config("timeout_ms must be >= 0".into());
        assert_eq!(err.to_string(), "config error: timeout_ms must be >= 0");
    }

    #[test]
    fn display_pattern() {
        let err = TransportError::from(regex::Regex::new("(").unwrap_err());
        assert!(err.to_string().starts_with("pattern error:"));
    }

    #[test]
    fn failure_display_includes_kind_and_message() {
        let failure = RequestFailure::http(503, "Save", "Service Unavailable");
        assert_eq!(failure.to_string(), "http_error: Service Unavailable");
        assert_eq!(failure.status, Some(503));
        assert_eq!(failure.label, "Save");
    }

    #[test]
    fn failure_predicates() {
        assert!(RequestFailure::new(FailureKind::Aborted, "", "aborted").is_aborted());
        assert!(RequestFailure::new(FailureKind::Timeout, "", "late").is_timeout());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportError>();
        assert_send_sync::<RequestFailure>();
    }
}
