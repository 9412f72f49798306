//! Notification sink.
//!
//! Rendering is someone else's job: the transport only calls [`Notifier`].
//! [`TracingNotifier`] is the headless default; [`RecordingNotifier`] keeps
//! every notice in memory so callers can inspect what would have been shown.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

impl NotifyLevel {
    /// Parse a level name; unknown names fall back to [`NotifyLevel::Info`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display options for a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyOptions {
    /// Auto-dismiss delay in milliseconds; `0` keeps the notice until dismissed.
    pub duration_ms: u64,
    /// Whether the user may close the notice.
    pub dismissible: bool,
}

impl NotifyOptions {
    /// Dismissible notice shown for `duration_ms`.
    #[must_use]
    pub fn timed(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            dismissible: true,
        }
    }

    /// Notice that stays until dismissed.
    #[must_use]
    pub fn sticky() -> Self {
        Self::timed(0)
    }
}

/// Identifier handed back by [`Notifier::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(pub u64);

/// External notification sink.
pub trait Notifier: Send + Sync {
    /// Surface a notice.
    fn notify(&self, level: NotifyLevel, message: &str, options: NotifyOptions) -> NoticeId;

    /// Hide a previously surfaced notice. Unknown ids are ignored.
    fn dismiss(&self, id: NoticeId);
}

/// Logs notices through `tracing`.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    next_id: AtomicU64,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str, options: NotifyOptions) -> NoticeId {
        let id = NoticeId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        match level {
            NotifyLevel::Error => {
                tracing::error!(notice = id.0, duration_ms = options.duration_ms, "{message}");
            }
            NotifyLevel::Warning => {
                tracing::warn!(notice = id.0, duration_ms = options.duration_ms, "{message}");
            }
            NotifyLevel::Success | NotifyLevel::Info => {
                tracing::info!(notice = id.0, duration_ms = options.duration_ms, "{message}");
            }
        }
        id
    }

    fn dismiss(&self, id: NoticeId) {
        tracing::debug!(notice = id.0, "notice dismissed");
    }
}

/// A notice captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotice {
    pub id: NoticeId,
    pub level: NotifyLevel,
    pub message: String,
    pub options: NotifyOptions,
    pub dismissed: bool,
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<RecordedNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything surfaced so far.
    pub fn notices(&self) -> Vec<RecordedNotice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Notices whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<RecordedNotice> {
        self.notices()
            .into_iter()
            .filter(|notice| notice.message.contains(needle))
            .collect()
    }

    /// Number of notices surfaced so far.
    pub fn len(&self) -> usize {
        self.notices.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// `true` when nothing has been surfaced.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str, options: NotifyOptions) -> NoticeId {
        let Ok(mut notices) = self.notices.lock() else {
            return NoticeId(0);
        };
        let id = NoticeId(notices.len() as u64 + 1);
        notices.push(RecordedNotice {
            id,
            level,
            message: message.to_owned(),
            options,
            dismissed: false,
        });
        id
    }

    fn dismiss(&self, id: NoticeId) {
        if let Ok(mut notices) = self.notices.lock() {
            if let Some(notice) = notices.iter_mut().find(|n| n.id == id) {
                notice.dismissed = true;
            }
        }
    }
}
