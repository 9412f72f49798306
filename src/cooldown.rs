//! Persistent per-key cooldowns.
//!
//! A key is cooling while `now < ready_at`. Ready-at timestamps live in the
//! key-value store under [`keys::COOLDOWN`] and are re-read before every
//! decision, so a cooldown survives restarts and is shared by every guard
//! built over the same store.

use crate::error::Result;
use crate::storage::{Clock, KeyValueStore, keys, load_json, save_json};
use davetjet_transport::{Notifier, NotifyLevel, NotifyOptions};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// How long a rejection warning is shown.
const WARNING_DURATION_MS: u64 = 3_000;

/// Identical warnings within this window are shown once.
const WARNING_DEDUP_MS: i64 = 4_000;

/// Rejection from a guarded action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CooldownError {
    /// The key is still cooling down.
    #[error("cooldown active for `{key}`; {remaining_ms} ms left")]
    Active {
        key: String,
        /// Milliseconds until the key is ready again.
        remaining_ms: u64,
    },
}

impl CooldownError {
    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        match self {
            Self::Active { remaining_ms, .. } => *remaining_ms,
        }
    }
}

type ReadyAt = BTreeMap<String, i64>;

/// Persistent rate limiter keyed by string.
pub struct CooldownGuard {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn Notifier>>,
    // message -> shown-at, for warning dedup
    recent_warnings: Mutex<HashMap<String, i64>>,
}

impl std::fmt::Debug for CooldownGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownGuard")
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl CooldownGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            notifier: None,
            recent_warnings: Mutex::new(HashMap::new()),
        }
    }

    /// Surface a warning through `notifier` whenever a guarded call is rejected.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn load(&self) -> ReadyAt {
        load_json(self.store.as_ref(), keys::COOLDOWN)
    }

    /// Milliseconds until `key` is ready, `0` when it already is.
    pub fn remaining(&self, key: &str) -> u64 {
        let ready_at = self.load().get(key).copied().unwrap_or(0);
        u64::try_from(ready_at.saturating_sub(self.clock.now_ms())).unwrap_or(0)
    }

    pub fn is_cooling(&self, key: &str) -> bool {
        self.remaining(key) > 0
    }

    /// Start (or restart) a cooldown of `duration_ms` for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn set(&self, key: &str, duration_ms: u64) -> Result<()> {
        let mut db = self.load();
        let duration = i64::try_from(duration_ms).unwrap_or(i64::MAX);
        db.insert(key.to_owned(), self.clock.now_ms().saturating_add(duration));
        save_json(self.store.as_ref(), keys::COOLDOWN, &db)
    }

    /// Forget the cooldown for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn clear(&self, key: &str) -> Result<()> {
        let mut db = self.load();
        if db.remove(key).is_some() {
            save_json(self.store.as_ref(), keys::COOLDOWN, &db)?;
        }
        Ok(())
    }

    /// Admit one invocation: reject while cooling, otherwise arm the
    /// cooldown. A failed store write is logged and does not block the action.
    ///
    /// # Errors
    ///
    /// Returns [`CooldownError::Active`] while `key` is cooling.
    pub fn try_acquire(&self, key: &str, duration_ms: u64) -> std::result::Result<(), CooldownError> {
        let remaining_ms = self.remaining(key);
        if remaining_ms > 0 {
            tracing::debug!(key, remaining_ms, "cooldown rejected call");
            self.warn_once(&format!("Please wait: {} s", remaining_ms.div_ceil(1000)));
            return Err(CooldownError::Active {
                key: key.to_owned(),
                remaining_ms,
            });
        }
        if let Err(e) = self.set(key, duration_ms) {
            tracing::warn!(key, error = %e, "cannot persist cooldown");
        }
        Ok(())
    }

    /// Run `action` under the cooldown for `key`.
    ///
    /// The cooldown is armed before `action` runs and stays armed if it fails.
    ///
    /// # Errors
    ///
    /// Returns [`CooldownError::Active`] without running `action` while cooling.
    pub async fn run<F, Fut>(
        &self,
        key: &str,
        duration_ms: u64,
        action: F,
    ) -> std::result::Result<Fut::Output, CooldownError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.try_acquire(key, duration_ms)?;
        Ok(action().await)
    }

    /// Wrap `action` so every invocation goes through [`CooldownGuard::run`].
    pub fn guard<F>(self: &Arc<Self>, key: impl Into<String>, duration_ms: u64, action: F) -> Guarded<F> {
        Guarded {
            guard: Arc::clone(self),
            key: key.into(),
            duration_ms,
            action,
        }
    }

    /// Countdown text while `key` is cooling, `None` once ready.
    ///
    /// `template` has `%s` replaced by the remaining whole seconds; without a
    /// template the label is `"N s"`.
    pub fn countdown_label(&self, key: &str, template: Option<&str>) -> Option<String> {
        let remaining = self.remaining(key);
        if remaining == 0 {
            return None;
        }
        let secs = remaining.div_ceil(1000).to_string();
        Some(match template {
            Some(template) => template.replace("%s", &secs),
            None => format!("{secs} s"),
        })
    }

    /// Interpret a `Retry-After` header relative to this guard's clock.
    pub fn parse_retry_after(&self, value: &str) -> Option<u64> {
        parse_retry_after(value, self.clock.now_ms())
    }

    fn warn_once(&self, message: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let now = self.clock.now_ms();
        if let Ok(mut recent) = self.recent_warnings.lock() {
            recent.retain(|_, shown_at| now - *shown_at < WARNING_DEDUP_MS);
            if recent.contains_key(message) {
                return;
            }
            recent.insert(message.to_owned(), now);
        }
        notifier.notify(
            NotifyLevel::Warning,
            message,
            NotifyOptions::timed(WARNING_DURATION_MS),
        );
    }
}

/// A cooldown-wrapped action returned by [`CooldownGuard::guard`].
pub struct Guarded<F> {
    guard: Arc<CooldownGuard>,
    key: String,
    duration_ms: u64,
    action: F,
}

impl<F, Fut> Guarded<F>
where
    F: Fn() -> Fut,
    Fut: Future,
{
    /// # Errors
    ///
    /// Returns [`CooldownError::Active`] while the key is cooling.
    pub async fn invoke(&self) -> std::result::Result<Fut::Output, CooldownError> {
        self.guard
            .run(&self.key, self.duration_ms, || (self.action)())
            .await
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Interpret a `Retry-After` header: integer seconds or an HTTP date.
///
/// Returns milliseconds to wait (never negative) or `None` if unparseable.
pub fn parse_retry_after(value: &str, now_ms: i64) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    // Leading integer, as lenient integer parsers accept "120" or "120s".
    let digits_end = value
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(value.len(), |(i, _)| i);
    if let Ok(secs) = value[..digits_end].parse::<i64>() {
        return Some(u64::try_from(secs.saturating_mul(1000)).unwrap_or(0));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(value))
        .ok()?;
    Some(u64::try_from(at.timestamp_millis() - now_ms).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::storage::{ManualClock, MemoryStore};
    use davetjet_transport::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        guard: Arc<CooldownGuard>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let guard = Arc::new(
            CooldownGuard::new(store.clone(), clock.clone()).with_notifier(notifier.clone()),
        );
        Fixture {
            guard,
            clock,
            store,
            notifier,
        }
    }

    #[test]
    fn set_and_expire() {
        let f = fixture();
        assert!(!f.guard.is_cooling("submit"));
        f.guard.set("submit", 5_000).unwrap();
        assert_eq!(f.guard.remaining("submit"), 5_000);
        f.clock.advance(4_999);
        assert!(f.guard.is_cooling("submit"));
        f.clock.advance(1);
        assert!(!f.guard.is_cooling("submit"));
    }

    #[test]
    fn clear_removes_key() {
        let f = fixture();
        f.guard.set("a", 10_000).unwrap();
        f.guard.clear("a").unwrap();
        assert_eq!(f.guard.remaining("a"), 0);
    }

    #[test]
    fn state_survives_a_new_guard() {
        let f = fixture();
        f.guard.set("submit", 60_000).unwrap();
        let reopened = CooldownGuard::new(f.store.clone(), f.clock.clone());
        assert!(reopened.is_cooling("submit"));
    }

    #[test]
    fn corrupt_state_counts_as_ready() {
        let f = fixture();
        f.store.set(keys::COOLDOWN, "[oops").unwrap();
        assert!(!f.guard.is_cooling("submit"));
        f.guard.set("submit", 1_000).unwrap();
        assert!(f.guard.is_cooling("submit"));
    }

    #[tokio::test]
    async fn guard_rejects_within_window_then_rearms() {
        let f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let submit = f.guard.guard("submit", 5_000, move || {
            let counter = Arc::clone(&counter);
            async move { counter.fetch_add(1, Ordering::SeqCst) }
        });

        submit.invoke().await.unwrap();
        f.clock.advance(1_200);
        let err = submit.invoke().await.unwrap_err();
        assert_eq!(err.remaining_ms(), 3_800);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        f.clock.advance(3_800);
        submit.invoke().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.guard.remaining("submit"), 5_000);
    }

    #[tokio::test]
    async fn cooldown_arms_even_if_action_fails() {
        let f = fixture();
        let outcome = f
            .guard
            .run("send", 2_000, || async { Err::<(), &str>("server down") })
            .await
            .unwrap();
        assert!(outcome.is_err());
        assert!(f.guard.is_cooling("send"));
    }

    #[test]
    fn rejection_warning_is_deduplicated() {
        let f = fixture();
        f.guard.try_acquire("k", 10_000).unwrap();
        assert!(f.guard.try_acquire("k", 10_000).is_err());
        assert!(f.guard.try_acquire("k", 10_000).is_err());
        assert_eq!(f.notifier.matching("Please wait: 10 s").len(), 1);

        f.clock.advance(4_500);
        assert!(f.guard.try_acquire("k", 10_000).is_err());
        assert_eq!(f.notifier.matching("Please wait: 6 s").len(), 1);
        assert_eq!(f.notifier.notices()[0].level, NotifyLevel::Warning);
    }

    #[test]
    fn countdown_label_rounds_up() {
        let f = fixture();
        assert!(f.guard.countdown_label("k", None).is_none());
        f.guard.set("k", 2_100).unwrap();
        assert_eq!(f.guard.countdown_label("k", None).as_deref(), Some("3 s"));
        assert_eq!(
            f.guard.countdown_label("k", Some("Resend in %s s")).as_deref(),
            Some("Resend in 3 s")
        );
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("120", 0), Some(120_000));
        assert_eq!(parse_retry_after(" 7s", 0), Some(7_000));
        assert_eq!(parse_retry_after("-3", 0), Some(0));
        assert_eq!(parse_retry_after("", 0), None);
        assert_eq!(parse_retry_after("soon", 0), None);
    }

    #[test]
    fn retry_after_http_date() {
        let now = chrono::DateTime::parse_from_rfc3339("2015-10-21T07:27:30Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(30_000)
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(0)
        );
    }
}
