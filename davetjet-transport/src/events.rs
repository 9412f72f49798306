//! Synchronous publish/subscribe bus.
//!
//! Handlers run in registration order on the emitting thread. A handler that
//! returns an error or panics is logged and skipped; the remaining handlers
//! still run and the emitter never sees the failure.

use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Well-known topics.
pub mod topics {
    /// An invitation was created and published.
    pub const INVITATION_CREATED: &str = "invitation-created";
    /// A draft invitation was promoted.
    pub const INVITATION_PROMOTED: &str = "invitation-promoted";
    /// A send was scheduled.
    pub const SEND_SCHEDULED: &str = "send-scheduled";
    /// Recipients were added to an invitation.
    pub const RECIPIENTS_ADDED: &str = "recipients-added";
    /// An onboarding tour ended. Payload: `{skipped, page}`.
    pub const TOUR_ENDED: &str = "tour-ended";
    /// A call hit its deadline. Payload: `{url, timeoutMs, label}`.
    pub const REQUEST_TIMEOUT: &str = "request-timeout";
}

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync>;

/// In-memory event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<String> = self
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    pub fn on<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let topic = topic.into();
        match self.handlers.write() {
            Ok(mut handlers) => handlers.entry(topic).or_default().push(Arc::new(handler)),
            Err(_) => tracing::warn!(%topic, "event bus poisoned; handler not registered"),
        }
    }

    /// Deliver `payload` to every handler registered for `topic`.
    ///
    /// Returns the number of handlers that completed successfully.
    pub fn emit(&self, topic: &str, payload: &Value) -> usize {
        // Snapshot so handlers may register more handlers without deadlocking.
        let snapshot: Vec<Handler> = match self.handlers.read() {
            Ok(handlers) => handlers.get(topic).cloned().unwrap_or_default(),
            Err(_) => return 0,
        };
        tracing::trace!(topic, handlers = snapshot.len(), "emitting event");

        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => tracing::warn!(topic, error = %e, "event handler failed"),
                Err(_) => tracing::warn!(topic, "event handler panicked"),
            }
        }
        delivered
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers
            .read()
            .map(|h| h.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}
