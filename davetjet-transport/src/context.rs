//! Shared coordination state for one transport instance.
//!
//! Everything that used to be a process-wide global (slow-notice flag, event
//! bus, notification sink) hangs off a [`TransportContext`]. Production code
//! builds one and shares it; tests build a fresh one each.

use crate::events::EventBus;
use crate::notify::{Notifier, TracingNotifier};
use crate::slow::SlowSignal;
use std::sync::Arc;

pub struct TransportContext {
    slow: SlowSignal,
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl TransportContext {
    pub fn new(notifier: Arc<dyn Notifier>, bus: Arc<EventBus>) -> Self {
        Self {
            slow: SlowSignal::new(),
            bus,
            notifier,
        }
    }

    /// Context logging notices through `tracing` with a private bus.
    pub fn headless() -> Self {
        Self::new(Arc::new(TracingNotifier::new()), Arc::new(EventBus::new()))
    }

    pub fn slow(&self) -> &SlowSignal {
        &self.slow
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}

impl std::fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportContext")
            .field("slow", &self.slow)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
