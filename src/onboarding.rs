//! Page tours.
//!
//! A tour walks the user through a list of [`TourStep`]s anchored to page
//! elements:
//!
//! ```text
//! Idle → Running(i) → Finished
//!             ↘
//!              Skipped
//! ```
//!
//! Finishing a tour marks the page as seen in the store; skipping does not.
//! Both publish `tour-ended` on the event bus so the task engine can complete
//! the page's tour tasks.

use crate::error::Result;
use crate::storage::{KeyValueStore, keys};
use davetjet_transport::{EventBus, topics};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Value stored under the page's onboarding key once its tour was finished.
pub const SEEN_MARKER: &str = "done";

/// Preferred side of the anchor for the popover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Try bottom, top, right, left in that order.
    #[default]
    Auto,
    Top,
    Bottom,
    Left,
    Right,
}

impl Placement {
    /// Unknown values mean [`Placement::Auto`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "top" => Self::Top,
            "bottom" => Self::Bottom,
            "left" => Self::Left,
            "right" => Self::Right,
            _ => Self::Auto,
        }
    }
}

/// One declared step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourStep {
    /// Id of the element the step points at.
    pub anchor_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub placement: Placement,
    /// Page this step belongs to. `None` applies to any page.
    #[serde(default)]
    pub scope: Option<String>,
    /// Sort key. Falls back to the declaration index.
    #[serde(default)]
    pub order: Option<i32>,
}

impl TourStep {
    pub fn new(anchor_id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            title: title.into(),
            body: body.into(),
            placement: Placement::Auto,
            scope: None,
            order: None,
        }
    }

    #[must_use]
    pub fn placed(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    #[must_use]
    pub fn scoped(mut self, page: impl Into<String>) -> Self {
        self.scope = Some(page.into());
        self
    }

    #[must_use]
    pub fn ordered(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

/// Pick the steps shown on `page`.
///
/// Steps scoped to `page` win. Without any, unscoped steps are used, and
/// without those the steps scoped elsewhere. The result is stably sorted by
/// `order`, where a missing order counts as the declaration index.
#[must_use]
pub fn select_steps(page: &str, steps: &[TourStep]) -> Vec<TourStep> {
    let mut scoped = Vec::new();
    let mut unscoped = Vec::new();
    let mut rest = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let key = step
            .order
            .unwrap_or_else(|| i32::try_from(index).unwrap_or(i32::MAX));
        match step.scope.as_deref() {
            None | Some("") => unscoped.push((key, step)),
            Some(scope) if scope == page => scoped.push((key, step)),
            Some(_) => rest.push((key, step)),
        }
    }

    let mut chosen = if !scoped.is_empty() {
        scoped
    } else if !unscoped.is_empty() {
        unscoped
    } else {
        rest
    };
    chosen.sort_by_key(|(key, _)| *key);
    chosen.into_iter().map(|(_, step)| step.clone()).collect()
}

/// Where a tour is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourPhase {
    Idle,
    Running(usize),
    Finished,
    Skipped,
}

/// A tour over one page's steps.
pub struct Tour {
    page: String,
    steps: Vec<TourStep>,
    phase: TourPhase,
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
}

impl fmt::Debug for Tour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tour")
            .field("page", &self.page)
            .field("steps", &self.steps.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Tour {
    /// Build a tour for `page` from every declared step; see [`select_steps`].
    pub fn for_page(
        page: impl Into<String>,
        declared: &[TourStep],
        store: Arc<dyn KeyValueStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        let page = page.into();
        let steps = select_steps(&page, declared);
        Self {
            page,
            steps,
            phase: TourPhase::Idle,
            store,
            bus,
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn steps(&self) -> &[TourStep] {
        &self.steps
    }

    pub fn phase(&self) -> TourPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, TourPhase::Running(_))
    }

    /// Step currently shown.
    pub fn current(&self) -> Option<&TourStep> {
        match self.phase {
            TourPhase::Running(index) => self.steps.get(index),
            _ => None,
        }
    }

    /// `"i / n"` with a one-based `i`, while running.
    pub fn progress_label(&self) -> Option<String> {
        match self.phase {
            TourPhase::Running(index) => Some(format!("{} / {}", index + 1, self.steps.len())),
            _ => None,
        }
    }

    /// Whether this page's tour was finished before.
    pub fn seen(&self) -> bool {
        self.store.get(&keys::onboarding(&self.page)).as_deref() == Some(SEEN_MARKER)
    }

    /// Start at step `index` (clamped). A tour without steps stays idle.
    pub fn start(&mut self, index: usize) -> bool {
        if self.steps.is_empty() {
            tracing::warn!(page = %self.page, "no tour steps for page");
            return false;
        }
        self.go(index);
        true
    }

    /// Start at the step anchored to `anchor_id`, or at the first step.
    pub fn start_at(&mut self, anchor_id: &str) -> bool {
        let index = self
            .steps
            .iter()
            .position(|s| s.anchor_id == anchor_id)
            .unwrap_or(0);
        self.start(index)
    }

    /// Start only if the page's tour was never finished.
    pub fn auto_start_once(&mut self) -> bool {
        if self.seen() {
            tracing::debug!(page = %self.page, "tour already seen");
            return false;
        }
        self.start(0)
    }

    /// Jump to step `index`, clamped to the last step.
    pub fn go(&mut self, index: usize) {
        if let Some(last) = self.steps.len().checked_sub(1) {
            self.phase = TourPhase::Running(index.min(last));
        }
    }

    /// Advance. Moving past the last step finishes the tour.
    ///
    /// # Errors
    ///
    /// Returns an error if finishing could not persist the seen flag.
    pub fn next(&mut self) -> Result<()> {
        match self.phase {
            TourPhase::Running(index) if index + 1 < self.steps.len() => {
                self.phase = TourPhase::Running(index + 1);
                Ok(())
            }
            TourPhase::Running(_) => self.end(false),
            _ => Ok(()),
        }
    }

    pub fn prev(&mut self) {
        if let TourPhase::Running(index) = self.phase {
            self.phase = TourPhase::Running(index.saturating_sub(1));
        }
    }

    /// Close the tour.
    ///
    /// A finished tour marks the page as seen. Either way `tour-ended` is
    /// emitted with `{skipped, page}`. Ending a tour that is not running does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the seen flag cannot be written. The event is
    /// still emitted.
    pub fn end(&mut self, skipped: bool) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.phase = if skipped {
            TourPhase::Skipped
        } else {
            TourPhase::Finished
        };

        let persisted = if skipped {
            Ok(())
        } else {
            self.store.set(&keys::onboarding(&self.page), SEEN_MARKER)
        };
        tracing::info!(page = %self.page, skipped, "tour ended");
        self.bus.emit(
            topics::TOUR_ENDED,
            &json!({ "skipped": skipped, "page": self.page }),
        );
        persisted
    }
}
