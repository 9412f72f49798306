//! Task visibility, completion and badge logic.
//!
//! Per task the engine derives one of four states from the catalog, the
//! persisted [`TaskState`] and the clock:
//!
//! ```text
//! Hidden (gated) → Visible ⇄ Snoozed
//!                     ↘        ↙
//!                       Done
//! ```
//!
//! `Done` is terminal. Every mutation is written to the store before the
//! method returns.

use super::actions::{ActionEffect, TaskAction};
use super::catalog::{Catalog, CatalogError, Task, TaskKind};
use super::snooze::SnoozePreset;
use super::state::TaskState;
use crate::error::Result;
use crate::storage::{Clock, KeyValueStore};
use davetjet_transport::{EventBus, topics};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// How long the badge stays calm after it pulsed.
pub const BADGE_MUTE_MS: i64 = 60 * 60 * 1000;

/// Derived state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// A prerequisite is not done yet.
    Hidden,
    Snoozed { until: i64 },
    Visible,
    Done,
}

/// Done-versus-total counter for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

impl Progress {
    /// Completed share in `0.0..=1.0`. A page without tasks counts as complete.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }
}

/// One visible card in the drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub page: Option<String>,
    pub kind: TaskKind,
    pub critical: bool,
    pub recommended: bool,
}

impl From<&Task> for TaskCard {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            page: task.page.clone(),
            kind: task.kind.clone(),
            critical: task.critical,
            recommended: task.recommended,
        }
    }
}

/// Everything the drawer renders for a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawerSnapshot {
    pub page: String,
    pub cards: Vec<TaskCard>,
    pub progress: Progress,
    pub percent: u8,
    pub badge_count: usize,
}

/// Result of [`TaskEngine::refresh_badge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadgeUpdate {
    pub count: usize,
    /// Draw attention now; the mute window has been re-armed.
    pub pulse: bool,
}

/// Task that a domain event completes, if any.
#[must_use]
pub fn task_for_event(topic: &str) -> Option<&'static str> {
    match topic {
        topics::INVITATION_CREATED | topics::INVITATION_PROMOTED => Some("create_invitation"),
        topics::SEND_SCHEDULED => Some("sending_setup"),
        _ => None,
    }
}

pub struct TaskEngine {
    catalog: Arc<Catalog>,
    state: TaskState,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    event_date: Option<String>,
    current_page: Option<String>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("tasks", &self.catalog.len())
            .field("state", &self.state)
            .field("event_date", &self.event_date)
            .field("current_page", &self.current_page)
            .finish_non_exhaustive()
    }
}

impl TaskEngine {
    /// Build an engine, loading persisted state from `store`.
    pub fn new(catalog: Arc<Catalog>, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let state = TaskState::load(store.as_ref());
        tracing::debug!(
            done = state.done.len(),
            snoozed = state.snooze.len(),
            "task state loaded"
        );
        Self {
            catalog,
            state,
            store,
            clock,
            event_date: None,
            current_page: None,
        }
    }

    /// Event date used by the "before event" snooze preset.
    pub fn set_event_date(&mut self, iso: Option<String>) {
        self.event_date = iso;
    }

    /// Page the user is on. `tour-ended` events without a page refer to it.
    pub fn set_current_page(&mut self, page: Option<String>) {
        self.current_page = page;
    }

    pub fn current_page(&self) -> Option<&str> {
        self.current_page.as_deref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Current state of `id`, or `None` for ids outside the catalog.
    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        let task = self.catalog.get(id)?;
        Some(self.status_of(task, self.clock.now_ms()))
    }

    fn status_of(&self, task: &Task, now_ms: i64) -> TaskStatus {
        if self.state.is_done(&task.id) {
            return TaskStatus::Done;
        }
        if task.requires.iter().any(|r| !self.state.is_done(r)) {
            return TaskStatus::Hidden;
        }
        match self.state.snooze_until(&task.id) {
            Some(until) if now_ms < until => TaskStatus::Snoozed { until },
            _ => TaskStatus::Visible,
        }
    }

    /// Actionable tasks on `page` (all pages when `None`), in catalog order.
    pub fn visible(&self, page: Option<&str>) -> Vec<&Task> {
        let now = self.clock.now_ms();
        self.catalog
            .iter()
            .filter(|t| page.is_none_or(|p| t.on_page(p)))
            .filter(|t| self.status_of(t, now) == TaskStatus::Visible)
            .collect()
    }

    pub fn progress(&self, page: &str) -> Progress {
        let (done, total) = self
            .catalog
            .for_page(page)
            .fold((0, 0), |(done, total), t| {
                (done + usize::from(self.state.is_done(&t.id)), total + 1)
            });
        Progress { done, total }
    }

    /// Number of actionable tasks across every page.
    pub fn badge_count(&self) -> usize {
        self.visible(None).len()
    }

    /// Recount the badge and decide whether it should pulse.
    ///
    /// Pulsing arms a one-hour mute that is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the mute fails.
    pub fn refresh_badge(&mut self) -> Result<BadgeUpdate> {
        let count = self.badge_count();
        let now = self.clock.now_ms();
        let pulse = count > 0 && now > self.state.muted_badge_until;
        if pulse {
            self.state.muted_badge_until = now + BADGE_MUTE_MS;
            self.state.save(self.store.as_ref())?;
        }
        Ok(BadgeUpdate { count, pulse })
    }

    pub fn drawer(&self, page: &str) -> DrawerSnapshot {
        let progress = self.progress(page);
        DrawerSnapshot {
            page: page.to_owned(),
            cards: self
                .visible(Some(page))
                .into_iter()
                .map(TaskCard::from)
                .collect(),
            progress,
            percent: progress.percent(),
            badge_count: self.badge_count(),
        }
    }

    /// Mark `id` done. Returns `false` (and writes nothing) if it already was.
    ///
    /// # Errors
    ///
    /// Fails for ids outside the catalog or if persisting fails.
    pub fn complete(&mut self, id: &str) -> Result<bool> {
        self.ensure_known(id)?;
        if !self.state.mark_done(id) {
            return Ok(false);
        }
        self.state.save(self.store.as_ref())?;
        tracing::info!(task_id = id, "task completed");
        Ok(true)
    }

    /// Hide `id` until the preset's deadline. Returns the deadline.
    ///
    /// # Errors
    ///
    /// Fails for ids outside the catalog or if persisting fails.
    pub fn snooze(&mut self, id: &str, preset: SnoozePreset) -> Result<i64> {
        self.ensure_known(id)?;
        let until = preset.until(self.clock.now_ms(), self.event_date.as_deref());
        self.state.snooze.insert(id.to_owned(), until);
        self.state.save(self.store.as_ref())?;
        tracing::info!(task_id = id, preset = %preset, until, "task snoozed");
        Ok(until)
    }

    /// Apply a card action.
    ///
    /// # Errors
    ///
    /// Fails for ids outside the catalog or if persisting fails.
    pub fn dispatch(&mut self, id: &str, action: TaskAction) -> Result<ActionEffect> {
        let task = self
            .catalog
            .get(id)
            .ok_or_else(|| CatalogError::UnknownTask(id.to_owned()))?;
        match action {
            TaskAction::Start | TaskAction::Redirect => Ok(match &task.kind {
                TaskKind::Tour { tour_key } => ActionEffect::StartTour {
                    tour_key: tour_key.clone(),
                },
                TaskKind::Redirect { href } => ActionEffect::Navigate { href: href.clone() },
            }),
            TaskAction::Complete => {
                self.complete(id)?;
                Ok(ActionEffect::Refresh)
            }
            TaskAction::Snooze(preset) => {
                self.snooze(id, preset)?;
                Ok(ActionEffect::Refresh)
            }
        }
    }

    /// React to a bus event. Returns the ids that became done.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    pub fn handle_event(&mut self, topic: &str, payload: &Value) -> Result<Vec<String>> {
        if topic == topics::TOUR_ENDED {
            return self.handle_tour_ended(payload);
        }
        let Some(id) = task_for_event(topic) else {
            tracing::debug!(topic, "event has no mapped task");
            return Ok(Vec::new());
        };
        if !self.catalog.contains(id) {
            return Ok(Vec::new());
        }
        Ok(if self.complete(id)? {
            vec![id.to_owned()]
        } else {
            Vec::new()
        })
    }

    fn handle_tour_ended(&mut self, payload: &Value) -> Result<Vec<String>> {
        if payload.get("skipped").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(Vec::new());
        }
        let page = payload
            .get("page")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .or_else(|| self.current_page.clone());
        let Some(page) = page else {
            tracing::warn!("tour-ended without a page and no current page; ignored");
            return Ok(Vec::new());
        };
        let page = page.as_str();
        let ids: Vec<String> = self
            .catalog
            .iter()
            .filter(|t| t.is_tour() && t.page.as_deref().unwrap_or_default() == page)
            .filter(|t| !self.state.is_done(&t.id))
            .map(|t| t.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }
        for id in &ids {
            self.state.mark_done(id);
        }
        self.state.save(self.store.as_ref())?;
        tracing::info!(page, completed = ids.len(), "tour tasks completed");
        Ok(ids)
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if self.catalog.contains(id) {
            Ok(())
        } else {
            Err(CatalogError::UnknownTask(id.to_owned()).into())
        }
    }
}

/// Route the domain events and tour endings on `bus` into `engine`.
pub fn subscribe(engine: &Arc<Mutex<TaskEngine>>, bus: &EventBus) {
    for topic in [
        topics::INVITATION_CREATED,
        topics::INVITATION_PROMOTED,
        topics::SEND_SCHEDULED,
        topics::RECIPIENTS_ADDED,
        topics::TOUR_ENDED,
    ] {
        let engine = Arc::clone(engine);
        bus.on(topic, move |payload| {
            let mut engine = engine
                .lock()
                .map_err(|_| "task engine lock poisoned".to_owned())?;
            engine.handle_event(topic, payload)?;
            Ok(())
        });
    }
}
