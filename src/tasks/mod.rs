//! Onboarding task drawer.
//!
//! A fixed [`Catalog`] of tasks, a persisted [`TaskState`], and the
//! [`TaskEngine`] that combines them with the clock to decide what is visible
//! on each page. The engine reacts to domain events from the transport bus
//! through [`subscribe`].

pub mod actions;
pub mod catalog;
pub mod engine;
pub mod snooze;
pub mod state;

pub use actions::{ActionEffect, TaskAction};
pub use catalog::{Catalog, CatalogError, Task, TaskKind};
pub use engine::{
    BadgeUpdate, DrawerSnapshot, Progress, TaskCard, TaskEngine, TaskStatus, subscribe,
    task_for_event,
};
pub use snooze::SnoozePreset;
pub use state::TaskState;
