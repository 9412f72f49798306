//! davetjet: request reliability and onboarding orchestration for the
//! invitation dashboard.
//!
//! The transport half lives in the [`davetjet_transport`] member crate. This
//! crate builds on it:
//!
//! - **Tasks**: the onboarding checklist with gating, snooze and a badge
//!   ([`tasks`])
//! - **Tours**: step-by-step page walkthroughs ([`onboarding`])
//! - **Cooldown**: persisted per-action rate limiting ([`cooldown`])
//! - **Storage**: key-value persistence and the clock ([`storage`])
//! - **Composition**: [`App`] wires all of it around one event bus
//!
//! ```no_run
//! # async fn demo() -> davetjet::Result<()> {
//! use davetjet::{App, AppConfig};
//! use davetjet_transport::OutgoingRequest;
//!
//! let app = App::from_config(AppConfig::default())?;
//! let _ = app
//!     .fetch(OutgoingRequest::post("https://app.davetjet.test/create-invitation-api"))
//!     .await;
//! let drawer = app.tasks()?.drawer("wizard");
//! println!("{}% done", drawer.percent);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod app_dirs;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod onboarding;
pub mod storage;
pub mod tasks;

pub use app::{App, AppParts};
pub use config::{AppConfig, StorageSettings, TaskSettings};
pub use cooldown::{CooldownError, CooldownGuard};
pub use error::{AppError, Result};
pub use onboarding::{Placement, Tour, TourPhase, TourStep};
pub use storage::{Clock, FileStore, KeyValueStore, ManualClock, MemoryStore, SystemClock};
pub use tasks::{ActionEffect, SnoozePreset, TaskAction, TaskEngine, TaskStatus};
