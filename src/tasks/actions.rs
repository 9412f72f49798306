//! Card actions and what the shell should do after them.

use super::snooze::SnoozePreset;
use serde::Serialize;

/// A user action on a task card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Run the task's tour.
    Start,
    /// Follow the task's link.
    Redirect,
    /// Mark the task done.
    Complete,
    Snooze(SnoozePreset),
}

impl TaskAction {
    /// Parse a wire action: `start`, `redirect`, `done`, or `snooze:<code>`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "start" => Some(Self::Start),
            "redirect" => Some(Self::Redirect),
            "done" | "complete" => Some(Self::Complete),
            other => other
                .strip_prefix("snooze:")
                .map(|code| Self::Snooze(SnoozePreset::parse_lenient(code))),
        }
    }
}

/// Follow-up for the shell after an action was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ActionEffect {
    /// Close the drawer and run the page tour from `tour_key`.
    StartTour { tour_key: String },
    /// Close the drawer and navigate.
    Navigate { href: String },
    /// State changed; re-render the drawer and badge.
    Refresh,
}
