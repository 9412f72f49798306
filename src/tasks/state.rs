//! Persisted task progress.

use crate::error::Result;
use crate::storage::{KeyValueStore, keys, load_json, save_json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Completion, snoozes and badge mute, stored under [`keys::TASKS`].
///
/// Snoozes are never deleted; they lapse by comparison with the clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskState {
    /// Ids of completed tasks.
    pub done: BTreeSet<String>,
    /// Task id to snooze deadline (epoch ms).
    pub snooze: BTreeMap<String, i64>,
    /// Badge does not pulse again before this instant (epoch ms).
    pub muted_badge_until: i64,
}

impl TaskState {
    /// Load from `store`; missing or corrupt state yields the empty default.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_json(store, keys::TASKS)
    }

    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        save_json(store, keys::TASKS, self)
    }

    pub fn is_done(&self, id: &str) -> bool {
        self.done.contains(id)
    }

    /// Mark `id` done. Returns `false` if it already was.
    pub fn mark_done(&mut self, id: &str) -> bool {
        self.done.insert(id.to_owned())
    }

    pub fn snooze_until(&self, id: &str) -> Option<i64> {
        self.snooze.get(id).copied()
    }

    /// Whether `id` is past its snooze (or was never snoozed).
    pub fn is_due(&self, id: &str, now_ms: i64) -> bool {
        self.snooze_until(id).is_none_or(|until| now_ms >= until)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn mark_done_is_idempotent() {
        let mut state = TaskState::default();
        assert!(state.mark_done("create_invitation"));
        assert!(!state.mark_done("create_invitation"));
        assert_eq!(state.done.len(), 1);
    }

    #[test]
    fn snooze_boundary_is_inclusive() {
        let mut state = TaskState::default();
        state.snooze.insert("t".into(), 1_000);
        assert!(!state.is_due("t", 999));
        assert!(state.is_due("t", 1_000));
        assert!(state.is_due("other", 0));
    }

    #[test]
    fn persists_with_camel_case_fields() {
        let store = MemoryStore::new();
        let mut state = TaskState::default();
        state.mark_done("wiz_info");
        state.muted_badge_until = 42;
        state.save(&store).unwrap();

        let raw = store.get(keys::TASKS).unwrap();
        assert!(raw.contains("mutedBadgeUntil"));
        assert_eq!(TaskState::load(&store), state);
    }

    #[test]
    fn partial_or_corrupt_state_recovers() {
        let store = MemoryStore::new();
        store.set(keys::TASKS, r#"{"done": ["a"]}"#).unwrap();
        let state = TaskState::load(&store);
        assert!(state.is_done("a"));
        assert!(state.snooze.is_empty());

        store.set(keys::TASKS, "null?").unwrap();
        assert_eq!(TaskState::load(&store), TaskState::default());
    }
}
