//! Persistent key-value storage and the wall clock.
//!
//! State is stored as JSON strings under versioned keys (see [`keys`]).
//! Reads are lenient: a missing or corrupt value loads as the type's default
//! and is logged, never surfaced. Writes are synchronous and happen after
//! every mutation.

use crate::error::{AppError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Storage keys, namespaced under `davetjet`.
pub mod keys {
    /// Task completion, snoozes and badge mute.
    pub const TASKS: &str = "davetjet:tasks:v2";
    /// Cooldown guard ready-at timestamps.
    pub const COOLDOWN: &str = "davetjet:cooldown:v1";
    /// Sidebar collapse preference, `"1"` or `"0"`.
    pub const SIDEBAR_COLLAPSED: &str = "davetjet:sidebar:collapsed";

    /// Onboarding-seen flag for `page`.
    #[must_use]
    pub fn onboarding(page: &str) -> String {
        format!("davetjet:onb:{page}:v2")
    }
}

/// Synchronous string storage that survives restarts.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Decode the JSON value at `key`, falling back to the default.
pub fn load_json<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    let Some(raw) = store.get(key) else {
        return T::default();
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding corrupt persisted state");
            T::default()
        }
    }
}

/// Encode `value` as JSON under `key`.
///
/// # Errors
///
/// Returns [`AppError::Storage`] if encoding or the write fails.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| AppError::Storage(format!("cannot serialize {key}: {e}")))?;
    store.set(key, &json)
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("memory store poisoned".to_owned()))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("memory store poisoned".to_owned()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Every write re-reads the file, merges the change and rewrites it, so two
/// processes sharing a file lose at most a concurrent write to the same key.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serialises read-modify-write within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(_) => return BTreeMap::new(),
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "state file unreadable; starting empty");
            BTreeMap::new()
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AppError::Storage(format!("cannot serialize state: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            AppError::Storage(format!(
                "cannot write state to {}: {e}",
                self.path.display()
            ))
        })
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Storage("file store poisoned".to_owned()))?;
        let mut entries = self.read_all();
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// Wall clock in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Sidebar collapse preference.
pub fn sidebar_collapsed(store: &dyn KeyValueStore) -> bool {
    store.get(keys::SIDEBAR_COLLAPSED).as_deref() == Some("1")
}

/// Persist the sidebar collapse preference.
///
/// # Errors
///
/// Returns [`AppError::Storage`] if the write fails.
pub fn set_sidebar_collapsed(store: &dyn KeyValueStore, collapsed: bool) -> Result<()> {
    store.set(keys::SIDEBAR_COLLAPSED, if collapsed { "1" } else { "0" })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        n: u32,
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn corrupt_json_loads_default() {
        let store = MemoryStore::new();
        store.set("s", "{not json").unwrap();
        let loaded: Sample = load_json(&store, "s");
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn file_store_merges_keys_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::new(&path);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").as_deref(), Some("1"));
        assert_eq!(reopened.get("b").as_deref(), Some("2"));
        reopened.remove("a").unwrap();
        assert!(reopened.get("a").is_none());
    }

    #[test]
    fn file_store_recovers_from_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();

        let store = FileStore::new(&path);
        assert!(store.get("a").is_none());
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn save_and_load_json() {
        let store = MemoryStore::new();
        save_json(&store, "s", &Sample { n: 4 }).unwrap();
        assert_eq!(load_json::<Sample>(&store, "s"), Sample { n: 4 });
    }

    #[test]
    fn sidebar_preference() {
        let store = MemoryStore::new();
        assert!(!sidebar_collapsed(&store));
        set_sidebar_collapsed(&store, true).unwrap();
        assert_eq!(store.get(keys::SIDEBAR_COLLAPSED).as_deref(), Some("1"));
        assert!(sidebar_collapsed(&store));
    }

    #[test]
    fn manual_clock_moves() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(0);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn onboarding_key_is_page_scoped() {
        assert_eq!(keys::onboarding("wizard"), "davetjet:onb:wizard:v2");
    }
}
