use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::stats::Stats;
use crate::task::Task;

/// The single persisted blob: the task list plus the cached stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub tasks: Vec<Task>,
    pub stats: Stats,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Current(PersistedState),
    /// Early versions persisted the bare task array.
    TasksOnly(Vec<Task>),
}

impl PersistedState {
    /// Decodes a stored blob, accepting the legacy bare-array layout.
    /// Corrupt data decodes to the empty default rather than failing.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(StoredBlob::Current(state)) => state,
            Ok(StoredBlob::TasksOnly(tasks)) => Self {
                tasks,
                stats: Stats::default(),
            },
            Err(err) => {
                tracing::warn!(%err, "discarding unreadable task state");
                Self::default()
            }
        }
    }
}

/// Opaque blob persistence. Both directions are best-effort by contract:
/// `load` yields the empty default instead of failing, `save` may lose the
/// most recent change on a crash.
pub trait StateStore: Send + Sync {
    fn load(&self) -> PersistedState;
    fn save(&self, state: &PersistedState);
}

/// Single-file JSON store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> PersistedState {
        match fs::read_to_string(&self.path) {
            Ok(raw) => PersistedState::from_json(&raw),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "no stored task state");
                PersistedState::default()
            }
        }
    }

    fn save(&self, state: &PersistedState) {
        let payload = match serde_json::to_string(state) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%err, "unable to encode task state");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), %err, "unable to prepare state directory");
                    return;
                }
            }
        }
        if let Err(err) = fs::write(&self.path, payload) {
            tracing::warn!(path = %self.path.display(), %err, "unable to persist task state");
        }
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> PersistedState {
        self.state.lock().clone()
    }

    fn save(&self, state: &PersistedState) {
        *self.state.lock() = state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_blob_round_trips() {
        let raw = r#"{"tasks":[{"id":7,"seriesId":7,"title":"Read","date":"2024-02-01","createdAt":"2024-02-01T10:00:00Z","updatedAt":"2024-02-01T10:00:00Z"}],"stats":{"points":10,"streak":1,"lastCompletionDate":"2024-02-01","badges":[]}}"#;
        let state = PersistedState::from_json(raw);
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].id, 7);
        assert_eq!(state.stats.points, 10);

        let encoded = serde_json::to_string(&state).unwrap();
        assert_eq!(PersistedState::from_json(&encoded), state);
    }

    #[test]
    fn bare_array_gets_default_stats() {
        let raw = r#"[{"id":1,"seriesId":1,"title":"Old","date":"2024-01-05","createdAt":"2024-01-05T08:00:00Z","updatedAt":"2024-01-05T08:00:00Z","completed":true}]"#;
        let state = PersistedState::from_json(raw);
        assert_eq!(state.tasks.len(), 1);
        assert!(state.tasks[0].completed);
        assert_eq!(state.stats, Stats::default());
    }

    #[test]
    fn corrupt_blob_resets_to_empty() {
        assert_eq!(PersistedState::from_json("{{{not json"), PersistedState::default());
        assert_eq!(PersistedState::from_json("42"), PersistedState::default());
    }

    #[test]
    fn missing_object_fields_take_defaults() {
        let state = PersistedState::from_json("{}");
        assert!(state.tasks.is_empty());
        assert_eq!(state.stats, Stats::default());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.load(), PersistedState::default());
        let state = PersistedState::from_json(r#"{"tasks":[],"stats":{"points":30}}"#);
        store.save(&state);
        assert_eq!(store.load().stats.points, 30);
    }
}
