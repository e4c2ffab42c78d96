//! Persistent fingerprint store.
//!
//! Holds the [`SyncState`] between runs as a single JSON file. Loading never
//! fails the run: a missing or corrupt file yields an empty state, which
//! degrades to a full resync where every document is added. Saving is atomic
//! with sorted keys, and falls back to a temp-directory location (with a
//! warning) when the primary path is not writable.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::sync::file::{read_json, write_json_with_fallback};
use crate::sync::types::{SyncResult, SyncState};

/// File-backed store for [`SyncState`].
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    path: PathBuf,
    active: PathBuf,
}

impl FingerprintStore {
    /// Create a store rooted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            active: path.clone(),
            path,
        }
    }

    /// Configured location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state.
    ///
    /// Returns an empty state if the file is missing or cannot be parsed.
    #[must_use]
    pub fn load(&self) -> SyncState {
        let mut state = match read_json::<SyncState>(&self.active) {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!(path = %self.active.display(), "No sync state found, starting fresh");
                return SyncState::default();
            }
            Err(e) => {
                warn!(
                    path = %self.active.display(),
                    error = %e,
                    "Sync state unreadable, treating as empty"
                );
                return SyncState::default();
            }
        };

        let rewritten = state.normalize_keys();
        if rewritten > 0 {
            info!(rewritten, "Normalized legacy path keys in sync state");
        }
        debug!(documents = state.documents.len(), "Loaded sync state");
        state
    }

    /// Persist the state.
    ///
    /// On fallback, later saves and loads in this run use the fallback path.
    ///
    /// # Errors
    ///
    /// Returns an error only if neither the primary nor the fallback location
    /// can be written.
    pub fn save(&mut self, state: &SyncState) -> SyncResult<PathBuf> {
        let written = write_json_with_fallback(&self.active, state)?;
        self.active.clone_from(&written);
        debug!(path = %written.display(), "Saved sync state");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{DocumentKey, FingerprintRecord};
    use std::fs;
    use tempfile::TempDir;

    fn sample_state() -> SyncState {
        let mut state = SyncState {
            assistant_id: Some("asst_1".into()),
            index_id: Some("vs_1".into()),
            total_files: 2,
            total_size_bytes: 30,
            ..Default::default()
        };
        state.documents.insert(
            DocumentKey::from("b.md"),
            FingerprintRecord {
                content_hash: "hash-b".into(),
                remote_file_id: Some("file_b".into()),
                size_bytes: 10,
                ..Default::default()
            },
        );
        state.documents.insert(
            DocumentKey::from("a.md"),
            FingerprintRecord {
                content_hash: "hash-a".into(),
                remote_file_id: Some("file_a".into()),
                change_marker: Some("2025-01-20".into()),
                size_bytes: 20,
                ..Default::default()
            },
        );
        state
    }

    #[test]
    fn test_load_missing_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FingerprintStore::new(temp_dir.path().join("sync_state.json"));

        assert_eq!(store.load(), SyncState::default());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_state.json");
        fs::write(&path, "{\"files\": [1, 2").unwrap();

        assert_eq!(FingerprintStore::new(&path).load(), SyncState::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FingerprintStore::new(temp_dir.path().join("sync_state.json"));
        let state = sample_state();

        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_save_is_byte_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_state.json");
        let mut store = FingerprintStore::new(&path);

        store.save(&sample_state()).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        let reloaded = store.load();
        store.save(&reloaded).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.find("\"a.md\"").unwrap() < first.find("\"b.md\"").unwrap());
    }

    #[test]
    fn test_load_legacy_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_state.json");
        fs::write(
            &path,
            r#"{
              "files": {
                "/app/articles/a.md": {"sha256": "h1", "file_id": "file_1", "size_bytes": 3}
              },
              "assistant_id": "asst_1",
              "vector_store_id": "vs_1",
              "unknown_field": true
            }"#,
        )
        .unwrap();

        let state = FingerprintStore::new(&path).load();

        assert_eq!(state.index_id.as_deref(), Some("vs_1"));
        let record = &state.documents[&DocumentKey::from("a.md")];
        assert_eq!(record.remote_file_id.as_deref(), Some("file_1"));
    }
}
