//! In-memory [`RemoteIndex`] for tests and offline runs.
//!
//! Behaves like the hosted service for the operations the sync job uses,
//! records every call, and can be told to fail uploads or deletes for
//! specific documents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::RemoteIndex;
use super::types::{AssistantSettings, ChunkingStrategy, RemoteError, RemoteResult};

/// A call made against the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `upload_file(name)`
    Upload(String),
    /// `delete_file(file_id)`
    Delete(String),
    /// `attach_file(index_id, file_id)`
    Attach(String, String),
    /// `detach_file(index_id, file_id)`
    Detach(String, String),
    /// `configure_assistant(assistant_id)`
    Configure(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    files: BTreeMap<String, (String, Vec<u8>)>,
    indexes: BTreeMap<String, BTreeSet<String>>,
    assistants: BTreeMap<String, Option<AssistantSettings>>,
    failing_uploads: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    calls: Vec<RemoteCall>,
}

impl MemoryState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }
}

/// In-memory remote index.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    state: Mutex<MemoryState>,
}

impl InMemoryIndex {
    /// Create an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fake with one existing index and assistant.
    #[must_use]
    pub fn with_ids(index_id: &str, assistant_id: &str) -> Self {
        let index = Self::new();
        {
            let mut state = index.lock();
            state.indexes.insert(index_id.to_string(), BTreeSet::new());
            state.assistants.insert(assistant_id.to_string(), None);
        }
        index
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every upload of a document named `name` fail.
    pub fn fail_uploads_for(&self, name: &str) {
        self.lock().failing_uploads.insert(name.to_string());
    }

    /// Make every delete of `file_id` fail with a transient error.
    pub fn fail_deletes_for(&self, file_id: &str) {
        self.lock().failing_deletes.insert(file_id.to_string());
    }

    /// Seed an already-uploaded file, attached to `index_id`.
    pub fn seed_file(&self, index_id: &str, file_id: &str, name: &str) {
        let mut state = self.lock();
        state
            .files
            .insert(file_id.to_string(), (name.to_string(), Vec::new()));
        state
            .indexes
            .entry(index_id.to_string())
            .or_default()
            .insert(file_id.to_string());
    }

    /// Ids of all stored files.
    #[must_use]
    pub fn file_ids(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Name and bytes of a stored file.
    #[must_use]
    pub fn file(&self, file_id: &str) -> Option<(String, Vec<u8>)> {
        self.lock().files.get(file_id).cloned()
    }

    /// File ids attached to an index.
    #[must_use]
    pub fn attached(&self, index_id: &str) -> Vec<String> {
        self.lock()
            .indexes
            .get(index_id)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Settings last applied to an assistant.
    #[must_use]
    pub fn assistant(&self, assistant_id: &str) -> Option<AssistantSettings> {
        self.lock().assistants.get(assistant_id).cloned().flatten()
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }
}

impl RemoteIndex for InMemoryIndex {
    async fn upload_file(&self, name: &str, bytes: Vec<u8>) -> RemoteResult<String> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Upload(name.to_string()));
        if state.failing_uploads.contains(name) {
            return Err(RemoteError::Api {
                status: 413,
                message: format!("upload of {name} rejected"),
            });
        }
        let id = state.next("file");
        state.files.insert(id.clone(), (name.to_string(), bytes));
        Ok(id)
    }

    async fn delete_file(&self, file_id: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Delete(file_id.to_string()));
        if state.failing_deletes.contains(file_id) {
            return Err(RemoteError::Transient(format!("delete of {file_id} timed out")));
        }
        if state.files.remove(file_id).is_none() {
            return Err(RemoteError::NotFound(format!("file {file_id}")));
        }
        for files in state.indexes.values_mut() {
            files.remove(file_id);
        }
        Ok(())
    }

    async fn attach_file(&self, index_id: &str, file_id: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        state
            .calls
            .push(RemoteCall::Attach(index_id.to_string(), file_id.to_string()));
        if !state.files.contains_key(file_id) {
            return Err(RemoteError::NotFound(format!("file {file_id}")));
        }
        state
            .indexes
            .get_mut(index_id)
            .ok_or_else(|| RemoteError::NotFound(format!("vector store {index_id}")))?
            .insert(file_id.to_string());
        Ok(())
    }

    async fn detach_file(&self, index_id: &str, file_id: &str) -> RemoteResult<()> {
        let mut state = self.lock();
        state
            .calls
            .push(RemoteCall::Detach(index_id.to_string(), file_id.to_string()));
        let removed = state
            .indexes
            .get_mut(index_id)
            .is_some_and(|files| files.remove(file_id));
        if removed {
            Ok(())
        } else {
            Err(RemoteError::NotFound(format!("file {file_id} in {index_id}")))
        }
    }

    async fn configure_assistant(
        &self,
        assistant_id: &str,
        settings: &AssistantSettings,
    ) -> RemoteResult<()> {
        let mut state = self.lock();
        state
            .calls
            .push(RemoteCall::Configure(assistant_id.to_string()));
        if !state.indexes.contains_key(&settings.index_id) {
            return Err(RemoteError::Configuration(format!(
                "vector store {} does not exist",
                settings.index_id
            )));
        }
        match state.assistants.get_mut(assistant_id) {
            Some(current) => {
                // Like the API, an update without a name keeps the old one.
                let name = settings
                    .name
                    .clone()
                    .or_else(|| current.as_ref().and_then(|s| s.name.clone()));
                *current = Some(AssistantSettings {
                    name,
                    ..settings.clone()
                });
                Ok(())
            }
            None => Err(RemoteError::Configuration(format!(
                "assistant {assistant_id} does not exist"
            ))),
        }
    }

    async fn create_index(&self, _name: &str, _chunking: ChunkingStrategy) -> RemoteResult<String> {
        let mut state = self.lock();
        let id = state.next("vs");
        state.indexes.insert(id.clone(), BTreeSet::new());
        Ok(id)
    }

    async fn create_assistant(&self, settings: &AssistantSettings) -> RemoteResult<String> {
        let mut state = self.lock();
        if !state.indexes.contains_key(&settings.index_id) {
            return Err(RemoteError::Configuration(format!(
                "vector store {} does not exist",
                settings.index_id
            )));
        }
        let id = state.next("asst");
        state.assistants.insert(id.clone(), Some(settings.clone()));
        Ok(id)
    }
}
