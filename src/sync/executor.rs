//! Sync executor: applies a classified delta to the remote index.
//!
//! # Ordering
//!
//! Every document is handled by one task that, for updates, first retires
//! the previous artifact (detach, then delete) and only then uploads and
//! attaches the new bytes. Tasks for different documents run concurrently
//! up to the configured worker count; there is no ordering across them.
//!
//! # Failure policy
//!
//! - Retirement failures are logged and left out of the deleted-ids list.
//!   They never block the re-upload.
//! - Upload or attach failures are isolated per document. The failing key
//!   is reported and absent from `new_file_ids`.
//!
//! Results are folded into the [`ApplyOutcome`] by the single awaiting
//! caller, and [`reconcile`] applies them to the state afterwards. Nothing is
//! written to disk here.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::remote::{RemoteIndex, RemoteResult};
use crate::sync::types::{
    ApplyOutcome, ClassifiedDelta, DocumentKey, FingerprintRecord, RemovalPolicy, SyncState,
    UploadFailure,
};

/// One document to upload, with the artifact it replaces.
#[derive(Debug)]
struct UploadJob {
    key: DocumentKey,
    bytes: Vec<u8>,
    retire: Option<String>,
}

/// What happened to a previous artifact.
#[derive(Debug)]
enum Retirement {
    Deleted(String),
    AlreadyGone(String),
    Failed(String),
}

#[derive(Debug)]
struct DocumentResult {
    key: DocumentKey,
    retirement: Option<Retirement>,
    upload: RemoteResult<String>,
}

/// Applies deltas against a [`RemoteIndex`].
#[derive(Debug)]
pub struct SyncExecutor<R> {
    remote: Arc<R>,
    index_id: String,
    concurrency: usize,
}

impl<R: RemoteIndex + 'static> SyncExecutor<R> {
    /// Create an executor targeting `index_id` with at most `concurrency`
    /// documents in flight (minimum 1).
    pub fn new(remote: Arc<R>, index_id: impl Into<String>, concurrency: usize) -> Self {
        Self {
            remote,
            index_id: index_id.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Retire stale artifacts and upload added and updated documents.
    ///
    /// Unchanged and removed documents cause no remote calls.
    pub async fn apply(&self, delta: &ClassifiedDelta) -> ApplyOutcome {
        let jobs: Vec<UploadJob> = delta
            .added
            .iter()
            .map(|entry| UploadJob {
                key: entry.key().clone(),
                bytes: entry.document.bytes.clone(),
                retire: None,
            })
            .chain(delta.updated.iter().map(|updated| UploadJob {
                key: updated.entry.key().clone(),
                bytes: updated.entry.document.bytes.clone(),
                retire: updated.previous_remote_id.clone(),
            }))
            .collect();

        let mut outcome = ApplyOutcome::default();
        if jobs.is_empty() {
            return outcome;
        }

        info!(
            documents = jobs.len(),
            concurrency = self.concurrency,
            "Uploading changes"
        );

        let expected: BTreeSet<DocumentKey> = jobs.iter().map(|j| j.key.clone()).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for job in jobs {
            let remote = Arc::clone(&self.remote);
            let index_id = self.index_id.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                sync_document(remote.as_ref(), &index_id, job).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => record(&mut outcome, result),
                Err(e) => error!(error = %e, "Upload task aborted"),
            }
        }

        // A task that was cancelled, or panicked in an unwinding build, never
        // reports; its document counts as a failed upload. Release builds
        // abort on panic, so there this only covers cancellation.
        for key in expected {
            let reported = outcome.new_file_ids.contains_key(&key)
                || outcome.failures.iter().any(|f| f.key == key);
            if !reported {
                outcome.failures.push(UploadFailure {
                    key,
                    message: "upload task aborted".to_string(),
                });
            }
        }

        outcome.failures.sort_by(|a, b| a.key.cmp(&b.key));
        outcome.deleted_remote_ids.sort();
        outcome.retire_failures.sort();
        outcome
    }
}

fn record(outcome: &mut ApplyOutcome, result: DocumentResult) {
    match result.retirement {
        Some(Retirement::Deleted(id) | Retirement::AlreadyGone(id)) => {
            outcome.deleted_remote_ids.push(id);
            outcome.retired.insert(result.key.clone());
        }
        Some(Retirement::Failed(id)) => outcome.retire_failures.push(id),
        None => {}
    }

    match result.upload {
        Ok(file_id) => {
            outcome.new_file_ids.insert(result.key, file_id);
        }
        Err(e) => {
            error!(key = %result.key, error = %e, "Upload failed");
            outcome.failures.push(UploadFailure {
                key: result.key,
                message: e.to_string(),
            });
        }
    }
}

async fn sync_document<R: RemoteIndex>(
    remote: &R,
    index_id: &str,
    job: UploadJob,
) -> DocumentResult {
    let retirement = match &job.retire {
        Some(old_id) => Some(retire(remote, index_id, &job.key, old_id).await),
        None => None,
    };
    let upload = upload(remote, index_id, &job.key, job.bytes).await;

    DocumentResult {
        key: job.key,
        retirement,
        upload,
    }
}

/// Detach and delete a previous artifact. Never fails the document.
async fn retire<R: RemoteIndex>(
    remote: &R,
    index_id: &str,
    key: &DocumentKey,
    file_id: &str,
) -> Retirement {
    if let Err(e) = remote.detach_file(index_id, file_id).await {
        if !e.is_not_found() {
            warn!(%key, file_id, error = %e, "Failed to detach previous version");
        }
    }

    match remote.delete_file(file_id).await {
        Ok(()) => {
            debug!(%key, file_id, "Deleted previous version");
            Retirement::Deleted(file_id.to_string())
        }
        Err(e) if e.is_not_found() => {
            debug!(%key, file_id, "Previous version already gone");
            Retirement::AlreadyGone(file_id.to_string())
        }
        Err(e) => {
            warn!(%key, file_id, error = %e, "Failed to delete previous version");
            Retirement::Failed(file_id.to_string())
        }
    }
}

/// Upload then attach. A file that uploads but cannot be attached is deleted
/// again so it does not linger unreferenced.
async fn upload<R: RemoteIndex>(
    remote: &R,
    index_id: &str,
    key: &DocumentKey,
    bytes: Vec<u8>,
) -> RemoteResult<String> {
    let file_id = remote.upload_file(key.as_str(), bytes).await?;

    if let Err(e) = remote.attach_file(index_id, &file_id).await {
        if let Err(cleanup) = remote.delete_file(&file_id).await {
            warn!(%key, file_id, error = %cleanup, "Failed to clean up unattached upload");
        }
        return Err(e);
    }

    debug!(%key, file_id, "Uploaded and attached");
    Ok(file_id)
}

/// Apply an outcome to the state.
///
/// - Added or updated and uploaded: fresh record with the new hash and id.
/// - Updated but not uploaded: previous record kept with its old hash so the
///   next run detects it again; its remote id is cleared if the old artifact
///   is confirmed gone.
/// - Added but not uploaded: no record.
/// - Removed: tombstoned or forgotten per `policy`.
/// - Unchanged: untouched, except that a tombstone is cleared.
pub fn reconcile(
    state: &mut SyncState,
    delta: &ClassifiedDelta,
    outcome: &ApplyOutcome,
    policy: RemovalPolicy,
    now: &str,
) {
    let uploads = delta
        .added
        .iter()
        .chain(delta.updated.iter().map(|u| &u.entry));

    for entry in uploads {
        let key = entry.key();
        if let Some(file_id) = outcome.new_file_ids.get(key) {
            state.documents.insert(
                key.clone(),
                FingerprintRecord {
                    content_hash: entry.content_hash.clone(),
                    remote_file_id: Some(file_id.clone()),
                    change_marker: entry.change_marker.clone(),
                    size_bytes: entry.size_bytes(),
                    last_synced_at: Some(now.to_string()),
                    removed: false,
                    removed_at: None,
                },
            );
        } else if outcome.retired.contains(key) {
            if let Some(record) = state.documents.get_mut(key) {
                record.remote_file_id = None;
            }
        }
    }

    for key in &delta.unchanged {
        if let Some(record) = state.documents.get_mut(key) {
            if record.removed {
                record.removed = false;
                record.removed_at = None;
            }
        }
    }

    for key in &delta.removed {
        match policy {
            RemovalPolicy::Tombstone => {
                if let Some(record) = state.documents.get_mut(key) {
                    record.removed = true;
                    record.removed_at = Some(now.to_string());
                }
            }
            RemovalPolicy::Forget => {
                state.documents.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryIndex, RemoteCall};
    use crate::sync::detect::{DEFAULT_MARKER_PREFIX, classify};
    use crate::sync::hash::file_digest;
    use crate::sync::source::SourceDocument;
    use std::path::PathBuf;

    const INDEX: &str = "vs_main";
    const NOW: &str = "2025-01-20T00:00:00+00:00";

    fn doc(name: &str, content: &str) -> SourceDocument {
        SourceDocument {
            key: name.into(),
            path: PathBuf::from(name),
            bytes: content.as_bytes().to_vec(),
        }
    }

    fn known(content: &str, remote_id: &str) -> FingerprintRecord {
        FingerprintRecord {
            content_hash: file_digest(content.as_bytes()),
            remote_file_id: Some(remote_id.into()),
            size_bytes: content.len() as u64,
            ..Default::default()
        }
    }

    fn executor(remote: &Arc<InMemoryIndex>, concurrency: usize) -> SyncExecutor<InMemoryIndex> {
        SyncExecutor::new(Arc::clone(remote), INDEX, concurrency)
    }

    #[tokio::test]
    async fn test_initial_upload() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        let delta = classify(
            vec![doc("A.md", "a"), doc("B.md", "b")],
            &SyncState::default(),
            DEFAULT_MARKER_PREFIX,
        );

        let outcome = executor(&remote, 1).apply(&delta).await;

        assert_eq!(outcome.uploaded(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(remote.attached(INDEX).len(), 2);
    }

    #[tokio::test]
    async fn test_update_retires_before_upload() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        remote.seed_file(INDEX, "file_old", "A.md");
        let mut prior = SyncState::default();
        prior.documents.insert("A.md".into(), known("v1", "file_old"));
        let delta = classify(vec![doc("A.md", "v2")], &prior, DEFAULT_MARKER_PREFIX);

        let outcome = executor(&remote, 1).apply(&delta).await;

        assert_eq!(outcome.deleted_remote_ids, vec!["file_old".to_string()]);
        let calls = remote.calls();
        assert_eq!(calls[0], RemoteCall::Detach(INDEX.into(), "file_old".into()));
        assert_eq!(calls[1], RemoteCall::Delete("file_old".into()));
        assert_eq!(calls[2], RemoteCall::Upload("A.md".into()));
        assert_eq!(remote.attached(INDEX), vec![outcome.new_file_ids[&DocumentKey::from("A.md")].clone()]);
    }

    #[tokio::test]
    async fn test_failed_retirement_does_not_block_upload() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        remote.seed_file(INDEX, "file_old", "A.md");
        remote.fail_deletes_for("file_old");
        let mut prior = SyncState::default();
        prior.documents.insert("A.md".into(), known("v1", "file_old"));
        let delta = classify(vec![doc("A.md", "v2")], &prior, DEFAULT_MARKER_PREFIX);

        let outcome = executor(&remote, 1).apply(&delta).await;

        assert!(outcome.deleted_remote_ids.is_empty());
        assert_eq!(outcome.retire_failures, vec!["file_old".to_string()]);
        assert_eq!(outcome.uploaded(), 1);
    }

    #[tokio::test]
    async fn test_missing_previous_version_counts_as_retired() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        let mut prior = SyncState::default();
        prior.documents.insert("A.md".into(), known("v1", "file_vanished"));
        let delta = classify(vec![doc("A.md", "v2")], &prior, DEFAULT_MARKER_PREFIX);

        let outcome = executor(&remote, 1).apply(&delta).await;

        assert_eq!(outcome.deleted_remote_ids, vec!["file_vanished".to_string()]);
        assert!(outcome.retired.contains(&DocumentKey::from("A.md")));
    }

    #[tokio::test]
    async fn test_upload_failure_isolation() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        remote.fail_uploads_for("A.md");
        let mut state = SyncState::default();
        let delta = classify(
            vec![doc("A.md", "a"), doc("B.md", "b")],
            &state,
            DEFAULT_MARKER_PREFIX,
        );

        let outcome = executor(&remote, 1).apply(&delta).await;
        reconcile(&mut state, &delta, &outcome, RemovalPolicy::Tombstone, NOW);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key.as_str(), "A.md");
        assert!(!outcome.new_file_ids.contains_key(&DocumentKey::from("A.md")));
        assert!(outcome.new_file_ids.contains_key(&DocumentKey::from("B.md")));
        assert!(!state.documents.contains_key(&DocumentKey::from("A.md")));
        assert!(state.documents.contains_key(&DocumentKey::from("B.md")));
    }

    #[tokio::test]
    async fn test_concurrent_upload_records_every_document() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        let docs: Vec<_> = (0..12).map(|i| doc(&format!("{i:02}.md"), &format!("body {i}"))).collect();
        let delta = classify(docs, &SyncState::default(), DEFAULT_MARKER_PREFIX);

        let outcome = executor(&remote, 4).apply(&delta).await;

        assert_eq!(outcome.uploaded(), 12);
        assert_eq!(remote.attached(INDEX).len(), 12);
    }

    #[tokio::test]
    async fn test_unchanged_and_removed_make_no_calls() {
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst"));
        let mut prior = SyncState::default();
        prior.documents.insert("A.md".into(), known("a", "file_a"));
        prior.documents.insert("B.md".into(), known("b", "file_b"));
        let delta = classify(vec![doc("A.md", "a")], &prior, DEFAULT_MARKER_PREFIX);

        let outcome = executor(&remote, 2).apply(&delta).await;

        assert_eq!(outcome.uploaded(), 0);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_reconcile_tombstone_and_forget() {
        let mut prior = SyncState::default();
        prior.documents.insert("A.md".into(), known("a", "file_a"));
        prior.documents.insert("B.md".into(), known("b", "file_b"));
        let delta = classify(vec![doc("A.md", "a")], &prior, DEFAULT_MARKER_PREFIX);

        let mut tombstoned = prior.clone();
        reconcile(&mut tombstoned, &delta, &ApplyOutcome::default(), RemovalPolicy::Tombstone, NOW);
        let record = &tombstoned.documents[&DocumentKey::from("B.md")];
        assert!(record.removed);
        assert_eq!(record.removed_at.as_deref(), Some(NOW));

        let mut forgotten = prior;
        reconcile(&mut forgotten, &delta, &ApplyOutcome::default(), RemovalPolicy::Forget, NOW);
        assert!(!forgotten.documents.contains_key(&DocumentKey::from("B.md")));
        assert!(forgotten.documents.contains_key(&DocumentKey::from("A.md")));
    }

    #[test]
    fn test_reconcile_failed_update_keeps_old_hash() {
        let mut state = SyncState::default();
        state.documents.insert("A.md".into(), known("v1", "file_old"));
        let delta = classify(vec![doc("A.md", "v2")], &state, DEFAULT_MARKER_PREFIX);
        let mut outcome = ApplyOutcome::default();
        outcome.retired.insert("A.md".into());
        outcome.failures.push(UploadFailure {
            key: "A.md".into(),
            message: "quota".into(),
        });

        reconcile(&mut state, &delta, &outcome, RemovalPolicy::Tombstone, NOW);

        let record = &state.documents[&DocumentKey::from("A.md")];
        assert_eq!(record.content_hash, file_digest(b"v1"));
        assert_eq!(record.remote_file_id, None);
    }

    #[test]
    fn test_reconcile_writes_fresh_hash() {
        let mut state = SyncState::default();
        state.documents.insert("A.md".into(), known("v1", "file_old"));
        let delta = classify(vec![doc("A.md", "v2")], &state, DEFAULT_MARKER_PREFIX);
        let mut outcome = ApplyOutcome::default();
        outcome.new_file_ids.insert("A.md".into(), "file_new".into());

        reconcile(&mut state, &delta, &outcome, RemovalPolicy::Tombstone, NOW);

        let record = &state.documents[&DocumentKey::from("A.md")];
        assert_eq!(record.content_hash, file_digest(b"v2"));
        assert_eq!(record.remote_file_id.as_deref(), Some("file_new"));
        assert_eq!(record.last_synced_at.as_deref(), Some(NOW));
    }

    #[test]
    fn test_reconcile_clears_tombstone_on_return() {
        let mut state = SyncState::default();
        let mut gone = known("a", "file_a");
        gone.removed = true;
        gone.removed_at = Some(NOW.into());
        state.documents.insert("A.md".into(), gone);
        let delta = classify(vec![doc("A.md", "a")], &state, DEFAULT_MARKER_PREFIX);

        reconcile(&mut state, &delta, &ApplyOutcome::default(), RemovalPolicy::Tombstone, NOW);

        let record = &state.documents[&DocumentKey::from("A.md")];
        assert!(!record.removed);
        assert!(record.removed_at.is_none());
    }
}
