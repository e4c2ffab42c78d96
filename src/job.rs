//! The daily sync job.
//!
//! # Control flow
//!
//! ```text
//! load state ─► scrape ─► configure assistant ─► discover ─► guard
//!                                                              │
//!     report ◄── save state ◄── reconcile ◄── apply ◄── classify
//! ```
//!
//! The state file is written once, after every mutation it describes has
//! been attempted. The run summary is written exactly once on every path,
//! including when a stage aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::remote::RemoteIndex;
use crate::scrape;
use crate::sync::{
    FingerprintStore, RunReport, RunReporter, RunSummary, SyncExecutor, classify, discover,
    guard_snapshot, reconcile,
};

/// A finished run: the summary and where it was written.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// The summary as persisted.
    pub summary: RunSummary,
    /// Where the summary landed (primary or fallback path).
    pub summary_path: PathBuf,
}

impl JobOutcome {
    /// Turn a partial or failed sync into an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Incomplete` unless every upload succeeded.
    pub fn check(&self) -> Result<()> {
        if !self.summary.status.is_failure() {
            return Ok(());
        }
        Err(Error::Incomplete {
            status: self.summary.status,
            failed: self.summary.upload_failures,
            attempted: self.summary.uploaded + self.summary.upload_failures,
            summary_path: Some(self.summary_path.clone()),
        })
    }
}

/// Write the error summary for a run that failed before a [`SyncJob`]
/// could start, such as missing credentials.
///
/// A summary that cannot be written is logged; the original error is what
/// the caller reports.
pub fn record_abort(summary_file: &Path, err: &Error) -> Option<PathBuf> {
    let mut report = RunReport::start();
    error!(run_id = report.run_id(), error = %err, "Sync run aborted before start");
    report.fail(err.detail());

    let reporter = RunReporter::new(summary_file);
    match reporter.persist(&reporter.summarize(&report)) {
        Ok(path) => Some(path),
        Err(e) => {
            error!(path = %summary_file.display(), error = %e, "Failed to write run summary");
            None
        }
    }
}

/// One sync run against a remote index.
#[derive(Debug)]
pub struct SyncJob<R> {
    config: SyncConfig,
    remote: Arc<R>,
}

impl<R: RemoteIndex + 'static> SyncJob<R> {
    /// Create a job. The config should already have passed
    /// [`SyncConfig::validate_for_run`].
    pub fn new(config: SyncConfig, remote: Arc<R>) -> Self {
        Self { config, remote }
    }

    /// Run the job and write the summary.
    ///
    /// Partial upload failures are not errors here; they show in the
    /// returned summary's status (see [`JobOutcome::check`]).
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the run, after the error summary has
    /// been written.
    pub async fn run(&self) -> Result<JobOutcome> {
        let mut report = RunReport::start();
        info!(run_id = report.run_id(), "Starting sync run");

        let result = self.execute(&mut report).await;
        if let Err(e) = &result {
            error!(error = %e, "Sync run aborted");
            report.fail(e.detail());
        }

        let reporter = RunReporter::new(&self.config.summary_file);
        let summary = reporter.summarize(&report);
        let persisted = reporter.persist(&summary);

        result?;
        let summary_path = persisted?;

        info!(
            status = %summary.status,
            uploaded = summary.uploaded,
            failed = summary.upload_failures,
            duration_seconds = summary.duration_seconds,
            "Sync run finished"
        );
        Ok(JobOutcome {
            summary,
            summary_path,
        })
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        let config = &self.config;
        let assistant_id = config.require_assistant_id()?;
        let index_id = config.require_index_id()?;
        report.record_target(assistant_id, index_id, &config.articles_dir);

        let mut store = FingerprintStore::new(&config.state_file);
        let mut state = store.load();
        debug!(
            path = %store.path().display(),
            documents = state.documents.len(),
            "Using sync state"
        );

        let previous_index = state.index_id.clone();
        let dropped = state.retarget(index_id);
        if dropped > 0 {
            warn!(
                previous = previous_index.as_deref().unwrap_or_default(),
                index_id,
                dropped,
                "Sync state belongs to another vector store, re-uploading every document"
            );
        }

        if let Some(scrape) = &config.scrape {
            let started = Instant::now();
            let scrape = scrape.clone();
            let out_dir = config.articles_dir.clone();
            tokio::task::spawn_blocking(move || scrape::run(&scrape, &out_dir))
                .await
                .map_err(|e| Error::Other(format!("scrape task failed: {e}")))??;
            report.record_phase("scrape", started);
        }

        let started = Instant::now();
        let settings = config.assistant_settings(index_id, None);
        self.remote
            .configure_assistant(assistant_id, &settings)
            .await?;
        info!(assistant_id, index_id, model = %config.model, "Assistant configured");
        report.record_phase("configure", started);

        let started = Instant::now();
        let documents = discover(&config.articles_dir, &config.extension)?;
        let total_files = documents.len();
        let total_size_bytes: u64 = documents.iter().map(|d| d.bytes.len() as u64).sum();
        guard_snapshot(total_files, &state, &config.guard, &config.articles_dir)?;
        let delta = classify(documents, &state, &config.marker_prefix);
        report.record_delta(&delta, total_files, total_size_bytes);
        report.record_phase("detect", started);

        let started = Instant::now();
        let executor = SyncExecutor::new(Arc::clone(&self.remote), index_id, config.concurrency);
        let outcome = executor.apply(&delta).await;
        report.record_outcome(&outcome);
        report.record_phase("upload", started);
        if !outcome.retire_failures.is_empty() {
            warn!(
                count = outcome.retire_failures.len(),
                "Previous versions left in the remote index"
            );
        }

        let started = Instant::now();
        let now = Utc::now().to_rfc3339();
        reconcile(&mut state, &delta, &outcome, config.removal_policy, &now);
        state.assistant_id = Some(assistant_id.to_string());
        state.index_id = Some(index_id.to_string());
        state.last_run_at = Some(now);
        state.total_files = total_files;
        state.total_size_bytes = total_size_bytes;
        let state_path = store.save(&state)?;
        report.record_state_path(&state_path);
        report.record_phase("persist", started);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryIndex, RemoteCall};
    use crate::sync::{DocumentKey, RunStatus, SyncState};
    use std::fs;
    use tempfile::TempDir;

    const INDEX: &str = "vs_main";
    const ASSISTANT: &str = "asst_main";

    fn config(root: &Path) -> SyncConfig {
        SyncConfig {
            api_key: Some("sk-test".into()),
            assistant_id: Some(ASSISTANT.into()),
            index_id: Some(INDEX.into()),
            articles_dir: root.join("articles"),
            state_file: root.join("sync_state.json"),
            summary_file: root.join("runs").join("last_run.json"),
            ..Default::default()
        }
    }

    fn write(root: &Path, name: &str, content: &str) {
        let dir = root.join("articles");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn job(root: &Path, remote: &Arc<InMemoryIndex>) -> SyncJob<InMemoryIndex> {
        SyncJob::new(config(root), Arc::clone(remote))
    }

    fn load_state(root: &Path) -> SyncState {
        serde_json::from_str(&fs::read_to_string(root.join("sync_state.json")).unwrap()).unwrap()
    }

    fn load_summary(root: &Path) -> RunSummary {
        let path = root.join("runs").join("last_run.json");
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_initial_run_uploads_everything() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "# A\n");
        write(temp.path(), "B.md", "# B\n");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));

        let outcome = job(temp.path(), &remote).run().await.unwrap();

        assert_eq!(outcome.summary.status, RunStatus::Success);
        assert_eq!(outcome.summary.added, 2);
        assert_eq!(outcome.summary.uploaded, 2);
        assert_eq!(remote.attached(INDEX).len(), 2);
        assert_eq!(remote.assistant(ASSISTANT).unwrap().index_id, INDEX);

        let state = load_state(temp.path());
        assert_eq!(state.documents.len(), 2);
        assert_eq!(state.total_files, 2);
        assert_eq!(state.index_id.as_deref(), Some(INDEX));
        assert!(outcome.check().is_ok());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "# A\n");
        write(temp.path(), "B.md", "# B\n");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));

        job(temp.path(), &remote).run().await.unwrap();
        let first = load_state(temp.path());
        let second = job(temp.path(), &remote).run().await.unwrap();

        assert_eq!(second.summary.added, 0);
        assert_eq!(second.summary.updated, 0);
        assert_eq!(second.summary.removed_detected, 0);
        assert_eq!(second.summary.skipped, 2);
        assert_eq!(load_state(temp.path()).documents, first.documents);
    }

    #[tokio::test]
    async fn test_edit_replaces_remote_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "v1");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));
        job(temp.path(), &remote).run().await.unwrap();
        let old_id = remote.attached(INDEX)[0].clone();

        write(temp.path(), "A.md", "v2");
        let outcome = job(temp.path(), &remote).run().await.unwrap();

        assert_eq!(outcome.summary.updated, 1);
        assert_eq!(outcome.summary.deleted_remote_file_ids, vec![old_id.clone()]);
        assert!(remote.file(&old_id).is_none());
        let attached = remote.attached(INDEX);
        assert_eq!(attached.len(), 1);
        assert_eq!(remote.file(&attached[0]).unwrap().1, b"v2".to_vec());
    }

    #[tokio::test]
    async fn test_partial_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "a");
        write(temp.path(), "B.md", "b");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));
        remote.fail_uploads_for("A.md");

        let outcome = job(temp.path(), &remote).run().await.unwrap();

        assert_eq!(outcome.summary.status, RunStatus::Partial);
        assert!(matches!(outcome.check(), Err(Error::Incomplete { failed: 1, .. })));
        let state = load_state(temp.path());
        assert!(!state.documents.contains_key(&DocumentKey::from("A.md")));
        assert!(state.documents.contains_key(&DocumentKey::from("B.md")));
        assert_eq!(load_summary(temp.path()).failed_keys, vec![DocumentKey::from("A.md")]);
    }

    #[tokio::test]
    async fn test_empty_snapshot_aborts_without_mutation() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "a");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));
        job(temp.path(), &remote).run().await.unwrap();
        let before = load_state(temp.path());

        fs::remove_file(temp.path().join("articles").join("A.md")).unwrap();
        let err = job(temp.path(), &remote).run().await.unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(load_state(temp.path()), before);
        assert_eq!(remote.attached(INDEX).len(), 1);
        let summary = load_summary(temp.path());
        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.error.unwrap().code, "EMPTY_SNAPSHOT");
    }

    #[tokio::test]
    async fn test_missing_assistant_aborts_before_upload() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "a");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, "asst_other"));

        let err = job(temp.path(), &remote).run().await.unwrap_err();

        assert!(matches!(err, Error::Remote(_)));
        assert!(remote.file_ids().is_empty());
        assert!(!temp.path().join("sync_state.json").exists());
        assert_eq!(load_summary(temp.path()).error.unwrap().kind, "assistant");
    }

    #[tokio::test]
    async fn test_changed_index_reuploads_everything() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "a");
        write(temp.path(), "B.md", "b");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));
        job(temp.path(), &remote).run().await.unwrap();
        write(temp.path(), "A.md", "a2");

        let other = Arc::new(InMemoryIndex::with_ids("vs_other", ASSISTANT));
        let mut cfg = config(temp.path());
        cfg.index_id = Some("vs_other".into());
        let outcome = SyncJob::new(cfg, Arc::clone(&other)).run().await.unwrap();

        assert_eq!(outcome.summary.added, 2);
        assert_eq!(outcome.summary.updated, 0);
        assert_eq!(outcome.summary.skipped, 0);
        assert_eq!(other.attached("vs_other").len(), 2);
        // Nothing from the old index is detached from the new one.
        assert!(other.calls().iter().all(|c| !matches!(c, RemoteCall::Detach(..))));
        let state = load_state(temp.path());
        assert_eq!(state.index_id.as_deref(), Some("vs_other"));
        assert_eq!(state.documents.len(), 2);
    }

    #[test]
    fn test_record_abort_writes_error_summary() {
        let temp = TempDir::new().unwrap();
        let summary_file = temp.path().join("runs").join("last_run.json");
        let err = Error::MissingCredential {
            name: "assistant id",
            env: "ASSISTANT_ID",
        };

        let path = record_abort(&summary_file, &err).unwrap();

        assert_eq!(path, summary_file);
        let summary = load_summary(temp.path());
        assert_eq!(summary.status, RunStatus::Error);
        let detail = summary.error.unwrap();
        assert_eq!(detail.code, "MISSING_CREDENTIAL");
        assert_eq!(detail.kind, "config");
        assert_eq!(summary.uploaded, 0);
    }

    #[tokio::test]
    async fn test_removed_document_is_tombstoned() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "A.md", "a");
        write(temp.path(), "B.md", "b");
        let remote = Arc::new(InMemoryIndex::with_ids(INDEX, ASSISTANT));
        job(temp.path(), &remote).run().await.unwrap();

        fs::remove_file(temp.path().join("articles").join("B.md")).unwrap();
        let outcome = job(temp.path(), &remote).run().await.unwrap();

        assert_eq!(outcome.summary.removed_detected, 1);
        let state = load_state(temp.path());
        assert!(state.documents[&DocumentKey::from("B.md")].removed);

        let again = job(temp.path(), &remote).run().await.unwrap();
        assert_eq!(again.summary.removed_detected, 0);
    }
}
