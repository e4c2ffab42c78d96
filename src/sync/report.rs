//! Run reporter: builds the last-run summary and writes it.
//!
//! A [`RunReport`] is opened when the job starts and collects counts, phase
//! timings and the terminal error as the run progresses. [`RunReporter`]
//! turns it into a [`RunSummary`] and persists it with the same atomic write
//! and temp-dir fallback as the state file. The summary is written exactly
//! once per invocation, whichever way the run ends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use colored::Colorize;
use tracing::info;

use crate::sync::file::write_json_with_fallback;
use crate::sync::types::{
    ApplyOutcome, ClassifiedDelta, DocumentKey, ErrorDetail, RunStatus, RunSummary, SyncResult,
};

/// Facts collected while a run is in progress.
#[derive(Debug)]
pub struct RunReport {
    run_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    phases: BTreeMap<String, f64>,
    added: usize,
    updated: usize,
    unchanged: usize,
    removed: usize,
    outcome: ApplyOutcome,
    assistant_id: Option<String>,
    index_id: Option<String>,
    articles_dir: Option<PathBuf>,
    total_files: usize,
    total_size_bytes: u64,
    state_path: Option<PathBuf>,
    error: Option<ErrorDetail>,
}

impl RunReport {
    /// Start a report for a new run.
    #[must_use]
    pub fn start() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
            phases: BTreeMap::new(),
            added: 0,
            updated: 0,
            unchanged: 0,
            removed: 0,
            outcome: ApplyOutcome::default(),
            assistant_id: None,
            index_id: None,
            articles_dir: None,
            total_files: 0,
            total_size_bytes: 0,
            state_path: None,
            error: None,
        }
    }

    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record the time spent in a phase that began at `since`.
    pub fn record_phase(&mut self, name: &str, since: Instant) {
        *self.phases.entry(name.to_string()).or_default() += since.elapsed().as_secs_f64();
    }

    /// Record the remote identifiers the run targets.
    pub fn record_target(&mut self, assistant_id: &str, index_id: &str, articles_dir: &Path) {
        self.assistant_id = Some(assistant_id.to_string());
        self.index_id = Some(index_id.to_string());
        self.articles_dir = Some(articles_dir.to_path_buf());
    }

    /// Record the classification counts and snapshot totals.
    pub fn record_delta(&mut self, delta: &ClassifiedDelta, total_files: usize, total_size_bytes: u64) {
        self.added = delta.added.len();
        self.updated = delta.updated.len();
        self.unchanged = delta.unchanged_count();
        self.removed = delta.removed.len();
        self.total_files = total_files;
        self.total_size_bytes = total_size_bytes;
    }

    /// Record what the executor did.
    pub fn record_outcome(&mut self, outcome: &ApplyOutcome) {
        self.outcome = outcome.clone();
    }

    /// Record where the state file ended up.
    pub fn record_state_path(&mut self, path: &Path) {
        self.state_path = Some(path.to_path_buf());
    }

    /// Mark the run as aborted.
    pub fn fail(&mut self, detail: ErrorDetail) {
        self.error = Some(detail);
    }

    /// Status the run would end with now.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.error.is_some() {
            RunStatus::Error
        } else {
            self.outcome.status()
        }
    }
}

/// Writes run summaries to a fixed location.
#[derive(Debug, Clone)]
pub struct RunReporter {
    path: PathBuf,
}

impl RunReporter {
    /// Create a reporter writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Primary summary location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the summary for a finished (or aborted) run.
    #[must_use]
    pub fn summarize(&self, report: &RunReport) -> RunSummary {
        let outcome = &report.outcome;
        RunSummary {
            run_id: report.run_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            started_at: report.started_at.to_rfc3339(),
            duration_seconds: round_secs(report.clock.elapsed().as_secs_f64()),
            status: report.status(),
            added: report.added,
            updated: report.updated,
            skipped: report.unchanged,
            removed_detected: report.removed,
            uploaded: outcome.uploaded(),
            upload_failures: outcome.failures.len(),
            failed_keys: outcome.failures.iter().map(|f| f.key.clone()).collect::<Vec<DocumentKey>>(),
            deleted_remote_file_ids: outcome.deleted_remote_ids.clone(),
            retire_failures: outcome.retire_failures.clone(),
            assistant_id: report.assistant_id.clone(),
            vector_store_id: report.index_id.clone(),
            articles_dir: report.articles_dir.clone(),
            total_files: report.total_files,
            total_size_bytes: report.total_size_bytes,
            state_path: report.state_path.clone(),
            phases: report
                .phases
                .iter()
                .map(|(name, secs)| (name.clone(), round_secs(*secs)))
                .collect(),
            error: report.error.clone(),
        }
    }

    /// Write the summary, overwriting the previous run's.
    ///
    /// Returns the path actually written.
    ///
    /// # Errors
    ///
    /// Returns an error only if neither the primary nor the fallback
    /// location is writable.
    pub fn persist(&self, summary: &RunSummary) -> SyncResult<PathBuf> {
        let written = write_json_with_fallback(&self.path, summary)?;
        info!(
            path = %written.display(),
            status = %summary.status,
            "Wrote run summary"
        );
        Ok(written)
    }
}

fn round_secs(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// Print a human-readable summary to stdout.
pub fn print_summary(summary: &RunSummary) {
    let status = match summary.status {
        RunStatus::Success => summary.status.to_string().green().bold(),
        RunStatus::Partial => summary.status.to_string().yellow().bold(),
        RunStatus::Failed | RunStatus::Error => summary.status.to_string().red().bold(),
    };

    println!("{} {status}", "Sync run:".bold());
    println!("  Run ID:    {}", summary.run_id.dimmed());
    println!("  Duration:  {:.2}s", summary.duration_seconds);
    println!();
    println!("{}", "Delta:".blue().bold());
    println!("  Added:     {}", summary.added);
    println!("  Updated:   {}", summary.updated);
    println!("  Unchanged: {}", summary.skipped);
    println!("  Removed:   {}", summary.removed_detected);
    println!();
    println!("{}", "Remote:".blue().bold());
    println!("  Uploaded:  {}", summary.uploaded);
    println!("  Deleted:   {}", summary.deleted_remote_file_ids.len());

    if summary.upload_failures > 0 {
        println!(
            "  {} {}",
            "Failed:".red(),
            summary
                .failed_keys
                .iter()
                .map(DocumentKey::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if !summary.retire_failures.is_empty() {
        println!(
            "  {} {}",
            "Orphaned:".yellow(),
            summary.retire_failures.join(", ")
        );
    }
    if let Some(error) = &summary.error {
        println!();
        println!("{} [{}] {}", "Error:".red().bold(), error.code, error.message);
    }
}
