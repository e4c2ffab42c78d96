//! Sync types for the fingerprint store, delta detection and run summaries.
//!
//! The persisted shapes (`SyncState`, `FingerprintRecord`, `RunSummary`) keep
//! the field names of the JSON files the job has always written, so a state
//! file from an earlier deployment loads without migration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::sync::source::SourceDocument;

/// Stable identifier for a content file: its file name, not its full path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Create a key from a file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the key from a path's final component.
    ///
    /// Returns `None` for paths without a file name (`/`, `..`).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .map(|name| Self(name.to_string_lossy().into_owned()))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key still carries directory components.
    ///
    /// Older state files keyed documents by absolute path.
    fn is_path_like(&self) -> bool {
        self.0.contains('/') || self.0.contains('\\')
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// What we last knew about one synced document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintRecord {
    /// SHA256 of the file's exact bytes at last sync.
    #[serde(rename = "sha256")]
    pub content_hash: String,

    /// Identifier returned by the remote index on upload.
    #[serde(
        rename = "file_id",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_file_id: Option<String>,

    /// In-content "last modified" token, if the document carries one.
    #[serde(
        rename = "last_modified",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub change_marker: Option<String>,

    /// File size in bytes.
    pub size_bytes: u64,

    /// RFC 3339 timestamp of the last successful upload.
    #[serde(rename = "uploaded_at", skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,

    /// Tombstone flag: the document disappeared from the snapshot.
    #[serde(skip_serializing_if = "is_false")]
    pub removed: bool,

    /// RFC 3339 timestamp when the tombstone was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Hand-edited and legacy files write `""` for "no value".
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// The persisted sync state: one record per previously-synced document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    /// Fingerprints keyed by document key. `BTreeMap` keeps key order stable.
    #[serde(rename = "files")]
    pub documents: BTreeMap<DocumentKey, FingerprintRecord>,

    /// Assistant the index is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,

    /// Remote index (vector store) the documents live in.
    #[serde(rename = "vector_store_id", skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,

    /// RFC 3339 timestamp of the last completed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<String>,

    /// Number of documents in the last snapshot.
    pub total_files: usize,

    /// Total bytes of the last snapshot.
    pub total_size_bytes: u64,
}

impl SyncState {
    /// Number of records that are not tombstoned.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.documents.values().filter(|r| !r.removed).count()
    }

    /// Point the state at `index_id`.
    ///
    /// Fingerprints only describe what is in the index they were recorded
    /// for. When the state names a different index, every record is dropped
    /// so the next classification re-adds each document to the new one.
    /// A state without an index id is assumed to belong to `index_id`.
    /// Returns the number of records dropped.
    pub fn retarget(&mut self, index_id: &str) -> usize {
        match self.index_id.as_deref() {
            Some(current) if current != index_id => {
                let dropped = self.documents.len();
                self.documents.clear();
                self.index_id = Some(index_id.to_string());
                dropped
            }
            _ => 0,
        }
    }

    /// Rewrite legacy path-based keys to file-name keys.
    ///
    /// When a file-name key already exists it wins over the legacy entry.
    /// Returns the number of keys rewritten.
    pub fn normalize_keys(&mut self) -> usize {
        if !self.documents.keys().any(DocumentKey::is_path_like) {
            return 0;
        }

        let (legacy, mut current): (BTreeMap<_, _>, BTreeMap<_, _>) =
            std::mem::take(&mut self.documents)
                .into_iter()
                .partition(|(key, _)| key.is_path_like());

        let mut rewritten = 0;
        for (key, record) in legacy {
            let Some(normalized) = DocumentKey::from_path(Path::new(key.as_str())) else {
                continue;
            };
            if !current.contains_key(&normalized) {
                current.insert(normalized, record);
                rewritten += 1;
            }
        }

        self.documents = current;
        rewritten
    }
}

/// What happens to the record of a document that left the snapshot.
///
/// Pick one per deployment: switching changes whether a re-added document
/// is compared against its old hash or treated as new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Keep the record with `removed = true` for audit.
    #[default]
    Tombstone,
    /// Delete the record.
    Forget,
}

/// One document from the current snapshot, fingerprinted.
#[derive(Debug, Clone)]
pub struct DeltaEntry {
    /// The document (key, path, bytes).
    pub document: SourceDocument,
    /// SHA256 of `document.bytes`.
    pub content_hash: String,
    /// Change marker extracted from the content.
    pub change_marker: Option<String>,
}

impl DeltaEntry {
    /// The document's key.
    #[must_use]
    pub fn key(&self) -> &DocumentKey {
        &self.document.key
    }

    /// Size of the document in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.document.bytes.len() as u64
    }
}

/// Why a known document was classified as updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// The byte hash differs.
    Content,
    /// Bytes are identical but both change markers exist and differ.
    ChangeMarker,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => write!(f, "content"),
            Self::ChangeMarker => write!(f, "date"),
        }
    }
}

/// A known document whose content changed.
#[derive(Debug, Clone)]
pub struct UpdatedEntry {
    /// The new version.
    pub entry: DeltaEntry,
    /// Remote artifact of the previous version, to be retired.
    pub previous_remote_id: Option<String>,
    /// Which signal triggered the update.
    pub reason: UpdateReason,
}

/// Output of delta detection: four disjoint sets over document keys.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedDelta {
    /// Documents with no prior record.
    pub added: Vec<DeltaEntry>,
    /// Documents whose content changed.
    pub updated: Vec<UpdatedEntry>,
    /// Documents identical to their prior record.
    pub unchanged: Vec<DocumentKey>,
    /// Active records with no document in the snapshot.
    pub removed: Vec<DocumentKey>,
}

impl ClassifiedDelta {
    /// Number of unchanged documents.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.unchanged.len()
    }

    /// Whether anything needs uploading.
    #[must_use]
    pub fn has_uploads(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty()
    }

    /// Returns true if nothing changed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_uploads() && self.removed.is_empty()
    }
}

/// A per-document upload failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    /// Document that failed to upload.
    pub key: DocumentKey,
    /// Error message from the remote client.
    pub message: String,
}

/// Result of applying a delta to the remote index.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// New remote file id per successfully uploaded document.
    pub new_file_ids: BTreeMap<DocumentKey, String>,
    /// Previous remote artifacts confirmed gone.
    pub deleted_remote_ids: Vec<String>,
    /// Updated documents whose previous artifact is confirmed gone.
    pub retired: BTreeSet<DocumentKey>,
    /// Previous artifacts that could not be retired (left orphaned).
    pub retire_failures: Vec<String>,
    /// Documents whose upload or attach failed.
    pub failures: Vec<UploadFailure>,
}

impl ApplyOutcome {
    /// Number of documents uploaded and attached.
    #[must_use]
    pub fn uploaded(&self) -> usize {
        self.new_file_ids.len()
    }

    /// Status implied by the upload results.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        match (self.uploaded(), self.failures.len()) {
            (_, 0) => RunStatus::Success,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }
}

/// Outcome of a run as recorded in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every change was applied.
    Success,
    /// Some uploads failed, some succeeded.
    Partial,
    /// Uploads were needed and none succeeded.
    Failed,
    /// The run aborted before completing.
    Error,
}

impl RunStatus {
    /// Whether the process should exit non-zero.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Diagnostic detail attached to an aborted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `CONFIG_ERROR`).
    pub code: String,
    /// Error kind (the failing stage or variant).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// Last-run artifact. Overwritten on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of this run.
    pub run_id: String,
    /// RFC 3339 timestamp when the summary was written.
    pub timestamp: String,
    /// RFC 3339 timestamp when the run started.
    pub started_at: String,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
    /// Overall status.
    pub status: RunStatus,
    /// Documents classified as added.
    pub added: usize,
    /// Documents classified as updated.
    pub updated: usize,
    /// Documents classified as unchanged.
    pub skipped: usize,
    /// Records whose document disappeared.
    pub removed_detected: usize,
    /// Documents uploaded and attached.
    pub uploaded: usize,
    /// Documents whose upload failed.
    pub upload_failures: usize,
    /// Keys of the failed documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<DocumentKey>,
    /// Previous remote artifacts deleted.
    pub deleted_remote_file_ids: Vec<String>,
    /// Previous remote artifacts that could not be deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retire_failures: Vec<String>,
    /// Assistant id used by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    /// Remote index used by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,
    /// Directory the snapshot was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articles_dir: Option<PathBuf>,
    /// Documents in the snapshot.
    pub total_files: usize,
    /// Bytes in the snapshot.
    pub total_size_bytes: u64,
    /// Where the fingerprint store was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    /// Seconds spent per phase.
    #[serde(default)]
    pub phases: BTreeMap<String, f64>,
    /// Set when the run aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document directory does not exist.
    #[error("Document directory not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The snapshot contains no documents.
    #[error("No documents found in {}", .0.display())]
    EmptySnapshot(PathBuf),

    /// The snapshot shrank too much to trust its removals.
    #[error(
        "Snapshot has {current} documents but {prior} were synced before (minimum {minimum})"
    )]
    ImplausibleSnapshot {
        /// Documents in the current snapshot.
        current: usize,
        /// Active records in the prior state.
        prior: usize,
        /// Smallest snapshot accepted.
        minimum: usize,
    },

    /// Neither the primary nor the fallback location could be written.
    #[error("Cannot write {}: {message}", path.display())]
    Unwritable {
        /// Primary path.
        path: PathBuf,
        /// Last error message.
        message: String,
    },
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
