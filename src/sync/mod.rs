//! Incremental sync of a document directory into a remote index.
//!
//! This module holds the sync core:
//!
//! - **Store**: the persisted fingerprint of every synced document
//! - **Detect**: classification of a snapshot into added, updated,
//!   unchanged and removed documents
//! - **Executor**: the remote mutations for a classified delta, and the
//!   reconciliation of their results into the state
//! - **Report**: the last-run summary
//!
//! # Architecture
//!
//! Detection is pure local computation. Only the executor talks to the
//! remote index, through [`crate::remote::RemoteIndex`]. The in-memory
//! state is mutated by [`reconcile`] alone, after every remote call has
//! returned, and written once per run by [`FingerprintStore::save`].
//!
//! # File Format
//!
//! The state file maps file names to their fingerprint:
//! ```json
//! {"files":{"123-intro.md":{"sha256":"9f86d0...","file_id":"file-abc","size_bytes":512,"uploaded_at":"2025-01-20T10:00:00+00:00"}},"vector_store_id":"vs_123"}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kbsync::sync::{classify, discover, FingerprintStore, SyncExecutor};
//!
//! let state = FingerprintStore::new("sync_state.json").load();
//! let delta = classify(discover(dir, "md")?, &state, "Last Modified:");
//! let outcome = SyncExecutor::new(remote, "vs_123", 4).apply(&delta).await;
//! ```

mod detect;
mod executor;
mod file;
mod hash;
mod report;
mod source;
mod store;
mod types;

// Re-export main types and functions
pub use detect::{
    DEFAULT_MARKER_PREFIX, SnapshotGuard, all_keys, classify, fingerprint, guard_snapshot,
};
pub use executor::{SyncExecutor, reconcile};
pub use file::{atomic_write, fallback_path, read_json, to_sorted_json, write_json_with_fallback};
pub use hash::{file_digest, has_changed};
pub use report::{RunReport, RunReporter, print_summary};
pub use source::{SourceDocument, discover, extract_change_marker};
pub use store::FingerprintStore;
pub use types::{
    ApplyOutcome, ClassifiedDelta, DeltaEntry, DocumentKey, ErrorDetail, FingerprintRecord,
    RemovalPolicy, RunStatus, RunSummary, SyncError, SyncResult, SyncState, UpdateReason,
    UpdatedEntry, UploadFailure,
};
