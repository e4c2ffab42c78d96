//! Delta detection.
//!
//! Classifies the current snapshot against the persisted [`SyncState`] into
//! four disjoint sets: added, updated, unchanged and removed. This is pure
//! local computation with no remote calls.
//!
//! # Change signals
//!
//! A known document is updated when its byte hash differs, or when the hash
//! matches but both the stored and the current change marker are present and
//! differ. A missing marker on either side never triggers an update.
//!
//! # Tombstones
//!
//! Tombstoned records are not reported as removed again. A tombstoned key
//! that reappears is compared against its stored hash like any other record.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::sync::hash::{file_digest, has_changed};
use crate::sync::source::{SourceDocument, extract_change_marker};
use crate::sync::types::{
    ClassifiedDelta, DeltaEntry, DocumentKey, SyncError, SyncResult, SyncState, UpdateReason,
    UpdatedEntry,
};

/// Default prefix of the in-content change marker line.
pub const DEFAULT_MARKER_PREFIX: &str = "Last Modified:";

/// Fingerprint a document: hash its bytes and extract its change marker.
#[must_use]
pub fn fingerprint(document: SourceDocument, marker_prefix: &str) -> DeltaEntry {
    let content_hash = file_digest(&document.bytes);
    let change_marker = extract_change_marker(&document.read_text(), marker_prefix);
    DeltaEntry {
        document,
        content_hash,
        change_marker,
    }
}

/// Classify the current documents against the prior state.
///
/// Output vectors are sorted by key, so the result depends only on file
/// bytes and persisted state, never on input order. Duplicate keys in
/// `documents` keep the first occurrence.
#[must_use]
pub fn classify(
    documents: Vec<SourceDocument>,
    prior: &SyncState,
    marker_prefix: &str,
) -> ClassifiedDelta {
    let mut documents = documents;
    documents.sort_by(|a, b| a.key.cmp(&b.key));
    documents.dedup_by(|a, b| a.key == b.key);

    let mut delta = ClassifiedDelta::default();
    let mut seen = BTreeSet::new();

    for document in documents {
        seen.insert(document.key.clone());
        let entry = fingerprint(document, marker_prefix);

        let Some(record) = prior.documents.get(entry.key()) else {
            debug!(key = %entry.key(), "New document");
            delta.added.push(entry);
            continue;
        };

        let reason = if has_changed(&entry.content_hash, &record.content_hash) {
            Some(UpdateReason::Content)
        } else {
            match (&record.change_marker, &entry.change_marker) {
                (Some(old), Some(new)) if old != new => Some(UpdateReason::ChangeMarker),
                _ => None,
            }
        };

        match reason {
            Some(reason) => {
                debug!(key = %entry.key(), %reason, "Updated document");
                delta.updated.push(UpdatedEntry {
                    previous_remote_id: record.remote_file_id.clone(),
                    entry,
                    reason,
                });
            }
            None => delta.unchanged.push(entry.document.key),
        }
    }

    delta.removed = prior
        .documents
        .iter()
        .filter(|(key, record)| !record.removed && !seen.contains(*key))
        .map(|(key, _)| key.clone())
        .collect();

    info!(
        added = delta.added.len(),
        updated = delta.updated.len(),
        unchanged = delta.unchanged_count(),
        removed = delta.removed.len(),
        "Classified snapshot"
    );
    delta
}

/// Limits on how much a snapshot may shrink before it is distrusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotGuard {
    /// Smallest accepted `current / prior_active` ratio.
    pub min_ratio: f64,
    /// Skip the ratio check.
    pub allow_mass_removal: bool,
}

impl Default for SnapshotGuard {
    fn default() -> Self {
        Self {
            min_ratio: 0.5,
            allow_mass_removal: false,
        }
    }
}

impl SnapshotGuard {
    /// Smallest snapshot accepted for `prior_active` synced documents.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn minimum_for(&self, prior_active: usize) -> usize {
        let ratio = self.min_ratio.clamp(0.0, 1.0);
        (prior_active as f64 * ratio).ceil() as usize
    }
}

/// Refuse snapshots that would wipe the remote index by accident.
///
/// An empty snapshot is always rejected: a failed scrape must not look like
/// every document was removed. A snapshot smaller than the guard's minimum
/// is rejected unless mass removal is explicitly allowed.
///
/// # Errors
///
/// Returns [`SyncError::EmptySnapshot`] or [`SyncError::ImplausibleSnapshot`].
pub fn guard_snapshot(
    current: usize,
    prior: &SyncState,
    guard: &SnapshotGuard,
    dir: &std::path::Path,
) -> SyncResult<()> {
    if current == 0 {
        return Err(SyncError::EmptySnapshot(dir.to_path_buf()));
    }

    let prior_active = prior.active_count();
    let minimum = guard.minimum_for(prior_active);
    if !guard.allow_mass_removal && current < minimum {
        return Err(SyncError::ImplausibleSnapshot {
            current,
            prior: prior_active,
            minimum,
        });
    }
    Ok(())
}

/// Keys of every document in the delta, in classification order.
#[must_use]
pub fn all_keys(delta: &ClassifiedDelta) -> Vec<&DocumentKey> {
    delta
        .added
        .iter()
        .map(DeltaEntry::key)
        .chain(delta.updated.iter().map(|u| u.entry.key()))
        .chain(delta.unchanged.iter())
        .chain(delta.removed.iter())
        .collect()
}
