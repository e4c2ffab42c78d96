//! First-time provisioning of the vector store and assistant.
//!
//! Bootstrap reuses a configured index and assistant when ids are given and
//! creates them otherwise, writes a report with client-side chunk estimates,
//! and then runs a normal sync so the fingerprint store starts out seeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::job::{JobOutcome, SyncJob};
use crate::remote::{ChunkingStrategy, RemoteIndex};
use crate::scrape;
use crate::sync::{DocumentKey, SourceDocument, SyncError, discover, write_json_with_fallback};

/// Approximate characters per token for English prose.
const CHARS_PER_TOKEN: usize = 4;

/// Token and chunk estimate for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEstimate {
    /// Document key.
    pub file: DocumentKey,
    /// Estimated tokens.
    pub tokens: usize,
    /// Estimated chunks under the static strategy.
    pub estimated_chunks: usize,
}

/// Written to `bootstrap_state.json` after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub assistant_id: String,
    pub vector_store_id: String,
    pub model: String,
    pub assistant_name: String,
    pub vector_store_name: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub docs_dir: PathBuf,
    pub file_count: usize,
    pub estimated_total_tokens: usize,
    pub estimated_total_chunks: usize,
    pub per_file: Vec<FileEstimate>,
    pub created_at: String,
}

/// Rough token count: one token per four characters, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Chunks a static strategy produces for `tokens` tokens.
///
/// The first chunk covers `size` tokens; each further chunk advances by
/// `size - overlap` (at least 1).
#[must_use]
pub fn estimate_chunks(tokens: usize, chunking: ChunkingStrategy) -> usize {
    let size = chunking.max_chunk_size_tokens;
    if tokens == 0 {
        return 0;
    }
    if tokens <= size {
        return 1;
    }
    let stride = size.saturating_sub(chunking.chunk_overlap_tokens).max(1);
    1 + (tokens - size).div_ceil(stride)
}

/// Estimates for every document, in snapshot order.
#[must_use]
pub fn estimate(documents: &[SourceDocument], chunking: ChunkingStrategy) -> Vec<FileEstimate> {
    documents
        .iter()
        .map(|doc| {
            let tokens = estimate_tokens(&doc.read_text());
            FileEstimate {
                file: doc.key.clone(),
                tokens,
                estimated_chunks: estimate_chunks(tokens, chunking),
            }
        })
        .collect()
}

/// Result of a bootstrap: the provisioning report and the seeding sync.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub report: BootstrapReport,
    pub report_path: PathBuf,
    pub sync: JobOutcome,
}

/// Provisions remote resources, then runs the first sync.
#[derive(Debug)]
pub struct Bootstrapper<R> {
    config: SyncConfig,
    remote: Arc<R>,
    assistant_name: String,
    index_name: String,
}

impl<R: RemoteIndex + 'static> Bootstrapper<R> {
    /// Create a bootstrapper.
    pub fn new(
        config: SyncConfig,
        remote: Arc<R>,
        assistant_name: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            config,
            remote,
            assistant_name: assistant_name.into(),
            index_name: index_name.into(),
        }
    }

    /// Provision, write the report to `report_path`, and sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is empty, a remote call fails, or
    /// the first sync aborts.
    pub async fn run(&self, report_path: &Path) -> Result<BootstrapOutcome> {
        let mut config = self.config.clone();

        if let Some(scrape) = config.scrape.take() {
            let out_dir = config.articles_dir.clone();
            tokio::task::spawn_blocking(move || scrape::run(&scrape, &out_dir))
                .await
                .map_err(|e| crate::Error::Other(format!("scrape task failed: {e}")))??;
        }

        let documents = discover(&config.articles_dir, &config.extension)?;
        if documents.is_empty() {
            return Err(SyncError::EmptySnapshot(config.articles_dir.clone()).into());
        }
        let per_file = estimate(&documents, config.chunking);

        let index_id = match config.index_id.clone() {
            Some(id) => {
                info!(index_id = %id, "Reusing vector store");
                id
            }
            None => {
                let id = self
                    .remote
                    .create_index(&self.index_name, config.chunking)
                    .await?;
                info!(index_id = %id, name = %self.index_name, "Created vector store");
                id
            }
        };

        let settings = config.assistant_settings(&index_id, Some(&self.assistant_name));
        let assistant_id = match config.assistant_id.clone() {
            Some(id) => {
                self.remote.configure_assistant(&id, &settings).await?;
                info!(assistant_id = %id, "Updated assistant");
                id
            }
            None => {
                let id = self.remote.create_assistant(&settings).await?;
                info!(assistant_id = %id, name = %self.assistant_name, "Created assistant");
                id
            }
        };

        let report = BootstrapReport {
            assistant_id: assistant_id.clone(),
            vector_store_id: index_id.clone(),
            model: config.model.clone(),
            assistant_name: self.assistant_name.clone(),
            vector_store_name: self.index_name.clone(),
            chunk_size: config.chunking.max_chunk_size_tokens,
            chunk_overlap: config.chunking.chunk_overlap_tokens,
            docs_dir: config.articles_dir.clone(),
            file_count: per_file.len(),
            estimated_total_tokens: per_file.iter().map(|f| f.tokens).sum(),
            estimated_total_chunks: per_file.iter().map(|f| f.estimated_chunks).sum(),
            per_file,
            created_at: Utc::now().to_rfc3339(),
        };
        let report_path = write_json_with_fallback(report_path, &report)?;
        info!(
            path = %report_path.display(),
            files = report.file_count,
            estimated_chunks = report.estimated_total_chunks,
            "Wrote bootstrap report"
        );

        config.assistant_id = Some(assistant_id);
        config.index_id = Some(index_id);
        let sync = SyncJob::new(config, Arc::clone(&self.remote)).run().await?;

        Ok(BootstrapOutcome {
            report,
            report_path,
            sync,
        })
    }
}
