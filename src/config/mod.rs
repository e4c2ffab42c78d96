//! Configuration management.
//!
//! Every setting arrives through the CLI (each flag has an environment
//! variable twin) and is collected into one explicit [`SyncConfig`] value
//! that is passed into the job. Nothing in the sync core reads the
//! environment directly.
//!
//! Resolution priority per setting:
//! 1. Command-line flag
//! 2. Environment variable
//! 3. Built-in default

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::remote::{AssistantSettings, ChunkingStrategy, DEFAULT_INSTRUCTIONS};
use crate::sync::{DEFAULT_MARKER_PREFIX, RemovalPolicy, SnapshotGuard};

/// Default model for the assistant.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default assistant name used when one is created.
pub const DEFAULT_ASSISTANT_NAME: &str = "OptiBot";

/// Default vector store name used when one is created.
pub const DEFAULT_INDEX_NAME: &str = "OptiSigns Knowledge Base";

/// Default fingerprint store location.
pub const DEFAULT_STATE_FILE: &str = "sync_state.json";

/// Default run summary location.
pub const DEFAULT_SUMMARY_FILE: &str = "runs/last_run.json";

/// Default bootstrap report location.
pub const DEFAULT_BOOTSTRAP_FILE: &str = "bootstrap_state.json";

/// External scraper invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    /// Program to run.
    pub program: String,
    /// Extra arguments placed before the standard ones.
    pub args: Vec<String>,
    /// Help-center locale.
    pub locale: String,
    /// Upper bound on articles fetched.
    pub max_articles: usize,
}

/// Everything one sync run needs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API key for the remote index.
    pub api_key: Option<String>,
    /// Override for the API root.
    pub base_url: Option<String>,
    /// Assistant kept pointed at the index.
    pub assistant_id: Option<String>,
    /// Remote index (vector store) id.
    pub index_id: Option<String>,
    /// Model the assistant runs on.
    pub model: String,
    /// Assistant system instructions.
    pub instructions: String,
    /// Directory holding the document snapshot.
    pub articles_dir: PathBuf,
    /// Document file extension, without the dot.
    pub extension: String,
    /// Fingerprint store location.
    pub state_file: PathBuf,
    /// Run summary location.
    pub summary_file: PathBuf,
    /// Line prefix of the in-content change marker.
    pub marker_prefix: String,
    /// Maximum documents uploaded at once.
    pub concurrency: usize,
    /// Timeout applied to each remote request.
    pub request_timeout: Duration,
    /// What happens to records of removed documents.
    pub removal_policy: RemovalPolicy,
    /// Shrinkage limits for the snapshot.
    pub guard: SnapshotGuard,
    /// Chunking for newly created indexes.
    pub chunking: ChunkingStrategy,
    /// Scraper to run before syncing, if any.
    pub scrape: Option<ScrapeConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            assistant_id: None,
            index_id: None,
            model: DEFAULT_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            articles_dir: PathBuf::from("articles"),
            extension: "md".to_string(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            summary_file: PathBuf::from(DEFAULT_SUMMARY_FILE),
            marker_prefix: DEFAULT_MARKER_PREFIX.to_string(),
            concurrency: 1,
            request_timeout: Duration::from_secs(60),
            removal_policy: RemovalPolicy::default(),
            guard: SnapshotGuard::default(),
            chunking: ChunkingStrategy::default(),
            scrape: None,
        }
    }
}

impl SyncConfig {
    /// Check settings that do not depend on the command being run.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(Error::Config("document extension must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("upload concurrency must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.guard.min_ratio) {
            return Err(Error::Config(format!(
                "minimum snapshot ratio must be between 0 and 1, got {}",
                self.guard.min_ratio
            )));
        }
        if self.chunking.max_chunk_size_tokens == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap_tokens >= self.chunking.max_chunk_size_tokens {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap_tokens, self.chunking.max_chunk_size_tokens
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// The API key, or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingCredential` if unset or blank.
    pub fn require_api_key(&self) -> Result<&str> {
        required(self.api_key.as_deref(), "API key", "OPENAI_API_KEY")
    }

    /// The assistant id, or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingCredential` if unset or blank.
    pub fn require_assistant_id(&self) -> Result<&str> {
        required(self.assistant_id.as_deref(), "assistant id", "ASSISTANT_ID")
    }

    /// The index id, or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingCredential` if unset or blank.
    pub fn require_index_id(&self) -> Result<&str> {
        required(self.index_id.as_deref(), "vector store id", "VECTOR_STORE_ID")
    }

    /// Validate everything a sync run needs before any remote call.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;
        self.require_api_key()?;
        self.require_assistant_id()?;
        self.require_index_id()?;
        Ok(())
    }

    /// Assistant settings targeting `index_id`.
    #[must_use]
    pub fn assistant_settings(&self, index_id: &str, name: Option<&str>) -> AssistantSettings {
        AssistantSettings {
            name: name.map(str::to_string),
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            index_id: index_id.to_string(),
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str, env: &'static str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingCredential { name, env })
}

/// Load assistant instructions from `path`, or the built-in prompt.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is blank.
pub fn load_instructions(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_INSTRUCTIONS.to_string());
    };

    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read instructions file {}: {e}", path.display()))
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Config(format!(
            "instructions file {} is empty",
            path.display()
        )));
    }
    Ok(text.to_string())
}
