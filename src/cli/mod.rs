//! CLI definitions using clap.
//!
//! Every option that configures a run has an environment-variable twin so
//! the job can be driven entirely from a scheduler's environment.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    DEFAULT_ASSISTANT_NAME, DEFAULT_BOOTSTRAP_FILE, DEFAULT_INDEX_NAME, DEFAULT_MODEL,
    DEFAULT_STATE_FILE, DEFAULT_SUMMARY_FILE, ScrapeConfig, SyncConfig, load_instructions,
};
use crate::error::Result;
use crate::remote::ChunkingStrategy;
use crate::sync::{DEFAULT_MARKER_PREFIX, RemovalPolicy, SnapshotGuard};

pub mod commands;

/// kbsync - keep an assistant's knowledge base in sync with a docs directory
#[derive(Parser, Debug)]
#[command(name = "kbsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON (default when stdout is not a terminal)
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync job: scrape, diff, upload changes, write state and summary
    Run(SyncArgs),

    /// Show what the next run would change, without touching the network
    Status(StatusArgs),

    /// Create or update the vector store and assistant, then run a first sync
    Bootstrap(BootstrapArgs),

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Shared argument groups
// ============================================================================

/// Where the documents and the fingerprint store live.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory holding the Markdown snapshot
    #[arg(long, env = "ARTICLES_DIR", default_value = "articles")]
    pub articles_dir: PathBuf,

    /// Document file extension
    #[arg(long, env = "DOC_EXTENSION", default_value = "md")]
    pub extension: String,

    /// Fingerprint store location
    #[arg(long, env = "SYNC_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Line prefix of the in-content "last modified" marker
    #[arg(long, env = "CHANGE_MARKER_PREFIX", default_value = DEFAULT_MARKER_PREFIX)]
    pub marker_prefix: String,

    /// Smallest accepted snapshot size relative to the last one (0-1)
    #[arg(long, env = "MIN_SNAPSHOT_RATIO", default_value_t = 0.5)]
    pub min_snapshot_ratio: f64,

    /// Accept a snapshot that shrank below the minimum ratio
    #[arg(long)]
    pub allow_mass_removal: bool,
}

/// Remote index and assistant settings.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API root (for proxies and compatible servers)
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Assistant to keep pointed at the vector store
    #[arg(long, env = "ASSISTANT_ID")]
    pub assistant_id: Option<String>,

    /// Vector store holding the documents
    #[arg(long, env = "VECTOR_STORE_ID")]
    pub vector_store_id: Option<String>,

    /// Model the assistant runs on
    #[arg(long, env = "MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// File with the assistant's system instructions
    #[arg(long, env = "INSTRUCTIONS_FILE")]
    pub instructions_file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Documents uploaded at once
    #[arg(long, env = "UPLOAD_CONCURRENCY", default_value_t = 1)]
    pub upload_concurrency: usize,

    /// Static chunk size in tokens (new vector stores)
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 800)]
    pub chunk_size: usize,

    /// Static chunk overlap in tokens (new vector stores)
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,
}

/// External scraper invocation.
#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Scraper program run before syncing (skipped when unset)
    #[arg(long, env = "SCRAPE_COMMAND")]
    pub scrape_command: Option<String>,

    /// Extra argument for the scraper (repeatable)
    #[arg(long = "scrape-arg", allow_hyphen_values = true)]
    pub scrape_args: Vec<String>,

    /// Help-center locale passed to the scraper
    #[arg(long, env = "LOCALE", default_value = "en-us")]
    pub locale: String,

    /// Maximum articles passed to the scraper
    #[arg(long, env = "MAX_ARTICLES", default_value_t = 45)]
    pub max_articles: usize,
}

// ============================================================================
// Command arguments
// ============================================================================

/// Arguments for `run`.
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(flatten)]
    pub scrape: ScrapeArgs,

    /// Run summary location
    #[arg(long, env = "RUN_SUMMARY_FILE", default_value = DEFAULT_SUMMARY_FILE)]
    pub summary_file: PathBuf,

    /// What happens to records of removed documents
    #[arg(long, env = "REMOVAL_POLICY", value_enum, default_value_t)]
    pub removal_policy: RemovalPolicy,
}

/// Arguments for `status`.
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// List every document, not only changes
    #[arg(long)]
    pub all: bool,
}

/// Arguments for `bootstrap`.
#[derive(Args, Debug, Clone)]
pub struct BootstrapArgs {
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Name for a newly created assistant
    #[arg(long, default_value = DEFAULT_ASSISTANT_NAME)]
    pub assistant_name: String,

    /// Name for a newly created vector store
    #[arg(long, default_value = DEFAULT_INDEX_NAME)]
    pub vector_store_name: String,

    /// Where to write the bootstrap report
    #[arg(long, env = "BOOTSTRAP_STATE_FILE", default_value = DEFAULT_BOOTSTRAP_FILE)]
    pub report_file: PathBuf,
}

impl SourceArgs {
    /// Snapshot guard from the ratio flags.
    #[must_use]
    pub fn guard(&self) -> SnapshotGuard {
        SnapshotGuard {
            min_ratio: self.min_snapshot_ratio,
            allow_mass_removal: self.allow_mass_removal,
        }
    }
}

impl SyncArgs {
    /// Collect the parsed arguments into a [`SyncConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the instructions file cannot be read or a value
    /// is out of range.
    pub fn to_config(&self) -> Result<SyncConfig> {
        let scrape = self
            .scrape
            .scrape_command
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|program| ScrapeConfig {
                program: program.clone(),
                args: self.scrape.scrape_args.clone(),
                locale: self.scrape.locale.clone(),
                max_articles: self.scrape.max_articles,
            });

        let config = SyncConfig {
            api_key: non_blank(self.remote.api_key.as_ref()),
            base_url: non_blank(self.remote.base_url.as_ref()),
            assistant_id: non_blank(self.remote.assistant_id.as_ref()),
            index_id: non_blank(self.remote.vector_store_id.as_ref()),
            model: self.remote.model.clone(),
            instructions: load_instructions(self.remote.instructions_file.as_deref())?,
            articles_dir: self.source.articles_dir.clone(),
            extension: self.source.extension.clone(),
            state_file: self.source.state_file.clone(),
            summary_file: self.summary_file.clone(),
            marker_prefix: self.source.marker_prefix.clone(),
            concurrency: self.remote.upload_concurrency,
            request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
            removal_policy: self.removal_policy,
            guard: self.source.guard(),
            chunking: ChunkingStrategy {
                max_chunk_size_tokens: self.remote.chunk_size,
                chunk_overlap_tokens: self.remote.chunk_overlap,
            },
            scrape,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Environment files often carry `KEY=` for "unset".
fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
