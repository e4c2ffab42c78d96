//! Error types for the kbsync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=config, 3=snapshot, 4=remote, etc.)
//! - Retryability flags for schedulers deciding whether to re-run
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::sync::{ErrorDetail, RunStatus, SyncError};

/// Result type alias for kbsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Schedulers match on the exit code; log shippers on the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Config (exit 2)
    ConfigError,
    MissingCredential,

    // Scrape / snapshot (exit 3)
    ScrapeError,
    SourceMissing,
    EmptySnapshot,
    ImplausibleSnapshot,

    // Remote (exit 4)
    RemoteError,
    RemoteUnavailable,
    AssistantConfigError,

    // Incomplete sync (exit 5)
    IncompleteSync,

    // I/O (exit 6)
    IoError,
    JsonError,
    StateUnwritable,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::ScrapeError => "SCRAPE_ERROR",
            Self::SourceMissing => "SOURCE_MISSING",
            Self::EmptySnapshot => "EMPTY_SNAPSHOT",
            Self::ImplausibleSnapshot => "IMPLAUSIBLE_SNAPSHOT",
            Self::RemoteError => "REMOTE_ERROR",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::AssistantConfigError => "ASSISTANT_CONFIG_ERROR",
            Self::IncompleteSync => "INCOMPLETE_SYNC",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::StateUnwritable => "STATE_UNWRITABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-6).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::ConfigError | Self::MissingCredential => 2,
            Self::ScrapeError
            | Self::SourceMissing
            | Self::EmptySnapshot
            | Self::ImplausibleSnapshot => 3,
            Self::RemoteError | Self::RemoteUnavailable | Self::AssistantConfigError => 4,
            Self::IncompleteSync => 5,
            Self::IoError | Self::JsonError | Self::StateUnwritable => 6,
        }
    }

    /// Whether re-running the job unchanged may succeed.
    ///
    /// True for transient remote failures and partial syncs (failed
    /// documents are detected again next run). False for configuration and
    /// snapshot problems that need an operator.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable | Self::IncompleteSync | Self::ScrapeError
        )
    }

    /// Short stage name recorded in the run summary.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConfigError | Self::MissingCredential => "config",
            Self::ScrapeError => "scrape",
            Self::SourceMissing | Self::EmptySnapshot | Self::ImplausibleSnapshot => "snapshot",
            Self::RemoteError | Self::RemoteUnavailable => "remote",
            Self::AssistantConfigError => "assistant",
            Self::IncompleteSync => "upload",
            Self::IoError | Self::JsonError | Self::StateUnwritable => "state",
            Self::InternalError => "internal",
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in kbsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting: {name} (set {env})")]
    MissingCredential { name: &'static str, env: &'static str },

    #[error("Scrape failed{}: {message}", .status.map(|s| format!(" (exit {s})")).unwrap_or_default())]
    Scrape {
        status: Option<i32>,
        message: String,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Sync incomplete ({status}): {failed} of {attempted} uploads failed")]
    Incomplete {
        status: RunStatus,
        failed: usize,
        attempted: usize,
        summary_path: Option<PathBuf>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigError,
            Self::MissingCredential { .. } => ErrorCode::MissingCredential,
            Self::Scrape { .. } => ErrorCode::ScrapeError,
            Self::Sync(e) => match e {
                SyncError::SourceMissing(_) => ErrorCode::SourceMissing,
                SyncError::EmptySnapshot(_) => ErrorCode::EmptySnapshot,
                SyncError::ImplausibleSnapshot { .. } => ErrorCode::ImplausibleSnapshot,
                SyncError::Unwritable { .. } => ErrorCode::StateUnwritable,
                SyncError::Io(_) => ErrorCode::IoError,
                SyncError::Json(_) => ErrorCode::JsonError,
            },
            Self::Remote(e) => match e {
                RemoteError::Configuration(_) => ErrorCode::AssistantConfigError,
                RemoteError::Transient(_) => ErrorCode::RemoteUnavailable,
                RemoteError::NotFound(_) | RemoteError::Api { .. } | RemoteError::Decode(_) => {
                    ErrorCode::RemoteError
                }
            },
            Self::Incomplete { .. } => ErrorCode::IncompleteSync,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingCredential { env, .. } => Some(format!(
                "Export {env} or pass it as a flag. \
                 Run `kbsync bootstrap` to provision a vector store and assistant."
            )),

            Self::Sync(SyncError::SourceMissing(dir)) => Some(format!(
                "Nothing at {}. Set ARTICLES_DIR or configure SCRAPE_COMMAND.",
                dir.display()
            )),

            Self::Sync(SyncError::EmptySnapshot(_)) => Some(
                "The scrape produced no documents. Check the scraper output before \
                 re-running; the remote index was not touched."
                    .to_string(),
            ),

            Self::Sync(SyncError::ImplausibleSnapshot { .. }) => Some(
                "If the knowledge base really shrank, re-run with --allow-mass-removal."
                    .to_string(),
            ),

            Self::Sync(SyncError::Unwritable { .. }) => Some(
                "Check permissions on SYNC_STATE_FILE / RUN_SUMMARY_FILE and the temp directory."
                    .to_string(),
            ),

            Self::Remote(RemoteError::Configuration(_)) => Some(
                "Check ASSISTANT_ID and VECTOR_STORE_ID, or run `kbsync bootstrap`.".to_string(),
            ),

            Self::Remote(RemoteError::Api { status: 401, .. }) => {
                Some("The API rejected the key. Check OPENAI_API_KEY.".to_string())
            }

            Self::Remote(RemoteError::Transient(_)) => {
                Some("The service is unavailable or rate limiting. Re-run later.".to_string())
            }

            Self::Incomplete { summary_path, .. } => Some(match summary_path {
                Some(path) => format!(
                    "Failed documents keep their previous fingerprint and are retried \
                     on the next run. Details in {}.",
                    path.display()
                ),
                None => "Failed documents are retried on the next run.".to_string(),
            }),

            Self::Config(_)
            | Self::Scrape { .. }
            | Self::Sync(_)
            | Self::Remote(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Detail recorded in the run summary when the run aborts.
    #[must_use]
    pub fn detail(&self) -> ErrorDetail {
        let code = self.error_code();
        ErrorDetail {
            code: code.as_str().to_string(),
            kind: code.kind().to_string(),
            message: self.to_string(),
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
