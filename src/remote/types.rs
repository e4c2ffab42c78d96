//! Types shared by remote index clients.

use serde::{Deserialize, Serialize};

/// Tool instructions the assistant is configured with when none are supplied.
pub const DEFAULT_INSTRUCTIONS: &str = "You are OptiBot, the customer-support bot for OptiSigns.com.\n\
• Tone: helpful, factual, concise.\n\
• Only answer using the uploaded docs.\n\
• Max 5 bullet points; else link to the doc.\n\
• Cite up to 3 \"Article URL:\" lines per reply.";

/// Retrieval configuration applied to an assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantSettings {
    /// Display name (used when creating).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model the assistant runs on.
    pub model: String,
    /// System instructions.
    pub instructions: String,
    /// Index the assistant retrieves from.
    pub index_id: String,
}

/// Static chunking parameters for a new index, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingStrategy {
    /// Maximum tokens per chunk.
    pub max_chunk_size_tokens: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap_tokens: usize,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        Self {
            max_chunk_size_tokens: 800,
            chunk_overlap_tokens: 200,
        }
    }
}

/// Errors returned by a remote index client.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The referenced file, index or assistant does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure, timeout, rate limit or server error.
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// The service rejected the request.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The assistant or index configuration is invalid.
    #[error("Configuration rejected: {0}")]
    Configuration(String),

    /// The response could not be decoded.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Classify an HTTP error status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            408 | 429 | 500..=599 => Self::Transient(format!("HTTP {status}: {message}")),
            _ => Self::Api { status, message },
        }
    }

    /// Whether the target was already gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Transient(_) => "transient",
            Self::Api { .. } => "api",
            Self::Configuration(_) => "configuration",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
