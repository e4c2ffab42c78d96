//! Remote document index and assistant API.
//!
//! The sync core talks to the hosted index only through the [`RemoteIndex`]
//! trait, so it can run against the in-memory fake in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Sync executor   │
//! │ (retire/upload)  │
//! └────────┬─────────┘
//!          │ RemoteIndex
//!     ┌────┴──────┐
//!     ▼           ▼
//! ┌────────┐ ┌──────────┐
//! │ OpenAI │ │ InMemory │
//! └────────┘ └──────────┘
//!     │
//!     ▼
//!   HTTPS
//! ```
//!
//! Every HTTP call is bounded by the client timeout. Nothing is retried at
//! this layer.

pub mod memory;
pub mod openai;
pub mod types;

use std::future::Future;

pub use memory::{InMemoryIndex, RemoteCall};
pub use openai::OpenAiClient;
pub use types::{
    AssistantSettings, ChunkingStrategy, DEFAULT_INSTRUCTIONS, RemoteError, RemoteResult,
};

/// Capability interface over the hosted document index.
///
/// Implemented by [`OpenAiClient`] and [`InMemoryIndex`].
pub trait RemoteIndex: Send + Sync {
    /// Upload a document; returns the remote file id.
    fn upload_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = RemoteResult<String>> + Send;

    /// Delete an uploaded file.
    fn delete_file(&self, file_id: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Add an uploaded file to an index.
    fn attach_file(
        &self,
        index_id: &str,
        file_id: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Remove a file from an index without deleting it.
    fn detach_file(
        &self,
        index_id: &str,
        file_id: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Point an existing assistant at an index with the given settings.
    ///
    /// Fails with [`RemoteError::Configuration`] if the assistant or the
    /// index does not exist.
    fn configure_assistant(
        &self,
        assistant_id: &str,
        settings: &AssistantSettings,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Create an index with a static chunking strategy; returns its id.
    fn create_index(
        &self,
        name: &str,
        chunking: ChunkingStrategy,
    ) -> impl Future<Output = RemoteResult<String>> + Send;

    /// Create an assistant; returns its id.
    fn create_assistant(
        &self,
        settings: &AssistantSettings,
    ) -> impl Future<Output = RemoteResult<String>> + Send;
}
