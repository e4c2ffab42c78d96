//! OpenAI files, vector stores and assistants API client.
//!
//! Uses the v2 Assistants API with the `file_search` tool. Each request is
//! bounded by the client-wide timeout and never retried here.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::RemoteIndex;
use super::types::{AssistantSettings, ChunkingStrategy, RemoteError, RemoteResult};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum characters of an error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// OpenAI-backed [`RemoteIndex`].
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Any API object; we only need its id.
#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

/// Error envelope returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and map non-success statuses to [`RemoteError`].
    async fn send(request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY_CHARS).collect());
        Err(RemoteError::from_status(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> RemoteResult<T> {
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl RemoteIndex for OpenAiClient {
    async fn upload_file(&self, name: &str, bytes: Vec<u8>) -> RemoteResult<String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("text/markdown")?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let uploaded: ObjectRef =
            Self::send_json(self.request(Method::POST, "/files").multipart(form)).await?;
        debug!(name, file_id = %uploaded.id, "Uploaded file");
        Ok(uploaded.id)
    }

    async fn delete_file(&self, file_id: &str) -> RemoteResult<()> {
        Self::send(self.request(Method::DELETE, &format!("/files/{file_id}"))).await?;
        Ok(())
    }

    async fn attach_file(&self, index_id: &str, file_id: &str) -> RemoteResult<()> {
        let request = self
            .request(Method::POST, &format!("/vector_stores/{index_id}/files"))
            .json(&json!({ "file_id": file_id }));
        Self::send(request).await?;
        Ok(())
    }

    async fn detach_file(&self, index_id: &str, file_id: &str) -> RemoteResult<()> {
        let path = format!("/vector_stores/{index_id}/files/{file_id}");
        Self::send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn configure_assistant(
        &self,
        assistant_id: &str,
        settings: &AssistantSettings,
    ) -> RemoteResult<()> {
        // The update endpoint does not check the vector store; fetch it first.
        let store = format!("/vector_stores/{}", settings.index_id);
        Self::send(self.request(Method::GET, &store))
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(msg) | RemoteError::Api { message: msg, .. } => {
                    RemoteError::Configuration(format!(
                        "vector store {} unavailable: {msg}",
                        settings.index_id
                    ))
                }
                other => other,
            })?;

        let request = self
            .request(Method::POST, &format!("/assistants/{assistant_id}"))
            .json(&assistant_body(settings));
        Self::send(request).await.map_err(|e| match e {
            RemoteError::NotFound(msg) | RemoteError::Api { message: msg, .. } => {
                RemoteError::Configuration(format!("assistant {assistant_id}: {msg}"))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn create_index(&self, name: &str, chunking: ChunkingStrategy) -> RemoteResult<String> {
        let request = self.request(Method::POST, "/vector_stores").json(&json!({
            "name": name,
            "chunking_strategy": {
                "type": "static",
                "static": {
                    "max_chunk_size_tokens": chunking.max_chunk_size_tokens,
                    "chunk_overlap_tokens": chunking.chunk_overlap_tokens,
                },
            },
        }));
        let created: ObjectRef = Self::send_json(request).await?;
        Ok(created.id)
    }

    async fn create_assistant(&self, settings: &AssistantSettings) -> RemoteResult<String> {
        let request = self
            .request(Method::POST, "/assistants")
            .json(&assistant_body(settings));
        let created: ObjectRef = Self::send_json(request).await?;
        Ok(created.id)
    }
}

/// Request body shared by assistant create and update.
fn assistant_body(settings: &AssistantSettings) -> serde_json::Value {
    let mut body = json!({
        "model": settings.model,
        "instructions": settings.instructions,
        "tools": [{ "type": "file_search" }],
        "tool_resources": {
            "file_search": { "vector_store_ids": [settings.index_id] }
        },
    });
    if let Some(name) = &settings.name {
        body["name"] = serde_json::Value::String(name.clone());
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AssistantSettings {
        AssistantSettings {
            name: None,
            model: "gpt-4o-mini".into(),
            instructions: "Be brief.".into(),
            index_id: "vs_1".into(),
        }
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = OpenAiClient::new(
            "sk-test",
            Some("http://localhost:8080/v1/".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_client_default_base_url() {
        let client = OpenAiClient::new("sk-test", Some("  ".into()), Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_assistant_body_attaches_index() {
        let body = assistant_body(&settings());

        assert_eq!(body["tools"][0]["type"], "file_search");
        assert_eq!(body["tool_resources"]["file_search"]["vector_store_ids"][0], "vs_1");
        assert!(body.get("name").is_none());
    }

    #[test]
    fn test_assistant_body_with_name() {
        let mut settings = settings();
        settings.name = Some("OptiBot".into());

        assert_eq!(assistant_body(&settings)["name"], "OptiBot");
    }
}
