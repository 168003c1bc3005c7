//! Embedding collaborator: text → fixed-dimension vector.
//!
//! The index and retrieval code depend only on the [`Embedder`] trait, so
//! tests run against a deterministic fake and the production binary plugs in
//! [`OpenAiEmbedder`], a thin client for any OpenAI-compatible `/embeddings`
//! endpoint. Dimensionality is fixed by the collaborator; the trait does not
//! police it; the index does, because that is where a mismatch becomes a
//! correctness problem.

use crate::error::KbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Turns text into a fixed-length numeric vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text. The returned dimensionality must be identical across
    /// every call used to build and query one index.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError>;
}

/// Client for OpenAI-compatible embedding endpoints.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Build a client for `{base_url}/embeddings`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, KbError> {
        let api_key = api_key.into();
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(KbError::InvalidConfig("missing embedding API key".into()));
        }
        if model.trim().is_empty() {
            return Err(KbError::InvalidConfig("missing embedding model name".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KbError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
        })
    }

    /// Client configured from `EMBEDDING_API_KEY` / `OPENAI_API_KEY` and
    /// optional `EMBEDDING_BASE_URL`, `EMBEDDING_MODEL` overrides.
    pub fn from_env() -> Result<Self, KbError> {
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| KbError::ProviderNotConfigured {
                provider: "embedding".into(),
                hint: "Set EMBEDDING_API_KEY or OPENAI_API_KEY.".into(),
            })?;
        let base_url = std::env::var("EMBEDDING_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        Self::new(api_key, &base_url, model, Duration::from_secs(30))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KbError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| KbError::Collaborator {
                collaborator: "embedding",
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(KbError::Collaborator {
                collaborator: "embedding",
                detail: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| KbError::Collaborator {
                collaborator: "embedding",
                detail: format!("malformed response: {e}"),
            })?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| KbError::Collaborator {
                collaborator: "embedding",
                detail: "response contained no embedding".into(),
            })?;

        debug!("Embedded {} chars → {} dims", text.len(), vector.len());
        Ok(vector)
    }
}
