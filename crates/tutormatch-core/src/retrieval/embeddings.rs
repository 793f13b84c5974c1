//! ============================================================================
//! Embedding Service - Vector embeddings for semantic retrieval
//! ============================================================================
//! Generates text embeddings via an OpenAI-compatible API. Sits behind the
//! `Embedder` trait so the retriever takes an injected handle rather than a
//! process-global client.
//! ============================================================================

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Expected embedding dimension for text-embedding-3-small
pub const EMBEDDING_DIM: usize = 1536;

/// Text-to-vector capability
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding client for an OpenAI-compatible endpoint
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiEmbedder {
    /// Create a new embedding client. All requests are bounded by `timeout`.
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    /// Generate embeddings for multiple texts, in input order
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!("Embedding API error ({}): {}", status, error.error.message));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {}", e))?;

        let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }
}
