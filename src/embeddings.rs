use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

use crate::chunking::Chunk;

/// Dimensionality of the embedding space. Every vector in one index must
/// come from the same model.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// A chunk together with its embedding, as written to
/// `chunks_embeddings.json`. The index schema carries the vector under two
/// names, so the record does too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: Uuid,
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub content_vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, embedding: Embedding) -> Self {
        EmbeddedChunk {
            id: chunk.id,
            source: chunk.source,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
            content_vector: embedding.values.clone(),
            embedding: embedding.values,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: missing {0}")]
    Malformed(&'static str),
}

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Map `text` to a fixed-length vector. One network call per text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
}

/// Configuration for the embeddings deployment
#[derive(Clone)]
pub struct EmbeddingsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl EmbeddingsConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(EmbeddingsConfig {
            endpoint: env::var("AZURE_OPENAI_EMBEDDINGS_ENDPOINT")
                .context("AZURE_OPENAI_EMBEDDINGS_ENDPOINT is not set")?,
            api_key: env::var("AZURE_OPENAI_EMBEDDINGS_KEY")
                .context("AZURE_OPENAI_EMBEDDINGS_KEY is not set")?,
            deployment: env::var("AZURE_OPENAI_EMBEDDINGS_DEPLOYMENT")
                .context("AZURE_OPENAI_EMBEDDINGS_DEPLOYMENT is not set")?,
            api_version: env::var("AZURE_OPENAI_EMBEDDINGS_API_VERSION")
                .context("AZURE_OPENAI_EMBEDDINGS_API_VERSION is not set")?,
        })
    }
}

/// Client for the embeddings API
#[derive(Clone)]
pub struct EmbeddingsClient {
    config: EmbeddingsConfig,
    client: reqwest::Client,
}

impl EmbeddingsClient {
    /// Create a new embeddings client
    pub fn new(config: EmbeddingsConfig) -> Self {
        let client = reqwest::Client::new();
        EmbeddingsClient { config, client }
    }

    fn request_url(&self) -> String {
        format!(
            "{}openai/deployments/{}/embeddings?api-version={}",
            self.config.endpoint, self.config.deployment, self.config.api_version
        )
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Validate the response shape before use.
fn extract_embedding(response: EmbeddingResponse) -> Result<Embedding, EmbeddingError> {
    response
        .data
        .into_iter()
        .next()
        .map(|data| Embedding {
            values: data.embedding,
        })
        .ok_or(EmbeddingError::Malformed("data[0].embedding"))
}

#[async_trait]
impl Embedder for EmbeddingsClient {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let request = EmbeddingRequest { input: text };

        let response = self
            .client
            .post(self.request_url())
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::Api { status, body });
        }

        let response_data: EmbeddingResponse = response.json().await?;
        extract_embedding(response_data)
    }
}
