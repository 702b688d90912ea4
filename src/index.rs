use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    vectors_config, CreateCollectionBuilder, Distance, PointId, PointStruct, UpsertPointsBuilder,
    Value, VectorParams, VectorParamsMap, VectorsConfig,
};
use qdrant_client::Qdrant;
use serde_json::json;
use std::collections::HashMap;
use std::env;

use crate::embeddings::{EmbeddedChunk, EMBEDDING_DIMENSIONS};

// The index schema stores the vector under both names; queries run against
// `content_vector`.
const EMBEDDING_FIELD: &str = "embedding";
const CONTENT_VECTOR_FIELD: &str = "content_vector";

/// The subset of an embedded chunk the index schema accepts. `source` and
/// `chunk_index` are stripped at conversion.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub content_vector: Vec<f32>,
}

impl From<&EmbeddedChunk> for IndexedDocument {
    fn from(chunk: &EmbeddedChunk) -> Self {
        IndexedDocument {
            id: chunk.id.to_string(),
            content: chunk.content.clone(),
            embedding: chunk.embedding.clone(),
            content_vector: chunk.content_vector.clone(),
        }
    }
}

/// One search hit, most-similar first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector store request failed: {0}")]
    Backend(#[from] qdrant_client::QdrantError),
    #[error("index rejected document: {0}")]
    Rejected(String),
}

/// Trait for the vector store boundary.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Persist one document. Callers decide how to react to failures.
    async fn upload(&self, document: IndexedDocument) -> Result<(), IndexError>;

    /// Return the `limit` nearest chunks for `vector`, best first.
    async fn search(&self, vector: Vec<f32>, limit: u64)
        -> Result<Vec<RetrievedChunk>, IndexError>;
}

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        use anyhow::Context;

        let url = env::var("QDRANT_URL").context("QDRANT_URL is not set")?;
        let api_key = env::var("QDRANT_API_KEY").ok();
        let collection = env::var("QDRANT_COLLECTION").context("QDRANT_COLLECTION is not set")?;

        Ok(QdrantConfig {
            url,
            api_key,
            collection,
        })
    }
}

/// Qdrant-backed vector index
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder.build()?;

        Ok(QdrantIndex {
            client,
            collection: config.collection,
        })
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool, IndexError> {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(IndexError::Backend(e)),
        }
    }

    /// Create the collection on first use, with one named vector per schema
    /// field the index stores.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let mut params = HashMap::new();
        for field in [EMBEDDING_FIELD, CONTENT_VECTOR_FIELD] {
            params.insert(
                field.to_string(),
                VectorParams {
                    size: EMBEDDING_DIMENSIONS as u64,
                    distance: Distance::Cosine.into(),
                    ..Default::default()
                },
            );
        }

        let create_collection = CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorsConfig {
                config: Some(vectors_config::Config::ParamsMap(VectorParamsMap {
                    map: params,
                })),
            });

        self.client.create_collection(create_collection).await?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upload(&self, document: IndexedDocument) -> Result<(), IndexError> {
        let payload: HashMap<String, Value> = serde_json::from_value(json!({
            "content": document.content,
        }))
        .unwrap();

        let vectors: HashMap<String, Vec<f32>> = HashMap::from([
            (EMBEDDING_FIELD.to_string(), document.embedding),
            (CONTENT_VECTOR_FIELD.to_string(), document.content_vector),
        ]);

        let point = PointStruct::new(document.id, vectors, payload);

        let upsert_request = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).build();

        self.client.upsert_points(upsert_request).await?;

        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        use qdrant_client::qdrant::{with_payload_selector, SearchPoints, WithPayloadSelector};

        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector,
            vector_name: Some(CONTENT_VECTOR_FIELD.to_string()),
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self.client.search_points(search_request).await?;

        let chunks = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let id = scored_point.id.and_then(point_id_to_string);
                let content = scored_point
                    .payload
                    .get("content")
                    .and_then(|value| value.as_str())
                    .map(|text| text.to_string());

                match (id, content) {
                    (Some(id), Some(content)) => Some(RetrievedChunk {
                        id,
                        content,
                        score: scored_point.score,
                    }),
                    _ => {
                        warn!("Skipping search hit without id or content payload");
                        None
                    }
                }
            })
            .collect();

        Ok(chunks)
    }
}

fn point_id_to_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(value) => Some(value),
        PointIdOptions::Num(value) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn indexed_document_strips_provenance_fields() {
        let chunk = EmbeddedChunk {
            id: Uuid::new_v4(),
            source: "report.pdf".to_string(),
            chunk_index: 7,
            content: "body".to_string(),
            embedding: vec![0.5, 0.5],
            content_vector: vec![0.5, 0.5],
        };

        let document = IndexedDocument::from(&chunk);
        assert_eq!(document.id, chunk.id.to_string());
        assert_eq!(document.content, "body");
        assert_eq!(document.embedding, chunk.embedding);
        assert_eq!(document.content_vector, chunk.content_vector);
    }

    #[test]
    fn point_ids_map_back_to_strings() {
        let uuid_id = PointId {
            point_id_options: Some(PointIdOptions::Uuid("abc-123".to_string())),
        };
        assert_eq!(point_id_to_string(uuid_id).unwrap(), "abc-123");

        let numeric_id = PointId {
            point_id_options: Some(PointIdOptions::Num(42)),
        };
        assert_eq!(point_id_to_string(numeric_id).unwrap(), "42");

        let empty_id = PointId {
            point_id_options: None,
        };
        assert!(point_id_to_string(empty_id).is_none());
    }
}
