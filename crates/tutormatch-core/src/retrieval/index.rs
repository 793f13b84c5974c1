//! ============================================================================
//! Similarity Index - Qdrant vector database operations
//! ============================================================================
//! Stores one vector per catalog entry and answers top-K queries by cosine
//! similarity. Behind the `SimilarityIndex` trait so the retriever takes an
//! injected handle (no process-global index client).
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::embeddings::EMBEDDING_DIM;

/// Collection name for catalog entry vectors
pub const COLLECTION_NAME: &str = "tutormatch_catalog";

/// A scored hit returned from the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub entry_id: Uuid,
    pub score: f32,
}

/// Vector index over catalog entries
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Top-K entries by similarity to the query vector, score-descending
    async fn query(&self, vector: Vec<f32>, top_k: u64) -> Result<Vec<IndexHit>>;

    /// Insert or replace the vector for a catalog entry
    async fn upsert(&self, entry_id: Uuid, vector: Vec<f32>) -> Result<()>;
}

/// Qdrant-backed similarity index
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to Qdrant and ensure the catalog collection exists
    pub async fn new(url: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        let index = Self { client };
        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(COLLECTION_NAME)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if !exists {
            info!("Creating collection: {}", COLLECTION_NAME);

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                        VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| anyhow!("Failed to create collection: {}", e))?;
        } else {
            debug!("Collection {} already exists", COLLECTION_NAME);
        }

        Ok(())
    }

    /// Check if the index is reachable
    pub async fn health_check(&self) -> Result<bool> {
        Ok(self.client.health_check().await.is_ok())
    }
}

#[async_trait]
impl SimilarityIndex for QdrantIndex {
    async fn query(&self, vector: Vec<f32>, top_k: u64) -> Result<Vec<IndexHit>> {
        let search_result = self
            .client
            .search_points(SearchPointsBuilder::new(COLLECTION_NAME, vector, top_k))
            .await
            .map_err(|e| anyhow!("Failed to query index: {}", e))?;

        let hits: Vec<IndexHit> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let entry_id = extract_uuid_from_point_id(point.id?)?;
                Some(IndexHit {
                    entry_id,
                    score: point.score,
                })
            })
            .collect();

        debug!("Index returned {} hits", hits.len());
        Ok(hits)
    }

    async fn upsert(&self, entry_id: Uuid, vector: Vec<f32>) -> Result<()> {
        let payload: HashMap<String, Value> =
            [("entry_id".to_string(), Value::from(entry_id.to_string()))]
                .into_iter()
                .collect();

        let point = PointStruct::new(entry_id.to_string(), vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, vec![point]))
            .await
            .map_err(|e| anyhow!("Failed to upsert entry vector: {}", e))?;

        debug!("Upserted vector for entry {}", entry_id);
        Ok(())
    }
}

// Helper to extract UUID from PointId
fn extract_uuid_from_point_id(point_id: qdrant_client::qdrant::PointId) -> Option<Uuid> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok(),
        PointIdOptions::Num(_) => None, // Entry ids are UUID strings, not numeric
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require a running Qdrant instance

    #[tokio::test]
    #[ignore]
    async fn test_upsert_and_query() {
        let index = QdrantIndex::new("http://localhost:6334").await.unwrap();

        let id = Uuid::new_v4();
        index.upsert(id, vec![0.1; EMBEDDING_DIM]).await.unwrap();

        let hits = index.query(vec![0.1; EMBEDDING_DIM], 5).await.unwrap();
        assert!(hits.iter().any(|h| h.entry_id == id));
    }
}
