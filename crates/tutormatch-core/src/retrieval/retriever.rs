//! ============================================================================
//! Candidate Retriever - Criteria to ranked catalog candidates
//! ============================================================================
//! Embeds the criteria description, queries the similarity index for top-K,
//! and maps hits back through the catalog (dropping unresolvable ids).
//! Falls back to the keyword scorer when the index is unreachable or
//! returns nothing; retrieval never hard-fails the conversation.
//! ============================================================================

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use super::embeddings::Embedder;
use super::index::SimilarityIndex;
use super::keyword;
use crate::catalog::{CatalogEntry, CatalogReader};
use crate::types::{Candidate, EngineError, SearchCriteria};

/// Top-K for the single-best match flow
pub const TOP_K_BEST: u64 = 5;

/// Top-K for a "show me others" request
pub const TOP_K_OTHERS: u64 = 20;

/// Two-tier retriever: semantic first, keyword fallback
pub struct CandidateRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SimilarityIndex>,
    catalog: Arc<dyn CatalogReader>,
}

impl CandidateRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn SimilarityIndex>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
        }
    }

    /// Retrieve up to `top_k` candidates, score-descending. An empty result
    /// means nothing matched either tier; the caller must ask a clarifying
    /// question rather than presenting it as success.
    pub async fn retrieve(&self, criteria: &SearchCriteria, top_k: u64) -> Result<Vec<Candidate>> {
        match self.retrieve_semantic(criteria, top_k).await {
            Ok(candidates) if !candidates.is_empty() => {
                debug!("Semantic retrieval returned {} candidates", candidates.len());
                Ok(candidates)
            }
            Ok(_) => {
                debug!("Semantic retrieval empty, using keyword fallback");
                self.retrieve_keyword(criteria, top_k).await
            }
            Err(e) => {
                warn!("Semantic retrieval unavailable ({}), using keyword fallback", e);
                self.retrieve_keyword(criteria, top_k).await
            }
        }
    }

    /// Embed and upsert every catalog entry into the similarity index
    pub async fn index_catalog(&self, entries: &[CatalogEntry]) -> Result<usize> {
        let mut indexed = 0;
        for entry in entries {
            let vector = self.embedder.embed(&entry.describe()).await?;
            self.index.upsert(entry.id, vector).await?;
            indexed += 1;
        }
        debug!("Indexed {} catalog entries", indexed);
        Ok(indexed)
    }

    async fn retrieve_semantic(
        &self,
        criteria: &SearchCriteria,
        top_k: u64,
    ) -> Result<Vec<Candidate>> {
        let vector = self
            .embedder
            .embed(&criteria.describe())
            .await
            .map_err(|e| EngineError::EmbeddingFailed(e.to_string()))?;
        let hits = self
            .index
            .query(vector, top_k)
            .await
            .map_err(|e| EngineError::IndexUnavailable(e.to_string()))?;

        // Map ids back to catalog entries, dropping unresolvable ids
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.catalog.get(hit.entry_id).await? {
                Some(entry) => candidates.push(to_candidate(entry, hit.score.clamp(0.0, 1.0))),
                None => debug!("Dropping unresolvable index hit {}", hit.entry_id),
            }
        }
        Ok(candidates)
    }

    async fn retrieve_keyword(
        &self,
        criteria: &SearchCriteria,
        top_k: u64,
    ) -> Result<Vec<Candidate>> {
        let entries = self.catalog.all().await?;
        let ranked = keyword::rank_entries(&entries, criteria);

        Ok(ranked
            .into_iter()
            .take(top_k as usize)
            .map(|(entry, score)| to_candidate(entry.clone(), score))
            .collect())
    }
}

fn to_candidate(entry: CatalogEntry, score: f32) -> Candidate {
    Candidate {
        entry_id: entry.id,
        name: entry.name,
        topics: entry.topics,
        mode: entry.mode,
        bio: entry.bio,
        slots: entry.slots,
        score,
    }
}

/// Drop a specific entry from a candidate list, preserving order.
/// Used by the "other candidates" flow to exclude the pending match.
pub fn exclude_entry(candidates: Vec<Candidate>, entry_id: Uuid) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| c.entry_id != entry_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::retrieval::index::IndexHit;
    use crate::types::{Mode, Slot};
    use async_trait::async_trait;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 4])
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("embedding service unreachable")
        }
    }

    struct FixedIndex {
        hits: Vec<IndexHit>,
    }

    #[async_trait]
    impl SimilarityIndex for FixedIndex {
        async fn query(&self, _vector: Vec<f32>, top_k: u64) -> Result<Vec<IndexHit>> {
            Ok(self.hits.iter().take(top_k as usize).cloned().collect())
        }

        async fn upsert(&self, _entry_id: Uuid, _vector: Vec<f32>) -> Result<()> {
            Ok(())
        }
    }

    struct DownIndex;

    #[async_trait]
    impl SimilarityIndex for DownIndex {
        async fn query(&self, _vector: Vec<f32>, _top_k: u64) -> Result<Vec<IndexHit>> {
            anyhow::bail!("index unreachable")
        }

        async fn upsert(&self, _entry_id: Uuid, _vector: Vec<f32>) -> Result<()> {
            anyhow::bail!("index unreachable")
        }
    }

    fn entry(name: &str, topics: &[&str]) -> CatalogEntry {
        CatalogEntry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            mode: Mode::Online,
            bio: String::new(),
            slots: vec![Slot {
                day: "Monday".into(),
                time: "10:00".into(),
                mode: Mode::Online,
            }],
        }
    }

    #[tokio::test]
    async fn test_semantic_hits_mapped_and_sorted() {
        let a = entry("Alice", &["Python"]);
        let b = entry("Bob", &["Python"]);
        let catalog = Arc::new(InMemoryCatalog::new(vec![a.clone(), b.clone()]));

        let index = FixedIndex {
            hits: vec![
                IndexHit { entry_id: a.id, score: 0.9 },
                IndexHit { entry_id: b.id, score: 0.7 },
            ],
        };

        let retriever =
            CandidateRetriever::new(Arc::new(FixedEmbedder), Arc::new(index), catalog);
        let criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();
        let candidates = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "Alice");
        assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_unresolvable_ids_dropped() {
        let a = entry("Alice", &["Python"]);
        let catalog = Arc::new(InMemoryCatalog::new(vec![a.clone()]));

        let index = FixedIndex {
            hits: vec![
                IndexHit { entry_id: a.id, score: 0.9 },
                IndexHit { entry_id: Uuid::new_v4(), score: 0.8 },
            ],
        };

        let retriever =
            CandidateRetriever::new(Arc::new(FixedEmbedder), Arc::new(index), catalog);
        let criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();
        let candidates = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_index_down_falls_back_to_keyword() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![
            entry("Alice", &["Python"]),
            entry("Bob", &["History"]),
        ]));

        let retriever =
            CandidateRetriever::new(Arc::new(FixedEmbedder), Arc::new(DownIndex), catalog);
        let criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();
        let candidates = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Alice");
        assert!(candidates[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_embedder_down_falls_back_to_keyword() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![entry("Alice", &["Python"])]));

        let retriever = CandidateRetriever::new(
            Arc::new(DownEmbedder),
            Arc::new(FixedIndex { hits: vec![] }),
            catalog,
        );
        let criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();
        let candidates = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();

        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_anywhere_is_empty() {
        let catalog = Arc::new(InMemoryCatalog::new(vec![entry("Bob", &["History"])]));

        let retriever = CandidateRetriever::new(
            Arc::new(FixedEmbedder),
            Arc::new(FixedIndex { hits: vec![] }),
            catalog,
        );
        let criteria = SearchCriteria::new(vec!["Quantum Basketweaving".into()]).unwrap();
        let candidates = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();

        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_idempotent() {
        let a = entry("Alice", &["Python"]);
        let catalog = Arc::new(InMemoryCatalog::new(vec![a.clone()]));
        let index = Arc::new(FixedIndex {
            hits: vec![IndexHit { entry_id: a.id, score: 0.9 }],
        });

        let retriever = CandidateRetriever::new(Arc::new(FixedEmbedder), index, catalog);
        let criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();

        let first = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();
        let second = retriever.retrieve(&criteria, TOP_K_BEST).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exclude_entry() {
        let a = entry("Alice", &["Python"]);
        let b = entry("Bob", &["Python"]);
        let candidates = vec![
            to_candidate(a.clone(), 0.9),
            to_candidate(b.clone(), 0.8),
        ];

        let remaining = exclude_entry(candidates, a.id);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Bob");
    }
}
