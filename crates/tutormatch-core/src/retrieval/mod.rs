//! ============================================================================
//! Retrieval Module - Semantic matching with deterministic fallback
//! ============================================================================
//! - embeddings: OpenAI-compatible embedding client (`Embedder` trait)
//! - index: qdrant-backed similarity index (`SimilarityIndex` trait)
//! - keyword: pure fallback scorer for when retrieval is unavailable
//! - retriever: two-tier orchestration, criteria in, candidates out
//! ============================================================================

pub mod embeddings;
pub mod index;
pub mod keyword;
pub mod retriever;

pub use embeddings::{Embedder, OpenAiEmbedder, EMBEDDING_DIM};
pub use index::{IndexHit, QdrantIndex, SimilarityIndex};
pub use retriever::{CandidateRetriever, TOP_K_BEST, TOP_K_OTHERS};
