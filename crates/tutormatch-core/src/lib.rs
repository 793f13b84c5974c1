//! ============================================================================
//! TUTORMATCH-CORE: The matching-and-booking engine
//! ============================================================================
//! This crate holds all backend logic for TutorMatch:
//! - Retrieval-augmented matching (embeddings + qdrant, keyword fallback)
//! - Match reasoning over a shortlist via chat completions
//! - The conversation controller and its multi-step booking flow
//! - Durable session snapshots in redb with debounced write-coalescing
//! ============================================================================

pub mod booking_site;
pub mod catalog;
pub mod config;
pub mod convo;
pub mod engine;
pub mod reasoner;
pub mod retrieval;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use booking_site::{BookingAutomation, LoggingBookingAutomation};
pub use catalog::{CatalogEntry, CatalogReader, InMemoryCatalog};
pub use config::EngineConfig;
pub use convo::ConversationController;
pub use engine::MatchEngine;
pub use reasoner::{MatchSelector, OpenAiReasoner, Reasoner};
pub use retrieval::{CandidateRetriever, Embedder, OpenAiEmbedder, QdrantIndex, SimilarityIndex};
pub use session::{Session, SessionDb, SessionSaver};
pub use types::*;
