//! ============================================================================
//! Catalog - Read access to the provider catalog
//! ============================================================================
//! The catalog itself lives elsewhere; the engine only needs two read
//! queries over it. Entries carry an insertion ordinal so that score ties
//! rank in catalog insertion order everywhere.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Mode, Slot};

/// A bookable provider record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub name: String,
    pub topics: Vec<String>,
    pub mode: Mode,
    pub bio: String,
    pub slots: Vec<Slot>,
}

impl CatalogEntry {
    /// Natural-language description used as the embedding input when
    /// indexing the catalog
    pub fn describe(&self) -> String {
        format!(
            "{}: {} tutoring, {}. {}",
            self.name,
            self.topics.join(", "),
            self.mode,
            self.bio
        )
    }
}

/// Read-only catalog access
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// All entries, in catalog insertion order
    async fn all(&self) -> anyhow::Result<Vec<CatalogEntry>>;

    /// Lookup by id; None for unresolvable ids
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<CatalogEntry>>;
}

/// In-memory catalog for demos and tests
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn all(&self) -> anyhow::Result<Vec<CatalogEntry>> {
        Ok(self.entries.clone())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<CatalogEntry>> {
        Ok(self.entries.iter().find(|e| e.id == id).cloned())
    }
}
