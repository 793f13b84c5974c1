//! ============================================================================
//! Engine Configuration
//! ============================================================================
//! Collected from environment variables (load a .env first via dotenvy in
//! the binary). Every external dependency is optional; missing ones route
//! the engine onto its documented fallback paths.
//! ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Default timeout for embedding/reasoning/finalization calls
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 15;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// API key for the OpenAI-compatible embedding/reasoning endpoint
    pub api_key: Option<String>,
    /// Base URL for the embedding/reasoning endpoint
    pub api_base_url: String,
    /// Embedding model name
    pub embedding_model: String,
    /// Chat model used by the match reasoner
    pub chat_model: String,
    /// Qdrant URL for the similarity index
    pub qdrant_url: Option<String>,
    /// Session database path (default: ~/.tutormatch/sessions.redb)
    pub db_path: Option<PathBuf>,
    /// Bound on all external calls
    pub call_timeout: Duration,
}

impl EngineConfig {
    /// Read configuration from the environment
    pub fn from_env() -> Result<Self> {
        let timeout_secs = match std::env::var("TUTORMATCH_CALL_TIMEOUT_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|e| anyhow!("Invalid TUTORMATCH_CALL_TIMEOUT_SECS: {}", e))?,
            Err(_) => DEFAULT_CALL_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key: std::env::var("TUTORMATCH_API_KEY").ok().filter(|k| !k.is_empty()),
            api_base_url: std::env::var("TUTORMATCH_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: std::env::var("TUTORMATCH_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            chat_model: std::env::var("TUTORMATCH_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            qdrant_url: std::env::var("TUTORMATCH_QDRANT_URL").ok().filter(|u| !u.is_empty()),
            db_path: std::env::var("TUTORMATCH_DB_PATH").ok().map(PathBuf::from),
            call_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Resolve the session database path, creating the data directory
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(p) = &self.db_path {
            return Ok(p.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        let data_dir = home.join(".tutormatch");
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| anyhow!("Failed to create data directory: {}", e))?;
        Ok(data_dir.join("sessions.redb"))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            qdrant_url: None,
            db_path: None,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}
