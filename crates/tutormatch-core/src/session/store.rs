//! ============================================================================
//! Session Store - Embedded database (redb)
//! ============================================================================
//! Whole-snapshot JSON values keyed by session id. One logical session id
//! maps to exactly one stored instance; writes replace the snapshot
//! wholesale, never patch it.
//! ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use tracing::{debug, info};

use super::Session;

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Embedded session database
pub struct SessionDb {
    db: Database,
    path: PathBuf,
}

/// Summary statistics over the stored sessions
#[derive(Debug, Clone)]
pub struct SessionDbStats {
    pub total_sessions: usize,
    pub with_pending_match: usize,
    pub with_active_draft: usize,
    pub state_counts: HashMap<String, usize>,
}

impl SessionDb {
    /// Open (or create) the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening session database at: {}", path.display());

        let db = Database::create(path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to create sessions table: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot for a session
    pub fn put(&self, session: &Session) -> Result<()> {
        let key = format!("sessions:{}", session.session_id);
        let value = serde_json::to_vec(session)
            .map_err(|e| anyhow!("Failed to serialize session: {}", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert session: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored session: {}", session.session_id);
        Ok(())
    }

    /// Load a session snapshot, if one exists
    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let key = format!("sessions:{}", session_id);

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(SESSIONS)
            .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;

        match table
            .get(key.as_str())
            .map_err(|e| anyhow!("Failed to get session: {}", e))?
        {
            Some(value) => {
                let session: Session = serde_json::from_slice(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize session: {}", e))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// All stored sessions
    pub fn list(&self) -> Result<Vec<Session>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(SESSIONS)
            .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate sessions: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let session: Session = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize session: {}", e))?;
            results.push(session);
        }
        Ok(results)
    }

    /// Delete a session snapshot, returning whether it existed
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let key = format!("sessions:{}", session_id);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(SESSIONS)
                .map_err(|e| anyhow!("Failed to open sessions table: {}", e))?;
            removed = table
                .remove(key.as_str())
                .map_err(|e| anyhow!("Failed to remove session: {}", e))?
                .is_some();
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Deleted session: {}", session_id);
        }
        Ok(removed)
    }

    /// Prune sessions whose last activity is older than the given number
    /// of days. Returns the number deleted.
    pub fn prune_old(&self, older_than_days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now().timestamp() - (older_than_days * 86400);
        let sessions = self.list()?;

        let mut deleted = 0;
        for session in &sessions {
            if session.last_active < cutoff && self.delete(&session.session_id)? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Pruned {} sessions older than {} days", deleted, older_than_days);
        }
        Ok(deleted)
    }

    /// Summary statistics
    pub fn stats(&self) -> Result<SessionDbStats> {
        let sessions = self.list()?;

        let mut state_counts = HashMap::new();
        for session in &sessions {
            *state_counts
                .entry(format!("{:?}", session.state()))
                .or_insert(0usize) += 1;
        }

        Ok(SessionDbStats {
            total_sessions: sessions.len(),
            with_pending_match: sessions.iter().filter(|s| s.pending_match.is_some()).count(),
            with_active_draft: sessions.iter().filter(|s| s.booking_draft.is_some()).count(),
            state_counts,
        })
    }
}
