//! ============================================================================
//! Session Saver - Debounced write-coalescing persistence queue
//! ============================================================================
//! Rapid state mutations (streaming tokens, multi-field updates) enqueue
//! snapshot versions; enqueueing while a flush is pending simply replaces
//! "latest" for that session. A single drain task flushes the newest
//! version per session after a short idle interval. The in-memory snapshot
//! is the source of truth between flushes; a crash loses only the
//! unflushed delta, never corrupts stored state.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::{Session, SessionDb};

/// Default idle interval before pending snapshots are flushed
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(300);

/// Write-coalescing queue in front of the session database
pub struct SessionSaver {
    db: Arc<SessionDb>,
    pending: Arc<Mutex<HashMap<String, Session>>>,
    notify: Arc<Notify>,
}

impl SessionSaver {
    /// Create the saver and spawn its single drain task
    pub fn new(db: Arc<SessionDb>, flush_interval: Duration) -> Arc<Self> {
        let saver = Arc::new(Self {
            db,
            pending: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
        });

        let drain = saver.clone();
        tokio::spawn(async move {
            loop {
                drain.notify.notified().await;
                tokio::time::sleep(flush_interval).await;
                if let Err(e) = drain.flush_now().await {
                    warn!("Session flush failed: {}", e);
                }
            }
        });

        saver
    }

    /// Enqueue a snapshot version. Replaces any not-yet-flushed version
    /// for the same session id.
    pub async fn enqueue(&self, session: Session) {
        let mut pending = self.pending.lock().await;
        pending.insert(session.session_id.clone(), session);
        drop(pending);
        self.notify.notify_one();
    }

    /// Flush all pending snapshots immediately (newest version per session)
    pub async fn flush_now(&self) -> Result<()> {
        let drained: Vec<Session> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, s)| s).collect()
        };

        if drained.is_empty() {
            return Ok(());
        }

        debug!("Flushing {} session snapshot(s)", drained.len());
        for session in drained {
            self.db.put(&session)?;
        }
        Ok(())
    }

    /// Number of snapshots waiting to be flushed
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
