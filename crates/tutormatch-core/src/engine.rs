//! ============================================================================
//! Match Engine - Session lifecycle around the conversation controller
//! ============================================================================
//! Owns the session cache, the durable store, and the debounced saver.
//! Each turn loads (or creates) the session snapshot, runs the controller
//! on a clone, and commits the result atomically: cache update plus a
//! persistence enqueue. A turn superseded by a newer one for the same
//! session is discarded instead of committed, so the newest turn always
//! wins.
//! ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::booking_site::BookingAutomation;
use crate::catalog::CatalogReader;
use crate::convo::ConversationController;
use crate::reasoner::Reasoner;
use crate::retrieval::CandidateRetriever;
use crate::session::saver::DEFAULT_FLUSH_INTERVAL;
use crate::session::{Session, SessionDb, SessionSaver};
use crate::types::{EngineError, TurnReply};

pub struct MatchEngine {
    controller: ConversationController,
    db: Arc<SessionDb>,
    saver: Arc<SessionSaver>,
    /// In-memory source of truth between flushes
    sessions: Mutex<HashMap<String, Session>>,
    /// Per-session turn counter for discarding superseded results
    turn_seq: Mutex<HashMap<String, u64>>,
}

impl MatchEngine {
    pub fn new(
        db: Arc<SessionDb>,
        retriever: CandidateRetriever,
        reasoner: Option<Arc<dyn Reasoner>>,
        catalog: Arc<dyn CatalogReader>,
        automation: Arc<dyn BookingAutomation>,
    ) -> Self {
        Self::with_flush_interval(db, retriever, reasoner, catalog, automation, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_flush_interval(
        db: Arc<SessionDb>,
        retriever: CandidateRetriever,
        reasoner: Option<Arc<dyn Reasoner>>,
        catalog: Arc<dyn CatalogReader>,
        automation: Arc<dyn BookingAutomation>,
        flush_interval: Duration,
    ) -> Self {
        let saver = SessionSaver::new(db.clone(), flush_interval);
        Self {
            controller: ConversationController::new(retriever, reasoner, catalog, automation),
            db,
            saver,
            sessions: Mutex::new(HashMap::new()),
            turn_seq: Mutex::new(HashMap::new()),
        }
    }

    /// Process one user turn for a session, committing the resulting
    /// snapshot unless a newer turn for the same session supersedes it.
    pub async fn turn(&self, session_id: &str, text: &str) -> Result<TurnReply> {
        let session = self.load_session(session_id).await?;
        let seq = self.bump_seq(session_id).await;

        let (updated, reply) = self.controller.handle_turn(&session, text).await;

        if self.current_seq(session_id).await != seq {
            debug!("Discarding superseded turn result for {}", session_id);
            return Ok(reply);
        }

        self.sessions
            .lock()
            .await
            .insert(session_id.to_string(), updated.clone());
        self.saver.enqueue(updated).await;
        Ok(reply)
    }

    /// Like `turn`, but also streams the reply as whitespace-delimited
    /// content deltas over the channel before returning the completed
    /// reply. The transcript only ever stores the completed content.
    pub async fn turn_streamed(
        &self,
        session_id: &str,
        text: &str,
        deltas: mpsc::Sender<String>,
    ) -> Result<TurnReply> {
        let reply = self.turn(session_id, text).await?;

        let mut chunk = String::new();
        for word in reply.reply.split_inclusive(char::is_whitespace) {
            chunk.push_str(word);
            if chunk.len() >= 24 {
                if deltas.send(std::mem::take(&mut chunk)).await.is_err() {
                    break; // receiver gone, reply already committed
                }
            }
        }
        if !chunk.is_empty() {
            let _ = deltas.send(chunk).await;
        }

        Ok(reply)
    }

    /// Current snapshot for a session: cache first, then the store
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        if let Some(session) = self.sessions.lock().await.get(session_id) {
            return Ok(Some(session.clone()));
        }
        self.db.get(session_id)
    }

    /// Flush any pending snapshots to the store immediately
    pub async fn flush(&self) -> Result<()> {
        self.saver.flush_now().await
    }

    async fn load_session(&self, session_id: &str) -> Result<Session> {
        if session_id.trim().is_empty() {
            return Err(anyhow!("session id must not be empty"));
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(session_id) {
            return Ok(session.clone());
        }

        let session = match self
            .db
            .get(session_id)
            .map_err(|e| EngineError::StoreFailed(e.to_string()))?
        {
            Some(stored) => {
                debug!("Restored session {} from store", session_id);
                stored
            }
            None => {
                info!("Starting new session: {}", session_id);
                Session::new(session_id.to_string())
            }
        };
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    async fn bump_seq(&self, session_id: &str) -> u64 {
        let mut seqs = self.turn_seq.lock().await;
        let seq = seqs.entry(session_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    async fn current_seq(&self, session_id: &str) -> u64 {
        *self
            .turn_seq
            .lock()
            .await
            .get(session_id)
            .unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_site::LoggingBookingAutomation;
    use crate::catalog::{CatalogEntry, InMemoryCatalog};
    use tokio::sync::Semaphore;
    use crate::retrieval::index::IndexHit;
    use crate::retrieval::{Embedder, SimilarityIndex};
    use crate::types::{Mode, Slot};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("offline")
        }
    }

    struct DownIndex;

    #[async_trait]
    impl SimilarityIndex for DownIndex {
        async fn query(&self, _vector: Vec<f32>, _top_k: u64) -> Result<Vec<IndexHit>> {
            anyhow::bail!("offline")
        }
        async fn upsert(&self, _entry_id: Uuid, _vector: Vec<f32>) -> Result<()> {
            anyhow::bail!("offline")
        }
    }

    fn sample_catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new(vec![CatalogEntry {
            id: Uuid::new_v4(),
            name: "Alice Chen".into(),
            topics: vec!["Python".into()],
            mode: Mode::Online,
            bio: "Python tutor".into(),
            slots: vec![Slot {
                day: "Monday".into(),
                time: "10:00".into(),
                mode: Mode::Online,
            }],
        }]))
    }

    fn offline_engine(db: Arc<SessionDb>) -> MatchEngine {
        let catalog = sample_catalog();
        let retriever = CandidateRetriever::new(
            Arc::new(DownEmbedder),
            Arc::new(DownIndex),
            catalog.clone(),
        );
        MatchEngine::with_flush_interval(
            db,
            retriever,
            None,
            catalog,
            Arc::new(LoggingBookingAutomation),
            Duration::from_millis(10),
        )
    }

    fn open_temp() -> (Arc<SessionDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(SessionDb::open(&dir.path().join("sessions.redb")).unwrap());
        (db, dir)
    }

    #[tokio::test]
    async fn test_turn_creates_and_persists_session() {
        let (db, _dir) = open_temp();
        let engine = offline_engine(db.clone());

        let reply = engine.turn("s1", "I want to learn Python").await.unwrap();
        assert!(reply.done);
        assert!(reply.reply.contains("Alice Chen"));

        engine.flush().await.unwrap();
        let stored = db.get("s1").unwrap().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert!(stored.pending_match.is_some());
    }

    #[tokio::test]
    async fn test_session_survives_engine_restart() {
        let (db, _dir) = open_temp();
        {
            let engine = offline_engine(db.clone());
            engine.turn("s1", "I want to learn Python").await.unwrap();
            engine.flush().await.unwrap();
        }

        // Fresh engine over the same store resumes mid-conversation
        let engine = offline_engine(db.clone());
        let reply = engine.turn("s1", "yes, book it").await.unwrap();
        assert!(reply.reply.contains("name and email"));

        let session = engine.session("s1").await.unwrap().unwrap();
        assert!(session.booking_draft.is_some());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (db, _dir) = open_temp();
        let engine = offline_engine(db);

        engine.turn("a", "I want to learn Python").await.unwrap();
        engine.turn("b", "hello").await.unwrap();

        let a = engine.session("a").await.unwrap().unwrap();
        let b = engine.session("b").await.unwrap().unwrap();
        assert!(a.pending_match.is_some());
        assert!(b.pending_match.is_none());
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let (db, _dir) = open_temp();
        let engine = offline_engine(db);
        assert!(engine.turn("  ", "hello").await.is_err());
    }

    /// Catalog whose reads block until permits are released, for holding a
    /// turn's external calls open while a newer turn runs.
    struct GatedCatalog {
        entries: Vec<CatalogEntry>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl crate::catalog::CatalogReader for GatedCatalog {
        async fn all(&self) -> Result<Vec<CatalogEntry>> {
            let _permit = self.gate.acquire().await?;
            Ok(self.entries.clone())
        }

        async fn get(&self, id: Uuid) -> Result<Option<CatalogEntry>> {
            let _permit = self.gate.acquire().await?;
            Ok(self.entries.iter().find(|e| e.id == id).cloned())
        }
    }

    #[tokio::test]
    async fn test_superseded_turn_is_not_committed() {
        let (db, _dir) = open_temp();
        let gate = Arc::new(Semaphore::new(0));
        let catalog = Arc::new(GatedCatalog {
            entries: sample_catalog().all().await.unwrap(),
            gate: gate.clone(),
        });
        let retriever = CandidateRetriever::new(
            Arc::new(DownEmbedder),
            Arc::new(DownIndex),
            catalog.clone(),
        );
        let engine = Arc::new(MatchEngine::with_flush_interval(
            db,
            retriever,
            None,
            catalog,
            Arc::new(LoggingBookingAutomation),
            Duration::from_millis(10),
        ));

        // First turn blocks inside its catalog read
        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.turn("s1", "I want to learn Python").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Newer turn for the same session completes without the catalog
        let reply = engine.turn("s1", "hello").await.unwrap();
        assert!(reply.reply.contains("Hi!"));

        // Unblock the first turn; it still replies but its snapshot loses
        gate.add_permits(16);
        let stale = slow.await.unwrap().unwrap();
        assert!(stale.done);

        let session = engine.session("s1").await.unwrap().unwrap();
        assert!(session.pending_match.is_none());
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_streamed_deltas_reassemble_reply() {
        let (db, _dir) = open_temp();
        let engine = offline_engine(db);

        let (tx, mut rx) = mpsc::channel(64);
        let reply = engine
            .turn_streamed("s1", "I want to learn Python", tx)
            .await
            .unwrap();

        let mut assembled = String::new();
        while let Some(delta) = rx.recv().await {
            assembled.push_str(&delta);
        }
        assert_eq!(assembled, reply.reply);
    }
}
