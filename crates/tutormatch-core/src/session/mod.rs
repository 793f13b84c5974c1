//! ============================================================================
//! Session - Durable per-conversation state container
//! ============================================================================
//! The full conversation snapshot: messages, last search, candidate list,
//! pending match, and the active booking draft. The conversation controller
//! is the only writer; the session store is the sole persistence authority.
//! ============================================================================

pub mod saver;
pub mod store;

pub use saver::SessionSaver;
pub use store::{SessionDb, SessionDbStats};

use serde::{Deserialize, Serialize};

use crate::types::{BookingDraft, BookingStep, MatchResult, SearchCriteria};

/// A single message in the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

impl Message {
    pub fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn assistant(content: String) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Conversation state derived from the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvoState {
    Idle,
    MatchPending,
    Booking(BookingStep),
}

/// The durable session snapshot.
/// Messages are append-only; insertion order IS temporal order and is
/// never re-sorted. Absent fields default on read so older snapshots
/// stay loadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pending_match: Option<MatchResult>,
    #[serde(default)]
    pub last_search: Option<SearchCriteria>,
    #[serde(default)]
    pub candidate_list: Vec<MatchResult>,
    #[serde(default)]
    pub booking_draft: Option<BookingDraft>,
    /// Captured search text awaiting an abandon-booking confirmation
    #[serde(default)]
    pub pending_interrupt: Option<String>,
    pub created_at: i64,
    pub last_active: i64,
}

impl Session {
    /// Create a fresh session for an identifier (first turn)
    pub fn new(session_id: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            session_id,
            messages: Vec::new(),
            pending_match: None,
            last_search: None,
            candidate_list: Vec::new(),
            booking_draft: None,
            pending_interrupt: None,
            created_at: now,
            last_active: now,
        }
    }

    /// Derive the controller state from the snapshot
    pub fn state(&self) -> ConvoState {
        if let Some(draft) = &self.booking_draft {
            ConvoState::Booking(draft.step)
        } else if self.pending_match.is_some() {
            ConvoState::MatchPending
        } else {
            ConvoState::Idle
        }
    }

    /// Append a user message and bump activity
    pub fn push_user(&mut self, content: String) {
        self.messages.push(Message::user(content));
        self.last_active = chrono::Utc::now().timestamp();
    }

    /// Append an empty assistant message, returning its index. The message
    /// is updated in place as the reply is produced; only the completed
    /// content is ever persisted.
    pub fn begin_assistant(&mut self) -> usize {
        self.messages.push(Message::assistant(String::new()));
        self.messages.len() - 1
    }

    /// Update a previously appended assistant message in place
    pub fn set_assistant_content(&mut self, index: usize, content: String) {
        if let Some(msg) = self.messages.get_mut(index) {
            msg.content = content;
        }
        self.last_active = chrono::Utc::now().timestamp();
    }

    /// Content of the most recent assistant message, if any
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }

    /// Promote a candidate from the shown list to the pending match,
    /// clearing the list (core invariant: at most one pending match).
    pub fn promote_candidate(&mut self, index: usize) -> bool {
        if index >= self.candidate_list.len() {
            return false;
        }
        let selected = self.candidate_list.swap_remove(index);
        self.candidate_list.clear();
        self.pending_match = Some(selected);
        true
    }

    /// Drop all match/booking state (supersession or cancellation)
    pub fn clear_match_state(&mut self) {
        self.pending_match = None;
        self.candidate_list.clear();
        self.booking_draft = None;
    }
}
