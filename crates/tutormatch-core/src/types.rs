//! ============================================================================
//! Core Types for TutorMatch
//! ============================================================================
//! Defines search criteria, catalog candidates, match results, and the
//! multi-step booking draft collected across conversation turns.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery mode for a tutoring slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Online,
    InPerson,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Online => write!(f, "online"),
            Mode::InPerson => write!(f, "in-person"),
        }
    }
}

/// A bookable time slot offered by a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Weekday name, e.g. "Monday"
    pub day: String,
    /// 24h time, e.g. "10:00"
    pub time: String,
    pub mode: Mode,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.day, self.time, self.mode)
    }
}

/// Structured search request extracted from a user turn.
/// Immutable once attached to a completed match; a new one is built
/// per retrieval attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Requested topics (non-empty by construction, see `new`)
    pub topics: Vec<String>,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
}

impl SearchCriteria {
    /// Build criteria; returns None when no topics were extracted,
    /// forcing the caller to ask a clarifying question instead.
    pub fn new(topics: Vec<String>) -> Option<Self> {
        if topics.is_empty() {
            return None;
        }
        Some(Self {
            topics,
            day: None,
            time: None,
            mode: None,
        })
    }

    /// Natural-language description used as the embedding input
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("Tutoring for {}", self.topics.join(", "))];
        if let Some(day) = &self.day {
            parts.push(format!("on {}", day));
        }
        if let Some(time) = &self.time {
            parts.push(format!("at {}", time));
        }
        if let Some(mode) = &self.mode {
            parts.push(format!("{} sessions", mode));
        }
        parts.join(" ")
    }
}

/// A catalog entry ranked against a search request.
/// `score` is cosine similarity from the index, or a normalized
/// heuristic score from the keyword fallback. Always in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entry_id: Uuid,
    pub name: String,
    pub topics: Vec<String>,
    pub mode: Mode,
    pub bio: String,
    pub slots: Vec<Slot>,
    pub score: f32,
}

/// Outcome of a retrieval + reasoning cycle.
/// At most one MatchResult is pending per session at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: Candidate,
    pub reasoning: String,
    /// Slots filtered against the user's preferences; never empty for a
    /// presented match (falls back to the candidate's full slot list).
    pub offered_slots: Vec<Slot>,
}

/// Steps of the booking form, in collection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    ContactInfo,
    SecondaryEmail,
    ExternalId,
    ConsentJoint,
    Topics,
    DetailText,
    Notes,
    Complete,
}

impl BookingStep {
    /// The step that follows this one in the form
    pub fn next(self) -> BookingStep {
        match self {
            BookingStep::ContactInfo => BookingStep::SecondaryEmail,
            BookingStep::SecondaryEmail => BookingStep::ExternalId,
            BookingStep::ExternalId => BookingStep::ConsentJoint,
            BookingStep::ConsentJoint => BookingStep::Topics,
            BookingStep::Topics => BookingStep::DetailText,
            BookingStep::DetailText => BookingStep::Notes,
            BookingStep::Notes | BookingStep::Complete => BookingStep::Complete,
        }
    }
}

/// In-progress structured booking form, collected across turns.
/// Created only after explicit confirmation of a pending match;
/// destroyed on completion, cancellation, or supersession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub entry_id: Uuid,
    pub entry_name: String,
    pub slot: Option<Slot>,
    pub step: BookingStep,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub secondary_email: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub consent: Option<bool>,
    #[serde(default)]
    pub topic_codes: Vec<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BookingDraft {
    pub fn new(entry_id: Uuid, entry_name: String, slot: Option<Slot>) -> Self {
        Self {
            entry_id,
            entry_name,
            slot,
            step: BookingStep::ContactInfo,
            contact_name: None,
            contact_email: None,
            secondary_email: None,
            external_id: None,
            consent: None,
            topic_codes: Vec::new(),
            detail: None,
            notes: None,
        }
    }
}

/// Result of submitting a finalized draft to the booking site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub success: bool,
    /// Booking reference when successful
    pub reference: Option<String>,
    /// Human-readable failure detail (never shown raw to the user)
    pub error_detail: Option<String>,
}

/// Reply produced for a single user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub reply: String,
    pub done: bool,
}

/// Error types for the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("similarity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("embedding call failed: {0}")]
    EmbeddingFailed(String),

    #[error("reasoning call failed: {0}")]
    ReasonerFailed(String),

    #[error("reasoning response violated the expected schema: {0}")]
    SchemaViolation(String),

    #[error("session store failure: {0}")]
    StoreFailed(String),

    #[error("booking finalization failed: {0}")]
    FinalizeFailed(String),

    #[error("no catalog entry matched the request")]
    NoMatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_requires_topics() {
        assert!(SearchCriteria::new(vec![]).is_none());
        assert!(SearchCriteria::new(vec!["Python".into()]).is_some());
    }

    #[test]
    fn test_criteria_description() {
        let mut criteria = SearchCriteria::new(vec!["Python".into()]).unwrap();
        criteria.day = Some("Monday".into());
        criteria.time = Some("10:00".into());
        criteria.mode = Some(Mode::Online);

        let desc = criteria.describe();
        assert!(desc.contains("Python"));
        assert!(desc.contains("Monday"));
        assert!(desc.contains("10:00"));
        assert!(desc.contains("online"));
    }

    #[test]
    fn test_booking_step_order() {
        let mut step = BookingStep::ContactInfo;
        let expected = [
            BookingStep::SecondaryEmail,
            BookingStep::ExternalId,
            BookingStep::ConsentJoint,
            BookingStep::Topics,
            BookingStep::DetailText,
            BookingStep::Notes,
            BookingStep::Complete,
        ];
        for want in expected {
            step = step.next();
            assert_eq!(step, want);
        }
        // Complete is terminal
        assert_eq!(BookingStep::Complete.next(), BookingStep::Complete);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            EngineError::NoMatch.to_string(),
            "no catalog entry matched the request"
        );
        let err = EngineError::FinalizeFailed("site timeout".into());
        assert!(err.to_string().contains("site timeout"));
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&Mode::InPerson).unwrap(), "\"in-person\"");
        assert_eq!(serde_json::to_string(&Mode::Online).unwrap(), "\"online\"");
    }
}
