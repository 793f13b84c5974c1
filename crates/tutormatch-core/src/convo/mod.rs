//! ============================================================================
//! Conversation Controller - Turn classification and the booking flow
//! ============================================================================
//! Consumes each user turn plus the current session snapshot, classifies
//! intent against an ordered rule list (first match wins), and either runs
//! retrieval + reasoning, advances the booking form, or asks a clarifying
//! question. Every turn either fully commits its state transition or
//! leaves the pre-turn snapshot untouched; external failures degrade to
//! the documented fallbacks and never surface as raw errors.
//! ============================================================================

pub mod booking;
pub mod rules;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::booking_site::BookingAutomation;
use crate::catalog::CatalogReader;
use crate::reasoner::{filter_slots, MatchSelector, Reasoner};
use crate::retrieval::retriever::exclude_entry;
use crate::retrieval::{CandidateRetriever, TOP_K_BEST, TOP_K_OTHERS};
use crate::session::{ConvoState, Session};
use crate::types::{
    BookingDraft, BookingStep, EngineError, MatchResult, SearchCriteria, TurnReply,
};

/// Prompt asking whether to abandon an in-progress booking. Also used to
/// recognize that the previous assistant message posed this question.
const ABANDON_PROMPT: &str =
    "You're in the middle of a booking. Do you want to abandon it and search again? (yes/no)";

const CLARIFY_PROMPT: &str =
    "What subject would you like help with? Tell me the topic, and optionally a day, \
     time, and whether you prefer online or in-person.";

const GREETING_REPLY: &str =
    "Hi! Tell me what you'd like to learn and I'll find the right tutor for you.";

const RETRY_FINALIZE_REPLY: &str =
    "I couldn't submit your booking just now. Please try again in a moment.";

/// The controller's rules, in priority order. Classification walks this
/// list in a single deterministic pass; the first matching predicate wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRule {
    /// yes/no against a pending abandon-booking question
    ResolveInterrupt,
    /// New-search pattern while a booking is in progress
    InterruptGuard,
    /// "Show me other tutors"
    OtherCandidates,
    /// A shown candidate named in the turn
    NamedSelection,
    /// Day+time matching an offered slot while a match is pending
    SlotSelection,
    /// Affirmative while a match or candidate list is shown
    ConfirmBooking,
    /// Field extraction for the active booking step
    BookingField,
    /// Context-free greeting
    Greeting,
    /// Default: treat the turn as a new search
    NewSearch,
}

pub const RULE_ORDER: &[TurnRule] = &[
    TurnRule::ResolveInterrupt,
    TurnRule::InterruptGuard,
    TurnRule::OtherCandidates,
    TurnRule::NamedSelection,
    TurnRule::SlotSelection,
    TurnRule::ConfirmBooking,
    TurnRule::BookingField,
    TurnRule::Greeting,
    TurnRule::NewSearch,
];

/// The session-scoped matching-and-booking state machine
pub struct ConversationController {
    retriever: CandidateRetriever,
    reasoner: Option<Arc<dyn Reasoner>>,
    catalog: Arc<dyn CatalogReader>,
    automation: Arc<dyn BookingAutomation>,
}

impl ConversationController {
    pub fn new(
        retriever: CandidateRetriever,
        reasoner: Option<Arc<dyn Reasoner>>,
        catalog: Arc<dyn CatalogReader>,
        automation: Arc<dyn BookingAutomation>,
    ) -> Self {
        Self {
            retriever,
            reasoner,
            catalog,
            automation,
        }
    }

    /// Classify a turn against the ordered rule list. Pure over the
    /// snapshot, so rule priority is testable on its own.
    pub fn classify(&self, session: &Session, text: &str) -> TurnRule {
        for rule in RULE_ORDER {
            if self.rule_matches(*rule, session, text) {
                return *rule;
            }
        }
        TurnRule::NewSearch
    }

    fn rule_matches(&self, rule: TurnRule, session: &Session, text: &str) -> bool {
        let state = session.state();
        match rule {
            TurnRule::ResolveInterrupt => {
                session.pending_interrupt.is_some()
                    && session.last_assistant_message() == Some(ABANDON_PROMPT)
            }
            TurnRule::InterruptGuard => {
                rules::wants_new_search(text)
                    && matches!(state, ConvoState::Booking(step) if step != BookingStep::Complete)
            }
            TurnRule::OtherCandidates => rules::wants_other_candidates(text),
            TurnRule::NamedSelection => {
                !session.candidate_list.is_empty()
                    && rules::find_named(text, &candidate_names(&session.candidate_list)).is_some()
            }
            TurnRule::SlotSelection => {
                state == ConvoState::MatchPending
                    && session
                        .pending_match
                        .as_ref()
                        .map_or(false, |m| rules::find_slot(text, &m.offered_slots).is_some())
            }
            TurnRule::ConfirmBooking => {
                (state == ConvoState::MatchPending || !session.candidate_list.is_empty())
                    && rules::is_affirmative(text)
            }
            TurnRule::BookingField => match state {
                ConvoState::Booking(BookingStep::Complete) => !rules::wants_new_search(text),
                ConvoState::Booking(_) => true,
                _ => false,
            },
            TurnRule::Greeting => rules::is_greeting(text),
            TurnRule::NewSearch => true,
        }
    }

    /// Process one user turn. Returns the updated snapshot and the reply;
    /// the input snapshot is never mutated, so the caller commits or
    /// discards atomically.
    pub async fn handle_turn(&self, session: &Session, text: &str) -> (Session, TurnReply) {
        let mut work = session.clone();
        work.push_user(text.to_string());
        let reply_idx = work.begin_assistant();

        let rule = self.classify(session, text);
        debug!("Turn classified as {:?}", rule);

        let reply = match rule {
            TurnRule::ResolveInterrupt => self.resolve_interrupt(&mut work, text).await,
            TurnRule::InterruptGuard => {
                work.pending_interrupt = Some(text.to_string());
                ABANDON_PROMPT.to_string()
            }
            TurnRule::OtherCandidates => self.show_others(&mut work, text).await,
            TurnRule::NamedSelection => self.select_named(&mut work, text),
            TurnRule::SlotSelection => self.select_slot(&mut work, text),
            TurnRule::ConfirmBooking => self.confirm_booking(&mut work),
            TurnRule::BookingField => self.booking_field(&mut work, text).await,
            TurnRule::Greeting => GREETING_REPLY.to_string(),
            TurnRule::NewSearch => self.new_search(&mut work, text).await,
        };

        work.set_assistant_content(reply_idx, reply.clone());
        (work, TurnReply { reply, done: true })
    }

    // ------------------------------------------------------------------
    // Rule handlers
    // ------------------------------------------------------------------

    async fn resolve_interrupt(&self, work: &mut Session, text: &str) -> String {
        let captured = match work.pending_interrupt.take() {
            Some(c) => c,
            None => return CLARIFY_PROMPT.to_string(),
        };

        if rules::is_negative(text) {
            // Resume the booking exactly where it was
            let step = match work.state() {
                ConvoState::Booking(step) => step,
                _ => return CLARIFY_PROMPT.to_string(),
            };
            return format!("No problem, let's continue. {}", booking::prompt_for(step));
        }

        if rules::is_affirmative(text) {
            work.clear_match_state();
            return self.new_search(work, &captured).await;
        }

        // Unrecognized answer: re-ask rather than guess
        work.pending_interrupt = Some(captured);
        ABANDON_PROMPT.to_string()
    }

    async fn show_others(&self, work: &mut Session, text: &str) -> String {
        let known_topics = self.known_topics().await;

        // Topic preference: this turn, else the last search, else the
        // pending match's topics
        let criteria = rules::extract_criteria(text, &known_topics)
            .or_else(|| work.last_search.clone())
            .or_else(|| {
                work.pending_match
                    .as_ref()
                    .and_then(|m| SearchCriteria::new(m.candidate.topics.clone()))
            });

        let criteria = match criteria {
            Some(c) => c,
            None => return CLARIFY_PROMPT.to_string(),
        };

        let candidates = match self.retriever.retrieve(&criteria, TOP_K_OTHERS).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Retrieval failed for alternatives: {}", e);
                Vec::new()
            }
        };

        let candidates = match &work.pending_match {
            Some(pending) => exclude_entry(candidates, pending.candidate.entry_id),
            None => candidates,
        };

        if candidates.is_empty() {
            return if work.pending_match.is_some() {
                "That's the only tutor matching your request right now.".to_string()
            } else {
                CLARIFY_PROMPT.to_string()
            };
        }

        work.last_search = Some(criteria.clone());
        work.candidate_list = candidates
            .into_iter()
            .map(|c| {
                let offered_slots = filter_slots(&c.slots, &criteria);
                MatchResult {
                    candidate: c,
                    reasoning: "Also matches your request.".to_string(),
                    offered_slots,
                }
            })
            .collect();

        let mut reply = String::from("Here are other tutors that match:\n");
        for m in &work.candidate_list {
            reply.push_str(&format!(
                "- {} ({}; {})\n",
                m.candidate.name,
                m.candidate.topics.join(", "),
                m.candidate.mode
            ));
        }
        reply.push_str("Say a tutor's name to pick one.");
        reply
    }

    fn select_named(&self, work: &mut Session, text: &str) -> String {
        let names = candidate_names(&work.candidate_list);
        let index = match rules::find_named(text, &names) {
            Some(i) => i,
            None => return CLARIFY_PROMPT.to_string(),
        };

        if !work.promote_candidate(index) {
            return CLARIFY_PROMPT.to_string();
        }
        let pending = match &work.pending_match {
            Some(p) => p,
            None => return CLARIFY_PROMPT.to_string(),
        };

        let mut reply = format!("Great choice — {}. Which time works for you?\n", pending.candidate.name);
        for slot in &pending.offered_slots {
            reply.push_str(&format!("- {}\n", slot));
        }
        reply.trim_end().to_string()
    }

    fn select_slot(&self, work: &mut Session, text: &str) -> String {
        let pending = match &work.pending_match {
            Some(p) => p.clone(),
            None => return CLARIFY_PROMPT.to_string(),
        };
        let slot = match rules::find_slot(text, &pending.offered_slots) {
            Some(s) => s,
            None => return CLARIFY_PROMPT.to_string(),
        };

        work.booking_draft = Some(BookingDraft::new(
            pending.candidate.entry_id,
            pending.candidate.name.clone(),
            Some(slot.clone()),
        ));
        format!(
            "Booked in for {} with {}. {}",
            slot,
            pending.candidate.name,
            booking::prompt_for(BookingStep::ContactInfo)
        )
    }

    fn confirm_booking(&self, work: &mut Session) -> String {
        // Resolve which candidate "yes" refers to: the pending match, a
        // single shown candidate, the one named in the latest assistant
        // message, else the best-ranked.
        if work.pending_match.is_none() {
            let names = candidate_names(&work.candidate_list);
            let index = work
                .last_assistant_message()
                .and_then(|msg| rules::find_named(msg, &names))
                .unwrap_or(0);
            if !work.promote_candidate(index) {
                return CLARIFY_PROMPT.to_string();
            }
        }
        work.candidate_list.clear();

        let pending = match &work.pending_match {
            Some(p) => p,
            None => return CLARIFY_PROMPT.to_string(),
        };
        work.booking_draft = Some(BookingDraft::new(
            pending.candidate.entry_id,
            pending.candidate.name.clone(),
            None,
        ));
        format!(
            "Great, let's set up your booking with {}. {}",
            pending.candidate.name,
            booking::prompt_for(BookingStep::ContactInfo)
        )
    }

    async fn booking_field(&self, work: &mut Session, text: &str) -> String {
        let mut draft = match work.booking_draft.clone() {
            Some(d) => d,
            None => return CLARIFY_PROMPT.to_string(),
        };

        if draft.step != BookingStep::Complete {
            if let Err(reprompt) = booking::apply_field(&mut draft, text) {
                // Invalid field: snapshot untouched, step unchanged
                return reprompt;
            }
            work.booking_draft = Some(draft.clone());
        }

        if draft.step == BookingStep::Complete {
            return self.finalize_draft(work, &draft).await;
        }

        booking::prompt_for(draft.step).to_string()
    }

    async fn finalize_draft(&self, work: &mut Session, draft: &BookingDraft) -> String {
        match self.automation.finalize(draft).await {
            Ok(outcome) if outcome.success => {
                let tutor = draft.entry_name.clone();
                work.clear_match_state();
                match outcome.reference {
                    Some(reference) => format!(
                        "Your booking with {} is confirmed! Reference: {}.",
                        tutor, reference
                    ),
                    None => format!("Your booking with {} is confirmed!", tutor),
                }
            }
            Ok(outcome) => {
                let err = EngineError::FinalizeFailed(
                    outcome.error_detail.unwrap_or_else(|| "rejected".to_string()),
                );
                warn!("{}", err);
                RETRY_FINALIZE_REPLY.to_string()
            }
            Err(e) => {
                warn!("{}", EngineError::FinalizeFailed(e.to_string()));
                RETRY_FINALIZE_REPLY.to_string()
            }
        }
    }

    async fn new_search(&self, work: &mut Session, text: &str) -> String {
        let known_topics = self.known_topics().await;
        let criteria = match rules::extract_criteria(text, &known_topics) {
            Some(c) => c,
            None => return CLARIFY_PROMPT.to_string(),
        };

        // A new search supersedes any previous match or draft
        work.clear_match_state();
        work.last_search = Some(criteria.clone());

        let candidates = match self.retriever.retrieve(&criteria, TOP_K_BEST).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                Vec::new()
            }
        };

        if candidates.is_empty() {
            debug!("Search for {:?}: {}", criteria.topics, EngineError::NoMatch);
            return format!(
                "I couldn't find a tutor for {} yet. Could you describe the subject differently, \
                 or loosen the day/time?",
                criteria.topics.join(", ")
            );
        }

        let selector = MatchSelector::new(self.reasoner.as_deref());
        let result = match selector.select(&criteria, &candidates).await {
            Some(r) => r,
            None => return CLARIFY_PROMPT.to_string(),
        };

        let mut reply = format!(
            "I'd recommend {}. {}\nAvailable times:\n",
            result.candidate.name, result.reasoning
        );
        for slot in &result.offered_slots {
            reply.push_str(&format!("- {}\n", slot));
        }
        reply.push_str(&format!(
            "Would you like to book a session with {}?",
            result.candidate.name
        ));

        work.pending_match = Some(result);
        reply
    }

    async fn known_topics(&self) -> Vec<String> {
        match self.catalog.all().await {
            Ok(entries) => {
                let mut topics: Vec<String> = Vec::new();
                for entry in entries {
                    for topic in entry.topics {
                        if !topics.iter().any(|t| t.eq_ignore_ascii_case(&topic)) {
                            topics.push(topic);
                        }
                    }
                }
                topics
            }
            Err(e) => {
                warn!("Catalog read failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn candidate_names(list: &[MatchResult]) -> Vec<String> {
    list.iter().map(|m| m.candidate.name.clone()).collect()
}
