//! ============================================================================
//! Match Reasoner - Best-candidate selection via chat completions
//! ============================================================================
//! Asks the reasoning model to pick one candidate by name and justify it in
//! a fixed JSON schema. The model is constrained to the provided names; any
//! deviation is a parse failure, and both parse failures and transport
//! failures degrade to highest-score selection. Never hard-fails.
//! ============================================================================

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{Candidate, EngineError, MatchResult, SearchCriteria, Slot};

/// Reasoning text used when selection fell back to the score ranking
const FALLBACK_REASONING: &str =
    "Selected as the closest match to your request based on similarity ranking.";

/// Raw text completion capability
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions client for an OpenAI-compatible endpoint
pub struct OpenAiReasoner {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiReasoner {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Calling reasoning API with {} chars", prompt.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.2, // Low temperature for deterministic selection
            max_tokens: 512,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call reasoning API: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Reasoning API error {}: {}", status, body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse API response: {}", e))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("No response from API"))
    }
}

/// The fixed response schema the model must produce
#[derive(Debug, Deserialize)]
struct SelectionResponse {
    selected_name: String,
    reasoning: String,
}

/// Selects the best candidate, with the reasoning service when available
/// and by score otherwise.
pub struct MatchSelector<'a> {
    reasoner: Option<&'a dyn Reasoner>,
}

impl<'a> MatchSelector<'a> {
    pub fn new(reasoner: Option<&'a dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Pick one candidate from a non-empty, score-descending list.
    /// `offered_slots` are filtered against the user's preferences; an
    /// empty filter result falls back to the full slot list so a match is
    /// never presented without a bookable time.
    pub async fn select(
        &self,
        criteria: &SearchCriteria,
        candidates: &[Candidate],
    ) -> Option<MatchResult> {
        let shortlist: Vec<&Candidate> = candidates.iter().take(5).collect();
        if shortlist.is_empty() {
            return None;
        }

        let (candidate, reasoning) = match self.reason_over(criteria, &shortlist).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!("Reasoning unavailable ({}), selecting by score", e);
                (shortlist[0].clone(), FALLBACK_REASONING.to_string())
            }
        };

        let offered_slots = filter_slots(&candidate.slots, criteria);
        Some(MatchResult {
            candidate,
            reasoning,
            offered_slots,
        })
    }

    async fn reason_over(
        &self,
        criteria: &SearchCriteria,
        shortlist: &[&Candidate],
    ) -> Result<(Candidate, String)> {
        let reasoner = self
            .reasoner
            .ok_or_else(|| anyhow!("no reasoning service configured"))?;

        let prompt = build_prompt(criteria, shortlist);
        let raw = reasoner
            .complete(&prompt)
            .await
            .map_err(|e| EngineError::ReasonerFailed(e.to_string()))?;
        let parsed = parse_selection(&raw)?;

        // Hallucination guard: the returned name must match a shortlist
        // candidate verbatim, else the reasoning output is discarded.
        match shortlist
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(parsed.selected_name.trim()))
        {
            Some(candidate) => {
                info!("Reasoner selected {}", candidate.name);
                Ok(((*candidate).clone(), parsed.reasoning))
            }
            None => {
                warn!(
                    "Reasoner returned unknown name '{}', forcing top-score selection",
                    parsed.selected_name
                );
                Ok((shortlist[0].clone(), FALLBACK_REASONING.to_string()))
            }
        }
    }
}

fn build_prompt(criteria: &SearchCriteria, shortlist: &[&Candidate]) -> String {
    let mut prompt = String::from(
        "You match tutoring requests to tutors. Pick exactly one tutor from the \
         list below for this request, and justify the choice briefly.\n\n",
    );
    prompt.push_str(&format!("Request: {}\n\nTutors:\n", criteria.describe()));

    for c in shortlist {
        prompt.push_str(&format!(
            "- {} (topics: {}; {}; similarity {:.2}): {}\n",
            c.name,
            c.topics.join(", "),
            c.mode,
            c.score,
            c.bio
        ));
    }

    prompt.push_str(
        "\nRespond with ONLY a JSON object, no other text:\n\
         {\"selected_name\": \"<exact tutor name from the list>\", \
         \"reasoning\": \"<one or two sentences>\"}",
    );
    prompt
}

/// Parse the model output against the fixed schema. Tolerates a fenced
/// code block around the JSON but nothing else.
fn parse_selection(raw: &str) -> Result<SelectionResponse> {
    let trimmed = raw.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(json)
        .map_err(|e| EngineError::SchemaViolation(format!("{} in '{}'", e, json)).into())
}

/// Filter slots by the user's day/time/mode preferences. Zero surviving
/// slots falls back to the full list.
pub fn filter_slots(slots: &[Slot], criteria: &SearchCriteria) -> Vec<Slot> {
    let filtered: Vec<Slot> = slots
        .iter()
        .filter(|s| {
            criteria
                .day
                .as_ref()
                .map_or(true, |d| s.day.eq_ignore_ascii_case(d))
                && criteria.time.as_ref().map_or(true, |t| s.time == *t)
                && criteria.mode.map_or(true, |m| s.mode == m)
        })
        .cloned()
        .collect();

    if filtered.is_empty() {
        slots.to_vec()
    } else {
        filtered
    }
}
