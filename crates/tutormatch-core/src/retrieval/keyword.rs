//! ============================================================================
//! Keyword Scorer - Deterministic retrieval fallback
//! ============================================================================
//! Pure function, no external calls. Used whenever semantic retrieval is
//! unreachable or returns nothing, so a network outage never hard-fails
//! the conversation.
//! ============================================================================

use crate::catalog::CatalogEntry;
use crate::types::SearchCriteria;

/// Fixed weights for keyword matching
const TOPIC_WEIGHT: u32 = 10;
const MODE_WEIGHT: u32 = 5;
const DAY_WEIGHT: u32 = 3;
const TIME_WEIGHT: u32 = 2;

/// Maximum raw score a single entry can earn, used to normalize into [0, 1]
fn max_score(criteria: &SearchCriteria) -> u32 {
    let mut max = criteria.topics.len() as u32 * TOPIC_WEIGHT;
    if criteria.mode.is_some() {
        max += MODE_WEIGHT;
    }
    if criteria.day.is_some() {
        max += DAY_WEIGHT;
    }
    if criteria.time.is_some() {
        max += TIME_WEIGHT;
    }
    max
}

/// Raw weighted score for one catalog entry against the criteria.
/// Zero means "no match" and the caller must ask a clarifying question
/// rather than presenting an empty result as success.
pub fn score_entry(entry: &CatalogEntry, criteria: &SearchCriteria) -> u32 {
    let mut score = 0;

    for topic in &criteria.topics {
        let wanted = topic.to_lowercase();
        let matched = entry
            .topics
            .iter()
            .any(|t| t.to_lowercase().contains(&wanted) || wanted.contains(&t.to_lowercase()));
        if matched {
            score += TOPIC_WEIGHT;
        }
    }

    if let Some(mode) = criteria.mode {
        if entry.mode == mode || entry.slots.iter().any(|s| s.mode == mode) {
            score += MODE_WEIGHT;
        }
    }

    if let Some(day) = &criteria.day {
        if entry.slots.iter().any(|s| s.day.eq_ignore_ascii_case(day)) {
            score += DAY_WEIGHT;
        }
    }

    if let Some(time) = &criteria.time {
        if entry.slots.iter().any(|s| s.time == *time) {
            score += TIME_WEIGHT;
        }
    }

    score
}

/// Score every entry and return `(entry, normalized_score)` pairs sorted
/// score-descending. Entries with a zero raw score are dropped; ties keep
/// catalog insertion order (stable sort).
pub fn rank_entries<'a>(
    entries: &'a [CatalogEntry],
    criteria: &SearchCriteria,
) -> Vec<(&'a CatalogEntry, f32)> {
    let max = max_score(criteria).max(1);

    let mut ranked: Vec<(&CatalogEntry, u32)> = entries
        .iter()
        .map(|e| (e, score_entry(e, criteria)))
        .filter(|(_, s)| *s > 0)
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .map(|(e, s)| (e, s as f32 / max as f32))
        .collect()
}
