//! ============================================================================
//! Turn Rules - Lightweight pattern classification for user turns
//! ============================================================================
//! Pure helpers behind the controller's ordered rule list: yes/no
//! detection, search-intent patterns, criteria extraction, whole-word name
//! matching, and slot parsing. No external calls.
//! ============================================================================

use crate::types::{Mode, SearchCriteria, Slot};

/// Phrases that confirm an action
const CONFIRM_PHRASES: &[&str] = &[
    "yes", "yeah", "yep", "sure", "confirm", "book", "go ahead", "sounds good", "ok", "okay",
];

/// Phrases that decline or cancel
const CANCEL_PHRASES: &[&str] = &[
    "no", "nope", "cancel", "stop", "nevermind", "never mind", "don't",
];

/// Phrases that signal a brand-new search request
const SEARCH_PHRASES: &[&str] = &[
    "i want to learn",
    "i'd like to learn",
    "i need a tutor",
    "i need help with",
    "looking for",
    "find me",
    "can you find",
    "search for",
    "teach me",
];

/// Phrases that ask for alternative candidates
const OTHERS_PHRASES: &[&str] = &[
    "other tutor",
    "other option",
    "someone else",
    "anyone else",
    "who else",
    "alternatives",
    "more options",
    "show me others",
];

const WEEKDAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

/// Words that end a topic phrase
const TOPIC_STOP_WORDS: &[&str] = &[
    "on", "at", "every", "this", "next", "online", "in-person", "in", "tutor", "tutoring",
];

pub fn is_affirmative(text: &str) -> bool {
    let lower = text.to_lowercase();
    !is_negative(text) && CONFIRM_PHRASES.iter().any(|p| contains_word_phrase(&lower, p))
}

pub fn is_negative(text: &str) -> bool {
    let lower = text.to_lowercase();
    CANCEL_PHRASES.iter().any(|p| contains_word_phrase(&lower, p))
}

pub fn is_greeting(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    matches!(
        lower.trim_end_matches(['!', '.']),
        "hi" | "hello" | "hey" | "good morning" | "good afternoon" | "good evening"
    )
}

/// Does this turn read as a brand-new search request?
pub fn wants_new_search(text: &str) -> bool {
    let lower = text.to_lowercase();
    SEARCH_PHRASES.iter().any(|p| lower.contains(p))
}

/// Does this turn ask for alternative candidates?
pub fn wants_other_candidates(text: &str) -> bool {
    let lower = text.to_lowercase();
    OTHERS_PHRASES.iter().any(|p| lower.contains(p))
}

/// Extract search criteria from free text. `known_topics` (from the
/// catalog) are preferred; a phrase heuristic covers the rest. Returns
/// None when no topic can be extracted, which the controller answers
/// with a clarifying question.
pub fn extract_criteria(text: &str, known_topics: &[String]) -> Option<SearchCriteria> {
    let mut topics = match_known_topics(text, known_topics);
    if topics.is_empty() {
        if let Some(topic) = extract_topic_phrase(text) {
            topics.push(topic);
        }
    }

    let mut criteria = SearchCriteria::new(topics)?;
    criteria.day = extract_day(text);
    criteria.time = extract_time(text);
    criteria.mode = extract_mode(text);
    Some(criteria)
}

/// Catalog topics mentioned in the text, case-insensitive
pub fn match_known_topics(text: &str, known_topics: &[String]) -> Vec<String> {
    let lower = text.to_lowercase();
    known_topics
        .iter()
        .filter(|t| lower.contains(&t.to_lowercase()))
        .cloned()
        .collect()
}

/// Topic phrase following a search marker, e.g. "learn <topic> on Monday"
fn extract_topic_phrase(text: &str) -> Option<String> {
    let markers = ["learn ", "tutor for ", "help with ", "lessons in ", "teach me "];

    for marker in markers {
        if let Some(start) = find_ascii_marker(text, marker) {
            let rest = &text[start..];
            let mut words = Vec::new();
            for word in rest.split_whitespace() {
                let cleaned: String = word
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '+' || *c == '#')
                    .collect();
                if cleaned.is_empty() || TOPIC_STOP_WORDS.contains(&cleaned.to_lowercase().as_str())
                {
                    break;
                }
                let ended = cleaned.len() < word.len(); // hit punctuation
                words.push(cleaned);
                if ended {
                    break;
                }
            }
            let topic = words.join(" ");
            if !topic.is_empty() {
                return Some(topic);
            }
        }
    }
    None
}

/// Byte offset just past the first ASCII-case-insensitive occurrence of
/// `marker`. Matching happens on the original string, so the offset stays
/// a valid char boundary even when lowercasing would change byte lengths.
fn find_ascii_marker(text: &str, marker: &str) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .find(|&i| {
            text.get(i..i + marker.len())
                .map_or(false, |s| s.eq_ignore_ascii_case(marker))
        })
        .map(|i| i + marker.len())
}

/// Weekday mentioned in the text, capitalized
pub fn extract_day(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    WEEKDAYS.iter().find(|d| contains_word_phrase(&lower, d)).map(|d| {
        let mut chars = d.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    })
}

/// Time mentioned in the text, normalized to 24h "HH:MM"
pub fn extract_time(text: &str) -> Option<String> {
    for token in text.split_whitespace() {
        let token = token.trim_matches(|c: char| c == ',' || c == '.' || c == '?' || c == '!');
        if let Some(time) = normalize_time(token) {
            return Some(time);
        }
    }
    None
}

/// Parse "10:00", "9:30", "10am", "2pm" into "HH:MM"
fn normalize_time(token: &str) -> Option<String> {
    let lower = token.to_lowercase();

    if let Some((h, m)) = lower.split_once(':') {
        let hour: u32 = h.parse().ok()?;
        let minute: u32 = m.parse().ok()?;
        if hour < 24 && minute < 60 {
            return Some(format!("{:02}:{:02}", hour, minute));
        }
        return None;
    }

    for (suffix, offset) in [("am", 0u32), ("pm", 12u32)] {
        if let Some(h) = lower.strip_suffix(suffix) {
            let hour: u32 = h.parse().ok()?;
            if hour >= 1 && hour <= 12 {
                let hour24 = (hour % 12) + offset;
                return Some(format!("{:02}:00", hour24));
            }
        }
    }
    None
}

/// Session mode mentioned in the text
pub fn extract_mode(text: &str) -> Option<Mode> {
    let lower = text.to_lowercase();
    if lower.contains("in person") || lower.contains("in-person") {
        Some(Mode::InPerson)
    } else if lower.contains("online") || lower.contains("remote") {
        Some(Mode::Online)
    } else {
        None
    }
}

/// Index of the first name that appears as a whole word in the text
pub fn find_named(text: &str, names: &[String]) -> Option<usize> {
    let lower = text.to_lowercase();
    names
        .iter()
        .position(|name| contains_word_phrase(&lower, &name.to_lowercase()))
}

/// Slot whose day and time both appear in the text
pub fn find_slot(text: &str, slots: &[Slot]) -> Option<Slot> {
    let day = extract_day(text)?;
    let time = extract_time(text)?;
    slots
        .iter()
        .find(|s| s.day.eq_ignore_ascii_case(&day) && s.time == time)
        .cloned()
}

/// Whole-word (or whole-phrase) containment check on lowercase input
fn contains_word_phrase(lower: &str, phrase: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = lower[start..].find(phrase) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !lower[..abs]
                .chars()
                .next_back()
                .map_or(false, |c| c.is_alphanumeric());
        let after = abs + phrase.len();
        let after_ok = after == lower.len()
            || !lower[after..].chars().next().map_or(false, |c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + phrase.len().max(1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_and_negative() {
        assert!(is_affirmative("Yes, book it"));
        assert!(is_affirmative("sounds good"));
        assert!(is_negative("no, cancel that"));
        // "don't" wins over "do"
        assert!(!is_affirmative("don't book it"));
        assert!(!is_affirmative("maybe"));
    }

    #[test]
    fn test_whole_word_boundaries() {
        // "no" must not match inside "november" or "piano"
        assert!(!is_negative("I play piano in november"));
        assert!(is_negative("no"));
    }

    #[test]
    fn test_greeting() {
        assert!(is_greeting("Hello!"));
        assert!(is_greeting("hi"));
        assert!(!is_greeting("hello, find me a tutor"));
    }

    #[test]
    fn test_new_search_pattern() {
        assert!(wants_new_search("I want to learn Spanish"));
        assert!(wants_new_search("Actually, find me a math tutor"));
        assert!(!wants_new_search("ACM123456"));
    }

    #[test]
    fn test_others_pattern() {
        assert!(wants_other_candidates("show me other tutors"));
        assert!(wants_other_candidates("who else is available?"));
        assert!(!wants_other_candidates("yes please"));
    }

    #[test]
    fn test_extract_criteria_known_topic() {
        let known = vec!["Python".to_string(), "Math".to_string()];
        let criteria =
            extract_criteria("I want to learn Python on Monday at 10:00 online", &known).unwrap();
        assert_eq!(criteria.topics, vec!["Python"]);
        assert_eq!(criteria.day.as_deref(), Some("Monday"));
        assert_eq!(criteria.time.as_deref(), Some("10:00"));
        assert_eq!(criteria.mode, Some(Mode::Online));
    }

    #[test]
    fn test_extract_criteria_phrase_fallback() {
        let criteria = extract_criteria("I want to learn linear algebra on Tuesday", &[]).unwrap();
        assert_eq!(criteria.topics, vec!["linear algebra"]);
        assert_eq!(criteria.day.as_deref(), Some("Tuesday"));
    }

    #[test]
    fn test_extract_criteria_no_topic() {
        assert!(extract_criteria("on Monday please", &[]).is_none());
    }

    #[test]
    fn test_topic_phrase_survives_non_ascii_casing() {
        // "İ" lowercases to two chars, shifting byte offsets; marker
        // positions must come from the original string
        let criteria = extract_criteria("İ want to learn Ünterricht", &[]).unwrap();
        assert_eq!(criteria.topics, vec!["Ünterricht"]);

        let criteria = extract_criteria("TEACH ME chess on Friday", &[]).unwrap();
        assert_eq!(criteria.topics, vec!["chess"]);
        assert_eq!(criteria.day.as_deref(), Some("Friday"));
    }

    #[test]
    fn test_time_normalization() {
        assert_eq!(normalize_time("10:00").as_deref(), Some("10:00"));
        assert_eq!(normalize_time("9:30").as_deref(), Some("09:30"));
        assert_eq!(normalize_time("10am").as_deref(), Some("10:00"));
        assert_eq!(normalize_time("2pm").as_deref(), Some("14:00"));
        assert_eq!(normalize_time("12pm").as_deref(), Some("12:00"));
        assert_eq!(normalize_time("12am").as_deref(), Some("00:00"));
        assert!(normalize_time("25:00").is_none());
        assert!(normalize_time("hello").is_none());
    }

    #[test]
    fn test_find_named_whole_word() {
        let names = vec!["Alice Chen".to_string(), "Bob".to_string()];
        assert_eq!(find_named("I'll take alice chen please", &names), Some(0));
        assert_eq!(find_named("book Bob", &names), Some(1));
        // "Bob" must not match inside "bobsled"
        assert_eq!(find_named("I like bobsled", &names), None);
    }

    #[test]
    fn test_find_slot() {
        let slots = vec![
            Slot { day: "Monday".into(), time: "10:00".into(), mode: Mode::Online },
            Slot { day: "Tuesday".into(), time: "14:00".into(), mode: Mode::Online },
        ];
        let found = find_slot("Monday at 10am works", &slots).unwrap();
        assert_eq!(found.day, "Monday");
        assert!(find_slot("Wednesday at 10am", &slots).is_none());
        assert!(find_slot("Monday sometime", &slots).is_none());
    }
}
