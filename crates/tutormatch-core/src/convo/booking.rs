//! ============================================================================
//! Booking Form - Step prompts and strict field validation
//! ============================================================================
//! Each booking step parses the turn for its required field(s) under strict
//! format rules. A failed parse re-prompts with the expected format and
//! never advances the step.
//! ============================================================================

use crate::types::{BookingDraft, BookingStep};

use super::rules;

/// Words that skip an optional field
const SKIP_WORDS: &[&str] = &["skip", "none", "no", "n/a"];

/// Prompt emitted when a step becomes active
pub fn prompt_for(step: BookingStep) -> &'static str {
    match step {
        BookingStep::ContactInfo => {
            "Please share your full name and email address (e.g. \"Jane Doe, jane@example.com\")."
        }
        BookingStep::SecondaryEmail => {
            "Please provide a secondary email address for booking confirmations."
        }
        BookingStep::ExternalId => {
            "If you have a student reference ID, please enter it (1-3 letters followed by \
             6-10 digits, e.g. \"AB1234567\"). Say \"skip\" if you don't have one."
        }
        BookingStep::ConsentJoint => {
            "Do you consent to joint sessions with other students? (yes/no)"
        }
        BookingStep::Topics => {
            "Which topic codes should the booking cover? List them separated by commas."
        }
        BookingStep::DetailText => {
            "Briefly describe what you'd like to focus on in these sessions."
        }
        BookingStep::Notes => {
            "Any final notes for the tutor? Say \"skip\" if not."
        }
        BookingStep::Complete => "Submitting your booking now.",
    }
}

/// Parse the turn for the draft's current step. On success the field is
/// stored and the step advances; on failure the draft is untouched and the
/// re-prompt text is returned.
pub fn apply_field(draft: &mut BookingDraft, text: &str) -> Result<(), String> {
    let trimmed = text.trim();

    match draft.step {
        BookingStep::ContactInfo => {
            let (name, email) = parse_contact(trimmed).ok_or_else(|| {
                format!("I couldn't read that. {}", prompt_for(BookingStep::ContactInfo))
            })?;
            draft.contact_name = Some(name);
            draft.contact_email = Some(email);
        }
        BookingStep::SecondaryEmail => {
            let email = find_email(trimmed).ok_or_else(|| {
                format!(
                    "That doesn't look like an email address. {}",
                    prompt_for(BookingStep::SecondaryEmail)
                )
            })?;
            draft.secondary_email = Some(email);
        }
        BookingStep::ExternalId => {
            if is_skip(trimmed) {
                draft.external_id = None;
            } else {
                let id = parse_external_id(trimmed).ok_or_else(|| {
                    format!("That ID isn't valid. {}", prompt_for(BookingStep::ExternalId))
                })?;
                draft.external_id = Some(id);
            }
        }
        BookingStep::ConsentJoint => {
            if rules::is_negative(trimmed) {
                draft.consent = Some(false);
            } else if rules::is_affirmative(trimmed) {
                draft.consent = Some(true);
            } else {
                return Err(format!(
                    "Please answer yes or no. {}",
                    prompt_for(BookingStep::ConsentJoint)
                ));
            }
        }
        BookingStep::Topics => {
            let codes: Vec<String> = trimmed
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if codes.is_empty() {
                return Err(format!(
                    "I need at least one topic code. {}",
                    prompt_for(BookingStep::Topics)
                ));
            }
            draft.topic_codes = codes;
        }
        BookingStep::DetailText => {
            if trimmed.is_empty() {
                return Err(format!(
                    "Please tell me a bit more. {}",
                    prompt_for(BookingStep::DetailText)
                ));
            }
            draft.detail = Some(trimmed.to_string());
        }
        BookingStep::Notes => {
            draft.notes = if is_skip(trimmed) || trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        BookingStep::Complete => return Ok(()),
    }

    draft.step = draft.step.next();
    Ok(())
}

fn is_skip(text: &str) -> bool {
    SKIP_WORDS.contains(&text.to_lowercase().as_str())
}

/// "Name, email" or "Name email" — the email is located by shape, the name
/// is everything else.
fn parse_contact(text: &str) -> Option<(String, String)> {
    let email = find_email(text)?;
    let name: String = text
        .replace(&email, "")
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        return None;
    }
    Some((name, email))
}

/// First token that has the shape of an email address
fn find_email(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == ';').trim_end_matches('.'))
        .find(|t| is_email(t))
        .map(|t| t.to_string())
}

fn is_email(token: &str) -> bool {
    let Some((local, domain)) = token.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.len() > 2
}

/// Strict two-part ID: 1-3 ASCII letters followed by 6-10 digits
fn parse_external_id(text: &str) -> Option<String> {
    let token = text.trim();
    let letters: String = token.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits: String = token.chars().skip(letters.len()).collect();

    if (1..=3).contains(&letters.len())
        && (6..=10).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
    {
        Some(format!("{}{}", letters.to_uppercase(), digits))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn draft_at(step: BookingStep) -> BookingDraft {
        let mut draft = BookingDraft::new(Uuid::new_v4(), "Alice".into(), None);
        draft.step = step;
        draft
    }

    #[test]
    fn test_contact_info_parses_name_and_email() {
        let mut draft = draft_at(BookingStep::ContactInfo);
        apply_field(&mut draft, "Jane Doe, jane@example.com").unwrap();
        assert_eq!(draft.contact_name.as_deref(), Some("Jane Doe"));
        assert_eq!(draft.contact_email.as_deref(), Some("jane@example.com"));
        assert_eq!(draft.step, BookingStep::SecondaryEmail);
    }

    #[test]
    fn test_contact_info_rejects_missing_email() {
        let mut draft = draft_at(BookingStep::ContactInfo);
        let err = apply_field(&mut draft, "Jane Doe").unwrap_err();
        assert!(err.contains("name and email"));
        assert_eq!(draft.step, BookingStep::ContactInfo);
        assert!(draft.contact_name.is_none());
    }

    #[test]
    fn test_secondary_email_validation() {
        let mut draft = draft_at(BookingStep::SecondaryEmail);
        assert!(apply_field(&mut draft, "not-an-email").is_err());
        assert_eq!(draft.step, BookingStep::SecondaryEmail);

        apply_field(&mut draft, "backup@example.org").unwrap();
        assert_eq!(draft.secondary_email.as_deref(), Some("backup@example.org"));
        assert_eq!(draft.step, BookingStep::ExternalId);
    }

    #[test]
    fn test_external_id_format() {
        assert_eq!(parse_external_id("AB1234567").as_deref(), Some("AB1234567"));
        assert_eq!(parse_external_id("a123456").as_deref(), Some("A123456"));
        assert_eq!(parse_external_id("XYZ1234567890").as_deref(), Some("XYZ1234567890"));
        // too few letters / digits / letters after digits
        assert!(parse_external_id("1234567").is_none());
        assert!(parse_external_id("ABCD123456").is_none());
        assert!(parse_external_id("AB12345").is_none());
        assert!(parse_external_id("AB123456789012").is_none());
        assert!(parse_external_id("AB12345X").is_none());
        assert!(parse_external_id("abc").is_none());
    }

    #[test]
    fn test_external_id_malformed_does_not_advance() {
        let mut draft = draft_at(BookingStep::ExternalId);
        let err = apply_field(&mut draft, "abc").unwrap_err();
        assert!(err.contains("1-3 letters"));
        assert_eq!(draft.step, BookingStep::ExternalId);
    }

    #[test]
    fn test_external_id_skip() {
        let mut draft = draft_at(BookingStep::ExternalId);
        apply_field(&mut draft, "skip").unwrap();
        assert!(draft.external_id.is_none());
        assert_eq!(draft.step, BookingStep::ConsentJoint);
    }

    #[test]
    fn test_consent_yes_no() {
        let mut draft = draft_at(BookingStep::ConsentJoint);
        assert!(apply_field(&mut draft, "maybe").is_err());

        apply_field(&mut draft, "yes").unwrap();
        assert_eq!(draft.consent, Some(true));

        let mut draft = draft_at(BookingStep::ConsentJoint);
        apply_field(&mut draft, "no").unwrap();
        assert_eq!(draft.consent, Some(false));
    }

    #[test]
    fn test_topics_comma_separated() {
        let mut draft = draft_at(BookingStep::Topics);
        apply_field(&mut draft, "PY101, PY201").unwrap();
        assert_eq!(draft.topic_codes, vec!["PY101", "PY201"]);

        let mut draft = draft_at(BookingStep::Topics);
        assert!(apply_field(&mut draft, " , ").is_err());
    }

    #[test]
    fn test_notes_skip_and_capture() {
        let mut draft = draft_at(BookingStep::Notes);
        apply_field(&mut draft, "skip").unwrap();
        assert!(draft.notes.is_none());
        assert_eq!(draft.step, BookingStep::Complete);

        let mut draft = draft_at(BookingStep::Notes);
        apply_field(&mut draft, "Please be patient with me").unwrap();
        assert_eq!(draft.notes.as_deref(), Some("Please be patient with me"));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_email("a@b.co"));
        assert!(!is_email("a@b"));
        assert!(!is_email("@b.co"));
        assert!(!is_email("plain"));
    }
}
