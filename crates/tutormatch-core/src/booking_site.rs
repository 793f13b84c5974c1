//! ============================================================================
//! Booking Site Automation - Downstream form submission
//! ============================================================================
//! The external collaborator that consumes a finalized booking draft. The
//! engine only sees success-with-reference or failure-with-detail; a
//! failure surfaces to the user as "please retry", never as a raw error.
//! ============================================================================

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::{BookingDraft, FinalizeOutcome};

/// Form-filling automation for the downstream booking site
#[async_trait]
pub trait BookingAutomation: Send + Sync {
    async fn finalize(&self, draft: &BookingDraft) -> Result<FinalizeOutcome>;
}

/// Logging stand-in used for demos and offline operation; always succeeds
/// with a locally generated reference.
pub struct LoggingBookingAutomation;

#[async_trait]
impl BookingAutomation for LoggingBookingAutomation {
    async fn finalize(&self, draft: &BookingDraft) -> Result<FinalizeOutcome> {
        let reference = format!("TM-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        info!(
            "Finalized booking for {} with {} (ref {})",
            draft.contact_name.as_deref().unwrap_or("unknown"),
            draft.entry_name,
            reference
        );
        Ok(FinalizeOutcome {
            success: true,
            reference: Some(reference),
            error_detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_logging_automation_returns_reference() {
        let automation = LoggingBookingAutomation;
        let mut draft = BookingDraft::new(Uuid::new_v4(), "Alice".into(), None);
        draft.contact_name = Some("Pat".into());

        let outcome = automation.finalize(&draft).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.reference.unwrap().starts_with("TM-"));
    }
}
