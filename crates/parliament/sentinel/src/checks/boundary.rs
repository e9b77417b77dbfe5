use async_trait::async_trait;
use parliament_constitution::VetoPatterns;
use parliament_types::FaultCode;
use regex::Regex;

use super::{artifact_text, first_match, phrase_pattern, CheckOutcome, VetoCheck};
use crate::Submission;

/// Dual anchoring: the requester's own trajectory first, then third parties.
pub struct BoundaryCheck {
    user_arc: Option<Regex>,
    external_world: Option<Regex>,
}

impl BoundaryCheck {
    pub fn new(patterns: &VetoPatterns) -> Result<Self, regex::Error> {
        Ok(Self {
            user_arc: phrase_pattern(&patterns.user_arc_patterns)?,
            external_world: phrase_pattern(&patterns.external_world_patterns)?,
        })
    }
}

#[async_trait]
impl VetoCheck for BoundaryCheck {
    fn check_name(&self) -> &str {
        "boundary"
    }

    async fn evaluate(&self, submission: &Submission) -> CheckOutcome {
        let text = artifact_text(&submission.artifact);

        if let Some(pattern) = first_match(&self.user_arc, &text) {
            return CheckOutcome::fail(
                format!("Threatens the user's own trajectory: {}", pattern),
                FaultCode::USER_ARC_VIOLATION,
            );
        }
        if let Some(pattern) = first_match(&self.external_world, &text) {
            return CheckOutcome::fail(
                format!("Threatens external parties or systems: {}", pattern),
                FaultCode::EXTERNAL_HARM,
            );
        }

        CheckOutcome::Pass
    }
}
