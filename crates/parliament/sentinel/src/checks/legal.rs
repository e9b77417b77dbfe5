use async_trait::async_trait;
use parliament_constitution::VetoPatterns;
use parliament_types::FaultCode;
use regex::Regex;

use super::{artifact_text, first_match, keyword_pattern, CheckOutcome, VetoCheck};
use crate::Submission;

/// Known-prohibited activity patterns. A keyword heuristic, not a
/// classification.
pub struct LegalCheck {
    prohibited: Option<Regex>,
}

impl LegalCheck {
    pub fn new(patterns: &VetoPatterns) -> Result<Self, regex::Error> {
        Ok(Self {
            prohibited: keyword_pattern(&patterns.prohibited_keywords)?,
        })
    }
}

#[async_trait]
impl VetoCheck for LegalCheck {
    fn check_name(&self) -> &str {
        "legal"
    }

    async fn evaluate(&self, submission: &Submission) -> CheckOutcome {
        let text = artifact_text(&submission.artifact);
        match first_match(&self.prohibited, &text) {
            Some(keyword) => CheckOutcome::fail(
                format!("Potential legal violation detected: {}", keyword),
                FaultCode::LEGAL_VIOLATION,
            ),
            None => CheckOutcome::Pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckContext;
    use parliament_types::SubsystemId;
    use serde_json::json;

    #[tokio::test]
    async fn prohibited_keyword_fails() {
        let check = LegalCheck::new(&VetoPatterns::default()).unwrap();
        let submission = Submission {
            artifact: json!("route the funds through a laundering scheme"),
            origin: SubsystemId::Executor,
            action_type: "financial_exposure".into(),
            context: CheckContext::default(),
        };
        let outcome = check.evaluate(&submission).await;
        assert_eq!(
            outcome,
            CheckOutcome::fail(
                "Potential legal violation detected: laundering",
                FaultCode::LEGAL_VIOLATION
            )
        );
    }
}
