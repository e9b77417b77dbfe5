use async_trait::async_trait;
use parliament_constitution::VetoPatterns;
use parliament_types::FaultCode;
use regex::Regex;
use tracing::debug;

use super::{artifact_text, first_match, keyword_pattern, CheckOutcome, VetoCheck};
use crate::Submission;

/// Long-horizon coherence regression and hard boundary conditions.
pub struct RegressionCheck {
    tolerance: f64,
    boundaries: Vec<(String, Option<Regex>)>,
}

impl RegressionCheck {
    pub fn new(patterns: &VetoPatterns, tolerance: f64) -> Result<Self, regex::Error> {
        let boundaries = patterns
            .boundary_keywords
            .iter()
            .map(|(condition, keywords)| Ok((condition.clone(), keyword_pattern(keywords)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            tolerance,
            boundaries,
        })
    }
}

#[async_trait]
impl VetoCheck for RegressionCheck {
    fn check_name(&self) -> &str {
        "regression"
    }

    async fn evaluate(&self, submission: &Submission) -> CheckOutcome {
        match (
            submission.context.baseline_coherence,
            submission.context.projected_coherence,
        ) {
            (Some(baseline), Some(projected)) => {
                let drop = baseline - projected;
                if drop > self.tolerance {
                    return CheckOutcome::fail(
                        format!(
                            "Projected coherence {:.2} falls {:.2} below baseline {:.2}",
                            projected, drop, baseline
                        ),
                        FaultCode::COHERENCE_VIOLATION,
                    );
                }
            }
            _ => debug!(origin = %submission.origin, "No coherence baseline, skipping regression"),
        }

        let text = artifact_text(&submission.artifact);
        for (condition, pattern) in &self.boundaries {
            if let Some(keyword) = first_match(pattern, &text) {
                return CheckOutcome::fail(
                    format!("Boundary condition {} triggered by '{}'", condition, keyword),
                    FaultCode::BOUNDARY_VIOLATION,
                );
            }
        }

        CheckOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckContext;
    use parliament_types::SubsystemId;
    use serde_json::json;

    fn check() -> RegressionCheck {
        RegressionCheck::new(&VetoPatterns::default(), 0.2).unwrap()
    }

    fn submission(artifact: serde_json::Value, context: CheckContext) -> Submission {
        Submission {
            artifact,
            origin: SubsystemId::Executor,
            action_type: "real_world_execution".into(),
            context,
        }
    }

    #[tokio::test]
    async fn coherence_drop_beyond_tolerance_fails() {
        let outcome = check()
            .evaluate(&submission(
                json!({"task": "reorganise notes"}),
                CheckContext {
                    baseline_coherence: Some(0.8),
                    projected_coherence: Some(0.5),
                },
            ))
            .await;
        assert!(matches!(
            outcome,
            CheckOutcome::Fail { ref fault_code, .. } if fault_code.as_str() == "coherence_violation"
        ));
    }

    #[tokio::test]
    async fn missing_baseline_passes() {
        let outcome = check()
            .evaluate(&submission(
                json!({"task": "reorganise notes"}),
                CheckContext {
                    baseline_coherence: None,
                    projected_coherence: Some(0.1),
                },
            ))
            .await;
        assert!(outcome.is_pass());
    }

    #[tokio::test]
    async fn boundary_keyword_fails_with_condition_name() {
        let outcome = check()
            .evaluate(&submission(
                json!({"task": "permanently destroy the archive"}),
                CheckContext::default(),
            ))
            .await;
        match outcome {
            CheckOutcome::Fail { reason, fault_code } => {
                assert_eq!(fault_code.as_str(), "boundary_violation");
                assert!(reason.contains("crosses_harm_boundary"));
            }
            CheckOutcome::Pass => panic!("expected a boundary failure"),
        }
    }
}
