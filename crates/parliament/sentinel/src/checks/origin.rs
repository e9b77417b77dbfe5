use std::collections::HashMap;

use async_trait::async_trait;
use parliament_constitution::Constitution;
use parliament_types::{FaultCode, SubsystemId};

use super::{CheckOutcome, VetoCheck};
use crate::Submission;

/// Did the submitting subsystem act outside its declared authority?
///
/// Each constraint the origin carries may forbid certain top-level artifact
/// fields; the presence of one is a violation.
pub struct OriginConstraintCheck {
    forbidden: HashMap<SubsystemId, Vec<(String, String)>>,
}

impl OriginConstraintCheck {
    pub fn new(constitution: &Constitution) -> Self {
        let rules = &constitution.veto_patterns.origin_rules;
        let mut forbidden = HashMap::new();

        for id in SubsystemId::ALL {
            if !constitution.subsystems.contains_key(id.as_str()) {
                continue;
            }
            let identity = constitution.identity(id);
            let pairs: Vec<(String, String)> = identity
                .constraints
                .iter()
                .filter_map(|constraint| rules.get(constraint).map(|fields| (constraint, fields)))
                .flat_map(|(constraint, fields)| {
                    fields
                        .iter()
                        .map(move |field| (constraint.clone(), field.clone()))
                })
                .collect();
            forbidden.insert(id, pairs);
        }

        Self { forbidden }
    }
}

#[async_trait]
impl VetoCheck for OriginConstraintCheck {
    fn check_name(&self) -> &str {
        "origin_constraint"
    }

    async fn evaluate(&self, submission: &Submission) -> CheckOutcome {
        let Some(rules) = self.forbidden.get(&submission.origin) else {
            return CheckOutcome::Pass;
        };
        let Some(fields) = submission.artifact.as_object() else {
            return CheckOutcome::Pass;
        };

        for (constraint, field) in rules {
            if fields.contains_key(field) {
                return CheckOutcome::fail(
                    format!(
                        "{} exceeded its authority: '{}' breaches constraint {}",
                        submission.origin, field, constraint
                    ),
                    FaultCode::SUBSYSTEM_CONSTRAINT_VIOLATION,
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
    use serde_json::json;

    fn submission(origin: SubsystemId, artifact: serde_json::Value) -> Submission {
        Submission {
            artifact,
            origin,
            action_type: "execution".into(),
            context: CheckContext::default(),
        }
    }

    #[tokio::test]
    async fn planner_issuing_commands_is_flagged() {
        let check = OriginConstraintCheck::new(&Constitution::default());
        let outcome = check
            .evaluate(&submission(
                SubsystemId::Strategist,
                json!({"plan": "x", "execute_command": "ls"}),
            ))
            .await;
        assert!(matches!(
            outcome,
            CheckOutcome::Fail { ref fault_code, .. }
                if fault_code.as_str() == "subsystem_constraint_violation"
        ));
    }

    #[tokio::test]
    async fn executor_may_carry_commands() {
        let check = OriginConstraintCheck::new(&Constitution::default());
        let outcome = check
            .evaluate(&submission(
                SubsystemId::Executor,
                json!({"execute_command": "ls"}),
            ))
            .await;
        assert!(outcome.is_pass());
    }

    #[tokio::test]
    async fn origin_without_charter_passes() {
        let mut constitution = Constitution::default();
        constitution.subsystems.remove("strategist");
        let check = OriginConstraintCheck::new(&constitution);
        let outcome = check
            .evaluate(&submission(
                SubsystemId::Strategist,
                json!({"execute_command": "ls"}),
            ))
            .await;
        assert!(outcome.is_pass());
    }
}
