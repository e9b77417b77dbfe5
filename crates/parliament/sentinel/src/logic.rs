use std::sync::Arc;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_types::{Decision, SubsystemId, SubsystemIdentity};

use crate::{AdjudicationError, Adjudicator, Submission};

/// Bus action under which the adjudicator is served.
pub const ADJUDICATE_ACTION: &str = "adjudicate";

/// The adjudicator as a wrapped subsystem.
#[derive(Clone)]
pub struct SentinelLogic {
    adjudicator: Arc<Adjudicator>,
}

impl SentinelLogic {
    pub fn new(adjudicator: Arc<Adjudicator>) -> Self {
        Self { adjudicator }
    }

    pub fn adjudicator(&self) -> &Arc<Adjudicator> {
        &self.adjudicator
    }
}

#[async_trait]
impl SubsystemLogic for SentinelLogic {
    type Input = Submission;
    type Output = Decision;

    fn id(&self) -> SubsystemId {
        SubsystemId::Sentinel
    }

    async fn process(&self, input: &Submission) -> Result<Decision, LogicError> {
        self.adjudicator
            .adjudicate(input)
            .await
            .map_err(|err| match err {
                AdjudicationError::Memory(err) => LogicError::Memory(err),
                other => LogicError::Failed(other.to_string()),
            })
    }

    /// Halts stay below the repair limit; escalations only at or above it.
    fn check_output(&self, _identity: &SubsystemIdentity, output: &Decision) -> Result<(), String> {
        let max = self.adjudicator.config().max_repair_cycles;
        match output {
            Decision::Halt { repair_cycle, .. } if *repair_cycle >= max => Err(format!(
                "halt issued at repair cycle {} with a limit of {}",
                repair_cycle, max
            )),
            Decision::Escalate { repair_cycle, .. } if *repair_cycle < max => Err(format!(
                "escalation issued at repair cycle {} below the limit of {}",
                repair_cycle, max
            )),
            _ => Ok(()),
        }
    }
}
