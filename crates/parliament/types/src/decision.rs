use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::HaltEventId;
use crate::subsystem::SubsystemId;

/// Machine-readable code naming the veto check that failed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultCode(pub String);

impl FaultCode {
    pub const COHERENCE_VIOLATION: &'static str = "coherence_violation";
    pub const BOUNDARY_VIOLATION: &'static str = "boundary_violation";
    pub const USER_ARC_VIOLATION: &'static str = "user_arc_violation";
    pub const EXTERNAL_HARM: &'static str = "external_harm";
    pub const LEGAL_VIOLATION: &'static str = "legal_violation";
    pub const SUBSYSTEM_CONSTRAINT_VIOLATION: &'static str = "subsystem_constraint_violation";

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bare verdict of a [`Decision`], used by the decision window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Halt,
    Escalate,
}

impl Verdict {
    /// Halts and escalations both count against the anti-paralysis rate.
    pub fn is_halting(&self) -> bool {
        matches!(self, Verdict::Halt | Verdict::Escalate)
    }
}

/// The adjudicator's verdict on one submitted artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Halt {
        reason: String,
        fault_code: FaultCode,
        repair_cycle: u32,
        halt_event_id: HaltEventId,
    },
    Escalate {
        reason: String,
        fault_code: FaultCode,
        repair_cycle: u32,
        halt_event_id: HaltEventId,
        escalation_target: String,
    },
}

impl Decision {
    pub const NOT_THRESHOLD_ACTION: &'static str = "not_threshold_action";

    pub fn approve() -> Self {
        Decision::Approve { reason: None }
    }

    pub fn not_threshold_action() -> Self {
        Decision::Approve {
            reason: Some(Self::NOT_THRESHOLD_ACTION.to_string()),
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Approve { .. } => Verdict::Approve,
            Decision::Halt { .. } => Verdict::Halt,
            Decision::Escalate { .. } => Verdict::Escalate,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approve { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Approve { reason } => reason.as_deref(),
            Decision::Halt { reason, .. } | Decision::Escalate { reason, .. } => Some(reason),
        }
    }

    pub fn fault_code(&self) -> Option<&FaultCode> {
        match self {
            Decision::Approve { .. } => None,
            Decision::Halt { fault_code, .. } | Decision::Escalate { fault_code, .. } => {
                Some(fault_code)
            }
        }
    }

    pub fn repair_cycle(&self) -> Option<u32> {
        match self {
            Decision::Approve { .. } => None,
            Decision::Halt { repair_cycle, .. } | Decision::Escalate { repair_cycle, .. } => {
                Some(*repair_cycle)
            }
        }
    }

    pub fn halt_event_id(&self) -> Option<HaltEventId> {
        match self {
            Decision::Approve { .. } => None,
            Decision::Halt { halt_event_id, .. } | Decision::Escalate { halt_event_id, .. } => {
                Some(*halt_event_id)
            }
        }
    }
}

/// Advisory signal published when the recent halt rate exceeds its threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTrigger {
    pub trigger: String,
    pub subsystem: SubsystemId,
    pub halt_rate: f64,
    pub threshold: f64,
    pub halt_count: usize,
    pub window_size: usize,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_decision_accessors() {
        let decision = Decision::Halt {
            reason: "Potential legal violation detected: fraud".into(),
            fault_code: FaultCode::new(FaultCode::LEGAL_VIOLATION),
            repair_cycle: 2,
            halt_event_id: HaltEventId(7),
        };
        assert_eq!(decision.verdict(), Verdict::Halt);
        assert!(!decision.is_approved());
        assert_eq!(decision.repair_cycle(), Some(2));
        assert_eq!(decision.halt_event_id(), Some(HaltEventId(7)));
        assert_eq!(decision.fault_code().map(|c| c.as_str()), Some("legal_violation"));
    }

    #[test]
    fn decision_wire_shape_is_tagged() {
        let json = serde_json::to_value(Decision::not_threshold_action()).unwrap();
        assert_eq!(json["decision"], "approve");
        assert_eq!(json["reason"], "not_threshold_action");

        let back: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(back.reason(), Some(Decision::NOT_THRESHOLD_ACTION));
    }

    #[test]
    fn escalate_counts_as_halting() {
        assert!(Verdict::Escalate.is_halting());
        assert!(Verdict::Halt.is_halting());
        assert!(!Verdict::Approve.is_halting());
    }
}
