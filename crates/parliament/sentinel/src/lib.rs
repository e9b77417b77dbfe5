//! # parliament-sentinel
//!
//! The adjudicator. Any artifact tagged with a threshold action type runs
//! through an ordered veto pipeline; the first failing check becomes a halt,
//! and repeated halts for one origin escalate to a human-facing target. Every
//! resolved decision feeds a trailing window whose halt rate, when too high,
//! publishes an advisory calibration trigger.
//!
//! Non-threshold actions are approved immediately with reason
//! `not_threshold_action`.

#![deny(unsafe_code)]

use parliament_types::SubsystemId;
use serde::{Deserialize, Serialize};

mod adjudicator;
pub mod checks;
mod error;
mod logic;
mod window;

pub use adjudicator::{Adjudicator, AdjudicatorStatus, Phase, ANTI_PARALYSIS_TRIGGER};
pub use checks::{
    BoundaryCheck, CheckOutcome, LegalCheck, OriginConstraintCheck, RegressionCheck, VetoCheck,
};
pub use error::AdjudicationError;
pub use logic::{SentinelLogic, ADJUDICATE_ACTION};
pub use window::{DecisionWindow, WindowSignal};

/// An artifact submitted for adjudication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub artifact: serde_json::Value,
    pub origin: SubsystemId,
    pub action_type: String,
    #[serde(default)]
    pub context: CheckContext,
}

/// Optional data some checks depend on. Missing values make those checks pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_coherence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_coherence: Option<f64>,
}
