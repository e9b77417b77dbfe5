use parliament_agents::mirror::Reflection;
use parliament_agents::{
    ArtisanOutput, ExecutionResult, InterpreterOutput, LedgerOutput, Routing, StrategistOutput,
};
use parliament_types::{Decision, Mode, SubsystemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One user request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AskRequest {
    pub text: String,
    /// Detected from `text` when absent.
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Free-form context. Recognised keys: `task`, `theme`, `time_horizon`,
    /// `current_mission`.
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub consensus: bool,
}

impl AskRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_consensus(mut self) -> Self {
        self.consensus = true;
        self
    }
}

/// Outputs of every subsystem consulted, by subsystem.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsystemOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<InterpreterOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategist: Option<StrategistOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artisan: Option<ArtisanOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<LedgerOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutionResult>,
}

impl SubsystemOutputs {
    pub fn count(&self) -> usize {
        [
            self.interpreter.is_some(),
            self.strategist.is_some(),
            self.artisan.is_some(),
            self.ledger.is_some(),
            self.executor.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub subsystem: SubsystemId,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub score: f64,
    pub threshold: f64,
    pub threshold_met: bool,
    pub perspectives: Vec<Perspective>,
}

/// Aggregated answer to one [`AskRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChorusResponse {
    pub mode_used: Mode,
    pub routing: Routing,
    /// Subsystems consulted, in the order they were first called.
    pub involved: Vec<SubsystemId>,
    /// Dominant subsystems of the mode used.
    pub dominant: Vec<SubsystemId>,
    pub outputs: SubsystemOutputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
    /// The halting decision, when an action was halted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt: Option<Decision>,
    /// The escalating decision, when an action was escalated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Decision>,
    pub reflection: Reflection,
}

impl ChorusResponse {
    pub fn involves(&self, id: SubsystemId) -> bool {
        self.involved.contains(&id)
    }
}
