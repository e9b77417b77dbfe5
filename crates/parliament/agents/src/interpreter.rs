//! Routing subsystem: classifies intent, flags ambiguity, names a target.

use std::sync::LazyLock;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_types::{Mode, SubsystemId, SubsystemIdentity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Confidence of an unambiguous routing.
pub const CONFIDENT: f64 = 0.8;
/// Confidence once any ambiguity was found.
pub const AMBIGUOUS: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Query,
    Create,
    Execute,
    Reflect,
    Plan,
}

impl IntentKind {
    pub fn suggested_mode(&self) -> Mode {
        match self {
            IntentKind::Query | IntentKind::Reflect => Mode::Inquiry,
            IntentKind::Create | IntentKind::Plan => Mode::Creation,
            IntentKind::Execute => Mode::Execution,
        }
    }

    /// Default target and keyword overrides, first match wins.
    fn routes(&self) -> (SubsystemId, &'static [(&'static str, SubsystemId)]) {
        match self {
            IntentKind::Query => (
                SubsystemId::Interpreter,
                &[("mission", SubsystemId::Mirror), ("risk", SubsystemId::Ledger)],
            ),
            IntentKind::Create => (
                SubsystemId::Strategist,
                &[("narrative", SubsystemId::Artisan), ("mythos", SubsystemId::Artisan)],
            ),
            IntentKind::Execute => (SubsystemId::Executor, &[]),
            IntentKind::Reflect => (SubsystemId::Mirror, &[]),
            IntentKind::Plan => (SubsystemId::Strategist, &[]),
        }
    }
}

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|source| Regex::new(source).expect("valid intent regex"))
        .collect()
}

/// Classification order doubles as the tie-breaker.
static INTENT_PATTERNS: LazyLock<Vec<(IntentKind, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            IntentKind::Query,
            patterns(&[
                r"\b(what|how|why|when|where|who|explain|tell|show)\b",
                r"\b(status|current|mission|progress|check)\b",
            ]),
        ),
        (
            IntentKind::Create,
            patterns(&[
                r"\b(create|build|make|generate|design|write)\b",
                r"\b(new|develop|craft|compose)\b",
            ]),
        ),
        (
            IntentKind::Execute,
            patterns(&[
                r"\b(run|execute|do|perform|start|deploy)\b",
                r"\b(action|task|command)\b",
            ]),
        ),
        (
            IntentKind::Reflect,
            patterns(&[
                r"\b(reflect|review|assess|evaluate|analyze)\b",
                r"\b(coherence|alignment|progress)\b",
            ]),
        ),
        (
            IntentKind::Plan,
            patterns(&[
                r"\b(plan|strategy|roadmap|approach|steps)\b",
                r"\b(scenario|timeline|forecast)\b",
            ]),
        ),
    ]
});

static VAGUE_PRONOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(it|that|this|those|them)\b").expect("valid pronoun regex"));

const EXECUTION_TARGETS: [&str; 4] = ["file", "api", "command", "task"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterpreterInput {
    pub user_input: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub primary_goal: String,
    pub action_type: IntentKind,
    pub ambiguities: Vec<String>,
    pub requires_clarification: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Routing {
    pub target_subsystem: SubsystemId,
    pub suggested_mode: Mode,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpreterOutput {
    pub intent: Intent,
    pub routing: Routing,
}

#[derive(Clone, Debug, Default)]
pub struct InterpreterLogic;

impl InterpreterLogic {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(text: &str) -> IntentKind {
        let lower = text.to_lowercase();
        let mut best = (IntentKind::Query, 0);
        for (kind, patterns) in INTENT_PATTERNS.iter() {
            let matches = patterns.iter().filter(|p| p.is_match(&lower)).count();
            if matches > best.1 {
                best = (*kind, matches);
            }
        }
        best.0
    }

    pub fn ambiguities(text: &str, kind: IntentKind) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found: Vec<String> = Vec::new();

        for pronoun in VAGUE_PRONOUN.find_iter(&lower) {
            let note = format!("Unclear reference: '{}'", pronoun.as_str());
            if !found.contains(&note) {
                found.push(note);
            }
        }
        if kind == IntentKind::Execute && !EXECUTION_TARGETS.iter().any(|t| lower.contains(t)) {
            found.push("Execution target not specified".to_string());
        }
        if lower.contains("create") && lower.contains("delete") {
            found.push("Contradictory actions detected (create vs delete)".to_string());
        }
        found
    }

    fn route(text: &str, kind: IntentKind, ambiguous: bool) -> Routing {
        let lower = text.to_lowercase();
        let (default, overrides) = kind.routes();
        let target_subsystem = overrides
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, target)| *target)
            .unwrap_or(default);

        Routing {
            target_subsystem,
            suggested_mode: kind.suggested_mode(),
            confidence: if ambiguous { AMBIGUOUS } else { CONFIDENT },
        }
    }
}

#[async_trait]
impl SubsystemLogic for InterpreterLogic {
    type Input = InterpreterInput;
    type Output = InterpreterOutput;

    fn id(&self) -> SubsystemId {
        SubsystemId::Interpreter
    }

    async fn process(&self, input: &InterpreterInput) -> Result<InterpreterOutput, LogicError> {
        let text = input.user_input.trim();
        if text.is_empty() {
            return Err(LogicError::InvalidInput("user_input is empty".to_string()));
        }

        let action_type = Self::classify(text);
        let ambiguities = Self::ambiguities(text, action_type);
        let routing = Self::route(text, action_type, !ambiguities.is_empty());
        let primary_goal = text.split('.').next().unwrap_or(text).trim().to_string();

        debug!(
            action_type = ?action_type,
            target = %routing.target_subsystem,
            confidence = routing.confidence,
            "Intent parsed"
        );
        Ok(InterpreterOutput {
            intent: Intent {
                primary_goal,
                action_type,
                requires_clarification: !ambiguities.is_empty(),
                ambiguities,
            },
            routing,
        })
    }

    /// Execution and creation are never handled by routing itself.
    fn check_output(
        &self,
        _identity: &SubsystemIdentity,
        output: &InterpreterOutput,
    ) -> Result<(), String> {
        let kind = output.intent.action_type;
        if output.routing.target_subsystem == SubsystemId::Interpreter
            && matches!(kind, IntentKind::Execute | IntentKind::Create)
        {
            return Err(format!("interpreter routed a {:?} intent to itself", kind));
        }
        Ok(())
    }
}
