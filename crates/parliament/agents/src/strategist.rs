//! Planning subsystem: scenario models, a one-level decision tree and a
//! phased timeline for a goal. Plans only; never acts.

use std::fmt;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_types::{SubsystemId, SubsystemIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const EXECUTION_VOCABULARY: [&str; 5] = ["execute", "deploy", "run", "commit", "allocate"];
const HARD_MARKERS: [&str; 3] = ["must", "required", "cannot"];
const DEPENDENCY_MARKERS: [&str; 2] = ["depends on", "requires"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    #[default]
    Immediate,
    Seasonal,
    Epochal,
    /// Anything unrecognised; planned over thirty days.
    #[serde(other)]
    Unspecified,
}

impl TimeHorizon {
    pub fn days(&self) -> u32 {
        match self {
            TimeHorizon::Immediate => 7,
            TimeHorizon::Seasonal => 90,
            TimeHorizon::Epochal => 365,
            TimeHorizon::Unspecified => 30,
        }
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeHorizon::Immediate => "immediate",
            TimeHorizon::Seasonal => "seasonal",
            TimeHorizon::Epochal => "epochal",
            TimeHorizon::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategistInput {
    pub goal: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub time_horizon: TimeHorizon,
    #[serde(default)]
    pub context: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub success: String,
    pub timeline: String,
    pub resource_cost: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub probability: f64,
    pub outcomes: ScenarioOutcome,
    pub mitigation: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: String,
    pub action: String,
    pub next_decision: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub decision: String,
    pub action: String,
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint_gates: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub phase: String,
    pub duration_days: u32,
    pub start_offset_days: u32,
    pub deliverables: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintMap {
    pub hard: Vec<String>,
    pub soft: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub primary_approach: String,
    pub alternative_approaches: Vec<String>,
    pub decision_tree: DecisionTree,
    pub timeline: Vec<Phase>,
    pub constraints: ConstraintMap,
    pub risk_factors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategistOutput {
    pub strategy: Strategy,
    pub scenarios: Vec<Scenario>,
}

impl StrategistOutput {
    /// Probability of the scenario the plan leads with.
    pub fn primary_probability(&self) -> Option<f64> {
        self.scenarios
            .iter()
            .find(|s| s.name == self.strategy.primary_approach)
            .map(|s| s.probability)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StrategistLogic;

impl StrategistLogic {
    pub fn new() -> Self {
        Self
    }

    pub fn scenarios(horizon: TimeHorizon) -> Vec<Scenario> {
        let scenario = |name: &str, probability, success: &str, timeline: String, cost: &str, mitigation: &str| {
            Scenario {
                name: name.to_string(),
                probability,
                outcomes: ScenarioOutcome {
                    success: success.to_string(),
                    timeline,
                    resource_cost: cost.to_string(),
                },
                mitigation: mitigation.to_string(),
            }
        };
        vec![
            scenario(
                "Optimal Path",
                0.3,
                "high",
                format!("Within {} horizon", horizon),
                "moderate",
                "Maintain current trajectory, monitor for deviations",
            ),
            scenario(
                "Conservative Approach",
                0.5,
                "moderate",
                format!("Extended beyond {}", horizon),
                "low",
                "Reduce scope, focus on core deliverables",
            ),
            scenario(
                "Aggressive Timeline",
                0.2,
                "variable",
                format!("Compressed within {}", horizon),
                "high",
                "Parallel workstreams, accept higher risk",
            ),
        ]
    }

    fn decision_tree(goal: &str, scenarios: &[Scenario], constraints: &[String]) -> DecisionTree {
        let branches = scenarios
            .iter()
            .enumerate()
            .map(|(i, s)| Branch {
                condition: format!("Probability: {}", s.probability),
                action: s.name.clone(),
                next_decision: if i == 0 {
                    "Monitor and adjust".to_string()
                } else {
                    "Evaluate alternatives".to_string()
                },
            })
            .collect();
        DecisionTree {
            decision: format!("Approach for: {}", goal),
            action: scenarios.first().map(|s| s.name.clone()).unwrap_or_default(),
            branches,
            constraint_gates: constraints.to_vec(),
        }
    }

    /// Planning 10%, execution 60%, validation 20%, deployment 10%.
    pub fn timeline(horizon: TimeHorizon) -> Vec<Phase> {
        let days = horizon.days();
        let phase = |name: &str, percent: u32, offset: u32, deliverables: &[&str]| Phase {
            phase: name.to_string(),
            duration_days: days * percent / 100,
            start_offset_days: days * offset / 100,
            deliverables: deliverables.iter().map(|d| d.to_string()).collect(),
        };
        vec![
            phase(
                "Planning & Requirements",
                10,
                0,
                &["Detailed plan", "Resource allocation", "Risk assessment"],
            ),
            phase(
                "Core Execution",
                60,
                10,
                &["Incremental progress", "Milestone checkpoints"],
            ),
            phase(
                "Validation & Testing",
                20,
                70,
                &["Quality verification", "Integration testing"],
            ),
            phase(
                "Deployment & Monitoring",
                10,
                90,
                &["Production deployment", "Post-deployment monitoring"],
            ),
        ]
    }

    pub fn map_constraints(constraints: &[String]) -> ConstraintMap {
        let mut map = ConstraintMap::default();
        for constraint in constraints {
            let lower = constraint.to_lowercase();
            if HARD_MARKERS.iter().any(|m| lower.contains(m)) {
                map.hard.push(constraint.clone());
            } else {
                map.soft.push(constraint.clone());
            }
            if DEPENDENCY_MARKERS.iter().any(|m| lower.contains(m)) {
                map.dependencies.push(constraint.clone());
            }
        }
        map
    }

    fn risk_factors(scenarios: &[Scenario]) -> Vec<String> {
        let mut factors = Vec::new();
        if let Some(unlikely) = scenarios.iter().find(|s| s.probability < 0.3) {
            factors.push(format!(
                "Low probability of optimal outcome ({:.0}%)",
                unlikely.probability * 100.0
            ));
        }
        if scenarios.iter().any(|s| s.outcomes.resource_cost == "high") {
            factors.push("High resource cost in some scenarios".to_string());
        }
        if scenarios
            .iter()
            .any(|s| s.outcomes.timeline.starts_with("Compressed"))
        {
            factors.push("Timeline compression may impact quality".to_string());
        }
        factors
    }
}

#[async_trait]
impl SubsystemLogic for StrategistLogic {
    type Input = StrategistInput;
    type Output = StrategistOutput;

    fn id(&self) -> SubsystemId {
        SubsystemId::Strategist
    }

    async fn process(&self, input: &StrategistInput) -> Result<StrategistOutput, LogicError> {
        let goal = input.goal.trim();
        if goal.is_empty() {
            return Err(LogicError::InvalidInput("goal is empty".to_string()));
        }

        let scenarios = Self::scenarios(input.time_horizon);
        let decision_tree = Self::decision_tree(goal, &scenarios, &input.constraints);
        let strategy = Strategy {
            primary_approach: decision_tree.action.clone(),
            alternative_approaches: scenarios.iter().skip(1).take(2).map(|s| s.name.clone()).collect(),
            timeline: Self::timeline(input.time_horizon),
            constraints: Self::map_constraints(&input.constraints),
            risk_factors: Self::risk_factors(&scenarios),
            decision_tree,
        };

        debug!(
            horizon = %input.time_horizon,
            scenarios = scenarios.len(),
            primary = %strategy.primary_approach,
            "Strategy modelled"
        );
        Ok(StrategistOutput {
            strategy,
            scenarios,
        })
    }

    /// Planning language may name actions; it is flagged, never rejected.
    fn check_output(
        &self,
        _identity: &SubsystemIdentity,
        output: &StrategistOutput,
    ) -> Result<(), String> {
        let primary = output.strategy.primary_approach.to_lowercase();
        if let Some(keyword) = EXECUTION_VOCABULARY.iter().find(|k| primary.contains(*k)) {
            warn!(keyword, "Strategy names an execution step; planning only");
        }
        Ok(())
    }
}
