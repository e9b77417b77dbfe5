//! Operational settings carried by the constitution.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A subsystem's entry in the rulebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemCharter {
    pub authorities: BTreeSet<String>,
    pub constraints: BTreeSet<String>,
}

impl SubsystemCharter {
    pub(crate) fn new(authorities: &[&str], constraints: &[&str]) -> Self {
        Self {
            authorities: authorities.iter().map(|s| s.to_string()).collect(),
            constraints: constraints.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Which subsystems lead and which stay quiet in a mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeCharter {
    #[serde(default)]
    pub dominant_subsystems: Vec<String>,
    #[serde(default)]
    pub silent_subsystems: Vec<String>,
}

/// Adjudicator jurisdiction, repair loop and anti-paralysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicatorConfig {
    /// Action types that require review. Everything else is protected exploration.
    pub threshold_actions: BTreeSet<String>,
    pub max_repair_cycles: u32,
    /// Human-facing target named by escalations.
    pub escalation_target: String,
    /// Largest tolerated drop from baseline to projected coherence.
    pub coherence_tolerance: f64,
    pub anti_paralysis: AntiParalysisConfig,
}

impl Default for AdjudicatorConfig {
    fn default() -> Self {
        Self {
            threshold_actions: [
                "execution",
                "real_world_execution",
                "publication",
                "financial_exposure",
                "irreversible_action",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_repair_cycles: 3,
            escalation_target: "user_via_mirror".to_string(),
            coherence_tolerance: 0.2,
            anti_paralysis: AntiParalysisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiParalysisConfig {
    /// Number of most recent decisions kept in the window.
    pub window_size: usize,
    /// Decisions required before the rate is evaluated.
    pub min_samples: usize,
    /// Rate of halting decisions above which calibration is signalled.
    pub halt_threshold: f64,
}

impl Default for AntiParalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_samples: 10,
            halt_threshold: 0.3,
        }
    }
}

/// Keyword and pattern tables consumed by the heuristic veto checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoPatterns {
    /// Halt condition name to the keywords that signal it.
    pub boundary_keywords: BTreeMap<String, Vec<String>>,
    /// Patterns threatening the requester's own trajectory.
    pub user_arc_patterns: Vec<String>,
    /// Patterns threatening third parties or external systems.
    pub external_world_patterns: Vec<String>,
    pub prohibited_keywords: Vec<String>,
    /// Constraint token to artifact fields whose presence breaches it.
    pub origin_rules: BTreeMap<String, Vec<String>>,
}

impl Default for VetoPatterns {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut boundary_keywords = BTreeMap::new();
        boundary_keywords.insert(
            "crosses_harm_boundary".to_string(),
            list(&["harm", "damage", "hurt", "destroy"]),
        );
        boundary_keywords.insert(
            "violates_legality".to_string(),
            list(&["illegal", "unlawful", "fraud"]),
        );
        boundary_keywords.insert(
            "creates_irreversible_action".to_string(),
            list(&["delete", "irreversible", "permanent"]),
        );

        let mut origin_rules = BTreeMap::new();
        for constraint in ["no_execution_authority", "cannot_execute_actions", "no_execution"] {
            origin_rules.insert(constraint.to_string(), list(&["execute_command", "command"]));
        }
        origin_rules.insert(
            "cannot_commit_resources".to_string(),
            list(&["allocate_funds", "commit_resources"]),
        );
        origin_rules.insert("no_planning".to_string(), list(&["timeline", "decision_tree"]));
        origin_rules.insert("strictly_numeric".to_string(), list(&["narrative"]));
        origin_rules.insert("cannot_create".to_string(), list(&["creation"]));

        Self {
            boundary_keywords,
            user_arc_patterns: list(&["abandon_mission", "sabotage_own_goals", "self_harm"]),
            external_world_patterns: list(&[
                "harm_others",
                "privacy_breach",
                "mass_surveillance",
                "disable_safety",
            ]),
            prohibited_keywords: list(&[
                "illegal",
                "fraud",
                "laundering",
                "hack",
                "exploit",
                "steal",
                "insider trading",
                "manipulation",
            ]),
            origin_rules,
        }
    }
}

/// Request/reply settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub request_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

/// Sandbox limits for the action subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub sandbox_timeout_secs: u64,
    pub allowed_paths: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sandbox_timeout_secs: 30,
            allowed_paths: vec!["/tmp".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Fixed acceptance threshold for the combined consensus score.
    pub consensus_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.66,
        }
    }
}
