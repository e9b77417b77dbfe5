//! # parliament-constitution
//!
//! The shared rulebook. Supplies each subsystem's authorities and
//! constraints, the per-mode dominant/silent lists, the adjudicator's
//! threshold actions, repair-cycle limit and anti-paralysis window, and the
//! sandbox and bus settings.
//!
//! Loaded once at startup and shared as `Arc<Constitution>`; never mutated
//! for the lifetime of the process.

#![deny(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use parliament_types::{Mode, SubsystemId, SubsystemIdentity};
use serde::{Deserialize, Serialize};
use tracing::info;

mod error;
pub mod settings;

pub use error::ConstitutionError;
pub use settings::{
    AdjudicatorConfig, AntiParalysisConfig, BusConfig, ExecutorConfig, ModeCharter,
    OrchestratorConfig, SubsystemCharter, VetoPatterns,
};

/// Prefix for environment overrides, e.g. `PARLIAMENT__ADJUDICATOR__MAX_REPAIR_CYCLES=5`.
pub const ENV_PREFIX: &str = "PARLIAMENT";

/// Complete constitution document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constitution {
    pub subsystems: BTreeMap<String, SubsystemCharter>,
    pub modes: BTreeMap<String, ModeCharter>,
    pub adjudicator: AdjudicatorConfig,
    pub veto_patterns: VetoPatterns,
    pub bus: BusConfig,
    pub executor: ExecutorConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for Constitution {
    fn default() -> Self {
        let mut subsystems = BTreeMap::new();
        subsystems.insert(
            SubsystemId::Interpreter.to_string(),
            SubsystemCharter::new(
                &["parse_intent", "route_request", "detect_ambiguity"],
                &[
                    "cannot_generate_strategy",
                    "cannot_create_artifacts",
                    "cannot_execute_actions",
                    "cannot_assess_risk",
                ],
            ),
        );
        subsystems.insert(
            SubsystemId::Strategist.to_string(),
            SubsystemCharter::new(
                &["scenario_modeling", "decision_tree_generation", "timeline_planning"],
                &[
                    "no_execution_authority",
                    "cannot_touch_real_systems",
                    "cannot_commit_resources",
                ],
            ),
        );
        subsystems.insert(
            SubsystemId::Artisan.to_string(),
            SubsystemCharter::new(
                &[
                    "narrative_generation",
                    "worldbuilding",
                    "aesthetic_design",
                    "symbolic_composition",
                ],
                &["no_planning", "no_risk_assessment", "no_execution"],
            ),
        );
        subsystems.insert(
            SubsystemId::Ledger.to_string(),
            SubsystemCharter::new(
                &["risk_quantification", "variance_tracking", "backtesting"],
                &["strictly_numeric", "cannot_override_sentinel"],
            ),
        );
        subsystems.insert(
            SubsystemId::Sentinel.to_string(),
            SubsystemCharter::new(
                &["halt_execution", "veto_artifact", "escalate_to_user"],
                &["cannot_create", "cannot_revise", "cannot_propose_alternatives"],
            ),
        );
        subsystems.insert(
            SubsystemId::Executor.to_string(),
            SubsystemCharter::new(
                &["tool_invocation", "file_operations", "command_execution"],
                &[
                    "cannot_originate_goals",
                    "requires_sentinel_approval",
                    "sandboxed_only",
                ],
            ),
        );
        subsystems.insert(
            SubsystemId::Mirror.to_string(),
            SubsystemCharter::new(
                &["coherence_tracking", "reflection", "progress_assessment"],
                &["provides_context_not_commands", "no_therapy_simulation"],
            ),
        );

        let charter = |dominant: &[SubsystemId], silent: &[SubsystemId]| ModeCharter {
            dominant_subsystems: dominant.iter().map(|id| id.to_string()).collect(),
            silent_subsystems: silent.iter().map(|id| id.to_string()).collect(),
        };
        let mut modes = BTreeMap::new();
        modes.insert(
            Mode::Inquiry.to_string(),
            charter(
                &[SubsystemId::Interpreter, SubsystemId::Mirror],
                &[SubsystemId::Executor, SubsystemId::Artisan],
            ),
        );
        modes.insert(
            Mode::Creation.to_string(),
            charter(
                &[SubsystemId::Strategist, SubsystemId::Artisan],
                &[SubsystemId::Executor],
            ),
        );
        modes.insert(
            Mode::Execution.to_string(),
            charter(
                &[SubsystemId::Executor, SubsystemId::Sentinel],
                &[SubsystemId::Artisan],
            ),
        );

        Self {
            subsystems,
            modes,
            adjudicator: AdjudicatorConfig::default(),
            veto_patterns: VetoPatterns::default(),
            bus: BusConfig::default(),
            executor: ExecutorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl Constitution {
    /// Load from a JSON, TOML or YAML file layered over the built-in defaults,
    /// then apply `PARLIAMENT__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConstitutionError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Constitution::default())?)
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let constitution: Constitution = settings.try_deserialize()?;
        constitution.validate()?;
        info!(
            path = %path.display(),
            subsystems = constitution.subsystems.len(),
            threshold_actions = constitution.adjudicator.threshold_actions.len(),
            "Constitution loaded"
        );
        Ok(constitution)
    }

    /// Built-in defaults with `PARLIAMENT__*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConstitutionError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Constitution::default())?)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let constitution: Constitution = settings.try_deserialize()?;
        constitution.validate()?;
        Ok(constitution)
    }

    /// Parse a complete JSON document. No defaults are layered underneath.
    pub fn from_json_str(json: &str) -> Result<Self, ConstitutionError> {
        let constitution: Constitution = serde_json::from_str(json)?;
        constitution.validate()?;
        Ok(constitution)
    }

    /// Check structural and numeric invariants.
    pub fn validate(&self) -> Result<(), ConstitutionError> {
        for name in self.subsystems.keys() {
            name.parse::<SubsystemId>()
                .map_err(|_| ConstitutionError::UnknownSubsystem(name.clone()))?;
        }
        for id in SubsystemId::ALL {
            if !self.subsystems.contains_key(id.as_str()) {
                return Err(ConstitutionError::MissingSubsystem(id.to_string()));
            }
        }

        for mode in [Mode::Inquiry, Mode::Creation, Mode::Execution] {
            let charter = self
                .modes
                .get(mode.as_str())
                .ok_or_else(|| ConstitutionError::MissingMode(mode.to_string()))?;
            for name in charter
                .dominant_subsystems
                .iter()
                .chain(charter.silent_subsystems.iter())
            {
                name.parse::<SubsystemId>()
                    .map_err(|_| ConstitutionError::UnknownSubsystem(name.clone()))?;
            }
        }

        let adjudicator = &self.adjudicator;
        if adjudicator.max_repair_cycles == 0 {
            return Err(ConstitutionError::invalid(
                "adjudicator.max_repair_cycles",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&adjudicator.coherence_tolerance) {
            return Err(ConstitutionError::invalid(
                "adjudicator.coherence_tolerance",
                "must lie in [0, 1]",
            ));
        }

        let window = &adjudicator.anti_paralysis;
        if window.window_size == 0 {
            return Err(ConstitutionError::invalid(
                "adjudicator.anti_paralysis.window_size",
                "must be at least 1",
            ));
        }
        if window.min_samples == 0 || window.min_samples > window.window_size {
            return Err(ConstitutionError::invalid(
                "adjudicator.anti_paralysis.min_samples",
                format!("must lie in [1, {}]", window.window_size),
            ));
        }
        if !(window.halt_threshold > 0.0 && window.halt_threshold <= 1.0) {
            return Err(ConstitutionError::invalid(
                "adjudicator.anti_paralysis.halt_threshold",
                "must lie in (0, 1]",
            ));
        }

        if self.bus.request_timeout_ms == 0 {
            return Err(ConstitutionError::invalid(
                "bus.request_timeout_ms",
                "must be non-zero",
            ));
        }
        let consensus = self.orchestrator.consensus_threshold;
        if !(consensus > 0.0 && consensus <= 1.0) {
            return Err(ConstitutionError::invalid(
                "orchestrator.consensus_threshold",
                "must lie in (0, 1]",
            ));
        }

        Ok(())
    }

    /// Identity of a subsystem as granted by this constitution.
    ///
    /// A subsystem without a charter gets an empty identity; `validate`
    /// rejects such documents, so this only happens for unvalidated input.
    pub fn identity(&self, id: SubsystemId) -> SubsystemIdentity {
        match self.subsystems.get(id.as_str()) {
            Some(charter) => SubsystemIdentity {
                id,
                authorities: charter.authorities.clone(),
                constraints: charter.constraints.clone(),
            },
            None => SubsystemIdentity {
                id,
                authorities: BTreeSet::new(),
                constraints: BTreeSet::new(),
            },
        }
    }

    pub fn dominant_in(&self, mode: Mode) -> Vec<SubsystemId> {
        self.mode_members(mode, |charter| &charter.dominant_subsystems)
    }

    pub fn silent_in(&self, mode: Mode) -> Vec<SubsystemId> {
        self.mode_members(mode, |charter| &charter.silent_subsystems)
    }

    pub fn is_threshold_action(&self, action_type: &str) -> bool {
        self.adjudicator.threshold_actions.contains(action_type)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.request_timeout_ms)
    }

    fn mode_members(
        &self,
        mode: Mode,
        select: impl Fn(&ModeCharter) -> &Vec<String>,
    ) -> Vec<SubsystemId> {
        self.modes
            .get(mode.as_str())
            .map(|charter| {
                select(charter)
                    .iter()
                    .filter_map(|name| name.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
