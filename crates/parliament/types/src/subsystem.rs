use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The seven bounded decision-making units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemId {
    /// Routing: parses intent and names a target subsystem.
    Interpreter,
    /// Planning.
    Strategist,
    /// Generative.
    Artisan,
    /// Quantification.
    Ledger,
    /// Adjudicator with veto power over every other subsystem.
    Sentinel,
    /// Action gateway.
    Executor,
    /// Reflection.
    Mirror,
}

impl SubsystemId {
    pub const ALL: [SubsystemId; 7] = [
        SubsystemId::Interpreter,
        SubsystemId::Strategist,
        SubsystemId::Artisan,
        SubsystemId::Ledger,
        SubsystemId::Sentinel,
        SubsystemId::Executor,
        SubsystemId::Mirror,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemId::Interpreter => "interpreter",
            SubsystemId::Strategist => "strategist",
            SubsystemId::Artisan => "artisan",
            SubsystemId::Ledger => "ledger",
            SubsystemId::Sentinel => "sentinel",
            SubsystemId::Executor => "executor",
            SubsystemId::Mirror => "mirror",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubsystemId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubsystemId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ParseError::UnknownSubsystem(s.to_string()))
    }
}

/// Global operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Inquiry,
    Creation,
    Execution,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Inquiry => "inquiry",
            Mode::Creation => "creation",
            Mode::Execution => "execution",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(Mode::Inquiry),
            "creation" => Ok(Mode::Creation),
            "execution" => Ok(Mode::Execution),
            other => Err(ParseError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

/// Process-wide mode cell.
///
/// Written by the orchestrator, read by every wrapped subsystem when it
/// stamps audit records. Cloning shares the same cell.
#[derive(Clone, Debug, Default)]
pub struct ModeState {
    inner: Arc<RwLock<Option<Mode>>>,
}

impl ModeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode, if one has been set.
    pub fn current(&self) -> Option<Mode> {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the mode and return the previous one.
    pub fn set(&self, mode: Mode) -> Option<Mode> {
        let previous = {
            let mut guard = match self.inner.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.replace(mode)
        };

        if previous != Some(mode) {
            tracing::info!(
                target: crate::REFLECTIVE_TARGET,
                log_type = "mode_change",
                mode = %mode,
                previous_mode = ?previous.map(|m| m.as_str()),
                "Mode changed to {}",
                mode
            );
        }
        previous
    }
}

/// A subsystem's granted authorities and denied-action constraints.
///
/// Immutable after the constitution is loaded; shared read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemIdentity {
    pub id: SubsystemId,
    pub authorities: BTreeSet<String>,
    pub constraints: BTreeSet<String>,
}

impl SubsystemIdentity {
    pub fn new(
        id: SubsystemId,
        authorities: impl IntoIterator<Item = impl Into<String>>,
        constraints: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id,
            authorities: authorities.into_iter().map(Into::into).collect(),
            constraints: constraints.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_authority(&self, action: &str) -> bool {
        self.authorities.contains(action)
    }

    pub fn is_constrained_by(&self, constraint: &str) -> bool {
        self.constraints.contains(constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_ids_round_trip_through_str() {
        for id in SubsystemId::ALL {
            assert_eq!(id.as_str().parse::<SubsystemId>(), Ok(id));
        }
        assert!(matches!(
            "oracle".parse::<SubsystemId>(),
            Err(ParseError::UnknownSubsystem(_))
        ));
    }

    #[test]
    fn subsystem_id_serializes_snake_case() {
        let json = serde_json::to_string(&SubsystemId::Sentinel).unwrap();
        assert_eq!(json, "\"sentinel\"");
    }

    #[test]
    fn mode_state_is_shared_between_clones() {
        let state = ModeState::new();
        let reader = state.clone();
        assert_eq!(reader.current(), None);

        assert_eq!(state.set(Mode::Creation), None);
        assert_eq!(reader.current(), Some(Mode::Creation));
        assert_eq!(state.set(Mode::Execution), Some(Mode::Creation));
    }

    #[test]
    fn identity_lookups() {
        let identity = SubsystemIdentity::new(
            SubsystemId::Sentinel,
            ["halt_execution"],
            ["cannot_create", "cannot_revise"],
        );
        assert!(identity.has_authority("halt_execution"));
        assert!(!identity.has_authority("create_artifact"));
        assert!(identity.is_constrained_by("cannot_create"));
    }
}
