use parliament_bus::BusError;
use parliament_memory::MemoryError;
use parliament_types::{SubsystemId, ViolationId};
use thiserror::Error;

/// Fault raised by subsystem-specific logic.
#[derive(Debug, Error)]
pub enum LogicError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Outcome of a wrapped call that did not produce an output.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("{0} is not active")]
    NotActive(SubsystemId),

    #[error("{subsystem} failed: {source}")]
    Logic {
        subsystem: SubsystemId,
        #[source]
        source: LogicError,
    },

    /// The output failed the subsystem's own post-condition. Always fatal.
    #[error("{subsystem} violated its constraints: {description} ({violation_id})")]
    ConstraintViolation {
        subsystem: SubsystemId,
        description: String,
        violation_id: ViolationId,
    },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("failed to serialize subsystem payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ComplianceError {
    pub fn subsystem(&self) -> Option<SubsystemId> {
        match self {
            ComplianceError::NotActive(id) => Some(*id),
            ComplianceError::Logic { subsystem, .. }
            | ComplianceError::ConstraintViolation { subsystem, .. } => Some(*subsystem),
            ComplianceError::Memory(_) | ComplianceError::Serialization(_) => None,
        }
    }
}
