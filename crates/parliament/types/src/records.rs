use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decision::FaultCode;
use crate::subsystem::{Mode, SubsystemId};

/// Identifier of an audit record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

/// Identifier of a persisted halt event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HaltEventId(pub u64);

impl fmt::Display for HaltEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "halt-{}", self.0)
    }
}

/// Identifier of a persisted violation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViolationId(pub u64);

impl fmt::Display for ViolationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viol-{}", self.0)
    }
}

/// What an audit record documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    InputReceived,
    OutputGenerated,
    ProcessingError,
    TaskExecuted,
    CoherenceTracking,
    Other(String),
}

impl AuditEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AuditEventType::InputReceived => "input_received",
            AuditEventType::OutputGenerated => "output_generated",
            AuditEventType::ProcessingError => "processing_error",
            AuditEventType::TaskExecuted => "task_executed",
            AuditEventType::CoherenceTracking => "coherence_tracking",
            AuditEventType::Other(name) => name,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record written around every subsystem invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: RecordId,
    pub subsystem: SubsystemId,
    pub event_type: AuditEventType,
    pub mode: Option<Mode>,
    pub payload: serde_json::Value,
    pub related: Option<RecordId>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only record of an adjudicator halt or escalation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HaltEvent {
    pub id: HaltEventId,
    pub origin: SubsystemId,
    pub reason: String,
    pub fault_code: FaultCode,
    pub repair_cycle: u32,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ConstraintViolation,
    UnauthorizedAction,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::ConstraintViolation => f.write_str("constraint_violation"),
            ViolationKind::UnauthorizedAction => f.write_str("unauthorized_action"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

/// Persisted when a subsystem's own output fails its post-condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: ViolationId,
    pub subsystem: SubsystemId,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    pub context: Option<serde_json::Value>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}
