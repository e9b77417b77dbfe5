//! # parliament-memory
//!
//! Persistence collaborator for the parliament. Every record is append-only:
//! audit records written by the compliance wrapper, violation records for
//! failed post-conditions and halt events written by the adjudicator.

#![deny(unsafe_code)]

use async_trait::async_trait;
use parliament_types::{
    AuditEventType, AuditRecord, FaultCode, HaltEvent, HaltEventId, Mode, RecordId, Severity,
    SubsystemId, ViolationId, ViolationKind, ViolationRecord,
};
use serde_json::Value;

mod error;
mod memory;

pub use error::MemoryError;
pub use memory::InMemoryStore;

/// Append-only store shared by every subsystem.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist one audit record and return its id.
    async fn append_audit_record(
        &self,
        subsystem: SubsystemId,
        event_type: AuditEventType,
        mode: Option<Mode>,
        payload: Value,
        related: Option<RecordId>,
    ) -> Result<RecordId, MemoryError>;

    async fn append_violation(
        &self,
        subsystem: SubsystemId,
        kind: ViolationKind,
        severity: Severity,
        description: String,
        context: Option<Value>,
    ) -> Result<ViolationId, MemoryError>;

    async fn append_halt_event(
        &self,
        origin: SubsystemId,
        reason: String,
        fault_code: FaultCode,
        repair_cycle: u32,
    ) -> Result<HaltEventId, MemoryError>;

    /// Numeric `score` fields of the subsystem's records of `event_type`
    /// written within the trailing `window`, oldest first.
    async fn read_recent_decision_scores(
        &self,
        subsystem: SubsystemId,
        event_type: &AuditEventType,
        window: chrono::Duration,
    ) -> Result<Vec<f64>, MemoryError>;

    async fn audit_record(&self, id: RecordId) -> Result<AuditRecord, MemoryError>;

    /// Most recent audit records of a subsystem, newest first.
    async fn recent_audit_records(
        &self,
        subsystem: SubsystemId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, MemoryError>;

    /// Halt events, optionally restricted to one origin, oldest first.
    async fn halt_events(&self, origin: Option<SubsystemId>) -> Result<Vec<HaltEvent>, MemoryError>;

    async fn violations(
        &self,
        subsystem: Option<SubsystemId>,
    ) -> Result<Vec<ViolationRecord>, MemoryError>;
}
