//! In-memory store for development and testing.
//!
//! Records live for the lifetime of the process only.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parliament_types::{
    AuditEventType, AuditRecord, FaultCode, HaltEvent, HaltEventId, Mode, RecordId, Severity,
    SubsystemId, ViolationId, ViolationKind, ViolationRecord,
};
use serde_json::Value;
use tracing::debug;

use crate::{MemoryError, MemoryStore};

/// DashMap-backed [`MemoryStore`]. Cloning shares the same records.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    audit: Arc<DashMap<RecordId, AuditRecord>>,
    by_subsystem: Arc<DashMap<SubsystemId, Vec<RecordId>>>,
    violations: Arc<DashMap<ViolationId, ViolationRecord>>,
    halts: Arc<DashMap<HaltEventId, HaltEvent>>,
    next_id: Arc<AtomicU64>,
    outage: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`MemoryError::Unavailable`]
    /// until cleared. Used to exercise failure paths.
    pub fn simulate_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    pub fn audit_count(&self) -> usize {
        self.audit.len()
    }

    fn ensure_available(&self) -> Result<(), MemoryError> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(MemoryError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append_audit_record(
        &self,
        subsystem: SubsystemId,
        event_type: AuditEventType,
        mode: Option<Mode>,
        payload: Value,
        related: Option<RecordId>,
    ) -> Result<RecordId, MemoryError> {
        self.ensure_available()?;

        let id = RecordId(self.next());
        debug!(record_id = %id, subsystem = %subsystem, event_type = %event_type, "Appending audit record");
        self.audit.insert(
            id,
            AuditRecord {
                id,
                subsystem,
                event_type,
                mode,
                payload,
                related,
                recorded_at: Utc::now(),
            },
        );
        self.by_subsystem.entry(subsystem).or_default().push(id);
        Ok(id)
    }

    async fn append_violation(
        &self,
        subsystem: SubsystemId,
        kind: ViolationKind,
        severity: Severity,
        description: String,
        context: Option<Value>,
    ) -> Result<ViolationId, MemoryError> {
        self.ensure_available()?;

        let id = ViolationId(self.next());
        debug!(violation_id = %id, subsystem = %subsystem, kind = %kind, "Appending violation");
        self.violations.insert(
            id,
            ViolationRecord {
                id,
                subsystem,
                kind,
                severity,
                description,
                context,
                recorded_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn append_halt_event(
        &self,
        origin: SubsystemId,
        reason: String,
        fault_code: FaultCode,
        repair_cycle: u32,
    ) -> Result<HaltEventId, MemoryError> {
        self.ensure_available()?;

        let id = HaltEventId(self.next());
        debug!(halt_event_id = %id, origin = %origin, repair_cycle, "Appending halt event");
        self.halts.insert(
            id,
            HaltEvent {
                id,
                origin,
                reason,
                fault_code,
                repair_cycle,
                recorded_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn read_recent_decision_scores(
        &self,
        subsystem: SubsystemId,
        event_type: &AuditEventType,
        window: chrono::Duration,
    ) -> Result<Vec<f64>, MemoryError> {
        self.ensure_available()?;

        let since = Utc::now() - window;
        let ids = self
            .by_subsystem
            .get(&subsystem)
            .map(|ids| ids.clone())
            .unwrap_or_default();

        let scores = ids
            .iter()
            .filter_map(|id| self.audit.get(id))
            .filter(|record| &record.event_type == event_type && record.recorded_at >= since)
            .filter_map(|record| record.payload.get("score").and_then(Value::as_f64))
            .collect();
        Ok(scores)
    }

    async fn audit_record(&self, id: RecordId) -> Result<AuditRecord, MemoryError> {
        self.ensure_available()?;
        self.audit
            .get(&id)
            .map(|record| record.clone())
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    async fn recent_audit_records(
        &self,
        subsystem: SubsystemId,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, MemoryError> {
        self.ensure_available()?;

        let ids = self
            .by_subsystem
            .get(&subsystem)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.audit.get(id).map(|record| record.clone()))
            .collect())
    }

    async fn halt_events(&self, origin: Option<SubsystemId>) -> Result<Vec<HaltEvent>, MemoryError> {
        self.ensure_available()?;

        let mut events: Vec<HaltEvent> = self
            .halts
            .iter()
            .filter(|event| origin.map_or(true, |o| event.origin == o))
            .map(|event| event.clone())
            .collect();
        events.sort_by_key(|event| event.id);
        Ok(events)
    }

    async fn violations(
        &self,
        subsystem: Option<SubsystemId>,
    ) -> Result<Vec<ViolationRecord>, MemoryError> {
        self.ensure_available()?;

        let mut records: Vec<ViolationRecord> = self
            .violations
            .iter()
            .filter(|record| subsystem.map_or(true, |s| record.subsystem == s))
            .map(|record| record.clone())
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }
}
