//! # parliament-compliance
//!
//! Every subsystem call goes through [`Subsystem::invoke`], which enforces a
//! fixed contract:
//!
//! 1. Reject the call if the subsystem has not been activated.
//! 2. Persist the raw input as an audit record.
//! 3. Run the subsystem logic. A fault is recorded against the input record
//!    and re-raised.
//! 4. Check the output against the subsystem's own post-condition. A failure
//!    is persisted as a major constraint violation and is fatal to the call.
//! 5. Persist the output against the input record and return it.
//!
//! Subsystem logic never checks its own authority beyond what
//! [`SubsystemLogic::check_output`] encodes.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parliament_bus::{MessageBus, RequestHandler};
use parliament_constitution::Constitution;
use parliament_memory::MemoryStore;
use parliament_types::{
    AuditEventType, Mode, ModeState, Payload, Severity, SubsystemId, SubsystemIdentity, Topic,
    ViolationId, ViolationKind,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

mod error;

pub use error::{ComplianceError, LogicError};

/// Subsystem-specific behaviour, opaque to the wrapper.
///
/// `process` must be safe to retry and must signal internal failures with a
/// [`LogicError`].
#[async_trait]
pub trait SubsystemLogic: Send + Sync + 'static {
    type Input: Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + Send + Sync;

    fn id(&self) -> SubsystemId;

    /// Setup handshake run by [`Subsystem::activate`].
    async fn setup(&self) -> Result<(), LogicError> {
        Ok(())
    }

    async fn process(&self, input: &Self::Input) -> Result<Self::Output, LogicError>;

    /// Post-condition over the produced output. `Err` carries the violation
    /// description.
    fn check_output(
        &self,
        _identity: &SubsystemIdentity,
        _output: &Self::Output,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// A subsystem logic bound to its constitutional identity.
pub struct Subsystem<L: SubsystemLogic> {
    identity: SubsystemIdentity,
    logic: L,
    constitution: Arc<Constitution>,
    store: Arc<dyn MemoryStore>,
    mode: ModeState,
    bus: Option<Arc<dyn MessageBus>>,
    active: AtomicBool,
}

impl<L: SubsystemLogic> Subsystem<L> {
    /// Wrap `logic`. The subsystem starts inactive.
    pub fn new(
        logic: L,
        constitution: Arc<Constitution>,
        store: Arc<dyn MemoryStore>,
        mode: ModeState,
    ) -> Self {
        let identity = constitution.identity(logic.id());
        Self {
            identity,
            logic,
            constitution,
            store,
            mode,
            bus: None,
            active: AtomicBool::new(false),
        }
    }

    /// Announce constraint violations on `bus` as well as persisting them.
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn id(&self) -> SubsystemId {
        self.identity.id
    }

    pub fn identity(&self) -> &SubsystemIdentity {
        &self.identity
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    /// Complete the setup handshake.
    pub async fn activate(&self) -> Result<(), ComplianceError> {
        self.logic
            .setup()
            .await
            .map_err(|source| ComplianceError::Logic {
                subsystem: self.id(),
                source,
            })?;
        self.active.store(true, Ordering::SeqCst);
        info!(subsystem = %self.id(), "Subsystem activated");
        Ok(())
    }

    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(subsystem = %self.id(), "Subsystem deactivated");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_dominant_in_mode(&self, mode: Mode) -> bool {
        self.constitution.dominant_in(mode).contains(&self.id())
    }

    /// Whether the subsystem speaks in `mode`, i.e. is not listed as silent.
    pub fn is_active_in_mode(&self, mode: Mode) -> bool {
        !self.constitution.silent_in(mode).contains(&self.id())
    }

    /// Run one call through the compliance contract.
    pub async fn invoke(&self, input: &L::Input) -> Result<L::Output, ComplianceError> {
        let id = self.id();
        if !self.is_active() {
            return Err(ComplianceError::NotActive(id));
        }

        let mode = self.mode.current();
        let input_snapshot = serde_json::to_value(input)?;
        let input_record = self
            .store
            .append_audit_record(
                id,
                AuditEventType::InputReceived,
                mode,
                input_snapshot.clone(),
                None,
            )
            .await?;
        debug!(subsystem = %id, record_id = %input_record, "Input recorded");

        let output = match self.logic.process(input).await {
            Ok(output) => output,
            Err(source) => {
                if let Err(err) = self
                    .store
                    .append_audit_record(
                        id,
                        AuditEventType::ProcessingError,
                        mode,
                        json!({ "error": source.to_string() }),
                        Some(input_record),
                    )
                    .await
                {
                    warn!(subsystem = %id, error = %err, "Failed to record processing error");
                }
                warn!(subsystem = %id, error = %source, "Subsystem logic failed");
                return Err(ComplianceError::Logic {
                    subsystem: id,
                    source,
                });
            }
        };

        let output_snapshot = serde_json::to_value(&output)?;
        if let Err(description) = self.logic.check_output(&self.identity, &output) {
            let violation_id = self
                .store
                .append_violation(
                    id,
                    ViolationKind::ConstraintViolation,
                    Severity::Major,
                    description.clone(),
                    Some(json!({
                        "input": input_snapshot,
                        "output": output_snapshot,
                        "input_record": input_record,
                    })),
                )
                .await?;
            warn!(
                subsystem = %id,
                violation_id = %violation_id,
                description = %description,
                "Output failed post-condition"
            );
            self.announce_violation(violation_id).await;
            return Err(ComplianceError::ConstraintViolation {
                subsystem: id,
                description,
                violation_id,
            });
        }

        let output_record = self
            .store
            .append_audit_record(
                id,
                AuditEventType::OutputGenerated,
                mode,
                output_snapshot,
                Some(input_record),
            )
            .await?;
        debug!(subsystem = %id, record_id = %output_record, "Output recorded");

        Ok(output)
    }
}

/// Serve wrapped calls over the bus: `params` is the subsystem input.
impl<L: SubsystemLogic> Subsystem<L> {
    /// Best effort: the violation is already persisted and the call already
    /// failed, so a publish failure is only logged.
    async fn announce_violation(&self, violation_id: ViolationId) {
        let Some(bus) = &self.bus else {
            return;
        };
        let id = self.id();
        let record = match self.store.violations(Some(id)).await {
            Ok(records) => records.into_iter().find(|r| r.id == violation_id),
            Err(err) => {
                warn!(subsystem = %id, error = %err, "Failed to read back violation");
                return;
            }
        };
        let Some(record) = record else {
            return;
        };
        if let Err(err) = bus
            .publish(&Topic::violations(), id, Payload::Violation(record))
            .await
        {
            warn!(subsystem = %id, error = %err, "Failed to publish violation");
        }
    }
}

#[async_trait]
impl<L: SubsystemLogic> RequestHandler for Subsystem<L> {
    async fn handle(&self, action: &str, params: Value) -> Result<Value, String> {
        debug!(subsystem = %self.id(), action, "Handling bus request");
        let input: L::Input = serde_json::from_value(params)
            .map_err(|err| format!("invalid {} input: {}", self.id(), err))?;
        let output = self.invoke(&input).await.map_err(|err| err.to_string())?;
        serde_json::to_value(&output).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parliament_bus::InMemoryBus;
    use parliament_memory::InMemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    /// Upper-cases its input; refuses empty text; emits "COMMAND" on request.
    struct Shout;

    #[async_trait]
    impl SubsystemLogic for Shout {
        type Input = Note;
        type Output = Note;

        fn id(&self) -> SubsystemId {
            SubsystemId::Mirror
        }

        async fn process(&self, input: &Note) -> Result<Note, LogicError> {
            if input.text.is_empty() {
                return Err(LogicError::InvalidInput("empty text".into()));
            }
            Ok(Note {
                text: input.text.to_uppercase(),
            })
        }

        fn check_output(&self, identity: &SubsystemIdentity, output: &Note) -> Result<(), String> {
            if identity.is_constrained_by("provides_context_not_commands")
                && output.text.contains("COMMAND")
            {
                return Err("reflection contains a command".to_string());
            }
            Ok(())
        }
    }

    async fn wrapped() -> (Subsystem<Shout>, InMemoryStore) {
        let store = InMemoryStore::new();
        let subsystem = Subsystem::new(
            Shout,
            Arc::new(Constitution::default()),
            Arc::new(store.clone()),
            ModeState::new(),
        );
        subsystem.activate().await.unwrap();
        (subsystem, store)
    }

    fn note(text: &str) -> Note {
        Note { text: text.into() }
    }

    #[tokio::test]
    async fn inactive_subsystem_rejects_calls() {
        let store = InMemoryStore::new();
        let subsystem = Subsystem::new(
            Shout,
            Arc::new(Constitution::default()),
            Arc::new(store.clone()),
            ModeState::new(),
        );
        let err = subsystem.invoke(&note("hello")).await.unwrap_err();
        assert!(matches!(err, ComplianceError::NotActive(SubsystemId::Mirror)));
        assert_eq!(store.audit_count(), 0);
    }

    #[tokio::test]
    async fn success_records_input_and_correlated_output() {
        let (subsystem, store) = wrapped().await;
        let output = subsystem.invoke(&note("hello")).await.unwrap();
        assert_eq!(output.text, "HELLO");

        let records = store
            .recent_audit_records(SubsystemId::Mirror, 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        let (out, input) = (&records[0], &records[1]);
        assert_eq!(input.event_type, AuditEventType::InputReceived);
        assert_eq!(out.event_type, AuditEventType::OutputGenerated);
        assert_eq!(out.related, Some(input.id));
    }

    #[tokio::test]
    async fn repeated_calls_give_independent_records_and_identical_outputs() {
        let (subsystem, store) = wrapped().await;
        let first = subsystem.invoke(&note("same")).await.unwrap();
        let second = subsystem.invoke(&note("same")).await.unwrap();

        assert_eq!(first, second);
        let records = store
            .recent_audit_records(SubsystemId::Mirror, 10)
            .await
            .unwrap();
        let inputs: Vec<_> = records
            .iter()
            .filter(|r| r.event_type == AuditEventType::InputReceived)
            .collect();
        assert_eq!(inputs.len(), 2);
        assert_ne!(inputs[0].id, inputs[1].id);
    }

    #[tokio::test]
    async fn logic_fault_is_recorded_and_reraised() {
        let (subsystem, store) = wrapped().await;
        let err = subsystem.invoke(&note("")).await.unwrap_err();
        assert!(matches!(
            err,
            ComplianceError::Logic {
                source: LogicError::InvalidInput(_),
                ..
            }
        ));

        let records = store
            .recent_audit_records(SubsystemId::Mirror, 10)
            .await
            .unwrap();
        assert_eq!(records[0].event_type, AuditEventType::ProcessingError);
        assert_eq!(records[0].related, Some(records[1].id));
    }

    #[tokio::test]
    async fn post_condition_failure_is_a_major_violation() {
        let (subsystem, store) = wrapped().await;
        let err = subsystem.invoke(&note("command")).await.unwrap_err();
        let violation_id = match err {
            ComplianceError::ConstraintViolation { violation_id, .. } => violation_id,
            other => panic!("expected constraint violation, got {:?}", other),
        };

        let violations = store.violations(Some(SubsystemId::Mirror)).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].id, violation_id);
        assert_eq!(violations[0].severity, Severity::Major);
        assert_eq!(violations[0].kind, ViolationKind::ConstraintViolation);
        let context = violations[0].context.as_ref().unwrap();
        assert_eq!(context["input"]["text"], "command");
        assert_eq!(context["output"]["text"], "COMMAND");

        // No output record for a rejected call.
        let records = store
            .recent_audit_records(SubsystemId::Mirror, 10)
            .await
            .unwrap();
        assert!(records
            .iter()
            .all(|r| r.event_type != AuditEventType::OutputGenerated));
    }

    #[tokio::test]
    async fn violations_are_announced_on_the_bus() {
        let bus = InMemoryBus::new();
        let mut notices = bus.subscribe(&Topic::violations()).await.unwrap();
        let store = InMemoryStore::new();
        let subsystem = Subsystem::new(
            Shout,
            Arc::new(Constitution::default()),
            Arc::new(store.clone()),
            ModeState::new(),
        )
        .with_bus(Arc::new(bus.clone()));
        subsystem.activate().await.unwrap();

        subsystem.invoke(&note("fine")).await.unwrap();
        let err = subsystem.invoke(&note("command")).await.unwrap_err();
        let violation_id = match err {
            ComplianceError::ConstraintViolation { violation_id, .. } => violation_id,
            other => panic!("expected constraint violation, got {:?}", other),
        };

        let envelope = notices.next().await.unwrap();
        assert_eq!(envelope.sender, SubsystemId::Mirror);
        match envelope.payload {
            Payload::Violation(record) => {
                assert_eq!(record.id, violation_id);
                assert_eq!(record.description, "reflection contains a command");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_outage_propagates() {
        let (subsystem, store) = wrapped().await;
        store.simulate_outage(true);
        let err = subsystem.invoke(&note("hello")).await.unwrap_err();
        assert!(matches!(err, ComplianceError::Memory(_)));
    }

    #[tokio::test]
    async fn records_carry_current_mode() {
        let store = InMemoryStore::new();
        let mode = ModeState::new();
        let subsystem = Subsystem::new(
            Shout,
            Arc::new(Constitution::default()),
            Arc::new(store.clone()),
            mode.clone(),
        );
        subsystem.activate().await.unwrap();
        mode.set(Mode::Creation);

        subsystem.invoke(&note("x")).await.unwrap();
        let records = store
            .recent_audit_records(SubsystemId::Mirror, 1)
            .await
            .unwrap();
        assert_eq!(records[0].mode, Some(Mode::Creation));
        assert!(subsystem.is_dominant_in_mode(Mode::Inquiry));
        assert!(subsystem.is_active_in_mode(Mode::Execution));
    }

    #[tokio::test]
    async fn serves_requests_with_json_params() {
        let (subsystem, _store) = wrapped().await;
        let value = subsystem
            .handle("reflect", json!({ "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(value["text"], "HI");

        let err = subsystem.handle("reflect", json!({ "nope": 1 })).await.unwrap_err();
        assert!(err.contains("invalid mirror input"));
    }
}
