//! # parliament-types
//!
//! Shared vocabulary for the parliament: the seven subsystem identities, the
//! process-wide [`Mode`], the bus [`Envelope`] and its tagged [`Payload`],
//! adjudicator [`Decision`]s, and the append-only records the persistence
//! collaborator stores.
//!
//! Payloads that cross subsystem boundaries are tagged unions, so a reply is
//! never confused with a request or a calibration signal by key presence.

#![deny(unsafe_code)]

pub mod decision;
pub mod message;
pub mod records;
pub mod subsystem;

pub use decision::{CalibrationTrigger, Decision, FaultCode, Verdict};
pub use message::{
    CorrelationId, Envelope, LogicalTimestamp, Payload, Reply, ReplyBody, Request, Topic,
};
pub use records::{
    AuditEventType, AuditRecord, HaltEvent, HaltEventId, RecordId, Severity, ViolationId,
    ViolationKind, ViolationRecord,
};
pub use subsystem::{Mode, ModeState, ParseError, SubsystemId, SubsystemIdentity};

/// Tracing target for reflective log entries (escalations, calibration
/// triggers, mode changes, coherence tracking).
pub const REFLECTIVE_TARGET: &str = "parliament::reflective";
