use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decision::{CalibrationTrigger, Decision};
use crate::records::ViolationRecord;
use crate::subsystem::SubsystemId;

/// A bus topic name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Well-known request topic of a subsystem.
    pub fn requests(target: SubsystemId) -> Self {
        Self(format!("request:{}", target))
    }

    /// Reply topic owned by exactly one outstanding request.
    pub fn reply(correlation: &CorrelationId) -> Self {
        Self(format!("response:{}", correlation.0))
    }

    /// Topic on which the adjudicator publishes anti-paralysis triggers.
    pub fn calibration() -> Self {
        Self("system:calibration".to_string())
    }

    /// Topic on which the adjudicator announces every decision it makes.
    pub fn decisions() -> Self {
        Self("system:decisions".to_string())
    }

    /// Topic on which wrapped subsystems announce constraint violations.
    pub fn violations() -> Self {
        Self("system:violations".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one outstanding request.
///
/// Composed from sender, target and issue time, with a random suffix so two
/// requests issued within the same clock tick never share a reply topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate(sender: SubsystemId, target: SubsystemId) -> Self {
        let issued_at = chrono::Utc::now().timestamp_micros();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}:{}:{}:{}", sender, target, issued_at, &nonce[..12]))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lamport-style logical timestamp assigned by the bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalTimestamp(pub u64);

/// The unit carried by the bus for publish, request and reply alike.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: SubsystemId,
    pub timestamp: LogicalTimestamp,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(sender: SubsystemId, timestamp: LogicalTimestamp, payload: Payload) -> Self {
        Self {
            sender,
            timestamp,
            payload,
        }
    }
}

/// Payload kinds. Shape is checked at compile time rather than by key presence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Request(Request),
    Reply(Reply),
    Decision(Decision),
    Violation(ViolationRecord),
    Calibration(CalibrationTrigger),
    Event { body: serde_json::Value },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Request(_) => "request",
            Payload::Reply(_) => "reply",
            Payload::Decision(_) => "decision",
            Payload::Violation(_) => "violation",
            Payload::Calibration(_) => "calibration",
            Payload::Event { .. } => "event",
        }
    }
}

/// A correlated request addressed to one subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: CorrelationId,
    pub target: SubsystemId,
    pub action: String,
    pub params: serde_json::Value,
    pub reply_topic: Topic,
}

/// Answer to a [`Request`], published on its reply topic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reply {
    pub correlation_id: CorrelationId,
    pub body: ReplyBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyBody {
    Ok { value: serde_json::Value },
    Fault { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique_and_scoped() {
        let a = CorrelationId::generate(SubsystemId::Executor, SubsystemId::Sentinel);
        let b = CorrelationId::generate(SubsystemId::Executor, SubsystemId::Sentinel);
        assert_ne!(a, b);
        assert!(a.0.starts_with("executor:sentinel:"));
        assert_eq!(Topic::reply(&a).as_str(), format!("response:{}", a));
    }

    #[test]
    fn request_topic_names_target() {
        assert_eq!(Topic::requests(SubsystemId::Sentinel).as_str(), "request:sentinel");
    }

    #[test]
    fn payload_is_tagged() {
        let payload = Payload::Event {
            body: serde_json::json!({"n": 1}),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(payload.kind(), "event");
    }
}
