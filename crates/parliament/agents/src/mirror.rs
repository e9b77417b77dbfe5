//! Reflection subsystem: coherence against the mission, emotional load,
//! progress and constitutional alignment. Offers context, never commands.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_memory::MemoryStore;
use parliament_types::{AuditEventType, SubsystemId, SubsystemIdentity, REFLECTIVE_TARGET};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Coherence assumed before any has been tracked.
pub const DEFAULT_COHERENCE: f64 = 0.7;

const BASELINE_HOURS: i64 = 24;
const PROGRESS_SAMPLE: usize = 10;

const HIGH_LOAD: [&str; 10] = [
    "stress",
    "anxious",
    "overwhelmed",
    "frustrated",
    "exhausted",
    "burnout",
    "panic",
    "despair",
    "fear",
    "rage",
];
const LOW_LOAD: [&str; 9] = [
    "calm",
    "focused",
    "clear",
    "energized",
    "confident",
    "peaceful",
    "balanced",
    "grounded",
    "steady",
];
const SUCCESS_MARKERS: [&str; 4] = ["completed", "success", "approved", "achieved"];
const FAILURE_MARKERS: [&str; 4] = ["failed", "rejected", "error", "halted"];
const SOVEREIGNTY_BREACHES: [&str; 4] = [
    "override user",
    "ignore user",
    "force user",
    "manipulate user",
];
const RESTRICTIVE: [&str; 4] = ["forbid", "prevent", "block", "deny"];
const COMMAND_VOCABULARY: [&str; 5] = ["must", "shall", "require", "order", "command"];

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReflectionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subsystem: String,
    pub description: String,
    #[serde(default)]
    pub outcome: Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MirrorContext {
    #[serde(default)]
    pub current_mission: Option<String>,
    #[serde(default)]
    pub time_horizon: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorInput {
    pub event: ReflectionEvent,
    #[serde(default)]
    pub context: MirrorContext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalLoad {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub coherence_score: f64,
    pub emotional_load_estimate: EmotionalLoad,
    pub progress_assessment: String,
    pub philosophical_alignment: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MirrorOutput {
    pub reflection: Reflection,
    pub recommendations: Vec<String>,
}

pub struct MirrorLogic {
    store: Arc<dyn MemoryStore>,
}

impl MirrorLogic {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    async fn baseline(&self) -> Result<f64, LogicError> {
        let scores = self
            .store
            .read_recent_decision_scores(
                SubsystemId::Mirror,
                &AuditEventType::CoherenceTracking,
                chrono::Duration::hours(BASELINE_HOURS),
            )
            .await?;
        if scores.is_empty() {
            return Ok(DEFAULT_COHERENCE);
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Mission overlap (Jaccard over words) blended 40/60 with the baseline.
    pub fn coherence(event: &ReflectionEvent, mission: Option<&str>, baseline: f64) -> f64 {
        let Some(mission) = mission.filter(|m| !m.trim().is_empty()) else {
            return baseline;
        };
        let outcome = match &event.outcome {
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let mission_words = words(mission);
        let event_words = words(&format!("{} {}", event.description, outcome));

        let union = mission_words.union(&event_words).count();
        if union == 0 {
            return baseline;
        }
        let overlap = mission_words.intersection(&event_words).count();
        let similarity = overlap as f64 / union as f64;
        (similarity * 0.4 + baseline * 0.6).clamp(0.0, 1.0)
    }

    pub fn emotional_load(description: &str) -> EmotionalLoad {
        let lower = description.to_lowercase();
        let high = HIGH_LOAD.iter().filter(|k| lower.contains(*k)).count();
        let low = LOW_LOAD.iter().filter(|k| lower.contains(*k)).count();
        if high > 2 {
            EmotionalLoad::High
        } else if high > 0 {
            EmotionalLoad::Medium
        } else if low > 1 {
            EmotionalLoad::Low
        } else {
            EmotionalLoad::Medium
        }
    }

    async fn progress(&self, subsystem: &str) -> Result<String, LogicError> {
        let records = match subsystem.parse::<SubsystemId>() {
            Ok(id) => self.store.recent_audit_records(id, PROGRESS_SAMPLE).await?,
            Err(_) => Vec::new(),
        };
        if records.is_empty() {
            return Ok("Insufficient data for progress assessment".to_string());
        }

        let (mut successes, mut failures) = (0usize, 0usize);
        for record in &records {
            let text = format!("{} {}", record.event_type, record.payload).to_lowercase();
            if SUCCESS_MARKERS.iter().any(|m| text.contains(m)) {
                successes += 1;
            } else if FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
                failures += 1;
            }
        }

        let total = successes + failures;
        if total == 0 {
            return Ok("Activity is ongoing, trajectory unclear".to_string());
        }
        let rate = successes as f64 / total as f64;
        let assessment = if rate > 0.7 {
            "Strong forward momentum, trajectory positive"
        } else if rate > 0.4 {
            "Moderate progress, some obstacles encountered"
        } else {
            "Significant challenges detected, recalibration may help"
        };
        Ok(assessment.to_string())
    }

    /// False on any user-sovereignty breach or a heavily restrictive event.
    pub fn aligned(event: &ReflectionEvent) -> bool {
        let text = format!("{} {} {}", event.kind, event.description, event.outcome).to_lowercase();
        if SOVEREIGNTY_BREACHES.iter().any(|b| text.contains(b)) {
            return false;
        }
        RESTRICTIVE.iter().filter(|k| text.contains(*k)).count() <= 2
    }

    fn recommendations(coherence: f64, load: EmotionalLoad, aligned: bool) -> Vec<String> {
        let mut notes = Vec::new();
        if coherence < 0.5 {
            notes.push("Low coherence observed. Reviewing mission alignment may help.".to_string());
        } else if coherence > 0.9 {
            notes.push("High coherence maintained. Current trajectory well aligned.".to_string());
        }
        match load {
            EmotionalLoad::High => notes.push(
                "High emotional load observed. Pacing or support structures could ease it."
                    .to_string(),
            ),
            EmotionalLoad::Low => notes.push(
                "Operational clarity appears high. Conditions look favourable for progress."
                    .to_string(),
            ),
            EmotionalLoad::Medium => {}
        }
        if !aligned {
            notes.push(
                "Possible constitutional misalignment. The axioms may be worth revisiting."
                    .to_string(),
            );
        }
        if notes.is_empty() {
            notes.push("Operating within expected parameters.".to_string());
        }
        notes
    }
}

#[async_trait]
impl SubsystemLogic for MirrorLogic {
    type Input = MirrorInput;
    type Output = MirrorOutput;

    fn id(&self) -> SubsystemId {
        SubsystemId::Mirror
    }

    async fn process(&self, input: &MirrorInput) -> Result<MirrorOutput, LogicError> {
        let event = &input.event;
        let baseline = self.baseline().await?;
        let coherence_score =
            Self::coherence(event, input.context.current_mission.as_deref(), baseline);
        let emotional_load = Self::emotional_load(&event.description);
        let progress_assessment = self.progress(&event.subsystem).await?;
        let philosophical_alignment = Self::aligned(event);
        let recommendations =
            Self::recommendations(coherence_score, emotional_load, philosophical_alignment);

        self.store
            .append_audit_record(
                SubsystemId::Mirror,
                AuditEventType::CoherenceTracking,
                None,
                json!({
                    "score": coherence_score,
                    "event_type": event.kind,
                    "subsystem": event.subsystem,
                }),
                None,
            )
            .await?;
        info!(
            target: REFLECTIVE_TARGET,
            kind = "coherence_tracking",
            coherence = coherence_score,
            load = ?emotional_load,
            event_type = %event.kind,
            subsystem = %event.subsystem,
            "Coherence tracked"
        );
        debug!(baseline, aligned = philosophical_alignment, "Reflection complete");

        Ok(MirrorOutput {
            reflection: Reflection {
                coherence_score,
                emotional_load_estimate: emotional_load,
                progress_assessment,
                philosophical_alignment,
            },
            recommendations,
        })
    }

    fn check_output(&self, _identity: &SubsystemIdentity, output: &MirrorOutput) -> Result<(), String> {
        for note in &output.recommendations {
            let lower = note.to_lowercase();
            if let Some(keyword) = COMMAND_VOCABULARY.iter().find(|k| lower.contains(*k)) {
                return Err(format!("recommendation reads as a command ({}): {}", keyword, note));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parliament_memory::InMemoryStore;
    use parliament_types::Mode;

    fn event(subsystem: &str, description: &str) -> ReflectionEvent {
        ReflectionEvent {
            kind: "decision".into(),
            subsystem: subsystem.into(),
            description: description.into(),
            outcome: Value::Null,
        }
    }

    fn input(subsystem: &str, description: &str, mission: Option<&str>) -> MirrorInput {
        MirrorInput {
            event: event(subsystem, description),
            context: MirrorContext {
                current_mission: mission.map(str::to_string),
                time_horizon: None,
            },
        }
    }

    #[test]
    fn coherence_blends_overlap_with_baseline() {
        let e = event("chorus", "build the archive");
        // {build, the, archive} vs {build, archive}: 2 of 3 words shared.
        let score = MirrorLogic::coherence(&e, Some("build archive"), 0.7);
        assert!((score - (2.0 / 3.0 * 0.4 + 0.42)).abs() < 1e-9);
        assert_eq!(MirrorLogic::coherence(&e, None, 0.55), 0.55);
    }

    #[test]
    fn emotional_load_thresholds() {
        assert_eq!(
            MirrorLogic::emotional_load("stress, panic and despair all week"),
            EmotionalLoad::High
        );
        assert_eq!(MirrorLogic::emotional_load("a little stress"), EmotionalLoad::Medium);
        assert_eq!(MirrorLogic::emotional_load("calm and focused"), EmotionalLoad::Low);
        assert_eq!(MirrorLogic::emotional_load("nothing notable"), EmotionalLoad::Medium);
    }

    #[test]
    fn sovereignty_breach_is_misaligned() {
        assert!(!MirrorLogic::aligned(&event("executor", "override user preferences")));
        assert!(!MirrorLogic::aligned(&event("executor", "forbid, prevent and block it")));
        assert!(MirrorLogic::aligned(&event("executor", "prevent a typo")));
    }

    #[tokio::test]
    async fn persisted_scores_become_the_baseline() {
        let store = InMemoryStore::new();
        let logic = MirrorLogic::new(Arc::new(store.clone()));

        let first = logic.process(&input("chorus", "step done", None)).await.unwrap();
        assert_eq!(first.reflection.coherence_score, DEFAULT_COHERENCE);

        store
            .append_audit_record(
                SubsystemId::Mirror,
                AuditEventType::CoherenceTracking,
                None,
                json!({ "score": 0.1 }),
                None,
            )
            .await
            .unwrap();
        let second = logic.process(&input("chorus", "step done", None)).await.unwrap();
        assert!((second.reflection.coherence_score - 0.4).abs() < 1e-9);
        assert!(second.recommendations[0].starts_with("Low coherence"));
    }

    #[tokio::test]
    async fn progress_reads_recent_records() {
        let store = InMemoryStore::new();
        let logic = MirrorLogic::new(Arc::new(store.clone()));

        let none = logic.process(&input("executor", "task", None)).await.unwrap();
        assert_eq!(
            none.reflection.progress_assessment,
            "Insufficient data for progress assessment"
        );

        for status in ["success", "success", "success", "rejected"] {
            store
                .append_audit_record(
                    SubsystemId::Executor,
                    AuditEventType::OutputGenerated,
                    Some(Mode::Execution),
                    json!({ "status": status }),
                    None,
                )
                .await
                .unwrap();
        }
        let output = logic.process(&input("executor", "task", None)).await.unwrap();
        assert_eq!(
            output.reflection.progress_assessment,
            "Strong forward momentum, trajectory positive"
        );
    }

    #[test]
    fn recommendations_never_command() {
        let logic = MirrorLogic::new(Arc::new(InMemoryStore::new()));
        let identity = SubsystemIdentity::new(
            SubsystemId::Mirror,
            ["reflect"],
            ["provides_context_not_commands"],
        );
        for coherence in [0.2, 0.7, 0.95] {
            for load in [EmotionalLoad::Low, EmotionalLoad::Medium, EmotionalLoad::High] {
                for aligned in [true, false] {
                    let output = MirrorOutput {
                        reflection: Reflection {
                            coherence_score: coherence,
                            emotional_load_estimate: load,
                            progress_assessment: String::new(),
                            philosophical_alignment: aligned,
                        },
                        recommendations: MirrorLogic::recommendations(coherence, load, aligned),
                    };
                    assert!(logic.check_output(&identity, &output).is_ok());
                }
            }
        }
        let commanding = MirrorOutput {
            reflection: Reflection {
                coherence_score: 0.7,
                emotional_load_estimate: EmotionalLoad::Medium,
                progress_assessment: String::new(),
                philosophical_alignment: true,
            },
            recommendations: vec!["You must rest".into()],
        };
        assert!(logic.check_output(&identity, &commanding).is_err());
    }
}
