//! The adjudicator: jurisdiction gate, fail-fast veto pipeline, per-origin
//! halt-repair loop and anti-paralysis monitor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parliament_bus::MessageBus;
use parliament_constitution::{AdjudicatorConfig, Constitution};
use parliament_memory::MemoryStore;
use parliament_types::{
    CalibrationTrigger, Decision, FaultCode, Payload, SubsystemId, Topic, Verdict,
    REFLECTIVE_TARGET,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checks::{
    BoundaryCheck, CheckOutcome, LegalCheck, OriginConstraintCheck, RegressionCheck, VetoCheck,
};
use crate::window::{DecisionWindow, WindowSignal};
use crate::{AdjudicationError, Submission};

/// Name carried by every anti-paralysis calibration trigger.
pub const ANTI_PARALYSIS_TRIGGER: &str = "anti_paralysis";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Evaluating,
}

/// Point-in-time view of the adjudicator's private state.
#[derive(Clone, Debug, Serialize)]
pub struct AdjudicatorStatus {
    pub phase: Phase,
    pub repair_cycles: HashMap<SubsystemId, u32>,
    pub window_len: usize,
    pub halt_rate: f64,
    pub calibration_signals: usize,
}

struct State {
    repair_cycles: HashMap<SubsystemId, u32>,
    window: DecisionWindow,
    calibration_signals: usize,
}

/// Decrements the in-flight count when an evaluation ends, however it ends.
struct Evaluating<'a>(&'a AtomicUsize);

impl<'a> Evaluating<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Evaluating<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the repair-cycle counters and the decision window exclusively.
pub struct Adjudicator {
    checks: Vec<Box<dyn VetoCheck>>,
    config: AdjudicatorConfig,
    store: Arc<dyn MemoryStore>,
    bus: Option<Arc<dyn MessageBus>>,
    state: Mutex<State>,
    in_flight: AtomicUsize,
}

impl Adjudicator {
    /// Adjudicator with the standard pipeline: regression, boundary, legal,
    /// origin constraint.
    pub fn new(
        constitution: &Constitution,
        store: Arc<dyn MemoryStore>,
    ) -> Result<Self, AdjudicationError> {
        let patterns = &constitution.veto_patterns;
        let checks: Vec<Box<dyn VetoCheck>> = vec![
            Box::new(RegressionCheck::new(
                patterns,
                constitution.adjudicator.coherence_tolerance,
            )?),
            Box::new(BoundaryCheck::new(patterns)?),
            Box::new(LegalCheck::new(patterns)?),
            Box::new(OriginConstraintCheck::new(constitution)),
        ];
        Ok(Self::with_checks(
            checks,
            constitution.adjudicator.clone(),
            store,
        ))
    }

    /// Adjudicator with a custom ordered pipeline.
    pub fn with_checks(
        checks: Vec<Box<dyn VetoCheck>>,
        config: AdjudicatorConfig,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        let window = DecisionWindow::new(&config.anti_paralysis);
        Self {
            checks,
            config,
            store,
            bus: None,
            state: Mutex::new(State {
                repair_cycles: HashMap::new(),
                window,
                calibration_signals: 0,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Publish decisions and calibration triggers on `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &AdjudicatorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            Phase::Evaluating
        } else {
            Phase::Idle
        }
    }

    pub async fn repair_cycle(&self, origin: SubsystemId) -> u32 {
        let state = self.state.lock().await;
        state.repair_cycles.get(&origin).copied().unwrap_or(0)
    }

    pub async fn status(&self) -> AdjudicatorStatus {
        let state = self.state.lock().await;
        AdjudicatorStatus {
            phase: self.phase(),
            repair_cycles: state.repair_cycles.clone(),
            window_len: state.window.len(),
            halt_rate: state.window.halt_rate(),
            calibration_signals: state.calibration_signals,
        }
    }

    /// Evaluate one submission.
    ///
    /// Halts and escalations are ordinary decisions. An error means no
    /// decision was made, e.g. the halt event could not be persisted.
    pub async fn adjudicate(&self, submission: &Submission) -> Result<Decision, AdjudicationError> {
        let _evaluating = Evaluating::enter(&self.in_flight);
        let origin = submission.origin;

        if !self.config.threshold_actions.contains(&submission.action_type) {
            debug!(
                origin = %origin,
                action_type = %submission.action_type,
                "Outside jurisdiction, approving"
            );
            let decision = Decision::not_threshold_action();
            // Exempt approvals still enter the window and displace older halts.
            let signal = {
                let mut state = self.state.lock().await;
                Self::observe(&mut state, decision.verdict())
            };
            self.announce(&decision).await;
            self.signal(signal).await;
            return Ok(decision);
        }

        let mut failure = None;
        for check in &self.checks {
            match check.evaluate(submission).await {
                CheckOutcome::Pass => {
                    debug!(origin = %origin, check = check.check_name(), "Check passed");
                }
                CheckOutcome::Fail { reason, fault_code } => {
                    info!(
                        origin = %origin,
                        check = check.check_name(),
                        fault_code = %fault_code,
                        reason = %reason,
                        "Check failed"
                    );
                    failure = Some((reason, fault_code));
                    break;
                }
            }
        }

        let (decision, signal) = {
            let mut state = self.state.lock().await;
            let decision = match failure {
                None => {
                    if state.repair_cycles.remove(&origin).is_some() {
                        debug!(origin = %origin, "Repair cycle reset");
                    }
                    Decision::approve()
                }
                Some((reason, fault_code)) => {
                    self.halt_or_escalate(&mut state, origin, reason, fault_code)
                        .await?
                }
            };
            let signal = Self::observe(&mut state, decision.verdict());
            (decision, signal)
        };
        self.announce(&decision).await;
        self.signal(signal).await;

        info!(
            origin = %origin,
            action_type = %submission.action_type,
            verdict = ?decision.verdict(),
            "Adjudicated"
        );
        Ok(decision)
    }

    async fn halt_or_escalate(
        &self,
        state: &mut State,
        origin: SubsystemId,
        reason: String,
        fault_code: FaultCode,
    ) -> Result<Decision, AdjudicationError> {
        let cycle = state.repair_cycles.get(&origin).copied().unwrap_or(0) + 1;
        let halt_event_id = self
            .store
            .append_halt_event(origin, reason.clone(), fault_code.clone(), cycle)
            .await?;
        state.repair_cycles.insert(origin, cycle);

        if cycle < self.config.max_repair_cycles {
            return Ok(Decision::Halt {
                reason,
                fault_code,
                repair_cycle: cycle,
                halt_event_id,
            });
        }

        warn!(
            target: REFLECTIVE_TARGET,
            log_type = "escalation",
            origin = %origin,
            repair_cycle = cycle,
            halt_event_id = %halt_event_id,
            escalation_target = %self.config.escalation_target,
            reason = %reason,
            "Repair limit reached, escalating"
        );
        Ok(Decision::Escalate {
            reason,
            fault_code,
            repair_cycle: cycle,
            halt_event_id,
            escalation_target: self.config.escalation_target.clone(),
        })
    }

    /// Append to the window under the same lock as the rate computation.
    fn observe(state: &mut State, verdict: Verdict) -> Option<WindowSignal> {
        let signal = state.window.record(verdict);
        if signal.is_some() {
            state.calibration_signals += 1;
        }
        signal
    }

    async fn announce(&self, decision: &Decision) {
        let Some(bus) = &self.bus else {
            return;
        };
        if let Err(err) = bus
            .publish(
                &Topic::decisions(),
                SubsystemId::Sentinel,
                Payload::Decision(decision.clone()),
            )
            .await
        {
            warn!(error = %err, "Failed to publish decision");
        }
    }

    async fn signal(&self, signal: Option<WindowSignal>) {
        let Some(signal) = signal else {
            return;
        };
        let threshold = self.config.anti_paralysis.halt_threshold;

        warn!(
            target: REFLECTIVE_TARGET,
            log_type = "anti_paralysis",
            halt_rate = signal.halt_rate,
            threshold,
            halt_count = signal.halt_count,
            window_size = signal.window_size,
            "Halt rate above threshold, calibration requested"
        );

        let Some(bus) = &self.bus else {
            return;
        };
        let trigger = CalibrationTrigger {
            trigger: ANTI_PARALYSIS_TRIGGER.to_string(),
            subsystem: SubsystemId::Sentinel,
            halt_rate: signal.halt_rate,
            threshold,
            halt_count: signal.halt_count,
            window_size: signal.window_size,
            observed_at: Utc::now(),
        };
        if let Err(err) = bus
            .publish(
                &Topic::calibration(),
                SubsystemId::Sentinel,
                Payload::Calibration(trigger),
            )
            .await
        {
            warn!(error = %err, "Failed to publish calibration trigger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckContext;
    use async_trait::async_trait;
    use parliament_bus::InMemoryBus;
    use parliament_memory::InMemoryStore;
    use serde_json::json;

    fn submission(origin: SubsystemId, action_type: &str, artifact: serde_json::Value) -> Submission {
        Submission {
            artifact,
            origin,
            action_type: action_type.into(),
            context: CheckContext::default(),
        }
    }

    fn adjudicator(store: &InMemoryStore) -> Adjudicator {
        Adjudicator::new(&Constitution::default(), Arc::new(store.clone())).unwrap()
    }

    /// Counts evaluations and answers with a fixed outcome.
    struct Counting {
        name: &'static str,
        outcome: CheckOutcome,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VetoCheck for Counting {
        fn check_name(&self) -> &str {
            self.name
        }

        async fn evaluate(&self, _submission: &Submission) -> CheckOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn counting(name: &'static str, outcome: CheckOutcome) -> (Box<dyn VetoCheck>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Counting {
                name,
                outcome,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn non_threshold_actions_skip_every_check() {
        let (check, calls) = counting("never", CheckOutcome::fail("no", "never"));
        let adjudicator = Adjudicator::with_checks(
            vec![check],
            AdjudicatorConfig::default(),
            Arc::new(InMemoryStore::new()),
        );

        for action in ["brainstorm", "draft", "worldbuilding"] {
            let decision = adjudicator
                .adjudicate(&submission(SubsystemId::Artisan, action, json!({"text": "fraud"})))
                .await
                .unwrap();
            assert_eq!(decision, Decision::not_threshold_action());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_failing_check_wins() {
        let (first, first_calls) = counting("first", CheckOutcome::Pass);
        let (second, _) = counting("second", CheckOutcome::fail("second failed", "second_fault"));
        let (third, third_calls) = counting("third", CheckOutcome::fail("third failed", "third_fault"));
        let adjudicator = Adjudicator::with_checks(
            vec![first, second, third],
            AdjudicatorConfig::default(),
            Arc::new(InMemoryStore::new()),
        );

        let decision = adjudicator
            .adjudicate(&submission(SubsystemId::Executor, "execution", json!({})))
            .await
            .unwrap();
        assert_eq!(decision.fault_code().map(FaultCode::as_str), Some("second_fault"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn standard_pipeline_order() {
        let store = InMemoryStore::new();
        let adjudicator = adjudicator(&store);

        // "fraud" is both a legality boundary keyword and a prohibited
        // keyword; the earlier regression check claims it.
        let decision = adjudicator
            .adjudicate(&submission(
                SubsystemId::Executor,
                "financial_exposure",
                json!({"task": "commit fraud"}),
            ))
            .await
            .unwrap();
        assert_eq!(decision.fault_code().map(FaultCode::as_str), Some("boundary_violation"));

        let decision = adjudicator
            .adjudicate(&submission(
                SubsystemId::Ledger,
                "financial_exposure",
                json!({"task": "market manipulation"}),
            ))
            .await
            .unwrap();
        assert_eq!(decision.fault_code().map(FaultCode::as_str), Some("legal_violation"));
    }

    #[tokio::test]
    async fn repair_cycles_escalate_at_limit_and_reset_on_approve() {
        let store = InMemoryStore::new();
        let adjudicator = adjudicator(&store);
        let bad = submission(SubsystemId::Executor, "execution", json!({"task": "steal data"}));
        let good = submission(SubsystemId::Executor, "execution", json!({"task": "list files"}));

        let first = adjudicator.adjudicate(&bad).await.unwrap();
        let second = adjudicator.adjudicate(&bad).await.unwrap();
        let third = adjudicator.adjudicate(&bad).await.unwrap();
        assert_eq!((first.verdict(), first.repair_cycle()), (Verdict::Halt, Some(1)));
        assert_eq!((second.verdict(), second.repair_cycle()), (Verdict::Halt, Some(2)));
        assert_eq!((third.verdict(), third.repair_cycle()), (Verdict::Escalate, Some(3)));
        match &third {
            Decision::Escalate {
                escalation_target,
                halt_event_id,
                ..
            } => {
                assert_eq!(escalation_target, "user_via_mirror");
                let events = store.halt_events(Some(SubsystemId::Executor)).await.unwrap();
                assert_eq!(events.len(), 3);
                assert_eq!(events[2].id, *halt_event_id);
                assert_eq!(events[2].repair_cycle, 3);
            }
            other => panic!("expected escalation, got {:?}", other),
        }

        // Escalation does not reset the counter.
        let fourth = adjudicator.adjudicate(&bad).await.unwrap();
        assert_eq!((fourth.verdict(), fourth.repair_cycle()), (Verdict::Escalate, Some(4)));

        assert!(adjudicator.adjudicate(&good).await.unwrap().is_approved());
        assert_eq!(adjudicator.repair_cycle(SubsystemId::Executor).await, 0);

        let again = adjudicator.adjudicate(&bad).await.unwrap();
        assert_eq!((again.verdict(), again.repair_cycle()), (Verdict::Halt, Some(1)));
    }

    #[tokio::test]
    async fn repair_cycles_are_per_origin() {
        let store = InMemoryStore::new();
        let adjudicator = adjudicator(&store);
        let bad = |origin| submission(origin, "publication", json!({"text": "hack the mainframe"}));

        adjudicator.adjudicate(&bad(SubsystemId::Executor)).await.unwrap();
        adjudicator.adjudicate(&bad(SubsystemId::Executor)).await.unwrap();
        let other = adjudicator.adjudicate(&bad(SubsystemId::Artisan)).await.unwrap();
        assert_eq!(other.repair_cycle(), Some(1));
    }

    #[tokio::test]
    async fn store_failure_yields_no_decision_and_keeps_counter() {
        let store = InMemoryStore::new();
        let adjudicator = adjudicator(&store);
        store.simulate_outage(true);

        let result = adjudicator
            .adjudicate(&submission(SubsystemId::Executor, "execution", json!("illegal")))
            .await;
        assert!(matches!(result, Err(AdjudicationError::Memory(_))));
        assert_eq!(adjudicator.repair_cycle(SubsystemId::Executor).await, 0);
        assert_eq!(adjudicator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn calibration_trigger_published_once() {
        let bus = InMemoryBus::new();
        let mut calibration = bus.subscribe(&Topic::calibration()).await.unwrap();
        let mut config = AdjudicatorConfig::default();
        config.anti_paralysis.window_size = 10;
        config.anti_paralysis.min_samples = 5;
        config.anti_paralysis.halt_threshold = 0.5;

        let (check, _) = counting("flag", CheckOutcome::fail("flagged", "test_fault"));
        let failing = Adjudicator::with_checks(vec![check], config.clone(), Arc::new(InMemoryStore::new()))
            .with_bus(Arc::new(bus.clone()));

        for _ in 0..6 {
            failing
                .adjudicate(&submission(SubsystemId::Executor, "execution", json!({})))
                .await
                .unwrap();
        }
        let envelope = calibration.next().await.unwrap();
        match envelope.payload {
            Payload::Calibration(trigger) => {
                assert_eq!(trigger.trigger, ANTI_PARALYSIS_TRIGGER);
                assert_eq!(trigger.halt_count, 6);
                assert_eq!(trigger.window_size, 10);
                assert!((trigger.threshold - 0.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(failing.status().await.calibration_signals, 1);
    }

    fn sensitive_window() -> AdjudicatorConfig {
        let mut config = AdjudicatorConfig::default();
        config.anti_paralysis.window_size = 10;
        config.anti_paralysis.min_samples = 5;
        config.anti_paralysis.halt_threshold = 0.5;
        config
    }

    #[tokio::test]
    async fn exempt_approvals_displace_halts_from_the_window() {
        let (check, _) = counting("flag", CheckOutcome::fail("flagged", "test_fault"));
        let adjudicator =
            Adjudicator::with_checks(vec![check], sensitive_window(), Arc::new(InMemoryStore::new()));
        let failing = || submission(SubsystemId::Executor, "execution", json!({}));
        let exempt = || submission(SubsystemId::Artisan, "draft", json!({}));

        for _ in 0..4 {
            adjudicator.adjudicate(&failing()).await.unwrap();
        }
        for _ in 0..10 {
            adjudicator.adjudicate(&exempt()).await.unwrap();
        }
        let status = adjudicator.status().await;
        assert_eq!(status.window_len, 10);
        assert_eq!(status.halt_rate, 0.0);

        for _ in 0..4 {
            adjudicator.adjudicate(&failing()).await.unwrap();
        }
        let status = adjudicator.status().await;
        assert!((status.halt_rate - 0.4).abs() < 1e-9);
        assert_eq!(status.calibration_signals, 0);
    }

    #[tokio::test]
    async fn same_halts_without_exempt_traffic_signal_calibration() {
        let (check, _) = counting("flag", CheckOutcome::fail("flagged", "test_fault"));
        let adjudicator =
            Adjudicator::with_checks(vec![check], sensitive_window(), Arc::new(InMemoryStore::new()));

        for _ in 0..8 {
            adjudicator
                .adjudicate(&submission(SubsystemId::Executor, "execution", json!({})))
                .await
                .unwrap();
        }
        let status = adjudicator.status().await;
        assert!((status.halt_rate - 0.8).abs() < 1e-9);
        assert_eq!(status.calibration_signals, 1);
    }

    #[tokio::test]
    async fn every_decision_is_announced_on_the_bus() {
        let bus = InMemoryBus::new();
        let mut decisions = bus.subscribe(&Topic::decisions()).await.unwrap();
        let store = InMemoryStore::new();
        let adjudicator = adjudicator(&store).with_bus(Arc::new(bus.clone()));

        adjudicator
            .adjudicate(&submission(SubsystemId::Artisan, "draft", json!({})))
            .await
            .unwrap();
        let halted = adjudicator
            .adjudicate(&submission(
                SubsystemId::Executor,
                "real_world_execution",
                json!({"message": "delete the archive"}),
            ))
            .await
            .unwrap();

        let mut announced = Vec::new();
        for _ in 0..2 {
            let envelope = decisions.next().await.unwrap();
            assert_eq!(envelope.sender, SubsystemId::Sentinel);
            match envelope.payload {
                Payload::Decision(decision) => announced.push(decision),
                other => panic!("unexpected payload {:?}", other),
            }
        }
        assert_eq!(announced, vec![Decision::not_threshold_action(), halted]);
    }
}
