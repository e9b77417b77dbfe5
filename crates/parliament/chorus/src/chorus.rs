//! Per-request coordination of the seven subsystems.

use std::collections::BTreeMap;
use std::sync::Arc;

use parliament_agents::artisan::CreativeConstraints;
use parliament_agents::ledger::LedgerParameters;
use parliament_agents::mirror::{MirrorContext, Reflection};
use parliament_agents::{
    AnalysisType, ArtisanInput, ArtisanLogic, ArtisanOutput, CreativeType, ExecutorInput,
    ExecutorLogic, InterpreterInput, InterpreterLogic, LedgerData, LedgerInput, LedgerLogic,
    LedgerOutput, MirrorInput, MirrorLogic, ReflectionEvent, StrategistInput, StrategistLogic,
    StrategistOutput, Task,
};
use parliament_bus::{InMemoryBus, MessageBus, RequestHandler, RequestServer, Requester};
use parliament_compliance::{ComplianceError, Subsystem, SubsystemLogic};
use parliament_constitution::Constitution;
use parliament_memory::{InMemoryStore, MemoryStore};
use parliament_sentinel::{Adjudicator, AdjudicatorStatus, SentinelLogic};
use parliament_types::{Decision, Mode, ModeState, SubsystemId, Verdict};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::mode::detect_mode;
use crate::response::{AskRequest, ChorusResponse, Consensus, Perspective, SubsystemOutputs};
use crate::ChorusError;

const DEFAULT_THEME: &str = "sovereignty";

struct Wiring<'a> {
    constitution: &'a Arc<Constitution>,
    bus: &'a Arc<dyn MessageBus>,
    store: &'a Arc<dyn MemoryStore>,
    mode: &'a ModeState,
}

impl Wiring<'_> {
    fn wrap<L: SubsystemLogic>(&self, logic: L) -> Arc<Subsystem<L>> {
        debug!(subsystem = %logic.id(), "Wrapping subsystem");
        Arc::new(
            Subsystem::new(
                logic,
                Arc::clone(self.constitution),
                Arc::clone(self.store),
                self.mode.clone(),
            )
            .with_bus(Arc::clone(self.bus)),
        )
    }
}

/// Point-in-time view of the assembled parliament.
#[derive(Clone, Debug, Serialize)]
pub struct ChorusStatus {
    pub active: BTreeMap<SubsystemId, bool>,
    pub mode: Option<Mode>,
    pub adjudicator: AdjudicatorStatus,
    pub shut_down: bool,
}

/// Cheap to clone; clones share the same parliament.
#[derive(Clone)]
pub struct Chorus {
    inner: Arc<ChorusInner>,
}

struct ChorusInner {
    constitution: Arc<Constitution>,
    store: Arc<dyn MemoryStore>,
    mode: ModeState,

    interpreter: Arc<Subsystem<InterpreterLogic>>,
    strategist: Arc<Subsystem<StrategistLogic>>,
    artisan: Arc<Subsystem<ArtisanLogic>>,
    ledger: Arc<Subsystem<LedgerLogic>>,
    sentinel: Arc<Subsystem<SentinelLogic>>,
    executor: Arc<Subsystem<ExecutorLogic>>,
    mirror: Arc<Subsystem<MirrorLogic>>,

    servers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: RwLock<bool>,
}

impl Chorus {
    /// Build, activate and serve all seven subsystems.
    ///
    /// The adjudicator is created first so nothing can act before it is
    /// reachable on the bus.
    pub async fn assemble(
        constitution: Arc<Constitution>,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn MemoryStore>,
    ) -> Result<Self, ChorusError> {
        info!("Assembling parliament");
        let mode = ModeState::new();

        let adjudicator = Adjudicator::new(&constitution, Arc::clone(&store))?
            .with_bus(Arc::clone(&bus));
        let wiring = Wiring {
            constitution: &constitution,
            bus: &bus,
            store: &store,
            mode: &mode,
        };
        let sentinel = wiring.wrap(SentinelLogic::new(Arc::new(adjudicator)));
        let interpreter = wiring.wrap(InterpreterLogic::new());
        let strategist = wiring.wrap(StrategistLogic::new());
        let artisan = wiring.wrap(ArtisanLogic::new());
        let ledger = wiring.wrap(LedgerLogic::new(Arc::clone(&store)));
        let executor = wiring.wrap(ExecutorLogic::new(
            Requester::new(Arc::clone(&bus), SubsystemId::Executor),
            constitution.request_timeout(),
            constitution.executor.clone(),
            Arc::clone(&store),
        ));
        let mirror = wiring.wrap(MirrorLogic::new(Arc::clone(&store)));

        let handlers: Vec<Arc<dyn RequestHandler>> = vec![
            sentinel.clone(),
            interpreter.clone(),
            strategist.clone(),
            artisan.clone(),
            ledger.clone(),
            executor.clone(),
            mirror.clone(),
        ];
        let ids = [
            sentinel.id(),
            interpreter.id(),
            strategist.id(),
            artisan.id(),
            ledger.id(),
            executor.id(),
            mirror.id(),
        ];
        let mut servers = Vec::with_capacity(handlers.len());
        for (id, handler) in ids.into_iter().zip(handlers) {
            servers.push(RequestServer::spawn(Arc::clone(&bus), id, handler).await?);
        }

        let chorus = Self {
            inner: Arc::new(ChorusInner {
                constitution,
                store,
                mode,
                interpreter,
                strategist,
                artisan,
                ledger,
                sentinel,
                executor,
                mirror,
                servers: Mutex::new(servers),
                shutdown: RwLock::new(false),
            }),
        };
        chorus.activate_all().await?;

        info!("Parliament assembled, all seven subsystems active");
        Ok(chorus)
    }

    /// Assemble over an in-process bus and store.
    pub async fn in_memory(constitution: Constitution) -> Result<Self, ChorusError> {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        Self::assemble(Arc::new(constitution), bus, store).await
    }

    async fn activate_all(&self) -> Result<(), ComplianceError> {
        let inner = &self.inner;
        inner.sentinel.activate().await?;
        inner.interpreter.activate().await?;
        inner.strategist.activate().await?;
        inner.artisan.activate().await?;
        inner.ledger.activate().await?;
        inner.executor.activate().await?;
        inner.mirror.activate().await?;
        Ok(())
    }

    pub fn constitution(&self) -> &Arc<Constitution> {
        &self.inner.constitution
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.inner.store
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.inner.mode.current()
    }

    pub async fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.read().await
    }

    /// Deactivate every subsystem and stop serving requests. Idempotent.
    pub async fn shutdown(&self) {
        let mut shutdown = self.inner.shutdown.write().await;
        if *shutdown {
            warn!("Parliament already shut down");
            return;
        }
        *shutdown = true;
        drop(shutdown);

        info!("Shutting down parliament");
        for server in self.inner.servers.lock().await.drain(..) {
            server.abort();
        }
        let inner = &self.inner;
        inner.interpreter.deactivate();
        inner.strategist.deactivate();
        inner.artisan.deactivate();
        inner.ledger.deactivate();
        inner.executor.deactivate();
        inner.mirror.deactivate();
        inner.sentinel.deactivate();
        info!("Parliament shut down");
    }

    pub async fn status(&self) -> ChorusStatus {
        let inner = &self.inner;
        let active = BTreeMap::from([
            (SubsystemId::Interpreter, inner.interpreter.is_active()),
            (SubsystemId::Strategist, inner.strategist.is_active()),
            (SubsystemId::Artisan, inner.artisan.is_active()),
            (SubsystemId::Ledger, inner.ledger.is_active()),
            (SubsystemId::Sentinel, inner.sentinel.is_active()),
            (SubsystemId::Executor, inner.executor.is_active()),
            (SubsystemId::Mirror, inner.mirror.is_active()),
        ]);
        ChorusStatus {
            active,
            mode: inner.mode.current(),
            adjudicator: inner.sentinel.logic().adjudicator().status().await,
            shut_down: self.is_shut_down().await,
        }
    }

    /// Handle one user request.
    ///
    /// Routing always runs first and reflection always runs last. Halts and
    /// escalations are reported in the response, not as errors.
    pub async fn ask(&self, request: AskRequest) -> Result<ChorusResponse, ChorusError> {
        if self.is_shut_down().await {
            return Err(ChorusError::ShutDown);
        }
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ChorusError::InvalidRequest("request text is empty".to_string()));
        }

        let inner = &self.inner;
        let mode = request.mode.unwrap_or_else(|| detect_mode(text));
        inner.mode.set(mode);
        info!(mode = %mode, consensus = request.consensus, "Handling request");

        let routed = inner
            .interpreter
            .invoke(&InterpreterInput {
                user_input: text.to_string(),
                context: request.context.clone(),
            })
            .await?;
        let routing = routed.routing.clone();
        let target = routing.target_subsystem;
        debug!(target = %target, confidence = routing.confidence, "Routed");

        let mut involved = vec![SubsystemId::Interpreter];
        let mut outputs = SubsystemOutputs {
            interpreter: Some(routed),
            ..Default::default()
        };
        let mut action_decision = None;

        match mode {
            Mode::Inquiry => {}
            Mode::Creation => {
                let lower = text.to_lowercase();
                let create = (lower.contains("mythos")
                    || lower.contains("worldbuild")
                    || target == SubsystemId::Artisan)
                    && inner.artisan.is_active_in_mode(mode);
                let quantify = request.consensus || lower.contains("risk");

                let (strategist, artisan, ledger) = tokio::join!(
                    self.plan(text, &request.context),
                    async {
                        if create {
                            Some(self.create(&lower, &request.context).await)
                        } else {
                            None
                        }
                    },
                    async {
                        if quantify {
                            Some(self.quantify().await)
                        } else {
                            None
                        }
                    },
                );

                outputs.strategist = Some(strategist?);
                involved.push(SubsystemId::Strategist);
                if let Some(output) = artisan.transpose()? {
                    involved.push(SubsystemId::Artisan);
                    outputs.artisan = Some(output);
                }
                if let Some(output) = ledger.transpose()? {
                    involved.push(SubsystemId::Ledger);
                    outputs.ledger = Some(output);
                }
            }
            Mode::Execution => {
                let task = Self::task(text, &request.context)?;
                let result = inner.executor.invoke(&ExecutorInput { task }).await?;
                involved.push(SubsystemId::Executor);
                involved.push(SubsystemId::Sentinel);
                action_decision = result.decision.clone();
                outputs.executor = Some(result);
            }
        }

        let consensus = if request.consensus {
            Some(self.consensus(text, mode, &mut involved, &mut outputs).await?)
        } else {
            None
        };

        let verdict = action_decision.as_ref().map(Decision::verdict);
        let (halt, escalation) = match action_decision {
            Some(decision) => match decision.verdict() {
                Verdict::Halt => (Some(decision), None),
                Verdict::Escalate => (None, Some(decision)),
                Verdict::Approve => (None, None),
            },
            None => (None, None),
        };
        if let Some(decision) = &halt {
            info!(reason = decision.reason().unwrap_or_default(), "Action halted");
        }
        if let Some(decision) = &escalation {
            warn!(reason = decision.reason().unwrap_or_default(), "Action escalated");
        }

        let reflection = self
            .reflect(mode, &involved, &outputs, verdict, &request.context)
            .await?;
        involved.push(SubsystemId::Mirror);

        Ok(ChorusResponse {
            mode_used: mode,
            routing,
            dominant: inner.constitution.dominant_in(mode),
            involved,
            outputs,
            consensus,
            halt,
            escalation,
            reflection,
        })
    }

    async fn plan(&self, goal: &str, context: &Value) -> Result<StrategistOutput, ComplianceError> {
        let time_horizon = context
            .get("time_horizon")
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default();
        self.inner
            .strategist
            .invoke(&StrategistInput {
                goal: goal.to_string(),
                constraints: Vec::new(),
                time_horizon,
                context: context.clone(),
            })
            .await
    }

    async fn create(
        &self,
        lower: &str,
        context: &Value,
    ) -> Result<ArtisanOutput, ComplianceError> {
        let creative_type = if lower.contains("mythos") {
            CreativeType::Mythos
        } else {
            CreativeType::Worldbuilding
        };
        let theme = context
            .get("theme")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_THEME)
            .to_string();
        self.inner
            .artisan
            .invoke(&ArtisanInput {
                creative_type,
                theme,
                constraints: CreativeConstraints::default(),
                context: context.clone(),
            })
            .await
    }

    async fn quantify(&self) -> Result<LedgerOutput, ComplianceError> {
        self.inner
            .ledger
            .invoke(&LedgerInput {
                analysis_type: AnalysisType::Risk,
                data: LedgerData {
                    complexity: 5.0,
                    uncertainty: Some(0.5),
                    timeline_days: Some(30.0),
                    ..Default::default()
                },
                parameters: LedgerParameters::default(),
            })
            .await
    }

    /// The task in `context.task`, or an echo of the request text.
    fn task(text: &str, context: &Value) -> Result<Task, ChorusError> {
        match context.get("task") {
            Some(task) => serde_json::from_value(task.clone())
                .map_err(|err| ChorusError::InvalidRequest(format!("invalid task: {}", err))),
            None => Ok(Task::Echo {
                message: text.to_string(),
            }),
        }
    }

    /// Consult planning and quantification if they have not spoken yet and
    /// average the perspectives.
    async fn consensus(
        &self,
        text: &str,
        mode: Mode,
        involved: &mut Vec<SubsystemId>,
        outputs: &mut SubsystemOutputs,
    ) -> Result<Consensus, ChorusError> {
        let inner = &self.inner;
        if outputs.strategist.is_none() && inner.strategist.is_active_in_mode(mode) {
            outputs.strategist = Some(self.plan(text, &Value::Null).await?);
            involved.push(SubsystemId::Strategist);
        }
        if outputs.ledger.is_none() && inner.ledger.is_active_in_mode(mode) {
            outputs.ledger = Some(self.quantify().await?);
            involved.push(SubsystemId::Ledger);
        }

        let mut perspectives = Vec::new();
        if let Some(routed) = &outputs.interpreter {
            perspectives.push(Perspective {
                subsystem: SubsystemId::Interpreter,
                score: routed.routing.confidence,
            });
        }
        if let Some(probability) = outputs
            .strategist
            .as_ref()
            .and_then(StrategistOutput::primary_probability)
        {
            perspectives.push(Perspective {
                subsystem: SubsystemId::Strategist,
                score: probability,
            });
        }
        if let Some(ledger) = &outputs.ledger {
            perspectives.push(Perspective {
                subsystem: SubsystemId::Ledger,
                score: 1.0 - ledger.analysis.risk_score,
            });
        }

        let threshold = inner.constitution.orchestrator.consensus_threshold;
        let score = if perspectives.is_empty() {
            0.0
        } else {
            perspectives.iter().map(|p| p.score).sum::<f64>() / perspectives.len() as f64
        };
        debug!(score, threshold, perspectives = perspectives.len(), "Consensus computed");
        Ok(Consensus {
            score,
            threshold,
            threshold_met: score >= threshold,
            perspectives,
        })
    }

    async fn reflect(
        &self,
        mode: Mode,
        involved: &[SubsystemId],
        outputs: &SubsystemOutputs,
        verdict: Option<Verdict>,
        context: &Value,
    ) -> Result<Reflection, ComplianceError> {
        let outcome = json!({
            "involved": involved,
            "outputs_count": outputs.count(),
            "verdict": verdict,
        });
        let input = MirrorInput {
            event: ReflectionEvent {
                kind: "decision".to_string(),
                subsystem: "chorus".to_string(),
                description: format!(
                    "Coordinated {} subsystems in {} mode",
                    involved.len(),
                    mode
                ),
                outcome,
            },
            context: MirrorContext {
                current_mission: context
                    .get("current_mission")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                time_horizon: context
                    .get("time_horizon")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
        };
        Ok(self.inner.mirror.invoke(&input).await?.reflection)
    }
}
