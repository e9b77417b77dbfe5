//! Action subsystem: the only path to side effects.
//!
//! Every task is adjudicated over the bus before it runs. Anything short of
//! an approval (halt, escalation, a fault or no answer at all) rejects the
//! task without touching the outside world.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parliament_bus::{BusError, Requester};
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_constitution::ExecutorConfig;
use parliament_memory::MemoryStore;
use parliament_sentinel::{CheckContext, Submission, ADJUDICATE_ACTION};
use parliament_types::{AuditEventType, Decision, Mode, SubsystemId, SubsystemIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const REAL_WORLD_EXECUTION: &str = "real_world_execution";
pub const FINANCIAL_EXPOSURE: &str = "financial_exposure";

/// A unit of work handed to the action subsystem. It never originates one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    FileWrite {
        path: PathBuf,
        content: String,
    },
    FileRead {
        path: PathBuf,
    },
    /// Run a program directly, without a shell.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    ApiCall {
        endpoint: String,
        #[serde(default)]
        payload: Value,
    },
    Financial {
        description: String,
        #[serde(default)]
        amount: Option<f64>,
    },
    Echo {
        message: String,
    },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::FileWrite { .. } => "file_write",
            Task::FileRead { .. } => "file_read",
            Task::Command { .. } => "command",
            Task::ApiCall { .. } => "api_call",
            Task::Financial { .. } => "financial",
            Task::Echo { .. } => "echo",
        }
    }

    /// Threshold action type the adjudicator sees for this task.
    pub fn action_type(&self) -> &'static str {
        match self {
            Task::Financial { .. } => FINANCIAL_EXPOSURE,
            _ => REAL_WORLD_EXECUTION,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorInput {
    pub task: Task,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    /// Not run: the adjudicator did not approve.
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub output: Value,
    pub errors: Vec<String>,
    pub rollback_available: bool,
    pub decision: Option<Decision>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    fn rejected(decision: Option<Decision>, error: String) -> Self {
        Self {
            status: ExecutionStatus::Rejected,
            output: Value::Null,
            errors: vec![error],
            rollback_available: false,
            decision,
            executed_at: None,
        }
    }

    pub fn executed(&self) -> bool {
        self.status != ExecutionStatus::Rejected
    }
}

/// Result of running an approved task, before the decision is attached.
struct Outcome {
    status: ExecutionStatus,
    output: Value,
    errors: Vec<String>,
    rollback_available: bool,
}

impl Outcome {
    fn success(output: Value, rollback_available: bool) -> Self {
        Self {
            status: ExecutionStatus::Success,
            output,
            errors: Vec::new(),
            rollback_available,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            output: Value::Null,
            errors: vec![error.into()],
            rollback_available: false,
        }
    }
}

pub struct ExecutorLogic {
    requester: Requester,
    adjudication_timeout: Duration,
    config: ExecutorConfig,
    store: Arc<dyn MemoryStore>,
}

impl ExecutorLogic {
    pub fn new(
        requester: Requester,
        adjudication_timeout: Duration,
        config: ExecutorConfig,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            requester,
            adjudication_timeout,
            config,
            store,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Ask the adjudicator about `task`. `None` means no usable answer.
    async fn adjudicate(&self, task: &Task) -> Result<Result<Decision, String>, LogicError> {
        let submission = Submission {
            artifact: serde_json::to_value(task)
                .map_err(|err| LogicError::Failed(format!("task not serializable: {}", err)))?,
            origin: SubsystemId::Executor,
            action_type: task.action_type().to_string(),
            context: CheckContext::default(),
        };
        let params = serde_json::to_value(&submission)
            .map_err(|err| LogicError::Failed(format!("submission not serializable: {}", err)))?;

        let reply = self
            .requester
            .request(
                SubsystemId::Sentinel,
                ADJUDICATE_ACTION,
                params,
                self.adjudication_timeout,
            )
            .await;

        match reply {
            Ok(Some(value)) => Ok(serde_json::from_value::<Decision>(value)
                .map_err(|err| format!("malformed adjudication reply: {}", err))),
            Ok(None) => Ok(Err("adjudicator did not answer in time".to_string())),
            Err(BusError::Remote { message, .. }) => {
                Ok(Err(format!("adjudication failed: {}", message)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Absolute, free of `..`, and under one of the allowed roots.
    pub fn permitted(&self, path: &Path) -> bool {
        path.is_absolute()
            && !path.components().any(|c| matches!(c, Component::ParentDir))
            && self
                .config
                .allowed_paths
                .iter()
                .any(|root| path.starts_with(root))
    }

    async fn run(&self, task: &Task) -> Outcome {
        match task {
            Task::FileWrite { path, content } => {
                if !self.permitted(path) {
                    return Outcome::failure(format!(
                        "path {} not in allowed directories",
                        path.display()
                    ));
                }
                if let Some(parent) = path.parent() {
                    if let Err(err) = tokio::fs::create_dir_all(parent).await {
                        return Outcome::failure(err.to_string());
                    }
                }
                match tokio::fs::write(path, content).await {
                    Ok(()) => Outcome::success(json!(path.display().to_string()), true),
                    Err(err) => Outcome::failure(err.to_string()),
                }
            }
            Task::FileRead { path } => {
                if !self.permitted(path) {
                    return Outcome::failure(format!(
                        "path {} not in allowed directories",
                        path.display()
                    ));
                }
                match tokio::fs::read_to_string(path).await {
                    Ok(content) => Outcome::success(json!(content), false),
                    Err(err) => Outcome::failure(err.to_string()),
                }
            }
            Task::Command { program, args, cwd } => self.run_command(program, args, cwd.as_deref()).await,
            Task::ApiCall { endpoint, .. } => Outcome::success(
                json!({ "endpoint": endpoint, "message": "API calls are not wired to a transport" }),
                false,
            ),
            Task::Financial { description, amount } => Outcome::success(
                json!({
                    "description": description,
                    "amount": amount,
                    "message": "Exposure acknowledged; no funds moved",
                }),
                false,
            ),
            Task::Echo { message } => Outcome::success(json!(message), false),
        }
    }

    async fn run_command(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Outcome {
        let cwd = match cwd {
            Some(dir) if self.permitted(dir) => dir.to_path_buf(),
            Some(dir) => {
                return Outcome::failure(format!(
                    "working directory {} not in allowed directories",
                    dir.display()
                ))
            }
            None => match self.config.allowed_paths.first() {
                Some(root) => PathBuf::from(root),
                None => return Outcome::failure("no allowed working directory configured"),
            },
        };

        let limit = Duration::from_secs(self.config.sandbox_timeout_secs);
        let child = Command::new(program)
            .args(args)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, child).await {
            Err(_) => Outcome::failure(format!(
                "command timed out after {}s",
                self.config.sandbox_timeout_secs
            )),
            Ok(Err(err)) => Outcome::failure(err.to_string()),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let mut outcome = Outcome::success(
                    json!({
                        "stdout": stdout,
                        "stderr": stderr,
                        "returncode": output.status.code(),
                    }),
                    false,
                );
                if !output.status.success() {
                    outcome.status = ExecutionStatus::Failure;
                    outcome.errors.push(stderr);
                }
                outcome
            }
        }
    }
}

#[async_trait]
impl SubsystemLogic for ExecutorLogic {
    type Input = ExecutorInput;
    type Output = ExecutionResult;

    fn id(&self) -> SubsystemId {
        SubsystemId::Executor
    }

    async fn process(&self, input: &ExecutorInput) -> Result<ExecutionResult, LogicError> {
        let task = &input.task;
        let decision = match self.adjudicate(task).await? {
            Ok(decision) => decision,
            Err(reason) => {
                warn!(task = task.kind(), reason = %reason, "Task rejected without a decision");
                return Ok(ExecutionResult::rejected(None, reason));
            }
        };

        if !decision.is_approved() {
            let reason = decision.reason().unwrap_or("adjudicator withheld approval").to_string();
            info!(
                task = task.kind(),
                verdict = ?decision.verdict(),
                reason = %reason,
                "Task rejected"
            );
            return Ok(ExecutionResult::rejected(Some(decision), reason));
        }

        debug!(task = task.kind(), "Task approved, executing");
        let outcome = self.run(task).await;
        let executed_at = Utc::now();

        self.store
            .append_audit_record(
                SubsystemId::Executor,
                AuditEventType::TaskExecuted,
                Some(Mode::Execution),
                json!({
                    "task": task,
                    "status": outcome.status,
                    "errors": outcome.errors,
                }),
                None,
            )
            .await?;
        info!(task = task.kind(), status = ?outcome.status, "Task executed");

        Ok(ExecutionResult {
            status: outcome.status,
            output: outcome.output,
            errors: outcome.errors,
            rollback_available: outcome.rollback_available,
            decision: Some(decision),
            executed_at: Some(executed_at),
        })
    }

    /// Nothing runs without an approval attached.
    fn check_output(&self, _identity: &SubsystemIdentity, output: &ExecutionResult) -> Result<(), String> {
        if output.executed() && !output.decision.as_ref().is_some_and(Decision::is_approved) {
            return Err(format!(
                "task reached status {:?} without an approving decision",
                output.status
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parliament_bus::{InMemoryBus, MessageBus, RequestServer};
    use parliament_compliance::Subsystem;
    use parliament_constitution::Constitution;
    use parliament_memory::InMemoryStore;
    use parliament_sentinel::{Adjudicator, SentinelLogic};
    use parliament_types::{FaultCode, HaltEventId, ModeState};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        executor: ExecutorLogic,
        store: InMemoryStore,
        _server: tokio::task::JoinHandle<()>,
    }

    async fn harness(allowed: Vec<String>) -> Harness {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let store = InMemoryStore::new();
        let constitution = Arc::new(Constitution::default());

        let adjudicator = Arc::new(
            Adjudicator::new(&constitution, Arc::new(store.clone())).unwrap(),
        );
        let sentinel = Arc::new(Subsystem::new(
            SentinelLogic::new(adjudicator),
            Arc::clone(&constitution),
            Arc::new(store.clone()),
            ModeState::new(),
        ));
        sentinel.activate().await.unwrap();
        let server = RequestServer::spawn(Arc::clone(&bus), SubsystemId::Sentinel, sentinel)
            .await
            .unwrap();

        let executor = ExecutorLogic::new(
            Requester::new(bus, SubsystemId::Executor),
            TIMEOUT,
            ExecutorConfig {
                sandbox_timeout_secs: 5,
                allowed_paths: allowed,
            },
            Arc::new(store.clone()),
        );
        Harness {
            executor,
            store,
            _server: server,
        }
    }

    fn echo(message: &str) -> ExecutorInput {
        ExecutorInput {
            task: Task::Echo {
                message: message.to_string(),
            },
        }
    }

    async fn executed_count(store: &InMemoryStore) -> usize {
        store
            .recent_audit_records(SubsystemId::Executor, 100)
            .await
            .unwrap()
            .iter()
            .filter(|r| r.event_type == AuditEventType::TaskExecuted)
            .count()
    }

    #[tokio::test]
    async fn approved_task_runs() {
        let h = harness(vec!["/tmp".into()]).await;
        let result = h.executor.process(&echo("hello there")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, json!("hello there"));
        assert!(result.decision.as_ref().unwrap().is_approved());
        assert!(result.executed_at.is_some());
        assert_eq!(executed_count(&h.store).await, 1);
    }

    #[tokio::test]
    async fn halted_task_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone.txt");
        let h = harness(vec![dir.path().display().to_string()]).await;

        let result = h
            .executor
            .process(&ExecutorInput {
                task: Task::FileWrite {
                    path: target.clone(),
                    content: "delete the archive".into(),
                },
            })
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Rejected);
        let decision = result.decision.unwrap();
        assert_eq!(decision.fault_code(), Some(&FaultCode::new("boundary_violation")));
        assert_eq!(decision.repair_cycle(), Some(1));
        assert!(!target.exists());
        assert_eq!(executed_count(&h.store).await, 0);
    }

    #[tokio::test]
    async fn file_write_stays_inside_allowed_roots() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("notes/today.txt");
        let h = harness(vec![dir.path().display().to_string()]).await;

        let written = h
            .executor
            .process(&ExecutorInput {
                task: Task::FileWrite {
                    path: inside.clone(),
                    content: "quiet progress".into(),
                },
            })
            .await
            .unwrap();
        assert_eq!(written.status, ExecutionStatus::Success);
        assert!(written.rollback_available);
        assert_eq!(std::fs::read_to_string(&inside).unwrap(), "quiet progress");

        let escaped = dir.path().join("../escaped.txt");
        let refused = h
            .executor
            .process(&ExecutorInput {
                task: Task::FileWrite {
                    path: escaped,
                    content: "x".into(),
                },
            })
            .await
            .unwrap();
        assert_eq!(refused.status, ExecutionStatus::Failure);
        assert!(refused.errors[0].contains("not in allowed directories"));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_adjudication_rejects() {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let store = InMemoryStore::new();
        let executor = ExecutorLogic::new(
            Requester::new(bus, SubsystemId::Executor),
            TIMEOUT,
            ExecutorConfig::default(),
            Arc::new(store.clone()),
        );

        let result = executor.process(&echo("hello")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Rejected);
        assert!(result.decision.is_none());
        assert!(result.errors[0].contains("did not answer"));
        assert_eq!(executed_count(&store).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runs_without_a_shell() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(vec![dir.path().display().to_string()]).await;
        let result = h
            .executor
            .process(&ExecutorInput {
                task: Task::Command {
                    program: "echo".into(),
                    args: vec!["one; echo two".into()],
                    cwd: None,
                },
            })
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output["stdout"], "one; echo two\n");
    }

    #[test]
    fn financial_tasks_are_exposure() {
        let task = Task::Financial {
            description: "rebalance".into(),
            amount: Some(10.0),
        };
        assert_eq!(task.action_type(), FINANCIAL_EXPOSURE);
        assert_eq!(
            Task::Echo { message: "x".into() }.action_type(),
            REAL_WORLD_EXECUTION
        );
    }

    #[tokio::test]
    async fn execution_without_approval_violates_post_condition() {
        let h = harness(vec!["/tmp".into()]).await;
        let identity = Constitution::default().identity(SubsystemId::Executor);
        let mut result = ExecutionResult {
            status: ExecutionStatus::Success,
            output: Value::Null,
            errors: vec![],
            rollback_available: false,
            decision: Some(Decision::Halt {
                reason: "r".into(),
                fault_code: FaultCode::new("legal_violation"),
                repair_cycle: 1,
                halt_event_id: HaltEventId(1),
            }),
            executed_at: Some(Utc::now()),
        };
        assert!(h.executor.check_output(&identity, &result).is_err());

        result.status = ExecutionStatus::Rejected;
        assert!(h.executor.check_output(&identity, &result).is_ok());
    }
}
