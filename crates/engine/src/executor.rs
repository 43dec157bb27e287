//! Workflow execution engine.
//!
//! `WorkflowEngine` owns the workflow table and the executor registry and
//! drives a workflow to a terminal status in rounds:
//! 1. Computes the frontier of `Pending` steps whose dependencies completed.
//! 2. Marks a batch of it `Running` and spawns one task per step.
//! 3. Waits for the whole batch, then records results and errors.
//! 4. Stops on an empty frontier (deadlock) or on the first failed batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use actions::{ActionError, StepContext, StepExecutor};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::dag::ready_steps;
use crate::models::{
    RunSummary, StatusReport, Step, StepDefinition, StepStatus, Workflow, WorkflowDefinition,
    WorkflowStatus,
};
use crate::registry::ExecutorRegistry;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on steps of one frontier in flight at once.
    /// `None` (or `0`) dispatches the whole frontier together.
    pub max_parallel_steps: Option<usize>,
}

impl EngineConfig {
    fn batch_size(&self, frontier_len: usize) -> usize {
        match self.max_parallel_steps {
            Some(n) if n > 0 => n,
            _ => frontier_len.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow table
// ---------------------------------------------------------------------------

/// A workflow plus its execution permit. Holding the permit's guard is what
/// makes a `run` the single writer of that workflow.
struct WorkflowSlot {
    workflow: Workflow,
    permit: Arc<Mutex<()>>,
}

impl WorkflowSlot {
    fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            permit: Arc::new(Mutex::new(())),
        }
    }
}

type WorkflowTable = HashMap<Uuid, WorkflowSlot>;

fn lookup(table: &WorkflowTable, workflow_id: Uuid) -> Result<&Workflow, EngineError> {
    table
        .get(&workflow_id)
        .map(|slot| &slot.workflow)
        .ok_or(EngineError::NotFound(workflow_id))
}

fn lookup_mut(table: &mut WorkflowTable, workflow_id: Uuid) -> Result<&mut Workflow, EngineError> {
    table
        .get_mut(&workflow_id)
        .map(|slot| &mut slot.workflow)
        .ok_or(EngineError::NotFound(workflow_id))
}

/// Outcome of one dispatched step: `Ok(None)` for a step with no executor.
type StepOutcome = Result<Option<Value>, ActionError>;

const ABORTED: &str = "run aborted before the step finished";

/// Fail every `Running` step and the workflow itself.
fn abort_workflow(table: &mut WorkflowTable, workflow_id: Uuid) {
    let Ok(workflow) = lookup_mut(table, workflow_id) else {
        return;
    };
    for step in workflow.steps.values_mut() {
        if step.status == StepStatus::Running {
            step.status = StepStatus::Failed;
            step.error = Some(ABORTED.to_owned());
        }
    }
    workflow.status = WorkflowStatus::Failed;
}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

/// Held for the whole of a `run`. If the `run` future is dropped before it
/// disarms the guard, the workflow is failed and the permit is released only
/// after that cleanup, so the next `run` never sees `Running` leftovers.
struct RunGuard {
    workflows: Arc<RwLock<WorkflowTable>>,
    workflow_id: Uuid,
    permit: Option<OwnedMutexGuard<()>>,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let permit = self.permit.take();
        let workflow_id = self.workflow_id;
        warn!(%workflow_id, "run dropped before finishing, failing in-flight steps");

        if let Ok(mut table) = self.workflows.try_write() {
            abort_workflow(&mut table, workflow_id);
            drop(permit);
            return;
        }

        // Someone holds the table; finish the cleanup on the runtime.
        match Handle::try_current() {
            Ok(handle) => {
                let workflows = Arc::clone(&self.workflows);
                handle.spawn(async move {
                    abort_workflow(&mut *workflows.write().await, workflow_id);
                    drop(permit);
                });
            }
            Err(_) => error!(%workflow_id, "no runtime to fail the aborted run on"),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Process-local engine: workflows, executors, and the scheduler.
///
/// Construct as many as needed; engines share nothing. Add workflows, steps
/// and executors before calling [`WorkflowEngine::run`].
#[derive(Default)]
pub struct WorkflowEngine {
    workflows: Arc<RwLock<WorkflowTable>>,
    registry: RwLock<ExecutorRegistry>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            registry: RwLock::new(ExecutorRegistry::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Create an empty `Pending` workflow and return its ID.
    pub async fn create_workflow(&self, name: impl Into<String>) -> Uuid {
        let workflow = Workflow::new(name);
        let workflow_id = workflow.workflow_id;
        debug!(%workflow_id, name = %workflow.name, "workflow created");

        self.workflows
            .write()
            .await
            .insert(workflow_id, WorkflowSlot::new(workflow));
        workflow_id
    }

    /// Create a workflow with all of its steps in one go.
    ///
    /// Nothing is registered if the definition repeats a step id.
    pub async fn load_definition(&self, definition: WorkflowDefinition) -> Result<Uuid, EngineError> {
        let workflow = definition.into_workflow()?;
        let workflow_id = workflow.workflow_id;
        info!(%workflow_id, name = %workflow.name, steps = workflow.steps.len(), "workflow loaded");

        self.workflows
            .write()
            .await
            .insert(workflow_id, WorkflowSlot::new(workflow));
        Ok(workflow_id)
    }

    /// Append a `Pending` step to an existing workflow.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the workflow does not exist.
    /// - [`EngineError::DuplicateStep`] if `step_id` is already taken.
    pub async fn add_step(
        &self,
        workflow_id: Uuid,
        step_id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        dependencies: &[&str],
    ) -> Result<Step, EngineError> {
        self.add_step_definition(
            workflow_id,
            StepDefinition {
                id: step_id.into(),
                name: name.into(),
                action: action.into(),
                agent_id: None,
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            },
        )
        .await
    }

    /// Like [`WorkflowEngine::add_step`], taking the serialisable form.
    pub async fn add_step_definition(
        &self,
        workflow_id: Uuid,
        definition: StepDefinition,
    ) -> Result<Step, EngineError> {
        let mut workflows = self.workflows.write().await;
        let workflow = lookup_mut(&mut workflows, workflow_id)?;
        workflow.add_step(definition.into()).cloned()
    }

    /// Bind `executor` to `action`; a later call for the same action wins.
    pub async fn register(&self, action: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.registry.write().await.register(action, executor);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `{ workflow_id, name, status, step_count }` for a workflow.
    pub async fn status(&self, workflow_id: Uuid) -> Result<StatusReport, EngineError> {
        let workflows = self.workflows.read().await;
        let workflow = lookup(&workflows, workflow_id)?;
        Ok(StatusReport::from(workflow))
    }

    /// Snapshot of a workflow, including per-step results and errors.
    pub async fn workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        let workflows = self.workflows.read().await;
        let workflow = lookup(&workflows, workflow_id).ok()?;
        Some(workflow.clone())
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the workflow to a terminal status and summarise every step.
    ///
    /// Step failures and deadlocks are reported through the summary's
    /// `Failed` status, never as an `Err`.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the workflow does not exist.
    /// - [`EngineError::AlreadyRunning`] if another `run` of the same workflow
    ///   is in flight.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub async fn run(&self, workflow_id: Uuid) -> Result<RunSummary, EngineError> {
        let guard = self.begin(workflow_id).await?;
        info!("workflow started");

        let failed = self.drive(workflow_id).await?;

        let mut workflows = self.workflows.write().await;
        let workflow = lookup_mut(&mut workflows, workflow_id)?;

        let all_completed = workflow
            .steps
            .values()
            .all(|s| s.status == StepStatus::Completed);
        workflow.status = if !failed && all_completed {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };

        match workflow.status {
            WorkflowStatus::Completed => info!("workflow completed"),
            _ => warn!(pending = ?workflow.pending_ids(), "workflow failed"),
        }

        let summary = RunSummary::from(&*workflow);
        drop(workflows);
        guard.disarm();
        Ok(summary)
    }

    /// Take the execution permit and flip the workflow to `Running`.
    async fn begin(&self, workflow_id: Uuid) -> Result<RunGuard, EngineError> {
        let mut workflows = self.workflows.write().await;
        let slot = workflows
            .get_mut(&workflow_id)
            .ok_or(EngineError::NotFound(workflow_id))?;

        let permit = Arc::clone(&slot.permit)
            .try_lock_owned()
            .map_err(|_| EngineError::AlreadyRunning(workflow_id))?;

        slot.workflow.status = WorkflowStatus::Running;
        Ok(RunGuard {
            workflows: Arc::clone(&self.workflows),
            workflow_id,
            permit: Some(permit),
            armed: true,
        })
    }

    /// The round loop. Returns whether the run failed.
    async fn drive(&self, workflow_id: Uuid) -> Result<bool, EngineError> {
        // Steps finished by an earlier run count as done, so re-running a
        // completed workflow reports `Completed` without dispatching anything
        // instead of deadlocking on steps that are no longer `Pending`.
        let mut completed: HashSet<String> = {
            let workflows = self.workflows.read().await;
            let workflow = lookup(&workflows, workflow_id)?;
            workflow.completed_ids()
        };
        let mut round = 0usize;

        loop {
            let frontier: Vec<StepContext> = {
                let workflows = self.workflows.read().await;
                let workflow = lookup(&workflows, workflow_id)?;

                if completed.len() >= workflow.steps.len() {
                    return Ok(false);
                }

                let frontier: Vec<StepContext> = ready_steps(workflow, &completed)
                    .into_iter()
                    .map(|step| step.context(workflow_id))
                    .collect();

                if frontier.is_empty() {
                    warn!(
                        stuck = ?workflow.pending_ids(),
                        "deadlock: no step is ready but the workflow is incomplete"
                    );
                    return Ok(true);
                }
                frontier
            };

            round += 1;
            debug!(
                round,
                steps = ?frontier.iter().map(|c| c.step_id.as_str()).collect::<Vec<_>>(),
                "dispatching frontier"
            );

            let batch_size = self.config.batch_size(frontier.len());
            for batch in frontier.chunks(batch_size) {
                let outcomes = self.dispatch(workflow_id, batch).await?;
                if self.record(workflow_id, outcomes, &mut completed).await? {
                    // Fail fast: the rest of this frontier stays `Pending`.
                    return Ok(true);
                }
            }
        }
    }

    /// Mark `batch` running, execute every step concurrently, and wait for
    /// all of them.
    async fn dispatch(
        &self,
        workflow_id: Uuid,
        batch: &[StepContext],
    ) -> Result<Vec<(String, StepOutcome)>, EngineError> {
        {
            let mut workflows = self.workflows.write().await;
            let workflow = lookup_mut(&mut workflows, workflow_id)?;
            for ctx in batch {
                if let Some(step) = workflow.steps.get_mut(&ctx.step_id) {
                    step.status = StepStatus::Running;
                }
            }
        }

        let handles: Vec<_> = {
            let registry = self.registry.read().await;
            batch
                .iter()
                .map(|ctx| {
                    let executor = registry.get(&ctx.action);
                    let ctx = ctx.clone();
                    tokio::spawn(
                        async move {
                            match executor {
                                Some(executor) => executor.execute(&ctx).await.map(Some),
                                None => {
                                    debug!(
                                        step_id = %ctx.step_id,
                                        action = %ctx.action,
                                        "no executor registered, completing as no-op"
                                    );
                                    Ok(None)
                                }
                            }
                        }
                        .in_current_span(),
                    )
                })
                .collect()
        };

        let joined = join_all(handles).await;

        Ok(batch
            .iter()
            .zip(joined)
            .map(|(ctx, joined)| {
                let outcome = joined.unwrap_or_else(|join_err| {
                    Err(ActionError::Failed(format!("executor task failed: {join_err}")))
                });
                (ctx.step_id.clone(), outcome)
            })
            .collect())
    }

    /// Fold a batch's outcomes into the workflow. Returns whether any step
    /// failed.
    async fn record(
        &self,
        workflow_id: Uuid,
        outcomes: Vec<(String, StepOutcome)>,
        completed: &mut HashSet<String>,
    ) -> Result<bool, EngineError> {
        let mut workflows = self.workflows.write().await;
        let workflow = lookup_mut(&mut workflows, workflow_id)?;
        let mut failed = false;

        for (step_id, outcome) in outcomes {
            let Some(step) = workflow.steps.get_mut(&step_id) else {
                continue;
            };

            match outcome {
                Ok(result) => {
                    step.status = StepStatus::Completed;
                    step.result = result;
                    info!(%step_id, "step completed");
                    completed.insert(step_id);
                }
                Err(err) => {
                    step.status = StepStatus::Failed;
                    step.error = Some(err.to_string());
                    error!(%step_id, error = %err, "step failed");
                    failed = true;
                }
            }
        }

        Ok(failed)
    }
}
