//! Core domain models for the workflow engine.
//!
//! A [`Workflow`] owns its [`Step`]s in insertion order; the engine owns the
//! workflows. [`WorkflowDefinition`] is the serialisable form used to load a
//! workflow from JSON.

use std::collections::HashSet;
use std::fmt;

use actions::StepContext;
use chrono::{DateTime, Utc};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a single step: `Pending → Running → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a workflow.
///
/// `Cancelled` is never produced by the engine itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Descriptive tags
// ---------------------------------------------------------------------------

/// Hardware class of the agent a step is meant for. Not interpreted by the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(rename = "nvidia")]
    NvidiaGpu,
    #[serde(rename = "trainium")]
    AwsTrainium,
    #[serde(rename = "tpu")]
    GoogleTpu,
    #[serde(rename = "cpu")]
    Cpu,
}

/// Wire protocol an agent speaks. Not interpreted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Mcp,
    A2a,
    Custom,
    Http,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the owning workflow (referenced by `dependencies`).
    pub step_id: String,
    pub name: String,
    /// Key into the executor registry.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Step ids that must be `Completed` before this step is dispatched.
    /// May name steps that do not exist (yet).
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
    /// Value returned by the executor, `None` for no-op steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(
        step_id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            action: action.into(),
            agent_id: None,
            dependencies,
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The view of this step handed to its executor.
    pub fn context(&self, workflow_id: Uuid) -> StepContext {
        StepContext {
            workflow_id,
            step_id: self.step_id.clone(),
            name: self.name.clone(),
            action: self.action.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A named collection of steps executed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Uuid,
    pub name: String,
    pub steps: IndexMap<String, Step>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Create an empty, `Pending` workflow with a fresh ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            name: name.into(),
            steps: IndexMap::new(),
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Append a step, rejecting a step id that is already taken.
    pub fn add_step(&mut self, step: Step) -> Result<&Step, EngineError> {
        match self.steps.entry(step.step_id.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateStep {
                workflow_id: self.workflow_id,
                step_id: step.step_id,
            }),
            Entry::Vacant(slot) => Ok(slot.insert(step)),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.get(step_id)
    }

    /// Ids of every step currently `Completed`.
    pub fn completed_ids(&self) -> HashSet<String> {
        self.steps
            .values()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.step_id.clone())
            .collect()
    }

    /// Ids of every step still `Pending`, in insertion order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.steps
            .values()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.step_id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Definitions (JSON input)
// ---------------------------------------------------------------------------

/// Serialisable description of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl From<StepDefinition> for Step {
    fn from(def: StepDefinition) -> Self {
        let mut step = Step::new(def.id, def.name, def.action, def.dependencies);
        step.agent_id = def.agent_id;
        step
    }
}

/// Serialisable description of a whole workflow, e.g. a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Build a `Pending` workflow, failing on the first duplicate step id.
    pub fn into_workflow(self) -> Result<Workflow, EngineError> {
        let mut workflow = Workflow::new(self.name);
        for def in self.steps {
            workflow.add_step(def.into())?;
        }
        Ok(workflow)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What `run` returns: final workflow status plus every step's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub steps: IndexMap<String, StepStatus>,
}

impl From<&Workflow> for RunSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            workflow_id: workflow.workflow_id,
            status: workflow.status,
            steps: workflow
                .steps
                .values()
                .map(|s| (s.step_id.clone(), s.status))
                .collect(),
        }
    }
}

/// Read-only status query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub workflow_id: Uuid,
    pub name: String,
    pub status: WorkflowStatus,
    pub step_count: usize,
}

impl From<&Workflow> for StatusReport {
    fn from(workflow: &Workflow) -> Self {
        Self {
            workflow_id: workflow.workflow_id,
            name: workflow.name.clone(),
            status: workflow.status,
            step_count: workflow.steps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
    }

    #[test]
    fn new_step_is_pending_without_result() {
        let step = Step::new("s1", "Step 1", "noop", vec![]);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.result.is_none());
        assert!(step.error.is_none());
        assert!(!step.is_terminal());
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let mut wf = Workflow::new("dup");
        wf.add_step(Step::new("a", "A", "noop", vec![])).expect("first insert");

        let err = wf.add_step(Step::new("a", "Again", "noop", vec![])).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStep { step_id, .. } if step_id == "a"));
        assert_eq!(wf.steps["a"].name, "A");
    }

    #[test]
    fn definition_deserialises_with_defaults() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "demo",
            "steps": [
                { "id": "s1", "name": "Step 1", "action": "echo", "agent_id": "gpu-0" },
                { "id": "s2", "name": "Step 2", "action": "echo", "dependencies": ["s1"] }
            ]
        }))
        .expect("valid definition");

        let wf = def.into_workflow().expect("unique ids");
        assert_eq!(wf.status, WorkflowStatus::Pending);
        assert_eq!(wf.steps.keys().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(wf.steps["s1"].agent_id.as_deref(), Some("gpu-0"));
        assert_eq!(wf.steps["s2"].dependencies, vec!["s1"]);
    }

    #[test]
    fn summary_serialises_lowercase_statuses() {
        let mut wf = Workflow::new("report");
        wf.add_step(Step::new("a", "A", "noop", vec![])).unwrap();
        wf.steps["a"].status = StepStatus::Completed;
        wf.status = WorkflowStatus::Completed;

        let value = serde_json::to_value(RunSummary::from(&wf)).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["steps"]["a"], "completed");
        assert_eq!(value["workflow_id"], wf.workflow_id.to_string());
    }

    #[test]
    fn tags_use_short_wire_names() {
        assert_eq!(serde_json::to_value(AgentType::NvidiaGpu).unwrap(), "nvidia");
        assert_eq!(serde_json::to_value(AgentType::AwsTrainium).unwrap(), "trainium");
        assert_eq!(serde_json::to_value(Protocol::A2a).unwrap(), "a2a");
    }
}
