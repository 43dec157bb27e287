//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Structural errors surfaced to the caller of the engine.
///
/// Step failures are not in here: they are recorded on the step and folded
/// into the workflow status instead of escaping `run`.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Lookup / registration errors ------

    /// No workflow with this ID is registered with the engine.
    #[error("workflow '{0}' not found")]
    NotFound(Uuid),

    /// A step with the same ID was already added to the workflow.
    #[error("step '{step_id}' already exists in workflow '{workflow_id}'")]
    DuplicateStep {
        workflow_id: Uuid,
        step_id: String,
    },

    // ------ Execution errors ------

    /// Another `run` currently holds this workflow's execution permit.
    #[error("workflow '{0}' is already running")]
    AlreadyRunning(Uuid),

    /// Static planning found steps that can never become ready.
    #[error("deadlock: steps can never become ready: {}", .stuck.join(", "))]
    Deadlock { stuck: Vec<String> },
}
