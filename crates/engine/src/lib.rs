//! `engine` crate — workflow graph model, executor registry, and the
//! round-based execution loop.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod registry;

pub use dag::{plan_frontiers, ready_steps};
pub use error::EngineError;
pub use executor::{EngineConfig, WorkflowEngine};
pub use models::{
    AgentType, Protocol, RunSummary, StatusReport, Step, StepDefinition, StepStatus, Workflow,
    WorkflowDefinition, WorkflowStatus,
};
pub use registry::ExecutorRegistry;
