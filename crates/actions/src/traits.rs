//! The `StepExecutor` trait — the contract every action must fulfil.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ActionError;

/// What an executor gets to see of the step it runs.
///
/// Defined here (in the actions crate) so both the engine and individual
/// action implementations can import it without a circular dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// ID of the workflow the step belongs to.
    pub workflow_id: Uuid,
    pub step_id: String,
    pub name: String,
    /// The action name the executor was resolved by.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// The core executor trait.
///
/// Invoked at most once per step per run. Returning `Err` fails the step and,
/// with it, the workflow.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError>;
}

/// Adapter turning an async closure into a [`StepExecutor`].
pub struct FnExecutor<F>(F);

/// Wrap `f` so it can be registered as an executor.
///
/// ```ignore
/// engine.register("greet", Arc::new(from_fn(|ctx: StepContext| async move {
///     Ok::<_, ActionError>(serde_json::json!({ "hello": ctx.name }))
/// })));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    FnExecutor(f)
}

#[async_trait]
impl<F, Fut> StepExecutor for FnExecutor<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError> {
        (self.0)(ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(step_id: &str) -> StepContext {
        StepContext {
            workflow_id: Uuid::new_v4(),
            step_id: step_id.into(),
            name: format!("Step {step_id}"),
            action: "greet".into(),
            agent_id: None,
        }
    }

    #[tokio::test]
    async fn closure_executor_sees_the_step_context() {
        let exec = from_fn(|ctx: StepContext| async move {
            Ok::<Value, ActionError>(json!({ "hello": ctx.name }))
        });

        let out = exec.execute(&ctx("s1")).await.expect("closure should succeed");
        assert_eq!(out, json!({ "hello": "Step s1" }));
    }

    #[tokio::test]
    async fn closure_executor_failure_is_returned() {
        let exec = from_fn(|_ctx: StepContext| async { Err::<Value, _>(ActionError::failed("nope")) });

        let err = exec.execute(&ctx("s1")).await.unwrap_err();
        assert!(matches!(err, ActionError::Failed(msg) if msg == "nope"));
    }

    #[test]
    fn context_omits_missing_agent_id() {
        let value = serde_json::to_value(ctx("s1")).unwrap();
        assert!(value.get("agent_id").is_none());
        assert_eq!(value["step_id"], "s1");
    }
}
