//! Built-in demonstration actions.
//!
//! | action  | behaviour                                        |
//! |---------|--------------------------------------------------|
//! | `echo`  | returns the step context as JSON                 |
//! | `fail`  | always fails                                     |
//! | `sleep` | waits for a fixed duration, then succeeds        |
//!
//! A step whose action is not registered at all is treated by the engine as a
//! no-op, so there is no dedicated `noop` action.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ActionError, StepContext, StepExecutor};

/// Returns the step context it was invoked with.
pub struct EchoAction;

#[async_trait]
impl StepExecutor for EchoAction {
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError> {
        debug!(step_id = %ctx.step_id, "echo");
        serde_json::to_value(ctx).map_err(|e| ActionError::Other(e.into()))
    }
}

/// Always fails with a fixed message.
pub struct FailAction {
    pub message: String,
}

impl Default for FailAction {
    fn default() -> Self {
        Self { message: "step failed on purpose".into() }
    }
}

#[async_trait]
impl StepExecutor for FailAction {
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError> {
        Err(ActionError::Failed(format!("{}: {}", ctx.step_id, self.message)))
    }
}

/// Sleeps, then reports how long it slept.
pub struct SleepAction {
    pub duration: Duration,
}

#[async_trait]
impl StepExecutor for SleepAction {
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError> {
        debug!(step_id = %ctx.step_id, duration = ?self.duration, "sleeping");
        tokio::time::sleep(self.duration).await;
        Ok(json!({ "slept_ms": whole_millis(self.duration) }))
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The `(action, executor)` pairs the CLI registers by default.
pub fn defaults() -> Vec<(&'static str, Arc<dyn StepExecutor>)> {
    vec![
        ("echo", Arc::new(EchoAction)),
        ("fail", Arc::new(FailAction::default())),
        ("sleep", Arc::new(SleepAction { duration: Duration::from_millis(100) })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx() -> StepContext {
        StepContext {
            workflow_id: Uuid::new_v4(),
            step_id: "s1".into(),
            name: "Step 1".into(),
            action: "echo".into(),
            agent_id: Some("gpu-0".into()),
        }
    }

    #[tokio::test]
    async fn echo_returns_context() {
        let out = EchoAction.execute(&ctx()).await.expect("echo succeeds");
        assert_eq!(out["step_id"], "s1");
        assert_eq!(out["agent_id"], "gpu-0");
    }

    #[tokio::test]
    async fn fail_names_the_step() {
        let err = FailAction::default().execute(&ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "s1: step failed on purpose");
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_the_configured_duration() {
        let action = SleepAction { duration: Duration::from_secs(5) };
        let started = tokio::time::Instant::now();

        let out = action.execute(&ctx()).await.expect("sleep succeeds");

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(out["slept_ms"], 5000);
    }

    #[test]
    fn millis_saturate_instead_of_wrapping() {
        assert_eq!(whole_millis(Duration::from_micros(1_500)), 1);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn defaults_cover_the_documented_actions() {
        let names: Vec<_> = defaults().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["echo", "fail", "sleep"]);
    }
}
