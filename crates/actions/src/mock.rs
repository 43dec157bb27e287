//! `MockExecutor` — a test double for `StepExecutor`.
//!
//! Useful in unit and integration tests where a real action implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ActionError, StepContext, StepExecutor};

/// Behaviour injected into `MockExecutor` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with the given description.
    Fail(String),
}

/// Shared, ordered log of `start:<step>` / `end:<step>` entries.
///
/// Hand the same journal to several mocks to observe dispatch order across
/// a whole workflow.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// A mock executor that records every step it receives and returns a
/// programmer-specified result.
pub struct MockExecutor {
    /// Label used in test assertions.
    pub name: String,
    /// What the executor will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Step ids seen by this executor (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    journal: Option<Journal>,
}

impl MockExecutor {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with `msg`.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(name, MockBehaviour::Fail(msg.into()))
    }

    fn new(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            journal: None,
        }
    }

    /// Sleep for `delay` between recording the start and producing a result.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append start/end entries to a shared journal.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Number of times this executor has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Step ids this executor has been invoked with.
    pub fn called_with(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn note(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(entry);
        }
    }
}

#[async_trait]
impl StepExecutor for MockExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<Value, ActionError> {
        self.calls.lock().unwrap().push(ctx.step_id.clone());
        self.note(format!("start:{}", ctx.step_id));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.note(format!("end:{}", ctx.step_id));

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                // Tag the output with the executor and step so tests can tell
                // which mock produced a given step's result.
                let mut out = json!({ "executor": self.name, "step": ctx.step_id });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(out)
            }
            MockBehaviour::Fail(msg) => Err(ActionError::Failed(msg.clone())),
        }
    }
}
