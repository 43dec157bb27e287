//! Maps action names to executors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use actions::StepExecutor;
use tracing::debug;

/// Action name → executor. Registering an existing name replaces the old
/// executor.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `executor` to `action`, returning the executor it replaced.
    pub fn register(
        &mut self,
        action: impl Into<String>,
        executor: Arc<dyn StepExecutor>,
    ) -> Option<Arc<dyn StepExecutor>> {
        let action = action.into();
        let previous = self.executors.insert(action.clone(), executor);
        if previous.is_some() {
            debug!(%action, "replaced executor");
        }
        previous
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(action).cloned()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        actions.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("actions", &actions)
            .finish()
    }
}
