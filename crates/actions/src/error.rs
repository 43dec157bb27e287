//! Action-level error type.

use thiserror::Error;

/// Errors returned by an executor's `execute` method.
///
/// The engine never retries: any variant marks the step `FAILED` and the
/// `Display` text is stored as the step's error description.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    /// Any other error bubbled up from inside the action.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    /// Shorthand for [`ActionError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
