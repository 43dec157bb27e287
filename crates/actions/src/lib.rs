//! `actions` crate — the `StepExecutor` trait and the built-in actions.
//!
//! Every executor — built-in, closure-based or test double — implements
//! [`StepExecutor`]. The engine crate resolves a step's `action` name to one of
//! these trait objects and dispatches through it.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use error::ActionError;
pub use traits::{from_fn, FnExecutor, StepContext, StepExecutor};
