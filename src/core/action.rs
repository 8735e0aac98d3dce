//! Action requests and the invoker seam
//!
//! The scheduler never interprets an action - it only carries an
//! [`ActionRequest`] to whatever [`ActionInvoker`] the embedding system
//! provides (the action registry/dispatcher, a remote stub, or a test
//! closure) and records the outcome.

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque unit of work: a component name, an action name and an
/// argument list the scheduler passes through untouched
///
/// All workers assigned the same request share it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    component: String,
    action: String,
    arguments: Vec<serde_json::Value>,
}

impl ActionRequest {
    /// Create a new action request
    pub fn new(
        component: impl Into<String>,
        action: impl Into<String>,
        arguments: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            component: component.into(),
            action: action.into(),
            arguments,
        }
    }

    /// Get the component name
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Get the action name
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Get the argument list
    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    /// The `component.action` name used in logs and execution results
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.component, self.action)
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({} args)",
            self.component,
            self.action,
            self.arguments.len()
        )
    }
}

/// The dispatcher collaborator that turns a request into an actual invocation
///
/// Implementations may block arbitrarily long and may fail or panic; the
/// task loop isolates every outcome into an execution result.
pub trait ActionInvoker: Send + Sync {
    /// Invoke a single action request
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation fails; the error is recorded, it
    /// never stops the queue.
    fn invoke(&self, request: &ActionRequest) -> Result<()>;
}

/// Helper to build an invoker from a closure
pub struct ClosureInvoker<F>
where
    F: Fn(&ActionRequest) -> Result<()> + Send + Sync,
{
    closure: F,
}

impl<F> ClosureInvoker<F>
where
    F: Fn(&ActionRequest) -> Result<()> + Send + Sync,
{
    /// Create a new closure invoker
    pub fn new(closure: F) -> Self {
        Self { closure }
    }
}

impl<F> ActionInvoker for ClosureInvoker<F>
where
    F: Fn(&ActionRequest) -> Result<()> + Send + Sync,
{
    fn invoke(&self, request: &ActionRequest) -> Result<()> {
        (self.closure)(request)
    }
}
