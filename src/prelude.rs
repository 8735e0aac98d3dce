//! Convenient re-exports for common types and traits

pub use crate::core::{
    ActionInvoker, ActionRequest, CancellationToken, ClosureInvoker, LoaderError, Result,
};
pub use crate::pattern::{ExecutionMode, IterationInterval, RampUp, ThreadingPattern};
pub use crate::queue::{LoadQueueManager, QueueLoader, QueueState, StartBarrier, TaskOutcome};
pub use crate::stats::{ExecutionResult, QueueExecutionStatistics};
