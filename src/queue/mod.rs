//! Queue orchestration: start barriers, task strategies, the loader state
//! machine and the per-caller registry

pub mod barrier;
pub mod loader;
pub mod manager;
pub mod task;

pub use barrier::{BarrierWaiter, StartBarrier};
pub use loader::{QueueLoader, QueueState};
pub use manager::LoadQueueManager;
pub use task::{create_task, ActionTask, FixedDurationTask, MultipleInvocationsTask, TaskContext, TaskOutcome};
