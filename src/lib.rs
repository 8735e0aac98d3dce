//! # Load Queue
//!
//! A load-generation scheduler: drive opaque test actions concurrently with
//! configurable worker counts, staggered ramp-up starts and per-invocation
//! result collection.
//!
//! ## Features
//!
//! - **Threading patterns**: count-based and duration-based execution,
//!   all-at-once or ramped up in timed worker groups
//! - **Start barriers**: workers of a group become runnable together, never
//!   before the queue is started
//! - **Failure isolation**: an action that errors or panics is recorded as a
//!   failed result and stops nothing else
//! - **Cooperative cancellation**: in-flight invocations finish, nothing new
//!   starts, every sleep wakes immediately
//! - **Execution statistics**: a thread-safe registry of per-invocation
//!   outcomes keyed by queue name, snapshot-readable at any time
//! - **Synchronized iterations**: no worker begins iteration *k+1* before
//!   every worker finished iteration *k*
//!
//! ## Quick Start
//!
//! ```rust
//! use load_queue::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let stats = QueueExecutionStatistics::new();
//!
//! // The dispatcher collaborator; opaque to the scheduler
//! let invoker = Arc::new(ClosureInvoker::new(|request: &ActionRequest| {
//!     println!("invoking {}", request.qualified_name());
//!     Ok(())
//! }));
//!
//! let manager = LoadQueueManager::new("localhost", invoker, stats);
//!
//! // 5 workers, 10 iterations each, blocking until every worker returns
//! let pattern = ThreadingPattern::all_at_once(5, 10, Duration::ZERO, true)?;
//! manager.execute_actions(
//!     "smoke_test",
//!     1,
//!     vec![ActionRequest::new("Mail", "send", vec![])],
//!     pattern,
//! )?;
//!
//! let results = manager.execution_results("smoke_test");
//! assert_eq!(results.len(), 50);
//! assert!(results.iter().all(|r| r.passed));
//! # Ok(())
//! # }
//! ```
//!
//! ## Ramp-Up
//!
//! ```rust
//! use load_queue::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! // 10 workers released in groups of 3 (3 + 3 + 3 + 1), 50ms apart
//! let pattern = ThreadingPattern::ramp_up(
//!     10,
//!     2,
//!     Duration::ZERO,
//!     Duration::from_millis(50),
//!     3,
//!     true,
//! )?;
//! assert_eq!(pattern.thread_count(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving a queue by hand
//!
//! A non-blocking start returns immediately; the queue is observed and
//! controlled through its state machine:
//!
//! ```rust
//! use load_queue::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let stats = QueueExecutionStatistics::new();
//! let invoker = Arc::new(ClosureInvoker::new(|_: &ActionRequest| Ok(())));
//! let manager = LoadQueueManager::new("localhost", invoker, stats);
//!
//! let pattern = ThreadingPattern::all_at_once(2, 100, Duration::ZERO, false)?;
//! manager.schedule_actions(
//!     "background_load",
//!     7,
//!     vec![ActionRequest::new("Http", "get", vec![])],
//!     pattern,
//!     false,
//! )?;
//! manager.start_queue("background_load")?;
//!
//! // ... observe, then wait (or cancel)
//! manager.wait_until_queue_finish("background_load")?;
//! assert_eq!(manager.queue_state("background_load")?, QueueState::Finished);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pattern;
pub mod prelude;
pub mod queue;
pub mod stats;

pub use crate::core::{
    ActionInvoker, ActionRequest, CancellationToken, ClosureInvoker, LoaderError, Result,
};
pub use pattern::{ExecutionMode, IterationInterval, RampUp, ThreadingPattern};
pub use queue::{
    ActionTask, LoadQueueManager, QueueLoader, QueueState, StartBarrier, TaskOutcome,
};
pub use stats::{ExecutionResult, QueueExecutionStatistics};
