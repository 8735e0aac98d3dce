//! Per-caller registry of load queues
//!
//! A [`LoadQueueManager`] is what the remote front end talks to: it maps
//! queue names to their loaders, guards against duplicate live names, sweeps
//! finished queues lazily and fans out cancellation. One manager exists per
//! caller; queues of different callers never share a manager.

use crate::core::{ActionInvoker, ActionRequest, LoaderError, Result};
use crate::pattern::ThreadingPattern;
use crate::queue::loader::{QueueLoader, QueueState};
use crate::stats::{ExecutionResult, QueueExecutionStatistics};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry and front door for one caller's load queues
///
/// # Example
///
/// ```rust
/// use load_queue::{
///     ActionRequest, ClosureInvoker, LoadQueueManager, QueueExecutionStatistics, ThreadingPattern,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn main() -> load_queue::Result<()> {
/// let stats = QueueExecutionStatistics::new();
/// let invoker = Arc::new(ClosureInvoker::new(|_request| Ok(())));
/// let manager = LoadQueueManager::new("test_host", invoker, stats);
///
/// let pattern = ThreadingPattern::all_at_once(2, 3, Duration::ZERO, true)?;
/// manager.execute_actions(
///     "pings",
///     1,
///     vec![ActionRequest::new("Demo", "ping", vec![])],
///     pattern,
/// )?;
///
/// assert_eq!(manager.execution_results("pings").len(), 6);
/// # Ok(())
/// # }
/// ```
pub struct LoadQueueManager {
    caller: String,
    invoker: Arc<dyn ActionInvoker>,
    stats: QueueExecutionStatistics,
    queues: Mutex<HashMap<String, Arc<QueueLoader>>>,
}

impl std::fmt::Debug for LoadQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadQueueManager")
            .field("caller", &self.caller)
            .field("queues", &self.queues.lock().len())
            .finish()
    }
}

impl LoadQueueManager {
    /// Create a manager for one caller
    pub fn new(
        caller: impl Into<String>,
        invoker: Arc<dyn ActionInvoker>,
        stats: QueueExecutionStatistics,
    ) -> Self {
        Self {
            caller: caller.into(),
            invoker,
            stats,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// The statistics registry shared with every queue of this manager
    pub fn stats(&self) -> &QueueExecutionStatistics {
        &self.stats
    }

    /// Drop queues that already reached their terminal state
    fn sweep_finished_queues(&self) {
        let mut queues = self.queues.lock();
        queues.retain(|name, loader| {
            let finished = loader.state() == QueueState::Finished;
            if finished {
                debug!("discarding finished queue '{}'", name);
            }
            !finished
        });
    }

    fn loader(&self, queue_name: &str) -> Result<Arc<QueueLoader>> {
        self.queues
            .lock()
            .get(queue_name)
            .cloned()
            .ok_or_else(|| LoaderError::no_such_queue(queue_name))
    }

    /// Create a loader for the queue and schedule its worker pool
    ///
    /// # Errors
    ///
    /// [`LoaderError::QueueAlreadyExists`] when a live queue with this name
    /// is registered, plus everything
    /// [`QueueLoader::schedule_threads`] can fail with.
    pub fn schedule_actions(
        &self,
        queue_name: &str,
        queue_id: u64,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        synchronized_iterations: bool,
    ) -> Result<()> {
        self.sweep_finished_queues();

        let mut queues = self.queues.lock();
        if let Some(existing) = queues.get(queue_name) {
            return Err(LoaderError::queue_already_exists(
                queue_name,
                existing.state(),
            ));
        }

        let loader = Arc::new(QueueLoader::new(
            queue_name,
            queue_id,
            requests,
            pattern,
            Arc::clone(&self.invoker),
            self.stats.clone(),
        ));
        loader.schedule_threads(&self.caller, synchronized_iterations)?;
        queues.insert(queue_name.to_string(), loader);

        Ok(())
    }

    /// Start a previously scheduled queue
    ///
    /// Initializes the queue's results bucket first, so a rerun under the
    /// same name starts from a clean slate.
    pub fn start_queue(&self, queue_name: &str) -> Result<()> {
        let loader = self.loader(queue_name)?;

        self.stats.init_results(queue_name);
        loader.start()
    }

    /// Schedule and start in one call
    pub fn execute_actions(
        &self,
        queue_name: &str,
        queue_id: u64,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
    ) -> Result<()> {
        self.schedule_actions(queue_name, queue_id, requests, pattern, false)?;
        self.start_queue(queue_name)
    }

    /// Cancel one queue
    pub fn cancel_queue(&self, queue_name: &str) -> Result<()> {
        let loader = self.loader(queue_name)?;
        loader.cancel();
        info!("cancelled queue '{}'", queue_name);
        Ok(())
    }

    /// Cancel every queue of this caller
    pub fn cancel_all_queues(&self) {
        let loaders: Vec<_> = self.queues.lock().values().cloned().collect();
        for loader in loaders {
            loader.cancel();
            info!("cancelled queue '{}'", loader.name());
        }
        self.sweep_finished_queues();
    }

    /// Whether the queue is currently executing (running or paused)
    pub fn is_queue_running(&self, queue_name: &str) -> Result<bool> {
        let state = self.queue_state(queue_name)?;
        Ok(matches!(state, QueueState::Running | QueueState::Paused))
    }

    /// The queue's lifecycle state
    pub fn queue_state(&self, queue_name: &str) -> Result<QueueState> {
        Ok(self.loader(queue_name)?.state())
    }

    /// Block until the queue pauses between synchronized rounds
    ///
    /// Returns `true` when the queue needs a
    /// [`resume_queue()`](Self::resume_queue) to keep going.
    pub fn wait_until_queue_is_paused(&self, queue_name: &str) -> Result<bool> {
        Ok(self.loader(queue_name)?.wait_until_paused())
    }

    /// Release the next synchronized round of a paused queue
    pub fn resume_queue(&self, queue_name: &str) -> Result<()> {
        self.loader(queue_name)?.resume()
    }

    /// Block until the queue reaches its terminal state
    pub fn wait_until_queue_finish(&self, queue_name: &str) -> Result<()> {
        self.loader(queue_name)?.wait_until_finished();
        Ok(())
    }

    /// Block until every registered queue reaches its terminal state
    pub fn wait_until_all_queues_finish(&self) {
        let loaders: Vec<_> = self.queues.lock().values().cloned().collect();
        for loader in loaders {
            loader.wait_until_finished();
        }
    }

    /// Snapshot of the queue's recorded results, suitable for serialization
    pub fn execution_results(&self, queue_name: &str) -> Vec<ExecutionResult> {
        self.stats.snapshot(queue_name)
    }
}
