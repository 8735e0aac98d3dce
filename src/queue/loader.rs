//! The load queue orchestrator
//!
//! A [`QueueLoader`] owns one scheduled run of a threading pattern against a
//! set of action requests: the worker pool, the start barriers, the
//! lifecycle state machine and the ramp-up release timeline.
//!
//! Lifecycle: `Created → Scheduled → Running ⇄ Paused → Finished`, where any
//! state can jump straight to `Finished` through [`cancel()`](QueueLoader::cancel).
//!
//! # Example
//!
//! ```rust
//! use load_queue::{
//!     ActionRequest, ClosureInvoker, QueueExecutionStatistics, QueueLoader, ThreadingPattern,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> load_queue::Result<()> {
//! let stats = QueueExecutionStatistics::new();
//! let invoker = Arc::new(ClosureInvoker::new(|_request| Ok(())));
//!
//! let pattern = ThreadingPattern::all_at_once(3, 2, Duration::ZERO, true)?;
//! let loader = QueueLoader::new(
//!     "smoke_queue",
//!     1,
//!     vec![ActionRequest::new("Demo", "ping", vec![])],
//!     pattern,
//!     invoker,
//!     stats.clone(),
//! );
//!
//! stats.init_results("smoke_queue");
//! loader.schedule_threads("local", false)?;
//! loader.start()?;
//!
//! assert_eq!(stats.result_count("smoke_queue"), 6);
//! # Ok(())
//! # }
//! ```

use crate::core::{ActionInvoker, ActionRequest, CancellationToken, LoaderError, Result};
use crate::pattern::ThreadingPattern;
use crate::queue::barrier::{BarrierWaiter, StartBarrier};
use crate::queue::task::{create_task, ActionTask, TaskContext, TaskOutcome};
use crate::stats::QueueExecutionStatistics;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Lifecycle state of a load queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    /// Built but not yet scheduled
    Created,
    /// Workers spawned and parked at their start barriers
    Scheduled,
    /// Workers released; iterations in progress
    Running,
    /// Synchronized iterations: every live worker finished its iteration and
    /// waits for the next round
    Paused,
    /// Terminal: completed naturally or cancelled
    Finished,
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueState::Created => "created",
            QueueState::Scheduled => "scheduled",
            QueueState::Running => "running",
            QueueState::Paused => "paused",
            QueueState::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct MonitorState {
    state: QueueState,
    paused: usize,
    finished: usize,
}

/// Shared lifecycle monitor: the state machine plus worker bookkeeping
#[derive(Debug)]
struct QueueMonitor {
    thread_count: usize,
    state: Mutex<MonitorState>,
    cond: Condvar,
}

impl QueueMonitor {
    fn new(thread_count: usize) -> Self {
        Self {
            thread_count,
            state: Mutex::new(MonitorState {
                state: QueueState::Created,
                paused: 0,
                finished: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn state(&self) -> QueueState {
        self.state.lock().state
    }

    /// Move `from -> to`; on mismatch returns the actual state
    fn advance(&self, from: QueueState, to: QueueState) -> std::result::Result<(), QueueState> {
        let mut s = self.state.lock();
        if s.state == from {
            s.state = to;
            self.cond.notify_all();
            Ok(())
        } else {
            Err(s.state)
        }
    }

    /// Reset the pause bookkeeping and resume running; only valid from `Paused`
    fn begin_round(&self) -> std::result::Result<(), QueueState> {
        let mut s = self.state.lock();
        if s.state == QueueState::Paused {
            s.paused = 0;
            s.state = QueueState::Running;
            self.cond.notify_all();
            Ok(())
        } else {
            Err(s.state)
        }
    }

    /// Force the terminal state; idempotent
    fn finish(&self) {
        let mut s = self.state.lock();
        s.state = QueueState::Finished;
        self.cond.notify_all();
    }

    fn worker_paused(&self) {
        let mut s = self.state.lock();
        s.paused += 1;
        if s.state == QueueState::Running && s.paused + s.finished == self.thread_count {
            s.state = QueueState::Paused;
            self.cond.notify_all();
        }
    }

    fn worker_finished(&self) {
        let mut s = self.state.lock();
        s.finished += 1;
        if s.finished == self.thread_count {
            s.state = QueueState::Finished;
            self.cond.notify_all();
        } else if s.state == QueueState::Running
            && s.paused + s.finished == self.thread_count
            && s.paused > 0
        {
            s.state = QueueState::Paused;
            self.cond.notify_all();
        }
    }

    fn wait_until_finished(&self) {
        let mut s = self.state.lock();
        while s.state != QueueState::Finished {
            self.cond.wait(&mut s);
        }
    }

    /// Block while the queue is running; returns the state that ended the wait
    fn wait_while_running(&self) -> QueueState {
        let mut s = self.state.lock();
        while s.state == QueueState::Running {
            self.cond.wait(&mut s);
        }
        s.state
    }
}

/// Owns the ramp-up release timeline so it can run on the caller's thread or
/// on a dedicated coordinator thread
struct RoundDriver {
    queue_name: String,
    barriers: Vec<StartBarrier>,
    ramp_interval: Duration,
    token: CancellationToken,
}

impl RoundDriver {
    /// Release every group once, spaced by the ramp interval
    ///
    /// Group releases are gated purely by elapsed wall-clock time, never by
    /// the previous group's progress. Cancellation interrupts the spacing
    /// sleeps immediately.
    fn release_round(&self) {
        let total = self.barriers.len();
        for (index, barrier) in self.barriers.iter().enumerate() {
            if self.token.is_cancelled() {
                return;
            }

            barrier.start();
            debug!(
                "queue '{}': released group {}/{} ({} workers)",
                self.queue_name,
                index + 1,
                total,
                barrier.registered()
            );

            if index + 1 < total && !self.token.sleep(self.ramp_interval) {
                return;
            }
        }
    }
}

/// One scheduled, named run of a threading pattern against a set of requests
///
/// The loader is created in `Created`, must be scheduled exactly once, and
/// is started at most once. All methods take `&self`; the loader is shared
/// behind an `Arc` between the embedding registry, the workers it spawns and
/// the coordinator thread of a non-blocking start.
pub struct QueueLoader {
    name: String,
    id: u64,
    pattern: ThreadingPattern,
    requests: Arc<Vec<ActionRequest>>,
    invoker: Arc<dyn ActionInvoker>,
    stats: QueueExecutionStatistics,
    monitor: Arc<QueueMonitor>,
    token: CancellationToken,
    /// One start barrier per ramp-up group, in release order
    barriers: Mutex<Vec<StartBarrier>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    coordinator: Mutex<Option<thread::JoinHandle<()>>>,
    synchronized: AtomicBool,
    /// Serializes schedule/start/resume; cancel stays lock-free on purpose
    lifecycle: Mutex<()>,
}

impl fmt::Debug for QueueLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueLoader")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pattern", &self.pattern.description())
            .finish()
    }
}

impl QueueLoader {
    /// Create a loader in the `Created` state
    pub fn new(
        name: impl Into<String>,
        id: u64,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        invoker: Arc<dyn ActionInvoker>,
        stats: QueueExecutionStatistics,
    ) -> Self {
        let thread_count = pattern.thread_count();
        Self {
            name: name.into(),
            id,
            pattern,
            requests: Arc::new(requests),
            invoker,
            stats,
            monitor: Arc::new(QueueMonitor::new(thread_count)),
            token: CancellationToken::new(),
            barriers: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            coordinator: Mutex::new(None),
            synchronized: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// Queue name, unique within one caller
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller-assigned queue id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The pattern this loader was built from
    pub fn pattern(&self) -> &ThreadingPattern {
        &self.pattern
    }

    /// Current lifecycle state
    pub fn state(&self) -> QueueState {
        self.monitor.state()
    }

    /// Worker group sizes in release order, per the ramp-up parameters
    ///
    /// `thread_count / group_size` full groups; an uneven division adds one
    /// final group holding the remainder. No ramp-up, a zero ramp interval
    /// or a group covering every worker all collapse to a single group.
    fn group_sizes(&self) -> Vec<usize> {
        let thread_count = self.pattern.thread_count();
        match self.pattern.ramp_up_config() {
            Some(ramp_up) if !ramp_up.interval.is_zero() && ramp_up.group_size < thread_count => {
                let mut sizes = vec![ramp_up.group_size; thread_count / ramp_up.group_size];
                let remainder = thread_count % ramp_up.group_size;
                if remainder > 0 {
                    sizes.push(remainder);
                }
                sizes
            }
            _ => vec![thread_count],
        }
    }

    fn round_driver(&self) -> RoundDriver {
        RoundDriver {
            queue_name: self.name.clone(),
            barriers: self.barriers.lock().clone(),
            ramp_interval: self
                .pattern
                .ramp_up_config()
                .map(|r| r.interval)
                .unwrap_or(Duration::ZERO),
            token: self.token.clone(),
        }
    }

    /// Build the worker pool and park every worker at its start barrier
    ///
    /// All tasks are constructed before any thread is spawned, so a pattern
    /// the task factory rejects creates no workers at all.
    ///
    /// # Errors
    ///
    /// [`LoaderError::AlreadyScheduled`] unless the queue is in `Created`;
    /// [`LoaderError::PatternNotSupported`] for an execution mode without a
    /// task strategy; [`LoaderError::Spawn`] if the OS refuses a thread, in
    /// which case the queue is cancelled.
    pub fn schedule_threads(&self, caller: &str, synchronized_iterations: bool) -> Result<()> {
        let _guard = self.lifecycle.lock();

        if self.monitor.state() != QueueState::Created {
            return Err(LoaderError::already_scheduled(&self.name));
        }

        // Build phase: every waiter and task exists before any thread does
        let mut barriers = Vec::new();
        let mut pending: Vec<(BarrierWaiter, Box<dyn ActionTask>, String)> = Vec::new();
        let mut worker_id = 0;
        for size in self.group_sizes() {
            let barrier = StartBarrier::new();
            for _ in 0..size {
                let label = format!("{}-worker-{}", self.name, worker_id);
                let context = TaskContext {
                    queue_name: self.name.clone(),
                    worker_label: label.clone(),
                    requests: Arc::clone(&self.requests),
                    invoker: Arc::clone(&self.invoker),
                    stats: self.stats.clone(),
                    token: self.token.clone(),
                    synchronized: synchronized_iterations,
                };
                let task = create_task(&self.pattern, context)?;
                pending.push((barrier.register(), task, label));
                worker_id += 1;
            }
            barriers.push(barrier);
        }

        // Spawn phase
        let mut handles = Vec::with_capacity(pending.len());
        for (index, (waiter, task, label)) in pending.into_iter().enumerate() {
            let monitor = Arc::clone(&self.monitor);
            let token = self.token.clone();

            let spawned = thread::Builder::new()
                .name(label.clone())
                .spawn(move || run_worker(waiter, task, monitor, token, label));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(io_err) => {
                    let err = LoaderError::spawn_with_source(&self.name, index, io_err);
                    error!("{}", err);

                    // Release the workers that did spawn and tear down
                    self.token.cancel();
                    for barrier in &barriers {
                        barrier.abort();
                    }
                    for handle in handles.drain(..) {
                        let _ = handle.join();
                    }
                    self.monitor.finish();
                    return Err(err);
                }
            }
        }

        *self.barriers.lock() = barriers;
        *self.workers.lock() = handles;
        self.synchronized
            .store(synchronized_iterations, Ordering::SeqCst);

        // A cancel that raced the build wins; the queue stays finished
        let _ = self.monitor.advance(QueueState::Created, QueueState::Scheduled);

        info!(
            "caller '{}' scheduled queue '{}' ({})",
            caller,
            self.name,
            self.pattern.description()
        );
        Ok(())
    }

    /// Release the workers and run the queue
    ///
    /// With `block_until_completion` the ramp-up timeline (and, for
    /// synchronized iterations, the round driving) runs on the calling
    /// thread, and this method returns only after every worker has returned
    /// and the queue is `Finished`. Otherwise a dedicated coordinator thread
    /// owns the release timeline and the call returns immediately;
    /// synchronized rounds are then driven by the caller through
    /// [`wait_until_paused()`](Self::wait_until_paused) and
    /// [`resume()`](Self::resume).
    ///
    /// # Errors
    ///
    /// [`LoaderError::NotScheduled`] unless the queue is in `Scheduled` -
    /// this covers both starting before scheduling and starting twice.
    pub fn start(&self) -> Result<()> {
        {
            let _guard = self.lifecycle.lock();
            self.monitor
                .advance(QueueState::Scheduled, QueueState::Running)
                .map_err(|state| LoaderError::not_scheduled(&self.name, state))?;
        }

        info!("starting queue '{}'", self.name);
        let driver = self.round_driver();

        if self.pattern.block_until_completion() {
            driver.release_round();

            if self.synchronized.load(Ordering::SeqCst) {
                while self.wait_until_paused() {
                    // Someone else (cancel, a racing manual resume) may have
                    // moved the queue on; keep waiting in that case
                    let _ = self.resume();
                }
            }

            self.monitor.wait_until_finished();
            self.join_workers();
        } else {
            let spawned = thread::Builder::new()
                .name(format!("{}-coordinator", self.name))
                .spawn(move || driver.release_round());

            match spawned {
                Ok(handle) => *self.coordinator.lock() = Some(handle),
                Err(io_err) => {
                    let err = LoaderError::spawn_with_source(&self.name, 0, io_err);
                    error!("{}", err);
                    self.cancel();
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Release the next synchronized-iterations round
    ///
    /// The round is staggered across the ramp-up groups exactly like the
    /// initial release.
    ///
    /// # Errors
    ///
    /// [`LoaderError::NotPaused`] unless every live worker is paused.
    pub fn resume(&self) -> Result<()> {
        {
            let _guard = self.lifecycle.lock();
            self.monitor
                .begin_round()
                .map_err(|_| LoaderError::not_paused(&self.name))?;
        }

        debug!("resuming queue '{}'", self.name);
        self.round_driver().release_round();
        Ok(())
    }

    /// Block until the queue pauses or finishes
    ///
    /// Returns `true` when the queue is paused and needs a
    /// [`resume()`](Self::resume) to keep going, `false` when it is already
    /// past running.
    pub fn wait_until_paused(&self) -> bool {
        self.monitor.wait_while_running() == QueueState::Paused
    }

    /// Block until the queue reaches `Finished`
    ///
    /// Used after a non-blocking start; returns immediately for a queue that
    /// was cancelled or never started.
    pub fn wait_until_finished(&self) {
        self.monitor.wait_until_finished();
    }

    /// Cancel the queue
    ///
    /// Valid in every state and idempotent. The queue transitions to
    /// `Finished` immediately; workers observe the token at their next loop
    /// boundary or sleep, so an invocation already in flight completes and
    /// is recorded, but nothing new starts.
    pub fn cancel(&self) {
        debug!("cancelling queue '{}'", self.name);

        self.token.cancel();
        for barrier in self.barriers.lock().iter() {
            barrier.abort();
        }
        self.monitor.finish();
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!("a worker of queue '{}' panicked", self.name);
            }
        }
    }
}

impl Drop for QueueLoader {
    fn drop(&mut self) {
        // Wake anything still parked so worker threads can exit; they hold
        // only Arcs and finish on their own
        if self.monitor.state() != QueueState::Finished {
            self.cancel();
        }
    }
}

/// The loop every worker thread runs: wait at the gate, execute the task,
/// report the outcome
fn run_worker(
    mut waiter: BarrierWaiter,
    mut task: Box<dyn ActionTask>,
    monitor: Arc<QueueMonitor>,
    token: CancellationToken,
    label: String,
) {
    debug!("[{}] parked at the start barrier", label);

    loop {
        if !waiter.wait_for_start() {
            // Barrier aborted by cancellation
            break;
        }
        if token.is_cancelled() {
            break;
        }

        match task.execute() {
            TaskOutcome::Finished | TaskOutcome::Cancelled => break,
            TaskOutcome::Paused => monitor.worker_paused(),
        }
    }

    monitor.worker_finished();
    debug!("[{}] done", label);
}
