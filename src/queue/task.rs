//! Per-worker execution strategies
//!
//! An [`ActionTask`] is the loop one worker runs after it passes the start
//! barrier: invoke the assigned requests, record every outcome, repeat
//! according to the strategy. [`create_task`] selects the strategy from the
//! pattern's declared execution mode - ramp-up staggering is not a task
//! concern, the loader handles it by releasing barriers.
//!
//! Failure isolation happens here: an invocation that returns an error or
//! panics is recorded as a failed [`ExecutionResult`](crate::ExecutionResult)
//! and neither the worker nor its siblings stop.

use crate::core::{ActionInvoker, ActionRequest, CancellationToken, Result};
use crate::pattern::{ExecutionMode, IterationInterval, ThreadingPattern};
use crate::stats::{ExecutionResult, QueueExecutionStatistics};
use crate::LoaderError;
use log::{debug, error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a task returned control to its worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The strategy ran to completion
    Finished,
    /// Synchronized iterations: one iteration done, wait for the next round
    Paused,
    /// A cancellation signal was observed; nothing new was started
    Cancelled,
}

/// A per-worker execution strategy
pub trait ActionTask: Send {
    /// Run the strategy until it finishes, pauses or observes cancellation
    fn execute(&mut self) -> TaskOutcome;

    /// The strategy's name for debugging and logs
    fn task_type(&self) -> &str {
        "ActionTask"
    }
}

/// Everything one worker's task needs to invoke and record actions
pub struct TaskContext {
    /// Name of the owning load queue
    pub queue_name: String,
    /// Label of the worker running this task, e.g. `transfers-worker-3`
    pub worker_label: String,
    /// The assigned requests, shared read-only across workers
    pub requests: Arc<Vec<ActionRequest>>,
    /// The opaque dispatcher
    pub invoker: Arc<dyn ActionInvoker>,
    /// Where every invocation outcome is recorded
    pub stats: QueueExecutionStatistics,
    /// The queue's cancellation token
    pub token: CancellationToken,
    /// Whether iterations are synchronized across all workers of the queue
    pub synchronized: bool,
}

impl TaskContext {
    /// Invoke every assigned request once, recording each outcome
    ///
    /// Returns `false` if cancellation was observed before one of the
    /// invocations; the invocations already made are recorded either way.
    fn run_iteration(&self) -> bool {
        for request in self.requests.iter() {
            if self.token.is_cancelled() {
                return false;
            }

            let action = request.qualified_name();
            let outcome = catch_unwind(AssertUnwindSafe(|| self.invoker.invoke(request)));

            let result = match outcome {
                Ok(Ok(())) => ExecutionResult::passed(&action, &self.worker_label),
                Ok(Err(e)) => {
                    warn!(
                        "[{}] action '{}' failed: {}",
                        self.worker_label, action, e
                    );
                    ExecutionResult::failed(&action, &self.worker_label, e.to_string())
                }
                Err(panic_info) => {
                    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(
                        "[{}] action '{}' panicked: {}",
                        self.worker_label, action, panic_msg
                    );
                    ExecutionResult::failed(&action, &self.worker_label, panic_msg)
                }
            };

            self.stats.record(&self.queue_name, result);
        }

        true
    }
}

/// Count-based strategy: exactly `iterations` iterations per worker
///
/// Sleeps the configured interval between iterations but never after the
/// last one, so the per-queue invocation total is exactly
/// `thread_count * iterations` for a single-request queue, independent of
/// ramp-up grouping.
pub struct MultipleInvocationsTask {
    ctx: TaskContext,
    iterations: u32,
    interval: IterationInterval,
    completed: u32,
}

impl MultipleInvocationsTask {
    fn new(ctx: TaskContext, iterations: u32, interval: IterationInterval) -> Self {
        Self {
            ctx,
            iterations,
            interval,
            completed: 0,
        }
    }
}

impl ActionTask for MultipleInvocationsTask {
    fn execute(&mut self) -> TaskOutcome {
        while self.completed < self.iterations {
            if self.ctx.token.is_cancelled() {
                return TaskOutcome::Cancelled;
            }

            if !self.ctx.run_iteration() {
                return TaskOutcome::Cancelled;
            }
            self.completed += 1;

            if self.completed == self.iterations {
                break;
            }

            if !self.interval.is_zero() && !self.ctx.token.sleep(self.interval.next_delay()) {
                return TaskOutcome::Cancelled;
            }

            if self.ctx.synchronized {
                return TaskOutcome::Paused;
            }
        }

        debug!(
            "[{}] completed all {} iterations",
            self.ctx.worker_label, self.iterations
        );
        TaskOutcome::Finished
    }

    fn task_type(&self) -> &str {
        "MultipleInvocationsTask"
    }
}

/// Duration-based strategy: iterate back-to-back until the deadline
///
/// The deadline is checked at the start of each iteration, so an in-flight
/// invocation is never interrupted just because the deadline passed;
/// overshoot of up to one invocation is expected. The clock starts at the
/// worker's first release, not at scheduling time.
pub struct FixedDurationTask {
    ctx: TaskContext,
    duration: Duration,
    started: Option<Instant>,
}

impl FixedDurationTask {
    fn new(ctx: TaskContext, duration: Duration) -> Self {
        Self {
            ctx,
            duration,
            started: None,
        }
    }
}

impl ActionTask for FixedDurationTask {
    fn execute(&mut self) -> TaskOutcome {
        let started = *self.started.get_or_insert_with(Instant::now);

        while started.elapsed() < self.duration {
            if self.ctx.token.is_cancelled() {
                return TaskOutcome::Cancelled;
            }

            if !self.ctx.run_iteration() {
                return TaskOutcome::Cancelled;
            }

            if self.ctx.synchronized && started.elapsed() < self.duration {
                return TaskOutcome::Paused;
            }
        }

        debug!(
            "[{}] deadline of {:?} reached",
            self.ctx.worker_label, self.duration
        );
        TaskOutcome::Finished
    }

    fn task_type(&self) -> &str {
        "FixedDurationTask"
    }
}

/// Select a task strategy from the pattern's declared execution mode
///
/// Dispatch reads only the mode - whether the pattern ramps up is the
/// loader's concern. An execution mode without a matching strategy is
/// rejected with [`LoaderError::PatternNotSupported`] before any worker
/// thread exists.
pub fn create_task(pattern: &ThreadingPattern, ctx: TaskContext) -> Result<Box<dyn ActionTask>> {
    match *pattern.mode() {
        ExecutionMode::FixedInvocations {
            iterations,
            interval,
        } => Ok(Box::new(MultipleInvocationsTask::new(
            ctx, iterations, interval,
        ))),
        ExecutionMode::FixedDuration { duration } => {
            Ok(Box::new(FixedDurationTask::new(ctx, duration)))
        }
        #[allow(unreachable_patterns)]
        ref mode => Err(LoaderError::pattern_not_supported(format!("{:?}", mode))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClosureInvoker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(
        invoker: Arc<dyn ActionInvoker>,
        stats: QueueExecutionStatistics,
        token: CancellationToken,
        synchronized: bool,
    ) -> TaskContext {
        TaskContext {
            queue_name: "test_queue".to_string(),
            worker_label: "test_queue-worker-0".to_string(),
            requests: Arc::new(vec![ActionRequest::new("Test", "run", vec![])]),
            invoker,
            stats,
            token,
            synchronized,
        }
    }

    fn counting_invoker(counter: Arc<AtomicUsize>) -> Arc<dyn ActionInvoker> {
        Arc::new(ClosureInvoker::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[test]
    fn test_multiple_invocations_runs_exact_count() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stats = QueueExecutionStatistics::new();
        let ctx = context(
            counting_invoker(Arc::clone(&counter)),
            stats.clone(),
            CancellationToken::new(),
            false,
        );

        let mut task = MultipleInvocationsTask::new(ctx, 7, IterationInterval::default());
        assert_eq!(task.execute(), TaskOutcome::Finished);

        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert_eq!(stats.result_count("test_queue"), 7);
    }

    #[test]
    fn test_multiple_invocations_sleeps_between_but_not_after() {
        let stats = QueueExecutionStatistics::new();
        let ctx = context(
            counting_invoker(Arc::new(AtomicUsize::new(0))),
            stats,
            CancellationToken::new(),
            false,
        );

        let interval = Duration::from_millis(50);
        let mut task =
            MultipleInvocationsTask::new(ctx, 3, IterationInterval::Fixed(interval));

        let start = Instant::now();
        assert_eq!(task.execute(), TaskOutcome::Finished);
        let elapsed = start.elapsed();

        // two sleeps of 50ms, not three
        assert!(elapsed >= Duration::from_millis(100), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(150) + Duration::from_millis(60));
    }

    #[test]
    fn test_failures_are_recorded_and_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let invoker: Arc<dyn ActionInvoker> = Arc::new(ClosureInvoker::new(move |request| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err(LoaderError::action_failed(
                request.qualified_name(),
                "always failing",
            ))
        }));

        let stats = QueueExecutionStatistics::new();
        let ctx = context(invoker, stats.clone(), CancellationToken::new(), false);

        let mut task = MultipleInvocationsTask::new(ctx, 4, IterationInterval::default());
        assert_eq!(task.execute(), TaskOutcome::Finished);

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.failed_count("test_queue"), 4);
        assert_eq!(stats.passed_count("test_queue"), 0);
    }

    #[test]
    fn test_panics_are_recorded_as_failures() {
        let invoker: Arc<dyn ActionInvoker> =
            Arc::new(ClosureInvoker::new(|_| panic!("intentional panic")));

        let stats = QueueExecutionStatistics::new();
        let ctx = context(invoker, stats.clone(), CancellationToken::new(), false);

        let mut task = MultipleInvocationsTask::new(ctx, 2, IterationInterval::default());
        assert_eq!(task.execute(), TaskOutcome::Finished);

        let snapshot = stats.snapshot("test_queue");
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot
            .iter()
            .all(|r| !r.passed && r.error.as_deref() == Some("intentional panic")));
    }

    #[test]
    fn test_cancellation_stops_before_next_invocation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let stats = QueueExecutionStatistics::new();

        let counter_clone = Arc::clone(&counter);
        let cancel_token = token.clone();
        let invoker: Arc<dyn ActionInvoker> = Arc::new(ClosureInvoker::new(move |_| {
            // Cancel from inside the second invocation
            if counter_clone.fetch_add(1, Ordering::SeqCst) == 1 {
                cancel_token.cancel();
            }
            Ok(())
        }));

        let ctx = context(invoker, stats.clone(), token, false);
        let mut task = MultipleInvocationsTask::new(ctx, 10, IterationInterval::default());

        assert_eq!(task.execute(), TaskOutcome::Cancelled);

        // The in-flight invocation completed and was recorded; no new one started
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(stats.result_count("test_queue"), 2);
    }

    #[test]
    fn test_synchronized_pauses_after_each_iteration() {
        let counter = Arc::new(AtomicUsize::new(0));
        let stats = QueueExecutionStatistics::new();
        let ctx = context(
            counting_invoker(Arc::clone(&counter)),
            stats,
            CancellationToken::new(),
            true,
        );

        let mut task = MultipleInvocationsTask::new(ctx, 3, IterationInterval::default());

        assert_eq!(task.execute(), TaskOutcome::Paused);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(task.execute(), TaskOutcome::Paused);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        // The final iteration finishes instead of pausing
        assert_eq!(task.execute(), TaskOutcome::Finished);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fixed_duration_observes_deadline_at_iteration_start() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let invoker: Arc<dyn ActionInvoker> = Arc::new(ClosureInvoker::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            Ok(())
        }));

        let stats = QueueExecutionStatistics::new();
        let ctx = context(invoker, stats.clone(), CancellationToken::new(), false);

        let mut task = FixedDurationTask::new(ctx, Duration::from_millis(100));

        let start = Instant::now();
        assert_eq!(task.execute(), TaskOutcome::Finished);
        let elapsed = start.elapsed();

        // Ran for at least the configured duration, overshooting by at most
        // roughly one invocation
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200), "elapsed {:?}", elapsed);

        let invocations = counter.load(Ordering::SeqCst);
        assert!(invocations >= 3, "expected several iterations, got {}", invocations);
        assert_eq!(stats.result_count("test_queue"), invocations);
    }

    #[test]
    fn test_factory_selects_by_execution_mode() {
        let stats = QueueExecutionStatistics::new();

        let count_pattern =
            ThreadingPattern::all_at_once(1, 5, Duration::ZERO, false).unwrap();
        let task = create_task(
            &count_pattern,
            context(
                counting_invoker(Arc::new(AtomicUsize::new(0))),
                stats.clone(),
                CancellationToken::new(),
                false,
            ),
        )
        .unwrap();
        assert_eq!(task.task_type(), "MultipleInvocationsTask");

        let duration_pattern =
            ThreadingPattern::fixed_duration(1, Duration::from_millis(10), false).unwrap();
        let task = create_task(
            &duration_pattern,
            context(
                counting_invoker(Arc::new(AtomicUsize::new(0))),
                stats,
                CancellationToken::new(),
                false,
            ),
        )
        .unwrap();
        assert_eq!(task.task_type(), "FixedDurationTask");
    }
}
