//! Per-queue execution statistics
//!
//! Every invocation of every worker is recorded as an [`ExecutionResult`] in
//! a named bucket of the [`QueueExecutionStatistics`] registry. Buckets grow
//! monotonically while a queue runs and are read through immutable
//! snapshots, so the registry is safe to share between the scheduler, all
//! workers of all queues and the front end that ships results to a caller on
//! another host.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The recorded outcome of one action invocation by one worker
///
/// Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Qualified `component.action` name
    pub action: String,
    /// Whether the invocation completed without an error
    pub passed: bool,
    /// The error or panic message for a failed invocation
    pub error: Option<String>,
    /// When the invocation completed
    pub timestamp: DateTime<Utc>,
    /// The worker that ran the invocation
    pub worker: String,
}

impl ExecutionResult {
    /// Record a successful invocation
    pub fn passed(action: impl Into<String>, worker: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            passed: true,
            error: None,
            timestamp: Utc::now(),
            worker: worker.into(),
        }
    }

    /// Record a failed invocation with its error message
    pub fn failed(
        action: impl Into<String>,
        worker: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            passed: false,
            error: Some(error.into()),
            timestamp: Utc::now(),
            worker: worker.into(),
        }
    }
}

type Bucket = Arc<Mutex<Vec<ExecutionResult>>>;

/// A process-wide registry mapping queue names to their recorded results
///
/// Cloning the registry is cheap; every clone observes the same buckets.
/// Appends take a per-bucket lock, so workers of different queues never
/// contend with each other.
///
/// # Example
///
/// ```rust
/// use load_queue::{ExecutionResult, QueueExecutionStatistics};
///
/// let stats = QueueExecutionStatistics::new();
/// stats.init_results("transfer_queue");
/// stats.record("transfer_queue", ExecutionResult::passed("Mail.send", "worker-0"));
///
/// let snapshot = stats.snapshot("transfer_queue");
/// assert_eq!(snapshot.len(), 1);
/// assert!(snapshot[0].passed);
/// ```
#[derive(Clone, Default)]
pub struct QueueExecutionStatistics {
    buckets: Arc<DashMap<String, Bucket>>,
}

impl std::fmt::Debug for QueueExecutionStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueExecutionStatistics")
            .field("queues", &self.buckets.len())
            .finish()
    }
}

impl QueueExecutionStatistics {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or clear the results bucket for a queue
    ///
    /// Called before a queue starts so a rerun under the same name does not
    /// inherit results from the previous run.
    pub fn init_results(&self, queue_name: &str) {
        self.buckets
            .entry(queue_name.to_string())
            .or_default()
            .lock()
            .clear();
    }

    /// Append one result to a queue's bucket
    ///
    /// Safe for concurrent callers; a record against a queue that was never
    /// initialized creates its bucket so results are not lost.
    pub fn record(&self, queue_name: &str, result: ExecutionResult) {
        let bucket = self
            .buckets
            .entry(queue_name.to_string())
            .or_default()
            .clone();
        bucket.lock().push(result);
    }

    /// An immutable snapshot of a queue's results, in recording order
    ///
    /// Returns an empty list for an unknown queue.
    pub fn snapshot(&self, queue_name: &str) -> Vec<ExecutionResult> {
        self.buckets
            .get(queue_name)
            .map(|bucket| bucket.lock().clone())
            .unwrap_or_default()
    }

    /// Number of results recorded for a queue so far
    pub fn result_count(&self, queue_name: &str) -> usize {
        self.buckets
            .get(queue_name)
            .map(|bucket| bucket.lock().len())
            .unwrap_or(0)
    }

    /// Number of passed invocations recorded for a queue so far
    pub fn passed_count(&self, queue_name: &str) -> usize {
        self.buckets
            .get(queue_name)
            .map(|bucket| bucket.lock().iter().filter(|r| r.passed).count())
            .unwrap_or(0)
    }

    /// Number of failed invocations recorded for a queue so far
    pub fn failed_count(&self, queue_name: &str) -> usize {
        self.buckets
            .get(queue_name)
            .map(|bucket| bucket.lock().iter().filter(|r| !r.passed).count())
            .unwrap_or(0)
    }

    /// Drop a queue's bucket entirely
    pub fn remove(&self, queue_name: &str) {
        self.buckets.remove(queue_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_and_snapshot() {
        let stats = QueueExecutionStatistics::new();
        stats.init_results("q1");

        stats.record("q1", ExecutionResult::passed("Mail.send", "worker-0"));
        stats.record(
            "q1",
            ExecutionResult::failed("Mail.send", "worker-1", "connection refused"),
        );

        let snapshot = stats.snapshot("q1");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(stats.passed_count("q1"), 1);
        assert_eq!(stats.failed_count("q1"), 1);
        assert_eq!(
            snapshot[1].error.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_init_clears_previous_run() {
        let stats = QueueExecutionStatistics::new();
        stats.record("q1", ExecutionResult::passed("Mail.send", "worker-0"));
        assert_eq!(stats.result_count("q1"), 1);

        stats.init_results("q1");
        assert_eq!(stats.result_count("q1"), 0);
    }

    #[test]
    fn test_unknown_queue_is_empty() {
        let stats = QueueExecutionStatistics::new();
        assert!(stats.snapshot("ghost").is_empty());
        assert_eq!(stats.result_count("ghost"), 0);
    }

    #[test]
    fn test_queues_are_isolated() {
        let stats = QueueExecutionStatistics::new();
        stats.init_results("q1");
        stats.init_results("q2");

        stats.record("q1", ExecutionResult::passed("A.a", "worker-0"));
        stats.record("q2", ExecutionResult::passed("B.b", "worker-0"));
        stats.record("q2", ExecutionResult::passed("B.b", "worker-1"));

        assert_eq!(stats.result_count("q1"), 1);
        assert_eq!(stats.result_count("q2"), 2);
        assert!(stats.snapshot("q1").iter().all(|r| r.action == "A.a"));
    }

    #[test]
    fn test_concurrent_appends_are_all_retained() {
        let stats = QueueExecutionStatistics::new();
        stats.init_results("q1");

        let mut handles = vec![];
        for worker in 0..8 {
            let stats = stats.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record(
                        "q1",
                        ExecutionResult::passed("Load.hit", format!("worker-{}", worker)),
                    );
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.result_count("q1"), 800);
    }

    #[test]
    fn test_result_serialization_round_trip() {
        let result = ExecutionResult::failed("Mail.send", "worker-3", "timeout");

        let encoded = serde_json::to_string(&result).unwrap();
        let decoded: ExecutionResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, result);
    }
}
