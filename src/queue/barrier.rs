//! Reusable start barrier for worker release
//!
//! A [`StartBarrier`] manages the start of one or many workers, once or many
//! times. The scheduler creates a barrier, hands every worker a
//! [`BarrierWaiter`] via [`register()`](StartBarrier::register) and calls
//! [`start()`](StartBarrier::start) whenever a new round may begin. Workers
//! block in [`wait_for_start()`](BarrierWaiter::wait_for_start) and are
//! released together; a worker that already ran in the current round waits
//! for the next one.
//!
//! Rounds are tracked with a generation counter, so a release that fires
//! while a fast worker is still between rounds is never lost, and a worker
//! can never run twice in the same round.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug)]
struct GateState {
    /// Round number; bumped by every `start()`
    generation: u64,
    /// Once set, all waiters are released with `false`, permanently
    aborted: bool,
    /// Number of waiters handed out
    registered: usize,
}

#[derive(Debug)]
struct BarrierInner {
    state: Mutex<GateState>,
    cond: Condvar,
}

/// A reusable release gate coordinating the start of a group of workers
///
/// # Example
///
/// ```rust
/// use load_queue::StartBarrier;
/// use std::thread;
///
/// let barrier = StartBarrier::new();
/// let mut waiter = barrier.register();
///
/// let handle = thread::spawn(move || waiter.wait_for_start());
///
/// barrier.start();
/// assert!(handle.join().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct StartBarrier {
    inner: Arc<BarrierInner>,
}

impl StartBarrier {
    /// Create a new barrier with the gate closed
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BarrierInner {
                state: Mutex::new(GateState {
                    generation: 0,
                    aborted: false,
                    registered: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Hand out a waiter for one worker
    ///
    /// The waiter remembers the rounds it has been released for, so each
    /// waiter runs at most once per round.
    pub fn register(&self) -> BarrierWaiter {
        let mut state = self.inner.state.lock();
        state.registered += 1;

        BarrierWaiter {
            inner: Arc::clone(&self.inner),
            seen_generation: state.generation,
        }
    }

    /// Open the gate for one round
    ///
    /// Every waiter currently blocked is released together; a waiter that
    /// arrives late still enters the round it has not seen yet.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        self.inner.cond.notify_all();
    }

    /// Permanently release all current and future waiters with `false`
    ///
    /// Used on cancellation; idempotent.
    pub fn abort(&self) {
        let mut state = self.inner.state.lock();
        state.aborted = true;
        self.inner.cond.notify_all();
    }

    /// Number of waiters registered with this barrier
    pub fn registered(&self) -> usize {
        self.inner.state.lock().registered
    }
}

impl Default for StartBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// One worker's handle onto a [`StartBarrier`]
#[derive(Debug)]
pub struct BarrierWaiter {
    inner: Arc<BarrierInner>,
    seen_generation: u64,
}

impl BarrierWaiter {
    /// Block until the barrier opens a round this waiter has not run in
    ///
    /// Returns `true` when released for a new round and `false` when the
    /// barrier was aborted.
    pub fn wait_for_start(&mut self) -> bool {
        let mut state = self.inner.state.lock();
        loop {
            if state.aborted {
                return false;
            }
            if state.generation > self.seen_generation {
                self.seen_generation = state.generation;
                return true;
            }
            self.inner.cond.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_no_release_before_start() {
        let barrier = StartBarrier::new();
        let mut waiter = barrier.register();

        let released = Arc::new(AtomicUsize::new(0));
        let released_clone = Arc::clone(&released);

        let handle = thread::spawn(move || {
            waiter.wait_for_start();
            released_clone.fetch_add(1, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        barrier.start();
        handle.join().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_releases_all_waiters_together() {
        let barrier = StartBarrier::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..5 {
            let mut waiter = barrier.register();
            let released = Arc::clone(&released);
            handles.push(thread::spawn(move || {
                assert!(waiter.wait_for_start());
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(barrier.registered(), 5);

        thread::sleep(Duration::from_millis(50));
        barrier.start();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_start_before_wait_is_not_lost() {
        let barrier = StartBarrier::new();
        let mut waiter = barrier.register();

        // The release fires before the worker reaches the gate
        barrier.start();

        // The worker must pass straight through
        assert!(waiter.wait_for_start());
    }

    #[test]
    fn test_waiter_runs_once_per_round() {
        let barrier = StartBarrier::new();
        let mut waiter = barrier.register();

        barrier.start();
        assert!(waiter.wait_for_start());

        // A second wait in the same round must block until the next start
        let handle = thread::spawn(move || waiter.wait_for_start());
        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        barrier.start();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_reuse_across_rounds() {
        let barrier = StartBarrier::new();
        let rounds_run = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..3 {
            let mut waiter = barrier.register();
            let rounds_run = Arc::clone(&rounds_run);
            handles.push(thread::spawn(move || {
                while waiter.wait_for_start() {
                    rounds_run.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for round in 1..=4 {
            barrier.start();
            // All three workers must pass the gate once per round
            while rounds_run.load(Ordering::SeqCst) < round * 3 {
                thread::sleep(Duration::from_millis(5));
            }
        }

        barrier.abort();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(rounds_run.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_abort_wakes_waiters() {
        let barrier = StartBarrier::new();
        let mut waiter = barrier.register();

        let handle = thread::spawn(move || waiter.wait_for_start());

        thread::sleep(Duration::from_millis(50));
        barrier.abort();

        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_abort_is_permanent() {
        let barrier = StartBarrier::new();
        barrier.abort();

        let mut waiter = barrier.register();
        assert!(!waiter.wait_for_start());

        // A start after the abort must not resurrect the gate
        barrier.start();
        assert!(!waiter.wait_for_start());
    }
}
