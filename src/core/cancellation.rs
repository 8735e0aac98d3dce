//! Cooperative cancellation for load queues
//!
//! A queue and all of its workers share one [`CancellationToken`]. Cancelling
//! the token stops the scheduler from releasing further work and wakes every
//! interruptible sleep at once; an invocation that is already in flight is
//! allowed to finish.
//!
//! # Example
//!
//! ```rust
//! use load_queue::CancellationToken;
//! use std::thread;
//! use std::time::Duration;
//!
//! let token = CancellationToken::new();
//! let worker_token = token.clone();
//!
//! let handle = thread::spawn(move || {
//!     // An interruptible sleep returns false as soon as the token is cancelled
//!     worker_token.sleep(Duration::from_secs(30))
//! });
//!
//! token.cancel();
//! assert!(!handle.join().unwrap());
//! ```

use crate::core::error::{LoaderError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct TokenInner {
    /// Lock-free cancellation flag
    cancelled: AtomicBool,
    /// Held until cancellation; dropping it disconnects the channel and
    /// wakes every sleeper at once
    sender: Mutex<Option<Sender<()>>>,
    /// Shared receiving side used by interruptible sleeps
    receiver: Receiver<()>,
}

/// A thread-safe cancellation token shared between a queue and its workers
///
/// Cloning the token is cheap and every clone observes the same state.
/// Cancellation is cooperative: workers check the token at loop boundaries
/// and use [`sleep()`](Self::sleep) for every wait, so "finish the in-flight
/// invocation, start nothing new" is deterministic.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        // A rendezvous channel: nothing is ever sent, the disconnect on
        // cancel is the only signal that travels through it
        let (sender, receiver) = bounded::<()>(0);

        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Cancel this token
    ///
    /// Idempotent - only the first call has an effect. All clones observe
    /// the cancellation, and every thread blocked in [`sleep()`](Self::sleep)
    /// wakes immediately.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        // Disconnect the wakeup channel
        self.inner.sender.lock().take();
    }

    /// Check if this token has been cancelled
    ///
    /// Lock-free, suitable for frequent checking in hot loops.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns an error if cancelled, `Ok(())` otherwise
    ///
    /// Convenience for ergonomic early returns with the `?` operator.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LoaderError::cancelled("cancellation token is set"))
        } else {
            Ok(())
        }
    }

    /// Sleep for the given duration unless cancelled first
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was
    /// cancelled before or during the sleep. The wakeup on cancellation is
    /// immediate - the sleep does not poll.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }

        match self.inner.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            // A disconnect means the sender was dropped by cancel()
            _ => false,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_token_creation() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_token_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_check() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());

        token.cancel();
        assert!(matches!(
            token.check(),
            Err(LoaderError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let token = CancellationToken::new();

        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_sleep_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let sleeper = token.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let finished = sleeper.sleep(Duration::from_secs(10));
            (finished, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let (finished, elapsed) = handle.join().unwrap();
        assert!(!finished);
        assert!(
            elapsed < Duration::from_secs(5),
            "sleep should have been interrupted, took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_sleep_after_cancel_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_cancel_wakes_multiple_sleepers() {
        let token = CancellationToken::new();
        let mut handles = vec![];

        for _ in 0..4 {
            let sleeper = token.clone();
            handles.push(thread::spawn(move || sleeper.sleep(Duration::from_secs(10))));
        }

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        for handle in handles {
            assert!(!handle.join().unwrap());
        }
    }
}
