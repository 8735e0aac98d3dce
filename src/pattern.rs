//! Threading patterns - immutable descriptors of how a load queue runs
//!
//! A pattern describes how many workers run, whether the caller blocks until
//! they finish, how each worker's iterations are counted or timed
//! ([`ExecutionMode`]) and, optionally, how worker release is staggered in
//! timed groups ([`RampUp`]). Patterns carry no behavior: the task factory
//! reads the execution mode and the queue loader reads the ramp-up
//! parameters.
//!
//! The four supported shapes are the combinations of count-based vs
//! duration-based execution with all-at-once vs ramp-up start. All-at-once
//! is the degenerate ramp-up case where every worker is in the first group.
//!
//! # Example
//!
//! ```rust
//! use load_queue::ThreadingPattern;
//! use std::time::Duration;
//!
//! // 10 workers, 5 iterations each, 100ms apart, released in groups of 3
//! // every 2 seconds, caller does not block
//! let pattern = ThreadingPattern::ramp_up(
//!     10,
//!     5,
//!     Duration::from_millis(100),
//!     Duration::from_secs(2),
//!     3,
//!     false,
//! ).unwrap();
//!
//! assert_eq!(pattern.thread_count(), 10);
//! assert!(pattern.ramp_up_config().is_some());
//! ```

use crate::core::error::{LoaderError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The delay a worker observes between two of its iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationInterval {
    /// The same delay before every iteration (zero means back-to-back)
    Fixed(Duration),
    /// A fresh uniform delay in `[min, max]` drawn before every sleep
    Varying {
        /// Lower bound of the delay
        min: Duration,
        /// Upper bound of the delay
        max: Duration,
    },
}

impl IterationInterval {
    /// The delay to apply before the next iteration
    ///
    /// For a varying interval every call draws a new value.
    pub fn next_delay(&self) -> Duration {
        match *self {
            IterationInterval::Fixed(interval) => interval,
            IterationInterval::Varying { min, max } => {
                Duration::from_nanos(fastrand::u64(min.as_nanos() as u64..=max.as_nanos() as u64))
            }
        }
    }

    /// Whether this interval never produces a delay
    pub fn is_zero(&self) -> bool {
        matches!(*self, IterationInterval::Fixed(interval) if interval.is_zero())
    }
}

impl Default for IterationInterval {
    fn default() -> Self {
        IterationInterval::Fixed(Duration::ZERO)
    }
}

/// Staggered-start parameters: release `group_size` workers at a time,
/// `interval` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampUp {
    /// Wall-clock spacing between two group releases
    pub interval: Duration,
    /// Number of workers released together; never exceeds the thread count
    pub group_size: usize,
}

/// How each worker counts or times its iterations
///
/// The enum is open for new modes; components dispatching on it treat any
/// mode they do not recognize as unsupported rather than guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExecutionMode {
    /// Run the request list exactly `iterations` times, sleeping `interval`
    /// between iterations (but not after the last one)
    FixedInvocations {
        /// Iterations per worker
        iterations: u32,
        /// Delay between iterations
        interval: IterationInterval,
    },
    /// Run the request list back-to-back until `duration` has elapsed,
    /// checked at the start of each iteration
    FixedDuration {
        /// How long each worker keeps iterating
        duration: Duration,
    },
}

/// An immutable, validated descriptor of one load queue's execution strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadingPattern {
    thread_count: usize,
    block_until_completion: bool,
    mode: ExecutionMode,
    ramp_up: Option<RampUp>,
}

impl ThreadingPattern {
    fn validated(
        thread_count: usize,
        block_until_completion: bool,
        mode: ExecutionMode,
        ramp_up: Option<RampUp>,
    ) -> Result<Self> {
        if thread_count == 0 {
            return Err(LoaderError::invalid_pattern(
                "thread_count",
                "thread count must be a positive number",
            ));
        }

        if let ExecutionMode::FixedInvocations { iterations, .. } = mode {
            if iterations == 0 {
                return Err(LoaderError::invalid_pattern(
                    "iterations",
                    "iterations per thread must be a positive number",
                ));
            }
        }

        if let Some(ramp_up) = ramp_up {
            if ramp_up.group_size == 0 {
                return Err(LoaderError::invalid_pattern(
                    "group_size",
                    "ramp up group size must be a positive number",
                ));
            }
            if ramp_up.group_size > thread_count {
                return Err(LoaderError::invalid_pattern(
                    "group_size",
                    format!(
                        "ramp up group size {} exceeds the thread count {}",
                        ramp_up.group_size, thread_count
                    ),
                ));
            }
        }

        Ok(Self {
            thread_count,
            block_until_completion,
            mode,
            ramp_up,
        })
    }

    /// Count-based pattern releasing all workers at once
    pub fn all_at_once(
        thread_count: usize,
        iterations: u32,
        interval: Duration,
        block_until_completion: bool,
    ) -> Result<Self> {
        Self::validated(
            thread_count,
            block_until_completion,
            ExecutionMode::FixedInvocations {
                iterations,
                interval: IterationInterval::Fixed(interval),
            },
            None,
        )
    }

    /// Count-based pattern releasing workers in timed groups
    pub fn ramp_up(
        thread_count: usize,
        iterations: u32,
        interval: Duration,
        ramp_interval: Duration,
        group_size: usize,
        block_until_completion: bool,
    ) -> Result<Self> {
        Self::validated(
            thread_count,
            block_until_completion,
            ExecutionMode::FixedInvocations {
                iterations,
                interval: IterationInterval::Fixed(interval),
            },
            Some(RampUp {
                interval: ramp_interval,
                group_size,
            }),
        )
    }

    /// Duration-based pattern releasing all workers at once
    pub fn fixed_duration(
        thread_count: usize,
        duration: Duration,
        block_until_completion: bool,
    ) -> Result<Self> {
        Self::validated(
            thread_count,
            block_until_completion,
            ExecutionMode::FixedDuration { duration },
            None,
        )
    }

    /// Duration-based pattern releasing workers in timed groups
    pub fn fixed_duration_ramp_up(
        thread_count: usize,
        duration: Duration,
        ramp_interval: Duration,
        group_size: usize,
        block_until_completion: bool,
    ) -> Result<Self> {
        Self::validated(
            thread_count,
            block_until_completion,
            ExecutionMode::FixedDuration { duration },
            Some(RampUp {
                interval: ramp_interval,
                group_size,
            }),
        )
    }

    /// Replace the fixed inter-iteration interval with a varying one
    ///
    /// Every iteration then sleeps a fresh uniform delay in `[min, max]`.
    /// When the bounds arrive swapped they are reordered with a warning;
    /// equal bounds collapse back to a fixed interval.
    ///
    /// # Errors
    ///
    /// Fails for duration-based patterns, which run back-to-back.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_varying_interval(mut self, min: Duration, max: Duration) -> Result<Self> {
        let ExecutionMode::FixedInvocations { iterations, .. } = self.mode else {
            return Err(LoaderError::invalid_pattern(
                "interval",
                "a varying interval applies only to count-based patterns",
            ));
        };

        let interval = if min == max {
            warn!(
                "the minimum and maximum interval between iterations are both {:?}; using a fixed interval",
                min
            );
            IterationInterval::Fixed(min)
        } else if min > max {
            warn!(
                "swapping the provided minimum {:?} and maximum {:?} intervals between iterations",
                min, max
            );
            IterationInterval::Varying { min: max, max: min }
        } else {
            IterationInterval::Varying { min, max }
        };

        self.mode = ExecutionMode::FixedInvocations {
            iterations,
            interval,
        };
        Ok(self)
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Whether `start()` blocks the caller until every worker has returned
    pub fn block_until_completion(&self) -> bool {
        self.block_until_completion
    }

    /// The declared execution mode
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// The ramp-up parameters, if worker release is staggered
    pub fn ramp_up_config(&self) -> Option<RampUp> {
        self.ramp_up
    }

    /// Human-readable pattern summary for scheduling logs
    pub fn description(&self) -> String {
        let start = match self.ramp_up {
            Some(ramp_up) if ramp_up.group_size < self.thread_count => format!(
                "{} threads in groups of {} every {:?}",
                self.thread_count, ramp_up.group_size, ramp_up.interval
            ),
            _ => format!("{} threads at once", self.thread_count),
        };

        match self.mode {
            ExecutionMode::FixedInvocations {
                iterations,
                interval,
            } => match interval {
                IterationInterval::Fixed(d) if d.is_zero() => {
                    format!("{start}, {iterations} iterations")
                }
                IterationInterval::Fixed(d) => {
                    format!("{start}, {iterations} iterations every {d:?}")
                }
                IterationInterval::Varying { min, max } => {
                    format!("{start}, {iterations} iterations every {min:?}..{max:?}")
                }
            },
            ExecutionMode::FixedDuration { duration } => {
                format!("{start}, iterating for {duration:?}")
            }
        }
    }
}

impl fmt::Display for ThreadingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
