//! Error types for the load queue scheduler

use crate::queue::QueueState;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while building and driving load queues
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoaderError {
    /// The queue was scheduled a second time
    #[error("Cannot schedule load queue '{queue}' - it has already been scheduled")]
    AlreadyScheduled {
        /// Name of the load queue
        queue: String,
    },

    /// The queue was started without being in the scheduled state
    #[error("Cannot start load queue '{queue}' - it is {state} instead of scheduled")]
    NotScheduled {
        /// Name of the load queue
        queue: String,
        /// State the queue was actually in
        state: QueueState,
    },

    /// The queue was resumed without being paused
    #[error("Cannot resume load queue '{queue}' - it has not been paused")]
    NotPaused {
        /// Name of the load queue
        queue: String,
    },

    /// A threading pattern declares an execution mode no task strategy handles
    #[error("Threading pattern with {description} execution is not supported")]
    PatternNotSupported {
        /// Description of the unsupported execution mode
        description: String,
    },

    /// A threading pattern failed construction-time validation
    #[error("Invalid threading pattern value for '{parameter}': {message}")]
    InvalidPattern {
        /// Pattern parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// A live queue with the same name is already registered
    #[error("Load queue '{queue}' already exists in state {state}")]
    QueueAlreadyExists {
        /// Name of the load queue
        queue: String,
        /// State of the existing queue
        state: QueueState,
    },

    /// No queue with the given name is registered
    #[error("No load queue named '{queue}'")]
    NoSuchQueue {
        /// Name of the load queue
        queue: String,
    },

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker #{worker_id} for load queue '{queue}': {message}")]
    Spawn {
        /// Name of the load queue
        queue: String,
        /// Index of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// An action invocation failed; recorded per invocation, never propagated
    #[error("Action '{action}' failed: {message}")]
    ActionFailed {
        /// Qualified action name
        action: String,
        /// Error message
        message: String,
    },

    /// The operation observed a cancellation signal
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Reason for cancellation
        reason: String,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl LoaderError {
    /// Create an already scheduled error
    pub fn already_scheduled(queue: impl Into<String>) -> Self {
        LoaderError::AlreadyScheduled {
            queue: queue.into(),
        }
    }

    /// Create a not scheduled error
    pub fn not_scheduled(queue: impl Into<String>, state: QueueState) -> Self {
        LoaderError::NotScheduled {
            queue: queue.into(),
            state,
        }
    }

    /// Create a not paused error
    pub fn not_paused(queue: impl Into<String>) -> Self {
        LoaderError::NotPaused {
            queue: queue.into(),
        }
    }

    /// Create a pattern not supported error
    pub fn pattern_not_supported(description: impl Into<String>) -> Self {
        LoaderError::PatternNotSupported {
            description: description.into(),
        }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::InvalidPattern {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a queue already exists error
    pub fn queue_already_exists(queue: impl Into<String>, state: QueueState) -> Self {
        LoaderError::QueueAlreadyExists {
            queue: queue.into(),
            state,
        }
    }

    /// Create a no such queue error
    pub fn no_such_queue(queue: impl Into<String>) -> Self {
        LoaderError::NoSuchQueue {
            queue: queue.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(queue: impl Into<String>, worker_id: usize, message: impl Into<String>) -> Self {
        LoaderError::Spawn {
            queue: queue.into(),
            worker_id,
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        queue: impl Into<String>,
        worker_id: usize,
        source: std::io::Error,
    ) -> Self {
        LoaderError::Spawn {
            queue: queue.into(),
            worker_id,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create an action failed error
    pub fn action_failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        LoaderError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoaderError::Other(msg.into())
    }
}
