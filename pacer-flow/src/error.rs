//! Pacer error types.

use pacer_core::DriveKey;

/// Pacer error type.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// A queue could not be created.
    #[error("queue for {key} not created: {reason}")]
    QueueNotCreated {
        /// The destination key.
        key: DriveKey,
        /// Why creation failed.
        reason: String,
    },

    /// No queue exists for the key.
    #[error("queue for {key} not found")]
    QueueNotFound {
        /// The destination key.
        key: DriveKey,
    },

    /// The queue for the key could not be resolved or created.
    #[error("queue for {key} unavailable")]
    QueueUnavailable {
        /// The destination key.
        key: DriveKey,
    },

    /// The drive statistics table has no room for another destination.
    #[error("drive statistics full: cannot track {key} (capacity {capacity})")]
    DriveStatsFull {
        /// The destination key.
        key: DriveKey,
        /// Table capacity.
        capacity: usize,
    },

    /// No drive statistics entry exists for the key.
    #[error("drive statistics for {key} not found")]
    DriveStatsNotFound {
        /// The destination key.
        key: DriveKey,
    },

    /// Memory could not be reserved.
    #[error("allocation failed for {what}: {requested} slots requested")]
    AllocationFailed {
        /// What was being allocated.
        what: &'static str,
        /// Number of slots requested.
        requested: usize,
    },
}

impl From<pacer_core::Error> for FlowError {
    fn from(err: pacer_core::Error) -> Self {
        Self::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Result type for pacer operations.
pub type FlowResult<T> = Result<T, FlowError>;
