//! Driver error types.

use pacer_flow::FlowError;

use crate::config::ConfigError;

/// Errors returned by the driver and its handles.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No tokio runtime to register the driver with.
    #[error("no tokio runtime available to drive the pacer")]
    NoRuntime,

    /// Invalid driver configuration.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// The driver task has stopped.
    #[error("pacer driver unavailable")]
    Unavailable,

    /// The pacer rejected the request.
    #[error(transparent)]
    Flow(#[from] FlowError),
}
