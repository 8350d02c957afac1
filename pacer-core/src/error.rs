//! Error types for pacer core configuration.

use std::fmt;

/// The result type for pacer core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating core limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A limit has a value the pacer cannot run with.
    InvalidLimit {
        /// The limit's field name.
        name: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLimit { name, reason } => write!(f, "limit {name} {reason}"),
        }
    }
}

impl std::error::Error for Error {}
