//! Driver configuration.
//!
//! Configuration for the task that ticks a pacer.

use std::time::Duration;

/// How the driver invokes `poll()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Poll on every scheduler turn, yielding in between.
    Busy,
    /// Poll on a fixed timer.
    Interval(Duration),
}

impl Default for PollMode {
    fn default() -> Self {
        Self::Interval(Duration::from_millis(1))
    }
}

/// Configuration for a pacer driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Poll cadence.
    pub poll_mode: PollMode,
    /// Capacity of the command channel between handles and the driver.
    pub command_capacity: usize,
}

impl DriverConfig {
    /// Creates a new driver configuration.
    #[must_use]
    pub const fn new(poll_mode: PollMode) -> Self {
        Self {
            poll_mode,
            command_capacity: 1024,
        }
    }

    /// Sets the command channel capacity.
    #[must_use]
    pub const fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Creates a configuration suitable for testing.
    #[must_use]
    pub const fn fast_for_testing() -> Self {
        Self {
            poll_mode: PollMode::Interval(Duration::from_millis(1)),
            command_capacity: 64,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PollMode::Interval(period) = self.poll_mode {
            // tokio intervals panic on a zero period.
            if period.is_zero() {
                return Err(ConfigError::InvalidPollMode {
                    message: "poll interval must be non-zero, use PollMode::Busy instead"
                        .to_string(),
                });
            }
        }

        if self.command_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                message: "command_capacity must be positive".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(PollMode::default())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid poll mode.
    InvalidPollMode {
        /// Error description.
        message: String,
    },
    /// Invalid channel capacity.
    InvalidCapacity {
        /// Error description.
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPollMode { message } => write!(f, "invalid poll mode: {message}"),
            Self::InvalidCapacity { message } => write!(f, "invalid capacity: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DriverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_fast_config_is_valid() {
        assert!(DriverConfig::fast_for_testing().validate().is_ok());
    }

    #[test]
    fn test_busy_mode_is_valid() {
        assert!(DriverConfig::new(PollMode::Busy).validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = DriverConfig::new(PollMode::Interval(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPollMode { .. })
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DriverConfig::default().with_command_capacity(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCapacity { .. })
        ));
    }
}
