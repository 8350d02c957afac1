//! Pacer limits and configuration bounds.
//!
//! Following TigerStyle: put limits on everything.
//! The queue array, the drive statistics table and the tuner period ranges
//! all have explicit, named bounds.

/// Initial capacity of a pacer's queue array. The array doubles when full.
pub const DEFAULT_QUEUE_CAPACITY: u32 = 32;

/// Default number of destinations the drive statistics registry can track.
pub const DEFAULT_DRIVE_STATS_CAPACITY: u32 = 256;

/// Limits applied by a pacer and its tuners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Number of queue slots allocated on the first queue creation.
    pub initial_queue_capacity: u32,
    /// Capacity used when the pacer has to set up the drive statistics table.
    pub drive_stats_capacity: u32,
    /// Upper bound of the throughput tuner, as a multiple of the base period.
    pub throughput_max_period_factor: u32,
    /// Upper bound of the signal tuner, as a multiple of the base period.
    ///
    /// Wider than the throughput range because the external signal does not
    /// correct itself.
    pub signal_max_period_factor: u32,
}

impl Limits {
    /// Creates limits with the default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drive_stats_capacity: DEFAULT_DRIVE_STATS_CAPACITY,
            throughput_max_period_factor: 2,
            signal_max_period_factor: 4,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub const fn validate(&self) -> crate::Result<()> {
        if self.initial_queue_capacity == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "initial_queue_capacity",
                reason: "must be positive",
            });
        }

        if self.drive_stats_capacity == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "drive_stats_capacity",
                reason: "must be positive",
            });
        }

        // A factor of 1 pins the tuner to the base period, which is allowed.
        if self.throughput_max_period_factor == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "throughput_max_period_factor",
                reason: "must be >= 1",
            });
        }

        if self.signal_max_period_factor == 0 {
            return Err(crate::Error::InvalidLimit {
                name: "signal_max_period_factor",
                reason: "must be >= 1",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
