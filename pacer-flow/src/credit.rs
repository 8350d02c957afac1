//! Per-period credit bucket.
//!
//! Unlike a trickling token bucket, credit is granted in whole periods: every
//! time a pacer period elapses the bucket is topped up by one period's budget,
//! and the balance never exceeds that budget. Idle periods don't accumulate.
//!
//! Charges are taken after admission, so a single oversized entry can leave
//! the balance negative. The next replenishment clamps back into
//! `[0, capacity]`.

/// A rate budget replenished once per elapsed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditBucket {
    /// Budget granted per period.
    capacity: i64,

    /// Budget left in the current period. May dip below zero between replenishments.
    remaining: i64,
}

impl CreditBucket {
    /// Creates an empty bucket. The first replenishment fills it.
    #[must_use]
    pub const fn new(capacity: i64) -> Self {
        Self {
            capacity,
            remaining: 0,
        }
    }

    /// Returns the per-period budget.
    #[must_use]
    pub const fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Returns the budget left in the current period.
    #[must_use]
    pub const fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Returns whether anything can still be admitted this period.
    #[must_use]
    pub const fn has_credit(&self) -> bool {
        self.remaining > 0
    }

    /// Grants one period's budget.
    ///
    /// # Returns
    ///
    /// The balance after replenishment, always within `[0, capacity]`.
    pub fn replenish(&mut self) -> i64 {
        self.remaining = self
            .remaining
            .saturating_add(self.capacity)
            .clamp(0, self.capacity.max(0));
        self.remaining
    }

    /// Charges an admitted entry against the current period.
    pub fn charge(&mut self, amount: u64) {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_is_empty() {
        let bucket = CreditBucket::new(4096);
        assert_eq!(bucket.capacity(), 4096);
        assert_eq!(bucket.remaining(), 0);
        assert!(!bucket.has_credit());
    }

    #[test]
    fn test_replenish_fills_to_capacity() {
        let mut bucket = CreditBucket::new(4096);
        assert_eq!(bucket.replenish(), 4096);
        assert!(bucket.has_credit());
    }

    #[test]
    fn test_idle_periods_do_not_roll_over() {
        let mut bucket = CreditBucket::new(4096);
        bucket.replenish();
        bucket.replenish();
        bucket.replenish();
        assert_eq!(bucket.remaining(), 4096);
    }

    #[test]
    fn test_partial_use_is_topped_up() {
        let mut bucket = CreditBucket::new(4096);
        bucket.replenish();
        bucket.charge(1024);
        assert_eq!(bucket.remaining(), 3072);

        // Top-up is capped at one period's budget.
        assert_eq!(bucket.replenish(), 4096);
    }

    #[test]
    fn test_overdraft_is_repaid_next_period() {
        let mut bucket = CreditBucket::new(4096);
        bucket.replenish();
        bucket.charge(5120);
        assert_eq!(bucket.remaining(), -1024);
        assert!(!bucket.has_credit());

        assert_eq!(bucket.replenish(), 3072);
    }

    #[test]
    fn test_large_overdraft_clamps_at_zero() {
        let mut bucket = CreditBucket::new(4096);
        bucket.replenish();
        bucket.charge(20_000);

        // Balance after replenishment is never negative.
        assert_eq!(bucket.replenish(), 0);
        assert_eq!(bucket.replenish(), 4096);
    }

    #[test]
    fn test_huge_charge_saturates() {
        let mut bucket = CreditBucket::new(4096);
        bucket.replenish();
        bucket.charge(u64::MAX);
        assert!(bucket.remaining() < 0);
        assert_eq!(bucket.replenish(), 0);
    }
}
