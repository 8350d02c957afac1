//! Property definitions and checkers for pacer simulation tests.
//!
//! Properties are invariants that must hold throughout simulation.
//! This module provides both the property definitions and functions
//! to verify them against pacer state and the dispatch log.

use std::collections::BTreeMap;

use pacer_core::DriveKey;
use pacer_flow::Pacer;

// ============================================================================
// Property Violation Types
// ============================================================================

/// A violation of a pacer property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Remaining credit outside what replenishment and one overdraft allow.
    CreditOutOfBounds {
        /// Remaining credit observed.
        remaining: i64,
        /// Per-period credit.
        credit: i64,
        /// Largest entry that can have overdrawn the budget.
        max_entry_size: u64,
    },
    /// `num_ios` differs from the sum of queue lengths.
    QueueAccounting {
        /// The pacer's counter.
        num_ios: u64,
        /// Sum of the queue lengths.
        queued: u64,
    },
    /// Entries for one destination dispatched out of push order.
    FifoOrder {
        /// The destination.
        key: DriveKey,
        /// Sequence number expected next.
        expected: u64,
        /// Sequence number dispatched.
        actual: u64,
    },
    /// An entry dispatched to a destination over its disk credit.
    ThrottledDispatch {
        /// The destination.
        key: DriveKey,
        /// In-flight operations at dispatch time.
        ops_in_flight: i32,
        /// The cap.
        disk_credit: u32,
    },
    /// Tuned period outside its range.
    PeriodOutOfRange {
        /// Current period.
        period_ticks: u64,
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },
}

impl std::fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreditOutOfBounds {
                remaining,
                credit,
                max_entry_size,
            } => {
                write!(
                    f,
                    "Remaining credit {remaining} out of bounds for credit {credit} \
                     (largest entry {max_entry_size})"
                )
            }
            Self::QueueAccounting { num_ios, queued } => {
                write!(f, "num_ios {num_ios} but {queued} entries queued")
            }
            Self::FifoOrder {
                key,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "FIFO order broken for {key}: expected seq {expected}, dispatched {actual}"
                )
            }
            Self::ThrottledDispatch {
                key,
                ops_in_flight,
                disk_credit,
            } => {
                write!(
                    f,
                    "Dispatched to {key} with {ops_in_flight} in flight (disk credit {disk_credit})"
                )
            }
            Self::PeriodOutOfRange {
                period_ticks,
                min,
                max,
            } => {
                write!(f, "Period {period_ticks} ticks outside [{min}, {max}]")
            }
        }
    }
}

// ============================================================================
// Dispatch Records
// ============================================================================

/// What the pop callback saw for one dispatched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Destination.
    pub key: DriveKey,
    /// Per-destination push sequence number.
    pub seq: u64,
    /// Entry size.
    pub size: u64,
    /// Destination's in-flight count before this entry was issued.
    pub ops_in_flight: i32,
}

// ============================================================================
// Property Checker
// ============================================================================

/// Tracks state across simulation for property verification.
#[derive(Debug, Default)]
pub struct PropertyChecker {
    /// Next sequence number expected per destination.
    next_seq: BTreeMap<DriveKey, u64>,
    /// Entries dispatched so far.
    dispatched: u64,
    /// Violations found.
    violations: Vec<PropertyViolation>,
}

impl PropertyChecker {
    /// Creates a new property checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one dispatch and checks FIFO order and admission.
    pub fn record_dispatch(&mut self, record: &DispatchRecord, disk_credit: u32) {
        self.dispatched += 1;

        let expected = self.next_seq.entry(record.key).or_insert(0);
        if record.seq != *expected {
            self.violations.push(PropertyViolation::FifoOrder {
                key: record.key,
                expected: *expected,
                actual: record.seq,
            });
        }
        *expected = record.seq + 1;

        if i64::from(record.ops_in_flight) > i64::from(disk_credit) {
            self.violations.push(PropertyViolation::ThrottledDispatch {
                key: record.key,
                ops_in_flight: record.ops_in_flight,
                disk_credit,
            });
        }
    }

    /// Tells the checker that entries for `key` up to `seq` were removed
    /// without being dispatched.
    pub fn skip_to(&mut self, key: DriveKey, seq: u64) {
        self.next_seq.insert(key, seq);
    }

    /// Checks the pacer's credit and queue accounting.
    pub fn check_pacer<E>(&mut self, pacer: &Pacer<E>, max_entry_size: u64) {
        self.violations
            .extend(check_credit_bounds(pacer, max_entry_size));
        self.violations.extend(check_queue_accounting(pacer));
    }

    /// Checks that the period stays within `[base, base * max_factor]`.
    pub fn check_period<E>(&mut self, pacer: &Pacer<E>, max_factor: u32) {
        self.violations.extend(check_period_range(pacer, max_factor));
    }

    /// Returns the number of dispatches recorded.
    #[must_use]
    pub const fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Returns all violations found.
    #[must_use]
    pub fn violations(&self) -> &[PropertyViolation] {
        &self.violations
    }

    /// Returns true if no violations were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Resets the checker state.
    pub fn reset(&mut self) {
        self.next_seq.clear();
        self.dispatched = 0;
        self.violations.clear();
    }
}

// ============================================================================
// Standalone Property Checks
// ============================================================================

/// Checks that remaining credit is at most one period's budget and at most
/// one entry below zero.
///
/// Replenishment leaves the budget in `[0, credit]`, and dispatch stops as
/// soon as it is no longer positive, so a single entry is the deepest
/// possible overdraft.
#[must_use]
pub fn check_credit_bounds<E>(pacer: &Pacer<E>, max_entry_size: u64) -> Option<PropertyViolation> {
    let remaining = pacer.remaining_credit();
    let credit = pacer.credit();
    let floor = -i64::try_from(max_entry_size).unwrap_or(i64::MAX);

    if remaining > credit || remaining < floor {
        return Some(PropertyViolation::CreditOutOfBounds {
            remaining,
            credit,
            max_entry_size,
        });
    }
    None
}

/// Checks that `num_ios` equals the sum of queue lengths.
#[must_use]
pub fn check_queue_accounting<E>(pacer: &Pacer<E>) -> Option<PropertyViolation> {
    let queued: u64 = pacer
        .queue_depths()
        .iter()
        .map(|(_, depth)| *depth as u64)
        .sum();

    if queued != pacer.num_ios() {
        return Some(PropertyViolation::QueueAccounting {
            num_ios: pacer.num_ios(),
            queued,
        });
    }
    None
}

/// Checks that the period is within `[base, base * max_factor]`.
#[must_use]
pub fn check_period_range<E>(pacer: &Pacer<E>, max_factor: u32) -> Option<PropertyViolation> {
    let min = pacer.base_period_ticks();
    let max = min.saturating_mul(u64::from(max_factor));
    let period_ticks = pacer.period_ticks();

    if period_ticks < min || period_ticks > max {
        return Some(PropertyViolation::PeriodOutOfRange {
            period_ticks,
            min,
            max,
        });
    }
    None
}

/// Asserts that `checker` found no violations, listing them otherwise.
///
/// # Panics
///
/// Panics if any violation was recorded.
pub fn assert_no_violations(checker: &PropertyChecker, test_name: &str) {
    if !checker.is_valid() {
        let list: Vec<String> = checker.violations().iter().map(ToString::to_string).collect();
        panic!(
            "{test_name}: {} property violations:\n  {}",
            list.len(),
            list.join("\n  ")
        );
    }
}
