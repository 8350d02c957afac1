//! The I/O pacer.
//!
//! A `Pacer` multiplexes many per-destination queues onto a single dispatch
//! cursor. It is driven by a tick source that calls `poll()` frequently;
//! every time a full period has elapsed the pacer grants one period's credit
//! and releases queued entries round-robin until the credit runs out.
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Pacer                                 │
//! │                                                                  │
//! │  push(key, e) ──▶ ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │                   │ DriveQueue │ │ DriveQueue │ │ DriveQueue │   │
//! │                   │   key A    │ │   key B    │ │   key C    │   │
//! │                   └─────┬──────┘ └─────┬──────┘ └─────┬──────┘   │
//! │                         └──── round-robin cursor ─────┘          │
//! │                                      │                           │
//! │          CreditBucket (per period) ──┤── DriveStats (in flight)  │
//! │                                      ▼                           │
//! │                                  pop_cb(..)                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Admission
//!
//! A queue whose destination has more than `disk_credit` operations in flight
//! is skipped, not waited on, so one overloaded drive can't hold rate credit
//! that healthier drives could use. Empty queues also consume a scan slot.
//! A poll stops after one full revolution without a dispatch.
//!
//! # Execution model
//!
//! `push`, `poll` and the tuner all take `&mut self` and are expected to run
//! on the same thread or task. Only the drive statistics are shared with
//! other threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pacer_core::{ns_to_ticks, Clock, DriveKey, Limits, PacerId};
use tracing::{debug, error, info, warn};

use crate::credit::CreditBucket;
use crate::error::{FlowError, FlowResult};
use crate::queue::{DriveQueue, PacedEntry};
use crate::registry::{DriveStats, DriveStatsRegistry};

/// Unit in which entries are charged against the credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreditUnit {
    /// Each entry charges its `size()`.
    #[default]
    Bytes,
    /// Each entry charges one unit regardless of size.
    Ops,
}

/// Configuration for a pacer.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Minimum time between dispatch attempts, in nanoseconds.
    pub period_ns: u64,

    /// Budget released per period, in `credit_unit`s.
    pub credit: i64,

    /// Maximum in-flight operations a destination may have and still be served.
    pub disk_credit: u32,

    /// How entries are charged against `credit`.
    pub credit_unit: CreditUnit,

    /// Whether `push` creates a queue for an unseen key.
    pub auto_create_queues: bool,

    /// Queue array and tuner bounds.
    pub limits: Limits,
}

impl PacerConfig {
    /// Creates a new pacer configuration.
    ///
    /// # Arguments
    ///
    /// * `period_ns` - Minimum time between dispatch attempts.
    /// * `credit` - Budget released per period.
    /// * `disk_credit` - Per-destination in-flight cap.
    #[must_use]
    pub const fn new(period_ns: u64, credit: i64, disk_credit: u32) -> Self {
        Self {
            period_ns,
            credit,
            disk_credit,
            credit_unit: CreditUnit::Bytes,
            auto_create_queues: true,
            limits: Limits::new(),
        }
    }

    /// Sets the credit unit.
    #[must_use]
    pub const fn with_credit_unit(mut self, unit: CreditUnit) -> Self {
        self.credit_unit = unit;
        self
    }

    /// Sets whether `push` creates queues on demand.
    #[must_use]
    pub const fn with_auto_create_queues(mut self, enabled: bool) -> Self {
        self.auto_create_queues = enabled;
        self
    }

    /// Sets the limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self::new(1_000, 4096, 2)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if the credit is not positive or the
    /// limits are inconsistent.
    pub fn validate(&self) -> FlowResult<()> {
        if self.credit <= 0 {
            return Err(FlowError::InvalidConfig {
                message: format!("credit must be positive, got {}", self.credit),
            });
        }
        self.limits.validate()?;
        Ok(())
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        // 128 KiB every 10 us, at most 32 operations queued at a drive.
        Self::new(10_000, 128 * 1024, 32)
    }
}

/// Pacer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerStats {
    /// Ticks between pacer creation and the last elapsed-period poll.
    pub total_ticks: u64,
    /// Polls on which a period had elapsed.
    pub polls: u64,
    /// Entries dispatched.
    pub ios: u64,
    /// Cumulative size of dispatched entries.
    pub bytes: u64,
    /// `poll()` invocations.
    pub calls: u64,
    /// Elapsed-period polls that found nothing queued.
    pub no_ios: u64,
    /// Current period, in ticks.
    pub period_ticks: u64,
}

impl PacerStats {
    /// Returns the cumulative amount charged against the credit in `unit`.
    #[must_use]
    pub const fn consumed(&self, unit: CreditUnit) -> u64 {
        match unit {
            CreditUnit::Bytes => self.bytes,
            CreditUnit::Ops => self.ios,
        }
    }
}

/// An entry released by the pacer, with the context needed to account for it.
#[derive(Debug)]
pub struct Dispatched<E> {
    /// The pacer that released the entry.
    pub pacer: PacerId,

    /// The queue the entry came from.
    pub key: DriveKey,

    /// The destination's in-flight counter. The transport bumps it when the
    /// operation is issued and drops it on completion.
    pub drive: Arc<DriveStats>,

    /// The entry itself.
    pub entry: E,
}

/// Callback receiving dispatched entries.
pub type PopCallback<E> = Box<dyn FnMut(Dispatched<E>) + Send>;

/// What was left behind when a pacer was destroyed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    /// Keys of queues that still held entries.
    pub abandoned_queues: Vec<DriveKey>,
    /// Total number of entries that were never dispatched.
    pub abandoned_entries: u64,
}

/// Source of process-unique pacer ids.
static NEXT_PACER_ID: AtomicU64 = AtomicU64::new(1);

/// Credit-based, tick-driven dispatcher over per-destination queues.
pub struct Pacer<E> {
    /// Instance identity, used in logs and dispatch context.
    id: PacerId,

    /// Configuration.
    config: PacerConfig,

    /// Tick source.
    clock: Arc<dyn Clock>,

    /// Where queues find their destination's in-flight counter.
    registry: DriveStatsRegistry,

    /// Receives dispatched entries.
    pop_cb: PopCallback<E>,

    /// Per-destination queues. Order is preserved when a queue is removed.
    queues: Vec<DriveQueue<E>>,

    /// Round-robin cursor into `queues`.
    next_queue: u32,

    /// Entries queued across all queues.
    num_ios: u64,

    /// Current period. Changed only by a tuner.
    period_ticks: u64,

    /// Period computed at creation; tuners use it as their lower bound.
    base_period_ticks: u64,

    /// Rate budget.
    credit: CreditBucket,

    /// Tick at creation.
    first_tick: u64,

    /// Start of the current period. Advances in whole periods.
    last_tick: u64,

    /// Counters.
    stat: PacerStats,
}

impl<E> Pacer<E> {
    /// Creates a new pacer.
    ///
    /// The pacer doesn't tick itself: register it with a driver that calls
    /// `poll()` at least once per period.
    ///
    /// # Arguments
    ///
    /// * `config` - Rate policy.
    /// * `clock` - Tick source.
    /// * `registry` - Drive statistics shared with the transport.
    /// * `pop_cb` - Receives every dispatched entry.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if the configuration is invalid.
    pub fn new(
        config: PacerConfig,
        clock: Arc<dyn Clock>,
        registry: DriveStatsRegistry,
        pop_cb: impl FnMut(Dispatched<E>) + Send + 'static,
    ) -> FlowResult<Self> {
        config.validate()?;

        let id = PacerId::new(NEXT_PACER_ID.fetch_add(1, Ordering::Relaxed));
        let period_ticks = ns_to_ticks(config.period_ns, clock.ticks_hz());
        let now = clock.ticks();

        info!(
            pacer = %id,
            period_ns = config.period_ns,
            period_ticks,
            credit = config.credit,
            disk_credit = config.disk_credit,
            "Created IO pacer"
        );

        Ok(Self {
            id,
            credit: CreditBucket::new(config.credit),
            config,
            clock,
            registry,
            pop_cb: Box::new(pop_cb),
            queues: Vec::new(),
            next_queue: 0,
            num_ios: 0,
            period_ticks,
            base_period_ticks: period_ticks,
            first_tick: now,
            last_tick: now,
            stat: PacerStats::default(),
        })
    }

    /// Destroys the pacer.
    ///
    /// The caller must have stopped pushing and polling. Entries still queued
    /// are dropped with one warning per non-empty queue.
    pub fn destroy(mut self) -> DestroyReport {
        let report = self.abandon_queues();
        info!(pacer = %self.id, "Destroyed IO pacer");
        report
    }

    /// Drops every queue, warning about the ones that weren't empty.
    fn abandon_queues(&mut self) -> DestroyReport {
        let mut report = DestroyReport::default();
        for queue in self.queues.drain(..) {
            if !queue.is_empty() {
                warn!(
                    pacer = %self.id,
                    key = %queue.key(),
                    pending = queue.len(),
                    "IO pacer queue is not empty on pacer destroy"
                );
                report.abandoned_queues.push(queue.key());
                report.abandoned_entries += queue.len() as u64;
            }
        }
        self.num_ios = 0;
        report
    }

    // -------------------------------------------------------------------------
    // Queue management
    // -------------------------------------------------------------------------

    /// Creates an empty queue for `key`.
    ///
    /// Creating a queue that already exists is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueNotCreated` if the queue array can't grow or
    /// the drive statistics table is full.
    pub fn create_queue(&mut self, key: DriveKey) -> FlowResult<()> {
        if self.queue_index(key).is_some() {
            debug!(pacer = %self.id, key = %key, "IO pacer queue already exists");
            return Ok(());
        }

        self.reserve_queue_slot().map_err(|err| FlowError::QueueNotCreated {
            key,
            reason: err.to_string(),
        })?;

        self.registry
            .setup(self.config.limits.drive_stats_capacity as usize);
        let stats = self
            .registry
            .get_or_create(key)
            .map_err(|err| FlowError::QueueNotCreated {
                key,
                reason: err.to_string(),
            })?;

        self.queues.push(DriveQueue::new(key, stats));
        info!(pacer = %self.id, key = %key, "Created IO pacer queue");
        Ok(())
    }

    /// Doubles the queue array when it is full.
    fn reserve_queue_slot(&mut self) -> FlowResult<()> {
        if self.queues.len() < self.queues.capacity() {
            return Ok(());
        }

        let new_capacity = if self.queues.capacity() == 0 {
            self.config.limits.initial_queue_capacity as usize
        } else {
            self.queues.capacity() * 2
        };
        if let Err(err) = self
            .queues
            .try_reserve_exact(new_capacity - self.queues.len())
        {
            error!(
                pacer = %self.id,
                max_queues = new_capacity,
                error = %err,
                "Failed to allocate more queues for IO pacer"
            );
            return Err(FlowError::AllocationFailed {
                what: "pacer queue array",
                requested: new_capacity,
            });
        }

        debug!(pacer = %self.id, max_queues = self.queues.capacity(), "Allocated more queues for IO pacer");
        Ok(())
    }

    /// Removes the queue for `key`.
    ///
    /// Entries still in the queue are dropped with a warning. The remaining
    /// queues keep their relative order.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueNotFound` if there is no queue for `key`.
    pub fn destroy_queue(&mut self, key: DriveKey) -> FlowResult<()> {
        let Some(index) = self.queue_index(key) else {
            error!(pacer = %self.id, key = %key, "IO pacer queue not found");
            return Err(FlowError::QueueNotFound { key });
        };

        let queue = self.queues.remove(index);
        if !queue.is_empty() {
            warn!(
                pacer = %self.id,
                key = %key,
                pending = queue.len(),
                "Destroying non empty IO pacer queue"
            );
            self.num_ios -= queue.len() as u64;
        }

        info!(pacer = %self.id, key = %key, "Destroyed IO pacer queue");
        Ok(())
    }

    /// Removes and returns every entry queued for `key` without dispatching it.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueNotFound` if there is no queue for `key`.
    pub fn drain_queue(&mut self, key: DriveKey) -> FlowResult<Vec<E>> {
        let index = self
            .queue_index(key)
            .ok_or(FlowError::QueueNotFound { key })?;
        let drained = self.queues[index].drain();
        self.num_ios -= drained.len() as u64;
        Ok(drained)
    }

    fn queue_index(&self, key: DriveKey) -> Option<usize> {
        self.queues.iter().position(|queue| queue.key() == key)
    }

    // -------------------------------------------------------------------------
    // Producer side
    // -------------------------------------------------------------------------

    /// Queues `entry` for `key`.
    ///
    /// The queue is created on first use unless `auto_create_queues` is off.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueUnavailable` if the queue doesn't exist and
    /// can't be created.
    pub fn push(&mut self, key: DriveKey, entry: E) -> FlowResult<()> {
        let index = match self.queue_index(key) {
            Some(index) => index,
            None if self.config.auto_create_queues => {
                // Existing transports push before they announce the drive.
                self.create_queue(key)
                    .map_err(|_| FlowError::QueueUnavailable { key })?;
                self.queues.len() - 1
            }
            None => {
                error!(pacer = %self.id, key = %key, "IO pacer queue not found");
                return Err(FlowError::QueueUnavailable { key });
            }
        };

        self.queues[index].push(entry);
        self.num_ios += 1;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Returns the pacer id.
    #[must_use]
    pub const fn id(&self) -> PacerId {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Returns the tick source.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub const fn stats(&self) -> PacerStats {
        let mut stat = self.stat;
        stat.period_ticks = self.period_ticks;
        stat
    }

    /// Returns the number of queued entries across all queues.
    #[must_use]
    pub const fn num_ios(&self) -> u64 {
        self.num_ios
    }

    /// Returns the number of queues.
    #[must_use]
    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Returns the number of entries queued for `key`, or `None` if there is no such queue.
    #[must_use]
    pub fn queue_len(&self, key: DriveKey) -> Option<usize> {
        self.queue_index(key).map(|index| self.queues[index].len())
    }

    /// Returns `(key, queued entries)` for every queue, in cursor order.
    #[must_use]
    pub fn queue_depths(&self) -> Vec<(DriveKey, usize)> {
        self.queues
            .iter()
            .map(|queue| (queue.key(), queue.len()))
            .collect()
    }

    /// Returns the per-period budget.
    #[must_use]
    pub const fn credit(&self) -> i64 {
        self.credit.capacity()
    }

    /// Returns the budget left in the current period.
    #[must_use]
    pub const fn remaining_credit(&self) -> i64 {
        self.credit.remaining()
    }

    /// Returns the current period in ticks.
    #[must_use]
    pub const fn period_ticks(&self) -> u64 {
        self.period_ticks
    }

    /// Returns the period computed at creation, in ticks.
    #[must_use]
    pub const fn base_period_ticks(&self) -> u64 {
        self.base_period_ticks
    }

    /// Returns the round-robin cursor.
    #[must_use]
    pub const fn next_queue(&self) -> u32 {
        self.next_queue
    }

    /// Returns the tick at which the pacer was created.
    #[must_use]
    pub const fn first_tick(&self) -> u64 {
        self.first_tick
    }

    /// Returns the start of the current period.
    #[must_use]
    pub const fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// Sets the period. Only tuners change it after creation.
    pub(crate) fn set_period_ticks(&mut self, period_ticks: u64) {
        self.period_ticks = period_ticks;
    }
}

impl<E: PacedEntry> Pacer<E> {
    /// Dispatches queued entries if a period has elapsed.
    ///
    /// Cheap when called before the period is up. Otherwise grants one
    /// period's credit and releases entries round-robin until the credit, the
    /// queued entries, or the admissible queues run out.
    ///
    /// # Returns
    ///
    /// The number of entries dispatched by this call.
    pub fn poll(&mut self) -> u32 {
        self.stat.calls += 1;

        let cur_tick = self.clock.ticks();
        let ticks_diff = cur_tick.saturating_sub(self.last_tick);
        if ticks_diff < self.period_ticks {
            return 0;
        }

        // Absorb whole periods only; the remainder carries into the next one.
        self.last_tick = if self.period_ticks == 0 {
            cur_tick
        } else {
            cur_tick - ticks_diff % self.period_ticks
        };
        self.stat.total_ticks = cur_tick.saturating_sub(self.first_tick);
        self.stat.polls += 1;

        self.credit.replenish();

        if self.num_ios == 0 {
            self.stat.no_ios += 1;
            return 0;
        }

        self.dispatch()
    }

    fn dispatch(&mut self) -> u32 {
        let num_queues = self.queues.len();
        let mut next_queue = self.next_queue as usize;
        let mut skipped = 0;
        let mut dispatched = 0;

        while self.num_ios > 0 && self.credit.has_credit() && skipped < num_queues {
            let index = next_queue % num_queues;
            next_queue = (index + 1) % num_queues;

            let queue = &mut self.queues[index];
            if queue.is_throttled(self.config.disk_credit) {
                skipped += 1;
                continue;
            }
            let Some(entry) = queue.pop() else {
                skipped += 1;
                continue;
            };
            skipped = 0;

            let key = queue.key();
            let drive = Arc::clone(queue.stats());
            let size = entry.size();

            self.num_ios -= 1;
            self.credit.charge(match self.config.credit_unit {
                CreditUnit::Bytes => size,
                CreditUnit::Ops => 1,
            });
            self.stat.ios += 1;
            self.stat.bytes += size;
            dispatched += 1;

            (self.pop_cb)(Dispatched {
                pacer: self.id,
                key,
                drive,
                entry,
            });
        }

        self.next_queue = u32::try_from(next_queue).unwrap_or(0);
        dispatched
    }
}

impl<E> Drop for Pacer<E> {
    fn drop(&mut self) {
        // `destroy()` already emptied the array.
        if !self.queues.is_empty() {
            self.abandon_queues();
        }
    }
}

impl<E> fmt::Debug for Pacer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pacer")
            .field("id", &self.id)
            .field("period_ticks", &self.period_ticks)
            .field("credit", &self.credit)
            .field("num_queues", &self.queues.len())
            .field("num_ios", &self.num_ios)
            .field("next_queue", &self.next_queue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pacer_core::ManualClock;

    use super::*;
    use crate::queue::IoRequest;

    type Log = Arc<Mutex<Vec<(DriveKey, u32)>>>;

    struct Harness {
        clock: Arc<ManualClock>,
        registry: DriveStatsRegistry,
        log: Log,
        pacer: Pacer<IoRequest<u32>>,
    }

    fn harness(config: PacerConfig) -> Harness {
        let clock = Arc::new(ManualClock::nanos());
        let registry = DriveStatsRegistry::new();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let pacer = Pacer::new(
            config,
            clock.clone(),
            registry.clone(),
            move |d: Dispatched<IoRequest<u32>>| {
                sink.lock().unwrap().push((d.key, d.entry.payload));
            },
        )
        .unwrap();
        Harness {
            clock,
            registry,
            log,
            pacer,
        }
    }

    const A: DriveKey = DriveKey::new(0xA);
    const B: DriveKey = DriveKey::new(0xB);
    const C: DriveKey = DriveKey::new(0xC);

    #[test]
    fn test_new_pacer() {
        let h = harness(PacerConfig::for_testing());
        assert_eq!(h.pacer.period_ticks(), 1_000);
        assert_eq!(h.pacer.base_period_ticks(), 1_000);
        assert_eq!(h.pacer.credit(), 4096);
        assert_eq!(h.pacer.num_queues(), 0);
        assert_eq!(h.pacer.num_ios(), 0);
        assert_eq!(
            h.pacer.stats(),
            PacerStats {
                period_ticks: 1_000,
                ..PacerStats::default()
            }
        );
    }

    #[test]
    fn test_invalid_credit_rejected() {
        let clock = Arc::new(ManualClock::nanos());
        let result = Pacer::<IoRequest<u32>>::new(
            PacerConfig::new(1_000, 0, 2),
            clock,
            DriveStatsRegistry::new(),
            |_| {},
        );
        assert!(matches!(result, Err(FlowError::InvalidConfig { .. })));
    }

    #[test]
    fn test_scenario_round_robin_order() {
        let mut h = harness(PacerConfig::for_testing());
        for i in 0..3 {
            h.pacer.push(A, IoRequest::new(1024, i)).unwrap();
        }
        h.pacer.push(B, IoRequest::new(1024, 10)).unwrap();

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 4);

        let log = h.log.lock().unwrap().clone();
        assert_eq!(log, vec![(A, 0), (B, 10), (A, 1), (A, 2)]);
        assert_eq!(h.pacer.remaining_credit(), 0);
        assert_eq!(h.pacer.num_ios(), 0);
    }

    #[test]
    fn test_poll_before_period_is_rejected() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();

        h.clock.advance(999);
        assert_eq!(h.pacer.poll(), 0);

        let stats = h.pacer.stats();
        assert_eq!(stats.calls, 1);
        assert_eq!(stats.polls, 0);
        assert_eq!(h.pacer.num_ios(), 1);
    }

    #[test]
    fn test_poll_with_nothing_queued() {
        let mut h = harness(PacerConfig::for_testing());
        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 0);

        let stats = h.pacer.stats();
        assert_eq!(stats.polls, 1);
        assert_eq!(stats.no_ios, 1);
        assert_eq!(stats.total_ticks, 1_000);
    }

    #[test]
    fn test_credit_limits_dispatch_per_period() {
        let mut h = harness(PacerConfig::for_testing());
        for i in 0..6 {
            h.pacer.push(A, IoRequest::new(1024, i)).unwrap();
        }

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 4);
        assert_eq!(h.pacer.num_ios(), 2);

        // Same period: nothing more.
        assert_eq!(h.pacer.poll(), 0);

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 2);
        assert_eq!(h.pacer.remaining_credit(), 2048);
    }

    #[test]
    fn test_oversized_entry_overdraws_one_period() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(6144, 0)).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 1)).unwrap();

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.pacer.remaining_credit(), -2048);

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.pacer.remaining_credit(), 1024);
    }

    #[test]
    fn test_ops_credit_unit() {
        let config = PacerConfig::new(1_000, 2, 2).with_credit_unit(CreditUnit::Ops);
        let mut h = harness(config);
        for i in 0..3 {
            h.pacer.push(A, IoRequest::new(1 << 20, i)).unwrap();
        }

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 2);
        assert_eq!(h.pacer.stats().bytes, 2 << 20);
        assert_eq!(h.pacer.stats().consumed(CreditUnit::Ops), 2);
    }

    #[test]
    fn test_throttled_queue_is_skipped() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 1)).unwrap();
        h.pacer.push(B, IoRequest::new(1024, 10)).unwrap();

        // A is above its disk credit of 2.
        h.registry.add(A, 3).unwrap();

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.log.lock().unwrap().clone(), vec![(B, 10)]);
        assert_eq!(h.pacer.queue_len(A), Some(2));

        // Once A drains below the cap it is served again.
        h.registry.sub(A, 1).unwrap();
        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 2);
        assert_eq!(h.pacer.num_ios(), 0);
    }

    #[test]
    fn test_all_queues_throttled_terminates() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        h.pacer.push(B, IoRequest::new(1024, 1)).unwrap();
        h.registry.add(A, 10).unwrap();
        h.registry.add(B, 10).unwrap();

        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 0);
        assert_eq!(h.pacer.num_ios(), 2);
        assert_eq!(h.pacer.remaining_credit(), 4096);
    }

    #[test]
    fn test_cursor_persists_across_polls() {
        let config = PacerConfig::new(1_000, 1024, 2);
        let mut h = harness(config);
        for key in [A, B, C] {
            h.pacer.push(key, IoRequest::new(1024, 0)).unwrap();
            h.pacer.push(key, IoRequest::new(1024, 1)).unwrap();
        }

        let mut order = Vec::new();
        for _ in 0..6 {
            h.clock.advance(1_000);
            assert_eq!(h.pacer.poll(), 1);
            order.push(h.log.lock().unwrap().last().unwrap().0);
        }
        assert_eq!(order, vec![A, B, C, A, B, C]);
    }

    #[test]
    fn test_last_tick_advances_in_whole_periods() {
        let mut h = harness(PacerConfig::for_testing());

        h.clock.advance(2_500);
        h.pacer.poll();
        assert_eq!(h.pacer.last_tick(), 2_000);

        h.clock.advance(600);
        h.pacer.poll();
        assert_eq!(h.pacer.last_tick(), 3_000);
        assert_eq!(h.pacer.stats().polls, 2);
    }

    #[test]
    fn test_zero_period_dispatches_every_poll() {
        let mut h = harness(PacerConfig::new(0, 1024, 2));
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 1)).unwrap();

        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.pacer.stats().polls, 2);
    }

    #[test]
    fn test_create_queue_is_idempotent() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.create_queue(A).unwrap();
        h.pacer.create_queue(A).unwrap();
        assert_eq!(h.pacer.num_queues(), 1);
        assert_eq!(h.registry.len(), 1);
    }

    #[test]
    fn test_queue_array_grows_by_doubling() {
        let limits = Limits {
            initial_queue_capacity: 2,
            ..Limits::new()
        };
        let mut h = harness(PacerConfig::for_testing().with_limits(limits));
        for key in 0..5 {
            h.pacer.create_queue(DriveKey::new(key)).unwrap();
        }
        assert_eq!(h.pacer.num_queues(), 5);
        assert!(h.pacer.queues.capacity() >= 8);
    }

    #[test]
    fn test_create_queue_fails_when_drive_stats_full() {
        let limits = Limits {
            drive_stats_capacity: 1,
            ..Limits::new()
        };
        let mut h = harness(PacerConfig::for_testing().with_limits(limits));
        h.pacer.create_queue(A).unwrap();

        let result = h.pacer.create_queue(B);
        assert!(matches!(result, Err(FlowError::QueueNotCreated { .. })));
        assert_eq!(h.pacer.num_queues(), 1);

        let result = h.pacer.push(B, IoRequest::new(1, 0));
        assert!(matches!(result, Err(FlowError::QueueUnavailable { .. })));
        assert_eq!(h.pacer.num_ios(), 0);
    }

    #[test]
    fn test_push_without_auto_create() {
        let config = PacerConfig::for_testing().with_auto_create_queues(false);
        let mut h = harness(config);

        let result = h.pacer.push(A, IoRequest::new(1024, 0));
        assert!(matches!(result, Err(FlowError::QueueUnavailable { .. })));

        h.pacer.create_queue(A).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        assert_eq!(h.pacer.num_ios(), 1);
    }

    #[test]
    fn test_destroy_queue() {
        let mut h = harness(PacerConfig::for_testing());
        for key in [A, B, C] {
            h.pacer.create_queue(key).unwrap();
        }
        h.pacer.push(B, IoRequest::new(1024, 0)).unwrap();

        h.pacer.destroy_queue(B).unwrap();
        assert_eq!(h.pacer.num_queues(), 2);
        assert_eq!(h.pacer.num_ios(), 0);

        // Remaining queues keep their order.
        let keys: Vec<DriveKey> = h.pacer.queue_depths().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![A, C]);
    }

    #[test]
    fn test_destroy_unknown_queue() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.create_queue(A).unwrap();

        let result = h.pacer.destroy_queue(B);
        assert!(matches!(result, Err(FlowError::QueueNotFound { .. })));
        assert_eq!(h.pacer.num_queues(), 1);
    }

    #[test]
    fn test_cursor_renormalized_after_destroy_queue() {
        let config = PacerConfig::new(1_000, 1024, 2);
        let mut h = harness(config);
        for key in [A, B, C] {
            h.pacer.push(key, IoRequest::new(1024, 0)).unwrap();
        }

        // Serve A and B; cursor now points at C (index 2).
        h.clock.advance(1_000);
        h.pacer.poll();
        h.clock.advance(1_000);
        h.pacer.poll();
        assert_eq!(h.pacer.next_queue(), 2);

        h.pacer.destroy_queue(A).unwrap();
        h.pacer.push(B, IoRequest::new(1024, 1)).unwrap();

        // Cursor 2 wraps to index 0 of [B, C].
        h.clock.advance(1_000);
        assert_eq!(h.pacer.poll(), 1);
        assert_eq!(h.log.lock().unwrap().last().copied(), Some((B, 1)));
    }

    #[test]
    fn test_drain_queue() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 1)).unwrap();
        h.pacer.push(B, IoRequest::new(1024, 2)).unwrap();

        let drained = h.pacer.drain_queue(A).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(h.pacer.num_ios(), 1);
        assert_eq!(h.pacer.queue_len(A), Some(0));
    }

    #[test]
    fn test_destroy_with_queued_entries() {
        let mut h = harness(PacerConfig::for_testing());
        h.pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        h.pacer.push(A, IoRequest::new(1024, 1)).unwrap();
        h.pacer.create_queue(B).unwrap();
        h.pacer.push(C, IoRequest::new(1024, 2)).unwrap();

        let report = h.pacer.destroy();
        assert_eq!(report.abandoned_queues, vec![A, C]);
        assert_eq!(report.abandoned_entries, 3);
    }

    #[test]
    fn test_dispatch_context() {
        let clock = Arc::new(ManualClock::nanos());
        let registry = DriveStatsRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut pacer = Pacer::new(
            PacerConfig::for_testing(),
            clock.clone(),
            registry.clone(),
            move |d: Dispatched<IoRequest<u32>>| {
                // The transport issues the operation.
                d.drive.add(1);
                *sink.lock().unwrap() = Some((d.pacer, d.key));
            },
        )
        .unwrap();

        pacer.push(A, IoRequest::new(1024, 0)).unwrap();
        clock.advance(1_000);
        pacer.poll();

        assert_eq!(*seen.lock().unwrap(), Some((pacer.id(), A)));
        assert_eq!(registry.ops_in_flight(A), Some(1));
    }

    #[test]
    fn test_pacer_ids_are_unique() {
        let a = harness(PacerConfig::for_testing());
        let b = harness(PacerConfig::for_testing());
        assert_ne!(a.pacer.id(), b.pacer.id());
    }
}
