//! Period tuning.
//!
//! A tuner runs on its own timer next to a pacer and rewrites the pacer's
//! period from observed feedback. Two policies are provided:
//!
//! 1. **Throughput**: measures how much was dispatched since the last firing
//!    and sets the period one step shorter than the period that rate implies,
//!    moving at most one step per firing.
//! 2. **Signal**: reads an externally owned value (a backlog or depth counter
//!    maintained by the transport) and maps it linearly onto the period, with
//!    no smoothing.
//!
//! The tuner never holds the pacer. Whoever drives both passes `&mut Pacer`
//! to `fire`, so dropping a tuner leaves the pacer at its last tuned period.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pacer_core::{ns_to_ticks, ticks_to_ns, PacerId};
use tracing::info;

use crate::error::{FlowError, FlowResult};
use crate::pacer::{CreditUnit, Pacer, PacerStats};

/// Configuration for the throughput tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputTunerConfig {
    /// Interval between firings, in microseconds. Zero leaves the tuner disarmed.
    pub period_us: u64,

    /// Largest change applied to the pacer period per firing, in nanoseconds.
    pub step_ns: u64,
}

impl ThroughputTunerConfig {
    /// Creates a new throughput tuner configuration.
    #[must_use]
    pub const fn new(period_us: u64, step_ns: u64) -> Self {
        Self { period_us, step_ns }
    }

    /// Creates a configuration that never fires.
    #[must_use]
    pub const fn disarmed() -> Self {
        Self::new(0, 0)
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self::new(1, 100)
    }
}

impl Default for ThroughputTunerConfig {
    fn default() -> Self {
        Self::new(1_000, 500)
    }
}

/// Configuration for the signal tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalTunerConfig {
    /// Interval between firings, in microseconds. Zero leaves the tuner disarmed.
    pub period_us: u64,

    /// Signal values at or below this keep the pacer at its base period.
    pub min_threshold: u64,

    /// Period added per unit of signal above the threshold, in nanoseconds.
    pub factor_ns: u64,
}

impl SignalTunerConfig {
    /// Creates a new signal tuner configuration.
    #[must_use]
    pub const fn new(period_us: u64, min_threshold: u64, factor_ns: u64) -> Self {
        Self {
            period_us,
            min_threshold,
            factor_ns,
        }
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self::new(1, 4, 250)
    }
}

impl Default for SignalTunerConfig {
    fn default() -> Self {
        Self::new(1_000, 0, 1_000)
    }
}

/// What a tuning policy sees when it fires.
#[derive(Debug, Clone, Copy)]
pub struct TunerInput {
    /// Pacer counters at firing time.
    pub stats: PacerStats,
    /// Per-period budget.
    pub credit: i64,
    /// Unit the budget is expressed in.
    pub credit_unit: CreditUnit,
    /// Pacer period at creation, the lower bound for every policy.
    pub base_period_ticks: u64,
    /// Tick frequency of the pacer's clock.
    pub ticks_hz: u64,
}

impl TunerInput {
    /// Captures the input for `pacer`.
    #[must_use]
    pub fn from_pacer<E>(pacer: &Pacer<E>) -> Self {
        Self {
            stats: pacer.stats(),
            credit: pacer.credit(),
            credit_unit: pacer.config().credit_unit,
            base_period_ticks: pacer.base_period_ticks(),
            ticks_hz: pacer.clock().ticks_hz(),
        }
    }

    /// Returns the current pacer period in ticks.
    #[must_use]
    pub const fn period_ticks(&self) -> u64 {
        self.stats.period_ticks
    }
}

/// A policy's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    /// New pacer period, already clamped.
    pub period_ticks: u64,
    /// The feedback value the decision was based on.
    pub observed: u64,
    /// Unclamped target period, in nanoseconds.
    pub target_ns: u64,
}

/// Computes a new pacer period from feedback.
pub trait TuningPolicy: Send + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Called once when the tuner is created, before the first firing.
    fn reset(&mut self, _input: &TunerInput) {}

    /// Computes the next period.
    fn adjust(&mut self, input: &TunerInput) -> Adjustment;
}

/// Throughput feedback.
///
/// Each firing divides the tuner period by the number of credit-sized units
/// dispatched since the previous firing, giving the period the pacer actually
/// achieved per unit. The new period targets one step below that and is
/// limited to one step away from the current period.
#[derive(Debug, Clone)]
pub struct ThroughputPolicy {
    tuner_period_ns: u64,
    step_ns: u64,
    max_period_factor: u32,
    last_consumed: u64,
}

impl ThroughputPolicy {
    /// Creates a throughput policy.
    #[must_use]
    pub const fn new(tuner_period_ns: u64, step_ns: u64, max_period_factor: u32) -> Self {
        Self {
            tuner_period_ns,
            step_ns,
            max_period_factor,
            last_consumed: 0,
        }
    }
}

impl TuningPolicy for ThroughputPolicy {
    fn name(&self) -> &'static str {
        "throughput"
    }

    fn reset(&mut self, input: &TunerInput) {
        self.last_consumed = input.stats.consumed(input.credit_unit);
    }

    fn adjust(&mut self, input: &TunerInput) -> Adjustment {
        let consumed = input.stats.consumed(input.credit_unit);
        let delta = consumed.saturating_sub(self.last_consumed);
        self.last_consumed = consumed;

        let credit = u64::try_from(input.credit).unwrap_or(1).max(1);
        let units = (delta / credit).max(1);
        let io_period_ns = self.tuner_period_ns / units;

        // One step shorter than measured, but never more than one step away.
        let cur_period_ns = ticks_to_ns(input.period_ticks(), input.ticks_hz);
        let target_ns = io_period_ns.saturating_sub(self.step_ns);
        let new_period_ns = target_ns.clamp(
            cur_period_ns.saturating_sub(self.step_ns),
            cur_period_ns.saturating_add(self.step_ns),
        );

        let min = input.base_period_ticks;
        let max = min.saturating_mul(u64::from(self.max_period_factor));
        Adjustment {
            period_ticks: ns_to_ticks(new_period_ns, input.ticks_hz).clamp(min, max),
            observed: delta,
            target_ns,
        }
    }
}

/// External signal feedback.
///
/// `period = (value - min_threshold) * factor_ns + base`, capped at the
/// maximum. Reacts immediately to every change of the signal.
#[derive(Debug, Clone)]
pub struct SignalPolicy {
    signal: Arc<AtomicU64>,
    min_threshold: u64,
    factor_ns: u64,
    max_period_factor: u32,
}

impl SignalPolicy {
    /// Creates a signal policy reading `signal`.
    #[must_use]
    pub const fn new(
        signal: Arc<AtomicU64>,
        min_threshold: u64,
        factor_ns: u64,
        max_period_factor: u32,
    ) -> Self {
        Self {
            signal,
            min_threshold,
            factor_ns,
            max_period_factor,
        }
    }
}

impl TuningPolicy for SignalPolicy {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn adjust(&mut self, input: &TunerInput) -> Adjustment {
        let value = self.signal.load(Ordering::Acquire);
        let min = input.base_period_ticks;
        let max = min.saturating_mul(u64::from(self.max_period_factor));

        if value <= self.min_threshold {
            return Adjustment {
                period_ticks: min,
                observed: value,
                target_ns: ticks_to_ns(min, input.ticks_hz),
            };
        }

        let excess_ns = (value - self.min_threshold).saturating_mul(self.factor_ns);
        let period_ticks = ns_to_ticks(excess_ns, input.ticks_hz)
            .saturating_add(min)
            .min(max);
        Adjustment {
            period_ticks,
            observed: value,
            target_ns: excess_ns.saturating_add(ticks_to_ns(min, input.ticks_hz)),
        }
    }
}

/// Tuner statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunerStats {
    /// Number of firings.
    pub fires: u64,
    /// Firings that lengthened the period.
    pub increases: u64,
    /// Firings that shortened the period.
    pub decreases: u64,
}

/// Adjusts a pacer's period on its own timer.
pub struct Tuner {
    /// Pacer this tuner was created for.
    pacer: PacerId,

    /// Feedback policy.
    policy: Box<dyn TuningPolicy>,

    /// Interval between firings; zero when disarmed.
    period_ns: u64,

    /// Interval between firings in pacer ticks.
    period_ticks: u64,

    /// Tick of the last firing (creation tick before the first).
    last_fire_tick: u64,

    /// Tick of the last log line.
    last_log_tick: Option<u64>,

    /// Statistics.
    stats: TunerStats,
}

impl Tuner {
    /// Creates a tuner with a custom policy.
    ///
    /// # Arguments
    ///
    /// * `pacer` - The pacer to tune. Only read here.
    /// * `period_us` - Interval between firings. Zero creates a disarmed tuner.
    /// * `policy` - Feedback policy.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if the pacer has a zero base period,
    /// which leaves nothing to tune.
    pub fn with_policy<E>(
        pacer: &Pacer<E>,
        period_us: u64,
        mut policy: Box<dyn TuningPolicy>,
    ) -> FlowResult<Self> {
        if period_us > 0 && pacer.base_period_ticks() == 0 {
            return Err(FlowError::InvalidConfig {
                message: "cannot tune a pacer with a zero period".to_string(),
            });
        }

        let input = TunerInput::from_pacer(pacer);
        policy.reset(&input);

        let period_ns = period_us.saturating_mul(1_000);
        let period_ticks = ns_to_ticks(period_ns, input.ticks_hz);

        if period_ns > 0 {
            info!(
                pacer = %pacer.id(),
                policy = policy.name(),
                tuner_period_ns = period_ns,
                "Created IO pacer tuner"
            );
        }

        Ok(Self {
            pacer: pacer.id(),
            policy,
            period_ns,
            period_ticks,
            last_fire_tick: pacer.clock().ticks(),
            last_log_tick: None,
            stats: TunerStats::default(),
        })
    }

    /// Creates a throughput tuner.
    ///
    /// # Errors
    ///
    /// See [`Tuner::with_policy`].
    pub fn throughput<E>(pacer: &Pacer<E>, config: ThroughputTunerConfig) -> FlowResult<Self> {
        let policy = ThroughputPolicy::new(
            config.period_us.saturating_mul(1_000),
            config.step_ns,
            pacer.config().limits.throughput_max_period_factor,
        );
        Self::with_policy(pacer, config.period_us, Box::new(policy))
    }

    /// Creates a signal tuner reading `signal`.
    ///
    /// # Errors
    ///
    /// See [`Tuner::with_policy`].
    pub fn signal<E>(
        pacer: &Pacer<E>,
        config: SignalTunerConfig,
        signal: Arc<AtomicU64>,
    ) -> FlowResult<Self> {
        let policy = SignalPolicy::new(
            signal,
            config.min_threshold,
            config.factor_ns,
            pacer.config().limits.signal_max_period_factor,
        );
        Self::with_policy(pacer, config.period_us, Box::new(policy))
    }

    /// Returns true if the tuner fires at all.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.period_ns > 0
    }

    /// Returns the interval between firings in nanoseconds.
    #[must_use]
    pub const fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Returns the tuner statistics.
    #[must_use]
    pub const fn stats(&self) -> TunerStats {
        self.stats
    }

    /// Fires if the tuner period has elapsed on the pacer's clock.
    ///
    /// # Returns
    ///
    /// The new pacer period in ticks, or `None` if the tuner didn't fire.
    pub fn maybe_fire<E>(&mut self, pacer: &mut Pacer<E>) -> Option<u64> {
        if !self.is_armed() {
            return None;
        }

        let now = pacer.clock().ticks();
        if now.saturating_sub(self.last_fire_tick) < self.period_ticks {
            return None;
        }
        self.fire(pacer)
    }

    /// Fires now.
    ///
    /// # Returns
    ///
    /// The new pacer period in ticks, or `None` if the tuner is disarmed.
    pub fn fire<E>(&mut self, pacer: &mut Pacer<E>) -> Option<u64> {
        if !self.is_armed() {
            return None;
        }
        debug_assert_eq!(pacer.id(), self.pacer, "tuner fired against another pacer");

        let input = TunerInput::from_pacer(pacer);
        let old_period_ticks = input.period_ticks();
        let adjustment = self.policy.adjust(&input);

        let now = pacer.clock().ticks();
        self.last_fire_tick = now;
        self.stats.fires += 1;
        if adjustment.period_ticks > old_period_ticks {
            self.stats.increases += 1;
        } else if adjustment.period_ticks < old_period_ticks {
            self.stats.decreases += 1;
        }

        let log_due = self
            .last_log_tick
            .is_none_or(|last| now.saturating_sub(last) >= input.ticks_hz);
        if log_due {
            self.last_log_tick = Some(now);
            info!(
                pacer = %self.pacer,
                policy = self.policy.name(),
                observed = adjustment.observed,
                target_ns = adjustment.target_ns,
                period_ticks = adjustment.period_ticks,
                min = input.base_period_ticks,
                "IO pacer tuner"
            );
        }

        pacer.set_period_ticks(adjustment.period_ticks);
        Some(adjustment.period_ticks)
    }
}

impl fmt::Debug for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuner")
            .field("pacer", &self.pacer)
            .field("policy", &self.policy)
            .field("period_ns", &self.period_ns)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
