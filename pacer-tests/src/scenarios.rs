//! Reusable test scenarios for pacer simulation.
//!
//! Scenarios drive a pacer with a `ManualClock` and a seeded random
//! producer and transport, so every run is reproducible from its seed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use pacer_core::{DriveKey, ManualClock};
use pacer_flow::{
    Dispatched, DriveStats, DriveStatsRegistry, IoRequest, Pacer, PacerConfig, Tuner,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::properties::{DispatchRecord, PropertyChecker};

/// Standard pacer configurations.
pub mod pacers {
    use pacer_flow::PacerConfig;

    /// 1 us period, 4 KiB per period, two operations in flight per drive.
    #[must_use]
    pub const fn small() -> PacerConfig {
        PacerConfig::new(1_000, 4096, 2)
    }

    /// 10 us period, 128 KiB per period, 32 operations in flight per drive.
    #[must_use]
    pub const fn large() -> PacerConfig {
        PacerConfig::new(10_000, 128 * 1024, 32)
    }
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to test in CI.
    pub const CI_SEED_COUNT: u32 = 100;
}

/// Payload carried by simulated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Destination the entry was pushed to.
    pub key: DriveKey,
    /// Per-destination push sequence number.
    pub seq: u64,
}

/// Entry type used by simulations.
pub type SimEntry = IoRequest<Tag>;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Random seed.
    pub seed: u64,
    /// Pacer configuration.
    pub pacer: PacerConfig,
    /// Number of destinations.
    pub drives: u64,
    /// Number of simulation steps.
    pub steps: u64,
    /// Largest entry size. Sizes are uniform in `[1, max_entry_bytes]`.
    pub max_entry_bytes: u64,
    /// Most entries pushed per step.
    pub max_pushes_per_step: u32,
    /// Chance that an in-flight operation completes on a given step.
    pub completion_probability: f64,
    /// Chance that a step drains a random queue instead of pushing.
    pub drain_probability: f64,
}

impl SimulationConfig {
    /// Creates a configuration for `seed` with default workload parameters.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            pacer: pacers::small(),
            drives: 4,
            steps: 2_000,
            max_entry_bytes: 2048,
            max_pushes_per_step: 4,
            completion_probability: 0.5,
            drain_probability: 0.0,
        }
    }

    /// Sets the pacer configuration.
    #[must_use]
    pub const fn with_pacer(mut self, pacer: PacerConfig) -> Self {
        self.pacer = pacer;
        self
    }

    /// Sets the number of steps.
    #[must_use]
    pub const fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the number of destinations.
    #[must_use]
    pub const fn with_drives(mut self, drives: u64) -> Self {
        self.drives = drives;
        self
    }

    /// Sets the operation completion probability.
    #[must_use]
    pub const fn with_completion_probability(mut self, probability: f64) -> Self {
        self.completion_probability = probability;
        self
    }

    /// Sets the queue drain probability.
    #[must_use]
    pub const fn with_drain_probability(mut self, probability: f64) -> Self {
        self.drain_probability = probability;
        self
    }
}

/// An operation issued by the simulated transport.
#[derive(Debug)]
struct InFlight {
    drive: Arc<DriveStats>,
}

/// Dispatched entries waiting to be picked up by the simulation.
type DispatchLog = Arc<Mutex<Vec<(DispatchRecord, Arc<DriveStats>)>>>;

/// Outcome of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Entries pushed.
    pub pushed: u64,
    /// Entries dispatched.
    pub dispatched: u64,
    /// Entries removed by draining.
    pub drained: u64,
    /// Entries still queued at the end.
    pub queued: u64,
    /// Bytes dispatched.
    pub bytes: u64,
}

/// A pacer wired to a seeded producer and transport.
pub struct PacerSimulation {
    config: SimulationConfig,
    rng: ChaCha8Rng,
    clock: Arc<ManualClock>,
    registry: DriveStatsRegistry,
    pacer: Pacer<SimEntry>,
    tuner: Option<Tuner>,
    log: DispatchLog,
    in_flight: Vec<InFlight>,
    next_seq: BTreeMap<DriveKey, u64>,
    checker: PropertyChecker,
    report: SimulationReport,
}

impl PacerSimulation {
    /// Creates a simulation.
    ///
    /// # Panics
    ///
    /// Panics if the pacer configuration is invalid.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let clock = Arc::new(ManualClock::nanos());
        let registry = DriveStatsRegistry::new();
        let log: DispatchLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);

        let pacer = Pacer::new(
            config.pacer.clone(),
            clock.clone(),
            registry.clone(),
            move |d: Dispatched<SimEntry>| {
                // The transport issues the operation as soon as it gets it.
                let ops_in_flight = d.drive.ops_in_flight();
                d.drive.add(1);
                let record = DispatchRecord {
                    key: d.key,
                    seq: d.entry.payload.seq,
                    size: d.entry.size_bytes,
                    ops_in_flight,
                };
                sink.lock().expect("dispatch log poisoned").push((record, d.drive));
            },
        )
        .expect("valid pacer configuration");

        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            clock,
            registry,
            pacer,
            tuner: None,
            log,
            in_flight: Vec::new(),
            next_seq: BTreeMap::new(),
            checker: PropertyChecker::new(),
            report: SimulationReport::default(),
        }
    }

    /// Attaches a tuner fired through `maybe_fire` after every poll.
    #[must_use]
    pub fn with_tuner(mut self, make: impl FnOnce(&Pacer<SimEntry>) -> Tuner) -> Self {
        self.tuner = Some(make(&self.pacer));
        self
    }

    /// Returns the pacer.
    #[must_use]
    pub const fn pacer(&self) -> &Pacer<SimEntry> {
        &self.pacer
    }

    /// Returns the registry shared with the simulated transport.
    #[must_use]
    pub const fn registry(&self) -> &DriveStatsRegistry {
        &self.registry
    }

    /// Returns the property checker.
    #[must_use]
    pub const fn checker(&self) -> &PropertyChecker {
        &self.checker
    }

    /// Runs every configured step and returns the report.
    pub fn run(&mut self) -> SimulationReport {
        for _ in 0..self.config.steps {
            self.step();
        }
        self.report()
    }

    /// Returns the report so far.
    #[must_use]
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            queued: self.pacer.num_ios(),
            bytes: self.pacer.stats().bytes,
            ..self.report.clone()
        }
    }

    /// Runs one step: produce, advance time, poll, complete, check.
    pub fn step(&mut self) {
        if self.rng.gen_bool(self.config.drain_probability) {
            self.drain_random_queue();
        } else {
            self.produce();
        }

        let period = self.pacer.period_ticks().max(1);
        let advance = self.rng.gen_range(0..=2 * period);
        self.clock.advance(advance);

        self.pacer.poll();
        if let Some(tuner) = self.tuner.as_mut() {
            tuner.maybe_fire(&mut self.pacer);
        }

        self.collect_dispatches();
        self.complete();

        self.checker
            .check_pacer(&self.pacer, self.config.max_entry_bytes);
    }

    fn random_key(&mut self) -> DriveKey {
        DriveKey::new(self.rng.gen_range(0..self.config.drives))
    }

    fn produce(&mut self) {
        let pushes = self.rng.gen_range(0..=self.config.max_pushes_per_step);
        for _ in 0..pushes {
            let key = self.random_key();
            let size = self.rng.gen_range(1..=self.config.max_entry_bytes);
            let seq = self.next_seq.entry(key).or_insert(0);
            let entry = IoRequest::new(size, Tag { key, seq: *seq });
            *seq += 1;

            self.pacer.push(key, entry).expect("push with auto-create");
            self.report.pushed += 1;
        }
    }

    fn drain_random_queue(&mut self) {
        let key = self.random_key();
        if let Ok(drained) = self.pacer.drain_queue(key) {
            self.report.drained += drained.len() as u64;
            let next = self.next_seq.get(&key).copied().unwrap_or(0);
            self.checker.skip_to(key, next);
        }
    }

    fn collect_dispatches(&mut self) {
        let records = std::mem::take(&mut *self.log.lock().expect("dispatch log poisoned"));
        for (record, drive) in records {
            self.checker
                .record_dispatch(&record, self.config.pacer.disk_credit);
            self.report.dispatched += 1;
            self.in_flight.push(InFlight { drive });
        }
    }

    fn complete(&mut self) {
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.rng.gen_bool(self.config.completion_probability) {
                let op = self.in_flight.swap_remove(i);
                op.drive.sub(1);
            } else {
                i += 1;
            }
        }
    }
}

impl std::fmt::Debug for PacerSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacerSimulation")
            .field("seed", &self.config.seed)
            .field("pacer", &self.pacer)
            .field("in_flight", &self.in_flight.len())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
