//! I/O admission control and pacing.
//!
//! This crate schedules opaque I/O entries onto many destinations (drives)
//! under two limits at once:
//!
//! - **Rate credit**: a global budget, in bytes or operations, released once
//!   per period and shared by every destination.
//! - **Disk credit**: a per-destination cap on operations in flight. A drive
//!   over its cap is skipped so healthier drives can use the rate credit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Pacer                                │
//! │                                                                 │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐   │
//! │  │ DriveQueues  │───▶│ round-robin poll │───▶│   pop_cb     │   │
//! │  │ (per drive)  │    │ (credit, admit)  │    │ (Dispatched) │   │
//! │  └──────┬───────┘    └────────▲─────────┘    └──────────────┘   │
//! │         │                     │ period                          │
//! │  ┌──────▼──────────────┐   ┌──┴────┐                            │
//! │  │ DriveStatsRegistry  │   │ Tuner │                            │
//! │  │ (ops in flight)     │   └───────┘                            │
//! │  └─────────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # DST Compatibility
//!
//! Time comes from an injected [`pacer_core::Clock`]. Tests use a
//! [`pacer_core::ManualClock`] and advance it explicitly.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pacer_core::{DriveKey, ManualClock};
//! use pacer_flow::{Dispatched, DriveStatsRegistry, IoRequest, Pacer, PacerConfig};
//!
//! let clock = Arc::new(ManualClock::nanos());
//! let mut pacer = Pacer::new(
//!     PacerConfig::for_testing(),
//!     clock.clone(),
//!     DriveStatsRegistry::new(),
//!     |dispatched: Dispatched<IoRequest<&str>>| {
//!         // Issue the operation...
//!         dispatched.drive.add(1);
//!     },
//! )
//! .unwrap();
//!
//! pacer.push(DriveKey::new(7), IoRequest::new(4096, "write")).unwrap();
//!
//! clock.advance(1_000);
//! assert_eq!(pacer.poll(), 1);
//! ```

#![warn(missing_docs)]

pub mod credit;
pub mod error;
pub mod pacer;
pub mod queue;
pub mod registry;
pub mod tuner;

// Re-export main types for convenience.
pub use credit::CreditBucket;
pub use error::{FlowError, FlowResult};
pub use pacer::{
    CreditUnit, DestroyReport, Dispatched, Pacer, PacerConfig, PacerStats, PopCallback,
};
pub use queue::{DriveQueue, IoRequest, PacedEntry};
pub use registry::{DriveStats, DriveStatsRegistry};
pub use tuner::{
    Adjustment, SignalPolicy, SignalTunerConfig, ThroughputPolicy, ThroughputTunerConfig, Tuner,
    TunerInput, TunerStats, TuningPolicy,
};
