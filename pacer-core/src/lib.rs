//! Pacer Core - Strongly-typed identifiers, tick source and limits for the I/O pacer.
//!
//! This crate holds the small vocabulary shared by every other pacer crate:
//!
//! - **Identifiers**: `DriveKey` names a destination (drive or target),
//!   `PacerId` names a pacer instance.
//! - **Tick source**: the `Clock` trait is the injected monotonic counter the
//!   pacer reads on every poll. `MonotonicClock` is backed by `Instant`,
//!   `ManualClock` is advanced explicitly for deterministic tests.
//! - **Limits**: explicit defaults for queue array growth, registry capacity
//!   and tuner period ranges.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: a `DriveKey` can't be passed where a `PacerId` is expected
//! - **Explicit limits**: every table and range has a named bound
//! - **Injected time**: nothing in the scheduling core reads the system clock directly
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod clock;
mod error;
mod limits;
mod types;

pub use clock::{ns_to_ticks, ticks_to_ns, Clock, ManualClock, MonotonicClock, NSEC_PER_SEC};
pub use error::{Error, Result};
pub use limits::{Limits, DEFAULT_DRIVE_STATS_CAPACITY, DEFAULT_QUEUE_CAPACITY};
pub use types::{DriveKey, PacerId};
