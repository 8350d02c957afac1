//! Pacer Tests - simulation and integration tests for the I/O pacer.
//!
//! This crate contains the cross-crate tests for the pacer. Tests are
//! organized by type:
//!
//! ## Test Organization
//!
//! **Simulation Tests** (`simulation_tests`): Deterministic, `ManualClock` driven
//! - Scenario tests for round-robin order, admission skip and period accounting
//! - Seeded random workloads checked against the pacer properties
//!
//! **Integration Tests** (`driver_tests`): tokio drivers on a real clock
//!
//! **Support Modules**:
//! - `properties`: Property definitions (`CreditOutOfBounds`, `FifoOrder`, etc.)
//! - `scenarios`: Reusable pacer configurations, seeds and the seeded simulation
//!
//! ## Naming Conventions
//!
//! - Simulation tests: `test_sim_<scenario>` or `test_pacer_<scenario>`
//! - Integration tests: `test_driver_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;



/// Installs a test log subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Another test may have installed it already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
