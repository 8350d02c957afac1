//! Pacer Runtime - tokio tick source for the I/O pacer.
//!
//! A pacer does nothing on its own: something has to call `poll()` at least
//! once per period. This crate provides that driver as a tokio task.
//!
//! # Overview
//!
//! The runtime provides:
//! - `DriverConfig`: Poll cadence and command channel sizing
//! - `PacerDriver`: Owns a pacer and optional tuner, ticks both
//! - `PacerHandle`: Cloneable handle producers use to reach the pacer
//!
//! # Example
//!
//! ```ignore
//! use pacer_runtime::{DriverConfig, PacerDriver};
//!
//! let driver = PacerDriver::new(pacer, DriverConfig::default())?;
//! let (handle, task) = driver.spawn()?;
//!
//! handle.push(DriveKey::new(1), IoRequest::new(4096, request)).await?;
//!
//! handle.shutdown().await?;
//! let pacer = task.await?;
//! pacer.destroy();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod driver;
mod error;

pub use config::{ConfigError, DriverConfig, PollMode};
pub use driver::{PacerCommand, PacerDriver, PacerHandle, PacerSnapshot};
pub use error::DriverError;
