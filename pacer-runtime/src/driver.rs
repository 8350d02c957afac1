//! Pacer driver.
//!
//! The `PacerDriver` is the tick source for one pacer. It owns the pacer (and
//! optionally a tuner) inside a single tokio task and:
//! - Invokes `poll()` on every timer tick, or on every scheduler turn in busy mode
//! - Fires the tuner on its own timer
//! - Applies producer commands received through a `PacerHandle`
//!
//! # Execution Model
//!
//! Everything that touches the pacer runs on the driver task, one select arm
//! at a time. Producers never lock the pacer: they send commands.
//!
//! # Shutdown
//!
//! `PacerHandle::shutdown` (or dropping every handle) stops the loop. The task
//! then returns the pacer so the caller can inspect it and `destroy` it.

use std::future::Future;
use std::time::Duration;

use pacer_core::DriveKey;
use pacer_flow::{FlowResult, PacedEntry, Pacer, PacerStats, Tuner, TunerStats};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{DriverConfig, PollMode};
use crate::error::DriverError;

/// Commands that can be sent to a pacer driver.
#[derive(Debug)]
pub enum PacerCommand<E> {
    /// Queue an entry.
    Push {
        /// Destination.
        key: DriveKey,
        /// The entry.
        entry: E,
        /// Channel to send the result.
        response: oneshot::Sender<FlowResult<()>>,
    },
    /// Create a queue.
    CreateQueue {
        /// Destination.
        key: DriveKey,
        /// Channel to send the result.
        response: oneshot::Sender<FlowResult<()>>,
    },
    /// Destroy a queue.
    DestroyQueue {
        /// Destination.
        key: DriveKey,
        /// Channel to send the result.
        response: oneshot::Sender<FlowResult<()>>,
    },
    /// Remove a queue's entries without dispatching them.
    DrainQueue {
        /// Destination.
        key: DriveKey,
        /// Channel to send the drained entries.
        response: oneshot::Sender<FlowResult<Vec<E>>>,
    },
    /// Read the pacer's counters.
    Stats {
        /// Channel to send the snapshot.
        response: oneshot::Sender<PacerSnapshot>,
    },
    /// Stop the driver.
    Shutdown,
}

/// Point-in-time view of a driven pacer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacerSnapshot {
    /// Pacer counters.
    pub stats: PacerStats,
    /// Entries queued across all queues.
    pub num_ios: u64,
    /// Number of queues.
    pub num_queues: usize,
    /// Budget left in the current period.
    pub remaining_credit: i64,
    /// Tuner counters, if a tuner is attached.
    pub tuner: Option<TunerStats>,
}

/// Handle to interact with a running pacer driver.
pub struct PacerHandle<E> {
    /// Command sender.
    commands: mpsc::Sender<PacerCommand<E>>,
}

impl<E> Clone for PacerHandle<E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<E> std::fmt::Debug for PacerHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacerHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl<E> PacerHandle<E> {
    /// Queues `entry` for `key`.
    ///
    /// # Errors
    /// Returns an error if the driver is gone or the queue is unavailable.
    pub async fn push(&self, key: DriveKey, entry: E) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::Push {
            key,
            entry,
            response: tx,
        })
        .await?;
        Self::recv(rx).await?.map_err(DriverError::from)
    }

    /// Creates the queue for `key`.
    ///
    /// # Errors
    /// Returns an error if the driver is gone or the queue can't be created.
    pub async fn create_queue(&self, key: DriveKey) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::CreateQueue { key, response: tx })
            .await?;
        Self::recv(rx).await?.map_err(DriverError::from)
    }

    /// Destroys the queue for `key`.
    ///
    /// # Errors
    /// Returns an error if the driver is gone or there is no such queue.
    pub async fn destroy_queue(&self, key: DriveKey) -> Result<(), DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::DestroyQueue { key, response: tx })
            .await?;
        Self::recv(rx).await?.map_err(DriverError::from)
    }

    /// Removes and returns every entry queued for `key`.
    ///
    /// # Errors
    /// Returns an error if the driver is gone or there is no such queue.
    pub async fn drain_queue(&self, key: DriveKey) -> Result<Vec<E>, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::DrainQueue { key, response: tx })
            .await?;
        Self::recv(rx).await?.map_err(DriverError::from)
    }

    /// Returns a snapshot of the pacer's counters.
    ///
    /// # Errors
    /// Returns an error if the driver is gone.
    pub async fn stats(&self) -> Result<PacerSnapshot, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send(PacerCommand::Stats { response: tx }).await?;
        Self::recv(rx).await
    }

    /// Requests the driver to shut down.
    ///
    /// # Errors
    /// Returns an error if the driver is gone.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.send(PacerCommand::Shutdown).await
    }

    async fn send(&self, command: PacerCommand<E>) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DriverError::Unavailable)
    }

    async fn recv<T>(rx: oneshot::Receiver<T>) -> Result<T, DriverError> {
        rx.await.map_err(|_| DriverError::Unavailable)
    }
}

/// Runs a pacer on a tokio task.
#[derive(Debug)]
pub struct PacerDriver<E> {
    /// Driver configuration.
    config: DriverConfig,
    /// The driven pacer.
    pacer: Pacer<E>,
    /// Optional period tuner.
    tuner: Option<Tuner>,
}

impl<E: PacedEntry + Send + 'static> PacerDriver<E> {
    /// Creates a driver for `pacer`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(pacer: Pacer<E>, config: DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            config,
            pacer,
            tuner: None,
        })
    }

    /// Attaches a tuner.
    #[must_use]
    pub fn with_tuner(mut self, tuner: Tuner) -> Self {
        self.tuner = Some(tuner);
        self
    }

    /// Returns the driver loop without spawning it.
    ///
    /// The future resolves to the pacer once the driver shuts down.
    pub fn run(self) -> (PacerHandle<E>, impl Future<Output = Pacer<E>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_capacity);
        let handle = PacerHandle { commands: cmd_tx };
        (handle, self.run_loop(cmd_rx))
    }

    /// Spawns the driver on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `DriverError::NoRuntime` if called outside a tokio runtime.
    pub fn spawn(self) -> Result<(PacerHandle<E>, JoinHandle<Pacer<E>>), DriverError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DriverError::NoRuntime)?;
        let (handle, future) = self.run();
        Ok((handle, runtime.spawn(future)))
    }

    /// Main driver loop.
    async fn run_loop(mut self, mut commands: mpsc::Receiver<PacerCommand<E>>) -> Pacer<E> {
        let busy = self.config.poll_mode == PollMode::Busy;
        let mut poll_timer = match self.config.poll_mode {
            PollMode::Interval(period) => Some(skipping_interval(period)),
            PollMode::Busy => None,
        };
        let mut tuner_timer = self
            .tuner
            .as_ref()
            .filter(|tuner| tuner.is_armed())
            .map(|tuner| skipping_interval(Duration::from_nanos(tuner.period_ns())));

        info!(
            pacer = %self.pacer.id(),
            poll_mode = ?self.config.poll_mode,
            tuner = tuner_timer.is_some(),
            "Pacer driver started"
        );

        loop {
            tokio::select! {
                // Producer commands.
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        debug!(pacer = %self.pacer.id(), "All pacer handles dropped");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }

                // Timer-driven poll.
                () = next_tick(&mut poll_timer) => {
                    self.pacer.poll();
                }

                // Busy poll: one poll per scheduler turn.
                () = tokio::task::yield_now(), if busy => {
                    self.pacer.poll();
                }

                // Tuner timer.
                () = next_tick(&mut tuner_timer) => {
                    if let Some(tuner) = self.tuner.as_mut() {
                        tuner.fire(&mut self.pacer);
                    }
                }
            }
        }

        info!(pacer = %self.pacer.id(), "Pacer driver shutting down");
        self.pacer
    }

    /// Applies one command. Returns false when the driver should stop.
    fn handle_command(&mut self, cmd: PacerCommand<E>) -> bool {
        match cmd {
            PacerCommand::Push {
                key,
                entry,
                response,
            } => {
                let _ = response.send(self.pacer.push(key, entry));
            }
            PacerCommand::CreateQueue { key, response } => {
                let _ = response.send(self.pacer.create_queue(key));
            }
            PacerCommand::DestroyQueue { key, response } => {
                let _ = response.send(self.pacer.destroy_queue(key));
            }
            PacerCommand::DrainQueue { key, response } => {
                let _ = response.send(self.pacer.drain_queue(key));
            }
            PacerCommand::Stats { response } => {
                let _ = response.send(PacerSnapshot {
                    stats: self.pacer.stats(),
                    num_ios: self.pacer.num_ios(),
                    num_queues: self.pacer.num_queues(),
                    remaining_credit: self.pacer.remaining_credit(),
                    tuner: self.tuner.as_ref().map(Tuner::stats),
                });
            }
            PacerCommand::Shutdown => return false,
        }
        true
    }
}

fn skipping_interval(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

/// Waits for the next tick, or forever if there is no timer.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer.as_mut() {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
