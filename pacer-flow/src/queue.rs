//! Per-destination FIFO queues.
//!
//! Each queue holds the entries waiting for one destination, in push order,
//! together with a handle to that destination's shared in-flight counter.
//! Entries are opaque to the pacer apart from the size they charge against
//! the rate credit.

use std::collections::VecDeque;
use std::sync::Arc;

use pacer_core::DriveKey;

use crate::registry::DriveStats;

/// Something that can be queued in a pacer.
pub trait PacedEntry {
    /// Size charged against the rate credit when the entry is admitted, in
    /// the caller's unit (usually bytes).
    fn size(&self) -> u64;
}

/// A ready-made entry: a payload tagged with its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoRequest<T> {
    /// Request size in bytes.
    pub size_bytes: u64,

    /// The request payload.
    pub payload: T,
}

impl<T> IoRequest<T> {
    /// Creates a request.
    #[must_use]
    pub const fn new(size_bytes: u64, payload: T) -> Self {
        Self {
            size_bytes,
            payload,
        }
    }
}

impl<T> PacedEntry for IoRequest<T> {
    fn size(&self) -> u64 {
        self.size_bytes
    }
}

impl<T: PacedEntry + ?Sized> PacedEntry for Box<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }
}

/// The queue for one destination.
#[derive(Debug)]
pub struct DriveQueue<E> {
    /// Destination identity.
    key: DriveKey,

    /// Shared in-flight counter for the destination. Owned by the registry.
    stats: Arc<DriveStats>,

    /// Pending entries, oldest first.
    entries: VecDeque<E>,
}

impl<E> DriveQueue<E> {
    /// Creates an empty queue bound to a destination's statistics.
    #[must_use]
    pub const fn new(key: DriveKey, stats: Arc<DriveStats>) -> Self {
        Self {
            key,
            stats,
            entries: VecDeque::new(),
        }
    }

    /// Returns the destination key.
    #[must_use]
    pub const fn key(&self) -> DriveKey {
        self.key
    }

    /// Returns the destination's shared statistics.
    #[must_use]
    pub const fn stats(&self) -> &Arc<DriveStats> {
        &self.stats
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether the destination has more than `disk_credit` operations in flight.
    #[must_use]
    pub fn is_throttled(&self, disk_credit: u32) -> bool {
        i64::from(self.stats.ops_in_flight()) > i64::from(disk_credit)
    }

    /// Appends an entry at the tail.
    pub fn push(&mut self, entry: E) {
        self.entries.push_back(entry);
    }

    /// Removes the entry at the head.
    pub fn pop(&mut self) -> Option<E> {
        self.entries.pop_front()
    }

    /// Removes all pending entries, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        self.entries.drain(..).collect()
    }
}
