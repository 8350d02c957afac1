//! Drive statistics registry.
//!
//! One in-flight counter per destination, shared by every queue for that
//! destination across every pacer in the process. The transport increments
//! the counter when it issues an operation and decrements it on completion.
//! Pacers only read it, to skip destinations that already have too much
//! outstanding work.
//!
//! The table is created once (first caller wins) and entries are inserted
//! under a write lock with a double-checked lookup. Counters themselves are
//! plain atomics and can be updated from any thread without the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use pacer_core::{DriveKey, DEFAULT_DRIVE_STATS_CAPACITY};
use tracing::{debug, error, info};

use crate::error::{FlowError, FlowResult};

/// Shared statistics for one destination.
#[derive(Debug, Default)]
pub struct DriveStats {
    /// Operations issued to the destination and not yet completed.
    ops_in_flight: AtomicI32,
}

impl DriveStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops_in_flight: AtomicI32::new(0),
        }
    }

    /// Returns the number of operations currently in flight.
    #[must_use]
    pub fn ops_in_flight(&self) -> i32 {
        self.ops_in_flight.load(Ordering::Acquire)
    }

    /// Records `n` operations issued to the destination.
    pub fn add(&self, n: u32) {
        self.ops_in_flight
            .fetch_add(i32::try_from(n).unwrap_or(i32::MAX), Ordering::AcqRel);
    }

    /// Records `n` operations completed by the destination.
    pub fn sub(&self, n: u32) {
        self.ops_in_flight
            .fetch_sub(i32::try_from(n).unwrap_or(i32::MAX), Ordering::AcqRel);
    }
}

/// The backing table, created once per registry.
#[derive(Debug)]
struct DriveTable {
    capacity: usize,
    entries: RwLock<HashMap<DriveKey, Arc<DriveStats>>>,
}

impl DriveTable {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    fn lookup(&self, key: DriveKey) -> Option<Arc<DriveStats>> {
        // A poisoned lock only means another thread panicked mid-insert; the map is still valid.
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).cloned()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle to a drive statistics table.
///
/// Cloning the handle shares the table. `DriveStatsRegistry::global()` returns
/// the process-wide instance; `DriveStatsRegistry::new()` creates an
/// independent one (mostly for tests).
#[derive(Debug, Clone, Default)]
pub struct DriveStatsRegistry {
    table: Arc<OnceLock<DriveTable>>,
}

impl DriveStatsRegistry {
    /// Creates a registry whose table is not set up yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> Self {
        static GLOBAL: OnceLock<DriveStatsRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Creates the backing table with room for `capacity` destinations.
    ///
    /// Idempotent: only the first call allocates, later calls (including
    /// concurrent ones) keep the existing table and its capacity.
    ///
    /// # Returns
    ///
    /// `true` if this call created the table.
    pub fn setup(&self, capacity: usize) -> bool {
        let mut created = false;
        let table = self.table.get_or_init(|| {
            created = true;
            DriveTable::new(capacity)
        });

        if created {
            info!(capacity, "Created drive statistics table");
        } else if table.capacity != capacity {
            debug!(
                requested = capacity,
                capacity = table.capacity,
                "Drive statistics table already set up"
            );
        }
        created
    }

    /// Returns the table capacity, if set up.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.table.get().map(|table| table.capacity)
    }

    /// Returns the number of tracked destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.get().map_or(0, DriveTable::len)
    }

    /// Returns whether no destination is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the statistics for `key` without creating them.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::DriveStatsNotFound` if the key is not tracked or
    /// the table was never set up.
    pub fn get(&self, key: DriveKey) -> FlowResult<Arc<DriveStats>> {
        self.table
            .get()
            .and_then(|table| table.lookup(key))
            .ok_or(FlowError::DriveStatsNotFound { key })
    }

    /// Returns the statistics for `key`, creating a zeroed entry on first use.
    ///
    /// Sets the table up with `DEFAULT_DRIVE_STATS_CAPACITY` if nobody has yet.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::DriveStatsFull` if the key is new and the table is full.
    pub fn get_or_create(&self, key: DriveKey) -> FlowResult<Arc<DriveStats>> {
        let table = self
            .table
            .get_or_init(|| DriveTable::new(DEFAULT_DRIVE_STATS_CAPACITY as usize));

        if let Some(stats) = table.lookup(key) {
            return Ok(stats);
        }

        let mut entries = table.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Someone may have inserted it between our lookup and taking the lock.
        if let Some(stats) = entries.get(&key) {
            return Ok(Arc::clone(stats));
        }

        if entries.len() >= table.capacity {
            error!(key = %key, capacity = table.capacity, "Can't add key to drive statistics");
            return Err(FlowError::DriveStatsFull {
                key,
                capacity: table.capacity,
            });
        }

        let stats = Arc::new(DriveStats::new());
        entries.insert(key, Arc::clone(&stats));
        drop(entries);

        info!(key = %key, "Created drive statistics");
        Ok(stats)
    }

    /// Records `n` operations issued to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is new and the table is full.
    pub fn add(&self, key: DriveKey, n: u32) -> FlowResult<()> {
        self.get_or_create(key)?.add(n);
        Ok(())
    }

    /// Records `n` operations completed by `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is new and the table is full.
    pub fn sub(&self, key: DriveKey, n: u32) -> FlowResult<()> {
        self.get_or_create(key)?.sub(n);
        Ok(())
    }

    /// Returns the in-flight count for `key`, or `None` if it isn't tracked.
    #[must_use]
    pub fn ops_in_flight(&self, key: DriveKey) -> Option<i32> {
        self.get(key).ok().map(|stats| stats.ops_in_flight())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let registry = DriveStatsRegistry::new();
        assert_eq!(registry.capacity(), None);

        assert!(registry.setup(8));
        assert!(!registry.setup(16));

        // First caller's capacity wins.
        assert_eq!(registry.capacity(), Some(8));
    }

    #[test]
    fn test_get_or_create_returns_shared_entry() {
        let registry = DriveStatsRegistry::new();
        registry.setup(8);

        let a = registry.get_or_create(DriveKey::new(1)).unwrap();
        let b = registry.get_or_create(DriveKey::new(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        a.add(3);
        assert_eq!(b.ops_in_flight(), 3);
    }

    #[test]
    fn test_get_or_create_sets_up_default_table() {
        let registry = DriveStatsRegistry::new();
        registry.get_or_create(DriveKey::new(1)).unwrap();

        assert_eq!(
            registry.capacity(),
            Some(DEFAULT_DRIVE_STATS_CAPACITY as usize)
        );
    }

    #[test]
    fn test_get_without_create() {
        let registry = DriveStatsRegistry::new();
        let result = registry.get(DriveKey::new(1));
        assert!(matches!(result, Err(FlowError::DriveStatsNotFound { .. })));

        registry.setup(8);
        let result = registry.get(DriveKey::new(1));
        assert!(matches!(result, Err(FlowError::DriveStatsNotFound { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_sub() {
        let registry = DriveStatsRegistry::new();
        let key = DriveKey::new(42);

        registry.add(key, 5).unwrap();
        registry.sub(key, 2).unwrap();
        assert_eq!(registry.ops_in_flight(key), Some(3));
        assert_eq!(registry.ops_in_flight(DriveKey::new(43)), None);
    }

    #[test]
    fn test_table_full() {
        let registry = DriveStatsRegistry::new();
        registry.setup(2);

        registry.get_or_create(DriveKey::new(1)).unwrap();
        registry.get_or_create(DriveKey::new(2)).unwrap();

        let result = registry.get_or_create(DriveKey::new(3));
        assert!(matches!(
            result,
            Err(FlowError::DriveStatsFull { capacity: 2, .. })
        ));

        // Existing keys are still served.
        assert!(registry.get_or_create(DriveKey::new(1)).is_ok());
    }

    #[test]
    fn test_independent_registries() {
        let a = DriveStatsRegistry::new();
        let b = DriveStatsRegistry::new();
        let key = DriveKey::new(7);

        a.add(key, 1).unwrap();
        assert_eq!(a.ops_in_flight(key), Some(1));
        assert_eq!(b.ops_in_flight(key), None);
    }

    #[test]
    fn test_clones_share_table() {
        let a = DriveStatsRegistry::new();
        let b = a.clone();
        let key = DriveKey::new(7);

        a.add(key, 4).unwrap();
        assert_eq!(b.ops_in_flight(key), Some(4));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let key = DriveKey::new(0xfeed_0001);
        let a = DriveStatsRegistry::global();
        let b = DriveStatsRegistry::global();

        let stats = a.get_or_create(key).unwrap();
        assert!(Arc::ptr_eq(&stats, &b.get(key).unwrap()));
    }

    #[test]
    fn test_concurrent_first_callers() {
        let registry = DriveStatsRegistry::new();
        let key = DriveKey::new(9);

        let entries: Vec<Arc<DriveStats>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        registry.setup(16);
                        registry.get_or_create(key).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.len(), 1);
        assert!(entries.iter().all(|e| Arc::ptr_eq(e, &entries[0])));
    }

    #[test]
    fn test_concurrent_counter_updates() {
        let registry = DriveStatsRegistry::new();
        let key = DriveKey::new(11);
        let stats = registry.get_or_create(key).unwrap();

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        stats.add(1);
                        stats.sub(1);
                    }
                    stats.add(1);
                });
            }
        });

        assert_eq!(stats.ops_in_flight(), 4);
    }
}
