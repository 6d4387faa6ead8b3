//! Zone: the lock-guarded operation surface
//!
//! Every operation takes the zone lock, runs to completion against the
//! ordered store, and releases the lock when its guard drops, on success,
//! on error and on panic alike. The caller's comparator runs inside that
//! critical section, so operations on one zone never interleave.
//!
//! # Example
//!
//! ```
//! use shmtree_core::{NaturalOrder, Value};
//! use shmtree_engine::Zone;
//!
//! let zone = Zone::anonymous("docs", 64 * 1024).unwrap();
//! zone.insert(&Value::from("k"), &Value::from(1.5), &mut NaturalOrder).unwrap();
//! assert_eq!(zone.get(&Value::from("k"), &mut NaturalOrder).unwrap(), Value::from(1.5));
//! ```

use std::path::Path;

use shmtree_core::{Comparator, Result, Value};
use shmtree_storage::{ArenaStats, OrderedStore, Segment, ZoneGuard};
use tracing::debug;

use crate::config::ZoneConfig;

/// A named shared-memory zone
#[derive(Debug)]
pub struct Zone {
    segment: Segment,
}

impl Zone {
    /// Create a zone in a fresh unnamed mapping, shared across `fork`
    pub fn anonymous(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::attach(Segment::anonymous(name, size)?)
    }

    /// Attach to the zone in `path`, creating it if the file is new
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>, size: usize) -> Result<Self> {
        Self::attach(Segment::open(name, path, size)?)
    }

    /// Create or attach a zone as configured
    pub fn from_config(config: &ZoneConfig) -> Result<Self> {
        let size = config.size.bytes()?;
        match &config.path {
            Some(path) => Self::open(config.name.clone(), path, size),
            None => Self::anonymous(config.name.clone(), size),
        }
    }

    fn attach(segment: Segment) -> Result<Self> {
        let reused = segment.initialize()?;
        debug!(zone = %segment.name(), size = segment.len(), reused, "zone ready");
        Ok(Zone { segment })
    }

    /// Zone name
    pub fn name(&self) -> &str {
        self.segment.name()
    }

    /// Mapped size in bytes
    pub fn size(&self) -> usize {
        self.segment.len()
    }

    /// Hold the zone lock for a caller-defined critical section
    ///
    /// # Errors
    ///
    /// `Reentrant` if this thread already holds it.
    pub fn lock(&self) -> Result<ZoneGuard<'_>> {
        self.segment.lock()
    }

    fn with_store<T>(&self, op: impl FnOnce(&mut OrderedStore<'_>) -> Result<T>) -> Result<T> {
        let mut guard = self.segment.lock()?;
        let mut store = guard.store();
        op(&mut store)
    }

    /// Insert a new entry; `KeyExists` if `cmp` finds an equal key
    pub fn insert(&self, key: &Value, value: &Value, cmp: &mut dyn Comparator) -> Result<()> {
        self.with_store(|store| store.insert(key, value, cmp))
    }

    /// Value stored under `key`
    pub fn get(&self, key: &Value, cmp: &mut dyn Comparator) -> Result<Value> {
        self.with_store(|store| store.get(key, cmp))
    }

    /// One field of the table stored under `key`
    pub fn get_field(&self, key: &Value, field: &Value, cmp: &mut dyn Comparator) -> Result<Value> {
        self.with_store(|store| store.get_field(key, field, cmp))
    }

    /// Remove the entry under `key` and everything it owns
    pub fn delete(&self, key: &Value, cmp: &mut dyn Comparator) -> Result<()> {
        self.with_store(|store| store.delete(key, cmp))
    }

    /// Number of entries
    pub fn len(&self) -> Result<usize> {
        self.with_store(|store| Ok(store.len()))
    }

    /// Whether the zone holds no entries
    pub fn is_empty(&self) -> Result<bool> {
        self.with_store(|store| Ok(store.is_empty()))
    }

    /// Every entry in tree order
    pub fn dump(&self) -> Result<Vec<(Value, Value)>> {
        self.with_store(|store| store.entries())
    }

    /// Arena occupancy
    pub fn stats(&self) -> Result<ArenaStats> {
        self.with_store(|store| Ok(store.stats()))
    }
}
