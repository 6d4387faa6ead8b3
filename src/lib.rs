//! shmtree - shared-memory key/value zones
//!
//! A zone is one shared mapping holding a red-black tree of entries. Keys and
//! values are booleans, numbers, strings or nested tables, stored with
//! offset links only, so every thread or process mapping the zone sees the
//! same structure. The store has no fixed key order: each call supplies the
//! comparator that orders it.
//!
//! # Quick Start
//!
//! ```
//! use shmtree::{NaturalOrder, Table, Value, Zone};
//!
//! let zone = Zone::anonymous("cache", 256 * 1024)?;
//!
//! let mut profile = Table::new();
//! profile.insert("name", "ada");
//! zone.insert(&Value::from("user:1"), &Value::Table(profile), &mut NaturalOrder)?;
//!
//! let name = zone.get_field(&Value::from("user:1"), &Value::from("name"), &mut NaturalOrder)?;
//! assert_eq!(name, Value::from("ada"));
//! # Ok::<(), shmtree::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `shmtree-core`: values, comparator trait, errors
//! - `shmtree-storage`: segment, lock, arena, trees, codec
//! - `shmtree-engine`: zones, configuration, registry, host call surface
//!
//! Only the engine API is re-exported here.

pub use shmtree_engine::*;
