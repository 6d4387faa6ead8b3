//! Zone engine for shmtree
//!
//! This crate puts the storage layer behind a usable surface:
//! - Zone: lock-guarded insert/get/get_field/delete over one segment
//! - ShmConfig: zone definitions loaded from `shmtree.toml`
//! - ZoneRegistry: process-wide table of named zones
//! - boundary: dynamically typed call surface for an embedding runtime
//!
//! The engine never installs a tracing subscriber; zone attach is logged at
//! `debug`, individual operations at `trace`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod config;
pub mod registry;
pub mod zone;

pub use boundary::{call, from_json, HostArg, Reply};
pub use config::{ShmConfig, ZoneConfig, ZoneSize, CONFIG_FILE_NAME};
pub use registry::ZoneRegistry;
pub use zone::Zone;

pub use shmtree_core::{
    Comparator, Error, NaturalOrder, Result, Table, TypeTag, Value, MAX_NESTING_DEPTH,
    MAX_ZONE_SIZE, MIN_ZONE_SIZE,
};
pub use shmtree_storage::{ArenaStats, ZoneGuard};
