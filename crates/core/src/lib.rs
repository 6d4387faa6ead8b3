//! Core types and traits for shmtree
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Tagged union of Boolean, Number, String and Table
//! - Table: Unordered map stored as a nested index inside a zone
//! - TypeTag: Discriminant byte written next to encoded values
//! - Comparator: Per-call ordering for the ordered store
//! - Error: Error type hierarchy (reported vs fatal)
//! - Limits: nesting depth and zone size bounds

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod traits;
pub mod value;

pub use error::{Error, Result};
pub use limits::{MAX_NESTING_DEPTH, MAX_ZONE_SIZE, MIN_ZONE_SIZE};
pub use traits::{Comparator, NaturalOrder};
pub use value::{Table, TypeTag, Value};
