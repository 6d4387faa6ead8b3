//! Storage layer for shmtree
//!
//! Everything that lives inside a shared segment:
//! - Segment: the mapped region, its control block and the zone lock
//! - Heap: offset-addressed view of the segment, only reachable under the lock
//! - Arena: slab allocator with power-of-two size classes
//! - rbtree: offset-linked red-black tree shared by both indexes
//! - codec: tagged encoding of values into node regions
//! - OrderedStore: the zone's entry tree, ordered by a per-call comparator
//! - nested: the hash-ordered field index of each stored table
//! - lifecycle: recursive destruction of stored tables
//!
//! # Cross-process layout
//!
//! No pointer is ever stored in the segment. Links are `u32` offsets from
//! the start of the heap, so any process mapping the segment, at any address,
//! sees the same structure.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod codec;
pub mod heap;
pub mod lifecycle;
pub mod nested;
pub mod ordered;
pub mod rbtree;
pub mod segment;

pub use arena::ArenaStats;
pub use codec::Encoded;
pub use heap::{Heap, Offset, TreeHeader, HEAP_DATA_START, NIL};
pub use ordered::OrderedStore;
pub use segment::{Segment, ZoneGuard, CONTROL_SIZE};
