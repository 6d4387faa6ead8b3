//! Slab arena over a zone's heap
//!
//! Power-of-two size classes with one free list per class. Blocks are carved
//! off the unused tail of the heap with a bump pointer and recycled through
//! their class's free list; they are never split or coalesced.
//!
//! Every block starts with an 8-byte header:
//!
//! ```text
//! ┌───────────┬───────────┬──────────────────┐
//! │ class (1) │ state (1) │ reserved (6)     │
//! └───────────┴───────────┴──────────────────┘
//! ```
//!
//! The offset handed out points just past the header, so payloads are
//! 8-aligned. A free block stores the next free payload offset in its first
//! four payload bytes.
//!
//! The arena keeps no lock of its own: it is only reachable through a
//! [`Heap`], which only exists while the zone lock is held.

use shmtree_core::{Error, Result};
use tracing::{trace, warn};

use crate::heap::{
    Heap, Offset, ARENA_ALLOCS, ARENA_FREE_HEADS, ARENA_TOP, ARENA_USED, CLASS_COUNT,
    HEAP_DATA_START, NIL,
};

/// Size of the header in front of every block
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Smallest size class (16-byte blocks)
const MIN_CLASS: usize = 4;

const STATE_IN_USE: u8 = 0xA5;
const STATE_FREE: u8 = 0x5A;

/// Arena occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes available for blocks
    pub capacity: usize,
    /// Bytes held by live blocks, headers included
    pub used_bytes: usize,
    /// `capacity - used_bytes`
    pub free_bytes: usize,
    /// Number of live blocks
    pub allocations: usize,
}

impl Heap<'_> {
    /// Allocate `size` bytes, returning the payload offset
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if neither the class free list nor the unused tail can
    /// satisfy the request.
    pub fn alloc(&mut self, size: usize) -> Result<Offset> {
        let class = size_class(size).ok_or(Error::OutOfMemory { requested: size })?;
        let block_size = 1usize << class;

        let head_at = ARENA_FREE_HEADS + class * 4;
        let head = self.u32_at(head_at);
        let payload = if head != NIL {
            let next = self.u32_at(head as usize);
            self.set_u32_at(head_at, next);
            head
        } else {
            let top = self.u32_at(ARENA_TOP) as usize;
            let end = top
                .checked_add(block_size)
                .filter(|end| *end <= self.len())
                .ok_or_else(|| {
                    warn!(requested = size, block_size, top, "arena exhausted");
                    Error::OutOfMemory { requested: size }
                })?;
            self.set_u32_at(ARENA_TOP, end as u32);
            (top + BLOCK_HEADER_SIZE) as Offset
        };

        let header = payload as usize - BLOCK_HEADER_SIZE;
        self.set_u8_at(header, class as u8);
        self.set_u8_at(header + 1, STATE_IN_USE);

        let used = self.u32_at(ARENA_USED) as usize + block_size;
        self.set_u32_at(ARENA_USED, used as u32);
        let allocs = self.u32_at(ARENA_ALLOCS) + 1;
        self.set_u32_at(ARENA_ALLOCS, allocs);

        trace!(size, block_size, offset = payload, "arena alloc");
        Ok(payload)
    }

    /// Return a block to its class free list
    ///
    /// # Errors
    ///
    /// `Corruption` if `offset` is not the payload of a live block
    /// (double free, stray offset).
    pub fn free(&mut self, offset: Offset) -> Result<()> {
        let payload = offset as usize;
        let top = self.u32_at(ARENA_TOP) as usize;
        if payload < HEAP_DATA_START + BLOCK_HEADER_SIZE || payload >= top {
            return Err(Error::corruption(format!(
                "free of offset {payload} outside allocated heap"
            )));
        }

        let header = payload - BLOCK_HEADER_SIZE;
        let class = self.u8_at(header) as usize;
        let state = self.u8_at(header + 1);
        if state != STATE_IN_USE || !(MIN_CLASS..CLASS_COUNT).contains(&class) {
            warn!(offset = payload, state, class, "invalid free");
            return Err(Error::corruption(format!(
                "free of offset {payload} which is not a live block"
            )));
        }
        let block_size = 1usize << class;

        self.set_u8_at(header + 1, STATE_FREE);
        let head_at = ARENA_FREE_HEADS + class * 4;
        let head = self.u32_at(head_at);
        self.set_u32_at(payload, head);
        self.set_u32_at(head_at, offset);

        let used = self.u32_at(ARENA_USED) as usize - block_size;
        self.set_u32_at(ARENA_USED, used as u32);
        let allocs = self.u32_at(ARENA_ALLOCS) - 1;
        self.set_u32_at(ARENA_ALLOCS, allocs);

        trace!(block_size, offset = payload, "arena free");
        Ok(())
    }

    /// Current occupancy
    pub fn stats(&self) -> ArenaStats {
        let capacity = self.len().saturating_sub(HEAP_DATA_START);
        let used_bytes = self.u32_at(ARENA_USED) as usize;
        ArenaStats {
            capacity,
            used_bytes,
            free_bytes: capacity - used_bytes,
            allocations: self.u32_at(ARENA_ALLOCS) as usize,
        }
    }
}

/// Size class holding `size` payload bytes plus the block header
fn size_class(size: usize) -> Option<usize> {
    let need = size.checked_add(BLOCK_HEADER_SIZE)?.checked_next_power_of_two()?;
    let class = (need.trailing_zeros() as usize).max(MIN_CLASS);
    (class < CLASS_COUNT).then_some(class)
}
