//! Locked view of a zone's heap
//!
//! Everything inside a segment is addressed by `u32` offsets relative to the
//! start of the heap, never by pointers, so the same bytes are valid in every
//! process that maps the segment.
//!
//! # Layout
//!
//! ```text
//! Heap:
//! ┌──────────────────────────────┬──────────────────────────────────────┐
//! │ Header (HEAP_DATA_START)     │ Blocks (bump-allocated, 8-aligned)   │
//! └──────────────────────────────┴──────────────────────────────────────┘
//!
//! Header:
//! ┌───────────────┬────────────┬────────────┬──────────────┬──────────────────┐
//! │ store (8)     │ top (4)    │ used (4)   │ allocs (4)   │ free heads (4×32)│
//! └───────────────┴────────────┴────────────┴──────────────┴──────────────────┘
//!
//! Node (Entry or Field), one block payload:
//!  0  parent   u32
//!  4  left     u32
//!  8  right    u32
//! 12  color    u8     0 = black, 1 = red
//! 13  key tag  u8
//! 14  val tag  u8
//! 15  pad      u8
//! 16  hash     u32    crc32 of the key (fields only)
//! 20  key len  u32
//! 24  val len  u32
//! 28  key bytes ‖ value bytes
//! ```
//!
//! Offset `0` is the heap header and can never be a node, so [`NIL`] doubles
//! as the tree sentinel: it is black and has no children.

use byteorder::{ByteOrder, LittleEndian};
use shmtree_core::{Error, Result, TypeTag};

/// Heap-relative address
pub type Offset = u32;

/// The null offset, also the implicit black sentinel of every tree
pub const NIL: Offset = 0;

/// Offset of the ordered store's tree header
pub(crate) const STORE_HEADER: usize = 0;
/// Offset of the arena's bump pointer
pub(crate) const ARENA_TOP: usize = 8;
/// Offset of the arena's used-bytes counter
pub(crate) const ARENA_USED: usize = 12;
/// Offset of the arena's live-allocation counter
pub(crate) const ARENA_ALLOCS: usize = 16;
/// Offset of the per-class free list heads
pub(crate) const ARENA_FREE_HEADS: usize = 24;
/// Number of size classes (block sizes 2^0 .. 2^31, the low ones unused)
pub(crate) const CLASS_COUNT: usize = 32;

/// First byte available for blocks
pub const HEAP_DATA_START: usize = 256;

const _: () = assert!(ARENA_FREE_HEADS + CLASS_COUNT * 4 <= HEAP_DATA_START);

/// Field offsets inside a node
pub(crate) mod node {
    pub const PARENT: usize = 0;
    pub const LEFT: usize = 4;
    pub const RIGHT: usize = 8;
    pub const COLOR: usize = 12;
    pub const KEY_TAG: usize = 13;
    pub const VALUE_TAG: usize = 14;
    pub const HASH: usize = 16;
    pub const KEY_LEN: usize = 20;
    pub const VALUE_LEN: usize = 24;
    pub const HEADER_SIZE: usize = 28;

    pub const BLACK: u8 = 0;
    pub const RED: u8 = 1;
}

/// Root and size of one red-black tree
///
/// The ordered store keeps its header at the start of the heap; every
/// table value stores one inline as its 8 value bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeHeader {
    /// Root node, `NIL` when empty
    pub root: Offset,
    /// Number of nodes
    pub len: u32,
}

impl TreeHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 8;

    /// An empty tree
    pub const EMPTY: TreeHeader = TreeHeader { root: NIL, len: 0 };

    /// Parse an inline header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::corruption(format!(
                "tree header is {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(TreeHeader {
            root: LittleEndian::read_u32(&bytes[0..4]),
            len: LittleEndian::read_u32(&bytes[4..8]),
        })
    }

    /// Encode as inline bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        LittleEndian::write_u32(&mut out[0..4], self.root);
        LittleEndian::write_u32(&mut out[4..8], self.len);
        out
    }

    pub(crate) fn load(heap: &Heap<'_>, at: usize) -> Self {
        TreeHeader {
            root: heap.u32_at(at),
            len: heap.u32_at(at + 4),
        }
    }

    pub(crate) fn store(self, heap: &mut Heap<'_>, at: usize) {
        heap.set_u32_at(at, self.root);
        heap.set_u32_at(at + 4, self.len);
    }
}

/// Mutable view of a zone's heap, only obtainable while the zone lock is held
///
/// All tree, codec and arena code works through this type. Holding a
/// `Heap` is proof that the caller owns the zone's critical section.
pub struct Heap<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Heap<'a> {
    /// Wrap raw heap bytes
    ///
    /// The bytes must either have been formatted with [`Heap::format`] or be
    /// formatted before any other use.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Heap { bytes }
    }

    /// Heap size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the heap has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reset the header: empty ordered store, empty arena
    pub fn format(&mut self) {
        self.bytes[..HEAP_DATA_START].fill(0);
        TreeHeader::EMPTY.store(self, STORE_HEADER);
        self.set_u32_at(ARENA_TOP, HEAP_DATA_START as u32);
    }

    // ------------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------------

    #[inline]
    pub(crate) fn u32_at(&self, at: usize) -> u32 {
        LittleEndian::read_u32(&self.bytes[at..at + 4])
    }

    #[inline]
    pub(crate) fn set_u32_at(&mut self, at: usize, value: u32) {
        LittleEndian::write_u32(&mut self.bytes[at..at + 4], value)
    }

    #[inline]
    pub(crate) fn u8_at(&self, at: usize) -> u8 {
        self.bytes[at]
    }

    #[inline]
    pub(crate) fn set_u8_at(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    /// Bounds-checked slice; out-of-range lengths mean the segment is corrupt
    pub(crate) fn slice(&self, at: usize, len: usize) -> Result<&[u8]> {
        at.checked_add(len)
            .and_then(|end| self.bytes.get(at..end))
            .ok_or_else(|| {
                Error::corruption(format!("region {at}+{len} outside heap of {}", self.len()))
            })
    }

    // ------------------------------------------------------------------------
    // Node linkage
    // ------------------------------------------------------------------------

    #[inline]
    pub(crate) fn parent(&self, n: Offset) -> Offset {
        self.u32_at(n as usize + node::PARENT)
    }

    #[inline]
    pub(crate) fn left(&self, n: Offset) -> Offset {
        self.u32_at(n as usize + node::LEFT)
    }

    #[inline]
    pub(crate) fn right(&self, n: Offset) -> Offset {
        self.u32_at(n as usize + node::RIGHT)
    }

    /// Writes to the sentinel are dropped
    #[inline]
    pub(crate) fn set_parent(&mut self, n: Offset, parent: Offset) {
        if n != NIL {
            self.set_u32_at(n as usize + node::PARENT, parent);
        }
    }

    #[inline]
    pub(crate) fn set_left(&mut self, n: Offset, child: Offset) {
        debug_assert_ne!(n, NIL);
        self.set_u32_at(n as usize + node::LEFT, child);
    }

    #[inline]
    pub(crate) fn set_right(&mut self, n: Offset, child: Offset) {
        debug_assert_ne!(n, NIL);
        self.set_u32_at(n as usize + node::RIGHT, child);
    }

    /// The sentinel is always black
    #[inline]
    pub(crate) fn is_red(&self, n: Offset) -> bool {
        n != NIL && self.u8_at(n as usize + node::COLOR) == node::RED
    }

    #[inline]
    pub(crate) fn set_red(&mut self, n: Offset, red: bool) {
        if n != NIL {
            let color = if red { node::RED } else { node::BLACK };
            self.set_u8_at(n as usize + node::COLOR, color);
        }
    }

    // ------------------------------------------------------------------------
    // Node payload
    // ------------------------------------------------------------------------

    /// Type of the key stored in a node
    pub fn key_tag(&self, n: Offset) -> Result<TypeTag> {
        read_tag(self.u8_at(n as usize + node::KEY_TAG))
    }

    /// Type of the value stored in a node
    pub fn value_tag(&self, n: Offset) -> Result<TypeTag> {
        read_tag(self.u8_at(n as usize + node::VALUE_TAG))
    }

    /// Key hash (fields only, 0 for entries)
    pub fn hash(&self, n: Offset) -> u32 {
        self.u32_at(n as usize + node::HASH)
    }

    /// Raw key bytes
    pub fn key(&self, n: Offset) -> Result<&[u8]> {
        let klen = self.u32_at(n as usize + node::KEY_LEN) as usize;
        self.slice(n as usize + node::HEADER_SIZE, klen)
    }

    /// Raw value bytes
    pub fn value(&self, n: Offset) -> Result<&[u8]> {
        let base = n as usize + node::HEADER_SIZE;
        let klen = self.u32_at(n as usize + node::KEY_LEN) as usize;
        let vlen = self.u32_at(n as usize + node::VALUE_LEN) as usize;
        self.slice(base + klen, vlen)
    }

    /// Allocate one contiguous node and copy key then value into it
    ///
    /// Tree linkage is left for the caller to set when linking.
    pub(crate) fn alloc_node(
        &mut self,
        key_tag: TypeTag,
        key: &[u8],
        value_tag: TypeTag,
        value: &[u8],
        hash: u32,
    ) -> Result<Offset> {
        let requested = node::HEADER_SIZE + key.len() + value.len();
        let klen = u32::try_from(key.len()).map_err(|_| Error::OutOfMemory { requested })?;
        let vlen = u32::try_from(value.len()).map_err(|_| Error::OutOfMemory { requested })?;

        let n = self.alloc(requested)?;
        let base = n as usize;
        self.set_u32_at(base + node::PARENT, NIL);
        self.set_u32_at(base + node::LEFT, NIL);
        self.set_u32_at(base + node::RIGHT, NIL);
        self.set_u8_at(base + node::COLOR, node::BLACK);
        self.set_u8_at(base + node::KEY_TAG, key_tag.as_u8());
        self.set_u8_at(base + node::VALUE_TAG, value_tag.as_u8());
        self.set_u8_at(base + node::VALUE_TAG + 1, 0);
        self.set_u32_at(base + node::HASH, hash);
        self.set_u32_at(base + node::KEY_LEN, klen);
        self.set_u32_at(base + node::VALUE_LEN, vlen);

        let data = base + node::HEADER_SIZE;
        self.bytes[data..data + key.len()].copy_from_slice(key);
        self.bytes[data + key.len()..data + key.len() + value.len()].copy_from_slice(value);
        Ok(n)
    }
}

fn read_tag(byte: u8) -> Result<TypeTag> {
    TypeTag::from_u8(byte).ok_or_else(|| Error::BadValueType(format!("unknown type tag {byte}")))
}
