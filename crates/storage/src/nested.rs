//! Nested index: the fields of a stored table
//!
//! Each table value owns one red-black tree of field nodes, reached through
//! the 8-byte [`TreeHeader`] stored inline as the table's bytes. Unlike the
//! ordered store, the order here is fixed:
//!
//! 1. `crc32` of the encoded key
//! 2. encoded key bytes, lexicographically, shorter first on a common prefix
//! 3. key type tag
//!
//! so two fields collide only if they have the same type and the same bytes.
//! The hash is kept in the node and compared first, which keeps most
//! comparisons to a single integer.

use std::cmp::Ordering;

use shmtree_core::{Error, Result, Table, TypeTag, Value};
use tracing::{trace, warn};

use crate::codec::{self, Encoded};
use crate::heap::{Heap, Offset, TreeHeader};
use crate::lifecycle;
use crate::rbtree::{self, Slot};

/// Hash of an encoded field key
#[inline]
pub fn field_hash(key: &[u8]) -> u32 {
    crc32fast::hash(key)
}

/// Build the nested index for a table sitting at `depth`
///
/// Fields are encoded at `depth + 1`. Of two fields with identical encoded
/// keys the first one wins and the duplicate is released. On error every
/// field built so far is destroyed.
pub fn build(heap: &mut Heap<'_>, table: &Table, depth: usize) -> Result<TreeHeader> {
    let mut tree = TreeHeader::EMPTY;
    for (key, value) in table.iter() {
        if let Err(e) = insert_field(heap, &mut tree, key, value, depth + 1) {
            if let Err(cleanup) = lifecycle::destroy_table(heap, tree) {
                warn!(error = %cleanup, "failed to roll back partial table");
            }
            return Err(e);
        }
    }
    Ok(tree)
}

fn insert_field(
    heap: &mut Heap<'_>,
    tree: &mut TreeHeader,
    key: &Value,
    value: &Value,
    depth: usize,
) -> Result<()> {
    let k = codec::encode_field_key(heap, key, depth)?;
    let v = match codec::encode_at(heap, value, depth) {
        Ok(v) => v,
        Err(e) => return Err(codec::abandon(heap, &[&k], e)),
    };
    let hash = field_hash(&k.bytes);

    let slot = match rbtree::search(heap, tree, |h, n| field_order(h, n, hash, &k.bytes, k.tag)) {
        Ok(slot) => slot,
        Err(e) => return Err(codec::abandon(heap, &[&k, &v], e)),
    };

    match slot {
        Slot::Found(_) => {
            trace!(hash, "duplicate field key, keeping the first");
            release_pair(heap, &k, &v)
        }
        Slot::Vacant { parent, side } => {
            match heap.alloc_node(k.tag, &k.bytes, v.tag, &v.bytes, hash) {
                Ok(n) => {
                    rbtree::link(heap, tree, n, parent, side);
                    Ok(())
                }
                Err(e) => Err(codec::abandon(heap, &[&k, &v], e)),
            }
        }
    }
}

fn release_pair(heap: &mut Heap<'_>, k: &Encoded<'_>, v: &Encoded<'_>) -> Result<()> {
    codec::release(heap, k)?;
    codec::release(heap, v)
}

/// Find the field whose encoded key is `key` with type `tag`
pub fn find(heap: &Heap<'_>, tree: &TreeHeader, key: &[u8], tag: TypeTag) -> Result<Option<Offset>> {
    let hash = field_hash(key);
    match rbtree::search(heap, tree, |h, n| field_order(h, n, hash, key, tag))? {
        Slot::Found(n) => Ok(Some(n)),
        Slot::Vacant { .. } => Ok(None),
    }
}

/// Look up a field of the table stored in `bytes`
///
/// # Errors
///
/// `FieldNotFound` when no field matches, including for table-typed lookup
/// keys, which cannot be matched by content.
pub fn get(heap: &Heap<'_>, table_bytes: &[u8], field: &Value) -> Result<Value> {
    let tree = TreeHeader::from_bytes(table_bytes)?;
    let key = codec::lookup_bytes(field).ok_or(Error::FieldNotFound)?;
    let n = find(heap, &tree, &key, field.type_tag())?.ok_or(Error::FieldNotFound)?;
    codec::decode_value(heap, n)
}

fn field_order(
    heap: &Heap<'_>,
    n: Offset,
    hash: u32,
    key: &[u8],
    tag: TypeTag,
) -> Result<Ordering> {
    let ord = hash.cmp(&heap.hash(n));
    if ord != Ordering::Equal {
        return Ok(ord);
    }
    Ok(key.cmp(heap.key(n)?).then(tag.cmp(&heap.key_tag(n)?)))
}
