//! Value codec
//!
//! Turns a [`Value`] into a `(type tag, bytes)` pair that can be copied into
//! a node, and back.
//!
//! | Tag | Bytes |
//! |-----|-------|
//! | Boolean | 4-byte LE integer, 0 or 1 |
//! | Number | 8-byte LE IEEE-754 double |
//! | String | raw bytes, no terminator |
//! | Table | 8-byte [`TreeHeader`] of a nested index built in the heap |
//!
//! Encoding a table allocates its whole nested index, so an [`Encoded`] table
//! owns heap blocks until it is either linked into a node or handed to
//! [`release`]. Decoding never allocates.

mod scalar;

use std::borrow::Cow;

use shmtree_core::{Error, Result, Table, TypeTag, Value, MAX_NESTING_DEPTH};
use tracing::warn;

use crate::heap::{Heap, Offset, TreeHeader};
use crate::{lifecycle, nested, rbtree};

pub use scalar::{BOOLEAN_SIZE, NUMBER_SIZE};

/// An encoded value, ready to be copied into a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded<'v> {
    /// Type of the encoded value
    pub tag: TypeTag,
    /// Serialized bytes; borrowed for strings
    pub bytes: Cow<'v, [u8]>,
}

/// Encode a top-level value
///
/// # Errors
///
/// `OutOfMemory` if a table's nested index does not fit, `NestingTooDeep`
/// past [`MAX_NESTING_DEPTH`]. Nothing stays allocated on error.
pub fn encode<'v>(heap: &mut Heap<'_>, value: &'v Value) -> Result<Encoded<'v>> {
    encode_at(heap, value, 1)
}

/// Encode a value sitting at `depth` (1 for the top level)
pub(crate) fn encode_at<'v>(
    heap: &mut Heap<'_>,
    value: &'v Value,
    depth: usize,
) -> Result<Encoded<'v>> {
    let bytes = match value {
        Value::Boolean(b) => Cow::Owned(scalar::encode_bool(*b).to_vec()),
        Value::Number(n) => Cow::Owned(scalar::encode_number(*n).to_vec()),
        Value::String(s) => Cow::Borrowed(s.as_slice()),
        Value::Table(t) => {
            if depth > MAX_NESTING_DEPTH {
                return Err(Error::NestingTooDeep {
                    limit: MAX_NESTING_DEPTH,
                });
            }
            let header = nested::build(heap, t, depth)?;
            Cow::Owned(header.to_bytes().to_vec())
        }
    };
    Ok(Encoded {
        tag: value.type_tag(),
        bytes,
    })
}

/// Encode a table field key sitting at `depth`
///
/// `-0.0` is stored as `0.0`: the two are equal keys, so they must share one
/// encoding for [`lookup_bytes`] to find either.
pub(crate) fn encode_field_key<'v>(
    heap: &mut Heap<'_>,
    key: &'v Value,
    depth: usize,
) -> Result<Encoded<'v>> {
    match key {
        Value::Number(n) => Ok(Encoded {
            tag: TypeTag::Number,
            bytes: Cow::Owned(scalar::encode_number(field_number(*n)).to_vec()),
        }),
        _ => encode_at(heap, key, depth),
    }
}

#[inline]
fn field_number(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

/// Free whatever an encoding allocated (only tables allocate)
pub fn release(heap: &mut Heap<'_>, encoded: &Encoded<'_>) -> Result<()> {
    if encoded.tag == TypeTag::Table {
        lifecycle::destroy_table(heap, TreeHeader::from_bytes(&encoded.bytes)?)?;
    }
    Ok(())
}

/// Release partial encodings after a failure and hand back the original error
pub(crate) fn abandon(heap: &mut Heap<'_>, parts: &[&Encoded<'_>], err: Error) -> Error {
    for part in parts {
        if let Err(e) = release(heap, part) {
            warn!(error = %e, "failed to release partial encoding");
        }
    }
    err
}

/// Decode a value region
pub fn decode(heap: &Heap<'_>, tag: TypeTag, bytes: &[u8]) -> Result<Value> {
    decode_at(heap, tag, bytes, 1)
}

fn decode_at(heap: &Heap<'_>, tag: TypeTag, bytes: &[u8], depth: usize) -> Result<Value> {
    match tag {
        TypeTag::Boolean => scalar::decode_bool(bytes).map(Value::Boolean),
        TypeTag::Number => scalar::decode_number(bytes).map(Value::Number),
        TypeTag::String => Ok(Value::String(bytes.to_vec())),
        TypeTag::Table => {
            if depth > MAX_NESTING_DEPTH {
                return Err(Error::corruption("stored table nests deeper than allowed"));
            }
            let header = TreeHeader::from_bytes(bytes)?;
            let nodes = rbtree::in_order(heap, &header)?;
            let mut table = Table::with_capacity(nodes.len());
            // The nested index holds each encoded key once
            for n in nodes {
                let key = decode_at(heap, heap.key_tag(n)?, heap.key(n)?, depth + 1)?;
                let value = decode_at(heap, heap.value_tag(n)?, heap.value(n)?, depth + 1)?;
                table.push_distinct(key, value);
            }
            Ok(Value::Table(table))
        }
    }
}

/// Decode the key stored in a node
pub fn decode_key(heap: &Heap<'_>, n: Offset) -> Result<Value> {
    decode(heap, heap.key_tag(n)?, heap.key(n)?)
}

/// Decode the value stored in a node
pub fn decode_value(heap: &Heap<'_>, n: Offset) -> Result<Value> {
    decode(heap, heap.value_tag(n)?, heap.value(n)?)
}

/// Raw key bytes for a field lookup, without allocating in the heap
///
/// Matches the encoding of stored field keys, zero sign included. Tables
/// have no content-addressable encoding and return `None`.
pub fn lookup_bytes(value: &Value) -> Option<Cow<'_, [u8]>> {
    match value {
        Value::Boolean(b) => Some(Cow::Owned(scalar::encode_bool(*b).to_vec())),
        Value::Number(n) => Some(Cow::Owned(scalar::encode_number(field_number(*n)).to_vec())),
        Value::String(s) => Some(Cow::Borrowed(s.as_slice())),
        Value::Table(_) => None,
    }
}
