//! Ordering traits for the zone's ordered store
//!
//! The ordered store has no built-in key order. Every insert, lookup and
//! delete is handed a `Comparator` that defines the order for that call, so
//! one zone can hold keys compared under any caller-defined total order.
//!
//! # Reentrancy
//!
//! The comparator runs while the zone lock is held, once per visited node.
//! It must not call back into the same zone: within one process that fails
//! with `Error::Reentrant`, across processes it deadlocks.

use std::cmp::Ordering;

use crate::value::{TypeTag, Value};

/// A three-way comparison supplied per call
///
/// `compare(key, stored)` compares the key being searched for against the
/// key stored in the visited node. `Less` descends left, `Greater` descends
/// right, `Equal` is a match.
///
/// Any `FnMut(&Value, &Value) -> Ordering` closure is a comparator.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use shmtree_core::{Comparator, Value};
///
/// // Order string keys by length only
/// let mut by_len = |a: &Value, b: &Value| {
///     a.as_bytes().map(<[u8]>::len).cmp(&b.as_bytes().map(<[u8]>::len))
/// };
/// assert_eq!(by_len.compare(&Value::from("ab"), &Value::from("xy")), Ordering::Equal);
/// ```
pub trait Comparator {
    /// Compare the search key with a stored key
    fn compare(&mut self, key: &Value, stored: &Value) -> Ordering;
}

impl<F> Comparator for F
where
    F: FnMut(&Value, &Value) -> Ordering,
{
    fn compare(&mut self, key: &Value, stored: &Value) -> Ordering {
        self(key, stored)
    }
}

/// A ready-made total order over all values
///
/// Values of different types order by tag (boolean < number < string <
/// table). Within a type: `false < true`, numbers by `f64::total_cmp`,
/// strings bytewise, tables by field count only, so two distinct tables of
/// the same size collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl Comparator for NaturalOrder {
    fn compare(&mut self, key: &Value, stored: &Value) -> Ordering {
        match (key, stored) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Table(a), Value::Table(b)) => a.len().cmp(&b.len()),
            _ => rank(key.type_tag()).cmp(&rank(stored.type_tag())),
        }
    }
}

fn rank(tag: TypeTag) -> u8 {
    match tag {
        TypeTag::Boolean => 0,
        TypeTag::Number => 1,
        TypeTag::String => 2,
        TypeTag::Table => 3,
    }
}
