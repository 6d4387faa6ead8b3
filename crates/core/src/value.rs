//! Value types for shmtree
//!
//! This module defines:
//! - Value: the tagged union stored in a zone (Boolean, Number, String, Table)
//! - Table: an unordered map of Value to Value
//! - TypeTag: the one-byte discriminant written next to every encoded value
//!
//! ## Type Rules
//!
//! - Four types only. There is no nil: absence is reported as an error.
//! - Strings are raw bytes, not necessarily UTF-8.
//! - Numbers are IEEE-754 doubles: `NaN != NaN`, `-0.0 == 0.0`.
//! - Tables compare equal when they hold the same pairs, regardless of order.

use serde::{Deserialize, Serialize};

/// Discriminant stored alongside every encoded key and value.
///
/// The numeric values match the type codes of the embedding scripting
/// runtime so that segments written by either side stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    /// Boolean, 4-byte little-endian integer
    Boolean = 1,
    /// Number, 8-byte little-endian double
    Number = 3,
    /// String, raw bytes
    String = 4,
    /// Table, 8-byte nested index header
    Table = 5,
}

impl TypeTag {
    /// Parse a tag byte read back from shared memory
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(TypeTag::Boolean),
            3 => Some(TypeTag::Number),
            4 => Some(TypeTag::String),
            5 => Some(TypeTag::Table),
            _ => None,
        }
    }

    /// The tag byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable type name
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Table => "table",
        }
    }
}

/// A value that can be stored as a key or value in a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// Double-precision number
    Number(f64),
    /// Byte string
    String(Vec<u8>),
    /// Nested map
    Table(Table),
}

// Custom PartialEq implementation for IEEE-754 float semantics
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Build a string value from anything byte-like
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Value::String(bytes.into())
    }

    /// The tag this value encodes under
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Number(_) => TypeTag::Number,
            Value::String(_) => TypeTag::String,
            Value::Table(_) => TypeTag::Table,
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.type_tag().name()
    }

    /// Check if this is a table value
    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    /// Get as bool if this is a Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64 if this is a Number value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the raw bytes if this is a String value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &str if this is a String value holding valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get as &Table if this is a Table value
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::String(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::String(b)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

// ============================================================================
// Table
// ============================================================================

/// An unordered map from Value to Value
///
/// Keys are unique under `Value` equality; inserting an existing key replaces
/// its value. Iteration order is insertion order here, but once a table has
/// been stored in a zone and read back it follows the hash order of the
/// nested index, so callers must not rely on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    fields: Vec<(Value, Value)>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table with room for `capacity` fields
    pub fn with_capacity(capacity: usize) -> Self {
        Table {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Insert a field, returning the previous value for an equal key
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Append a field whose key is known to be absent
    ///
    /// Skips the linear scan of [`Table::insert`], for sources whose keys are
    /// already distinct: fields read back from a zone, array indices, object
    /// keys. Appending a key that is present leaves both fields and `get`
    /// returns the first.
    pub fn push_distinct(&mut self, key: Value, value: Value) {
        self.fields.push((key, value));
    }

    /// Look up a field
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.swap_remove(pos).1)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the fields
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V> FromIterator<(K, V)> for Table
where
    K: Into<Value>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Table::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

impl IntoIterator for Table {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
