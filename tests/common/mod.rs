//! Shared test utilities for the root integration suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use shmtree::{Table, Value, Zone, MIN_ZONE_SIZE};

/// An anonymous zone of `pages` times the minimum size
pub fn zone(name: &str, pages: usize) -> Zone {
    Zone::anonymous(name, MIN_ZONE_SIZE * pages).expect("zone")
}

/// A record-like table: `{ id, name, tags = { 1 = ..., 2 = ... } }`
pub fn record(id: i32) -> Value {
    let mut tags = Table::new();
    tags.insert(1, format!("tag-{}", id % 7));
    tags.insert(2, id % 2 == 0);

    let mut t = Table::new();
    t.insert("id", id);
    t.insert("name", format!("record-{id}"));
    t.insert("tags", Value::Table(tags));
    Value::Table(t)
}

/// Key used by worker `w` for its `i`-th entry
pub fn worker_key(w: usize, i: usize) -> Value {
    Value::from(format!("w{w}:{i}"))
}
