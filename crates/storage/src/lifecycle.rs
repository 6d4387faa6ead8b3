//! Destruction of stored tables
//!
//! A table owns its nested index, and every field may own further tables in
//! its key or value. Destroying a table walks its index in post-order,
//! destroys whatever each field owns, then frees the field, so deleting an
//! entry returns every block reachable from it.

use shmtree_core::{Error, Result, TypeTag, MAX_NESTING_DEPTH};

use crate::heap::{Heap, Offset, TreeHeader};
use crate::rbtree;

/// Free a table's nested index and everything nested inside it
pub fn destroy_table(heap: &mut Heap<'_>, tree: TreeHeader) -> Result<()> {
    destroy_at(heap, tree, 1)
}

/// Destroy the tables held in a node's key or value, leaving the node itself
pub fn release_node_tables(heap: &mut Heap<'_>, n: Offset) -> Result<()> {
    release_at(heap, n, 1)
}

fn destroy_at(heap: &mut Heap<'_>, tree: TreeHeader, depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::corruption("stored table nests deeper than allowed"));
    }
    for n in rbtree::post_order(heap, &tree)? {
        release_at(heap, n, depth + 1)?;
        heap.free(n)?;
    }
    Ok(())
}

fn release_at(heap: &mut Heap<'_>, n: Offset, depth: usize) -> Result<()> {
    if heap.key_tag(n)? == TypeTag::Table {
        let tree = TreeHeader::from_bytes(heap.key(n)?)?;
        destroy_at(heap, tree, depth)?;
    }
    if heap.value_tag(n)? == TypeTag::Table {
        let tree = TreeHeader::from_bytes(heap.value(n)?)?;
        destroy_at(heap, tree, depth)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use shmtree_core::{Table, Value};

    fn deep_table() -> Value {
        let mut leaf = Table::new();
        leaf.insert("x", 1);
        leaf.insert("y", "why");

        let mut key_table = Table::new();
        key_table.insert(1, Value::Table(leaf.clone()));

        let mut mid = Table::new();
        mid.insert("leaf", Value::Table(leaf));
        mid.insert(Value::Table(key_table), true);

        let mut top = Table::new();
        top.insert("mid", Value::Table(mid));
        top.insert("n", 4.5);
        Value::Table(top)
    }

    #[test]
    fn test_destroy_returns_every_block() {
        let mut buf = vec![0u8; 1 << 16];
        let mut heap = Heap::new(&mut buf);
        heap.format();
        let baseline = heap.stats();

        let v = deep_table();
        let e = codec::encode(&mut heap, &v).unwrap();
        // top: 2 fields, mid: 2, leaf: 2, key_table: 1, its leaf: 2
        assert_eq!(heap.stats().allocations, 9);

        destroy_table(&mut heap, TreeHeader::from_bytes(&e.bytes).unwrap()).unwrap();
        assert_eq!(heap.stats(), baseline);
    }

    #[test]
    fn test_destroy_empty_table() {
        let mut buf = vec![0u8; 4096];
        let mut heap = Heap::new(&mut buf);
        heap.format();
        destroy_table(&mut heap, TreeHeader::EMPTY).unwrap();
        assert_eq!(heap.stats().allocations, 0);
    }

    #[test]
    fn test_release_node_tables_keeps_node() {
        let mut buf = vec![0u8; 1 << 16];
        let mut heap = Heap::new(&mut buf);
        heap.format();

        let v = deep_table();
        let e = codec::encode(&mut heap, &v).unwrap();
        let n = heap
            .alloc_node(TypeTag::String, b"k", e.tag, &e.bytes, 0)
            .unwrap();
        release_node_tables(&mut heap, n).unwrap();
        assert_eq!(heap.stats().allocations, 1);
        heap.free(n).unwrap();
        assert_eq!(heap.stats().allocations, 0);
    }
}
