//! Ordered store: the zone's entry tree
//!
//! One red-black tree of entry nodes per zone, its header at the start of the
//! heap. The store has no key order of its own; each call passes a
//! [`Comparator`] that is consulted at every visited node with
//! `compare(search_key, stored_key)`.
//!
//! Insert walks the tree before allocating anything, so a duplicate key costs
//! no allocation. When an allocation fails partway, everything the insert
//! allocated is released and the tree is untouched.

use shmtree_core::{Comparator, Error, Result, TypeTag, Value};
use tracing::trace;

use crate::arena::ArenaStats;
use crate::codec;
use crate::heap::{Heap, Offset, TreeHeader, NIL, STORE_HEADER};
use crate::lifecycle;
use crate::nested;
use crate::rbtree::{self, Slot};

/// The entry tree of a locked zone
pub struct OrderedStore<'a> {
    heap: Heap<'a>,
}

impl<'a> OrderedStore<'a> {
    /// Wrap a formatted heap
    pub fn new(heap: Heap<'a>) -> Self {
        OrderedStore { heap }
    }

    fn header(&self) -> TreeHeader {
        TreeHeader::load(&self.heap, STORE_HEADER)
    }

    fn locate(&self, key: &Value, cmp: &mut dyn Comparator) -> Result<Slot> {
        let tree = self.header();
        rbtree::search(&self.heap, &tree, |heap, n| {
            let stored = codec::decode_key(heap, n)?;
            Ok(cmp.compare(key, &stored))
        })
    }

    /// Insert a new entry
    ///
    /// # Errors
    ///
    /// `KeyExists` if an entry compares equal, `OutOfMemory` if the entry
    /// does not fit.
    pub fn insert(&mut self, key: &Value, value: &Value, cmp: &mut dyn Comparator) -> Result<()> {
        let (parent, side) = match self.locate(key, cmp)? {
            Slot::Found(_) => {
                trace!("insert of existing key");
                return Err(Error::KeyExists);
            }
            Slot::Vacant { parent, side } => (parent, side),
        };

        let heap = &mut self.heap;
        let k = codec::encode(heap, key)?;
        let v = match codec::encode(heap, value) {
            Ok(v) => v,
            Err(e) => return Err(codec::abandon(heap, &[&k], e)),
        };
        let n = match heap.alloc_node(k.tag, &k.bytes, v.tag, &v.bytes, 0) {
            Ok(n) => n,
            Err(e) => return Err(codec::abandon(heap, &[&k, &v], e)),
        };

        let mut tree = TreeHeader::load(heap, STORE_HEADER);
        rbtree::link(heap, &mut tree, n, parent, side);
        tree.store(heap, STORE_HEADER);
        trace!(offset = n, len = tree.len, "inserted entry");
        Ok(())
    }

    /// Offset of the entry matching `key`
    pub fn find(&self, key: &Value, cmp: &mut dyn Comparator) -> Result<Offset> {
        match self.locate(key, cmp)? {
            Slot::Found(n) => Ok(n),
            Slot::Vacant { .. } => Err(Error::KeyNotFound),
        }
    }

    /// Value of the entry matching `key`
    pub fn get(&self, key: &Value, cmp: &mut dyn Comparator) -> Result<Value> {
        let n = self.find(key, cmp)?;
        codec::decode_value(&self.heap, n)
    }

    /// One field of the table stored under `key`
    ///
    /// # Errors
    ///
    /// `KeyNotFound` for a missing entry, `TypeMismatch` if its value is not
    /// a table, `FieldNotFound` if the table has no such field.
    pub fn get_field(&self, key: &Value, field: &Value, cmp: &mut dyn Comparator) -> Result<Value> {
        let n = self.find(key, cmp)?;
        if self.heap.value_tag(n)? != TypeTag::Table {
            return Err(Error::TypeMismatch);
        }
        nested::get(&self.heap, self.heap.value(n)?, field)
    }

    /// Remove the entry matching `key`, destroying any tables it holds
    pub fn delete(&mut self, key: &Value, cmp: &mut dyn Comparator) -> Result<()> {
        let n = self.find(key, cmp)?;
        let heap = &mut self.heap;

        lifecycle::release_node_tables(heap, n)?;
        let mut tree = TreeHeader::load(heap, STORE_HEADER);
        rbtree::unlink(heap, &mut tree, n);
        tree.store(heap, STORE_HEADER);
        heap.free(n)?;

        trace!(offset = n, len = tree.len, "deleted entry");
        Ok(())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.header().len as usize
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.header().root == NIL
    }

    /// Every entry, in tree order
    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        rbtree::in_order(&self.heap, &self.header())?
            .into_iter()
            .map(|n| {
                Ok((
                    codec::decode_key(&self.heap, n)?,
                    codec::decode_value(&self.heap, n)?,
                ))
            })
            .collect()
    }

    /// Arena occupancy
    pub fn stats(&self) -> ArenaStats {
        self.heap.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmtree_core::{NaturalOrder, Table};

    fn with_store<R>(size: usize, f: impl FnOnce(&mut OrderedStore<'_>) -> R) -> R {
        let mut buf = vec![0u8; size];
        let mut heap = Heap::new(&mut buf);
        heap.format();
        let mut store = OrderedStore::new(heap);
        f(&mut store)
    }

    fn profile() -> Value {
        let mut t = Table::new();
        t.insert("name", "ada");
        t.insert("age", 36);
        t.insert("admin", true);
        Value::Table(t)
    }

    #[test]
    fn test_insert_get_each_type() {
        with_store(1 << 16, |store| {
            let cases = [
                (Value::from(1), Value::from(true)),
                (Value::from(2), Value::from(-0.5)),
                (Value::from(3), Value::from("text")),
                (Value::from(4), profile()),
            ];
            for (k, v) in &cases {
                store.insert(k, v, &mut NaturalOrder).unwrap();
            }
            for (k, v) in &cases {
                assert_eq!(&store.get(k, &mut NaturalOrder).unwrap(), v);
            }
            assert_eq!(store.len(), 4);
        });
    }

    #[test]
    fn test_duplicate_insert_is_key_exists() {
        with_store(1 << 16, |store| {
            let k = Value::from("k");
            store.insert(&k, &Value::from(1), &mut NaturalOrder).unwrap();
            let before = store.stats();
            let err = store.insert(&k, &profile(), &mut NaturalOrder).unwrap_err();
            assert!(matches!(err, Error::KeyExists));
            assert_eq!(store.len(), 1);
            assert_eq!(store.stats(), before);
        });
    }

    #[test]
    fn test_missing_key() {
        with_store(1 << 16, |store| {
            let k = Value::from("nope");
            assert!(matches!(store.get(&k, &mut NaturalOrder), Err(Error::KeyNotFound)));
            assert!(matches!(store.delete(&k, &mut NaturalOrder), Err(Error::KeyNotFound)));
            assert!(matches!(
                store.get_field(&k, &Value::from("f"), &mut NaturalOrder),
                Err(Error::KeyNotFound)
            ));
        });
    }

    #[test]
    fn test_get_field() {
        with_store(1 << 16, |store| {
            let k = Value::from("user");
            store.insert(&k, &profile(), &mut NaturalOrder).unwrap();
            store.insert(&Value::from("plain"), &Value::from(1), &mut NaturalOrder).unwrap();

            let name = store.get_field(&k, &Value::from("name"), &mut NaturalOrder).unwrap();
            assert_eq!(name, Value::from("ada"));
            assert!(matches!(
                store.get_field(&k, &Value::from("email"), &mut NaturalOrder),
                Err(Error::FieldNotFound)
            ));
            assert!(matches!(
                store.get_field(&Value::from("plain"), &Value::from("name"), &mut NaturalOrder),
                Err(Error::TypeMismatch)
            ));
        });
    }

    #[test]
    fn test_delete_frees_everything() {
        with_store(1 << 16, |store| {
            let baseline = store.stats();
            let k = Value::from("user");
            store.insert(&k, &profile(), &mut NaturalOrder).unwrap();
            store.delete(&k, &mut NaturalOrder).unwrap();
            assert!(matches!(store.get(&k, &mut NaturalOrder), Err(Error::KeyNotFound)));
            assert_eq!(store.stats(), baseline);
            assert!(store.is_empty());
        });
    }

    #[test]
    fn test_entries_follow_comparator() {
        with_store(1 << 16, |store| {
            let mut desc = |a: &Value, b: &Value| NaturalOrder.compare(b, a);
            for i in [5, 1, 9, 3, 7] {
                store.insert(&Value::from(i), &Value::from(i * 10), &mut desc).unwrap();
            }
            let keys: Vec<_> = store
                .entries()
                .unwrap()
                .into_iter()
                .map(|(k, _)| k.as_number().unwrap())
                .collect();
            assert_eq!(keys, vec![9.0, 7.0, 5.0, 3.0, 1.0]);
        });
    }

    #[test]
    fn test_comparator_sees_search_key_first() {
        with_store(1 << 16, |store| {
            store.insert(&Value::from("stored"), &Value::from(1), &mut NaturalOrder).unwrap();
            let mut seen = Vec::new();
            let mut spy = |a: &Value, b: &Value| {
                seen.push((a.clone(), b.clone()));
                std::cmp::Ordering::Less
            };
            let _ = store.get(&Value::from("probe"), &mut spy);
            assert_eq!(seen, vec![(Value::from("probe"), Value::from("stored"))]);
        });
    }

    #[test]
    fn test_out_of_memory_leaves_store_unchanged() {
        with_store(2048, |store| {
            store.insert(&Value::from(1), &Value::from(1), &mut NaturalOrder).unwrap();
            let before = store.stats();

            let big: Table = (0..200).map(|i| (i, "filler filler filler")).collect();
            let err = store
                .insert(&Value::from(2), &Value::Table(big), &mut NaturalOrder)
                .unwrap_err();
            assert!(matches!(err, Error::OutOfMemory { .. }));
            assert_eq!(store.stats(), before);
            assert_eq!(store.len(), 1);

            let huge = Value::from(vec![0u8; 4096]);
            assert!(matches!(
                store.insert(&Value::from(3), &huge, &mut NaturalOrder),
                Err(Error::OutOfMemory { .. })
            ));
            assert_eq!(store.stats(), before);
        });
    }
}
