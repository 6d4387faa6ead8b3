//! Offset-linked red-black tree
//!
//! Nodes live in the heap and link to each other by offset; the tree is
//! described by a [`TreeHeader`] that the caller loads and stores. The
//! sentinel is [`NIL`]: black, childless, and never written to.
//!
//! Ordering is not part of the tree. [`search`] takes a closure that
//! compares the sought key against a visited node, which is how the ordered
//! store plugs in a caller-supplied comparator and the nested index plugs in
//! its fixed hash order.

use std::cmp::Ordering;

use shmtree_core::{Error, Result};
use smallvec::SmallVec;

use crate::heap::{Heap, Offset, TreeHeader, NIL};

/// Which child slot of the parent a new node goes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left child
    Left,
    /// Right child
    Right,
}

/// Outcome of a tree search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A node compared equal
    Found(Offset),
    /// No match; a new node belongs under `parent` on `side`
    /// (`parent == NIL` for an empty tree)
    Vacant {
        /// Parent of the empty slot
        parent: Offset,
        /// Child slot of the parent
        side: Side,
    },
}

type Stack = SmallVec<[Offset; 64]>;

/// Walk from the root, descending by `cmp(node)`
///
/// `Less` means the sought key sorts before the node and the walk goes left.
pub fn search<F>(heap: &Heap<'_>, tree: &TreeHeader, mut cmp: F) -> Result<Slot>
where
    F: FnMut(&Heap<'_>, Offset) -> Result<Ordering>,
{
    let mut parent = NIL;
    let mut side = Side::Left;
    let mut node = tree.root;
    let mut steps = 0u32;

    while node != NIL {
        steps += 1;
        if steps > tree.len {
            return Err(Error::corruption("tree walk longer than tree size"));
        }
        match cmp(heap, node)? {
            Ordering::Less => {
                parent = node;
                side = Side::Left;
                node = heap.left(node);
            }
            Ordering::Greater => {
                parent = node;
                side = Side::Right;
                node = heap.right(node);
            }
            Ordering::Equal => return Ok(Slot::Found(node)),
        }
    }
    Ok(Slot::Vacant { parent, side })
}

/// Link a freshly allocated node into an empty slot found by [`search`],
/// then rebalance
pub fn link(heap: &mut Heap<'_>, tree: &mut TreeHeader, node: Offset, parent: Offset, side: Side) {
    heap.set_parent(node, parent);
    heap.set_left(node, NIL);
    heap.set_right(node, NIL);
    heap.set_red(node, true);

    if parent == NIL {
        tree.root = node;
    } else {
        match side {
            Side::Left => heap.set_left(parent, node),
            Side::Right => heap.set_right(parent, node),
        }
    }

    insert_fixup(heap, tree, node);
    tree.len += 1;
}

/// Unlink a node and rebalance. The node's block is not freed.
pub fn unlink(heap: &mut Heap<'_>, tree: &mut TreeHeader, z: Offset) {
    let mut removed_red = heap.is_red(z);
    let x;
    let x_parent;

    if heap.left(z) == NIL {
        x = heap.right(z);
        x_parent = heap.parent(z);
        transplant(heap, tree, z, x);
    } else if heap.right(z) == NIL {
        x = heap.left(z);
        x_parent = heap.parent(z);
        transplant(heap, tree, z, x);
    } else {
        let y = minimum(heap, heap.right(z));
        removed_red = heap.is_red(y);
        x = heap.right(y);

        if heap.parent(y) == z {
            x_parent = y;
        } else {
            x_parent = heap.parent(y);
            transplant(heap, tree, y, x);
            let zr = heap.right(z);
            heap.set_right(y, zr);
            heap.set_parent(zr, y);
        }

        transplant(heap, tree, z, y);
        let zl = heap.left(z);
        heap.set_left(y, zl);
        heap.set_parent(zl, y);
        let z_red = heap.is_red(z);
        heap.set_red(y, z_red);
    }

    if !removed_red {
        delete_fixup(heap, tree, x, x_parent);
    }
    tree.len -= 1;
}

/// In-order node offsets
pub fn in_order(heap: &Heap<'_>, tree: &TreeHeader) -> Result<Vec<Offset>> {
    let mut out = Vec::with_capacity(tree.len as usize);
    let mut stack = Stack::new();
    let mut node = tree.root;

    while node != NIL || !stack.is_empty() {
        while node != NIL {
            stack.push(node);
            node = heap.left(node);
            guard_len(&stack, out.len(), tree)?;
        }
        if let Some(top) = stack.pop() {
            out.push(top);
            node = heap.right(top);
        }
    }
    Ok(out)
}

/// Post-order node offsets: every node appears after both of its children
pub fn post_order(heap: &Heap<'_>, tree: &TreeHeader) -> Result<Vec<Offset>> {
    let mut out = Vec::with_capacity(tree.len as usize);
    if tree.root == NIL {
        return Ok(out);
    }

    // Reverse of a root-right-left preorder
    let mut stack: Stack = SmallVec::new();
    stack.push(tree.root);
    while let Some(node) = stack.pop() {
        out.push(node);
        guard_len(&stack, out.len(), tree)?;
        let (l, r) = (heap.left(node), heap.right(node));
        if l != NIL {
            stack.push(l);
        }
        if r != NIL {
            stack.push(r);
        }
    }
    out.reverse();
    Ok(out)
}

fn guard_len(stack: &Stack, emitted: usize, tree: &TreeHeader) -> Result<()> {
    if stack.len() + emitted > tree.len as usize {
        return Err(Error::corruption("tree holds more nodes than its header says"));
    }
    Ok(())
}

fn minimum(heap: &Heap<'_>, mut node: Offset) -> Offset {
    while heap.left(node) != NIL {
        node = heap.left(node);
    }
    node
}

/// Replace the subtree rooted at `u` with the one rooted at `v`
fn transplant(heap: &mut Heap<'_>, tree: &mut TreeHeader, u: Offset, v: Offset) {
    let p = heap.parent(u);
    if p == NIL {
        tree.root = v;
    } else if u == heap.left(p) {
        heap.set_left(p, v);
    } else {
        heap.set_right(p, v);
    }
    heap.set_parent(v, p);
}

fn rotate_left(heap: &mut Heap<'_>, tree: &mut TreeHeader, x: Offset) {
    let y = heap.right(x);
    let yl = heap.left(y);
    heap.set_right(x, yl);
    heap.set_parent(yl, x);

    let p = heap.parent(x);
    heap.set_parent(y, p);
    if p == NIL {
        tree.root = y;
    } else if x == heap.left(p) {
        heap.set_left(p, y);
    } else {
        heap.set_right(p, y);
    }

    heap.set_left(y, x);
    heap.set_parent(x, y);
}

fn rotate_right(heap: &mut Heap<'_>, tree: &mut TreeHeader, x: Offset) {
    let y = heap.left(x);
    let yr = heap.right(y);
    heap.set_left(x, yr);
    heap.set_parent(yr, x);

    let p = heap.parent(x);
    heap.set_parent(y, p);
    if p == NIL {
        tree.root = y;
    } else if x == heap.right(p) {
        heap.set_right(p, y);
    } else {
        heap.set_left(p, y);
    }

    heap.set_right(y, x);
    heap.set_parent(x, y);
}

fn insert_fixup(heap: &mut Heap<'_>, tree: &mut TreeHeader, mut z: Offset) {
    // A red parent is never the root, so the grandparent exists
    while heap.is_red(heap.parent(z)) {
        let p = heap.parent(z);
        let g = heap.parent(p);

        if p == heap.left(g) {
            let uncle = heap.right(g);
            if heap.is_red(uncle) {
                heap.set_red(p, false);
                heap.set_red(uncle, false);
                heap.set_red(g, true);
                z = g;
            } else {
                if z == heap.right(p) {
                    z = p;
                    rotate_left(heap, tree, z);
                }
                let p = heap.parent(z);
                let g = heap.parent(p);
                heap.set_red(p, false);
                heap.set_red(g, true);
                rotate_right(heap, tree, g);
            }
        } else {
            let uncle = heap.left(g);
            if heap.is_red(uncle) {
                heap.set_red(p, false);
                heap.set_red(uncle, false);
                heap.set_red(g, true);
                z = g;
            } else {
                if z == heap.left(p) {
                    z = p;
                    rotate_right(heap, tree, z);
                }
                let p = heap.parent(z);
                let g = heap.parent(p);
                heap.set_red(p, false);
                heap.set_red(g, true);
                rotate_left(heap, tree, g);
            }
        }
    }
    heap.set_red(tree.root, false);
}

/// `x` may be the sentinel, so its parent is tracked separately
fn delete_fixup(heap: &mut Heap<'_>, tree: &mut TreeHeader, mut x: Offset, mut parent: Offset) {
    while x != tree.root && !heap.is_red(x) {
        if x == heap.left(parent) {
            let mut w = heap.right(parent);
            if heap.is_red(w) {
                heap.set_red(w, false);
                heap.set_red(parent, true);
                rotate_left(heap, tree, parent);
                w = heap.right(parent);
            }
            if !heap.is_red(heap.left(w)) && !heap.is_red(heap.right(w)) {
                heap.set_red(w, true);
                x = parent;
                parent = heap.parent(x);
            } else {
                if !heap.is_red(heap.right(w)) {
                    let wl = heap.left(w);
                    heap.set_red(wl, false);
                    heap.set_red(w, true);
                    rotate_right(heap, tree, w);
                    w = heap.right(parent);
                }
                let parent_red = heap.is_red(parent);
                heap.set_red(w, parent_red);
                heap.set_red(parent, false);
                let wr = heap.right(w);
                heap.set_red(wr, false);
                rotate_left(heap, tree, parent);
                x = tree.root;
                parent = NIL;
            }
        } else {
            let mut w = heap.left(parent);
            if heap.is_red(w) {
                heap.set_red(w, false);
                heap.set_red(parent, true);
                rotate_right(heap, tree, parent);
                w = heap.left(parent);
            }
            if !heap.is_red(heap.right(w)) && !heap.is_red(heap.left(w)) {
                heap.set_red(w, true);
                x = parent;
                parent = heap.parent(x);
            } else {
                if !heap.is_red(heap.left(w)) {
                    let wr = heap.right(w);
                    heap.set_red(wr, false);
                    heap.set_red(w, true);
                    rotate_left(heap, tree, w);
                    w = heap.left(parent);
                }
                let parent_red = heap.is_red(parent);
                heap.set_red(w, parent_red);
                heap.set_red(parent, false);
                let wl = heap.left(w);
                heap.set_red(wl, false);
                rotate_right(heap, tree, parent);
                x = tree.root;
                parent = NIL;
            }
        }
    }
    heap.set_red(x, false);
}
