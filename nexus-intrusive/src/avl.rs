//! Intrusive AVL tree over external storage.
//!
//! Nodes live in a [`Storage`] and are linked by key. The tree itself is just
//! a root key and a length: inserting, erasing and rebalancing only rewrite
//! the [`Link`] and balance tag embedded in each [`AvlNode`].
//!
//! Every node records which of its subtrees is taller (or neither). Insert
//! retraces towards the root and stops after the first rotation or as soon as
//! a subtree keeps its height. Erase replaces a two-child node with its
//! in-order neighbour from the taller side and retraces until a subtree keeps
//! its height.
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{AvlTree, BoxedAvlStorage};
//!
//! let mut storage: BoxedAvlStorage<u64> = BoxedAvlStorage::with_capacity(64);
//! let mut tree: AvlTree<u64, BoxedAvlStorage<u64>> = AvlTree::new();
//!
//! let (five, inserted) = tree.try_insert(&mut storage, 5).unwrap();
//! assert!(inserted);
//! tree.try_insert(&mut storage, 3).unwrap();
//! tree.try_insert(&mut storage, 8).unwrap();
//!
//! // Insert-if-absent: the existing node wins.
//! assert_eq!(tree.try_insert(&mut storage, 5).unwrap(), (five, false));
//!
//! assert_eq!(tree.find(&storage, &8).map(|k| tree.get(&storage, k)), Some(Some(&8)));
//! assert_eq!(tree.iter(&storage).copied().collect::<Vec<_>>(), vec![3, 5, 8]);
//!
//! assert_eq!(tree.remove(&mut storage, five), Some(5));
//! assert_eq!(tree.len(), 2);
//! ```

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::compare::{Compare, Keyed, Natural};
use crate::error::{InvariantError, ensure};
use crate::link::{self, Link, Node, Search};
use crate::{BoundedStorage, BoxedStorage, Full, Key, List, Storage, UnboundedStorage};

/// Bounded AVL storage backed by a boxed allocation.
pub type BoxedAvlStorage<T, K = u32> = BoxedStorage<AvlNode<T, K>, K>;

/// Unbounded AVL storage backed by `slab::Slab`.
#[cfg(feature = "slab")]
pub type SlabAvlStorage<T> = slab::Slab<AvlNode<T, usize>>;

/// A value plus the AVL hook.
#[derive(Debug)]
pub struct AvlNode<T, K: Key = u32> {
    value: T,
    link: Link<K>,
    /// -1: left subtree taller, 1: right subtree taller.
    balance: i8,
}

impl<T, K: Key> AvlNode<T, K> {
    /// Creates an unlinked node.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            link: Link::UNLINKED,
            balance: 0,
        }
    }

    /// Returns the value.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the value mutably.
    ///
    /// The ordering key must not change while the node is linked.
    #[inline]
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Consumes the node, returning the value.
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns `true` if the node has a parent or a child.
    ///
    /// The only node of a one-element tree has neither.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.link.is_linked()
    }
}

impl<T: 'static, K: Key> Node<K> for AvlNode<T, K> {
    type Value = T;

    #[inline]
    fn link(&self) -> &Link<K> {
        &self.link
    }

    #[inline]
    fn link_mut(&mut self) -> &mut Link<K> {
        &mut self.link
    }

    #[inline]
    fn value(&self) -> &T {
        &self.value
    }
}

#[inline]
const fn sign(side: usize) -> i8 {
    if side == 0 { -1 } else { 1 }
}

/// An intrusive AVL tree.
///
/// # Type Parameters
///
/// - `T`: element type, ordered by [`Keyed::key`]
/// - `S`: storage of [`AvlNode<T, K>`]
/// - `K`: storage key type (default `u32`)
/// - `C`: comparator over `T::Key` (default [`Natural`])
///
/// All operations must be given the same storage instance.
#[derive(Debug)]
pub struct AvlTree<T, S, K: Key = u32, C = Natural> {
    root: K,
    len: usize,
    _marker: PhantomData<(fn() -> T, fn() -> S, C)>,
}

impl<T, S, K: Key, C> Default for AvlTree<T, S, K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, K: Key, C> AvlTree<T, S, K, C> {
    /// Creates an empty tree.
    #[inline]
    pub const fn new() -> Self {
        Self {
            root: K::NONE,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Returns the number of linked nodes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the root key.
    #[inline]
    pub fn root(&self) -> Option<K> {
        self.root.into_option()
    }

    /// Swaps the contents of two trees sharing one storage.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.root, &mut other.root);
        core::mem::swap(&mut self.len, &mut other.len);
    }
}

// =============================================================================
// Lookup, iteration, structure
// =============================================================================

impl<T, S, K, C> AvlTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: Storage<AvlNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    link::tree_lookup!(AvlNode);

    /// Returns the height of the tree (0 when empty).
    pub fn height(&self, storage: &S) -> usize {
        // Follow the taller side; balance tags make this exact.
        let mut height = 0;
        let mut current = self.root;
        while current.is_some() {
            height += 1;
            let node = link::node(storage, current);
            let side = usize::from(node.balance > 0);
            current = node.link.children[side];
        }
        height
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Links an unlinked node already in storage.
    ///
    /// Returns the key of the node holding the key and whether `node` was
    /// linked. If an equal key is present the tree is left untouched and the
    /// existing key is returned with `false`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    pub fn insert(&mut self, storage: &mut S, node: K) -> (K, bool) {
        let value = storage.get(node).expect("invalid key");
        debug_assert!(!value.is_linked() && self.root != node, "node already linked");

        let key = value.value.key();
        match link::search(storage, self.root, |other: &T| C::compare(key, other.key())) {
            Search::Found(existing) => (existing, false),
            Search::Vacant { parent, side } => {
                self.link_at(storage, node, parent, side);
                (node, true)
            }
        }
    }

    fn link_at(&mut self, storage: &mut S, node: K, parent: K, side: usize) {
        link::node_mut(storage, node).balance = 0;
        link::attach(storage, &mut self.root, parent, side, node);
        self.len += 1;
        self.rebalance_after_insert(storage, node);
    }

    fn rebalance_after_insert(&mut self, storage: &mut S, mut child: K) {
        let mut parent = link::parent(storage, child);
        while parent.is_some() {
            let side = link::side_of(storage, parent, child);
            let delta = sign(side);
            let balance = link::node(storage, parent).balance;

            if balance == 0 {
                link::node_mut(storage, parent).balance = delta;
                child = parent;
                parent = link::parent(storage, child);
                continue;
            }
            if balance == -delta {
                link::node_mut(storage, parent).balance = 0;
                return;
            }

            // parent is now two levels taller on `side`.
            if link::node(storage, child).balance == delta {
                link::rotate(storage, &mut self.root, parent, 1 - side);
                link::node_mut(storage, parent).balance = 0;
                link::node_mut(storage, child).balance = 0;
            } else {
                let pivot = link::child(storage, child, 1 - side);
                link::rotate(storage, &mut self.root, child, side);
                link::rotate(storage, &mut self.root, parent, 1 - side);
                self.fix_double_rotation(storage, parent, child, pivot, delta);
            }
            return;
        }
    }

    /// Balance tags after a double rotation lifted `pivot` above `outer` and
    /// `inner`. `outer` ends at `-delta` if `pivot` leaned `delta`, `inner`
    /// ends at `delta` if `pivot` leaned `-delta`.
    fn fix_double_rotation(&mut self, storage: &mut S, outer: K, inner: K, pivot: K, delta: i8) {
        let pivot_balance = link::node(storage, pivot).balance;
        link::node_mut(storage, outer).balance = if pivot_balance == delta { -delta } else { 0 };
        link::node_mut(storage, inner).balance = if pivot_balance == -delta { delta } else { 0 };
        link::node_mut(storage, pivot).balance = 0;
    }

    // =========================================================================
    // Erase
    // =========================================================================

    /// Unlinks a node, leaving it in storage.
    ///
    /// Returns the in-order successor of the erased node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    pub fn erase(&mut self, storage: &mut S, node: K) -> Option<K> {
        let value = storage.get(node).expect("invalid key");
        debug_assert!(value.is_linked() || self.root == node, "node not linked");

        let successor = link::step(storage, node, 1);
        let [left, right] = value.link.children;
        let balance = value.balance;

        let replacement = if left.is_some() && right.is_some() {
            // Take the neighbour from the taller side.
            if balance < 0 {
                link::extreme(storage, left, 1)
            } else {
                link::extreme(storage, right, 0)
            }
        } else {
            K::NONE
        };

        let (parent, side) = link::detach(storage, &mut self.root, node, replacement);
        if replacement.is_some() {
            link::node_mut(storage, replacement).balance = balance;
        }
        link::node_mut(storage, node).balance = 0;
        self.len -= 1;

        self.rebalance_after_erase(storage, parent, side);
        successor.into_option()
    }

    fn rebalance_after_erase(&mut self, storage: &mut S, mut node: K, mut side: usize) {
        while node.is_some() {
            // `side` of `node` lost one level.
            let delta = sign(side);
            let balance = link::node(storage, node).balance;
            let parent = link::parent(storage, node);
            let parent_side = if parent.is_some() {
                link::side_of(storage, parent, node)
            } else {
                0
            };

            if balance == delta {
                link::node_mut(storage, node).balance = 0;
            } else if balance == 0 {
                link::node_mut(storage, node).balance = -delta;
                return;
            } else {
                let sibling = link::child(storage, node, 1 - side);
                let sibling_balance = link::node(storage, sibling).balance;

                if sibling_balance == 0 {
                    link::rotate(storage, &mut self.root, node, side);
                    link::node_mut(storage, node).balance = -delta;
                    link::node_mut(storage, sibling).balance = delta;
                    return;
                } else if sibling_balance == -delta {
                    link::rotate(storage, &mut self.root, node, side);
                    link::node_mut(storage, node).balance = 0;
                    link::node_mut(storage, sibling).balance = 0;
                } else {
                    let pivot = link::child(storage, sibling, side);
                    link::rotate(storage, &mut self.root, sibling, 1 - side);
                    link::rotate(storage, &mut self.root, node, side);
                    self.fix_double_rotation(storage, sibling, node, pivot, delta);
                }
            }

            node = parent;
            side = parent_side;
        }
    }

    /// Unlinks a node and removes it from storage, returning its value.
    ///
    /// Returns `None` if `node` is not valid in storage.
    pub fn remove(&mut self, storage: &mut S, node: K) -> Option<T> {
        storage.get(node)?;
        self.erase(storage, node);
        storage.remove(node).map(AvlNode::into_value)
    }

    /// Unlinks every node, leaving them in storage.
    pub fn clear(&mut self, storage: &mut S) {
        link::unlink_subtree(storage, self.root);
        self.root = K::NONE;
        self.len = 0;
    }

    /// Converts the tree into a sorted [`List`] in O(n).
    ///
    /// The tree is empty afterwards.
    pub fn flatten(&mut self, storage: &mut S) -> List<K> {
        let (head, tail) = link::flatten(storage, self.root);
        let list = List::from_raw(head, tail, self.len);
        self.root = K::NONE;
        self.len = 0;
        list
    }

    /// Verifies ordering, links, length, heights and balance tags.
    pub fn check_invariants(&self, storage: &S) -> Result<(), InvariantError> {
        if self.root.is_some() {
            ensure!(
                link::parent(storage, self.root).is_none(),
                "root has a parent"
            );
        }
        let mut count = 0;
        self.check_subtree(storage, self.root, &mut count)?;
        ensure!(count == self.len, "len {} but {} nodes reachable", self.len, count);

        let mut prev: Option<&T> = None;
        for value in self.iter(storage) {
            if let Some(prev) = prev {
                ensure!(
                    C::compare(prev.key(), value.key()) == Ordering::Less,
                    "in-order keys not strictly increasing"
                );
            }
            prev = Some(value);
        }
        Ok(())
    }

    fn check_subtree(&self, storage: &S, key: K, count: &mut usize) -> Result<usize, InvariantError> {
        if key.is_none() {
            return Ok(0);
        }
        *count += 1;
        ensure!(*count <= self.len, "cycle or stray nodes below root");

        let node = storage
            .get(key)
            .ok_or_else(|| InvariantError::new("linked key is vacant"))?;
        let mut heights = [0; 2];
        for side in 0..2 {
            let child = node.link.children[side];
            if child.is_some() {
                ensure!(
                    storage.get(child).is_some_and(|c| c.link.parent == key),
                    "child parent link mismatch"
                );
            }
            heights[side] = self.check_subtree(storage, child, count)?;
        }

        let diff = heights[1] as isize - heights[0] as isize;
        ensure!(diff.abs() <= 1, "height difference {} at node", diff);
        ensure!(
            diff == node.balance as isize,
            "balance tag {} but heights differ by {}",
            node.balance,
            diff
        );
        Ok(1 + heights[0].max(heights[1]))
    }
}

// =============================================================================
// Allocation helpers
// =============================================================================

impl<T, S, K, C> AvlTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: BoundedStorage<AvlNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    /// Allocates a node for `value` and links it.
    ///
    /// If an equal key is present nothing is allocated, `value` is dropped
    /// and the existing key is returned with `false`.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if storage is full.
    pub fn try_insert(&mut self, storage: &mut S, value: T) -> Result<(K, bool), Full<T>> {
        let (parent, side) =
            match link::search(storage, self.root, |other: &T| C::compare(value.key(), other.key())) {
                Search::Found(existing) => return Ok((existing, false)),
                Search::Vacant { parent, side } => (parent, side),
            };
        let node = storage
            .try_insert(AvlNode::new(value))
            .map_err(|e| e.map(AvlNode::into_value))?;
        self.link_at(storage, node, parent, side);
        Ok((node, true))
    }
}

impl<T, S, K, C> AvlTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: UnboundedStorage<AvlNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    /// Allocates a node for `value` and links it.
    ///
    /// If an equal key is present nothing is allocated, `value` is dropped
    /// and the existing key is returned with `false`.
    pub fn insert_value(&mut self, storage: &mut S, value: T) -> (K, bool) {
        let (parent, side) =
            match link::search(storage, self.root, |other: &T| C::compare(value.key(), other.key())) {
                Search::Found(existing) => return (existing, false),
                Search::Vacant { parent, side } => (parent, side),
            };
        let node = storage.insert(AvlNode::new(value));
        self.link_at(storage, node, parent, side);
        (node, true)
    }
}


#[cfg(test)]
mod bench_boxed_storage {
    use super::*;
    use hdrhistogram::Histogram;

    #[inline]
    fn rdtscp() -> u64 {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            core::arch::x86_64::__rdtscp(&mut 0)
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            use std::sync::OnceLock;
            use std::time::Instant;
            static EPOCH: OnceLock<Instant> = OnceLock::new();
            EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
        }
    }

    fn print_histogram(name: &str, hist: &Histogram<u64>) {
        println!(
            "{:24} p50: {:4} cycles | p99: {:4} cycles | p999: {:5} cycles | min: {:4} | max: {:5}",
            name,
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.min(),
            hist.max(),
        );
    }

    const RESIDENT: u64 = 10_000;
    const WARMUP: u64 = 10_000;
    const ITERATIONS: u64 = 100_000;

    #[test]
    #[ignore]
    fn bench_avl_insert_remove() {
        let mut storage: BoxedAvlStorage<u64> =
            BoxedAvlStorage::with_capacity(RESIDENT as usize + 1);
        let mut tree: AvlTree<u64, BoxedAvlStorage<u64>> = AvlTree::new();
        for v in 0..RESIDENT {
            let _ = tree.try_insert(&mut storage, v * 2);
        }
        let mut hist = Histogram::<u64>::new(3).unwrap();

        for i in 0..WARMUP + ITERATIONS {
            let value = (i % RESIDENT) * 2 + 1;
            let start = rdtscp();
            let (key, _) = tree.try_insert(&mut storage, value).unwrap();
            let _ = tree.remove(&mut storage, key);
            let elapsed = rdtscp().wrapping_sub(start);
            if i >= WARMUP {
                hist.record(elapsed).unwrap();
            }
        }

        print_histogram("avl insert+remove", &hist);
    }
}
