//! Intrusive weight-balanced tree with order statistics.
//!
//! Each [`WbNode`] stores the size of its subtree. Balance is restored by
//! single or double rotations whenever one side outweighs the other by more
//! than [`WbTree::DELTA`], and subtree sizes make rank queries logarithmic:
//!
//! - [`select`](WbTree::select): node at a 0-based in-order position
//! - [`rank`](WbTree::rank): in-order position of a node
//! - [`nth_vacant_key`](WbTree::nth_vacant_key): the n-th integer key *not*
//!   in the tree, useful for allocating the lowest free id
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{BoxedWbStorage, WbTree};
//!
//! let mut storage: BoxedWbStorage<u32> = BoxedWbStorage::with_capacity(16);
//! let mut tree: WbTree<u32, BoxedWbStorage<u32>> = WbTree::new();
//! for id in [0, 1, 2, 4, 7] {
//!     tree.try_insert(&mut storage, id).unwrap();
//! }
//!
//! let third = tree.select(&storage, 3).unwrap();
//! assert_eq!(tree.get(&storage, third), Some(&4));
//! assert_eq!(tree.rank(&storage, third), 3);
//!
//! // Lowest unused ids: 3, 5, 6, 8, ...
//! assert_eq!(tree.nth_vacant_key(&storage, 0), Some(3));
//! assert_eq!(tree.nth_vacant_key(&storage, 3), Some(8));
//! ```

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::compare::{Compare, Keyed, Natural};
use crate::error::{InvariantError, ensure};
use crate::link::{self, Link, Node, Search};
use crate::{BoundedStorage, BoxedStorage, Full, Key, List, Storage, UnboundedStorage};

/// Bounded weight-balanced storage backed by a boxed allocation.
pub type BoxedWbStorage<T, K = u32> = BoxedStorage<WbNode<T, K>, K>;

/// Unbounded weight-balanced storage backed by `slab::Slab`.
#[cfg(feature = "slab")]
pub type SlabWbStorage<T> = slab::Slab<WbNode<T, usize>>;

/// A value plus the weight-balanced hook.
#[derive(Debug)]
pub struct WbNode<T, K: Key = u32> {
    value: T,
    link: Link<K>,
    weight: usize,
}

impl<T, K: Key> WbNode<T, K> {
    /// Creates an unlinked node.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            link: Link::UNLINKED,
            weight: 1,
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

impl<T: 'static, K: Key> Node<K> for WbNode<T, K> {
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

/// An intrusive weight-balanced tree.
///
/// Type parameters as for [`AvlTree`](crate::AvlTree).
#[derive(Debug)]
pub struct WbTree<T, S, K: Key = u32, C = Natural> {
    root: K,
    len: usize,
    _marker: PhantomData<(fn() -> T, fn() -> S, C)>,
}

impl<T, S, K: Key, C> Default for WbTree<T, S, K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, K: Key, C> WbTree<T, S, K, C> {
    /// A subtree is rebalanced once `weight(heavy) + 1` exceeds
    /// `DELTA * (weight(light) + 1)`.
    pub const DELTA: usize = 4;

    /// A double rotation is used when the heavy child's inner subtree is at
    /// least `RATIO` times its outer subtree (both plus one).
    pub const RATIO: usize = 2;

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

impl<T, S, K, C> WbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: Storage<WbNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    link::tree_lookup!(WbNode);

    /// Returns the height of the tree (0 when empty).
    pub fn height(&self, storage: &S) -> usize {
        link::height(storage, self.root)
    }

    // =========================================================================
    // Order statistics
    // =========================================================================

    /// Returns the size of the subtree rooted at `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    #[inline]
    pub fn weight(&self, storage: &S, node: K) -> usize {
        storage.get(node).expect("invalid key").weight
    }

    /// Returns the left and right children of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    #[inline]
    pub fn children(&self, storage: &S, node: K) -> [Option<K>; 2] {
        let hook = &storage.get(node).expect("invalid key").link;
        [hook.child(0), hook.child(1)]
    }

    /// Returns the node at 0-based in-order position `rank`.
    pub fn select(&self, storage: &S, mut rank: usize) -> Option<K> {
        let mut current = self.root;
        while current.is_some() {
            let left = link::child(storage, current, 0);
            let left_weight = Self::weight_of(storage, left);
            match rank.cmp(&left_weight) {
                Ordering::Less => current = left,
                Ordering::Equal => return Some(current),
                Ordering::Greater => {
                    rank -= left_weight + 1;
                    current = link::child(storage, current, 1);
                }
            }
        }
        None
    }

    /// Returns the 0-based in-order position of a linked node.
    pub fn rank(&self, storage: &S, node: K) -> usize {
        let mut rank = Self::weight_of(storage, link::child(storage, node, 0));
        let mut current = node;
        loop {
            let parent = link::parent(storage, current);
            if parent.is_none() {
                return rank;
            }
            if link::child(storage, parent, 1) == current {
                rank += Self::weight_of(storage, link::child(storage, parent, 0)) + 1;
            }
            current = parent;
        }
    }

    #[inline]
    fn weight_of(storage: &S, key: K) -> usize {
        if key.is_none() {
            0
        } else {
            link::node(storage, key).weight
        }
    }

    fn update_weight(storage: &mut S, key: K) {
        let [left, right] = link::link(storage, key).children;
        let weight = Self::weight_of(storage, left) + Self::weight_of(storage, right) + 1;
        link::node_mut(storage, key).weight = weight;
    }

    // =========================================================================
    // Balancing
    // =========================================================================

    fn rotate(&mut self, storage: &mut S, x: K, dir: usize) -> K {
        let weight = link::node(storage, x).weight;
        let y = link::rotate(storage, &mut self.root, x, dir);
        link::node_mut(storage, y).weight = weight;
        Self::update_weight(storage, x);
        y
    }

    /// Restores the weight bound at `x`, returning the subtree root.
    ///
    /// The rotated-up node always ends within the bound, but the nodes pushed
    /// down can be left just outside it after an erase, so each of those is
    /// rebalanced in turn. Their subtrees are strictly smaller, which bounds
    /// the recursion.
    fn rebalance(&mut self, storage: &mut S, x: K) -> K {
        let Some(heavy) = Self::heavy_side(storage, x) else {
            return x;
        };

        let child = link::child(storage, x, heavy);
        let inner = Self::weight_of(storage, link::child(storage, child, 1 - heavy)) + 1;
        let outer = Self::weight_of(storage, link::child(storage, child, heavy)) + 1;
        let double = inner >= Self::RATIO * outer;
        if double {
            self.rotate(storage, child, heavy);
        }
        let top = self.rotate(storage, x, 1 - heavy);

        self.rebalance(storage, x);
        if double {
            self.rebalance(storage, child);
        }
        top
    }

    // Side whose weight exceeds `DELTA` times the other, if any.
    fn heavy_side(storage: &S, x: K) -> Option<usize> {
        let [left, right] = link::link(storage, x).children;
        let left = Self::weight_of(storage, left) + 1;
        let right = Self::weight_of(storage, right) + 1;
        if right > Self::DELTA * left {
            Some(1)
        } else if left > Self::DELTA * right {
            Some(0)
        } else {
            None
        }
    }

    // Adjusts weights by one from `current` to the root, rebalancing each
    // ancestor on the way.
    fn retrace(&mut self, storage: &mut S, mut current: K, grew: bool) {
        while current.is_some() {
            let node = link::node_mut(storage, current);
            if grew {
                node.weight += 1;
            } else {
                node.weight -= 1;
            }
            let top = self.rebalance(storage, current);
            current = link::parent(storage, top);
        }
    }

    // =========================================================================
    // Insert / erase
    // =========================================================================

    /// Links an unlinked node already in storage.
    ///
    /// Returns the key of the node holding the key and whether `node` was
    /// linked. An equal key leaves the tree untouched.
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
        link::node_mut(storage, node).weight = 1;
        link::attach(storage, &mut self.root, parent, side, node);
        self.len += 1;
        self.retrace(storage, parent, true);
    }

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
        let weight = value.weight;

        let replacement = if left.is_some() && right.is_some() {
            // Splice from the heavier side.
            if Self::weight_of(storage, left) > Self::weight_of(storage, right) {
                link::extreme(storage, left, 1)
            } else {
                link::extreme(storage, right, 0)
            }
        } else {
            K::NONE
        };

        let (parent, _) = link::detach(storage, &mut self.root, node, replacement);
        if replacement.is_some() {
            link::node_mut(storage, replacement).weight = weight;
        }
        link::node_mut(storage, node).weight = 1;
        self.len -= 1;

        self.retrace(storage, parent, false);
        successor.into_option()
    }

    /// Unlinks a node and removes it from storage, returning its value.
    ///
    /// Returns `None` if `node` is not valid in storage.
    pub fn remove(&mut self, storage: &mut S, node: K) -> Option<T> {
        storage.get(node)?;
        self.erase(storage, node);
        storage.remove(node).map(WbNode::into_value)
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

    /// Verifies ordering, links, length, subtree weights and the `DELTA`
    /// bound at every node.
    pub fn check_invariants(&self, storage: &S) -> Result<(), InvariantError> {
        if self.root.is_some() {
            ensure!(
                link::parent(storage, self.root).is_none(),
                "root has a parent"
            );
        }
        let weight = self.check_subtree(storage, self.root, 0)?;
        ensure!(weight == self.len, "len {} but root weight {}", self.len, weight);

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

    fn check_subtree(&self, storage: &S, key: K, depth: usize) -> Result<usize, InvariantError> {
        if key.is_none() {
            return Ok(0);
        }
        ensure!(depth < self.len, "cycle below root");

        let node = storage
            .get(key)
            .ok_or_else(|| InvariantError::new("linked key is vacant"))?;
        let mut weights = [0; 2];
        for side in 0..2 {
            let child = node.link.children[side];
            if child.is_some() {
                ensure!(
                    storage.get(child).is_some_and(|c| c.link.parent == key),
                    "child parent link mismatch"
                );
            }
            weights[side] = self.check_subtree(storage, child, depth + 1)?;
        }
        let expected = weights[0] + weights[1] + 1;
        ensure!(
            node.weight == expected,
            "weight {} but subtree holds {}",
            node.weight,
            expected
        );
        let light = weights[0].min(weights[1]) + 1;
        let heavy = weights[0].max(weights[1]) + 1;
        ensure!(
            heavy <= Self::DELTA * light,
            "children weigh {} and {}, outside the bound",
            weights[0],
            weights[1]
        );
        Ok(expected)
    }
}

impl<T, S, K> WbTree<T, S, K, Natural>
where
    T: Keyed + 'static,
    T::Key: Copy + Ord + Into<u64>,
    K: Key,
    S: Storage<WbNode<T, K>, Key = K>,
{
    /// Returns the `n`-th smallest integer (from 0) that is not a key in the
    /// tree, in O(log n).
    ///
    /// Returns `None` if the answer does not fit in a `u64`.
    pub fn nth_vacant_key(&self, storage: &S, n: u64) -> Option<u64> {
        // `base` counts keys left of the current subtree.
        let mut base = 0u64;
        let mut current = self.root;
        while current.is_some() {
            let node = link::node(storage, current);
            let left = node.link.children[0];
            let left_weight = Self::weight_of(storage, left) as u64;
            let key: u64 = (*node.value.key()).into();

            let vacant_below = key - (base + left_weight);
            if n < vacant_below {
                current = left;
            } else {
                base += left_weight + 1;
                current = node.link.children[1];
            }
        }
        n.checked_add(base)
    }
}

impl<T, S, K, C> WbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: BoundedStorage<WbNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    /// Allocates a node for `value` and links it.
    ///
    /// A duplicate key allocates nothing and returns the existing key.
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
            .try_insert(WbNode::new(value))
            .map_err(|e| e.map(WbNode::into_value))?;
        self.link_at(storage, node, parent, side);
        Ok((node, true))
    }
}

impl<T, S, K, C> WbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: UnboundedStorage<WbNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    /// Allocates a node for `value` and links it.
    ///
    /// A duplicate key allocates nothing and returns the existing key.
    pub fn insert_value(&mut self, storage: &mut S, value: T) -> (K, bool) {
        let (parent, side) =
            match link::search(storage, self.root, |other: &T| C::compare(value.key(), other.key())) {
                Search::Found(existing) => return (existing, false),
                Search::Vacant { parent, side } => (parent, side),
            };
        let node = storage.insert(WbNode::new(value));
        self.link_at(storage, node, parent, side);
        (node, true)
    }
}
