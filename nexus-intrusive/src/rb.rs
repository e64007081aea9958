//! Intrusive red-black tree over external storage.
//!
//! Same model as [`AvlTree`](crate::AvlTree): nodes sit in a [`Storage`],
//! the tree holds a root key and a length, and every structural change only
//! rewrites embedded [`Link`]s. Colour is a side field of [`RbNode`].
//!
//! Red-black trees rotate less than AVL trees on erase (at most three
//! rotations) at the cost of a looser height bound of `2 * log2(n + 1)`.
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{BoxedRbStorage, RbTree};
//!
//! let mut storage: BoxedRbStorage<(u64, &str)> = BoxedRbStorage::with_capacity(16);
//! let mut tree: RbTree<(u64, &str), BoxedRbStorage<(u64, &str)>> = RbTree::new();
//!
//! tree.try_insert(&mut storage, (20, "b")).unwrap();
//! let (a, _) = tree.try_insert(&mut storage, (10, "a")).unwrap();
//!
//! assert_eq!(tree.find(&storage, &10), Some(a));
//! assert_eq!(tree.get(&storage, a), Some(&(10, "a")));
//! ```

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::compare::{Compare, Keyed, Natural};
use crate::error::{InvariantError, ensure};
use crate::link::{self, Link, Node, Search};
use crate::{BoundedStorage, BoxedStorage, Full, Key, List, Storage, UnboundedStorage};

/// Bounded red-black storage backed by a boxed allocation.
pub type BoxedRbStorage<T, K = u32> = BoxedStorage<RbNode<T, K>, K>;

/// Unbounded red-black storage backed by `slab::Slab`.
#[cfg(feature = "slab")]
pub type SlabRbStorage<T> = slab::Slab<RbNode<T, usize>>;

/// A value plus the red-black hook.
#[derive(Debug)]
pub struct RbNode<T, K: Key = u32> {
    value: T,
    link: Link<K>,
    red: bool,
}

impl<T, K: Key> RbNode<T, K> {
    /// Creates an unlinked node.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            link: Link::UNLINKED,
            red: false,
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

impl<T: 'static, K: Key> Node<K> for RbNode<T, K> {
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

/// An intrusive red-black tree.
///
/// Type parameters as for [`AvlTree`](crate::AvlTree).
#[derive(Debug)]
pub struct RbTree<T, S, K: Key = u32, C = Natural> {
    root: K,
    len: usize,
    _marker: PhantomData<(fn() -> T, fn() -> S, C)>,
}

impl<T, S, K: Key, C> Default for RbTree<T, S, K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, K: Key, C> RbTree<T, S, K, C> {
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

impl<T, S, K, C> RbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: Storage<RbNode<T, K>, Key = K>,
    C: Compare<T::Key>,
{
    link::tree_lookup!(RbNode);

    /// Returns the height of the tree (0 when empty).
    pub fn height(&self, storage: &S) -> usize {
        link::height(storage, self.root)
    }

    #[inline]
    fn is_red(storage: &S, key: K) -> bool {
        key.is_some() && link::node(storage, key).red
    }

    #[inline]
    fn set_red(storage: &mut S, key: K, red: bool) {
        link::node_mut(storage, key).red = red;
    }

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
        Self::set_red(storage, node, true);
        link::attach(storage, &mut self.root, parent, side, node);
        self.len += 1;
        self.rebalance_after_insert(storage, node);
    }

    fn rebalance_after_insert(&mut self, storage: &mut S, mut node: K) {
        loop {
            let mut parent = link::parent(storage, node);
            if !Self::is_red(storage, parent) {
                break;
            }
            // A red parent is never the root.
            let grand = link::parent(storage, parent);
            let parent_side = link::side_of(storage, grand, parent);
            let uncle = link::child(storage, grand, 1 - parent_side);

            if Self::is_red(storage, uncle) {
                Self::set_red(storage, parent, false);
                Self::set_red(storage, uncle, false);
                Self::set_red(storage, grand, true);
                node = grand;
                continue;
            }

            if link::side_of(storage, parent, node) != parent_side {
                link::rotate(storage, &mut self.root, parent, parent_side);
                parent = node;
            }
            link::rotate(storage, &mut self.root, grand, 1 - parent_side);
            Self::set_red(storage, parent, false);
            Self::set_red(storage, grand, true);
            break;
        }
        Self::set_red(storage, self.root, false);
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
        let red = value.red;

        let (replacement, removed_red) = if left.is_some() && right.is_some() {
            let next = link::extreme(storage, right, 0);
            (next, Self::is_red(storage, next))
        } else {
            (K::NONE, red)
        };

        let (parent, side) = link::detach(storage, &mut self.root, node, replacement);
        if replacement.is_some() {
            Self::set_red(storage, replacement, red);
        }
        Self::set_red(storage, node, false);
        self.len -= 1;

        if !removed_red {
            self.rebalance_after_erase(storage, parent, side);
        }
        successor.into_option()
    }

    // `parent.children[side]` lost one black node on every path through it.
    fn rebalance_after_erase(&mut self, storage: &mut S, mut parent: K, mut side: usize) {
        let mut node = if parent.is_some() {
            link::child(storage, parent, side)
        } else {
            self.root
        };

        while parent.is_some() && !Self::is_red(storage, node) {
            let mut sibling = link::child(storage, parent, 1 - side);

            if Self::is_red(storage, sibling) {
                Self::set_red(storage, sibling, false);
                Self::set_red(storage, parent, true);
                link::rotate(storage, &mut self.root, parent, side);
                sibling = link::child(storage, parent, 1 - side);
            }

            let near = link::child(storage, sibling, side);
            let far = link::child(storage, sibling, 1 - side);
            if !Self::is_red(storage, near) && !Self::is_red(storage, far) {
                Self::set_red(storage, sibling, true);
                node = parent;
                parent = link::parent(storage, node);
                if parent.is_some() {
                    side = link::side_of(storage, parent, node);
                }
                continue;
            }

            if !Self::is_red(storage, far) {
                Self::set_red(storage, near, false);
                Self::set_red(storage, sibling, true);
                link::rotate(storage, &mut self.root, sibling, 1 - side);
                sibling = link::child(storage, parent, 1 - side);
            }

            let parent_red = Self::is_red(storage, parent);
            Self::set_red(storage, sibling, parent_red);
            Self::set_red(storage, parent, false);
            let far = link::child(storage, sibling, 1 - side);
            Self::set_red(storage, far, false);
            link::rotate(storage, &mut self.root, parent, side);
            node = self.root;
            break;
        }

        if node.is_some() {
            Self::set_red(storage, node, false);
        }
    }

    /// Unlinks a node and removes it from storage, returning its value.
    ///
    /// Returns `None` if `node` is not valid in storage.
    pub fn remove(&mut self, storage: &mut S, node: K) -> Option<T> {
        storage.get(node)?;
        self.erase(storage, node);
        storage.remove(node).map(RbNode::into_value)
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

    /// Verifies ordering, links, length and the colour rules.
    pub fn check_invariants(&self, storage: &S) -> Result<(), InvariantError> {
        if self.root.is_some() {
            ensure!(
                link::parent(storage, self.root).is_none(),
                "root has a parent"
            );
            ensure!(!Self::is_red(storage, self.root), "root is red");
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

    // Returns the black height.
    fn check_subtree(&self, storage: &S, key: K, count: &mut usize) -> Result<usize, InvariantError> {
        if key.is_none() {
            return Ok(1);
        }
        *count += 1;
        ensure!(*count <= self.len, "cycle or stray nodes below root");

        let node = storage
            .get(key)
            .ok_or_else(|| InvariantError::new("linked key is vacant"))?;
        let mut black = [0; 2];
        for side in 0..2 {
            let child = node.link.children[side];
            if child.is_some() {
                let child_node = storage
                    .get(child)
                    .ok_or_else(|| InvariantError::new("linked key is vacant"))?;
                ensure!(child_node.link.parent == key, "child parent link mismatch");
                ensure!(!(node.red && child_node.red), "red node with red child");
            }
            black[side] = self.check_subtree(storage, child, count)?;
        }
        ensure!(
            black[0] == black[1],
            "black heights differ: {} vs {}",
            black[0],
            black[1]
        );
        Ok(black[0] + usize::from(!node.red))
    }
}

impl<T, S, K, C> RbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: BoundedStorage<RbNode<T, K>, Key = K>,
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
            .try_insert(RbNode::new(value))
            .map_err(|e| e.map(RbNode::into_value))?;
        self.link_at(storage, node, parent, side);
        Ok((node, true))
    }
}

impl<T, S, K, C> RbTree<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: UnboundedStorage<RbNode<T, K>, Key = K>,
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
        let node = storage.insert(RbNode::new(value));
        self.link_at(storage, node, parent, side);
        (node, true)
    }
}
