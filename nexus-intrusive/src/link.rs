//! Embedded links and the binary-tree plumbing shared by every container.
//!
//! Each node type embeds a [`Link`]: two child keys and a parent key. Trees
//! and the heap use it as a binary tree, the flatten [`List`](crate::List)
//! reuses the same fields as prev/next. Extra bookkeeping (balance, colour,
//! weight) lives in a separate field of each node type.
//!
//! The functions in this module operate on any [`Node`] through a
//! [`Storage`], and follow links with unchecked storage access: a key found in
//! a link of a linked node is always occupied.

use core::cmp::Ordering;
use core::marker::PhantomData;

use crate::{Key, Storage};

/// The hook embedded in every node.
///
/// `children[0]` is the left child and `children[1]` the right child. `parent`
/// is `NONE` for a root. A node that is not linked into any container has all
/// three fields set to `NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<K: Key> {
    pub(crate) children: [K; 2],
    pub(crate) parent: K,
}

impl<K: Key> Link<K> {
    /// An unlinked hook.
    pub const UNLINKED: Self = Self {
        children: [K::NONE; 2],
        parent: K::NONE,
    };

    /// Returns the left (`0`) or right (`1`) child.
    #[inline]
    pub fn child(&self, side: usize) -> Option<K> {
        self.children[side].into_option()
    }

    /// Returns the parent, or `None` for a root.
    #[inline]
    pub fn parent(&self) -> Option<K> {
        self.parent.into_option()
    }

    /// Returns `true` if any field is set.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.parent.is_some() || self.children[0].is_some() || self.children[1].is_some()
    }
}

impl<K: Key> Default for Link<K> {
    fn default() -> Self {
        Self::UNLINKED
    }
}

/// A storage element carrying a [`Link`] and a user value.
///
/// Nodes are plain data owned by their storage, so node and value types are
/// `'static`.
pub trait Node<K: Key>: 'static {
    /// User value type.
    type Value: 'static;

    /// Returns the embedded link.
    fn link(&self) -> &Link<K>;

    /// Returns the embedded link mutably.
    fn link_mut(&mut self) -> &mut Link<K>;

    /// Returns the user value.
    fn value(&self) -> &Self::Value;
}

// =============================================================================
// Link access
// =============================================================================

#[inline]
pub(crate) fn node<N, S, K>(storage: &S, key: K) -> &N
where
    K: Key,
    S: Storage<N, Key = K>,
{
    debug_assert!(key.is_some());
    // Safety: only called with keys read from container links
    unsafe { storage.get_unchecked(key) }
}

#[inline]
pub(crate) fn node_mut<N, S, K>(storage: &mut S, key: K) -> &mut N
where
    K: Key,
    S: Storage<N, Key = K>,
{
    debug_assert!(key.is_some());
    // Safety: only called with keys read from container links
    unsafe { storage.get_unchecked_mut(key) }
}

#[inline]
pub(crate) fn link<N, S, K>(storage: &S, key: K) -> &Link<K>
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    node(storage, key).link()
}

#[inline]
pub(crate) fn link_mut<N, S, K>(storage: &mut S, key: K) -> &mut Link<K>
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    node_mut(storage, key).link_mut()
}

#[inline]
pub(crate) fn child<N, S, K>(storage: &S, key: K, side: usize) -> K
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    link(storage, key).children[side]
}

#[inline]
pub(crate) fn parent<N, S, K>(storage: &S, key: K) -> K
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    link(storage, key).parent
}

#[inline]
pub(crate) fn set_child<N, S, K>(storage: &mut S, key: K, side: usize, child: K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    link_mut(storage, key).children[side] = child;
}

#[inline]
pub(crate) fn set_parent<N, S, K>(storage: &mut S, key: K, parent: K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    if key.is_some() {
        link_mut(storage, key).parent = parent;
    }
}

/// Returns which child slot of `parent` holds `key`.
#[inline]
pub(crate) fn side_of<N, S, K>(storage: &S, parent: K, key: K) -> usize
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    usize::from(link(storage, parent).children[0] != key)
}

/// Points whatever referenced `old` (a parent slot or the root) at `new`.
#[inline]
pub(crate) fn replace_child<N, S, K>(storage: &mut S, root: &mut K, parent: K, old: K, new: K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    if parent.is_none() {
        *root = new;
    } else {
        let side = side_of(storage, parent, old);
        set_child(storage, parent, side, new);
    }
}

// =============================================================================
// Binary tree plumbing
// =============================================================================

/// Result of a binary search down a tree.
pub(crate) enum Search<K> {
    /// A node with an equal key.
    Found(K),
    /// No equal key; a new node belongs at `parent.children[side]`
    /// (or at the root when `parent` is `NONE`).
    Vacant { parent: K, side: usize },
}

/// Binary search from `root`. `cmp` orders the probe relative to a node value.
#[inline]
pub(crate) fn search<N, S, K>(
    storage: &S,
    root: K,
    mut cmp: impl FnMut(&N::Value) -> Ordering,
) -> Search<K>
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    let mut parent = K::NONE;
    let mut side = 0;
    let mut current = root;
    while current.is_some() {
        let node = node(storage, current);
        side = match cmp(node.value()) {
            Ordering::Less => 0,
            Ordering::Greater => 1,
            Ordering::Equal => return Search::Found(current),
        };
        parent = current;
        current = node.link().children[side];
    }
    Search::Vacant { parent, side }
}

/// Links the unlinked node `key` as a leaf at `parent.children[side]`.
#[inline]
pub(crate) fn attach<N, S, K>(storage: &mut S, root: &mut K, parent: K, side: usize, key: K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    *link_mut(storage, key) = Link {
        children: [K::NONE; 2],
        parent,
    };
    if parent.is_none() {
        *root = key;
    } else {
        set_child(storage, parent, side, key);
    }
}

/// Rotates `x` towards `dir`: the child on the opposite side takes x's place
/// and x becomes its `dir` child. Returns the risen child.
pub(crate) fn rotate<N, S, K>(storage: &mut S, root: &mut K, x: K, dir: usize) -> K
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    let y = child(storage, x, 1 - dir);
    debug_assert!(y.is_some(), "rotation without pivot");

    let inner = child(storage, y, dir);
    let x_parent = parent(storage, x);

    set_child(storage, x, 1 - dir, inner);
    set_parent(storage, inner, x);

    replace_child(storage, root, x_parent, x, y);
    set_parent(storage, y, x_parent);

    set_child(storage, y, dir, x);
    set_parent(storage, x, y);
    y
}

/// Descends from `key` along `side` as far as possible.
#[inline]
pub(crate) fn extreme<N, S, K>(storage: &S, mut key: K, side: usize) -> K
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    loop {
        let next = child(storage, key, side);
        if next.is_none() {
            return key;
        }
        key = next;
    }
}

/// In-order step. `side == 1` gives the successor, `side == 0` the
/// predecessor. Returns `NONE` past the end.
pub(crate) fn step<N, S, K>(storage: &S, key: K, side: usize) -> K
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    let next = child(storage, key, side);
    if next.is_some() {
        return extreme(storage, next, 1 - side);
    }

    // Climb until we arrive from the opposite side.
    let mut key = key;
    loop {
        let up = parent(storage, key);
        if up.is_none() || child(storage, up, 1 - side) == key {
            return up;
        }
        key = up;
    }
}

/// Unlinks `x` from the binary tree rooted at `root`.
///
/// When `x` has two children, `replacement` must be its in-order neighbour
/// (which has at most one child); it is moved into x's position and takes
/// over x's links. Otherwise `replacement` is `NONE` and x's only child, if
/// any, takes its place.
///
/// Returns the parent and child side of the position that lost a node, the
/// starting point for rebalancing. The parent is `NONE` when the root itself
/// was spliced out. x's link is reset to unlinked.
pub(crate) fn detach<N, S, K>(storage: &mut S, root: &mut K, x: K, replacement: K) -> (K, usize)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    let x_link = *link(storage, x);
    *link_mut(storage, x) = Link::UNLINKED;

    if replacement.is_none() {
        let only = if x_link.children[0].is_some() {
            x_link.children[0]
        } else {
            x_link.children[1]
        };
        let side = if x_link.parent.is_some() {
            side_of(storage, x_link.parent, x)
        } else {
            0
        };
        replace_child(storage, root, x_link.parent, x, only);
        set_parent(storage, only, x_link.parent);
        return (x_link.parent, side);
    }

    let y = replacement;
    let y_link = *link(storage, y);
    let y_child = if y_link.children[0].is_some() {
        y_link.children[0]
    } else {
        y_link.children[1]
    };

    let vacated = if y_link.parent == x {
        // y is a direct child of x and keeps its own subtree on that side.
        let y_side = usize::from(x_link.children[0] != y);
        let other = x_link.children[1 - y_side];
        set_child(storage, y, 1 - y_side, other);
        set_parent(storage, other, y);
        (y, y_side)
    } else {
        let y_side = side_of(storage, y_link.parent, y);
        set_child(storage, y_link.parent, y_side, y_child);
        set_parent(storage, y_child, y_link.parent);

        link_mut(storage, y).children = x_link.children;
        set_parent(storage, x_link.children[0], y);
        set_parent(storage, x_link.children[1], y);
        (y_link.parent, y_side)
    };

    replace_child(storage, root, x_link.parent, x, y);
    set_parent(storage, y, x_link.parent);
    vacated
}

/// Resets the link of every node in the subtree at `key`.
pub(crate) fn unlink_subtree<N, S, K>(storage: &mut S, key: K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    if key.is_none() {
        return;
    }
    // Walk down to a leaf, reset it, continue from its parent.
    let mut current = key;
    let stop = parent(storage, key);
    while current != stop {
        let l = *link(storage, current);
        if l.children[0].is_some() {
            set_child(storage, current, 0, K::NONE);
            current = l.children[0];
        } else if l.children[1].is_some() {
            set_child(storage, current, 1, K::NONE);
            current = l.children[1];
        } else {
            *link_mut(storage, current) = Link::UNLINKED;
            current = l.parent;
        }
    }
}

/// Converts the tree at `root` into a doubly linked list in key order,
/// threaded through the same links (`children[0]` prev, `children[1]` next).
/// Returns `(head, tail)`. Parent fields are reset.
pub(crate) fn flatten<N, S, K>(storage: &mut S, root: K) -> (K, K)
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    if root.is_none() {
        return (K::NONE, K::NONE);
    }

    // Right-to-left rotations turn the tree into a right-leaning vine.
    let mut head = K::NONE;
    let mut vine_tail = K::NONE;
    let mut current = root;
    while current.is_some() {
        let left = child(storage, current, 0);
        if left.is_some() {
            // Rotate right around current without touching parent links.
            let left_right = child(storage, left, 1);
            set_child(storage, current, 0, left_right);
            set_child(storage, left, 1, current);
            if vine_tail.is_some() {
                set_child(storage, vine_tail, 1, left);
            }
            current = left;
        } else {
            if head.is_none() {
                head = current;
            }
            vine_tail = current;
            current = child(storage, current, 1);
        }
    }

    // Now every left child is NONE, thread prev links.
    let mut prev = K::NONE;
    let mut current = head;
    while current.is_some() {
        let l = link_mut(storage, current);
        l.children[0] = prev;
        l.parent = K::NONE;
        let next = l.children[1];
        prev = current;
        current = next;
    }
    (head, prev)
}

/// Height of the subtree at `key` (0 for `NONE`).
pub(crate) fn height<N, S, K>(storage: &S, key: K) -> usize
where
    K: Key,
    N: Node<K>,
    S: Storage<N, Key = K>,
{
    if key.is_none() {
        return 0;
    }
    let l = link(storage, key);
    1 + height(storage, l.children[0]).max(height(storage, l.children[1]))
}

/// Lookup and navigation methods shared by the search trees.
///
/// Expands inside an `impl` block whose `T: Keyed + 'static`, `K: Key`,
/// `S: Storage<$node<T, K>, Key = K>` and `C: Compare<T::Key>`, for a tree
/// with a `root: K` field.
macro_rules! tree_lookup {
    ($node:ident) => {
        /// Finds the node with the given key.
        pub fn find(&self, storage: &S, key: &T::Key) -> Option<K> {
            match $crate::link::search(storage, self.root, |value: &T| {
                C::compare(key, value.key())
            }) {
                $crate::link::Search::Found(found) => Some(found),
                $crate::link::Search::Vacant { .. } => None,
            }
        }

        /// Finds the node whose key is equivalent to `probe`.
        ///
        /// `C` must order `Q` consistently with `T::Key`.
        pub fn find_equivalent<Q>(&self, storage: &S, probe: &Q) -> Option<K>
        where
            Q: ?Sized,
            T::Key: core::borrow::Borrow<Q>,
            C: Compare<Q>,
        {
            match $crate::link::search(storage, self.root, |value: &T| {
                <C as Compare<Q>>::compare(probe, core::borrow::Borrow::borrow(value.key()))
            }) {
                $crate::link::Search::Found(found) => Some(found),
                $crate::link::Search::Vacant { .. } => None,
            }
        }

        /// Returns `true` if a node with the given key is linked.
        #[inline]
        pub fn contains(&self, storage: &S, key: &T::Key) -> bool {
            self.find(storage, key).is_some()
        }

        /// Returns the value of a node.
        #[inline]
        pub fn get<'a>(&self, storage: &'a S, node: K) -> Option<&'a T> {
            storage.get(node).map($node::value)
        }

        /// Returns the smallest key.
        #[inline]
        pub fn first(&self, storage: &S) -> Option<K> {
            self.root().map(|root| $crate::link::extreme(storage, root, 0))
        }

        /// Returns the largest key.
        #[inline]
        pub fn last(&self, storage: &S) -> Option<K> {
            self.root().map(|root| $crate::link::extreme(storage, root, 1))
        }

        /// Returns the in-order successor of a linked node.
        #[inline]
        pub fn next_key(&self, storage: &S, node: K) -> Option<K> {
            $crate::link::step(storage, node, 1).into_option()
        }

        /// Returns the in-order predecessor of a linked node.
        #[inline]
        pub fn prev_key(&self, storage: &S, node: K) -> Option<K> {
            $crate::link::step(storage, node, 0).into_option()
        }

        /// Iterates over values in key order.
        pub fn iter<'a>(&self, storage: &'a S) -> $crate::link::Iter<'a, $node<T, K>, S, K> {
            let (front, back) = self.bounds(storage);
            $crate::link::Iter::new(storage, front, back)
        }

        /// Iterates over node keys in key order.
        pub fn keys<'a>(&self, storage: &'a S) -> $crate::link::Keys<'a, $node<T, K>, S, K> {
            let (front, back) = self.bounds(storage);
            $crate::link::Keys::new(storage, front, back)
        }

        /// Iterates from a linked node to the end.
        pub fn make_iterator<'a>(
            &self,
            storage: &'a S,
            node: K,
        ) -> $crate::link::Iter<'a, $node<T, K>, S, K> {
            debug_assert!(storage.get(node).is_some_and($node::is_linked) || self.root == node);
            let back = self.last(storage).unwrap_or(K::NONE);
            $crate::link::Iter::new(storage, node, back)
        }

        fn bounds(&self, storage: &S) -> (K, K) {
            match self.root() {
                Some(root) => (
                    $crate::link::extreme(storage, root, 0),
                    $crate::link::extreme(storage, root, 1),
                ),
                None => (K::NONE, K::NONE),
            }
        }
    };
}

pub(crate) use tree_lookup;

// =============================================================================
// Iterators
// =============================================================================

/// In-order iterator over the values of a tree.
///
/// Walks parent links, no auxiliary stack. Double-ended.
pub struct Iter<'a, N, S, K: Key> {
    storage: &'a S,
    front: K,
    back: K,
    _marker: PhantomData<&'a N>,
}

impl<'a, N, S, K: Key> Iter<'a, N, S, K> {
    pub(crate) fn new(storage: &'a S, front: K, back: K) -> Self {
        Self {
            storage,
            front,
            back,
            _marker: PhantomData,
        }
    }
}

impl<'a, N, S, K> Iter<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    #[inline]
    fn advance(&mut self, side: usize) -> Option<(K, &'a N)> {
        let current = if side == 1 { self.front } else { self.back };
        if current.is_none() {
            return None;
        }

        let node = node(self.storage, current);
        if self.front == self.back {
            self.front = K::NONE;
            self.back = K::NONE;
        } else {
            let next = step(self.storage, current, side);
            if side == 1 {
                self.front = next;
            } else {
                self.back = next;
            }
        }
        Some((current, node))
    }
}

impl<'a, N, S, K> Iterator for Iter<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    type Item = &'a N::Value;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.advance(1).map(|(_, node)| node.value())
    }
}

impl<'a, N, S, K> DoubleEndedIterator for Iter<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.advance(0).map(|(_, node)| node.value())
    }
}

/// In-order iterator over the keys of a tree.
pub struct Keys<'a, N, S, K: Key> {
    inner: Iter<'a, N, S, K>,
}

impl<'a, N, S, K: Key> Keys<'a, N, S, K> {
    pub(crate) fn new(storage: &'a S, front: K, back: K) -> Self {
        Self {
            inner: Iter::new(storage, front, back),
        }
    }
}

impl<'a, N, S, K> Iterator for Keys<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    type Item = K;

    #[inline]
    fn next(&mut self) -> Option<K> {
        self.inner.advance(1).map(|(key, _)| key)
    }
}

impl<'a, N, S, K> DoubleEndedIterator for Keys<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    #[inline]
    fn next_back(&mut self) -> Option<K> {
        self.inner.advance(0).map(|(key, _)| key)
    }
}
