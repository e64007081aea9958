//! Doubly linked list produced by flattening a tree.
//!
//! [`AvlTree::flatten`](crate::AvlTree::flatten) and its siblings turn a
//! whole tree into a sorted [`List`] in O(n) without touching storage slots:
//! the list is threaded through the same [`Link`](crate::Link) fields the tree
//! used, with `children[0]` as prev and `children[1]` as next.
//!
//! Popping a node unlinks it and hands its key back; the value stays in
//! storage until the caller removes it.
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{AvlTree, BoxedAvlStorage, Storage};
//!
//! let mut storage: BoxedAvlStorage<u32> = BoxedAvlStorage::with_capacity(16);
//! let mut tree: AvlTree<u32, BoxedAvlStorage<u32>> = AvlTree::new();
//! for v in [3, 1, 2] {
//!     tree.try_insert(&mut storage, v).unwrap();
//! }
//!
//! let mut list = tree.flatten(&mut storage);
//! assert!(tree.is_empty());
//! assert_eq!(list.iter(&storage).copied().collect::<Vec<_>>(), vec![1, 2, 3]);
//!
//! let key = list.pop_front(&mut storage).unwrap();
//! assert_eq!(storage.remove(key).map(|node| node.into_value()), Some(1));
//! ```

use core::marker::PhantomData;

use crate::link::{self, Link, Node};
use crate::{Key, Storage};

/// A doubly linked list threaded through node links.
#[derive(Debug)]
pub struct List<K: Key = u32> {
    head: K,
    tail: K,
    len: usize,
}

impl<K: Key> Default for List<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> List<K> {
    /// Creates an empty list.
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: K::NONE,
            tail: K::NONE,
            len: 0,
        }
    }

    pub(crate) fn from_raw(head: K, tail: K, len: usize) -> Self {
        Self { head, tail, len }
    }

    /// Returns the number of elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the first key.
    #[inline]
    pub fn front(&self) -> Option<K> {
        self.head.into_option()
    }

    /// Returns the last key.
    #[inline]
    pub fn back(&self) -> Option<K> {
        self.tail.into_option()
    }

    /// Returns the key after `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not valid in storage.
    pub fn next_key<N, S>(&self, storage: &S, key: K) -> Option<K>
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        storage.get(key).expect("invalid key").link().child(1)
    }

    /// Returns the key before `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not valid in storage.
    pub fn prev_key<N, S>(&self, storage: &S, key: K) -> Option<K>
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        storage.get(key).expect("invalid key").link().child(0)
    }

    /// Unlinks the first element and returns its key.
    pub fn pop_front<N, S>(&mut self, storage: &mut S) -> Option<K>
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        self.pop(storage, 1)
    }

    /// Unlinks the last element and returns its key.
    pub fn pop_back<N, S>(&mut self, storage: &mut S) -> Option<K>
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        self.pop(storage, 0)
    }

    // dir 1 pops the head, dir 0 the tail.
    fn pop<N, S>(&mut self, storage: &mut S, dir: usize) -> Option<K>
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        let key = if dir == 1 { self.head } else { self.tail };
        if key.is_none() {
            return None;
        }

        let next = link::child(storage, key, dir);
        *link::link_mut(storage, key) = Link::UNLINKED;

        if next.is_some() {
            link::set_child(storage, next, 1 - dir, K::NONE);
        } else {
            self.head = K::NONE;
            self.tail = K::NONE;
        }
        if dir == 1 {
            self.head = next;
        } else {
            self.tail = next;
        }

        self.len -= 1;
        Some(key)
    }

    /// Unlinks every element. Storage is not touched otherwise.
    pub fn clear<N, S>(&mut self, storage: &mut S)
    where
        N: Node<K>,
        S: Storage<N, Key = K>,
    {
        while self.pop_front(storage).is_some() {}
    }

    /// Iterates over the values from front to back.
    pub fn iter<'a, N, S>(&self, storage: &'a S) -> ListIter<'a, N, S, K>
    where
        N: Node<K> + 'a,
        S: Storage<N, Key = K>,
    {
        ListIter {
            storage,
            front: self.head,
            back: self.tail,
            _marker: PhantomData,
        }
    }

    /// Iterates over the keys from front to back.
    pub fn keys<'a, N, S>(&self, storage: &'a S) -> ListKeys<'a, N, S, K>
    where
        N: Node<K> + 'a,
        S: Storage<N, Key = K>,
    {
        ListKeys {
            inner: self.iter(storage),
        }
    }
}

/// Iterator over list values.
pub struct ListIter<'a, N, S, K: Key> {
    storage: &'a S,
    front: K,
    back: K,
    _marker: PhantomData<&'a N>,
}

impl<'a, N, S, K> ListIter<'a, N, S, K>
where
    K: Key,
    N: Node<K> + 'a,
    S: Storage<N, Key = K>,
{
    fn advance(&mut self, dir: usize) -> Option<(K, &'a N)> {
        let current = if dir == 1 { self.front } else { self.back };
        if current.is_none() {
            return None;
        }

        let node: &'a N = link::node(self.storage, current);
        if self.front == self.back {
            self.front = K::NONE;
            self.back = K::NONE;
        } else if dir == 1 {
            self.front = node.link().children[1];
        } else {
            self.back = node.link().children[0];
        }
        Some((current, node))
    }
}

impl<'a, N, S, K> Iterator for ListIter<'a, N, S, K>
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

impl<'a, N, S, K> DoubleEndedIterator for ListIter<'a, N, S, K>
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

/// Iterator over list keys.
pub struct ListKeys<'a, N, S, K: Key> {
    inner: ListIter<'a, N, S, K>,
}

impl<'a, N, S, K> Iterator for ListKeys<'a, N, S, K>
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

impl<'a, N, S, K> DoubleEndedIterator for ListKeys<'a, N, S, K>
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

#[cfg(test)]
mod tests {
    use crate::{AvlTree, BoxedAvlStorage, Storage};

    type TestStorage = BoxedAvlStorage<u32>;
    type TestTree = AvlTree<u32, TestStorage>;

    fn build(values: &[u32]) -> (TestStorage, TestTree) {
        let mut storage = TestStorage::with_capacity(64);
        let mut tree = TestTree::new();
        for &v in values {
            tree.try_insert(&mut storage, v).unwrap();
        }
        (storage, tree)
    }

    #[test]
    fn pop_from_both_ends() {
        let (mut storage, mut tree) = build(&[4, 2, 6, 1, 3, 5, 7]);
        let mut list = tree.flatten(&mut storage);
        assert_eq!(list.len(), 7);

        let front = list.pop_front(&mut storage).unwrap();
        let back = list.pop_back(&mut storage).unwrap();
        assert_eq!(storage.get(front).unwrap().value(), &1);
        assert_eq!(storage.get(back).unwrap().value(), &7);
        assert!(!storage.get(front).unwrap().is_linked());

        assert_eq!(
            list.iter(&storage).copied().collect::<Vec<_>>(),
            vec![2, 3, 4, 5, 6]
        );
        assert_eq!(
            list.iter(&storage).rev().copied().collect::<Vec<_>>(),
            vec![6, 5, 4, 3, 2]
        );
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn next_and_prev_follow_order() {
        let (mut storage, mut tree) = build(&[10, 20, 30]);
        let list = tree.flatten(&mut storage);

        let first = list.front().unwrap();
        let second = list.next_key(&storage, first).unwrap();
        assert_eq!(storage.get(second).unwrap().value(), &20);
        assert_eq!(list.prev_key(&storage, second), Some(first));
        assert_eq!(list.prev_key(&storage, first), None);
    }

    #[test]
    fn clear_unlinks_everything() {
        let (mut storage, mut tree) = build(&[1, 2, 3, 4]);
        let mut list = tree.flatten(&mut storage);
        let keys: Vec<u32> = list.keys(&storage).collect();

        list.clear(&mut storage);
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        for key in keys {
            assert!(!storage.get(key).unwrap().is_linked());
        }
        assert_eq!(storage.len(), 4);
    }

    #[test]
    fn single_element() {
        let (mut storage, mut tree) = build(&[9]);
        let mut list = tree.flatten(&mut storage);
        assert_eq!(list.front(), list.back());
        assert!(list.pop_back(&mut storage).is_some());
        assert!(list.pop_front(&mut storage).is_none());
        assert!(list.is_empty());
    }
}
