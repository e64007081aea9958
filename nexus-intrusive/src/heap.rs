//! Intrusive binary heap over external storage.
//!
//! The heap is a complete binary tree built from [`HeapNode`] links rather
//! than an array. The position of the last node is found by walking the bits
//! of `len` below its highest set bit from the root (0 goes left, 1 goes
//! right), so push and pop stay O(log n) without any side buffer.
//!
//! Nodes are moved by relinking, never by copying values: a key handed out by
//! storage keeps addressing the same value for as long as it is in the heap,
//! which makes O(log n) removal of an arbitrary node possible.
//!
//! # Ordering
//!
//! The comparator follows [`HeapCompare`]: `C::test(lhs, rhs) == true` means
//! `rhs` belongs above `lhs`. [`Greater`] therefore builds a **min**-heap and
//! [`Less`] a **max**-heap. Use the [`MinHeap`] / [`MaxHeap`] aliases to avoid
//! thinking about it.
//!
//! # Example
//!
//! ```
//! use nexus_intrusive::{BoxedHeapStorage, MinHeap};
//!
//! let mut storage: BoxedHeapStorage<u32> = BoxedHeapStorage::with_capacity(16);
//! let mut heap: MinHeap<u32, BoxedHeapStorage<u32>> = MinHeap::new();
//!
//! for priority in [5, 3, 8, 1] {
//!     heap.try_push_value(&mut storage, priority).unwrap();
//! }
//!
//! let mut order = Vec::new();
//! while let Some(priority) = heap.pop_value(&mut storage) {
//!     order.push(priority);
//! }
//! assert_eq!(order, vec![1, 3, 5, 8]);
//! ```

use core::marker::PhantomData;

use crate::compare::{Greater, HeapCompare, Keyed, Less};
use crate::error::{InvariantError, ensure};
use crate::link::{self, Link, Node};
use crate::{BoundedStorage, BoxedStorage, Full, Key, Storage, UnboundedStorage};

/// Bounded heap storage backed by a boxed allocation.
pub type BoxedHeapStorage<T, K = u32> = BoxedStorage<HeapNode<T, K>, K>;

/// Unbounded heap storage backed by `slab::Slab`.
#[cfg(feature = "slab")]
pub type SlabHeapStorage<T> = slab::Slab<HeapNode<T, usize>>;

/// Heap with the smallest key on top.
pub type MinHeap<T, S, K = u32> = Heap<T, S, K, Greater>;

/// Heap with the largest key on top.
pub type MaxHeap<T, S, K = u32> = Heap<T, S, K, Less>;

/// A value plus the heap hook.
#[derive(Debug)]
pub struct HeapNode<T, K: Key = u32> {
    value: T,
    link: Link<K>,
}

impl<T, K: Key> HeapNode<T, K> {
    /// Creates an unlinked node.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value,
            link: Link::UNLINKED,
        }
    }

    /// Returns the value.
    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the value mutably.
    ///
    /// If the node is in a heap and its key changes, call
    /// [`Heap::update`] afterwards.
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
    /// The only node of a one-element heap has neither.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.link.is_linked()
    }
}

impl<T: 'static, K: Key> Node<K> for HeapNode<T, K> {
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

/// An intrusive binary heap.
///
/// # Type Parameters
///
/// - `T`: element type, ordered by [`Keyed::key`]
/// - `S`: storage of [`HeapNode<T, K>`]
/// - `K`: storage key type (default `u32`)
/// - `C`: [`HeapCompare`] over `T::Key` (default [`Greater`], a min-heap)
#[derive(Debug)]
pub struct Heap<T, S, K: Key = u32, C = Greater> {
    root: K,
    len: usize,
    _marker: PhantomData<(fn() -> T, fn() -> S, C)>,
}

impl<T, S, K: Key, C> Default for Heap<T, S, K, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, K: Key, C> Heap<T, S, K, C> {
    /// Creates an empty heap.
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

    /// Returns `true` if the heap is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the top node without unlinking it.
    #[inline]
    pub fn peek(&self) -> Option<K> {
        self.root.into_option()
    }
}

impl<T, S, K, C> Heap<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: Storage<HeapNode<T, K>, Key = K>,
    C: HeapCompare<T::Key>,
{
    /// Returns the value of a node.
    #[inline]
    pub fn get<'a>(&self, storage: &'a S, node: K) -> Option<&'a T> {
        storage.get(node).map(HeapNode::value)
    }

    /// Returns the value of the top node.
    #[inline]
    pub fn peek_value<'a>(&self, storage: &'a S) -> Option<&'a T> {
        self.peek().map(|root| &link::node(storage, root).value)
    }

    /// Links an unlinked node already in storage.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    pub fn push(&mut self, storage: &mut S, node: K) {
        let value = storage.get(node).expect("invalid key");
        debug_assert!(!value.is_linked() && self.root != node, "node already linked");

        let position = self.len + 1;
        if position == 1 {
            link::attach(storage, &mut self.root, K::NONE, 0, node);
        } else {
            let parent = self.node_at(storage, position >> 1);
            link::attach(storage, &mut self.root, parent, position & 1, node);
        }
        self.len = position;
        self.sift_up(storage, node);
    }

    /// Unlinks the top node and returns its key.
    pub fn pop(&mut self, storage: &mut S) -> Option<K> {
        let root = self.peek()?;
        self.remove(storage, root);
        Some(root)
    }

    /// Unlinks the top node, removes it from storage and returns its value.
    pub fn pop_value(&mut self, storage: &mut S) -> Option<T> {
        let root = self.pop(storage)?;
        storage.remove(root).map(HeapNode::into_value)
    }

    /// Unlinks an arbitrary node, leaving it in storage.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    pub fn remove(&mut self, storage: &mut S, node: K) {
        let value = storage.get(node).expect("invalid key");
        debug_assert!(value.is_linked() || self.root == node, "node not linked");

        let last = self.node_at(storage, self.len);
        if self.len == 1 {
            self.root = K::NONE;
        } else {
            let parent = link::parent(storage, last);
            link::set_child(storage, parent, self.len & 1, K::NONE);
        }
        self.len -= 1;

        if last != node {
            // Splice the old last node into the vacated position.
            let hole = *link::link(storage, node);
            link::replace_child(storage, &mut self.root, hole.parent, node, last);
            *link::link_mut(storage, last) = hole;
            link::set_parent(storage, hole.children[0], last);
            link::set_parent(storage, hole.children[1], last);

            self.sift_down(storage, last);
            self.sift_up(storage, last);
        }
        *link::link_mut(storage, node) = Link::UNLINKED;
    }

    /// Restores heap order after the key of a linked node changed.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not valid in storage.
    pub fn update(&mut self, storage: &mut S, node: K) {
        debug_assert!(storage.get(node).is_some(), "invalid key");
        self.sift_up(storage, node);
        self.sift_down(storage, node);
    }

    /// Unlinks every node, leaving them in storage.
    pub fn clear(&mut self, storage: &mut S) {
        link::unlink_subtree(storage, self.root);
        self.root = K::NONE;
        self.len = 0;
    }

    /// Node at 1-based level-order `position`.
    fn node_at(&self, storage: &S, position: usize) -> K {
        debug_assert!(position >= 1 && position <= self.len.max(1));
        let depth = usize::BITS - 1 - position.leading_zeros();
        let mut current = self.root;
        for shift in (0..depth).rev() {
            current = link::child(storage, current, (position >> shift) & 1);
        }
        current
    }

    #[inline]
    fn key_of(storage: &S, node: K) -> &T::Key {
        link::node(storage, node).value.key()
    }

    // `true` if `above` must sit above `below`.
    #[inline]
    fn ranks_above(storage: &S, above: K, below: K) -> bool {
        C::test(Self::key_of(storage, below), Self::key_of(storage, above))
    }

    fn sift_up(&mut self, storage: &mut S, node: K) {
        loop {
            let parent = link::parent(storage, node);
            if parent.is_none() || !Self::ranks_above(storage, node, parent) {
                return;
            }
            self.swap_with_parent(storage, node);
        }
    }

    fn sift_down(&mut self, storage: &mut S, node: K) {
        loop {
            let [left, right] = link::link(storage, node).children;
            if left.is_none() {
                return;
            }
            let best = if right.is_some() && Self::ranks_above(storage, right, left) {
                right
            } else {
                left
            };
            if !Self::ranks_above(storage, best, node) {
                return;
            }
            self.swap_with_parent(storage, best);
        }
    }

    /// Exchanges `node` with its parent by relinking both.
    fn swap_with_parent(&mut self, storage: &mut S, node: K) {
        let parent = link::parent(storage, node);
        let node_link = *link::link(storage, node);
        let parent_link = *link::link(storage, parent);
        let side = usize::from(parent_link.children[0] != node);
        let sibling = parent_link.children[1 - side];

        link::replace_child(storage, &mut self.root, parent_link.parent, parent, node);

        let mut children = [K::NONE; 2];
        children[side] = parent;
        children[1 - side] = sibling;
        *link::link_mut(storage, node) = Link {
            children,
            parent: parent_link.parent,
        };
        link::set_parent(storage, sibling, node);

        *link::link_mut(storage, parent) = Link {
            children: node_link.children,
            parent: node,
        };
        link::set_parent(storage, node_link.children[0], parent);
        link::set_parent(storage, node_link.children[1], parent);
    }

    /// Verifies heap order, shape and parent links.
    pub fn check_invariants(&self, storage: &S) -> Result<(), InvariantError> {
        if self.root.is_none() {
            ensure!(self.len == 0, "empty root but len {}", self.len);
            return Ok(());
        }
        ensure!(
            link::parent(storage, self.root).is_none(),
            "root has a parent"
        );
        let count = self.check_subtree(storage, self.root, 1)?;
        ensure!(count == self.len, "len {} but {} nodes reachable", self.len, count);
        Ok(())
    }

    fn check_subtree(&self, storage: &S, key: K, position: usize) -> Result<usize, InvariantError> {
        ensure!(position <= self.len, "node at position {} past len {}", position, self.len);
        let node = storage
            .get(key)
            .ok_or_else(|| InvariantError::new("linked key is vacant"))?;

        let mut count = 1;
        for side in 0..2 {
            let child = node.link.children[side];
            let child_position = 2 * position + side;
            ensure!(
                child.is_some() == (child_position <= self.len),
                "heap is not complete at position {}",
                child_position
            );
            if child.is_none() {
                continue;
            }
            ensure!(
                storage.get(child).is_some_and(|c| c.link.parent == key),
                "child parent link mismatch"
            );
            ensure!(
                !Self::ranks_above(storage, child, key),
                "child at position {} ranks above its parent",
                child_position
            );
            count += self.check_subtree(storage, child, child_position)?;
        }
        Ok(count)
    }
}

impl<T, S, K, C> Heap<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: BoundedStorage<HeapNode<T, K>, Key = K>,
    C: HeapCompare<T::Key>,
{
    /// Allocates a node for `value` and pushes it.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if storage is full.
    pub fn try_push_value(&mut self, storage: &mut S, value: T) -> Result<K, Full<T>> {
        let node = storage
            .try_insert(HeapNode::new(value))
            .map_err(|e| e.map(HeapNode::into_value))?;
        self.push(storage, node);
        Ok(node)
    }
}

impl<T, S, K, C> Heap<T, S, K, C>
where
    T: Keyed + 'static,
    K: Key,
    S: UnboundedStorage<HeapNode<T, K>, Key = K>,
    C: HeapCompare<T::Key>,
{
    /// Allocates a node for `value` and pushes it.
    pub fn push_value(&mut self, storage: &mut S, value: T) -> K {
        let node = storage.insert(HeapNode::new(value));
        self.push(storage, node);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    type TestStorage = BoxedHeapStorage<u64>;

    fn make_rng() -> SmallRng {
        SmallRng::seed_from_u64(4242)
    }

    #[test]
    fn new_is_empty() {
        let mut storage = TestStorage::with_capacity(4);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.peek(), None);
        assert_eq!(heap.pop(&mut storage), None);
        heap.check_invariants(&storage).unwrap();
    }

    #[test]
    fn min_heap_pops_ascending() {
        let mut storage = TestStorage::with_capacity(8);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        for v in [5, 3, 8, 1] {
            heap.try_push_value(&mut storage, v).unwrap();
            heap.check_invariants(&storage).unwrap();
        }
        assert_eq!(heap.peek_value(&storage), Some(&1));

        let popped: Vec<u64> = std::iter::from_fn(|| heap.pop_value(&mut storage)).collect();
        assert_eq!(popped, vec![1, 3, 5, 8]);
        assert!(storage.is_empty());
    }

    #[test]
    fn max_heap_pops_descending() {
        let mut storage = TestStorage::with_capacity(8);
        let mut heap: MaxHeap<u64, TestStorage> = MaxHeap::new();
        for v in [5, 3, 8, 1] {
            heap.try_push_value(&mut storage, v).unwrap();
        }
        heap.check_invariants(&storage).unwrap();

        let popped: Vec<u64> = std::iter::from_fn(|| heap.pop_value(&mut storage)).collect();
        assert_eq!(popped, vec![8, 5, 3, 1]);
    }

    #[test]
    fn keys_follow_values_through_swaps() {
        let mut storage = TestStorage::with_capacity(16);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        let keys: Vec<(u32, u64)> = [9, 7, 5, 3, 1]
            .into_iter()
            .map(|v| (heap.try_push_value(&mut storage, v).unwrap(), v))
            .collect();

        for (key, v) in keys {
            assert_eq!(heap.get(&storage, key), Some(&v));
        }
    }

    #[test]
    fn remove_arbitrary() {
        let mut storage = TestStorage::with_capacity(16);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        let keys: Vec<u32> = (0..10)
            .map(|v| heap.try_push_value(&mut storage, v * 10).unwrap())
            .collect();

        heap.remove(&mut storage, keys[4]);
        heap.remove(&mut storage, keys[9]);
        heap.remove(&mut storage, keys[0]);
        heap.check_invariants(&storage).unwrap();
        assert_eq!(heap.len(), 7);
        assert!(!storage.get(keys[4]).unwrap().is_linked());

        let mut popped = Vec::new();
        while let Some(key) = heap.pop(&mut storage) {
            popped.push(*storage.get(key).unwrap().value());
        }
        assert_eq!(popped, vec![10, 20, 30, 50, 60, 70, 80]);
        assert_eq!(storage.len(), 10);
    }

    #[test]
    fn update_after_key_change() {
        let mut storage = TestStorage::with_capacity(16);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        let keys: Vec<u32> = [10, 20, 30, 40]
            .into_iter()
            .map(|v| heap.try_push_value(&mut storage, v).unwrap())
            .collect();

        *storage.get_mut(keys[3]).unwrap().value_mut() = 1;
        heap.update(&mut storage, keys[3]);
        assert_eq!(heap.peek(), Some(keys[3]));

        *storage.get_mut(keys[3]).unwrap().value_mut() = 99;
        heap.update(&mut storage, keys[3]);
        assert_eq!(heap.peek(), Some(keys[0]));
        heap.check_invariants(&storage).unwrap();
    }

    #[test]
    fn clear_and_refill() {
        let mut storage = TestStorage::with_capacity(8);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        let keys: Vec<u32> = (0..6)
            .map(|v| heap.try_push_value(&mut storage, v).unwrap())
            .collect();

        heap.clear(&mut storage);
        assert!(heap.is_empty());
        for &key in keys.iter().rev() {
            assert!(!storage.get(key).unwrap().is_linked());
            heap.push(&mut storage, key);
        }
        heap.check_invariants(&storage).unwrap();
        assert_eq!(heap.pop_value(&mut storage), Some(0));
    }

    #[test]
    fn full_storage_returns_value() {
        let mut storage = TestStorage::with_capacity(1);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        heap.try_push_value(&mut storage, 1).unwrap();
        assert_eq!(heap.try_push_value(&mut storage, 2).unwrap_err().into_inner(), 2);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn stress_random_operations() {
        let mut storage = TestStorage::with_capacity(1024);
        let mut heap: MinHeap<u64, TestStorage> = MinHeap::new();
        let mut rng = make_rng();
        // value -> multiplicity
        let mut reference: BTreeMap<u64, usize> = BTreeMap::new();
        let mut live: Vec<u32> = Vec::new();

        for round in 0..6000 {
            let op = rng.random_range(0..100);
            if op < 50 && live.len() < 1000 {
                let v = rng.random_range(0..500);
                live.push(heap.try_push_value(&mut storage, v).unwrap());
                *reference.entry(v).or_default() += 1;
            } else if op < 75 && !live.is_empty() {
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                heap.remove(&mut storage, victim);
                let v = storage.remove(victim).unwrap().into_value();
                let count = reference.get_mut(&v).unwrap();
                *count -= 1;
                if *count == 0 {
                    reference.remove(&v);
                }
            } else if let Some(top) = heap.pop(&mut storage) {
                live.retain(|&k| k != top);
                let v = storage.remove(top).unwrap().into_value();
                let (&min, _) = reference.first_key_value().unwrap();
                assert_eq!(v, min);
                let count = reference.get_mut(&v).unwrap();
                *count -= 1;
                if *count == 0 {
                    reference.remove(&v);
                }
            }

            assert_eq!(heap.len(), live.len());
            assert_eq!(
                heap.peek_value(&storage),
                reference.first_key_value().map(|(v, _)| v)
            );
            if round % 100 == 0 {
                heap.check_invariants(&storage).unwrap();
            }
        }
        heap.check_invariants(&storage).unwrap();
    }

    #[cfg(feature = "slab")]
    #[test]
    fn slab_storage_push_value() {
        let mut storage: SlabHeapStorage<u64> = slab::Slab::new();
        let mut heap: MaxHeap<u64, SlabHeapStorage<u64>, usize> = MaxHeap::new();
        for v in 0..100 {
            heap.push_value(&mut storage, v);
        }
        assert_eq!(heap.pop_value(&mut storage), Some(99));
        heap.check_invariants(&storage).unwrap();
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
    fn bench_heap_push_pop() {
        let mut storage: BoxedHeapStorage<u64> =
            BoxedHeapStorage::with_capacity(RESIDENT as usize + 1);
        let mut heap: MinHeap<u64, BoxedHeapStorage<u64>> = MinHeap::new();
        for v in 0..RESIDENT {
            let _ = heap.try_push_value(&mut storage, (v * 7 + 13) % RESIDENT);
        }
        let mut push = Histogram::<u64>::new(3).unwrap();
        let mut pop = Histogram::<u64>::new(3).unwrap();

        // Pop the minimum and push the same node back with a new value.
        for i in 0..WARMUP + ITERATIONS {
            let start = rdtscp();
            let top = std::hint::black_box(heap.pop(&mut storage).unwrap());
            let popped = rdtscp().wrapping_sub(start);

            *storage.get_mut(top).unwrap().value_mut() = i % RESIDENT;
            let start = rdtscp();
            heap.push(&mut storage, top);
            let pushed = rdtscp().wrapping_sub(start);

            if i >= WARMUP {
                pop.record(popped).unwrap();
                push.record(pushed).unwrap();
            }
        }

        print_histogram("heap pop", &pop);
        print_histogram("heap push", &push);
    }
}
