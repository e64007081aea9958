//! Hash maps over the two table engines.
//!
//! [`SwissMap`] and [`DeterministicMap`] share one surface. They differ in
//! what a [`Slot`] means and in iteration order:
//!
//! | Map | Slot | Order |
//! |-----|------|-------|
//! | [`SwissMap`] | table position, stable until the table grows | slot order |
//! | [`DeterministicMap`] | dense index, stable until an erase | insertion order until an erase |
//!
//! `insert` never overwrites: an existing entry is left alone and the new
//! key and value are dropped. Use [`insert_or_assign`](SwissMap::insert_or_assign)
//! to overwrite.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

use crate::alloc::{Allocator, Global};
use crate::deterministic::{self, RawDeterministicTable};
use crate::error::TryReserveError;
use crate::index::Index;
use crate::swiss::{self, RawSwissTable};

/// Position of an entry inside a map or set.
///
/// Only meaningful for the container that returned it, and only until that
/// container moves entries (growth for swiss containers, erase for
/// deterministic ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub(crate) usize);

impl Slot {
    /// The raw position.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Generates the shared lookup and insertion surface.
///
/// Expects the map to have `table` and `hash_builder` fields, and the
/// enclosing impl to define `raw_insert_new`, `raw_take` and `raw_remove`.
macro_rules! map_api {
    () => {
        /// Number of entries.
        #[inline]
        pub fn len(&self) -> usize {
            self.table.len()
        }

        /// Returns `true` if the map holds no entries.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.table.is_empty()
        }

        /// Returns the hasher builder.
        #[inline]
        pub fn hasher(&self) -> &S {
            &self.hash_builder
        }

        /// Returns the slot holding `key`.
        #[inline]
        pub fn find<Q>(&self, key: &Q) -> Option<Slot>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.raw_find(key).map(Slot)
        }

        /// Returns `true` if `key` is present.
        #[inline]
        pub fn contains_key<Q>(&self, key: &Q) -> bool
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.raw_find(key).is_some()
        }

        /// Number of entries with `key` (`0` or `1`).
        #[inline]
        pub fn count<Q>(&self, key: &Q) -> usize
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            usize::from(self.contains_key(key))
        }

        /// Returns the value for `key`.
        #[inline]
        pub fn get<Q>(&self, key: &Q) -> Option<&V>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            let index = self.raw_find(key)?;
            self.table.get(index).map(|(_, v)| v)
        }

        /// Returns the stored key and value for `key`.
        #[inline]
        pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            let index = self.raw_find(key)?;
            self.table.get(index).map(|(k, v)| (k, v))
        }

        /// Returns the value for `key` mutably.
        #[inline]
        pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            let index = self.raw_find(key)?;
            self.table.get_mut(index).map(|(_, v)| v)
        }

        /// Returns the entry in `slot`, if it is live.
        #[inline]
        pub fn get_slot(&self, slot: Slot) -> Option<(&K, &V)> {
            self.table.get(slot.0).map(|(k, v)| (k, v))
        }

        /// Returns the entry in `slot` with a mutable value, if it is live.
        #[inline]
        pub fn get_slot_mut(&mut self, slot: Slot) -> Option<(&K, &mut V)> {
            self.table.get_mut(slot.0).map(|entry| (&entry.0, &mut entry.1))
        }

        /// Inserts `key` and `value` if `key` is absent.
        ///
        /// Returns the entry's slot and `true` if it was inserted. An
        /// existing entry is not modified.
        pub fn insert(&mut self, key: K, value: V) -> (Slot, bool) {
            self.try_insert_with(key, || value)
        }

        /// Inserts `key` with the value from `make` if `key` is absent.
        ///
        /// `make` only runs when the entry is created.
        pub fn try_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> (Slot, bool) {
            let hash = self.hash_builder.hash_one(&key);
            if let Some(index) = self.raw_find_hashed(hash, &key) {
                return (Slot(index), false);
            }
            (Slot(self.raw_insert_new(hash, (key, make()))), true)
        }

        /// Inserts `key` and `value`, overwriting the value if `key` is
        /// present.
        ///
        /// Returns the entry's slot and `true` if it was newly inserted.
        pub fn insert_or_assign(&mut self, key: K, value: V) -> (Slot, bool) {
            let hash = self.hash_builder.hash_one(&key);
            if let Some(index) = self.raw_find_hashed(hash, &key) {
                if let Some((_, v)) = self.table.get_mut(index) {
                    *v = value;
                }
                return (Slot(index), false);
            }
            (Slot(self.raw_insert_new(hash, (key, value))), true)
        }

        /// Removes `key`. Returns the number of entries removed (`0` or `1`).
        pub fn erase<Q>(&mut self, key: &Q) -> usize
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            usize::from(self.raw_remove(key).is_some())
        }

        /// Removes `key` and returns its value.
        pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.raw_remove(key).map(|(_, v)| v)
        }

        /// Removes `key` and returns the stored key and value.
        pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.raw_remove(key)
        }

        /// Removes the entry in `slot` and returns it.
        ///
        /// # Panics
        ///
        /// Panics if `slot` is not live.
        pub fn remove_slot(&mut self, slot: Slot) -> (K, V) {
            self.raw_take(slot.0)
        }

        /// Drops the entry in `slot`.
        ///
        /// # Panics
        ///
        /// Panics if `slot` is not live.
        pub fn erase_slot(&mut self, slot: Slot) {
            drop(self.raw_take(slot.0));
        }

        /// Removes every entry. Keeps the allocation.
        pub fn clear(&mut self) {
            self.table.clear();
        }

        #[inline]
        fn raw_find<Q>(&self, key: &Q) -> Option<usize>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            if self.table.is_empty() {
                return None;
            }
            self.raw_find_hashed(self.hash_builder.hash_one(key), key)
        }

        #[inline]
        fn raw_find_hashed<Q>(&self, hash: u64, key: &Q) -> Option<usize>
        where
            K: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.table.find(hash, |(k, _)| key.eq(k.borrow()))
        }
    };
}

// ============================================================================
// SwissMap
// ============================================================================

/// Hash map over the swiss table.
///
/// # Example
///
/// ```
/// use nexus_table::SwissMap;
///
/// let mut map: SwissMap<&str, u32> = SwissMap::new();
/// let (slot, inserted) = map.insert("a", 1);
/// assert!(inserted);
///
/// // insert keeps the existing value
/// assert_eq!(map.insert("a", 2), (slot, false));
/// assert_eq!(map["a"], 1);
///
/// map.insert_or_assign("a", 3);
/// assert_eq!(map.get("a"), Some(&3));
/// assert_eq!(map.erase("a"), 1);
/// assert!(map.is_empty());
/// ```
pub struct SwissMap<K, V, S = FxBuildHasher, A: Allocator = Global> {
    table: RawSwissTable<(K, V), A>,
    hash_builder: S,
}

impl<K, V> SwissMap<K, V> {
    /// Creates an empty map. Does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }

    /// Creates a map that can hold `capacity` entries without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: RawSwissTable::with_capacity(capacity),
            hash_builder: FxBuildHasher,
        }
    }
}

impl<K, V, S> SwissMap<K, V, S> {
    /// Creates an empty map using `hash_builder`.
    #[inline]
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RawSwissTable::new(),
            hash_builder,
        }
    }
}

impl<K, V, S, A: Allocator> SwissMap<K, V, S, A> {
    /// Creates an empty map using `hash_builder` and `alloc`.
    #[inline]
    pub const fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: RawSwissTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Number of slots (`0` or `2^n - 1`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Iterates entries in slot order.
    pub fn iter(&self) -> Iter<swiss::Iter<'_, (K, V), A>> {
        Iter {
            raw: self.table.iter(),
        }
    }

    /// Iterates keys in slot order.
    pub fn keys(&self) -> Keys<swiss::Iter<'_, (K, V), A>> {
        Keys {
            raw: self.table.iter(),
        }
    }

    /// Iterates values in slot order.
    pub fn values(&self) -> Values<swiss::Iter<'_, (K, V), A>> {
        Values {
            raw: self.table.iter(),
        }
    }

    /// Iterates `(slot, key, value)` in slot order.
    pub fn slots(&self) -> impl Iterator<Item = (Slot, &K, &V)> + '_ {
        self.table.iter().map(|(i, (k, v))| (Slot(i), k, v))
    }
}

impl<K, V, S, A> SwissMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    map_api!();

    /// Reserves room for `additional` more entries.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow.
    pub fn reserve(&mut self, additional: usize) {
        let hash_builder = &self.hash_builder;
        self.table
            .reserve(additional, |(k, _)| hash_builder.hash_one(k));
    }

    /// Reserves room for `additional` more entries, reporting failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let hash_builder = &self.hash_builder;
        self.table
            .try_reserve(additional, |(k, _)| hash_builder.hash_one(k))
    }

    fn raw_insert_new(&mut self, hash: u64, entry: (K, V)) -> usize {
        let hash_builder = &self.hash_builder;
        self.table
            .insert_new(hash, entry, |(k, _)| hash_builder.hash_one(k))
    }

    fn raw_take(&mut self, index: usize) -> (K, V) {
        self.table.take_slot(index)
    }

    fn raw_remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.table.is_empty() {
            return None;
        }
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |(k, _)| key.eq(k.borrow()))
    }
}

// ============================================================================
// DeterministicMap
// ============================================================================

/// Hash map over the Robin-Hood table.
///
/// Iteration follows insertion order until an erase, which moves the last
/// entry into the hole. The same sequence of operations always produces the
/// same order.
///
/// # Example
///
/// ```
/// use nexus_table::DeterministicMap;
///
/// let mut map: DeterministicMap<u32, &str> = DeterministicMap::new();
/// map.insert(3, "c");
/// map.insert(1, "a");
/// map.insert(2, "b");
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [3, 1, 2]);
///
/// map.remove(&3);
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [2, 1]);
/// ```
pub struct DeterministicMap<K, V, S = FxBuildHasher, I: Index = u32, A: Allocator = Global> {
    table: RawDeterministicTable<(K, V), I, A>,
    hash_builder: S,
}

impl<K, V> DeterministicMap<K, V> {
    /// Creates an empty map. Does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }

    /// Creates a map that can hold `capacity` entries without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: RawDeterministicTable::with_capacity(capacity),
            hash_builder: FxBuildHasher,
        }
    }
}

impl<K, V, S, I: Index> DeterministicMap<K, V, S, I> {
    /// Creates an empty map using `hash_builder`.
    #[inline]
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RawDeterministicTable::new(),
            hash_builder,
        }
    }
}

impl<K, V, S, I: Index, A: Allocator> DeterministicMap<K, V, S, I, A> {
    /// Creates an empty map using `hash_builder` and `alloc`.
    #[inline]
    pub const fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: RawDeterministicTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Entries the map can hold without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Iterates entries in dense order.
    pub fn iter(&self) -> Iter<deterministic::Iter<'_, (K, V), I, A>> {
        Iter {
            raw: self.table.iter(),
        }
    }

    /// Iterates keys in dense order.
    pub fn keys(&self) -> Keys<deterministic::Iter<'_, (K, V), I, A>> {
        Keys {
            raw: self.table.iter(),
        }
    }

    /// Iterates values in dense order.
    pub fn values(&self) -> Values<deterministic::Iter<'_, (K, V), I, A>> {
        Values {
            raw: self.table.iter(),
        }
    }

    /// Iterates `(slot, key, value)` in dense order.
    pub fn slots(&self) -> impl DoubleEndedIterator<Item = (Slot, &K, &V)> + '_ {
        self.table.iter().map(|(i, (k, v))| (Slot(i), k, v))
    }
}

impl<K, V, S, I, A> DeterministicMap<K, V, S, I, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    I: Index,
    A: Allocator,
{
    map_api!();

    /// Reserves room for `additional` more entries.
    ///
    /// # Panics
    ///
    /// Panics if the total exceeds what `I` can index.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Reserves room for `additional` more entries, reporting failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table.try_reserve(additional)
    }

    fn raw_insert_new(&mut self, hash: u64, entry: (K, V)) -> usize {
        self.table.insert_new(hash, entry)
    }

    fn raw_take(&mut self, index: usize) -> (K, V) {
        let hash_builder = &self.hash_builder;
        self.table
            .take_index(index, |(k, _)| hash_builder.hash_one(k))
    }

    fn raw_remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.table.is_empty() {
            return None;
        }
        let hash_builder = &self.hash_builder;
        let hash = hash_builder.hash_one(key);
        self.table.remove(
            hash,
            |(k, _)| key.eq(k.borrow()),
            |(k, _)| hash_builder.hash_one(k),
        )
    }
}

// ============================================================================
// Trait impls
// ============================================================================

macro_rules! map_traits {
    ($map:ident [$($gen:tt)*] [$($args:tt)*] [$($bound:tt)*]) => {
        impl<K, V, $($gen)*> Default for $map<K, V, $($args)*>
        where
            S: Default,
            $($bound)*
        {
            fn default() -> Self {
                Self::with_hasher_in(S::default(), Default::default())
            }
        }

        impl<K, Q, V, $($gen)*> core::ops::Index<&Q> for $map<K, V, $($args)*>
        where
            K: Hash + Eq + Borrow<Q>,
            Q: ?Sized + Hash + Eq,
            S: BuildHasher,
            $($bound)*
        {
            type Output = V;

            /// # Panics
            ///
            /// Panics if `key` is not present.
            fn index(&self, key: &Q) -> &V {
                self.get(key).expect("key not found")
            }
        }

        impl<K, V, $($gen)*> Extend<(K, V)> for $map<K, V, $($args)*>
        where
            K: Hash + Eq,
            S: BuildHasher,
            $($bound)*
        {
            fn extend<It: IntoIterator<Item = (K, V)>>(&mut self, iter: It) {
                let iter = iter.into_iter();
                let (lower, _) = iter.size_hint();
                self.reserve(lower);
                for (k, v) in iter {
                    self.insert(k, v);
                }
            }
        }

        impl<K, V, $($gen)*> FromIterator<(K, V)> for $map<K, V, $($args)*>
        where
            K: Hash + Eq,
            S: BuildHasher + Default,
            $($bound)*
        {
            fn from_iter<It: IntoIterator<Item = (K, V)>>(iter: It) -> Self {
                let mut map = Self::default();
                map.extend(iter);
                map
            }
        }

        impl<K, V, $($gen)*> fmt::Debug for $map<K, V, $($args)*>
        where
            K: fmt::Debug,
            V: fmt::Debug,
            $($bound)*
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_map().entries(self.iter()).finish()
            }
        }
    };
}

map_traits!(SwissMap [S, A] [S, A] [A: Allocator + Default,]);
map_traits!(DeterministicMap [S, I, A] [S, I, A] [I: Index, A: Allocator + Default,]);

impl<'a, K, V, S, A: Allocator> IntoIterator for &'a SwissMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<swiss::Iter<'a, (K, V), A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, I: Index, A: Allocator> IntoIterator for &'a DeterministicMap<K, V, S, I, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<deterministic::Iter<'a, (K, V), I, A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Iterators
// ============================================================================

/// Iterator over `(&K, &V)`.
pub struct Iter<R> {
    raw: R,
}

impl<'a, K: 'a, V: 'a, R> Iterator for Iter<R>
where
    R: Iterator<Item = (usize, &'a (K, V))>,
{
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|(_, (k, v))| (k, v))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<'a, K: 'a, V: 'a, R> DoubleEndedIterator for Iter<R>
where
    R: DoubleEndedIterator<Item = (usize, &'a (K, V))>,
{
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.raw.next_back().map(|(_, (k, v))| (k, v))
    }
}

impl<'a, K: 'a, V: 'a, R> ExactSizeIterator for Iter<R> where
    R: ExactSizeIterator<Item = (usize, &'a (K, V))>
{
}

/// Iterator over `&K`.
pub struct Keys<R> {
    raw: R,
}

impl<'a, K: 'a, V: 'a, R> Iterator for Keys<R>
where
    R: Iterator<Item = (usize, &'a (K, V))>,
{
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|(_, (k, _))| k)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<'a, K: 'a, V: 'a, R> DoubleEndedIterator for Keys<R>
where
    R: DoubleEndedIterator<Item = (usize, &'a (K, V))>,
{
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.raw.next_back().map(|(_, (k, _))| k)
    }
}

/// Iterator over `&V`.
pub struct Values<R> {
    raw: R,
}

impl<'a, K: 'a, V: 'a, R> Iterator for Values<R>
where
    R: Iterator<Item = (usize, &'a (K, V))>,
{
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.raw.next().map(|(_, (_, v))| v)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl<'a, K: 'a, V: 'a, R> DoubleEndedIterator for Values<R>
where
    R: DoubleEndedIterator<Item = (usize, &'a (K, V))>,
{
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.raw.next_back().map(|(_, (_, v))| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use std::hash::RandomState;

    #[test]
    fn swiss_insert_keeps_existing() {
        let mut map: SwissMap<u32, String> = SwissMap::new();
        let (slot, inserted) = map.insert(1, "one".to_string());
        assert!(inserted);
        assert_eq!(map.insert(1, "uno".to_string()), (slot, false));
        assert_eq!(map[&1], "one");
        assert_eq!(map.get_slot(slot), Some((&1, &"one".to_string())));

        assert_eq!(map.insert_or_assign(1, "eins".to_string()), (slot, false));
        assert_eq!(map.get(&1).map(String::as_str), Some("eins"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn try_insert_with_runs_only_when_absent() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        let mut calls = 0;
        map.try_insert_with(5, || {
            calls += 1;
            50
        });
        map.try_insert_with(5, || {
            calls += 1;
            51
        });
        assert_eq!(calls, 1);
        assert_eq!(map[&5], 50);

        let mut map: DeterministicMap<u32, Vec<u32>> = DeterministicMap::new();
        let (slot, _) = map.try_insert_with(1, Vec::new);
        map.get_slot_mut(slot).unwrap().1.push(9);
        let (again, inserted) = map.try_insert_with(1, || unreachable!());
        assert!(!inserted);
        assert_eq!(again, slot);
        assert_eq!(map[&1], [9]);
    }

    #[test]
    fn borrowed_lookup() {
        let mut map: SwissMap<String, u32> = SwissMap::new();
        map.insert("alpha".to_string(), 1);
        map.insert("beta".to_string(), 2);
        assert_eq!(map.get("alpha"), Some(&1));
        assert!(map.contains_key("beta"));
        assert_eq!(map.count("gamma"), 0);
        assert_eq!(map.count("beta"), 1);
        *map.get_mut("beta").unwrap() += 10;
        assert_eq!(map.get_key_value("beta"), Some((&"beta".to_string(), &12)));
        assert_eq!(map.remove_entry("alpha"), Some(("alpha".to_string(), 1)));
        assert_eq!(map.erase("alpha"), 0);
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn index_missing_panics() {
        let map: DeterministicMap<u32, u32> = DeterministicMap::new();
        let _value = map[&3];
    }

    #[test]
    fn thousand_keys_scenario() {
        let mut swiss: SwissMap<u64, u64> = SwissMap::new();
        let mut det: DeterministicMap<u64, u64> = DeterministicMap::new();
        for k in 0..1000 {
            swiss.insert(k, k * 2);
            det.insert(k, k * 2);
        }
        assert_eq!((swiss.len(), det.len()), (1000, 1000));
        for k in 0..500 {
            assert_eq!(swiss.erase(&k), 1);
            assert_eq!(det.erase(&k), 1);
        }
        assert_eq!((swiss.len(), det.len()), (500, 500));
        assert_eq!(swiss.find(&250), None);
        assert_eq!(det.find(&250), None);
        assert!(swiss.find(&750).is_some());
        assert!(det.find(&750).is_some());

        assert!(swiss.insert(250, 0).1);
        assert!(det.insert(250, 0).1);
        assert_eq!(swiss[&250], 0);
        assert_eq!(det[&250], 0);
    }

    #[test]
    fn deterministic_order_and_slots() {
        let mut map: DeterministicMap<&str, u32> = ["x", "y", "z", "w"]
            .into_iter()
            .zip(0..)
            .collect();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["x", "y", "z", "w"]);
        assert_eq!(map.values().rev().copied().collect::<Vec<_>>(), [3, 2, 1, 0]);

        let slot = map.find("y").unwrap();
        assert_eq!(slot.index(), 1);
        assert_eq!(map.remove_slot(slot), ("y", 1));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["x", "w", "z"]);

        let slots: Vec<(usize, &str)> = map.slots().map(|(s, k, _)| (s.index(), *k)).collect();
        assert_eq!(slots, [(0, "x"), (1, "w"), (2, "z")]);
        map.erase_slot(Slot(0));
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["z", "w"]);
    }

    #[test]
    fn swiss_slots_match_find() {
        let map: SwissMap<u32, u32> = (0..100).map(|k| (k, k + 1)).collect();
        for (slot, k, v) in map.slots() {
            assert_eq!(map.find(k), Some(slot));
            assert_eq!(*v, k + 1);
        }
        assert_eq!(map.iter().len(), 100);
        assert_eq!((&map).into_iter().count(), 100);
    }

    #[test]
    fn extend_keeps_first_value() {
        let mut map: SwissMap<u32, &str> = SwissMap::new();
        map.extend([(1, "a"), (2, "b"), (1, "c")]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], "a");
    }

    #[test]
    fn custom_hasher_and_allocator() {
        let mut map: SwissMap<u64, u64, RandomState> = SwissMap::with_hasher(RandomState::new());
        map.reserve(64);
        let capacity = map.capacity();
        for k in 0..56 {
            map.insert(k, k);
        }
        assert_eq!(map.capacity(), capacity);
        assert!(map.try_reserve(usize::MAX).is_err());

        let rounding = crate::alloc::testing::Rounding::default();
        {
            let mut map: DeterministicMap<u64, u64, FxBuildHasher, u16, _> =
                DeterministicMap::with_hasher_in(FxBuildHasher, &rounding);
            for k in 0..500 {
                map.insert(k, k);
            }
            assert_eq!(map.len(), 500);
            assert_eq!(
                map.try_reserve(usize::from(u16::MAX)),
                Err(TryReserveError::CapacityOverflow)
            );
        }
        assert_eq!(rounding.live.get(), 0);
    }

    #[test]
    fn debug_output() {
        let mut map: DeterministicMap<u32, &str> = DeterministicMap::new();
        map.insert(1, "a");
        map.insert(2, "b");
        assert_eq!(format!("{map:?}"), r#"{1: "a", 2: "b"}"#);
    }

    #[test]
    fn clear_then_reuse() {
        let mut map: SwissMap<u32, u32> = (0..50).map(|k| (k, k)).collect();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(&3), None);
        map.insert(3, 4);
        assert_eq!(map[&3], 4);
    }

    #[test]
    fn stress_against_btreemap() {
        let mut rng = SmallRng::seed_from_u64(0xCAFE);
        let mut swiss: SwissMap<u32, u32> = SwissMap::new();
        let mut det: DeterministicMap<u32, u32> = DeterministicMap::new();
        let mut reference: BTreeMap<u32, u32> = BTreeMap::new();

        for _ in 0..30_000 {
            let k = rng.random_range(0..1_500u32);
            let v: u32 = rng.random();
            match rng.random_range(0..4) {
                0 => {
                    let fresh = !reference.contains_key(&k);
                    reference.entry(k).or_insert(v);
                    assert_eq!(swiss.insert(k, v).1, fresh);
                    assert_eq!(det.insert(k, v).1, fresh);
                }
                1 => {
                    reference.insert(k, v);
                    swiss.insert_or_assign(k, v);
                    det.insert_or_assign(k, v);
                }
                _ => {
                    let expected = reference.remove(&k);
                    assert_eq!(swiss.remove(&k), expected);
                    assert_eq!(det.remove(&k), expected);
                }
            }
            assert_eq!(swiss.len(), reference.len());
            assert_eq!(det.len(), reference.len());
        }

        let mut swiss_entries: Vec<(u32, u32)> = swiss.iter().map(|(k, v)| (*k, *v)).collect();
        swiss_entries.sort_unstable();
        let mut det_entries: Vec<(u32, u32)> = det.iter().map(|(k, v)| (*k, *v)).collect();
        det_entries.sort_unstable();
        let expected: Vec<(u32, u32)> = reference.into_iter().collect();
        assert_eq!(swiss_entries, expected);
        assert_eq!(det_entries, expected);
    }
}
