//! Hash sets over the two table engines.
//!
//! Thin wrappers over the maps with a `()` value.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

use crate::alloc::{Allocator, Global};
use crate::deterministic;
use crate::error::TryReserveError;
use crate::index::Index;
use crate::map::{DeterministicMap, Keys, Slot, SwissMap};
use crate::swiss;

macro_rules! set_api {
    () => {
        /// Number of elements.
        #[inline]
        pub fn len(&self) -> usize {
            self.map.len()
        }

        /// Returns `true` if the set holds no elements.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.map.is_empty()
        }

        /// Returns the hasher builder.
        #[inline]
        pub fn hasher(&self) -> &S {
            self.map.hasher()
        }

        /// Reserves room for `additional` more elements.
        pub fn reserve(&mut self, additional: usize) {
            self.map.reserve(additional);
        }

        /// Reserves room for `additional` more elements, reporting failure.
        pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
            self.map.try_reserve(additional)
        }

        /// Returns the slot holding `value`.
        #[inline]
        pub fn find<Q>(&self, value: &Q) -> Option<Slot>
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.find(value)
        }

        /// Returns `true` if `value` is present.
        #[inline]
        pub fn contains<Q>(&self, value: &Q) -> bool
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.contains_key(value)
        }

        /// Number of elements equal to `value` (`0` or `1`).
        #[inline]
        pub fn count<Q>(&self, value: &Q) -> usize
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.count(value)
        }

        /// Returns the stored element equal to `value`.
        #[inline]
        pub fn get<Q>(&self, value: &Q) -> Option<&T>
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.get_key_value(value).map(|(k, _)| k)
        }

        /// Returns the element in `slot`, if it is live.
        #[inline]
        pub fn get_slot(&self, slot: Slot) -> Option<&T> {
            self.map.get_slot(slot).map(|(k, _)| k)
        }

        /// Inserts `value` if absent. Returns its slot and `true` if it was
        /// inserted.
        pub fn insert(&mut self, value: T) -> (Slot, bool) {
            self.map.insert(value, ())
        }

        /// Removes `value`. Returns the number of elements removed (`0` or
        /// `1`).
        pub fn erase<Q>(&mut self, value: &Q) -> usize
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.erase(value)
        }

        /// Removes `value`. Returns `true` if it was present.
        pub fn remove<Q>(&mut self, value: &Q) -> bool
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.erase(value) == 1
        }

        /// Removes and returns the stored element equal to `value`.
        pub fn take<Q>(&mut self, value: &Q) -> Option<T>
        where
            T: Borrow<Q>,
            Q: ?Sized + Hash + Eq,
        {
            self.map.remove_entry(value).map(|(k, ())| k)
        }

        /// Removes and returns the element in `slot`.
        ///
        /// # Panics
        ///
        /// Panics if `slot` is not live.
        pub fn remove_slot(&mut self, slot: Slot) -> T {
            self.map.remove_slot(slot).0
        }

        /// Drops the element in `slot`.
        ///
        /// # Panics
        ///
        /// Panics if `slot` is not live.
        pub fn erase_slot(&mut self, slot: Slot) {
            self.map.erase_slot(slot);
        }

        /// Removes every element. Keeps the allocation.
        pub fn clear(&mut self) {
            self.map.clear();
        }
    };
}

// ============================================================================
// SwissSet
// ============================================================================

/// Hash set over the swiss table.
///
/// # Example
///
/// ```
/// use nexus_table::SwissSet;
///
/// let mut set: SwissSet<String> = SwissSet::new();
/// assert!(set.insert("a".to_string()).1);
/// assert!(!set.insert("a".to_string()).1);
/// assert!(set.contains("a"));
/// assert_eq!(set.take("a"), Some("a".to_string()));
/// assert!(set.is_empty());
/// ```
pub struct SwissSet<T, S = FxBuildHasher, A: Allocator = Global> {
    map: SwissMap<T, (), S, A>,
}

impl<T> SwissSet<T> {
    /// Creates an empty set. Does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self {
            map: SwissMap::new(),
        }
    }

    /// Creates a set that can hold `capacity` elements without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: SwissMap::with_capacity(capacity),
        }
    }
}

impl<T, S> SwissSet<T, S> {
    /// Creates an empty set using `hash_builder`.
    #[inline]
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            map: SwissMap::with_hasher(hash_builder),
        }
    }
}

impl<T, S, A: Allocator> SwissSet<T, S, A> {
    /// Creates an empty set using `hash_builder` and `alloc`.
    #[inline]
    pub const fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            map: SwissMap::with_hasher_in(hash_builder, alloc),
        }
    }

    /// Number of slots (`0` or `2^n - 1`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Iterates elements in slot order.
    pub fn iter(&self) -> Keys<swiss::Iter<'_, (T, ()), A>> {
        self.map.keys()
    }
}

impl<T, S, A> SwissSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    set_api!();
}

// ============================================================================
// DeterministicSet
// ============================================================================

/// Hash set over the Robin-Hood table, iterating in insertion order until an
/// erase.
///
/// # Example
///
/// ```
/// use nexus_table::DeterministicSet;
///
/// let set: DeterministicSet<u32> = [5, 1, 4, 1].into_iter().collect();
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), [5, 1, 4]);
/// ```
pub struct DeterministicSet<T, S = FxBuildHasher, I: Index = u32, A: Allocator = Global> {
    map: DeterministicMap<T, (), S, I, A>,
}

impl<T> DeterministicSet<T> {
    /// Creates an empty set. Does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self {
            map: DeterministicMap::new(),
        }
    }

    /// Creates a set that can hold `capacity` elements without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DeterministicMap::with_capacity(capacity),
        }
    }
}

impl<T, S, I: Index> DeterministicSet<T, S, I> {
    /// Creates an empty set using `hash_builder`.
    #[inline]
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            map: DeterministicMap::with_hasher(hash_builder),
        }
    }
}

impl<T, S, I: Index, A: Allocator> DeterministicSet<T, S, I, A> {
    /// Creates an empty set using `hash_builder` and `alloc`.
    #[inline]
    pub const fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            map: DeterministicMap::with_hasher_in(hash_builder, alloc),
        }
    }

    /// Elements the set can hold without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Iterates elements in dense order.
    pub fn iter(&self) -> Keys<deterministic::Iter<'_, (T, ()), I, A>> {
        self.map.keys()
    }
}

impl<T, S, I, A> DeterministicSet<T, S, I, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    I: Index,
    A: Allocator,
{
    set_api!();
}

// ============================================================================
// Trait impls
// ============================================================================

macro_rules! set_traits {
    ($set:ident [$($gen:tt)*] [$($bound:tt)*]) => {
        impl<T, $($gen)*> Default for $set<T, $($gen)*>
        where
            S: Default,
            $($bound)*
        {
            fn default() -> Self {
                Self::with_hasher_in(S::default(), Default::default())
            }
        }

        impl<T, $($gen)*> Extend<T> for $set<T, $($gen)*>
        where
            T: Hash + Eq,
            S: BuildHasher,
            $($bound)*
        {
            fn extend<It: IntoIterator<Item = T>>(&mut self, iter: It) {
                self.map.extend(iter.into_iter().map(|v| (v, ())));
            }
        }

        impl<T, $($gen)*> FromIterator<T> for $set<T, $($gen)*>
        where
            T: Hash + Eq,
            S: BuildHasher + Default,
            $($bound)*
        {
            fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
                let mut set = Self::default();
                set.extend(iter);
                set
            }
        }

        impl<T: fmt::Debug, $($gen)*> fmt::Debug for $set<T, $($gen)*>
        where
            $($bound)*
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_set().entries(self.iter()).finish()
            }
        }
    };
}

set_traits!(SwissSet [S, A] [A: Allocator + Default,]);
set_traits!(DeterministicSet [S, I, A] [I: Index, A: Allocator + Default,]);

impl<'a, T, S, A: Allocator> IntoIterator for &'a SwissSet<T, S, A> {
    type Item = &'a T;
    type IntoIter = Keys<swiss::Iter<'a, (T, ()), A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, S, I: Index, A: Allocator> IntoIterator for &'a DeterministicSet<T, S, I, A> {
    type Item = &'a T;
    type IntoIter = Keys<deterministic::Iter<'a, (T, ()), I, A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
