//! Node storage with stable keys.
//!
//! Containers in this crate never own their nodes. A node lives in a
//! [`Storage`] slot from the moment it is inserted until it is removed, and
//! containers only rewrite the link fields embedded in it. The same storage
//! can back several containers at once.
//!
//! ```text
//! Storage<T>                 get / get_mut / remove / len
//!     ├── BoundedStorage<T>  try_insert -> Result<Key, Full<T>>
//!     └── UnboundedStorage<T> insert -> Key
//! ```

use core::mem::MaybeUninit;
use core::ptr::NonNull;
use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::marker::PhantomData;

use crate::Key;

/// Slab-like storage with stable keys.
///
/// A key handed out by an insert stays valid, and keeps addressing the same
/// value, until that value is removed. Removed slots may be reused.
///
/// Implementations:
/// - [`BoxedStorage`]: fixed capacity, one allocation
/// - `slab::Slab<T>`: growable (feature `slab`)
pub trait Storage<T> {
    /// Key type addressing slots of this storage.
    type Key: Key;

    /// Returns the number of occupied slots.
    fn len(&self) -> usize;

    /// Returns `true` if no slot is occupied.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the value at `key`, if occupied.
    fn remove(&mut self, key: Self::Key) -> Option<T>;

    /// Returns a reference to the value at `key`, if occupied.
    fn get(&self, key: Self::Key) -> Option<&T>;

    /// Returns a mutable reference to the value at `key`, if occupied.
    fn get_mut(&mut self, key: Self::Key) -> Option<&mut T>;

    /// Returns a reference without checking occupancy.
    ///
    /// # Safety
    ///
    /// `key` must be occupied.
    unsafe fn get_unchecked(&self, key: Self::Key) -> &T;

    /// Returns a mutable reference without checking occupancy.
    ///
    /// # Safety
    ///
    /// `key` must be occupied.
    unsafe fn get_unchecked_mut(&mut self, key: Self::Key) -> &mut T;

    /// Removes a value without checking occupancy.
    ///
    /// # Safety
    ///
    /// `key` must be occupied.
    unsafe fn remove_unchecked(&mut self, key: Self::Key) -> T;
}

/// Storage with a fixed number of slots.
pub trait BoundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its key.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` when every slot is occupied.
    fn try_insert(&mut self, value: T) -> Result<Self::Key, Full<T>>;

    /// Returns the total number of slots.
    fn capacity(&self) -> usize;
}

/// Storage that grows on demand.
pub trait UnboundedStorage<T>: Storage<T> {
    /// Inserts a value, returning its key.
    fn insert(&mut self, value: T) -> Self::Key;
}

/// Error returned when bounded storage has no free slot.
///
/// Carries the value that could not be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be inserted.
    pub fn into_inner(self) -> T {
        self.0
    }

    /// Maps the rejected value, keeping the error.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Full<U> {
        Full(f(self.0))
    }
}

impl<T> core::fmt::Display for Full<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("storage is full")
    }
}

impl<T: core::fmt::Debug> std::error::Error for Full<T> {}

// =============================================================================
// BoxedStorage
// =============================================================================

/// Fixed-capacity storage sized at runtime.
///
/// One heap allocation holds the slot array, an occupancy bitmap and a stack
/// of free keys. Capacity is rounded up to a power of two and must stay below
/// `K::NONE`, which is never handed out.
///
/// # Example
///
/// ```
/// use nexus_intrusive::{BoundedStorage, BoxedStorage, Storage};
///
/// let mut storage: BoxedStorage<&str> = BoxedStorage::with_capacity(100);
/// assert_eq!(storage.capacity(), 128);
///
/// let key = storage.try_insert("order").unwrap();
/// assert_eq!(storage.get(key), Some(&"order"));
/// assert_eq!(storage.remove(key), Some("order"));
/// ```
pub struct BoxedStorage<T, K: Key = u32> {
    ptr: NonNull<u8>,
    capacity: usize,
    free_len: usize,
    layout: Layout,
    bitmap_offset: usize,
    free_offset: usize,
    _marker: PhantomData<(T, K)>,
}

impl<T, K: Key> BoxedStorage<T, K> {
    /// Creates storage with at least `min_capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `min_capacity` is zero or the rounded capacity does not fit
    /// below `K::NONE`.
    pub fn with_capacity(min_capacity: usize) -> Self {
        assert!(min_capacity > 0, "capacity must be > 0");

        let capacity = min_capacity.next_power_of_two();
        assert!(
            capacity <= K::NONE.as_usize(),
            "capacity exceeds key type maximum"
        );

        // [slots][bitmap][free keys]
        let (layout, bitmap_offset, free_offset) =
            Self::layout_for(capacity).expect("storage layout overflow");

        // Safety: layout has non-zero size (capacity > 0, bitmap >= 1 word)
        let raw = unsafe { alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };

        let mut storage = Self {
            ptr,
            capacity,
            free_len: 0,
            layout,
            bitmap_offset,
            free_offset,
            _marker: PhantomData,
        };
        storage.reset_slots();
        storage
    }

    fn layout_for(capacity: usize) -> Option<(Layout, usize, usize)> {
        let slots = Layout::array::<MaybeUninit<T>>(capacity).ok()?;
        let bitmap = Layout::array::<u64>(bitmap_words(capacity)).ok()?;
        let free = Layout::array::<K>(capacity).ok()?;

        let (layout, bitmap_offset) = slots.extend(bitmap).ok()?;
        let (layout, free_offset) = layout.extend(free).ok()?;
        Some((layout.pad_to_align(), bitmap_offset, free_offset))
    }

    /// Returns the number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub const fn len(&self) -> usize {
        self.capacity - self.free_len
    }

    /// Returns `true` if no slot is occupied.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.free_len == self.capacity
    }

    /// Returns `true` if every slot is occupied.
    #[inline]
    pub const fn is_full(&self) -> bool {
        self.free_len == 0
    }

    /// Drops every stored value and frees all slots.
    ///
    /// Containers still linking nodes of this storage are left dangling;
    /// clear or flatten them first.
    pub fn clear(&mut self) {
        self.drop_occupied();
        self.reset_slots();
    }

    fn drop_occupied(&mut self) {
        if !core::mem::needs_drop::<T>() {
            return;
        }
        for i in 0..self.capacity {
            if self.is_occupied(i) {
                // Safety: slot is occupied
                unsafe { (*self.slots_ptr().add(i)).assume_init_drop() };
            }
        }
    }

    fn reset_slots(&mut self) {
        // Safety: bitmap and free stack regions are inside the allocation
        unsafe {
            core::ptr::write_bytes(self.bitmap_ptr(), 0, bitmap_words(self.capacity));
            // Reverse order so the first inserts hand out low keys.
            let free = self.free_ptr();
            for i in 0..self.capacity {
                free.add(i).write(K::from_usize(self.capacity - 1 - i));
            }
        }
        self.free_len = self.capacity;
    }

    #[inline]
    fn slots_ptr(&self) -> *mut MaybeUninit<T> {
        self.ptr.as_ptr().cast()
    }

    #[inline]
    fn bitmap_ptr(&self) -> *mut u64 {
        // Safety: offset computed from the allocation layout
        unsafe { self.ptr.as_ptr().add(self.bitmap_offset).cast() }
    }

    #[inline]
    fn free_ptr(&self) -> *mut K {
        // Safety: offset computed from the allocation layout
        unsafe { self.ptr.as_ptr().add(self.free_offset).cast() }
    }

    #[inline]
    fn is_occupied(&self, i: usize) -> bool {
        // Safety: i < capacity, so the word is inside the bitmap
        unsafe { *self.bitmap_ptr().add(i / 64) & (1 << (i % 64)) != 0 }
    }

    #[inline]
    fn set_occupied(&mut self, i: usize, occupied: bool) {
        // Safety: i < capacity, so the word is inside the bitmap
        unsafe {
            let word = self.bitmap_ptr().add(i / 64);
            if occupied {
                *word |= 1 << (i % 64);
            } else {
                *word &= !(1 << (i % 64));
            }
        }
    }

    #[inline]
    fn check(&self, key: K) -> Option<usize> {
        let i = key.as_usize();
        (i < self.capacity && self.is_occupied(i)).then_some(i)
    }
}

impl<T, K: Key> Storage<T> for BoxedStorage<T, K> {
    type Key = K;

    #[inline]
    fn len(&self) -> usize {
        BoxedStorage::len(self)
    }

    #[inline]
    fn remove(&mut self, key: K) -> Option<T> {
        self.check(key)?;
        // Safety: occupancy checked above
        Some(unsafe { self.remove_unchecked(key) })
    }

    #[inline]
    fn get(&self, key: K) -> Option<&T> {
        let i = self.check(key)?;
        // Safety: occupancy checked above
        Some(unsafe { (*self.slots_ptr().add(i)).assume_init_ref() })
    }

    #[inline]
    fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let i = self.check(key)?;
        // Safety: occupancy checked above
        Some(unsafe { (*self.slots_ptr().add(i)).assume_init_mut() })
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: K) -> &T {
        debug_assert!(self.check(key).is_some(), "vacant key");
        unsafe { (*self.slots_ptr().add(key.as_usize())).assume_init_ref() }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: K) -> &mut T {
        debug_assert!(self.check(key).is_some(), "vacant key");
        unsafe { (*self.slots_ptr().add(key.as_usize())).assume_init_mut() }
    }

    #[inline]
    unsafe fn remove_unchecked(&mut self, key: K) -> T {
        let i = key.as_usize();
        self.set_occupied(i, false);
        let value = unsafe { self.slots_ptr().add(i).read().assume_init() };
        unsafe { self.free_ptr().add(self.free_len).write(key) };
        self.free_len += 1;
        value
    }
}

impl<T, K: Key> BoundedStorage<T> for BoxedStorage<T, K> {
    #[inline]
    fn try_insert(&mut self, value: T) -> Result<K, Full<T>> {
        if self.free_len == 0 {
            return Err(Full(value));
        }

        self.free_len -= 1;
        // Safety: free_len < capacity, entry was written by reset or remove
        let key = unsafe { self.free_ptr().add(self.free_len).read() };
        let i = key.as_usize();
        unsafe { self.slots_ptr().add(i).write(MaybeUninit::new(value)) };
        self.set_occupied(i, true);
        Ok(key)
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T, K: Key> Drop for BoxedStorage<T, K> {
    fn drop(&mut self) {
        self.drop_occupied();
        // Safety: allocated in with_capacity with this layout
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl<T: core::fmt::Debug, K: Key> core::fmt::Debug for BoxedStorage<T, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoxedStorage")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// Safety: BoxedStorage owns its values
unsafe impl<T: Send, K: Key + Send> Send for BoxedStorage<T, K> {}

#[inline]
const fn bitmap_words(capacity: usize) -> usize {
    capacity.div_ceil(64)
}

// =============================================================================
// slab::Slab
// =============================================================================

#[cfg(feature = "slab")]
impl<T> Storage<T> for slab::Slab<T> {
    type Key = usize;

    #[inline]
    fn len(&self) -> usize {
        slab::Slab::len(self)
    }

    #[inline]
    fn remove(&mut self, key: usize) -> Option<T> {
        self.try_remove(key)
    }

    #[inline]
    fn get(&self, key: usize) -> Option<&T> {
        slab::Slab::get(self, key)
    }

    #[inline]
    fn get_mut(&mut self, key: usize) -> Option<&mut T> {
        slab::Slab::get_mut(self, key)
    }

    #[inline]
    unsafe fn get_unchecked(&self, key: usize) -> &T {
        unsafe { slab::Slab::get_unchecked(self, key) }
    }

    #[inline]
    unsafe fn get_unchecked_mut(&mut self, key: usize) -> &mut T {
        unsafe { slab::Slab::get_unchecked_mut(self, key) }
    }

    #[inline]
    unsafe fn remove_unchecked(&mut self, key: usize) -> T {
        slab::Slab::remove(self, key)
    }
}

#[cfg(feature = "slab")]
impl<T> UnboundedStorage<T> for slab::Slab<T> {
    #[inline]
    fn insert(&mut self, value: T) -> usize {
        slab::Slab::insert(self, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let storage: BoxedStorage<u64> = BoxedStorage::with_capacity(16);
        assert!(storage.is_empty());
        assert!(!storage.is_full());
        assert_eq!(storage.len(), 0);
        assert_eq!(storage.capacity(), 16);
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let storage: BoxedStorage<u64> = BoxedStorage::with_capacity(100);
        assert_eq!(storage.capacity(), 128);
    }

    #[test]
    fn first_keys_are_ascending() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(4);
        let keys: Vec<u32> = (0..4).map(|i| storage.try_insert(i).unwrap()).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_returns_value() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(2);
        storage.try_insert(1).unwrap();
        storage.try_insert(2).unwrap();
        assert!(storage.is_full());

        let err = storage.try_insert(3).unwrap_err();
        assert_eq!(err.into_inner(), 3);
        assert_eq!(err.to_string(), "storage is full");
    }

    #[test]
    fn removed_slot_is_reused() {
        let mut storage: BoxedStorage<u64> = BoxedStorage::with_capacity(4);
        let a = storage.try_insert(0).unwrap();
        let _b = storage.try_insert(1).unwrap();

        assert_eq!(storage.remove(a), Some(0));
        assert_eq!(storage.remove(a), None);
        assert_eq!(storage.get(a), None);

        assert_eq!(storage.try_insert(2).unwrap(), a);
    }

    #[test]
    fn get_mut_and_out_of_range() {
        let mut storage: BoxedStorage<u64, u16> = BoxedStorage::with_capacity(8);
        let key = storage.try_insert(10).unwrap();
        *storage.get_mut(key).unwrap() = 20;
        assert_eq!(storage.get(key), Some(&20));
        assert_eq!(storage.get(1000), None);
        assert_eq!(storage.get(u16::NONE), None);
    }

    #[test]
    fn clear_and_drop_run_destructors() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        {
            let mut storage: BoxedStorage<Rc<()>> = BoxedStorage::with_capacity(8);
            for _ in 0..3 {
                storage.try_insert(Rc::clone(&tracker)).unwrap();
            }
            assert_eq!(Rc::strong_count(&tracker), 4);

            storage.clear();
            assert_eq!(Rc::strong_count(&tracker), 1);
            assert!(storage.is_empty());

            storage.try_insert(Rc::clone(&tracker)).unwrap();
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[cfg(feature = "slab")]
    #[test]
    fn slab_is_unbounded_storage() {
        let mut storage = slab::Slab::new();
        let key = UnboundedStorage::insert(&mut storage, 42u64);
        assert_eq!(Storage::get(&storage, key), Some(&42));
        assert_eq!(Storage::remove(&mut storage, key), Some(42));
        assert_eq!(Storage::remove(&mut storage, key), None);
    }
}
