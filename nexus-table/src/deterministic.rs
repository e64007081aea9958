//! Robin-Hood table with a dense element array.
//!
//! One allocation holds both arrays:
//!
//! ```text
//! [ T; elements ][ Bucket<I>; buckets ]
//!   ... e2 e1 e0   ^ buckets start here
//! ```
//!
//! Elements are packed densely and grow backward toward the front, so
//! element `i` sits `i + 1` slots before the bucket array. A bucket holds the
//! element's dense index and its hash truncated to `I`; `index == I::NONE`
//! marks an empty bucket.
//!
//! Iteration walks the dense array, so it is insertion order until an erase
//! moves the last element into the hole. Growth rehashes the old buckets in
//! bucket order from their stored hashes and never calls the hasher.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

use crate::alloc::{Allocator, Global};
use crate::error::{TryReserveError, infallible};
use crate::index::Index;

/// Buckets in the first allocation.
pub const MIN_BUCKETS: usize = 8;

/// Elements `buckets` buckets may hold (3/4 load).
#[inline]
pub const fn max_elements(buckets: usize) -> usize {
    buckets * 3 / 4
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bucket<I> {
    index: I,
    hash: I,
}

impl<I: Index> Bucket<I> {
    const EMPTY: Self = Self {
        index: I::NONE,
        hash: I::NONE,
    };

    #[inline]
    fn is_empty(&self) -> bool {
        self.index.is_none()
    }
}

/// Raw Robin-Hood table storing `T` by value, indexed by `I`.
///
/// Positions returned by [`find`](Self::find) are dense indices in
/// `0..len()`. They stay valid until the next erase, which moves the last
/// element into the erased position.
///
/// # Example
///
/// ```
/// use nexus_table::RawDeterministicTable;
///
/// let hash = |v: &u64| v.wrapping_mul(0x9E37_79B9_7F4A_7C15);
///
/// let mut table: RawDeterministicTable<u64> = RawDeterministicTable::new();
/// for v in [30, 10, 20] {
///     table.find_or_insert(hash(&v), |x| *x == v, || v);
/// }
/// let order: Vec<u64> = table.iter().map(|(_, v)| *v).collect();
/// assert_eq!(order, [30, 10, 20]);
///
/// assert_eq!(table.remove(hash(&30), |x| *x == 30, hash), Some(30));
/// let order: Vec<u64> = table.iter().map(|(_, v)| *v).collect();
/// assert_eq!(order, [20, 10]);
/// ```
pub struct RawDeterministicTable<T, I: Index = u32, A: Allocator = Global> {
    /// Start of the bucket array.
    buckets: NonNull<Bucket<I>>,
    /// Bucket count minus one (`0` before the first allocation).
    mask: usize,
    /// Element capacity of the current allocation.
    elements: usize,
    len: usize,
    /// Start of the allocation and the layout handed back to the allocator.
    block: Option<(NonNull<u8>, Layout)>,
    alloc: A,
    _marker: PhantomData<T>,
}

// Safety: the table owns its elements and allocation exclusively
unsafe impl<T: Send, I: Index + Send, A: Allocator + Send> Send for RawDeterministicTable<T, I, A> {}
unsafe impl<T: Sync, I: Index + Sync, A: Allocator + Sync> Sync for RawDeterministicTable<T, I, A> {}

impl<T, I: Index> RawDeterministicTable<T, I, Global> {
    /// Creates an empty table. Does not allocate.
    #[inline]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a table that can hold `capacity` elements without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T, I: Index> Default for RawDeterministicTable<T, I, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, I: Index, A: Allocator> RawDeterministicTable<T, I, A> {
    /// Creates an empty table using `alloc`. Does not allocate.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            buckets: NonNull::dangling(),
            mask: 0,
            elements: 0,
            len: 0,
            block: None,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a table using `alloc` that can hold `capacity` elements
    /// without growing.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        let mut table = Self::new_in(alloc);
        infallible(table.try_reserve(capacity));
        table
    }

    /// Number of live elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the table can hold without growing.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.elements
    }

    /// Number of buckets (`0` before the first allocation).
    #[inline]
    pub fn buckets(&self) -> usize {
        if self.block.is_some() { self.mask + 1 } else { 0 }
    }

    /// Returns the allocator.
    #[inline]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Finds the dense index of the element for which `eq` returns `true`.
    pub fn find(&self, hash: u64, eq: impl FnMut(&T) -> bool) -> Option<usize> {
        self.find_bucket(hash, eq)
            .map(|pos| self.bucket(pos).index.as_usize())
    }

    /// Bucket position of the matching element.
    fn find_bucket(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let hash = I::from_hash(hash);
        let mut pos = self.home(hash);
        let mut dist = 0;

        loop {
            let bucket = self.bucket(pos);
            if bucket.is_empty() || self.distance(pos, bucket.hash) < dist {
                return None;
            }
            // Safety: a non-empty bucket holds a live dense index
            if bucket.hash == hash && eq(unsafe { self.element(bucket.index.as_usize()) }) {
                return Some(pos);
            }
            pos = (pos + 1) & self.mask;
            dist += 1;
        }
    }

    /// Bucket position holding dense index `index`, whose full hash is `hash`.
    fn bucket_of(&self, index: usize, hash: u64) -> usize {
        let mut pos = self.home(I::from_hash(hash));
        loop {
            let bucket = self.bucket(pos);
            debug_assert!(!bucket.is_empty(), "index {index} has no bucket");
            if bucket.index.as_usize() == index {
                return pos;
            }
            pos = (pos + 1) & self.mask;
        }
    }

    /// Returns the element at dense index `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len {
            // Safety: index < len
            Some(unsafe { self.element(index) })
        } else {
            None
        }
    }

    /// Returns the element at dense index `index` mutably.
    ///
    /// The caller must not change the element's hash.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            // Safety: index < len
            Some(unsafe { &mut *self.element_ptr(index) })
        } else {
            None
        }
    }

    /// Iterates `(index, &element)` in dense order.
    pub fn iter(&self) -> Iter<'_, T, I, A> {
        Iter {
            table: self,
            front: 0,
            back: self.len,
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Finds the element for which `eq` returns `true`, or appends `make()`.
    ///
    /// Returns the dense index and `true` if a new element was inserted.
    ///
    /// # Panics
    ///
    /// Panics if the table already holds `I::max_len()` elements.
    pub fn find_or_insert(
        &mut self,
        hash: u64,
        eq: impl FnMut(&T) -> bool,
        make: impl FnOnce() -> T,
    ) -> (usize, bool) {
        if let Some(index) = self.find(hash, eq) {
            return (index, false);
        }
        (self.insert_new(hash, make()), true)
    }

    /// Appends `value` without looking for an equal element.
    ///
    /// The caller guarantees no equal element is present.
    ///
    /// # Panics
    ///
    /// Panics if the table already holds `I::max_len()` elements.
    pub fn insert_new(&mut self, hash: u64, value: T) -> usize {
        if self.len >= I::max_len() {
            length_error::<I>();
        }
        if self.len == self.elements {
            infallible(self.grow(self.len + 1));
        }

        let index = self.len;
        // Safety: index < elements and the slot is uninitialized
        unsafe { self.element_ptr(index).write(value) };
        self.len += 1;

        let mask = self.mask;
        insert_bucket(
            self.bucket_slice_mut(),
            mask,
            Bucket {
                index: I::from_usize(index),
                hash: I::from_hash(hash),
            },
        );
        index
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes and returns the element for which `eq` returns `true`.
    ///
    /// `hasher` rehashes the last element if it moves into the hole.
    pub fn remove(
        &mut self,
        hash: u64,
        eq: impl FnMut(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
    ) -> Option<T> {
        let pos = self.find_bucket(hash, eq)?;
        Some(self.take_bucket(pos, hasher))
    }

    /// Drops the element for which `eq` returns `true`. Returns `true` if one
    /// was found.
    pub fn erase(
        &mut self,
        hash: u64,
        eq: impl FnMut(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
    ) -> bool {
        self.remove(hash, eq, hasher).is_some()
    }

    /// Moves the element at dense index `index` out of the table.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn take_index(&mut self, index: usize, hasher: impl Fn(&T) -> u64) -> T {
        assert!(index < self.len, "index {index} out of bounds for length {}", self.len);
        // Safety: index < len
        let hash = hasher(unsafe { self.element(index) });
        let pos = self.bucket_of(index, hash);
        self.take_bucket(pos, hasher)
    }

    /// Drops the element at dense index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn erase_index(&mut self, index: usize, hasher: impl Fn(&T) -> u64) {
        drop(self.take_index(index, hasher));
    }

    fn take_bucket(&mut self, pos: usize, hasher: impl Fn(&T) -> u64) -> T {
        let index = self.bucket(pos).index.as_usize();
        let last = self.len - 1;

        // Rehash before touching anything so a panicking hasher leaves the
        // table intact.
        // Safety: last < len
        let last_hash = (index != last).then(|| hasher(unsafe { self.element(last) }));

        self.shift_back(pos);

        // Safety: index < len; the slot is refilled or dropped from len below
        let value = unsafe { self.element_ptr(index).read() };

        if let Some(last_hash) = last_hash {
            let moved = self.bucket_of(last, last_hash);
            self.bucket_slice_mut()[moved].index = I::from_usize(index);
            // Safety: distinct live slots; last is forgotten by the len update
            unsafe { ptr::copy_nonoverlapping(self.element_ptr(last), self.element_ptr(index), 1) };
        }

        self.len -= 1;
        value
    }

    /// Backward-shift deletion of the bucket at `pos`.
    fn shift_back(&mut self, mut pos: usize) {
        let mask = self.mask;
        let buckets = self.bucket_slice_mut();
        loop {
            let next = (pos + 1) & mask;
            let bucket = buckets[next];
            if bucket.is_empty() || distance(next, bucket.hash, mask) == 0 {
                buckets[pos] = Bucket::EMPTY;
                return;
            }
            buckets[pos] = bucket;
            pos = next;
        }
    }

    /// Drops every element. Keeps the allocation.
    pub fn clear(&mut self) {
        if self.block.is_none() {
            return;
        }
        self.drop_elements();
        self.len = 0;
        self.bucket_slice_mut().fill(Bucket::EMPTY);
    }

    // ========================================================================
    // Growth
    // ========================================================================

    /// Reserves room for `additional` more elements.
    ///
    /// # Panics
    ///
    /// Panics if the total exceeds what `I` can index; aborts through
    /// `handle_alloc_error` if the allocator fails.
    pub fn reserve(&mut self, additional: usize) {
        infallible(self.try_reserve(additional));
    }

    /// Reserves room for `additional` more elements, reporting failure.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let needed = self
            .len
            .checked_add(additional)
            .filter(|&needed| needed <= I::max_len())
            .ok_or(TryReserveError::CapacityOverflow)?;
        if needed <= self.elements {
            return Ok(());
        }
        self.grow(needed)
    }

    /// Reallocates with room for at least `needed` elements.
    fn grow(&mut self, needed: usize) -> Result<(), TryReserveError> {
        let mut buckets = match self.block {
            None => MIN_BUCKETS,
            Some(_) => ((self.mask + 2) * 4 / 3).next_power_of_two(),
        };
        while element_capacity::<I>(buckets) < needed {
            buckets = buckets
                .checked_mul(2)
                .ok_or(TryReserveError::CapacityOverflow)?;
        }

        let (layout, buckets_offset) = table_layout::<T, I>(buckets)?;
        let block = self
            .alloc
            .allocate(layout)
            .map_err(|_| TryReserveError::AllocError { layout })?;

        // Grow into whatever the allocator handed back. Elements sit right
        // before the buckets, so the offset follows the bucket count.
        let mut buckets_offset = buckets_offset;
        while let Some(next) = buckets.checked_mul(2) {
            match table_layout::<T, I>(next) {
                Ok((bigger, offset)) if bigger.size() <= block.size => {
                    buckets = next;
                    buckets_offset = offset;
                }
                _ => break,
            }
        }
        if block.size > layout.size() {
            log::trace!(
                "deterministic table allocation headroom: requested {} bytes, got {}, buckets {}",
                layout.size(),
                block.size,
                buckets
            );
        }
        let layout = Layout::from_size_align(block.size, layout.align())
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        // Safety: buckets_offset + buckets * size_of::<Bucket<I>>() <= block.size
        let new_buckets: NonNull<Bucket<I>> = unsafe { block.ptr.add(buckets_offset) }.cast();
        let new_mask = buckets - 1;
        // Safety: the bucket array is inside the block and properly aligned
        let bucket_slice =
            unsafe { core::slice::from_raw_parts_mut(new_buckets.as_ptr(), buckets) };
        bucket_slice.fill(Bucket::EMPTY);

        for bucket in self.bucket_slice() {
            if !bucket.is_empty() {
                insert_bucket(bucket_slice, new_mask, *bucket);
            }
        }

        if self.len != 0 {
            // Safety: both element blocks end right before their bucket
            // arrays; the old block is freed without dropping
            unsafe {
                ptr::copy_nonoverlapping(
                    self.element_ptr(self.len - 1),
                    new_buckets.as_ptr().cast::<T>().sub(self.len),
                    self.len,
                );
            }
        }

        log::debug!(
            "deterministic table resized: {} -> {} buckets, {} elements",
            self.buckets(),
            buckets,
            self.len
        );

        self.free_allocation();
        self.buckets = new_buckets;
        self.mask = new_mask;
        self.elements = element_capacity::<I>(buckets);
        self.block = Some((block.ptr, layout));
        Ok(())
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    #[inline]
    fn home(&self, hash: I) -> usize {
        hash.as_usize() & self.mask
    }

    #[inline]
    fn distance(&self, pos: usize, hash: I) -> usize {
        distance(pos, hash, self.mask)
    }

    #[inline]
    fn bucket(&self, pos: usize) -> Bucket<I> {
        self.bucket_slice()[pos]
    }

    #[inline]
    fn bucket_slice(&self) -> &[Bucket<I>] {
        if self.block.is_none() {
            return &[];
        }
        // Safety: mask + 1 initialized buckets
        unsafe { core::slice::from_raw_parts(self.buckets.as_ptr(), self.mask + 1) }
    }

    #[inline]
    fn bucket_slice_mut(&mut self) -> &mut [Bucket<I>] {
        if self.block.is_none() {
            return &mut [];
        }
        // Safety: mask + 1 initialized buckets, uniquely borrowed
        unsafe { core::slice::from_raw_parts_mut(self.buckets.as_ptr(), self.mask + 1) }
    }

    /// Slot of dense index `index`, counting back from the bucket array.
    #[inline]
    fn element_ptr(&self, index: usize) -> *mut T {
        debug_assert!(index < self.elements);
        // Safety: index < elements, all inside the element block
        unsafe { self.buckets.as_ptr().cast::<T>().sub(index + 1) }
    }

    /// # Safety
    ///
    /// `index` must be below `len`.
    #[inline]
    unsafe fn element(&self, index: usize) -> &T {
        unsafe { &*self.element_ptr(index) }
    }

    fn drop_elements(&mut self) {
        if !mem::needs_drop::<T>() || self.len == 0 {
            return;
        }
        // Safety: the live elements are contiguous, ending at the buckets
        unsafe {
            let first = self.element_ptr(self.len - 1);
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(first, self.len));
        }
    }

    fn free_allocation(&mut self) {
        if let Some((ptr, layout)) = self.block.take() {
            // Safety: allocated by self.alloc with this layout
            unsafe { self.alloc.deallocate(ptr, layout) };
        }
    }

    #[cfg(test)]
    fn check_buckets(&self) {
        let mut seen = vec![false; self.len];
        for (pos, bucket) in self.bucket_slice().iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let index = bucket.index.as_usize();
            assert!(index < self.len, "bucket {pos} points past len");
            assert!(!seen[index], "index {index} in two buckets");
            seen[index] = true;

            // Robin-Hood: a bucket is at most one step further from home
            // than its predecessor.
            let prev = pos.wrapping_sub(1) & self.mask;
            let prev_bucket = self.bucket(prev);
            let prev_dist = if prev_bucket.is_empty() {
                0
            } else {
                self.distance(prev, prev_bucket.hash) + 1
            };
            assert!(self.distance(pos, bucket.hash) <= prev_dist, "bucket {pos} too far from home");
        }
        assert!(seen.into_iter().all(|s| s), "element without bucket");
    }
}

impl<T, I: Index, A: Allocator> Drop for RawDeterministicTable<T, I, A> {
    fn drop(&mut self) {
        self.drop_elements();
        self.free_allocation();
    }
}

impl<T: core::fmt::Debug, I: Index, A: Allocator> core::fmt::Debug for RawDeterministicTable<T, I, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, v)| v)).finish()
    }
}

#[cold]
#[inline(never)]
fn length_error<I: Index>() -> ! {
    panic!(
        "length overflow: the index type holds at most {} elements",
        I::max_len()
    )
}

#[inline]
fn distance<I: Index>(pos: usize, hash: I, mask: usize) -> usize {
    pos.wrapping_sub(hash.as_usize()) & mask
}

/// Robin-Hood insertion of `incoming`: an entry that has travelled further
/// takes the bucket of one closer to home.
fn insert_bucket<I: Index>(buckets: &mut [Bucket<I>], mask: usize, mut incoming: Bucket<I>) {
    let mut pos = incoming.hash.as_usize() & mask;
    let mut dist = 0;
    loop {
        let bucket = &mut buckets[pos];
        if bucket.is_empty() {
            *bucket = incoming;
            return;
        }
        let resident = distance(pos, bucket.hash, mask);
        if resident < dist {
            mem::swap(bucket, &mut incoming);
            dist = resident;
        }
        pos = (pos + 1) & mask;
        dist += 1;
    }
}

/// Element capacity for `buckets` buckets, bounded by what `I` can index.
#[inline]
fn element_capacity<I: Index>(buckets: usize) -> usize {
    max_elements(buckets).min(I::max_len())
}

/// Layout of `[pad][T; elements][Bucket<I>; buckets]` and the bucket offset.
///
/// The padding goes in front so the last element ends exactly where the
/// buckets begin.
fn table_layout<T, I: Index>(buckets: usize) -> Result<(Layout, usize), TryReserveError> {
    let elements = Layout::array::<T>(element_capacity::<I>(buckets))
        .map_err(|_| TryReserveError::CapacityOverflow)?;
    let bucket_array =
        Layout::array::<Bucket<I>>(buckets).map_err(|_| TryReserveError::CapacityOverflow)?;
    let align = elements.align().max(bucket_array.align());
    let offset = elements
        .size()
        .checked_next_multiple_of(align)
        .ok_or(TryReserveError::CapacityOverflow)?;
    let size = offset
        .checked_add(bucket_array.size())
        .ok_or(TryReserveError::CapacityOverflow)?;
    let layout =
        Layout::from_size_align(size, align).map_err(|_| TryReserveError::CapacityOverflow)?;
    Ok((layout, offset))
}

/// Iterator over `(index, &element)` in dense order.
pub struct Iter<'a, T, I: Index = u32, A: Allocator = Global> {
    table: &'a RawDeterministicTable<T, I, A>,
    front: usize,
    back: usize,
}

impl<'a, T, I: Index, A: Allocator> Iterator for Iter<'a, T, I, A> {
    type Item = (usize, &'a T);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let index = self.front;
        self.front += 1;
        // Safety: index < len
        Some((index, unsafe { self.table.element(index) }))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl<T, I: Index, A: Allocator> DoubleEndedIterator for Iter<'_, T, I, A> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        // Safety: back < len
        Some((self.back, unsafe { self.table.element(self.back) }))
    }
}

impl<T, I: Index, A: Allocator> ExactSizeIterator for Iter<'_, T, I, A> {}
