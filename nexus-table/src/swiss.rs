//! Open-addressing swiss table.
//!
//! Slots and control bytes share one allocation:
//!
//! ```text
//! [ T; capacity ][ ctrl; capacity ][ END ][ mirror of ctrl[0..WIDTH] ]
//! ```
//!
//! `capacity` is always `0` or `2^n - 1`, so `capacity` doubles as the probe
//! mask. The mirrored tail lets a group load starting anywhere in
//! `0..=capacity` read `WIDTH` bytes without wrapping. A load starting on
//! `END` sees the first `WIDTH - 1` slots through the mirror.
//!
//! The table knows nothing about keys. Callers pass the hash and an equality
//! predicate to lookups, and a rehash function to anything that may grow.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

use crate::alloc::{Allocator, Global};
use crate::error::{TryReserveError, infallible};
use crate::group::{self, EMPTY, END, Group, TOMB, WIDTH};

/// Capacity of the first allocation.
pub const MIN_CAPACITY: usize = WIDTH - 1;

/// Elements a table of `capacity` slots may hold (7/8 load).
#[inline]
pub const fn max_size(capacity: usize) -> usize {
    capacity - capacity / 8
}

#[inline]
const fn h1(hash: u64) -> usize {
    hash as usize
}

/// Quadratic probe over groups: `offset += stride; stride += WIDTH`.
struct Probe {
    mask: usize,
    offset: usize,
    stride: usize,
}

impl Probe {
    #[inline]
    fn new(hash: u64, mask: usize) -> Self {
        Self {
            mask,
            offset: h1(hash) & mask,
            stride: 0,
        }
    }

    #[inline]
    fn slot(&self, lane: usize) -> usize {
        (self.offset + lane) & self.mask
    }

    #[inline]
    fn next(&mut self) {
        self.stride += WIDTH;
        self.offset = (self.offset + self.stride) & self.mask;
    }
}

/// Group index of `slot` along the probe sequence for `hash`.
#[inline]
fn probe_index(slot: usize, capacity: usize, hash: u64) -> usize {
    (slot.wrapping_sub(h1(hash)) & capacity) / WIDTH
}

/// Raw swiss table storing `T` by value.
///
/// Slot indices returned by [`find`](Self::find) and
/// [`find_or_insert`](Self::find_or_insert) stay valid until the next call
/// that may grow or rehash the table (`find_or_insert`, `reserve`,
/// `try_reserve`).
///
/// # Example
///
/// ```
/// use nexus_table::RawSwissTable;
///
/// let hash = |v: &u64| v.wrapping_mul(0x9E37_79B9_7F4A_7C15);
///
/// let mut table: RawSwissTable<u64> = RawSwissTable::new();
/// let (slot, inserted) = table.find_or_insert(hash(&7), |v| *v == 7, hash, || 7);
/// assert!(inserted);
/// assert_eq!(table.find(hash(&7), |v| *v == 7), Some(slot));
///
/// assert_eq!(table.remove(hash(&7), |v| *v == 7), Some(7));
/// assert!(table.is_empty());
/// ```
pub struct RawSwissTable<T, A: Allocator = Global> {
    slots: NonNull<T>,
    ctrl: NonNull<u8>,
    capacity: usize,
    len: usize,
    /// Inserts left before an `EMPTY` slot may no longer be claimed.
    growth_left: usize,
    /// Layout handed back to the allocator (the returned size).
    layout: Option<Layout>,
    alloc: A,
    _marker: PhantomData<T>,
}

// Safety: the table owns its elements and allocation exclusively
unsafe impl<T: Send, A: Allocator + Send> Send for RawSwissTable<T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync> Sync for RawSwissTable<T, A> {}

impl<T> RawSwissTable<T, Global> {
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

impl<T> Default for RawSwissTable<T, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> RawSwissTable<T, A> {
    /// Creates an empty table using `alloc`. Does not allocate.
    pub const fn new_in(alloc: A) -> Self {
        Self {
            slots: NonNull::dangling(),
            ctrl: NonNull::dangling(),
            capacity: 0,
            len: 0,
            growth_left: 0,
            layout: None,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Creates a table using `alloc` that can hold `capacity` elements
    /// without growing.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        let mut table = Self::new_in(alloc);
        infallible(table.try_reserve_rehash(capacity, |_| unreachable!("table is empty")));
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

    /// Number of slots (`0` or `2^n - 1`).
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the allocator.
    #[inline]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Finds the slot holding an element for which `eq` returns `true`.
    pub fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<usize> {
        if self.capacity == 0 {
            return None;
        }

        let h2 = group::h2(hash);
        let mut probe = Probe::new(hash, self.capacity);

        loop {
            let group = self.group_at(probe.offset);

            for lane in group.match_byte(h2) {
                let index = probe.slot(lane);
                // Safety: a control byte equal to h2 marks a live slot
                if eq(unsafe { self.slot(index) }) {
                    return Some(index);
                }
            }

            if group.match_empty().any_bit_set() {
                return None;
            }

            debug_assert!(probe.stride <= self.capacity, "probe did not terminate");
            probe.next();
        }
    }

    /// Returns the element in `index`, if that slot is live.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if self.is_live(index) {
            // Safety: checked above
            Some(unsafe { self.slot(index) })
        } else {
            None
        }
    }

    /// Returns the element in `index` mutably, if that slot is live.
    ///
    /// The caller must not change the element's hash.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.is_live(index) {
            // Safety: checked above
            Some(unsafe { self.slot_mut(index) })
        } else {
            None
        }
    }

    /// Returns `true` if slot `index` holds an element.
    #[inline]
    pub fn is_live(&self, index: usize) -> bool {
        index < self.capacity && group::is_full(self.ctrl_at(index))
    }

    /// Iterates `(slot, &element)` in slot order.
    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            table: self,
            base: 0,
            mask: self.full_mask(0),
            remaining: self.len,
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Finds the element for which `eq` returns `true`, or inserts `make()`.
    ///
    /// Returns the slot and `true` if a new element was inserted. `hasher`
    /// must produce `hash` for `make()`'s result and is used to rehash
    /// existing elements if the table grows.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts through `handle_alloc_error` if
    /// the allocator fails.
    pub fn find_or_insert(
        &mut self,
        hash: u64,
        eq: impl FnMut(&T) -> bool,
        hasher: impl Fn(&T) -> u64,
        make: impl FnOnce() -> T,
    ) -> (usize, bool) {
        if let Some(index) = self.find(hash, eq) {
            return (index, false);
        }

        (self.insert_new(hash, make(), hasher), true)
    }

    /// Inserts `value` without looking for an equal element.
    ///
    /// The caller guarantees no equal element is present.
    pub fn insert_new(&mut self, hash: u64, value: T, hasher: impl Fn(&T) -> u64) -> usize {
        let index = self.prepare_insert(hash, hasher);
        // Safety: prepare_insert returned a claimed, uninitialized slot
        unsafe { self.slots.as_ptr().add(index).write(value) };
        index
    }

    fn prepare_insert(&mut self, hash: u64, hasher: impl Fn(&T) -> u64) -> usize {
        if self.capacity != 0 {
            let index = self.find_free(hash);
            if self.growth_left != 0 || self.ctrl_at(index) == TOMB {
                return self.claim(index, hash);
            }
        }

        infallible(self.rehash_and_grow(&hasher));
        let index = self.find_free(hash);
        self.claim(index, hash)
    }

    fn claim(&mut self, index: usize, hash: u64) -> usize {
        debug_assert!(index < self.capacity);
        if self.ctrl_at(index) == EMPTY {
            debug_assert!(self.growth_left > 0);
            self.growth_left -= 1;
        }
        self.set_ctrl(index, group::h2(hash));
        self.len += 1;
        index
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes and returns the element for which `eq` returns `true`.
    pub fn remove(&mut self, hash: u64, eq: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.find(hash, eq)?;
        Some(self.take_slot(index))
    }

    /// Drops the element for which `eq` returns `true`. Returns `true` if one
    /// was found.
    pub fn erase(&mut self, hash: u64, eq: impl FnMut(&T) -> bool) -> bool {
        self.remove(hash, eq).is_some()
    }

    /// Drops the element in slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not live.
    pub fn erase_slot(&mut self, index: usize) {
        drop(self.take_slot(index));
    }

    /// Moves the element out of slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not live.
    pub fn take_slot(&mut self, index: usize) -> T {
        assert!(self.is_live(index), "slot {index} is not live");
        self.release(index);
        // Safety: the slot was live and its control byte is now free
        unsafe { self.slots.as_ptr().add(index).read() }
    }

    /// Marks a live slot free.
    ///
    /// The slot becomes `EMPTY` when every `WIDTH`-wide window containing
    /// it also contains an `EMPTY` byte, so no probe could have passed
    /// through it. Otherwise it becomes `TOMB`.
    fn release(&mut self, index: usize) {
        let before = index.wrapping_sub(WIDTH) & self.capacity;
        let empty_before = self.group_at(before).match_empty();
        let empty_after = self.group_at(index).match_empty();

        let never_full = empty_before.any_bit_set()
            && empty_after.any_bit_set()
            && empty_before.leading_zeros() + empty_after.trailing_zeros() < WIDTH;

        if never_full {
            self.set_ctrl(index, EMPTY);
            self.growth_left += 1;
        } else {
            self.set_ctrl(index, TOMB);
        }
        self.len -= 1;
    }

    /// Drops every element. Keeps the allocation.
    pub fn clear(&mut self) {
        if self.capacity == 0 {
            return;
        }
        self.drop_elements();
        self.ctrls().reset();
        self.len = 0;
        self.growth_left = max_size(self.capacity);
    }

    // ========================================================================
    // Growth
    // ========================================================================

    /// Reserves room for `additional` more elements.
    ///
    /// # Panics
    ///
    /// Panics on capacity overflow; aborts through `handle_alloc_error` if
    /// the allocator fails.
    pub fn reserve(&mut self, additional: usize, hasher: impl Fn(&T) -> u64) {
        infallible(self.try_reserve_rehash(additional, hasher));
    }

    /// Reserves room for `additional` more elements, reporting failure.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        hasher: impl Fn(&T) -> u64,
    ) -> Result<(), TryReserveError> {
        self.try_reserve_rehash(additional, hasher)
    }

    fn try_reserve_rehash(
        &mut self,
        additional: usize,
        hasher: impl Fn(&T) -> u64,
    ) -> Result<(), TryReserveError> {
        if additional <= self.growth_left {
            return Ok(());
        }

        let needed = self
            .len
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let target = capacity_for(needed).ok_or(TryReserveError::CapacityOverflow)?;

        if target <= self.capacity {
            // Tombstones hold the room; reclaim it in place.
            self.reuse_tombs(&hasher);
            return Ok(());
        }
        self.resize(target, &hasher)
    }

    fn rehash_and_grow(&mut self, hasher: &impl Fn(&T) -> u64) -> Result<(), TryReserveError> {
        if self.capacity == 0 {
            self.resize(MIN_CAPACITY, hasher)
        } else if self.len <= max_size(self.capacity) / 2 {
            self.reuse_tombs(hasher);
            Ok(())
        } else {
            let target = self
                .capacity
                .checked_mul(2)
                .and_then(|c| c.checked_add(1))
                .ok_or(TryReserveError::CapacityOverflow)?;
            self.resize(target, hasher)
        }
    }

    /// Moves every element into a fresh allocation of at least `capacity`
    /// slots.
    fn resize(
        &mut self,
        capacity: usize,
        hasher: &impl Fn(&T) -> u64,
    ) -> Result<(), TryReserveError> {
        debug_assert!((capacity + 1).is_power_of_two());
        debug_assert!(max_size(capacity) >= self.len);

        let (layout, ctrl_offset) = table_layout::<T>(capacity)?;
        let block = self
            .alloc
            .allocate(layout)
            .map_err(|_| TryReserveError::AllocError { layout })?;

        // Grow into whatever the allocator handed back.
        let mut capacity = capacity;
        let mut ctrl_offset = ctrl_offset;
        while let Some(next) = capacity.checked_mul(2).and_then(|c| c.checked_add(1)) {
            match table_layout::<T>(next) {
                Ok((bigger, offset)) if bigger.size() <= block.size => {
                    capacity = next;
                    ctrl_offset = offset;
                }
                _ => break,
            }
        }
        if block.size > layout.size() {
            log::trace!(
                "swiss table allocation headroom: requested {} bytes, got {}, capacity {}",
                layout.size(),
                block.size,
                capacity
            );
        }

        let layout = Layout::from_size_align(block.size, layout.align())
            .map_err(|_| TryReserveError::CapacityOverflow)?;
        let slots: NonNull<T> = block.ptr.cast();
        let fresh = Ctrl {
            // Safety: ctrl_offset + capacity + 1 + WIDTH <= block.size
            ptr: unsafe { block.ptr.add(ctrl_offset) },
            capacity,
        };
        fresh.reset();

        for (index, value) in self.iter() {
            let hash = hasher(value);
            let target = fresh.find_free(hash);
            fresh.set(target, group::h2(hash));
            // Safety: distinct allocations; the old block is freed without
            // dropping its elements
            unsafe {
                ptr::copy_nonoverlapping(self.slots.as_ptr().add(index), slots.as_ptr().add(target), 1);
            }
        }

        log::debug!(
            "swiss table resized: {} -> {} slots, {} elements",
            self.capacity,
            capacity,
            self.len
        );

        self.free_allocation();
        self.slots = slots;
        self.ctrl = fresh.ptr;
        self.capacity = capacity;
        self.growth_left = max_size(capacity) - self.len;
        self.layout = Some(layout);
        Ok(())
    }

    /// Rehashes in place: tombstones become empty, and entries whose probe
    /// group changed are moved closer to home.
    fn reuse_tombs(&mut self, hasher: &impl Fn(&T) -> u64) {
        let capacity = self.capacity;
        let tombs = max_size(capacity) - self.len - self.growth_left;

        self.ctrls().convert_for_rehash();

        let mut index = 0;
        while index < capacity {
            if self.ctrl_at(index) != TOMB {
                index += 1;
                continue;
            }

            // Safety: a pending TOMB still holds its element
            let hash = hasher(unsafe { self.slot(index) });
            let target = self.find_free(hash);

            if probe_index(target, capacity, hash) == probe_index(index, capacity, hash) {
                self.set_ctrl(index, group::h2(hash));
                index += 1;
                continue;
            }

            let h2 = group::h2(hash);
            if self.ctrl_at(target) == EMPTY {
                self.set_ctrl(target, h2);
                // Safety: target is empty and distinct from index
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.slots.as_ptr().add(index),
                        self.slots.as_ptr().add(target),
                        1,
                    );
                }
                self.set_ctrl(index, EMPTY);
                index += 1;
            } else {
                debug_assert_eq!(self.ctrl_at(target), TOMB);
                self.set_ctrl(target, h2);
                // Safety: both slots hold elements; index is revisited
                unsafe {
                    ptr::swap_nonoverlapping(
                        self.slots.as_ptr().add(index),
                        self.slots.as_ptr().add(target),
                        1,
                    );
                }
            }
        }

        self.growth_left = max_size(capacity) - self.len;
        log::debug!(
            "swiss table reused {} tombstones in place: {} slots, {} elements",
            tombs,
            capacity,
            self.len
        );
    }

    #[inline]
    fn ctrls(&self) -> Ctrl {
        Ctrl {
            ptr: self.ctrl,
            capacity: self.capacity,
        }
    }

    #[inline]
    fn ctrl_at(&self, index: usize) -> u8 {
        self.ctrls().get(index)
    }

    #[inline]
    fn group_at(&self, index: usize) -> Group {
        self.ctrls().group(index)
    }

    #[inline]
    fn set_ctrl(&mut self, index: usize, byte: u8) {
        self.ctrls().set(index, byte);
    }

    #[inline]
    fn find_free(&self, hash: u64) -> usize {
        self.ctrls().find_free(hash)
    }

    /// Full lanes of the group at `base` that are real slots.
    #[inline]
    fn full_mask(&self, base: usize) -> group::BitMask {
        if base >= self.capacity {
            return group::BitMask(0);
        }
        let mut mask = self.group_at(base).match_full();
        let valid = self.capacity - base;
        if valid < WIDTH {
            mask.0 &= (1u16 << valid) - 1;
        }
        mask
    }

    // ========================================================================
    // Slots
    // ========================================================================

    /// # Safety
    ///
    /// Slot `index` must be initialized.
    #[inline]
    unsafe fn slot(&self, index: usize) -> &T {
        unsafe { &*self.slots.as_ptr().add(index) }
    }

    /// # Safety
    ///
    /// Slot `index` must be initialized.
    #[inline]
    unsafe fn slot_mut(&mut self, index: usize) -> &mut T {
        unsafe { &mut *self.slots.as_ptr().add(index) }
    }

    fn drop_elements(&mut self) {
        if !mem::needs_drop::<T>() || self.len == 0 {
            return;
        }
        for index in 0..self.capacity {
            if group::is_full(self.ctrl_at(index)) {
                // Safety: live slot, dropped exactly once
                unsafe { ptr::drop_in_place(self.slots.as_ptr().add(index)) };
            }
        }
    }

    fn free_allocation(&mut self) {
        if let Some(layout) = self.layout.take() {
            // Safety: allocated by self.alloc with this layout
            unsafe { self.alloc.deallocate(self.slots.cast(), layout) };
        }
    }
}

impl<T, A: Allocator> Drop for RawSwissTable<T, A> {
    fn drop(&mut self) {
        if self.capacity != 0 {
            self.drop_elements();
        }
        self.free_allocation();
    }
}

/// Raw view of a control array.
///
/// Writes go through the pointer, so a table under construction in `resize`
/// can be probed before it belongs to anything.
#[derive(Clone, Copy)]
struct Ctrl {
    ptr: NonNull<u8>,
    capacity: usize,
}

impl Ctrl {
    #[inline]
    fn get(self, index: usize) -> u8 {
        debug_assert!(index < self.capacity + 1 + WIDTH);
        // Safety: index is inside the control array
        unsafe { *self.ptr.as_ptr().add(index) }
    }

    #[inline]
    fn group(self, index: usize) -> Group {
        // A search may start on the END byte, whose lanes wrap onto the mirror.
        debug_assert!(index <= self.capacity);
        // Safety: index <= capacity and the array extends WIDTH past it
        unsafe { Group::load(self.ptr.as_ptr().add(index)) }
    }

    /// Writes a control byte and its mirror.
    #[inline]
    fn set(self, index: usize, byte: u8) {
        debug_assert!(index < self.capacity);
        let mirror = (index.wrapping_sub(WIDTH) & self.capacity) + WIDTH;
        // Safety: both positions are inside the control array
        unsafe {
            *self.ptr.as_ptr().add(index) = byte;
            *self.ptr.as_ptr().add(mirror) = byte;
        }
    }

    /// All slots `EMPTY`, `END` after the last.
    fn reset(self) {
        // Safety: the control array has capacity + 1 + WIDTH bytes
        unsafe {
            ptr::write_bytes(self.ptr.as_ptr(), EMPTY, self.capacity + 1 + WIDTH);
            *self.ptr.as_ptr().add(self.capacity) = END;
        }
    }

    /// Full becomes `TOMB` (pending re-seat), anything else `EMPTY`.
    fn convert_for_rehash(self) {
        let ctrl = self.ptr.as_ptr();
        for index in 0..self.capacity {
            // Safety: index < capacity
            unsafe {
                let byte = ctrl.add(index);
                *byte = if group::is_full(*byte) { TOMB } else { EMPTY };
            }
        }
        // Safety: capacity + 1 >= WIDTH, so the copy does not overlap
        unsafe {
            ptr::copy_nonoverlapping(ctrl, ctrl.add(self.capacity + 1), WIDTH);
            *ctrl.add(self.capacity) = END;
        }
    }

    /// First `EMPTY` or `TOMB` slot along the probe sequence for `hash`.
    fn find_free(self, hash: u64) -> usize {
        let mut probe = Probe::new(hash, self.capacity);
        loop {
            if let Some(lane) = self.group(probe.offset).match_free().lowest_set_bit() {
                return probe.slot(lane);
            }
            debug_assert!(probe.stride <= self.capacity, "no free slot");
            probe.next();
        }
    }
}

/// Layout of `[T; capacity][u8; capacity + 1 + WIDTH]` and the control
/// array's offset.
fn table_layout<T>(capacity: usize) -> Result<(Layout, usize), TryReserveError> {
    let slots = Layout::array::<T>(capacity).map_err(|_| TryReserveError::CapacityOverflow)?;
    let ctrl = capacity
        .checked_add(1 + WIDTH)
        .and_then(|len| Layout::array::<u8>(len).ok())
        .ok_or(TryReserveError::CapacityOverflow)?;
    slots
        .extend(ctrl)
        .map_err(|_| TryReserveError::CapacityOverflow)
}

/// Smallest valid capacity holding `len` elements.
fn capacity_for(len: usize) -> Option<usize> {
    if len == 0 {
        return Some(0);
    }
    let mut capacity = MIN_CAPACITY;
    while max_size(capacity) < len {
        capacity = capacity.checked_mul(2)?.checked_add(1)?;
    }
    Some(capacity)
}

/// Iterator over `(slot, &element)` in slot order.
pub struct Iter<'a, T, A: Allocator = Global> {
    table: &'a RawSwissTable<T, A>,
    base: usize,
    mask: group::BitMask,
    remaining: usize,
}

impl<'a, T, A: Allocator> Iterator for Iter<'a, T, A> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        loop {
            if let Some(lane) = self.mask.next() {
                let index = self.base + lane;
                self.remaining -= 1;
                // Safety: full control byte below capacity
                return Some((index, unsafe { self.table.slot(index) }));
            }
            self.base += WIDTH;
            if self.base >= self.table.capacity {
                return None;
            }
            self.mask = self.table.full_mask(self.base);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, A: Allocator> ExactSizeIterator for Iter<'_, T, A> {}

impl<T: core::fmt::Debug, A: Allocator> core::fmt::Debug for RawSwissTable<T, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, v)| v)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::{Exhausted, Rounding};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::hash::BuildHasher;

    fn hash(v: &u64) -> u64 {
        rustc_hash::FxBuildHasher.hash_one(v)
    }

    fn insert<A: Allocator>(table: &mut RawSwissTable<u64, A>, v: u64) -> (usize, bool) {
        table.find_or_insert(hash(&v), |x| *x == v, hash, || v)
    }

    fn find<A: Allocator>(table: &RawSwissTable<u64, A>, v: u64) -> Option<usize> {
        table.find(hash(&v), |x| *x == v)
    }

    fn tombs<T, A: Allocator>(table: &RawSwissTable<T, A>) -> usize {
        (0..table.capacity)
            .filter(|&i| table.ctrl_at(i) == TOMB)
            .count()
    }

    fn check_ctrl<T, A: Allocator>(table: &RawSwissTable<T, A>) {
        if table.capacity == 0 {
            return;
        }
        assert_eq!(table.ctrl_at(table.capacity), END);
        for i in 0..WIDTH.min(table.capacity) {
            assert_eq!(table.ctrl_at(table.capacity + 1 + i), table.ctrl_at(i), "mirror {i}");
        }
        let full = (0..table.capacity)
            .filter(|&i| group::is_full(table.ctrl_at(i)))
            .count();
        assert_eq!(full, table.len);
        assert_eq!(
            table.growth_left + table.len + tombs(table),
            max_size(table.capacity)
        );
    }

    #[test]
    fn new_does_not_allocate() {
        let table: RawSwissTable<u64> = RawSwissTable::new();
        assert_eq!(table.capacity(), 0);
        assert!(table.is_empty());
        assert_eq!(find(&table, 1), None);
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn first_insert_allocates_minimum() {
        let mut table = RawSwissTable::new();
        let (slot, inserted) = insert(&mut table, 1);
        assert!(inserted);
        assert_eq!(insert(&mut table, 1), (slot, false));
        assert_eq!(table.capacity(), MIN_CAPACITY);
        assert_eq!(table.len(), 1);
        check_ctrl(&table);
    }

    #[test]
    fn thousand_keys_scenario() {
        let mut table = RawSwissTable::new();
        for v in 0..1000 {
            assert!(insert(&mut table, v).1);
        }
        assert_eq!(table.len(), 1000);

        for v in 0..500 {
            assert!(table.erase(hash(&v), |x| *x == v));
        }
        assert_eq!(table.len(), 500);
        assert_eq!(find(&table, 250), None);
        assert!(find(&table, 750).is_some());

        let (slot, inserted) = insert(&mut table, 250);
        assert!(inserted);
        assert_eq!(find(&table, 250), Some(slot));
        assert_eq!(table.get(slot), Some(&250));
        check_ctrl(&table);
    }

    #[test]
    fn capacity_is_power_of_two_minus_one() {
        let mut table = RawSwissTable::new();
        for v in 0..5000 {
            insert(&mut table, v);
            assert!((table.capacity() + 1).is_power_of_two());
            assert!(table.len() <= max_size(table.capacity()));
        }
        check_ctrl(&table);
    }

    #[test]
    fn erase_then_reinsert() {
        let mut table = RawSwissTable::new();
        for v in 0..100 {
            insert(&mut table, v);
        }
        for v in 0..100 {
            let slot = find(&table, v).unwrap();
            assert_eq!(table.take_slot(slot), v);
            assert_eq!(find(&table, v), None);
            assert!(!table.is_live(slot));
            assert!(insert(&mut table, v).1);
            assert!(find(&table, v).is_some());
        }
        assert_eq!(table.len(), 100);
        check_ctrl(&table);
    }

    #[test]
    fn get_rejects_dead_slots() {
        let mut table = RawSwissTable::new();
        let (slot, _) = insert(&mut table, 9);
        *table.get_mut(slot).unwrap() = 9;
        table.erase_slot(slot);
        assert_eq!(table.get(slot), None);
        assert_eq!(table.get(table.capacity()), None);
        assert_eq!(table.get(usize::MAX), None);
    }

    #[test]
    #[should_panic(expected = "is not live")]
    fn erase_dead_slot_panics() {
        let mut table = RawSwissTable::new();
        let (slot, _) = insert(&mut table, 1);
        table.erase_slot(slot);
        table.erase_slot(slot);
    }

    #[test]
    fn churn_reuses_tombstones_in_place() {
        use std::collections::VecDeque;

        let mut table = RawSwissTable::new();
        let mut live: VecDeque<u64> = (0..64).collect();
        for &v in &live {
            insert(&mut table, v);
        }
        let capacity = table.capacity();
        assert_eq!(capacity, 127);

        while live.len() > 32 {
            let v = live.pop_back().unwrap();
            table.erase(hash(&v), |x| *x == v);
        }

        // A sliding window of 32 keys never needs more than half the load
        // limit, so exhausted growth is always answered by reclaiming
        // tombstones.
        for next in 64..20_000u64 {
            insert(&mut table, next);
            live.push_back(next);
            let old = live.pop_front().unwrap();
            assert!(table.erase(hash(&old), |x| *x == old));
        }

        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.len(), live.len());
        check_ctrl(&table);
        for &v in &live {
            assert!(find(&table, v).is_some());
        }
    }

    #[test]
    fn reuse_tombs_resets_tombstones() {
        let mut table = RawSwissTable::new();
        for v in 0..200 {
            insert(&mut table, v);
        }
        for v in 0..180 {
            table.erase(hash(&v), |x| *x == v);
        }
        table.reuse_tombs(&hash);
        assert_eq!(tombs(&table), 0);
        assert_eq!(table.growth_left, max_size(table.capacity()) - 20);
        check_ctrl(&table);
        for v in 180..200 {
            assert!(find(&table, v).is_some());
        }
    }

    #[test]
    fn reserve_prevents_growth() {
        let mut table = RawSwissTable::with_capacity(1000);
        let capacity = table.capacity();
        assert!(max_size(capacity) >= 1000);
        for v in 0..1000 {
            insert(&mut table, v);
        }
        assert_eq!(table.capacity(), capacity);

        table.reserve(5000, hash);
        assert!(max_size(table.capacity()) >= 6000);
        for v in 0..1000 {
            assert!(find(&table, v).is_some());
        }
        check_ctrl(&table);
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut table = RawSwissTable::new();
        for v in 0..100 {
            insert(&mut table, v);
        }
        let capacity = table.capacity();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(find(&table, 5), None);
        check_ctrl(&table);
        insert(&mut table, 5);
        assert!(find(&table, 5).is_some());
    }

    #[test]
    fn drops_every_element_once() {
        use std::rc::Rc;

        let marker = Rc::new(());
        let h = |v: &(u64, Rc<()>)| hash(&v.0);
        {
            let mut table = RawSwissTable::new();
            for v in 0..300u64 {
                let m = Rc::clone(&marker);
                table.find_or_insert(hash(&v), |x: &(u64, Rc<()>)| x.0 == v, h, || (v, m));
            }
            assert_eq!(Rc::strong_count(&marker), 301);
            for v in 0..100u64 {
                table.erase(hash(&v), |x| x.0 == v);
            }
            assert_eq!(Rc::strong_count(&marker), 201);
            let taken = table.remove(hash(&150), |x| x.0 == 150).unwrap();
            assert_eq!(Rc::strong_count(&marker), 201);
            drop(taken);
            assert_eq!(Rc::strong_count(&marker), 200);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    /// Hands back four times the requested size.
    #[derive(Default)]
    struct Oversized {
        live: std::cell::Cell<usize>,
    }

    unsafe impl Allocator for Oversized {
        fn allocate(&self, layout: Layout) -> Result<crate::alloc::Allocation, crate::alloc::AllocError> {
            let grown = Layout::from_size_align(layout.size() * 4, layout.align()).unwrap();
            let block = crate::alloc::Global.allocate(grown)?;
            self.live.set(self.live.get() + 1);
            Ok(block)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.live.set(self.live.get() - 1);
            unsafe { crate::alloc::Global.deallocate(ptr, layout) }
        }
    }

    #[test]
    fn allocator_headroom_raises_capacity() {
        let oversized = Oversized::default();
        {
            let mut table = RawSwissTable::new_in(&oversized);
            insert(&mut table, 1);
            // 4 * layout(15) fits layout(63) for u64 slots.
            assert_eq!(table.capacity(), 63);
            assert_eq!(table.growth_left, max_size(63) - 1);
            for v in 2..=56 {
                insert(&mut table, v);
            }
            assert_eq!(table.capacity(), 63);
            insert(&mut table, 57);
            assert!(table.capacity() > 63);
            for v in 1..=57 {
                assert!(find(&table, v).is_some());
            }
            check_ctrl(&table);
        }
        assert_eq!(oversized.live.get(), 0);
    }

    #[test]
    fn returned_size_is_freed() {
        let rounding = Rounding::default();
        {
            let mut table = RawSwissTable::new_in(&rounding);
            for v in 0..100 {
                insert(&mut table, v);
            }
            let (layout, _) = table_layout::<u64>(table.capacity()).unwrap();
            let block = table.layout.unwrap().size();
            assert!(block.is_power_of_two());
            assert!(layout.size() <= block);
            check_ctrl(&table);
        }
        assert_eq!(rounding.live.get(), 0);
        assert!(rounding.total.get() > 1);
    }

    #[test]
    fn exhausted_allocator_reports_error() {
        let mut table: RawSwissTable<u64, Exhausted> = RawSwissTable::new_in(Exhausted);
        let err = table.try_reserve(10, hash).unwrap_err();
        assert!(matches!(err, TryReserveError::AllocError { .. }));
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn overflow_reports_error() {
        let mut table: RawSwissTable<u64> = RawSwissTable::new();
        assert_eq!(
            table.try_reserve(usize::MAX, hash),
            Err(TryReserveError::CapacityOverflow)
        );
        insert(&mut table, 1);
        assert_eq!(
            table.try_reserve(usize::MAX, hash),
            Err(TryReserveError::CapacityOverflow)
        );
    }

    #[test]
    fn zero_sized_elements() {
        let mut table: RawSwissTable<()> = RawSwissTable::new();
        let (slot, inserted) = table.find_or_insert(0, |_| true, |_| 0, || ());
        assert!(inserted);
        assert_eq!(table.find(0, |_| true), Some(slot));
        assert_eq!(table.find_or_insert(0, |_| true, |_| 0, || ()), (slot, false));
        table.erase_slot(slot);
        assert!(table.is_empty());
    }

    #[test]
    fn iter_visits_each_live_slot() {
        let mut table = RawSwissTable::new();
        for v in 0..777 {
            insert(&mut table, v);
        }
        for v in (0..777).step_by(3) {
            table.erase(hash(&v), |x| *x == v);
        }
        let iter = table.iter();
        assert_eq!(iter.len(), table.len());
        let mut seen: Vec<u64> = iter.map(|(_, v)| *v).collect();
        seen.sort_unstable();
        let expected: Vec<u64> = (0..777).filter(|v| v % 3 != 0).collect();
        assert_eq!(seen, expected);
        let slots: Vec<usize> = table.iter().map(|(s, _)| s).collect();
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    // Elements are their own hash, so a search starts at the value masked by
    // the capacity.
    fn ident(v: &u64) -> u64 {
        *v
    }

    fn insert_at(table: &mut RawSwissTable<u64>, v: u64) -> usize {
        let (slot, inserted) = table.find_or_insert(v, |x| *x == v, ident, || v);
        assert!(inserted);
        slot
    }

    #[test]
    fn search_starting_on_end_wraps_to_front() {
        let mut table: RawSwissTable<u64> = RawSwissTable::new();
        // 15 & 15 == 15: the first group load starts on END.
        assert_eq!(insert_at(&mut table, 15), 0);
        assert_eq!(table.capacity(), 15);
        assert_eq!(insert_at(&mut table, 31), 1);
        assert_eq!(table.find(15, |x| *x == 15), Some(0));
        assert_eq!(table.find(31, |x| *x == 31), Some(1));
        assert_eq!(table.find(47, |x| *x == 47), None);
        check_ctrl(&table);

        assert_eq!(table.remove(15, |x| *x == 15), Some(15));
        assert_eq!(table.find(31, |x| *x == 31), Some(1));
        assert_eq!(table.remove(31, |x| *x == 31), Some(31));
        assert!(table.is_empty());
        assert_eq!(tombs(&table), 0);
        check_ctrl(&table);
    }

    #[test]
    fn erase_next_to_end_chooses_empty_or_tomb() {
        let mut table: RawSwissTable<u64> = RawSwissTable::with_capacity(20);
        assert_eq!(table.capacity(), 31);
        let growth = table.growth_left;

        // Alone in the table, the last slot and slot WIDTH - 1 go back to EMPTY.
        assert_eq!(insert_at(&mut table, 30), 30);
        table.erase_slot(30);
        assert_eq!(table.ctrl_at(30), EMPTY);
        assert_eq!(insert_at(&mut table, 15), WIDTH - 1);
        table.erase_slot(WIDTH - 1);
        assert_eq!(table.ctrl_at(WIDTH - 1), EMPTY);
        assert_eq!(table.growth_left, growth);
        check_ctrl(&table);

        // With slots 0..=15 full, the window ending at slot 15 starts on END
        // and holds no EMPTY.
        for v in 0..16 {
            assert_eq!(insert_at(&mut table, v), v as usize);
        }
        table.erase_slot(WIDTH - 1);
        assert_eq!(table.ctrl_at(WIDTH - 1), TOMB);
        check_ctrl(&table);

        // 31 searches END + slots 0..15 first, then the group at 15, where it
        // reclaims the tombstone without touching growth_left.
        let growth = table.growth_left;
        assert_eq!(insert_at(&mut table, 31), WIDTH - 1);
        assert_eq!(table.growth_left, growth);
        assert_eq!(tombs(&table), 0);

        // The last slot's window after it wraps through END onto full slots.
        assert_eq!(insert_at(&mut table, 30), 30);
        table.erase_slot(30);
        assert_eq!(table.ctrl_at(30), TOMB);
        check_ctrl(&table);

        for v in 0..15 {
            assert_eq!(table.find(v, |x| *x == v), Some(v as usize));
        }
        assert_eq!(table.find(31, |x| *x == 31), Some(WIDTH - 1));
        assert_eq!(table.find(30, |x| *x == 30), None);
    }

    #[test]
    fn stress_against_hashmap() {
        let mut rng = SmallRng::seed_from_u64(0x5_1155);
        let mut table = RawSwissTable::new();
        let mut reference: HashMap<u64, ()> = HashMap::new();

        for step in 0..50_000 {
            let v = rng.random_range(0..2_000u64);
            if rng.random_bool(0.55) {
                let (_, inserted) = insert(&mut table, v);
                assert_eq!(inserted, reference.insert(v, ()).is_none());
            } else {
                let removed = table.erase(hash(&v), |x| *x == v);
                assert_eq!(removed, reference.remove(&v).is_some());
            }
            assert_eq!(table.len(), reference.len());
            if step % 5_000 == 0 {
                check_ctrl(&table);
                for k in reference.keys() {
                    assert!(find(&table, *k).is_some());
                }
            }
        }
        check_ctrl(&table);
    }
}
