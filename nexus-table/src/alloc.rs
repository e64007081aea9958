//! Allocator seam for table storage.
//!
//! Tables make exactly one allocation at a time and hand the same
//! [`Allocation`] back when freeing it. An allocator may return more bytes
//! than requested; the swiss table uses that headroom to raise its capacity.

use core::ptr::NonNull;
use std::alloc::{Layout, alloc, dealloc};

/// A block returned by an [`Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the block, aligned as requested.
    pub ptr: NonNull<u8>,
    /// Usable size in bytes, at least the requested size.
    pub size: usize,
}

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}

/// Block allocator used by the tables.
///
/// # Safety
///
/// `allocate` must return a block valid for reads and writes of `size` bytes,
/// aligned to `layout.align()`, until it is passed to `deallocate`.
pub unsafe trait Allocator {
    /// Allocates a block of at least `layout.size()` bytes.
    ///
    /// `layout.size()` is never zero.
    fn allocate(&self, layout: Layout) -> Result<Allocation, AllocError>;

    /// Frees a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator, and `layout` must
    /// have the returned size and the requested alignment.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<Allocation, AllocError> {
        debug_assert!(layout.size() > 0);
        // Safety: size is non-zero
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr)
            .map(|ptr| Allocation {
                ptr,
                size: layout.size(),
            })
            .ok_or(AllocError)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: forwarded from the caller
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<Allocation, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Safety: forwarded from the caller
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    /// Rounds every request up to a power of two and counts live blocks.
    #[derive(Debug, Default)]
    pub(crate) struct Rounding {
        pub(crate) live: Cell<usize>,
        pub(crate) total: Cell<usize>,
    }

    unsafe impl Allocator for Rounding {
        fn allocate(&self, layout: Layout) -> Result<Allocation, AllocError> {
            let size = layout.size().next_power_of_two();
            let rounded = Layout::from_size_align(size, layout.align()).map_err(|_| AllocError)?;
            let allocation = Global.allocate(rounded)?;
            self.live.set(self.live.get() + 1);
            self.total.set(self.total.get() + 1);
            Ok(allocation)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            assert!(layout.size().is_power_of_two(), "freed with a different size");
            self.live.set(self.live.get() - 1);
            unsafe { Global.deallocate(ptr, layout) }
        }
    }

    /// Fails every request.
    #[derive(Debug, Default, Clone, Copy)]
    pub(crate) struct Exhausted;

    unsafe impl Allocator for Exhausted {
        fn allocate(&self, _layout: Layout) -> Result<Allocation, AllocError> {
            Err(AllocError)
        }

        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
            unreachable!("nothing was allocated")
        }
    }
}
