//! Sentinel-based dense index for the deterministic table.
//!
//! Buckets store the dense element index and a truncated hash in the same
//! integer type. A reserved sentinel (`MAX`) marks an empty bucket instead of
//! an `Option`, so a bucket of `u32`s is 8 bytes.

/// A copyable bucket integer with a sentinel "empty" value.
///
/// # Example
///
/// ```
/// use nexus_table::Index;
///
/// assert!(5u32.is_some());
/// assert!(u32::NONE.is_none());
/// assert_eq!(u16::from_hash(0x1234_5678), 0x5678);
/// ```
pub trait Index: Copy + Eq {
    /// Sentinel value marking an empty bucket.
    const NONE: Self;

    /// Returns `true` if this is the sentinel value.
    #[inline]
    fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Returns `true` if this is not the sentinel value.
    #[inline]
    fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Widens to `usize`.
    fn as_usize(self) -> usize;

    /// Narrows a dense index. `val` must be below `NONE`.
    fn from_usize(val: usize) -> Self;

    /// Keeps the low bits of a 64-bit hash.
    fn from_hash(hash: u64) -> Self;

    /// Number of elements a table indexed by this type can hold.
    #[inline]
    fn max_len() -> usize {
        Self::NONE.as_usize()
    }
}

macro_rules! impl_index_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Index for $ty {
                const NONE: Self = <$ty>::MAX;

                #[inline]
                fn as_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(val: usize) -> Self {
                    debug_assert!(val < <$ty>::MAX as usize, "index out of range");
                    val as Self
                }

                #[inline]
                fn from_hash(hash: u64) -> Self {
                    hash as Self
                }
            }
        )*
    };
}

impl_index_for_unsigned!(u8, u16, u32, u64, usize);
