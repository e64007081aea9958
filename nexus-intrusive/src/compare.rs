//! Key selection and comparators.
//!
//! Trees order nodes by `C::compare(a.key(), b.key())` where the key comes
//! from [`Keyed`] and `C` is a [`Compare`] implementation. Heaps use the
//! boolean [`HeapCompare`] instead, see its docs for the direction.

use core::cmp::Ordering;

/// Projects an element to the key it is ordered by.
///
/// The key of a linked element must not change while it is in a container.
///
/// # Example
///
/// ```
/// use nexus_intrusive::Keyed;
///
/// struct Order {
///     id: u64,
///     qty: u32,
/// }
///
/// impl Keyed for Order {
///     type Key = u64;
///
///     fn key(&self) -> &u64 {
///         &self.id
///     }
/// }
/// ```
pub trait Keyed {
    /// Key type.
    type Key: ?Sized;

    /// Returns the key of this element.
    fn key(&self) -> &Self::Key;
}

macro_rules! impl_keyed_identity {
    ($($ty:ty),*) => {
        $(
            impl Keyed for $ty {
                type Key = $ty;

                #[inline]
                fn key(&self) -> &$ty {
                    self
                }
            }
        )*
    };
}

impl_keyed_identity!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char, bool, String
);

impl Keyed for &str {
    type Key = str;

    #[inline]
    fn key(&self) -> &str {
        self
    }
}

impl<K, V> Keyed for (K, V) {
    type Key = K;

    #[inline]
    fn key(&self) -> &K {
        &self.0
    }
}

/// Three-way comparator used by the trees.
///
/// Must be a strict weak order consistent across calls.
pub trait Compare<K: ?Sized> {
    /// Compares two keys.
    fn compare(lhs: &K, rhs: &K) -> Ordering;
}

/// Ascending order via [`Ord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Natural;

impl<K: Ord + ?Sized> Compare<K> for Natural {
    #[inline]
    fn compare(lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// Descending order via [`Ord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reverse;

impl<K: Ord + ?Sized> Compare<K> for Reverse {
    #[inline]
    fn compare(lhs: &K, rhs: &K) -> Ordering {
        rhs.cmp(lhs)
    }
}

/// Boolean comparator used by [`Heap`](crate::Heap).
///
/// **`C::test(lhs, rhs) == true` means `rhs` belongs above `lhs`.**
///
/// This is the reverse of what `std::collections::BinaryHeap` users expect:
/// [`Greater`] (`lhs > rhs`) keeps the smallest key on top and builds a
/// min-heap, [`Less`] builds a max-heap. Prefer the
/// [`MinHeap`](crate::MinHeap) and [`MaxHeap`](crate::MaxHeap) aliases.
pub trait HeapCompare<K: ?Sized> {
    /// Returns `true` if `rhs` must sit above `lhs`.
    fn test(lhs: &K, rhs: &K) -> bool;
}

/// `lhs > rhs`. Builds a min-heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greater;

impl<K: Ord + ?Sized> HeapCompare<K> for Greater {
    #[inline]
    fn test(lhs: &K, rhs: &K) -> bool {
        lhs > rhs
    }
}

/// `lhs < rhs`. Builds a max-heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Less;

impl<K: Ord + ?Sized> HeapCompare<K> for Less {
    #[inline]
    fn test(lhs: &K, rhs: &K) -> bool {
        lhs < rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_and_reverse() {
        assert_eq!(Natural::compare(&1, &2), Ordering::Less);
        assert_eq!(Reverse::compare(&1, &2), Ordering::Greater);
        assert_eq!(Natural::compare("b", "a"), Ordering::Greater);
    }

    #[test]
    fn heap_compare_direction() {
        // Greater: the smaller key (rhs) goes above.
        assert!(Greater::test(&5, &3));
        assert!(!Greater::test(&3, &5));
        assert!(Less::test(&3, &5));
    }

    #[test]
    fn pair_is_keyed_by_first() {
        let pair = (7u32, "seven");
        assert_eq!(*pair.key(), 7);
        assert_eq!("abc".key(), "abc");
    }
}
