//! Storage keys.
//!
//! Every node-based container in this crate links its nodes by [`Key`]
//! instead of by pointer. A key is a plain copyable integer into some
//! [`Storage`](crate::Storage), and one value of the key type is reserved as the
//! "null link" sentinel.

/// Index type used to address nodes in storage.
///
/// `NONE` is the null link. Containers never hand it out as a valid key,
/// so a storage indexed by `u8` holds at most 255 nodes.
///
/// # Example
///
/// ```
/// use nexus_intrusive::Key;
///
/// let key: u32 = 7;
/// assert!(key.is_some());
/// assert!(u32::NONE.is_none());
/// assert_eq!(u32::from_usize(7), key);
/// ```
///
/// Strongly-typed handles can implement it directly:
///
/// ```
/// use nexus_intrusive::Key;
///
/// #[derive(Copy, Clone, PartialEq, Eq, Debug)]
/// struct SessionId(u32);
///
/// impl Key for SessionId {
///     const NONE: Self = SessionId(u32::MAX);
///
///     fn from_usize(val: usize) -> Self {
///         SessionId(val as u32)
///     }
///
///     fn as_usize(&self) -> usize {
///         self.0 as usize
///     }
/// }
///
/// assert!(SessionId::NONE.is_none());
/// ```
pub trait Key: Copy + Eq + 'static {
    /// The null link.
    const NONE: Self;

    /// Creates a key from a slot position.
    fn from_usize(val: usize) -> Self;

    /// Returns the slot position of this key.
    fn as_usize(&self) -> usize;

    /// Returns `true` if this is the null link.
    #[inline]
    fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Returns `true` if this is not the null link.
    #[inline]
    fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Converts to `Option`, mapping the null link to `None`.
    #[inline]
    fn into_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }
}

macro_rules! impl_key_for_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Key for $ty {
                const NONE: Self = <$ty>::MAX;

                #[inline]
                fn from_usize(val: usize) -> Self {
                    debug_assert!(val < <$ty>::MAX as usize, "key out of range");
                    val as Self
                }

                #[inline]
                fn as_usize(&self) -> usize {
                    *self as usize
                }
            }
        )*
    };
}

impl_key_for_unsigned!(u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_key_sentinel {
        ($($ty:ty => $name:ident),*) => {
            $(
                #[test]
                fn $name() {
                    assert!(<$ty>::NONE.is_none());
                    assert!(!<$ty>::NONE.is_some());
                    assert_eq!(<$ty>::NONE, <$ty>::MAX);
                    assert!((0 as $ty).is_some());
                    assert_eq!((<$ty>::MAX - 1).into_option(), Some(<$ty>::MAX - 1));
                    assert_eq!(<$ty>::NONE.into_option(), None);
                }
            )*
        };
    }

    test_key_sentinel!(
        u8 => u8_sentinel,
        u16 => u16_sentinel,
        u32 => u32_sentinel,
        u64 => u64_sentinel,
        usize => usize_sentinel
    );

    #[test]
    fn from_usize_roundtrip() {
        for i in [0usize, 1, 100, 1000, u16::MAX as usize] {
            assert_eq!(u32::from_usize(i).as_usize(), i);
        }
    }
}
