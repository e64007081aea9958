//! Control bytes and 16-lane group matching.
//!
//! Every swiss-table slot has one control byte:
//!
//! ```text
//! 0b0hhh_hhhh  full, low 7 bits are H2 (top 7 bits of the hash)
//! 0x80         EMPTY
//! 0xFE         TOMB (erased, keeps probe chains intact)
//! 0xFF         END (sentinel after the last slot, never matches)
//! ```
//!
//! A [`Group`] loads `WIDTH` consecutive control bytes and answers "which
//! lanes hold X" as a [`BitMask`]. With the `simd` feature on x86/x86_64 this
//! is three SSE2 instructions; every other target uses the byte loop.

/// Empty slot.
pub const EMPTY: u8 = 0x80;
/// Erased slot.
pub const TOMB: u8 = 0xFE;
/// Sentinel after the last slot.
pub const END: u8 = 0xFF;

/// Lanes per group.
pub const WIDTH: usize = 16;

/// Returns `true` for a control byte holding an H2.
#[inline]
pub const fn is_full(ctrl: u8) -> bool {
    ctrl & 0x80 == 0
}

/// The 7-bit fragment stored in the control byte.
#[inline]
pub const fn h2(hash: u64) -> u8 {
    (hash >> 57) as u8
}

/// One bit per lane, bit `i` for lane `i`.
///
/// Iterating yields set lanes from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitMask(pub u16);

impl BitMask {
    /// Returns `true` if any lane is set.
    #[inline]
    pub const fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    /// Lowest set lane.
    #[inline]
    pub const fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Unset lanes below the lowest set lane (`WIDTH` if none is set).
    #[inline]
    pub const fn trailing_zeros(self) -> usize {
        self.0.trailing_zeros() as usize
    }

    /// Unset lanes above the highest set lane (`WIDTH` if none is set).
    #[inline]
    pub const fn leading_zeros(self) -> usize {
        self.0.leading_zeros() as usize
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let bit = self.lowest_set_bit()?;
        self.0 &= self.0 - 1;
        Some(bit)
    }
}

pub use imp::Group;

#[cfg(all(
    feature = "simd",
    any(target_arch = "x86", target_arch = "x86_64"),
    target_feature = "sse2"
))]
mod imp {
    use super::{BitMask, END};

    #[cfg(target_arch = "x86")]
    use core::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64 as arch;

    /// Sixteen control bytes in an SSE2 register.
    #[derive(Clone, Copy)]
    pub struct Group(arch::__m128i);

    impl Group {
        /// Loads `WIDTH` bytes starting at `ptr`.
        ///
        /// # Safety
        ///
        /// `ptr` must be valid for reads of `WIDTH` bytes.
        #[inline]
        pub unsafe fn load(ptr: *const u8) -> Self {
            // Safety: forwarded; loadu has no alignment requirement
            Group(unsafe { arch::_mm_loadu_si128(ptr.cast()) })
        }

        /// Lanes equal to `byte`.
        #[inline]
        pub fn match_byte(self, byte: u8) -> BitMask {
            // Safety: sse2 is enabled for this target
            unsafe {
                let cmp = arch::_mm_cmpeq_epi8(self.0, arch::_mm_set1_epi8(byte as i8));
                BitMask(arch::_mm_movemask_epi8(cmp) as u16)
            }
        }

        /// Lanes holding `EMPTY`.
        #[inline]
        pub fn match_empty(self) -> BitMask {
            self.match_byte(super::EMPTY)
        }

        /// Lanes holding `EMPTY` or `TOMB`.
        #[inline]
        pub fn match_free(self) -> BitMask {
            // Safety: sse2 is enabled for this target
            let special = unsafe { arch::_mm_movemask_epi8(self.0) as u16 };
            BitMask(special & !self.match_byte(END).0)
        }

        /// Lanes holding an H2.
        #[inline]
        pub fn match_full(self) -> BitMask {
            // Safety: sse2 is enabled for this target
            let special = unsafe { arch::_mm_movemask_epi8(self.0) as u16 };
            BitMask(!special)
        }
    }
}

#[cfg(not(all(
    feature = "simd",
    any(target_arch = "x86", target_arch = "x86_64"),
    target_feature = "sse2"
)))]
mod imp {
    use super::{BitMask, EMPTY, END, WIDTH, is_full};

    /// Sixteen control bytes, matched one at a time.
    #[derive(Clone, Copy)]
    pub struct Group([u8; WIDTH]);

    impl Group {
        /// Loads `WIDTH` bytes starting at `ptr`.
        ///
        /// # Safety
        ///
        /// `ptr` must be valid for reads of `WIDTH` bytes.
        #[inline]
        pub unsafe fn load(ptr: *const u8) -> Self {
            // Safety: forwarded
            Group(unsafe { ptr.cast::<[u8; WIDTH]>().read_unaligned() })
        }

        #[inline]
        fn mask(self, f: impl Fn(u8) -> bool) -> BitMask {
            let mut bits = 0u16;
            for (i, &byte) in self.0.iter().enumerate() {
                bits |= u16::from(f(byte)) << i;
            }
            BitMask(bits)
        }

        /// Lanes equal to `byte`.
        #[inline]
        pub fn match_byte(self, byte: u8) -> BitMask {
            self.mask(|b| b == byte)
        }

        /// Lanes holding `EMPTY`.
        #[inline]
        pub fn match_empty(self) -> BitMask {
            self.match_byte(EMPTY)
        }

        /// Lanes holding `EMPTY` or `TOMB`.
        #[inline]
        pub fn match_free(self) -> BitMask {
            self.mask(|b| !is_full(b) && b != END)
        }

        /// Lanes holding an H2.
        #[inline]
        pub fn match_full(self) -> BitMask {
            self.mask(is_full)
        }
    }
}
