//! Bit extraction and insertion on plain integers.
//!
//! Hardware registers are stored as plain integers and every field is read through these
//! traits, so the bit layout is spelled out where the field is defined.

/// Extract a single bit or an inclusive range of bits.
pub trait Bit: Sized {
    /// Extract bit `n`.
    #[must_use]
    fn bit(self, n: usize) -> bool;

    /// Extract bits `ls` to `ms`, both inclusive, shifted down to bit 0.
    #[must_use]
    fn bit_range(self, ls: usize, ms: usize) -> Self;
}

/// Return a copy with a single bit or an inclusive range of bits replaced.
pub trait BitSet: Sized {
    #[must_use]
    fn set_bit(self, n: usize, val: bool) -> Self;

    /// Replace bits `ls` to `ms` with the low bits of `val`. Bits of `val` that don't fit are
    /// ignored.
    #[must_use]
    fn set_bit_range(self, ls: usize, ms: usize, val: Self) -> Self;
}

/// Mask of the `n` lowest bits. Handles the full width without overflowing the shift.
macro_rules! low_mask {
    ($t:ty, $n:expr) => {
        <$t>::MAX.checked_shr(<$t>::BITS - $n as u32).unwrap_or(0)
    };
}

macro_rules! impl_bits {
    ($($t:ty),*) => {$(
        impl Bit for $t {
            #[inline]
            fn bit(self, n: usize) -> bool {
                (self >> n) & 1 == 1
            }

            #[inline]
            fn bit_range(self, ls: usize, ms: usize) -> Self {
                debug_assert!(ls <= ms && ms < <$t>::BITS as usize);
                (self >> ls) & low_mask!($t, ms - ls + 1)
            }
        }

        impl BitSet for $t {
            #[inline]
            fn set_bit(self, n: usize, val: bool) -> Self {
                (self & !(1 << n)) | ((val as $t) << n)
            }

            #[inline]
            fn set_bit_range(self, ls: usize, ms: usize, val: Self) -> Self {
                debug_assert!(ls <= ms && ms < <$t>::BITS as usize);
                let mask = low_mask!($t, ms - ls + 1);
                (self & !(mask << ls)) | ((val & mask) << ls)
            }
        }
    )*}
}

impl_bits!(u8, u16, u32, u64);
