//! # Bitsets
//!
//! A [`Bitset2<W>`] glues two bitfields of the same word into one logical
//! value. The low bits of the value go to the first field, the remaining
//! bits to the second. Both halves land in the word in a single update.
//!
//! The most common use is the Intel *masked register* convention: the upper
//! 16 bits of the register select which of the lower 16 bits a write
//! actually changes. [`masked_bit`] builds that pair for a single bit.

use crate::{Bitfield, Word};

/// Two disjoint bitfields read and written as one value.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Bitset2<W: Word> {
    low: Bitfield<W>,
    high: Bitfield<W>,
}

/// Value for a [`masked_bit`] bitset that sets the bit.
pub const MASKED_ENABLE: u64 = 0b11;

/// Value for a [`masked_bit`] bitset that clears the bit.
pub const MASKED_DISABLE: u64 = 0b10;

impl<W: Word> Bitset2<W> {
    /// Combine `low` (value bits `0..low.width()`) with `high` (the bits above).
    ///
    /// # Panics
    /// Panics if the two fields overlap.
    #[inline]
    #[must_use]
    pub const fn new(low: Bitfield<W>, high: Bitfield<W>) -> Self {
        assert!(
            low.raw_mask() & high.raw_mask() == 0,
            "bitset fields must not overlap"
        );
        Self { low, high }
    }

    /// Total width of the logical value.
    #[inline]
    #[must_use]
    pub const fn width(self) -> u32 {
        self.low.width() + self.high.width()
    }

    /// Mask of every bit the bitset owns.
    #[inline]
    #[must_use]
    pub const fn raw_mask(self) -> u64 {
        self.low.raw_mask() | self.high.raw_mask()
    }

    /// Scatter `value` over both fields of an otherwise empty word.
    #[inline]
    #[must_use]
    pub fn bits(self, value: u64) -> W {
        let low = self.low.bits(value).to_u64();
        let high = self.high.bits(value >> self.low.width()).to_u64();
        W::from_u64_truncating(low | high)
    }

    /// Gather both fields of `word` into one right-aligned value.
    #[inline]
    #[must_use]
    pub fn get(self, word: W) -> u64 {
        self.low.get(word) | (self.high.get(word) << self.low.width())
    }

    /// Return `word` with both fields replaced by the halves of `value`.
    #[inline]
    #[must_use]
    pub fn set(self, word: W, value: u64) -> W {
        let word = self.low.set(word, value);
        self.high.set(word, value >> self.low.width())
    }
}

/// The value bit `bit` of a masked register, paired with its mask bit `bit + 16`.
///
/// Write [`MASKED_ENABLE`] to set the bit and [`MASKED_DISABLE`] to clear it;
/// other bits of the register are left alone by the hardware.
///
/// # Panics
/// Panics if `bit` is not in the lower half of the register.
#[inline]
#[must_use]
pub const fn masked_bit(bit: u32) -> Bitset2<u32> {
    assert!(bit < 16, "masked registers only carry 16 value bits");
    Bitset2::new(Bitfield::new(bit, 1), Bitfield::new(bit + 16, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIT_15_AND_30: Bitset2<u32> = Bitset2::new(Bitfield::new(15, 1), Bitfield::new(30, 1));

    #[test]
    fn value_is_split_across_both_fields() {
        let word = BIT_15_AND_30.set(0, 0b11);
        assert_eq!(word, (1 << 15) | (1 << 30));

        let word = BIT_15_AND_30.set(word, 0b10);
        assert_eq!(word, 1 << 30);
        assert_eq!(BIT_15_AND_30.get(word), 0b10);
    }

    #[test]
    fn set_preserves_unrelated_bits() {
        let word = BIT_15_AND_30.set(0x0000_00FF, 0b01);
        assert_eq!(word, 0x0000_00FF | (1 << 15));
        assert_eq!(BIT_15_AND_30.width(), 2);
    }

    #[test]
    fn masked_bit_encodings() {
        let execlist = masked_bit(15);
        assert_eq!(execlist.bits(MASKED_ENABLE), 0x8000_8000);
        assert_eq!(execlist.bits(MASKED_DISABLE), 0x8000_0000);
        assert_eq!(masked_bit(0).bits(MASKED_ENABLE), 0x0001_0001);
    }

    #[test]
    fn wide_split_value() {
        let split: Bitset2<u64> = Bitset2::new(Bitfield::new(0, 4), Bitfield::new(32, 8));
        let word = split.bits(0xABC);
        assert_eq!(word, 0xC | (0xAB << 32));
        assert_eq!(split.get(word), 0xABC);
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn rejects_overlapping_fields() {
        let _ = Bitset2::<u32>::new(Bitfield::new(0, 4), Bitfield::new(3, 2));
    }
}
