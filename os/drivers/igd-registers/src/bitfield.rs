//! # Bitfields
//!
//! A [`Bitfield<W>`] names the bits `[shift, shift + width)` of a word `W`.

use crate::Word;
use core::marker::PhantomData;

/// A contiguous bit range inside a word of type `W`.
///
/// Geometry is checked by [`Bitfield::new`]: a field never has zero width
/// and never reaches past the top bit of `W`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Bitfield<W: Word> {
    shift: u32,
    width: u32,
    _word: PhantomData<W>,
}

impl<W: Word> Bitfield<W> {
    /// Describe the bits `[shift, shift + width)`.
    ///
    /// # Panics
    /// Panics if `width` is zero or the field extends past `W::BITS`. In a
    /// `const` item this is a compile-time error.
    #[inline]
    #[must_use]
    pub const fn new(shift: u32, width: u32) -> Self {
        assert!(width > 0, "bitfield must be at least one bit wide");
        assert!(
            shift < W::BITS && width <= W::BITS - shift,
            "bitfield exceeds the width of its register"
        );
        Self {
            shift,
            width,
            _word: PhantomData,
        }
    }

    /// Position of the lowest bit.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        self.shift
    }

    /// Number of bits.
    #[inline]
    #[must_use]
    pub const fn width(self) -> u32 {
        self.width
    }

    /// Largest value representable in the field, right-aligned.
    #[inline]
    #[must_use]
    pub const fn max_value(self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// The field's bits in place, as a raw `u64`.
    #[inline]
    #[must_use]
    pub const fn raw_mask(self) -> u64 {
        self.max_value() << self.shift
    }

    /// The field's bits in place.
    #[inline]
    #[must_use]
    pub fn mask(self) -> W {
        W::from_u64_truncating(self.raw_mask())
    }

    /// Whether `value` can be stored without truncation.
    #[inline]
    #[must_use]
    pub const fn fits(self, value: u64) -> bool {
        value & !self.max_value() == 0
    }

    /// Position `value` inside an otherwise empty word.
    ///
    /// Bits of `value` above the field width are dropped.
    #[inline]
    #[must_use]
    pub fn bits(self, value: u64) -> W {
        W::from_u64_truncating((value & self.max_value()) << self.shift)
    }

    /// Extract the field from `word`, right-aligned.
    #[inline]
    #[must_use]
    pub fn get(self, word: W) -> u64 {
        (word.to_u64() >> self.shift) & self.max_value()
    }

    /// Return `word` with the field replaced by `value`.
    ///
    /// Bits outside the field are preserved; excess bits of `value` are dropped.
    #[inline]
    #[must_use]
    pub fn set(self, word: W, value: u64) -> W {
        let cleared = word.to_u64() & !self.raw_mask();
        W::from_u64_truncating(cleared | self.bits(value).to_u64())
    }

    /// Return `word` with the field zeroed.
    #[inline]
    #[must_use]
    pub fn clear(self, word: W) -> W {
        W::from_u64_truncating(word.to_u64() & !self.raw_mask())
    }
}
