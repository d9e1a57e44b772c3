//! # Register Descriptors
//!
//! A [`Register<W>`] is a byte offset into a register window together with
//! the width of the word stored there. Fields and bitsets bound to it carry
//! the offset along so that accessors only need a single descriptor.

use crate::{Bitfield, Bitset2, Word, masked_bit};
use core::marker::PhantomData;

/// A `W`-sized register at a fixed byte offset.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Register<W: Word> {
    offset: usize,
    _word: PhantomData<W>,
}

/// A [`Bitfield`] inside a specific [`Register`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Field<W: Word> {
    register: Register<W>,
    bits: Bitfield<W>,
}

/// A [`Bitset2`] inside a specific [`Register`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RegisterBitset<W: Word> {
    register: Register<W>,
    bits: Bitset2<W>,
}

impl<W: Word> Register<W> {
    /// Register at `offset` bytes from the start of the window.
    #[inline]
    #[must_use]
    pub const fn at(offset: usize) -> Self {
        Self {
            offset,
            _word: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }

    /// Same register width, `delta` bytes further into the window.
    #[inline]
    #[must_use]
    pub const fn add(self, delta: usize) -> Self {
        Self::at(self.offset + delta)
    }

    /// Bind the bits `[shift, shift + width)` of this register.
    #[inline]
    #[must_use]
    pub const fn field(self, shift: u32, width: u32) -> Field<W> {
        Field {
            register: self,
            bits: Bitfield::new(shift, width),
        }
    }

    /// Bind two disjoint ranges of this register as one value.
    #[inline]
    #[must_use]
    pub const fn bitset(self, low: Bitfield<W>, high: Bitfield<W>) -> RegisterBitset<W> {
        RegisterBitset {
            register: self,
            bits: Bitset2::new(low, high),
        }
    }
}

impl Register<u32> {
    /// Bind value bit `bit` and its mask bit `bit + 16`.
    #[inline]
    #[must_use]
    pub const fn masked_bit(self, bit: u32) -> RegisterBitset<u32> {
        RegisterBitset {
            register: self,
            bits: masked_bit(bit),
        }
    }
}

impl<W: Word> Field<W> {
    #[inline]
    #[must_use]
    pub const fn register(self) -> Register<W> {
        self.register
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> Bitfield<W> {
        self.bits
    }
}

impl<W: Word> RegisterBitset<W> {
    #[inline]
    #[must_use]
    pub const fn register(self) -> Register<W> {
        self.register
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> Bitset2<W> {
        self.bits
    }
}
