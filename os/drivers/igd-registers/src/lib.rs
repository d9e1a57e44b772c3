//! # Typed Register Model
//!
//! Named sub-ranges of fixed-width hardware words, plus the plumbing to read
//! and write them through a memory-mapped register window.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bitfield<W>`] | A contiguous `(shift, width)` slice of a word `W`. |
//! | [`Bitset2<W>`] | Two non-adjacent bitfields treated as one logical value. |
//! | [`Register<W>`] | A word-sized register at a byte offset inside a window. |
//! | [`Field<W>`] / [`RegisterBitset<W>`] | A bitfield (or bitset) bound to its register. |
//! | [`MmioWindow`] | Byte-addressed register window (real MMIO or host memory). |
//!
//! Field geometry is validated when the descriptor is built. Descriptors are
//! meant to live in `const` items, which turns an out-of-range field into a
//! compile error:
//!
//! ```compile_fail
//! # use igd_registers::Bitfield;
//! const BROKEN: Bitfield<u32> = Bitfield::new(30, 4);
//! # let _ = BROKEN;
//! ```
//!
//! Values written into a field are truncated to the field width. Callers that
//! care about overflow check [`Bitfield::fits`] first.
//!
//! ## Example
//!
//! ```rust
//! # use igd_registers::*;
//! const CTL: Register<u32> = Register::at(0x203C);
//! const BUFFER_LENGTH: Field<u32> = CTL.field(12, 9);
//! const ENABLE: Field<u32> = CTL.field(0, 1);
//!
//! let window = MemoryWindow::new(0x4000);
//! window.write_field(BUFFER_LENGTH, 3);
//! window.write_field(ENABLE, 1);
//! assert_eq!(window.read(CTL), (3 << 12) | 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod bitfield;
mod bitset;
mod mmio;
mod register;

pub use crate::bitfield::Bitfield;
pub use crate::bitset::{Bitset2, MASKED_DISABLE, MASKED_ENABLE, masked_bit};
pub use crate::mmio::{MemoryWindow, MmioExt, MmioWindow, VolatileWindow, WriteRecord};
pub use crate::register::{Field, Register, RegisterBitset};

use core::fmt;

mod sealed {
    pub trait Sealed {}
}

/// Hardware word types a register or bitfield can be built on.
///
/// Implemented for `u32` and `u64` only.
pub trait Word: sealed::Sealed + Copy + Eq + fmt::Debug + fmt::LowerHex + Default {
    /// Width of the word in bits.
    const BITS: u32;

    /// Widen to `u64`.
    fn to_u64(self) -> u64;

    /// Narrow from `u64`, dropping the bits above [`Self::BITS`].
    fn from_u64_truncating(value: u64) -> Self;

    /// Read a word of this width from `window` at `offset`.
    fn read_from<M: MmioWindow + ?Sized>(window: &M, offset: usize) -> Self;

    /// Write a word of this width into `window` at `offset`.
    fn write_to<M: MmioWindow + ?Sized>(self, window: &M, offset: usize);
}

impl sealed::Sealed for u32 {}
impl sealed::Sealed for u64 {}

impl Word for u32 {
    const BITS: u32 = 32;

    #[inline]
    fn to_u64(self) -> u64 {
        u64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn from_u64_truncating(value: u64) -> Self {
        value as Self
    }

    #[inline]
    fn read_from<M: MmioWindow + ?Sized>(window: &M, offset: usize) -> Self {
        window.read_u32(offset)
    }

    #[inline]
    fn write_to<M: MmioWindow + ?Sized>(self, window: &M, offset: usize) {
        window.write_u32(offset, self);
    }
}

impl Word for u64 {
    const BITS: u32 = 64;

    #[inline]
    fn to_u64(self) -> u64 {
        self
    }

    #[inline]
    fn from_u64_truncating(value: u64) -> Self {
        value
    }

    #[inline]
    fn read_from<M: MmioWindow + ?Sized>(window: &M, offset: usize) -> Self {
        window.read_u64(offset)
    }

    #[inline]
    fn write_to<M: MmioWindow + ?Sized>(self, window: &M, offset: usize) {
        window.write_u64(offset, self);
    }
}
