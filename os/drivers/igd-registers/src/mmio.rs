//! # Register Windows
//!
//! [`MmioWindow`] is the byte-addressed view of a device's register space.
//! Two implementations exist:
//!
//! - [`VolatileWindow`] wraps a mapped MMIO range and uses volatile accesses.
//! - [`MemoryWindow`] is plain host memory that also records every write in
//!   order, used to run the driver without hardware.
//!
//! [`MmioExt`] adds typed accessors on top of any window.

use crate::{Field, Register, RegisterBitset, Word};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ptr::NonNull;
use log::trace;

/// A register window addressed by byte offset.
///
/// Offsets must be naturally aligned for the access width and lie inside
/// [`len`](MmioWindow::len); implementations panic otherwise.
pub trait MmioWindow {
    /// Size of the window in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u32(&self, offset: usize) -> u32;
    fn write_u32(&self, offset: usize, value: u32);
    fn read_u64(&self, offset: usize) -> u64;
    fn write_u64(&self, offset: usize, value: u64);
}

/// Typed register accessors for every [`MmioWindow`].
pub trait MmioExt: MmioWindow {
    /// Read a whole register.
    #[inline]
    fn read<W: Word>(&self, register: Register<W>) -> W {
        W::read_from(self, register.offset())
    }

    /// Write a whole register.
    #[inline]
    fn write<W: Word>(&self, register: Register<W>, value: W) {
        trace!("mmio write {:#07x} <- {value:#x}", register.offset());
        value.write_to(self, register.offset());
    }

    /// Read one field of a register, right-aligned.
    #[inline]
    fn read_field<W: Word>(&self, field: Field<W>) -> u64 {
        field.bits().get(self.read(field.register()))
    }

    /// Update one field of a register, preserving the other bits.
    #[inline]
    fn write_field<W: Word>(&self, field: Field<W>, value: u64) {
        let current = self.read(field.register());
        self.write(field.register(), field.bits().set(current, value));
    }

    /// Read a bitset, gathering both halves into one value.
    #[inline]
    fn read_bitset<W: Word>(&self, bitset: RegisterBitset<W>) -> u64 {
        bitset.bits().get(self.read(bitset.register()))
    }

    /// Update both halves of a bitset with a single register write.
    #[inline]
    fn write_bitset<W: Word>(&self, bitset: RegisterBitset<W>, value: u64) {
        let current = self.read(bitset.register());
        self.write(bitset.register(), bitset.bits().set(current, value));
    }
}

impl<T: MmioWindow + ?Sized> MmioExt for T {}

#[inline]
fn check_access(len: usize, offset: usize, width: usize) {
    assert!(
        offset.is_multiple_of(width),
        "unaligned {width}-byte register access at {offset:#x}"
    );
    assert!(
        offset.checked_add(width).is_some_and(|end| end <= len),
        "register access at {offset:#x} outside window of {len:#x} bytes"
    );
}

/// A mapped MMIO range accessed with volatile loads and stores.
pub struct VolatileWindow {
    base: NonNull<u8>,
    len: usize,
}

impl VolatileWindow {
    /// Wrap `len` bytes of mapped register space starting at `base`.
    ///
    /// # Safety
    /// - `base..base + len` must be mapped, uncached device memory for the
    ///   lifetime of the window.
    /// - `base` must be at least 8-byte aligned.
    #[inline]
    #[must_use]
    pub const unsafe fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }
}

impl MmioWindow for VolatileWindow {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn read_u32(&self, offset: usize) -> u32 {
        check_access(self.len, offset, 4);
        // SAFETY: bounds and alignment checked; the mapping is guaranteed by `new`.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().read_volatile() }
    }

    #[inline]
    fn write_u32(&self, offset: usize, value: u32) {
        check_access(self.len, offset, 4);
        // SAFETY: see `read_u32`.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().write_volatile(value) }
    }

    #[inline]
    fn read_u64(&self, offset: usize) -> u64 {
        check_access(self.len, offset, 8);
        // SAFETY: see `read_u32`.
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().read_volatile() }
    }

    #[inline]
    fn write_u64(&self, offset: usize, value: u64) {
        check_access(self.len, offset, 8);
        // SAFETY: see `read_u32`.
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().write_volatile(value) }
    }
}

/// One register write seen by a [`MemoryWindow`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct WriteRecord {
    pub offset: usize,
    pub value: u64,
    /// Access width in bytes (4 or 8).
    pub width: usize,
}

/// A register window backed by host memory.
///
/// Reads return whatever was last written (or poked). Every write through
/// the [`MmioWindow`] interface is appended to a log that tests inspect to
/// verify register programming order. [`poke_u32`](Self::poke_u32) and
/// [`poke_u64`](Self::poke_u64) change the contents without logging, which
/// is how a test plays the hardware side.
pub struct MemoryWindow {
    words: RefCell<Vec<u64>>,
    writes: RefCell<Vec<WriteRecord>>,
    len: usize,
}

impl MemoryWindow {
    /// A zero-filled window of `len` bytes (rounded up to a multiple of 8).
    #[must_use]
    pub fn new(len: usize) -> Self {
        let len = len.next_multiple_of(8);
        Self {
            words: RefCell::new(vec![0; len / 8]),
            writes: RefCell::new(Vec::new()),
            len,
        }
    }

    /// All logged writes, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.borrow().clone()
    }

    /// Logged writes to a single offset, oldest first.
    #[must_use]
    pub fn writes_to(&self, offset: usize) -> Vec<u64> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.offset == offset)
            .map(|w| w.value)
            .collect()
    }

    /// Forget all logged writes.
    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Store a dword without logging it.
    pub fn poke_u32(&self, offset: usize, value: u32) {
        check_access(self.len, offset, 4);
        let mut words = self.words.borrow_mut();
        let word = &mut words[offset / 8];
        let shift = (offset % 8) * 8;
        *word = (*word & !(0xFFFF_FFFF << shift)) | (u64::from(value) << shift);
    }

    /// Store a qword without logging it.
    pub fn poke_u64(&self, offset: usize, value: u64) {
        check_access(self.len, offset, 8);
        self.words.borrow_mut()[offset / 8] = value;
    }

    fn log(&self, offset: usize, value: u64, width: usize) {
        self.writes.borrow_mut().push(WriteRecord {
            offset,
            value,
            width,
        });
    }
}

impl MmioWindow for MemoryWindow {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_u32(&self, offset: usize) -> u32 {
        check_access(self.len, offset, 4);
        let shift = (offset % 8) * 8;
        (self.words.borrow()[offset / 8] >> shift) as u32
    }

    fn write_u32(&self, offset: usize, value: u32) {
        self.poke_u32(offset, value);
        self.log(offset, u64::from(value), 4);
    }

    fn read_u64(&self, offset: usize) -> u64 {
        check_access(self.len, offset, 8);
        self.words.borrow()[offset / 8]
    }

    fn write_u64(&self, offset: usize, value: u64) {
        self.poke_u64(offset, value);
        self.log(offset, value, 8);
    }
}
