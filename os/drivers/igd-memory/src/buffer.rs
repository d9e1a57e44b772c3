//! # DMA Buffers

use crate::PhysicalAddress;
use core::fmt;
use core::ptr::NonNull;

/// Device-visible memory: a CPU mapping and the physical address behind it.
///
/// The handle does not free anything on drop; buffers go back to the
/// allocator that produced them via [`DmaAllocator::free`](crate::DmaAllocator::free).
///
/// Accessors take `&self` and use volatile accesses since the device may
/// read or write the memory concurrently.
pub struct DmaBuffer {
    virt: NonNull<u8>,
    phys: PhysicalAddress,
    len: usize,
}

impl DmaBuffer {
    /// Assemble a handle from its parts.
    ///
    /// # Safety
    /// `virt..virt + len` must be mapped, writable and backed by the physical
    /// range starting at `phys` for as long as the handle (or anything derived
    /// from it) is used.
    #[inline]
    #[must_use]
    pub const unsafe fn from_raw_parts(virt: NonNull<u8>, phys: PhysicalAddress, len: usize) -> Self {
        Self { virt, phys, len }
    }

    /// CPU mapping of the first byte.
    #[inline]
    #[must_use]
    pub const fn virt(&self) -> NonNull<u8> {
        self.virt
    }

    /// Physical address of the first byte.
    #[inline]
    #[must_use]
    pub const fn phys(&self) -> PhysicalAddress {
        self.phys
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset of `pa` inside this buffer, if it falls inside.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn offset_of(&self, pa: PhysicalAddress) -> Option<usize> {
        let base = self.phys.as_u64();
        let pa = pa.as_u64();
        if pa >= base && pa - base < self.len as u64 {
            Some((pa - base) as usize)
        } else {
            None
        }
    }

    /// The mapping reinterpreted as a `T`.
    ///
    /// # Panics
    /// Panics if a `T` does not fit or the mapping is misaligned for `T`.
    #[inline]
    #[must_use]
    pub fn cast<T>(&self) -> NonNull<T> {
        assert!(size_of::<T>() <= self.len, "buffer too small for target type");
        assert!(
            self.virt.as_ptr().addr().is_multiple_of(align_of::<T>()),
            "buffer misaligned for target type"
        );
        self.virt.cast()
    }

    #[inline]
    fn ptr_at<T>(&self, offset: usize) -> *mut T {
        assert!(
            offset.checked_add(size_of::<T>()).is_some_and(|end| end <= self.len),
            "access at {offset:#x} outside DMA buffer of {:#x} bytes",
            self.len
        );
        // SAFETY: in bounds of the mapping established in `from_raw_parts`.
        unsafe { self.virt.as_ptr().add(offset).cast() }
    }

    #[inline]
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset.is_multiple_of(4));
        // SAFETY: bounds checked by `ptr_at`, alignment by the caller contract.
        unsafe { self.ptr_at::<u32>(offset).read_volatile() }
    }

    #[inline]
    pub fn write_u32(&self, offset: usize, value: u32) {
        debug_assert!(offset.is_multiple_of(4));
        // SAFETY: see `read_u32`.
        unsafe { self.ptr_at::<u32>(offset).write_volatile(value) }
    }

    #[inline]
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        debug_assert!(offset.is_multiple_of(8));
        // SAFETY: see `read_u32`.
        unsafe { self.ptr_at::<u64>(offset).read_volatile() }
    }

    #[inline]
    pub fn write_u64(&self, offset: usize, value: u64) {
        debug_assert!(offset.is_multiple_of(8));
        // SAFETY: see `read_u32`.
        unsafe { self.ptr_at::<u64>(offset).write_volatile(value) }
    }

    fn range_ptr(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "copy of {len:#x} bytes at {offset:#x} past end of DMA buffer"
        );
        // SAFETY: `offset <= self.len`, so at most one past the end of the mapping.
        unsafe { self.virt.as_ptr().add(offset) }
    }

    /// Copy `bytes` into the buffer at `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        let dst = self.range_ptr(offset, bytes.len());
        if bytes.is_empty() {
            return;
        }
        // SAFETY: destination range checked above; source is a distinct Rust slice.
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) }
    }

    /// Copy bytes starting at `offset` out of the buffer into `out`.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        let src = self.range_ptr(offset, out.len());
        if out.is_empty() {
            return;
        }
        // SAFETY: source range checked above; `out` is a distinct Rust slice.
        unsafe { core::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len()) }
    }

    /// Set every byte to `value`.
    pub fn fill(&self, value: u8) {
        // SAFETY: whole mapping, established in `from_raw_parts`.
        unsafe { self.virt.as_ptr().write_bytes(value, self.len) }
    }
}

impl fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("virt", &self.virt)
            .field("phys", &self.phys)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Aligned4K([u8; 4096]);

    fn buffer_over(backing: &mut Aligned4K) -> DmaBuffer {
        let virt = NonNull::from(backing).cast::<u8>();
        // SAFETY: the backing page outlives every use in these tests.
        unsafe { DmaBuffer::from_raw_parts(virt, PhysicalAddress::new(0x8000), 4096) }
    }

    #[test]
    fn word_access() {
        let mut page = Aligned4K([0; 4096]);
        let buf = buffer_over(&mut page);
        buf.write_u32(0x10, 0x1100_101B);
        buf.write_u64(0x18, 0xDEAD_BEEF_0000_0001);
        assert_eq!(buf.read_u32(0x10), 0x1100_101B);
        assert_eq!(buf.read_u64(0x18), 0xDEAD_BEEF_0000_0001);
        assert_eq!(buf.read_u32(0x18), 1);
    }

    #[test]
    fn byte_copies_and_fill() {
        let mut page = Aligned4K([0; 4096]);
        let buf = buffer_over(&mut page);
        buf.fill(0xAA);
        buf.write_bytes(4092, &[1, 2, 3, 4]);
        let mut out = [0u8; 6];
        buf.read_bytes(4090, &mut out);
        assert_eq!(out, [0xAA, 0xAA, 1, 2, 3, 4]);
    }

    #[test]
    fn physical_offsets() {
        let mut page = Aligned4K([0; 4096]);
        let buf = buffer_over(&mut page);
        assert_eq!(buf.offset_of(PhysicalAddress::new(0x8000)), Some(0));
        assert_eq!(buf.offset_of(PhysicalAddress::new(0x8FFF)), Some(0xFFF));
        assert_eq!(buf.offset_of(PhysicalAddress::new(0x9000)), None);
        assert_eq!(buf.offset_of(PhysicalAddress::new(0x7FFF)), None);
    }

    #[test]
    #[should_panic(expected = "outside DMA buffer")]
    fn out_of_bounds_write_panics() {
        let mut page = Aligned4K([0; 4096]);
        let buf = buffer_over(&mut page);
        buf.write_u32(4096, 0);
    }

    #[test]
    fn empty_copies_at_the_end_are_allowed() {
        let mut page = Aligned4K([0; 4096]);
        let buffer = buffer_over(&mut page);
        buffer.write_bytes(4096, &[]);
        buffer.read_bytes(4096, &mut []);
        buffer.write_bytes(4094, &[1, 2]);
        let mut tail = [0u8; 2];
        buffer.read_bytes(4094, &mut tail);
        assert_eq!(tail, [1, 2]);
    }

    #[test]
    #[should_panic(expected = "past end of DMA buffer")]
    fn copy_range_overflow_panics() {
        let mut page = Aligned4K([0; 4096]);
        let buffer = buffer_over(&mut page);
        let mut out = [0u8; 2];
        buffer.read_bytes(usize::MAX, &mut out);
    }
}
