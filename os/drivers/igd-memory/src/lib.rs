//! # DMA Memory for the Graphics Device
//!
//! Address types and DMA buffer management shared by the page-table,
//! context and submission code.
//!
//! - [`PhysicalAddress`] / [`GraphicsAddress`] keep CPU-physical addresses
//!   apart from addresses in the GPU's own translated space.
//! - [`DmaBuffer`] is a handle to device-visible memory: a CPU mapping plus
//!   the physical address the device uses.
//! - [`DmaBackend`] is the platform's raw allocator, [`QuotaAllocator`] layers
//!   quota retries and address bookkeeping on top and exposes the
//!   [`DmaAllocator`] interface the rest of the driver uses.
//! - With the `host` feature, [`HostBackend`] provides DMA buffers from the
//!   host heap so the driver can run without hardware.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod address;
mod allocator;
mod buffer;
#[cfg(feature = "host")]
mod host;

pub use crate::address::{GraphicsAddress, PhysicalAddress};
pub use crate::allocator::{DmaAllocator, DmaBackend, DmaError, QuotaAllocator, RetryPolicy};
pub use crate::buffer::DmaBuffer;
#[cfg(feature = "host")]
pub use crate::host::{HOST_PHYS_BASE, HostBackend, METADATA_PER_BUFFER};

/// Size of a GPU page (and of every page-granular allocation).
pub const PAGE_SIZE: usize = 4096;

/// Round `size` up to a whole number of pages.
#[inline]
#[must_use]
pub const fn page_align_up(size: usize) -> usize {
    size.next_multiple_of(PAGE_SIZE)
}

/// Number of pages needed to hold `size` bytes.
#[inline]
#[must_use]
pub const fn pages_for(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE)
}
