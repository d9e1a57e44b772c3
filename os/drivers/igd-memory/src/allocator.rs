//! # DMA Allocation
//!
//! [`DmaBackend`] is what the platform provides: raw allocation of
//! device-visible buffers charged against a metadata quota the caller can
//! top up. [`QuotaAllocator`] turns that into the [`DmaAllocator`] used by
//! the driver:
//!
//! - A backend reporting [`DmaError::OutOfMetadata`] is donated more quota
//!   and the allocation is retried. The donation starts at the page-rounded
//!   request size and doubles on each retry, up to
//!   [`RetryPolicy::max_attempts`] tries in total.
//! - Every live buffer is recorded so physical addresses found in page-table
//!   entries can be turned back into CPU pointers.

use crate::{DmaBuffer, PhysicalAddress, page_align_up};
use alloc::collections::BTreeMap;
use core::ptr::NonNull;
use log::{debug, warn};

/// Failures of DMA allocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DmaError {
    #[error("allocator metadata quota exhausted")]
    OutOfMetadata,
    #[error("out of DMA memory ({size} bytes requested)")]
    OutOfMemory { size: usize },
    #[error("allocation of {size} bytes still failing after {attempts} attempts")]
    RetriesExhausted { size: usize, attempts: u32 },
    #[error("zero-sized DMA allocation")]
    ZeroSize,
    #[error("buffer at {0} was not handed out by this allocator")]
    UnknownBuffer(PhysicalAddress),
}

/// Raw provider of device-visible memory.
pub trait DmaBackend {
    /// Allocate `size` bytes (a whole number of pages), page aligned and zeroed.
    ///
    /// # Errors
    /// [`DmaError::OutOfMetadata`] when the quota for bookkeeping is used up,
    /// [`DmaError::OutOfMemory`] when no memory is left.
    fn alloc_dma_buffer(&mut self, size: usize) -> Result<DmaBuffer, DmaError>;

    /// Return a buffer obtained from [`alloc_dma_buffer`](Self::alloc_dma_buffer).
    fn free_dma_buffer(&mut self, buffer: DmaBuffer);

    /// Donate `bytes` of additional metadata quota.
    fn upgrade_quota(&mut self, bytes: usize);
}

/// Allocation interface used by the driver.
pub trait DmaAllocator {
    /// Allocate at least `size` bytes of zeroed, page-aligned DMA memory.
    ///
    /// # Errors
    /// Any [`DmaError`]; allocation failures are never silently ignored.
    fn alloc(&mut self, size: usize) -> Result<DmaBuffer, DmaError>;

    /// Release a buffer.
    ///
    /// # Errors
    /// [`DmaError::UnknownBuffer`] if the buffer did not come from this allocator.
    fn free(&mut self, buffer: DmaBuffer) -> Result<(), DmaError>;

    /// CPU pointer for a physical address inside a live buffer.
    fn phys_to_virt(&self, pa: PhysicalAddress) -> Option<NonNull<u8>>;

    /// Physical address for a CPU pointer inside a live buffer.
    fn virt_to_phys(&self, ptr: *const u8) -> Option<PhysicalAddress>;
}

/// How hard [`QuotaAllocator`] tries before giving up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total allocation attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

    /// Quota donated after the first metadata failure for a `size`-byte request.
    #[inline]
    #[must_use]
    pub const fn initial_donation(size: usize) -> usize {
        page_align_up(size)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Copy, Clone)]
struct Region {
    virt: NonNull<u8>,
    len: usize,
}

/// A [`DmaAllocator`] over a quota-limited [`DmaBackend`].
pub struct QuotaAllocator<B: DmaBackend> {
    backend: B,
    policy: RetryPolicy,
    live: BTreeMap<PhysicalAddress, Region>,
}

impl<B: DmaBackend> QuotaAllocator<B> {
    #[must_use]
    pub const fn new(backend: B, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            live: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of buffers handed out and not yet freed.
    #[inline]
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }
}

impl<B: DmaBackend> DmaAllocator for QuotaAllocator<B> {
    fn alloc(&mut self, size: usize) -> Result<DmaBuffer, DmaError> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }

        let size = page_align_up(size);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut donation = RetryPolicy::initial_donation(size);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.backend.alloc_dma_buffer(size) {
                Ok(buffer) => {
                    debug!("dma alloc {:#x} bytes at {}", buffer.len(), buffer.phys());
                    self.live.insert(
                        buffer.phys(),
                        Region {
                            virt: buffer.virt(),
                            len: buffer.len(),
                        },
                    );
                    return Ok(buffer);
                }
                Err(DmaError::OutOfMetadata) if attempts < max_attempts => {
                    warn!(
                        "dma alloc of {size:#x} bytes out of metadata (attempt {attempts}), donating {donation:#x} bytes"
                    );
                    self.backend.upgrade_quota(donation);
                    donation = donation.saturating_mul(2);
                }
                Err(DmaError::OutOfMetadata) => {
                    return Err(DmaError::RetriesExhausted { size, attempts });
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn free(&mut self, buffer: DmaBuffer) -> Result<(), DmaError> {
        let phys = buffer.phys();
        if self.live.remove(&phys).is_none() {
            return Err(DmaError::UnknownBuffer(phys));
        }
        debug!("dma free {:#x} bytes at {phys}", buffer.len());
        self.backend.free_dma_buffer(buffer);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> Option<NonNull<u8>> {
        let (base, region) = self.live.range(..=pa).next_back()?;
        let offset = (pa.as_u64() - base.as_u64()) as usize;
        if offset >= region.len {
            return None;
        }
        // SAFETY: offset is inside the live region.
        Some(unsafe { region.virt.add(offset) })
    }

    fn virt_to_phys(&self, ptr: *const u8) -> Option<PhysicalAddress> {
        let addr = ptr.addr();
        self.live.iter().find_map(|(phys, region)| {
            let start = region.virt.as_ptr().addr();
            (addr >= start && addr - start < region.len).then(|| *phys + (addr - start) as u64)
        })
    }
}
