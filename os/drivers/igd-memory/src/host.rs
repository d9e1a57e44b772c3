//! # Host-Memory DMA Backend
//!
//! Buffers come from the host heap (page aligned, zeroed). Each buffer is
//! assigned a synthetic physical address from a bump counter starting at
//! [`HOST_PHYS_BASE`], so addresses stay small and stable the way they
//! would on a real machine, and are never reused.
//!
//! The backend also simulates the metadata quota of a real platform
//! allocator: each live buffer is charged [`METADATA_PER_BUFFER`] bytes by
//! default, and [`DmaBackend::upgrade_quota`] adds to the budget.

use crate::{DmaBackend, DmaBuffer, DmaError, PAGE_SIZE, PhysicalAddress};
use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use alloc::collections::BTreeMap;
use core::ptr::NonNull;
use log::trace;

/// First synthetic physical address handed out.
pub const HOST_PHYS_BASE: u64 = 0x0010_0000;

/// Default metadata charge per live buffer.
pub const METADATA_PER_BUFFER: usize = 64;

/// A [`DmaBackend`] serving buffers from the host heap.
pub struct HostBackend {
    next_phys: u64,
    metadata_quota: usize,
    metadata_used: usize,
    metadata_cost: usize,
    memory_limit: usize,
    memory_used: usize,
    upgrades: usize,
    donated: usize,
    live: BTreeMap<PhysicalAddress, (NonNull<u8>, Layout)>,
}

impl HostBackend {
    /// Unlimited memory and metadata.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_phys: HOST_PHYS_BASE,
            metadata_quota: usize::MAX,
            metadata_used: 0,
            metadata_cost: METADATA_PER_BUFFER,
            memory_limit: usize::MAX,
            memory_used: 0,
            upgrades: 0,
            donated: 0,
            live: BTreeMap::new(),
        }
    }

    /// Start with `bytes` of metadata quota.
    #[must_use]
    pub fn with_metadata_quota(mut self, bytes: usize) -> Self {
        self.metadata_quota = bytes;
        self
    }

    /// Charge `bytes` of metadata per live buffer.
    #[must_use]
    pub fn with_metadata_cost(mut self, bytes: usize) -> Self {
        self.metadata_cost = bytes;
        self
    }

    /// Cap the total bytes of live buffers.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// How often the quota was upgraded.
    #[must_use]
    pub const fn quota_upgrades(&self) -> usize {
        self.upgrades
    }

    /// Total bytes donated through quota upgrades.
    #[must_use]
    pub const fn donated(&self) -> usize {
        self.donated
    }

    /// Bytes currently allocated.
    #[must_use]
    pub const fn memory_used(&self) -> usize {
        self.memory_used
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaBackend for HostBackend {
    fn alloc_dma_buffer(&mut self, size: usize) -> Result<DmaBuffer, DmaError> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }
        if self.metadata_used.saturating_add(self.metadata_cost) > self.metadata_quota {
            return Err(DmaError::OutOfMetadata);
        }
        if self.memory_used.saturating_add(size) > self.memory_limit {
            return Err(DmaError::OutOfMemory { size });
        }

        let layout =
            Layout::from_size_align(size, PAGE_SIZE).map_err(|_| DmaError::OutOfMemory { size })?;
        // SAFETY: `layout` has non-zero size.
        let virt = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(DmaError::OutOfMemory { size })?;

        let phys = PhysicalAddress::new(self.next_phys);
        self.next_phys += layout.size().next_multiple_of(PAGE_SIZE) as u64;
        self.metadata_used += self.metadata_cost;
        self.memory_used += size;
        self.live.insert(phys, (virt, layout));
        trace!("host dma {size:#x} bytes: {phys} -> {virt:p}");

        // SAFETY: freshly allocated, exclusively owned until freed below.
        Ok(unsafe { DmaBuffer::from_raw_parts(virt, phys, size) })
    }

    fn free_dma_buffer(&mut self, buffer: DmaBuffer) {
        let Some((virt, layout)) = self.live.remove(&buffer.phys()) else {
            return;
        };
        self.metadata_used -= self.metadata_cost;
        self.memory_used -= layout.size();
        // SAFETY: allocated in `alloc_dma_buffer` with this layout.
        unsafe { dealloc(virt.as_ptr(), layout) }
    }

    fn upgrade_quota(&mut self, bytes: usize) {
        self.upgrades += 1;
        self.donated = self.donated.saturating_add(bytes);
        self.metadata_quota = self.metadata_quota.saturating_add(bytes);
    }
}

impl Drop for HostBackend {
    fn drop(&mut self) {
        for (_, (virt, layout)) in core::mem::take(&mut self.live) {
            // SAFETY: allocated in `alloc_dma_buffer` with this layout.
            unsafe { dealloc(virt.as_ptr(), layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_zeroed_aligned_and_distinct() {
        let mut backend = HostBackend::new();
        let a = backend.alloc_dma_buffer(2 * PAGE_SIZE).unwrap();
        let b = backend.alloc_dma_buffer(PAGE_SIZE).unwrap();

        assert!(a.virt().as_ptr().addr().is_multiple_of(PAGE_SIZE));
        assert_eq!(a.read_u64(PAGE_SIZE), 0);
        assert_eq!(b.phys().as_u64(), HOST_PHYS_BASE + 2 * PAGE_SIZE as u64);
        assert_eq!(backend.memory_used(), 3 * PAGE_SIZE);

        backend.free_dma_buffer(a);
        backend.free_dma_buffer(b);
        assert_eq!(backend.memory_used(), 0);
    }

    #[test]
    fn metadata_quota_is_enforced_and_upgradable() {
        let mut backend = HostBackend::new().with_metadata_quota(METADATA_PER_BUFFER);
        let a = backend.alloc_dma_buffer(PAGE_SIZE).unwrap();
        assert_eq!(
            backend.alloc_dma_buffer(PAGE_SIZE).unwrap_err(),
            DmaError::OutOfMetadata
        );

        backend.upgrade_quota(METADATA_PER_BUFFER);
        let b = backend.alloc_dma_buffer(PAGE_SIZE).unwrap();
        assert_eq!(backend.quota_upgrades(), 1);

        backend.free_dma_buffer(a);
        backend.free_dma_buffer(b);
    }
}
