//! # Per-Process Graphics Translation Table
//!
//! A 4-level, 48-bit translation table mapping [`GraphicsAddress`]es to
//! [`PhysicalAddress`]es in 4 KiB pages. Table pages come from a
//! [`DmaAllocator`] and are walked through their CPU mappings, so the
//! tree lives in memory the GPU can read directly.
//!
//! ## Behavior
//!
//! - [`TranslationTable::insert_translation`] maps `size` bytes (rounded up
//!   to whole pages), allocating intermediate tables on demand. Mapping an
//!   already-mapped page replaces the old entry.
//! - [`TranslationTable::remove_translation`] clears leaves. Emptied tables
//!   stay allocated until [`TranslationTable::release`].
//! - [`TranslationTable::lookup`] walks the tree like the hardware does.
//!
//! ```rust
//! # use igd_memory::*;
//! # use igd_ppgtt::*;
//! let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
//! let mut ppgtt = TranslationTable::new(&mut alloc)?;
//! let scratch = alloc.alloc(PAGE_SIZE)?;
//!
//! let va = GraphicsAddress::new(0xdead_beef_000);
//! ppgtt.insert_translation(&mut alloc, va, scratch.phys(), PAGE_SIZE, PageFlags::DATA)?;
//! assert_eq!(ppgtt.lookup(va + 0x10), Some(scratch.phys() + 0x10));
//! # Ok::<(), TranslationError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod entry;
mod flags;

pub use crate::entry::{ENTRIES, TableEntry};
pub use crate::flags::PageFlags;

use alloc::collections::BTreeMap;
use igd_memory::{
    DmaAllocator, DmaBuffer, DmaError, GraphicsAddress, PAGE_SIZE, PhysicalAddress, pages_for,
};
use log::{debug, trace};

/// Failures while editing a [`TranslationTable`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("failed to allocate a table page: {0}")]
    OutOfMemory(#[from] DmaError),
    #[error("mapping {virt:?} -> {phys:?} is not page aligned")]
    Unaligned {
        virt: GraphicsAddress,
        phys: PhysicalAddress,
    },
    #[error("{0:?} is outside the translated address range")]
    NotTranslatable(GraphicsAddress),
    #[error("zero-sized mapping")]
    ZeroSize,
}

/// Table indices for the four levels, root first.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_indices(va: GraphicsAddress) -> [usize; 4] {
    let va = va.as_u64();
    [
        ((va >> 39) & 0x1FF) as usize,
        ((va >> 30) & 0x1FF) as usize,
        ((va >> 21) & 0x1FF) as usize,
        ((va >> 12) & 0x1FF) as usize,
    ]
}

/// A PPGTT tree and the DMA pages backing it.
pub struct TranslationTable {
    root: PhysicalAddress,
    tables: BTreeMap<PhysicalAddress, DmaBuffer>,
    mapped: usize,
}

#[inline]
fn read_entry(table: &DmaBuffer, index: usize) -> TableEntry {
    TableEntry::from_bits(table.read_u64(index * 8))
}

#[inline]
fn write_entry(table: &DmaBuffer, index: usize, entry: TableEntry) {
    table.write_u64(index * 8, entry.into_bits());
}

impl TranslationTable {
    /// Allocate an empty root table.
    ///
    /// # Errors
    /// [`TranslationError::OutOfMemory`] if the root page cannot be allocated.
    pub fn new<A: DmaAllocator + ?Sized>(alloc: &mut A) -> Result<Self, TranslationError> {
        let root = alloc.alloc(PAGE_SIZE)?;
        let root_pa = root.phys();
        debug!("ppgtt root at {root_pa}");

        let mut tables = BTreeMap::new();
        tables.insert(root_pa, root);
        Ok(Self {
            root: root_pa,
            tables,
            mapped: 0,
        })
    }

    /// Physical address of the top-level table (the PML4).
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    /// Table pages currently allocated, root included.
    #[inline]
    #[must_use]
    pub fn table_pages(&self) -> usize {
        self.tables.len()
    }

    /// Present leaf entries.
    #[inline]
    #[must_use]
    pub const fn mapped_pages(&self) -> usize {
        self.mapped
    }

    /// Map `size` bytes at `virt` to the physical range at `phys`.
    ///
    /// # Errors
    /// - [`TranslationError::ZeroSize`] for `size == 0`.
    /// - [`TranslationError::Unaligned`] if either address is not page aligned.
    /// - [`TranslationError::NotTranslatable`] if the range leaves the 48-bit space.
    /// - [`TranslationError::OutOfMemory`] if a table page cannot be allocated;
    ///   pages mapped before the failure stay mapped.
    pub fn insert_translation<A: DmaAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        virt: GraphicsAddress,
        phys: PhysicalAddress,
        size: usize,
        flags: PageFlags,
    ) -> Result<(), TranslationError> {
        if size == 0 {
            return Err(TranslationError::ZeroSize);
        }
        if !virt.is_page_aligned() || !phys.is_page_aligned() {
            return Err(TranslationError::Unaligned { virt, phys });
        }

        let pages = pages_for(size);
        let last = pages
            .checked_mul(PAGE_SIZE)
            .and_then(|span| u64::try_from(span).ok())
            .and_then(|span| virt.as_u64().checked_add(span - 1))
            .map(GraphicsAddress::new);
        if !virt.is_translatable() || !last.is_some_and(GraphicsAddress::is_translatable) {
            return Err(TranslationError::NotTranslatable(virt));
        }

        for page in 0..pages {
            let offset = (page * PAGE_SIZE) as u64;
            self.map_page(alloc, virt + offset, phys + offset, flags)?;
        }

        debug!("ppgtt map {virt:?} -> {phys:?} ({pages} pages, {flags:?})");
        Ok(())
    }

    fn map_page<A: DmaAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: GraphicsAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), TranslationError> {
        let [.., i1] = split_indices(va);
        let leaf_table = self.ensure_chain(alloc, va)?;

        let table = &self.tables[&leaf_table];
        let old = read_entry(table, i1);
        if !old.present() {
            self.mapped += 1;
        } else if old.address() != pa {
            trace!("ppgtt remap {va:?}: {} -> {pa}", old.address());
        }
        write_entry(table, i1, TableEntry::leaf(pa, flags));
        Ok(())
    }

    /// Walk from the root to the last-level table for `va`, creating missing tables.
    fn ensure_chain<A: DmaAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: GraphicsAddress,
    ) -> Result<PhysicalAddress, TranslationError> {
        let [i4, i3, i2, _] = split_indices(va);
        let mut table = self.root;

        for index in [i4, i3, i2] {
            let entry = read_entry(&self.tables[&table], index);
            table = if entry.present() {
                entry.address()
            } else {
                let page = alloc.alloc(PAGE_SIZE)?;
                let next = page.phys();
                trace!("ppgtt new table {next} for {va:?}");
                self.tables.insert(next, page);
                write_entry(&self.tables[&table], index, TableEntry::link(next));
                next
            };
        }

        Ok(table)
    }

    /// The last-level table covering `va`, if the chain exists.
    fn leaf_table(&self, va: GraphicsAddress) -> Option<&DmaBuffer> {
        let [i4, i3, i2, _] = split_indices(va);
        let mut table = self.tables.get(&self.root)?;
        for index in [i4, i3, i2] {
            let entry = read_entry(table, index);
            if !entry.present() {
                return None;
            }
            table = self.tables.get(&entry.address())?;
        }
        Some(table)
    }

    /// Unmap `size` bytes (whole pages) starting at `virt`.
    ///
    /// Returns the number of pages that were mapped and are now cleared.
    pub fn remove_translation(&mut self, virt: GraphicsAddress, size: usize) -> usize {
        let mut cleared = 0;
        for page in 0..pages_for(size) {
            let va = virt.page_base() + (page * PAGE_SIZE) as u64;
            let [.., i1] = split_indices(va);
            let Some(table) = self.leaf_table(va) else {
                continue;
            };
            if read_entry(table, i1).present() {
                write_entry(table, i1, TableEntry::new());
                cleared += 1;
            }
        }

        self.mapped -= cleared;
        debug!("ppgtt unmap {virt:?}: {cleared} pages");
        cleared
    }

    /// The leaf entry for `va`, if present.
    #[must_use]
    pub fn entry(&self, va: GraphicsAddress) -> Option<TableEntry> {
        let [.., i1] = split_indices(va);
        let entry = read_entry(self.leaf_table(va)?, i1);
        entry.present().then_some(entry)
    }

    /// Translate `va`, keeping its offset inside the page.
    #[must_use]
    pub fn lookup(&self, va: GraphicsAddress) -> Option<PhysicalAddress> {
        self.entry(va).map(|e| e.address() + va.page_offset())
    }

    /// Return every table page to `alloc`.
    ///
    /// # Errors
    /// The first [`DmaError`] reported by the allocator; remaining pages are
    /// still handed back.
    pub fn release<A: DmaAllocator + ?Sized>(self, alloc: &mut A) -> Result<(), DmaError> {
        debug!("ppgtt release {} table pages", self.tables.len());
        let mut result = Ok(());
        for (_, table) in self.tables {
            if let Err(err) = alloc.free(table) {
                result = result.and(Err(err));
            }
        }
        result
    }
}
