//! # Translation Table Entries
//!
//! The per-process GTT uses the x86-64 page-table format: four levels of
//! 512 eight-byte entries, 4 KiB leaves.

use crate::PageFlags;
use bitfield_struct::bitfield;
use igd_memory::PhysicalAddress;

/// Entries per table page.
pub const ENTRIES: usize = 512;

/// One 64-bit PPGTT entry, valid at every level.
///
/// | Bits  | Name | Meaning |
/// |-------|------|---------|
/// | 0     | P    | Present |
/// | 1     | RW   | Writable |
/// | 2     | US   | Unprivileged access allowed |
/// | 3     | PWT  | Write-through |
/// | 4     | PCD  | Cache disable |
/// | 5     | A    | Accessed |
/// | 6     | D    | Dirty (leaf only) |
/// | 7     | PAT  | PAT index bit (leaf only, 4 KiB) |
/// | 8     | G    | Global (leaf only) |
/// | 12–51 | addr | Frame number of the next table or the mapped page |
/// | 63    | NX   | Execute disable |
#[doc(alias = "PTE")]
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct TableEntry {
    pub present: bool,
    pub writable: bool,
    pub user_access: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub pat: bool,
    pub global: bool,
    #[bits(3)]
    __: u8,
    /// Physical frame bits `[51:12]`.
    #[bits(40)]
    frame: u64,
    #[bits(11)]
    __: u16,
    pub no_execute: bool,
}

impl TableEntry {
    /// Non-leaf link: present and permissive, the leaf decides access.
    #[inline]
    #[must_use]
    pub const fn link(table: PhysicalAddress) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
            .with_frame(table.as_u64() >> 12)
    }

    /// Leaf entry for `page` with access and caching from `flags`.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalAddress, flags: PageFlags) -> Self {
        let uncached = flags.contains(PageFlags::UNCACHED) || flags.contains(PageFlags::DEVICE);
        Self::new()
            .with_present(true)
            .with_writable(flags.contains(PageFlags::WRITABLE))
            .with_user_access(!flags.contains(PageFlags::PRIVILEGED))
            .with_write_through(uncached || flags.contains(PageFlags::WRITE_COMBINED))
            .with_cache_disabled(uncached)
            .with_global(flags.contains(PageFlags::GLOBAL))
            .with_no_execute(!flags.contains(PageFlags::EXECUTABLE))
            .with_frame(page.as_u64() >> 12)
    }

    /// Physical address of the next table or the mapped page.
    #[inline]
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << 12)
    }

    /// Access and caching attributes of a leaf, as [`PageFlags`].
    #[must_use]
    pub const fn flags(self) -> PageFlags {
        let mut flags = PageFlags::empty();
        if self.writable() {
            flags = flags.union(PageFlags::WRITABLE);
        }
        if !self.no_execute() {
            flags = flags.union(PageFlags::EXECUTABLE);
        }
        if !self.user_access() {
            flags = flags.union(PageFlags::PRIVILEGED);
        }
        if self.global() {
            flags = flags.union(PageFlags::GLOBAL);
        }
        match (self.write_through(), self.cache_disabled()) {
            (_, true) => flags.union(PageFlags::UNCACHED),
            (true, false) => flags.union(PageFlags::WRITE_COMBINED),
            (false, false) => flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_entries_are_permissive() {
        let e = TableEntry::link(PhysicalAddress::new(0x0012_3000));
        assert!(e.present() && e.writable() && e.user_access());
        assert!(!e.no_execute());
        assert_eq!(e.address(), PhysicalAddress::new(0x0012_3000));
        assert_eq!(e.into_bits(), 0x0012_3007);
    }

    #[test]
    fn leaf_flags_round_trip() {
        let flags = PageFlags::WRITABLE | PageFlags::PRIVILEGED | PageFlags::UNCACHED;
        let e = TableEntry::leaf(PhysicalAddress::new(0xdead_beef_000), flags);
        assert!(e.present());
        assert!(!e.user_access());
        assert!(e.no_execute());
        assert!(e.cache_disabled() && e.write_through());
        assert_eq!(e.address().as_u64(), 0xdead_beef_000);
        assert_eq!(e.flags(), flags);
    }

    #[test]
    fn device_memory_is_uncached() {
        let e = TableEntry::leaf(PhysicalAddress::new(0x1000), PageFlags::DEVICE);
        assert!(e.cache_disabled());
        assert!(e.flags().contains(PageFlags::UNCACHED));
    }

    #[test]
    fn write_combined_and_write_back() {
        let wc = TableEntry::leaf(PhysicalAddress::new(0x1000), PageFlags::WRITE_COMBINED);
        assert!(wc.write_through() && !wc.cache_disabled());
        let wb = TableEntry::leaf(PhysicalAddress::new(0x1000), PageFlags::EXECUTABLE);
        assert!(!wb.write_through() && !wb.cache_disabled() && !wb.no_execute());
        assert_eq!(wb.flags(), PageFlags::EXECUTABLE);
    }
}
