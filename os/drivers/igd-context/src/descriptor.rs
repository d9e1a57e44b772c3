//! # Execlist Context Descriptor
//!
//! The 64-bit value written to the execlist submit port to schedule a
//! logical ring context. It carries the context's identity, where its
//! image lives, and how the engine should treat it.

use bitfield_struct::bitfield;
use igd_memory::PhysicalAddress;

/// Page-walk mode of the context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AddressingMode {
    /// Advanced (48-bit) context without A/D bit support.
    AdvancedWithoutAd = 0,
    /// Legacy 32-bit context.
    Legacy32 = 1,
    /// Advanced (48-bit) context with A/D bit support.
    AdvancedWithAd = 2,
    /// Legacy 64-bit context with a 4-level PPGTT.
    Legacy64 = 3,
}

impl AddressingMode {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::AdvancedWithoutAd,
            1 => Self::Legacy32,
            2 => Self::AdvancedWithAd,
            _ => Self::Legacy64,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self as u64
    }
}

/// Reaction to a page fault while running the context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FaultHandling {
    /// Stop the engine and hang.
    FaultAndHang = 0,
    /// Encoding 1 is reserved.
    Reserved = 1,
    /// Report the fault and keep streaming.
    FaultAndStream = 2,
    /// Encoding 3 is reserved.
    ReservedHigh = 3,
}

impl FaultHandling {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::FaultAndHang,
            1 => Self::Reserved,
            2 => Self::FaultAndStream,
            _ => Self::ReservedHigh,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self as u64
    }
}

/// Execlist context descriptor.
///
/// | Bits  | Field |
/// |-------|-------|
/// | 0     | valid |
/// | 1     | force page-directory restore |
/// | 2     | force restore |
/// | 3–4   | addressing mode |
/// | 5     | must be zero |
/// | 6–7   | fault handling |
/// | 8     | privilege access |
/// | 9–11  | must be zero |
/// | 12–31 | logical ring context address (page number) |
/// | 32–51 | context id |
/// | 53–54 | must be zero |
/// | 55–63 | context group |
///
/// Bits 32–63 together form the 32-bit context id reported back by the
/// hardware in context-switch status.
#[doc(alias = "LRCA")]
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct ContextDescriptor {
    pub valid: bool,
    pub force_pd_restore: bool,
    pub force_restore: bool,
    #[bits(2)]
    pub addressing_mode: AddressingMode,
    #[bits(1)]
    __: u8,
    #[bits(2)]
    pub fault_handling: FaultHandling,
    pub privilege_access: bool,
    #[bits(3)]
    __: u8,
    /// Logical ring context address, bits `[31:12]`.
    #[bits(20)]
    lrca_page: u32,
    #[bits(20)]
    pub id: u32,
    #[bits(3)]
    __: u8,
    #[bits(9)]
    pub group: u16,
}

impl ContextDescriptor {
    /// Highest representable context id.
    pub const MAX_ID: u32 = (1 << 20) - 1;

    /// Highest representable context group.
    pub const MAX_GROUP: u16 = (1 << 9) - 1;

    /// A valid, privileged, legacy 64-bit descriptor that hangs on faults.
    ///
    /// `group` and `id` are truncated to 9 and 20 bits. `lrca` must be page
    /// aligned and below 4 GiB; higher bits are dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn for_context(group: u16, id: u32, lrca: PhysicalAddress) -> Self {
        debug_assert!(lrca.is_page_aligned(), "LRCA must be page aligned");
        debug_assert!(lrca.as_u64() < 1 << 32, "LRCA must lie below 4 GiB");
        Self::new()
            .with_valid(true)
            .with_privilege_access(true)
            .with_fault_handling(FaultHandling::FaultAndHang)
            .with_addressing_mode(AddressingMode::Legacy64)
            .with_lrca_page(((lrca.as_u64() >> 12) & 0xF_FFFF) as u32)
            .with_id(id & Self::MAX_ID)
            .with_group(group & Self::MAX_GROUP)
    }

    /// The all-zero descriptor, used for an empty execlist port.
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    /// Reassemble a descriptor from the two dwords written to the port.
    #[inline]
    #[must_use]
    pub const fn from_dwords(high: u32, low: u32) -> Self {
        Self::from_bits(((high as u64) << 32) | low as u64)
    }

    /// Bits 0–31.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn low_dword(self) -> u32 {
        self.into_bits() as u32
    }

    /// Bits 32–63, the hardware context id.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn high_dword(self) -> u32 {
        (self.into_bits() >> 32) as u32
    }

    /// Address of the logical ring context.
    #[inline]
    #[must_use]
    pub const fn lrca(self) -> PhysicalAddress {
        PhysicalAddress::new((self.lrca_page() as u64) << 12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_of_a_new_descriptor() {
        let d = ContextDescriptor::for_context(1, 42, PhysicalAddress::new(0x0012_3000));
        assert!(d.valid());
        assert!(d.privilege_access());
        assert!(!d.force_restore());
        assert!(!d.force_pd_restore());
        assert_eq!(d.fault_handling(), FaultHandling::FaultAndHang);
        assert_eq!(d.addressing_mode(), AddressingMode::Legacy64);
        assert_eq!(d.group(), 1);
        assert_eq!(d.id(), 42);
        assert_eq!(d.lrca(), PhysicalAddress::new(0x0012_3000));
    }

    #[test]
    fn bit_positions() {
        let d = ContextDescriptor::for_context(0x1FF, 0xF_FFFF, PhysicalAddress::new(0xFFFF_F000));
        assert_eq!(d.low_dword(), 0xFFFF_F000 | (1 << 8) | (3 << 3) | 1);
        assert_eq!(d.high_dword(), (0x1FF << 23) | 0xF_FFFF);
    }

    #[test]
    fn dwords_round_trip() {
        let d = ContextDescriptor::for_context(3, 7, PhysicalAddress::new(0x8000_1000));
        let back = ContextDescriptor::from_dwords(d.high_dword(), d.low_dword());
        assert_eq!(back, d);
        assert_eq!(back.id(), 7);
        assert_eq!(back.group(), 3);
        assert_eq!(back.lrca(), PhysicalAddress::new(0x8000_1000));
    }

    #[test]
    fn oversized_identity_is_truncated() {
        let d = ContextDescriptor::for_context(0x200 | 5, (1 << 20) | 9, PhysicalAddress::new(0x2000));
        assert_eq!(d.group(), 5);
        assert_eq!(d.id(), 9);
        assert_eq!(d.lrca(), PhysicalAddress::new(0x2000));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "below 4 GiB")]
    fn lrca_above_4g_is_rejected() {
        let _ = ContextDescriptor::for_context(0, 1, PhysicalAddress::new(0x1_0000_2000));
    }

    #[test]
    fn invalid_descriptor_differs_from_any_valid_one() {
        let invalid = ContextDescriptor::invalid();
        assert!(!invalid.valid());
        assert_eq!(invalid.into_bits(), 0);
        assert_ne!(invalid, ContextDescriptor::for_context(0, 0, PhysicalAddress::zero()));
    }
}
