//! # Decoded Diagnostic Registers
//!
//! Value layouts for the registers [`Igd`](crate::Igd) reads back for
//! logging. None of them are written by the driver.

use bitfield_struct::bitfield;
use igd_context::{RingBufferControl, RingBufferHead, RingBufferStart, RingBufferTail};
use igd_memory::PhysicalAddress;

/// Engine that raised a page fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FaultEngine {
    Gfx = 0,
    Mfx0 = 1,
    Mfx1 = 2,
    Vebx = 3,
    Blt = 4,
    Reserved = 7,
}

impl FaultEngine {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b111 {
            0 => Self::Gfx,
            1 => Self::Mfx0,
            2 => Self::Mfx1,
            3 => Self::Vebx,
            4 => Self::Blt,
            _ => Self::Reserved,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self as u32
    }
}

/// Table level whose entry was invalid.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FaultType {
    InvalidPte = 0,
    InvalidPde = 1,
    InvalidPdpe = 2,
    InvalidPml4e = 3,
}

impl FaultType {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::InvalidPte,
            1 => Self::InvalidPde,
            2 => Self::InvalidPdpe,
            _ => Self::InvalidPml4e,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self as u32
    }
}

/// `FAULT_REG`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct FaultStatus {
    /// Bit 0: the remaining fields describe a fault.
    pub valid: bool,
    /// Bits 1–2.
    #[bits(2)]
    pub fault_type: FaultType,
    /// Bits 3–10: requesting unit.
    #[bits(8)]
    pub source_id: u8,
    #[bits(1)]
    __: u8,
    /// Bits 12–14.
    #[bits(3)]
    pub engine: FaultEngine,
    #[bits(17)]
    __: u32,
}

/// `PWR_WELL_CTL2`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PowerWellStatus {
    #[bits(30)]
    __: u32,
    /// Bit 30: the power well is up.
    pub state: bool,
    /// Bit 31: the driver requests the power well.
    pub request: bool,
}

/// `GFX_MODE` as read back (value bits only).
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct GfxMode {
    /// Bit 0.
    pub privilege_check_disable: bool,
    #[bits(6)]
    __: u8,
    /// Bit 7.
    pub virtual_addressing_enable: bool,
    #[bits(1)]
    __: u8,
    /// Bit 9.
    pub ppgtt_enable: bool,
    #[bits(5)]
    __: u8,
    /// Bit 15.
    pub execlist_enable: bool,
    #[bits(16)]
    __: u16,
}

/// Both halves of `EXECLIST_STATUS`.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct ExeclistStatus {
    /// Bit 0: execlist the hardware is running.
    pub current_pointer: bool,
    /// Bit 1: execlist the next submission goes to.
    pub write_pointer: bool,
    /// Bit 2: both execlists are occupied.
    pub queue_full: bool,
    #[bits(1)]
    __: u8,
    /// Bit 4.
    pub execlist0_valid: bool,
    /// Bit 5.
    pub execlist1_valid: bool,
    /// Bits 6–14.
    #[bits(9)]
    pub last_switch_reason: u16,
    #[bits(17)]
    __: u32,
    /// Bits 32–63: ID of the running context.
    #[bits(32)]
    pub current_context_id: u32,
}

/// One global GTT entry.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct GgttEntry {
    /// Bit 0.
    pub present: bool,
    #[bits(11)]
    __: u16,
    /// Bits 12–47: page frame number.
    #[bits(36)]
    page: u64,
    #[bits(16)]
    __: u16,
}

impl GgttEntry {
    /// A present entry for the page at `pa`.
    #[inline]
    #[must_use]
    pub const fn mapping(pa: PhysicalAddress) -> Self {
        Self::new()
            .with_present(true)
            .with_page((pa.as_u64() >> 12) & 0xF_FFFF_FFFF)
    }

    /// Physical address of the mapped page.
    #[inline]
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.page() << 12)
    }
}

/// Render ring registers as the hardware currently sees them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingState {
    pub head: RingBufferHead,
    pub tail: RingBufferTail,
    pub start: RingBufferStart,
    pub control: RingBufferControl,
    /// Active head: byte address being fetched.
    pub acthd: u32,
}

/// `ERROR` and `ERROR_2`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorStatus {
    pub error: u32,
    pub error_2: u32,
}

impl ErrorStatus {
    #[inline]
    #[must_use]
    pub const fn is_clear(self) -> bool {
        self.error == 0 && self.error_2 == 0
    }
}
