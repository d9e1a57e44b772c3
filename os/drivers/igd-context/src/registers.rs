//! # Engine Registers Saved in a Context Image
//!
//! Value layouts of the ring and batch registers that the logical ring
//! context restores, and the `(offset, value)` pair format the image stores
//! them in. Offsets are relative to an engine's ring base.

use crate::instructions::AddressSpace;
use bitfield_struct::bitfield;
use igd_registers::{Bitset2, masked_bit};

/// Ring base of the render command streamer.
pub const RENDER_RING_BASE: u32 = 0x2000;
/// Ring base of the video decode/encode command streamer.
pub const VIDEO_RING_BASE: u32 = 0x12000;
/// Ring base of the video enhancement command streamer.
pub const VIDEO_ENHANCE_RING_BASE: u32 = 0x1A000;
/// Ring base of the blitter command streamer.
pub const BLITTER_RING_BASE: u32 = 0x22000;

/// Register offsets relative to a ring base.
pub mod offsets {
    pub const RING_TAIL: u32 = 0x30;
    pub const RING_HEAD: u32 = 0x34;
    pub const RING_START: u32 = 0x38;
    pub const RING_CTL: u32 = 0x3C;
    pub const ACTHD: u32 = 0x74;
    pub const HWS_PGA: u32 = 0x80;
    pub const BB_STATE: u32 = 0x110;
    pub const SECOND_BB_HEAD: u32 = 0x114;
    pub const SECOND_BB_STATE: u32 = 0x118;
    pub const SECOND_BB_HEAD_UDW: u32 = 0x11C;
    pub const BB_HEAD: u32 = 0x140;
    pub const BB_HEAD_UDW: u32 = 0x168;
    pub const BB_PER_CTX_PTR: u32 = 0x1C0;
    pub const INDIRECT_CTX: u32 = 0x1C4;
    pub const INDIRECT_CTX_OFFSET: u32 = 0x1C8;
    pub const EXECLIST_SUBMIT_PORT: u32 = 0x230;
    pub const EXECLIST_STATUS: u32 = 0x234;
    pub const CONTEXT_CONTROL: u32 = 0x244;
    pub const PDP0_LDW: u32 = 0x270;
    pub const PDP0_UDW: u32 = 0x274;
    pub const PDP1_LDW: u32 = 0x278;
    pub const PDP1_UDW: u32 = 0x27C;
    pub const PDP2_LDW: u32 = 0x280;
    pub const PDP2_UDW: u32 = 0x284;
    pub const PDP3_LDW: u32 = 0x288;
    pub const PDP3_UDW: u32 = 0x28C;
    pub const GFX_MODE: u32 = 0x29C;
    pub const CTX_TIMESTAMP: u32 = 0x3A8;
}

/// Absolute MMIO offset of `R_PWR_CLK_STATE` (render engine only).
pub const R_PWR_CLK_STATE: u32 = 0x20C8;

/// One register load of an `MI_LOAD_REGISTER_IMM` block: MMIO offset, then value.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoadRegister<V> {
    offset: u32,
    value: V,
}

impl<V: Copy> LoadRegister<V> {
    #[inline]
    #[must_use]
    pub const fn new(offset: u32, value: V) -> Self {
        Self { offset, value }
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    #[must_use]
    pub const fn value(&self) -> V {
        self.value
    }

    #[inline]
    pub const fn set_value(&mut self, value: V) {
        self.value = value;
    }
}

/// `CTX_CONTEXT_CONTROL` bit 0 with its mask bit.
pub const CONTEXT_RESTORE_INHIBIT: Bitset2<u32> = masked_bit(0);
/// `CTX_CONTEXT_CONTROL` bit 1 with its mask bit.
pub const RS_CONTEXT_ENABLE: Bitset2<u32> = masked_bit(1);
/// `CTX_CONTEXT_CONTROL` bit 3 with its mask bit.
pub const INHIBIT_SYN_CONTEXT_SWITCH: Bitset2<u32> = masked_bit(3);

/// `RING_BUFFER_HEAD`: read pointer, advanced by the hardware.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct RingBufferHead {
    #[bits(2)]
    __: u8,
    /// Bits 2–20: offset in dwords.
    #[bits(19)]
    pub head_offset: u32,
    /// Bits 21–31: number of times the head wrapped.
    #[bits(11)]
    pub wrap_count: u16,
}

impl RingBufferHead {
    /// Head position in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> u32 {
        self.head_offset() << 2
    }
}

/// `RING_BUFFER_TAIL`: write pointer, advanced by software.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct RingBufferTail {
    #[bits(3)]
    __: u8,
    /// Bits 3–20: offset in qwords.
    #[bits(18)]
    pub tail_offset: u32,
    #[bits(11)]
    __: u16,
}

impl RingBufferTail {
    /// Tail at `bytes` (qword aligned; low bits are dropped).
    #[inline]
    #[must_use]
    pub const fn at_byte(bytes: u32) -> Self {
        Self::new().with_tail_offset((bytes >> 3) & 0x3_FFFF)
    }

    /// Tail position in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> u32 {
        self.tail_offset() << 3
    }
}

/// `RING_BUFFER_START`: page-aligned ring base.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct RingBufferStart {
    #[bits(12)]
    __: u16,
    /// Bits 12–31: page number of the ring.
    #[bits(20)]
    pub starting_page: u32,
}

/// Automatic head reporting mode of `RING_BUFFER_CTL`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AutoReport {
    Off = 0,
    Every64K = 1,
    Every4K = 2,
    Every128K = 3,
}

impl AutoReport {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Off,
            1 => Self::Every64K,
            2 => Self::Every4K,
            _ => Self::Every128K,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self as u32
    }
}

/// `RING_BUFFER_CTL`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct RingBufferControl {
    /// Bit 0.
    pub ring_buffer_enable: bool,
    /// Bits 1–2.
    #[bits(2)]
    pub auto_report: AutoReport,
    #[bits(7)]
    __: u8,
    /// Bit 10.
    pub semaphore_wait: bool,
    /// Bit 11.
    pub rb_wait: bool,
    /// Bits 12–20: ring length in pages, minus one.
    #[bits(9)]
    pub buffer_length: u16,
    #[bits(11)]
    __: u16,
}

impl RingBufferControl {
    /// Largest ring the length field can describe.
    pub const MAX_PAGES: usize = 512;

    /// An enabled ring of `pages` pages (1 to [`MAX_PAGES`](Self::MAX_PAGES)).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn enabled(pages: usize) -> Self {
        debug_assert!(pages >= 1 && pages <= Self::MAX_PAGES);
        Self::new()
            .with_ring_buffer_enable(true)
            .with_auto_report(AutoReport::Off)
            .with_buffer_length((pages.saturating_sub(1) & 0x1FF) as u16)
    }

    /// Ring length in pages.
    #[inline]
    #[must_use]
    pub const fn pages(self) -> usize {
        self.buffer_length() as usize + 1
    }
}

/// Upper dword of a batch-buffer head pointer.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct BatchBufferHeadUdw {
    /// Bits 0–15: address bits 32–47.
    #[bits(16)]
    pub head_pointer_udw: u16,
    #[bits(16)]
    __: u16,
}

/// Lower dword of a batch-buffer head pointer.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct BatchBufferHead {
    /// Bit 0.
    pub valid: bool,
    #[bits(1)]
    __: u8,
    /// Bits 2–31: address bits 2–31.
    #[bits(30)]
    pub head_pointer: u32,
}

/// `BB_STATE` / `SBB_STATE`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct BatchBufferState {
    #[bits(5)]
    __: u8,
    /// Bit 5.
    #[bits(1)]
    pub address_space: AddressSpace,
    #[bits(1)]
    __: u8,
    /// Bit 7.
    pub resource_streamer_enable: bool,
    #[bits(24)]
    __: u32,
}

/// `R_PWR_CLK_STATE`: slice, subslice and EU configuration requested by the context.
///
/// Zero leaves the power-on configuration untouched.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PowerClockState {
    /// Bits 0–3.
    #[bits(4)]
    pub eu_min: u8,
    /// Bits 4–7.
    #[bits(4)]
    pub eu_max: u8,
    /// Bits 8–10.
    #[bits(3)]
    pub subslice_count: u8,
    /// Bit 11.
    pub subslice_count_request: bool,
    #[bits(3)]
    __: u8,
    /// Bits 15–17.
    #[bits(3)]
    pub slice_count: u8,
    /// Bit 18.
    pub slice_count_request: bool,
    #[bits(12)]
    __: u16,
    /// Bit 31.
    pub enable: bool,
}
