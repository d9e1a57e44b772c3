//! # Command Streamer Instructions
//!
//! Encoders for the MI (memory interface) commands the driver emits. Every
//! command placed in the ring occupies one fixed 16-byte [`RingElement`]
//! slot so that the ring tail always stays qword aligned.

use bitfield_struct::bitfield;
use igd_memory::GraphicsAddress;

/// Command type of all MI commands.
pub const MI_COMMAND: u32 = 0;

/// Size in bytes of one ring slot.
pub const RING_ELEMENT_SIZE: usize = 16;

/// Dwords per ring slot.
pub const RING_ELEMENT_DWORDS: usize = RING_ELEMENT_SIZE / 4;

/// MI opcodes, bits 23–28 of the header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MiOpcode {
    Noop = 0x00,
    BatchBufferEnd = 0x0A,
    StoreDataImm = 0x20,
    LoadRegisterImm = 0x22,
    BatchBufferStart = 0x31,
}

/// Which translation table resolves a command's address operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AddressSpace {
    /// The global GTT.
    Ggtt = 0,
    /// The context's per-process GTT.
    Ppgtt = 1,
}

impl AddressSpace {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        if bits & 1 == 0 { Self::Ggtt } else { Self::Ppgtt }
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self as u32
    }
}

/// Batch nesting level of an `MI_BATCH_BUFFER_START`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BatchLevel {
    First = 0,
    Second = 1,
}

impl BatchLevel {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        if bits & 1 == 0 { Self::First } else { Self::Second }
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self as u32
    }
}

/// Common header of an MI command.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct MiHeader {
    /// Bits 0–22: opcode specific, usually the dword length.
    #[bits(23)]
    pub command_specific: u32,
    /// Bits 23–28.
    #[bits(6)]
    pub opcode: u8,
    /// Bits 29–31.
    #[bits(3)]
    pub command_type: u8,
}

impl MiHeader {
    /// Header for `opcode` with the given opcode-specific bits.
    #[inline]
    #[must_use]
    pub const fn mi(opcode: MiOpcode, specific: u32) -> Self {
        Self::new()
            .with_command_type(MI_COMMAND as u8)
            .with_opcode(opcode as u8)
            .with_command_specific(specific & 0x7F_FFFF)
    }
}

/// Anything that fills exactly one ring slot.
pub trait RingElement {
    /// The slot's dwords in memory order.
    fn encode(&self) -> [u32; RING_ELEMENT_DWORDS];
}

/// `MI_NOOP`: does nothing, all bits zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MiNoop;

impl MiNoop {
    pub const DWORD: u32 = 0;

    #[inline]
    #[must_use]
    pub const fn encode(self) -> u32 {
        MiHeader::mi(MiOpcode::Noop, 0).into_bits()
    }
}

/// `MI_BATCH_BUFFER_END`: returns from a batch to the ring.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MiBatchBufferEnd;

impl MiBatchBufferEnd {
    #[inline]
    #[must_use]
    pub const fn encode(self) -> u32 {
        MiHeader::mi(MiOpcode::BatchBufferEnd, 0).into_bits()
    }
}

/// Header of `MI_BATCH_BUFFER_START`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct BatchBufferStartHeader {
    /// Bits 0–7: dwords following the first two, always 1.
    #[bits(8)]
    pub dword_length: u8,
    /// Bit 8.
    #[bits(1)]
    pub address_space: AddressSpace,
    #[bits(13)]
    __: u16,
    /// Bit 22.
    #[bits(1)]
    pub level: BatchLevel,
    /// Bits 23–28.
    #[bits(6)]
    pub opcode: u8,
    /// Bits 29–31.
    #[bits(3)]
    pub command_type: u8,
}

/// Address operand of `MI_BATCH_BUFFER_START`: a dword-aligned 64-bit address.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct BatchBufferStartAddress {
    #[bits(2)]
    __: u8,
    /// Bits 2–63: start address `>> 2`.
    #[bits(62)]
    pub address_dw: u64,
}

/// `MI_BATCH_BUFFER_START`: jump into a batch buffer.
///
/// Laid out as header, address (low then high dword) and a trailing
/// `MI_NOOP` filling the slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MiBatchBufferStart {
    header: BatchBufferStartHeader,
    address_low: u32,
    address_high: u32,
    noop: u32,
}

const _: () = assert!(size_of::<MiBatchBufferStart>() == RING_ELEMENT_SIZE);

impl MiBatchBufferStart {
    /// Jump to `batch`, resolved through `space`, as a `level` batch.
    ///
    /// The two low bits of `batch` are dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(batch: GraphicsAddress, level: BatchLevel, space: AddressSpace) -> Self {
        let header = BatchBufferStartHeader::new()
            .with_command_type(MI_COMMAND as u8)
            .with_opcode(MiOpcode::BatchBufferStart as u8)
            .with_level(level)
            .with_address_space(space)
            .with_dword_length(1);
        let address = BatchBufferStartAddress::new().with_address_dw(batch.as_u64() >> 2);
        let raw = address.into_bits();
        Self {
            header,
            address_low: raw as u32,
            address_high: (raw >> 32) as u32,
            noop: MiNoop::DWORD,
        }
    }

    /// First-level batch in the context's PPGTT.
    #[inline]
    #[must_use]
    pub const fn ppgtt(batch: GraphicsAddress) -> Self {
        Self::new(batch, BatchLevel::First, AddressSpace::Ppgtt)
    }

    #[inline]
    #[must_use]
    pub const fn header(&self) -> BatchBufferStartHeader {
        self.header
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> BatchBufferStartAddress {
        BatchBufferStartAddress::from_bits(((self.address_high as u64) << 32) | self.address_low as u64)
    }

    /// The batch address, as passed to [`new`](Self::new).
    #[inline]
    #[must_use]
    pub const fn batch(&self) -> GraphicsAddress {
        GraphicsAddress::new(self.address().address_dw() << 2)
    }

    /// Decode a slot previously produced by [`RingElement::encode`].
    #[must_use]
    pub const fn from_dwords(dwords: [u32; RING_ELEMENT_DWORDS]) -> Self {
        Self {
            header: BatchBufferStartHeader::from_bits(dwords[0]),
            address_low: dwords[1],
            address_high: dwords[2],
            noop: dwords[3],
        }
    }
}

impl RingElement for MiBatchBufferStart {
    fn encode(&self) -> [u32; RING_ELEMENT_DWORDS] {
        [
            self.header.into_bits(),
            self.address_low,
            self.address_high,
            self.noop,
        ]
    }
}

/// Header of `MI_STORE_DATA_IMM`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct StoreDataImmHeader {
    /// Bits 0–9.
    #[bits(10)]
    pub dword_length: u16,
    #[bits(11)]
    __: u16,
    /// Bit 21: store a qword instead of a dword.
    pub store_qword: bool,
    /// Bit 22: resolve the address through the global GTT.
    pub use_global_gtt: bool,
    /// Bits 23–28.
    #[bits(6)]
    pub opcode: u8,
    /// Bits 29–31.
    #[bits(3)]
    pub command_type: u8,
}

/// `MI_STORE_DATA_IMM`: write an immediate dword to memory.
///
/// Used for fences: the command streamer writes a sequence number once all
/// preceding commands have executed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MiStoreDataImm {
    header: StoreDataImmHeader,
    address_low: u32,
    address_high: u32,
    data: u32,
}

const _: () = assert!(size_of::<MiStoreDataImm>() == RING_ELEMENT_SIZE);

impl MiStoreDataImm {
    /// Store `value` at `target` (dword aligned) in `space`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(target: GraphicsAddress, value: u32, space: AddressSpace) -> Self {
        debug_assert!(target.as_u64() & 0b11 == 0, "store target must be dword aligned");
        let header = StoreDataImmHeader::new()
            .with_command_type(MI_COMMAND as u8)
            .with_opcode(MiOpcode::StoreDataImm as u8)
            .with_use_global_gtt(matches!(space, AddressSpace::Ggtt))
            .with_dword_length(2);
        Self {
            header,
            address_low: target.as_u64() as u32 & !0b11,
            address_high: (target.as_u64() >> 32) as u32,
            data: value,
        }
    }

    #[inline]
    #[must_use]
    pub const fn header(&self) -> StoreDataImmHeader {
        self.header
    }

    #[inline]
    #[must_use]
    pub const fn target(&self) -> GraphicsAddress {
        GraphicsAddress::new(((self.address_high as u64) << 32) | self.address_low as u64)
    }

    #[inline]
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.data
    }
}

impl RingElement for MiStoreDataImm {
    fn encode(&self) -> [u32; RING_ELEMENT_DWORDS] {
        [
            self.header.into_bits(),
            self.address_low,
            self.address_high,
            self.data,
        ]
    }
}

/// Header of `MI_LOAD_REGISTER_IMM`, followed by `(offset, value)` pairs.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct MiLoadRegisterImm {
    /// Bits 0–7: `2 * pairs - 1`.
    #[bits(8)]
    pub dword_length: u8,
    /// Bits 8–11.
    #[bits(4)]
    pub byte_write_disables: u8,
    /// Bit 12.
    pub force_posted: bool,
    #[bits(10)]
    __: u16,
    /// Bits 23–28.
    #[bits(6)]
    pub opcode: u8,
    /// Bits 29–31.
    #[bits(3)]
    pub command_type: u8,
}

impl MiLoadRegisterImm {
    /// Header for `pairs` posted register loads.
    ///
    /// # Panics
    /// Panics unless `1 <= pairs <= 128`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_pairs(pairs: usize) -> Self {
        assert!(pairs >= 1 && pairs <= 128, "LRI carries 1 to 128 registers");
        Self::new()
            .with_command_type(MI_COMMAND as u8)
            .with_opcode(MiOpcode::LoadRegisterImm as u8)
            .with_force_posted(true)
            .with_dword_length((2 * pairs - 1) as u8)
    }

    /// Number of `(offset, value)` pairs that follow.
    #[inline]
    #[must_use]
    pub const fn pairs(self) -> usize {
        (self.dword_length() as usize).div_ceil(2)
    }
}
