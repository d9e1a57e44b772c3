//! # Ring State of a Logical Ring Context
//!
//! The first register-state block of every engine's context image: a single
//! `MI_LOAD_REGISTER_IMM` restoring the ring buffer and batch-buffer
//! registers of the engine at `RING_BASE`.

use crate::instructions::{AddressSpace, MiLoadRegisterImm, MiNoop};
use crate::registers::{
    BatchBufferHead, BatchBufferHeadUdw, BatchBufferState, CONTEXT_RESTORE_INHIBIT,
    INHIBIT_SYN_CONTEXT_SWITCH, LoadRegister, RS_CONTEXT_ENABLE, RingBufferControl,
    RingBufferHead, RingBufferStart, RingBufferTail, offsets,
};
use igd_memory::{PAGE_SIZE, PhysicalAddress};

/// Registers loaded by the ring block.
pub const RING_REGISTERS: usize = 14;

/// Ring buffer and batch-buffer state of the engine at `RING_BASE`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingContext<const RING_BASE: u32> {
    noop: u32,
    lri: MiLoadRegisterImm,
    context_control: LoadRegister<u32>,
    ring_head: LoadRegister<RingBufferHead>,
    ring_tail: LoadRegister<RingBufferTail>,
    ring_start: LoadRegister<RingBufferStart>,
    ring_control: LoadRegister<RingBufferControl>,
    bb_head_udw: LoadRegister<BatchBufferHeadUdw>,
    bb_head: LoadRegister<BatchBufferHead>,
    bb_state: LoadRegister<BatchBufferState>,
    second_bb_head_udw: LoadRegister<BatchBufferHeadUdw>,
    second_bb_head: LoadRegister<BatchBufferHead>,
    second_bb_state: LoadRegister<BatchBufferState>,
    bb_per_ctx_ptr: LoadRegister<u32>,
    indirect_ctx: LoadRegister<u32>,
    indirect_ctx_offset: LoadRegister<u32>,
    padding: [u32; 2],
}

const _: () = assert!(size_of::<RingContext<0>>() == 32 * 4);

impl<const RING_BASE: u32> RingContext<RING_BASE> {
    /// Byte offset of the ring-head value inside the block.
    pub const RING_HEAD_VALUE: usize = core::mem::offset_of!(Self, ring_head) + 4;

    /// Byte offset of the ring-tail value inside the block.
    pub const RING_TAIL_VALUE: usize = core::mem::offset_of!(Self, ring_tail) + 4;

    /// Ring state for a ring of `ring_len` bytes at `ring`, head and tail at zero.
    ///
    /// `ring` must be page aligned and `ring_len` a whole number of pages,
    /// at most 512. The start register holds 20 address bits; higher bits
    /// are dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(ring: PhysicalAddress, ring_len: usize) -> Self {
        debug_assert!(ring.is_page_aligned(), "ring must be page aligned");
        debug_assert!(ring_len.is_multiple_of(PAGE_SIZE), "ring length must be whole pages");

        // value and mask bit set: enable
        let control = CONTEXT_RESTORE_INHIBIT.raw_mask()
            | RS_CONTEXT_ENABLE.raw_mask()
            | INHIBIT_SYN_CONTEXT_SWITCH.raw_mask();

        Self {
            noop: MiNoop::DWORD,
            lri: MiLoadRegisterImm::with_pairs(RING_REGISTERS),
            context_control: LoadRegister::new(reg::<RING_BASE>(offsets::CONTEXT_CONTROL), control as u32),
            ring_head: LoadRegister::new(reg::<RING_BASE>(offsets::RING_HEAD), RingBufferHead::new()),
            ring_tail: LoadRegister::new(reg::<RING_BASE>(offsets::RING_TAIL), RingBufferTail::new()),
            ring_start: LoadRegister::new(
                reg::<RING_BASE>(offsets::RING_START),
                RingBufferStart::new().with_starting_page(((ring.as_u64() >> 12) & 0xF_FFFF) as u32),
            ),
            ring_control: LoadRegister::new(
                reg::<RING_BASE>(offsets::RING_CTL),
                RingBufferControl::enabled(ring_len / PAGE_SIZE),
            ),
            bb_head_udw: LoadRegister::new(reg::<RING_BASE>(offsets::BB_HEAD_UDW), BatchBufferHeadUdw::new()),
            bb_head: LoadRegister::new(
                reg::<RING_BASE>(offsets::BB_HEAD),
                BatchBufferHead::new().with_valid(true),
            ),
            bb_state: LoadRegister::new(
                reg::<RING_BASE>(offsets::BB_STATE),
                BatchBufferState::new().with_address_space(AddressSpace::Ggtt),
            ),
            second_bb_head_udw: LoadRegister::new(
                reg::<RING_BASE>(offsets::SECOND_BB_HEAD_UDW),
                BatchBufferHeadUdw::new(),
            ),
            second_bb_head: LoadRegister::new(
                reg::<RING_BASE>(offsets::SECOND_BB_HEAD),
                BatchBufferHead::new().with_valid(true),
            ),
            second_bb_state: LoadRegister::new(
                reg::<RING_BASE>(offsets::SECOND_BB_STATE),
                BatchBufferState::new(),
            ),
            bb_per_ctx_ptr: LoadRegister::new(reg::<RING_BASE>(offsets::BB_PER_CTX_PTR), 0),
            indirect_ctx: LoadRegister::new(reg::<RING_BASE>(offsets::INDIRECT_CTX), 0),
            indirect_ctx_offset: LoadRegister::new(reg::<RING_BASE>(offsets::INDIRECT_CTX_OFFSET), 0),
            padding: [MiNoop::DWORD; 2],
        }
    }

    #[inline]
    #[must_use]
    pub const fn lri(&self) -> MiLoadRegisterImm {
        self.lri
    }

    #[inline]
    #[must_use]
    pub const fn context_control(&self) -> LoadRegister<u32> {
        self.context_control
    }

    #[inline]
    #[must_use]
    pub const fn ring_head(&self) -> LoadRegister<RingBufferHead> {
        self.ring_head
    }

    #[inline]
    #[must_use]
    pub const fn ring_tail(&self) -> LoadRegister<RingBufferTail> {
        self.ring_tail
    }

    /// Move the tail to `bytes` into the ring.
    #[inline]
    pub const fn set_ring_tail(&mut self, bytes: u32) {
        self.ring_tail.set_value(RingBufferTail::at_byte(bytes));
    }

    #[inline]
    #[must_use]
    pub const fn ring_start(&self) -> LoadRegister<RingBufferStart> {
        self.ring_start
    }

    #[inline]
    #[must_use]
    pub const fn ring_control(&self) -> LoadRegister<RingBufferControl> {
        self.ring_control
    }

    #[inline]
    #[must_use]
    pub const fn bb_state(&self) -> LoadRegister<BatchBufferState> {
        self.bb_state
    }

    /// The image as dwords, in memory order.
    #[must_use]
    pub fn to_dwords(&self) -> [u32; 32] {
        let mut out = [0; 32];
        let pairs = [
            (self.context_control.offset(), self.context_control.value()),
            (self.ring_head.offset(), self.ring_head.value().into_bits()),
            (self.ring_tail.offset(), self.ring_tail.value().into_bits()),
            (self.ring_start.offset(), self.ring_start.value().into_bits()),
            (self.ring_control.offset(), self.ring_control.value().into_bits()),
            (self.bb_head_udw.offset(), self.bb_head_udw.value().into_bits()),
            (self.bb_head.offset(), self.bb_head.value().into_bits()),
            (self.bb_state.offset(), self.bb_state.value().into_bits()),
            (self.second_bb_head_udw.offset(), self.second_bb_head_udw.value().into_bits()),
            (self.second_bb_head.offset(), self.second_bb_head.value().into_bits()),
            (self.second_bb_state.offset(), self.second_bb_state.value().into_bits()),
            (self.bb_per_ctx_ptr.offset(), self.bb_per_ctx_ptr.value()),
            (self.indirect_ctx.offset(), self.indirect_ctx.value()),
            (self.indirect_ctx_offset.offset(), self.indirect_ctx_offset.value()),
        ];
        out[0] = self.noop;
        out[1] = self.lri.into_bits();
        for (i, (offset, value)) in pairs.into_iter().enumerate() {
            out[2 + 2 * i] = offset;
            out[3 + 2 * i] = value;
        }
        out[30] = self.padding[0];
        out[31] = self.padding[1];
        out
    }
}

/// Absolute offset of a register of the engine at `RING_BASE`.
#[inline]
const fn reg<const RING_BASE: u32>(offset: u32) -> u32 {
    RING_BASE + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RENDER_RING_BASE;
    use crate::{BlitterRingContext, VideoEnhanceRingContext, VideoRingContext};

    fn render_ring() -> RingContext<RENDER_RING_BASE> {
        RingContext::new(PhysicalAddress::new(0x0040_0000), 4 * PAGE_SIZE)
    }

    #[test]
    fn header_and_register_offsets() {
        let dw = render_ring().to_dwords();
        assert_eq!(dw[0], 0);
        assert_eq!(dw[1], 0x1100_101B);
        let offsets: [u32; RING_REGISTERS] = core::array::from_fn(|i| dw[2 + 2 * i]);
        assert_eq!(
            offsets,
            [
                0x2244, 0x2034, 0x2030, 0x2038, 0x203C, 0x2168, 0x2140, 0x2110, 0x211C, 0x2114,
                0x2118, 0x21C0, 0x21C4, 0x21C8
            ]
        );
        assert_eq!(&dw[30..], &[0, 0]);
    }

    #[test]
    fn initial_register_values() {
        let ring = render_ring();
        assert_eq!(ring.context_control().value(), 0x000B_000B);
        assert_eq!(ring.ring_head().value().into_bits(), 0);
        assert_eq!(ring.ring_tail().value().into_bits(), 0);
        assert_eq!(ring.ring_start().value().starting_page(), 0x400);
        assert_eq!(ring.ring_start().value().into_bits(), 0x0040_0000);
        assert_eq!(ring.ring_control().value().into_bits(), (3 << 12) | 1);
        assert_eq!(ring.bb_state().value().address_space(), AddressSpace::Ggtt);
    }

    #[test]
    fn tail_updates_touch_one_dword() {
        let before = render_ring();
        let mut after = before;
        after.set_ring_tail(16);

        let a = before.to_dwords();
        let b = after.to_dwords();
        let changed: [bool; 32] = core::array::from_fn(|i| a[i] != b[i]);
        let tail_dword = RingContext::<RENDER_RING_BASE>::RING_TAIL_VALUE / 4;
        assert_eq!(changed.iter().filter(|c| **c).count(), 1);
        assert!(changed[tail_dword]);
        assert_eq!(b[tail_dword], 16);
    }

    #[test]
    fn other_engines_use_their_base() {
        let ring = PhysicalAddress::new(0x1000);
        let blitter = BlitterRingContext::new(ring, PAGE_SIZE);
        assert_eq!(blitter.ring_tail().offset(), 0x22030);
        assert_eq!(blitter.context_control().offset(), 0x22244);

        let video = VideoRingContext::new(ring, PAGE_SIZE);
        assert_eq!(video.ring_head().offset(), 0x12034);
        assert_eq!(video.ring_start().offset(), 0x12038);

        let enhance = VideoEnhanceRingContext::new(ring, PAGE_SIZE);
        assert_eq!(enhance.ring_control().offset(), 0x1A03C);
        assert_eq!(enhance.ring_start().value(), blitter.ring_start().value());
    }

    #[test]
    fn value_offsets_match_layout() {
        assert_eq!(RingContext::<RENDER_RING_BASE>::RING_HEAD_VALUE, 4 * 5);
        assert_eq!(RingContext::<RENDER_RING_BASE>::RING_TAIL_VALUE, 4 * 7);
    }
}
