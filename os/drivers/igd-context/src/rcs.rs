//! # Render Engine Context Image
//!
//! [`RcsContext`] is the full 22-page memory image of a render-engine
//! logical ring context:
//!
//! | Page(s) | Content |
//! |---------|---------|
//! | 0       | GuC shared page |
//! | 1       | Per-process hardware status page; the LRCA points here |
//! | 2       | Ring state, PPGTT state and render-specific registers |
//! | 2–21    | Remaining engine state saved and restored by the hardware |
//!
//! The image lives in DMA memory shared with the GPU, so it is never built
//! on the stack. [`RcsContext::init`] writes a fresh image into a zeroed
//! buffer and the other helpers read or update single fields in place.

use crate::instructions::{MiLoadRegisterImm, MiNoop};
use crate::ppgtt::PpgttContext;
use crate::registers::{
    LoadRegister, PowerClockState, R_PWR_CLK_STATE, RENDER_RING_BASE, RingBufferHead,
    RingBufferTail,
};
use crate::ring::RingContext;
use core::mem::offset_of;
use core::ptr::NonNull;
use igd_memory::{DmaBuffer, PAGE_SIZE, PhysicalAddress};
use log::debug;

/// Ring state block of the render engine.
pub type RenderRingContext = RingContext<RENDER_RING_BASE>;

/// PPGTT state block of the render engine.
pub type RenderPpgttContext = PpgttContext<RENDER_RING_BASE>;

/// Pages in a render context image.
pub const RCS_CONTEXT_PAGES: usize = 22;

/// GuC shared page and per-process hardware status page.
#[repr(C)]
pub struct HardwareStatusPages {
    guc_shared: [u8; PAGE_SIZE],
    pphwsp: [u8; PAGE_SIZE],
}

/// Render-only register block following the PPGTT block.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RcsMiscContext {
    noop: u32,
    lri: MiLoadRegisterImm,
    power_clock_state: LoadRegister<PowerClockState>,
    padding: [u32; 12],
}

impl RcsMiscContext {
    #[must_use]
    pub const fn new(state: PowerClockState) -> Self {
        Self {
            noop: MiNoop::DWORD,
            lri: MiLoadRegisterImm::with_pairs(1),
            power_clock_state: LoadRegister::new(R_PWR_CLK_STATE, state),
            padding: [MiNoop::DWORD; 12],
        }
    }

    #[inline]
    #[must_use]
    pub const fn power_clock_state(&self) -> LoadRegister<PowerClockState> {
        self.power_clock_state
    }
}

const ENGINE_STATE_BYTES: usize = RCS_CONTEXT_PAGES * PAGE_SIZE
    - size_of::<HardwareStatusPages>()
    - size_of::<RenderRingContext>()
    - size_of::<RenderPpgttContext>()
    - size_of::<RcsMiscContext>();

/// Render engine logical ring context image.
#[repr(C, align(4096))]
pub struct RcsContext {
    status: HardwareStatusPages,
    ring: RenderRingContext,
    ppgtt: RenderPpgttContext,
    misc: RcsMiscContext,
    engine_state: [u8; ENGINE_STATE_BYTES],
}

const _: () = assert!(size_of::<RcsContext>() == RCS_CONTEXT_PAGES * PAGE_SIZE);
const _: () = assert!(offset_of!(RcsContext, ring) == 2 * PAGE_SIZE);

impl RcsContext {
    /// Size of the image in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Offset of the logical ring context address (the PPHWSP page).
    pub const LRCA_OFFSET: usize = offset_of!(Self, status) + PAGE_SIZE;

    /// Offset of the ring state block.
    pub const RING_OFFSET: usize = offset_of!(Self, ring);

    /// Offset of the PPGTT state block.
    pub const PPGTT_OFFSET: usize = offset_of!(Self, ppgtt);

    /// Offset of the render-specific register block.
    pub const MISC_OFFSET: usize = offset_of!(Self, misc);

    /// Offset of the saved ring-head value.
    pub const RING_HEAD_VALUE: usize = Self::RING_OFFSET + RenderRingContext::RING_HEAD_VALUE;

    /// Offset of the saved ring-tail value.
    pub const RING_TAIL_VALUE: usize = Self::RING_OFFSET + RenderRingContext::RING_TAIL_VALUE;

    /// Offset of the `R_PWR_CLK_STATE` value.
    pub const POWER_CLOCK_STATE_VALUE: usize =
        Self::MISC_OFFSET + offset_of!(RcsMiscContext, power_clock_state) + 4;

    /// Write a fresh image into `buffer`.
    ///
    /// The buffer is zeroed, then the ring block (for a ring of `ring_len`
    /// bytes at `ring`), the PPGTT block (rooted at `pml4`) and the render
    /// block are filled in. `R_PWR_CLK_STATE` starts out zero.
    ///
    /// # Panics
    /// Panics if `buffer` is smaller than [`SIZE`](Self::SIZE) or not page aligned.
    pub fn init(
        buffer: &DmaBuffer,
        ring: PhysicalAddress,
        ring_len: usize,
        pml4: PhysicalAddress,
    ) -> NonNull<Self> {
        let image = buffer.cast::<Self>();
        buffer.fill(0);

        let p = image.as_ptr();
        // SAFETY: `cast` checked that the buffer holds an aligned `RcsContext`;
        // all fields are plain integers, so any bit pattern is valid.
        unsafe {
            (&raw mut (*p).ring).write_volatile(RingContext::new(ring, ring_len));
            (&raw mut (*p).ppgtt).write_volatile(PpgttContext::new(pml4));
            (&raw mut (*p).misc).write_volatile(RcsMiscContext::new(PowerClockState::new()));
        }

        debug!(
            "rcs context at {} (lrca {}), ring {ring} ({ring_len:#x} bytes), pml4 {pml4}",
            buffer.phys(),
            buffer.phys() + Self::LRCA_OFFSET as u64
        );
        image
    }

    /// Copy of the ring block of the image in `buffer`.
    #[must_use]
    pub fn ring(buffer: &DmaBuffer) -> RenderRingContext {
        let p = buffer.cast::<Self>().as_ptr();
        // SAFETY: see `init`.
        unsafe { (&raw const (*p).ring).read_volatile() }
    }

    /// Copy of the PPGTT block of the image in `buffer`.
    #[must_use]
    pub fn ppgtt(buffer: &DmaBuffer) -> RenderPpgttContext {
        let p = buffer.cast::<Self>().as_ptr();
        // SAFETY: see `init`.
        unsafe { (&raw const (*p).ppgtt).read_volatile() }
    }

    /// Copy of the render block of the image in `buffer`.
    #[must_use]
    pub fn misc(buffer: &DmaBuffer) -> RcsMiscContext {
        let p = buffer.cast::<Self>().as_ptr();
        // SAFETY: see `init`.
        unsafe { (&raw const (*p).misc).read_volatile() }
    }

    /// Saved ring head, as last written back by the hardware.
    #[must_use]
    pub fn ring_head(buffer: &DmaBuffer) -> RingBufferHead {
        RingBufferHead::from_bits(buffer.read_u32(Self::RING_HEAD_VALUE))
    }

    /// Saved ring tail.
    #[must_use]
    pub fn ring_tail(buffer: &DmaBuffer) -> RingBufferTail {
        RingBufferTail::from_bits(buffer.read_u32(Self::RING_TAIL_VALUE))
    }

    /// Move the saved ring tail to `bytes`, touching only the tail value.
    pub fn set_ring_tail(buffer: &DmaBuffer, bytes: u32) {
        buffer.write_u32(Self::RING_TAIL_VALUE, RingBufferTail::at_byte(bytes).into_bits());
    }

    /// Request a slice/subslice/EU configuration for the context.
    pub fn set_power_clock_state(buffer: &DmaBuffer, state: PowerClockState) {
        buffer.write_u32(Self::POWER_CLOCK_STATE_VALUE, state.into_bits());
    }
}
