//! # Execlist Context Structures
//!
//! Everything the render engine reads from memory to run work submitted
//! through execlists:
//!
//! - [`ContextDescriptor`]: the value written to the submit port.
//! - [`RcsContext`]: the 22-page logical ring context image, built from a
//!   [`RingContext`] block, a [`PpgttContext`] block and render-specific
//!   state.
//! - MI command encoders such as [`MiBatchBufferStart`] and
//!   [`MiStoreDataImm`], each filling one 16-byte ring slot.
//!
//! All layouts are `#[repr(C)]` and checked against their hardware sizes at
//! compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod descriptor;
mod instructions;
mod ppgtt;
mod rcs;
mod registers;
mod ring;

pub use crate::descriptor::{AddressingMode, ContextDescriptor, FaultHandling};
pub use crate::instructions::{
    AddressSpace, BatchBufferStartAddress, BatchBufferStartHeader, BatchLevel, MI_COMMAND,
    MiBatchBufferEnd, MiBatchBufferStart, MiHeader, MiLoadRegisterImm, MiNoop, MiOpcode,
    MiStoreDataImm, RING_ELEMENT_DWORDS, RING_ELEMENT_SIZE, RingElement, StoreDataImmHeader,
};
pub use crate::ppgtt::{PPGTT_REGISTERS, PpgttContext};
pub use crate::rcs::{
    HardwareStatusPages, RCS_CONTEXT_PAGES, RcsContext, RcsMiscContext, RenderPpgttContext,
    RenderRingContext,
};
pub use crate::registers::{
    AutoReport, BLITTER_RING_BASE, BatchBufferHead, BatchBufferHeadUdw, BatchBufferState,
    CONTEXT_RESTORE_INHIBIT, INHIBIT_SYN_CONTEXT_SWITCH, LoadRegister, PowerClockState,
    R_PWR_CLK_STATE, RENDER_RING_BASE, RS_CONTEXT_ENABLE, RingBufferControl, RingBufferHead,
    RingBufferStart, RingBufferTail, VIDEO_ENHANCE_RING_BASE, VIDEO_RING_BASE, offsets,
};
pub use crate::ring::{RING_REGISTERS, RingContext};

/// Blitter engine ring block.
pub type BlitterRingContext = RingContext<BLITTER_RING_BASE>;
/// Video engine ring block.
pub type VideoRingContext = RingContext<VIDEO_RING_BASE>;
/// Video enhancement engine ring block.
pub type VideoEnhanceRingContext = RingContext<VIDEO_ENHANCE_RING_BASE>;
