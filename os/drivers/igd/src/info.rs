//! # Register Map
//!
//! Byte offsets into BAR0 of the registers the driver touches. Render ring
//! registers are derived from [`RENDER_RING_BASE`] so they stay in sync
//! with the offsets stored in context images.

use igd_context::{RENDER_RING_BASE, offsets};
use igd_registers::{Field, Register, RegisterBitset};

/// PCI vendor ID of Intel.
pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// PCI base class of display controllers.
pub const DISPLAY_CLASS: u8 = 0x03;

const fn rcs(offset: u32) -> usize {
    (RENDER_RING_BASE + offset) as usize
}

pub const RING_BUFFER_TAIL_RCS: Register<u32> = Register::at(rcs(offsets::RING_TAIL));
pub const RING_BUFFER_HEAD_RCS: Register<u32> = Register::at(rcs(offsets::RING_HEAD));
pub const RING_BUFFER_START_RCS: Register<u32> = Register::at(rcs(offsets::RING_START));
pub const RING_BUFFER_CTL_RCS: Register<u32> = Register::at(rcs(offsets::RING_CTL));

/// Active head pointer of the render engine.
pub const ACTHD_RCS: Register<u32> = Register::at(rcs(offsets::ACTHD));

/// Bits 2–31: address the command streamer is fetching from.
pub const ACTHD_HEAD_POINTER: Field<u32> = ACTHD_RCS.field(2, 30);

/// Hardware status page address of the render engine.
pub const HWS_PGA_RCS: Register<u32> = Register::at(rcs(offsets::HWS_PGA));

/// Bits 12–31: page number of the status page.
pub const HWS_PGA_ADDRESS: Field<u32> = HWS_PGA_RCS.field(12, 20);

/// Execlist submit port; takes four dword writes per submission.
pub const EXECLIST_SUBMIT_PORT_RCS: Register<u32> =
    Register::at(rcs(offsets::EXECLIST_SUBMIT_PORT));

/// Lower half of the execlist status.
pub const EXECLIST_STATUS_LO_RCS: Register<u32> = Register::at(rcs(offsets::EXECLIST_STATUS));

/// Upper half of the execlist status.
pub const EXECLIST_STATUS_HI_RCS: Register<u32> = EXECLIST_STATUS_LO_RCS.add(4);

/// `GFX_MODE` of the render engine, a masked register.
pub const GFX_MODE: Register<u32> = Register::at(rcs(offsets::GFX_MODE));

pub const GFX_MODE_EXECLIST_ENABLE: RegisterBitset<u32> = GFX_MODE.masked_bit(15);
pub const GFX_MODE_PPGTT_ENABLE: RegisterBitset<u32> = GFX_MODE.masked_bit(9);
pub const GFX_MODE_VIRTUAL_ADDRESSING_ENABLE: RegisterBitset<u32> = GFX_MODE.masked_bit(7);
pub const GFX_MODE_PRIVILEGE_CHECK_DISABLE: RegisterBitset<u32> = GFX_MODE.masked_bit(0);

/// Page fault status.
pub const FAULT_REG: Register<u32> = Register::at(0x4094);

/// Error identity registers.
pub const ERROR: Register<u32> = Register::at(0x40A0);
pub const ERROR_2: Register<u32> = Register::at(0x40A4);

/// Render P-state control.
pub const RP_CONTROL: Register<u32> = Register::at(0xA024);

/// Render C-state (RC6) control.
pub const RC_CONTROL: Register<u32> = Register::at(0xA090);

/// Render C-state residency state.
pub const RC_STATE: Register<u32> = Register::at(0xA094);

/// Power gating enables.
pub const PG_ENABLE: Register<u32> = Register::at(0xA210);

/// Free running timestamp counter.
pub const TIMESTAMP_CTR: Register<u32> = Register::at(0x44070);

/// Display power well control (driver request).
pub const PWR_WELL_CTL2: Register<u32> = Register::at(0x45404);

/// Bit 31: power well requested by the driver.
pub const PWR_WELL_REQUEST: Field<u32> = PWR_WELL_CTL2.field(31, 1);

/// South display engine reset warning options.
pub const NDE_RSTWRN_OPT: Register<u32> = Register::at(0x46408);

/// Bit 4: reset handshake with the PCH.
pub const RST_PCH_HANDSHAKE_ENABLE: Field<u32> = NDE_RSTWRN_OPT.field(4, 1);

/// GAM arbiter control.
pub const GARBCNTL: Register<u32> = Register::at(0xB004);

/// Bit 7: `WaEnableGapsTsvCreditFix`.
pub const GAPS_TSV_CREDIT_DISABLE: Field<u32> = GARBCNTL.field(7, 1);

/// Offset of the global GTT inside BAR0.
pub const GTT_OFFSET: usize = 0x80_0000;

/// Size of one global GTT entry.
pub const GTT_ENTRY_SIZE: usize = 8;
