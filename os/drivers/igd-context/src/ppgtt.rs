//! # PPGTT State of a Logical Ring Context
//!
//! Second register-state block: the context timestamp and the four page
//! directory pointers. With a 4-level table only `PDP0` is used and holds
//! the PML4 address.

use crate::instructions::{MiLoadRegisterImm, MiNoop};
use crate::registers::{LoadRegister, offsets};
use igd_memory::PhysicalAddress;

/// Registers loaded by the PPGTT block.
pub const PPGTT_REGISTERS: usize = 9;

/// Timestamp and page-directory pointers of the engine at `RING_BASE`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PpgttContext<const RING_BASE: u32> {
    noop: u32,
    lri: MiLoadRegisterImm,
    ctx_timestamp: LoadRegister<u32>,
    /// `PDP3` to `PDP0`, each as upper dword then lower dword.
    pdp: [PdpPair; 4],
    padding: [u32; 12],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct PdpPair {
    udw: LoadRegister<u32>,
    ldw: LoadRegister<u32>,
}

const _: () = assert!(size_of::<PpgttContext<0>>() == 32 * 4);

impl<const RING_BASE: u32> PpgttContext<RING_BASE> {
    /// PPGTT block for a 4-level table rooted at `pml4`.
    #[must_use]
    pub const fn new(pml4: PhysicalAddress) -> Self {
        let mut pdp = [
            pdp_pair(RING_BASE + offsets::PDP3_UDW, RING_BASE + offsets::PDP3_LDW, PhysicalAddress::zero()),
            pdp_pair(RING_BASE + offsets::PDP2_UDW, RING_BASE + offsets::PDP2_LDW, PhysicalAddress::zero()),
            pdp_pair(RING_BASE + offsets::PDP1_UDW, RING_BASE + offsets::PDP1_LDW, PhysicalAddress::zero()),
            pdp_pair(RING_BASE + offsets::PDP0_UDW, RING_BASE + offsets::PDP0_LDW, PhysicalAddress::zero()),
        ];
        pdp[3].udw.set_value(pml4.high_u32());
        pdp[3].ldw.set_value(pml4.low_u32());

        Self {
            noop: MiNoop::DWORD,
            lri: MiLoadRegisterImm::with_pairs(PPGTT_REGISTERS),
            ctx_timestamp: LoadRegister::new(RING_BASE + offsets::CTX_TIMESTAMP, 0),
            pdp,
            padding: [MiNoop::DWORD; 12],
        }
    }

    #[inline]
    #[must_use]
    pub const fn lri(&self) -> MiLoadRegisterImm {
        self.lri
    }

    #[inline]
    #[must_use]
    pub const fn ctx_timestamp(&self) -> LoadRegister<u32> {
        self.ctx_timestamp
    }

    /// Page directory pointer `index` (0 to 3).
    ///
    /// # Panics
    /// Panics if `index > 3`.
    #[inline]
    #[must_use]
    pub const fn pdp(&self, index: usize) -> PhysicalAddress {
        let pair = &self.pdp[3 - index];
        PhysicalAddress::new(((pair.udw.value() as u64) << 32) | pair.ldw.value() as u64)
    }

    /// Point page directory pointer `index` (0 to 3) at `table`.
    ///
    /// # Panics
    /// Panics if `index > 3`.
    #[inline]
    pub const fn set_pdp(&mut self, index: usize, table: PhysicalAddress) {
        let pair = &mut self.pdp[3 - index];
        pair.udw.set_value(table.high_u32());
        pair.ldw.set_value(table.low_u32());
    }

    /// The image as dwords, in memory order.
    #[must_use]
    pub fn to_dwords(&self) -> [u32; 32] {
        let mut out = [MiNoop::DWORD; 32];
        out[0] = self.noop;
        out[1] = self.lri.into_bits();
        out[2] = self.ctx_timestamp.offset();
        out[3] = self.ctx_timestamp.value();
        for (i, pair) in self.pdp.iter().enumerate() {
            out[4 + 4 * i] = pair.udw.offset();
            out[5 + 4 * i] = pair.udw.value();
            out[6 + 4 * i] = pair.ldw.offset();
            out[7 + 4 * i] = pair.ldw.value();
        }
        out
    }
}

const fn pdp_pair(udw: u32, ldw: u32, table: PhysicalAddress) -> PdpPair {
    PdpPair {
        udw: LoadRegister::new(udw, table.high_u32()),
        ldw: LoadRegister::new(ldw, table.low_u32()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RENDER_RING_BASE;

    #[test]
    fn pml4_lands_in_pdp0() {
        let pml4 = PhysicalAddress::new(0x0000_0001_2345_6000);
        let ctx = PpgttContext::<RENDER_RING_BASE>::new(pml4);
        assert_eq!(ctx.pdp(0), pml4);
        assert_eq!(ctx.pdp(1), PhysicalAddress::zero());
        assert_eq!(ctx.pdp(3), PhysicalAddress::zero());

        let dw = ctx.to_dwords();
        assert_eq!(dw[1], 0x1100_1011);
        assert_eq!(&dw[2..4], &[0x23A8, 0]);
        assert_eq!(&dw[16..20], &[0x2274, 0x1, 0x2270, 0x2345_6000]);
        assert_eq!(&dw[4..8], &[0x228C, 0, 0x2288, 0]);
        assert!(dw[20..].iter().all(|d| *d == 0));
    }

    #[test]
    fn pointers_can_be_moved() {
        let mut ctx = PpgttContext::<RENDER_RING_BASE>::new(PhysicalAddress::zero());
        ctx.set_pdp(2, PhysicalAddress::new(0x7000));
        assert_eq!(ctx.pdp(2), PhysicalAddress::new(0x7000));
        assert_eq!(ctx.to_dwords()[11], 0x7000);
    }
}
