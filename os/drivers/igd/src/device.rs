//! # The Device
//!
//! [`Igd`] owns the BAR0 register window. It runs the bring-up sequence,
//! writes global GTT entries, feeds the execlist submit port and reads back
//! diagnostic registers.

use crate::error::IgdError;
use crate::info::{
    ACTHD_RCS, DISPLAY_CLASS, ERROR, ERROR_2, EXECLIST_STATUS_HI_RCS, EXECLIST_STATUS_LO_RCS,
    EXECLIST_SUBMIT_PORT_RCS, FAULT_REG, GAPS_TSV_CREDIT_DISABLE, GFX_MODE,
    GFX_MODE_EXECLIST_ENABLE, GTT_ENTRY_SIZE, GTT_OFFSET, HWS_PGA_ADDRESS, INTEL_VENDOR_ID,
    PG_ENABLE, PWR_WELL_CTL2, PWR_WELL_REQUEST, RC_CONTROL, RC_STATE, RING_BUFFER_CTL_RCS,
    RING_BUFFER_HEAD_RCS, RING_BUFFER_START_RCS, RING_BUFFER_TAIL_RCS, RP_CONTROL,
    RST_PCH_HANDSHAKE_ENABLE, TIMESTAMP_CTR,
};
use crate::status::{
    ErrorStatus, ExeclistStatus, FaultStatus, GfxMode, GgttEntry, PowerWellStatus, RingState,
};
use igd_context::{
    ContextDescriptor, RingBufferControl, RingBufferHead, RingBufferStart, RingBufferTail,
};
use igd_memory::PhysicalAddress;
use igd_registers::{MASKED_ENABLE, MmioExt, MmioWindow};
use log::{debug, info};

/// PCI identity of a candidate device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
}

/// One register write of the bring-up sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BringUpStep {
    /// Drop the driver's display power well request.
    DisableDisplayPower,
    /// Enable the reset handshake with the PCH.
    EnablePchHandshake,
    /// Clear RC6 residency state.
    ClearRc6State,
    ClearRcControl,
    ClearPowerGating,
    ClearRpControl,
    /// Point the render engine at the hardware status page.
    ProgramStatusPage,
    /// Switch the render engine to execlist submission.
    EnableExeclists,
    DisablePchHandshake,
    /// `WaEnableGapsTsvCreditFix`.
    GapsTsvCreditFix,
}

impl BringUpStep {
    /// The mandated order. Steps must not be reordered.
    pub const SEQUENCE: [Self; 10] = [
        Self::DisableDisplayPower,
        Self::EnablePchHandshake,
        Self::ClearRc6State,
        Self::ClearRcControl,
        Self::ClearPowerGating,
        Self::ClearRpControl,
        Self::ProgramStatusPage,
        Self::EnableExeclists,
        Self::DisablePchHandshake,
        Self::GapsTsvCreditFix,
    ];
}

/// An Intel integrated graphics device behind a register window.
pub struct Igd<M: MmioWindow> {
    window: M,
}

impl<M: MmioWindow> Igd<M> {
    /// Smallest window holding the register file and one GTT entry.
    pub const MIN_WINDOW_LEN: usize = GTT_OFFSET + GTT_ENTRY_SIZE;

    /// Take over `window`, which must cover registers and GTT.
    ///
    /// # Errors
    /// [`IgdError::WindowTooSmall`] if the window ends before the GTT.
    pub fn new(window: M) -> Result<Self, IgdError> {
        if window.len() < Self::MIN_WINDOW_LEN {
            return Err(IgdError::WindowTooSmall {
                required: Self::MIN_WINDOW_LEN,
                actual: window.len(),
            });
        }
        Ok(Self { window })
    }

    /// Like [`new`](Self::new), after checking the device is an Intel display controller.
    ///
    /// # Errors
    /// [`IgdError::NotAnIgd`] for any other device, or the errors of [`new`](Self::new).
    pub fn probe(identity: DeviceIdentity, window: M) -> Result<Self, IgdError> {
        if identity.vendor_id != INTEL_VENDOR_ID || identity.class_code != DISPLAY_CLASS {
            return Err(IgdError::NotAnIgd {
                vendor: identity.vendor_id,
                class: identity.class_code,
            });
        }
        let igd = Self::new(window)?;
        info!(
            "igd: device {:#06x}, {} GTT entries",
            identity.device_id,
            igd.gtt_entries()
        );
        Ok(igd)
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> &M {
        &self.window
    }

    #[must_use]
    pub fn into_window(self) -> M {
        self.window
    }

    /// Number of global GTT entries the window reaches.
    #[inline]
    #[must_use]
    pub fn gtt_entries(&self) -> usize {
        (self.window.len() - GTT_OFFSET) / GTT_ENTRY_SIZE
    }

    /// Run [`BringUpStep::SEQUENCE`] with `status_page` as the hardware status page.
    pub fn bring_up(&self, status_page: PhysicalAddress) {
        for step in BringUpStep::SEQUENCE {
            debug!("igd: bring-up {step:?}");
            self.apply(step, status_page);
        }
        info!("igd: execlists enabled, status page at {status_page}");
    }

    fn apply(&self, step: BringUpStep, status_page: PhysicalAddress) {
        let w = &self.window;
        match step {
            BringUpStep::DisableDisplayPower => w.write_field(PWR_WELL_REQUEST, 0),
            BringUpStep::EnablePchHandshake => w.write_field(RST_PCH_HANDSHAKE_ENABLE, 1),
            BringUpStep::ClearRc6State => w.write(RC_STATE, 0),
            BringUpStep::ClearRcControl => w.write(RC_CONTROL, 0),
            BringUpStep::ClearPowerGating => w.write(PG_ENABLE, 0),
            BringUpStep::ClearRpControl => w.write(RP_CONTROL, 0),
            BringUpStep::ProgramStatusPage => {
                debug_assert!(status_page.is_page_aligned(), "status page must be page aligned");
                debug_assert!(status_page.as_u64() < 1 << 32, "status page must lie below 4 GiB");
                w.write_field(HWS_PGA_ADDRESS, status_page.as_u64() >> 12);
            }
            BringUpStep::EnableExeclists => {
                // value and mask in one write; other bits keep their state
                let bits = GFX_MODE_EXECLIST_ENABLE.bits().bits(MASKED_ENABLE);
                w.write(GFX_MODE_EXECLIST_ENABLE.register(), bits);
            }
            BringUpStep::DisablePchHandshake => w.write_field(RST_PCH_HANDSHAKE_ENABLE, 0),
            BringUpStep::GapsTsvCreditFix => w.write_field(GAPS_TSV_CREDIT_DISABLE, 1),
        }
    }

    /// Map global GTT entry `index` to the page at `pa`.
    ///
    /// `index` is not validated against the GTT size; the window panics on
    /// accesses past its end.
    pub fn insert_gtt_mapping(&self, index: usize, pa: PhysicalAddress) {
        let entry = GgttEntry::mapping(pa);
        debug!("igd: ggtt[{index:#x}] = {pa}");
        self.window
            .write_u64(GTT_OFFSET + index * GTT_ENTRY_SIZE, entry.into_bits());
    }

    #[must_use]
    pub fn gtt_entry(&self, index: usize) -> GgttEntry {
        GgttEntry::from_bits(self.window.read_u64(GTT_OFFSET + index * GTT_ENTRY_SIZE))
    }

    /// Submit `primary` and `secondary` to the render engine's execlist port.
    ///
    /// The port takes the secondary descriptor first, high dword before low,
    /// then the primary; the final write triggers the context switch.
    ///
    /// # Panics
    /// Panics if `primary` is not valid or equals `secondary`.
    pub fn submit_contexts(&self, primary: ContextDescriptor, secondary: ContextDescriptor) {
        assert!(primary.valid(), "primary context descriptor must be valid");
        assert!(
            primary != secondary,
            "primary and secondary context descriptors must differ"
        );

        info!(
            "igd: submit {:#018x} / {:#018x}",
            primary.into_bits(),
            secondary.into_bits()
        );
        let port = EXECLIST_SUBMIT_PORT_RCS;
        self.window.write(port, secondary.high_dword());
        self.window.write(port, secondary.low_dword());
        self.window.write(port, primary.high_dword());
        self.window.write(port, primary.low_dword());
    }

    /// Submit a single context; the second slot gets an invalid descriptor.
    pub fn submit_context(&self, primary: ContextDescriptor) {
        self.submit_contexts(primary, ContextDescriptor::invalid());
    }

    #[must_use]
    pub fn fault_status(&self) -> FaultStatus {
        FaultStatus::from_bits(self.window.read(FAULT_REG))
    }

    #[must_use]
    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus {
            error: self.window.read(ERROR),
            error_2: self.window.read(ERROR_2),
        }
    }

    #[must_use]
    pub fn power_well_status(&self) -> PowerWellStatus {
        PowerWellStatus::from_bits(self.window.read(PWR_WELL_CTL2))
    }

    #[must_use]
    pub fn gfx_mode(&self) -> GfxMode {
        GfxMode::from_bits(self.window.read(GFX_MODE))
    }

    #[must_use]
    pub fn execlist_status(&self) -> ExeclistStatus {
        let lo = u64::from(self.window.read(EXECLIST_STATUS_LO_RCS));
        let hi = u64::from(self.window.read(EXECLIST_STATUS_HI_RCS));
        ExeclistStatus::from_bits((hi << 32) | lo)
    }

    #[must_use]
    pub fn ring_state(&self) -> RingState {
        let w = &self.window;
        RingState {
            head: RingBufferHead::from_bits(w.read(RING_BUFFER_HEAD_RCS)),
            tail: RingBufferTail::from_bits(w.read(RING_BUFFER_TAIL_RCS)),
            start: RingBufferStart::from_bits(w.read(RING_BUFFER_START_RCS)),
            control: RingBufferControl::from_bits(w.read(RING_BUFFER_CTL_RCS)),
            acthd: w.read(ACTHD_RCS) & !0b11,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.window.read(TIMESTAMP_CTR)
    }

    /// Log every diagnostic register.
    pub fn log_state(&self) {
        info!("igd: timestamp {:#010x}", self.timestamp());

        let mode = self.gfx_mode();
        info!("igd: GFX_MODE {:#010x}", mode.into_bits());
        info!("   execlist_enable:           {}", mode.execlist_enable());
        info!("   ppgtt_enable:              {}", mode.ppgtt_enable());
        info!("   virtual_addressing_enable: {}", mode.virtual_addressing_enable());
        info!("   privilege_check_disable:   {}", mode.privilege_check_disable());

        let ring = self.ring_state();
        info!(
            "igd: ring start {:#010x}, head {:#x} (wrap {}), tail {:#x}, {} pages, enabled {}",
            ring.start.starting_page() << 12,
            ring.head.byte_offset(),
            ring.head.wrap_count(),
            ring.tail.byte_offset(),
            ring.control.pages(),
            ring.control.ring_buffer_enable()
        );
        info!("igd: ACTHD {:#010x}", ring.acthd);

        let execlist = self.execlist_status();
        info!(
            "igd: EXECLIST_STATUS {:#018x} (context {:#x})",
            execlist.into_bits(),
            execlist.current_context_id()
        );

        let fault = self.fault_status();
        if fault.valid() {
            info!(
                "igd: FAULT {:?} on {:?}, source {:#x}",
                fault.fault_type(),
                fault.engine(),
                fault.source_id()
            );
        } else {
            info!("igd: FAULT_REG {:#010x}", fault.into_bits());
        }

        let errors = self.error_status();
        info!(
            "igd: ERROR {:#010x}, ERROR_2 {:#010x}",
            errors.error, errors.error_2
        );

        let power = self.power_well_status();
        info!(
            "igd: PWR_WELL_CTL2 request {}, state {}",
            power.request(),
            power.state()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{GARBCNTL, HWS_PGA_RCS, NDE_RSTWRN_OPT};
    use igd_registers::{MemoryWindow, Register, WriteRecord};

    fn device() -> Igd<MemoryWindow> {
        Igd::new(MemoryWindow::new(Igd::<MemoryWindow>::MIN_WINDOW_LEN + 0x1000))
            .expect("window is large enough")
    }

    fn dword(register: Register<u32>, value: u32) -> WriteRecord {
        WriteRecord {
            offset: register.offset(),
            value: u64::from(value),
            width: 4,
        }
    }

    #[test]
    fn window_must_reach_the_gtt() {
        let err = Igd::new(MemoryWindow::new(GTT_OFFSET)).err();
        assert_eq!(
            err,
            Some(IgdError::WindowTooSmall {
                required: GTT_OFFSET + GTT_ENTRY_SIZE,
                actual: GTT_OFFSET
            })
        );
    }

    #[test]
    fn probe_rejects_other_devices() {
        let window = MemoryWindow::new(Igd::<MemoryWindow>::MIN_WINDOW_LEN);
        let identity = DeviceIdentity {
            vendor_id: 0x1002,
            device_id: 0x1234,
            class_code: DISPLAY_CLASS,
        };
        assert_eq!(
            Igd::probe(identity, window).err(),
            Some(IgdError::NotAnIgd {
                vendor: 0x1002,
                class: DISPLAY_CLASS
            })
        );
    }

    #[test]
    fn bring_up_writes_in_order() {
        let igd = device();
        igd.window().poke_u32(NDE_RSTWRN_OPT.offset(), 0x1);
        igd.window().poke_u32(PWR_WELL_CTL2.offset(), 0xC000_0000);
        igd.window().poke_u32(GFX_MODE.offset(), 0x0000_0200);

        igd.bring_up(PhysicalAddress::new(0x0012_3000));

        let writes = igd.window().writes();
        assert_eq!(
            writes,
            [
                dword(PWR_WELL_CTL2, 0x4000_0000),
                dword(NDE_RSTWRN_OPT, 0x11),
                dword(RC_STATE, 0),
                dword(RC_CONTROL, 0),
                dword(PG_ENABLE, 0),
                dword(RP_CONTROL, 0),
                dword(HWS_PGA_RCS, 0x0012_3000),
                dword(GFX_MODE, 0x8000_8000),
                dword(NDE_RSTWRN_OPT, 0x1),
                dword(GARBCNTL, 0x80),
            ]
        );
    }

    #[test]
    fn gtt_entry_is_address_with_present_bit() {
        let igd = device();
        igd.insert_gtt_mapping(3, PhysicalAddress::new(0x0004_5000));
        assert_eq!(igd.window().read_u64(GTT_OFFSET + 3 * 8), 0x0004_5001);
        assert_eq!(igd.gtt_entry(3).address(), PhysicalAddress::new(0x0004_5000));
        assert!(!igd.gtt_entry(4).present());
    }

    #[test]
    fn submit_port_order() {
        let igd = device();
        let primary = ContextDescriptor::from_dwords(0x0000_0041, 0x0010_1119);
        let secondary = ContextDescriptor::from_dwords(0x0000_0042, 0x0020_1119);

        igd.submit_contexts(primary, secondary);

        let port = EXECLIST_SUBMIT_PORT_RCS.offset();
        assert_eq!(
            igd.window().writes_to(port),
            [0x0000_0042, 0x0020_1119, 0x0000_0041, 0x0010_1119]
        );
    }

    #[test]
    fn single_submission_pads_with_invalid() {
        let igd = device();
        let primary = ContextDescriptor::from_dwords(7, 0x0010_1119);
        igd.submit_context(primary);

        let port = EXECLIST_SUBMIT_PORT_RCS.offset();
        assert_eq!(igd.window().writes_to(port), [0, 0, 7, 0x0010_1119]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "below 4 GiB")]
    fn status_page_above_4g_is_rejected() {
        device().bring_up(PhysicalAddress::new(0x1_0012_3000));
    }

    #[test]
    #[should_panic(expected = "must be valid")]
    fn invalid_primary_is_rejected() {
        let igd = device();
        let secondary = ContextDescriptor::from_dwords(1, 0x0010_1119);
        igd.submit_contexts(ContextDescriptor::invalid(), secondary);
    }

    #[test]
    #[should_panic(expected = "must differ")]
    fn equal_descriptors_are_rejected() {
        let igd = device();
        let descriptor = ContextDescriptor::from_dwords(1, 0x0010_1119);
        igd.submit_contexts(descriptor, descriptor);
    }

    #[test]
    fn diagnostics_are_read_only() {
        let igd = device();
        igd.window().poke_u32(FAULT_REG.offset(), (2 << 1) | 1);
        igd.window().poke_u32(EXECLIST_STATUS_HI_RCS.offset(), 9);

        assert!(igd.fault_status().valid());
        assert_eq!(igd.execlist_status().current_context_id(), 9);
        assert!(igd.error_status().is_clear());
        igd.log_state();

        assert!(igd.window().writes().is_empty());
    }
}
