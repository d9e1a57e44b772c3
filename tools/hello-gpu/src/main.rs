//! Brings up a simulated Intel IGD, submits one batch buffer and a fence
//! through an execlist context, and logs the resulting device state.
//!
//! The register window and DMA memory live on the host heap. A small
//! command streamer model executes the ring so the fence completes.

mod logger;

use crate::logger::StderrLogger;
use igd::info::{EXECLIST_STATUS_HI_RCS, RING_BUFFER_HEAD_RCS, RING_BUFFER_TAIL_RCS};
use igd::{
    DeviceIdentity, Igd, IgdError, PollPolicy, Submission, SubmissionConfig, SubmissionError,
};
use igd_context::{
    MiBatchBufferEnd, MiBatchBufferStart, MiHeader, MiOpcode, RING_ELEMENT_SIZE, RcsContext,
    RingBufferHead,
};
use igd_memory::{
    DmaAllocator, DmaError, GraphicsAddress, HostBackend, METADATA_PER_BUFFER, PAGE_SIZE,
    PhysicalAddress, QuotaAllocator, RetryPolicy,
};
use igd_ppgtt::PageFlags;
use igd_registers::MemoryWindow;
use log::{debug, error, info};
use std::process::ExitCode;

/// Simulated BAR0: 8 MiB of registers followed by 8 MiB of global GTT.
const BAR0_LEN: usize = 16 << 20;

/// Where the batch buffer is mapped in the context's address space.
const SCRATCH: GraphicsAddress = GraphicsAddress::new(0xdead_beef_000);

/// A Skylake GT2.
const IDENTITY: DeviceIdentity = DeviceIdentity {
    vendor_id: 0x8086,
    device_id: 0x1912,
    class_code: 0x03,
};

#[derive(Debug, thiserror::Error)]
enum HelloError {
    #[error(transparent)]
    Device(#[from] IgdError),
    #[error(transparent)]
    Dma(#[from] DmaError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("{0} does not fit into the global GTT")]
    OutsideGtt(PhysicalAddress),
    #[error("{0} is not mapped in the context")]
    Unmapped(GraphicsAddress),
    #[error("unknown command {header:#010x} at ring offset {offset:#x}")]
    UnknownCommand { offset: usize, header: u32 },
}

fn main() -> ExitCode {
    if let Err(e) = StderrLogger::from_env("HELLO_GPU_LOG").init() {
        eprintln!("hello-gpu: no logger: {e}");
    }
    info!("Hello GPU!");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("hello-gpu: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), HelloError> {
    let igd = Igd::probe(IDENTITY, MemoryWindow::new(BAR0_LEN))?;

    // a tight metadata quota exercises the allocator's donation path
    let backend = HostBackend::new().with_metadata_quota(2 * METADATA_PER_BUFFER);
    let mut alloc = QuotaAllocator::new(backend, RetryPolicy::default());

    let status_page = alloc.alloc(PAGE_SIZE)?;
    igd.insert_gtt_mapping(gtt_index(&igd, status_page.phys())?, status_page.phys());
    igd.bring_up(status_page.phys());

    let mut submission = Submission::new(&mut alloc, &SubmissionConfig::default())?;

    let batch = alloc.alloc(PAGE_SIZE)?;
    batch.write_u32(0, MiBatchBufferEnd.encode());
    submission.insert_translation(
        &mut alloc,
        SCRATCH,
        batch.phys(),
        PAGE_SIZE,
        PageFlags::COMMANDS,
    )?;
    submission.insert(SCRATCH)?;
    let seqno = submission.insert_fence()?;

    let descriptor = submission.context_descriptor(0, 1);
    igd.submit_context(descriptor);

    execute_ring(&igd, &submission, &alloc)?;
    submission.wait_for_fence(seqno, &PollPolicy::default())?;
    info!("fence {seqno} signaled");

    igd.log_state();
    info!(
        "allocator: {} live buffers, {} quota upgrades ({} bytes donated)",
        alloc.live_buffers(),
        alloc.backend().quota_upgrades(),
        alloc.backend().donated()
    );

    submission.release(&mut alloc)?;
    alloc.free(batch)?;
    alloc.free(status_page)?;
    Ok(())
}

/// Identity-map `pa` into the global GTT.
fn gtt_index(igd: &Igd<MemoryWindow>, pa: PhysicalAddress) -> Result<usize, HelloError> {
    usize::try_from(pa.as_u64() >> 12)
        .ok()
        .filter(|&index| index < igd.gtt_entries())
        .ok_or(HelloError::OutsideGtt(pa))
}

/// Stand-in for the render command streamer: run the ring from head to tail.
fn execute_ring(
    igd: &Igd<MemoryWindow>,
    submission: &Submission,
    alloc: &QuotaAllocator<HostBackend>,
) -> Result<(), HelloError> {
    let window = igd.window();
    let ring_len = submission.ring_buffer().len();
    let tail = submission.ring_tail();
    let mut head = submission.ring_head();

    while head != tail {
        let dwords = submission.ring_element(head);
        let header = MiHeader::from_bits(dwords[0]);
        match header.opcode() {
            op if op == MiOpcode::BatchBufferStart as u8 => {
                let start = MiBatchBufferStart::from_dwords(dwords);
                let first = read_u32(submission, alloc, start.batch())?;
                debug!("cs: batch at {} starts with {first:#010x}", start.batch());
            }
            op if op == MiOpcode::StoreDataImm as u8 => {
                let target =
                    GraphicsAddress::new((u64::from(dwords[2]) << 32) | u64::from(dwords[1]));
                write_u32(submission, alloc, target, dwords[3])?;
                debug!("cs: stored {} at {target}", dwords[3]);
            }
            op if op == MiOpcode::Noop as u8 => {}
            _ => {
                return Err(HelloError::UnknownCommand {
                    offset: head,
                    header: dwords[0],
                });
            }
        }
        head = (head + RING_ELEMENT_SIZE) % ring_len;
    }

    #[allow(clippy::cast_possible_truncation)]
    let head = RingBufferHead::new().with_head_offset((head >> 2) as u32);
    submission
        .context_image()
        .write_u32(RcsContext::RING_HEAD_VALUE, head.into_bits());

    // what the hardware would report after the switch
    window.poke_u32(RING_BUFFER_HEAD_RCS.offset(), head.into_bits());
    window.poke_u32(
        RING_BUFFER_TAIL_RCS.offset(),
        RcsContext::ring_tail(submission.context_image()).into_bits(),
    );
    window.poke_u32(EXECLIST_STATUS_HI_RCS.offset(), 1);
    Ok(())
}

fn host_pointer(
    submission: &Submission,
    alloc: &QuotaAllocator<HostBackend>,
    va: GraphicsAddress,
) -> Result<*mut u32, HelloError> {
    submission
        .translate(va)
        .and_then(|pa| alloc.phys_to_virt(pa))
        .map(|ptr| ptr.cast::<u32>().as_ptr())
        .ok_or(HelloError::Unmapped(va))
}

fn read_u32(
    submission: &Submission,
    alloc: &QuotaAllocator<HostBackend>,
    va: GraphicsAddress,
) -> Result<u32, HelloError> {
    let ptr = host_pointer(submission, alloc, va)?;
    // SAFETY: `ptr` lies inside a live DMA buffer of the allocator.
    Ok(unsafe { ptr.read_volatile() })
}

fn write_u32(
    submission: &Submission,
    alloc: &QuotaAllocator<HostBackend>,
    va: GraphicsAddress,
    value: u32,
) -> Result<(), HelloError> {
    let ptr = host_pointer(submission, alloc, va)?;
    // SAFETY: see `read_u32`.
    unsafe { ptr.write_volatile(value) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn demo_runs_to_completion() {
        let _ = StderrLogger::new(LevelFilter::Debug).init();
        run().expect("demo succeeds");
    }
}
