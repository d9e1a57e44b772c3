use igd::info::{EXECLIST_SUBMIT_PORT_RCS, GFX_MODE, HWS_PGA_RCS};
use igd::{Igd, PollPolicy, Submission, SubmissionConfig, SubmissionError};
use igd_context::{
    BatchLevel, ContextDescriptor, MiBatchBufferEnd, MiBatchBufferStart, RING_ELEMENT_SIZE,
    RcsContext,
};
use igd_memory::{
    DmaAllocator, GraphicsAddress, HostBackend, PAGE_SIZE, QuotaAllocator, RetryPolicy,
};
use igd_ppgtt::PageFlags;
use igd_registers::MemoryWindow;

const SCRATCH: GraphicsAddress = GraphicsAddress::new(0xdead_beef_000);

fn allocator() -> QuotaAllocator<HostBackend> {
    QuotaAllocator::new(HostBackend::new(), RetryPolicy::default())
}

#[test]
fn scratch_page_resolves_to_its_allocation() {
    let mut alloc = allocator();
    let mut submission =
        Submission::new(&mut alloc, &SubmissionConfig::default()).expect("setup");
    let scratch = alloc.alloc(PAGE_SIZE).expect("scratch page");

    let flags = PageFlags::WRITABLE
        | PageFlags::EXECUTABLE
        | PageFlags::PRIVILEGED
        | PageFlags::UNCACHED;
    submission
        .insert_translation(&mut alloc, SCRATCH, scratch.phys(), PAGE_SIZE, flags)
        .expect("map scratch");

    assert_eq!(submission.translate(SCRATCH), Some(scratch.phys()));
    assert_eq!(submission.translate(SCRATCH + 0x40), Some(scratch.phys() + 0x40));

    // remapping the same range replaces the translation
    let other = alloc.alloc(PAGE_SIZE).expect("second page");
    submission
        .insert_translation(&mut alloc, SCRATCH, other.phys(), PAGE_SIZE, flags)
        .expect("remap scratch");
    assert_eq!(submission.translate(SCRATCH), Some(other.phys()));

    submission.release(&mut alloc).expect("release");
    alloc.free(scratch).expect("free scratch");
    alloc.free(other).expect("free other");
    assert_eq!(alloc.live_buffers(), 0);
}

#[test]
fn insert_only_moves_the_tail() {
    let mut alloc = allocator();
    let mut submission =
        Submission::new(&mut alloc, &SubmissionConfig::default()).expect("setup");

    let mut before = vec![0u8; RcsContext::SIZE];
    submission.context_image().read_bytes(0, &mut before);

    submission.insert(SCRATCH).expect("room");

    let mut after = vec![0u8; RcsContext::SIZE];
    submission.context_image().read_bytes(0, &mut after);
    let changed: Vec<usize> = (0..RcsContext::SIZE)
        .filter(|&i| before[i] != after[i])
        .collect();
    assert_eq!(changed, [RcsContext::RING_TAIL_VALUE]);
    assert_eq!(submission.ring_tail(), RING_ELEMENT_SIZE);

    let element = MiBatchBufferStart::from_dwords(submission.ring_element(0));
    assert_eq!(element.batch(), SCRATCH);
    assert_eq!(element.header().level(), BatchLevel::First);
    submission.release(&mut alloc).expect("release");
}

#[test]
fn descriptor_points_at_the_status_page_of_the_image() {
    let mut alloc = allocator();
    let submission = Submission::with_elements(&mut alloc, 16).expect("setup");

    let descriptor = submission.context_descriptor(0, 1);
    assert!(descriptor.valid());
    assert_eq!(descriptor.id(), 1);
    assert_eq!(descriptor.group(), 0);
    assert_eq!(
        descriptor.lrca(),
        submission.context_image().phys() + PAGE_SIZE as u64
    );
    assert_ne!(descriptor, submission.context_descriptor(0, 2));
    submission.release(&mut alloc).expect("release");
}

#[test]
fn end_to_end_on_a_simulated_device() {
    let window = MemoryWindow::new(Igd::<MemoryWindow>::MIN_WINDOW_LEN + PAGE_SIZE);
    let igd = Igd::new(window).expect("window");
    let mut alloc = allocator();

    let status_page = alloc.alloc(PAGE_SIZE).expect("status page");
    igd.bring_up(status_page.phys());
    assert!(igd.gfx_mode().execlist_enable());
    assert_eq!(
        igd.window().writes_to(HWS_PGA_RCS.offset()),
        [status_page.phys().as_u64()]
    );
    assert_eq!(igd.window().writes_to(GFX_MODE.offset()), [0x8000_8000]);

    let mut submission =
        Submission::new(&mut alloc, &SubmissionConfig::default()).expect("setup");
    let batch = alloc.alloc(PAGE_SIZE).expect("batch");
    batch.write_u32(0, MiBatchBufferEnd.encode());
    submission
        .insert_translation(&mut alloc, SCRATCH, batch.phys(), PAGE_SIZE, PageFlags::COMMANDS)
        .expect("map batch");
    submission.insert(SCRATCH).expect("room");
    let seqno = submission.insert_fence().expect("room");

    let descriptor = submission.context_descriptor(0, 1);
    igd.submit_context(descriptor);
    assert_eq!(
        igd.window().writes_to(EXECLIST_SUBMIT_PORT_RCS.offset()),
        [
            0,
            0,
            u64::from(descriptor.high_dword()),
            u64::from(descriptor.low_dword())
        ]
    );
    assert_eq!(
        ContextDescriptor::from_dwords(descriptor.high_dword(), descriptor.low_dword()),
        descriptor
    );

    let policy = PollPolicy { max_polls: 4 };
    assert_eq!(
        submission.wait_for_fence(seqno, &policy),
        Err(SubmissionError::Timeout { seqno, polls: 4 })
    );

    // the command streamer executes the store through the PPGTT
    let fence_pa = submission
        .translate(submission.fence_address())
        .expect("fence mapped");
    let fence_ptr = alloc.phys_to_virt(fence_pa).expect("fence is DMA memory");
    unsafe { fence_ptr.cast::<u32>().write_volatile(seqno) };

    submission.wait_for_fence(seqno, &policy).expect("signaled");

    submission.release(&mut alloc).expect("release");
    alloc.free(batch).expect("free batch");
    alloc.free(status_page).expect("free status page");
    assert_eq!(alloc.live_buffers(), 0);
}
