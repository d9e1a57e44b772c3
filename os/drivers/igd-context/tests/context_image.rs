use igd_context::{
    ContextDescriptor, PowerClockState, RCS_CONTEXT_PAGES, RcsContext, RENDER_RING_BASE,
    RenderRingContext,
};
use igd_memory::{
    DmaAllocator, DmaBuffer, HostBackend, PAGE_SIZE, PhysicalAddress, QuotaAllocator, RetryPolicy,
};

fn context_buffer(alloc: &mut QuotaAllocator<HostBackend>) -> DmaBuffer {
    alloc.alloc(RcsContext::SIZE).unwrap()
}

fn snapshot(buffer: &DmaBuffer) -> Vec<u8> {
    let mut bytes = vec![0; buffer.len()];
    buffer.read_bytes(0, &mut bytes);
    bytes
}

#[test]
fn image_is_22_pages() {
    assert_eq!(RcsContext::SIZE, 22 * 4096);
    assert_eq!(RCS_CONTEXT_PAGES * PAGE_SIZE, RcsContext::SIZE);
    assert_eq!(RcsContext::LRCA_OFFSET, PAGE_SIZE);
    assert_eq!(RcsContext::RING_OFFSET, 2 * PAGE_SIZE);
    assert_eq!(RcsContext::PPGTT_OFFSET, 2 * PAGE_SIZE + 0x80);
    assert_eq!(RcsContext::MISC_OFFSET, 2 * PAGE_SIZE + 0x100);
}

#[test]
fn fresh_image_contents() {
    let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
    let ring = alloc.alloc(PAGE_SIZE).unwrap();
    let buffer = context_buffer(&mut alloc);
    buffer.fill(0xFF);

    let pml4 = PhysicalAddress::new(0x0020_0000);
    RcsContext::init(&buffer, ring.phys(), ring.len(), pml4);

    // status pages are cleared
    assert!(snapshot(&buffer)[..RcsContext::RING_OFFSET].iter().all(|b| *b == 0));

    let dword = |n: usize| buffer.read_u32(RcsContext::RING_OFFSET + 4 * n);
    assert_eq!(dword(0), 0);
    assert_eq!(dword(1), 0x1100_101B);
    assert_eq!(dword(2), RENDER_RING_BASE + 0x244);
    assert_eq!(dword(0x21), 0x1100_1011);
    assert_eq!(dword(0x41), 0x1100_1001);
    assert_eq!(dword(0x42), 0x20C8);
    assert_eq!(dword(0x43), 0);

    let ring_state = RcsContext::ring(&buffer);
    assert_eq!(
        ring_state,
        RenderRingContext::new(ring.phys(), ring.len())
    );
    assert_eq!(RcsContext::ppgtt(&buffer).pdp(0), pml4);
    assert_eq!(RcsContext::ring_head(&buffer).byte_offset(), 0);
    assert_eq!(RcsContext::ring_tail(&buffer).byte_offset(), 0);
}

#[test]
fn tail_update_changes_nothing_else() {
    let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
    let buffer = context_buffer(&mut alloc);
    RcsContext::init(&buffer, PhysicalAddress::new(0x10_0000), PAGE_SIZE, PhysicalAddress::new(0x20_0000));

    let before = snapshot(&buffer);
    RcsContext::set_ring_tail(&buffer, 16);
    let after = snapshot(&buffer);

    assert_eq!(RcsContext::ring_tail(&buffer).byte_offset(), 16);
    let changed: Vec<usize> = (0..before.len()).filter(|i| before[*i] != after[*i]).collect();
    assert_eq!(changed, [RcsContext::RING_TAIL_VALUE]);
}

#[test]
fn power_clock_state_is_programmable() {
    let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
    let buffer = context_buffer(&mut alloc);
    RcsContext::init(&buffer, PhysicalAddress::new(0x10_0000), PAGE_SIZE, PhysicalAddress::new(0x20_0000));
    assert_eq!(RcsContext::misc(&buffer).power_clock_state().value(), PowerClockState::new());

    let rpcs = PowerClockState::new().with_enable(true).with_slice_count_request(true).with_slice_count(1);
    RcsContext::set_power_clock_state(&buffer, rpcs);
    assert_eq!(RcsContext::misc(&buffer).power_clock_state().value(), rpcs);
}

#[test]
fn descriptor_points_at_the_status_page() {
    let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
    let buffer = context_buffer(&mut alloc);
    let lrca = buffer.phys() + RcsContext::LRCA_OFFSET as u64;
    let descriptor = ContextDescriptor::for_context(0, 1, lrca);
    assert!(descriptor.valid());
    assert_eq!(descriptor.lrca(), lrca);
}
