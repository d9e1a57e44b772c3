use igd_memory::{
    DmaAllocator, DmaError, GraphicsAddress, HostBackend, PAGE_SIZE, PhysicalAddress,
    QuotaAllocator, RetryPolicy,
};
use igd_ppgtt::{PageFlags, TranslationError, TranslationTable};

fn allocator() -> QuotaAllocator<HostBackend> {
    QuotaAllocator::new(HostBackend::new(), RetryPolicy::default())
}

#[test]
fn scratch_page_lookup() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    let scratch = alloc.alloc(PAGE_SIZE).unwrap();

    let va = GraphicsAddress::new(0xdead_beef_000);
    ppgtt
        .insert_translation(&mut alloc, va, scratch.phys(), PAGE_SIZE, PageFlags::DATA)
        .unwrap();

    assert_eq!(ppgtt.lookup(va), Some(scratch.phys()));
    assert_eq!(ppgtt.lookup(va + 0xABC), Some(scratch.phys() + 0xABC));
    assert_eq!(ppgtt.lookup(va + PAGE_SIZE as u64), None);
    // root + one table per lower level
    assert_eq!(ppgtt.table_pages(), 4);
    assert_eq!(ppgtt.mapped_pages(), 1);
}

#[test]
fn tables_are_reachable_through_the_allocator() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    let va = GraphicsAddress::new(0x0000_1234_5678_9000);
    let pa = PhysicalAddress::new(0x4000_0000);
    ppgtt
        .insert_translation(&mut alloc, va, pa, PAGE_SIZE, PageFlags::COMMANDS)
        .unwrap();

    // Walk the tree by hand the way the GPU would.
    let mut table = ppgtt.root();
    for index in igd_ppgtt::split_indices(va) {
        let virt = alloc.phys_to_virt(table).unwrap();
        // SAFETY: table pages are live DMA pages of the allocator.
        let raw = unsafe { virt.cast::<u64>().add(index).read() };
        assert_eq!(raw & 1, 1, "entry not present");
        table = PhysicalAddress::new(raw & 0x000F_FFFF_FFFF_F000);
    }
    assert_eq!(table, pa);
}

#[test]
fn multi_page_ranges_are_fully_mapped() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    // crosses a last-level table boundary
    let va = GraphicsAddress::new(0x1F_E000);
    let pa = PhysicalAddress::new(0x80_0000);
    ppgtt
        .insert_translation(&mut alloc, va, pa, 4 * PAGE_SIZE, PageFlags::DATA)
        .unwrap();

    for page in 0..4u64 {
        let offset = page * PAGE_SIZE as u64;
        assert_eq!(ppgtt.lookup(va + offset), Some(pa + offset));
    }
    assert_eq!(ppgtt.mapped_pages(), 4);
    assert_eq!(ppgtt.table_pages(), 5);
}

#[test]
fn remapping_replaces_the_entry() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    let va = GraphicsAddress::new(0x10_0000);

    ppgtt
        .insert_translation(&mut alloc, va, PhysicalAddress::new(0x1000), 1, PageFlags::DATA)
        .unwrap();
    ppgtt
        .insert_translation(&mut alloc, va, PhysicalAddress::new(0x2000), 1, PageFlags::COHERENT)
        .unwrap();

    assert_eq!(ppgtt.lookup(va), Some(PhysicalAddress::new(0x2000)));
    assert_eq!(ppgtt.entry(va).unwrap().flags(), PageFlags::COHERENT);
    assert_eq!(ppgtt.mapped_pages(), 1);
}

#[test]
fn removal_clears_leaves_only() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    let va = GraphicsAddress::new(0x40_0000);
    ppgtt
        .insert_translation(&mut alloc, va, PhysicalAddress::new(0x9000), 2 * PAGE_SIZE, PageFlags::DATA)
        .unwrap();

    assert_eq!(ppgtt.remove_translation(va, PAGE_SIZE), 1);
    assert_eq!(ppgtt.lookup(va), None);
    assert_eq!(ppgtt.lookup(va + PAGE_SIZE as u64), Some(PhysicalAddress::new(0xA000)));
    assert_eq!(ppgtt.remove_translation(va, 2 * PAGE_SIZE), 1);
    assert_eq!(ppgtt.remove_translation(GraphicsAddress::new(0x7000_0000), PAGE_SIZE), 0);
    assert_eq!(ppgtt.mapped_pages(), 0);
    assert_eq!(ppgtt.table_pages(), 4);
}

#[test]
fn invalid_requests_are_rejected() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    let pa = PhysicalAddress::new(0x1000);

    assert_eq!(
        ppgtt.insert_translation(&mut alloc, GraphicsAddress::new(0x1000), pa, 0, PageFlags::DATA),
        Err(TranslationError::ZeroSize)
    );
    assert_eq!(
        ppgtt.insert_translation(&mut alloc, GraphicsAddress::new(0x1010), pa, 1, PageFlags::DATA),
        Err(TranslationError::Unaligned {
            virt: GraphicsAddress::new(0x1010),
            phys: pa
        })
    );
    assert_eq!(
        ppgtt.insert_translation(
            &mut alloc,
            GraphicsAddress::new(1 << 48),
            pa,
            PAGE_SIZE,
            PageFlags::DATA
        ),
        Err(TranslationError::NotTranslatable(GraphicsAddress::new(1 << 48)))
    );
    assert_eq!(
        ppgtt.insert_translation(
            &mut alloc,
            GraphicsAddress::new(0x1000),
            pa,
            usize::MAX,
            PageFlags::DATA
        ),
        Err(TranslationError::NotTranslatable(GraphicsAddress::new(0x1000)))
    );
    assert_eq!(ppgtt.mapped_pages(), 0);
}

#[test]
fn table_allocation_failure_is_reported() {
    let backend = HostBackend::new().with_memory_limit(2 * PAGE_SIZE);
    let mut alloc = QuotaAllocator::new(backend, RetryPolicy::default());
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();

    let err = ppgtt
        .insert_translation(
            &mut alloc,
            GraphicsAddress::new(0x1000),
            PhysicalAddress::new(0x1000),
            PAGE_SIZE,
            PageFlags::DATA,
        )
        .unwrap_err();
    assert_eq!(
        err,
        TranslationError::OutOfMemory(DmaError::OutOfMemory { size: PAGE_SIZE })
    );
}

#[test]
fn release_returns_every_table_page() {
    let mut alloc = allocator();
    let mut ppgtt = TranslationTable::new(&mut alloc).unwrap();
    for i in 0..8u64 {
        ppgtt
            .insert_translation(
                &mut alloc,
                GraphicsAddress::new(i << 30),
                PhysicalAddress::new(0x1000),
                PAGE_SIZE,
                PageFlags::DATA,
            )
            .unwrap();
    }
    assert!(alloc.live_buffers() > 1);
    ppgtt.release(&mut alloc).unwrap();
    assert_eq!(alloc.live_buffers(), 0);
}
