//! # Submission
//!
//! A [`Submission`] ties together everything one render context needs:
//! a PPGTT, a ring buffer, the context image pointing at both, and a fence
//! page the command streamer writes sequence numbers to.
//!
//! ## Ring protocol
//!
//! Software owns the tail and hardware owns the head, both stored in the
//! context image. [`Submission::insert`] writes one 16-byte element at the
//! tail and then publishes the new tail. The tail wraps at the end of the
//! ring; an insert that would make the tail catch up with the head is
//! rejected, so one slot always stays free.
//!
//! ## Completion
//!
//! [`Submission::insert_fence`] appends an `MI_STORE_DATA_IMM` that writes
//! a sequence number to the fence page once everything before it ran.
//! [`Submission::wait_for_fence`] polls the page.

use crate::config::{PollPolicy, SubmissionConfig};
use crate::error::SubmissionError;
use core::hint::spin_loop;
use core::sync::atomic::{Ordering, fence};
use igd_context::{
    AddressSpace, ContextDescriptor, MiBatchBufferStart, MiStoreDataImm, RING_ELEMENT_SIZE,
    RcsContext, RingBufferControl, RingElement,
};
use igd_memory::{
    DmaAllocator, DmaBuffer, DmaError, GraphicsAddress, PAGE_SIZE, PhysicalAddress,
    page_align_up,
};
use igd_ppgtt::{PageFlags, TranslationTable};
use log::{debug, info, warn};

/// One render context with its ring, PPGTT and fence page.
pub struct Submission {
    ppgtt: TranslationTable,
    ring: DmaBuffer,
    context: DmaBuffer,
    fence: DmaBuffer,
    fence_address: GraphicsAddress,
    next_seqno: u32,
}

/// Ring length in bytes for at least `elements` slots.
fn ring_len(elements: usize) -> Result<usize, SubmissionError> {
    let bytes = elements
        .checked_mul(RING_ELEMENT_SIZE)
        .filter(|&bytes| bytes > 0)
        .map(page_align_up)
        .ok_or(SubmissionError::InvalidRingSize(elements))?;
    if bytes / PAGE_SIZE > RingBufferControl::MAX_PAGES {
        return Err(SubmissionError::InvalidRingSize(elements));
    }
    Ok(bytes)
}

/// Return everything allocated so far and hand back `error`.
fn unwind<A: DmaAllocator + ?Sized>(
    alloc: &mut A,
    error: SubmissionError,
    buffers: impl IntoIterator<Item = DmaBuffer>,
    ppgtt: Option<TranslationTable>,
) -> SubmissionError {
    for buffer in buffers {
        if let Err(e) = alloc.free(buffer) {
            warn!("submission: leaking buffer after failed setup: {e}");
        }
    }
    if let Some(ppgtt) = ppgtt
        && let Err(e) = ppgtt.release(alloc)
    {
        warn!("submission: leaking table pages after failed setup: {e}");
    }
    error
}

impl Submission {
    /// Allocate and initialize a submission as described by `config`.
    ///
    /// # Errors
    /// - [`SubmissionError::InvalidRingSize`] for zero elements or a ring
    ///   larger than the hardware supports.
    /// - [`SubmissionError::Allocation`] / [`SubmissionError::Translation`]
    ///   if memory runs out or the fence address cannot be mapped. Nothing
    ///   stays allocated in that case.
    pub fn new<A: DmaAllocator + ?Sized>(
        alloc: &mut A,
        config: &SubmissionConfig,
    ) -> Result<Self, SubmissionError> {
        let ring_len = ring_len(config.ring_elements)?;

        let ring = alloc.alloc(ring_len)?;
        let context = match alloc.alloc(RcsContext::SIZE) {
            Ok(context) => context,
            Err(e) => return Err(unwind(alloc, e.into(), [ring], None)),
        };
        let fence_page = match alloc.alloc(PAGE_SIZE) {
            Ok(page) => page,
            Err(e) => return Err(unwind(alloc, e.into(), [ring, context], None)),
        };
        let mut ppgtt = match TranslationTable::new(alloc) {
            Ok(ppgtt) => ppgtt,
            Err(e) => return Err(unwind(alloc, e.into(), [ring, context, fence_page], None)),
        };
        if let Err(e) = ppgtt.insert_translation(
            alloc,
            config.fence_address,
            fence_page.phys(),
            PAGE_SIZE,
            PageFlags::COHERENT,
        ) {
            return Err(unwind(
                alloc,
                e.into(),
                [ring, context, fence_page],
                Some(ppgtt),
            ));
        }

        RcsContext::init(&context, ring.phys(), ring_len, ppgtt.root());
        info!(
            "submission: context {}, ring {} ({ring_len:#x} bytes), pml4 {}",
            context.phys(),
            ring.phys(),
            ppgtt.root()
        );

        Ok(Self {
            ppgtt,
            ring,
            context,
            fence: fence_page,
            fence_address: config.fence_address,
            next_seqno: 1,
        })
    }

    /// Shorthand for a default configuration with a ring of `elements` slots.
    ///
    /// # Errors
    /// See [`new`](Self::new).
    pub fn with_elements<A: DmaAllocator + ?Sized>(
        alloc: &mut A,
        elements: usize,
    ) -> Result<Self, SubmissionError> {
        let config = SubmissionConfig {
            ring_elements: elements,
            ..SubmissionConfig::default()
        };
        Self::new(alloc, &config)
    }

    /// Map `size` bytes at `virt` in this context's address space.
    ///
    /// Mapping an already mapped range replaces the old translation.
    ///
    /// # Errors
    /// Any [`TranslationError`](igd_ppgtt::TranslationError) of the table.
    pub fn insert_translation<A: DmaAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        virt: GraphicsAddress,
        phys: PhysicalAddress,
        size: usize,
        flags: PageFlags,
    ) -> Result<(), SubmissionError> {
        self.ppgtt.insert_translation(alloc, virt, phys, size, flags)?;
        Ok(())
    }

    /// Physical address `virt` resolves to in this context's address space.
    #[must_use]
    pub fn translate(&self, virt: GraphicsAddress) -> Option<PhysicalAddress> {
        self.ppgtt.lookup(virt)
    }

    /// Queue a first-level batch buffer at `batch` (a PPGTT address).
    ///
    /// # Errors
    /// [`SubmissionError::RingFull`] if the hardware has not consumed enough
    /// of the ring.
    pub fn insert(&mut self, batch: GraphicsAddress) -> Result<(), SubmissionError> {
        debug!("submission: batch at {batch}");
        self.push(&MiBatchBufferStart::ppgtt(batch))
    }

    /// Queue a fence and return its sequence number.
    ///
    /// # Errors
    /// [`SubmissionError::RingFull`] as for [`insert`](Self::insert).
    pub fn insert_fence(&mut self) -> Result<u32, SubmissionError> {
        let seqno = self.next_seqno;
        self.push(&MiStoreDataImm::new(
            self.fence_address,
            seqno,
            AddressSpace::Ppgtt,
        ))?;
        self.next_seqno = seqno.wrapping_add(1);
        debug!("submission: fence {seqno}");
        Ok(seqno)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn push(&mut self, element: &impl RingElement) -> Result<(), SubmissionError> {
        let head = self.ring_head();
        let tail = self.ring_tail();
        let next = (tail + RING_ELEMENT_SIZE) % self.ring.len();
        // the slot holding the head is still being parsed
        let head_slot = head - head % RING_ELEMENT_SIZE;
        if next == head_slot {
            return Err(SubmissionError::RingFull {
                head: head as u32,
                tail: tail as u32,
            });
        }

        for (i, dword) in element.encode().into_iter().enumerate() {
            self.ring.write_u32(tail + i * 4, dword);
        }
        // the element must be visible before the tail that publishes it
        fence(Ordering::SeqCst);
        RcsContext::set_ring_tail(&self.context, next as u32);
        Ok(())
    }

    /// Descriptor to submit this context as `id` in `group`.
    #[must_use]
    pub fn context_descriptor(&self, group: u16, id: u32) -> ContextDescriptor {
        ContextDescriptor::for_context(group, id, self.lrca())
    }

    /// Logical ring context address: the per-process status page of the image.
    #[must_use]
    pub fn lrca(&self) -> PhysicalAddress {
        self.context.phys() + RcsContext::LRCA_OFFSET as u64
    }

    /// Ring head in bytes, as last saved by the hardware.
    #[must_use]
    pub fn ring_head(&self) -> usize {
        RcsContext::ring_head(&self.context).byte_offset() as usize % self.ring.len()
    }

    /// Ring tail in bytes.
    #[must_use]
    pub fn ring_tail(&self) -> usize {
        RcsContext::ring_tail(&self.context).byte_offset() as usize
    }

    /// Ring slot at byte offset `offset`.
    ///
    /// # Panics
    /// Panics if `offset` is not a slot boundary inside the ring.
    #[must_use]
    pub fn ring_element(&self, offset: usize) -> [u32; 4] {
        assert!(
            offset.is_multiple_of(RING_ELEMENT_SIZE),
            "ring offset {offset:#x} is not a slot boundary"
        );
        core::array::from_fn(|i| self.ring.read_u32(offset + i * 4))
    }

    #[must_use]
    pub const fn ring_buffer(&self) -> &DmaBuffer {
        &self.ring
    }

    /// The DMA buffer holding the context image.
    #[must_use]
    pub const fn context_image(&self) -> &DmaBuffer {
        &self.context
    }

    #[must_use]
    pub fn ppgtt_root(&self) -> PhysicalAddress {
        self.ppgtt.root()
    }

    #[must_use]
    pub const fn fence_address(&self) -> GraphicsAddress {
        self.fence_address
    }

    /// Last sequence number the command streamer wrote.
    #[must_use]
    pub fn completed_seqno(&self) -> u32 {
        self.fence.read_u32(0)
    }

    /// Whether the fence `seqno` (or a later one) has been reached.
    #[must_use]
    pub fn fence_signaled(&self, seqno: u32) -> bool {
        self.completed_seqno().wrapping_sub(seqno).cast_signed() >= 0
    }

    /// Poll until fence `seqno` is reached.
    ///
    /// # Errors
    /// [`SubmissionError::Timeout`] after `policy.max_polls` polls.
    pub fn wait_for_fence(&self, seqno: u32, policy: &PollPolicy) -> Result<(), SubmissionError> {
        for _ in 0..policy.max_polls {
            if self.fence_signaled(seqno) {
                return Ok(());
            }
            spin_loop();
        }
        warn!(
            "submission: fence {seqno} timed out, last completed {}",
            self.completed_seqno()
        );
        Err(SubmissionError::Timeout {
            seqno,
            polls: policy.max_polls,
        })
    }

    /// Return all memory to `alloc`.
    ///
    /// The context must no longer be in use by the hardware.
    ///
    /// # Errors
    /// The first [`DmaError`] seen; the remaining memory is still released.
    pub fn release<A: DmaAllocator + ?Sized>(self, alloc: &mut A) -> Result<(), DmaError> {
        let mut result = Ok(());
        for buffer in [self.ring, self.context, self.fence] {
            let freed = alloc.free(buffer);
            result = result.and(freed);
        }
        result.and(self.ppgtt.release(alloc))
    }
}
