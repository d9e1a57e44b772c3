//! Runtime knobs of the submission path.

use igd_memory::GraphicsAddress;

/// Parameters of a [`Submission`](crate::Submission).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SubmissionConfig {
    /// Minimum number of 16-byte ring slots; the ring is rounded up to whole pages.
    pub ring_elements: usize,
    /// Page-aligned PPGTT address of the fence page.
    pub fence_address: GraphicsAddress,
}

impl SubmissionConfig {
    pub const DEFAULT_RING_ELEMENTS: usize = 64;
    pub const DEFAULT_FENCE_ADDRESS: GraphicsAddress = GraphicsAddress::new(0x0000_7fff_ffff_f000);
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            ring_elements: Self::DEFAULT_RING_ELEMENTS,
            fence_address: Self::DEFAULT_FENCE_ADDRESS,
        }
    }
}

/// Bound on busy-polling for a fence.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PollPolicy {
    pub max_polls: u32,
}

impl PollPolicy {
    pub const DEFAULT_MAX_POLLS: u32 = 1_000_000;
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_polls: Self::DEFAULT_MAX_POLLS,
        }
    }
}
