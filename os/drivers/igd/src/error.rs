use igd_memory::DmaError;
use igd_ppgtt::TranslationError;

/// Failures while attaching to the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum IgdError {
    #[error("register window of {actual:#x} bytes is smaller than the required {required:#x}")]
    WindowTooSmall { required: usize, actual: usize },
    #[error("device {vendor:#06x} (class {class:#04x}) is not an Intel display controller")]
    NotAnIgd { vendor: u16, class: u8 },
}

/// Failures of a [`Submission`](crate::Submission).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("DMA allocation failed: {0}")]
    Allocation(#[from] DmaError),
    #[error("address translation failed: {0}")]
    Translation(#[from] TranslationError),
    #[error("ring full (head {head:#x}, tail {tail:#x})")]
    RingFull { head: u32, tail: u32 },
    #[error("unsupported ring size of {0} elements")]
    InvalidRingSize(usize),
    #[error("fence {seqno} not signaled after {polls} polls")]
    Timeout { seqno: u32, polls: u32 },
}
