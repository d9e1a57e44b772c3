//! # Intel Integrated Graphics Driver
//!
//! Brings up the render engine of an Intel IGD in execlist mode and submits
//! work to it.
//!
//! - [`Igd`] wraps the BAR0 register window: bring-up, global GTT entries,
//!   the execlist submit port and register diagnostics.
//! - [`Submission`] owns one render context with its PPGTT, ring buffer and
//!   fence page, and produces the [`ContextDescriptor`] to submit.
//!
//! ```rust
//! # use igd::*;
//! # use igd_memory::*;
//! # use igd_registers::MemoryWindow;
//! let igd = Igd::new(MemoryWindow::new(Igd::<MemoryWindow>::MIN_WINDOW_LEN))?;
//! let mut alloc = QuotaAllocator::new(HostBackend::new(), RetryPolicy::default());
//!
//! let status_page = alloc.alloc(PAGE_SIZE)?;
//! igd.bring_up(status_page.phys());
//!
//! let mut submission = Submission::new(&mut alloc, &SubmissionConfig::default())?;
//! submission.insert(GraphicsAddress::new(0x1000))?;
//! igd.submit_context(submission.context_descriptor(0, 1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod config;
mod device;
mod error;
pub mod info;
mod status;
mod submission;

pub use crate::config::{PollPolicy, SubmissionConfig};
pub use crate::device::{BringUpStep, DeviceIdentity, Igd};
pub use crate::error::{IgdError, SubmissionError};
pub use crate::status::{
    ErrorStatus, ExeclistStatus, FaultEngine, FaultStatus, FaultType, GfxMode, GgttEntry,
    PowerWellStatus, RingState,
};
pub use crate::submission::Submission;
pub use igd_context::ContextDescriptor;
