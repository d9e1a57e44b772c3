bitflags::bitflags! {
    /// Access and caching attributes of a PPGTT mapping.
    ///
    /// The empty set is a read-only, non-executable, unprivileged,
    /// write-back mapping.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PageFlags: u32 {
        /// The GPU may write through the mapping.
        const WRITABLE       = 1 << 0;

        /// The command streamer may fetch commands or batches from it.
        const EXECUTABLE     = 1 << 1;

        /// Only privileged (ring-level) accesses are allowed.
        const PRIVILEGED     = 1 << 2;

        /// Survives translation cache flushes on context switch.
        const GLOBAL         = 1 << 3;

        /// Maps device memory; implies [`UNCACHED`](Self::UNCACHED).
        const DEVICE         = 1 << 4;

        /// Writes are combined and bypass the cache.
        const WRITE_COMBINED = 1 << 5;

        /// Caching disabled.
        const UNCACHED       = 1 << 6;
    }
}

impl PageFlags {
    /// Read/write data shared with the CPU.
    pub const DATA: Self = Self::WRITABLE;

    /// Ring buffers and batches: readable and executable by the command streamer.
    pub const COMMANDS: Self = Self::EXECUTABLE.union(Self::PRIVILEGED);

    /// Pages the GPU writes and the CPU polls, such as fences.
    pub const COHERENT: Self = Self::WRITABLE.union(Self::UNCACHED);
}
