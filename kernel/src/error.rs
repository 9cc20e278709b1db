//! Kernel error types.
//!
//! Recoverable failures travel as [`KernelError`] values; subsystem
//! boundaries that the kernel cannot survive (allocator exhaustion during
//! process creation, a corrupt boot archive) convert them to `panic!`.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// The physical page allocator ran out of memory.
    OutOfMemory { requested: usize, available: usize },
    /// Every slot in the process table is occupied.
    NoFreeProcessSlots,
    /// A TAR header did not carry the `ustar` magic.
    BadArchiveMagic { offset: usize },
    /// A file in the boot archive exceeds the per-file capacity.
    FileTooLarge { size: usize, max: usize },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
            KernelError::NoFreeProcessSlots => write!(f, "no free process slots"),
            KernelError::BadArchiveMagic { offset } => {
                write!(f, "invalid tar header magic at offset {:#x}", offset)
            }
            KernelError::FileTooLarge { size, max } => {
                write!(f, "file too large: {} bytes (capacity {})", size, max)
            }
        }
    }
}
