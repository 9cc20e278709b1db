//! Physical page-frame allocator.
//!
//! A bump allocator over the free-RAM window the linker script reserves
//! behind the kernel image. Frames are handed out zeroed and never come
//! back; the kernel's resource model is that processes do not release
//! anything.

use spin::Mutex;

use super::{PhysAddr, PAGE_SIZE};
use crate::error::KernelError;

/// Bump allocator state. Pure arithmetic; zeroing happens at the global
/// [`alloc_pages`] wrapper where the frames are actually addressable.
pub struct FrameAllocator {
    next: usize,
    end: usize,
}

impl FrameAllocator {
    /// An allocator with no memory; every allocation fails.
    pub const fn empty() -> Self {
        Self { next: 0, end: 0 }
    }

    /// Allocator over `[start, end)`. `start` is rounded up to a page
    /// boundary so every frame comes out page-aligned.
    pub fn new(start: PhysAddr, end: PhysAddr) -> Self {
        Self {
            next: super::align_up(start.as_usize(), PAGE_SIZE),
            end: end.as_usize(),
        }
    }

    /// Reserve `n` contiguous page frames.
    pub fn alloc_pages(&mut self, n: usize) -> Result<PhysAddr, KernelError> {
        let bytes = n * PAGE_SIZE;
        if self.next + bytes > self.end {
            return Err(KernelError::OutOfMemory {
                requested: bytes,
                available: self.end.saturating_sub(self.next),
            });
        }

        let frame = self.next;
        self.next += bytes;
        Ok(PhysAddr::new(frame))
    }
}

static FRAME_ALLOCATOR: Mutex<FrameAllocator> = Mutex::new(FrameAllocator::empty());

/// Hand the allocator its memory. Called once from `kernel_main` with the
/// `__free_ram` / `__free_ram_end` linker symbols.
pub fn init(start: PhysAddr, end: PhysAddr) {
    *FRAME_ALLOCATOR.lock() = FrameAllocator::new(start, end);
    log::info!(
        "mm: {} KiB of page frames at {:#x}",
        (end.as_usize() - start.as_usize()) / 1024,
        start.as_usize()
    );
}

/// Allocate `n` zeroed, page-aligned physical pages.
///
/// Panics when the free-RAM window is exhausted; the kernel has no way to
/// recover from that.
pub fn alloc_pages(n: usize) -> PhysAddr {
    let frame = FRAME_ALLOCATOR
        .lock()
        .alloc_pages(n)
        .unwrap_or_else(|e| panic!("{}", e));

    // SAFETY: the frame range was just reserved from the free-RAM window,
    // which the kernel owns and which every address space identity-maps, so
    // nothing else aliases it yet.
    unsafe {
        core::ptr::write_bytes(frame.as_usize() as *mut u8, 0, n * PAGE_SIZE);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_page_aligned_and_monotonic() {
        let mut alloc = FrameAllocator::new(
            PhysAddr::new(0x8040_0100),
            PhysAddr::new(0x8040_0100 + 8 * PAGE_SIZE),
        );

        let a = alloc.alloc_pages(1).unwrap();
        let b = alloc.alloc_pages(2).unwrap();
        let c = alloc.alloc_pages(1).unwrap();

        assert!(a.is_page_aligned());
        assert!(b.is_page_aligned());
        assert!(c.is_page_aligned());
        assert_eq!(b.as_usize(), a.as_usize() + PAGE_SIZE);
        assert_eq!(c.as_usize(), b.as_usize() + 2 * PAGE_SIZE);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut alloc =
            FrameAllocator::new(PhysAddr::new(0x8040_0000), PhysAddr::new(0x8040_0000 + PAGE_SIZE));

        alloc.alloc_pages(1).unwrap();
        let err = alloc.alloc_pages(1).unwrap_err();
        assert!(matches!(err, KernelError::OutOfMemory { .. }));
    }

    #[test]
    fn test_empty_allocator_always_fails() {
        let mut alloc = FrameAllocator::empty();
        assert!(alloc.alloc_pages(1).is_err());
    }
}
