//! The global process table and process creation.

use spin::Mutex;

use super::{Process, ProcessState, PROCS_MAX};
use crate::arch;
use crate::error::KernelError;
use crate::mm::layout::{KERNEL_BASE, KERNEL_IDENTITY_SIZE, USER_BASE, VIRTIO_BLK_PADDR};
use crate::mm::page_table::{map_page, PteFlags};
use crate::mm::{page_alloc, PhysAddr, VirtAddr, PAGE_SIZE};

/// Slot reserved for the idle process.
pub const IDLE_SLOT: usize = 0;

/// All processes plus the index of the one currently on the CPU.
pub struct ProcessTable {
    procs: [Process; PROCS_MAX],
    current: usize,
}

pub static PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

impl ProcessTable {
    pub const fn new() -> Self {
        const UNUSED: Process = Process::unused();
        Self {
            procs: [UNUSED; PROCS_MAX],
            current: IDLE_SLOT,
        }
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, slot: usize) {
        self.current = slot;
    }

    pub fn slot(&self, index: usize) -> &Process {
        &self.procs[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Process {
        &mut self.procs[index]
    }

    pub fn current_proc(&self) -> &Process {
        &self.procs[self.current]
    }

    pub fn current_proc_mut(&mut self) -> &mut Process {
        &mut self.procs[self.current]
    }

    fn find_unused(&self) -> Result<usize, KernelError> {
        self.procs
            .iter()
            .position(|p| p.state == ProcessState::Unused)
            .ok_or(KernelError::NoFreeProcessSlots)
    }

    /// Create a runnable process from a user image.
    ///
    /// An empty image is allowed: it creates a process with no user pages
    /// (the idle process is made this way) which must never actually reach
    /// user mode — the scheduler policy guarantees that.
    ///
    /// Returns the slot index. Panics when the table is full; the kernel
    /// has nothing sensible to do without a process slot.
    pub fn spawn(&mut self, image: &[u8]) -> usize {
        let slot = self.find_unused().unwrap_or_else(|e| panic!("{}", e));

        // Initial context-switch frame at the stack top: twelve zeroed
        // callee-saved slots under a return address pointing at user_entry,
        // so the first switch into this process drops straight to user mode.
        let top = self.procs[slot].stack_top();
        let mut sp = top as *mut usize;
        // SAFETY: the 13-word frame lies inside this slot's stack, which is
        // unused until the process first runs.
        unsafe {
            for _ in 0..12 {
                sp = sp.sub(1);
                sp.write(0); // s11..s0
            }
            sp = sp.sub(1);
            sp.write(arch::user_entry as usize); // ra
        }

        // Fresh address space: the kernel identity map and the virtio MMIO
        // page go into every process so the kernel keeps running (and the
        // disk driver keeps working) whichever satp is live.
        let page_table = page_alloc::alloc_pages(1);
        let mut paddr = KERNEL_BASE;
        while paddr < KERNEL_BASE + KERNEL_IDENTITY_SIZE {
            map_page(
                page_table,
                VirtAddr::new(paddr),
                PhysAddr::new(paddr),
                PteFlags::READ | PteFlags::WRITE | PteFlags::EXECUTE,
            );
            paddr += PAGE_SIZE;
        }
        map_page(
            page_table,
            VirtAddr::new(VIRTIO_BLK_PADDR),
            PhysAddr::new(VIRTIO_BLK_PADDR),
            PteFlags::READ | PteFlags::WRITE,
        );

        // Copy the user image into fresh frames, one page at a time.
        let mut off = 0;
        while off < image.len() {
            let page = page_alloc::alloc_pages(1);
            let copy_size = core::cmp::min(PAGE_SIZE, image.len() - off);

            // SAFETY: `page` is a fresh zeroed frame in the identity-mapped
            // free-RAM window and `copy_size` stays within both buffers.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    image.as_ptr().add(off),
                    page.as_usize() as *mut u8,
                    copy_size,
                );
            }
            map_page(
                page_table,
                VirtAddr::new(USER_BASE + off),
                page,
                PteFlags::USER | PteFlags::READ | PteFlags::WRITE | PteFlags::EXECUTE,
            );
            off += PAGE_SIZE;
        }

        let proc = &mut self.procs[slot];
        proc.pid = slot + 1;
        proc.state = ProcessState::Runnable;
        proc.sp = sp as usize;
        proc.page_table = page_table;
        slot
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
