//! Process model.
//!
//! A fixed table of [`PROCS_MAX`] slots. Slot 0 is the idle process (pid 0);
//! user processes get `pid = slot + 1`. Each process owns an 8 KiB kernel
//! stack that serves both the trap frame (31 words, built by the trap entry
//! stub) and the context-switch frame (13 words, built by `switch_context`).
//! The two never coexist deeper than the stack can hold: a process leaves
//! the CPU either by sret through its trap frame or by a yield that pushes
//! the switch frame below it.
//!
//! Processes are never torn down; an exited slot stays `Exited` forever.

mod table;

pub use table::{ProcessTable, IDLE_SLOT, PROCESS_TABLE};

use crate::mm::PhysAddr;

/// Maximum number of process slots, idle included.
pub const PROCS_MAX: usize = 8;

/// Size of the per-process kernel stack.
pub const KERNEL_STACK_SIZE: usize = 8192;

/// Process lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Runnable,
    Exited,
}

/// Per-process kernel stack, kept ABI-aligned so a freshly-built frame
/// starts on a 16-byte boundary.
#[repr(C, align(16))]
pub struct KernelStack([u8; KERNEL_STACK_SIZE]);

impl KernelStack {
    const fn new() -> Self {
        Self([0; KERNEL_STACK_SIZE])
    }
}

/// One process table slot.
pub struct Process {
    pub pid: usize,
    pub state: ProcessState,
    /// Kernel stack pointer saved by the last `switch_context` away from
    /// this process.
    pub sp: usize,
    /// Physical address of the Sv32 root page table.
    pub page_table: PhysAddr,
    stack: KernelStack,
}

impl Process {
    const fn unused() -> Self {
        Self {
            pid: 0,
            state: ProcessState::Unused,
            sp: 0,
            page_table: PhysAddr::new(0),
            stack: KernelStack::new(),
        }
    }

    /// Top of the kernel stack; what sscratch holds while the process runs
    /// user code.
    pub fn stack_top(&self) -> usize {
        self.stack.0.as_ptr() as usize + KERNEL_STACK_SIZE
    }
}
