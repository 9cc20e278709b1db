//! RISC-V context switching and the kernel-to-user transition.

use core::arch::naked_asm;

use riscv::register::{satp, sscratch};

use crate::mm::layout::USER_BASE;

/// sstatus.SPIE: enable interrupts after sret
const SSTATUS_SPIE: usize = 1 << 5;
/// sstatus.SUM: let supervisor code touch user pages
const SSTATUS_SUM: usize = 1 << 18;

/// Switch kernel stacks between two processes.
///
/// Pushes ra and s0-s11 (13 words) onto the current stack, stores the
/// resulting sp through `prev_sp`, loads the stack pointer from `next_sp`
/// and pops the same frame. Returning `ret`s on the new stack — either back
/// into a previous `switch_context` call or, for a fresh process, into
/// [`user_entry`] planted by process creation.
///
/// # Safety
///
/// `prev_sp` must point at the current process's saved-sp slot and
/// `next_sp` at a slot written by a prior call (or process creation). The
/// caller must not hold references into the current stack frame across the
/// call other than what the callee-saved convention preserves.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(prev_sp: *mut usize, next_sp: *const usize) {
    naked_asm!(
        // Save callee-saved registers onto the current stack
        "addi   sp, sp, -13 * 4",
        "sw     ra,  0  * 4(sp)",
        "sw     s0,  1  * 4(sp)",
        "sw     s1,  2  * 4(sp)",
        "sw     s2,  3  * 4(sp)",
        "sw     s3,  4  * 4(sp)",
        "sw     s4,  5  * 4(sp)",
        "sw     s5,  6  * 4(sp)",
        "sw     s6,  7  * 4(sp)",
        "sw     s7,  8  * 4(sp)",
        "sw     s8,  9  * 4(sp)",
        "sw     s9,  10 * 4(sp)",
        "sw     s10, 11 * 4(sp)",
        "sw     s11, 12 * 4(sp)",
        // Swap stack pointers: save current sp, load next sp
        "sw     sp, (a0)",
        "lw     sp, (a1)",
        // Restore callee-saved registers from the new stack
        "lw     ra,  0  * 4(sp)",
        "lw     s0,  1  * 4(sp)",
        "lw     s1,  2  * 4(sp)",
        "lw     s2,  3  * 4(sp)",
        "lw     s3,  4  * 4(sp)",
        "lw     s4,  5  * 4(sp)",
        "lw     s5,  6  * 4(sp)",
        "lw     s6,  7  * 4(sp)",
        "lw     s7,  8  * 4(sp)",
        "lw     s8,  9  * 4(sp)",
        "lw     s9,  10 * 4(sp)",
        "lw     s10, 11 * 4(sp)",
        "lw     s11, 12 * 4(sp)",
        "addi   sp, sp, 13 * 4",
        "ret",
    )
}

/// First instruction a new process ever runs.
///
/// Process creation plants this address in the return-address slot of the
/// initial context-switch frame, so the first `switch_context` to the
/// process `ret`s here and drops into user mode.
///
/// # Safety
///
/// Must only be reached through that frame, with the process's address
/// space and sscratch already installed by the scheduler.
#[unsafe(naked)]
pub unsafe extern "C" fn user_entry() -> ! {
    naked_asm!(
        "li     t0, {user_base}",
        "csrw   sepc, t0",
        "li     t0, {sstatus}",
        "csrw   sstatus, t0",
        "sret",
        user_base = const USER_BASE,
        sstatus = const SSTATUS_SPIE | SSTATUS_SUM,
    )
}

/// Install a process's address space and trap stack.
///
/// Loads satp with the Sv32 root (fenced on both sides) and parks the top
/// of the process's kernel stack in sscratch for the trap entry stub.
///
/// # Safety
///
/// `root_ppn` must be the page number of a root table that identity-maps
/// the running kernel; `kernel_stack_top` must be the top of a live,
/// otherwise-unused kernel stack.
pub unsafe fn activate_address_space(root_ppn: usize, kernel_stack_top: usize) {
    // SAFETY: per the function contract the kernel text/data stay mapped at
    // their current addresses across the satp switch, and the fences order
    // the switch against both older and newer translations.
    unsafe {
        riscv::asm::sfence_vma_all();
        satp::set(satp::Mode::Sv32, 0, root_ppn);
        riscv::asm::sfence_vma_all();
        sscratch::write(kernel_stack_top);
    }
}
