//! Cooperative round-robin scheduler.
//!
//! Single hart, no preemption: the CPU changes hands only inside
//! [`yield_now`]. Selection walks the table starting after the current
//! process (by pid, modulo the table size) and takes the first runnable
//! user process; with none runnable it falls back to the idle slot, which
//! resumes the boot context inside `kernel_main`'s final yield.

use crate::arch;
use crate::mm::PAGE_SIZE;
use crate::process::{ProcessState, ProcessTable, IDLE_SLOT, PROCESS_TABLE, PROCS_MAX};

/// Pick the slot to run next. Pure policy; no side effects.
///
/// The idle process (pid 0) is only ever chosen when no user process is
/// runnable.
pub fn pick_next(table: &ProcessTable) -> usize {
    let current_pid = table.current_proc().pid;
    for i in 0..PROCS_MAX {
        let slot = (current_pid + i) % PROCS_MAX;
        let proc = table.slot(slot);
        if proc.state == ProcessState::Runnable && proc.pid > 0 {
            return slot;
        }
    }
    IDLE_SLOT
}

/// Voluntarily hand the CPU to the next runnable process.
///
/// Installs the successor's address space and trap stack, then swaps kernel
/// stacks. Returns when some later yield switches back here. The process
/// table lock is released before the switch — holding it across the stack
/// swap would deadlock the successor.
pub fn yield_now() {
    let (prev_sp, next_sp, root_ppn, stack_top) = {
        let mut table = PROCESS_TABLE.lock();
        let next = pick_next(&table);
        if next == table.current_slot() {
            return;
        }

        let prev = table.current_slot();
        table.set_current(next);

        let root_ppn = table.slot(next).page_table.as_usize() / PAGE_SIZE;
        let stack_top = table.slot(next).stack_top();
        let prev_sp: *mut usize = &mut table.slot_mut(prev).sp;
        let next_sp: *const usize = &table.slot(next).sp;
        (prev_sp, next_sp, root_ppn, stack_top)
    };

    // SAFETY: the saved-sp slots live in the static process table and slots
    // are never recycled, so the raw pointers stay valid after the guard is
    // dropped. `next` was selected Runnable: its sp holds either the frame
    // planted at creation or one saved by a previous switch. The new root
    // table identity-maps the kernel, so execution continues across the
    // satp change.
    unsafe {
        arch::activate_address_space(root_ppn, stack_top);
        arch::switch_context(prev_sp, next_sp);
    }
}

#[cfg(test)]
mod tests {
    use std::boxed::Box;

    use super::*;

    /// Table with the idle process in slot 0 and user processes (with
    /// `pid = slot + 1`) in the given slots, current at `current`.
    fn table_with(runnable: &[usize], current: usize) -> Box<ProcessTable> {
        let mut table = Box::new(ProcessTable::new());
        table.slot_mut(IDLE_SLOT).state = ProcessState::Runnable;
        for &slot in runnable {
            let proc = table.slot_mut(slot);
            proc.pid = slot + 1;
            proc.state = ProcessState::Runnable;
        }
        table.set_current(current);
        table
    }

    #[test]
    fn test_round_robin_alternates_between_two_processes() {
        let mut table = table_with(&[1, 2], 1);
        assert_eq!(pick_next(&table), 2);

        table.set_current(2);
        assert_eq!(pick_next(&table), 1);
    }

    #[test]
    fn test_idle_only_when_nothing_runnable() {
        let mut table = table_with(&[1], 1);
        // The only user process is current; it stays selected.
        assert_eq!(pick_next(&table), 1);

        table.slot_mut(1).state = ProcessState::Exited;
        assert_eq!(pick_next(&table), IDLE_SLOT);
    }

    #[test]
    fn test_idle_never_selected_while_user_runnable() {
        // Current is idle; a runnable user process must win.
        let table = table_with(&[3], IDLE_SLOT);
        assert_eq!(pick_next(&table), 3);
    }

    #[test]
    fn test_exited_process_is_skipped() {
        let mut table = table_with(&[1, 2, 3], 1);
        table.slot_mut(2).state = ProcessState::Exited;
        assert_eq!(pick_next(&table), 3);

        table.set_current(3);
        assert_eq!(pick_next(&table), 1);
    }

    #[test]
    fn test_selection_wraps_around_the_table() {
        let table = table_with(&[1, PROCS_MAX - 1], PROCS_MAX - 1);
        assert_eq!(pick_next(&table), 1);
    }
}
