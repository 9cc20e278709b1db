//! OpalOS kernel library
//!
//! A minimal cooperatively-scheduled kernel for 32-bit RISC-V (Sv32 paging)
//! running in supervisor mode on top of SBI firmware. The library holds all
//! kernel logic; the `opal-kernel` binary adds the boot path and panic
//! handler for the bare-metal target.
//!
//! # Concurrency discipline
//!
//! There is one hart and no preemption. Kernel code runs either on the boot
//! stack or on the current process's kernel stack, and control only changes
//! hands at [`sched::yield_now`]. Shared state lives behind [`spin::Mutex`]
//! statics; the rule that makes this sound is that **no lock is held across
//! a yield** — the scheduler extracts raw pointers and drops the process
//! table guard before the stack switch.

#![no_std]

// Host target: use the standard library so unit tests run under the normal
// test harness.
#[cfg(not(target_os = "none"))]
extern crate std;

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod logger;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod trap;
