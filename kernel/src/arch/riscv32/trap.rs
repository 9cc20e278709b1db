// Trap entry point for RISC-V 32

use core::arch::global_asm;

// The entry stub needs explicit 4-byte alignment for stvec Direct mode, so
// it lives in an assembly file rather than a naked function.
global_asm!(include_str!("trap.S"));
