// Boot entry point for RISC-V 32

use core::arch::global_asm;

// Include the assembly boot code
global_asm!(include_str!("boot.S"));
