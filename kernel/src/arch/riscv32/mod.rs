//! RISC-V 32 architecture support: boot stub, trap entry, context switch
//! and SBI console access.

pub mod boot;
pub mod context;
pub mod sbi;
pub mod trap;

pub use context::{activate_address_space, switch_context, user_entry};

/// Write a byte to the SBI console.
pub fn console_putchar(ch: u8) {
    sbi::console_putchar(ch);
}

/// Poll the SBI console. Negative means no character is pending.
pub fn console_getchar() -> isize {
    sbi::console_getchar()
}

/// Point `stvec` at the trap entry stub.
pub fn install_trap_vector() {
    use riscv::register::stvec::{self, TrapMode};

    extern "C" {
        fn kernel_entry();
    }

    // SAFETY: kernel_entry is the assembly trap stub in trap.S; it is
    // 4-byte aligned as Direct mode requires and preserves all register
    // state around handle_trap.
    unsafe {
        stvec::write(kernel_entry as usize, TrapMode::Direct);
    }
}

/// Stop the hart. Only a reset brings it back.
pub fn halt() -> ! {
    loop {
        // SAFETY: wfi merely parks the hart until an interrupt; with no
        // interrupts enabled this loops forever, which is the point.
        unsafe { core::arch::asm!("wfi") };
    }
}
