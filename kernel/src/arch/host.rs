//! Host stand-ins for the architecture layer.
//!
//! Unit tests exercise the pure kernel logic on the build machine; nothing
//! here may actually reach a context switch or an address-space install, so
//! those entry points abort loudly instead of pretending.

/// Write a byte to stdout.
pub fn console_putchar(ch: u8) {
    use std::io::Write;
    std::io::stdout().write_all(&[ch]).ok();
}

/// No console input on the host; always report "no character pending".
pub fn console_getchar() -> isize {
    -1
}

pub fn install_trap_vector() {
    unreachable!("trap vectors exist only on riscv32");
}

pub fn halt() -> ! {
    unreachable!("halt is only meaningful on riscv32");
}

/// # Safety
///
/// Never sound to call on the host; present only so callers typecheck.
pub unsafe extern "C" fn user_entry() -> ! {
    unreachable!("user_entry is only meaningful on riscv32");
}

/// # Safety
///
/// Never sound to call on the host; present only so callers typecheck.
pub unsafe fn switch_context(_prev_sp: *mut usize, _next_sp: *const usize) {
    unreachable!("context switches exist only on riscv32");
}

/// # Safety
///
/// Never sound to call on the host; present only so callers typecheck.
pub unsafe fn activate_address_space(_root_ppn: usize, _kernel_stack_top: usize) {
    unreachable!("address spaces exist only on riscv32");
}
