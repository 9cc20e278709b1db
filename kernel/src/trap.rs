//! High-level trap handling.
//!
//! The assembly stub in `arch/riscv32/trap.S` builds a [`TrapFrame`] on the
//! current process's kernel stack and calls [`handle_trap`] with a pointer
//! to it. The only trap this kernel recovers is an ecall from user mode;
//! everything else is a bug somewhere and panics with the raw CSR values.

/// Saved register state, in the exact order the trap stub stores it.
/// `sp` is the interrupted user stack pointer recovered from sscratch.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub ra: u32,
    pub gp: u32,
    pub tp: u32,
    pub t0: u32,
    pub t1: u32,
    pub t2: u32,
    pub t3: u32,
    pub t4: u32,
    pub t5: u32,
    pub t6: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub a4: u32,
    pub a5: u32,
    pub a6: u32,
    pub a7: u32,
    pub s0: u32,
    pub s1: u32,
    pub s2: u32,
    pub s3: u32,
    pub s4: u32,
    pub s5: u32,
    pub s6: u32,
    pub s7: u32,
    pub s8: u32,
    pub s9: u32,
    pub s10: u32,
    pub s11: u32,
    pub sp: u32,
}

#[cfg(target_arch = "riscv32")]
#[no_mangle]
pub extern "C" fn handle_trap(frame: *mut TrapFrame) {
    use riscv::register::{
        scause::{self, Exception, Trap},
        sepc, stval,
    };

    let scause = scause::read();
    let stval = stval::read();
    let mut user_pc = sepc::read();

    match scause.cause() {
        Trap::Exception(Exception::UserEnvCall) => {
            // SAFETY: the trap stub passes the frame it just built on the
            // current kernel stack; nothing else aliases it until we return.
            let frame = unsafe { &mut *frame };
            crate::syscall::handle_syscall(frame);
            // Resume past the ecall instruction
            user_pc += 4;
        }
        _ => panic!(
            "unexpected trap scause={:#x}, stval={:#x}, sepc={:#x}",
            scause.bits(),
            stval,
            user_pc
        ),
    }

    // sepc is consumed by the sret at the end of the trap stub; rewriting
    // it here picks the resume pc.
    sepc::write(user_pc);
}

#[cfg(test)]
mod tests {
    use core::mem::{offset_of, size_of};

    use super::*;

    #[test]
    fn test_frame_is_31_words() {
        assert_eq!(size_of::<TrapFrame>(), 31 * 4);
    }

    #[test]
    fn test_frame_layout_matches_trap_stub() {
        // Word offsets hard-coded by the sw/lw sequences in trap.S.
        assert_eq!(offset_of!(TrapFrame, ra), 4 * 0);
        assert_eq!(offset_of!(TrapFrame, gp), 4 * 1);
        assert_eq!(offset_of!(TrapFrame, tp), 4 * 2);
        assert_eq!(offset_of!(TrapFrame, t0), 4 * 3);
        assert_eq!(offset_of!(TrapFrame, t6), 4 * 9);
        assert_eq!(offset_of!(TrapFrame, a0), 4 * 10);
        assert_eq!(offset_of!(TrapFrame, a3), 4 * 13);
        assert_eq!(offset_of!(TrapFrame, a7), 4 * 17);
        assert_eq!(offset_of!(TrapFrame, s0), 4 * 18);
        assert_eq!(offset_of!(TrapFrame, s11), 4 * 29);
        assert_eq!(offset_of!(TrapFrame, sp), 4 * 30);
    }
}
