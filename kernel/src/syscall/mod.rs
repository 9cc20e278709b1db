//! System call interface.
//!
//! User programs trap in with the syscall number in a3 and arguments in
//! a0..a2; the result goes back in a0. File name and buffer arguments are
//! raw pointers into the calling process's address space, dereferenced
//! while that address space is active. They are not validated: a bad
//! pointer faults in supervisor mode and panics the kernel, which is the
//! documented trust model of this system.

use crate::arch;
use crate::fs::{self, FILE_DATA_MAX, FILE_NAME_MAX};
use crate::process::{ProcessState, PROCESS_TABLE};
use crate::sched;
use crate::trap::TrapFrame;

/// System call numbers (passed in a3)
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    PutChar = 1,
    GetChar = 2,
    ReadFile = 3,
    WriteFile = 4,
    Exit = 5,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::PutChar),
            2 => Ok(Syscall::GetChar),
            3 => Ok(Syscall::ReadFile),
            4 => Ok(Syscall::WriteFile),
            5 => Ok(Syscall::Exit),
            _ => Err(()),
        }
    }
}

/// Dispatch an ecall from user mode.
pub fn handle_syscall(frame: &mut TrapFrame) {
    let syscall = Syscall::try_from(frame.a3 as usize)
        .unwrap_or_else(|_| panic!("unexpected syscall a3={:#x}", frame.a3));

    match syscall {
        Syscall::PutChar => arch::console_putchar(frame.a0 as u8),

        Syscall::GetChar => loop {
            let ch = arch::console_getchar();
            if ch >= 0 {
                frame.a0 = ch as u32;
                break;
            }
            // Nothing pending; let somebody else run before polling again.
            sched::yield_now();
        },

        Syscall::ReadFile | Syscall::WriteFile => file_syscall(frame, syscall),

        Syscall::Exit => {
            let pid = {
                let mut table = PROCESS_TABLE.lock();
                let current = table.current_proc_mut();
                current.state = ProcessState::Exited;
                current.pid
            };
            println!("process {} exited", pid);
            sched::yield_now();
            // The slot is Exited, so the scheduler can never come back.
            panic!("unreachable");
        }
    }
}

fn file_syscall(frame: &mut TrapFrame, syscall: Syscall) {
    let mut name_buf = [0u8; FILE_NAME_MAX];
    // SAFETY: a0 is the caller's NUL-terminated file name; the caller's
    // address space is active and the read is capped at the name buffer.
    let name = unsafe { read_user_cstr(frame.a0 as usize as *const u8, &mut name_buf) };

    let mut fs = fs::FILE_SYSTEM.lock();
    let Some(file) = fs.lookup_mut(name) else {
        println!(
            "file not found: {}",
            core::str::from_utf8(name).unwrap_or("<non-utf8>")
        );
        frame.a0 = -1i32 as u32;
        return;
    };

    let mut len = frame.a2 as usize;
    if len > FILE_DATA_MAX {
        // Requests past the slot capacity fall back to the file's current
        // size.
        len = file.size();
    }

    if syscall == Syscall::WriteFile {
        // SAFETY: a1 points at `len` readable bytes in the caller's address
        // space; len is at most the slot capacity after the clamp above.
        let buf = unsafe { core::slice::from_raw_parts(frame.a1 as usize as *const u8, len) };
        file.set_content(buf);
        drop(fs);
        // Persist synchronously so the write is durable (and visible to
        // every process) before the syscall returns.
        fs::flush();
        frame.a0 = len as u32;
    } else {
        let len = core::cmp::min(len, file.size());
        // SAFETY: a1 points at `len` writable bytes in the caller's address
        // space.
        let buf = unsafe { core::slice::from_raw_parts_mut(frame.a1 as usize as *mut u8, len) };
        buf.copy_from_slice(&file.data()[..len]);
        frame.a0 = len as u32;
    }
}

/// Copy a NUL-terminated name out of the current user address space.
///
/// # Safety
///
/// `ptr` must be readable through the active address space up to the NUL
/// terminator or `FILE_NAME_MAX` bytes, whichever comes first.
unsafe fn read_user_cstr<'a>(ptr: *const u8, buf: &'a mut [u8; FILE_NAME_MAX]) -> &'a [u8] {
    let mut len = 0;
    while len < FILE_NAME_MAX {
        // SAFETY: bounded by the caller's contract.
        let byte = unsafe { ptr.add(len).read() };
        if byte == 0 {
            break;
        }
        buf[len] = byte;
        len += 1;
    }
    &buf[..len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_numbers() {
        assert_eq!(Syscall::try_from(1), Ok(Syscall::PutChar));
        assert_eq!(Syscall::try_from(2), Ok(Syscall::GetChar));
        assert_eq!(Syscall::try_from(3), Ok(Syscall::ReadFile));
        assert_eq!(Syscall::try_from(4), Ok(Syscall::WriteFile));
        assert_eq!(Syscall::try_from(5), Ok(Syscall::Exit));
        assert_eq!(Syscall::try_from(0), Err(()));
        assert_eq!(Syscall::try_from(6), Err(()));
    }

    #[test]
    fn test_read_user_cstr_stops_at_nul() {
        let mut buf = [0u8; FILE_NAME_MAX];
        let source = b"hello.txt\0junk";
        // SAFETY: `source` is a valid NUL-terminated buffer on the host.
        let name = unsafe { read_user_cstr(source.as_ptr(), &mut buf) };
        assert_eq!(name, b"hello.txt");
    }

    #[test]
    fn test_read_user_cstr_caps_at_name_len() {
        let mut buf = [0u8; FILE_NAME_MAX];
        let source = [b'a'; 2 * FILE_NAME_MAX];
        // SAFETY: `source` is longer than the cap, so reads stay in bounds.
        let name = unsafe { read_user_cstr(source.as_ptr(), &mut buf) };
        assert_eq!(name.len(), FILE_NAME_MAX);
    }
}
