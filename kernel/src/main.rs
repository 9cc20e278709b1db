//! Kernel binary: the boot path for the bare-metal riscv32 target.
//!
//! The boot stub (arch/riscv32/boot.S) installs the boot stack and jumps
//! here. On the host this crate degenerates to an empty binary so that
//! `cargo test` can build the workspace.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
use core::ptr::{addr_of, addr_of_mut};

#[cfg(target_os = "none")]
use opal_kernel::{
    arch,
    drivers::virtio_blk::{self, SECTOR_SIZE},
    fs, logger,
    mm::{page_alloc, PhysAddr},
    println, process, sched,
};

#[cfg(target_os = "none")]
extern "C" {
    static mut __bss: u8;
    static __bss_end: u8;
    static __free_ram: u8;
    static __free_ram_end: u8;
    static _binary_shell_bin_start: u8;
    static _binary_shell_bin_size: u8;
}

#[cfg(target_os = "none")]
#[no_mangle]
extern "C" fn kernel_main() -> ! {
    // SAFETY: runs once, on the boot stack, before anything reads a static.
    // The symbols delimit the .bss section placed by the linker script.
    unsafe {
        let bss = addr_of_mut!(__bss);
        let bss_end = addr_of!(__bss_end);
        core::ptr::write_bytes(bss, 0, bss_end as usize - bss as usize);
    }

    println!("\n");

    arch::install_trap_vector();
    logger::init();

    // SAFETY: linker-provided bounds of the free RAM window behind the
    // kernel image.
    let (free_start, free_end) = unsafe {
        (
            addr_of!(__free_ram) as usize,
            addr_of!(__free_ram_end) as usize,
        )
    };
    page_alloc::init(PhysAddr::new(free_start), PhysAddr::new(free_end));

    virtio_blk::init();
    fs::init();

    // Exercise the disk before any process exists: print what sector 0
    // held, then stamp it.
    let mut buf = [0u8; SECTOR_SIZE];
    virtio_blk::read_sector(0, &mut buf);
    let text_len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    println!(
        "first sector: {}",
        core::str::from_utf8(&buf[..text_len]).unwrap_or("<non-utf8>")
    );

    let message = b"hello from kernel!\n";
    let mut buf = [0u8; SECTOR_SIZE];
    buf[..message.len()].copy_from_slice(message);
    virtio_blk::write_sector(0, &buf);

    {
        let mut table = process::PROCESS_TABLE.lock();

        // The idle process is the boot context: the first yield below saves
        // this stack into its slot. pid 0 keeps it out of round-robin.
        let idle = table.spawn(&[]);
        table.slot_mut(idle).pid = 0;
        table.set_current(idle);

        // SAFETY: symbols emitted by objcopy when the shell blob is linked
        // in; the linker script PROVIDEs zero defaults otherwise. The
        // symbol's address is the size value, as objcopy defines it.
        let shell = unsafe {
            let size = addr_of!(_binary_shell_bin_size) as usize;
            if size == 0 {
                &[]
            } else {
                core::slice::from_raw_parts(addr_of!(_binary_shell_bin_start), size)
            }
        };
        if shell.is_empty() {
            log::warn!("no shell image embedded; pid 1 gets an empty address space");
        }
        table.spawn(shell);
    }

    sched::yield_now();

    // Control only returns to the boot context when every user process has
    // stopped running.
    panic!("switched to idle process");
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[KERNEL PANIC] {}", info);
    arch::halt();
}

#[cfg(not(target_os = "none"))]
fn main() {}
