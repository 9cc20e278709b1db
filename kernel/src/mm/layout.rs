//! Physical memory map of the QEMU virt machine, as this kernel uses it.
//!
//! `KERNEL_BASE` mirrors the load address in `arch/riscv32/link.ld`; the
//! two must move together.

/// Where OpenSBI loads the kernel image.
pub const KERNEL_BASE: usize = 0x8020_0000;

/// Extent of the kernel identity map installed in every address space.
pub const KERNEL_IDENTITY_SIZE: usize = 2 * 1024 * 1024;

/// Virtual base address user images are mapped and linked at.
pub const USER_BASE: usize = 0x0100_0000;

/// MMIO window of the first virtio device on the virt machine.
pub const VIRTIO_BLK_PADDR: usize = 0x1000_1000;
