//! Legacy virtio-blk MMIO driver (virtio 0.9.5 layout).
//!
//! One virtqueue, one request in flight, synchronous completion. Every
//! transfer is a three-descriptor chain in slots [0,1,2]: device-readable
//! header, the 512-byte data buffer, and a device-written status byte.
//! Pinning the chain to fixed slots sidesteps descriptor free-list
//! bookkeeping entirely — the device matches on the head index published in
//! the available ring, and the avail/used counters still advance normally.
//!
//! The busy-wait on the used ring is deliberate: the backing device is an
//! emulated disk that completes in microseconds, and this driver runs with
//! no interrupts.

use core::mem::{offset_of, size_of};
use core::ptr::{addr_of, read_volatile, write_volatile};
use core::sync::atomic::{fence, Ordering};

use bitflags::bitflags;
use spin::Mutex;

use crate::mm::{align_up, layout::VIRTIO_BLK_PADDR, page_alloc, PAGE_SIZE};

/// Disk sector size.
pub const SECTOR_SIZE: usize = 512;

/// Descriptors per virtqueue.
pub const VIRTQ_ENTRY_NUM: usize = 16;

/// "virt" in little-endian.
const VIRTIO_MAGIC: u32 = 0x7472_6976;

/// Device id of a block device.
const VIRTIO_DEVICE_BLK: u32 = 2;

/// MMIO register offsets (bytes from the device base), legacy interface.
pub mod reg {
    pub const MAGIC: usize = 0x000;
    pub const VERSION: usize = 0x004;
    pub const DEVICE_ID: usize = 0x008;
    pub const DEVICE_FEATURES: usize = 0x010;
    pub const DRIVER_FEATURES: usize = 0x020;
    pub const QUEUE_SEL: usize = 0x030;
    pub const QUEUE_NUM_MAX: usize = 0x034;
    pub const QUEUE_NUM: usize = 0x038;
    pub const QUEUE_ALIGN: usize = 0x03c;
    pub const QUEUE_PFN: usize = 0x040;
    pub const QUEUE_NOTIFY: usize = 0x050;
    pub const DEVICE_STATUS: usize = 0x070;
    pub const DEVICE_CONFIG: usize = 0x100;
}

bitflags! {
    /// Device status register bits.
    #[derive(Debug, Clone, Copy)]
    pub struct DeviceStatus: u32 {
        const ACKNOWLEDGE = 1;
        const DRIVER      = 2;
        const DRIVER_OK   = 4;
        const FEATURES_OK = 8;
    }
}

bitflags! {
    /// Descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescFlags: u16 {
        /// Chained to the descriptor in `next`.
        const NEXT  = 1;
        /// Device writes to this buffer (as opposed to reading it).
        const WRITE = 2;
    }
}

/// Request types
const VIRTIO_BLK_T_IN: u32 = 0;
const VIRTIO_BLK_T_OUT: u32 = 1;

/// A single descriptor, from the spec.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VirtqDesc {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

/// The available ring: the driver publishes chain heads here.
#[repr(C)]
pub struct VirtqAvail {
    pub flags: u16,
    pub index: u16,
    pub ring: [u16; VIRTQ_ENTRY_NUM],
    pub used_event: u16,
}

/// One used-ring entry: the device reports a completed chain head.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VirtqUsedElem {
    pub id: u32,
    pub len: u32,
}

/// The used ring, page-aligned as the legacy layout requires.
#[repr(C, align(4096))]
pub struct VirtqUsed {
    pub flags: u16,
    pub index: u16,
    pub ring: [VirtqUsedElem; VIRTQ_ENTRY_NUM],
}

/// The whole virtqueue: descriptor table, avail ring, then the used ring
/// on the next page boundary. Lives in frames from the page allocator and
/// is shared with the device, so the layout is exactly the legacy wire
/// format.
#[repr(C)]
pub struct Virtq {
    pub descs: [VirtqDesc; VIRTQ_ENTRY_NUM],
    pub avail: VirtqAvail,
    pub used: VirtqUsed,
}

/// The single block request, staged in its own DMA page: device-readable
/// header (16 bytes), sector data, device-written status.
#[repr(C)]
pub struct BlkRequest {
    pub request_type: u32,
    pub reserved: u32,
    pub sector: u64,
    pub data: [u8; SECTOR_SIZE],
    pub status: u8,
}

/// Device-readable prefix of [`BlkRequest`]: type, reserved, sector.
pub const BLK_REQUEST_HEADER_LEN: u32 = 16;

fn reg_read32(offset: usize) -> u32 {
    // SAFETY: offset selects a register inside the virtio MMIO window,
    // which is mapped in every address space.
    unsafe { read_volatile((VIRTIO_BLK_PADDR + offset) as *const u32) }
}

fn reg_read64(offset: usize) -> u64 {
    // SAFETY: as reg_read32; the config space is device memory readable in
    // two word-sized halves.
    unsafe { read_volatile((VIRTIO_BLK_PADDR + offset) as *const u64) }
}

fn reg_write32(offset: usize, value: u32) {
    // SAFETY: as reg_read32.
    unsafe { write_volatile((VIRTIO_BLK_PADDR + offset) as *mut u32, value) }
}

fn reg_fetch_and_or32(offset: usize, value: u32) {
    reg_write32(offset, reg_read32(offset) | value);
}

/// Build the 3-descriptor request chain in slots [0,1,2].
///
/// d0: header (device reads), d1: data (device writes on a device-to-host
/// transfer), d2: status byte (device writes).
fn fill_request_chain(descs: &mut [VirtqDesc; VIRTQ_ENTRY_NUM], req_paddr: usize, is_write: bool) {
    descs[0] = VirtqDesc {
        addr: req_paddr as u64,
        len: BLK_REQUEST_HEADER_LEN,
        flags: DescFlags::NEXT.bits(),
        next: 1,
    };

    let data_flags = if is_write {
        DescFlags::NEXT
    } else {
        DescFlags::NEXT | DescFlags::WRITE
    };
    descs[1] = VirtqDesc {
        addr: (req_paddr + offset_of!(BlkRequest, data)) as u64,
        len: SECTOR_SIZE as u32,
        flags: data_flags.bits(),
        next: 2,
    };

    descs[2] = VirtqDesc {
        addr: (req_paddr + offset_of!(BlkRequest, status)) as u64,
        len: 1,
        flags: DescFlags::WRITE.bits(),
        next: 0,
    };
}

/// Publish chain head `head` on the available ring. The fence orders the
/// ring slot write before the index bump the device polls on.
fn push_avail(avail: &mut VirtqAvail, head: u16) {
    avail.ring[avail.index as usize % VIRTQ_ENTRY_NUM] = head;
    fence(Ordering::SeqCst);
    avail.index = avail.index.wrapping_add(1);
}

/// Driver state for the one virtio-blk device.
pub struct VirtioBlk {
    virtq: *mut Virtq,
    req: *mut BlkRequest,
    req_paddr: usize,
    /// Disk capacity in bytes.
    capacity: u64,
    queue_index: u32,
    /// Next used-ring index the driver expects the device to reach.
    last_used_index: u16,
}

// SAFETY: the raw pointers target allocator-owned DMA pages that only this
// driver touches, and the kernel is single-hart with the device behind the
// global mutex.
unsafe impl Send for VirtioBlk {}

static BLK_DEVICE: Mutex<Option<VirtioBlk>> = Mutex::new(None);

/// Probe and initialize the device behind [`VIRTIO_BLK_PADDR`].
///
/// Follows the legacy initialization sequence to the letter; any identity
/// mismatch panics since the kernel is useless without its disk.
pub fn init() {
    if reg_read32(reg::MAGIC) != VIRTIO_MAGIC {
        panic!("virtio: invalid magic value");
    }
    if reg_read32(reg::VERSION) != 1 {
        panic!("virtio: invalid version");
    }
    if reg_read32(reg::DEVICE_ID) != VIRTIO_DEVICE_BLK {
        panic!("virtio: invalid device id");
    }

    // Device initialization sequence (virtio spec 3.1.1). No features are
    // negotiated, so FEATURES_OK comes straight after DRIVER.
    reg_write32(reg::DEVICE_STATUS, 0);
    reg_fetch_and_or32(reg::DEVICE_STATUS, DeviceStatus::ACKNOWLEDGE.bits());
    reg_fetch_and_or32(reg::DEVICE_STATUS, DeviceStatus::DRIVER.bits());
    reg_fetch_and_or32(reg::DEVICE_STATUS, DeviceStatus::FEATURES_OK.bits());

    // Virtqueue 0, legacy PFN interface: one physically-contiguous
    // allocation, page number written to QUEUE_PFN.
    let virtq_pages = align_up(size_of::<Virtq>(), PAGE_SIZE) / PAGE_SIZE;
    let virtq_paddr = page_alloc::alloc_pages(virtq_pages).as_usize();
    reg_write32(reg::QUEUE_SEL, 0);
    reg_write32(reg::QUEUE_NUM, VIRTQ_ENTRY_NUM as u32);
    reg_write32(reg::QUEUE_ALIGN, 0);
    reg_write32(reg::QUEUE_PFN, (virtq_paddr / PAGE_SIZE) as u32);

    reg_fetch_and_or32(reg::DEVICE_STATUS, DeviceStatus::DRIVER_OK.bits());

    let capacity = reg_read64(reg::DEVICE_CONFIG) * SECTOR_SIZE as u64;
    println!("virtio-blk: capacity is {} bytes", capacity);

    let req_pages = align_up(size_of::<BlkRequest>(), PAGE_SIZE) / PAGE_SIZE;
    let req_paddr = page_alloc::alloc_pages(req_pages).as_usize();

    *BLK_DEVICE.lock() = Some(VirtioBlk {
        virtq: virtq_paddr as *mut Virtq,
        req: req_paddr as *mut BlkRequest,
        req_paddr,
        capacity,
        queue_index: 0,
        last_used_index: 0,
    });
    log::info!(
        "virtio-blk: virtqueue with {} descriptors at {:#x}",
        VIRTQ_ENTRY_NUM,
        virtq_paddr
    );
}

impl VirtioBlk {
    fn sector_count(&self) -> u64 {
        self.capacity / SECTOR_SIZE as u64
    }

    /// Bounds check with the out-of-range log line. Out of range is a
    /// logged no-op, not an error surfaced to the caller.
    fn sector_in_range(&self, sector: u32) -> bool {
        if sector as u64 >= self.sector_count() {
            println!(
                "virtio: tried to read/write sector={}, but capacity is {}",
                sector,
                self.sector_count()
            );
            return false;
        }
        true
    }

    /// Submit the staged request and spin until the device retires it.
    /// Returns the status byte the device wrote.
    fn submit_and_wait(&mut self, sector: u32, is_write: bool) -> u8 {
        // SAFETY: req and virtq point at this driver's DMA pages; the
        // device only touches them between the notify below and the
        // used-index update we spin on, and we never repoint them.
        unsafe {
            let req = &mut *self.req;
            req.request_type = if is_write {
                VIRTIO_BLK_T_OUT
            } else {
                VIRTIO_BLK_T_IN
            };
            req.reserved = 0;
            req.sector = sector as u64;

            let vq = &mut *self.virtq;
            fill_request_chain(&mut vq.descs, self.req_paddr, is_write);
            push_avail(&mut vq.avail, 0);
        }

        // The device must observe the ring update before the notify.
        fence(Ordering::SeqCst);
        reg_write32(reg::QUEUE_NOTIFY, self.queue_index);
        self.last_used_index = self.last_used_index.wrapping_add(1);

        while self.is_busy() {
            core::hint::spin_loop();
        }

        // SAFETY: the device has retired the request; the status byte is
        // stable until the next submit.
        unsafe { read_volatile(addr_of!((*self.req).status)) }
    }

    /// Is the device still processing our request?
    fn is_busy(&self) -> bool {
        // SAFETY: volatile read of the index the device publishes; the
        // used ring stays mapped for the driver's lifetime.
        let used_index = unsafe { read_volatile(addr_of!((*self.virtq).used.index)) };
        self.last_used_index != used_index
    }

    fn read_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) {
        if !self.sector_in_range(sector) {
            return;
        }

        let status = self.submit_and_wait(sector, false);
        if status != 0 {
            println!(
                "virtio: warn: failed to read/write sector={} status={}",
                sector, status
            );
            return;
        }

        // SAFETY: the device finished writing the data buffer before
        // advancing the used index.
        unsafe {
            buf.copy_from_slice(&(*self.req).data);
        }
    }

    fn write_sector(&mut self, sector: u32, buf: &[u8; SECTOR_SIZE]) {
        if !self.sector_in_range(sector) {
            return;
        }

        // SAFETY: staging the payload into the request page before the
        // chain is published.
        unsafe {
            (*self.req).data.copy_from_slice(buf);
        }

        let status = self.submit_and_wait(sector, true);
        if status != 0 {
            println!(
                "virtio: warn: failed to read/write sector={} status={}",
                sector, status
            );
        }
    }
}

/// Read one sector into `buf`. Out-of-range sectors log and leave `buf`
/// untouched; device errors log and leave `buf` untouched.
pub fn read_sector(sector: u32, buf: &mut [u8; SECTOR_SIZE]) {
    let mut device = BLK_DEVICE.lock();
    let device = device.as_mut().expect("virtio-blk: not initialized");
    device.read_sector(sector, buf);
}

/// Write one sector from `buf`. Out-of-range sectors and device errors log
/// and drop the write.
pub fn write_sector(sector: u32, buf: &[u8; SECTOR_SIZE]) {
    let mut device = BLK_DEVICE.lock();
    let device = device.as_mut().expect("virtio-blk: not initialized");
    device.write_sector(sector, buf);
}

#[cfg(test)]
mod tests {
    use std::boxed::Box;

    use super::*;

    #[test]
    fn test_legacy_wire_layout() {
        assert_eq!(size_of::<VirtqDesc>(), 16);
        assert_eq!(offset_of!(Virtq, avail), 16 * VIRTQ_ENTRY_NUM);
        // Legacy layout: used ring starts on the next page boundary.
        assert_eq!(offset_of!(Virtq, used), PAGE_SIZE);
        assert_eq!(size_of::<Virtq>(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_request_layout() {
        assert_eq!(offset_of!(BlkRequest, data), 16);
        assert_eq!(BLK_REQUEST_HEADER_LEN as usize, offset_of!(BlkRequest, data));
        assert_eq!(offset_of!(BlkRequest, status), 16 + SECTOR_SIZE);
    }

    fn empty_descs() -> Box<[VirtqDesc; VIRTQ_ENTRY_NUM]> {
        Box::new(
            [VirtqDesc {
                addr: 0,
                len: 0,
                flags: 0,
                next: 0,
            }; VIRTQ_ENTRY_NUM],
        )
    }

    #[test]
    fn test_read_chain_lets_device_write_data() {
        let mut descs = empty_descs();
        fill_request_chain(&mut descs, 0x8080_0000, false);

        assert_eq!(descs[0].addr, 0x8080_0000);
        assert_eq!(descs[0].len, 16);
        assert_eq!(descs[0].flags, DescFlags::NEXT.bits());
        assert_eq!(descs[0].next, 1);

        assert_eq!(descs[1].addr, 0x8080_0010);
        assert_eq!(descs[1].len, SECTOR_SIZE as u32);
        assert_eq!(descs[1].flags, (DescFlags::NEXT | DescFlags::WRITE).bits());
        assert_eq!(descs[1].next, 2);

        assert_eq!(descs[2].len, 1);
        assert_eq!(descs[2].flags, DescFlags::WRITE.bits());
    }

    #[test]
    fn test_write_chain_keeps_data_device_readable() {
        let mut descs = empty_descs();
        fill_request_chain(&mut descs, 0x8080_0000, true);

        assert_eq!(descs[1].flags, DescFlags::NEXT.bits());
        assert_eq!(descs[2].flags, DescFlags::WRITE.bits());
    }

    #[test]
    fn test_push_avail_wraps_ring_and_index() {
        let mut avail = VirtqAvail {
            flags: 0,
            index: 0,
            ring: [0xff; VIRTQ_ENTRY_NUM],
            used_event: 0,
        };

        push_avail(&mut avail, 0);
        assert_eq!(avail.ring[0], 0);
        assert_eq!(avail.index, 1);

        avail.index = (VIRTQ_ENTRY_NUM as u16) * 2 + 3;
        push_avail(&mut avail, 7);
        assert_eq!(avail.ring[3], 7);
        assert_eq!(avail.index, (VIRTQ_ENTRY_NUM as u16) * 2 + 4);

        avail.index = u16::MAX;
        push_avail(&mut avail, 5);
        assert_eq!(avail.ring[u16::MAX as usize % VIRTQ_ENTRY_NUM], 5);
        assert_eq!(avail.index, 0);
    }
}
