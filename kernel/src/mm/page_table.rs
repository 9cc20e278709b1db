//! Sv32 page-table construction.
//!
//! Two-level tables with 1024 entries of 32 bits each. A virtual address
//! splits into VPN\[1\] (bits 22-31), VPN\[0\] (bits 12-21) and a 12-bit
//! page offset; the physical page number sits at bit 10 of an entry.
//!
//! There is no unmap and no TLB shootdown here: translations only ever
//! grow, and the scheduler fences around every satp switch.

use bitflags::bitflags;

use super::{page_alloc, PhysAddr, VirtAddr, PAGE_SIZE};

/// Number of entries in one table (both levels).
pub const PAGE_TABLE_ENTRIES: usize = 1024;

bitflags! {
    /// Sv32 page-table entry permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const VALID   = 1 << 0;
        const READ    = 1 << 1;
        const WRITE   = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER    = 1 << 4;
    }
}

/// Page-table entry
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Entry pointing at physical page `ppn` with the given flags.
    pub fn new(ppn: u32, flags: PteFlags) -> Self {
        Self((ppn << 10) | flags.bits())
    }

    pub const fn is_valid(&self) -> bool {
        self.0 & PteFlags::VALID.bits() != 0
    }

    pub const fn ppn(&self) -> u32 {
        self.0 >> 10
    }

    /// Physical address of the page (or next-level table) this entry maps.
    pub const fn target(&self) -> PhysAddr {
        PhysAddr::new((self.0 >> 10) as usize * PAGE_SIZE)
    }

    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & 0x3ff)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// VPN[1]: index into the root table.
pub const fn vpn1(vaddr: VirtAddr) -> usize {
    (vaddr.as_usize() >> 22) & 0x3ff
}

/// VPN[0]: index into the second-level table.
pub const fn vpn0(vaddr: VirtAddr) -> usize {
    (vaddr.as_usize() >> 12) & 0x3ff
}

/// Map one page in the table rooted at `root`, materializing the
/// second-level table on demand.
///
/// Both addresses must be page-aligned; the kernel cannot continue with a
/// malformed mapping request, so misalignment panics.
pub fn map_page(root: PhysAddr, vaddr: VirtAddr, paddr: PhysAddr, flags: PteFlags) {
    if !vaddr.is_page_aligned() {
        panic!("unaligned vaddr {:#x}", vaddr.as_usize());
    }
    if !paddr.is_page_aligned() {
        panic!("unaligned paddr {:#x}", paddr.as_usize());
    }

    let table1 = root.as_usize() as *mut Entry;

    // SAFETY: `root` is a live root table from alloc_pages, and both table
    // levels sit in the identity-mapped free-RAM window, so physical
    // addresses double as pointers. Indices are masked to the 1024-entry
    // table size.
    unsafe {
        let entry1 = table1.add(vpn1(vaddr));
        if !(*entry1).is_valid() {
            // Materialize the second-level table (alloc_pages zeroes it).
            let table = page_alloc::alloc_pages(1);
            *entry1 = Entry::new((table.as_usize() / PAGE_SIZE) as u32, PteFlags::VALID);
        }

        let table0 = (*entry1).target().as_usize() as *mut Entry;
        *table0.add(vpn0(vaddr)) = Entry::new(
            (paddr.as_usize() / PAGE_SIZE) as u32,
            flags | PteFlags::VALID,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_split() {
        // 0x0100_0000: VPN[1] = 4, VPN[0] = 0
        let vaddr = VirtAddr::new(0x0100_0000);
        assert_eq!(vpn1(vaddr), 4);
        assert_eq!(vpn0(vaddr), 0);

        // 0x8020_3000: VPN[1] = 0x200, VPN[0] = 0x203
        let vaddr = VirtAddr::new(0x8020_3000);
        assert_eq!(vpn1(vaddr), 0x200);
        assert_eq!(vpn0(vaddr), 0x203);
    }

    #[test]
    fn test_entry_round_trip() {
        let flags = PteFlags::READ | PteFlags::WRITE | PteFlags::USER;
        let entry = Entry::new(0x12345, flags | PteFlags::VALID);

        assert!(entry.is_valid());
        assert_eq!(entry.ppn(), 0x12345);
        assert_eq!(entry.target().as_usize(), 0x12345 * PAGE_SIZE);
        assert_eq!(entry.flags(), flags | PteFlags::VALID);
    }

    #[test]
    fn test_flag_encoding_matches_sv32() {
        assert_eq!(PteFlags::VALID.bits(), 1);
        assert_eq!(PteFlags::READ.bits(), 2);
        assert_eq!(PteFlags::WRITE.bits(), 4);
        assert_eq!(PteFlags::EXECUTE.bits(), 8);
        assert_eq!(PteFlags::USER.bits(), 16);
    }

    #[test]
    fn test_empty_entry_is_invalid() {
        assert!(!Entry::empty().is_valid());
    }

    #[test]
    #[should_panic(expected = "unaligned vaddr")]
    fn test_unaligned_vaddr_panics() {
        map_page(
            PhysAddr::new(0),
            VirtAddr::new(0x0100_0004),
            PhysAddr::new(0x8040_0000),
            PteFlags::READ,
        );
    }

    #[test]
    #[should_panic(expected = "unaligned paddr")]
    fn test_unaligned_paddr_panics() {
        map_page(
            PhysAddr::new(0),
            VirtAddr::new(0x0100_0000),
            PhysAddr::new(0x8040_0010),
            PteFlags::READ,
        );
    }
}
