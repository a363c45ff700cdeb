//! x86_64 page table entry format and the spec-facing `PageTable` type.
//!
//! This is the bit-precise PTE layer: 4-level tree, canonical-address
//! decomposition, and the reserved software bit used to mark
//! copy-on-write entries. The actual CR3/TLB/walk-with-allocate glue
//! lives in `arch::x86_64::paging::PageTableManager`, which `map_page`/
//! `unmap_page` below drive.

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: u32 = 12;
pub const KERNEL_BASE: u64 = 0xFFFF_8000_0000_0000;

bitflags::bitflags! {
    /// x86_64 PTE flag bits (Intel SDM vol. 3A, table 4-19/4-20).
    pub struct PteFlags: u64 {
        const PRESENT        = 1 << 0;
        const WRITABLE       = 1 << 1;
        const USER           = 1 << 2;
        const WRITE_THROUGH  = 1 << 3;
        const CACHE_DISABLE  = 1 << 4;
        const ACCESSED       = 1 << 5;
        const DIRTY          = 1 << 6;
        const HUGE           = 1 << 7;
        const GLOBAL         = 1 << 8;
        /// Reserved software-available bit (bits 9-11 are free for the OS).
        const COW            = 1 << 9;
        const NO_EXECUTE     = 1 << 63;
    }
}

impl PteFlags {
    pub fn user_ro() -> Self {
        PteFlags::PRESENT | PteFlags::USER | PteFlags::NO_EXECUTE
    }
    pub fn user_rw() -> Self {
        PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITABLE | PteFlags::NO_EXECUTE
    }
    pub fn user_rx() -> Self {
        PteFlags::PRESENT | PteFlags::USER
    }
    pub fn user_cow() -> Self {
        (PteFlags::PRESENT | PteFlags::USER | PteFlags::COW | PteFlags::NO_EXECUTE) & !PteFlags::WRITABLE
    }

    pub fn is_cow(&self) -> bool {
        self.contains(PteFlags::COW)
    }
    pub fn is_writable(&self) -> bool {
        self.contains(PteFlags::WRITABLE)
    }
    pub fn is_executable(&self) -> bool {
        !self.contains(PteFlags::NO_EXECUTE)
    }
    pub fn mark_cow(&mut self) {
        self.remove(PteFlags::WRITABLE);
        self.insert(PteFlags::COW);
    }
    pub fn clear_cow(&mut self) {
        self.remove(PteFlags::COW);
        self.insert(PteFlags::WRITABLE);
    }
}

/// 40-bit physical page number mask (bits 12..51 of the PTE per the SDM).
const PHYS_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// A single page-table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pte(u64);

impl Pte {
    pub const fn invalid() -> Self {
        Self(0)
    }

    pub fn new(phys: u64, flags: PteFlags) -> Self {
        Self((phys & PHYS_ADDR_MASK) | flags.bits())
    }

    pub fn is_valid(&self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    pub fn phys_addr(&self) -> u64 {
        self.0 & PHYS_ADDR_MASK
    }

    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & !PHYS_ADDR_MASK)
    }

    pub fn set_flags(&mut self, flags: PteFlags) {
        self.0 = (self.0 & PHYS_ADDR_MASK) | flags.bits();
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pte")
            .field("phys", &format_args!("{:#x}", self.phys_addr()))
            .field("flags", &self.flags())
            .finish()
    }
}

/// One level of a 4-level page table (PML4, PDPT, PD, or PT), 512 entries.
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Pte; 512],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [Pte::invalid(); 512],
        }
    }

    /// Index into this level for a virtual address. `level` is 4 (PML4)
    /// down to 1 (PT).
    pub fn index(virt_addr: u64, level: u8) -> usize {
        let shift = 12 + 9 * (level as u64 - 1);
        ((virt_addr >> shift) & 0x1FF) as usize
    }
}

/// A virtual address is canonical iff bits 63:47 are all equal (sign
/// extension of bit 47 for the 4-level, 48-bit-wide address space).
pub fn is_canonical(virt_addr: u64) -> bool {
    let top = virt_addr >> 47;
    top == 0 || top == 0x1_FFFF
}

fn to_pt_flags(flags: PteFlags) -> x86_64::structures::paging::PageTableFlags {
    use x86_64::structures::paging::PageTableFlags;
    let mut f = PageTableFlags::PRESENT;
    if flags.is_writable() {
        f |= PageTableFlags::WRITABLE;
    }
    if flags.contains(PteFlags::USER) {
        f |= PageTableFlags::USER_ACCESSIBLE;
    }
    if flags.contains(PteFlags::WRITE_THROUGH) {
        f |= PageTableFlags::WRITE_THROUGH;
    }
    if flags.contains(PteFlags::CACHE_DISABLE) {
        f |= PageTableFlags::NO_CACHE;
    }
    if flags.contains(PteFlags::GLOBAL) {
        f |= PageTableFlags::GLOBAL;
    }
    if !flags.is_executable() {
        f |= PageTableFlags::NO_EXECUTE;
    }
    f
}

/// Map a single 4 KiB page in the address space rooted at `pml4_phys`.
/// Walks and allocates missing intermediate tables, then flushes the
/// local TLB entry.
pub fn map_page(
    pml4_phys: u64,
    virt: u64,
    phys: u64,
    flags: PteFlags,
) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::{PhysAddr, VirtAddr};

    if !is_canonical(virt) {
        return Err(KernelError::InvalidArgument);
    }

    let mut mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    unsafe {
        mgr.map_page(VirtAddr::new(virt), PhysAddr::new(phys), to_pt_flags(flags))
            .map_err(|_| KernelError::OutOfMemory)
    }
}

/// Unmap a single 4 KiB page. Fails with `NotFound` if it was not mapped.
pub fn unmap_page(pml4_phys: u64, virt: u64) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::{PhysAddr, VirtAddr};

    if !is_canonical(virt) {
        return Err(KernelError::InvalidArgument);
    }
    let mut mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    unsafe { mgr.unmap_page(VirtAddr::new(virt)).map_err(|_| KernelError::NotFound) }
}

/// Software COW marker bit — bit 9, reserved for OS use by the SDM.
const COW_BIT: u64 = 1 << 9;

/// COW fork: for every mapped page of `[start, end)` in the parent's
/// address space, clear writable and set the COW marker (when the page
/// was writable), increment the frame's refcount, and mirror the PTE
/// into the child. Unmapped (demand-fault) pages in the range are
/// skipped — they are materialized independently in each address space
/// on first touch.
pub fn copy_page_table_for_fork(
    parent_pml4_phys: u64,
    child_pml4_phys: u64,
    start: u64,
    end: u64,
    is_writable: bool,
) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::structures::paging::PageTableFlags;
    use x86_64::{PhysAddr, VirtAddr};

    let start = start & !(PAGE_SIZE as u64 - 1);
    let end = (end + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1);

    let mut parent = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(parent_pml4_phys))
    };
    let mut child = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(child_pml4_phys))
    };

    let mut virt = start;
    while virt < end {
        let va = VirtAddr::new(virt);
        let Some((phys, flags)) = (unsafe { parent.pte_flags(va) }) else {
            virt += PAGE_SIZE as u64;
            continue;
        };

        let mut new_flags = flags;
        if is_writable && flags.contains(PageTableFlags::WRITABLE) {
            new_flags.remove(PageTableFlags::WRITABLE);
            new_flags |= PageTableFlags::from_bits_truncate(COW_BIT);
            unsafe {
                parent
                    .set_pte_flags(va, new_flags)
                    .map_err(|_| KernelError::InvalidArgument)?;
            }
        }

        crate::mm::buddy::frame_ref_get(phys.as_u64());

        unsafe {
            child
                .map_page(va, phys, new_flags)
                .map_err(|_| KernelError::OutOfMemory)?;
        }

        virt += PAGE_SIZE as u64;
    }

    Ok(())
}

/// Write-fault on a COW page: the PTE's phys/flags as currently mapped
/// at `virt` in the faulting address space, if any.
pub fn cow_lookup(pml4_phys: u64, virt: u64) -> Option<(u64, bool, u32)> {
    use x86_64::structures::paging::PageTableFlags;
    use x86_64::{PhysAddr, VirtAddr};

    let mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    let (phys, flags) = unsafe { mgr.pte_flags(VirtAddr::new(virt)) }?;
    let is_cow = flags.bits() & COW_BIT != 0;
    let refcount = crate::mm::buddy::frame_refcount(phys.as_u64()).unwrap_or(1);
    Some((phys.as_u64(), is_cow, refcount))
}

/// Mark a single mapped, writable page as COW in place: drop WRITABLE,
/// set the COW marker, and bump the frame's refcount. No-op if the page
/// is unmapped or already read-only. Used ahead of a fork that will
/// mirror the parent's page table into the child wholesale (as opposed
/// to `copy_page_table_for_fork`, which marks and mirrors in one pass).
pub fn mark_cow(pml4_phys: u64, virt: u64) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::structures::paging::PageTableFlags;
    use x86_64::{PhysAddr, VirtAddr};

    let mut mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    let Some((phys, mut flags)) = (unsafe { mgr.pte_flags(VirtAddr::new(virt)) }) else {
        return Ok(());
    };
    if !flags.contains(PageTableFlags::WRITABLE) {
        return Ok(());
    }
    flags.remove(PageTableFlags::WRITABLE);
    flags |= PageTableFlags::from_bits_truncate(COW_BIT);
    unsafe {
        mgr.set_pte_flags(VirtAddr::new(virt), flags)
            .map_err(|_| KernelError::BadAddress)?;
    }
    crate::mm::buddy::frame_ref_get(phys.as_u64());
    Ok(())
}

/// COW write-fault resolution when the frame's refcount is 1: strip the
/// COW marker, mark writable in place, flush, resume — no copy needed.
pub fn cow_take_sole_owner(pml4_phys: u64, virt: u64) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::structures::paging::PageTableFlags;
    use x86_64::{PhysAddr, VirtAddr};

    let mut mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    let (_phys, mut flags) = unsafe { mgr.pte_flags(VirtAddr::new(virt)) }.ok_or(KernelError::BadAddress)?;
    flags.remove(PageTableFlags::from_bits_truncate(COW_BIT));
    flags |= PageTableFlags::WRITABLE;
    unsafe {
        mgr.set_pte_flags(VirtAddr::new(virt), flags)
            .map_err(|_| KernelError::BadAddress)
    }
}

/// COW write-fault resolution when the frame is still shared
/// (refcount > 1): install a fresh, privately-owned, writable frame at
/// `virt` and decrement the old frame's refcount. The caller has
/// already copied the 4096 bytes from the old frame into `new_phys`.
pub fn cow_copy_install(
    pml4_phys: u64,
    virt: u64,
    old_phys: u64,
    new_phys: u64,
) -> Result<(), crate::lib::error::KernelError> {
    use crate::lib::error::KernelError;
    use x86_64::structures::paging::PageTableFlags;
    use x86_64::{PhysAddr, VirtAddr};

    let mut mgr = unsafe {
        crate::arch::x86_64::paging::PageTableManager::from_pml4_phys(PhysAddr::new(pml4_phys))
    };
    let flags = (PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE)
        | PageTableFlags::from_bits_truncate(0); // COW bit cleared: not present in this set
    unsafe {
        mgr.remap(VirtAddr::new(virt), PhysAddr::new(new_phys), flags)
            .map_err(|_| KernelError::BadAddress)?;
    }
    crate::mm::buddy::frame_ref_put(old_phys);
    Ok(())
}

/// Flush a single page's TLB entry locally.
pub fn flush_tlb(virt_addr: u64) {
    crate::arch::x86_64::paging::flush_tlb_page(x86_64::VirtAddr::new(virt_addr));
}

/// Flush the entire local TLB (reload CR3).
pub fn flush_tlb_all() {
    crate::arch::x86_64::paging::flush_tlb_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_boundaries() {
        assert!(is_canonical(0x0000_7FFF_FFFF_FFFF));
        assert!(!is_canonical(0x0000_8000_0000_0000));
        assert!(is_canonical(0xFFFF_8000_0000_0000));
    }

    #[test]
    fn pte_roundtrip() {
        let p = Pte::new(0x1000, PteFlags::user_rw());
        assert_eq!(p.phys_addr(), 0x1000);
        assert!(p.is_valid());
        assert!(p.flags().is_writable());
    }

    #[test]
    fn cow_mark_clear() {
        let mut flags = PteFlags::user_rw();
        flags.mark_cow();
        assert!(flags.is_cow());
        assert!(!flags.is_writable());
        flags.clear_cow();
        assert!(!flags.is_cow());
        assert!(flags.is_writable());
    }

    #[test]
    fn page_table_index_levels() {
        let va = 0xFFFF_8000_0012_3000u64;
        assert!(PageTable::index(va, 4) < 512);
        assert!(PageTable::index(va, 1) < 512);
    }
}
