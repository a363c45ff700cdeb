/// Page fault handler with copy-on-write support
///
/// Handles #PF (vector 14) raised against user mappings. Implements
/// demand paging for not-yet-populated VMAs and copy-on-write for pages
/// shared across a fork.

use crate::process::{current_pid, get_process_table};
use crate::lib::error::Errno;
use super::paging::{PteFlags, PAGE_SIZE};
use super::alloc_page;

/// Coarse classification of a #PF, derived from the hardware error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// P=1: the page was mapped but the access violated its permissions
    /// (write to a read-only/COW page, or fetch from NX).
    Permission,
    /// P=0: no translation exists yet (demand-paged VMA).
    Translation,
    Other,
}

/// x86_64 page-fault error code bits (Intel SDM vol. 3A, section 4.7).
const PF_PRESENT: u64 = 1 << 0;
const PF_WRITE: u64 = 1 << 1;
#[allow(dead_code)]
const PF_USER: u64 = 1 << 2;
#[allow(dead_code)]
const PF_RESERVED: u64 = 1 << 3;
#[allow(dead_code)]
const PF_INSTRUCTION: u64 = 1 << 4;

pub fn parse_fault_type(error_code: u64) -> FaultType {
    if error_code & PF_PRESENT != 0 {
        FaultType::Permission
    } else {
        FaultType::Translation
    }
}

pub fn is_write_fault(error_code: u64) -> bool {
    error_code & PF_WRITE != 0
}

/// Handle a page fault. `fault_addr` is CR2 (the faulting virtual
/// address), `error_code` is the code the CPU pushed onto the
/// exception stack frame. Returns `Ok(())` if the fault was resolved
/// and the faulting instruction can be retried, `Err` if it should be
/// delivered to the process as SIGSEGV.
pub fn handle_page_fault(fault_addr: u64, error_code: u64) -> Result<(), Errno> {
    let fault_type = parse_fault_type(error_code);
    let is_write = is_write_fault(error_code);

    crate::debug!(
        "page fault at {:#x}: type={:?}, write={}, code={:#x}",
        fault_addr, fault_type, is_write, error_code
    );

    let pid = current_pid();
    let mut table = get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let vma = task.mm.find_vma(fault_addr).ok_or_else(|| {
        crate::warn!("page fault: no VMA covers {:#x} (pid {})", fault_addr, pid);
        Errno::EFAULT
    })?;

    match (fault_type, is_write) {
        (FaultType::Permission, true) => handle_cow_fault(task, fault_addr),
        (FaultType::Translation, _) => handle_lazy_fault(task, fault_addr, vma.flags),
        _ => {
            crate::warn!(
                "unhandled page fault: type={:?}, write={}, addr={:#x}",
                fault_type, is_write, fault_addr
            );
            Err(Errno::EFAULT)
        }
    }
}

/// Write fault on a page marked read-only with the COW bit set.
/// Single owner: just flip the page writable in place. Shared: copy the
/// frame, install the copy privately, drop the old frame's refcount.
fn handle_cow_fault(task: &mut crate::process::Task, fault_addr: u64) -> Result<(), Errno> {
    let page_addr = fault_addr & !(PAGE_SIZE as u64 - 1);
    let pml4 = task.mm.page_table;

    let (old_phys, is_cow, refcount) =
        super::paging::cow_lookup(pml4, page_addr).ok_or(Errno::EFAULT)?;

    if !is_cow {
        // Present, writable bit genuinely absent, and not our COW marker:
        // a real protection violation (e.g. write to a read-only VMA).
        return Err(Errno::EFAULT);
    }

    if refcount <= 1 {
        super::paging::cow_take_sole_owner(pml4, page_addr).map_err(|_| Errno::EFAULT)?;
    } else {
        let new_phys = alloc_page().ok_or(Errno::ENOMEM)?;
        unsafe {
            let src = crate::arch::x86_64::paging::phys_to_virt(x86_64::PhysAddr::new(old_phys))
                .as_u64() as *const u8;
            let dst = crate::arch::x86_64::paging::phys_to_virt(x86_64::PhysAddr::new(new_phys))
                .as_u64() as *mut u8;
            core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE);
        }
        super::paging::cow_copy_install(pml4, page_addr, old_phys, new_phys)
            .map_err(|_| Errno::EFAULT)?;
    }

    super::paging::flush_tlb(page_addr);
    crate::debug!("COW resolved at {:#x} (refcount was {})", page_addr, refcount);
    Ok(())
}

/// Demand-page a VMA that has no backing translation yet.
fn handle_lazy_fault(
    task: &mut crate::process::Task,
    fault_addr: u64,
    vma_flags: crate::process::VmaFlags,
) -> Result<(), Errno> {
    let page_addr = fault_addr & !(PAGE_SIZE as u64 - 1);

    let phys_page = alloc_page().ok_or(Errno::ENOMEM)?;

    let pte_flags = if vma_flags.contains(crate::process::VmaFlags::WRITE) {
        PteFlags::user_rw()
    } else if vma_flags.contains(crate::process::VmaFlags::EXEC) {
        PteFlags::user_rx()
    } else {
        PteFlags::user_ro()
    };

    super::paging::map_page(task.mm.page_table, page_addr, phys_page, pte_flags)
        .map_err(|_| Errno::EFAULT)?;
    super::paging::flush_tlb(page_addr);

    crate::debug!("lazy-mapped {:#x} -> {:#x}", page_addr, phys_page);
    Ok(())
}

/// Mark every writable page in `parent_mm`'s VMAs as COW, ahead of a
/// fork that will share the resulting page table with the child
/// wholesale. `Task::fork_from`'s direct path instead marks and mirrors
/// each PTE into a fresh child table in one pass via
/// `paging::copy_page_table_for_fork`; this entry point exists for the
/// `process::fork` scaffolding, which duplicates the table first and
/// relies on this to apply COW afterward.
pub fn setup_cow_for_fork(parent_mm: &mut crate::process::MemoryManager) -> Result<(), Errno> {
    let pml4 = parent_mm.page_table;
    for vma in &parent_mm.vmas {
        if !vma.flags.contains(crate::process::VmaFlags::WRITE) {
            continue;
        }
        let mut virt = vma.start & !(PAGE_SIZE as u64 - 1);
        let end = (vma.end + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1);
        while virt < end {
            super::paging::mark_cow(pml4, virt).map_err(|_| Errno::EFAULT)?;
            virt += PAGE_SIZE as u64;
        }
    }
    super::paging::flush_tlb_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_present_as_translation() {
        assert_eq!(parse_fault_type(0), FaultType::Translation);
    }

    #[test]
    fn classifies_present_as_permission() {
        assert_eq!(parse_fault_type(PF_PRESENT), FaultType::Permission);
    }

    #[test]
    fn detects_write_bit() {
        assert!(is_write_fault(PF_PRESENT | PF_WRITE));
        assert!(!is_write_fault(PF_PRESENT));
    }
}
