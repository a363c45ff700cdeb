/// System V shared memory (shmget/shmat/shmdt/shmctl).
///
/// Unlike an anonymous mmap, a shared segment's frames are allocated
/// eagerly at `shmget` time and mapped into every attaching process's
/// page table immediately at `shmat`, rather than being demand-paged on
/// first fault - every attacher must see the same physical frames from
/// the moment the mapping is established.

use crate::lib::error::Errno;
use crate::mm::paging::PAGE_SIZE;
use crate::process::{current_pid, get_process_table, Pid, Vma, VmaFlags};
use alloc::vec::Vec;
use spin::Mutex;

pub const IPC_PRIVATE: i32 = 0;
pub const IPC_CREAT: i32 = 0o1000;
pub const IPC_EXCL: i32 = 0o2000;

pub const IPC_RMID: i32 = 0;
pub const IPC_STAT: i32 = 2;

/// Mirrors `struct shmid_ds`'s fields this kernel actually tracks.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ShmidDs {
    pub shm_segsz: u64,
    pub shm_nattch: u64,
    pub shm_perm_mode: u32,
}

struct ShmSegment {
    id: i32,
    key: i32,
    frames: Vec<u64>,
    size: usize,
    attach_count: usize,
    mode: u32,
    marked_for_removal: bool,
}

struct Attachment {
    pid: Pid,
    addr: u64,
    shmid: i32,
}

struct Registry {
    segments: Vec<ShmSegment>,
    attachments: Vec<Attachment>,
    next_id: i32,
}

static REGISTRY: Mutex<Option<Registry>> = Mutex::new(None);

pub fn init() {
    *REGISTRY.lock() = Some(Registry {
        segments: Vec::new(),
        attachments: Vec::new(),
        next_id: 1,
    });
}

fn page_round_up(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Allocate (or look up, by key) a shared memory segment. Returns its id.
pub fn shmget(key: i32, size: usize, shmflg: i32) -> Result<i32, Errno> {
    if size == 0 {
        return Err(Errno::EINVAL);
    }
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;

    if key != IPC_PRIVATE {
        if let Some(seg) = registry.segments.iter().find(|s| s.key == key) {
            if shmflg & IPC_CREAT != 0 && shmflg & IPC_EXCL != 0 {
                return Err(Errno::EEXIST);
            }
            if size > seg.size {
                return Err(Errno::EINVAL);
            }
            return Ok(seg.id);
        }
        if shmflg & IPC_CREAT == 0 {
            return Err(Errno::ENOENT);
        }
    }

    let rounded = page_round_up(size);
    let num_pages = rounded / PAGE_SIZE;
    let mut frames = Vec::with_capacity(num_pages);
    for _ in 0..num_pages {
        match crate::mm::alloc_page() {
            Some(pa) => frames.push(pa),
            None => {
                for pa in frames {
                    crate::mm::free_page(pa);
                }
                return Err(Errno::ENOMEM);
            }
        }
    }

    let id = registry.next_id;
    registry.next_id += 1;
    registry.segments.push(ShmSegment {
        id,
        key,
        frames,
        size: rounded,
        attach_count: 0,
        mode: (shmflg & 0o777) as u32,
        marked_for_removal: false,
    });
    Ok(id)
}

/// Attach `shmid` into the caller's address space, returning the
/// mapped address.
pub fn shmat(shmid: i32, addr: u64, shmflg: i32) -> Result<u64, Errno> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;
    let seg = registry.segments.iter_mut().find(|s| s.id == shmid).ok_or(Errno::EINVAL)?;

    let pid = current_pid();
    let mut table = get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let start = if addr != 0 {
        addr
    } else {
        task.mm.find_free_region(seg.size as u64).map_err(|_| Errno::ENOMEM)?
    };

    let readonly = shmflg & 0o10000 != 0; // SHM_RDONLY
    let pte_flags = if readonly {
        crate::mm::PteFlags::user_ro()
    } else {
        crate::mm::PteFlags::user_rw()
    };

    for (i, &frame) in seg.frames.iter().enumerate() {
        let virt = start + (i * PAGE_SIZE) as u64;
        crate::mm::map_page(task.mm.page_table, virt, frame, pte_flags)
            .map_err(|_| Errno::ENOMEM)?;
    }

    let vma_flags = if readonly {
        VmaFlags::READ | VmaFlags::SHARED
    } else {
        VmaFlags::READ | VmaFlags::WRITE | VmaFlags::SHARED
    };
    task.mm
        .insert_vma(Vma { start, end: start + seg.size as u64, flags: vma_flags, offset: 0 })
        .map_err(|_| Errno::ENOMEM)?;

    seg.attach_count += 1;
    registry.attachments.push(Attachment { pid, addr: start, shmid });
    Ok(start)
}

/// Detach the segment mapped at `addr` in the caller's address space.
pub fn shmdt(addr: u64) -> Result<(), Errno> {
    let pid = current_pid();
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;

    let att_pos = registry
        .attachments
        .iter()
        .position(|a| a.pid == pid && a.addr == addr)
        .ok_or(Errno::EINVAL)?;
    let shmid = registry.attachments[att_pos].shmid;

    let mut table = get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let seg = registry.segments.iter_mut().find(|s| s.id == shmid).ok_or(Errno::EINVAL)?;
    for i in 0..seg.frames.len() {
        let virt = addr + (i * PAGE_SIZE) as u64;
        let _ = crate::mm::unmap_page(task.mm.page_table, virt);
    }
    task.mm.remove_vma(addr);

    registry.attachments.remove(att_pos);
    seg.attach_count -= 1;
    let should_free = seg.marked_for_removal && seg.attach_count == 0;
    if should_free {
        let frames = core::mem::take(&mut seg.frames);
        let id = seg.id;
        registry.segments.retain(|s| s.id != id);
        for pa in frames {
            crate::mm::free_page(pa);
        }
    }
    Ok(())
}

/// shmctl(2): only `IPC_RMID` and `IPC_STAT` are implemented; anything
/// else (`IPC_SET`, `SHM_LOCK`, `SHM_UNLOCK`, ...) returns `ENOSYS`.
pub fn shmctl(shmid: i32, cmd: i32, buf: Option<&mut ShmidDs>) -> Result<(), Errno> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;
    let idx = registry.segments.iter().position(|s| s.id == shmid).ok_or(Errno::EINVAL)?;

    match cmd {
        IPC_RMID => {
            let seg = &mut registry.segments[idx];
            seg.marked_for_removal = true;
            if seg.attach_count == 0 {
                let frames = core::mem::take(&mut seg.frames);
                registry.segments.remove(idx);
                for pa in frames {
                    crate::mm::free_page(pa);
                }
            }
            Ok(())
        }
        IPC_STAT => {
            let seg = &registry.segments[idx];
            if let Some(out) = buf {
                out.shm_segsz = seg.size as u64;
                out.shm_nattch = seg.attach_count as u64;
                out.shm_perm_mode = seg.mode;
            }
            Ok(())
        }
        _ => Err(Errno::ENOSYS),
    }
}

/// Detach and free every segment mapping belonging to `pid`, called
/// from process exit.
pub fn cleanup_process(pid: Pid) {
    let addrs: Vec<u64> = {
        let guard = REGISTRY.lock();
        match guard.as_ref() {
            Some(r) => r.attachments.iter().filter(|a| a.pid == pid).map(|a| a.addr).collect(),
            None => Vec::new(),
        }
    };
    for addr in addrs {
        let _ = shmdt(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        *REGISTRY.lock() = Some(Registry { segments: Vec::new(), attachments: Vec::new(), next_id: 1 });
    }

    #[test]
    fn shmget_rejects_zero_size() {
        reset();
        assert_eq!(shmget(IPC_PRIVATE, 0, IPC_CREAT), Err(Errno::EINVAL));
    }

    #[test]
    fn shmget_with_same_key_returns_same_id() {
        reset();
        let id1 = shmget(42, 4096, IPC_CREAT).unwrap();
        let id2 = shmget(42, 4096, IPC_CREAT).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn shmget_excl_on_existing_key_fails() {
        reset();
        shmget(7, 4096, IPC_CREAT).unwrap();
        assert_eq!(shmget(7, 4096, IPC_CREAT | IPC_EXCL), Err(Errno::EEXIST));
    }

    #[test]
    fn shmget_missing_key_without_creat_fails() {
        reset();
        assert_eq!(shmget(99, 4096, 0), Err(Errno::ENOENT));
    }

    #[test]
    fn shmctl_rmid_unattached_frees_immediately() {
        reset();
        let id = shmget(IPC_PRIVATE, 4096, IPC_CREAT).unwrap();
        assert!(shmctl(id, IPC_RMID, None).is_ok());
        let guard = REGISTRY.lock();
        assert!(guard.as_ref().unwrap().segments.is_empty());
    }

    #[test]
    fn shmctl_stat_reports_size() {
        reset();
        let id = shmget(IPC_PRIVATE, 8192, IPC_CREAT).unwrap();
        let mut stat = ShmidDs::default();
        shmctl(id, IPC_STAT, Some(&mut stat)).unwrap();
        assert_eq!(stat.shm_segsz, 8192);
        assert_eq!(stat.shm_nattch, 0);
    }
}
