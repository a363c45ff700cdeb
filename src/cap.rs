//! Process capability bitmap and per-UID resource limits.
//!
//! A capability set is a 64-bit bitmap over 32 named capabilities,
//! refining the traditional `euid == 0` "can do anything" check. Fast-path
//! checks are constant-time over the bitmap.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::Mutex;

bitflags::bitflags! {
    pub struct CapSet: u64 {
        const CAP_CHOWN              = 1 << 0;
        const CAP_DAC_OVERRIDE       = 1 << 1;
        const CAP_DAC_READ_SEARCH    = 1 << 2;
        const CAP_FOWNER             = 1 << 3;
        const CAP_FSETID             = 1 << 4;
        const CAP_KILL               = 1 << 5;
        const CAP_SETGID             = 1 << 6;
        const CAP_SETUID             = 1 << 7;
        const CAP_SETPCAP            = 1 << 8;
        const CAP_LINUX_IMMUTABLE    = 1 << 9;
        const CAP_NET_BIND_SERVICE   = 1 << 10;
        const CAP_NET_BROADCAST      = 1 << 11;
        const CAP_NET_ADMIN          = 1 << 12;
        const CAP_NET_RAW            = 1 << 13;
        const CAP_IPC_LOCK           = 1 << 14;
        const CAP_IPC_OWNER          = 1 << 15;
        const CAP_SYS_MODULE         = 1 << 16;
        const CAP_SYS_RAWIO          = 1 << 17;
        const CAP_SYS_CHROOT         = 1 << 18;
        const CAP_SYS_PTRACE         = 1 << 19;
        const CAP_SYS_PACCT          = 1 << 20;
        const CAP_SYS_ADMIN          = 1 << 21;
        const CAP_SYS_BOOT           = 1 << 22;
        const CAP_SYS_NICE           = 1 << 23;
        const CAP_SYS_RESOURCE       = 1 << 24;
        const CAP_SYS_TIME           = 1 << 25;
        const CAP_SYS_TTY_CONFIG     = 1 << 26;
        const CAP_MKNOD              = 1 << 27;
        const CAP_LEASE              = 1 << 28;
        const CAP_AUDIT_WRITE        = 1 << 29;
        const CAP_AUDIT_CONTROL      = 1 << 30;
        const CAP_SETFCAP            = 1 << 31;
    }
}

impl Default for CapSet {
    fn default() -> Self {
        CapSet::empty()
    }
}

impl CapSet {
    /// Full set, granted only to `euid == 0` at process creation.
    pub const fn root_default() -> Self {
        CapSet::all()
    }

    /// `has_capability`: true if `euid == 0` or the bit is set.
    pub fn has(&self, cap: CapSet, euid: u32) -> bool {
        euid == 0 || self.contains(cap)
    }

    /// Drop a capability from self. Always allowed.
    pub fn drop_capability(&mut self, cap: CapSet) {
        self.remove(cap);
    }

    /// Add a capability. Caller must already hold CAP_SETPCAP.
    pub fn add_capability(&mut self, cap: CapSet) {
        self.insert(cap);
    }
}

use crate::lib::error::Errno;

/// Require a capability, mapping failure to `EACCES`.
pub fn require_capability(caps: &CapSet, cap: CapSet, euid: u32) -> Result<(), Errno> {
    if caps.has(cap, euid) {
        Ok(())
    } else {
        Err(Errno::EACCES)
    }
}

/// `add_capability` gate: requires the caller already hold CAP_SETPCAP.
pub fn add_capability(caps: &mut CapSet, cap: CapSet, euid: u32) -> Result<(), Errno> {
    require_capability(caps, CapSet::CAP_SETPCAP, euid)?;
    caps.add_capability(cap);
    Ok(())
}

const MAX_UIDS: usize = 256;
const FORK_RATE_WINDOW_TICKS: u64 = 1000;
const DEFAULT_PROCESS_LIMIT: u32 = 512;
const DEFAULT_FORK_RATE_LIMIT: u32 = 64;

struct UidLimit {
    uid: u32,
    process_count: AtomicU32,
    process_limit: u32,
    fork_rate_limit: u32,
    window_start_tick: AtomicU64,
    window_forks: AtomicU32,
}

impl UidLimit {
    const fn new(uid: u32) -> Self {
        Self {
            uid,
            process_count: AtomicU32::new(0),
            process_limit: DEFAULT_PROCESS_LIMIT,
            fork_rate_limit: DEFAULT_FORK_RATE_LIMIT,
            window_start_tick: AtomicU64::new(0),
            window_forks: AtomicU32::new(0),
        }
    }
}

struct ResourceLimits {
    entries: alloc::vec::Vec<UidLimit>,
}

impl ResourceLimits {
    fn entry(&mut self, uid: u32) -> &mut UidLimit {
        if let Some(pos) = self.entries.iter().position(|e| e.uid == uid) {
            return &mut self.entries[pos];
        }
        self.entries.push(UidLimit::new(uid));
        self.entries.last_mut().unwrap()
    }
}

static RESOURCE_LIMITS: Mutex<Option<ResourceLimits>> = Mutex::new(None);

fn with_limits<R>(f: impl FnOnce(&mut ResourceLimits) -> R) -> R {
    let mut guard = RESOURCE_LIMITS.lock();
    if guard.is_none() {
        *guard = Some(ResourceLimits {
            entries: alloc::vec::Vec::with_capacity(MAX_UIDS),
        });
    }
    f(guard.as_mut().unwrap())
}

/// `check_can_fork`: compares the uid's live process count against its limit.
pub fn check_can_fork(uid: u32) -> Result<(), Errno> {
    with_limits(|limits| {
        let entry = limits.entry(uid);
        if entry.process_count.load(Ordering::Relaxed) >= entry.process_limit {
            crate::warn!("cap: uid {} at process limit {}", uid, entry.process_limit);
            return Err(Errno::EAGAIN);
        }
        Ok(())
    })
}

/// `check_fork_rate_limit`: sliding-window fork-rate enforcement.
pub fn check_fork_rate_limit(uid: u32, now_tick: u64) -> Result<(), Errno> {
    with_limits(|limits| {
        let entry = limits.entry(uid);
        let window_start = entry.window_start_tick.load(Ordering::Relaxed);
        if now_tick.saturating_sub(window_start) >= FORK_RATE_WINDOW_TICKS {
            entry.window_start_tick.store(now_tick, Ordering::Relaxed);
            entry.window_forks.store(0, Ordering::Relaxed);
        }
        let forks = entry.window_forks.fetch_add(1, Ordering::Relaxed) + 1;
        if forks > entry.fork_rate_limit {
            crate::warn!("cap: uid {} exceeded fork rate limit", uid);
            return Err(Errno::EAGAIN);
        }
        Ok(())
    })
}

/// Record a successful fork against the uid's live process count.
pub fn record_fork(uid: u32) {
    with_limits(|limits| {
        limits.entry(uid).process_count.fetch_add(1, Ordering::Relaxed);
    });
}

/// Record a process exit/reap, freeing its slot in the uid's count.
pub fn record_exit(uid: u32) {
    with_limits(|limits| {
        let entry = limits.entry(uid);
        entry.process_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
            Some(c.saturating_sub(1))
        }).ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_everything() {
        let caps = CapSet::empty();
        assert!(caps.has(CapSet::CAP_SYS_ADMIN, 0));
        assert!(!caps.has(CapSet::CAP_SYS_ADMIN, 1000));
    }

    #[test]
    fn add_capability_needs_setpcap() {
        let mut caps = CapSet::empty();
        assert!(add_capability(&mut caps, CapSet::CAP_NET_ADMIN, 1000).is_err());
        caps.insert(CapSet::CAP_SETPCAP);
        assert!(add_capability(&mut caps, CapSet::CAP_NET_ADMIN, 1000).is_ok());
        assert!(caps.contains(CapSet::CAP_NET_ADMIN));
    }
}
