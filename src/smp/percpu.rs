/// Per-CPU data structures - Phase E
///
/// Each CPU has its own set of data structures to minimize cache contention and locking.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use crate::process::{Pid, Task};

/// Maximum number of CPUs (must match smp/mod.rs)
const MAX_CPUS: usize = 8;

/// Number of priority levels (0 = lowest, 255 = highest)
pub const NUM_PRIORITIES: usize = 256;

/// Number of u64 words backing the 256-bit presence bitmap
const BITMAP_WORDS: usize = NUM_PRIORITIES / 64;

/// Per-CPU data structure
pub struct PerCpuData {
    /// CPU ID
    pub cpu_id: usize,

    /// Current running task PID (0 = idle)
    pub current_pid: AtomicUsize,

    /// Per-priority FIFO run queues, indexed by priority (0..256).
    /// Populated with 256 empty queues by `init_percpu`; empty (not yet
    /// allocated) before that.
    pub runqueue: UnsafeCell<Vec<VecDeque<Pid>>>,

    /// Presence bitmap: bit *p* is set iff `runqueue[p]` is non-empty.
    pub priority_bitmap: [AtomicU64; BITMAP_WORDS],

    /// Number of context switches on this CPU
    pub context_switches: AtomicUsize,

    /// Number of timer ticks on this CPU
    pub timer_ticks: AtomicUsize,

    /// CPU load (tasks in runqueue + running)
    pub load: AtomicUsize,

    /// Idle flag (true if CPU is idle)
    pub is_idle: AtomicUsize,
}

impl PerCpuData {
    const fn new(cpu_id: usize) -> Self {
        Self {
            cpu_id,
            current_pid: AtomicUsize::new(0),
            runqueue: UnsafeCell::new(Vec::new()),
            priority_bitmap: [
                AtomicU64::new(0), AtomicU64::new(0),
                AtomicU64::new(0), AtomicU64::new(0),
            ],
            context_switches: AtomicUsize::new(0),
            timer_ticks: AtomicUsize::new(0),
            load: AtomicUsize::new(0),
            is_idle: AtomicUsize::new(1),
        }
    }

    fn set_bit(&self, priority: u8) {
        let p = priority as usize;
        self.priority_bitmap[p / 64].fetch_or(1u64 << (p % 64), Ordering::Release);
    }

    fn clear_bit(&self, priority: u8) {
        let p = priority as usize;
        self.priority_bitmap[p / 64].fetch_and(!(1u64 << (p % 64)), Ordering::Release);
    }

    /// Highest set bit in the presence bitmap, i.e. the priority of the
    /// next thread `pick_next` should run, scanning from priority 255 down.
    fn highest_priority(&self) -> Option<u8> {
        for word_idx in (0..BITMAP_WORDS).rev() {
            let word = self.priority_bitmap[word_idx].load(Ordering::Acquire);
            if word != 0 {
                let bit_pos = 63 - word.leading_zeros() as usize;
                return Some((word_idx * 64 + bit_pos) as u8);
            }
        }
        None
    }

    /// Enqueue a thread on this CPU's run queue at the given priority.
    pub fn enqueue_at(&self, pid: Pid, priority: u8) {
        // SAFETY: caller holds the per-CPU lock (or is the owning CPU)
        unsafe {
            (*self.runqueue.get())[priority as usize].push_back(pid);
        }
        self.set_bit(priority);
        self.update_load();
    }

    /// Dequeue the highest-priority runnable thread, clearing its bucket's
    /// bitmap bit if the bucket is now empty.
    pub fn dequeue_highest(&self) -> Option<Pid> {
        let priority = self.highest_priority()?;
        // SAFETY: caller holds the per-CPU lock (or is the owning CPU)
        let pid = unsafe {
            let queue = &mut (*self.runqueue.get())[priority as usize];
            let pid = queue.pop_front();
            if queue.is_empty() {
                self.clear_bit(priority);
            }
            pid
        };
        if pid.is_some() {
            self.update_load();
        }
        pid
    }

    /// Remove a specific thread from its priority bucket (used when a
    /// blocking/sleeping thread must leave the run queue out of order).
    pub fn remove_pid(&self, pid: Pid, priority: u8) -> bool {
        // SAFETY: caller holds the per-CPU lock (or is the owning CPU)
        let removed = unsafe {
            let queue = &mut (*self.runqueue.get())[priority as usize];
            let before = queue.len();
            queue.retain(|&p| p != pid);
            let removed = queue.len() != before;
            if queue.is_empty() {
                self.clear_bit(priority);
            }
            removed
        };
        if removed {
            self.update_load();
        }
        removed
    }

    /// Get current running PID
    pub fn current_pid(&self) -> Pid {
        self.current_pid.load(Ordering::Acquire) as Pid
    }

    /// Set current running PID
    pub fn set_current_pid(&self, pid: Pid) {
        self.current_pid.store(pid as usize, Ordering::Release);
    }

    /// Increment context switch counter
    pub fn inc_context_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment timer tick counter
    pub fn inc_timer_ticks(&self) {
        self.timer_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get runqueue length (load) summed across all priority buckets
    pub fn runqueue_len(&self) -> usize {
        // SAFETY: Only accessed from owning CPU or with IRQs disabled
        unsafe { (*self.runqueue.get()).iter().map(|q| q.len()).sum() }
    }

    /// Update load metric
    pub fn update_load(&self) {
        let load = self.runqueue_len() + if self.current_pid() != 0 { 1 } else { 0 };
        self.load.store(load, Ordering::Release);
    }

    /// Mark CPU as idle
    pub fn set_idle(&self, idle: bool) {
        self.is_idle.store(idle as usize, Ordering::Release);
    }

    /// Check if CPU is idle
    pub fn is_idle(&self) -> bool {
        self.is_idle.load(Ordering::Acquire) != 0
    }
}

// SAFETY: PerCpuData is accessed only by owning CPU or with proper synchronization
unsafe impl Sync for PerCpuData {}

/// Array of per-CPU data structures
static PER_CPU_DATA: [PerCpuData; MAX_CPUS] = [
    PerCpuData::new(0),
    PerCpuData::new(1),
    PerCpuData::new(2),
    PerCpuData::new(3),
    PerCpuData::new(4),
    PerCpuData::new(5),
    PerCpuData::new(6),
    PerCpuData::new(7),
];

/// Initialize per-CPU data for a specific CPU
pub fn init_percpu(cpu_id: usize) {
    if cpu_id >= MAX_CPUS {
        crate::warn!("PerCPU: Invalid CPU ID {}", cpu_id);
        return;
    }

    let percpu = &PER_CPU_DATA[cpu_id];

    // Initialize the 256 per-priority run queues and clear the presence bitmap
    unsafe {
        let mut queues = Vec::with_capacity(NUM_PRIORITIES);
        for _ in 0..NUM_PRIORITIES {
            queues.push(VecDeque::new());
        }
        *percpu.runqueue.get() = queues;
    }
    for word in &percpu.priority_bitmap {
        word.store(0, Ordering::Release);
    }

    // Reset counters
    percpu.current_pid.store(0, Ordering::Release);
    percpu.context_switches.store(0, Ordering::Release);
    percpu.timer_ticks.store(0, Ordering::Release);
    percpu.load.store(0, Ordering::Release);
    percpu.is_idle.store(1, Ordering::Release);

    crate::debug!("PerCPU: Initialized per-CPU data for CPU {}", cpu_id);
}

/// Get per-CPU data for current CPU
pub fn current() -> &'static PerCpuData {
    let cpu_id = crate::arch::current_cpu_id();
    get(cpu_id)
}

/// Get per-CPU data for a specific CPU
pub fn get(cpu_id: usize) -> &'static PerCpuData {
    if cpu_id >= MAX_CPUS {
        // Fallback to CPU 0 if invalid
        return &PER_CPU_DATA[0];
    }
    &PER_CPU_DATA[cpu_id]
}

/// Add a task to the current CPU's runqueue at the given priority
pub fn enqueue_current(pid: Pid, priority: u8) {
    current().enqueue_at(pid, priority);
}

/// Add a task to a specific CPU's runqueue at the given priority
pub fn enqueue_on(cpu_id: usize, pid: Pid, priority: u8) {
    if cpu_id >= MAX_CPUS {
        crate::warn!("PerCPU: Invalid CPU ID {} for enqueue", cpu_id);
        return;
    }

    // TODO: Add IRQ disabling or spinlock for cross-CPU access
    get(cpu_id).enqueue_at(pid, priority);

    // TODO: Send IPI to wake up target CPU if idle
}

/// Dequeue the highest-priority runnable task from the current CPU's runqueue
pub fn dequeue_current() -> Option<Pid> {
    current().dequeue_highest()
}

/// Remove a specific task from the current CPU's runqueue
pub fn remove_current(pid: Pid, priority: u8) -> bool {
    current().remove_pid(pid, priority)
}

/// Get statistics for all CPUs
pub fn stats() -> PerCpuStats {
    let mut cpu_stats = [CpuStat::default(); MAX_CPUS];

    for i in 0..MAX_CPUS {
        let percpu = get(i);
        cpu_stats[i] = CpuStat {
            cpu_id: i,
            current_pid: percpu.current_pid(),
            runqueue_len: percpu.runqueue_len(),
            context_switches: percpu.context_switches.load(Ordering::Relaxed),
            timer_ticks: percpu.timer_ticks.load(Ordering::Relaxed),
            load: percpu.load.load(Ordering::Relaxed),
            is_idle: percpu.is_idle(),
        };
    }

    PerCpuStats { cpu_stats }
}

/// Per-CPU statistics
#[derive(Debug, Clone)]
pub struct PerCpuStats {
    pub cpu_stats: [CpuStat; MAX_CPUS],
}

/// Statistics for a single CPU
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuStat {
    pub cpu_id: usize,
    pub current_pid: Pid,
    pub runqueue_len: usize,
    pub context_switches: usize,
    pub timer_ticks: usize,
    pub load: usize,
    pub is_idle: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_cpu() -> PerCpuData {
        let cpu = PerCpuData::new(0);
        let mut queues = Vec::with_capacity(NUM_PRIORITIES);
        for _ in 0..NUM_PRIORITIES {
            queues.push(VecDeque::new());
        }
        unsafe { *cpu.runqueue.get() = queues; }
        cpu
    }

    #[test]
    fn higher_priority_thread_picked_first() {
        let cpu = fresh_cpu();
        cpu.enqueue_at(42, 64);   // T_low
        cpu.enqueue_at(7, 192);  // T_high

        assert_eq!(cpu.dequeue_highest(), Some(7));
        assert_eq!(cpu.dequeue_highest(), Some(42));
        assert_eq!(cpu.dequeue_highest(), None);
    }

    #[test]
    fn bitmap_bit_clears_when_bucket_drains() {
        let cpu = fresh_cpu();
        cpu.enqueue_at(1, 200);
        assert_eq!(cpu.highest_priority(), Some(200));

        cpu.dequeue_highest();
        assert_eq!(cpu.highest_priority(), None);
    }

    #[test]
    fn remove_pid_clears_empty_bucket_bit() {
        let cpu = fresh_cpu();
        cpu.enqueue_at(5, 10);
        assert!(cpu.remove_pid(5, 10));
        assert_eq!(cpu.highest_priority(), None);
        // removing again is a no-op, not a bug
        assert!(!cpu.remove_pid(5, 10));
    }

    #[test]
    fn fifo_within_same_priority() {
        let cpu = fresh_cpu();
        cpu.enqueue_at(1, 50);
        cpu.enqueue_at(2, 50);
        cpu.enqueue_at(3, 50);

        assert_eq!(cpu.dequeue_highest(), Some(1));
        assert_eq!(cpu.dequeue_highest(), Some(2));
        assert_eq!(cpu.dequeue_highest(), Some(3));
    }
}
