/// SMP-aware round-robin preemptive scheduler - Phase E
///
/// Per-CPU scheduler with timeslice-based preemption and load balancing.
/// Each CPU has its own runqueue and schedules independently.

use super::{Pid, ProcessState};
use core::sync::atomic::{AtomicBool, Ordering};
use x86_64::PhysAddr;

/// Timeslice in timer ticks. The PIT is programmed for 1000Hz (1ms/tick,
/// see arch::x86_64::pit::DEFAULT_FREQUENCY), so 10 ticks is a 10ms slice.
const TIMESLICE_TICKS: u32 = 10;

/// Per-CPU timeslice remaining (indexed by CPU ID)
static TIMESLICE_REMAINING: [core::sync::atomic::AtomicU32; crate::smp::MAX_CPUS] = [
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
    core::sync::atomic::AtomicU32::new(TIMESLICE_TICKS),
];

/// Per-CPU reschedule flags (indexed by CPU ID)
static NEED_RESCHED: [AtomicBool; crate::smp::MAX_CPUS] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

/// Initialize scheduler (called once during boot)
pub fn init() {
    // Initialize all CPUs' timeslices
    for i in 0..crate::smp::MAX_CPUS {
        TIMESLICE_REMAINING[i].store(TIMESLICE_TICKS, Ordering::Release);
        NEED_RESCHED[i].store(false, Ordering::Release);
    }

    crate::info!("Scheduler initialized (SMP, timeslice={} ticks)", TIMESLICE_TICKS);
}

/// Get current running task PID (for current CPU)
pub fn current_pid() -> Option<Pid> {
    let cpu_id = crate::arch::current_cpu_id();
    let pid = crate::smp::percpu::get(cpu_id).current_pid();

    if pid == 0 {
        None
    } else {
        Some(pid)
    }
}

/// Set current running task (on current CPU)
pub fn set_current(pid: Pid) {
    let cpu_id = crate::arch::current_cpu_id();

    crate::smp::percpu::get(cpu_id).set_current_pid(pid);
    TIMESLICE_REMAINING[cpu_id].store(TIMESLICE_TICKS, Ordering::Release);

    // Mark CPU as not idle
    crate::smp::percpu::get(cpu_id).set_idle(false);
}

/// Look up a task's current scheduling priority from the process table.
/// Falls back to the default priority if the task is gone.
fn priority_of(pid: Pid) -> u8 {
    let table = super::get_process_table();
    table.as_ref()
        .and_then(|t| t.get(pid))
        .map(|task| task.priority)
        .unwrap_or(super::task::DEFAULT_PRIORITY)
}

/// Add task to run queue (local CPU), at its current priority
pub fn enqueue(pid: Pid) {
    let priority = priority_of(pid);
    crate::smp::percpu::enqueue_current(pid, priority);
    crate::debug!("Scheduler: enqueued task PID {} (prio {}) on CPU {}", pid, priority, crate::arch::current_cpu_id());
}

/// Add task to specific CPU's run queue, at its current priority
pub fn enqueue_on(cpu_id: usize, pid: Pid) {
    let priority = priority_of(pid);
    crate::smp::percpu::enqueue_on(cpu_id, pid, priority);
    crate::debug!("Scheduler: enqueued task PID {} (prio {}) on CPU {}", pid, priority, cpu_id);
}

/// Remove task from its priority bucket on the current CPU
pub fn dequeue(pid: Pid) {
    let cpu_id = crate::arch::current_cpu_id();
    let priority = priority_of(pid);
    crate::smp::percpu::remove_current(pid, priority);
    crate::debug!("Scheduler: dequeued task PID {} from CPU {}", pid, cpu_id);
}

/// Priority inheritance: boost `holder`'s priority to at least
/// `blocker_priority` because `blocker` is waiting on a lock `holder`
/// owns. Records the original priority on first boost only, so nested
/// boosts from multiple waiters don't clobber it; per spec, nested
/// inheritance uses the maximum of all boosting waiters.
pub fn boost_priority(holder: Pid, blocker_priority: u8) {
    let mut table = super::get_process_table();
    let table = match table.as_mut() {
        Some(t) => t,
        None => return,
    };
    let task = match table.get_mut(holder) {
        Some(t) => t,
        None => return,
    };

    if blocker_priority <= task.priority {
        return;
    }

    if task.orig_priority.is_none() {
        task.orig_priority = Some(task.priority);
    }
    let old_priority = task.priority;
    task.priority = blocker_priority;
    crate::debug!("Scheduler: boosted PID {} priority {} -> {}", holder, old_priority, blocker_priority);

    // If the holder is already sitting in a run queue, it needs to move to
    // the bucket matching its new priority.
    relocate_in_runqueue(holder, old_priority, blocker_priority);
}

/// Restore `holder`'s priority to what it was before the last
/// `boost_priority` call, once the inherited lock is released.
pub fn restore_priority(holder: Pid) {
    let mut table = super::get_process_table();
    let table = match table.as_mut() {
        Some(t) => t,
        None => return,
    };
    let task = match table.get_mut(holder) {
        Some(t) => t,
        None => return,
    };

    let original = match task.orig_priority.take() {
        Some(p) => p,
        None => return,
    };
    let boosted = task.priority;
    task.priority = original;
    crate::debug!("Scheduler: restored PID {} priority {} -> {}", holder, boosted, original);

    relocate_in_runqueue(holder, boosted, original);
}

/// Move a pid already sitting in a run-queue bucket to the bucket for its
/// new priority. A no-op if the task isn't currently enqueued anywhere
/// (e.g. it's the currently-running task, or blocked).
fn relocate_in_runqueue(pid: Pid, old_priority: u8, new_priority: u8) {
    if old_priority == new_priority {
        return;
    }
    for cpu_id in 0..crate::smp::MAX_CPUS {
        let percpu = crate::smp::percpu::get(cpu_id);
        if percpu.remove_pid(pid, old_priority) {
            percpu.enqueue_at(pid, new_priority);
            return;
        }
    }
}

/// Timer tick handler - called from IRQ handler on each CPU
pub fn timer_tick() {
    let cpu_id = crate::arch::current_cpu_id();

    // Increment per-CPU timer ticks
    crate::smp::percpu::get(cpu_id).inc_timer_ticks();

    // Decrement timeslice
    let remaining = TIMESLICE_REMAINING[cpu_id].load(Ordering::Acquire);
    if remaining > 0 {
        TIMESLICE_REMAINING[cpu_id].store(remaining - 1, Ordering::Release);
    }

    if remaining == 0 {
        // Timeslice expired, request reschedule
        NEED_RESCHED[cpu_id].store(true, Ordering::Release);
        crate::debug!("Scheduler: CPU {} timeslice expired, need resched", cpu_id);
    }

    // Periodic load balancing (every 10 ticks = 10ms at the 1000Hz PIT rate)
    if crate::smp::percpu::get(cpu_id).timer_ticks.load(Ordering::Relaxed) % 10 == 0 {
        balance_load();
    }
}

/// Check if reschedule is needed (on current CPU)
pub fn need_resched() -> bool {
    let cpu_id = crate::arch::current_cpu_id();
    NEED_RESCHED[cpu_id].load(Ordering::Acquire)
}

/// Clear reschedule flag (on current CPU)
fn clear_need_resched() {
    let cpu_id = crate::arch::current_cpu_id();
    NEED_RESCHED[cpu_id].store(false, Ordering::Release);
}

/// Pick next task to run (from current CPU's runqueue)
fn pick_next() -> Option<Pid> {
    crate::smp::percpu::dequeue_current()
}

/// Schedule next task (on current CPU)
///
/// This is the core scheduler function that performs context switching.
/// Should be called with interrupts disabled.
pub fn schedule() {
    let cpu_id = crate::arch::current_cpu_id();
    clear_need_resched();

    // Get current and next tasks
    let current = current_pid();
    let next_pid = match pick_next() {
        Some(pid) => pid,
        None => {
            // No runnable tasks, mark CPU as idle
            crate::smp::percpu::get(cpu_id).set_idle(true);
            crate::debug!("Scheduler: CPU {} idle, no runnable tasks", cpu_id);
            return;
        }
    };

    // Re-enqueue next task for round-robin
    enqueue(next_pid);

    // If same task, just reset timeslice
    if current == Some(next_pid) {
        TIMESLICE_REMAINING[cpu_id].store(TIMESLICE_TICKS, Ordering::Release);
        return;
    }

    crate::debug!("Scheduler: CPU {} switching from {:?} to {}", cpu_id, current, next_pid);

    // Increment context switch counter
    crate::smp::percpu::get(cpu_id).inc_context_switches();

    // Get process table
    let mut table = super::get_process_table();
    let table = match table.as_mut() {
        Some(t) => t,
        None => {
            crate::error!("Scheduler: process table not initialized");
            return;
        }
    };

    // Get next task
    let next = match table.get_mut(next_pid) {
        Some(task) => task,
        None => {
            crate::error!("Scheduler: next task {} not found", next_pid);
            return;
        }
    };

    // Switch to next task's address space
    if next.mm.page_table != 0 {
        crate::mm::switch_user_mm(next.mm.page_table);
    }

    // Point this CPU's TSS RSP0 at the next task's kernel stack, and stash
    // its trap frame pointer so the return-to-userspace path (end of the
    // syscall/interrupt entry stub) knows which frame to `iretq` from.
    let kstack_top = crate::arch::x86_64::paging::phys_to_virt(
        PhysAddr::new(next.kstack + crate::process::task::KSTACK_SIZE as u64),
    )
    .as_u64();
    let trap_frame_ptr = &mut next.trap_frame as *mut _;
    let cpu = crate::arch::percpu::CpuLocal::current_mut();
    cpu.set_kernel_stack(kstack_top);
    cpu.set_trap_frame(trap_frame_ptr);

    // Update current PID
    set_current(next_pid);

    crate::debug!("Scheduler: CPU {} switched to task {}", cpu_id, next_pid);
}

/// Yield CPU voluntarily (on current CPU)
pub fn yield_now() {
    let cpu_id = crate::arch::current_cpu_id();
    NEED_RESCHED[cpu_id].store(true, Ordering::Release);
    schedule();
}

/// Block current process (on current CPU)
pub fn block_current() {
    if let Some(pid) = current_pid() {
        dequeue(pid);

        let mut table = super::get_process_table();
        if let Some(ref mut t) = *table {
            if let Some(task) = t.get_mut(pid) {
                task.state = ProcessState::Sleeping;
            }
        }

        let cpu_id = crate::arch::current_cpu_id();
        NEED_RESCHED[cpu_id].store(true, Ordering::Release);
        schedule();
    }
}

/// Wake a process by PID (enqueues on least loaded CPU)
pub fn wake_process(pid: Pid) {
    let mut table = super::get_process_table();
    if let Some(ref mut t) = *table {
        if let Some(task) = t.get_mut(pid) {
            if task.state == ProcessState::Sleeping {
                task.state = ProcessState::Running;

                // Find least loaded CPU
                let target_cpu = find_least_loaded_cpu();
                enqueue_on(target_cpu, pid);
            }
        }
    }
}

/// Find least loaded CPU
fn find_least_loaded_cpu() -> usize {
    let mut min_load = usize::MAX;
    let mut min_cpu = 0;

    for cpu_id in 0..crate::smp::MAX_CPUS {
        if !crate::smp::is_cpu_online(cpu_id) {
            continue;
        }

        let load = crate::smp::percpu::get(cpu_id).load.load(Ordering::Relaxed);
        if load < min_load {
            min_load = load;
            min_cpu = cpu_id;
        }
    }

    min_cpu
}

/// Load balancing across CPUs (Phase E)
///
/// Called periodically from timer tick to redistribute tasks across CPUs.
/// Simple algorithm: if a CPU has much more load than average, migrate tasks.
fn balance_load() {
    let cpu_id = crate::arch::current_cpu_id();

    // Calculate average load across all online CPUs
    let mut total_load = 0;
    let mut num_online = 0;

    for i in 0..crate::smp::MAX_CPUS {
        if crate::smp::is_cpu_online(i) {
            total_load += crate::smp::percpu::get(i).load.load(Ordering::Relaxed);
            num_online += 1;
        }
    }

    if num_online <= 1 {
        return; // Single CPU, no balancing needed
    }

    let avg_load = total_load / num_online;
    let my_load = crate::smp::percpu::get(cpu_id).load.load(Ordering::Relaxed);

    // If my load is significantly higher than average, try to migrate a task
    if my_load > avg_load + 2 {
        // Try to migrate one task to least loaded CPU
        if let Some(pid) = pick_next() {
            let target_cpu = find_least_loaded_cpu();

            if target_cpu != cpu_id {
                crate::debug!("Load balance: migrating PID {} from CPU {} to CPU {}",
                             pid, cpu_id, target_cpu);

                // Don't re-enqueue locally, send to target CPU
                enqueue_on(target_cpu, pid);
            } else {
                // Re-enqueue locally if no better target
                enqueue(pid);
            }
        }
    }
}

/// Get scheduler statistics
pub fn stats() -> SchedulerStats {
    let cpu_id = crate::arch::current_cpu_id();
    let percpu = crate::smp::percpu::get(cpu_id);

    SchedulerStats {
        cpu_id,
        current_pid: percpu.current_pid(),
        runqueue_len: percpu.runqueue_len(),
        context_switches: percpu.context_switches.load(Ordering::Relaxed),
        timer_ticks: percpu.timer_ticks.load(Ordering::Relaxed),
        timeslice_remaining: TIMESLICE_REMAINING[cpu_id].load(Ordering::Relaxed),
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Copy)]
pub struct SchedulerStats {
    pub cpu_id: usize,
    pub current_pid: Pid,
    pub runqueue_len: usize,
    pub context_switches: usize,
    pub timer_ticks: usize,
    pub timeslice_remaining: u32,
}
