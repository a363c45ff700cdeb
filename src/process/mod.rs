// Process management
//
// Ties together the task table, PID allocator, fork/exec/wait/signal
// machinery and the per-CPU scheduler into a single subsystem. Syscall
// handlers reach everything here through `crate::process::*`.

pub mod task;
pub mod pid;
pub mod current;
pub mod fork;
pub mod wait;
pub mod wait_queue;
pub mod signal;
pub mod scheduler;
pub mod scheduler_smp;
pub mod exec;

pub use task::{Credentials, FileTable, MemoryManager, Pid, ProcessState, Task, Vma, VmaFlags};
pub use pid::{alloc_pid, get_process_table, init_process_table, insert_task, PidTable};
pub use wait::do_exit;
pub use wait_queue::WaitQueue;
use crate::lib::error::Errno;

/// Get the PID of the task running on the current CPU.
///
/// Backed by per-CPU scheduler state rather than `current::current_pid`'s
/// single global atomic, which doesn't hold up once more than one CPU is
/// scheduling independently.
pub fn current_pid() -> Pid {
    let cpu_id = crate::arch::current_cpu_id();
    crate::smp::percpu::get(cpu_id).current_pid()
}

/// Wait for a child to exit (wait4/waitpid). Delegates to `wait::do_wait4`
/// with the calling task's PID filled in.
pub fn do_wait4(pid: i32, wstatus: *mut i32, options: i32) -> Result<Pid, Errno> {
    wait::do_wait4(current_pid(), pid, wstatus, options)
}

/// clone(2) flags this kernel understands; unrecognized bits are ignored
/// rather than rejected, matching Linux's tolerance of vendor flag bits.
pub const CLONE_VM: u64 = 0x0000_0100;
pub const CLONE_FILES: u64 = 0x0000_0400;
pub const CLONE_THREAD: u64 = 0x0001_0000;

/// clone(2): like fork, but optionally shares the address space and/or
/// file descriptor table with the parent instead of duplicating them.
/// `child_stack`, if non-zero, becomes the child's initial user stack
/// pointer (required for CLONE_VM - two tasks can't share one stack).
pub fn do_clone(flags: u64, child_stack: u64) -> Result<Pid, Errno> {
    let parent_pid = current_pid();

    let parent_uid = {
        let table = get_process_table();
        let table = table.as_ref().ok_or(Errno::ESRCH)?;
        table.get(parent_pid).ok_or(Errno::ESRCH)?.cred.uid
    };
    crate::cap::check_can_fork(parent_uid)?;
    crate::cap::check_fork_rate_limit(parent_uid, crate::time::get_time_since_boot_ms())?;

    let child_pid = alloc_pid().map_err(|_| Errno::EAGAIN)?;

    let mut table = get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let parent = table.get(parent_pid).ok_or(Errno::ESRCH)?;

    let mut child = Task::fork_from(parent, child_pid);

    if flags & CLONE_VM != 0 {
        // Thread semantics: share the parent's live address space instead
        // of the COW duplicate fork_from() already built for it.
        child.mm = MemoryManager {
            page_table: parent.mm.page_table,
            brk: parent.mm.brk,
            brk_start: parent.mm.brk_start,
            stack_top: parent.mm.stack_top,
            mmap_base: parent.mm.mmap_base,
            vmas: parent.mm.vmas.clone(),
        };
    }
    if flags & CLONE_FILES != 0 {
        child.files = FileTable {
            fds: parent.files.fds.clone(),
        };
    }
    if child_stack != 0 {
        child.trap_frame.rsp = child_stack;
    }
    if flags & CLONE_THREAD != 0 {
        child.ppid = parent.ppid;
    }

    drop(table);
    insert_task(child).map_err(|_| Errno::ENOMEM)?;
    crate::cap::record_fork(parent_uid);
    scheduler_smp::enqueue(child_pid);

    Ok(child_pid)
}

/// nanosleep(2). No per-task sleep queue yet, so this cooperatively spins
/// and yields the CPU until the deadline passes.
pub fn do_nanosleep(ns: u64) {
    let deadline_us = crate::time::get_time_since_boot_us() + ns / 1000;
    while crate::time::get_time_since_boot_us() < deadline_us {
        scheduler_smp::yield_now();
    }
}
