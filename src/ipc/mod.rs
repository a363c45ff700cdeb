/// System V / POSIX IPC beyond anonymous pipes.
///
/// Named message queues and shared-memory segments. Both are global,
/// kernel-wide namespaces (not per-process), so each owns a single
/// lazily-initialized registry protected by a spinlock, the same pattern
/// `process::pid` uses for the process table.

pub mod mq;
pub mod shm;

/// Initialize the IPC registries (called once during boot).
pub fn init() {
    mq::init();
    shm::init();
}
