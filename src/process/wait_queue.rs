/// FIFO wait queues for blocking on an event other than a signal.
///
/// IPC objects (pipes, message queues, shared memory) each own one or more
/// `WaitQueue`s instead of poking scheduler/process-table state directly:
/// `sleep()` parks the calling task in FIFO order and blocks it, `wake_one`
/// pops the head and makes it runnable again, `wake_all` drains the whole
/// queue. The queue only tracks waiters - it does not evaluate whatever
/// condition the caller is waiting on, so callers must re-check their
/// condition after `sleep()` returns (it may return due to a spurious
/// wake, a signal, or the event actually they were waiting for).
use super::Pid;
use alloc::collections::VecDeque;
use spin::Mutex;

pub struct WaitQueue {
    waiters: Mutex<VecDeque<Pid>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Park the calling task on this queue and block until woken.
    ///
    /// Must only be called after the caller has confirmed, under whatever
    /// lock guards the shared state, that the wait condition doesn't
    /// currently hold.
    pub fn sleep(&self) {
        let pid = super::current_pid();
        self.waiters.lock().push_back(pid);
        super::scheduler_smp::block_current();
    }

    /// Wake the longest-waiting task on this queue, if any.
    pub fn wake_one(&self) -> Option<Pid> {
        let pid = self.waiters.lock().pop_front()?;
        super::scheduler_smp::wake_process(pid);
        Some(pid)
    }

    /// Wake every task waiting on this queue.
    pub fn wake_all(&self) {
        let drained: VecDeque<Pid> = core::mem::take(&mut *self.waiters.lock());
        for pid in drained {
            super::scheduler_smp::wake_process(pid);
        }
    }

    /// Remove a specific task without waking it, e.g. it woke for a
    /// different reason (a signal) and is abandoning the wait.
    pub fn remove(&self, pid: Pid) {
        self.waiters.lock().retain(|&p| p != pid);
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_one_is_fifo() {
        let wq = WaitQueue::new();
        wq.waiters.lock().push_back(1);
        wq.waiters.lock().push_back(2);
        assert_eq!(wq.waiters.lock().pop_front(), Some(1));
        assert_eq!(wq.waiters.lock().pop_front(), Some(2));
    }

    #[test]
    fn remove_drops_only_named_pid() {
        let wq = WaitQueue::new();
        wq.waiters.lock().push_back(1);
        wq.waiters.lock().push_back(2);
        wq.waiters.lock().push_back(3);
        wq.remove(2);
        let remaining: VecDeque<Pid> = wq.waiters.lock().clone();
        assert_eq!(remaining, VecDeque::from(alloc::vec![1, 3]));
    }

    #[test]
    fn len_and_is_empty_track_queue_size() {
        let wq = WaitQueue::new();
        assert!(wq.is_empty());
        wq.waiters.lock().push_back(9);
        assert_eq!(wq.len(), 1);
        assert!(!wq.is_empty());
    }
}
