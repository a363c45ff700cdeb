/// POSIX message queues.
///
/// Named queues looked up by a path-like name (`/queue_name`). Each queue
/// holds messages ordered by descending priority, FIFO among equal
/// priorities, bounded by `max_msgs` and `max_msg_size`. Blocking
/// send/receive park on a per-queue `WaitQueue` instead of busy-waiting.

use crate::lib::error::{Errno, Result};
use crate::process::WaitQueue;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Valid message priorities are `0..MQ_PRIO_MAX`; the top value itself is
/// reserved, matching glibc's `mq_open(3)`.
pub const MQ_PRIO_MAX: u32 = 32768;

const DEFAULT_MAX_MSGS: usize = 10;
const DEFAULT_MAX_MSG_SIZE: usize = 8192;

struct Message {
    priority: u32,
    data: Vec<u8>,
}

struct QueueState {
    messages: VecDeque<Message>,
    max_msgs: usize,
    max_msg_size: usize,
}

/// A single named message queue, shared by every descriptor opened
/// against it.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    not_empty: WaitQueue,
    not_full: WaitQueue,
}

impl MessageQueue {
    fn new(max_msgs: usize, max_msg_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                max_msgs,
                max_msg_size,
            }),
            not_empty: WaitQueue::new(),
            not_full: WaitQueue::new(),
        }
    }

    pub fn max_msg_size(&self) -> usize {
        self.state.lock().max_msg_size
    }

    pub fn max_msgs(&self) -> usize {
        self.state.lock().max_msgs
    }

    pub fn depth(&self) -> usize {
        self.state.lock().messages.len()
    }

    fn try_send(&self, data: &[u8], priority: u32) -> Result<()> {
        if priority >= MQ_PRIO_MAX {
            return Err(Errno::EINVAL);
        }
        let mut state = self.state.lock();
        if data.len() > state.max_msg_size {
            return Err(Errno::EMSGSIZE);
        }
        if state.messages.len() >= state.max_msgs {
            return Err(Errno::EAGAIN);
        }
        let pos = state
            .messages
            .iter()
            .position(|m| m.priority < priority)
            .unwrap_or(state.messages.len());
        state.messages.insert(pos, Message { priority, data: Vec::from(data) });
        Ok(())
    }

    /// Enqueue `data` at `priority`. Blocks until there's room unless
    /// `nonblocking`.
    pub fn send(&self, data: &[u8], priority: u32, nonblocking: bool) -> Result<()> {
        loop {
            match self.try_send(data, priority) {
                Err(Errno::EAGAIN) if !nonblocking => self.not_full.sleep(),
                result => {
                    if result.is_ok() {
                        self.not_empty.wake_one();
                    }
                    return result;
                }
            }
        }
    }

    fn try_receive(&self, buf: &mut [u8]) -> Result<(usize, u32)> {
        let mut state = self.state.lock();
        let msg = match state.messages.pop_front() {
            Some(m) => m,
            None => return Err(Errno::EAGAIN),
        };
        if msg.data.len() > buf.len() {
            let priority = msg.priority;
            state.messages.push_front(msg);
            let _ = priority;
            return Err(Errno::EMSGSIZE);
        }
        let len = msg.data.len();
        buf[..len].copy_from_slice(&msg.data);
        Ok((len, msg.priority))
    }

    /// Pop the highest-priority message into `buf`. Blocks until a
    /// message is available unless `nonblocking`. Returns the message
    /// length and its priority.
    pub fn receive(&self, buf: &mut [u8], nonblocking: bool) -> Result<(usize, u32)> {
        loop {
            match self.try_receive(buf) {
                Err(Errno::EAGAIN) if !nonblocking => self.not_empty.sleep(),
                result => {
                    if result.is_ok() {
                        self.not_full.wake_one();
                    }
                    return result;
                }
            }
        }
    }
}

struct Registry {
    /// name -> (queue, number of open descriptors referencing it)
    queues: Vec<(String, Arc<MessageQueue>, usize)>,
}

static REGISTRY: Mutex<Option<Registry>> = Mutex::new(None);

pub fn init() {
    *REGISTRY.lock() = Some(Registry { queues: Vec::new() });
}

/// mq_open flags this kernel understands (the POSIX subset `open(2)`
/// shares with message queues).
pub const O_CREAT: i32 = 0o100;
pub const O_EXCL: i32 = 0o200;

/// Open (optionally creating) a named queue. `max_msgs`/`max_msg_size`
/// are only consulted when the queue is created; `0` means "use the
/// default depth/message size".
pub fn open(
    name: &str,
    oflag: i32,
    max_msgs: usize,
    max_msg_size: usize,
) -> Result<Arc<MessageQueue>> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;

    if let Some(entry) = registry.queues.iter_mut().find(|(n, _, _)| n == name) {
        if oflag & O_CREAT != 0 && oflag & O_EXCL != 0 {
            return Err(Errno::EEXIST);
        }
        entry.2 += 1;
        return Ok(entry.1.clone());
    }

    if oflag & O_CREAT == 0 {
        return Err(Errno::ENOENT);
    }

    let max_msgs = if max_msgs == 0 { DEFAULT_MAX_MSGS } else { max_msgs };
    let max_msg_size = if max_msg_size == 0 { DEFAULT_MAX_MSG_SIZE } else { max_msg_size };
    let queue = Arc::new(MessageQueue::new(max_msgs, max_msg_size));
    registry.queues.push((String::from(name), queue.clone(), 1));
    Ok(queue)
}

/// Remove `name` from the namespace. Queues with descriptors still open
/// against them stay alive (via `Arc`) until the last one closes; new
/// `open()` calls will no longer find them under this name.
pub fn unlink(name: &str) -> Result<()> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(Errno::EINVAL)?;
    let pos = registry.queues.iter().position(|(n, _, _)| n == name).ok_or(Errno::ENOENT)?;
    registry.queues.remove(pos);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn send_orders_by_descending_priority() {
        let q = MessageQueue::new(4, 64);
        q.try_send(b"low", 1).unwrap();
        q.try_send(b"high", 9).unwrap();
        q.try_send(b"mid", 5).unwrap();

        let mut buf = [0u8; 64];
        let (len, prio) = q.try_receive(&mut buf).unwrap();
        assert_eq!(prio, 9);
        assert_eq!(&buf[..len], b"high");

        let (len, prio) = q.try_receive(&mut buf).unwrap();
        assert_eq!(prio, 5);
        assert_eq!(&buf[..len], b"mid");

        let (len, prio) = q.try_receive(&mut buf).unwrap();
        assert_eq!(prio, 1);
        assert_eq!(&buf[..len], b"low");
    }

    #[test]
    fn fifo_within_same_priority() {
        let q = MessageQueue::new(4, 64);
        q.try_send(b"first", 3).unwrap();
        q.try_send(b"second", 3).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = q.try_receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"first");
        let (len, _) = q.try_receive(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"second");
    }

    #[test]
    fn priority_must_be_below_mq_prio_max() {
        let q = MessageQueue::new(4, 64);
        assert_eq!(q.try_send(b"x", MQ_PRIO_MAX), Err(Errno::EINVAL));
        assert!(q.try_send(b"x", MQ_PRIO_MAX - 1).is_ok());
    }

    #[test]
    fn full_queue_is_would_block() {
        let q = MessageQueue::new(1, 64);
        q.try_send(b"a", 0).unwrap();
        assert_eq!(q.try_send(b"b", 0), Err(Errno::EAGAIN));
    }

    #[test]
    fn oversized_message_rejected() {
        let q = MessageQueue::new(4, 4);
        assert_eq!(q.try_send(b"toolong", 0), Err(Errno::EMSGSIZE));
    }

    #[test]
    fn receive_buffer_too_small_leaves_message_queued() {
        let q = MessageQueue::new(4, 64);
        q.try_send(b"hello", 0).unwrap();
        let mut tiny = [0u8; 2];
        assert_eq!(q.try_receive(&mut tiny), Err(Errno::EMSGSIZE));
        assert_eq!(q.depth(), 1);
        let mut big = [0u8; 64];
        let (len, _) = q.try_receive(&mut big).unwrap();
        assert_eq!(&big[..len], b"hello");
    }

    #[test]
    fn empty_queue_is_would_block() {
        let q = MessageQueue::new(4, 64);
        let mut buf = vec![0u8; 4];
        assert_eq!(q.try_receive(&mut buf), Err(Errno::EAGAIN));
    }
}
