// Anonymous pipe implementation
// Provides anonymous pipes for IPC between processes

use crate::lib::error::{Errno, Result};
use crate::process::WaitQueue;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

/// Pipe buffer size (4KB)
const PIPE_BUF_SIZE: usize = 4096;

/// Pipe buffer shared between reader and writer
pub struct PipeBuffer {
    /// Ring buffer for data
    buffer: VecDeque<u8>,
    /// Number of readers still alive
    reader_count: usize,
    /// Number of writers still alive
    writer_count: usize,
}

impl PipeBuffer {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(PIPE_BUF_SIZE),
            reader_count: 1,
            writer_count: 1,
        }
    }

    /// Read from pipe buffer. `Ok(0)` means EOF (empty, no writers left).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.buffer.is_empty() && self.writer_count == 0 {
            return Ok(0);
        }
        if self.buffer.is_empty() {
            return Err(Errno::EAGAIN);
        }

        let to_read = buf.len().min(self.buffer.len());
        for slot in buf.iter_mut().take(to_read) {
            *slot = self.buffer.pop_front().unwrap();
        }

        Ok(to_read)
    }

    /// Write to pipe buffer. Fails with EPIPE if there are no readers left.
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.reader_count == 0 {
            return Err(Errno::EPIPE);
        }

        let available = PIPE_BUF_SIZE - self.buffer.len();
        if available == 0 {
            return Err(Errno::EAGAIN);
        }

        let to_write = buf.len().min(available);
        for &byte in buf.iter().take(to_write) {
            self.buffer.push_back(byte);
        }

        Ok(to_write)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= PIPE_BUF_SIZE
    }

    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    pub fn free_space(&self) -> usize {
        PIPE_BUF_SIZE - self.buffer.len()
    }
}

/// A pipe: its buffer plus the reader- and writer-side wait queues blocked
/// threads park on when the buffer is empty or full, respectively.
struct Pipe {
    buf: Mutex<PipeBuffer>,
    readers_waiting: WaitQueue,
    writers_waiting: WaitQueue,
}

impl Pipe {
    fn new() -> Self {
        Self {
            buf: Mutex::new(PipeBuffer::new()),
            readers_waiting: WaitQueue::new(),
            writers_waiting: WaitQueue::new(),
        }
    }
}

/// Pipe read end
#[derive(Clone)]
pub struct PipeReader {
    pipe: Arc<Pipe>,
}

impl PipeReader {
    pub fn new(pipe: Arc<Pipe>) -> Self {
        pipe.buf.lock().reader_count += 1;
        Self { pipe }
    }

    /// Read from the pipe, blocking until data or EOF is available.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.pipe.buf.lock().read(buf) {
                Err(Errno::EAGAIN) => self.pipe.readers_waiting.sleep(),
                other => {
                    // A reader just freed space; let a blocked writer retry.
                    self.pipe.writers_waiting.wake_one();
                    return other;
                }
            }
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut pipe = self.pipe.buf.lock();
        if pipe.reader_count > 0 {
            pipe.reader_count -= 1;
        }
        let last_reader_gone = pipe.reader_count == 0;
        drop(pipe);
        if last_reader_gone {
            // Writers blocked on a full buffer need to wake up and observe
            // EPIPE instead of sleeping forever.
            self.pipe.writers_waiting.wake_all();
        }
    }
}

/// Pipe write end
#[derive(Clone)]
pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

impl PipeWriter {
    pub fn new(pipe: Arc<Pipe>) -> Self {
        pipe.buf.lock().writer_count += 1;
        Self { pipe }
    }

    /// Write to the pipe, blocking until space is available. Fails with
    /// EPIPE (and delivers SIGPIPE to the calling process) if there are no
    /// readers left.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.pipe.buf.lock().write(buf) {
                Err(Errno::EPIPE) => {
                    let pid = crate::process::current_pid();
                    let _ = crate::process::signal::send_signal(pid, crate::process::signal::Signal::SIGPIPE);
                    return Err(Errno::EPIPE);
                }
                Err(Errno::EAGAIN) => self.pipe.writers_waiting.sleep(),
                other => {
                    // A writer just produced data; let a blocked reader retry.
                    self.pipe.readers_waiting.wake_one();
                    return other;
                }
            }
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut pipe = self.pipe.buf.lock();
        if pipe.writer_count > 0 {
            pipe.writer_count -= 1;
        }
        let last_writer_gone = pipe.writer_count == 0;
        drop(pipe);
        if last_writer_gone {
            // Readers blocked on an empty buffer need to wake up and
            // observe EOF instead of sleeping forever.
            self.pipe.readers_waiting.wake_all();
        }
    }
}

/// Create a new pipe (returns reader and writer)
pub fn create_pipe() -> (PipeReader, PipeWriter) {
    let pipe = Arc::new(Pipe::new());
    let reader = PipeReader::new(pipe.clone());
    let writer = PipeWriter::new(pipe);
    (reader, writer)
}

// Pipe ends are wrapped in File objects in vfs/file.rs using File::from_pipe_reader/writer
