// Signal handling infrastructure for Phase A1
// Implements basic POSIX signal delivery and handling

use crate::arch::x86_64::trapframe::TrapFrame;
use crate::lib::error::{Errno, Result};
use crate::mm::PAGE_SIZE;
use crate::process::Task;
use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};

/// Fixed userspace address of the sigreturn trampoline, mapped into every
/// task's address space at exec time (a single `syscall; ` instruction
/// sequence invoking `sys_rt_sigreturn`). Placed just below the guard page
/// so it never collides with a real executable's own mappings.
pub const TRAMPOLINE_VADDR: u64 = crate::mm::USER_STACK_TOP - PAGE_SIZE as u64;

/// Translate a user virtual address to a kernel-accessible pointer, mapping
/// a fresh zeroed page in if none is resident yet (the stack always grows
/// downward into VMA-reserved-but-unmapped territory).
fn translate_or_map(task: &mut Task, vaddr: u64) -> Result<u64> {
    let pml4 = task.mm.page_table;
    let page = vaddr & !(PAGE_SIZE as u64 - 1);
    let offset = vaddr - page;

    let phys = match crate::mm::paging::cow_lookup(pml4, page) {
        Some((phys, _is_cow, _refcount)) => phys,
        None => {
            let phys = crate::mm::alloc_page().ok_or(Errno::ENOMEM)?;
            crate::mm::paging::map_page(pml4, page, phys, crate::mm::PteFlags::user_rw())
                .map_err(|_| Errno::ENOMEM)?;
            phys
        }
    };

    Ok(crate::arch::x86_64::paging::phys_to_virt(x86_64::PhysAddr::new(phys)).as_u64() + offset)
}

fn write_bytes_to_user(task: &mut Task, vaddr: u64, bytes: &[u8]) -> Result<()> {
    let dst = translate_or_map(task, vaddr)? as *mut u8;
    unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
    Ok(())
}

fn write_u64_to_user(task: &mut Task, vaddr: u64, value: u64) -> Result<()> {
    write_bytes_to_user(task, vaddr, &value.to_le_bytes())
}

fn read_bytes_from_user(task: &mut Task, vaddr: u64, buf: &mut [u8]) -> Result<()> {
    let src = translate_or_map(task, vaddr)? as *const u8;
    unsafe { core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
    Ok(())
}

fn write_trap_frame_to_user(task: &mut Task, vaddr: u64, frame: &TrapFrame) -> Result<()> {
    let bytes = unsafe {
        core::slice::from_raw_parts(
            frame as *const TrapFrame as *const u8,
            core::mem::size_of::<TrapFrame>(),
        )
    };
    write_bytes_to_user(task, vaddr, bytes)
}

fn read_trap_frame_from_user(task: &mut Task, vaddr: u64) -> Result<TrapFrame> {
    let mut frame = TrapFrame::default();
    let buf = unsafe {
        core::slice::from_raw_parts_mut(
            &mut frame as *mut TrapFrame as *mut u8,
            core::mem::size_of::<TrapFrame>(),
        )
    };
    read_bytes_from_user(task, vaddr, buf)?;
    Ok(frame)
}

/// `rt_sigreturn`: restore the trap frame saved by `deliver_signals` before
/// it diverted execution to the handler. Called via the trampoline once the
/// handler returns.
pub fn sigreturn(task: &mut Task) -> Result<()> {
    if !task.signals.in_handler {
        return Err(Errno::EINVAL);
    }
    let addr = task.signals.saved_frame_addr;
    let restored = read_trap_frame_from_user(task, addr)?;
    task.trap_frame = restored;
    task.signals.in_handler = false;
    Ok(())
}

pub type Pid = u32;

/// Signal numbers (POSIX standard)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    SIGHUP = 1,    // Hangup
    SIGINT = 2,    // Interrupt (Ctrl-C)
    SIGQUIT = 3,   // Quit
    SIGILL = 4,    // Illegal instruction
    SIGTRAP = 5,   // Trace/breakpoint trap
    SIGABRT = 6,   // Abort
    SIGBUS = 7,    // Bus error
    SIGFPE = 8,    // Floating point exception
    SIGKILL = 9,   // Kill (uncatchable)
    SIGUSR1 = 10,  // User-defined signal 1
    SIGSEGV = 11,  // Segmentation fault
    SIGUSR2 = 12,  // User-defined signal 2
    SIGPIPE = 13,  // Broken pipe
    SIGALRM = 14,  // Alarm clock
    SIGTERM = 15,  // Termination
    SIGCHLD = 17,  // Child status changed
    SIGCONT = 18,  // Continue if stopped
    SIGSTOP = 19,  // Stop (uncatchable)
    SIGTSTP = 20,  // Stop (Ctrl-Z)
    SIGTTIN = 21,  // Background read from TTY
    SIGTTOU = 22,  // Background write to TTY
}

impl Signal {
    pub fn from_u32(signo: u32) -> Option<Self> {
        match signo {
            1 => Some(Signal::SIGHUP),
            2 => Some(Signal::SIGINT),
            3 => Some(Signal::SIGQUIT),
            4 => Some(Signal::SIGILL),
            5 => Some(Signal::SIGTRAP),
            6 => Some(Signal::SIGABRT),
            7 => Some(Signal::SIGBUS),
            8 => Some(Signal::SIGFPE),
            9 => Some(Signal::SIGKILL),
            10 => Some(Signal::SIGUSR1),
            11 => Some(Signal::SIGSEGV),
            12 => Some(Signal::SIGUSR2),
            13 => Some(Signal::SIGPIPE),
            14 => Some(Signal::SIGALRM),
            15 => Some(Signal::SIGTERM),
            17 => Some(Signal::SIGCHLD),
            18 => Some(Signal::SIGCONT),
            19 => Some(Signal::SIGSTOP),
            20 => Some(Signal::SIGTSTP),
            21 => Some(Signal::SIGTTIN),
            22 => Some(Signal::SIGTTOU),
            _ => None,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }

    /// Check if signal can be caught/blocked/ignored
    pub fn is_catchable(self) -> bool {
        !matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// Get default action for signal
    pub fn default_action(self) -> SignalAction {
        match self {
            Signal::SIGCHLD | Signal::SIGCONT => SignalAction::Ignore,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                SignalAction::Stop
            }
            Signal::SIGCONT => SignalAction::Continue,
            _ => SignalAction::Terminate,
        }
    }
}

/// Signal action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Ignore signal
    Ignore,
    /// Terminate process
    Terminate,
    /// Stop process
    Stop,
    /// Continue process (if stopped)
    Continue,
    /// Call user handler at this address
    Handler(u64),
}

/// Signal handler registration (for sigaction)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SigAction {
    /// Handler function pointer or SIG_DFL/SIG_IGN
    pub sa_handler: u64,
    /// Signal mask to block during handler
    pub sa_mask: u64,
    /// Flags (SA_RESTART, SA_SIGINFO, etc.)
    pub sa_flags: i32,
    /// Restorer function (for sigreturn)
    pub sa_restorer: u64,
}

impl Default for SigAction {
    fn default() -> Self {
        Self {
            sa_handler: 0, // SIG_DFL
            sa_mask: 0,
            sa_flags: 0,
            sa_restorer: 0,
        }
    }
}

/// Signal queue for pending signals
pub struct SignalQueue {
    /// Pending signals (bitset of signal numbers)
    pending: AtomicU64,
    /// Blocked signals (bitset of signal numbers)
    blocked: AtomicU64,
    /// Signal handlers (indexed by signal number)
    handlers: [SignalAction; 32],
    /// True while a user handler is executing (between dispatch and sigreturn).
    pub in_handler: bool,
    /// User-stack address of the saved trap frame, valid while `in_handler`.
    pub saved_frame_addr: u64,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            handlers: [SignalAction::Terminate; 32],
            in_handler: false,
            saved_frame_addr: 0,
        }
    }

    /// Add a signal to the pending set
    pub fn add_signal(&self, sig: Signal) {
        let bit = 1u64 << (sig.to_u32() - 1);
        self.pending.fetch_or(bit, Ordering::SeqCst);
    }

    /// Remove a signal from the pending set
    pub fn remove_signal(&self, sig: Signal) {
        let bit = 1u64 << (sig.to_u32() - 1);
        self.pending.fetch_and(!bit, Ordering::SeqCst);
    }

    /// Check if a signal is pending
    pub fn is_pending(&self, sig: Signal) -> bool {
        let bit = 1u64 << (sig.to_u32() - 1);
        (self.pending.load(Ordering::SeqCst) & bit) != 0
    }

    /// Get the next pending, unblocked signal
    pub fn next_pending(&self) -> Option<Signal> {
        let pending = self.pending.load(Ordering::SeqCst);
        let blocked = self.blocked.load(Ordering::SeqCst);
        let deliverable = pending & !blocked;

        if deliverable == 0 {
            return None;
        }

        // Find lowest bit set (lowest signal number)
        let signo = deliverable.trailing_zeros() + 1;
        Signal::from_u32(signo)
    }

    /// Block a signal
    pub fn block(&self, sig: Signal) {
        let bit = 1u64 << (sig.to_u32() - 1);
        self.blocked.fetch_or(bit, Ordering::SeqCst);
    }

    /// Unblock a signal
    pub fn unblock(&self, sig: Signal) {
        let bit = 1u64 << (sig.to_u32() - 1);
        self.blocked.fetch_and(!bit, Ordering::SeqCst);
    }

    /// Current blocked-signal bitmask (rt_sigprocmask's `oldset`)
    pub fn blocked_mask(&self) -> u64 {
        self.blocked.load(Ordering::SeqCst)
    }

    /// OR the given bitmask into the blocked set (SIG_BLOCK)
    pub fn block_mask(&self, mask: u64) {
        self.blocked.fetch_or(mask, Ordering::SeqCst);
    }

    /// Clear the given bits from the blocked set (SIG_UNBLOCK)
    pub fn unblock_mask(&self, mask: u64) {
        self.blocked.fetch_and(!mask, Ordering::SeqCst);
    }

    /// Replace the blocked set wholesale (SIG_SETMASK). SIGKILL/SIGSTOP can
    /// never be blocked regardless of what the caller passes.
    pub fn set_blocked_mask(&self, mask: u64) {
        let unblockable = (1u64 << (Signal::SIGKILL.to_u32() - 1)) | (1u64 << (Signal::SIGSTOP.to_u32() - 1));
        self.blocked.store(mask & !unblockable, Ordering::SeqCst);
    }

    /// Set signal handler. SIGKILL and SIGSTOP are not catchable and keep
    /// their default action regardless of what the caller asks for.
    pub fn set_handler(&mut self, sig: Signal, action: SignalAction) {
        if !sig.is_catchable() {
            return;
        }
        let idx = (sig.to_u32() - 1) as usize;
        if idx < 32 {
            self.handlers[idx] = action;
        }
    }

    /// Get signal handler
    pub fn get_handler(&self, sig: Signal) -> SignalAction {
        let idx = (sig.to_u32() - 1) as usize;
        if idx < 32 {
            self.handlers[idx]
        } else {
            SignalAction::Terminate
        }
    }

    /// Clear all pending signals
    pub fn clear_all(&self) {
        self.pending.store(0, Ordering::SeqCst);
    }
}

impl Clone for SignalQueue {
    fn clone(&self) -> Self {
        Self {
            pending: AtomicU64::new(self.pending.load(Ordering::SeqCst)),
            blocked: AtomicU64::new(self.blocked.load(Ordering::SeqCst)),
            handlers: self.handlers,
            in_handler: self.in_handler,
            saved_frame_addr: self.saved_frame_addr,
        }
    }
}

/// Send a signal to a process
pub fn send_signal(pid: Pid, sig: Signal) -> Result<()> {
    {
        let mut table = crate::process::get_process_table();
        let table = table.as_mut().ok_or(Errno::ESRCH)?;
        let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;
        task.signals.add_signal(sig);
    }

    // wake_process() re-checks Sleeping and re-enqueues under its own lock;
    // a no-op if the process wasn't actually sleeping.
    crate::process::scheduler_smp::wake_process(pid);

    Ok(())
}

/// Deliver pending signals to current process
/// Called before returning to userspace from syscall or interrupt
pub fn deliver_signals() {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let Some(ref mut table) = *table else {
        return;
    };
    let Some(task) = table.get_mut(pid) else {
        return;
    };

    // Get next deliverable signal
    let Some(sig) = task.signals.next_pending() else {
        return;
    };

    // Remove from pending set
    task.signals.remove_signal(sig);

    // Get action
    let action = task.signals.get_handler(sig);

    match action {
        SignalAction::Ignore => {
            // Do nothing
        }
        SignalAction::Terminate => {
            // Terminate process
            crate::info!("Process {} terminated by signal {:?}", pid, sig);
            task.exit_code = 128 + sig.to_u32() as i32;
            task.state = crate::process::ProcessState::Zombie;
            // Notify parent
            if task.ppid != 0 {
                let _ = send_signal(task.ppid, Signal::SIGCHLD);
            }
        }
        SignalAction::Stop => {
            // Stop process (Phase A1: minimal support)
            task.state = crate::process::ProcessState::Stopped;
        }
        SignalAction::Continue => {
            // Continue process if stopped
            if task.state == crate::process::ProcessState::Stopped {
                task.state = crate::process::ProcessState::Running;
            }
        }
        SignalAction::Handler(handler_addr) => {
            // Build a signal frame on the user stack so `sigreturn` can
            // restore the interrupted context, then divert rip/rdi to the
            // handler per the System V AMD64 calling convention (first
            // integer argument in rdi).
            let saved_frame = task.trap_frame;
            let mut sp = saved_frame.rsp;

            // Red zone: leave 128 bytes alone per the ABI before pushing.
            sp -= 128;
            sp &= !0xF;
            sp -= core::mem::size_of::<TrapFrame>() as u64;
            let frame_addr = sp;

            if write_trap_frame_to_user(task, frame_addr, &saved_frame).is_ok() {
                // Fake return address: sigreturn trampoline, installed on
                // every task's stack at exec time (see process::signal::TRAMPOLINE_VADDR).
                sp -= 8;
                let _ = write_u64_to_user(task, sp, TRAMPOLINE_VADDR);

                task.trap_frame.rip = handler_addr;
                task.trap_frame.rdi = sig.to_u32() as u64;
                task.trap_frame.rsp = sp;
                task.signals.in_handler = true;
                task.signals.saved_frame_addr = frame_addr;
            } else {
                crate::error!("signal: failed to build signal frame for pid {}", pid);
            }
        }
    }
}

/// Constants for sigaction
pub const SIG_DFL: u64 = 0; // Default action
pub const SIG_IGN: u64 = 1; // Ignore signal

/// Flags for sigaction
pub const SA_RESTART: i32 = 0x10000000;
pub const SA_SIGINFO: i32 = 0x00000004;
