//! Trap frame pushed onto the kernel stack on syscall entry, exception, or
//! interrupt from user mode.
//!
//! Layout mirrors what the `syscall`/`iretq` entry stubs save: general
//! purpose registers first (in `push` order, so reversed in memory), then
//! the hardware-pushed exception frame (error code when applicable, then
//! the `iretq` frame: rip, cs, rflags, rsp, ss).

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    /// Hardware or software error code; 0 for traps that push none (e.g.
    /// syscall entry, where the kernel stub fills in a synthetic value).
    pub error_code: u64,

    /// Saved user instruction pointer.
    pub rip: u64,
    pub cs: u64,
    /// Saved user RFLAGS.
    pub rflags: u64,
    /// Saved user stack pointer.
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn new(rip: u64, rsp: u64, rflags: u64) -> Self {
        Self {
            r15: 0, r14: 0, r13: 0, r12: 0, r11: 0, r10: 0, r9: 0, r8: 0,
            rbp: 0, rdi: 0, rsi: 0, rdx: 0, rcx: 0, rbx: 0, rax: 0,
            error_code: 0,
            rip,
            cs: 0,
            rflags,
            rsp,
            ss: 0,
        }
    }

    /// Syscall return value slot (RAX on x86_64).
    pub fn set_return(&mut self, value: u64) {
        self.rax = value;
    }

    /// Syscall argument registers in the System V AMD64 `syscall` convention:
    /// number in rax, args in rdi, rsi, rdx, r10, r8, r9 (r10 replaces rcx,
    /// which `syscall` clobbers with the return address).
    pub fn syscall_args(&self) -> [u64; 6] {
        [self.rdi, self.rsi, self.rdx, self.r10, self.r8, self.r9]
    }

    pub fn syscall_nr(&self) -> u64 {
        self.rax
    }
}
