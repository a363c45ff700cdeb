// Syscall infrastructure
//
// Synchronous dispatch table keyed on the x86_64 Linux syscall numbering
// convention already used by arch::x86_64's SYSCALL/SYSRET entry path.

pub mod uaccess;

use crate::lib::error::{Errno, Result};

/// Syscall dispatcher - routes syscall number to appropriate handler.
///
/// x86_64 `syscall` ABI: number in rax, args in rdi/rsi/rdx/r10/r8/r9,
/// return value in rax (negated errno on failure). `TrapFrame::syscall_nr`
/// and `TrapFrame::syscall_args` extract these before calling in.
pub fn syscall_dispatcher(nr: usize, args: &[u64; 6]) -> isize {
    let result = match nr {
        0 => sys_read(args[0] as i32, args[1] as *mut u8, args[2] as usize),
        1 => sys_write(args[0] as i32, args[1] as *const u8, args[2] as usize),
        2 => sys_openat(libc_at_fdcwd(), args[0] as *const u8, args[1] as i32, args[2] as u32),
        3 => sys_close(args[0] as i32),
        5 => sys_fstat(args[0] as i32, args[1] as *mut u8),
        8 => sys_lseek(args[0] as i32, args[1] as i64, args[2] as i32),
        9 => sys_mmap(args[0] as *mut u8, args[1] as usize, args[2] as i32, args[3] as i32, args[4] as i32, args[5] as i64),
        10 => sys_mprotect(args[0] as *mut u8, args[1] as usize, args[2] as i32),
        11 => sys_munmap(args[0] as *mut u8, args[1] as usize),
        12 => sys_brk(args[0] as *const u8),
        13 => sys_rt_sigaction(args[0] as i32, args[1] as *const u8, args[2] as *mut u8),
        14 => sys_rt_sigprocmask(args[0] as i32, args[1] as *const u8, args[2] as *mut u8),
        15 => sys_rt_sigreturn(),
        22 => sys_pipe2(args[0] as *mut i32, 0),
        24 => sys_sched_yield(),
        35 => sys_nanosleep(args[0] as *const u8, args[1] as *mut u8),
        39 => sys_getpid(),
        56 => sys_clone(args[0], args[1] as *mut u8, args[2] as i32),
        57 => sys_fork(),
        59 => sys_execve(args[0] as *const u8, args[1] as *const *const u8, args[2] as *const *const u8),
        60 => sys_exit(args[0] as i32),
        61 => sys_wait4(args[0] as i32, args[1] as *mut i32, args[2] as i32, args[3] as *mut u8),
        62 => sys_kill(args[0] as i32, args[1] as i32),
        78 => sys_getdents64(args[0] as i32, args[1] as *mut u8, args[2] as usize),
        89 => sys_readlinkat(libc_at_fdcwd(), args[0] as *const u8, args[1] as *mut u8, args[2] as usize),
        102 => sys_getuid(),
        104 => sys_getgid(),
        105 => sys_setuid(args[0] as u32),
        106 => sys_setgid(args[0] as u32),
        107 => sys_geteuid(),
        108 => sys_getegid(),
        110 => sys_getppid(),
        117 => sys_setresuid(args[0] as u32, args[1] as u32, args[2] as u32),
        119 => sys_setresgid(args[0] as u32, args[1] as u32, args[2] as u32),
        231 => sys_exit(args[0] as i32), // exit_group: Phase A1 treats as exit
        257 => sys_openat(args[0] as i32, args[1] as *const u8, args[2] as i32, args[3] as u32),
        262 => sys_newfstatat(args[0] as i32, args[1] as *const u8, args[2] as *mut u8, args[3] as i32),
        267 => sys_readlinkat(args[0] as i32, args[1] as *const u8, args[2] as *mut u8, args[3] as usize),
        293 => sys_pipe2(args[0] as *mut i32, args[1] as i32),
        29 => sys_shmget(args[0] as i32, args[1] as usize, args[2] as i32),
        30 => sys_shmat(args[0] as i32, args[1] as *mut u8, args[2] as i32),
        31 => sys_shmctl(args[0] as i32, args[1] as i32, args[2] as *mut u8),
        67 => sys_shmdt(args[0] as *const u8),
        240 => sys_mq_open(args[0] as *const u8, args[1] as i32, args[2] as u32, args[3] as *const u8),
        241 => sys_mq_unlink(args[0] as *const u8),
        242 => sys_mq_timedsend(args[0] as i32, args[1] as *const u8, args[2] as usize, args[3] as u32),
        243 => sys_mq_timedreceive(args[0] as i32, args[1] as *mut u8, args[2] as usize, args[3] as *mut u32),

        // Unimplemented
        _ => {
            crate::warn!("Unimplemented syscall: {}", nr);
            Err(Errno::ENOSYS)
        }
    };

    match result {
        Ok(ret) => ret,
        Err(e) => e.as_isize(),
    }
}

/// Linux `AT_FDCWD`: resolve path relative to the current working directory.
fn libc_at_fdcwd() -> i32 {
    -100
}

/// sys_openat - Open a file (Phase A1: treat as open for absolute paths)
pub fn sys_openat(dirfd: i32, pathname: *const u8, flags: i32, mode: u32) -> Result<isize> {
    // For Phase A1, only support absolute paths (dirfd is ignored if path is absolute)
    let _ = dirfd;

    if pathname.is_null() {
        return Err(Errno::EFAULT);
    }

    // Copy pathname from userspace
    let path = unsafe {
        let mut len = 0;
        while len < 4096 && *pathname.add(len) != 0 {
            len += 1;
        }
        let bytes = core::slice::from_raw_parts(pathname, len);
        core::str::from_utf8(bytes).map_err(|_| Errno::EINVAL)?
    };

    // Convert flags to OpenFlags
    let open_flags = crate::vfs::OpenFlags::from_bits_truncate(flags as u32);

    // Open or create file
    let file = if open_flags.contains(crate::vfs::OpenFlags::O_CREAT) {
        // Create new file if doesn't exist
        match crate::vfs::open(path, open_flags) {
            Ok(f) => f,
            Err(Errno::ENOENT) => crate::vfs::create(path, mode, open_flags)?,
            Err(e) => return Err(e),
        }
    } else {
        crate::vfs::open(path, open_flags)?
    };

    // Get current process and allocate FD
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let fd = task.files.alloc_fd(file)?;

    crate::debug!("sys_open({}) -> fd {}", path, fd);

    Ok(fd as isize)
}

/// sys_close - Close a file descriptor
pub fn sys_close(fd: i32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    task.files.close(fd)?;

    Ok(0)
}

/// sys_lseek - Reposition file offset
pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;

    let file = task.files.get(fd)?;
    let new_offset = file.lseek(offset, whence)?;

    Ok(new_offset as isize)
}

/// sys_read - Read from file descriptor
pub fn sys_read(fd: i32, buf: *mut u8, count: usize) -> Result<isize> {
    if buf.is_null() {
        return Err(Errno::EFAULT);
    }

    if count == 0 {
        return Ok(0);
    }

    // Get file from FD table
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;

    let file = task.files.get(fd)?;

    // Create buffer
    let data = unsafe { core::slice::from_raw_parts_mut(buf, count) };

    // Read from file
    let n = file.read(data)?;

    Ok(n as isize)
}

/// sys_write - Write to file descriptor
pub fn sys_write(fd: i32, buf: *const u8, count: usize) -> Result<isize> {
    if buf.is_null() {
        return Err(Errno::EFAULT);
    }

    if count == 0 {
        return Ok(0);
    }

    // Get file from FD table
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;

    let file = task.files.get(fd)?;

    // Create buffer
    let data = unsafe { core::slice::from_raw_parts(buf, count) };

    // Write to file
    let n = file.write(data)?;

    Ok(n as isize)
}

/// sys_fstat - Get file status
pub fn sys_fstat(fd: i32, statbuf: *mut u8) -> Result<isize> {
    if statbuf.is_null() {
        return Err(Errno::EFAULT);
    }

    // Get file from FD table
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;

    let file = task.files.get(fd)?;
    let meta = file.inode.getattr()?;

    // Fill stat structure (simplified for Phase A1)
    // struct stat is large, we'll fill the important fields
    let stat = unsafe { core::slice::from_raw_parts_mut(statbuf, 128) };
    stat.fill(0);

    // Write fields (x86_64/aarch64 stat layout)
    // st_dev: 8 bytes at offset 0
    // st_ino: 8 bytes at offset 8
    // st_mode: 4 bytes at offset 24
    // st_nlink: 8 bytes at offset 16
    // st_uid: 4 bytes at offset 28
    // st_gid: 4 bytes at offset 32
    // st_size: 8 bytes at offset 48

    unsafe {
        let p = statbuf as *mut u64;
        *p.add(1) = meta.ino; // st_ino
        let pm = statbuf.add(24) as *mut u32;
        *pm = meta.mode; // st_mode
        let ps = statbuf.add(48) as *mut u64;
        *ps = meta.size; // st_size
    }

    Ok(0)
}

/// sys_getdents64 - Get directory entries
pub fn sys_getdents64(fd: i32, dirp: *mut u8, count: usize) -> Result<isize> {
    if dirp.is_null() {
        return Err(Errno::EFAULT);
    }

    // Get file from FD table
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;

    let file = task.files.get(fd)?;

    // Check if directory
    if !file.inode.is_dir() {
        return Err(Errno::ENOTDIR);
    }

    // Read directory entries
    let entries = file.inode.readdir()?;

    // Fill linux_dirent64 structures
    let mut offset = 0usize;

    for entry in entries {
        // struct linux_dirent64 layout:
        // u64 d_ino, i64 d_off, u16 d_reclen, u8 d_type, char d_name[]
        let name_bytes = entry.name.as_bytes();
        let reclen = ((19 + name_bytes.len() + 1 + 7) & !7) as u16; // Align to 8

        if offset + reclen as usize > count {
            break; // No more space
        }

        unsafe {
            let p = dirp.add(offset);
            // d_ino
            *(p as *mut u64) = entry.ino;
            // d_off (can be 0 for now)
            *(p.add(8) as *mut i64) = 0;
            // d_reclen
            *(p.add(16) as *mut u16) = reclen;
            // d_type
            *p.add(18) = match entry.itype {
                crate::vfs::InodeType::Regular => 8,    // DT_REG
                crate::vfs::InodeType::Directory => 4,  // DT_DIR
                crate::vfs::InodeType::CharDevice => 2, // DT_CHR
                crate::vfs::InodeType::Symlink => 10,   // DT_LNK
            };
            // d_name
            core::ptr::copy_nonoverlapping(name_bytes.as_ptr(), p.add(19), name_bytes.len());
            *p.add(19 + name_bytes.len()) = 0; // Null terminator
        }

        offset += reclen as usize;
    }

    Ok(offset as isize)
}

/// sys_readlinkat - Read symbolic link (stub for Phase A1)
pub fn sys_readlinkat(dirfd: i32, pathname: *const u8, buf: *mut u8, bufsiz: usize) -> Result<isize> {
    let _ = (dirfd, pathname, buf, bufsiz);
    // For Phase A1, return EINVAL (no symlinks yet)
    Err(Errno::EINVAL)
}

/// sys_exit - Terminate current process
pub fn sys_exit(code: i32) -> Result<isize> {
    let pid = crate::process::current_pid();
    crate::info!("Process {} exit with code {}", pid, code);

    // Call do_exit which never returns
    crate::process::do_exit(pid, code);
}

/// sys_getpid - Get process ID
pub fn sys_getpid() -> Result<isize> {
    let pid = crate::process::current_pid();
    Ok(pid as isize)
}

/// sys_fork - Create a child process
pub fn sys_fork() -> Result<isize> {
    let parent_pid = crate::process::current_pid();

    let parent_uid = {
        let table = crate::process::get_process_table();
        let table = table.as_ref().ok_or(Errno::ESRCH)?;
        table.get(parent_pid).ok_or(Errno::ESRCH)?.cred.uid
    };
    crate::cap::check_can_fork(parent_uid)?;
    crate::cap::check_fork_rate_limit(parent_uid, crate::time::get_time_since_boot_ms())?;

    // Allocate new PID for child
    let child_pid = crate::process::alloc_pid()
        .map_err(|_| Errno::EAGAIN)?;

    crate::info!("fork: parent={}, child={}", parent_pid, child_pid);

    // Get parent task and create child
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;

    let parent = table.get(parent_pid).ok_or(Errno::ESRCH)?;
    let mut child = crate::process::Task::fork_from(parent, child_pid);

    // Set up COW for parent and child
    crate::mm::setup_cow_for_fork(&mut child.mm)
        .map_err(|_| Errno::ENOMEM)?;

    // Insert child into process table
    drop(table); // Release lock before inserting
    crate::process::insert_task(child)
        .map_err(|_| Errno::ENOMEM)?;

    crate::cap::record_fork(parent_uid);
    crate::process::scheduler_smp::enqueue(child_pid);

    // Parent returns child PID; the child's trap frame (rax=0) was set up
    // by Task::fork_from, so it returns 0 the first time it's scheduled.
    Ok(child_pid as isize)
}

/// sys_execve - Execute a program
pub fn sys_execve(
    pathname: *const u8,
    argv: *const *const u8,
    envp: *const *const u8,
) -> Result<isize> {
    use alloc::vec::Vec;
    use alloc::string::String;

    let current_pid = crate::process::current_pid();

    // 1. Copy pathname from userspace
    let path = unsafe {
        if pathname.is_null() {
            return Err(Errno::EFAULT);
        }
        let mut len = 0;
        while len < 4096 && *pathname.add(len) != 0 {
            len += 1;
        }
        if len == 0 {
            return Err(Errno::EINVAL);
        }
        let bytes = core::slice::from_raw_parts(pathname, len);
        String::from_utf8(bytes.to_vec()).map_err(|_| Errno::EINVAL)?
    };

    crate::info!("execve: path={}", path);

    // 2. Copy argv from userspace
    let mut argv_vec = Vec::new();
    if !argv.is_null() {
        let mut i = 0;
        loop {
            let arg_ptr = unsafe { *argv.add(i) };
            if arg_ptr.is_null() {
                break;
            }
            let arg = unsafe {
                let mut len = 0;
                while len < 4096 && *arg_ptr.add(len) != 0 {
                    len += 1;
                }
                let bytes = core::slice::from_raw_parts(arg_ptr, len);
                String::from_utf8(bytes.to_vec()).map_err(|_| Errno::EINVAL)?
            };
            argv_vec.push(arg);
            i += 1;
            if i > 1024 {
                return Err(Errno::E2BIG); // Too many arguments
            }
        }
    }

    // 3. Copy envp from userspace
    let mut envp_vec = Vec::new();
    if !envp.is_null() {
        let mut i = 0;
        loop {
            let env_ptr = unsafe { *envp.add(i) };
            if env_ptr.is_null() {
                break;
            }
            let env = unsafe {
                let mut len = 0;
                while len < 4096 && *env_ptr.add(len) != 0 {
                    len += 1;
                }
                let bytes = core::slice::from_raw_parts(env_ptr, len);
                String::from_utf8(bytes.to_vec()).map_err(|_| Errno::EINVAL)?
            };
            envp_vec.push(env);
            i += 1;
            if i > 1024 {
                return Err(Errno::E2BIG); // Too many environment variables
            }
        }
    }

    crate::debug!("execve: argc={}, envc={}", argv_vec.len(), envp_vec.len());

    // 4. Open and read the ELF file
    let root = crate::vfs::get_root().ok_or(Errno::ENOENT)?;
    let inode = crate::vfs::path_lookup(&root, &path)?;

    // Read entire file into buffer
    let meta = inode.getattr()?;
    let file_size = meta.size as usize;
    if file_size > 16 * 1024 * 1024 {
        return Err(Errno::E2BIG); // File too large (16MB limit)
    }

    let mut elf_data = Vec::with_capacity(file_size);
    elf_data.resize(file_size, 0);
    let bytes_read = inode.read(0, &mut elf_data)?;
    elf_data.truncate(bytes_read);

    // 5. Get current task and load ELF
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(current_pid).ok_or(Errno::ESRCH)?;

    // Clear existing VMAs
    task.mm.vmas.clear();
    task.mm.brk = crate::mm::USER_HEAP_START;
    task.mm.brk_start = crate::mm::USER_HEAP_START;

    // Load ELF
    crate::process::exec::elf::load_elf(task, &elf_data, argv_vec, envp_vec)
        .map_err(|e| Errno::from(e))?;

    // 6. Set up FD 0/1/2 if not already open
    if task.files.get(0).is_err() {
        // Open /dev/console for stdin/stdout/stderr
        let dev_root = crate::vfs::get_root().ok_or(Errno::ENOENT)?;
        let console_inode = crate::vfs::path_lookup(&dev_root, "/dev/console")?;

        let console_file = alloc::sync::Arc::new(crate::vfs::File::new(
            console_inode,
            crate::vfs::OpenFlags::RDWR,
            &crate::drivers::char::CONSOLE_OPS,
        ));

        task.files.alloc_fd(console_file.clone())?; // FD 0 (stdin)
        task.files.alloc_fd(console_file.clone())?; // FD 1 (stdout)
        task.files.alloc_fd(console_file)?;         // FD 2 (stderr)
    }

    crate::info!("execve: loaded {} successfully", path);

    // execve does not return on success (trap frame was updated)
    Ok(0)
}

/// sys_wait4 - Wait for process to change state
pub fn sys_wait4(
    pid: i32,
    wstatus: *mut i32,
    options: i32,
    rusage: *mut u8,
) -> Result<isize> {
    let current_pid = crate::process::current_pid();

    let child_pid = crate::process::do_wait4(current_pid, pid, wstatus, options)?;

    Ok(child_pid as isize)
}

/// sys_brk - Change data segment size
pub fn sys_brk(addr: *const u8) -> Result<isize> {
    let new_brk = addr as u64;
    let pid = crate::process::current_pid();

    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let result_brk = task.mm.do_brk(new_brk)?;
    Ok(result_brk as isize)
}

/// sys_mmap - Map memory
pub fn sys_mmap(
    addr: *mut u8,
    length: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<isize> {
    let pid = crate::process::current_pid();

    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let result_addr = task.mm.do_mmap(addr as u64, length as u64, prot, flags)?;
    Ok(result_addr as isize)
}

/// sys_munmap - Unmap memory
pub fn sys_munmap(addr: *mut u8, length: usize) -> Result<isize> {
    let pid = crate::process::current_pid();

    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    task.mm.do_munmap(addr as u64, length as u64)?;
    Ok(0)
}

/// sys_mprotect - Change protection of an existing mapping
pub fn sys_mprotect(addr: *mut u8, length: usize, prot: i32) -> Result<isize> {
    let pid = crate::process::current_pid();

    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    task.mm.do_mprotect(addr as u64, length as u64, prot)?;
    Ok(0)
}

/// sys_rt_sigaction - Install/query a signal handler
pub fn sys_rt_sigaction(signum: i32, act: *const u8, oldact: *mut u8) -> Result<isize> {
    let sig = crate::process::signal::Signal::from_u32(signum as u32).ok_or(Errno::EINVAL)?;

    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if !oldact.is_null() {
        let old = task.signals.get_handler(sig);
        let handler_addr = match old {
            crate::process::signal::SignalAction::Handler(a) => a,
            crate::process::signal::SignalAction::Ignore => crate::process::signal::SIG_IGN,
            _ => crate::process::signal::SIG_DFL,
        };
        let sigaction = crate::process::signal::SigAction {
            sa_handler: handler_addr,
            sa_mask: 0,
            sa_flags: 0,
            sa_restorer: 0,
        };
        uaccess::copy_to_user(oldact as *mut crate::process::signal::SigAction, core::slice::from_ref(&sigaction))?;
    }

    if !act.is_null() {
        let new = uaccess::copy_from_user(act as *const crate::process::signal::SigAction, 1)?;
        let sigaction = new[0];
        let action = match sigaction.sa_handler {
            crate::process::signal::SIG_DFL => sig.default_action(),
            crate::process::signal::SIG_IGN => crate::process::signal::SignalAction::Ignore,
            handler => crate::process::signal::SignalAction::Handler(handler),
        };
        task.signals.set_handler(sig, action);
    }

    Ok(0)
}

/// sys_rt_sigprocmask - Examine/change blocked signal mask
pub fn sys_rt_sigprocmask(how: i32, set: *const u8, oldset: *mut u8) -> Result<isize> {
    const SIG_BLOCK: i32 = 0;
    const SIG_UNBLOCK: i32 = 1;
    const SIG_SETMASK: i32 = 2;

    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if !oldset.is_null() {
        let mask = task.signals.blocked_mask();
        uaccess::copy_to_user(oldset as *mut u64, core::slice::from_ref(&mask))?;
    }

    if !set.is_null() {
        let new_mask = uaccess::copy_from_user(set as *const u64, 1)?[0];
        match how {
            SIG_BLOCK => task.signals.block_mask(new_mask),
            SIG_UNBLOCK => task.signals.unblock_mask(new_mask),
            SIG_SETMASK => task.signals.set_blocked_mask(new_mask),
            _ => return Err(Errno::EINVAL),
        }
    }

    Ok(0)
}

/// sys_rt_sigreturn - Return from a signal handler
pub fn sys_rt_sigreturn() -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    crate::process::signal::sigreturn(task)?;
    Ok(task.trap_frame.rax as isize)
}

/// sys_pipe2 - Create a pipe
pub fn sys_pipe2(fds: *mut i32, flags: i32) -> Result<isize> {
    if fds.is_null() {
        return Err(Errno::EFAULT);
    }

    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    let _ = flags; // O_CLOEXEC/O_NONBLOCK: not tracked per-fd yet
    let (reader, writer) = crate::vfs::pipe::create_pipe();
    let read_fd = task.files.alloc_fd(alloc::sync::Arc::new(crate::vfs::File::from_pipe_reader(reader)))?;
    let write_fd = task.files.alloc_fd(alloc::sync::Arc::new(crate::vfs::File::from_pipe_writer(writer)))?;

    unsafe {
        *fds = read_fd as i32;
        *fds.add(1) = write_fd as i32;
    }

    Ok(0)
}

/// sys_sched_yield - Voluntarily give up the CPU
pub fn sys_sched_yield() -> Result<isize> {
    crate::process::scheduler_smp::yield_now();
    Ok(0)
}

/// sys_nanosleep - Sleep for the given duration
pub fn sys_nanosleep(req: *const u8, rem: *mut u8) -> Result<isize> {
    if req.is_null() {
        return Err(Errno::EFAULT);
    }

    #[repr(C)]
    struct Timespec {
        tv_sec: i64,
        tv_nsec: i64,
    }

    let ts = uaccess::copy_from_user(req as *const Timespec, 1)?;
    let ts = &ts[0];
    if ts.tv_sec < 0 || ts.tv_nsec < 0 || ts.tv_nsec >= 1_000_000_000 {
        return Err(Errno::EINVAL);
    }

    let ns = ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64;
    crate::process::do_nanosleep(ns);

    if !rem.is_null() {
        let zero = Timespec { tv_sec: 0, tv_nsec: 0 };
        uaccess::copy_to_user(rem as *mut Timespec, core::slice::from_ref(&zero))?;
    }

    Ok(0)
}

/// sys_clone - Create a new thread/process sharing selected resources
pub fn sys_clone(flags: u64, stack: *mut u8, _tls: i32) -> Result<isize> {
    crate::process::do_clone(flags, stack as u64).map(|pid| pid as isize)
}

/// sys_kill - Send a signal to a process
pub fn sys_kill(pid: i32, sig: i32) -> Result<isize> {
    if pid <= 0 {
        // Phase A1: process-group/broadcast forms are not supported.
        return Err(Errno::EINVAL);
    }
    let sig = crate::process::signal::Signal::from_u32(sig as u32).ok_or(Errno::EINVAL)?;
    crate::process::signal::send_signal(pid as u32, sig)?;
    Ok(0)
}

fn current_cred() -> Result<crate::process::Credentials> {
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    Ok(task.cred)
}

pub fn sys_getuid() -> Result<isize> { Ok(current_cred()?.uid as isize) }
pub fn sys_getgid() -> Result<isize> { Ok(current_cred()?.gid as isize) }
pub fn sys_geteuid() -> Result<isize> { Ok(current_cred()?.euid as isize) }
pub fn sys_getegid() -> Result<isize> { Ok(current_cred()?.egid as isize) }

pub fn sys_getppid() -> Result<isize> {
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    Ok(task.ppid as isize)
}

/// sys_setuid - Set real/effective UID, gated by CAP_SETUID unless dropping privilege
pub fn sys_setuid(uid: u32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if task.cred.euid != 0 && uid != task.cred.uid && uid != task.cred.euid {
        return Err(Errno::EPERM);
    }
    task.cred.uid = uid;
    task.cred.euid = uid;
    Ok(0)
}

/// sys_setgid - Set real/effective GID
pub fn sys_setgid(gid: u32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if task.cred.euid != 0 && gid != task.cred.gid && gid != task.cred.egid {
        return Err(Errno::EPERM);
    }
    task.cred.gid = gid;
    task.cred.egid = gid;
    Ok(0)
}

/// sys_setresuid - Set real, effective, and saved UID
pub fn sys_setresuid(ruid: u32, euid: u32, suid: u32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if task.cred.euid != 0 {
        return Err(Errno::EPERM);
    }
    if ruid != u32::MAX { task.cred.uid = ruid; }
    if euid != u32::MAX { task.cred.euid = euid; }
    if suid != u32::MAX { task.cred.suid = suid; }
    Ok(0)
}

/// sys_setresgid - Set real, effective, and saved GID
pub fn sys_setresgid(rgid: u32, egid: u32, sgid: u32) -> Result<isize> {
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;

    if task.cred.euid != 0 {
        return Err(Errno::EPERM);
    }
    if rgid != u32::MAX { task.cred.gid = rgid; }
    if egid != u32::MAX { task.cred.egid = egid; }
    if sgid != u32::MAX { task.cred.sgid = sgid; }
    Ok(0)
}

/// sys_newfstatat - stat a path relative to a directory fd (Phase A1: dirfd
/// must be AT_FDCWD or absolute path; per-fd-relative lookup not supported)
pub fn sys_newfstatat(dirfd: i32, pathname: *const u8, statbuf: *mut u8, _flags: i32) -> Result<isize> {
    let _ = dirfd;
    if pathname.is_null() || statbuf.is_null() {
        return Err(Errno::EFAULT);
    }
    let path = uaccess::copy_string_from_user(pathname, 4096)?;
    let root = crate::vfs::get_root().ok_or(Errno::ENOENT)?;
    let inode = crate::vfs::path_lookup(&root, &path)?;
    let meta = inode.getattr()?;

    let stat = unsafe { core::slice::from_raw_parts_mut(statbuf, 128) };
    stat.fill(0);
    unsafe {
        let p = statbuf as *mut u64;
        *p.add(1) = meta.ino;
        let pm = statbuf.add(24) as *mut u32;
        *pm = meta.mode;
        let ps = statbuf.add(48) as *mut u64;
        *ps = meta.size;
    }
    Ok(0)
}

/// sys_shmget - allocate/lookup a System V shared memory segment
pub fn sys_shmget(key: i32, size: usize, shmflg: i32) -> Result<isize> {
    crate::ipc::shm::shmget(key, size, shmflg).map(|id| id as isize)
}

/// sys_shmat - attach a shared memory segment into the calling process
pub fn sys_shmat(shmid: i32, shmaddr: *mut u8, shmflg: i32) -> Result<isize> {
    crate::ipc::shm::shmat(shmid, shmaddr as u64, shmflg).map(|addr| addr as isize)
}

/// sys_shmdt - detach a shared memory segment
pub fn sys_shmdt(shmaddr: *const u8) -> Result<isize> {
    crate::ipc::shm::shmdt(shmaddr as u64)?;
    Ok(0)
}

/// sys_shmctl - control operations on a shared memory segment
/// (only IPC_RMID and IPC_STAT are implemented; see `ipc::shm::shmctl`)
pub fn sys_shmctl(shmid: i32, cmd: i32, buf: *mut u8) -> Result<isize> {
    if buf.is_null() || cmd != crate::ipc::shm::IPC_STAT {
        crate::ipc::shm::shmctl(shmid, cmd, None)?;
        return Ok(0);
    }
    let mut stat = crate::ipc::shm::ShmidDs::default();
    crate::ipc::shm::shmctl(shmid, cmd, Some(&mut stat))?;
    uaccess::copy_to_user(buf as *mut crate::ipc::shm::ShmidDs, core::slice::from_ref(&stat))?;
    Ok(0)
}

/// sys_mq_open - open (optionally creating) a named POSIX message queue.
/// `attr`, if non-null, points at `{ max_msgs: u64, max_msg_size: u64 }`;
/// zero fields mean "use the kernel default".
pub fn sys_mq_open(name: *const u8, oflag: i32, _mode: u32, attr: *const u8) -> Result<isize> {
    if name.is_null() {
        return Err(Errno::EFAULT);
    }
    let name = uaccess::copy_string_from_user(name, 256)?;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct MqAttr {
        max_msgs: u64,
        max_msg_size: u64,
    }

    let (max_msgs, max_msg_size) = if attr.is_null() {
        (0usize, 0usize)
    } else {
        let a = uaccess::copy_from_user(attr as *const MqAttr, 1)?;
        (a[0].max_msgs as usize, a[0].max_msg_size as usize)
    };

    let queue = crate::ipc::mq::open(&name, oflag, max_msgs, max_msg_size)?;

    let open_flags = crate::vfs::OpenFlags::from_bits_truncate(oflag as u32);
    let pid = crate::process::current_pid();
    let mut table = crate::process::get_process_table();
    let table = table.as_mut().ok_or(Errno::ESRCH)?;
    let task = table.get_mut(pid).ok_or(Errno::ESRCH)?;
    let fd = task.files.alloc_fd(alloc::sync::Arc::new(crate::vfs::File::from_mq(queue, open_flags)))?;

    Ok(fd as isize)
}

/// sys_mq_unlink - remove a named message queue from the namespace
pub fn sys_mq_unlink(name: *const u8) -> Result<isize> {
    if name.is_null() {
        return Err(Errno::EFAULT);
    }
    let name = uaccess::copy_string_from_user(name, 256)?;
    crate::ipc::mq::unlink(&name)?;
    Ok(0)
}

fn mq_from_fd(fd: i32) -> Result<alloc::sync::Arc<crate::ipc::mq::MessageQueue>> {
    let pid = crate::process::current_pid();
    let table = crate::process::get_process_table();
    let table = table.as_ref().ok_or(Errno::ESRCH)?;
    let task = table.get(pid).ok_or(Errno::ESRCH)?;
    let file = task.files.get(fd)?;
    file.mq.clone().ok_or(Errno::EBADF)
}

/// sys_mq_timedsend - enqueue a message. Absolute timeouts are not
/// tracked; the non-blocking/blocking split comes from `O_NONBLOCK` on
/// the descriptor instead.
pub fn sys_mq_timedsend(mqdes: i32, msg: *const u8, msg_len: usize, msg_prio: u32) -> Result<isize> {
    if msg.is_null() {
        return Err(Errno::EFAULT);
    }
    let queue = mq_from_fd(mqdes)?;
    let data = unsafe { core::slice::from_raw_parts(msg, msg_len) };
    let nonblocking = {
        let pid = crate::process::current_pid();
        let table = crate::process::get_process_table();
        let table = table.as_ref().ok_or(Errno::ESRCH)?;
        let task = table.get(pid).ok_or(Errno::ESRCH)?;
        let file = task.files.get(mqdes)?;
        file.flags.contains(crate::vfs::OpenFlags::O_NONBLOCK)
    };
    queue.send(data, msg_prio, nonblocking)?;
    Ok(0)
}

/// sys_mq_timedreceive - dequeue the highest-priority message
pub fn sys_mq_timedreceive(mqdes: i32, msg: *mut u8, msg_len: usize, msg_prio: *mut u32) -> Result<isize> {
    if msg.is_null() {
        return Err(Errno::EFAULT);
    }
    let queue = mq_from_fd(mqdes)?;
    let buf = unsafe { core::slice::from_raw_parts_mut(msg, msg_len) };
    let nonblocking = {
        let pid = crate::process::current_pid();
        let table = crate::process::get_process_table();
        let table = table.as_ref().ok_or(Errno::ESRCH)?;
        let task = table.get(pid).ok_or(Errno::ESRCH)?;
        let file = task.files.get(mqdes)?;
        file.flags.contains(crate::vfs::OpenFlags::O_NONBLOCK)
    };
    let (len, priority) = queue.receive(buf, nonblocking)?;
    if !msg_prio.is_null() {
        unsafe { *msg_prio = priority };
    }
    Ok(len as isize)
}

// Syscall numbers for reference (x86_64 Linux calling convention)
#[allow(dead_code)]
mod syscall_numbers {
    pub const SYS_READ: usize = 0;
    pub const SYS_WRITE: usize = 1;
    pub const SYS_OPEN: usize = 2;
    pub const SYS_CLOSE: usize = 3;
    pub const SYS_MMAP: usize = 9;
    pub const SYS_MPROTECT: usize = 10;
    pub const SYS_MUNMAP: usize = 11;
    pub const SYS_BRK: usize = 12;
    pub const SYS_RT_SIGACTION: usize = 13;
    pub const SYS_RT_SIGPROCMASK: usize = 14;
    pub const SYS_RT_SIGRETURN: usize = 15;
    pub const SYS_PIPE: usize = 22;
    pub const SYS_SCHED_YIELD: usize = 24;
    pub const SYS_NANOSLEEP: usize = 35;
    pub const SYS_GETPID: usize = 39;
    pub const SYS_CLONE: usize = 56;
    pub const SYS_FORK: usize = 57;
    pub const SYS_EXECVE: usize = 59;
    pub const SYS_EXIT: usize = 60;
    pub const SYS_WAIT4: usize = 61;
    pub const SYS_KILL: usize = 62;
    pub const SYS_GETDENTS64: usize = 78;
    pub const SYS_READLINK: usize = 89;
    pub const SYS_GETUID: usize = 102;
    pub const SYS_GETGID: usize = 104;
    pub const SYS_SETUID: usize = 105;
    pub const SYS_SETGID: usize = 106;
    pub const SYS_GETEUID: usize = 107;
    pub const SYS_GETEGID: usize = 108;
    pub const SYS_GETPPID: usize = 110;
    pub const SYS_EXIT_GROUP: usize = 231;
    pub const SYS_OPENAT: usize = 257;
    pub const SYS_READLINKAT: usize = 267;
    pub const SYS_PIPE2: usize = 293;
}
