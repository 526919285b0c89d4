//! System Call Handler
//!
//! Decodes a syscall frame from the user stack, validates and pins every
//! argument, runs the handler and turns its result into what the trap
//! code hands back to user mode.
//!
//! # Security Considerations
//! - The number and every argument word are read through pinned, validated
//!   stack addresses
//! - Fatal errors (bad pointers, writes to read-only memory, console or
//!   descriptor misuse) terminate the caller with status -1
//! - Unknown syscall numbers return -1
//! - Pins are released before the process is torn down

use alloc::string::String;
use alloc::vec;
use core::fmt;

use super::numbers::*;
use super::validate::PinSet;
use crate::config::WORD_SIZE;
use crate::file_table::{FdError, FileDescriptor, FileTable};
use crate::fs::FileRef;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, MmapTable, VirtAddr, VmError};
use crate::process::{Pid, Process};

/// System call error codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Operation not permitted (console descriptor misuse)
    Eperm = -1,
    /// I/O error
    Eio = -5,
    /// Bad file descriptor
    Ebadf = -9,
    /// Out of memory (no frame or swap slot)
    Enomem = -12,
    /// Permission denied (write to read-only page)
    Eacces = -13,
    /// Bad address (invalid pointer)
    Efault = -14,
    /// Invalid argument
    Einval = -22,
    /// Invalid system call number
    Enosys = -38,
}

impl SyscallError {
    /// Whether the error kills the calling process.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Efault | Self::Eacces | Self::Eperm)
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eperm => write!(f, "operation not permitted"),
            Self::Eio => write!(f, "I/O error"),
            Self::Ebadf => write!(f, "bad file descriptor"),
            Self::Enomem => write!(f, "out of memory"),
            Self::Eacces => write!(f, "permission denied"),
            Self::Efault => write!(f, "bad address"),
            Self::Einval => write!(f, "invalid argument"),
            Self::Enosys => write!(f, "unknown system call"),
        }
    }
}

impl From<VmError> for SyscallError {
    fn from(e: VmError) -> Self {
        match e {
            VmError::BadAddress => Self::Efault,
            VmError::NotWritable => Self::Eacces,
            VmError::OutOfFrames | VmError::OutOfSwap => Self::Enomem,
            VmError::Io => Self::Eio,
            VmError::AlreadyMapped | VmError::InvalidArgument => Self::Einval,
        }
    }
}

impl From<FdError> for SyscallError {
    fn from(_: FdError) -> Self {
        Self::Ebadf
    }
}

/// What the trap code does once a syscall returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Resume the process with this value in the return register.
    Return(i32),
    /// The process has exited with this status.
    Exit(i32),
    /// The machine is powering off.
    Halt,
}

/// Dispatch the syscall whose frame starts at user address `esp`.
///
/// # Returns
/// `Return` for calls that resume the process, `Exit` once the process
/// has been torn down (by `exit` or by a fatal error), `Halt` after
/// asking the process collaborator to power off.
pub fn dispatch(kernel: &Kernel, process: &mut Process, esp: usize) -> Disposition {
    let pid = process.pid();
    let result = {
        let mut call = Syscall {
            kernel,
            pid,
            esp,
            space: &process.space,
            files: &mut process.files,
            mmaps: &mut process.mmaps,
            pins: PinSet::new(&process.space, VirtAddr::new(esp)),
        };
        call.run()
    };

    match result {
        Ok(Disposition::Exit(status)) => {
            process.exit(kernel, status);
            Disposition::Exit(status)
        }
        Ok(Disposition::Halt) => {
            log::info!("syscall: halt from pid {}", pid);
            kernel.processes.power_off();
            Disposition::Halt
        }
        Ok(ret) => ret,
        Err(e) if e.is_fatal() => {
            log::warn!("syscall: pid {} killed: {}", pid, e);
            process.exit(kernel, -1);
            Disposition::Exit(-1)
        }
        Err(e) => {
            log::debug!("syscall: pid {} failed: {}", pid, e);
            Disposition::Return(-1)
        }
    }
}

type SyscallResult = Result<Disposition, SyscallError>;

/// One syscall in flight. Dropping it unpins every page it pinned.
struct Syscall<'a> {
    kernel: &'a Kernel,
    pid: Pid,
    esp: usize,
    space: &'a AddressSpace,
    files: &'a mut FileTable,
    mmaps: &'a mut MmapTable,
    pins: PinSet<'a>,
}

impl Syscall<'_> {
    fn run(&mut self) -> SyscallResult {
        let number = self.pins.read_word(self.kernel, self.esp)?;
        log::trace!("syscall: pid {} number {}", self.pid, number);

        match number {
            SYS_HALT => Ok(Disposition::Halt),
            SYS_EXIT => self.sys_exit(),
            SYS_EXEC => self.sys_exec(),
            SYS_WAIT => self.sys_wait(),
            SYS_CREATE => self.sys_create(),
            SYS_REMOVE => self.sys_remove(),
            SYS_OPEN => self.sys_open(),
            SYS_FILESIZE => self.sys_filesize(),
            SYS_READ => self.sys_read(),
            SYS_WRITE => self.sys_write(),
            SYS_SEEK => self.sys_seek(),
            SYS_TELL => self.sys_tell(),
            SYS_CLOSE => self.sys_close(),
            SYS_MMAP => self.sys_mmap(),
            SYS_MUNMAP => self.sys_munmap(),
            _ => {
                log::warn!("syscall: pid {} unknown syscall {}", self.pid, number);
                Err(SyscallError::Enosys)
            }
        }
    }

    /// Argument `n`, counting from 0, as a raw word.
    fn arg(&mut self, n: usize) -> Result<u32, SyscallError> {
        let at = (n + 1)
            .checked_mul(WORD_SIZE)
            .and_then(|offset| self.esp.checked_add(offset))
            .ok_or(SyscallError::Efault)?;
        self.pins.read_word(self.kernel, at)
    }

    fn arg_fd(&mut self, n: usize) -> Result<FileDescriptor, SyscallError> {
        Ok(FileDescriptor(self.arg(n)? as i32))
    }

    /// String argument. `None` if it is not valid UTF-8, which no file or
    /// program can be named.
    fn arg_str(&mut self, n: usize) -> Result<Option<String>, SyscallError> {
        let ptr = self.arg(n)? as usize;
        let bytes = self.pins.pin_string(self.kernel, ptr)?;
        Ok(String::from_utf8(bytes).ok())
    }

    fn file(&self, fd: FileDescriptor) -> Result<FileRef, SyscallError> {
        Ok(self.files.get(fd)?.file.clone())
    }

    fn sys_exit(&mut self) -> SyscallResult {
        let status = self.arg(0)? as i32;
        Ok(Disposition::Exit(status))
    }

    fn sys_exec(&mut self) -> SyscallResult {
        let Some(cmdline) = self.arg_str(0)? else {
            return Ok(Disposition::Return(-1));
        };
        let pid = self.kernel.processes.execute(&cmdline).unwrap_or(-1);
        Ok(Disposition::Return(pid))
    }

    fn sys_wait(&mut self) -> SyscallResult {
        let child = self.arg(0)? as Pid;
        Ok(Disposition::Return(self.kernel.processes.wait(child)))
    }

    fn sys_create(&mut self) -> SyscallResult {
        let name = self.arg_str(0)?;
        let size = self.arg(1)? as usize;
        let created = match name {
            Some(name) => self.kernel.fs.locked(|fs| fs.create(&name, size)),
            None => false,
        };
        Ok(Disposition::Return(created as i32))
    }

    fn sys_remove(&mut self) -> SyscallResult {
        let removed = match self.arg_str(0)? {
            Some(name) => self.kernel.fs.locked(|fs| fs.remove(&name)),
            None => false,
        };
        Ok(Disposition::Return(removed as i32))
    }

    fn sys_open(&mut self) -> SyscallResult {
        let Some(name) = self.arg_str(0)? else {
            return Ok(Disposition::Return(-1));
        };
        let fd = self.files.open(self.kernel, &name).ok_or(SyscallError::Einval)?;
        Ok(Disposition::Return(fd.0))
    }

    fn sys_filesize(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let file = self.file(fd)?;
        let length = self.kernel.fs.locked(|_| file.length());
        Ok(Disposition::Return(length as i32))
    }

    fn sys_read(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let ptr = self.arg(1)? as usize;
        let len = self.arg(2)? as usize;
        let mut buf = self.pins.pin_buffer_mut(self.kernel, ptr, len)?;

        match fd {
            FileDescriptor::STDIN => {
                let data: alloc::vec::Vec<u8> =
                    (0..len).map(|_| self.kernel.console.getc()).collect();
                buf.write(self.kernel, &data)?;
                Ok(Disposition::Return(len as i32))
            }
            FileDescriptor::STDOUT => Err(SyscallError::Eperm),
            fd => {
                let file = self.file(fd)?;
                let mut data = vec![0u8; len];
                let read = self.kernel.fs.locked(|_| file.read(&mut data));
                buf.write(self.kernel, &data[..read])?;
                Ok(Disposition::Return(read as i32))
            }
        }
    }

    fn sys_write(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let ptr = self.arg(1)? as usize;
        let len = self.arg(2)? as usize;
        let data = self.pins.pin_buffer(self.kernel, ptr, len)?.read(self.kernel)?;

        match fd {
            FileDescriptor::STDOUT => {
                self.kernel.console.write(&data);
                Ok(Disposition::Return(len as i32))
            }
            FileDescriptor::STDIN => Err(SyscallError::Eperm),
            fd => {
                let file = self.file(fd)?;
                let written = self.kernel.fs.locked(|_| file.write(&data));
                Ok(Disposition::Return(written as i32))
            }
        }
    }

    fn sys_seek(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let position = self.arg(1)? as usize;
        if let Ok(file) = self.file(fd) {
            self.kernel.fs.locked(|_| file.seek(position));
        }
        Ok(Disposition::Return(0))
    }

    fn sys_tell(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let file = self.file(fd)?;
        let position = self.kernel.fs.locked(|_| file.tell());
        Ok(Disposition::Return(position as i32))
    }

    fn sys_close(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        self.files
            .close(self.kernel, fd)
            .map_err(|_| SyscallError::Eperm)?;
        Ok(Disposition::Return(0))
    }

    fn sys_mmap(&mut self) -> SyscallResult {
        let fd = self.arg_fd(0)?;
        let addr = VirtAddr::new(self.arg(1)? as usize);
        let file = self.file(fd)?;
        let id = self
            .mmaps
            .map(self.kernel, self.space, &file, addr)
            .map_err(|_| SyscallError::Einval)?;
        Ok(Disposition::Return(id))
    }

    fn sys_munmap(&mut self) -> SyscallResult {
        let id = self.arg(0)? as i32;
        self.mmaps.unmap(self.kernel, self.space, id);
        Ok(Disposition::Return(0))
    }
}
