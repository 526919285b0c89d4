//! System Call Input Validation
//!
//! Every user pointer a syscall receives passes through here before the
//! kernel touches the memory behind it.
//!
//! # Security Principles
//! - Validate ALL inputs before use: null and kernel pointers are refused
//!   even for zero-length buffers
//! - Pin before use: every page of a buffer is made resident and pinned,
//!   so eviction cannot pull it out from under a copy
//! - Copy to kernel space: buffers are read into kernel memory once,
//!   never re-read after validation
//! - Unpin on every path: a [`PinSet`] releases its pages when dropped

use alloc::vec;
use alloc::vec::Vec;

use super::handler::SyscallError;
use crate::config::WORD_SIZE;
use crate::kernel::Kernel;
use crate::mm::address::pages_spanning;
use crate::mm::{AddressSpace, VirtAddr, USER_END};

/// Pages pinned on behalf of one syscall.
pub struct PinSet<'a> {
    space: &'a AddressSpace,
    esp: VirtAddr,
    pinned: Vec<VirtAddr>,
}

impl<'a> PinSet<'a> {
    /// Start an empty set. `esp` is the user stack pointer at syscall
    /// entry and bounds stack growth.
    pub fn new(space: &'a AddressSpace, esp: VirtAddr) -> Self {
        Self {
            space,
            esp,
            pinned: Vec::new(),
        }
    }

    /// Number of distinct pages pinned.
    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    fn pin_page(&mut self, kernel: &Kernel, va: VirtAddr, write: bool) -> Result<(), SyscallError> {
        self.space.pin(kernel, va, self.esp, write)?;
        let upage = va.page_base();
        if !self.pinned.contains(&upage) {
            self.pinned.push(upage);
        }
        Ok(())
    }

    fn pin_range(
        &mut self,
        kernel: &Kernel,
        ptr: usize,
        len: usize,
        write: bool,
    ) -> Result<VirtAddr, SyscallError> {
        let start = VirtAddr::new(ptr);
        if !start.is_user() {
            return Err(SyscallError::Efault);
        }
        let end = ptr.checked_add(len).ok_or(SyscallError::Efault)?;
        if end > USER_END {
            return Err(SyscallError::Efault);
        }

        for page in pages_spanning(start, len).ok_or(SyscallError::Efault)? {
            self.pin_page(kernel, page, write)?;
        }
        Ok(start)
    }

    /// Validate and pin a buffer the kernel will read.
    pub fn pin_buffer(
        &mut self,
        kernel: &Kernel,
        ptr: usize,
        len: usize,
    ) -> Result<UserBuffer<'a>, SyscallError> {
        let va = self.pin_range(kernel, ptr, len, false)?;
        Ok(UserBuffer {
            space: self.space,
            va,
            len,
        })
    }

    /// Validate and pin a buffer the kernel will write. Every page must
    /// be writable.
    pub fn pin_buffer_mut(
        &mut self,
        kernel: &Kernel,
        ptr: usize,
        len: usize,
    ) -> Result<UserBufferMut<'a>, SyscallError> {
        let va = self.pin_range(kernel, ptr, len, true)?;
        Ok(UserBufferMut {
            space: self.space,
            va,
            len,
        })
    }

    /// Read one machine word from the user stack.
    pub fn read_word(&mut self, kernel: &Kernel, ptr: usize) -> Result<u32, SyscallError> {
        let word = self.pin_buffer(kernel, ptr, WORD_SIZE)?.read(kernel)?;
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(&word);
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read a NUL-terminated string, pinning it one byte at a time since
    /// its length is not known up front. The terminator is not returned.
    pub fn pin_string(&mut self, kernel: &Kernel, ptr: usize) -> Result<Vec<u8>, SyscallError> {
        let mut bytes = Vec::new();
        let mut at = ptr;
        loop {
            let va = VirtAddr::new(at);
            if !va.is_user() {
                return Err(SyscallError::Efault);
            }
            self.pin_page(kernel, va, false)?;

            let mut byte = [0u8; 1];
            self.space.copy_in(kernel, va, &mut byte)?;
            if byte[0] == 0 {
                return Ok(bytes);
            }
            bytes.push(byte[0]);
            at = at.checked_add(1).ok_or(SyscallError::Efault)?;
        }
    }
}

impl Drop for PinSet<'_> {
    fn drop(&mut self) {
        for &page in &self.pinned {
            self.space.unpin(page);
        }
    }
}

/// A validated, pinned user buffer the kernel reads from.
#[derive(Clone, Copy)]
pub struct UserBuffer<'a> {
    space: &'a AddressSpace,
    va: VirtAddr,
    len: usize,
}

impl UserBuffer<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the buffer into kernel memory.
    pub fn read(&self, kernel: &Kernel) -> Result<Vec<u8>, SyscallError> {
        let mut bytes = vec![0u8; self.len];
        self.space.copy_in(kernel, self.va, &mut bytes)?;
        Ok(bytes)
    }
}

/// A validated, pinned, writable user buffer.
pub struct UserBufferMut<'a> {
    space: &'a AddressSpace,
    va: VirtAddr,
    len: usize,
}

impl UserBufferMut<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `data` to the start of the buffer. At most `len` bytes are
    /// written.
    pub fn write(&mut self, kernel: &Kernel, data: &[u8]) -> Result<(), SyscallError> {
        let n = data.len().min(self.len);
        self.space.copy_out(kernel, self.va, &data[..n])?;
        Ok(())
    }
}
