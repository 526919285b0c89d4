//! System Call Interface
//!
//! The user/kernel boundary. A syscall frame on the user stack holds the
//! call number at `esp` and argument `n` at `esp + 4 * (n + 1)` (i386
//! convention). Every call returns one word.
//!
//! # Security Model
//! - Whitelist approach: only the calls listed in [`numbers`] exist
//! - All pointer arguments are validated and pinned before use
//! - Invalid addresses terminate the caller; invalid handles fail quietly
//!
//! # Calls
//! - 0: halt()
//! - 1: exit(status)
//! - 2: exec(cmdline) -> pid
//! - 3: wait(pid) -> status
//! - 4: create(path, size) -> bool
//! - 5: remove(path) -> bool
//! - 6: open(path) -> fd
//! - 7: filesize(fd) -> length
//! - 8: read(fd, buf, len) -> count
//! - 9: write(fd, buf, len) -> count
//! - 10: seek(fd, pos)
//! - 11: tell(fd) -> pos
//! - 12: close(fd)
//! - 13: mmap(fd, addr) -> mapid
//! - 14: munmap(mapid)

mod handler;
mod validate;

pub use handler::{dispatch, Disposition, SyscallError};
pub use validate::{PinSet, UserBuffer, UserBufferMut};

/// System call numbers
pub mod numbers {
    pub const SYS_HALT: u32 = 0;
    pub const SYS_EXIT: u32 = 1;
    pub const SYS_EXEC: u32 = 2;
    pub const SYS_WAIT: u32 = 3;
    pub const SYS_CREATE: u32 = 4;
    pub const SYS_REMOVE: u32 = 5;
    pub const SYS_OPEN: u32 = 6;
    pub const SYS_FILESIZE: u32 = 7;
    pub const SYS_READ: u32 = 8;
    pub const SYS_WRITE: u32 = 9;
    pub const SYS_SEEK: u32 = 10;
    pub const SYS_TELL: u32 = 11;
    pub const SYS_CLOSE: u32 = 12;
    pub const SYS_MMAP: u32 = 13;
    pub const SYS_MUNMAP: u32 = 14;
}
