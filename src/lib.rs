//! PantherOS VM - user/kernel boundary and demand-paged virtual memory
//!
//! The part of the kernel that stands between user processes and physical
//! memory: it decodes and validates system calls, and backs every user
//! page lazily from an executable, a mapped file, swap or zeroes.
//!
//! # Components
//! - [`mm`]: addresses, page directories, frame table, swap, supplemental
//!   page table, memory-mapped files
//! - [`syscall`]: syscall decoding, argument validation and pinning, handlers
//! - [`exception`]: page-fault entry point
//! - [`file_table`], [`process`]: per-process state
//! - [`fs`], [`drivers`]: collaborator interfaces the embedding kernel
//!   implements (filesystem, swap disk, console)
//!
//! # Security Features
//! - Every user pointer is checked against the user/kernel split before use
//! - Buffers are pinned for the duration of a syscall so eviction cannot
//!   race a copy
//! - Faults and bad arguments kill the offending process, never the kernel
//!
//! The crate is `no_std` + `alloc`. The embedding kernel supplies the
//! global allocator and the `log` backend.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod exception;
pub mod file_table;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use config::VmConfig;
pub use kernel::Kernel;
pub use process::{Pid, Process, ProcessControl};
