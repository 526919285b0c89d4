//! Memory management for user address spaces
//!
//! Provides:
//! - Address types and the user/kernel classifier ([`address`])
//! - Page table entries and per-process page directories ([`paging`], [`mapper`])
//! - The global frame table with clock eviction ([`frame`])
//! - The swap store ([`swap`])
//! - The supplemental page table and demand loading ([`page`])
//! - File-backed memory mappings ([`mmap`])
//!
//! # Principles
//! - Every frame handed to a user page is fully overwritten before it is mapped
//! - Pinned pages are never evicted
//! - Eviction never loses data: dirty pages go to swap or back to their file

pub mod address;
pub mod bitmap;
pub mod frame;
pub mod mapper;
pub mod mmap;
pub mod page;
pub mod paging;
pub mod swap;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE, USER_END};
pub use frame::FrameTable;
pub use mapper::{FaultCode, PageDirectory, SharedPageDirectory};
pub use mmap::{MapId, MmapTable};
pub use page::{AddressSpace, FileExtent, PageEntry, PageRef, Provenance};
pub use paging::MappingError;
pub use swap::{SwapSlot, SwapStore};

/// Error type for paging operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The address is null, in kernel space, or has no backing page.
    BadAddress,
    /// A write was attempted on a read-only page.
    NotWritable,
    /// No free frame and no evictable victim.
    OutOfFrames,
    /// The swap device is full.
    OutOfSwap,
    /// A page already exists at the requested address.
    AlreadyMapped,
    /// The backing file or device failed to transfer a full page.
    Io,
    /// Malformed request (misaligned address, empty file, ...).
    InvalidArgument,
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadAddress => write!(f, "bad user address"),
            Self::NotWritable => write!(f, "write to read-only page"),
            Self::OutOfFrames => write!(f, "no evictable frame"),
            Self::OutOfSwap => write!(f, "swap space exhausted"),
            Self::AlreadyMapped => write!(f, "page already present"),
            Self::Io => write!(f, "backing store I/O error"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl From<MappingError> for VmError {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::AlreadyMapped => Self::AlreadyMapped,
            MappingError::NotMapped | MappingError::InvalidPermissions => Self::BadAddress,
            MappingError::MisalignedAddress => Self::InvalidArgument,
        }
    }
}
