//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for memory addresses that prevent mixing
//! physical frames and user virtual addresses at compile time.
//!
//! # Address Space Layout (32-bit user ABI)
//! - `0x0000_0000`: null page, never mapped
//! - `0x0000_1000 .. USER_END`: user space
//! - `USER_END ..`: kernel, never reachable through a user pointer
//!
//! The address classifier lives here: [`VirtAddr::is_user`] decides whether
//! an address may be dereferenced on behalf of a user process at all.

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// First address above user space (the kernel/user split).
pub const USER_END: usize = 0xC000_0000;

/// Physical address of the first frame in the user pool.
/// Everything below belongs to the kernel image and its own allocations.
pub const FRAME_BASE: usize = 0x0010_0000;

/// A physical memory address.
///
/// Physical addresses cannot be dereferenced directly. Frame contents are
/// reached through [`FrameTable::with_frame`](super::frame::FrameTable::with_frame).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    ///
    /// # Panics
    /// Panics in debug mode if the address does not fit a 32-bit PTE.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        debug_assert!(addr <= u32::MAX as usize);
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u32 (for page table entries).
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Address of the user-pool frame with the given index.
    #[inline]
    pub const fn from_frame_index(index: usize) -> Self {
        Self(FRAME_BASE + (index << PAGE_SHIFT))
    }

    /// Index of this frame within the user pool.
    #[inline]
    pub const fn frame_index(self) -> usize {
        (self.0 - FRAME_BASE) >> PAGE_SHIFT
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A virtual memory address as seen by a user process.
///
/// Construction never fails: a `VirtAddr` may hold any value a user hands
/// the kernel. Whether it may be touched is a separate question answered
/// by [`VirtAddr::is_user`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the start of its page.
    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Get the virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Add an offset to this address, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check if this is a null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address classifier: non-null and below the kernel/user split.
    ///
    /// Pure and side-effect free. A caller that finds an address invalid
    /// is responsible for terminating the owning process.
    #[inline]
    pub const fn is_user(self) -> bool {
        !self.is_null() && self.0 < USER_END
    }

    /// Check if this is a kernel address (at or above the split).
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= USER_END
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Iterate over the base of every page touched by `[start, start + len)`.
///
/// Returns `None` if the range wraps around the address space.
pub fn pages_spanning(start: VirtAddr, len: usize) -> Option<impl Iterator<Item = VirtAddr>> {
    if len == 0 {
        return Some(PageIter { next: 0, last: 0, done: true });
    }
    let last = start.checked_add(len - 1)?;
    Some(PageIter {
        next: start.page_base().as_usize(),
        last: last.page_base().as_usize(),
        done: false,
    })
}

struct PageIter {
    next: usize,
    last: usize,
    done: bool,
}

impl Iterator for PageIter {
    type Item = VirtAddr;

    fn next(&mut self) -> Option<VirtAddr> {
        if self.done {
            return None;
        }
        let page = VirtAddr::new(self.next);
        if self.next == self.last {
            self.done = true;
        } else {
            self.next += PAGE_SIZE;
        }
        Some(page)
    }
}
