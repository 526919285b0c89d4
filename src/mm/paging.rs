//! Page Table Entries
//!
//! 32-bit page table entries in the i386 layout used by the user ABI.
//!
//! # Entry Layout
//! - Bits [31:12]: physical frame address
//! - Bits [11:0]: flags ([`PteFlags`])
//!
//! # Security Properties
//! - Flags are strictly typed to prevent invalid combinations
//! - Every user mapping carries `USER`; kernel addresses are never mapped here
//! - ACCESSED and DIRTY are the only bits the "hardware" sets behind our back

use bitflags::bitflags;

use super::address::PhysAddr;

bitflags! {
    /// Page table entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Entry maps a frame.
        const PRESENT = 1 << 0;
        /// Writes are allowed.
        const WRITABLE = 1 << 1;
        /// Accessible from user mode.
        const USER = 1 << 2;
        /// Set on any access; cleared by the clock hand.
        const ACCESSED = 1 << 5;
        /// Set on write; cleared when the page is written back.
        const DIRTY = 1 << 6;
    }
}

impl PteFlags {
    /// Read-only user page.
    pub const USER_RO: Self = Self::PRESENT.union(Self::USER);

    /// Read/write user page.
    pub const USER_RW: Self = Self::PRESENT.union(Self::USER).union(Self::WRITABLE);
}

/// A single page table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    /// Address mask for page table entries (bits [31:12]).
    const ADDR_MASK: u32 = 0xFFFF_F000;

    /// Create a page entry mapping a physical frame.
    #[inline]
    pub fn page(phys: PhysAddr, flags: PteFlags) -> Self {
        debug_assert!(phys.is_aligned());
        Self((phys.as_u32() & Self::ADDR_MASK) | flags.bits())
    }

    /// Check if the entry is present.
    #[inline]
    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    /// Get the physical frame address from this entry.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::new((self.0 & Self::ADDR_MASK) as usize)
    }

    /// Get the flags from this entry.
    #[inline]
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & !Self::ADDR_MASK)
    }

    /// Set flags in place.
    #[inline]
    pub fn insert(&mut self, flags: PteFlags) {
        self.0 |= flags.bits();
    }

    /// Clear flags in place.
    #[inline]
    pub fn remove(&mut self, flags: PteFlags) {
        self.0 &= !flags.bits();
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_present() {
            write!(f, "PTE(addr={}, flags={:?})", self.addr(), self.flags())
        } else {
            write!(f, "PTE(invalid)")
        }
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// Attempted to map a kernel address with user flags.
    InvalidPermissions,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::InvalidPermissions => write!(f, "invalid permission combination"),
        }
    }
}
