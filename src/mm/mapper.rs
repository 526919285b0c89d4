//! Page Directory
//!
//! Per-process address translation: which user page maps which frame,
//! with what permissions, and whether it has been accessed or dirtied.
//!
//! The directory is walked in software; an architecture port mirrors
//! every `map_page`/`unmap_page` into its hardware tables and feeds the
//! hardware A/D bits back through `access`.
//!
//! # Security Properties
//! - Only page-aligned user addresses can be mapped
//! - Kernel addresses are rejected with `InvalidPermissions`
//! - Writes through a read-only entry are reported, never performed

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use bitflags::bitflags;
use spin::Mutex;

use super::address::{PhysAddr, VirtAddr};
use super::paging::{MappingError, PageTableEntry, PteFlags};

/// A page directory shared between its process and the frame table.
pub type SharedPageDirectory = Arc<Mutex<PageDirectory>>;

bitflags! {
    /// Page-fault error code, in the i386 layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultCode: u32 {
        /// The page was present (a protection fault rather than a miss).
        const PRESENT = 1 << 0;
        /// The access was a write.
        const WRITE = 1 << 1;
        /// The access came from user mode.
        const USER = 1 << 2;
    }
}

/// A software-walked page table for one user address space.
#[derive(Debug, Default)]
pub struct PageDirectory {
    entries: BTreeMap<usize, PageTableEntry>,
}

impl PageDirectory {
    /// Create an empty directory.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Create an empty directory ready to share with the frame table.
    pub fn new_shared() -> SharedPageDirectory {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Map `upage` to `frame`.
    ///
    /// The entry starts out ACCESSED so a freshly loaded page gets one
    /// sweep of the clock hand before it can be chosen as a victim.
    pub fn map_page(
        &mut self,
        upage: VirtAddr,
        frame: PhysAddr,
        writable: bool,
    ) -> Result<(), MappingError> {
        if !upage.is_user() {
            return Err(MappingError::InvalidPermissions);
        }
        if !upage.is_aligned() || !frame.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if self.entries.contains_key(&upage.page_number()) {
            return Err(MappingError::AlreadyMapped);
        }

        let flags = if writable {
            PteFlags::USER_RW
        } else {
            PteFlags::USER_RO
        };
        self.entries.insert(
            upage.page_number(),
            PageTableEntry::page(frame, flags | PteFlags::ACCESSED),
        );
        Ok(())
    }

    /// Remove the mapping for `upage`, returning the final entry so the
    /// caller can inspect its DIRTY bit.
    pub fn unmap_page(&mut self, upage: VirtAddr) -> Result<PageTableEntry, MappingError> {
        self.entries
            .remove(&upage.page_number())
            .ok_or(MappingError::NotMapped)
    }

    /// Get the entry for the page containing `va`.
    pub fn entry(&self, va: VirtAddr) -> Option<PageTableEntry> {
        self.entries.get(&va.page_number()).copied()
    }

    /// Translate a user address to its physical address.
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        self.entry(va)
            .map(|pte| PhysAddr::new(pte.addr().as_usize() + va.page_offset()))
    }

    /// Check whether the page containing `va` has been written.
    pub fn is_dirty(&self, va: VirtAddr) -> bool {
        self.entry(va)
            .map_or(false, |pte| pte.flags().contains(PteFlags::DIRTY))
    }

    /// Check whether the page containing `va` has been accessed.
    pub fn is_accessed(&self, va: VirtAddr) -> bool {
        self.entry(va)
            .map_or(false, |pte| pte.flags().contains(PteFlags::ACCESSED))
    }

    /// Set or clear the ACCESSED bit of a mapped page.
    pub fn set_accessed(&mut self, va: VirtAddr, accessed: bool) {
        if let Some(pte) = self.entries.get_mut(&va.page_number()) {
            if accessed {
                pte.insert(PteFlags::ACCESSED);
            } else {
                pte.remove(PteFlags::ACCESSED);
            }
        }
    }

    /// Set or clear the DIRTY bit of a mapped page.
    pub fn set_dirty(&mut self, va: VirtAddr, dirty: bool) {
        if let Some(pte) = self.entries.get_mut(&va.page_number()) {
            if dirty {
                pte.insert(PteFlags::DIRTY);
            } else {
                pte.remove(PteFlags::DIRTY);
            }
        }
    }

    /// Perform one access the way the MMU would.
    ///
    /// On success the A (and for writes, D) bit is set and the physical
    /// address is returned. Otherwise the page-fault error code the
    /// hardware would have raised is returned.
    pub fn access(&mut self, va: VirtAddr, write: bool) -> Result<PhysAddr, FaultCode> {
        let mut code = FaultCode::USER;
        if write {
            code |= FaultCode::WRITE;
        }
        if !va.is_user() {
            return Err(code);
        }

        let Some(pte) = self.entries.get_mut(&va.page_number()) else {
            return Err(code);
        };
        if write && !pte.flags().contains(PteFlags::WRITABLE) {
            return Err(code | FaultCode::PRESENT);
        }

        pte.insert(PteFlags::ACCESSED);
        if write {
            pte.insert(PteFlags::DIRTY);
        }
        Ok(PhysAddr::new(pte.addr().as_usize() + va.page_offset()))
    }

    /// Number of pages currently mapped.
    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }
}
