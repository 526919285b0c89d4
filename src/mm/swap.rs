//! Swap Store
//!
//! Page-sized slots carved out of a block device.
//!
//! # Design
//! - Slot `n` occupies sectors `n * SECTORS_PER_SLOT ..` on the device
//! - A bitmap tracks which slots hold a page; first fit, no compaction
//! - A slot is referenced by at most one SPT entry and released exactly once

use alloc::sync::Arc;

use spin::Mutex;

use super::address::PAGE_SIZE;
use super::bitmap::Bitmap;
use super::VmError;
use crate::drivers::{BlockDevice, SECTOR_SIZE};

/// Number of device sectors that hold one page.
pub const SECTORS_PER_SLOT: usize = PAGE_SIZE / SECTOR_SIZE;

/// Index of a page-sized slot on the swap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// Get the slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    #[inline]
    fn first_sector(self) -> usize {
        self.0 * SECTORS_PER_SLOT
    }
}

/// The swap partition and its slot bitmap.
pub struct SwapStore {
    device: Arc<dyn BlockDevice>,
    slots: Mutex<Bitmap>,
}

impl SwapStore {
    /// Manage every whole slot on `device`.
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        let slots = device.sector_count() / SECTORS_PER_SLOT;
        log::info!("swap: {} slots ({} KiB)", slots, slots * PAGE_SIZE / 1024);
        Self {
            device,
            slots: Mutex::new(Bitmap::new(slots)),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of unused slots.
    pub fn free_slots(&self) -> usize {
        self.slots.lock().free_count()
    }

    /// Copy one page into a fresh slot.
    pub fn write_out(&self, page: &[u8; PAGE_SIZE]) -> Result<SwapSlot, VmError> {
        let slot = SwapSlot(self.slots.lock().alloc().ok_or(VmError::OutOfSwap)?);

        for (i, chunk) in page.chunks_exact(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            sector.copy_from_slice(chunk);
            if let Err(e) = self.device.write_sector(slot.first_sector() + i, &sector) {
                log::warn!("swap: write of slot {} failed: {}", slot.index(), e);
                self.release(slot);
                return Err(VmError::Io);
            }
        }

        log::trace!("swap: page out to slot {}", slot.index());
        Ok(slot)
    }

    /// Copy a slot's contents into `page`. The slot stays allocated.
    pub fn read_in(&self, slot: SwapSlot, page: &mut [u8; PAGE_SIZE]) -> Result<(), VmError> {
        for (i, chunk) in page.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            self.device
                .read_sector(slot.first_sector() + i, &mut sector)
                .map_err(|_| VmError::Io)?;
            chunk.copy_from_slice(&sector);
        }

        log::trace!("swap: page in from slot {}", slot.index());
        Ok(())
    }

    /// Return a slot to the free pool.
    ///
    /// # Panics
    /// Panics if the slot is already free.
    pub fn release(&self, slot: SwapSlot) {
        self.slots.lock().free(slot.index());
    }
}
