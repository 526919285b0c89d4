//! Frame Table
//!
//! Owns the user frame pool: which frames are free, which user page sits
//! in each used frame, and how to reclaim one when the pool runs dry.
//!
//! # Design
//! - A bitmap tracks allocated frames (first fit)
//! - Each used frame records its owner: the SPT entry, page directory and
//!   user page currently occupying it
//! - Frame contents sit behind their own lock so a thread copying into a
//!   pinned page never waits on the table lock
//!
//! # Eviction
//! Clock (second chance) over the frame array. A frame is skipped when its
//! SPT entry is pinned or locked by another thread, and gets a second
//! chance when its ACCESSED bit is set. At most two sweeps are made before
//! giving up with [`VmError::OutOfFrames`], or with the write-back error of
//! the last victim that could not be moved out.
//!
//! # Locking
//! Table lock, then (`try_lock` only) the victim's SPT entry, then its page
//! directory, then filesystem gate, frame contents, swap bitmap.

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::Mutex;

use super::address::{PhysAddr, VirtAddr, PAGE_MASK, PAGE_SIZE};
use super::bitmap::Bitmap;
use super::mapper::SharedPageDirectory;
use super::page::PageRef;
use super::paging::PteFlags;
use super::VmError;
use crate::kernel::Kernel;
use crate::process::Pid;

/// Back-reference from a frame to the user page occupying it.
#[derive(Clone)]
pub struct FrameOwner {
    /// Owning process.
    pub pid: Pid,
    /// User page mapped to the frame.
    pub upage: VirtAddr,
    /// SPT entry of that page.
    pub page: PageRef,
    /// Page directory holding the mapping.
    pub directory: SharedPageDirectory,
}

/// Frame table bookkeeping, guarded by one lock.
struct FrameTableInner {
    /// Bitmap tracking allocated frames (1 = allocated, 0 = free).
    used: Bitmap,
    /// Owner of each allocated frame.
    owners: Vec<Option<FrameOwner>>,
    /// Clock hand.
    hand: usize,
}

/// The global user frame pool.
pub struct FrameTable {
    frames: Box<[Mutex<Box<[u8; PAGE_SIZE]>>]>,
    inner: Mutex<FrameTableInner>,
}

impl FrameTable {
    /// Create a pool of `count` frames.
    pub fn new(count: usize) -> Self {
        let frames = (0..count)
            .map(|_| Mutex::new(Box::new([0u8; PAGE_SIZE])))
            .collect();
        let mut owners = Vec::with_capacity(count);
        owners.resize_with(count, || None);

        Self {
            frames,
            inner: Mutex::new(FrameTableInner {
                used: Bitmap::new(count),
                owners,
                hand: 0,
            }),
        }
    }

    /// Allocate a frame for `owner`, evicting another page if the pool is
    /// exhausted.
    ///
    /// The caller must hold the lock of `owner.page`; that keeps the frame
    /// out of the evictor's reach until the page is fully loaded.
    pub fn allocate(&self, kernel: &Kernel, owner: FrameOwner) -> Result<PhysAddr, VmError> {
        let mut inner = self.inner.lock();
        let index = match inner.used.alloc() {
            Some(index) => index,
            None => self.evict(kernel, &mut inner)?,
        };

        log::trace!(
            "frame: {} -> pid {} page {}",
            PhysAddr::from_frame_index(index),
            owner.pid,
            owner.upage
        );
        inner.owners[index] = Some(owner);
        Ok(PhysAddr::from_frame_index(index))
    }

    /// Release a frame without writing it anywhere.
    ///
    /// # Panics
    /// Panics if the frame is not allocated.
    pub fn free(&self, frame: PhysAddr) {
        let mut inner = self.inner.lock();
        let index = frame.frame_index();
        inner.used.free(index);
        inner.owners[index] = None;
    }

    /// Run `f` on the contents of the frame containing `frame`.
    pub fn with_frame<R>(&self, frame: PhysAddr, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        let mut page = self.frames[frame.frame_index()].lock();
        f(&mut page)
    }

    /// Copy bytes out of a frame starting at the page offset of `at`.
    pub fn read(&self, at: PhysAddr, buf: &mut [u8]) {
        let offset = at.as_usize() & PAGE_MASK;
        self.with_frame(at, |page| buf.copy_from_slice(&page[offset..offset + buf.len()]));
    }

    /// Copy bytes into a frame starting at the page offset of `at`.
    pub fn write(&self, at: PhysAddr, data: &[u8]) {
        let offset = at.as_usize() & PAGE_MASK;
        self.with_frame(at, |page| page[offset..offset + data.len()].copy_from_slice(data));
    }

    /// Number of frames not holding any page.
    pub fn free_frames(&self) -> usize {
        self.inner.lock().used.free_count()
    }

    /// Process and user page occupying a frame, if any.
    pub fn owner_of(&self, frame: PhysAddr) -> Option<(Pid, VirtAddr)> {
        self.inner
            .lock()
            .owners
            .get(frame.frame_index())?
            .as_ref()
            .map(|owner| (owner.pid, owner.upage))
    }

    /// Pick a victim, write it back and hand its frame index to the caller.
    ///
    /// The victim's frame stays marked allocated; only its owner changes.
    /// A victim that cannot be written back is remapped and the sweep
    /// moves on; its error is reported only if no other frame can go.
    fn evict(&self, kernel: &Kernel, inner: &mut FrameTableInner) -> Result<usize, VmError> {
        let total = inner.owners.len();
        let mut failure = None;

        for _ in 0..total * 2 {
            let index = inner.hand;
            inner.hand = (inner.hand + 1) % total;

            let Some(owner) = inner.owners[index].clone() else {
                continue;
            };
            // Locked means someone is loading, pinning or releasing it.
            let Some(mut entry) = owner.page.try_lock() else {
                continue;
            };
            if entry.is_pinned() {
                continue;
            }

            let pte = {
                let mut dir = owner.directory.lock();
                if dir.is_accessed(owner.upage) {
                    dir.set_accessed(owner.upage, false);
                    continue;
                }
                match dir.unmap_page(owner.upage) {
                    Ok(pte) => pte,
                    Err(_) => continue,
                }
            };

            let frame = PhysAddr::from_frame_index(index);
            let dirty = pte.flags().contains(PteFlags::DIRTY);
            if let Err(e) = entry.write_back(kernel, frame, dirty) {
                log::warn!(
                    "frame: cannot evict pid {} page {}: {}",
                    owner.pid,
                    owner.upage,
                    e
                );
                let mut dir = owner.directory.lock();
                dir.map_page(owner.upage, frame, entry.is_writable())?;
                dir.set_dirty(owner.upage, dirty);
                failure = Some(e);
                continue;
            }

            log::debug!(
                "frame: evicted pid {} page {} from {} ({:?})",
                owner.pid,
                owner.upage,
                frame,
                entry.provenance()
            );
            inner.owners[index] = None;
            return Ok(index);
        }

        Err(failure.unwrap_or(VmError::OutOfFrames))
    }
}
