//! Supplemental Page Table
//!
//! Per-process map from user page to where its contents live right now,
//! and the demand loader that brings a page into a frame on first touch.
//!
//! # Page lifecycle
//! ```text
//! Zero / Executable / Mapped ──fault──▶ Framed ──evict──▶ Swapped
//!          ▲                              │                  │
//!          └────── clean or mapped ───────┘◀──────fault──────┘
//! ```
//!
//! Every entry remembers its original source, so a clean page can be
//! dropped on eviction and reread later. Once a page has been swapped it
//! is anonymous: its contents exist nowhere but in its frame or its slot.
//!
//! # Locking
//! An entry's lock is held for the whole of a load, a pin, an eviction or
//! a release. The frame table only ever `try_lock`s an entry.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use super::address::{PhysAddr, VirtAddr, PAGE_SIZE, USER_END};
use super::frame::FrameOwner;
use super::mapper::{PageDirectory, SharedPageDirectory};
use super::paging::PteFlags;
use super::swap::SwapSlot;
use super::VmError;
use crate::config::VmConfig;
use crate::fs::FileRef;
use crate::kernel::Kernel;
use crate::process::Pid;

/// Shared handle to one SPT entry.
pub type PageRef = Arc<Mutex<PageEntry>>;

/// A page-sized window onto a file.
#[derive(Clone)]
pub struct FileExtent {
    /// File the page is read from.
    pub file: FileRef,
    /// Byte offset of the page within the file.
    pub offset: usize,
    /// Bytes taken from the file; the rest of the page is zero.
    pub read_bytes: usize,
}

impl FileExtent {
    /// Bytes zero-filled after the file data.
    pub fn zero_bytes(&self) -> usize {
        PAGE_SIZE - self.read_bytes
    }
}

impl fmt::Debug for FileExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileExtent")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .finish()
    }
}

/// Where a page's contents currently live.
#[derive(Debug, Clone)]
pub enum Provenance {
    /// All zeroes; nothing to read.
    Zero,
    /// A segment of an executable.
    Executable(FileExtent),
    /// A page of a memory-mapped file.
    Mapped(FileExtent),
    /// Parked in a swap slot.
    Swapped(SwapSlot),
    /// Resident in a frame.
    Framed(PhysAddr),
}

/// The provenance an entry was created with.
#[derive(Debug, Clone)]
enum Source {
    Zero,
    Executable(FileExtent),
    Mapped(FileExtent),
}

impl Source {
    fn provenance(&self) -> Provenance {
        match self {
            Source::Zero => Provenance::Zero,
            Source::Executable(extent) => Provenance::Executable(extent.clone()),
            Source::Mapped(extent) => Provenance::Mapped(extent.clone()),
        }
    }
}

/// One user page in the supplemental page table.
#[derive(Debug)]
pub struct PageEntry {
    upage: VirtAddr,
    writable: bool,
    pinned: bool,
    provenance: Provenance,
    source: Source,
    /// Contents have diverged from `source` and only survive via swap.
    anonymous: bool,
}

impl PageEntry {
    fn with_source(upage: VirtAddr, source: Source, writable: bool) -> Self {
        Self {
            upage: upage.page_base(),
            writable,
            pinned: false,
            provenance: source.provenance(),
            source,
            anonymous: false,
        }
    }

    /// A zero-filled page.
    pub fn zero(upage: VirtAddr, writable: bool) -> Self {
        Self::with_source(upage, Source::Zero, writable)
    }

    /// A page of an executable segment.
    pub fn executable(upage: VirtAddr, extent: FileExtent, writable: bool) -> Self {
        Self::with_source(upage, Source::Executable(extent), writable)
    }

    /// A writable page of a memory-mapped file.
    pub fn mapped(upage: VirtAddr, extent: FileExtent) -> Self {
        Self::with_source(upage, Source::Mapped(extent), true)
    }

    pub fn upage(&self) -> VirtAddr {
        self.upage
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.provenance, Provenance::Framed(_))
    }

    /// Frame holding the page, if resident.
    pub fn frame(&self) -> Option<PhysAddr> {
        match self.provenance {
            Provenance::Framed(frame) => Some(frame),
            _ => None,
        }
    }

    /// Move the contents of `frame` out of memory so the frame can be
    /// reused. The page must already be unmapped from its directory.
    ///
    /// Dirty mapped pages go back to their file, clean pages that still
    /// match their source are dropped, and everything else is swapped.
    pub(crate) fn write_back(
        &mut self,
        kernel: &Kernel,
        frame: PhysAddr,
        dirty: bool,
    ) -> Result<(), VmError> {
        match &self.source {
            Source::Mapped(extent) => {
                if dirty {
                    write_to_file(kernel, extent, frame)?;
                }
                self.provenance = self.source.provenance();
            }
            _ if !dirty && !self.anonymous => {
                self.provenance = self.source.provenance();
            }
            _ => {
                let slot = kernel
                    .frames
                    .with_frame(frame, |page| kernel.swap.write_out(page))?;
                self.provenance = Provenance::Swapped(slot);
                self.anonymous = true;
            }
        }
        Ok(())
    }
}

/// Copy the file-backed part of a frame back to its file.
fn write_to_file(kernel: &Kernel, extent: &FileExtent, frame: PhysAddr) -> Result<(), VmError> {
    let written = kernel.fs.locked(|_| {
        kernel.frames.with_frame(frame, |page| {
            extent.file.write_at(&page[..extent.read_bytes], extent.offset)
        })
    });
    if written != extent.read_bytes {
        log::warn!(
            "vm: short write-back at offset {} ({} of {} bytes)",
            extent.offset,
            written,
            extent.read_bytes
        );
        return Err(VmError::Io);
    }
    Ok(())
}

/// Fill a frame from a file, zeroing the tail.
fn read_from_file(kernel: &Kernel, extent: &FileExtent, frame: PhysAddr) -> Result<(), VmError> {
    let read = kernel.fs.locked(|_| {
        kernel.frames.with_frame(frame, |page| {
            let (data, tail) = page.split_at_mut(extent.read_bytes);
            tail.fill(0);
            extent.file.read_at(data, extent.offset)
        })
    });
    if read != extent.read_bytes {
        return Err(VmError::Io);
    }
    Ok(())
}

/// A process's user address space: its page directory and supplemental
/// page table.
pub struct AddressSpace {
    pid: Pid,
    directory: SharedPageDirectory,
    pages: Mutex<BTreeMap<VirtAddr, PageRef>>,
    stack_limit: usize,
    stack_slack: usize,
}

impl AddressSpace {
    /// Create an empty address space.
    pub fn new(pid: Pid, config: &VmConfig) -> Self {
        Self {
            pid,
            directory: PageDirectory::new_shared(),
            pages: Mutex::new(BTreeMap::new()),
            stack_limit: config.stack_limit,
            stack_slack: config.stack_slack,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn directory(&self) -> &SharedPageDirectory {
        &self.directory
    }

    /// Entry covering the page containing `va`.
    pub fn lookup(&self, va: VirtAddr) -> Option<PageRef> {
        self.pages.lock().get(&va.page_base()).cloned()
    }

    /// Add an entry. Its page must be a free, aligned user page.
    pub fn insert(&self, entry: PageEntry) -> Result<PageRef, VmError> {
        let upage = entry.upage;
        if !upage.is_user() {
            return Err(VmError::BadAddress);
        }

        let mut pages = self.pages.lock();
        if pages.contains_key(&upage) {
            return Err(VmError::AlreadyMapped);
        }
        let page = Arc::new(Mutex::new(entry));
        pages.insert(upage, page.clone());
        Ok(page)
    }

    /// Detach the entry for `upage` without releasing what it holds.
    pub fn remove(&self, upage: VirtAddr) -> Option<PageRef> {
        self.pages.lock().remove(&upage.page_base())
    }

    /// Number of entries.
    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    /// Whether an access to `va` with stack pointer `esp` is the stack
    /// growing down: close enough below `esp` and inside the stack limit.
    pub fn is_stack_growth(&self, va: VirtAddr, esp: VirtAddr) -> bool {
        let addr = va.as_usize();
        addr < USER_END
            && addr >= USER_END.saturating_sub(self.stack_limit)
            && addr.saturating_add(self.stack_slack) >= esp.as_usize()
    }

    /// Make the page containing `va` resident.
    pub fn ensure_resident(
        &self,
        kernel: &Kernel,
        va: VirtAddr,
        esp: VirtAddr,
    ) -> Result<PageRef, VmError> {
        self.resolve(kernel, va, esp, false, false)
    }

    /// Handle a not-present fault on `va`.
    pub fn fault_in(
        &self,
        kernel: &Kernel,
        va: VirtAddr,
        esp: VirtAddr,
        write: bool,
    ) -> Result<(), VmError> {
        self.resolve(kernel, va, esp, write, false).map(|_| ())
    }

    /// Make the page containing `va` resident and keep it there until
    /// [`unpin`](Self::unpin). `write` additionally requires the page to
    /// be writable.
    pub fn pin(
        &self,
        kernel: &Kernel,
        va: VirtAddr,
        esp: VirtAddr,
        write: bool,
    ) -> Result<PageRef, VmError> {
        self.resolve(kernel, va, esp, write, true)
    }

    /// Let the page containing `va` be evicted again.
    pub fn unpin(&self, va: VirtAddr) {
        if let Some(page) = self.lookup(va) {
            page.lock().set_pinned(false);
        }
    }

    fn resolve(
        &self,
        kernel: &Kernel,
        va: VirtAddr,
        esp: VirtAddr,
        write: bool,
        pin: bool,
    ) -> Result<PageRef, VmError> {
        if !va.is_user() {
            return Err(VmError::BadAddress);
        }

        let page = match self.lookup(va) {
            Some(page) => page,
            None if self.is_stack_growth(va, esp) => {
                log::trace!("vm: pid {} stack grows to {}", self.pid, va.page_base());
                self.insert(PageEntry::zero(va.page_base(), true))?
            }
            None => return Err(VmError::BadAddress),
        };

        {
            let mut entry = page.lock();
            if write && !entry.writable {
                return Err(VmError::NotWritable);
            }
            self.load(kernel, &page, &mut entry)?;
            if pin {
                entry.set_pinned(true);
            }
        }
        Ok(page)
    }

    /// Bring a locked entry into a frame. No-op if it is already resident.
    fn load(&self, kernel: &Kernel, page: &PageRef, entry: &mut PageEntry) -> Result<(), VmError> {
        if entry.is_resident() {
            return Ok(());
        }

        let frame = kernel.frames.allocate(
            kernel,
            FrameOwner {
                pid: self.pid,
                upage: entry.upage,
                page: page.clone(),
                directory: self.directory.clone(),
            },
        )?;

        let filled = match &entry.provenance {
            Provenance::Zero => {
                kernel.frames.with_frame(frame, |data| data.fill(0));
                Ok(())
            }
            Provenance::Executable(extent) | Provenance::Mapped(extent) => {
                read_from_file(kernel, extent, frame)
            }
            Provenance::Swapped(slot) => kernel
                .frames
                .with_frame(frame, |data| kernel.swap.read_in(*slot, data)),
            Provenance::Framed(_) => Ok(()),
        };
        let mapped = filled.and_then(|()| {
            self.directory
                .lock()
                .map_page(entry.upage, frame, entry.writable)
                .map_err(VmError::from)
        });
        if let Err(e) = mapped {
            kernel.frames.free(frame);
            return Err(e);
        }

        let previous = core::mem::replace(&mut entry.provenance, Provenance::Framed(frame));
        if let Provenance::Swapped(slot) = previous {
            kernel.swap.release(slot);
        }
        log::trace!("vm: pid {} loaded {} into {}", self.pid, entry.upage, frame);
        Ok(())
    }

    /// Register the pages of an executable segment for lazy loading.
    ///
    /// `read_bytes + zero_bytes` must be a whole number of pages and
    /// `upage` and `offset` must be page-aligned. Pages past the file data
    /// are plain zero pages. On failure nothing is left registered.
    pub fn load_segment(
        &self,
        file: &FileRef,
        offset: usize,
        upage: VirtAddr,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(VmError::InvalidArgument)?;
        if total % PAGE_SIZE != 0 || !upage.is_aligned() || offset % PAGE_SIZE != 0 {
            return Err(VmError::InvalidArgument);
        }

        let mut added = Vec::new();
        let mut remaining = read_bytes;
        for i in 0..total / PAGE_SIZE {
            let page_read = remaining.min(PAGE_SIZE);
            let entry = match upage.checked_add(i * PAGE_SIZE) {
                Some(va) if page_read == 0 => Ok(PageEntry::zero(va, writable)),
                Some(va) => Ok(PageEntry::executable(
                    va,
                    FileExtent {
                        file: file.clone(),
                        offset: offset + i * PAGE_SIZE,
                        read_bytes: page_read,
                    },
                    writable,
                )),
                None => Err(VmError::BadAddress),
            };

            match entry.and_then(|entry| self.insert(entry)) {
                Ok(page) => added.push(page.lock().upage),
                Err(e) => {
                    for va in added {
                        self.remove(va);
                    }
                    return Err(e);
                }
            }
            remaining -= page_read;
        }

        log::debug!(
            "vm: pid {} segment {} ({} file bytes, {} zero bytes)",
            self.pid,
            upage,
            read_bytes,
            zero_bytes
        );
        Ok(())
    }

    /// Create and load the first stack page, returning the initial stack
    /// pointer.
    pub fn setup_stack(&self, kernel: &Kernel) -> Result<VirtAddr, VmError> {
        let top = VirtAddr::new(USER_END);
        let upage = VirtAddr::new(USER_END - PAGE_SIZE);
        let page = self.insert(PageEntry::zero(upage, true))?;
        if let Err(e) = self.load(kernel, &page, &mut page.lock()) {
            self.remove(upage);
            return Err(e);
        }
        Ok(top)
    }

    /// Copy user memory into `buf`. Every page touched must be resident.
    pub fn copy_in(&self, kernel: &Kernel, va: VirtAddr, buf: &mut [u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < buf.len() {
            let at = va.checked_add(done).ok_or(VmError::BadAddress)?;
            let chunk = (PAGE_SIZE - at.page_offset()).min(buf.len() - done);
            let phys = self
                .directory
                .lock()
                .access(at, false)
                .map_err(|_| VmError::BadAddress)?;
            kernel.frames.read(phys, &mut buf[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Copy `data` into user memory. Every page touched must be resident
    /// and writable.
    pub fn copy_out(&self, kernel: &Kernel, va: VirtAddr, data: &[u8]) -> Result<(), VmError> {
        let mut done = 0;
        while done < data.len() {
            let at = va.checked_add(done).ok_or(VmError::BadAddress)?;
            let chunk = (PAGE_SIZE - at.page_offset()).min(data.len() - done);
            let phys = self.directory.lock().access(at, true).map_err(|_| {
                if self.lookup(at).is_some() {
                    VmError::NotWritable
                } else {
                    VmError::BadAddress
                }
            })?;
            kernel.frames.write(phys, &data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Give back whatever an entry holds: its frame (writing a dirty
    /// mapped page to its file first) or its swap slot.
    pub fn release(&self, kernel: &Kernel, page: &PageRef) -> Result<(), VmError> {
        let mut entry = page.lock();
        let result = match entry.provenance {
            Provenance::Framed(frame) => {
                let dirty = self
                    .directory
                    .lock()
                    .unmap_page(entry.upage)
                    .map_or(false, |pte| pte.flags().contains(PteFlags::DIRTY));
                let written = match &entry.source {
                    Source::Mapped(extent) if dirty => write_to_file(kernel, extent, frame),
                    _ => Ok(()),
                };
                kernel.frames.free(frame);
                written
            }
            Provenance::Swapped(slot) => {
                kernel.swap.release(slot);
                Ok(())
            }
            _ => Ok(()),
        };
        entry.provenance = entry.source.provenance();
        entry.pinned = false;
        result
    }

    /// Release every page. Called once, when the process exits.
    pub fn destroy(&self, kernel: &Kernel) {
        let pages = core::mem::take(&mut *self.pages.lock());
        let count = pages.len();
        for (upage, page) in pages {
            if let Err(e) = self.release(kernel, &page) {
                log::warn!("vm: pid {} lost page {}: {}", self.pid, upage, e);
            }
        }
        log::debug!("vm: pid {} released {} pages", self.pid, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::testing::Machine;

    const CODE: usize = 0x0804_8000;
    const BELOW_STACK_LIMIT: usize = crate::config::STACK_LIMIT + PAGE_SIZE;

    fn program(machine: &Machine, bytes: &[u8]) -> FileRef {
        machine.fs.create("prog", 0);
        let file = machine.fs.open("prog").unwrap();
        file.write(bytes);
        file
    }

    #[test]
    fn test_segment_loads_lazily_with_zero_tail() {
        let machine = Machine::boot(8, 8);
        let mut process = machine.spawn(1, "prog");
        let bytes: Vec<u8> = (0..PAGE_SIZE + 100).map(|i| i as u8).collect();
        let file = program(&machine, &bytes);

        process
            .space
            .load_segment(&file, 0, VirtAddr::new(CODE), PAGE_SIZE + 100, 2 * PAGE_SIZE - 100, false)
            .unwrap();
        assert_eq!(process.space.page_count(), 3);
        assert_eq!(machine.kernel.frames.free_frames(), 8);

        let second = machine
            .user_read(&mut process, CODE + PAGE_SIZE + 98, 4, CODE)
            .unwrap();
        assert_eq!(second, [bytes[PAGE_SIZE + 98], bytes[PAGE_SIZE + 99], 0, 0]);
        assert_eq!(machine.kernel.frames.free_frames(), 7);

        let third = process.space.lookup(VirtAddr::new(CODE + 2 * PAGE_SIZE)).unwrap();
        assert!(matches!(third.lock().provenance(), Provenance::Zero));
    }

    #[test]
    fn test_segment_rejects_overlap_and_rolls_back() {
        let machine = Machine::boot(4, 4);
        let process = machine.spawn(1, "prog");
        let file = program(&machine, &[1; 16]);
        process
            .space
            .insert(PageEntry::zero(VirtAddr::new(CODE + 2 * PAGE_SIZE), true))
            .unwrap();

        assert_eq!(
            process
                .space
                .load_segment(&file, 0, VirtAddr::new(CODE), 16, 3 * PAGE_SIZE - 16, true),
            Err(VmError::AlreadyMapped)
        );
        assert_eq!(process.space.page_count(), 1);
        assert_eq!(
            process
                .space
                .load_segment(&file, 0, VirtAddr::new(CODE), 16, 16, true),
            Err(VmError::InvalidArgument)
        );
    }

    #[test]
    fn test_stack_growth_window() {
        let machine = Machine::boot(4, 4);
        let process = machine.spawn(1, "stack");
        let esp = process.space.setup_stack(&machine.kernel).unwrap();
        assert_eq!(esp, VirtAddr::new(USER_END));

        let sp = VirtAddr::new(USER_END - PAGE_SIZE - 64);
        assert!(process.space.is_stack_growth(VirtAddr::new(sp.as_usize() - 32), sp));
        assert!(!process.space.is_stack_growth(VirtAddr::new(sp.as_usize() - 33), sp));
        assert!(!process
            .space
            .is_stack_growth(VirtAddr::new(USER_END - BELOW_STACK_LIMIT), VirtAddr::new(0)));

        process
            .space
            .ensure_resident(&machine.kernel, VirtAddr::new(sp.as_usize() - 4), sp)
            .unwrap();
        assert_eq!(process.space.page_count(), 2);
        assert_eq!(
            process
                .space
                .ensure_resident(&machine.kernel, VirtAddr::new(0x1000_0000), sp)
                .map(|_| ()),
            Err(VmError::BadAddress)
        );
    }

    #[test]
    fn test_write_to_read_only_page() {
        let machine = Machine::boot(4, 4);
        let mut process = machine.spawn(1, "ro");
        let file = program(&machine, &[7; 32]);
        process
            .space
            .load_segment(&file, 0, VirtAddr::new(CODE), 32, PAGE_SIZE - 32, false)
            .unwrap();

        let esp = VirtAddr::new(CODE);
        assert_eq!(
            process
                .space
                .pin(&machine.kernel, VirtAddr::new(CODE), esp, true)
                .map(|_| ()),
            Err(VmError::NotWritable)
        );
        assert_eq!(machine.user_read(&mut process, CODE, 2, CODE), Some(alloc::vec![7, 7]));
        assert!(!machine.user_write(&mut process, CODE, &[1], CODE));
        assert_eq!(process.exit_status(), Some(-1));
    }

    #[test]
    fn test_eviction_round_trip_across_processes() {
        let machine = Machine::boot(3, 16);
        let base = 0x2000_0000;
        let mut procs = [machine.spawn(1, "a"), machine.spawn(2, "b")];

        for (p, process) in procs.iter_mut().enumerate() {
            for i in 0..4 {
                let va = VirtAddr::new(base + i * PAGE_SIZE);
                process.space.insert(PageEntry::zero(va, true)).unwrap();
                let fill = [(p * 16 + i) as u8; 8];
                assert!(machine.user_write(process, va.as_usize() + 100, &fill, base));
            }
        }
        assert!(machine.kernel.swap.free_slots() < 16);

        for (p, process) in procs.iter_mut().enumerate() {
            for i in 0..4 {
                let got = machine
                    .user_read(process, base + i * PAGE_SIZE + 100, 8, base)
                    .unwrap();
                assert_eq!(got, [(p * 16 + i) as u8; 8]);
            }
        }
    }

    #[test]
    fn test_destroy_returns_frames_and_slots() {
        let machine = Machine::boot(2, 8);
        let mut process = machine.spawn(1, "gone");
        let base = 0x3000_0000;
        for i in 0..4 {
            let va = VirtAddr::new(base + i * PAGE_SIZE);
            process.space.insert(PageEntry::zero(va, true)).unwrap();
            machine.user_write(&mut process, va.as_usize(), &[0xEE], base);
        }
        assert_eq!(machine.kernel.swap.free_slots(), 6);

        process.space.destroy(&machine.kernel);
        assert_eq!(process.space.page_count(), 0);
        assert_eq!(machine.kernel.frames.free_frames(), 2);
        assert_eq!(machine.kernel.swap.free_slots(), 8);
        assert_eq!(process.space.directory().lock().mapped_pages(), 0);
    }

    #[test]
    fn test_copy_in_and_out_span_pages() {
        let machine = Machine::boot(4, 4);
        let process = machine.spawn(1, "copy");
        let base = VirtAddr::new(0x4000_0000);
        for i in 0..2 {
            process
                .space
                .insert(PageEntry::zero(VirtAddr::new(base.as_usize() + i * PAGE_SIZE), true))
                .unwrap();
            process
                .space
                .pin(&machine.kernel, VirtAddr::new(base.as_usize() + i * PAGE_SIZE), base, true)
                .unwrap();
        }

        let at = VirtAddr::new(base.as_usize() + PAGE_SIZE - 3);
        process.space.copy_out(&machine.kernel, at, b"hello").unwrap();
        let mut buf = [0u8; 5];
        process.space.copy_in(&machine.kernel, at, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_clean_executable_page_reverts_to_its_file() {
        let machine = Machine::boot(1, 4);
        let mut process = machine.spawn(1, "prog");
        let bytes: Vec<u8> = (0..2 * PAGE_SIZE).map(|i| (i / 7) as u8).collect();
        let file = program(&machine, &bytes);
        process
            .space
            .load_segment(&file, 0, VirtAddr::new(CODE), 2 * PAGE_SIZE, 0, false)
            .unwrap();

        assert_eq!(
            machine.user_read(&mut process, CODE + 10, 4, CODE),
            Some(bytes[10..14].to_vec())
        );
        assert_eq!(
            machine.user_read(&mut process, CODE + PAGE_SIZE, 4, CODE),
            Some(bytes[PAGE_SIZE..PAGE_SIZE + 4].to_vec())
        );

        let first = process.space.lookup(VirtAddr::new(CODE)).unwrap();
        {
            let entry = first.lock();
            assert!(matches!(entry.provenance(), Provenance::Executable(extent) if extent.offset == 0));
            assert!(!entry.is_anonymous());
        }
        assert_eq!(machine.kernel.swap.free_slots(), 4);

        assert_eq!(
            machine.user_read(&mut process, CODE + 10, 4, CODE),
            Some(bytes[10..14].to_vec())
        );
        assert!(first.lock().is_resident());
    }

    #[test]
    fn test_dirty_executable_page_never_reverts_to_its_file() {
        let machine = Machine::boot(1, 4);
        let mut process = machine.spawn(1, "data");
        let file = program(&machine, &[0x11; PAGE_SIZE]);
        process
            .space
            .load_segment(&file, 0, VirtAddr::new(CODE), PAGE_SIZE, 0, true)
            .unwrap();
        let other = CODE + PAGE_SIZE;
        process.space.insert(PageEntry::zero(VirtAddr::new(other), true)).unwrap();
        let expected = b"\x11\x11dirty\x11".to_vec();

        assert!(machine.user_write(&mut process, CODE + 8, b"dirty", CODE));
        assert_eq!(machine.user_read(&mut process, other, 1, CODE), Some(alloc::vec![0]));

        let page = process.space.lookup(VirtAddr::new(CODE)).unwrap();
        {
            let entry = page.lock();
            assert!(matches!(entry.provenance(), Provenance::Swapped(_)));
            assert!(entry.is_anonymous());
        }
        assert_eq!(machine.kernel.swap.free_slots(), 3);

        assert_eq!(machine.user_read(&mut process, CODE + 6, 8, CODE), Some(expected.clone()));
        assert_eq!(machine.kernel.swap.free_slots(), 4);

        // Reloaded and only read since: still swapped, not dropped.
        assert_eq!(machine.user_read(&mut process, other, 1, CODE), Some(alloc::vec![0]));
        assert!(matches!(page.lock().provenance(), Provenance::Swapped(_)));
        assert_eq!(machine.user_read(&mut process, CODE + 6, 8, CODE), Some(expected));
        assert_eq!(machine.fs.contents("prog"), Some(alloc::vec![0x11; PAGE_SIZE]));
    }
}
