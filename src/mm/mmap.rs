//! Memory-mapped files
//!
//! A mapping is a run of `Mapped` SPT entries, one per page of a file,
//! backed by its own reopened handle so closing the descriptor used to
//! create it does not end the mapping.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::address::{VirtAddr, PAGE_SIZE};
use super::page::{AddressSpace, FileExtent, PageEntry};
use super::VmError;
use crate::config::FIRST_MAPID;
use crate::fs::FileRef;
use crate::kernel::Kernel;

/// Per-process mapping identifier.
pub type MapId = i32;

/// Pages of one mapping, in file order. Each page's extent holds the
/// reopened handle.
struct Mapping {
    pages: Vec<VirtAddr>,
}

/// A process's memory mappings.
pub struct MmapTable {
    next_id: MapId,
    mappings: BTreeMap<MapId, Mapping>,
}

impl MmapTable {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_MAPID,
            mappings: BTreeMap::new(),
        }
    }

    /// Map `file` at `addr`, one page per page of the file.
    ///
    /// Fails on a null, unaligned or kernel address, on an empty file, and
    /// when any page of the range is already in use. A failed mapping
    /// leaves no entries behind.
    pub fn map(
        &mut self,
        kernel: &Kernel,
        space: &AddressSpace,
        file: &FileRef,
        addr: VirtAddr,
    ) -> Result<MapId, VmError> {
        if !addr.is_user() || !addr.is_aligned() {
            return Err(VmError::InvalidArgument);
        }

        let (file, length) = kernel.fs.locked(|_| {
            let length = file.length();
            (file.reopen(), length)
        });
        let file = file.ok_or(VmError::Io)?;
        if length == 0 {
            return Err(VmError::InvalidArgument);
        }

        let mut pages = Vec::new();
        for offset in (0..length).step_by(PAGE_SIZE) {
            let extent = FileExtent {
                file: file.clone(),
                offset,
                read_bytes: (length - offset).min(PAGE_SIZE),
            };
            let inserted = addr
                .checked_add(offset)
                .filter(|va| va.is_user())
                .ok_or(VmError::BadAddress)
                .and_then(|va| space.insert(PageEntry::mapped(va, extent)).map(|_| va));

            match inserted {
                Ok(va) => pages.push(va),
                Err(e) => {
                    for va in pages {
                        space.remove(va);
                    }
                    log::debug!("mmap: pid {} at {} failed: {}", space.pid(), addr, e);
                    return Err(e);
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        log::debug!(
            "mmap: pid {} mapid {} at {} ({} bytes, {} pages)",
            space.pid(),
            id,
            addr,
            length,
            pages.len()
        );
        self.mappings.insert(id, Mapping { pages });
        Ok(id)
    }

    /// Remove a mapping, writing dirty pages back to the file.
    ///
    /// Unknown identifiers are ignored.
    pub fn unmap(&mut self, kernel: &Kernel, space: &AddressSpace, id: MapId) {
        let Some(mapping) = self.mappings.remove(&id) else {
            return;
        };

        for va in mapping.pages {
            if let Some(page) = space.remove(va) {
                if let Err(e) = space.release(kernel, &page) {
                    log::warn!("mmap: pid {} mapid {} page {}: {}", space.pid(), id, va, e);
                }
            }
        }
        log::debug!("mmap: pid {} unmapped mapid {}", space.pid(), id);
    }

    /// Remove every mapping.
    pub fn unmap_all(&mut self, kernel: &Kernel, space: &AddressSpace) {
        let ids: Vec<MapId> = self.mappings.keys().copied().collect();
        for id in ids {
            self.unmap(kernel, space, id);
        }
    }

    pub fn contains(&self, id: MapId) -> bool {
        self.mappings.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for MmapTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::mm::page::Provenance;
    use crate::testing::Machine;

    const AT: usize = 0x1000_0000;

    fn file_with(machine: &Machine, name: &str, bytes: &[u8]) -> FileRef {
        machine.fs.create(name, 0);
        machine.fs.write_file(name, bytes);
        machine.fs.open(name).unwrap()
    }

    #[test]
    fn test_map_covers_file_with_zero_tail() {
        let machine = Machine::boot(4, 4);
        let mut process = machine.spawn(1, "map");
        let file = file_with(&machine, "ten", b"0123456789");

        let id = process
            .mmaps
            .map(&machine.kernel, &process.space, &file, VirtAddr::new(AT))
            .unwrap();
        assert_eq!(id, FIRST_MAPID);
        assert_eq!(process.space.page_count(), 1);

        let page = process.space.lookup(VirtAddr::new(AT)).unwrap();
        match page.lock().provenance() {
            Provenance::Mapped(extent) => {
                assert_eq!(extent.read_bytes, 10);
                assert_eq!(extent.zero_bytes(), PAGE_SIZE - 10);
            }
            other => panic!("unexpected provenance {:?}", other),
        }

        let bytes = machine.user_read(&mut process, AT + 8, 4, AT).unwrap();
        assert_eq!(bytes, [b'8', b'9', 0, 0]);
    }

    #[test]
    fn test_unmap_writes_back_only_dirty_bytes() {
        let machine = Machine::boot(4, 4);
        let mut process = machine.spawn(1, "map");
        let file = file_with(&machine, "ten", b"0123456789");

        let id = process
            .mmaps
            .map(&machine.kernel, &process.space, &file, VirtAddr::new(AT))
            .unwrap();
        assert!(machine.user_write(&mut process, AT, b"X", AT));
        assert!(machine.user_write(&mut process, AT + 100, b"tail", AT));

        process.mmaps.unmap(&machine.kernel, &process.space, id);
        assert_eq!(machine.fs.contents("ten").unwrap(), b"X123456789");
        assert_eq!(process.space.page_count(), 0);
        assert_eq!(machine.kernel.frames.free_frames(), 4);
        assert!(!process.mmaps.contains(id));
    }

    #[test]
    fn test_clean_mapping_leaves_file_alone() {
        let machine = Machine::boot(4, 4);
        let mut process = machine.spawn(1, "map");
        let file = file_with(&machine, "f", &[5; PAGE_SIZE + 1]);

        let id = process
            .mmaps
            .map(&machine.kernel, &process.space, &file, VirtAddr::new(AT))
            .unwrap();
        assert_eq!(process.space.page_count(), 2);
        machine.user_read(&mut process, AT + PAGE_SIZE, 1, AT).unwrap();

        file.write_at(&[9], 0);
        process.mmaps.unmap(&machine.kernel, &process.space, id);
        assert_eq!(machine.fs.contents("f").unwrap()[0], 9);
    }

    #[test]
    fn test_map_failures_roll_back() {
        let machine = Machine::boot(4, 4);
        let process = machine.spawn(1, "map");
        let mut mmaps = MmapTable::new();
        let empty = file_with(&machine, "empty", b"");
        let big = file_with(&machine, "big", &[1; 3 * PAGE_SIZE]);

        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &big, VirtAddr::new(0)),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &big, VirtAddr::new(AT + 1)),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &empty, VirtAddr::new(AT)),
            Err(VmError::InvalidArgument)
        );

        process
            .space
            .insert(PageEntry::zero(VirtAddr::new(AT + 2 * PAGE_SIZE), true))
            .unwrap();
        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &big, VirtAddr::new(AT)),
            Err(VmError::AlreadyMapped)
        );
        assert_eq!(process.space.page_count(), 1);
        assert!(mmaps.is_empty());

        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &big, VirtAddr::new(AT + 3 * PAGE_SIZE)),
            Ok(FIRST_MAPID)
        );
        assert_eq!(
            mmaps.map(&machine.kernel, &process.space, &empty.reopen().unwrap(), VirtAddr::new(AT)),
            Err(VmError::InvalidArgument)
        );
    }

    #[test]
    fn test_dirty_mapped_page_survives_eviction() {
        let machine = Machine::boot(1, 4);
        let mut process = machine.spawn(1, "map");
        let file = file_with(&machine, "data", &[0; 2 * PAGE_SIZE]);

        process
            .mmaps
            .map(&machine.kernel, &process.space, &file, VirtAddr::new(AT))
            .unwrap();
        assert!(machine.user_write(&mut process, AT + 5, b"abc", AT));
        assert!(machine.user_write(&mut process, AT + PAGE_SIZE, b"z", AT));

        assert_eq!(&machine.fs.contents("data").unwrap()[5..8], b"abc");
        assert_eq!(machine.kernel.swap.free_slots(), 4);
        assert_eq!(
            machine.user_read(&mut process, AT + 5, 3, AT),
            Some(b"abc".to_vec())
        );

        process.mmaps.unmap_all(&machine.kernel, &process.space);
        assert_eq!(machine.fs.contents("data").unwrap()[PAGE_SIZE], b'z');
    }
}
