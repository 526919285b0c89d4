//! In-memory collaborators and a small machine model for tests.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::config::VmConfig;
use crate::drivers::{BlockDevice, BlockError, Console, SECTOR_SIZE};
use crate::exception::{handle_page_fault, FaultOutcome, PageFault};
use crate::fs::{File, FileRef, FileSystem};
use crate::kernel::Kernel;
use crate::mm::swap::SECTORS_PER_SLOT;
use crate::mm::{PhysAddr, VirtAddr, PAGE_SIZE, USER_END};
use crate::process::{Pid, Process, ProcessControl};
use crate::syscall::{dispatch, Disposition};

/// Start of the top stack page, free for test data.
pub const SCRATCH: usize = USER_END - PAGE_SIZE;

/// Where `Machine::syscall` builds its frames.
const FRAME_ESP: usize = USER_END - 64;

type Node = Arc<Mutex<Vec<u8>>>;

/// A flat in-memory filesystem. Files grow on write.
pub struct MemFs {
    files: Mutex<BTreeMap<String, Node>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let node = self.files.lock().get(name)?.clone();
        let data = node.lock().clone();
        Some(data)
    }

    /// Replace a file's contents, creating it if needed.
    pub fn write_file(&self, name: &str, bytes: &[u8]) {
        let mut files = self.files.lock();
        let node = files
            .entry(String::from(name))
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
        *node.lock() = bytes.to_vec();
    }

    /// Live handles to a file.
    pub fn open_handles(&self, name: &str) -> usize {
        self.files
            .lock()
            .get(name)
            .map_or(0, |node| Arc::strong_count(node) - 1)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl FileSystem for MemFs {
    fn create(&self, name: &str, initial_size: usize) -> bool {
        let mut files = self.files.lock();
        if name.is_empty() || files.contains_key(name) {
            return false;
        }
        files.insert(String::from(name), Arc::new(Mutex::new(vec![0; initial_size])));
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.files.lock().remove(name).is_some()
    }

    fn open(&self, name: &str) -> Option<FileRef> {
        let node = self.files.lock().get(name)?.clone();
        Some(Arc::new(MemFile {
            node,
            pos: Mutex::new(0),
        }))
    }
}

struct MemFile {
    node: Node,
    pos: Mutex<usize>,
}

impl File for MemFile {
    fn read(&self, buf: &mut [u8]) -> usize {
        let mut pos = self.pos.lock();
        let n = self.read_at(buf, *pos);
        *pos += n;
        n
    }

    fn write(&self, buf: &[u8]) -> usize {
        let mut pos = self.pos.lock();
        let n = self.write_at(buf, *pos);
        *pos += n;
        n
    }

    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let data = self.node.lock();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        let mut data = self.node.lock();
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        buf.len()
    }

    fn seek(&self, position: usize) {
        *self.pos.lock() = position;
    }

    fn tell(&self) -> usize {
        *self.pos.lock()
    }

    fn length(&self) -> usize {
        self.node.lock().len()
    }

    fn reopen(&self) -> Option<FileRef> {
        Some(Arc::new(MemFile {
            node: self.node.clone(),
            pos: Mutex::new(0),
        }))
    }
}

/// A block device backed by memory.
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; sectors]),
        }
    }

    /// A disk holding exactly `slots` swap slots.
    pub fn with_slots(slots: usize) -> Self {
        Self::new(slots * SECTORS_PER_SLOT)
    }
}

impl BlockDevice for RamDisk {
    fn sector_count(&self) -> usize {
        self.sectors.lock().len()
    }

    fn read_sector(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        let sectors = self.sectors.lock();
        *buf = *sectors.get(sector).ok_or(BlockError::OutOfRange)?;
        Ok(())
    }

    fn write_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        let mut sectors = self.sectors.lock();
        *sectors.get_mut(sector).ok_or(BlockError::OutOfRange)? = *buf;
        Ok(())
    }
}

/// Console that records output and replays queued input.
pub struct TestConsole {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
}

impl TestConsole {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            input: Mutex::new(VecDeque::new()),
        }
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }
}

impl Console for TestConsole {
    fn write(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
    }

    /// Returns 0 once the queued input runs out.
    fn getc(&self) -> u8 {
        self.input.lock().pop_front().unwrap_or(0)
    }
}

/// Process control that hands out pids from 100 and remembers children.
pub struct TestProcesses {
    next: Mutex<Pid>,
    executed: Mutex<Vec<String>>,
    children: Mutex<BTreeSet<Pid>>,
    powered_off: AtomicBool,
}

impl TestProcesses {
    pub fn new() -> Self {
        Self {
            next: Mutex::new(100),
            executed: Mutex::new(Vec::new()),
            children: Mutex::new(BTreeSet::new()),
            powered_off: AtomicBool::new(false),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn powered_off(&self) -> bool {
        self.powered_off.load(Ordering::SeqCst)
    }
}

impl ProcessControl for TestProcesses {
    fn execute(&self, cmdline: &str) -> Option<Pid> {
        if cmdline.trim().is_empty() {
            return None;
        }
        let mut next = self.next.lock();
        let pid = *next;
        *next += 1;
        self.executed.lock().push(String::from(cmdline));
        self.children.lock().insert(pid);
        Some(pid)
    }

    fn wait(&self, pid: Pid) -> i32 {
        if self.children.lock().remove(&pid) {
            0
        } else {
            -1
        }
    }

    fn power_off(&self) {
        self.powered_off.store(true, Ordering::SeqCst);
    }
}

/// A kernel over in-memory collaborators, plus a user-mode CPU model
/// that walks the page directory and raises page faults.
pub struct Machine {
    pub kernel: Kernel,
    pub fs: Arc<MemFs>,
    pub console: Arc<TestConsole>,
    pub processes: Arc<TestProcesses>,
}

impl Machine {
    pub fn boot(frames: usize, swap_slots: usize) -> Self {
        let fs = Arc::new(MemFs::new());
        let console = Arc::new(TestConsole::new());
        let processes = Arc::new(TestProcesses::new());
        let kernel = Kernel::new(
            VmConfig::new().with_user_frames(frames),
            Arc::new(RamDisk::with_slots(swap_slots)),
            fs.clone(),
            console.clone(),
            processes.clone(),
        );
        Self {
            kernel,
            fs,
            console,
            processes,
        }
    }

    pub fn spawn(&self, pid: Pid, name: &str) -> Process {
        self.kernel.create_process(pid, name)
    }

    /// Translate one user access, taking page faults as the CPU would.
    /// `None` once the process has been killed.
    fn access(&self, p: &mut Process, va: VirtAddr, write: bool, esp: usize) -> Option<PhysAddr> {
        for _ in 0..3 {
            if p.has_exited() {
                return None;
            }
            let access = p.space.directory().lock().access(va, write);
            match access {
                Ok(phys) => return Some(phys),
                Err(code) => {
                    let fault = PageFault {
                        addr: va,
                        esp: VirtAddr::new(esp),
                        code,
                    };
                    if handle_page_fault(&self.kernel, p, fault) == FaultOutcome::Terminated {
                        return None;
                    }
                }
            }
        }
        None
    }

    /// Store bytes from user mode. `false` if the process was killed.
    pub fn user_write(&self, p: &mut Process, addr: usize, data: &[u8], esp: usize) -> bool {
        let mut done = 0;
        while done < data.len() {
            let va = VirtAddr::new(addr + done);
            let chunk = (PAGE_SIZE - va.page_offset()).min(data.len() - done);
            let Some(phys) = self.access(p, va, true, esp) else {
                return false;
            };
            self.kernel.frames.write(phys, &data[done..done + chunk]);
            done += chunk;
        }
        true
    }

    /// Load bytes from user mode. `None` if the process was killed.
    pub fn user_read(&self, p: &mut Process, addr: usize, len: usize, esp: usize) -> Option<Vec<u8>> {
        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let va = VirtAddr::new(addr + done);
            let chunk = (PAGE_SIZE - va.page_offset()).min(len - done);
            let phys = self.access(p, va, false, esp)?;
            self.kernel.frames.read(phys, &mut out[done..done + chunk]);
            done += chunk;
        }
        Some(out)
    }

    fn ensure_stack(&self, p: &mut Process) {
        if p.space.lookup(VirtAddr::new(SCRATCH)).is_none() {
            p.space.setup_stack(&self.kernel).unwrap();
        }
    }

    /// Store a NUL-terminated string and return its address.
    pub fn put_str(&self, p: &mut Process, addr: usize, s: &str) -> u32 {
        self.ensure_stack(p);
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        assert!(self.user_write(p, addr, &bytes, FRAME_ESP));
        addr as u32
    }

    /// Push a syscall frame on the user stack and trap into the kernel.
    pub fn syscall(&self, p: &mut Process, number: u32, args: &[u32]) -> Disposition {
        self.ensure_stack(p);
        let frame: Vec<u8> = core::iter::once(number)
            .chain(args.iter().copied())
            .flat_map(u32::to_le_bytes)
            .collect();
        assert!(self.user_write(p, FRAME_ESP, &frame, FRAME_ESP));
        dispatch(&self.kernel, p, FRAME_ESP)
    }
}
