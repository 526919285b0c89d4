//! Process context
//!
//! Everything this crate keeps per user process: the address space, the
//! descriptor table and the memory mappings. A `Process` is created when
//! the process starts and torn down exactly once by [`Process::exit`].

use alloc::string::String;
use core::fmt::Write;

use crate::config::VmConfig;
use crate::drivers::ConsoleWriter;
use crate::file_table::FileTable;
use crate::kernel::Kernel;
use crate::mm::{AddressSpace, MmapTable};

/// Process identifier.
pub type Pid = i32;

/// Process creation and scheduling, owned by the embedding kernel.
pub trait ProcessControl: Send + Sync {
    /// Start a process from a command line. `None` if it cannot be loaded.
    fn execute(&self, cmdline: &str) -> Option<Pid>;
    /// Wait for a child to exit and return its status, or -1.
    fn wait(&self, pid: Pid) -> i32;
    /// Power the machine off.
    fn power_off(&self);
}

/// Per-process VM and descriptor state.
pub struct Process {
    pid: Pid,
    name: String,
    pub space: AddressSpace,
    pub files: FileTable,
    pub mmaps: MmapTable,
    exit_status: Option<i32>,
}

impl Process {
    pub fn new(pid: Pid, name: &str, config: &VmConfig) -> Self {
        Self {
            pid,
            name: String::from(name),
            space: AddressSpace::new(pid, config),
            files: FileTable::new(),
            mmaps: MmapTable::new(),
            exit_status: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status passed to `exit`, once the process has exited.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Tear the process down: close its files, flush and drop its
    /// mappings, release every page and print the exit message.
    ///
    /// Only the first call has any effect.
    pub fn exit(&mut self, kernel: &Kernel, status: i32) {
        if self.exit_status.is_some() {
            return;
        }

        self.files.close_all(kernel);
        self.mmaps.unmap_all(kernel, &self.space);
        self.space.destroy(kernel);
        self.exit_status = Some(status);

        let _ = writeln!(
            ConsoleWriter(&*kernel.console),
            "{}: exit({})",
            self.name,
            status
        );
        log::debug!("process: pid {} ({}) exited with {}", self.pid, self.name, status);
    }
}
