//! File Descriptor Table
//!
//! Per-process map from small integers to open files. Descriptors 0 and 1
//! are the console and never appear in the table. New descriptors come
//! from a counter that only moves forward, so a closed number is never
//! handed out again during the process's lifetime.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;

use crate::config::FIRST_FD;
use crate::fs::FileRef;
use crate::kernel::Kernel;

/// A per-process file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileDescriptor(pub i32);

impl FileDescriptor {
    /// Console input.
    pub const STDIN: Self = Self(0);
    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// Whether this is one of the console descriptors.
    pub fn is_reserved(self) -> bool {
        self == Self::STDIN || self == Self::STDOUT
    }
}

/// An open file and the name it was opened with.
#[derive(Clone)]
pub struct OpenFile {
    pub file: FileRef,
    pub name: String,
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile").field("name", &self.name).finish()
    }
}

/// Descriptor table errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// Descriptor 0 or 1 where a file is required.
    Reserved,
    /// Descriptor not open in this process.
    NotOpen,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdError::Reserved => write!(f, "Descriptor is reserved for the console"),
            FdError::NotOpen => write!(f, "Descriptor is not open"),
        }
    }
}

/// A process's open files.
#[derive(Debug)]
pub struct FileTable {
    next: i32,
    files: BTreeMap<FileDescriptor, OpenFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            next: FIRST_FD,
            files: BTreeMap::new(),
        }
    }

    /// Open `name` through the filesystem and install it.
    pub fn open(&mut self, kernel: &Kernel, name: &str) -> Option<FileDescriptor> {
        let file = kernel.fs.locked(|fs| fs.open(name))?;
        Some(self.install(file, name))
    }

    /// Install an already open file under the next descriptor.
    pub fn install(&mut self, file: FileRef, name: &str) -> FileDescriptor {
        let fd = FileDescriptor(self.next);
        self.next += 1;
        self.files.insert(
            fd,
            OpenFile {
                file,
                name: String::from(name),
            },
        );
        fd
    }

    /// Look up an open file.
    pub fn get(&self, fd: FileDescriptor) -> Result<&OpenFile, FdError> {
        if fd.is_reserved() {
            return Err(FdError::Reserved);
        }
        self.files.get(&fd).ok_or(FdError::NotOpen)
    }

    /// Close a descriptor, dropping the handle under the filesystem lock.
    pub fn close(&mut self, kernel: &Kernel, fd: FileDescriptor) -> Result<(), FdError> {
        if fd.is_reserved() {
            return Err(FdError::Reserved);
        }
        let open = self.files.remove(&fd).ok_or(FdError::NotOpen)?;
        kernel.fs.locked(|_| drop(open));
        Ok(())
    }

    /// Close every descriptor.
    pub fn close_all(&mut self, kernel: &Kernel) {
        let files = core::mem::take(&mut self.files);
        kernel.fs.locked(|_| drop(files));
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
