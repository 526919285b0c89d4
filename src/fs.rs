//! Filesystem collaborator
//!
//! The VM core never implements a filesystem. It consumes one through
//! [`FileSystem`] and [`File`], and serializes every call into it on a
//! single lock, the [`FsGate`].
//!
//! # Locking
//! The gate is a leaf lock with respect to paging: while it is held the
//! caller may translate addresses and touch frame contents, but must not
//! allocate a frame. Syscall handlers satisfy this by pinning all user
//! buffers before they enter the gate.

use alloc::sync::Arc;

use spin::Mutex;

/// An open file handle.
///
/// Each handle has its own position. Closing a file is dropping the last
/// reference to it.
pub trait File: Send + Sync {
    /// Read at the current position, advancing it. Returns bytes read.
    fn read(&self, buf: &mut [u8]) -> usize;
    /// Write at the current position, advancing it. Returns bytes written.
    fn write(&self, buf: &[u8]) -> usize;
    /// Read at `offset` without moving the position.
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize;
    /// Write at `offset` without moving the position.
    fn write_at(&self, buf: &[u8], offset: usize) -> usize;
    /// Move the position.
    fn seek(&self, position: usize);
    /// Current position.
    fn tell(&self) -> usize;
    /// Length in bytes.
    fn length(&self) -> usize;
    /// Open an independent handle to the same file.
    fn reopen(&self) -> Option<FileRef>;
}

/// Shared reference to an open file.
pub type FileRef = Arc<dyn File>;

/// Name-based filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Create a file of `initial_size` bytes. Fails if it exists.
    fn create(&self, name: &str, initial_size: usize) -> bool;
    /// Remove a file by name.
    fn remove(&self, name: &str) -> bool;
    /// Open a file by name.
    fn open(&self, name: &str) -> Option<FileRef>;
}

/// The process-wide filesystem lock together with the filesystem it guards.
pub struct FsGate {
    lock: Mutex<()>,
    fs: Arc<dyn FileSystem>,
}

impl FsGate {
    /// Wrap a filesystem.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            lock: Mutex::new(()),
            fs,
        }
    }

    /// Run `f` with the filesystem lock held.
    ///
    /// File handles obtained earlier are used from inside the closure too;
    /// the lock covers every filesystem access, not just name lookups.
    pub fn locked<R>(&self, f: impl FnOnce(&dyn FileSystem) -> R) -> R {
        let _guard = self.lock.lock();
        f(&*self.fs)
    }
}
