//! Kernel-wide VM state
//!
//! The pieces every process shares: the user frame pool, the swap store,
//! the filesystem gate and the console and process-control collaborators.

use alloc::sync::Arc;

use crate::config::VmConfig;
use crate::drivers::{BlockDevice, Console};
use crate::fs::{FileSystem, FsGate};
use crate::mm::{FrameTable, SwapStore};
use crate::process::{Pid, Process, ProcessControl};

/// Global state shared by all processes.
pub struct Kernel {
    pub config: VmConfig,
    pub frames: FrameTable,
    pub swap: SwapStore,
    pub fs: FsGate,
    pub console: Arc<dyn Console>,
    pub processes: Arc<dyn ProcessControl>,
}

impl Kernel {
    /// Bring up the VM core over the given collaborators.
    pub fn new(
        config: VmConfig,
        swap_device: Arc<dyn BlockDevice>,
        fs: Arc<dyn FileSystem>,
        console: Arc<dyn Console>,
        processes: Arc<dyn ProcessControl>,
    ) -> Self {
        log::info!("vm: {} user frames", config.user_frames);
        Self {
            frames: FrameTable::new(config.user_frames),
            swap: SwapStore::new(swap_device),
            fs: FsGate::new(fs),
            console,
            processes,
            config,
        }
    }

    /// Create the VM context of a new process.
    pub fn create_process(&self, pid: Pid, name: &str) -> Process {
        Process::new(pid, name, &self.config)
    }
}
