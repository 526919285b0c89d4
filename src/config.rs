//! Kernel VM configuration
//!
//! Compile-time ABI constants plus the few knobs an embedding kernel sizes
//! at boot.

/// Size of one argument slot on the user stack (i386 calling convention).
pub const WORD_SIZE: usize = 4;

/// Maximum size of a process stack.
pub const STACK_LIMIT: usize = 8 * 1024 * 1024;

/// How far below the stack pointer a fault may land and still count as
/// stack growth. `PUSHA` touches 32 bytes below `esp` before moving it.
pub const STACK_SLACK: usize = 32;

/// First descriptor handed out by `open`; 0 and 1 are the console.
pub const FIRST_FD: i32 = 2;

/// First mapping identifier handed out by `mmap`.
pub const FIRST_MAPID: i32 = 0;

/// Default number of frames in the user pool.
pub const DEFAULT_USER_FRAMES: usize = 256;

/// Runtime sizing of the VM core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Number of physical frames available to user pages.
    pub user_frames: usize,
    /// Upper bound on the stack size of any process.
    pub stack_limit: usize,
    /// Distance below `esp` still treated as a stack access.
    pub stack_slack: usize,
}

impl VmConfig {
    /// Configuration with the default limits.
    pub const fn new() -> Self {
        Self {
            user_frames: DEFAULT_USER_FRAMES,
            stack_limit: STACK_LIMIT,
            stack_slack: STACK_SLACK,
        }
    }

    /// Set the size of the user frame pool.
    pub const fn with_user_frames(mut self, frames: usize) -> Self {
        self.user_frames = frames;
        self
    }

    /// Set the maximum stack size.
    pub const fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stack_limit = limit;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
