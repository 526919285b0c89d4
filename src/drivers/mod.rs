//! Device interfaces consumed by the VM core
//!
//! The core drives two devices it does not own:
//! - the swap partition, a plain block device
//! - the console, for descriptors 0 and 1
//!
//! Implementations are expected to:
//! - Reject out-of-range sector indices with an error
//! - Never panic on a bad request

pub mod block;
pub mod console;

pub use block::{BlockDevice, BlockError, SECTOR_SIZE};
pub use console::{Console, ConsoleWriter};
