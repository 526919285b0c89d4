//! Block device interface
//!
//! Fixed-size sectors addressed by index. The swap store is the only user.

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;

/// Error type for block device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// The sector index is past the end of the device.
    OutOfRange,
    /// The device reported a transfer failure.
    Io,
}

impl core::fmt::Display for BlockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "sector out of range"),
            Self::Io => write!(f, "device I/O error"),
        }
    }
}

/// A sector-addressed storage device.
///
/// Implementations synchronize internally; the swap store calls in from
/// whichever thread is evicting or faulting.
pub trait BlockDevice: Send + Sync {
    /// Number of sectors on the device.
    fn sector_count(&self) -> usize;

    /// Read one sector.
    fn read_sector(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), BlockError>;

    /// Write one sector.
    fn write_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) -> Result<(), BlockError>;
}
