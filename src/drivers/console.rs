//! Console interface
//!
//! Descriptor 1 writes here; descriptor 0 reads one byte at a time.

/// The system console.
pub trait Console: Send + Sync {
    /// Write bytes to the console output.
    fn write(&self, bytes: &[u8]);

    /// Block until one byte of input is available and return it.
    fn getc(&self) -> u8;
}

/// Adapter so `core::fmt` output can be sent to a [`Console`].
pub struct ConsoleWriter<'a>(pub &'a dyn Console);

impl core::fmt::Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write(s.as_bytes());
        Ok(())
    }
}
