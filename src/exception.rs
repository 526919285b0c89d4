//! Page-fault handling
//!
//! Entry point for faults raised by user-mode memory accesses. The
//! embedding kernel's trap code decodes the hardware state into a
//! [`PageFault`] and calls [`handle_page_fault`]; the return value says
//! whether to restart the faulting instruction or schedule away from a
//! dead process.
//!
//! # Fault classes
//! - Not present, valid page: load it (including stack growth) and retry
//! - Write to a present read-only page: protection violation, terminate
//! - Null, kernel or unbacked address: terminate
//!
//! A process terminated here exits with status -1.

use crate::kernel::Kernel;
use crate::mm::{FaultCode, VirtAddr, VmError};
use crate::process::Process;

/// A decoded user page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// Faulting address.
    pub addr: VirtAddr,
    /// User stack pointer at the time of the fault.
    pub esp: VirtAddr,
    /// Hardware error code.
    pub code: FaultCode,
}

impl PageFault {
    /// Decode a raw fault: faulting address (CR2), saved `esp` and the
    /// error code pushed by the CPU. Unknown code bits are ignored.
    pub fn from_raw(addr: usize, esp: usize, error_code: u32) -> Self {
        Self {
            addr: VirtAddr::new(addr),
            esp: VirtAddr::new(esp),
            code: FaultCode::from_bits_truncate(error_code),
        }
    }

    pub fn is_write(&self) -> bool {
        self.code.contains(FaultCode::WRITE)
    }

    /// A protection fault on a page that is mapped.
    pub fn is_protection(&self) -> bool {
        self.code.contains(FaultCode::PRESENT)
    }
}

/// What the trap code should do after a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The page is resident; restart the instruction.
    Resolved,
    /// The process has been terminated.
    Terminated,
}

/// Handle a page fault raised by `process`.
pub fn handle_page_fault(kernel: &Kernel, process: &mut Process, fault: PageFault) -> FaultOutcome {
    let result = if fault.is_protection() {
        Err(VmError::NotWritable)
    } else {
        process
            .space
            .fault_in(kernel, fault.addr, fault.esp, fault.is_write())
    };

    match result {
        Ok(()) => FaultOutcome::Resolved,
        Err(e) => {
            log::warn!(
                "fault: pid {} at {} ({:?}): {}",
                process.pid(),
                fault.addr,
                fault.code,
                e
            );
            process.exit(kernel, -1);
            FaultOutcome::Terminated
        }
    }
}
