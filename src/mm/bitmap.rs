//! Allocation bitmap
//!
//! One bit per unit (frame or swap slot):
//! - Bit = 0: unit is free
//! - Bit = 1: unit is allocated
//!
//! Double free is detected and causes a panic.

use alloc::vec;
use alloc::vec::Vec;

/// A first-fit bitmap allocator over `len` units.
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// Bitmap tracking allocated units (1 = allocated, 0 = free).
    bits: Vec<u8>,
    /// Units under management.
    len: usize,
    /// Number of free units remaining.
    free_count: usize,
}

impl Bitmap {
    /// Create a bitmap with every unit free.
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(8)],
            len,
            free_count: len,
        }
    }

    /// Set a bit in the bitmap.
    #[inline]
    fn set_bit(&mut self, index: usize, allocated: bool) {
        let byte_idx = index / 8;
        let bit_idx = index % 8;

        if allocated {
            self.bits[byte_idx] |= 1 << bit_idx;
        } else {
            self.bits[byte_idx] &= !(1 << bit_idx);
        }
    }

    /// Check if a unit is allocated. Out of range counts as allocated.
    #[inline]
    pub fn is_allocated(&self, index: usize) -> bool {
        if index >= self.len {
            return true;
        }
        (self.bits[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Allocate the lowest free unit.
    pub fn alloc(&mut self) -> Option<usize> {
        if self.free_count == 0 {
            return None;
        }

        for (byte_idx, byte) in self.bits.iter().enumerate() {
            if *byte == 0xFF {
                continue;
            }
            let index = byte_idx * 8 + byte.trailing_ones() as usize;
            if index >= self.len {
                break;
            }
            self.set_bit(index, true);
            self.free_count -= 1;
            return Some(index);
        }

        None
    }

    /// Free a previously allocated unit.
    ///
    /// # Panics
    /// Panics if the unit is out of range or already free.
    pub fn free(&mut self, index: usize) {
        if index >= self.len {
            panic!("Attempted to free unit {} outside managed range", index);
        }
        if !self.is_allocated(index) {
            panic!("Double free detected for unit {}", index);
        }

        self.set_bit(index, false);
        self.free_count += 1;
    }

    /// Number of free units.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Number of units under management.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the bitmap manages no units.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
