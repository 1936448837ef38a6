//! Main memory.
//!
//! 19683 nine-trit cells — one slot for every tryte value — addressed by
//! signed tryte, with address 0 at the midpoint of the array. Because the
//! address space and the cell range coincide, every address is valid and
//! the access contract is total.

use crate::ternary::Tryte;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Number of memory cells (3^9).
pub const MEMORY_SIZE: usize = 19_683;

/// The machine's linear memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Tryte>,
}

impl Memory {
    /// Fresh memory, all cells zero.
    pub fn new() -> Self {
        Self {
            cells: vec![Tryte::ZERO; MEMORY_SIZE],
        }
    }

    fn slot(addr: Tryte) -> usize {
        (addr.value() as i32 + (MEMORY_SIZE as i32 - 1) / 2) as usize
    }

    /// Read the cell at a signed address.
    #[inline]
    pub fn read(&self, addr: Tryte) -> Tryte {
        self.cells[Self::slot(addr)]
    }

    /// Write the cell at a signed address.
    #[inline]
    pub fn write(&mut self, addr: Tryte, value: Tryte) {
        self.cells[Self::slot(addr)] = value;
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Tryte::ZERO;
        }
    }

    /// Copy a cell image into memory starting at `start`, wrapping like
    /// any other address arithmetic.
    pub fn load_image(&mut self, start: Tryte, image: &[Tryte]) {
        let mut addr = start;
        for &cell in image {
            self.write(addr, cell);
            addr += Tryte::from_int(1);
        }
    }

    /// The cells in address order (most negative address first).
    pub fn cells(&self) -> &[Tryte] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Tryte> for Memory {
    type Output = Tryte;

    fn index(&self, addr: Tryte) -> &Tryte {
        &self.cells[Self::slot(addr)]
    }
}

impl IndexMut<Tryte> for Memory {
    fn index_mut(&mut self, addr: Tryte) -> &mut Tryte {
        &mut self.cells[Self::slot(addr)]
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|c| !c.is_zero()).count();
        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let mut mem = Memory::new();
        let addr = Tryte::from_int(42);
        mem.write(addr, Tryte::from_int(1000));
        assert_eq!(mem.read(addr).value(), 1000);
        assert_eq!(mem[addr].value(), 1000);
    }

    #[test]
    fn full_address_range_is_valid() {
        let mut mem = Memory::new();
        for addr in [Tryte::MIN, -1, 0, 1, Tryte::MAX] {
            let addr = Tryte::from_int(addr as i64);
            mem.write(addr, Tryte::from_int(7));
            assert_eq!(mem.read(addr).value(), 7);
        }
    }

    #[test]
    fn load_image_from_zero() {
        let mut mem = Memory::new();
        let image = [Tryte::from_int(1), Tryte::from_int(2), Tryte::from_int(3)];
        mem.load_image(Tryte::ZERO, &image);
        assert_eq!(mem.read(Tryte::ZERO).value(), 1);
        assert_eq!(mem.read(Tryte::from_int(1)).value(), 2);
        assert_eq!(mem.read(Tryte::from_int(2)).value(), 3);
    }

    #[test]
    fn address_arithmetic_wraps() {
        let mut mem = Memory::new();
        let top = Tryte::from_int(Tryte::MAX as i64);
        mem.load_image(top, &[Tryte::from_int(5), Tryte::from_int(6)]);
        assert_eq!(mem.read(top).value(), 5);
        // one past the top wraps to the bottom of the address space
        assert_eq!(mem.read(Tryte::from_int(Tryte::MIN as i64)).value(), 6);
    }
}
