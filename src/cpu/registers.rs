//! Register file, flags and execution context.
//!
//! The machine has 9 wide (3-tryte) integer registers which are also
//! addressable as 27 single-tryte registers. Rather than aliasing views of
//! the same storage, the file is one flat array of 27 trytes: a single
//! register is an index, a wide register is three consecutive indices
//! (most significant first).
//!
//! Single registers are named by base-27 digit (`M` through `m`); the wide
//! registers carry the letters `a b c d e g h i j` (`f` is reserved as the
//! float opcode prefix).

use crate::ternary::{Trit, Tryte};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a single-tryte register (0..27, named `M`..`m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryteReg(pub usize);

/// Index of a wide three-tryte register (0..9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrintReg(pub usize);

/// Wide register display names, in file order.
const TRINT_NAMES: [char; 9] = ['a', 'b', 'c', 'd', 'e', 'g', 'h', 'i', 'j'];

impl TryteReg {
    /// Register named by a base-27 digit value in [-13, +13].
    pub fn from_digit(digit: i16) -> Self {
        Self((digit + 13) as usize)
    }

    /// The base-27 digit character naming this register.
    pub fn name(&self) -> char {
        crate::ternary::SEPTAVINGT_CHARS[self.0] as char
    }
}

impl TrintReg {
    /// The letter naming this wide register.
    pub fn name(&self) -> char {
        TRINT_NAMES[self.0]
    }
}

/// The flat 27-tryte register file.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterFile {
    cells: [Tryte; 27],
}

impl RegisterFile {
    /// All registers zeroed.
    pub fn new() -> Self {
        Self {
            cells: [Tryte::ZERO; 27],
        }
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        self.cells = [Tryte::ZERO; 27];
    }

    /// Read a single register.
    #[inline]
    pub fn tryte(&self, reg: TryteReg) -> Tryte {
        self.cells[reg.0]
    }

    /// Write a single register.
    #[inline]
    pub fn set_tryte(&mut self, reg: TryteReg, value: Tryte) {
        self.cells[reg.0] = value;
    }

    /// Read a wide register from its three cells, most significant first.
    pub fn trint(&self, reg: TrintReg) -> crate::ternary::Trint<3> {
        let base = reg.0 * 3;
        crate::ternary::Trint::from_trytes([
            self.cells[base],
            self.cells[base + 1],
            self.cells[base + 2],
        ])
    }

    /// Write a wide register back into its three cells.
    pub fn set_trint(&mut self, reg: TrintReg, value: crate::ternary::Trint<3>) {
        let base = reg.0 * 3;
        self.cells[base] = value.tryte(0);
        self.cells[base + 1] = value.tryte(1);
        self.cells[base + 2] = value.tryte(2);
    }

    /// The raw cells (register `M` first).
    pub fn cells(&self) -> &[Tryte; 27] {
        &self.cells
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RegisterFile");
        for i in 0..9 {
            let reg = TrintReg(i);
            s.field(
                &reg.name().to_string(),
                &self.trint(reg).value(),
            );
        }
        s.finish()
    }
}

/// The packed status cell.
///
/// Layout, least significant trit first:
///
/// ```text
/// trit 0       compare     (-1 / 0 / +1)
/// trit 1       carry
/// trit 2       overflow
/// trits 3-5    current thread priority  (-13..+13)
/// trits 6-8    stored interrupt priority
/// ```
///
/// Every accessor touches only its own field.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags(Tryte);

impl Flags {
    /// Boot state: stored priority -13, current priority 0, all three
    /// condition trits clear.
    pub fn boot() -> Self {
        Self(Tryte::from_base27_digits([-13, 0, 0]))
    }

    /// The raw flags cell.
    pub fn as_tryte(&self) -> Tryte {
        self.0
    }

    /// The compare trit.
    pub fn compare(&self) -> Trit {
        self.0.trit(0)
    }

    /// Set the compare trit, leaving every other field alone.
    pub fn set_compare(&mut self, value: Trit) {
        self.0.set_trit(0, value);
    }

    /// The carry trit.
    pub fn carry(&self) -> Trit {
        self.0.trit(1)
    }

    /// Set the carry trit.
    pub fn set_carry(&mut self, value: Trit) {
        self.0.set_trit(1, value);
    }

    /// The overflow trit.
    pub fn overflow(&self) -> Trit {
        self.0.trit(2)
    }

    /// Set the overflow trit.
    pub fn set_overflow(&mut self, value: Trit) {
        self.0.set_trit(2, value);
    }

    /// Priority of the running thread, in [-13, +13].
    pub fn current_priority(&self) -> i16 {
        self.0.base27_digits()[1]
    }

    /// Set the running thread's priority field.
    pub fn set_current_priority(&mut self, priority: i16) {
        let digit = Tryte::from_int(priority as i64);
        for i in 0..3 {
            self.0.set_trit(3 + i, digit.trit(i));
        }
    }

    /// Stored interrupt priority, in [-13, +13].
    pub fn stored_priority(&self) -> i16 {
        self.0.base27_digits()[0]
    }

    /// Set the stored interrupt priority field.
    pub fn set_stored_priority(&mut self, priority: i16) {
        let digit = Tryte::from_int(priority as i64);
        for i in 0..3 {
            self.0.set_trit(6 + i, digit.trit(i));
        }
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::boot()
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Flags(stored={} current={} ovf={} carry={} cmp={})",
            self.stored_priority(),
            self.current_priority(),
            self.overflow(),
            self.carry(),
            self.compare()
        )
    }
}

/// Flags, instruction pointer, stack pointer and clock: the state shared
/// between the CPU and the FPU. Exactly one unit holds it mutably at a
/// time — the CPU lends it to the FPU for the duration of a float
/// instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecContext {
    /// Packed status cell.
    pub flags: Flags,
    /// Instruction pointer.
    pub iptr: Tryte,
    /// Stack pointer; the stack grows upward from the bottom of memory.
    pub sptr: Tryte,
    /// Monotonic instruction/tick counter.
    pub clock: u64,
}

impl ExecContext {
    /// Boot-time context: execution starts at address 0, the stack at the
    /// bottom of the address space.
    pub fn new() -> Self {
        Self {
            flags: Flags::boot(),
            iptr: Tryte::ZERO,
            sptr: Tryte::from_int(Tryte::MIN as i64),
            clock: 0,
        }
    }

    /// Advance the instruction pointer by a cell count.
    pub fn advance(&mut self, cells: i64) {
        self.iptr += Tryte::from_int(cells);
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}
