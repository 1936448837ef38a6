//! The machine: memory, registers, decoder, execution engine and FPU.
//!
//! - 19683 nine-trit memory cells, addresses symmetric around zero
//! - 9 wide integer registers, addressable as 27 single-tryte registers
//! - packed flags cell (priorities, overflow, carry, compare)
//! - 27-entry interrupt vector table driving the priority thread model
//! - float coprocessor with 9 registers sharing the execution context

pub mod decode;
pub mod execute;
pub mod fpu;
pub mod memory;
pub mod registers;

pub use decode::{DecodeError, FpuOp, Op};
pub use execute::{Cpu, CpuError, CpuState, MachineState};
pub use fpu::{Fpu, FpuReg};
pub use memory::Memory;
pub use registers::{ExecContext, Flags, RegisterFile, TrintReg, TryteReg};
