//! # Tritium
//!
//! An emulator of a balanced ternary computer: a 19683-cell address space
//! where the machine word, the address and the instruction share one
//! 9-trit cell type, plus a ternary floating point coprocessor.
//!
//! The crate splits into the numeric tower ([`ternary`]), the machine
//! itself ([`cpu`]) and the device collaborators ([`dev`]). An optional
//! `tui` feature adds a full-screen single-step debugger.

pub mod cpu;
pub mod dev;
pub mod ternary;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, CpuState, MachineState, Op};
pub use dev::{Console, Device, DeviceError, FileDisk, MemDisk, Mode};
pub use ternary::{DivideByZero, TFloat, Trint, Trit, Tryte};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
