//! TUI debugger.
//!
//! An interactive full-screen debugger over a booted machine:
//! - integer and float register panes
//! - flags, pointers and clock
//! - disassembly from the instruction pointer
//! - raw memory window with scrolling
//! - step/run/breakpoint controls

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
