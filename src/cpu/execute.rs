//! CPU execution engine.
//!
//! The engine owns memory, the register file, the interrupt vector table,
//! the mounted devices and the console, and drives fetch-decode-execute.
//! Float opcodes are forwarded whole to the [`Fpu`], which borrows the
//! execution context for the duration of the instruction.
//!
//! Error discipline, from mildest to worst:
//! - divide by zero sets the overflow flag and execution continues;
//! - an invalid opcode (CPU or FPU) or display mode halts the machine,
//!   leaving all state inspectable;
//! - a missing or broken device is a [`CpuError`] that propagates out of
//!   [`Cpu::step`] — the emulator cannot continue without its disks.

use crate::cpu::decode::{self, Op};
use crate::cpu::fpu::Fpu;
use crate::cpu::memory::Memory;
use crate::cpu::registers::{ExecContext, Flags, RegisterFile, TrintReg, TryteReg};
use crate::dev::{Console, Device, DeviceError, Mode};
use crate::ternary::{TFloat, Trint, Trit, Tryte};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Powered but not booted.
    Off,
    /// Executing the fetch-decode-execute loop.
    Running,
    /// Stopped by HALT, an invalid opcode, an FPU error or a bad display
    /// mode. Terminal.
    Halted,
}

/// Errors that escape the machine entirely.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("cpu is not running ({0:?})")]
    NotRunning(CpuState),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// The balanced ternary machine.
pub struct Cpu {
    /// Integer register file (27 cells / 9 wide views).
    pub regs: RegisterFile,
    /// Flags, instruction pointer, stack pointer, clock.
    pub ctx: ExecContext,
    /// Float coprocessor.
    pub fpu: Fpu,
    /// Main memory.
    pub mem: Memory,
    /// Interrupt vector table; entry 0 is the reset vector.
    pub vectors: [Tryte; 27],
    /// Current state.
    pub state: CpuState,
    devices: Vec<Box<dyn Device>>,
    mounted: usize,
    console: Console,
    last_op: Option<Op>,
}

/// A serialisable snapshot of machine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    pub state: CpuState,
    pub clock: u64,
    pub iptr: Tryte,
    pub sptr: Tryte,
    pub flags: Flags,
    pub registers: RegisterFile,
    pub float_registers: [TFloat; 9],
    pub vectors: [Tryte; 27],
    pub mounted_device: usize,
    pub memory: Memory,
}

impl Cpu {
    /// Build a machine over a set of devices (device 0 boots it) and a
    /// console.
    pub fn new(devices: Vec<Box<dyn Device>>, console: Console) -> Self {
        Self {
            regs: RegisterFile::new(),
            ctx: ExecContext::new(),
            fpu: Fpu::new(),
            mem: Memory::new(),
            vectors: [Tryte::ZERO; 27],
            state: CpuState::Off,
            devices,
            mounted: 0,
            console,
            last_op: None,
        }
    }

    /// Return the machine to its power-on state. Devices stay attached.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.ctx = ExecContext::new();
        self.fpu.reset();
        self.mem.clear();
        self.vectors = [Tryte::ZERO; 27];
        self.state = CpuState::Off;
        self.mounted = 0;
        self.last_op = None;
    }

    /// Load the whole of device 0 into memory from address 0 upward and
    /// start running.
    pub fn boot(&mut self) -> Result<(), CpuError> {
        let device = self
            .devices
            .get_mut(0)
            .ok_or(DeviceError::NoSuchDevice(0))?;
        let len = device.len()?;
        let image = device.read(0, len)?;
        self.mem.load_image(Tryte::ZERO, &image);
        self.state = CpuState::Running;
        Ok(())
    }

    /// One fetch-decode-execute cycle.
    pub fn step(&mut self) -> Result<(), CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let cell = self.mem[self.ctx.iptr];
        match decode::decode(cell) {
            Ok(op) => {
                self.execute(op)?;
                self.last_op = Some(op);
            }
            Err(_) => self.halt(),
        }
        self.ctx.clock += 1;
        Ok(())
    }

    /// Run until the machine stops. Returns the cycles executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start = self.ctx.clock;
        while self.state == CpuState::Running {
            self.step()?;
        }
        Ok(self.ctx.clock - start)
    }

    /// Run at most `max_cycles` cycles.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start = self.ctx.clock;
        while self.state == CpuState::Running && self.ctx.clock - start < max_cycles {
            self.step()?;
        }
        Ok(self.ctx.clock - start)
    }

    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// The most recently executed instruction.
    pub fn last_op(&self) -> Option<Op> {
        self.last_op
    }

    /// The console, for rewiring or inspection.
    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Index of the mounted device.
    pub fn mounted_device(&self) -> usize {
        self.mounted
    }

    /// Serialisable copy of the machine state.
    pub fn snapshot(&self) -> MachineState {
        MachineState {
            state: self.state,
            clock: self.ctx.clock,
            iptr: self.ctx.iptr,
            sptr: self.ctx.sptr,
            flags: self.ctx.flags,
            registers: self.regs.clone(),
            float_registers: *self.fpu.regs(),
            vectors: self.vectors,
            mounted_device: self.mounted,
            memory: self.mem.clone(),
        }
    }

    /// Human-readable state dump for the debugger.
    pub fn dump(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let next = self.mem[self.ctx.iptr];
        let _ = writeln!(
            out,
            "next instruction: {} ({})",
            next,
            decode::decode(next)
                .map(|op| op.to_string())
                .unwrap_or_else(|_| "??".into())
        );
        let _ = writeln!(out, "integer registers:");
        for row in 0..3 {
            let mut line = String::new();
            for col in 0..3 {
                let reg = TrintReg(row * 3 + col);
                let _ = write!(line, "  {} = {:<12}", reg.name(), self.regs.trint(reg).value());
            }
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(out, "float registers:");
        for row in 0..3 {
            let mut line = String::new();
            for col in 0..3 {
                let i = row * 3 + col;
                let _ = write!(line, "  f{} = {:<12}", i + 1, self.fpu.regs()[i].to_f64());
            }
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(
            out,
            "iptr = {}  sptr = {}  clock = {}",
            self.ctx.iptr, self.ctx.sptr, self.ctx.clock
        );
        let _ = writeln!(out, "flags: {:?}", self.ctx.flags);
        out
    }

    // ---- fetch helpers -------------------------------------------------

    /// Operand cell `k` positions after the instruction pointer.
    fn operand(&self, k: i64) -> Tryte {
        self.mem[self.ctx.iptr + Tryte::from_int(k)]
    }

    /// Three operand cells starting `k` after the instruction pointer.
    fn operand_trint(&self, k: i64) -> Trint<3> {
        Trint::from_trytes([self.operand(k), self.operand(k + 1), self.operand(k + 2)])
    }

    /// Three memory cells starting at `addr`, most significant first.
    fn read_wide(&self, addr: Tryte) -> Trint<3> {
        Trint::from_trytes([
            self.mem[addr],
            self.mem[addr + Tryte::from_int(1)],
            self.mem[addr + Tryte::from_int(2)],
        ])
    }

    /// Write a wide value to three memory cells starting at `addr`.
    fn write_wide(&mut self, addr: Tryte, value: Trint<3>) {
        for i in 0..3 {
            self.mem[addr + Tryte::from_int(i)] = value.tryte(i as usize);
        }
    }

    /// Stop the machine. Mirrors the halt opcode: the pointer still moves
    /// past the offending cell, so a dump shows what came next.
    fn halt(&mut self) {
        self.state = CpuState::Halted;
        self.ctx.advance(1);
    }

    /// Jump to an interrupt vector.
    fn switch_thread(&mut self, vector: usize) {
        self.ctx.iptr = self.vectors[vector];
    }

    /// Set the display mode or halt on an unknown one.
    fn set_mode_digit(&mut self, digit: i16, width: i64) {
        match Mode::from_index((digit + 13) as usize) {
            Some(mode) => {
                self.console.set_mode(mode);
                self.ctx.advance(width);
            }
            None => self.halt(),
        }
    }

    // ---- execute -------------------------------------------------------

    fn execute(&mut self, op: Op) -> Result<(), CpuError> {
        match op {
            // ---- control ----
            Op::Halt => self.halt(),
            Op::Noop => self.ctx.advance(1),
            Op::Wait => {
                // busy-poll: the clock ticks, the pointer stays put until
                // the stored priority wins the comparison
                let stored = self.ctx.flags.stored_priority();
                let current = self.ctx.flags.current_priority();
                if stored > current {
                    self.switch_thread((stored + 13) as usize);
                }
            }
            Op::ClearCompare => {
                self.ctx.flags.set_compare(Trit::O);
                self.ctx.advance(1);
            }
            Op::ClearCarry => {
                self.ctx.flags.set_carry(Trit::O);
                self.ctx.advance(1);
            }
            Op::ClearOverflow => {
                self.ctx.flags.set_overflow(Trit::O);
                self.ctx.advance(1);
            }
            Op::CheckPriority => {
                let stored = self.ctx.flags.stored_priority();
                let current = self.ctx.flags.current_priority();
                if stored > current {
                    self.switch_thread((stored + 13) as usize);
                } else {
                    self.ctx.advance(1);
                }
            }
            Op::SetPriority { priority } => {
                self.ctx.flags.set_current_priority(priority);
                self.ctx.advance(1);
            }
            Op::ThreadSwitch { vector } => self.switch_thread(vector),
            Op::SetVector { vector } => {
                self.vectors[vector] = self.operand(1);
                self.ctx.advance(2);
            }
            Op::Jump => self.ctx.iptr = self.operand(1),
            Op::JumpIfZero => {
                if self.ctx.flags.compare() == Trit::O {
                    self.ctx.iptr = self.operand(1);
                } else {
                    self.ctx.advance(2);
                }
            }
            Op::JumpIfNeg => {
                if self.ctx.flags.compare() == Trit::N {
                    self.ctx.iptr = self.operand(1);
                } else {
                    self.ctx.advance(2);
                }
            }
            Op::JumpIfPos => {
                if self.ctx.flags.compare() == Trit::P {
                    self.ctx.iptr = self.operand(1);
                } else {
                    self.ctx.advance(2);
                }
            }
            Op::JumpStore => {
                let target = self.operand(1);
                self.mem[self.ctx.sptr] = self.ctx.iptr;
                self.ctx.sptr += Tryte::from_int(1);
                self.ctx.iptr = target;
            }
            Op::PopJump => {
                let popped = self.mem[self.ctx.sptr - Tryte::from_int(1)];
                self.ctx.sptr -= Tryte::from_int(1);
                // indirect: the popped cell names the cell holding the target
                self.ctx.iptr = self.mem[popped];
            }
            Op::Mount { device } => {
                if device < self.devices.len() {
                    self.mounted = device;
                    self.ctx.advance(1);
                } else {
                    return Err(DeviceError::NoSuchDevice(device).into());
                }
            }

            // ---- memory / device i/o ----
            Op::ReadTryte(y) => {
                let addr = self.operand(1);
                self.regs.set_tryte(y, self.mem[addr]);
                self.ctx.advance(2);
            }
            Op::ReadTrint(y) => {
                let addr = self.operand(1);
                let value = self.read_wide(addr);
                self.regs.set_trint(y, value);
                self.ctx.advance(2);
            }
            Op::WriteTryte(x) => {
                let addr = self.operand(1);
                self.mem[addr] = self.regs.tryte(x);
                self.ctx.advance(2);
            }
            Op::WriteTrint(x) => {
                let addr = self.operand(1);
                let value = self.regs.trint(x);
                self.write_wide(addr, value);
                self.ctx.advance(2);
            }
            Op::Fill => {
                let addr = self.operand(1);
                let count = self.operand(2).value() as i64 + 9841;
                let value = self.operand(3);
                let mut cursor = addr;
                for _ in 0..count {
                    self.mem[cursor] = value;
                    cursor += Tryte::from_int(1);
                }
                self.ctx.advance(4);
            }
            Op::Load => {
                let offset = self.operand(1).value() as i64 + 9841;
                let count = self.operand(2).value() as i64;
                let dest = self.operand(3);
                if count > 0 {
                    let device = &mut self.devices[self.mounted];
                    let cells = device.read(offset as usize, count as usize)?;
                    self.mem.load_image(dest, &cells);
                }
                self.ctx.advance(4);
            }
            Op::Save => {
                let src = self.operand(1);
                let count = self.operand(2).value() as i64;
                let offset = self.operand(3).value() as i64 + 9841;
                if count > 0 {
                    let mut cells = Vec::with_capacity(count as usize);
                    let mut cursor = src;
                    for _ in 0..count {
                        cells.push(self.mem[cursor]);
                        cursor += Tryte::from_int(1);
                    }
                    self.devices[self.mounted].write(offset as usize, &cells)?;
                }
                self.ctx.advance(4);
            }

            // ---- stack ----
            Op::Where(x) => {
                self.regs.set_tryte(x, self.ctx.sptr);
                self.ctx.advance(1);
            }
            Op::PushTryte(x) => {
                self.mem[self.ctx.sptr] = self.regs.tryte(x);
                self.ctx.sptr += Tryte::from_int(1);
                self.ctx.advance(1);
            }
            Op::PushTrint(x) => {
                let value = self.regs.trint(x);
                self.write_wide(self.ctx.sptr, value);
                self.ctx.sptr += Tryte::from_int(3);
                self.ctx.advance(1);
            }
            Op::PopTryte(x) => {
                let value = self.mem[self.ctx.sptr - Tryte::from_int(1)];
                self.regs.set_tryte(x, value);
                self.ctx.sptr -= Tryte::from_int(1);
                self.ctx.advance(1);
            }
            Op::PopTrint(x) => {
                let value = self.read_wide(self.ctx.sptr - Tryte::from_int(3));
                self.regs.set_trint(x, value);
                self.ctx.sptr -= Tryte::from_int(3);
                self.ctx.advance(1);
            }
            Op::PeekTryte(x) => {
                let value = self.mem[self.ctx.sptr - Tryte::from_int(1)];
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::PeekTrint(x) => {
                let value = self.read_wide(self.ctx.sptr - Tryte::from_int(3));
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }

            // ---- console ----
            Op::Print => {
                let count = self.operand(1).value() as i64 + 9841;
                let addr = self.operand(2);
                let mut cursor = addr;
                for _ in 0..count {
                    let cell = self.mem[cursor];
                    self.console.write_tryte(&cell);
                    cursor += Tryte::from_int(1);
                }
                self.ctx.advance(3);
            }
            Op::SetModeTryte(x) => {
                let digit = self.regs.tryte(x).base27_digits()[2];
                self.set_mode_digit(digit, 1);
            }
            Op::SetModeTrint(x) => {
                let digit = self.regs.trint(x).tryte(2).base27_digits()[2];
                self.set_mode_digit(digit, 1);
            }
            Op::SetModeImm { mode_digit } => self.set_mode_digit(mode_digit, 1),
            Op::GetModeTryte(x) => {
                let digit = self.console.mode().index() as i64 - 13;
                self.regs.set_tryte(x, Tryte::from_int(digit));
                self.ctx.advance(1);
            }
            Op::GetModeTrint(x) => {
                let digit = self.console.mode().index() as i64 - 13;
                self.regs.set_trint(x, Trint::from_int(digit));
                self.ctx.advance(1);
            }
            Op::ShowTryte(x) => {
                let value = self.regs.tryte(x);
                self.console.write_tryte(&value);
                self.ctx.advance(1);
            }
            Op::ShowTrint(x) => {
                let value = self.regs.trint(x);
                self.console.write_trint(&value);
                self.ctx.advance(1);
            }
            Op::TellTryte(x) => {
                let (c0, c1) = self.console.read_code();
                self.regs
                    .set_tryte(x, Tryte::from_int(128 * c0 as i64 + c1 as i64 - 9841));
                self.ctx.advance(1);
            }
            Op::TellTrint(x) => {
                let mut value = Trint::<3>::ZERO;
                for i in 0..3 {
                    let (c0, c1) = self.console.read_code();
                    value.set_tryte(i, Tryte::from_int(128 * c0 as i64 + c1 as i64 - 9841));
                }
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }

            // ---- tryte register-register ----
            Op::AddTrytes(x, y) => {
                let (carry, result) =
                    Tryte::add_with_carry(&self.regs.tryte(x), &self.regs.tryte(y), &Tryte::ZERO);
                self.regs.set_tryte(x, result);
                // the second operand register receives the carry
                self.regs.set_tryte(y, carry);
                self.ctx.flags.set_carry(carry.sign());
                self.ctx.advance(1);
            }
            Op::MulTrytes(x, y) => {
                let (carry, result) = Tryte::mul_with_carry(&self.regs.tryte(x), &self.regs.tryte(y));
                self.regs.set_tryte(x, result);
                self.regs.set_tryte(y, carry);
                self.ctx.flags.set_carry(carry.sign());
                self.ctx.advance(1);
            }
            Op::DivTrytes(x, y) => {
                match Tryte::div(&self.regs.tryte(x), &self.regs.tryte(y)) {
                    Ok((quotient, remainder)) => {
                        self.regs.set_tryte(x, quotient);
                        self.regs.set_tryte(y, remainder);
                    }
                    Err(_) => self.ctx.flags.set_overflow(Trit::P),
                }
                self.ctx.advance(1);
            }
            Op::SetTryte(x, y) => {
                let value = self.regs.tryte(y);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::SwapTrytes(x, y) => {
                let (a, b) = (self.regs.tryte(x), self.regs.tryte(y));
                self.regs.set_tryte(x, b);
                self.regs.set_tryte(y, a);
                self.ctx.advance(1);
            }
            Op::CmpTrytes(x, y) => {
                let flag = compare_trit(self.regs.tryte(x).cmp(&self.regs.tryte(y)));
                self.ctx.flags.set_compare(flag);
                self.ctx.advance(1);
            }
            Op::AndTrytes(x, y) => {
                let value = self.regs.tryte(x) & self.regs.tryte(y);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::OrTrytes(x, y) => {
                let value = self.regs.tryte(x) | self.regs.tryte(y);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::XorTrytes(x, y) => {
                let value = self.regs.tryte(x) ^ self.regs.tryte(y);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }

            // ---- trint register-register ----
            Op::SetTrints(x, y) => {
                let value = self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::SwapTrints(x, y) => {
                let (a, b) = (self.regs.trint(x), self.regs.trint(y));
                self.regs.set_trint(x, b);
                self.regs.set_trint(y, a);
                self.ctx.advance(1);
            }
            Op::CmpTrints(x, y) => {
                let flag = compare_trit(self.regs.trint(x).cmp(&self.regs.trint(y)));
                self.ctx.flags.set_compare(flag);
                self.ctx.advance(1);
            }
            Op::AddTrints(x, y) => {
                let value = self.regs.trint(x) + self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::MulTrints(x, y) => {
                let value = self.regs.trint(x) * self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::DivTrints(x, y) => {
                match Trint::div(&self.regs.trint(x), &self.regs.trint(y)) {
                    Ok((quotient, remainder)) => {
                        self.regs.set_trint(x, quotient);
                        self.regs.set_trint(y, remainder);
                    }
                    Err(_) => self.ctx.flags.set_overflow(Trit::P),
                }
                self.ctx.advance(1);
            }
            Op::AndTrints(x, y) => {
                let value = self.regs.trint(x) & self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::OrTrints(x, y) => {
                let value = self.regs.trint(x) | self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::XorTrints(x, y) => {
                let value = self.regs.trint(x) ^ self.regs.trint(y);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }

            // ---- trint with immediate / single register ----
            Op::SetTrintImm(x) => {
                let imm = self.operand_trint(1);
                self.regs.set_trint(x, imm);
                self.ctx.advance(4);
            }
            Op::AddTrintImm(x) => {
                let imm = self.operand_trint(1);
                let value = self.regs.trint(x) + imm;
                self.regs.set_trint(x, value);
                self.ctx.advance(4);
            }
            Op::MulTrintImm(x) => {
                let imm = self.operand_trint(1);
                let value = self.regs.trint(x) * imm;
                self.regs.set_trint(x, value);
                self.ctx.advance(4);
            }
            Op::DivTrintImm(x) => {
                let imm = self.operand_trint(1);
                match Trint::div(&self.regs.trint(x), &imm) {
                    Ok((quotient, _remainder)) => self.regs.set_trint(x, quotient),
                    Err(_) => self.ctx.flags.set_overflow(Trit::P),
                }
                self.ctx.advance(4);
            }
            Op::CmpTrintImm(x) => {
                let imm = self.operand_trint(1);
                let flag = compare_trit(self.regs.trint(x).cmp(&imm));
                self.ctx.flags.set_compare(flag);
                self.ctx.advance(4);
            }
            Op::AndTrintImm(x) => {
                let imm = self.operand_trint(1);
                let value = self.regs.trint(x) & imm;
                self.regs.set_trint(x, value);
                self.ctx.advance(4);
            }
            Op::OrTrintImm(x) => {
                let imm = self.operand_trint(1);
                let value = self.regs.trint(x) | imm;
                self.regs.set_trint(x, value);
                self.ctx.advance(4);
            }
            Op::XorTrintImm(x) => {
                let imm = self.operand_trint(1);
                let value = self.regs.trint(x) ^ imm;
                self.regs.set_trint(x, value);
                self.ctx.advance(4);
            }
            Op::IncTrint(x) => {
                let value = self.regs.trint(x) + Trint::from_int(1);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::DecTrint(x) => {
                let value = self.regs.trint(x) - Trint::from_int(1);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::AbsTrint(x) => {
                let value = self.regs.trint(x).abs();
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::NotTrint(x) => {
                let value = !self.regs.trint(x);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::FlipTrint(x) => {
                let value = -self.regs.trint(x);
                self.regs.set_trint(x, value);
                self.ctx.advance(1);
            }
            Op::ShlTrint(x) => {
                let count = shift_count(self.operand(1));
                let value = self.regs.trint(x) << count;
                self.regs.set_trint(x, value);
                self.ctx.advance(2);
            }
            Op::ShrTrint(x) => {
                let count = shift_count(self.operand(1));
                let value = self.regs.trint(x) >> count;
                self.regs.set_trint(x, value);
                self.ctx.advance(2);
            }

            // ---- tryte with immediate / single register ----
            Op::SetTryteImm(x) => {
                let imm = self.operand(1);
                self.regs.set_tryte(x, imm);
                self.ctx.advance(2);
            }
            Op::AddTryteImm(x) => {
                let imm = self.operand(1);
                let (_, result) = Tryte::add_with_carry(&self.regs.tryte(x), &imm, &Tryte::ZERO);
                self.regs.set_tryte(x, result);
                self.ctx.advance(2);
            }
            Op::MulTryteImm(x) => {
                let imm = self.operand(1);
                let (_, result) = Tryte::mul_with_carry(&self.regs.tryte(x), &imm);
                self.regs.set_tryte(x, result);
                self.ctx.advance(2);
            }
            Op::DivTryteImm(x) => {
                let imm = self.operand(1);
                match Tryte::div(&self.regs.tryte(x), &imm) {
                    Ok((quotient, _remainder)) => self.regs.set_tryte(x, quotient),
                    Err(_) => self.ctx.flags.set_overflow(Trit::P),
                }
                self.ctx.advance(2);
            }
            Op::CmpTryteImm(x) => {
                let imm = self.operand(1);
                let flag = compare_trit(self.regs.tryte(x).cmp(&imm));
                self.ctx.flags.set_compare(flag);
                self.ctx.advance(2);
            }
            Op::AndTryteImm(x) => {
                let imm = self.operand(1);
                let value = self.regs.tryte(x) & imm;
                self.regs.set_tryte(x, value);
                self.ctx.advance(2);
            }
            Op::OrTryteImm(x) => {
                let imm = self.operand(1);
                let value = self.regs.tryte(x) | imm;
                self.regs.set_tryte(x, value);
                self.ctx.advance(2);
            }
            Op::XorTryteImm(x) => {
                let imm = self.operand(1);
                let value = self.regs.tryte(x) ^ imm;
                self.regs.set_tryte(x, value);
                self.ctx.advance(2);
            }
            Op::IncTryte(x) => {
                let value = self.regs.tryte(x) + Tryte::from_int(1);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::DecTryte(x) => {
                let value = self.regs.tryte(x) - Tryte::from_int(1);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::AbsTryte(x) => {
                let value = self.regs.tryte(x).abs();
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::NotTryte(x) => {
                let value = !self.regs.tryte(x);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::FlipTryte(x) => {
                let value = -self.regs.tryte(x);
                self.regs.set_tryte(x, value);
                self.ctx.advance(1);
            }
            Op::ShlTryte(x) => {
                let count = shift_count(self.operand(1));
                let value = self.regs.tryte(x) << count;
                self.regs.set_tryte(x, value);
                self.ctx.advance(2);
            }
            Op::ShrTryte(x) => {
                let count = shift_count(self.operand(1));
                let value = self.regs.tryte(x) >> count;
                self.regs.set_tryte(x, value);
                self.ctx.advance(2);
            }

            // ---- float dispatch ----
            Op::Float { raw } => {
                self.fpu
                    .execute(raw, &mut self.ctx, &mut self.mem, &mut self.console);
                if self.fpu.error() {
                    self.halt();
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("clock", &self.ctx.clock)
            .field("iptr", &self.ctx.iptr)
            .field("sptr", &self.ctx.sptr)
            .field("flags", &self.ctx.flags)
            .finish()
    }
}

/// Compare flag trit from an ordering.
fn compare_trit(order: std::cmp::Ordering) -> Trit {
    match order {
        std::cmp::Ordering::Less => Trit::N,
        std::cmp::Ordering::Equal => Trit::O,
        std::cmp::Ordering::Greater => Trit::P,
    }
}

/// Shift count from an immediate cell; negative counts shift by nothing.
fn shift_count(cell: Tryte) -> usize {
    cell.value().max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, encode_float, FpuOp};
    use crate::cpu::fpu::FpuReg;
    use crate::dev::{CaptureBuffer, MemDisk};
    use std::io::Cursor;

    const M: TryteReg = TryteReg(0);
    const L: TryteReg = TryteReg(1);
    const K: TryteReg = TryteReg(2);

    fn capture_console(input: &[u8]) -> (Console, CaptureBuffer) {
        let buf = CaptureBuffer::new();
        let console = Console::with_io(
            Box::new(Cursor::new(input.to_vec())),
            Box::new(buf.clone()),
        );
        (console, buf)
    }

    fn boot(program: Vec<Tryte>) -> Cpu {
        let (console, _) = capture_console(b"");
        let mut cpu = Cpu::new(vec![Box::new(MemDisk::from_cells(program))], console);
        cpu.boot().unwrap();
        cpu
    }

    fn imm(v: i64) -> Tryte {
        Tryte::from_int(v)
    }

    #[test]
    fn machine_starts_off() {
        let (console, _) = capture_console(b"");
        let mut cpu = Cpu::new(vec![Box::new(MemDisk::new())], console);
        assert_eq!(cpu.state, CpuState::Off);
        assert!(matches!(cpu.step(), Err(CpuError::NotRunning(CpuState::Off))));
        cpu.boot().unwrap();
        assert!(cpu.is_running());
    }

    #[test]
    fn halt_after_exactly_one_cycle() {
        let mut cpu = boot(vec![encode(&Op::Halt)]);
        let cycles = cpu.run().unwrap();
        assert_eq!(cycles, 1);
        assert!(cpu.is_halted());
        // terminal: stepping a halted machine is an error
        assert!(matches!(
            cpu.step(),
            Err(CpuError::NotRunning(CpuState::Halted))
        ));
    }

    #[test]
    fn set_and_add_with_carry_flag() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(9841),
            encode(&Op::SetTryteImm(L)),
            imm(9841),
            encode(&Op::AddTrytes(M, L)),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();

        // 9841 + 9841 = 19683 - 2: result wraps, carry lands in L
        assert_eq!(cpu.regs.tryte(M).value(), -2);
        assert_eq!(cpu.regs.tryte(L).value(), 1);
        assert_eq!(cpu.ctx.flags.carry(), Trit::P);
        // the compare flag is untouched
        assert_eq!(cpu.ctx.flags.compare(), Trit::O);
    }

    #[test]
    fn negative_overflow_sets_negative_carry() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(-9841),
            encode(&Op::SetTryteImm(L)),
            imm(-9841),
            encode(&Op::AddTrytes(M, L)),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.tryte(L).value(), -1);
        assert_eq!(cpu.ctx.flags.carry(), Trit::N);
    }

    #[test]
    fn divide_by_zero_flags_and_continues() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(100),
            encode(&Op::DivTrytes(M, L)), // L is zero
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();

        assert!(cpu.is_halted());
        assert_eq!(cpu.ctx.flags.overflow(), Trit::P);
        // registers untouched by the failed divide
        assert_eq!(cpu.regs.tryte(M).value(), 100);
        assert_eq!(cpu.regs.tryte(L).value(), 0);
    }

    #[test]
    fn compare_and_conditional_jump() {
        // CMP 5 vs 7 sets N; JPN jumps over the trap
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),  // 0
            imm(5),                       // 1
            encode(&Op::CmpTryteImm(M)),  // 2
            imm(7),                       // 3
            encode(&Op::JumpIfNeg),       // 4
            imm(7),                       // 5 -> jump to HALT at 7
            imm(0),                       // 6 trap: invalid would halt anyway
            encode(&Op::Halt),            // 7
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.ctx.flags.compare(), Trit::N);
        assert_eq!(cpu.ctx.iptr.value(), 8);
    }

    #[test]
    fn stack_push_pop_where() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(42),
            encode(&Op::PushTryte(M)),
            encode(&Op::Where(K)),
            encode(&Op::PopTryte(L)),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.tryte(L).value(), 42);
        // WHERE saw the pointer after one push
        assert_eq!(cpu.regs.tryte(K).value(), Tryte::MIN + 1);
        assert_eq!(cpu.ctx.sptr.value(), Tryte::MIN);
    }

    #[test]
    fn wide_arithmetic() {
        let a = TrintReg(0);
        let b = TrintReg(1);
        let big = Trint::<3>::from_int(1_000_000);
        let mut program = vec![encode(&Op::SetTrintImm(a))];
        program.extend((0..3).map(|i| big.tryte(i)));
        program.push(encode(&Op::SetTrintImm(b)));
        program.extend((0..3).map(|i| Trint::<3>::from_int(2500).tryte(i)));
        program.push(encode(&Op::MulTrints(TrintReg(0), TrintReg(1))));
        program.push(encode(&Op::Halt));

        let mut cpu = boot(program);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.trint(a).value(), 2_500_000_000);
        assert_eq!(cpu.regs.trint(b).value(), 2500);
    }

    #[test]
    fn wide_divide_leaves_quotient_and_remainder() {
        let a = TrintReg(0);
        let b = TrintReg(1);
        let mut program = vec![encode(&Op::SetTrintImm(a))];
        program.extend((0..3).map(|i| Trint::<3>::from_int(1_000_001).tryte(i)));
        program.push(encode(&Op::SetTrintImm(b)));
        program.extend((0..3).map(|i| Trint::<3>::from_int(1000).tryte(i)));
        program.push(encode(&Op::DivTrints(a, b)));
        program.push(encode(&Op::Halt));

        let mut cpu = boot(program);
        cpu.run().unwrap();
        let q = cpu.regs.trint(a).value();
        let r = cpu.regs.trint(b).value();
        assert_eq!(q * 1000 + r, 1_000_001);
    }

    #[test]
    fn memory_read_write_ops() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(77),
            encode(&Op::WriteTryte(M)),
            imm(5000),
            encode(&Op::ReadTryte(L)),
            imm(5000),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.mem[Tryte::from_int(5000)].value(), 77);
        assert_eq!(cpu.regs.tryte(L).value(), 77);
    }

    #[test]
    fn swap_and_helpers() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(5),
            encode(&Op::SetTryteImm(L)),
            imm(-9),
            encode(&Op::SwapTrytes(M, L)),
            encode(&Op::IncTryte(M)),
            encode(&Op::AbsTryte(M)),
            encode(&Op::FlipTryte(L)),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        // M took -9, incremented to -8, abs to 8; L took 5, flipped to -5
        assert_eq!(cpu.regs.tryte(M).value(), 8);
        assert_eq!(cpu.regs.tryte(L).value(), -5);
    }

    #[test]
    fn priority_switch_via_chk() {
        // stored priority 7 names vector 20; CHK switches because the
        // stored priority beats the current one
        let mut cpu = boot(vec![
            encode(&Op::SetVector { vector: 20 }), // 0
            imm(5),                                // 1: vector target
            encode(&Op::SetPriority { priority: -13 }), // 2
            encode(&Op::CheckPriority),            // 3: switches to cell 5
            imm(0),                                // 4: never reached
            encode(&Op::Halt),                     // 5
        ]);
        cpu.ctx.flags.set_stored_priority(7);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert_eq!(cpu.ctx.iptr.value(), 6);
        // CHK leaves the priority fields themselves alone
        assert_eq!(cpu.ctx.flags.stored_priority(), 7);
        assert_eq!(cpu.ctx.flags.current_priority(), -13);
    }

    #[test]
    fn chk_without_winner_falls_through() {
        let mut cpu = boot(vec![
            encode(&Op::CheckPriority), // stored -13 < current 0
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.ctx.iptr.value(), 2);
    }

    #[test]
    fn wait_spins_until_priority_change() {
        let mut cpu = boot(vec![encode(&Op::Wait), encode(&Op::Halt)]);
        cpu.ctx.flags.set_stored_priority(-13);
        // no winner: WAIT must not advance
        cpu.run_limited(5).unwrap();
        assert!(cpu.is_running());
        assert_eq!(cpu.ctx.iptr.value(), 0);
        assert_eq!(cpu.ctx.clock, 5);

        // raise the stored priority; the vector (index 16 = digit 3) is 1
        cpu.vectors[16] = Tryte::from_int(1);
        cpu.ctx.flags.set_stored_priority(3);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
    }

    #[test]
    fn jump_and_store_pushes_return_address() {
        let mut cpu = boot(vec![
            encode(&Op::JumpStore), // 0: push 0, jump to 3
            imm(3),                 // 1
            encode(&Op::Halt),      // 2 (unreached)
            encode(&Op::Halt),      // 3
        ]);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert_eq!(cpu.ctx.iptr.value(), 4);
        // the address of the JPS cell itself sits on the stack
        assert_eq!(cpu.ctx.sptr.value(), Tryte::MIN + 1);
        assert_eq!(cpu.mem[Tryte::from_int(Tryte::MIN as i64)].value(), 0);
    }

    #[test]
    fn pop_jump_is_indirect() {
        // PJP pops an address, then jumps to the target stored in memory
        // at that address
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)), // 0
            imm(8),                      // 1: the eventual jump target
            encode(&Op::WriteTryte(M)),  // 2
            imm(100),                    // 3: mem[100] = 8
            encode(&Op::SetTryteImm(M)), // 4
            imm(100),                    // 5: M = 100
            encode(&Op::PushTryte(M)),   // 6
            encode(&Op::PopJump),        // 7: pops 100, jumps to mem[100]
            encode(&Op::Halt),           // 8
        ]);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert_eq!(cpu.ctx.iptr.value(), 9);
        assert_eq!(cpu.ctx.sptr.value(), Tryte::MIN);
    }

    #[test]
    fn invalid_opcode_halts_contained() {
        // 'm' major group is unassigned
        let mut cpu = boot(vec!["m00".parse().unwrap()]);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        // machine state is inspectable, registers intact
        assert_eq!(cpu.regs.tryte(M).value(), 0);
    }

    #[test]
    fn mount_bad_device_is_fatal() {
        let mut cpu = boot(vec![encode(&Op::Mount { device: 3 })]);
        let err = cpu.run().unwrap_err();
        assert!(matches!(
            err,
            CpuError::Device(DeviceError::NoSuchDevice(3))
        ));
    }

    #[test]
    fn load_and_save_through_device() {
        let boot_disk = MemDisk::from_cells(vec![
            encode(&Op::Mount { device: 1 }), // 0
            encode(&Op::Load),                // 1
            imm(-9841),                       // 2: device offset 0
            imm(2),                           // 3: two cells
            imm(1000),                        // 4: into memory at 1000
            encode(&Op::Save),                // 5
            imm(1000),                        // 6: from memory at 1000
            imm(2),                           // 7: two cells
            imm(-9831),                       // 8: device offset 10
            encode(&Op::Halt),                // 9
        ]);
        let data_disk = MemDisk::from_cells(vec![Tryte::from_int(11), Tryte::from_int(-22)]);

        let (console, _) = capture_console(b"");
        let mut cpu = Cpu::new(
            vec![Box::new(boot_disk), Box::new(data_disk)],
            console,
        );
        cpu.boot().unwrap();
        cpu.run().unwrap();

        assert_eq!(cpu.mem[Tryte::from_int(1000)].value(), 11);
        assert_eq!(cpu.mem[Tryte::from_int(1001)].value(), -22);
        assert_eq!(cpu.mounted_device(), 1);
    }

    #[test]
    fn print_and_show() {
        let (console, out) = capture_console(b"");
        let program = vec![
            encode(&Op::SetTryteImm(M)),
            imm(1000),
            encode(&Op::ShowTryte(M)),
            encode(&Op::Halt),
        ];
        let mut cpu = Cpu::new(vec![Box::new(MemDisk::from_cells(program))], console);
        cpu.boot().unwrap();
        cpu.run().unwrap();
        assert_eq!(out.contents(), "aja");
    }

    #[test]
    fn tell_reads_console_code() {
        let (console, _) = capture_console(b"Hi");
        let program = vec![encode(&Op::TellTryte(M)), encode(&Op::Halt)];
        let mut cpu = Cpu::new(vec![Box::new(MemDisk::from_cells(program))], console);
        cpu.boot().unwrap();
        cpu.run().unwrap();
        assert_eq!(
            cpu.regs.tryte(M).value() as i64,
            128 * b'H' as i64 + b'i' as i64 - 9841
        );
    }

    #[test]
    fn display_mode_round_trip() {
        let mut cpu = boot(vec![
            encode(&Op::SetModeImm { mode_digit: -11 }), // mode 2: numeric
            encode(&Op::GetModeTryte(M)),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.tryte(M).value(), -11);
    }

    #[test]
    fn bad_display_mode_halts() {
        let mut cpu = boot(vec![
            encode(&Op::SetModeImm { mode_digit: 13 }), // mode 26: nonsense
            encode(&Op::Noop),
        ]);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
    }

    #[test]
    fn fpu_error_halts_machine() {
        let mut cpu = boot(vec!["fj0".parse().unwrap(), encode(&Op::Noop)]);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert!(cpu.fpu.error());
    }

    #[test]
    fn float_program_through_dispatch() {
        let one = TFloat::from_f64(1.0);
        let mut program = vec![encode_float(&FpuOp::SetImm(FpuReg(0)))];
        program.push(one.exponent().tryte(0));
        program.push(one.mantissa().tryte(0));
        program.push(one.mantissa().tryte(1));
        program.push(encode_float(&FpuOp::AddImm(FpuReg(0))));
        program.push(one.exponent().tryte(0));
        program.push(one.mantissa().tryte(0));
        program.push(one.mantissa().tryte(1));
        program.push(encode(&Op::Halt));

        let mut cpu = boot(program);
        cpu.run().unwrap();
        assert!(cpu.is_halted());
        assert!(!cpu.fpu.error());
        assert_eq!(cpu.fpu.reg(FpuReg(0)), TFloat::from_f64(2.0));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut cpu = boot(vec![
            encode(&Op::SetTryteImm(M)),
            imm(123),
            encode(&Op::Halt),
        ]);
        cpu.run().unwrap();
        let snap = cpu.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: MachineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clock, snap.clock);
        assert_eq!(back.iptr, snap.iptr);
        assert_eq!(back.registers.tryte(M).value(), 123);
    }

    #[test]
    fn reset_returns_to_off() {
        let mut cpu = boot(vec![encode(&Op::Halt)]);
        cpu.run().unwrap();
        cpu.reset();
        assert_eq!(cpu.state, CpuState::Off);
        assert_eq!(cpu.ctx.clock, 0);
        assert_eq!(cpu.mem[Tryte::ZERO].value(), 0);
    }
}
