//! Float coprocessor.
//!
//! The FPU owns the nine float registers and nothing else: the flags,
//! instruction pointer and stack pointer it mutates belong to the CPU's
//! execution context, lent to the FPU for exactly one instruction at a
//! time. A float cell the FPU cannot decode sets its error flag and steps
//! over the cell; the CPU polls the flag after every delegation and halts
//! the machine if it is set.
//!
//! A float occupies three cells wherever it touches memory or the stack:
//! exponent first, then the two mantissa trytes, most significant first.
//!
//! Float compares write the shared compare flag; an unordered compare
//! (NaN on either side) clears it to zero.

use crate::cpu::decode::{decode_float, FpuOp};
use crate::cpu::registers::ExecContext;
use crate::cpu::Memory;
use crate::dev::Console;
use crate::ternary::{TFloat, Trint, Trit, Tryte};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Index of a float register (0..9, named `f1`..`f9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpuReg(pub usize);

/// The float register file and error flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fpu {
    regs: [TFloat; 9],
    error: bool,
}

impl Fpu {
    /// Fresh FPU: all registers zero, no error.
    pub fn new() -> Self {
        Self {
            regs: [TFloat::ZERO; 9],
            error: false,
        }
    }

    /// Zero the registers and clear the error flag. The shared context is
    /// untouched.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// True after an undecodable float cell.
    pub fn error(&self) -> bool {
        self.error
    }

    /// Read a float register.
    pub fn reg(&self, reg: FpuReg) -> TFloat {
        self.regs[reg.0]
    }

    /// Write a float register.
    pub fn set_reg(&mut self, reg: FpuReg, value: TFloat) {
        self.regs[reg.0] = value;
    }

    /// All registers, `f1` first.
    pub fn regs(&self) -> &[TFloat; 9] {
        &self.regs
    }

    /// Execute one float instruction cell against the shared context.
    pub fn execute(
        &mut self,
        cell: Tryte,
        ctx: &mut ExecContext,
        mem: &mut Memory,
        console: &mut Console,
    ) {
        match decode_float(cell) {
            Ok(op) => self.dispatch(op, ctx, mem, console),
            Err(_) => {
                self.error = true;
                ctx.advance(1);
            }
        }
    }

    fn dispatch(&mut self, op: FpuOp, ctx: &mut ExecContext, mem: &mut Memory, console: &mut Console) {
        match op {
            FpuOp::Set(x, y) => {
                self.regs[x.0] = self.regs[y.0];
                ctx.advance(1);
            }
            FpuOp::Swap(x, y) => {
                self.regs.swap(x.0, y.0);
                ctx.advance(1);
            }
            FpuOp::Cmp(x, y) => {
                set_compare(ctx, &self.regs[x.0], &self.regs[y.0]);
                ctx.advance(1);
            }
            FpuOp::Add(x, y) => {
                self.regs[x.0] = self.regs[x.0] + self.regs[y.0];
                ctx.advance(1);
            }
            FpuOp::Mul(x, y) => {
                self.regs[x.0] = self.regs[x.0] * self.regs[y.0];
                ctx.advance(1);
            }
            FpuOp::Div(x, y) => {
                self.regs[x.0] = self.regs[x.0] / self.regs[y.0];
                ctx.advance(1);
            }

            FpuOp::SetImm(x) => {
                self.regs[x.0] = read_float(mem, ctx.iptr + Tryte::from_int(1));
                ctx.advance(4);
            }
            FpuOp::AddImm(x) => {
                let imm = read_float(mem, ctx.iptr + Tryte::from_int(1));
                self.regs[x.0] = self.regs[x.0] + imm;
                ctx.advance(4);
            }
            FpuOp::MulImm(x) => {
                let imm = read_float(mem, ctx.iptr + Tryte::from_int(1));
                self.regs[x.0] = self.regs[x.0] * imm;
                ctx.advance(4);
            }
            FpuOp::DivImm(x) => {
                let imm = read_float(mem, ctx.iptr + Tryte::from_int(1));
                self.regs[x.0] = self.regs[x.0] / imm;
                ctx.advance(4);
            }
            FpuOp::CmpImm(x) => {
                let imm = read_float(mem, ctx.iptr + Tryte::from_int(1));
                set_compare(ctx, &self.regs[x.0], &imm);
                ctx.advance(4);
            }

            FpuOp::ReadMem(x) => {
                let addr = mem[ctx.iptr + Tryte::from_int(1)];
                self.regs[x.0] = read_float(mem, addr);
                ctx.advance(2);
            }
            FpuOp::WriteMem(x) => {
                let addr = mem[ctx.iptr + Tryte::from_int(1)];
                write_float(mem, addr, &self.regs[x.0]);
                ctx.advance(2);
            }

            FpuOp::Push(x) => {
                write_float(mem, ctx.sptr, &self.regs[x.0]);
                ctx.sptr += Tryte::from_int(3);
                ctx.advance(1);
            }
            FpuOp::Pop(x) => {
                self.regs[x.0] = read_float(mem, ctx.sptr - Tryte::from_int(3));
                ctx.sptr -= Tryte::from_int(3);
                ctx.advance(1);
            }
            FpuOp::Peek(x) => {
                self.regs[x.0] = read_float(mem, ctx.sptr - Tryte::from_int(3));
                ctx.advance(1);
            }

            FpuOp::Flip(x) => {
                self.regs[x.0] = -self.regs[x.0];
                ctx.advance(1);
            }
            FpuOp::Abs(x) => {
                self.regs[x.0] = self.regs[x.0].abs();
                ctx.advance(1);
            }
            FpuOp::Show(x) => {
                console.write_float(&self.regs[x.0]);
                ctx.advance(1);
            }
        }
    }
}

impl Default for Fpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the three cells of a float starting at `addr`.
fn read_float(mem: &Memory, addr: Tryte) -> TFloat {
    let exponent = Trint::<1>::from_trytes([mem[addr]]);
    let mantissa = Trint::<2>::from_trytes([
        mem[addr + Tryte::from_int(1)],
        mem[addr + Tryte::from_int(2)],
    ]);
    TFloat::new(exponent, mantissa)
}

/// Write the three cells of a float starting at `addr`.
fn write_float(mem: &mut Memory, addr: Tryte, value: &TFloat) {
    mem[addr] = value.exponent().tryte(0);
    mem[addr + Tryte::from_int(1)] = value.mantissa().tryte(0);
    mem[addr + Tryte::from_int(2)] = value.mantissa().tryte(1);
}

/// Write the shared compare flag from a float comparison.
fn set_compare(ctx: &mut ExecContext, a: &TFloat, b: &TFloat) {
    let flag = match a.partial_cmp(b) {
        Some(Ordering::Less) => Trit::N,
        Some(Ordering::Greater) => Trit::P,
        Some(Ordering::Equal) | None => Trit::O,
    };
    ctx.flags.set_compare(flag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode_float;
    use std::io::Cursor;

    fn console() -> Console {
        Console::with_io(Box::new(Cursor::new(Vec::new())), Box::new(std::io::sink()))
    }

    fn exec(fpu: &mut Fpu, op: FpuOp, ctx: &mut ExecContext, mem: &mut Memory) {
        fpu.execute(encode_float(&op), ctx, mem, &mut console());
    }

    #[test]
    fn add_between_registers() {
        let mut fpu = Fpu::new();
        let mut ctx = ExecContext::new();
        let mut mem = Memory::new();
        fpu.set_reg(FpuReg(0), TFloat::from_f64(1.0));
        fpu.set_reg(FpuReg(1), TFloat::from_f64(3.0));

        exec(&mut fpu, FpuOp::Add(FpuReg(0), FpuReg(1)), &mut ctx, &mut mem);

        assert_eq!(fpu.reg(FpuReg(0)), TFloat::from_f64(4.0));
        assert_eq!(ctx.iptr.value(), 1);
        assert!(!fpu.error());
    }

    #[test]
    fn compare_sets_shared_flag() {
        let mut fpu = Fpu::new();
        let mut ctx = ExecContext::new();
        let mut mem = Memory::new();
        fpu.set_reg(FpuReg(0), TFloat::from_f64(1.0));
        fpu.set_reg(FpuReg(1), TFloat::from_f64(2.0));

        exec(&mut fpu, FpuOp::Cmp(FpuReg(0), FpuReg(1)), &mut ctx, &mut mem);
        assert_eq!(ctx.flags.compare(), Trit::N);

        exec(&mut fpu, FpuOp::Cmp(FpuReg(1), FpuReg(0)), &mut ctx, &mut mem);
        assert_eq!(ctx.flags.compare(), Trit::P);

        // unordered clears the flag
        fpu.set_reg(FpuReg(2), TFloat::nan());
        exec(&mut fpu, FpuOp::Cmp(FpuReg(0), FpuReg(2)), &mut ctx, &mut mem);
        assert_eq!(ctx.flags.compare(), Trit::O);
    }

    #[test]
    fn stack_round_trip() {
        let mut fpu = Fpu::new();
        let mut ctx = ExecContext::new();
        let mut mem = Memory::new();
        let value = TFloat::from_f64(-2.5);
        fpu.set_reg(FpuReg(3), value);

        exec(&mut fpu, FpuOp::Push(FpuReg(3)), &mut ctx, &mut mem);
        assert_eq!(ctx.sptr.value(), Tryte::MIN + 3);

        exec(&mut fpu, FpuOp::Peek(FpuReg(4)), &mut ctx, &mut mem);
        assert_eq!(fpu.reg(FpuReg(4)), value);
        assert_eq!(ctx.sptr.value(), Tryte::MIN + 3);

        exec(&mut fpu, FpuOp::Pop(FpuReg(5)), &mut ctx, &mut mem);
        assert_eq!(fpu.reg(FpuReg(5)), value);
        assert_eq!(ctx.sptr.value(), Tryte::MIN);
    }

    #[test]
    fn memory_round_trip() {
        let mut fpu = Fpu::new();
        let mut ctx = ExecContext::new();
        let mut mem = Memory::new();
        let value = TFloat::from_f64(81.5);
        fpu.set_reg(FpuReg(0), value);

        // WRITEF f1, $500 : operand cell holds the address
        ctx.iptr = Tryte::from_int(100);
        mem[Tryte::from_int(101)] = Tryte::from_int(500);
        exec(&mut fpu, FpuOp::WriteMem(FpuReg(0)), &mut ctx, &mut mem);
        assert_eq!(ctx.iptr.value(), 102);

        ctx.iptr = Tryte::from_int(200);
        mem[Tryte::from_int(201)] = Tryte::from_int(500);
        exec(&mut fpu, FpuOp::ReadMem(FpuReg(8)), &mut ctx, &mut mem);
        assert_eq!(fpu.reg(FpuReg(8)), value);
    }

    #[test]
    fn invalid_opcode_sets_error_and_steps() {
        let mut fpu = Fpu::new();
        let mut ctx = ExecContext::new();
        let mut mem = Memory::new();

        // 'f'-group with an unused second digit
        fpu.execute(
            "fj0".parse().unwrap(),
            &mut ctx,
            &mut mem,
            &mut console(),
        );
        assert!(fpu.error());
        assert_eq!(ctx.iptr.value(), 1);

        fpu.reset();
        assert!(!fpu.error());
        assert_eq!(fpu.reg(FpuReg(0)), TFloat::ZERO);
    }
}
