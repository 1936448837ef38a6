//! Instruction decoder.
//!
//! An instruction cell is read two ways at once: as three base-27 digits
//! (`first`, `second`, `third`, written here as their digit characters) and
//! as nine raw trits. The first digit picks a major group; inside a group
//! the remaining digits name registers directly, while wide and float
//! registers are picked by trit duets (two adjacent trits + 4, giving
//! 0..8). The full low digit doubles as a small literal in [-13, +13] for
//! priorities, vector numbers, device numbers and display modes.
//!
//! Decoding only classifies the opcode cell; immediate and address
//! operands live in the following cells and are fetched at execution time.
//! `encode` is the exact inverse for the opcode cell, used by tests, the
//! debugger and image tooling.

use crate::cpu::fpu::FpuReg;
use crate::cpu::registers::{TrintReg, TryteReg};
use crate::ternary::{Trit, Tryte};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A decoded CPU instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // ---- control ----
    /// HALT: stop the machine.
    Halt,
    /// NOOP.
    Noop,
    /// WAIT: spin on the priority check without advancing.
    Wait,
    /// CCMP: clear the compare flag.
    ClearCompare,
    /// CCAR: clear the carry flag.
    ClearCarry,
    /// COVF: clear the overflow flag.
    ClearOverflow,
    /// PJP: pop a cell, jump through memory at that address.
    PopJump,
    /// JPS $X: push the instruction pointer, jump to X.
    JumpStore,
    /// CHK: switch to the stored vector if the stored priority wins.
    CheckPriority,
    /// THD n: jump to interrupt vector n.
    ThreadSwitch { vector: usize },
    /// PRI n: set the running thread's priority.
    SetPriority { priority: i16 },
    /// INT n, $X: point interrupt vector n at address X.
    SetVector { vector: usize },
    /// JP $X.
    Jump,
    /// JPZ $X: jump if the compare flag is zero.
    JumpIfZero,
    /// JPN $X: jump if the compare flag is negative.
    JumpIfNeg,
    /// JPP $X: jump if the compare flag is positive.
    JumpIfPos,
    /// MOUNT n: select the active device.
    Mount { device: usize },

    // ---- memory / device i/o ----
    /// READ $X, Y.
    ReadTryte(TryteReg),
    /// READ3 $X, Y.
    ReadTrint(TrintReg),
    /// WRITE X, $Y.
    WriteTryte(TryteReg),
    /// WRITE3 X, $Y.
    WriteTrint(TrintReg),
    /// FILL $X, n, k.
    Fill,
    /// LOAD $X, n, $Y: device to memory.
    Load,
    /// SAVE $X, n, $Y: memory to device.
    Save,

    // ---- stack ----
    /// WHERE X: copy the stack pointer into X.
    Where(TryteReg),
    PushTryte(TryteReg),
    PushTrint(TrintReg),
    PopTryte(TryteReg),
    PopTrint(TrintReg),
    PeekTryte(TryteReg),
    PeekTrint(TrintReg),

    // ---- console ----
    /// PRINT n, $X.
    Print,
    SetModeTryte(TryteReg),
    SetModeTrint(TrintReg),
    /// DSET n with a literal mode digit.
    SetModeImm { mode_digit: i16 },
    GetModeTryte(TryteReg),
    GetModeTrint(TrintReg),
    ShowTryte(TryteReg),
    ShowTrint(TrintReg),
    TellTryte(TryteReg),
    TellTrint(TrintReg),

    // ---- tryte register-register ----
    AddTrytes(TryteReg, TryteReg),
    SetTryte(TryteReg, TryteReg),
    CmpTrytes(TryteReg, TryteReg),
    DivTrytes(TryteReg, TryteReg),
    MulTrytes(TryteReg, TryteReg),
    AndTrytes(TryteReg, TryteReg),
    OrTrytes(TryteReg, TryteReg),
    XorTrytes(TryteReg, TryteReg),
    SwapTrytes(TryteReg, TryteReg),

    // ---- trint register-register ----
    SetTrints(TrintReg, TrintReg),
    CmpTrints(TrintReg, TrintReg),
    AddTrints(TrintReg, TrintReg),
    MulTrints(TrintReg, TrintReg),
    DivTrints(TrintReg, TrintReg),
    AndTrints(TrintReg, TrintReg),
    OrTrints(TrintReg, TrintReg),
    XorTrints(TrintReg, TrintReg),
    SwapTrints(TrintReg, TrintReg),

    // ---- trint with immediate / single register ----
    SetTrintImm(TrintReg),
    AddTrintImm(TrintReg),
    CmpTrintImm(TrintReg),
    DivTrintImm(TrintReg),
    MulTrintImm(TrintReg),
    AndTrintImm(TrintReg),
    OrTrintImm(TrintReg),
    XorTrintImm(TrintReg),
    IncTrint(TrintReg),
    DecTrint(TrintReg),
    AbsTrint(TrintReg),
    NotTrint(TrintReg),
    FlipTrint(TrintReg),
    ShlTrint(TrintReg),
    ShrTrint(TrintReg),

    // ---- tryte with immediate / single register ----
    SetTryteImm(TryteReg),
    AddTryteImm(TryteReg),
    CmpTryteImm(TryteReg),
    DivTryteImm(TryteReg),
    MulTryteImm(TryteReg),
    AndTryteImm(TryteReg),
    OrTryteImm(TryteReg),
    XorTryteImm(TryteReg),
    IncTryte(TryteReg),
    DecTryte(TryteReg),
    AbsTryte(TryteReg),
    NotTryte(TryteReg),
    FlipTryte(TryteReg),
    ShlTryte(TryteReg),
    ShrTryte(TryteReg),

    // ---- float coprocessor ----
    /// The whole cell is handed to the FPU, which decodes it itself.
    Float { raw: Tryte },
}

/// A decoded float coprocessor instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FpuOp {
    /// SETF x, y.
    Set(FpuReg, FpuReg),
    /// CMPF x, y: sets the shared compare flag.
    Cmp(FpuReg, FpuReg),
    Add(FpuReg, FpuReg),
    Mul(FpuReg, FpuReg),
    Div(FpuReg, FpuReg),
    Swap(FpuReg, FpuReg),
    /// SETF x, #: from a 3-cell immediate.
    SetImm(FpuReg),
    AddImm(FpuReg),
    MulImm(FpuReg),
    DivImm(FpuReg),
    CmpImm(FpuReg),
    /// READF $X, y: three cells from memory.
    ReadMem(FpuReg),
    /// WRITEF x, $Y: three cells to memory.
    WriteMem(FpuReg),
    Push(FpuReg),
    Pop(FpuReg),
    Peek(FpuReg),
    /// FLIPF x: negate.
    Flip(FpuReg),
    /// ABSF x.
    Abs(FpuReg),
    /// SHOWF x: send to the console.
    Show(FpuReg),
}

/// Failure to classify an opcode cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode {0}")]
    InvalidOpcode(Tryte),

    #[error("invalid float opcode {0}")]
    InvalidFloatOpcode(Tryte),
}

/// Digit character of a balanced base-27 value in [-13, +13].
fn digit_char(digit: i16) -> char {
    crate::ternary::SEPTAVINGT_CHARS[(digit + 13) as usize] as char
}

/// Trit duet at LSB positions (hi, lo): `3*hi + lo + 4`, in 0..9.
fn duet(cell: &Tryte, hi: usize, lo: usize) -> usize {
    (3 * cell.trit(hi).to_i8() as i16 + cell.trit(lo).to_i8() as i16 + 4) as usize
}

fn high2(cell: &Tryte) -> usize {
    duet(cell, 5, 4)
}

fn mid2(cell: &Tryte) -> usize {
    duet(cell, 3, 2)
}

fn low2(cell: &Tryte) -> usize {
    duet(cell, 1, 0)
}

/// Classify one instruction cell.
pub fn decode(cell: Tryte) -> Result<Op, DecodeError> {
    let digits = cell.base27_digits();
    let [first, second, third] = digits;
    let s = digit_char(second);
    let t = digit_char(third);
    let bad = || DecodeError::InvalidOpcode(cell);

    let op = match digit_char(first) {
        '0' => match s {
            '0' => match t {
                '0' => Op::Halt,
                'a' => Op::Noop,
                'A' => Op::Wait,
                _ => return Err(bad()),
            },
            'a' => match t {
                '0' => Op::ClearCompare,
                'A' => Op::ClearCarry,
                'a' => Op::ClearOverflow,
                _ => return Err(bad()),
            },
            'b' => Op::PopJump,
            'B' => Op::JumpStore,
            'c' => Op::CheckPriority,
            'h' => Op::ThreadSwitch {
                vector: (third + 13) as usize,
            },
            'I' => Op::SetPriority { priority: third },
            'i' => Op::SetVector {
                vector: (third + 13) as usize,
            },
            'j' => match t {
                '0' => Op::JumpIfZero,
                'a' => Op::JumpIfPos,
                'A' => Op::JumpIfNeg,
                'j' => Op::Jump,
                'm' => Op::JumpStore,
                'M' => Op::PopJump,
                _ => return Err(bad()),
            },
            'm' => Op::Mount {
                device: (third + 13) as usize,
            },
            _ => return Err(bad()),
        },

        'a' => match s {
            'A' => Op::ReadTryte(TryteReg::from_digit(third)),
            'a' => Op::ReadTrint(TrintReg(low2(&cell))),
            'B' => Op::WriteTryte(TryteReg::from_digit(third)),
            'b' => Op::WriteTrint(TrintReg(low2(&cell))),
            'f' => Op::Fill,
            'M' => Op::Load,
            'm' => Op::Save,
            _ => return Err(bad()),
        },

        'b' => match s {
            '0' => Op::Where(TryteReg::from_digit(third)),
            'A' => Op::PushTryte(TryteReg::from_digit(third)),
            'a' => Op::PushTrint(TrintReg(low2(&cell))),
            'B' => Op::PopTryte(TryteReg::from_digit(third)),
            'b' => Op::PopTrint(TrintReg(low2(&cell))),
            'M' => Op::PeekTryte(TryteReg::from_digit(third)),
            'm' => Op::PeekTrint(TrintReg(low2(&cell))),
            _ => return Err(bad()),
        },

        'c' => match s {
            '0' => Op::Print,
            'a' => Op::SetModeTrint(TrintReg(low2(&cell))),
            'A' => Op::SetModeTryte(TryteReg::from_digit(third)),
            'b' => Op::GetModeTrint(TrintReg(low2(&cell))),
            'B' => Op::GetModeTryte(TryteReg::from_digit(third)),
            'c' => Op::ShowTrint(TrintReg(low2(&cell))),
            'C' => Op::ShowTryte(TryteReg::from_digit(third)),
            'd' => Op::TellTrint(TrintReg(low2(&cell))),
            'D' => Op::TellTryte(TryteReg::from_digit(third)),
            'm' => Op::SetModeImm { mode_digit: third },
            _ => return Err(bad()),
        },

        'A' => Op::AddTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'B' => Op::SetTryte(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'C' => Op::CmpTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'D' => Op::DivTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'E' => Op::MulTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'F' => Op::AndTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'G' => Op::OrTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'H' => Op::XorTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),
        'I' => Op::SwapTrytes(TryteReg::from_digit(second), TryteReg::from_digit(third)),

        'f' | 'g' => Op::Float { raw: cell },

        'j' => {
            let x = TrintReg(mid2(&cell));
            let y = TrintReg(low2(&cell));
            match high2(&cell) {
                0 => Op::SetTrints(x, y),
                1 => Op::CmpTrints(x, y),
                2 => Op::AddTrints(x, y),
                3 => Op::MulTrints(x, y),
                4 => Op::DivTrints(x, y),
                5 => Op::AndTrints(x, y),
                6 => Op::OrTrints(x, y),
                7 => Op::XorTrints(x, y),
                8 => Op::SwapTrints(x, y),
                _ => return Err(bad()),
            }
        }

        'k' => {
            let x = TrintReg(low2(&cell));
            match s {
                'b' => Op::SetTrintImm(x),
                'a' => Op::AddTrintImm(x),
                'c' => Op::CmpTrintImm(x),
                'd' => Op::DivTrintImm(x),
                'e' => Op::MulTrintImm(x),
                'f' => Op::AndTrintImm(x),
                'g' => Op::OrTrintImm(x),
                'h' => Op::XorTrintImm(x),
                'i' => Op::IncTrint(x),
                'I' => Op::DecTrint(x),
                'A' => Op::AbsTrint(x),
                'B' => Op::NotTrint(x),
                '0' => Op::FlipTrint(x),
                'm' => Op::ShlTrint(x),
                'M' => Op::ShrTrint(x),
                _ => return Err(bad()),
            }
        }

        'K' => {
            let x = TryteReg::from_digit(third);
            match s {
                'a' => Op::AddTryteImm(x),
                'b' => Op::SetTryteImm(x),
                'c' => Op::CmpTryteImm(x),
                'd' => Op::DivTryteImm(x),
                'e' => Op::MulTryteImm(x),
                'f' => Op::AndTryteImm(x),
                'g' => Op::OrTryteImm(x),
                'h' => Op::XorTryteImm(x),
                'i' => Op::IncTryte(x),
                'I' => Op::DecTryte(x),
                'A' => Op::AbsTryte(x),
                'B' => Op::NotTryte(x),
                '0' => Op::FlipTryte(x),
                'm' => Op::ShlTryte(x),
                'M' => Op::ShrTryte(x),
                _ => return Err(bad()),
            }
        }

        _ => return Err(bad()),
    };

    Ok(op)
}

/// Classify a float opcode cell (major group `f` or `g`).
pub fn decode_float(cell: Tryte) -> Result<FpuOp, DecodeError> {
    let digits = cell.base27_digits();
    let [first, second, _third] = digits;
    let bad = || DecodeError::InvalidFloatOpcode(cell);

    match digit_char(first) {
        'f' => {
            let x = FpuReg(low2(&cell));
            let op = match digit_char(second) {
                'm' => FpuOp::SetImm(x),
                'd' => FpuOp::AddImm(x),
                'e' => FpuOp::MulImm(x),
                'D' => FpuOp::DivImm(x),
                'E' => FpuOp::CmpImm(x),
                'a' => FpuOp::ReadMem(x),
                'b' => FpuOp::WriteMem(x),
                'A' => FpuOp::Push(x),
                'B' => FpuOp::Pop(x),
                'M' => FpuOp::Peek(x),
                '0' => FpuOp::Flip(x),
                'c' => FpuOp::Abs(x),
                'C' => FpuOp::Show(x),
                _ => return Err(bad()),
            };
            Ok(op)
        }
        'g' => {
            let x = FpuReg(mid2(&cell));
            let y = FpuReg(low2(&cell));
            match high2(&cell) {
                0 => Ok(FpuOp::Set(x, y)),
                1 => Ok(FpuOp::Cmp(x, y)),
                2 => Ok(FpuOp::Add(x, y)),
                3 => Ok(FpuOp::Mul(x, y)),
                4 => Ok(FpuOp::Div(x, y)),
                5 => Ok(FpuOp::Swap(x, y)),
                _ => Err(bad()),
            }
        }
        _ => Err(bad()),
    }
}

// ---------------------------------------------------------------------------
// encoding
// ---------------------------------------------------------------------------

/// Digit value of a base-27 character; the callers only pass alphabet
/// constants.
fn digit_of(c: char) -> i16 {
    crate::ternary::SEPTAVINGT_CHARS
        .iter()
        .position(|&b| b as char == c)
        .map(|p| p as i16 - 13)
        .expect("base-27 digit character")
}

/// Write a base-27 digit into digit group `group` (0 = least significant).
fn set_digit(cell: &mut Tryte, group: usize, digit: i16) {
    let d = Tryte::from_int(digit as i64);
    for i in 0..3 {
        cell.set_trit(3 * group + i, d.trit(i));
    }
}

/// Write a duet value (0..9) into the trit pair (hi, lo).
fn set_duet(cell: &mut Tryte, hi: usize, lo: usize, value: usize) {
    let a = value as i8 / 3 - 1;
    let b = value as i8 % 3 - 1;
    cell.set_trit(hi, Trit::from_i8(a));
    cell.set_trit(lo, Trit::from_i8(b));
}

fn chars(first: char, second: char, third: char) -> Tryte {
    Tryte::from_base27_digits([digit_of(first), digit_of(second), digit_of(third)])
}

/// Opcode cell with a leading digit char, a second digit char and a low
/// duet register selector.
fn char2_low(first: char, second: char, reg: usize) -> Tryte {
    let mut cell = chars(first, second, '0');
    set_duet(&mut cell, 1, 0, reg);
    cell
}

/// Opcode cell with a leading digit char and three duet selectors.
fn char_duets(first: char, op: usize, x: usize, y: usize) -> Tryte {
    let mut cell = Tryte::ZERO;
    set_digit(&mut cell, 2, digit_of(first));
    set_duet(&mut cell, 5, 4, op);
    set_duet(&mut cell, 3, 2, x);
    set_duet(&mut cell, 1, 0, y);
    cell
}

fn reg_char(reg: TryteReg) -> char {
    digit_char(reg.0 as i16 - 13)
}

/// Encode an instruction back into its opcode cell.
///
/// `decode(encode(op)) == op` for every constructible op; for the few
/// opcodes with aliases (PJP, JPS) the canonical form is produced.
pub fn encode(op: &Op) -> Tryte {
    match *op {
        Op::Halt => chars('0', '0', '0'),
        Op::Noop => chars('0', '0', 'a'),
        Op::Wait => chars('0', '0', 'A'),
        Op::ClearCompare => chars('0', 'a', '0'),
        Op::ClearCarry => chars('0', 'a', 'A'),
        Op::ClearOverflow => chars('0', 'a', 'a'),
        Op::PopJump => chars('0', 'b', '0'),
        Op::JumpStore => chars('0', 'B', '0'),
        Op::CheckPriority => chars('0', 'c', '0'),
        Op::ThreadSwitch { vector } => {
            let mut cell = chars('0', 'h', '0');
            set_digit(&mut cell, 0, vector as i16 - 13);
            cell
        }
        Op::SetPriority { priority } => {
            let mut cell = chars('0', 'I', '0');
            set_digit(&mut cell, 0, priority);
            cell
        }
        Op::SetVector { vector } => {
            let mut cell = chars('0', 'i', '0');
            set_digit(&mut cell, 0, vector as i16 - 13);
            cell
        }
        Op::Jump => chars('0', 'j', 'j'),
        Op::JumpIfZero => chars('0', 'j', '0'),
        Op::JumpIfPos => chars('0', 'j', 'a'),
        Op::JumpIfNeg => chars('0', 'j', 'A'),
        Op::Mount { device } => {
            let mut cell = chars('0', 'm', '0');
            set_digit(&mut cell, 0, device as i16 - 13);
            cell
        }

        Op::ReadTryte(r) => chars('a', 'A', reg_char(r)),
        Op::ReadTrint(r) => char2_low('a', 'a', r.0),
        Op::WriteTryte(r) => chars('a', 'B', reg_char(r)),
        Op::WriteTrint(r) => char2_low('a', 'b', r.0),
        Op::Fill => chars('a', 'f', '0'),
        Op::Load => chars('a', 'M', '0'),
        Op::Save => chars('a', 'm', '0'),

        Op::Where(r) => chars('b', '0', reg_char(r)),
        Op::PushTryte(r) => chars('b', 'A', reg_char(r)),
        Op::PushTrint(r) => char2_low('b', 'a', r.0),
        Op::PopTryte(r) => chars('b', 'B', reg_char(r)),
        Op::PopTrint(r) => char2_low('b', 'b', r.0),
        Op::PeekTryte(r) => chars('b', 'M', reg_char(r)),
        Op::PeekTrint(r) => char2_low('b', 'm', r.0),

        Op::Print => chars('c', '0', '0'),
        Op::SetModeTrint(r) => char2_low('c', 'a', r.0),
        Op::SetModeTryte(r) => chars('c', 'A', reg_char(r)),
        Op::GetModeTrint(r) => char2_low('c', 'b', r.0),
        Op::GetModeTryte(r) => chars('c', 'B', reg_char(r)),
        Op::ShowTrint(r) => char2_low('c', 'c', r.0),
        Op::ShowTryte(r) => chars('c', 'C', reg_char(r)),
        Op::TellTrint(r) => char2_low('c', 'd', r.0),
        Op::TellTryte(r) => chars('c', 'D', reg_char(r)),
        Op::SetModeImm { mode_digit } => {
            let mut cell = chars('c', 'm', '0');
            set_digit(&mut cell, 0, mode_digit);
            cell
        }

        Op::AddTrytes(x, y) => chars('A', reg_char(x), reg_char(y)),
        Op::SetTryte(x, y) => chars('B', reg_char(x), reg_char(y)),
        Op::CmpTrytes(x, y) => chars('C', reg_char(x), reg_char(y)),
        Op::DivTrytes(x, y) => chars('D', reg_char(x), reg_char(y)),
        Op::MulTrytes(x, y) => chars('E', reg_char(x), reg_char(y)),
        Op::AndTrytes(x, y) => chars('F', reg_char(x), reg_char(y)),
        Op::OrTrytes(x, y) => chars('G', reg_char(x), reg_char(y)),
        Op::XorTrytes(x, y) => chars('H', reg_char(x), reg_char(y)),
        Op::SwapTrytes(x, y) => chars('I', reg_char(x), reg_char(y)),

        Op::SetTrints(x, y) => char_duets('j', 0, x.0, y.0),
        Op::CmpTrints(x, y) => char_duets('j', 1, x.0, y.0),
        Op::AddTrints(x, y) => char_duets('j', 2, x.0, y.0),
        Op::MulTrints(x, y) => char_duets('j', 3, x.0, y.0),
        Op::DivTrints(x, y) => char_duets('j', 4, x.0, y.0),
        Op::AndTrints(x, y) => char_duets('j', 5, x.0, y.0),
        Op::OrTrints(x, y) => char_duets('j', 6, x.0, y.0),
        Op::XorTrints(x, y) => char_duets('j', 7, x.0, y.0),
        Op::SwapTrints(x, y) => char_duets('j', 8, x.0, y.0),

        Op::SetTrintImm(r) => char2_low('k', 'b', r.0),
        Op::AddTrintImm(r) => char2_low('k', 'a', r.0),
        Op::CmpTrintImm(r) => char2_low('k', 'c', r.0),
        Op::DivTrintImm(r) => char2_low('k', 'd', r.0),
        Op::MulTrintImm(r) => char2_low('k', 'e', r.0),
        Op::AndTrintImm(r) => char2_low('k', 'f', r.0),
        Op::OrTrintImm(r) => char2_low('k', 'g', r.0),
        Op::XorTrintImm(r) => char2_low('k', 'h', r.0),
        Op::IncTrint(r) => char2_low('k', 'i', r.0),
        Op::DecTrint(r) => char2_low('k', 'I', r.0),
        Op::AbsTrint(r) => char2_low('k', 'A', r.0),
        Op::NotTrint(r) => char2_low('k', 'B', r.0),
        Op::FlipTrint(r) => char2_low('k', '0', r.0),
        Op::ShlTrint(r) => char2_low('k', 'm', r.0),
        Op::ShrTrint(r) => char2_low('k', 'M', r.0),

        Op::AddTryteImm(r) => chars('K', 'a', reg_char(r)),
        Op::SetTryteImm(r) => chars('K', 'b', reg_char(r)),
        Op::CmpTryteImm(r) => chars('K', 'c', reg_char(r)),
        Op::DivTryteImm(r) => chars('K', 'd', reg_char(r)),
        Op::MulTryteImm(r) => chars('K', 'e', reg_char(r)),
        Op::AndTryteImm(r) => chars('K', 'f', reg_char(r)),
        Op::OrTryteImm(r) => chars('K', 'g', reg_char(r)),
        Op::XorTryteImm(r) => chars('K', 'h', reg_char(r)),
        Op::IncTryte(r) => chars('K', 'i', reg_char(r)),
        Op::DecTryte(r) => chars('K', 'I', reg_char(r)),
        Op::AbsTryte(r) => chars('K', 'A', reg_char(r)),
        Op::NotTryte(r) => chars('K', 'B', reg_char(r)),
        Op::FlipTryte(r) => chars('K', '0', reg_char(r)),
        Op::ShlTryte(r) => chars('K', 'm', reg_char(r)),
        Op::ShrTryte(r) => chars('K', 'M', reg_char(r)),

        Op::Float { raw } => raw,
    }
}

/// Encode a float instruction into its opcode cell.
pub fn encode_float(op: &FpuOp) -> Tryte {
    match *op {
        FpuOp::Set(x, y) => char_duets('g', 0, x.0, y.0),
        FpuOp::Cmp(x, y) => char_duets('g', 1, x.0, y.0),
        FpuOp::Add(x, y) => char_duets('g', 2, x.0, y.0),
        FpuOp::Mul(x, y) => char_duets('g', 3, x.0, y.0),
        FpuOp::Div(x, y) => char_duets('g', 4, x.0, y.0),
        FpuOp::Swap(x, y) => char_duets('g', 5, x.0, y.0),
        FpuOp::SetImm(r) => char2_low('f', 'm', r.0),
        FpuOp::AddImm(r) => char2_low('f', 'd', r.0),
        FpuOp::MulImm(r) => char2_low('f', 'e', r.0),
        FpuOp::DivImm(r) => char2_low('f', 'D', r.0),
        FpuOp::CmpImm(r) => char2_low('f', 'E', r.0),
        FpuOp::ReadMem(r) => char2_low('f', 'a', r.0),
        FpuOp::WriteMem(r) => char2_low('f', 'b', r.0),
        FpuOp::Push(r) => char2_low('f', 'A', r.0),
        FpuOp::Pop(r) => char2_low('f', 'B', r.0),
        FpuOp::Peek(r) => char2_low('f', 'M', r.0),
        FpuOp::Flip(r) => char2_low('f', '0', r.0),
        FpuOp::Abs(r) => char2_low('f', 'c', r.0),
        FpuOp::Show(r) => char2_low('f', 'C', r.0),
    }
}

impl Op {
    /// Encoded width in cells: the opcode plus any immediate or address
    /// operands. Control-flow ops report their encoded width even though
    /// they set the pointer explicitly.
    pub fn width(&self) -> i64 {
        use Op::*;
        match self {
            SetVector { .. } | Jump | JumpIfZero | JumpIfNeg | JumpIfPos | JumpStore => 2,
            ReadTryte(_) | ReadTrint(_) | WriteTryte(_) | WriteTrint(_) => 2,
            ShlTryte(_) | ShrTryte(_) | ShlTrint(_) | ShrTrint(_) => 2,
            SetTryteImm(_) | AddTryteImm(_) | CmpTryteImm(_) | DivTryteImm(_)
            | MulTryteImm(_) | AndTryteImm(_) | OrTryteImm(_) | XorTryteImm(_) => 2,
            Print => 3,
            Fill | Load | Save => 4,
            SetTrintImm(_) | AddTrintImm(_) | CmpTrintImm(_) | DivTrintImm(_)
            | MulTrintImm(_) | AndTrintImm(_) | OrTrintImm(_) | XorTrintImm(_) => 4,
            _ => 1,
        }
    }
}

impl FpuOp {
    /// Encoded width in cells.
    pub fn width(&self) -> i64 {
        use FpuOp::*;
        match self {
            SetImm(_) | AddImm(_) | MulImm(_) | DivImm(_) | CmpImm(_) => 4,
            ReadMem(_) | WriteMem(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Op {
    /// Disassembly mnemonic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Op::*;
        match self {
            Halt => write!(f, "HALT"),
            Noop => write!(f, "NOOP"),
            Wait => write!(f, "WAIT"),
            ClearCompare => write!(f, "CCMP"),
            ClearCarry => write!(f, "CCAR"),
            ClearOverflow => write!(f, "COVF"),
            PopJump => write!(f, "PJP"),
            JumpStore => write!(f, "JPS $"),
            CheckPriority => write!(f, "CHK"),
            ThreadSwitch { vector } => write!(f, "THD {}", *vector as i16 - 13),
            SetPriority { priority } => write!(f, "PRI {}", priority),
            SetVector { vector } => write!(f, "INT {}, $", *vector as i16 - 13),
            Jump => write!(f, "JP $"),
            JumpIfZero => write!(f, "JPZ $"),
            JumpIfNeg => write!(f, "JPN $"),
            JumpIfPos => write!(f, "JPP $"),
            Mount { device } => write!(f, "MOUNT {}", device),
            ReadTryte(r) => write!(f, "READ $, {}", r.name()),
            ReadTrint(r) => write!(f, "READ3 $, {}", r.name()),
            WriteTryte(r) => write!(f, "WRITE {}, $", r.name()),
            WriteTrint(r) => write!(f, "WRITE3 {}, $", r.name()),
            Fill => write!(f, "FILL"),
            Load => write!(f, "LOAD"),
            Save => write!(f, "SAVE"),
            Where(r) => write!(f, "WHERE {}", r.name()),
            PushTryte(r) => write!(f, "PUSH {}", r.name()),
            PushTrint(r) => write!(f, "PUSH3 {}", r.name()),
            PopTryte(r) => write!(f, "POP {}", r.name()),
            PopTrint(r) => write!(f, "POP3 {}", r.name()),
            PeekTryte(r) => write!(f, "PEEK {}", r.name()),
            PeekTrint(r) => write!(f, "PEEK3 {}", r.name()),
            Print => write!(f, "PRINT"),
            SetModeTryte(r) => write!(f, "DSET {}", r.name()),
            SetModeTrint(r) => write!(f, "DSET {}", r.name()),
            SetModeImm { mode_digit } => write!(f, "DSET {}", mode_digit + 13),
            GetModeTryte(r) => write!(f, "DGET {}", r.name()),
            GetModeTrint(r) => write!(f, "DGET {}", r.name()),
            ShowTryte(r) => write!(f, "SHOW {}", r.name()),
            ShowTrint(r) => write!(f, "SHOW3 {}", r.name()),
            TellTryte(r) => write!(f, "TELL {}", r.name()),
            TellTrint(r) => write!(f, "TELL3 {}", r.name()),
            AddTrytes(x, y) => write!(f, "ADD {}, {}", x.name(), y.name()),
            SetTryte(x, y) => write!(f, "SET {}, {}", x.name(), y.name()),
            CmpTrytes(x, y) => write!(f, "CMP {}, {}", x.name(), y.name()),
            DivTrytes(x, y) => write!(f, "DIV {}, {}", x.name(), y.name()),
            MulTrytes(x, y) => write!(f, "MUL {}, {}", x.name(), y.name()),
            AndTrytes(x, y) => write!(f, "AND {}, {}", x.name(), y.name()),
            OrTrytes(x, y) => write!(f, "OR {}, {}", x.name(), y.name()),
            XorTrytes(x, y) => write!(f, "XOR {}, {}", x.name(), y.name()),
            SwapTrytes(x, y) => write!(f, "SWAP {}, {}", x.name(), y.name()),
            SetTrints(x, y) => write!(f, "SET3 {}, {}", x.name(), y.name()),
            CmpTrints(x, y) => write!(f, "CMP3 {}, {}", x.name(), y.name()),
            AddTrints(x, y) => write!(f, "ADD3 {}, {}", x.name(), y.name()),
            MulTrints(x, y) => write!(f, "MUL3 {}, {}", x.name(), y.name()),
            DivTrints(x, y) => write!(f, "DIV3 {}, {}", x.name(), y.name()),
            AndTrints(x, y) => write!(f, "AND3 {}, {}", x.name(), y.name()),
            OrTrints(x, y) => write!(f, "OR3 {}, {}", x.name(), y.name()),
            XorTrints(x, y) => write!(f, "XOR3 {}, {}", x.name(), y.name()),
            SwapTrints(x, y) => write!(f, "SWAP3 {}, {}", x.name(), y.name()),
            SetTrintImm(r) => write!(f, "SET3 {}, #", r.name()),
            AddTrintImm(r) => write!(f, "ADD3 {}, #", r.name()),
            CmpTrintImm(r) => write!(f, "CMP3 {}, #", r.name()),
            DivTrintImm(r) => write!(f, "DIV3 {}, #", r.name()),
            MulTrintImm(r) => write!(f, "MUL3 {}, #", r.name()),
            AndTrintImm(r) => write!(f, "AND3 {}, #", r.name()),
            OrTrintImm(r) => write!(f, "OR3 {}, #", r.name()),
            XorTrintImm(r) => write!(f, "XOR3 {}, #", r.name()),
            IncTrint(r) => write!(f, "INC3 {}", r.name()),
            DecTrint(r) => write!(f, "DEC3 {}", r.name()),
            AbsTrint(r) => write!(f, "ABS3 {}", r.name()),
            NotTrint(r) => write!(f, "NOT3 {}", r.name()),
            FlipTrint(r) => write!(f, "FLIP3 {}", r.name()),
            ShlTrint(r) => write!(f, "SHL3 {}, #", r.name()),
            ShrTrint(r) => write!(f, "SHR3 {}, #", r.name()),
            SetTryteImm(r) => write!(f, "SET {}, #", r.name()),
            AddTryteImm(r) => write!(f, "ADD {}, #", r.name()),
            CmpTryteImm(r) => write!(f, "CMP {}, #", r.name()),
            DivTryteImm(r) => write!(f, "DIV {}, #", r.name()),
            MulTryteImm(r) => write!(f, "MUL {}, #", r.name()),
            AndTryteImm(r) => write!(f, "AND {}, #", r.name()),
            OrTryteImm(r) => write!(f, "OR {}, #", r.name()),
            XorTryteImm(r) => write!(f, "XOR {}, #", r.name()),
            IncTryte(r) => write!(f, "INC {}", r.name()),
            DecTryte(r) => write!(f, "DEC {}", r.name()),
            AbsTryte(r) => write!(f, "ABS {}", r.name()),
            NotTryte(r) => write!(f, "NOT {}", r.name()),
            FlipTryte(r) => write!(f, "FLIP {}", r.name()),
            ShlTryte(r) => write!(f, "SHL {}, #", r.name()),
            ShrTryte(r) => write!(f, "SHR {}, #", r.name()),
            Float { raw } => match decode_float(*raw) {
                Ok(fop) => write!(f, "{}", fop),
                Err(_) => write!(f, "FPU? {}", raw),
            },
        }
    }
}

impl fmt::Display for FpuOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FpuOp::*;
        match self {
            Set(x, y) => write!(f, "SETF f{}, f{}", x.0 + 1, y.0 + 1),
            Cmp(x, y) => write!(f, "CMPF f{}, f{}", x.0 + 1, y.0 + 1),
            Add(x, y) => write!(f, "ADDF f{}, f{}", x.0 + 1, y.0 + 1),
            Mul(x, y) => write!(f, "MULF f{}, f{}", x.0 + 1, y.0 + 1),
            Div(x, y) => write!(f, "DIVF f{}, f{}", x.0 + 1, y.0 + 1),
            Swap(x, y) => write!(f, "SWAPF f{}, f{}", x.0 + 1, y.0 + 1),
            SetImm(r) => write!(f, "SETF f{}, #", r.0 + 1),
            AddImm(r) => write!(f, "ADDF f{}, #", r.0 + 1),
            MulImm(r) => write!(f, "MULF f{}, #", r.0 + 1),
            DivImm(r) => write!(f, "DIVF f{}, #", r.0 + 1),
            CmpImm(r) => write!(f, "CMPF f{}, #", r.0 + 1),
            ReadMem(r) => write!(f, "READF $, f{}", r.0 + 1),
            WriteMem(r) => write!(f, "WRITEF f{}, $", r.0 + 1),
            Push(r) => write!(f, "PUSHF f{}", r.0 + 1),
            Pop(r) => write!(f, "POPF f{}", r.0 + 1),
            Peek(r) => write!(f, "PEEKF f{}", r.0 + 1),
            Flip(r) => write!(f, "FLIPF f{}", r.0 + 1),
            Abs(r) => write!(f, "ABSF f{}", r.0 + 1),
            Show(r) => write!(f, "SHOWF f{}", r.0 + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Tryte {
        s.parse().unwrap()
    }

    #[test]
    fn decode_control_ops() {
        assert_eq!(decode(t("000")).unwrap(), Op::Halt);
        assert_eq!(decode(t("00a")).unwrap(), Op::Noop);
        assert_eq!(decode(t("00A")).unwrap(), Op::Wait);
        assert_eq!(decode(t("0a0")).unwrap(), Op::ClearCompare);
        assert_eq!(decode(t("0jj")).unwrap(), Op::Jump);
        assert_eq!(decode(t("0j0")).unwrap(), Op::JumpIfZero);
        // the jump group aliases of PJP and JPS
        assert_eq!(decode(t("0jM")).unwrap(), Op::PopJump);
        assert_eq!(decode(t("0jm")).unwrap(), Op::JumpStore);
    }

    #[test]
    fn decode_literal_operands() {
        // THD -13 targets vector 0
        assert_eq!(
            decode(t("0hM")).unwrap(),
            Op::ThreadSwitch { vector: 0 }
        );
        assert_eq!(
            decode(t("0h0")).unwrap(),
            Op::ThreadSwitch { vector: 13 }
        );
        assert_eq!(decode(t("0Im")).unwrap(), Op::SetPriority { priority: 13 });
        assert_eq!(decode(t("0mM")).unwrap(), Op::Mount { device: 0 });
    }

    #[test]
    fn decode_register_operands() {
        assert_eq!(
            decode(t("AML")).unwrap(),
            Op::AddTrytes(TryteReg(0), TryteReg(1))
        );
        assert_eq!(
            decode(t("B0a")).unwrap(),
            Op::SetTryte(TryteReg(13), TryteReg(14))
        );
        assert_eq!(decode(t("KbM")).unwrap(), Op::SetTryteImm(TryteReg(0)));
    }

    #[test]
    fn float_cells_are_forwarded_whole() {
        let cell = encode_float(&FpuOp::Add(FpuReg(0), FpuReg(1)));
        assert_eq!(decode(cell).unwrap(), Op::Float { raw: cell });
        assert_eq!(
            decode_float(cell).unwrap(),
            FpuOp::Add(FpuReg(0), FpuReg(1))
        );
    }

    #[test]
    fn invalid_opcode() {
        // 'm' is not a major group
        assert!(decode(t("m00")).is_err());
        assert!(decode_float(t("000")).is_err());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let ops = [
            Op::Halt,
            Op::Noop,
            Op::Wait,
            Op::ClearCompare,
            Op::ClearCarry,
            Op::ClearOverflow,
            Op::PopJump,
            Op::JumpStore,
            Op::CheckPriority,
            Op::ThreadSwitch { vector: 5 },
            Op::SetPriority { priority: -7 },
            Op::SetVector { vector: 26 },
            Op::Jump,
            Op::JumpIfZero,
            Op::JumpIfNeg,
            Op::JumpIfPos,
            Op::Mount { device: 1 },
            Op::ReadTryte(TryteReg(4)),
            Op::ReadTrint(TrintReg(3)),
            Op::WriteTryte(TryteReg(22)),
            Op::WriteTrint(TrintReg(8)),
            Op::Fill,
            Op::Load,
            Op::Save,
            Op::Where(TryteReg(7)),
            Op::PushTryte(TryteReg(0)),
            Op::PushTrint(TrintReg(0)),
            Op::PopTryte(TryteReg(26)),
            Op::PopTrint(TrintReg(4)),
            Op::PeekTryte(TryteReg(11)),
            Op::PeekTrint(TrintReg(6)),
            Op::Print,
            Op::SetModeTryte(TryteReg(2)),
            Op::SetModeTrint(TrintReg(2)),
            Op::SetModeImm { mode_digit: -11 },
            Op::GetModeTryte(TryteReg(9)),
            Op::GetModeTrint(TrintReg(1)),
            Op::ShowTryte(TryteReg(3)),
            Op::ShowTrint(TrintReg(5)),
            Op::TellTryte(TryteReg(14)),
            Op::TellTrint(TrintReg(7)),
            Op::AddTrytes(TryteReg(0), TryteReg(1)),
            Op::SetTryte(TryteReg(25), TryteReg(2)),
            Op::CmpTrytes(TryteReg(13), TryteReg(12)),
            Op::DivTrytes(TryteReg(6), TryteReg(7)),
            Op::MulTrytes(TryteReg(8), TryteReg(9)),
            Op::AndTrytes(TryteReg(10), TryteReg(11)),
            Op::OrTrytes(TryteReg(1), TryteReg(0)),
            Op::XorTrytes(TryteReg(20), TryteReg(21)),
            Op::SwapTrytes(TryteReg(5), TryteReg(18)),
            Op::SetTrints(TrintReg(0), TrintReg(1)),
            Op::CmpTrints(TrintReg(2), TrintReg(3)),
            Op::AddTrints(TrintReg(4), TrintReg(5)),
            Op::MulTrints(TrintReg(6), TrintReg(7)),
            Op::DivTrints(TrintReg(8), TrintReg(0)),
            Op::AndTrints(TrintReg(1), TrintReg(2)),
            Op::OrTrints(TrintReg(3), TrintReg(4)),
            Op::XorTrints(TrintReg(5), TrintReg(6)),
            Op::SwapTrints(TrintReg(7), TrintReg(8)),
            Op::SetTrintImm(TrintReg(0)),
            Op::AddTrintImm(TrintReg(1)),
            Op::CmpTrintImm(TrintReg(2)),
            Op::DivTrintImm(TrintReg(3)),
            Op::MulTrintImm(TrintReg(4)),
            Op::AndTrintImm(TrintReg(5)),
            Op::OrTrintImm(TrintReg(6)),
            Op::XorTrintImm(TrintReg(7)),
            Op::IncTrint(TrintReg(8)),
            Op::DecTrint(TrintReg(0)),
            Op::AbsTrint(TrintReg(1)),
            Op::NotTrint(TrintReg(2)),
            Op::FlipTrint(TrintReg(3)),
            Op::ShlTrint(TrintReg(4)),
            Op::ShrTrint(TrintReg(5)),
            Op::SetTryteImm(TryteReg(0)),
            Op::AddTryteImm(TryteReg(1)),
            Op::CmpTryteImm(TryteReg(2)),
            Op::DivTryteImm(TryteReg(3)),
            Op::MulTryteImm(TryteReg(4)),
            Op::AndTryteImm(TryteReg(5)),
            Op::OrTryteImm(TryteReg(6)),
            Op::XorTryteImm(TryteReg(7)),
            Op::IncTryte(TryteReg(8)),
            Op::DecTryte(TryteReg(9)),
            Op::AbsTryte(TryteReg(10)),
            Op::NotTryte(TryteReg(11)),
            Op::FlipTryte(TryteReg(12)),
            Op::ShlTryte(TryteReg(13)),
            Op::ShrTryte(TryteReg(14)),
        ];
        for op in ops {
            let cell = encode(&op);
            assert_eq!(decode(cell).unwrap(), op, "via cell {}", cell);
        }
    }

    #[test]
    fn encode_decode_float_roundtrip() {
        let ops = [
            FpuOp::Set(FpuReg(0), FpuReg(1)),
            FpuOp::Cmp(FpuReg(2), FpuReg(3)),
            FpuOp::Add(FpuReg(4), FpuReg(5)),
            FpuOp::Mul(FpuReg(6), FpuReg(7)),
            FpuOp::Div(FpuReg(8), FpuReg(0)),
            FpuOp::Swap(FpuReg(1), FpuReg(2)),
            FpuOp::SetImm(FpuReg(3)),
            FpuOp::AddImm(FpuReg(4)),
            FpuOp::MulImm(FpuReg(5)),
            FpuOp::DivImm(FpuReg(6)),
            FpuOp::CmpImm(FpuReg(7)),
            FpuOp::ReadMem(FpuReg(8)),
            FpuOp::WriteMem(FpuReg(0)),
            FpuOp::Push(FpuReg(1)),
            FpuOp::Pop(FpuReg(2)),
            FpuOp::Peek(FpuReg(3)),
            FpuOp::Flip(FpuReg(4)),
            FpuOp::Abs(FpuReg(5)),
            FpuOp::Show(FpuReg(6)),
        ];
        for op in ops {
            let cell = encode_float(&op);
            assert_eq!(decode_float(cell).unwrap(), op, "via cell {}", cell);
            // the CPU-level decoder forwards every float cell
            assert_eq!(decode(cell).unwrap(), Op::Float { raw: cell });
        }
    }

    #[test]
    fn widths() {
        assert_eq!(Op::Halt.width(), 1);
        assert_eq!(Op::Jump.width(), 2);
        assert_eq!(Op::Print.width(), 3);
        assert_eq!(Op::Fill.width(), 4);
        assert_eq!(Op::SetTrintImm(TrintReg(0)).width(), 4);
        assert_eq!(Op::SetTryteImm(TryteReg(0)).width(), 2);
        assert_eq!(FpuOp::SetImm(FpuReg(0)).width(), 4);
        assert_eq!(FpuOp::Push(FpuReg(0)).width(), 1);
    }
}
