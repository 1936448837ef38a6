//! Balanced ternary number system primitives.
//!
//! The numeric tower, leaf first:
//! - [`Trit`] - a single balanced ternary digit (-1, 0, +1)
//! - [`Tryte`] - the 9-trit machine cell, range +/-9841
//! - [`Trint`] - N concatenated trytes forming a wider integer
//! - [`TFloat`] - exponent + mantissa ternary floating point

mod tfloat;
mod trint;
mod trit;
mod tryte;

pub use tfloat::TFloat;
pub use trint::Trint;
pub use trit::Trit;
pub use tryte::{DivideByZero, ParseError, Tryte};

pub(crate) use tryte::SEPTAVINGT_CHARS;
