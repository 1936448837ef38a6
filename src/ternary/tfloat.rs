//! Ternary floating point.
//!
//! A `TFloat` is a power-of-3 exponent (`Trint<1>`) and an 18-trit
//! mantissa (`Trint<2>`); the value is `mantissa / 3^17 * 3^exponent`.
//! A normalised finite value keeps the leading mantissa tryte at magnitude
//! 3281 or more (the mantissa fraction sits in [1/2, 3/2]); zero is all
//! zeroes. The exponent value 9841 is reserved for the sentinels: mantissa
//! +1 is +infinity, -1 is -infinity, 0 is NaN. Sentinels are never
//! normalised.

use crate::ternary::{DivideByZero, ParseError, Trint, Trit};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Reserved exponent marking infinity and NaN.
const EXP_SPECIAL: i64 = 9841;

/// Largest finite exponent.
const EXP_MAX: i64 = 9840;

/// Smallest finite exponent; anything below flushes to zero.
const EXP_MIN: i64 = -9841;

/// Minimum magnitude of the leading mantissa tryte of a normalised value.
const NORM_LEAD: i16 = 3281;

/// Trit width of the mantissa.
const MANT_WIDTH: usize = 18;

/// A balanced ternary floating point value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TFloat {
    exponent: Trint<1>,
    mantissa: Trint<2>,
}

impl TFloat {
    /// Positive zero (the only zero).
    pub const ZERO: TFloat = TFloat {
        exponent: Trint::ZERO,
        mantissa: Trint::ZERO,
    };

    /// Not-a-number.
    pub fn nan() -> Self {
        Self {
            exponent: Trint::from_int(EXP_SPECIAL),
            mantissa: Trint::ZERO,
        }
    }

    /// Signed infinity. A zero sign trit gives NaN.
    pub fn infinity(sign: Trit) -> Self {
        Self {
            exponent: Trint::from_int(EXP_SPECIAL),
            mantissa: Trint::from_int(sign.to_i8() as i64),
        }
    }

    /// Build from raw parts, normalising unless the exponent is the
    /// reserved sentinel value (in which case the mantissa sign picks
    /// between the infinities and NaN).
    pub fn new(exponent: Trint<1>, mantissa: Trint<2>) -> Self {
        if exponent.value() == EXP_SPECIAL {
            return match mantissa.sign() {
                Trit::O => Self::nan(),
                s => Self::infinity(s),
            };
        }
        Self::from_parts(exponent.value(), mantissa)
    }

    /// Normalise `(exponent, mantissa)` into canonical form: grow the
    /// mantissa until its leading tryte carries a significant digit,
    /// flush to zero on exponent underflow, overflow to signed infinity.
    fn from_parts(mut exponent: i64, mut mantissa: Trint<2>) -> Self {
        if mantissa.is_zero() {
            return Self::ZERO;
        }
        while mantissa.tryte(0).value().abs() < NORM_LEAD {
            mantissa = mantissa << 1;
            exponent -= 1;
        }
        if exponent < EXP_MIN {
            Self::ZERO
        } else if exponent > EXP_MAX {
            Self::infinity(mantissa.sign())
        } else {
            Self {
                exponent: Trint::from_int(exponent),
                mantissa,
            }
        }
    }

    /// The exponent component.
    pub fn exponent(&self) -> Trint<1> {
        self.exponent
    }

    /// The mantissa component.
    pub fn mantissa(&self) -> Trint<2> {
        self.mantissa
    }

    /// True for the NaN sentinel.
    pub fn is_nan(&self) -> bool {
        self.exponent.value() == EXP_SPECIAL && self.mantissa.is_zero()
    }

    /// True for either infinity.
    pub fn is_infinite(&self) -> bool {
        self.exponent.value() == EXP_SPECIAL && !self.mantissa.is_zero()
    }

    /// True for zero.
    pub fn is_zero(&self) -> bool {
        self.exponent.value() != EXP_SPECIAL && self.mantissa.is_zero()
    }

    /// The sign trit of the value (mantissa sign, O for zero and NaN).
    pub fn sign(&self) -> Trit {
        self.mantissa.sign()
    }

    /// Flip the sign. NaN stays NaN.
    pub fn neg(&self) -> Self {
        Self {
            exponent: self.exponent,
            mantissa: self.mantissa.neg(),
        }
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        if self.sign() == Trit::N {
            self.neg()
        } else {
            *self
        }
    }

    /// Convert from a double: pull the value into [1/2, 3/2] with powers
    /// of 3, then expand the scaled value trit by trit into the mantissa.
    pub fn from_f64(d: f64) -> Self {
        if d.is_nan() {
            return Self::nan();
        }
        if d.is_infinite() {
            return Self::infinity(if d > 0.0 { Trit::P } else { Trit::N });
        }
        if d == 0.0 {
            return Self::ZERO;
        }

        let mut d = d;
        let mut exponent: i64 = 0;
        while d.abs() > 1.5 {
            d /= 3.0;
            exponent += 1;
        }
        while d.abs() < 0.5 {
            d *= 3.0;
            exponent -= 1;
        }

        // greedy expansion: at each fractional position pick the trit that
        // brings the running estimate closest to d
        let mut mantissa = Trint::<2>::ZERO;
        let mut estimate = 0.0f64;
        let mut weight = 1.0f64;
        for position in (0..MANT_WIDTH).rev() {
            let candidates = [
                (estimate - weight, Trit::N),
                (estimate, Trit::O),
                (estimate + weight, Trit::P),
            ];
            let (best, trit) = candidates
                .into_iter()
                .min_by(|a, b| {
                    (a.0 - d)
                        .abs()
                        .partial_cmp(&(b.0 - d).abs())
                        .unwrap_or(Ordering::Equal)
                })
                .unwrap();
            estimate = best;
            mantissa.set_trit(position, trit);
            weight /= 3.0;
        }

        Self::from_parts(exponent, mantissa)
    }

    /// Approximate double value. NaN and the infinities map to their IEEE
    /// counterparts.
    pub fn to_f64(&self) -> f64 {
        if self.is_nan() {
            return f64::NAN;
        }
        if self.is_infinite() {
            return match self.sign() {
                Trit::P => f64::INFINITY,
                _ => f64::NEG_INFINITY,
            };
        }
        self.mantissa.value() as f64 * 3.0f64.powi(self.exponent.value() as i32 - 17)
    }

    /// Add the mantissas of two exponent-aligned operands and fold any
    /// carry back in by shifting and bumping the exponent.
    fn add_aligned(exponent: i64, a: &Trint<2>, b: &Trint<2>) -> Self {
        let (sum, carry) = a.overflowing_add(b);
        if carry.is_zero() {
            return Self::from_parts(exponent, sum);
        }
        let carry_len = carry.length();
        let wide = Trint::<3>::from_trytes([carry, sum.tryte(0), sum.tryte(1)]);
        let shifted = wide >> carry_len;
        Self::from_parts(exponent + carry_len as i64, shifted.resize::<2>())
    }
}

impl std::ops::Add for TFloat {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        if self.is_nan() || other.is_nan() {
            return Self::nan();
        }
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => {
                return if self.sign() == other.sign() {
                    self
                } else {
                    Self::nan()
                }
            }
            (true, false) => return self,
            (false, true) => return other,
            (false, false) => {}
        }
        if self.is_zero() {
            return other;
        }
        if other.is_zero() {
            return self;
        }

        let ea = self.exponent.value() as i64;
        let eb = other.exponent.value() as i64;
        let diff = ea - eb;
        if diff > MANT_WIDTH as i64 {
            // other is too small to register
            return self;
        }
        if diff < -(MANT_WIDTH as i64) {
            return other;
        }

        if diff >= 0 {
            let aligned = other.mantissa >> diff as usize;
            Self::add_aligned(ea, &self.mantissa, &aligned)
        } else {
            let aligned = self.mantissa >> (-diff) as usize;
            Self::add_aligned(eb, &aligned, &other.mantissa)
        }
    }
}

impl std::ops::Sub for TFloat {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + other.neg()
    }
}

impl std::ops::Neg for TFloat {
    type Output = Self;

    fn neg(self) -> Self {
        TFloat::neg(&self)
    }
}

impl std::ops::Mul for TFloat {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        if self.is_nan() || other.is_nan() {
            return Self::nan();
        }
        if (self.is_zero() && other.is_infinite()) || (self.is_infinite() && other.is_zero()) {
            return Self::nan();
        }
        if self.is_infinite() || other.is_infinite() {
            return Self::infinity(self.sign().mul(other.sign()));
        }
        if self.is_zero() || other.is_zero() {
            return Self::ZERO;
        }

        // widen, multiply exactly, then shift the product back down to the
        // mantissa width; the dropped trits become exponent
        let product = self.mantissa.resize::<4>() * other.mantissa.resize::<4>();
        let shift = product.length().saturating_sub(MANT_WIDTH);
        let mantissa = (product >> shift).resize::<2>();
        let exponent =
            self.exponent.value() as i64 + other.exponent.value() as i64 + shift as i64 - 17;
        Self::from_parts(exponent, mantissa)
    }
}

impl std::ops::Div for TFloat {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        if self.is_nan() || other.is_nan() {
            return Self::nan();
        }
        if self.is_infinite() {
            return if other.is_infinite() {
                Self::nan()
            } else if other.is_zero() {
                Self::infinity(self.sign())
            } else {
                Self::infinity(self.sign().mul(other.sign()))
            };
        }
        if other.is_infinite() {
            return Self::ZERO;
        }
        if other.is_zero() {
            // x/0 is the signed infinity of x; 0/0 is NaN
            return match self.sign() {
                Trit::O => Self::nan(),
                s => Self::infinity(s),
            };
        }
        if self.is_zero() {
            return Self::ZERO;
        }

        // left-shift the numerator to full scratch width for precision
        let numerator = self.mantissa.resize::<4>();
        let headroom = Trint::<4>::WIDTH - numerator.length();
        let numerator = numerator << headroom;
        let denominator = other.mantissa.resize::<4>();
        let (quotient, _rem) = match Trint::<4>::div(&numerator, &denominator) {
            Ok(qr) => qr,
            Err(DivideByZero) => unreachable!("zero divisor handled above"),
        };

        let shift = quotient.length().saturating_sub(MANT_WIDTH);
        let mantissa = (quotient >> shift).resize::<2>();
        let exponent = self.exponent.value() as i64 - other.exponent.value() as i64
            - headroom as i64
            + shift as i64
            + 17;
        Self::from_parts(exponent, mantissa)
    }
}

impl PartialOrd for TFloat {
    /// Sign first, then exponent (reversed below zero), then mantissa.
    /// NaN is unordered against everything except a bit-identical NaN —
    /// equality here is structural, not IEEE.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.is_nan() || other.is_nan() {
            return None;
        }

        let sa = self.sign().to_i8();
        let sb = other.sign().to_i8();
        if sa != sb {
            return Some(sa.cmp(&sb));
        }

        // same sign, not structurally equal
        if self.is_infinite() {
            // other is finite with the same sign
            return Some(if sa > 0 {
                Ordering::Greater
            } else {
                Ordering::Less
            });
        }
        if other.is_infinite() {
            return Some(if sa > 0 {
                Ordering::Less
            } else {
                Ordering::Greater
            });
        }

        let exp_order = self.exponent.cmp(&other.exponent);
        let exp_order = if sa < 0 { exp_order.reverse() } else { exp_order };
        match exp_order {
            Ordering::Equal => Some(self.mantissa.cmp(&other.mantissa)),
            unequal => Some(unequal),
        }
    }
}

impl fmt::Display for TFloat {
    /// Exponent then mantissa, base-27: `1.0` is `000i00000`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.exponent.base27_string(),
            self.mantissa.base27_string()
        )
    }
}

impl fmt::Debug for TFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TFloat({} ~ {})", self, self.to_f64())
    }
}

impl FromStr for TFloat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 9 {
            return Err(ParseError::WrongLength {
                expected: 9,
                got: s.len(),
            });
        }
        let exponent: Trint<1> = s[0..3].parse()?;
        let mantissa: Trint<2> = s[3..9].parse()?;
        Ok(Self::new(exponent, mantissa))
    }
}

impl Serialize for TFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl Default for TFloat {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<f64> for TFloat {
    fn from(d: f64) -> Self {
        Self::from_f64(d)
    }
}
