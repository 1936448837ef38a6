//! Wide balanced ternary integers.
//!
//! A `Trint<N>` is N trytes, most significant first, giving a signed range
//! of +/-(3^(9N) - 1)/2. The machine uses N = 1..4: `Trint<3>` for the wide
//! registers, `Trint<2>` for float mantissas, `Trint<4>` as scratch width
//! for float multiply/divide. All arithmetic is built from the tryte
//! primitives; nothing here falls back to host-integer carry handling.

use crate::ternary::{DivideByZero, ParseError, Tryte, Trit};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// An N-tryte balanced ternary integer, most significant tryte first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trint<const N: usize> {
    trytes: [Tryte; N],
}

impl<const N: usize> Trint<N> {
    /// Total width in trits.
    pub const WIDTH: usize = 9 * N;

    /// The zero value.
    pub const ZERO: Trint<N> = Trint {
        trytes: [Tryte::ZERO; N],
    };

    /// Build from an array of trytes, most significant first.
    #[inline]
    pub const fn from_trytes(trytes: [Tryte; N]) -> Self {
        Self { trytes }
    }

    /// The component trytes, most significant first.
    #[inline]
    pub const fn trytes(&self) -> &[Tryte; N] {
        &self.trytes
    }

    /// Get a component tryte (0 = most significant).
    #[inline]
    pub const fn tryte(&self, index: usize) -> Tryte {
        self.trytes[index]
    }

    /// Set a component tryte (0 = most significant).
    #[inline]
    pub fn set_tryte(&mut self, index: usize, tryte: Tryte) {
        self.trytes[index] = tryte;
    }

    /// Create from an integer, wrapping into the representable range.
    pub fn from_int(value: i64) -> Self {
        let mut trytes = [Tryte::ZERO; N];
        let mut v = value;
        for i in (0..N).rev() {
            let tryte = Tryte::from_int(v);
            trytes[i] = tryte;
            v = (v - tryte.value() as i64) / Tryte::RADIX;
        }
        Self { trytes }
    }

    /// The exact integer value (N <= 4 fits in an i64).
    pub fn value(&self) -> i64 {
        let mut result: i64 = 0;
        for tryte in self.trytes {
            result = result * Tryte::RADIX + tryte.value() as i64;
        }
        result
    }

    /// Get a single trit by its global position (0 = least significant
    /// trit of the whole value).
    #[inline]
    pub fn trit(&self, position: usize) -> Trit {
        self.trytes[N - 1 - position / 9].trit(position % 9)
    }

    /// Set a single trit by its global position.
    #[inline]
    pub fn set_trit(&mut self, position: usize, trit: Trit) {
        self.trytes[N - 1 - position / 9].set_trit(position % 9, trit);
    }

    /// True if every trit is zero.
    pub fn is_zero(&self) -> bool {
        self.trytes.iter().all(|t| t.is_zero())
    }

    /// The most significant non-zero trit, or O for zero.
    pub fn sign(&self) -> Trit {
        for tryte in self.trytes {
            let s = tryte.sign();
            if !s.is_zero() {
                return s;
            }
        }
        Trit::O
    }

    /// Significant length in trits across the whole width.
    pub fn length(&self) -> usize {
        for (i, tryte) in self.trytes.iter().enumerate() {
            let len = tryte.length();
            if len > 0 {
                return 9 * (N - 1 - i) + len;
            }
        }
        0
    }

    /// Negate every tryte.
    pub fn neg(&self) -> Self {
        let mut trytes = self.trytes;
        for t in trytes.iter_mut() {
            *t = t.neg();
        }
        Self { trytes }
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        if self.sign() == Trit::N {
            self.neg()
        } else {
            *self
        }
    }

    /// Add, returning the wrapped sum and the final carry tryte.
    pub fn overflowing_add(&self, other: &Self) -> (Self, Tryte) {
        let mut out = Self::ZERO;
        let mut carry = Tryte::ZERO;
        for i in (0..N).rev() {
            let (c, sum) = Tryte::add_with_carry(&self.trytes[i], &other.trytes[i], &carry);
            out.trytes[i] = sum;
            carry = c;
        }
        (out, carry)
    }

    /// Multiply by a single tryte: partial products via
    /// [`Tryte::mul_with_carry`], with the high trytes carried one
    /// position up.
    pub fn mul_by_tryte(&self, t: &Tryte) -> Self {
        let mut lows = Self::ZERO;
        let mut highs = Self::ZERO;
        for i in (0..N).rev() {
            let (high, low) = Tryte::mul_with_carry(&self.trytes[i], t);
            lows.trytes[i] = low;
            if i > 0 {
                highs.trytes[i - 1] = high;
            }
        }
        lows + highs
    }

    /// Balanced ternary long division: `(quotient, remainder)` with
    /// `x == q * y + r`.
    ///
    /// The divisor is aligned against the dividend by the difference of
    /// their significant lengths; at each shift the candidate among
    /// {remainder - (y << s), remainder, remainder + (y << s)} with the
    /// smallest magnitude wins, and the matching +/-3^s lands in the
    /// quotient.
    pub fn div(x: &Self, y: &Self) -> Result<(Self, Self), DivideByZero> {
        if y.is_zero() {
            return Err(DivideByZero);
        }

        let mut rem = *x;
        let mut quot = Self::ZERO;
        // one position above the length difference: the quotient's leading
        // digit can land there when the dividend's head outweighs the
        // divisor's
        let mut shift =
            (x.length() as i64 - y.length() as i64 + 1).min(Self::WIDTH as i64 - 1);

        while shift >= 0 {
            let s = shift as usize;
            let cand = *y << s;
            let choices = [(rem + cand, Trit::N), (rem - cand, Trit::P), (rem, Trit::O)];
            // ties fall to the later entries, so "leave alone" wins them
            let (best, digit) = choices
                .into_iter()
                .min_by(|a, b| a.0.abs().cmp(&b.0.abs()))
                .unwrap();
            rem = best;
            if !digit.is_zero() {
                let mut power = Self::ZERO;
                power.set_trit(s, digit);
                quot += power;
            }
            shift -= 1;
        }

        Ok((quot, rem))
    }

    /// Zero-extend or truncate to a different width. Extension pads most
    /// significant trytes with zero; truncation drops them.
    pub fn resize<const M: usize>(&self) -> Trint<M> {
        let mut out = Trint::<M>::ZERO;
        if M >= N {
            for i in 0..N {
                out.set_tryte(M - N + i, self.trytes[i]);
            }
        } else {
            for i in 0..M {
                out.set_tryte(i, self.trytes[N - M + i]);
            }
        }
        out
    }

    /// Concatenated base-27 string of all component trytes.
    pub fn base27_string(&self) -> String {
        self.trytes.iter().map(|t| t.base27_string()).collect()
    }

    /// Concatenated ternary string of all component trytes.
    pub fn ternary_string(&self) -> String {
        self.trytes.iter().map(|t| t.ternary_string()).collect()
    }
}

impl<const N: usize> Default for Trint<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> From<Tryte> for Trint<N> {
    /// Widen a single tryte (it lands in the least significant slot).
    fn from(tryte: Tryte) -> Self {
        let mut out = Self::ZERO;
        out.trytes[N - 1] = tryte;
        out
    }
}

impl<const N: usize> std::ops::Add for Trint<N> {
    type Output = Self;

    /// Wrapping addition (the final carry is discarded).
    fn add(self, other: Self) -> Self {
        self.overflowing_add(&other).0
    }
}

impl<const N: usize> std::ops::AddAssign for Trint<N> {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl<const N: usize> std::ops::Neg for Trint<N> {
    type Output = Self;

    fn neg(self) -> Self {
        Trint::neg(&self)
    }
}

impl<const N: usize> std::ops::Sub for Trint<N> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl<const N: usize> std::ops::SubAssign for Trint<N> {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl<const N: usize> std::ops::Mul for Trint<N> {
    type Output = Self;

    /// Schoolbook multiplication: each tryte of the multiplier against the
    /// whole multiplicand, shifted a tryte width per position and summed.
    fn mul(self, other: Self) -> Self {
        let mut out = Self::ZERO;
        for i in 0..N {
            let partial = self.mul_by_tryte(&other.trytes[i]) << (9 * (N - 1 - i));
            out += partial;
        }
        out
    }
}

impl<const N: usize> std::ops::MulAssign for Trint<N> {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl<const N: usize> std::ops::BitAnd for Trint<N> {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        let mut out = self;
        for i in 0..N {
            out.trytes[i] = self.trytes[i] & other.trytes[i];
        }
        out
    }
}

impl<const N: usize> std::ops::BitOr for Trint<N> {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        let mut out = self;
        for i in 0..N {
            out.trytes[i] = self.trytes[i] | other.trytes[i];
        }
        out
    }
}

impl<const N: usize> std::ops::BitXor for Trint<N> {
    type Output = Self;

    fn bitxor(self, other: Self) -> Self {
        let mut out = self;
        for i in 0..N {
            out.trytes[i] = self.trytes[i] ^ other.trytes[i];
        }
        out
    }
}

impl<const N: usize> std::ops::Not for Trint<N> {
    type Output = Self;

    fn not(self) -> Self {
        self.neg()
    }
}

impl<const N: usize> std::ops::Shl<usize> for Trint<N> {
    type Output = Self;

    /// Trit shift across the full width toward the most significant end.
    fn shl(self, k: usize) -> Self {
        if k >= Self::WIDTH {
            return Self::ZERO;
        }
        let mut out = Self::ZERO;
        for p in k..Self::WIDTH {
            out.set_trit(p, self.trit(p - k));
        }
        out
    }
}

impl<const N: usize> std::ops::Shr<usize> for Trint<N> {
    type Output = Self;

    /// Trit shift across the full width toward the least significant end.
    fn shr(self, k: usize) -> Self {
        if k >= Self::WIDTH {
            return Self::ZERO;
        }
        let mut out = Self::ZERO;
        for p in k..Self::WIDTH {
            out.set_trit(p - k, self.trit(p));
        }
        out
    }
}

impl<const N: usize> PartialOrd for Trint<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for Trint<N> {
    /// Most-significant-tryte-first comparison; because a tryte outweighs
    /// the whole tail below it, this is exactly numeric order.
    fn cmp(&self, other: &Self) -> Ordering {
        for i in 0..N {
            match self.trytes[i].cmp(&other.trytes[i]) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl<const N: usize> fmt::Display for Trint<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base27_string())
    }
}

impl<const N: usize> fmt::Debug for Trint<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trint<{}>({} = {})", N, self.base27_string(), self.value())
    }
}

impl<const N: usize> FromStr for Trint<N> {
    type Err = ParseError;

    /// Parse 3N base-27 characters or 9N ternary characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chunk = if s.len() == 3 * N {
            3
        } else if s.len() == 9 * N {
            9
        } else {
            return Err(ParseError::WrongLength {
                expected: 3 * N,
                got: s.len(),
            });
        };

        let mut trytes = [Tryte::ZERO; N];
        for i in 0..N {
            trytes[i] = s[i * chunk..(i + 1) * chunk].parse()?;
        }
        Ok(Self { trytes })
    }
}

impl<const N: usize> Serialize for Trint<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.base27_string())
    }
}

impl<'de, const N: usize> Deserialize<'de> for Trint<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        for v in [
            -193_710_244i64,
            -19_683,
            -9842,
            -42,
            0,
            42,
            9842,
            19_683,
            193_710_244,
        ] {
            assert_eq!(Trint::<3>::from_int(v).value(), v);
        }
        assert_eq!(Trint::<1>::from_int(9841).value(), 9841);
    }

    #[test]
    fn addition() {
        let a = Trint::<3>::from_int(123_456);
        let b = Trint::<3>::from_int(-56_789);
        assert_eq!((a + b).value(), 66_667);

        // carry propagates across tryte boundaries
        let c = Trint::<2>::from_int(9841);
        assert_eq!((c + Trint::from_int(1)).value(), 9842);
    }

    #[test]
    fn overflowing_add_reports_carry() {
        let max = Trint::<2>::from_int((Tryte::RADIX * Tryte::RADIX - 1) / 2);
        let (wrapped, carry) = max.overflowing_add(&Trint::from_int(1));
        assert_eq!(carry.value(), 1);
        assert_eq!(wrapped.value(), -(Tryte::RADIX * Tryte::RADIX - 1) / 2);
    }

    #[test]
    fn multiplication() {
        let a = Trint::<3>::from_int(12_345);
        let b = Trint::<3>::from_int(6789);
        assert_eq!((a * b).value(), 83_810_205);

        let neg = Trint::<3>::from_int(-1000);
        assert_eq!((neg * Trint::from_int(1000)).value(), -1_000_000);

        // single-tryte partials agree with the full product
        let c = Trint::<2>::from_int(250_000);
        assert_eq!(c.mul_by_tryte(&Tryte::from_int(77)).value(), 19_250_000);
    }

    #[test]
    fn division() {
        let (q, r) = Trint::<3>::div(
            &Trint::from_int(1_000_000),
            &Trint::from_int(1234),
        )
        .unwrap();
        assert_eq!(q.value() * 1234 + r.value(), 1_000_000);
        assert!(r.value().abs() <= 1234);

        let (q, r) = Trint::<2>::div(&Trint::from_int(81), &Trint::from_int(27)).unwrap();
        assert_eq!((q.value(), r.value()), (3, 0));

        let (q, r) = Trint::<2>::div(&Trint::from_int(11), &Trint::from_int(3)).unwrap();
        assert_eq!((q.value(), r.value()), (4, -1));
    }

    #[test]
    fn division_by_zero_leaves_operands() {
        let a = Trint::<3>::from_int(555);
        let b = Trint::<3>::ZERO;
        assert_eq!(Trint::div(&a, &b), Err(DivideByZero));
        // operands are borrowed, untouched by the failed call
        assert_eq!(a.value(), 555);
        assert_eq!(b.value(), 0);
    }

    #[test]
    fn shifts_cross_tryte_boundaries() {
        let one = Trint::<2>::from_int(1);
        assert_eq!((one << 9).value(), Tryte::RADIX);
        assert_eq!((one << 17).value(), 129_140_163);
        assert_eq!((one << 18).value(), 0);
        assert_eq!((Trint::<2>::from_int(Tryte::RADIX) >> 9).value(), 1);
    }

    #[test]
    fn ordering_is_numeric() {
        let values = [-193_710_244i64, -19_683, -1, 0, 1, 9841, 9842, 193_710_244];
        for &a in &values {
            for &b in &values {
                assert_eq!(
                    Trint::<3>::from_int(a).cmp(&Trint::<3>::from_int(b)),
                    a.cmp(&b),
                    "{} vs {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn length_and_sign() {
        assert_eq!(Trint::<2>::ZERO.length(), 0);
        assert_eq!(Trint::<2>::from_int(1).length(), 1);
        assert_eq!(Trint::<2>::from_int(Tryte::RADIX).length(), 10);
        assert_eq!(Trint::<2>::from_int(-5).sign(), Trit::N);
    }

    #[test]
    fn resize_round_trips_small_values() {
        let a = Trint::<2>::from_int(12_345);
        assert_eq!(a.resize::<4>().value(), 12_345);
        assert_eq!(a.resize::<4>().resize::<2>(), a);
        // truncation keeps the least significant trytes
        let big = Trint::<2>::from_int(Tryte::RADIX + 7);
        assert_eq!(big.resize::<1>().value(), 7);
    }

    #[test]
    fn string_forms() {
        let a = Trint::<2>::from_int(1000);
        assert_eq!(a.base27_string(), "000aja");
        assert_eq!("000aja".parse::<Trint<2>>().unwrap(), a);
        assert_eq!(a.ternary_string().parse::<Trint<2>>().unwrap(), a);
    }
}
