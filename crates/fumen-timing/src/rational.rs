use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Rem, Sub, SubAssign};
use std::str::FromStr;
use std::time::Duration;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseRationalError;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Exact rational number used for every beat and time value.
///
/// Always stored in lowest terms with a positive denominator, so equality
/// and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RationalTime(BigRational);

impl RationalTime {
    /// Create `numer / denom`, reduced to lowest terms.
    ///
    /// # Panics
    /// Panics if `denom` is zero. Use [`RationalTime::checked_new`] for
    /// untrusted input.
    pub fn new(numer: impl Into<BigInt>, denom: impl Into<BigInt>) -> Self {
        Self(BigRational::new(numer.into(), denom.into()))
    }

    /// Create `numer / denom`, or `None` when `denom` is zero.
    pub fn checked_new(numer: impl Into<BigInt>, denom: impl Into<BigInt>) -> Option<Self> {
        let denom = denom.into();
        if denom.is_zero() {
            return None;
        }
        Some(Self(BigRational::new(numer.into(), denom)))
    }

    pub fn zero() -> Self {
        Self(BigRational::zero())
    }

    pub fn one() -> Self {
        Self(BigRational::one())
    }

    pub fn numer(&self) -> &BigInt {
        self.0.numer()
    }

    pub fn denom(&self) -> &BigInt {
        self.0.denom()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Largest integer not greater than `self`.
    pub fn floor(&self) -> Self {
        Self(self.0.floor())
    }

    /// Smallest integer not less than `self`.
    pub fn ceil(&self) -> Self {
        Self(self.0.ceil())
    }

    /// Nearest integer, halves rounded away from zero.
    pub fn round(&self) -> Self {
        Self(self.0.round())
    }

    /// Euclidean remainder: the result is always in `[0, |rhs|)`.
    ///
    /// # Panics
    /// Panics if `rhs` is zero.
    pub fn rem_euclid(&self, rhs: &Self) -> Self {
        let modulus = rhs.0.abs();
        let quotient = (&self.0 / &modulus).floor();
        Self(&self.0 - modulus * quotient)
    }

    /// The integer part after [`RationalTime::floor`], if it fits an `i64`.
    pub fn floor_to_i64(&self) -> Option<i64> {
        self.0.floor().to_integer().to_i64()
    }

    /// The nearest integer, if it fits an `i64`.
    pub fn round_to_i64(&self) -> Option<i64> {
        self.0.round().to_integer().to_i64()
    }

    /// Lossy conversion, only meant for handing values to audio or display
    /// code that needs a float.
    pub fn to_f64(&self) -> f64 {
        if let Some(value) = self.0.to_f64() {
            return value;
        }
        let numer = self.0.numer().to_f64().unwrap_or(f64::NAN);
        let denom = self.0.denom().to_f64().unwrap_or(f64::NAN);
        numer / denom
    }

    /// Exact value of a finite float (every finite `f64` is a dyadic
    /// rational). Returns `None` for NaN and infinities.
    pub fn from_f64_exact(value: f64) -> Option<Self> {
        BigRational::from_float(value).map(Self)
    }

    /// Closest multiple of `1 / max_denominator`. Returns `None` for NaN and
    /// infinities or a zero denominator.
    pub fn from_f64_approx(value: f64, max_denominator: u32) -> Option<Self> {
        if !value.is_finite() || max_denominator == 0 {
            return None;
        }
        let scaled = (value * f64::from(max_denominator)).round();
        let numer = Self::from_f64_exact(scaled)?;
        Some(numer / Self::from(max_denominator))
    }

    /// Seconds held by a [`Duration`], exactly.
    pub fn from_duration(duration: Duration) -> Self {
        Self::new(BigInt::from(duration.as_nanos()), BigInt::from(NANOS_PER_SECOND))
    }

    /// Interprets `self` as seconds. Negative values have no `Duration`
    /// counterpart and yield `None`; sub-nanosecond parts are rounded.
    pub fn to_duration(&self) -> Option<Duration> {
        if self.is_negative() {
            return None;
        }
        let nanos = (self * Self::from(NANOS_PER_SECOND)).round();
        nanos.numer().to_u64().map(Duration::from_nanos)
    }

    /// True when `self` is a whole number of `1 / resolution` ticks.
    pub fn is_expressible_as(&self, resolution: u64) -> bool {
        if resolution == 0 {
            return false;
        }
        (self.0.numer() * BigInt::from(resolution))
            .mod_floor(self.0.denom())
            .is_zero()
    }
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<BigInt> for RationalTime {
    fn from(value: BigInt) -> Self {
        Self(BigRational::from_integer(value))
    }
}

impl From<BigRational> for RationalTime {
    fn from(value: BigRational) -> Self {
        Self(value)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RationalTime {
                fn from(value: $t) -> Self {
                    Self(BigRational::from_integer(BigInt::from(value)))
                }
            }
        )*
    };
}

from_integer!(i32, i64, u32, u64, usize);

macro_rules! forward_binop {
    ($imp:ident, $method:ident) => {
        impl $imp<RationalTime> for RationalTime {
            type Output = RationalTime;
            fn $method(self, rhs: RationalTime) -> RationalTime {
                RationalTime(self.0.$method(rhs.0))
            }
        }

        impl<'a> $imp<&'a RationalTime> for RationalTime {
            type Output = RationalTime;
            fn $method(self, rhs: &'a RationalTime) -> RationalTime {
                RationalTime(self.0.$method(&rhs.0))
            }
        }

        impl<'a> $imp<RationalTime> for &'a RationalTime {
            type Output = RationalTime;
            fn $method(self, rhs: RationalTime) -> RationalTime {
                RationalTime((&self.0).$method(rhs.0))
            }
        }

        impl<'a, 'b> $imp<&'b RationalTime> for &'a RationalTime {
            type Output = RationalTime;
            fn $method(self, rhs: &'b RationalTime) -> RationalTime {
                RationalTime((&self.0).$method(&rhs.0))
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
forward_binop!(Div, div);

impl Rem<RationalTime> for RationalTime {
    type Output = RationalTime;
    fn rem(self, rhs: RationalTime) -> RationalTime {
        self.rem_euclid(&rhs)
    }
}

impl<'a, 'b> Rem<&'b RationalTime> for &'a RationalTime {
    type Output = RationalTime;
    fn rem(self, rhs: &'b RationalTime) -> RationalTime {
        self.rem_euclid(rhs)
    }
}

impl AddAssign<RationalTime> for RationalTime {
    fn add_assign(&mut self, rhs: RationalTime) {
        self.0 += rhs.0;
    }
}

impl<'a> AddAssign<&'a RationalTime> for RationalTime {
    fn add_assign(&mut self, rhs: &'a RationalTime) {
        self.0 += &rhs.0;
    }
}

impl SubAssign<RationalTime> for RationalTime {
    fn sub_assign(&mut self, rhs: RationalTime) {
        self.0 -= rhs.0;
    }
}

impl<'a> SubAssign<&'a RationalTime> for RationalTime {
    fn sub_assign(&mut self, rhs: &'a RationalTime) {
        self.0 -= &rhs.0;
    }
}

impl Neg for RationalTime {
    type Output = RationalTime;
    fn neg(self) -> RationalTime {
        RationalTime(-self.0)
    }
}

impl<'a> Neg for &'a RationalTime {
    type Output = RationalTime;
    fn neg(self) -> RationalTime {
        RationalTime(-&self.0)
    }
}

impl Sum for RationalTime {
    fn sum<I: Iterator<Item = RationalTime>>(iter: I) -> Self {
        iter.fold(RationalTime::zero(), |acc, value| acc + value)
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            f.pad(&self.0.numer().to_string())
        } else {
            f.pad(&format!("{}/{}", self.0.numer(), self.0.denom()))
        }
    }
}

impl FromStr for RationalTime {
    type Err = ParseRationalError;

    /// Parses `"n"` or `"n/d"`, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseRationalError::Empty);
        }
        let parse = |part: &str| {
            part.trim()
                .parse::<BigInt>()
                .map_err(|_| ParseRationalError::InvalidInteger(part.trim().to_string()))
        };
        match s.split_once('/') {
            None => Ok(Self::from(parse(s)?)),
            Some((numer, denom)) => Self::checked_new(parse(numer)?, parse(denom)?)
                .ok_or(ParseRationalError::ZeroDenominator),
        }
    }
}

impl Serialize for RationalTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct RationalTimeVisitor;

impl<'de> Visitor<'de> for RationalTimeVisitor {
    type Value = RationalTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or a string of the form \"n/d\"")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<RationalTime, E> {
        Ok(RationalTime::from(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<RationalTime, E> {
        Ok(RationalTime::from(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<RationalTime, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for RationalTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RationalTimeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> RationalTime {
        RationalTime::new(n, d)
    }

    #[test]
    fn reduces_to_lowest_terms_with_positive_denominator() {
        let value = r(6, -4);
        assert_eq!(value.numer(), &BigInt::from(-3));
        assert_eq!(value.denom(), &BigInt::from(2));
        assert_eq!(value, r(-3, 2));
    }

    #[test]
    fn checked_new_rejects_zero_denominator() {
        assert!(RationalTime::checked_new(1, 0).is_none());
        assert_eq!(RationalTime::checked_new(2, 4), Some(r(1, 2)));
    }

    #[test]
    fn arithmetic_is_exact() {
        let third = r(1, 3);
        let sum: RationalTime = (0..3).map(|_| third.clone()).sum();
        assert_eq!(sum, RationalTime::one());
        assert_eq!(&third * &r(3, 2), r(1, 2));
        assert_eq!(&third / &r(2, 1), r(1, 6));
        assert_eq!(&third - &r(1, 2), r(-1, 6));
        assert_eq!(-&third, r(-1, 3));
    }

    #[test]
    fn euclidean_remainder_is_never_negative() {
        assert_eq!(r(7, 2) % r(1, 1), r(1, 2));
        assert_eq!(r(-7, 2) % r(1, 1), r(1, 2));
        assert_eq!(r(-1, 3) % r(-1, 2), r(1, 6));
        assert_eq!(r(4, 1) % r(2, 1), RationalTime::zero());
    }

    #[test]
    fn floor_ceil_round() {
        assert_eq!(r(7, 2).floor(), r(3, 1));
        assert_eq!(r(-7, 2).floor(), r(-4, 1));
        assert_eq!(r(7, 2).ceil(), r(4, 1));
        assert_eq!(r(7, 2).round(), r(4, 1));
        assert_eq!(r(-7, 2).round(), r(-4, 1));
        assert_eq!(r(10, 3).round_to_i64(), Some(3));
        assert_eq!(r(-1, 3).floor_to_i64(), Some(-1));
    }

    #[test]
    fn total_order() {
        let mut values = vec![r(1, 2), r(-3, 4), r(1, 3), RationalTime::zero()];
        values.sort();
        assert_eq!(values, vec![r(-3, 4), RationalTime::zero(), r(1, 3), r(1, 2)]);
    }

    #[test]
    fn float_conversions() {
        assert_eq!(RationalTime::from_f64_exact(0.25), Some(r(1, 4)));
        assert_eq!(RationalTime::from_f64_exact(f64::NAN), None);
        assert_eq!(RationalTime::from_f64_approx(1.1, 10), Some(r(11, 10)));
        assert_eq!(RationalTime::from_f64_approx(0.3333, 3), Some(r(1, 3)));
        assert!((r(1, 3).to_f64() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn duration_conversions() {
        let value = RationalTime::from_duration(Duration::from_millis(1500));
        assert_eq!(value, r(3, 2));
        assert_eq!(value.to_duration(), Some(Duration::from_millis(1500)));
        assert_eq!(r(-1, 2).to_duration(), None);
    }

    #[test]
    fn expressible_as_ticks() {
        assert!(r(1, 240).is_expressible_as(240));
        assert!(r(3, 4).is_expressible_as(240));
        assert!(!r(1, 7).is_expressible_as(240));
        assert!(r(5, 1).is_expressible_as(1));
    }

    #[test]
    fn text_form() {
        assert_eq!(r(3, 1).to_string(), "3");
        assert_eq!(r(-3, 6).to_string(), "-1/2");
        assert_eq!("  -1/2 ".parse::<RationalTime>(), Ok(r(-1, 2)));
        assert_eq!("8".parse::<RationalTime>(), Ok(r(8, 1)));
        assert_eq!("1/0".parse::<RationalTime>(), Err(ParseRationalError::ZeroDenominator));
        assert!(matches!(
            "a/2".parse::<RationalTime>(),
            Err(ParseRationalError::InvalidInteger(_))
        ));
        assert_eq!("".parse::<RationalTime>(), Err(ParseRationalError::Empty));
    }

    #[test]
    fn serde_keeps_exact_value() {
        let json = serde_json::to_string(&r(7, 3)).unwrap();
        assert_eq!(json, "\"7/3\"");
        let back: RationalTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r(7, 3));
        let from_int: RationalTime = serde_json::from_str("4").unwrap();
        assert_eq!(from_int, r(4, 1));
    }
}
