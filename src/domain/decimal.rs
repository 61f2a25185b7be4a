//! Lossless decimal numeric type backed by rust_decimal.
//!
//! Provides canonical parsing from strings and formatting without exponent notation.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal numeric type for score and reward calculations.
///
/// Backed by rust_decimal (28 significant digits) to avoid floating-point drift.
/// Serializes to JSON number (not string) by default; use [`canonical`] on
/// fields that must survive a round trip through clients unchanged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Create a Decimal from a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        // Use normalize() to remove trailing zeros, then format without exponent
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// The multiplicative identity (1).
    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Multiplication that reports overflow instead of panicking.
    pub fn checked_mul(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// Division that reports overflow and division by zero instead of panicking.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Addition that reports overflow instead of panicking.
    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    /// Sum an iterator of decimals.
    pub fn sum<I: IntoIterator<Item = Decimal>>(iter: I) -> Decimal {
        iter.into_iter().fold(Decimal::zero(), |acc, d| acc + d)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<u32> for Decimal {
    fn from(value: u32) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

// Arithmetic operations
impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

/// Serde adapter that writes a [`Decimal`] as its canonical string and reads
/// it back from either a string or a JSON number.
pub mod canonical {
    use super::Decimal;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_canonical_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        struct CanonicalVisitor;

        impl<'de> Visitor<'de> for CanonicalVisitor {
            type Value = Decimal;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a decimal number or decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
                Decimal::from_str_canonical(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
                Ok(Decimal::new(v.into()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
                Ok(Decimal::new(v.into()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
                // Go through the shortest round-trip representation of the float.
                Decimal::from_str_canonical(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(CanonicalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_canonical_no_exponent() {
        let decimal = Decimal::from_str_canonical("123").expect("parse failed");
        let formatted = decimal.to_canonical_string();
        assert!(
            !formatted.contains('e'),
            "formatted string should not contain exponent"
        );
        assert_eq!(formatted, "123");
    }

    #[test]
    fn test_decimal_canonical_strips_trailing_zeros() {
        let decimal = Decimal::from_str_canonical("50.000").unwrap();
        assert_eq!(decimal.to_canonical_string(), "50");
    }

    #[test]
    fn test_decimal_arithmetic() {
        let a = Decimal::from_str_canonical("10.5").unwrap();
        let b = Decimal::from_str_canonical("2.5").unwrap();

        assert_eq!((a + b).to_canonical_string(), "13");
        assert_eq!((a - b).to_canonical_string(), "8");
        assert_eq!((a * b).to_canonical_string(), "26.25");
    }

    #[test]
    fn test_checked_div_by_zero_is_none() {
        let a = Decimal::from_str_canonical("1").unwrap();
        assert!(a.checked_div(Decimal::zero()).is_none());
        assert_eq!(
            a.checked_div(Decimal::from(4)).unwrap().to_canonical_string(),
            "0.25"
        );
    }

    #[test]
    fn test_decimal_json_serialization() {
        let decimal = Decimal::from_str_canonical("123.456").unwrap();
        let json = serde_json::to_value(decimal).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.456");
    }

    #[test]
    fn test_canonical_serde_accepts_string_and_number() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "canonical")]
            value: Decimal,
        }

        let from_str: Wrapper = serde_json::from_str(r#"{"value":"33.3333333333"}"#).unwrap();
        assert_eq!(from_str.value.to_canonical_string(), "33.3333333333");

        let from_num: Wrapper = serde_json::from_str(r#"{"value":2.5}"#).unwrap();
        assert_eq!(from_num.value.to_canonical_string(), "2.5");

        let from_int: Wrapper = serde_json::from_str(r#"{"value":7}"#).unwrap();
        assert_eq!(from_int.value.to_canonical_string(), "7");

        let json = serde_json::to_string(&from_str).unwrap();
        assert_eq!(json, r#"{"value":"33.3333333333"}"#);
    }

    #[test]
    fn test_decimal_sum() {
        let values = ["1.5", "2.25", "0.25"]
            .iter()
            .map(|s| Decimal::from_str_canonical(s).unwrap());
        assert_eq!(Decimal::sum(values).to_canonical_string(), "4");
    }

    #[test]
    fn test_decimal_ordering() {
        let a = Decimal::from_str_canonical("10").unwrap();
        let b = Decimal::from_str_canonical("20").unwrap();
        assert!(a < b);
        assert!(b > a);
    }
}
