//! Lossless decimal money type backed by rust_decimal.
//!
//! Provides canonical parsing from strings, formatting without exponent notation,
//! and the conversion to and from the integer minor units stored in SQLite.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal as RustDecimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits kept for money amounts.
pub const MONEY_SCALE: u32 = 6;

/// Lossless decimal numeric type for financial calculations.
///
/// Backed by rust_decimal to avoid floating-point drift.
/// Serializes to a JSON string so no consumer ever sees a float.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

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
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        let normalized = self.0.normalize();
        format!("{}", normalized)
    }

    /// Build a Decimal from integer minor units (`MONEY_SCALE` digits).
    pub fn from_minor_units(units: i64) -> Self {
        Decimal(RustDecimal::new(units, MONEY_SCALE))
    }

    /// Convert to integer minor units, truncating digits beyond `MONEY_SCALE`.
    ///
    /// Returns None if the value does not fit in an i64.
    pub fn to_minor_units(&self) -> Option<i64> {
        let scaled = self.to_money().0 * RustDecimal::from(10i64.pow(MONEY_SCALE));
        scaled.to_i64()
    }

    /// Truncate toward zero at `MONEY_SCALE` digits.
    pub fn to_money(&self) -> Self {
        Decimal(
            self.0
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero),
        )
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

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
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

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
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

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_canonical_no_exponent() {
        let decimal = Decimal::from_str_canonical("123.000").expect("parse failed");
        let formatted = decimal.to_canonical_string();
        assert!(!formatted.contains('e'));
        assert_eq!(formatted, "123");
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
    fn test_minor_units_conversion() {
        let d = Decimal::from_str_canonical("12.345678").unwrap();
        assert_eq!(d.to_minor_units(), Some(12_345_678));
        assert_eq!(Decimal::from_minor_units(12_345_678), d);
        assert_eq!(Decimal::from_minor_units(0), Decimal::zero());
    }

    #[test]
    fn test_to_money_truncates_toward_zero() {
        let d = Decimal::from_str_canonical("0.1234569").unwrap();
        assert_eq!(d.to_money().to_canonical_string(), "0.123456");
        assert_eq!(d.to_minor_units(), Some(123_456));

        let third = Decimal::from(10) / Decimal::from(3);
        assert_eq!(third.to_money().to_canonical_string(), "3.333333");
    }

    #[test]
    fn test_decimal_json_is_string() {
        let decimal = Decimal::from_str_canonical("123.456").unwrap();
        let json = serde_json::to_value(decimal).unwrap();
        assert_eq!(json, serde_json::json!("123.456"));
        let back: Decimal = serde_json::from_value(json).unwrap();
        assert_eq!(back, decimal);
    }

    #[test]
    fn test_sum() {
        let total: Decimal = ["1.5", "2.25", "0.25"]
            .iter()
            .map(|s| Decimal::from_str_canonical(s).unwrap())
            .sum();
        assert_eq!(total.to_canonical_string(), "4");
    }
}
