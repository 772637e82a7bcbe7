//! Integer money and credit-block units
//!
//! Balances and prices are always whole numbers of their smallest unit:
//! `Money` is minor currency units (cents), `Blocks` is allocatable credit
//! blocks (e.g. one block = 30 minutes of practice time). Keeping both as
//! plain integers rules out floating-point drift in financial code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use thiserror::Error;

/// Errors that can occur during unit arithmetic
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("arithmetic overflow")]
    Overflow,
}

/// A monetary amount in minor currency units (cents)
///
/// Signed so that differences and refunds can be represented; persisted
/// amounts are non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates Money from an amount in minor units
    pub fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Returns the amount in minor units
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checked addition
    pub fn checked_add(&self, other: Money) -> Result<Money, UnitError> {
        self.0.checked_add(other.0).map(Money).ok_or(UnitError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Money) -> Result<Money, UnitError> {
        self.0.checked_sub(other.0).map(Money).ok_or(UnitError::Overflow)
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Money {
        Money(self.0.abs())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

/// A quantity of credit blocks, the smallest allocatable unit of a credit type
///
/// Signed: ledger transaction amounts are positive for grants and negative
/// for spends. Account balances never go below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blocks(i64);

impl Blocks {
    pub const ZERO: Blocks = Blocks(0);

    /// Creates a block quantity
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw block count
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Returns true if the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the quantity is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the quantity is strictly negative
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Blocks {
        Blocks(self.0.abs())
    }

    /// Checked addition
    pub fn checked_add(&self, other: Blocks) -> Result<Blocks, UnitError> {
        self.0.checked_add(other.0).map(Blocks).ok_or(UnitError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: Blocks) -> Result<Blocks, UnitError> {
        self.0.checked_sub(other.0).map(Blocks).ok_or(UnitError::Overflow)
    }
}

impl fmt::Display for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Blocks {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Blocks(self.0 + other.0)
    }
}

impl AddAssign for Blocks {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Blocks {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Blocks(self.0 - other.0)
    }
}

impl SubAssign for Blocks {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Blocks {
    type Output = Self;

    fn neg(self) -> Self {
        Blocks(-self.0)
    }
}

impl Sum for Blocks {
    fn sum<I: Iterator<Item = Blocks>>(iter: I) -> Blocks {
        iter.fold(Blocks::ZERO, |acc, b| acc + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050);
        assert_eq!(m.minor_units(), 10050);
        assert_eq!(m.to_string(), "100.50");
    }

    #[test]
    fn test_money_display_negative() {
        assert_eq!(Money::from_minor(-305).to_string(), "-3.05");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_minor(10000);
        let b = Money::from_minor(5000);

        assert_eq!((a + b).minor_units(), 15000);
        assert_eq!((a - b).minor_units(), 5000);
        assert_eq!((-a).minor_units(), -10000);
    }

    #[test]
    fn test_money_checked_overflow() {
        let max = Money::from_minor(i64::MAX);
        assert_eq!(max.checked_add(Money::from_minor(1)), Err(UnitError::Overflow));
    }

    #[test]
    fn test_blocks_sign_helpers() {
        assert!(Blocks::new(4).is_positive());
        assert!(Blocks::new(-4).is_negative());
        assert!(Blocks::ZERO.is_zero());
        assert_eq!(Blocks::new(-4).abs(), Blocks::new(4));
    }

    #[test]
    fn test_blocks_assign_ops() {
        let mut b = Blocks::new(10);
        b -= Blocks::new(4);
        assert_eq!(b, Blocks::new(6));
        b += Blocks::new(2);
        assert_eq!(b, Blocks::new(8));
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Blocks::new(250)).unwrap();
        assert_eq!(json, "250");
        let back: Blocks = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Blocks::new(250));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn blocks_sum_matches_raw_sum(values in proptest::collection::vec(-1_000_000i64..1_000_000i64, 0..50)) {
            let total: Blocks = values.iter().map(|v| Blocks::new(*v)).sum();
            prop_assert_eq!(total.value(), values.iter().sum::<i64>());
        }

        #[test]
        fn money_add_sub_roundtrip(a in -1_000_000i64..1_000_000i64, b in -1_000_000i64..1_000_000i64) {
            let ma = Money::from_minor(a);
            let mb = Money::from_minor(b);
            prop_assert_eq!(ma + mb - mb, ma);
        }
    }
}
