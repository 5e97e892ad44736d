//! Decimal money type used for all prices and totals.
//!
//! The marketplace operates in a single currency, so `Money` wraps a bare
//! `Decimal` amount. Arithmetic is exact; never use floats for totals.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An exact monetary amount.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new amount from a decimal.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create an amount from whole currency units (e.g., dollars).
    #[must_use]
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Get the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Scale the amount by a decimal factor (e.g., a discount rate).
    #[must_use]
    pub fn scaled_by(self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, qty: u32) -> Self {
        Self(self.0 * Decimal::from(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_is_exact() {
        let unit = Money::new(Decimal::new(1999, 2)); // 19.99
        let line = unit * 3;
        assert_eq!(line, Money::new(Decimal::new(5997, 2)));

        let discounted = line - Money::new(Decimal::new(997, 2));
        assert_eq!(discounted, Money::from_major(50));
    }

    #[test]
    fn test_scaled_by_rate() {
        let base = Money::from_major(90);
        let rate = Decimal::new(2, 1); // 0.2
        assert_eq!(base.scaled_by(rate), Money::from_major(18));
    }

    #[test]
    fn test_sum_of_lines() {
        let total: Money = [Money::from_major(5), Money::from_major(7)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_major(12));
    }
}
