//! Monetary amounts in minor currency units.
//!
//! All pricing is integer arithmetic on cents, so the session cart and the
//! persistent cart always agree to the last unit for the same contents.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Signed amount in minor currency units (e.g. cents).
///
/// Signed because variation price adjustments may be negative.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply a unit price by a line quantity.
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * i64::from(quantity))
    }

    /// Minor units as the unsigned amount a payment gateway expects.
    pub fn to_gateway_amount(self) -> DomainResult<u64> {
        u64::try_from(self.0)
            .map_err(|_| DomainError::invariant(format!("negative amount {self} cannot be charged")))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl ValueObject for Money {}

/// Flat tax policy expressed in basis points (`1000` = 10%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Tax owed on `subtotal`, rounded half away from zero to the minor unit.
    pub fn tax_on(self, subtotal: Money) -> Money {
        let scaled = i128::from(subtotal.minor()) * i128::from(self.0);
        let half = 5_000i128;
        let rounded = if scaled >= 0 {
            (scaled + half) / 10_000
        } else {
            (scaled - half) / 10_000
        };
        // bps is a u32 and subtotal an i64, so the quotient always fits.
        Money::from_minor(rounded as i64)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self(1_000)
    }
}

impl ValueObject for TaxRate {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_pads_cents() {
        assert_eq!(Money::from_minor(5500).to_string(), "55.00");
        assert_eq!(Money::from_minor(7).to_string(), "0.07");
        assert_eq!(Money::from_minor(-250).to_string(), "-2.50");
    }

    #[test]
    fn ten_percent_of_fifty() {
        let tax = TaxRate::default().tax_on(Money::from_minor(5000));
        assert_eq!(tax, Money::from_minor(500));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        let rate = TaxRate::from_basis_points(1_000);
        assert_eq!(rate.tax_on(Money::from_minor(5)), Money::from_minor(1));
        assert_eq!(rate.tax_on(Money::from_minor(4)), Money::from_minor(0));
        assert_eq!(rate.tax_on(Money::from_minor(-5)), Money::from_minor(-1));
    }

    #[test]
    fn negative_amounts_cannot_be_charged() {
        assert!(Money::from_minor(-1).to_gateway_amount().is_err());
        assert_eq!(Money::from_minor(1999).to_gateway_amount().unwrap(), 1999);
    }

    proptest! {
        #[test]
        fn sum_matches_fold(amounts in prop::collection::vec(-1_000_000i64..1_000_000i64, 0..32)) {
            let total: Money = amounts.iter().map(|a| Money::from_minor(*a)).sum();
            prop_assert_eq!(total.minor(), amounts.iter().sum::<i64>());
        }
    }
}
