//! Amount type representing a decimal number with a currency.
//!
//! An [`Amount`] is the smallest unit of value flowing through a query: a
//! decimal quantity tagged with a commodity code.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// An amount is a quantity paired with a currency.
///
/// # Examples
///
/// ```
/// use ledgerql_core::Amount;
/// use rust_decimal_macros::dec;
///
/// let amount = Amount::new(dec!(100.00), "USD");
/// let other = Amount::new(dec!(50.00), "USD");
/// assert_eq!((&amount + &other).number, dec!(150.00));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    /// The decimal quantity
    pub number: Decimal,
    /// The currency code (e.g., "USD", "HOOL")
    pub currency: String,
}

impl Amount {
    /// Create a new amount.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }

    /// Create a zero amount with the given currency.
    #[must_use]
    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Check if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.number.is_zero()
    }

    /// Get the absolute value of this amount.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self::new(self.number.abs(), self.currency.clone())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl Add for &Amount {
    type Output = Amount;

    /// Adds two amounts. The currencies are expected to match; the left
    /// currency is kept.
    fn add(self, other: &Amount) -> Amount {
        debug_assert_eq!(self.currency, other.currency);
        Amount::new(self.number + other.number, self.currency.clone())
    }
}

impl Sub for &Amount {
    type Output = Amount;

    fn sub(self, other: &Amount) -> Amount {
        debug_assert_eq!(self.currency, other.currency);
        Amount::new(self.number - other.number, self.currency.clone())
    }
}

impl Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount::new(-self.number, self.currency.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_display() {
        assert_eq!(Amount::new(dec!(5.00), "USD").to_string(), "5.00 USD");
        assert_eq!(Amount::new(dec!(-12), "HOOL").to_string(), "-12 HOOL");
    }

    #[test]
    fn test_arithmetic() {
        let a = Amount::new(dec!(10.50), "USD");
        let b = Amount::new(dec!(0.25), "USD");
        assert_eq!((&a + &b).number, dec!(10.75));
        assert_eq!((&a - &b).number, dec!(10.25));
        assert_eq!((-&a).number, dec!(-10.50));
    }

    #[test]
    fn test_zero() {
        assert!(Amount::zero("EUR").is_zero());
        assert!(!Amount::new(dec!(0.01), "EUR").is_zero());
        assert_eq!(Amount::new(dec!(-3), "EUR").abs().number, dec!(3));
    }
}
