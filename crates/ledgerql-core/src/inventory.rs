//! Inventory type representing a collection of positions.
//!
//! An [`Inventory`] accumulates positions the way a `sum(position)` query
//! aggregates them: positions with the same currency and cost merge, zero
//! positions disappear.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Amount, Position};

/// A collection of positions keyed by (currency, cost).
///
/// # Examples
///
/// ```
/// use ledgerql_core::{Amount, Inventory, Position};
/// use rust_decimal_macros::dec;
///
/// let mut inv = Inventory::new();
/// inv.add(Position::simple(Amount::new(dec!(100), "USD")));
/// inv.add(Position::simple(Amount::new(dec!(-40), "USD")));
/// assert_eq!(inv.units("USD"), dec!(60));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Inventory {
    positions: Vec<Position>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all positions.
    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Check if inventory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of distinct lots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Total units of a currency across all lots.
    #[must_use]
    pub fn units(&self, currency: &str) -> Decimal {
        self.positions
            .iter()
            .filter(|p| p.units.currency == currency)
            .map(|p| p.units.number)
            .sum()
    }

    /// Currencies held, sorted.
    #[must_use]
    pub fn currencies(&self) -> Vec<&str> {
        let mut currencies: Vec<&str> = self
            .positions
            .iter()
            .map(|p| p.units.currency.as_str())
            .collect();
        currencies.sort_unstable();
        currencies.dedup();
        currencies
    }

    /// Add a position, merging it into the lot with the same currency and cost.
    pub fn add(&mut self, position: Position) {
        if position.is_empty() {
            return;
        }
        let existing = self
            .positions
            .iter()
            .position(|p| p.units.currency == position.units.currency && p.cost == position.cost);
        match existing {
            Some(index) => {
                let lot = &mut self.positions[index];
                lot.units.number += position.units.number;
                if lot.is_empty() {
                    self.positions.remove(index);
                }
            }
            None => self.positions.push(position),
        }
    }

    /// Add an amount without cost.
    pub fn add_amount(&mut self, amount: Amount) {
        self.add(Position::simple(amount));
    }

    /// Add every position of another inventory.
    pub fn merge(&mut self, other: &Self) {
        for pos in &other.positions {
            self.add(pos.clone());
        }
    }

    /// Inventory with each lot converted to its cost.
    #[must_use]
    pub fn at_cost(&self) -> Self {
        self.positions
            .iter()
            .map(|p| Position::simple(p.at_cost()))
            .collect()
    }

    /// Inventory with costs stripped, aggregated by currency.
    #[must_use]
    pub fn at_units(&self) -> Self {
        self.positions
            .iter()
            .map(|p| Position::simple(p.units.clone()))
            .collect()
    }

    /// Inventory restricted to one currency.
    #[must_use]
    pub fn only(&self, currency: &str) -> Self {
        self.positions
            .iter()
            .filter(|p| p.units.currency == currency)
            .cloned()
            .collect()
    }

    /// The inventory with every lot negated.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            positions: self.positions.iter().map(Position::neg).collect(),
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pos) in self.positions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pos}")?;
        }
        Ok(())
    }
}

impl FromIterator<Position> for Inventory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut inv = Self::new();
        for pos in iter {
            inv.add(pos);
        }
        inv
    }
}

impl FromIterator<Amount> for Inventory {
    fn from_iter<I: IntoIterator<Item = Amount>>(iter: I) -> Self {
        iter.into_iter().map(Position::simple).collect()
    }
}
