//! Aggregation accumulators.
//!
//! One [`Accumulator`] lives in a row-context slot per (group, aggregate
//! node) pair. Rows feed it through [`Accumulator::update`]; the group's
//! result is read once through [`Accumulator::finish`].

use rust_decimal::Decimal;

use ledgerql_core::Inventory;

use crate::error::ArithmeticError;
use crate::types::{DataType, Value};

/// Aggregation function kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// `sum(x)`
    Sum,
    /// `count(x)`
    Count,
    /// `first(x)`
    First,
    /// `last(x)`
    Last,
    /// `min(x)`
    Min,
    /// `max(x)`
    Max,
    /// `avg(x)`
    Avg,
}

/// Running state of one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Integer sum.
    SumInteger(i64),
    /// Decimal sum; dynamic operands are coerced.
    SumDecimal(Decimal),
    /// Sum of amounts, positions or inventories.
    SumInventory(Inventory),
    /// Row count.
    Count(i64),
    /// First non-null value.
    First(Option<Value>),
    /// Value of the last row.
    Last(Value),
    /// Smallest value.
    Min(Option<Value>),
    /// Largest value.
    Max(Option<Value>),
    /// Running total and count for the mean.
    Avg {
        /// Sum of operand values.
        total: Decimal,
        /// Number of non-null operands.
        count: u64,
    },
}

impl Accumulator {
    /// Fresh accumulator for an aggregation over operands of `operand_type`.
    pub fn new(kind: AggregateKind, operand_type: DataType) -> Self {
        match kind {
            AggregateKind::Sum => match operand_type {
                DataType::Int => Self::SumInteger(0),
                DataType::Amount | DataType::Position | DataType::Inventory => {
                    Self::SumInventory(Inventory::new())
                }
                _ => Self::SumDecimal(Decimal::ZERO),
            },
            AggregateKind::Count => Self::Count(0),
            AggregateKind::First => Self::First(None),
            AggregateKind::Last => Self::Last(Value::Null),
            AggregateKind::Min => Self::Min(None),
            AggregateKind::Max => Self::Max(None),
            AggregateKind::Avg => Self::Avg {
                total: Decimal::ZERO,
                count: 0,
            },
        }
    }

    /// Feed one row's operand value. `expr` names the aggregate in errors.
    pub fn update(&mut self, value: Value, expr: &str) -> Result<(), ArithmeticError> {
        let overflow = || ArithmeticError::Overflow {
            expr: expr.to_string(),
        };
        match self {
            Self::Count(n) => *n += 1,
            Self::Last(last) => *last = value,
            _ if value.is_null() => {}
            Self::SumInteger(total) => {
                if let Value::Integer(n) = value {
                    *total = total.checked_add(n).ok_or_else(overflow)?;
                }
            }
            Self::SumDecimal(total) => {
                if let Some(n) = value.coerce_decimal() {
                    *total = total.checked_add(n).ok_or_else(overflow)?;
                }
            }
            Self::SumInventory(inv) => match value {
                Value::Amount(amount) => inv.add_amount(amount),
                Value::Position(pos) => inv.add(pos),
                Value::Inventory(other) => inv.merge(&other),
                _ => {}
            },
            Self::First(first) => {
                if first.is_none() {
                    *first = Some(value);
                }
            }
            Self::Min(min) => {
                if min.as_ref().map_or(true, |m| value.compare(m).is_some_and(|o| o.is_lt())) {
                    *min = Some(value);
                }
            }
            Self::Max(max) => {
                if max.as_ref().map_or(true, |m| value.compare(m).is_some_and(|o| o.is_gt())) {
                    *max = Some(value);
                }
            }
            Self::Avg { total, count } => {
                if let Some(n) = value.coerce_decimal() {
                    *total = total.checked_add(n).ok_or_else(overflow)?;
                    *count += 1;
                }
            }
        }
        Ok(())
    }

    /// The aggregate result.
    pub fn finish(self) -> Value {
        match self {
            Self::SumInteger(n) | Self::Count(n) => Value::Integer(n),
            Self::SumDecimal(n) => Value::Number(n),
            Self::SumInventory(inv) => Value::Inventory(inv),
            Self::First(v) | Self::Min(v) | Self::Max(v) => v.unwrap_or(Value::Null),
            Self::Last(v) => v,
            Self::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    total
                        .checked_div(Decimal::from(count))
                        .map_or(Value::Null, Value::Number)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerql_core::Amount;
    use rust_decimal_macros::dec;

    fn run(kind: AggregateKind, dtype: DataType, values: Vec<Value>) -> Value {
        let mut acc = Accumulator::new(kind, dtype);
        for value in values {
            acc.update(value, "test").unwrap();
        }
        acc.finish()
    }

    #[test]
    fn test_sum() {
        let values = vec![Value::Number(dec!(5.00)), Value::Null, Value::Number(dec!(10.00))];
        assert_eq!(
            run(AggregateKind::Sum, DataType::Decimal, values),
            Value::Number(dec!(15.00))
        );
        let values = vec![Value::Integer(2), Value::Integer(3)];
        assert_eq!(run(AggregateKind::Sum, DataType::Int, values), Value::Integer(5));
    }

    #[test]
    fn test_sum_amounts() {
        let values = vec![
            Value::Amount(Amount::new(dec!(1), "USD")),
            Value::Amount(Amount::new(dec!(2), "CAD")),
            Value::Amount(Amount::new(dec!(3), "USD")),
        ];
        match run(AggregateKind::Sum, DataType::Amount, values) {
            Value::Inventory(inv) => {
                assert_eq!(inv.units("USD"), dec!(4));
                assert_eq!(inv.units("CAD"), dec!(2));
            }
            other => panic!("expected inventory, got {other:?}"),
        }
    }

    #[test]
    fn test_sum_overflow() {
        let mut acc = Accumulator::new(AggregateKind::Sum, DataType::Int);
        acc.update(Value::Integer(i64::MAX), "sum(x)").unwrap();
        assert_eq!(
            acc.update(Value::Integer(1), "sum(x)"),
            Err(ArithmeticError::Overflow {
                expr: "sum(x)".to_string()
            })
        );
    }

    #[test]
    fn test_count_counts_every_row() {
        let values = vec![Value::Integer(1), Value::Null, Value::Integer(3)];
        assert_eq!(run(AggregateKind::Count, DataType::Int, values), Value::Integer(3));
    }

    #[test]
    fn test_first_last() {
        let values = vec![Value::Null, Value::Integer(1), Value::Integer(2)];
        assert_eq!(
            run(AggregateKind::First, DataType::Int, values.clone()),
            Value::Integer(1)
        );
        assert_eq!(run(AggregateKind::Last, DataType::Int, values), Value::Integer(2));
    }

    #[test]
    fn test_min_max_avg() {
        let values = vec![Value::Integer(3), Value::Integer(-1), Value::Null, Value::Integer(7)];
        assert_eq!(
            run(AggregateKind::Min, DataType::Int, values.clone()),
            Value::Integer(-1)
        );
        assert_eq!(
            run(AggregateKind::Max, DataType::Int, values.clone()),
            Value::Integer(7)
        );
        assert_eq!(
            run(AggregateKind::Avg, DataType::Int, values),
            Value::Number(dec!(3))
        );
    }

    #[test]
    fn test_empty_group() {
        assert_eq!(run(AggregateKind::Max, DataType::Int, vec![]), Value::Null);
        assert_eq!(run(AggregateKind::Avg, DataType::Decimal, vec![]), Value::Null);
        assert_eq!(run(AggregateKind::Count, DataType::Int, vec![]), Value::Integer(0));
    }
}
