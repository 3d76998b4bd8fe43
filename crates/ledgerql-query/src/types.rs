//! Type and value model.
//!
//! [`DataType`] is the static type the compiler infers for every node;
//! [`Value`] is what flows through evaluation. `DataType::Object` marks
//! values whose kind is only known at run time (metadata lookups), and
//! `DataType::Null` is the type of the `NULL` literal.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ledgerql_core::{Amount, Inventory, MetaValue, Position};

/// Static type of a compiled expression or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of the NULL literal.
    Null,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// Decimal number.
    Decimal,
    /// String.
    Str,
    /// Calendar date.
    Date,
    /// Set of scalars (tags, links, constant lists).
    Set,
    /// Amount (number and currency).
    Amount,
    /// Position (units at an optional cost).
    Position,
    /// Inventory (aggregate of positions).
    Inventory,
    /// Dynamically typed value.
    Object,
}

impl DataType {
    /// Whether the type is integer or decimal.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Decimal)
    }

    /// Lower-case type name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Str => "str",
            Self::Date => "date",
            Self::Set => "set",
            Self::Amount => "amount",
            Self::Position => "position",
            Self::Inventory => "inventory",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Integer.
    Integer(i64),
    /// Decimal number.
    Number(Decimal),
    /// String.
    String(String),
    /// Date.
    Date(NaiveDate),
    /// Set of scalars.
    Set(Vec<Value>),
    /// Amount.
    Amount(Amount),
    /// Position.
    Position(Position),
    /// Inventory.
    Inventory(Inventory),
}

impl Value {
    /// Whether this is the absent value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The runtime kind of this value.
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Bool,
            Self::Integer(_) => DataType::Int,
            Self::Number(_) => DataType::Decimal,
            Self::String(_) => DataType::Str,
            Self::Date(_) => DataType::Date,
            Self::Set(_) => DataType::Set,
            Self::Amount(_) => DataType::Amount,
            Self::Position(_) => DataType::Position,
            Self::Inventory(_) => DataType::Inventory,
        }
    }

    /// Truthiness used by `AND`, `OR`, `NOT` and filters.
    ///
    /// Null, false, zero, empty strings and empty collections are false.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Integer(n) => *n != 0,
            Self::Number(n) => !n.is_zero(),
            Self::String(s) => !s.is_empty(),
            Self::Date(_) => true,
            Self::Set(items) => !items.is_empty(),
            Self::Amount(a) => !a.is_zero(),
            Self::Position(p) => !p.is_empty(),
            Self::Inventory(inv) => !inv.is_empty(),
        }
    }

    /// Numeric view of an integer or decimal value.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(n) => Some(Decimal::from(*n)),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of a dynamic value: numbers, booleans and numeric strings.
    pub fn coerce_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Boolean(b) => Some(Decimal::from(u8::from(*b))),
            Self::String(s) => Decimal::from_str(s.trim()).ok(),
            other => other.as_decimal(),
        }
    }

    /// Equality with numeric promotion. Two nulls are equal.
    pub fn equals(&self, other: &Self) -> bool {
        match (self.as_decimal(), other.as_decimal()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Ordering between comparable values, `None` when the kinds differ or
    /// either side is null.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_decimal(), other.as_decimal()) {
            return Some(a.cmp(&b));
        }
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Set(a), Self::Set(b)) => Some(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len())),
            ),
            (Self::Amount(a), Self::Amount(b)) => Some(a.cmp(b)),
            (Self::Position(a), Self::Position(b)) => Some(a.cmp(b)),
            (Self::Inventory(a), Self::Inventory(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order for sorting non-null values; values of different kinds
    /// order by kind.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank()))
    }

    const fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Number(_) => 2,
            Self::String(_) => 3,
            Self::Date(_) => 4,
            Self::Set(_) => 5,
            Self::Amount(_) => 6,
            Self::Position(_) => 7,
            Self::Inventory(_) => 8,
        }
    }

    /// Total order with nulls first, used for sorting and set comparison.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.sort_cmp(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Amount(a) => write!(f, "{a}"),
            Self::Position(p) => write!(f, "{p}"),
            Self::Inventory(inv) => write!(f, "{inv}"),
        }
    }
}

impl From<&MetaValue> for Value {
    fn from(meta: &MetaValue) -> Self {
        match meta {
            MetaValue::String(s)
            | MetaValue::Account(s)
            | MetaValue::Currency(s)
            | MetaValue::Tag(s) => Self::String(s.clone()),
            MetaValue::Date(d) => Self::Date(*d),
            MetaValue::Number(n) => Self::Number(*n),
            MetaValue::Bool(b) => Self::Boolean(*b),
            MetaValue::Amount(a) => Self::Amount(a.clone()),
            MetaValue::None => Self::Null,
        }
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Null, Self::String)
    }
}

/// Conversions behind the cast functions.
///
/// Each returns a null of the target type when the value cannot be
/// converted; rejecting incompatible literals happens at compile time.
pub mod cast {
    use super::{Decimal, NaiveDate, ToPrimitive, Value};

    /// `bool(x)`
    pub fn to_bool(value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            other => Value::Boolean(other.truthy()),
        }
    }

    /// `int(x)`: decimals truncate, strings must spell an integer.
    pub fn to_int(value: &Value) -> Value {
        let converted = match value {
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::Integer(n) => Some(*n),
            Value::Number(n) => n.trunc().to_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        converted.map_or(Value::Null, Value::Integer)
    }

    /// `decimal(x)`
    pub fn to_decimal(value: &Value) -> Value {
        let converted: Option<Decimal> = match value {
            Value::Date(_) | Value::Null => None,
            other => other.coerce_decimal(),
        };
        converted.map_or(Value::Null, Value::Number)
    }

    /// `str(x)`
    pub fn to_str(value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// `date(x)`: dates pass through, strings must be ISO dates.
    pub fn to_date(value: &Value) -> Value {
        match value {
            Value::Date(d) => Value::Date(*d),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_or(Value::Null, Value::Date),
            _ => Value::Null,
        }
    }
}
