//! Built-in scalar and aggregate functions.
//!
//! Overloads are looked up by name and operand types; see
//! [`Environment::resolve_function`](crate::catalog::Environment::resolve_function).
//! Implementations receive operands already checked against the overload,
//! so each one only matches the shapes it declared and returns null for
//! anything else.

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use ledgerql_core::Amount;

use crate::aggregate::AggregateKind;
use crate::catalog::{entry_meta, posting_meta, FunctionDef, Param, Returns};
use crate::context::Row;
use crate::types::{cast, DataType, Value};

const ANY: Param = Param::Any;
const BOOL: Param = Param::Is(DataType::Bool);
const INT: Param = Param::Is(DataType::Int);
const DEC: Param = Param::Is(DataType::Decimal);
const STR: Param = Param::Is(DataType::Str);
const DATE: Param = Param::Is(DataType::Date);
const SET: Param = Param::Is(DataType::Set);
const AMOUNT: Param = Param::Is(DataType::Amount);
const POSITION: Param = Param::Is(DataType::Position);
const INVENTORY: Param = Param::Is(DataType::Inventory);
const OBJECT: Param = Param::Is(DataType::Object);

/// Functions available in every context.
pub const SCALAR_FUNCTIONS: &[FunctionDef] = &[
    // Casts
    FunctionDef::scalar("bool", &[ANY], DataType::Bool, cast_bool),
    FunctionDef::scalar("str", &[ANY], DataType::Str, cast_str),
    FunctionDef::scalar("int", &[BOOL], DataType::Int, cast_int),
    FunctionDef::scalar("int", &[INT], DataType::Int, cast_int),
    FunctionDef::scalar("int", &[DEC], DataType::Int, cast_int),
    FunctionDef::scalar("int", &[STR], DataType::Int, cast_int),
    FunctionDef::scalar("int", &[OBJECT], DataType::Int, cast_int),
    FunctionDef::scalar("decimal", &[BOOL], DataType::Decimal, cast_decimal),
    FunctionDef::scalar("decimal", &[INT], DataType::Decimal, cast_decimal),
    FunctionDef::scalar("decimal", &[DEC], DataType::Decimal, cast_decimal),
    FunctionDef::scalar("decimal", &[STR], DataType::Decimal, cast_decimal),
    FunctionDef::scalar("decimal", &[OBJECT], DataType::Decimal, cast_decimal),
    FunctionDef::scalar("date", &[STR], DataType::Date, cast_date),
    FunctionDef::scalar("date", &[DATE], DataType::Date, cast_date),
    FunctionDef::scalar("date", &[OBJECT], DataType::Date, cast_date),
    FunctionDef::scalar("date", &[INT, INT, INT], DataType::Date, make_date),
    // Numbers
    FunctionDef::scalar("round", &[INT], DataType::Int, round),
    FunctionDef::scalar("round", &[INT, INT], DataType::Int, round),
    FunctionDef::scalar("round", &[DEC], DataType::Decimal, round),
    FunctionDef::scalar("round", &[DEC, INT], DataType::Decimal, round),
    FunctionDef::checked("abs", &[INT], DataType::Int, abs),
    FunctionDef::checked("abs", &[DEC], DataType::Decimal, abs),
    FunctionDef::checked("abs", &[AMOUNT], DataType::Amount, abs),
    FunctionDef::checked("neg", &[INT], DataType::Int, neg),
    FunctionDef::checked("neg", &[DEC], DataType::Decimal, neg),
    FunctionDef::checked("neg", &[AMOUNT], DataType::Amount, neg),
    FunctionDef::checked("neg", &[POSITION], DataType::Position, neg),
    FunctionDef::checked("neg", &[INVENTORY], DataType::Inventory, neg),
    FunctionDef::scalar("safediv", &[DEC, DEC], DataType::Decimal, safediv),
    // Strings and sets
    FunctionDef::scalar("length", &[STR], DataType::Int, length),
    FunctionDef::scalar("length", &[SET], DataType::Int, length),
    FunctionDef::scalar("upper", &[STR], DataType::Str, upper),
    FunctionDef::scalar("lower", &[STR], DataType::Str, lower),
    FunctionDef::scalar("substr", &[STR, INT, INT], DataType::Str, substr),
    FunctionDef::scalar("joinstr", &[SET], DataType::Str, joinstr),
    // Dates
    FunctionDef::scalar("year", &[DATE], DataType::Int, year),
    FunctionDef::scalar("month", &[DATE], DataType::Int, month),
    FunctionDef::scalar("day", &[DATE], DataType::Int, day),
    FunctionDef::scalar("quarter", &[DATE], DataType::Str, quarter),
    FunctionDef::scalar("weekday", &[DATE], DataType::Str, weekday),
    FunctionDef::scalar("ymonth", &[DATE], DataType::Str, ymonth),
    FunctionDef::scalar("today", &[], DataType::Date, today),
    // Accounts
    FunctionDef::scalar("parent", &[STR], DataType::Str, parent),
    FunctionDef::scalar("leaf", &[STR], DataType::Str, leaf),
    FunctionDef::scalar("root", &[STR, INT], DataType::Str, root),
    // Amounts, positions and inventories
    FunctionDef::scalar("units", &[AMOUNT], DataType::Amount, units),
    FunctionDef::scalar("units", &[POSITION], DataType::Amount, units),
    FunctionDef::scalar("units", &[INVENTORY], DataType::Inventory, units),
    FunctionDef::scalar("cost", &[AMOUNT], DataType::Amount, cost),
    FunctionDef::scalar("cost", &[POSITION], DataType::Amount, cost),
    FunctionDef::scalar("cost", &[INVENTORY], DataType::Inventory, cost),
    FunctionDef::scalar("weight", &[POSITION], DataType::Amount, cost),
    FunctionDef::scalar("weight", &[INVENTORY], DataType::Inventory, cost),
    FunctionDef::scalar("number", &[AMOUNT], DataType::Decimal, number),
    FunctionDef::scalar("number", &[POSITION], DataType::Decimal, number),
    FunctionDef::scalar("currency", &[AMOUNT], DataType::Str, currency),
    FunctionDef::scalar("currency", &[POSITION], DataType::Str, currency),
    FunctionDef::scalar("only", &[STR, INVENTORY], DataType::Inventory, only),
    // Nulls
    FunctionDef::scalar("coalesce", &[ANY], DataType::Null, coalesce)
        .lenient()
        .variadic()
        .returning_operand(),
];

/// Functions of the entries context.
pub const ENTRY_FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::scalar("meta", &[STR], DataType::Object, entry_meta_fn),
    FunctionDef::pattern("has_account", &[STR], DataType::Bool, has_account),
];

/// Functions of the postings and targets contexts.
pub const POSTING_FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::scalar("meta", &[STR], DataType::Object, posting_meta_fn),
    FunctionDef::scalar("entry_meta", &[STR], DataType::Object, entry_meta_fn),
    FunctionDef::scalar("any_meta", &[STR], DataType::Object, any_meta),
];

/// Aggregate functions, only visible in the targets context.
pub const AGGREGATES: &[FunctionDef] = &[
    FunctionDef::aggregate("sum", &[INT], Returns::Type(DataType::Int), AggregateKind::Sum),
    FunctionDef::aggregate("sum", &[DEC], Returns::Type(DataType::Decimal), AggregateKind::Sum),
    FunctionDef::aggregate("sum", &[OBJECT], Returns::Type(DataType::Decimal), AggregateKind::Sum),
    FunctionDef::aggregate(
        "sum",
        &[AMOUNT],
        Returns::Type(DataType::Inventory),
        AggregateKind::Sum,
    ),
    FunctionDef::aggregate(
        "sum",
        &[POSITION],
        Returns::Type(DataType::Inventory),
        AggregateKind::Sum,
    ),
    FunctionDef::aggregate(
        "sum",
        &[INVENTORY],
        Returns::Type(DataType::Inventory),
        AggregateKind::Sum,
    ),
    FunctionDef::aggregate("count", &[ANY], Returns::Type(DataType::Int), AggregateKind::Count),
    FunctionDef::aggregate("first", &[ANY], Returns::FirstOperand, AggregateKind::First),
    FunctionDef::aggregate("last", &[ANY], Returns::FirstOperand, AggregateKind::Last),
    FunctionDef::aggregate("min", &[ANY], Returns::FirstOperand, AggregateKind::Min),
    FunctionDef::aggregate("max", &[ANY], Returns::FirstOperand, AggregateKind::Max),
    FunctionDef::aggregate("avg", &[DEC], Returns::Type(DataType::Decimal), AggregateKind::Avg),
    FunctionDef::aggregate("avg", &[OBJECT], Returns::Type(DataType::Decimal), AggregateKind::Avg),
];

fn cast_bool(args: &[Value], _: &Row<'_>) -> Value {
    args.first().map_or(Value::Null, cast::to_bool)
}

fn cast_str(args: &[Value], _: &Row<'_>) -> Value {
    args.first().map_or(Value::Null, cast::to_str)
}

fn cast_int(args: &[Value], _: &Row<'_>) -> Value {
    args.first().map_or(Value::Null, cast::to_int)
}

fn cast_decimal(args: &[Value], _: &Row<'_>) -> Value {
    args.first().map_or(Value::Null, cast::to_decimal)
}

fn cast_date(args: &[Value], _: &Row<'_>) -> Value {
    args.first().map_or(Value::Null, cast::to_date)
}

fn make_date(args: &[Value], _: &Row<'_>) -> Value {
    let [Value::Integer(y), Value::Integer(m), Value::Integer(d)] = args else {
        return Value::Null;
    };
    let date = i32::try_from(*y).ok().and_then(|y| {
        let m = u32::try_from(*m).ok()?;
        let d = u32::try_from(*d).ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    });
    date.map_or(Value::Null, Value::Date)
}

/// Round half to even at `digits` decimal places; negative digits round to
/// tens, hundreds and so on.
fn round_decimal(n: Decimal, digits: i64) -> Option<Decimal> {
    if digits >= 0 {
        let dp = u32::try_from(digits).ok()?;
        return Some(n.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven));
    }
    let exponent = u32::try_from(digits.checked_neg()?).ok()?;
    let factor = Decimal::from(10u64.checked_pow(exponent)?);
    let scaled = n.checked_div(factor)?;
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .checked_mul(factor)
}

fn round(args: &[Value], _: &Row<'_>) -> Value {
    let digits = match args.get(1) {
        Some(Value::Integer(d)) => *d,
        Some(_) => return Value::Null,
        None => 0,
    };
    match args.first() {
        Some(Value::Integer(n)) => round_decimal(Decimal::from(*n), digits)
            .and_then(|r| r.to_i64())
            .map_or(Value::Null, Value::Integer),
        Some(Value::Number(n)) => round_decimal(*n, digits).map_or(Value::Null, Value::Number),
        _ => Value::Null,
    }
}

fn abs(args: &[Value], _: &Row<'_>) -> Option<Value> {
    Some(match args {
        [Value::Integer(n)] => Value::Integer(n.checked_abs()?),
        [Value::Number(n)] => Value::Number(n.abs()),
        [Value::Amount(a)] => Value::Amount(a.abs()),
        _ => Value::Null,
    })
}

fn neg(args: &[Value], _: &Row<'_>) -> Option<Value> {
    Some(match args {
        [Value::Integer(n)] => Value::Integer(n.checked_neg()?),
        [Value::Number(n)] => Value::Number(-*n),
        [Value::Amount(a)] => Value::Amount(-a),
        [Value::Position(p)] => Value::Position(p.neg()),
        [Value::Inventory(inv)] => Value::Inventory(inv.neg()),
        _ => Value::Null,
    })
}

fn safediv(args: &[Value], _: &Row<'_>) -> Value {
    let [x, y] = args else {
        return Value::Null;
    };
    let (Some(x), Some(y)) = (x.as_decimal(), y.as_decimal()) else {
        return Value::Null;
    };
    if y.is_zero() {
        return Value::Number(Decimal::ZERO);
    }
    x.checked_div(y).map_or(Value::Null, Value::Number)
}

fn length(args: &[Value], _: &Row<'_>) -> Value {
    let len = match args {
        [Value::String(s)] => s.chars().count(),
        [Value::Set(items)] => items.len(),
        _ => return Value::Null,
    };
    i64::try_from(len).map_or(Value::Null, Value::Integer)
}

fn upper(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::String(s)] => Value::String(s.to_uppercase()),
        _ => Value::Null,
    }
}

fn lower(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::String(s)] => Value::String(s.to_lowercase()),
        _ => Value::Null,
    }
}

fn substr(args: &[Value], _: &Row<'_>) -> Value {
    let [Value::String(s), Value::Integer(start), Value::Integer(end)] = args else {
        return Value::Null;
    };
    let start = usize::try_from(*start).unwrap_or(0);
    let end = usize::try_from(*end).unwrap_or(0);
    Value::String(
        s.chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect(),
    )
}

fn joinstr(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::Set(items)] => Value::String(
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => Value::Null,
    }
}

fn date_part(args: &[Value], part: impl Fn(NaiveDate) -> Value) -> Value {
    match args {
        [Value::Date(d)] => part(*d),
        _ => Value::Null,
    }
}

fn year(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| Value::Integer(i64::from(d.year())))
}

fn month(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| Value::Integer(i64::from(d.month())))
}

fn day(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| Value::Integer(i64::from(d.day())))
}

fn quarter(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| {
        Value::String(format!("{}-Q{}", d.year(), (d.month() - 1) / 3 + 1))
    })
}

fn weekday(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| Value::String(d.format("%a").to_string()))
}

fn ymonth(args: &[Value], _: &Row<'_>) -> Value {
    date_part(args, |d| Value::String(d.format("%Y-%m").to_string()))
}

fn today(_: &[Value], _: &Row<'_>) -> Value {
    Value::Date(Local::now().date_naive())
}

fn parent(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::String(account)] => account
            .rsplit_once(':')
            .map_or(Value::Null, |(parent, _)| Value::String(parent.to_string())),
        _ => Value::Null,
    }
}

fn leaf(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::String(account)] => {
            let leaf = account.rsplit(':').next().unwrap_or(account);
            Value::String(leaf.to_string())
        }
        _ => Value::Null,
    }
}

fn root(args: &[Value], _: &Row<'_>) -> Value {
    let [Value::String(account), Value::Integer(n)] = args else {
        return Value::Null;
    };
    let n = usize::try_from(*n).unwrap_or(0);
    Value::String(account.split(':').take(n).collect::<Vec<_>>().join(":"))
}

fn units(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::Amount(a)] => Value::Amount(a.clone()),
        [Value::Position(p)] => Value::Amount(p.units.clone()),
        [Value::Inventory(inv)] => Value::Inventory(inv.at_units()),
        _ => Value::Null,
    }
}

fn cost(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::Amount(a)] => Value::Amount(a.clone()),
        [Value::Position(p)] => Value::Amount(p.at_cost()),
        [Value::Inventory(inv)] => Value::Inventory(inv.at_cost()),
        _ => Value::Null,
    }
}

fn number(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::Amount(a)] => Value::Number(a.number),
        [Value::Position(p)] => Value::Number(p.units.number),
        _ => Value::Null,
    }
}

fn currency(args: &[Value], _: &Row<'_>) -> Value {
    let amount: &Amount = match args {
        [Value::Amount(a)] => a,
        [Value::Position(p)] => &p.units,
        _ => return Value::Null,
    };
    Value::String(amount.currency.clone())
}

fn only(args: &[Value], _: &Row<'_>) -> Value {
    match args {
        [Value::String(currency), Value::Inventory(inv)] => Value::Inventory(inv.only(currency)),
        _ => Value::Null,
    }
}

fn coalesce(args: &[Value], _: &Row<'_>) -> Value {
    args.iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null)
}

fn entry_meta_fn(args: &[Value], row: &Row<'_>) -> Value {
    match args {
        [Value::String(key)] => entry_meta(row, key),
        _ => Value::Null,
    }
}

fn posting_meta_fn(args: &[Value], row: &Row<'_>) -> Value {
    match args {
        [Value::String(key)] => posting_meta(row, key),
        _ => Value::Null,
    }
}

fn any_meta(args: &[Value], row: &Row<'_>) -> Value {
    match args {
        [Value::String(key)] => match posting_meta(row, key) {
            Value::Null => entry_meta(row, key),
            found => found,
        },
        _ => Value::Null,
    }
}

fn has_account(regex: &Regex, row: &Row<'_>) -> Value {
    let found = row
        .entry
        .and_then(|e| e.as_transaction())
        .is_some_and(|txn| txn.postings.iter().any(|p| regex.is_match(&p.account)));
    Value::Boolean(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerql_core::{Cost, Options, Position};
    use rust_decimal_macros::dec;

    fn call(function: fn(&[Value], &Row<'_>) -> Value, args: &[Value]) -> Value {
        let options = Options::default();
        function(args, &Row::empty(&options))
    }

    fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn test_round() {
        assert_eq!(call(round, &[Value::Number(dec!(2.5))]), Value::Number(dec!(2)));
        assert_eq!(call(round, &[Value::Number(dec!(3.5))]), Value::Number(dec!(4)));
        assert_eq!(
            call(round, &[Value::Number(dec!(1.2345)), Value::Integer(2)]),
            Value::Number(dec!(1.23))
        );
        assert_eq!(
            call(round, &[Value::Integer(12), Value::Integer(-1)]),
            Value::Integer(10)
        );
        assert_eq!(
            call(round, &[Value::Integer(15), Value::Integer(-1)]),
            Value::Integer(20)
        );
    }

    #[test]
    fn test_safediv() {
        assert_eq!(
            call(safediv, &[Value::Integer(1), Value::Integer(0)]),
            Value::Number(Decimal::ZERO)
        );
        assert_eq!(
            call(safediv, &[Value::Number(dec!(3)), Value::Integer(2)]),
            Value::Number(dec!(1.5))
        );
    }

    #[test]
    fn test_sign_functions_report_overflow() {
        let options = Options::default();
        let row = Row::empty(&options);
        assert_eq!(abs(&[Value::Integer(-3)], &row), Some(Value::Integer(3)));
        assert_eq!(neg(&[Value::Number(dec!(1.5))], &row), Some(Value::Number(dec!(-1.5))));
        assert_eq!(abs(&[Value::Integer(i64::MIN)], &row), None);
        assert_eq!(neg(&[Value::Integer(i64::MIN)], &row), None);
    }

    #[test]
    fn test_make_date() {
        assert_eq!(
            call(make_date, &[Value::Integer(2022), Value::Integer(4), Value::Integer(5)]),
            Value::Date(NaiveDate::from_ymd_opt(2022, 4, 5).unwrap())
        );
        assert_eq!(
            call(make_date, &[Value::Integer(2022), Value::Integer(2), Value::Integer(30)]),
            Value::Null
        );
    }

    #[test]
    fn test_date_parts() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(call(quarter, &[d.clone()]), s("2024-Q2"));
        assert_eq!(call(weekday, &[d.clone()]), s("Mon"));
        assert_eq!(call(ymonth, &[d]), s("2024-05"));
    }

    #[test]
    fn test_account_functions() {
        let account = s("Assets:Bank:Checking");
        assert_eq!(call(parent, &[account.clone()]), s("Assets:Bank"));
        assert_eq!(call(leaf, &[account.clone()]), s("Checking"));
        assert_eq!(call(root, &[account, Value::Integer(2)]), s("Assets:Bank"));
        assert_eq!(call(parent, &[s("Assets")]), Value::Null);
    }

    #[test]
    fn test_position_functions() {
        let pos = Value::Position(Position::with_cost(
            Amount::new(dec!(10), "HOOL"),
            Cost::new(dec!(5), "USD"),
        ));
        assert_eq!(
            call(units, &[pos.clone()]),
            Value::Amount(Amount::new(dec!(10), "HOOL"))
        );
        assert_eq!(
            call(cost, &[pos.clone()]),
            Value::Amount(Amount::new(dec!(50), "USD"))
        );
        assert_eq!(call(number, &[pos.clone()]), Value::Number(dec!(10)));
        assert_eq!(call(currency, &[pos]), s("HOOL"));
    }

    #[test]
    fn test_coalesce() {
        assert_eq!(call(coalesce, &[Value::Null, s("a"), s("b")]), s("a"));
        assert_eq!(call(coalesce, &[Value::Null]), Value::Null);
    }

    #[test]
    fn test_strings() {
        assert_eq!(call(length, &[s("héllo")]), Value::Integer(5));
        assert_eq!(call(upper, &[s("abc")]), s("ABC"));
        assert_eq!(
            call(substr, &[s("abcdef"), Value::Integer(1), Value::Integer(3)]),
            s("bc")
        );
    }
}
