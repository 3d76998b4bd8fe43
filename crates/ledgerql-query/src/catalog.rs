//! Column and function catalogs.
//!
//! Each evaluation context has its own catalog: [`EntriesEnvironment`] for
//! the FROM clause, [`PostingsEnvironment`] for WHERE and
//! [`TargetsEnvironment`] for SELECT, GROUP BY, ORDER BY and HAVING. The
//! compiler only talks to them through the [`Environment`] trait.

use chrono::Datelike;
use regex::Regex;

use ledgerql_core::{Directive, Position, Posting, Transaction};

use crate::aggregate::AggregateKind;
use crate::context::Row;
use crate::error::CompilationError;
use crate::functions::{AGGREGATES, ENTRY_FUNCTIONS, POSTING_FUNCTIONS, SCALAR_FUNCTIONS};
use crate::types::{DataType, Value};

/// Reads one column out of a row.
pub type ColumnAccessor = fn(&Row<'_>) -> Value;

/// Implementation of a scalar function.
pub type ScalarFn = fn(&[Value], &Row<'_>) -> Value;

/// Implementation of a scalar function that can overflow. `None` reports
/// the overflow.
pub type CheckedFn = fn(&[Value], &Row<'_>) -> Option<Value>;

/// Implementation of a scalar function over a pattern operand, receiving
/// the compiled pattern instead of its text.
pub type PatternFn = fn(&Regex, &Row<'_>) -> Value;

/// Row-level implementation of a scalar overload.
#[derive(Debug, Clone, Copy)]
pub enum ScalarImpl {
    /// Always produces a value.
    Total(ScalarFn),
    /// Fails on integer overflow.
    Checked(CheckedFn),
    /// Takes a regular expression as its single operand.
    Pattern(PatternFn),
}

/// A named, typed column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name, lower-case.
    pub name: &'static str,
    /// Type of the values the accessor returns.
    pub dtype: DataType,
    /// Accessor.
    pub accessor: ColumnAccessor,
}

impl ColumnDef {
    const fn new(name: &'static str, dtype: DataType, accessor: ColumnAccessor) -> Self {
        Self {
            name,
            dtype,
            accessor,
        }
    }
}

/// One formal parameter of a function overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Accepts operands of exactly this type.
    Is(DataType),
    /// Accepts any operand, including NULL.
    Any,
}

/// How the result type of an overload is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    /// A fixed type.
    Type(DataType),
    /// The type of the first operand that is not the NULL literal.
    FirstOperand,
}

/// Scalar or aggregate implementation.
#[derive(Debug, Clone, Copy)]
pub enum FunctionKind {
    /// Evaluated once per row.
    Scalar(ScalarImpl),
    /// Accumulated over the rows of a group.
    Aggregate(AggregateKind),
}

/// One overload of a function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    /// Function name, lower-case.
    pub name: &'static str,
    /// Formal parameters.
    pub params: &'static [Param],
    /// The single parameter repeats for one or more operands.
    pub variadic: bool,
    /// Result type rule.
    pub returns: Returns,
    /// Result is null whenever an operand is null.
    pub strict: bool,
    /// Implementation.
    pub kind: FunctionKind,
}

impl FunctionDef {
    const fn with_impl(
        name: &'static str,
        params: &'static [Param],
        returns: DataType,
        implementation: ScalarImpl,
    ) -> Self {
        Self {
            name,
            params,
            variadic: false,
            returns: Returns::Type(returns),
            strict: true,
            kind: FunctionKind::Scalar(implementation),
        }
    }

    /// A strict scalar overload with a fixed result type.
    pub const fn scalar(
        name: &'static str,
        params: &'static [Param],
        returns: DataType,
        function: ScalarFn,
    ) -> Self {
        Self::with_impl(name, params, returns, ScalarImpl::Total(function))
    }

    /// A strict scalar overload whose implementation may overflow.
    pub const fn checked(
        name: &'static str,
        params: &'static [Param],
        returns: DataType,
        function: CheckedFn,
    ) -> Self {
        Self::with_impl(name, params, returns, ScalarImpl::Checked(function))
    }

    /// A strict scalar overload taking one pattern operand.
    pub const fn pattern(
        name: &'static str,
        params: &'static [Param],
        returns: DataType,
        function: PatternFn,
    ) -> Self {
        Self::with_impl(name, params, returns, ScalarImpl::Pattern(function))
    }

    /// An aggregate overload.
    pub const fn aggregate(
        name: &'static str,
        params: &'static [Param],
        returns: Returns,
        kind: AggregateKind,
    ) -> Self {
        Self {
            name,
            params,
            variadic: false,
            returns,
            strict: false,
            kind: FunctionKind::Aggregate(kind),
        }
    }

    /// Mark the overload as receiving null operands.
    pub const fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Mark the single parameter as repeating.
    pub const fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Use the first operand's type as result type.
    pub const fn returning_operand(mut self) -> Self {
        self.returns = Returns::FirstOperand;
        self
    }

    /// Whether this overload aggregates.
    pub const fn is_aggregate(&self) -> bool {
        matches!(self.kind, FunctionKind::Aggregate(_))
    }

    /// Whether the overload accepts the operand types. With `promote`,
    /// integer operands also match decimal parameters.
    pub fn accepts(&self, operands: &[DataType], promote: bool) -> bool {
        let matches = |param: &Param, dtype: DataType| match param {
            Param::Any => true,
            Param::Is(expected) => {
                *expected == dtype
                    || (promote && *expected == DataType::Decimal && dtype == DataType::Int)
            }
        };
        if self.variadic {
            let Some(param) = self.params.first() else {
                return false;
            };
            if operands.is_empty() || !operands.iter().all(|t| matches(param, *t)) {
                return false;
            }
            let mut concrete = operands.iter().filter(|t| **t != DataType::Null);
            concrete
                .next()
                .map_or(true, |first| concrete.all(|t| t == first))
        } else {
            self.params.len() == operands.len()
                && self.params.iter().zip(operands).all(|(p, t)| matches(p, *t))
        }
    }

    /// Result type for the given operand types.
    pub fn result_type(&self, operands: &[DataType]) -> DataType {
        match self.returns {
            Returns::Type(dtype) => dtype,
            Returns::FirstOperand => operands
                .iter()
                .copied()
                .find(|t| *t != DataType::Null)
                .unwrap_or(DataType::Null),
        }
    }
}

/// Name resolution for one evaluation context.
pub trait Environment {
    /// Context name used in error messages.
    fn context(&self) -> &'static str;

    /// Column tables visible in this context.
    fn column_tables(&self) -> &'static [&'static [ColumnDef]];

    /// Function tables visible in this context.
    fn function_tables(&self) -> &'static [&'static [FunctionDef]];

    /// Whether aggregate functions may be used.
    fn allows_aggregates(&self) -> bool {
        false
    }

    /// Look up a column by case-insensitive name.
    fn resolve_column(&self, name: &str) -> Result<&'static ColumnDef, CompilationError> {
        self.column_tables()
            .iter()
            .flat_map(|table| table.iter())
            .find(|column| column.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CompilationError::UnknownColumn {
                name: name.to_string(),
                context: self.context(),
            })
    }

    /// Pick the overload of `name` matching the operand types, trying exact
    /// matches before integer-to-decimal promotion. `expr` is the canonical
    /// name of the call, for errors.
    fn resolve_function(
        &self,
        name: &str,
        operands: &[DataType],
        expr: &str,
    ) -> Result<&'static FunctionDef, CompilationError> {
        let candidates: Vec<&'static FunctionDef> = self
            .function_tables()
            .iter()
            .flat_map(|table| table.iter())
            .filter(|function| function.name.eq_ignore_ascii_case(name))
            .collect();
        if candidates.is_empty() {
            return Err(CompilationError::UnknownFunction {
                name: name.to_lowercase(),
                context: self.context(),
            });
        }
        [false, true]
            .into_iter()
            .find_map(|promote| {
                candidates
                    .iter()
                    .copied()
                    .find(|function| function.accepts(operands, promote))
            })
            .ok_or_else(|| CompilationError::NoMatchingOverload {
                expr: expr.to_string(),
                operand_types: operands.to_vec(),
            })
    }
}

/// Whether `name` denotes an aggregate function.
pub fn is_aggregate_name(name: &str) -> bool {
    AGGREGATES.iter().any(|f| f.name.eq_ignore_ascii_case(name))
}

/// Entry-level context of the FROM clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntriesEnvironment;

/// Posting-level context of the WHERE clause.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostingsEnvironment;

/// Posting-level context with aggregates, for SELECT, GROUP BY, ORDER BY
/// and HAVING.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetsEnvironment;

impl Environment for EntriesEnvironment {
    fn context(&self) -> &'static str {
        "entries"
    }

    fn column_tables(&self) -> &'static [&'static [ColumnDef]] {
        &[ENTRY_COLUMNS]
    }

    fn function_tables(&self) -> &'static [&'static [FunctionDef]] {
        &[SCALAR_FUNCTIONS, ENTRY_FUNCTIONS]
    }
}

impl Environment for PostingsEnvironment {
    fn context(&self) -> &'static str {
        "postings"
    }

    fn column_tables(&self) -> &'static [&'static [ColumnDef]] {
        &[ENTRY_COLUMNS, POSTING_COLUMNS]
    }

    fn function_tables(&self) -> &'static [&'static [FunctionDef]] {
        &[SCALAR_FUNCTIONS, POSTING_FUNCTIONS]
    }
}

impl Environment for TargetsEnvironment {
    fn context(&self) -> &'static str {
        "targets"
    }

    fn column_tables(&self) -> &'static [&'static [ColumnDef]] {
        &[ENTRY_COLUMNS, POSTING_COLUMNS]
    }

    fn function_tables(&self) -> &'static [&'static [FunctionDef]] {
        &[SCALAR_FUNCTIONS, POSTING_FUNCTIONS, AGGREGATES]
    }

    fn allows_aggregates(&self) -> bool {
        true
    }
}

/// Columns `SELECT *` expands to.
pub const WILDCARD_COLUMNS: &[&str] =
    &["date", "flag", "payee", "narration", "account", "position"];

/// Columns read from the entry.
pub const ENTRY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("type", DataType::Str, entry_type),
    ColumnDef::new("date", DataType::Date, entry_date),
    ColumnDef::new("year", DataType::Int, entry_year),
    ColumnDef::new("month", DataType::Int, entry_month),
    ColumnDef::new("day", DataType::Int, entry_day),
    ColumnDef::new("flag", DataType::Str, entry_flag),
    ColumnDef::new("payee", DataType::Str, entry_payee),
    ColumnDef::new("narration", DataType::Str, entry_narration),
    ColumnDef::new("description", DataType::Str, entry_description),
    ColumnDef::new("tags", DataType::Set, entry_tags),
    ColumnDef::new("links", DataType::Set, entry_links),
];

/// Columns read from the posting.
pub const POSTING_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("posting_flag", DataType::Str, posting_flag),
    ColumnDef::new("account", DataType::Str, posting_account),
    ColumnDef::new("other_accounts", DataType::Set, other_accounts),
    ColumnDef::new("number", DataType::Decimal, posting_number),
    ColumnDef::new("currency", DataType::Str, posting_currency),
    ColumnDef::new("cost_number", DataType::Decimal, cost_number),
    ColumnDef::new("cost_currency", DataType::Str, cost_currency),
    ColumnDef::new("cost_date", DataType::Date, cost_date),
    ColumnDef::new("cost_label", DataType::Str, cost_label),
    ColumnDef::new("position", DataType::Position, posting_position),
    ColumnDef::new("price", DataType::Amount, posting_price),
    ColumnDef::new("weight", DataType::Amount, posting_weight),
    ColumnDef::new("balance", DataType::Inventory, running_balance),
];

/// The position a posting adds to its account.
pub fn position_of(posting: &Posting) -> Position {
    Position {
        units: posting.units.clone(),
        cost: posting.cost.clone(),
    }
}

fn transaction<'a>(row: &Row<'a>) -> Option<&'a Transaction> {
    row.entry.and_then(Directive::as_transaction)
}

fn string_set(items: &[String]) -> Value {
    Value::Set(items.iter().cloned().map(Value::String).collect())
}

fn entry_type(row: &Row<'_>) -> Value {
    row.entry
        .map_or(Value::Null, |e| Value::String(e.type_name().to_string()))
}

fn entry_date(row: &Row<'_>) -> Value {
    row.entry.map_or(Value::Null, |e| Value::Date(e.date()))
}

fn entry_year(row: &Row<'_>) -> Value {
    row.entry
        .map_or(Value::Null, |e| Value::Integer(i64::from(e.date().year())))
}

fn entry_month(row: &Row<'_>) -> Value {
    row.entry
        .map_or(Value::Null, |e| Value::Integer(i64::from(e.date().month())))
}

fn entry_day(row: &Row<'_>) -> Value {
    row.entry
        .map_or(Value::Null, |e| Value::Integer(i64::from(e.date().day())))
}

fn entry_flag(row: &Row<'_>) -> Value {
    transaction(row).map_or(Value::Null, |t| Value::String(t.flag.to_string()))
}

fn entry_payee(row: &Row<'_>) -> Value {
    transaction(row).map_or(Value::Null, |t| t.payee.clone().into())
}

fn entry_narration(row: &Row<'_>) -> Value {
    match row.entry {
        Some(Directive::Transaction(t)) => Value::String(t.narration.clone()),
        Some(Directive::Note(n)) => Value::String(n.comment.clone()),
        _ => Value::Null,
    }
}

fn entry_description(row: &Row<'_>) -> Value {
    transaction(row).map_or(Value::Null, |t| match &t.payee {
        Some(payee) => Value::String(format!("{payee} | {}", t.narration)),
        None => Value::String(t.narration.clone()),
    })
}

fn entry_tags(row: &Row<'_>) -> Value {
    match (row.entry, transaction(row)) {
        (_, Some(t)) => string_set(&t.tags),
        (Some(_), None) => Value::Set(Vec::new()),
        (None, None) => Value::Null,
    }
}

fn entry_links(row: &Row<'_>) -> Value {
    match (row.entry, transaction(row)) {
        (_, Some(t)) => string_set(&t.links),
        (Some(_), None) => Value::Set(Vec::new()),
        (None, None) => Value::Null,
    }
}

fn posting_flag(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.flag)
        .map_or(Value::Null, |flag| Value::String(flag.to_string()))
}

fn posting_account(row: &Row<'_>) -> Value {
    row.posting
        .map_or(Value::Null, |p| Value::String(p.account.clone()))
}

fn other_accounts(row: &Row<'_>) -> Value {
    let (Some(txn), Some(posting)) = (transaction(row), row.posting) else {
        return Value::Null;
    };
    let mut accounts: Vec<String> = txn
        .postings
        .iter()
        .filter(|other| !std::ptr::eq(*other, posting))
        .map(|other| other.account.clone())
        .collect();
    accounts.sort();
    accounts.dedup();
    Value::Set(accounts.into_iter().map(Value::String).collect())
}

fn posting_number(row: &Row<'_>) -> Value {
    row.posting
        .map_or(Value::Null, |p| Value::Number(p.units.number))
}

fn posting_currency(row: &Row<'_>) -> Value {
    row.posting
        .map_or(Value::Null, |p| Value::String(p.units.currency.clone()))
}

fn cost_number(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.cost.as_ref())
        .map_or(Value::Null, |c| Value::Number(c.number))
}

fn cost_currency(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.cost.as_ref())
        .map_or(Value::Null, |c| Value::String(c.currency.clone()))
}

fn cost_date(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.cost.as_ref())
        .and_then(|c| c.date)
        .map_or(Value::Null, Value::Date)
}

fn cost_label(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.cost.as_ref())
        .map_or(Value::Null, |c| c.label.clone().into())
}

fn posting_position(row: &Row<'_>) -> Value {
    row.posting
        .map_or(Value::Null, |p| Value::Position(position_of(p)))
}

fn posting_price(row: &Row<'_>) -> Value {
    row.posting
        .and_then(|p| p.price.clone())
        .map_or(Value::Null, Value::Amount)
}

fn posting_weight(row: &Row<'_>) -> Value {
    row.posting.map_or(Value::Null, |p| Value::Amount(p.weight()))
}

fn running_balance(row: &Row<'_>) -> Value {
    row.balance.clone().map_or(Value::Null, Value::Inventory)
}

/// Posting metadata value for `key`.
pub(crate) fn posting_meta(row: &Row<'_>, key: &str) -> Value {
    row.posting
        .and_then(|p| p.meta.get(key))
        .map_or(Value::Null, Value::from)
}

/// Entry metadata value for `key`.
pub(crate) fn entry_meta(row: &Row<'_>, key: &str) -> Value {
    row.entry
        .and_then(|e| e.meta().get(key))
        .map_or(Value::Null, Value::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerql_core::{Amount, Cost, MetaValue, NaiveDate, Options};
    use rust_decimal_macros::dec;

    fn sample() -> Directive {
        Directive::Transaction(
            Transaction::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), "Coffee")
                .with_payee("Cafe")
                .with_tag("trip")
                .with_meta("kind", MetaValue::String("food".to_string()))
                .with_posting(
                    Posting::new("Expenses:Coffee", Amount::new(dec!(4.50), "USD"))
                        .with_meta("note", MetaValue::Number(dec!(3))),
                )
                .with_posting(Posting::new(
                    "Assets:Cash",
                    Amount::new(dec!(-4.50), "USD"),
                ))
                .with_posting(
                    Posting::new("Assets:Broker", Amount::new(dec!(2), "HOOL"))
                        .with_cost(Cost::new(dec!(10), "USD")),
                ),
        )
    }

    fn posting_row<'a>(entry: &'a Directive, index: usize, options: &'a Options) -> Row<'a> {
        let posting = &entry.as_transaction().unwrap().postings[index];
        Row::posting(entry, posting, options)
    }

    #[test]
    fn test_entry_columns() {
        let entry = sample();
        let options = Options::default();
        let row = Row::entry(&entry, &options);
        let env = EntriesEnvironment;
        let read = |name: &str| (env.resolve_column(name).unwrap().accessor)(&row);

        assert_eq!(read("type"), Value::String("transaction".to_string()));
        assert_eq!(read("YEAR"), Value::Integer(2024));
        assert_eq!(read("description"), Value::String("Cafe | Coffee".to_string()));
        assert_eq!(read("tags"), Value::Set(vec![Value::String("trip".to_string())]));
        assert!(env.resolve_column("account").is_err());
    }

    #[test]
    fn test_posting_columns() {
        let entry = sample();
        let options = Options::default();
        let env = PostingsEnvironment;
        let row = posting_row(&entry, 2, &options);
        let read = |name: &str| (env.resolve_column(name).unwrap().accessor)(&row);

        assert_eq!(read("account"), Value::String("Assets:Broker".to_string()));
        assert_eq!(read("cost_number"), Value::Number(dec!(10)));
        assert_eq!(read("weight"), Value::Amount(Amount::new(dec!(20), "USD")));
        assert_eq!(read("price"), Value::Null);
        assert_eq!(read("balance"), Value::Null);
        assert_eq!(
            read("other_accounts"),
            Value::Set(vec![
                Value::String("Assets:Cash".to_string()),
                Value::String("Expenses:Coffee".to_string()),
            ])
        );
    }

    #[test]
    fn test_empty_row_reads_null() {
        let options = Options::default();
        let row = Row::empty(&options);
        for column in ENTRY_COLUMNS.iter().chain(POSTING_COLUMNS) {
            assert_eq!((column.accessor)(&row), Value::Null, "{}", column.name);
        }
    }

    #[test]
    fn test_meta_lookups() {
        let entry = sample();
        let options = Options::default();
        let row = posting_row(&entry, 0, &options);
        assert_eq!(posting_meta(&row, "note"), Value::Number(dec!(3)));
        assert_eq!(posting_meta(&row, "kind"), Value::Null);
        assert_eq!(entry_meta(&row, "kind"), Value::String("food".to_string()));
    }

    #[test]
    fn test_function_resolution() {
        let env = TargetsEnvironment;
        let round = env
            .resolve_function("ROUND", &[DataType::Int], "round(12)")
            .unwrap();
        assert_eq!(round.result_type(&[DataType::Int]), DataType::Int);

        let safediv = env
            .resolve_function("safediv", &[DataType::Int, DataType::Int], "safediv(4, 0)")
            .unwrap();
        assert_eq!(safediv.result_type(&[]), DataType::Decimal);

        assert!(matches!(
            env.resolve_function("int", &[DataType::Date], "int(2022-04-05)"),
            Err(CompilationError::NoMatchingOverload { .. })
        ));
        assert!(matches!(
            env.resolve_function("nope", &[], "nope()"),
            Err(CompilationError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_aggregates_only_in_targets() {
        let types = [DataType::Decimal];
        assert!(TargetsEnvironment.resolve_function("sum", &types, "sum(x)").is_ok());
        assert!(PostingsEnvironment.resolve_function("sum", &types, "sum(x)").is_err());
        assert!(is_aggregate_name("SUM"));
        assert!(!is_aggregate_name("length"));
    }

    #[test]
    fn test_coalesce_requires_one_type() {
        let env = PostingsEnvironment;
        assert!(env
            .resolve_function("coalesce", &[DataType::Str, DataType::Str], "c")
            .is_ok());
        assert!(env
            .resolve_function("coalesce", &[DataType::Object, DataType::Str], "c")
            .is_err());
        let def = env
            .resolve_function("coalesce", &[DataType::Null, DataType::Int], "c")
            .unwrap();
        assert_eq!(def.result_type(&[DataType::Null, DataType::Int]), DataType::Int);
    }
}
