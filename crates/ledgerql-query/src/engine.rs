//! Query execution.
//!
//! Runs a [`CompiledStatement`] over an in-memory entry list. The stages are
//! filter, row expansion, grouping and aggregation, HAVING, DISTINCT, ORDER
//! BY, PIVOT BY and LIMIT, in that order.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use ledgerql_core::{format_directive, Directive, FormatConfig, Inventory, Options};

use crate::ast::{Query, SortDirection};
use crate::catalog::position_of;
use crate::context::{Row, RowContext};
use crate::error::{ArithmeticError, QueryError};
use crate::parser::parse;
use crate::statement::{compile, CompiledPivot, CompiledPrint, CompiledQuery, CompiledStatement};
use crate::summarize::filter_entries;
use crate::types::{DataType, Value};

/// A column of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    /// Column name.
    pub name: String,
    /// Declared type; every non-null cell of the column has this type.
    pub dtype: DataType,
}

impl ResultColumn {
    /// Create a column.
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Query result containing the column header and the rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column header.
    pub columns: Vec<ResultColumn>,
    /// Result rows; each has one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Create a new empty result.
    pub const fn new(columns: Vec<ResultColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Add a row to the result.
    pub fn add_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Index of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Executes queries against a fixed list of entries.
///
/// Entries are expected in date order, as produced by
/// [`ledgerql_core::sort_directives`].
#[derive(Debug, Clone)]
pub struct Executor<'a> {
    entries: &'a [Directive],
    options: Options,
}

impl<'a> Executor<'a> {
    /// Create an executor with default options.
    pub fn new(entries: &'a [Directive]) -> Self {
        Self {
            entries,
            options: Options::default(),
        }
    }

    /// Replace the ledger options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Ledger options in use.
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Parse, compile and execute a query string.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the query does not parse, does not compile,
    /// or fails during evaluation.
    pub fn run(&self, source: &str) -> Result<QueryResult, QueryError> {
        let query = parse(source)?;
        self.execute(&query)
    }

    /// Compile and execute a parsed query.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the query does not compile or fails during
    /// evaluation.
    pub fn execute(&self, query: &Query) -> Result<QueryResult, QueryError> {
        let statement = compile(query)?;
        Ok(self.execute_compiled(&statement)?)
    }

    /// Execute an already compiled statement.
    ///
    /// # Errors
    ///
    /// Returns `ArithmeticError` if an expression fails during evaluation.
    pub fn execute_compiled(
        &self,
        statement: &CompiledStatement,
    ) -> Result<QueryResult, ArithmeticError> {
        match statement {
            CompiledStatement::Select(query) => self.execute_select(query),
            CompiledStatement::Print(print) => self.execute_print(print),
        }
    }

    fn execute_print(&self, print: &CompiledPrint) -> Result<QueryResult, ArithmeticError> {
        let entries = filter_entries(print.from.as_ref(), self.entries, &self.options)?;
        let config = FormatConfig::default();
        let mut result = QueryResult::new(vec![ResultColumn::new("entry", DataType::Str)]);
        for entry in &entries {
            result.add_row(vec![Value::String(format_directive(entry, &config))]);
        }
        Ok(result)
    }

    fn execute_select(&self, query: &CompiledQuery) -> Result<QueryResult, ArithmeticError> {
        let entries = filter_entries(query.from.as_ref(), self.entries, &self.options)?;
        let rows = self.expand_rows(query, &entries)?;
        let row_count = rows.len();

        let mut records = if query.aggregated {
            aggregate(query, rows, &self.options)?
        } else {
            evaluate(query, &rows)?
        };

        let visible = query.visible_count();
        if query.distinct {
            let mut seen = HashSet::new();
            records.retain(|record| seen.insert(record[..visible].to_vec()));
        }
        if !query.order_by.is_empty() {
            records.sort_by(|a, b| compare_records(a, b, &query.order_by));
        }
        for record in &mut records {
            record.truncate(visible);
        }

        let columns = query
            .columns()
            .into_iter()
            .map(|(name, dtype)| ResultColumn::new(name, dtype))
            .collect();
        let mut result = QueryResult {
            columns,
            rows: records,
        };
        if let Some(pivot) = &query.pivot {
            result = pivot_result(&result, pivot);
        }
        if let Some(limit) = query.limit {
            result.rows.truncate(limit);
        }

        tracing::debug!(
            "executed query: {} rows in, {} rows out",
            row_count,
            result.len()
        );
        Ok(result)
    }

    /// One row per posting of every transaction that passes WHERE.
    fn expand_rows<'e>(
        &'e self,
        query: &CompiledQuery,
        entries: &'e [Cow<'e, Directive>],
    ) -> Result<Vec<Row<'e>>, ArithmeticError> {
        let ctx = query.allocator.create_store();
        let mut running = Inventory::new();
        let mut rows = Vec::new();
        for entry in entries {
            let Some(txn) = entry.as_transaction() else {
                continue;
            };
            for posting in &txn.postings {
                let mut row = Row::posting(entry, posting, &self.options);
                let mut balance = None;
                if query.uses_balance {
                    let mut tentative = running.clone();
                    tentative.add(position_of(posting));
                    row = row.with_balance(tentative.clone());
                    balance = Some(tentative);
                }
                if let Some(filter) = &query.where_clause {
                    if !filter.evaluate(&row, &ctx)?.truthy() {
                        continue;
                    }
                }
                if let Some(balance) = balance {
                    running = balance;
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// Evaluate every target for every row.
fn evaluate(query: &CompiledQuery, rows: &[Row<'_>]) -> Result<Vec<Vec<Value>>, ArithmeticError> {
    let mut ctx = query.allocator.create_store();
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Vec::with_capacity(query.targets.len());
        for target in &query.targets {
            let value = target.expr.evaluate(row, &ctx)?;
            ctx.set(target.slot, value.clone());
            record.push(value);
        }
        records.push(record);
    }
    Ok(records)
}

struct Group<'r> {
    ctx: RowContext,
    row: Row<'r>,
}

/// Group rows by key, accumulate, finalize and apply HAVING.
fn aggregate<'r>(
    query: &CompiledQuery,
    rows: Vec<Row<'r>>,
    options: &'r Options,
) -> Result<Vec<Vec<Value>>, ArithmeticError> {
    let keys = query.group_indexes.as_deref().unwrap_or(&[]);
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<Group<'r>> = Vec::new();

    for row in rows {
        let probe = query.allocator.create_store();
        let key = keys
            .iter()
            .map(|&i| query.targets[i].expr.evaluate(&row, &probe))
            .collect::<Result<Vec<_>, _>>()?;
        let position = match index.get(&key) {
            Some(&position) => position,
            None => {
                groups.push(Group {
                    ctx: query.allocator.create_store(),
                    row: row.clone(),
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[position];
        for target in &query.targets {
            if target.expr.is_aggregate() {
                target.expr.update(&row, &mut group.ctx)?;
            } else {
                let value = target.expr.evaluate(&row, &group.ctx)?;
                group.ctx.set(target.slot, value);
            }
        }
        if let Some(having) = &query.having {
            having.update(&row, &mut group.ctx)?;
        }
        group.row = row;
    }

    if groups.is_empty() && keys.is_empty() {
        let row = Row::empty(options);
        let mut ctx = query.allocator.create_store();
        for target in &query.targets {
            if target.expr.is_aggregate() {
                target.expr.prepare(&mut ctx);
            } else {
                let value = target.expr.evaluate(&row, &ctx)?;
                ctx.set(target.slot, value);
            }
        }
        if let Some(having) = &query.having {
            having.prepare(&mut ctx);
        }
        groups.push(Group { ctx, row });
    }

    tracing::trace!("aggregating {} groups", groups.len());
    let mut records = Vec::with_capacity(groups.len());
    for Group { mut ctx, row } in groups {
        ctx.finalize();
        for target in query.targets.iter().filter(|t| t.expr.is_aggregate()) {
            let value = target.expr.evaluate(&row, &ctx)?;
            ctx.set(target.slot, value);
        }
        if let Some(having) = &query.having {
            if !having.evaluate(&row, &ctx)?.truthy() {
                continue;
            }
        }
        records.push(query.targets.iter().map(|t| ctx.value(t.slot)).collect());
    }
    Ok(records)
}

/// Nulls sort first regardless of direction; the direction only reverses
/// the order of non-null values.
fn compare_records(a: &[Value], b: &[Value], order_by: &[(usize, SortDirection)]) -> Ordering {
    for &(index, direction) in order_by {
        let (x, y) = (&a[index], &b[index]);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => match direction {
                SortDirection::Asc => x.sort_cmp(y),
                SortDirection::Desc => y.sort_cmp(x),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Spread the values of one column into columns of their own.
fn pivot_result(result: &QueryResult, pivot: &CompiledPivot) -> QueryResult {
    let spread = pivot.spread;
    let values: Vec<usize> = (0..result.columns.len())
        .filter(|i| *i != spread && !pivot.row_keys.contains(i))
        .collect();

    let mut spread_values: Vec<Value> = Vec::new();
    let mut row_keys: Vec<Vec<Value>> = Vec::new();
    let mut cells: HashMap<(Vec<Value>, Value), Vec<Value>> = HashMap::new();
    for row in &result.rows {
        let key: Vec<Value> = pivot.row_keys.iter().map(|&i| row[i].clone()).collect();
        let column = row[spread].clone();
        if !spread_values.contains(&column) {
            spread_values.push(column.clone());
        }
        if !row_keys.contains(&key) {
            row_keys.push(key.clone());
        }
        // The compiler ties every group key to the row key or the spread
        // column, so each cell is filled by exactly one grouped row.
        cells
            .entry((key, column))
            .or_insert_with(|| values.iter().map(|&i| row[i].clone()).collect());
    }

    let mut columns: Vec<ResultColumn> = pivot
        .row_keys
        .iter()
        .map(|&i| result.columns[i].clone())
        .collect();
    if let Some(last) = columns.last_mut() {
        last.name = format!("{}/{}", last.name, result.columns[spread].name);
    }
    for spread_value in &spread_values {
        for &i in &values {
            let name = if values.len() == 1 {
                spread_value.to_string()
            } else {
                format!("{}/{}", spread_value, result.columns[i].name)
            };
            columns.push(ResultColumn::new(name, result.columns[i].dtype));
        }
    }

    let mut pivoted = QueryResult::new(columns);
    for key in row_keys {
        let mut row = key.clone();
        for spread_value in &spread_values {
            match cells.remove(&(key.clone(), spread_value.clone())) {
                Some(cell) => row.extend(cell),
                None => row.extend(std::iter::repeat(Value::Null).take(values.len())),
            }
        }
        pivoted.add_row(row);
    }
    pivoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerql_core::{Amount, NaiveDate, Open, Posting, Transaction};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn txn(d: NaiveDate, narration: &str, postings: &[(&str, rust_decimal::Decimal)]) -> Directive {
        let mut txn = Transaction::new(d, narration);
        for (account, number) in postings {
            txn = txn.with_posting(Posting::new(*account, Amount::new(*number, "USD")));
        }
        Directive::Transaction(txn)
    }

    fn ledger() -> Vec<Directive> {
        vec![
            Directive::Open(Open::new(date(2024, 1, 1), "Assets:Bank:Checking")),
            txn(
                date(2024, 1, 5),
                "Lunch",
                &[("Expenses:Restaurant", dec!(5.00)), ("Assets:Bank:Checking", dec!(-5.00))],
            ),
            txn(
                date(2024, 2, 5),
                "Dinner",
                &[("Expenses:Restaurant", dec!(10.00)), ("Assets:Bank:Checking", dec!(-10.00))],
            ),
        ]
    }

    fn run(entries: &[Directive], query: &str) -> QueryResult {
        Executor::new(entries).run(query).unwrap()
    }

    #[test]
    fn test_sum_without_group_by() {
        let entries = ledger();
        let result = run(
            &entries,
            "SELECT sum(number) WHERE account = 'Expenses:Restaurant'",
        );
        assert_eq!(result.column_names(), vec!["sum(number)"]);
        assert_eq!(result.rows, vec![vec![Value::Number(dec!(15.00))]]);
    }

    #[test]
    fn test_aggregate_over_no_rows() {
        let entries = ledger();
        let result = run(&entries, "SELECT count(account), sum(number) WHERE account = 'X'");
        assert_eq!(result.rows, vec![vec![Value::Integer(0), Value::Number(dec!(0))]]);
    }

    #[test]
    fn test_group_by_alias() {
        let entries = ledger();
        let result = run(
            &entries,
            "SELECT account, length(account) AS len GROUP BY account, len ORDER BY account",
        );
        assert_eq!(
            result.rows,
            vec![
                vec![
                    Value::String("Assets:Bank:Checking".to_string()),
                    Value::Integer(20)
                ],
                vec![
                    Value::String("Expenses:Restaurant".to_string()),
                    Value::Integer(19)
                ],
            ]
        );
    }

    #[test]
    fn test_having_filters_groups() {
        let entries = ledger();
        let result = run(
            &entries,
            "SELECT account GROUP BY account HAVING sum(number) > 0",
        );
        assert_eq!(
            result.rows,
            vec![vec![Value::String("Expenses:Restaurant".to_string())]]
        );
    }

    #[test]
    fn test_order_by_invisible_expression() {
        let entries = ledger();
        let result = run(&entries, "SELECT narration ORDER BY number DESC");
        assert_eq!(result.columns.len(), 1);
        let narrations: Vec<String> = result.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(narrations, vec!["Dinner", "Lunch", "Lunch", "Dinner"]);
    }

    #[test]
    fn test_nulls_sort_first_descending() {
        let records = vec![
            vec![Value::Integer(1)],
            vec![Value::Null],
            vec![Value::Integer(3)],
        ];
        let mut sorted = records;
        sorted.sort_by(|a, b| compare_records(a, b, &[(0, SortDirection::Desc)]));
        assert_eq!(
            sorted,
            vec![vec![Value::Null], vec![Value::Integer(3)], vec![Value::Integer(1)]]
        );
    }

    #[test]
    fn test_distinct_and_limit() {
        let entries = ledger();
        let result = run(&entries, "SELECT DISTINCT account ORDER BY account");
        assert_eq!(result.len(), 2);
        let result = run(&entries, "SELECT DISTINCT account ORDER BY account LIMIT 1");
        assert_eq!(
            result.rows,
            vec![vec![Value::String("Assets:Bank:Checking".to_string())]]
        );
    }

    #[test]
    fn test_running_balance_follows_where() {
        let entries = ledger();
        let result = run(
            &entries,
            "SELECT balance WHERE account = 'Assets:Bank:Checking'",
        );
        let balances: Vec<String> = result.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(balances, vec!["-5.00 USD", "-15.00 USD"]);
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let entries = ledger();
        let err = Executor::new(&entries).run("SELECT 4 / 0").unwrap_err();
        assert!(matches!(
            err,
            QueryError::Arithmetic(ArithmeticError::DivisionByZero { .. })
        ));
        let result = run(&entries, "SELECT safediv(4, 0)");
        assert!(result.rows.iter().all(|r| r[0] == Value::Number(dec!(0))));
    }

    #[test]
    fn test_pivot_fills_missing_cells() {
        let result = QueryResult {
            columns: vec![
                ResultColumn::new("account", DataType::Str),
                ResultColumn::new("year", DataType::Int),
                ResultColumn::new("total", DataType::Decimal),
            ],
            rows: vec![
                vec![
                    Value::String("A".to_string()),
                    Value::Integer(2023),
                    Value::Number(dec!(1)),
                ],
                vec![
                    Value::String("A".to_string()),
                    Value::Integer(2024),
                    Value::Number(dec!(2)),
                ],
                vec![
                    Value::String("B".to_string()),
                    Value::Integer(2024),
                    Value::Number(dec!(3)),
                ],
            ],
        };
        let pivot = CompiledPivot {
            row_keys: vec![0],
            spread: 1,
        };
        let pivoted = pivot_result(&result, &pivot);
        assert_eq!(pivoted.column_names(), vec!["account/year", "2023", "2024"]);
        assert_eq!(
            pivoted.rows[1],
            vec![
                Value::String("B".to_string()),
                Value::Null,
                Value::Number(dec!(3))
            ]
        );
    }

    #[test]
    fn test_print_renders_entries() {
        let entries = ledger();
        let result = run(&entries, "PRINT");
        assert_eq!(result.column_names(), vec!["entry"]);
        assert_eq!(result.len(), 3);
        assert!(result.rows[1][0].to_string().contains("Lunch"));
    }

    #[test]
    fn test_result_serializes() {
        let entries = ledger();
        let result = run(&entries, "SELECT account LIMIT 1");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("Expenses:Restaurant"));
    }
}
