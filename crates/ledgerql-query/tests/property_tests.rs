//! Property-based tests for the query engine.
//!
//! These tests run queries over arbitrary ledgers and check the results
//! against sums and orderings computed directly from the generated entries.
//!
//! Run with: cargo test -p ledgerql-query --test `property_tests`

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use ledgerql_core::{Amount, Directive, Posting, Transaction};
use ledgerql_query::{Executor, QueryResult, Value};
use proptest::prelude::*;
use rust_decimal::Decimal;

// ============================================================================
// Arbitrary generators
// ============================================================================

const ACCOUNTS: &[&str] = &[
    "Assets:Bank:Checking",
    "Assets:Cash",
    "Expenses:Food",
    "Expenses:Rent",
    "Income:Salary",
];

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (-100_000i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2024i32, 1u32..13u32, 1u32..29u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn arb_account() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ACCOUNTS)
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (arb_date(), arb_account(), arb_account(), arb_decimal()).prop_map(
        |(date, from, to, number)| {
            Transaction::new(date, "Generated")
                .with_posting(Posting::new(to, Amount::new(number, "USD")))
                .with_posting(Posting::new(from, Amount::new(-number, "USD")))
        },
    )
}

/// Transactions in date order, as a loaded ledger would hold them.
fn arb_ledger() -> impl Strategy<Value = Vec<Directive>> {
    prop::collection::vec(arb_transaction(), 0..25).prop_map(|mut txns| {
        txns.sort_by_key(|t| t.date);
        txns.into_iter().map(Directive::Transaction).collect()
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn run(query: &str, entries: &[Directive]) -> QueryResult {
    Executor::new(entries)
        .run(query)
        .unwrap_or_else(|e| panic!("query {query:?} failed: {e}"))
}

fn postings(entries: &[Directive]) -> impl Iterator<Item = (&Transaction, &Posting)> {
    entries
        .iter()
        .filter_map(Directive::as_transaction)
        .flat_map(|t| t.postings.iter().map(move |p| (t, p)))
}

fn number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

// ============================================================================
// Grouping Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every group's sum equals the sum of exactly the rows with its key
    #[test]
    fn prop_group_sums_match_rows(entries in arb_ledger()) {
        let result = run("SELECT account, sum(number) GROUP BY account", &entries);

        let mut expected: HashMap<String, Decimal> = HashMap::new();
        for (_, posting) in postings(&entries) {
            *expected.entry(posting.account.clone()).or_default() += posting.units.number;
        }

        prop_assert_eq!(result.len(), expected.len());
        for row in &result.rows {
            let Value::String(account) = &row[0] else {
                return Err(TestCaseError::fail("account is not a string"));
            };
            prop_assert_eq!(number(&row[1]), expected.get(account).copied());
        }
    }

    /// Grouping by a key yields one row per distinct key value
    #[test]
    fn prop_group_keys_are_unique(entries in arb_ledger()) {
        let result = run("SELECT year, count(number) GROUP BY year", &entries);
        let keys: HashSet<&Value> = result.rows.iter().map(|r| &r[0]).collect();
        prop_assert_eq!(keys.len(), result.len());

        let total: i64 = result
            .rows
            .iter()
            .map(|r| match r[1] {
                Value::Integer(n) => n,
                _ => 0,
            })
            .sum();
        prop_assert_eq!(usize::try_from(total).unwrap(), postings(&entries).count());
    }
}

// ============================================================================
// Distinct and Limit Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// DISTINCT keeps each row once and drops no row value
    #[test]
    fn prop_distinct_is_set_of_rows(entries in arb_ledger()) {
        let all = run("SELECT account, year", &entries);
        let distinct = run("SELECT DISTINCT account, year", &entries);

        let unique: HashSet<&Vec<Value>> = distinct.rows.iter().collect();
        prop_assert_eq!(unique.len(), distinct.len());
        let expected: HashSet<&Vec<Value>> = all.rows.iter().collect();
        prop_assert_eq!(unique, expected);
    }

    /// LIMIT takes a prefix of the ordered result
    #[test]
    fn prop_limit_is_prefix(entries in arb_ledger(), limit in 0u64..40) {
        let full = run("SELECT date, account, number ORDER BY date, account, number", &entries);
        let limited = run(
            &format!("SELECT date, account, number ORDER BY date, account, number LIMIT {limit}"),
            &entries,
        );
        let n = full.len().min(usize::try_from(limit).unwrap());
        prop_assert_eq!(limited.len(), n);
        prop_assert_eq!(&limited.rows[..], &full.rows[..n]);
    }
}

// ============================================================================
// Ordering Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Ascending and descending orders are sorted in their direction
    #[test]
    fn prop_order_by_sorts(entries in arb_ledger()) {
        let asc = run("SELECT number ORDER BY number", &entries);
        let desc = run("SELECT number ORDER BY number DESC", &entries);

        let asc: Vec<Decimal> = asc.rows.iter().filter_map(|r| number(&r[0])).collect();
        let desc: Vec<Decimal> = desc.rows.iter().filter_map(|r| number(&r[0])).collect();
        prop_assert!(asc.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(desc.windows(2).all(|w| w[0] >= w[1]));
        prop_assert_eq!(asc.len(), desc.len());
    }

    /// Ordering is independent of the order postings were produced in
    #[test]
    fn prop_order_by_ignores_input_order(entries in arb_ledger()) {
        let mut reversed = entries.clone();
        reversed.reverse();
        let query = "SELECT account, number ORDER BY account, number";
        prop_assert_eq!(run(query, &entries).rows, run(query, &reversed).rows);
    }
}

// ============================================================================
// Pivot Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Each pivot cell holds the sum for its (account, year) key, or null
    #[test]
    fn prop_pivot_cells_match_groups(entries in arb_ledger()) {
        let result = run(
            "SELECT account, year, sum(number) GROUP BY account, year PIVOT BY account, year",
            &entries,
        );

        let mut expected: HashMap<(String, i64), Decimal> = HashMap::new();
        for (txn, posting) in postings(&entries) {
            let key = (posting.account.clone(), i64::from(txn.date.year()));
            *expected.entry(key).or_default() += posting.units.number;
        }

        let names = result.column_names();
        let accounts: HashSet<&String> = expected.keys().map(|(a, _)| a).collect();
        prop_assert_eq!(result.len(), accounts.len());
        for row in &result.rows {
            let Value::String(account) = &row[0] else {
                return Err(TestCaseError::fail("row key is not a string"));
            };
            for (column, cell) in names.iter().zip(row).skip(1) {
                let year: i64 = column.parse().unwrap();
                let key = (account.clone(), year);
                prop_assert_eq!(number(cell), expected.get(&key).copied());
                prop_assert_eq!(cell.is_null(), !expected.contains_key(&key));
            }
        }
    }

    /// With a two-column row key every grouped row lands in its own cell
    #[test]
    fn prop_pivot_keeps_every_group(entries in arb_ledger()) {
        let select = "SELECT account, month, year, sum(number) GROUP BY account, month, year";
        let grouped = run(select, &entries);
        let result = run(&format!("{select} PIVOT BY year"), &entries);

        let row_keys: HashSet<&[Value]> = result.rows.iter().map(|r| &r[..2]).collect();
        prop_assert_eq!(row_keys.len(), result.len());
        let filled: usize = result
            .rows
            .iter()
            .map(|r| r[2..].iter().filter(|v| !v.is_null()).count())
            .sum();
        prop_assert_eq!(filled, grouped.len());
    }
}
