//! Query compiler and executor benchmarks.
//!
//! Run with: cargo bench -p ledgerql-query

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::NaiveDate;
use ledgerql_core::{Amount, Directive, Open, Posting, Transaction};
use ledgerql_query::{compile, parse, Executor};
use rust_decimal_macros::dec;

const CATEGORIES: [&str; 4] = ["Food", "Coffee", "Groceries", "Transport"];

/// Generate a dated ledger with one open per account and `num_transactions`
/// two-posting transactions.
fn generate_directives(num_transactions: usize) -> Vec<Directive> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let mut directives = Vec::with_capacity(num_transactions + CATEGORIES.len() + 1);

    directives.push(Directive::Open(Open::new(start, "Assets:Bank:Checking")));
    for category in CATEGORIES {
        directives.push(Directive::Open(Open::new(start, format!("Expenses:{category}"))));
    }

    let payees = ["Store A", "Store B", "Cafe", "Gas Station", "Supermarket"];
    for i in 0..num_transactions {
        let category = CATEGORIES[i % CATEGORIES.len()];
        let amount = dec!(10.00) + rust_decimal::Decimal::from(i % 100);
        let date = start + chrono::Days::new((i / 3) as u64);

        let txn = Transaction::new(date, format!("Transaction {i}"))
            .with_payee(payees[i % payees.len()])
            .with_posting(Posting::new(
                format!("Expenses:{category}"),
                Amount::new(amount, "USD"),
            ))
            .with_posting(Posting::new(
                "Assets:Bank:Checking",
                Amount::new(-amount, "USD"),
            ));
        directives.push(Directive::Transaction(txn));
    }

    directives
}

const QUERIES: [(&str, &str); 5] = [
    ("select", "SELECT date, account, position"),
    ("where", "SELECT account, number WHERE account ~ 'Expenses:' AND number > 50"),
    ("group_by", "SELECT account, sum(position) GROUP BY account ORDER BY account"),
    (
        "pivot",
        "SELECT account, year, sum(number) GROUP BY account, year PIVOT BY account, year",
    ),
    ("journal", "JOURNAL 'Checking'"),
];

fn bench_parse_and_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_compile");

    for (name, source) in QUERIES {
        group.bench_with_input(BenchmarkId::new("parse", name), source, |b, source| {
            b.iter(|| parse(black_box(source)));
        });
        let query = parse(source).unwrap();
        group.bench_with_input(BenchmarkId::new("compile", name), &query, |b, query| {
            b.iter(|| compile(black_box(query)));
        });
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let directives = generate_directives(1000);

    let mut group = c.benchmark_group("query_execute");
    group.throughput(Throughput::Elements(1000));

    for (name, source) in QUERIES {
        let query = parse(source).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |b, query| {
            let executor = Executor::new(black_box(&directives));
            b.iter(|| executor.execute(black_box(query)));
        });
    }

    group.finish();
}

fn bench_from_clause(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_from");

    for size in [100usize, 1000, 5000] {
        let directives = generate_directives(size);
        let query = parse(
            "SELECT account, sum(position) FROM OPEN ON 2020-06-01 CLOSE CLEAR GROUP BY account",
        )
        .unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &query, |b, query| {
            let executor = Executor::new(black_box(&directives));
            b.iter(|| executor.execute(black_box(query)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_and_compile, bench_execute, bench_from_clause);
criterion_main!(benches);
