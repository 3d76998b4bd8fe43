//! Query compiler and execution engine for ledger entries.
//!
//! This crate runs SQL-like statements over a list of ledger entries and
//! produces typed tabular results.
//!
//! # Query Types
//!
//! - `SELECT` - Filtering, grouping, aggregation, ordering and pivoting
//! - `JOURNAL` - Shorthand for a posting listing with a running balance
//! - `BALANCES` - Shorthand for a table of account balances
//! - `PRINT` - The filtered entries in their native text form
//!
//! # Pipeline
//!
//! A query string is parsed into an [`ast::Query`], compiled against the
//! column and function catalogs into a [`CompiledStatement`], then executed
//! by an [`Executor`]. Compilation rejects unknown names, type mismatches
//! and misplaced aggregates before any row is read.
//!
//! # Example
//!
//! ```
//! use ledgerql_core::{Amount, Directive, NaiveDate, Posting, Transaction};
//! use ledgerql_query::{Executor, Value};
//! use rust_decimal_macros::dec;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let entries = vec![Directive::Transaction(
//!     Transaction::new(date, "Coffee")
//!         .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(4.50), "USD")))
//!         .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-4.50), "USD"))),
//! )];
//!
//! let result = Executor::new(&entries)
//!     .run("SELECT account, sum(number) GROUP BY account ORDER BY account")
//!     .unwrap();
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.rows[1][1], Value::Number(dec!(4.50)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;
pub mod statement;
pub mod summarize;
pub mod types;

pub use ast::Query;
pub use catalog::{EntriesEnvironment, Environment, PostingsEnvironment, TargetsEnvironment};
pub use compiler::{CompiledExpr, ExprCompiler};
pub use context::{Allocator, Row, RowContext, Slot};
pub use engine::{Executor, QueryResult, ResultColumn};
pub use error::{ArithmeticError, CompilationError, ParseError, ParseErrorKind, QueryError};
pub use parser::parse;
pub use statement::{compile, compile_select, CompiledQuery, CompiledStatement};
pub use summarize::filter_entries;
pub use types::{DataType, Value};
