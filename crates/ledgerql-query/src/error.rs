//! Query error types.
//!
//! Errors carry the canonical name of the offending expression (for
//! example `sum(number)` or `add(date, 1)`) so callers can point at it.

use thiserror::Error;

use crate::types::DataType;

/// Error returned when parsing a query fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at position {position}: {kind}")]
pub struct ParseError {
    /// The kind of error.
    pub kind: ParseErrorKind,
    /// Byte offset in the input where the error occurred.
    pub position: usize,
}

/// The kind of parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Syntax error with details.
    #[error("{0}")]
    SyntaxError(String),
}

impl ParseError {
    /// Create a new parse error.
    pub const fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { kind, position }
    }
}

/// Error raised while binding a statement to the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    /// Column name not available in the evaluation context.
    #[error("unknown column \"{name}\" in {context}")]
    UnknownColumn {
        /// Column name.
        name: String,
        /// Evaluation context (entries, postings, targets).
        context: &'static str,
    },
    /// Function name not available in the evaluation context.
    #[error("unknown function \"{name}\" in {context}")]
    UnknownFunction {
        /// Function name.
        name: String,
        /// Evaluation context.
        context: &'static str,
    },
    /// No overload accepts the operand types.
    #[error("no overload of {expr} accepts ({})", format_types(.operand_types))]
    NoMatchingOverload {
        /// Canonical name of the call.
        expr: String,
        /// Operand types that failed to match.
        operand_types: Vec<DataType>,
    },
    /// Operator applied to incompatible operand types.
    #[error("operator {expr} is not defined for ({})", format_types(.operand_types))]
    InvalidOperands {
        /// Canonical name of the operation.
        expr: String,
        /// Operand types.
        operand_types: Vec<DataType>,
    },
    /// Aggregate inside another aggregate.
    #[error("aggregate {expr} cannot be nested inside another aggregate")]
    NestedAggregate {
        /// Canonical name of the inner aggregate.
        expr: String,
    },
    /// Aggregate used where only row-level expressions are allowed.
    #[error("aggregate {expr} is not allowed in {clause}")]
    AggregateNotAllowed {
        /// Canonical name of the aggregate.
        expr: String,
        /// Clause name.
        clause: &'static str,
    },
    /// Non-aggregate target missing from GROUP BY.
    #[error("target {expr} must appear in GROUP BY or be used in an aggregate")]
    NotInGroupBy {
        /// Canonical name of the target.
        expr: String,
    },
    /// Bad ORDER BY / GROUP BY / PIVOT BY reference.
    #[error("invalid {clause} reference: {reason}")]
    InvalidReference {
        /// Clause name.
        clause: &'static str,
        /// Explanation.
        reason: String,
    },
    /// Invalid constant regular expression.
    #[error("invalid regular expression in {expr}: {reason}")]
    InvalidRegex {
        /// Canonical name of the match expression.
        expr: String,
        /// Regex compiler message.
        reason: String,
    },
    /// Empty or otherwise malformed FROM clause.
    #[error("invalid FROM clause: {0}")]
    InvalidFrom(String),
    /// LIMIT out of range.
    #[error("invalid LIMIT {0}")]
    InvalidLimit(u64),
}

fn format_types(types: &[DataType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// Division by a zero divisor.
    #[error("division by zero in {expr}")]
    DivisionByZero {
        /// Canonical name of the division.
        expr: String,
    },
    /// Integer or date arithmetic out of range.
    #[error("arithmetic overflow in {expr}")]
    Overflow {
        /// Canonical name of the operation.
        expr: String,
    },
}

/// Error returned when running a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Parse error.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Compilation error.
    #[error("compilation error: {0}")]
    Compilation(#[from] CompilationError),
    /// Evaluation-time arithmetic error.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}
