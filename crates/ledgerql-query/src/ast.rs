//! Query abstract syntax tree.
//!
//! Expression nodes derive structural equality and hashing: two
//! syntactically identical expressions compare equal, which is how ORDER BY,
//! GROUP BY and PIVOT BY entries are matched against SELECT targets.

use rust_decimal::Decimal;
use std::fmt;

use ledgerql_core::NaiveDate;

/// A complete statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// SELECT query.
    Select(SelectQuery),
    /// JOURNAL shorthand query.
    Journal(JournalQuery),
    /// BALANCES shorthand query.
    Balances(BalancesQuery),
    /// PRINT shorthand query.
    Print(PrintQuery),
}

/// A SELECT query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    /// Whether DISTINCT was specified.
    pub distinct: bool,
    /// Target list.
    pub targets: Targets,
    /// FROM clause (entry-level filtering).
    pub from: Option<FromClause>,
    /// WHERE clause (posting-level filtering).
    pub where_clause: Option<Expr>,
    /// GROUP BY clause with its optional HAVING.
    pub group_by: Option<GroupBy>,
    /// ORDER BY clause.
    pub order_by: Option<Vec<OrderSpec>>,
    /// PIVOT BY clause (one or two references).
    pub pivot_by: Option<Vec<Expr>>,
    /// LIMIT clause.
    pub limit: Option<u64>,
}

/// The target list of a SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// `*`, expanded to the default posting columns.
    Wildcard,
    /// Explicit targets.
    List(Vec<Target>),
}

/// A target in the SELECT clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The expression to select.
    pub expr: Expr,
    /// Optional alias (AS name).
    pub alias: Option<String>,
}

/// FROM clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FromClause {
    /// Entry filter expression.
    pub expr: Option<Expr>,
    /// OPEN ON date: summarize entries before this date.
    pub open: Option<NaiveDate>,
    /// CLOSE [ON date]: truncate and book conversions.
    pub close: Option<CloseSpec>,
    /// CLEAR: transfer income and expenses to equity.
    pub clear: bool,
}

/// The value of a CLOSE clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSpec {
    /// `CLOSE` without a date.
    Undated,
    /// `CLOSE ON date`.
    On(NaiveDate),
}

/// GROUP BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    /// Group keys: target indices (integer literals) or expressions.
    pub columns: Vec<Expr>,
    /// HAVING predicate.
    pub having: Option<Expr>,
}

/// ORDER BY specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    /// Target index (integer literal) or expression to order by.
    pub expr: Expr,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending (default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// JOURNAL shorthand query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalQuery {
    /// Account regular expression.
    pub account: Option<String>,
    /// Summary function applied to positions (AT cost, AT units).
    pub at_function: Option<String>,
    /// Optional FROM clause.
    pub from: Option<FromClause>,
}

/// BALANCES shorthand query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancesQuery {
    /// Summary function applied to balances.
    pub at_function: Option<String>,
    /// Optional FROM clause.
    pub from: Option<FromClause>,
    /// Optional WHERE clause.
    pub where_clause: Option<Expr>,
}

/// PRINT shorthand query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintQuery {
    /// Optional FROM clause.
    pub from: Option<FromClause>,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Column reference.
    Column(String),
    /// Constant value.
    Constant(Literal),
    /// Function call.
    Function(FunctionCall),
    /// Unary operation.
    Unary(Box<UnaryOp>),
    /// Binary operation.
    Binary(Box<BinaryOp>),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// NULL.
    Null,
    /// TRUE / FALSE.
    Boolean(bool),
    /// Integer literal.
    Integer(i64),
    /// Decimal literal.
    Number(Decimal),
    /// String literal.
    String(String),
    /// Date literal.
    Date(NaiveDate),
    /// Parenthesized list of literals, the right side of `IN`.
    List(Vec<Literal>),
}

/// A function call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCall {
    /// Function name, lower-cased.
    pub name: String,
    /// Operands.
    pub args: Vec<Expr>,
}

/// A unary operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnaryOp {
    /// Operator.
    pub op: UnaryOperator,
    /// Operand.
    pub operand: Expr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// Logical NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    /// IS NULL.
    IsNull,
    /// IS NOT NULL.
    IsNotNull,
}

/// A binary operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOp {
    /// Left operand.
    pub left: Expr,
    /// Operator.
    pub op: BinaryOperator,
    /// Right operand.
    pub right: Expr,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `~`, regular expression search.
    Match,
    /// `IN`, membership or substring.
    In,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl UnaryOperator {
    /// Name used in canonical expression names.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Neg => "neg",
            Self::IsNull => "isnull",
            Self::IsNotNull => "isnotnull",
        }
    }
}

impl BinaryOperator {
    /// Name used in canonical expression names.
    pub const fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Eq => "equal",
            Self::Gt => "greater",
            Self::Ge => "greatereq",
            Self::Lt => "less",
            Self::Le => "lesseq",
            Self::Match => "match",
            Self::In => "contains",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }
}

impl SelectQuery {
    /// Create a new SELECT query with the given targets.
    pub const fn new(targets: Vec<Target>) -> Self {
        Self {
            distinct: false,
            targets: Targets::List(targets),
            from: None,
            where_clause: None,
            group_by: None,
            order_by: None,
            pivot_by: None,
            limit: None,
        }
    }

    /// Create a `SELECT *` query.
    pub fn wildcard() -> Self {
        Self {
            targets: Targets::Wildcard,
            ..Self::new(Vec::new())
        }
    }

    /// Set the DISTINCT flag.
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set the FROM clause.
    pub fn from(mut self, from: FromClause) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the WHERE clause.
    pub fn where_clause(mut self, expr: Expr) -> Self {
        self.where_clause = Some(expr);
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, columns: Vec<Expr>) -> Self {
        self.group_by = Some(GroupBy {
            columns,
            having: None,
        });
        self
    }

    /// Set the HAVING predicate; requires a GROUP BY clause.
    pub fn having(mut self, expr: Expr) -> Self {
        if let Some(group_by) = &mut self.group_by {
            group_by.having = Some(expr);
        }
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, specs: Vec<OrderSpec>) -> Self {
        self.order_by = Some(specs);
        self
    }

    /// Set the PIVOT BY clause.
    pub fn pivot_by(mut self, columns: Vec<Expr>) -> Self {
        self.pivot_by = Some(columns);
        self
    }

    /// Set the LIMIT.
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

impl Target {
    /// Create a new target from an expression.
    pub const fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    /// Create a target with an alias.
    pub fn with_alias(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

impl FromClause {
    /// Create a new empty FROM clause.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter expression.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.expr = Some(expr);
        self
    }

    /// Set the OPEN ON date.
    pub const fn open_on(mut self, date: NaiveDate) -> Self {
        self.open = Some(date);
        self
    }

    /// Set the CLOSE clause.
    pub const fn close(mut self, close: CloseSpec) -> Self {
        self.close = Some(close);
        self
    }

    /// Set the CLEAR flag.
    pub const fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    /// Whether no part of the clause is present.
    pub const fn is_empty(&self) -> bool {
        self.expr.is_none() && self.open.is_none() && self.close.is_none() && !self.clear
    }
}

impl Expr {
    /// Create a column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    /// Create a string constant.
    pub fn string(s: impl Into<String>) -> Self {
        Self::Constant(Literal::String(s.into()))
    }

    /// Create a decimal constant.
    pub const fn number(n: Decimal) -> Self {
        Self::Constant(Literal::Number(n))
    }

    /// Create an integer constant.
    pub const fn integer(n: i64) -> Self {
        Self::Constant(Literal::Integer(n))
    }

    /// Create a date constant.
    pub const fn date(d: NaiveDate) -> Self {
        Self::Constant(Literal::Date(d))
    }

    /// Create a boolean constant.
    pub const fn boolean(b: bool) -> Self {
        Self::Constant(Literal::Boolean(b))
    }

    /// Create a NULL constant.
    pub const fn null() -> Self {
        Self::Constant(Literal::Null)
    }

    /// Create a function call.
    pub fn function(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Function(FunctionCall {
            name: name.into(),
            args,
        })
    }

    /// Create a binary operation.
    pub fn binary(left: Self, op: BinaryOperator, right: Self) -> Self {
        Self::Binary(Box::new(BinaryOp { left, op, right }))
    }

    /// Create a unary operation.
    pub fn unary(op: UnaryOperator, operand: Self) -> Self {
        Self::Unary(Box::new(UnaryOp { op, operand }))
    }

    /// The 1-based target index this expression denotes in GROUP BY,
    /// ORDER BY and PIVOT BY, if it is a bare integer literal.
    pub const fn as_index(&self) -> Option<i64> {
        match self {
            Self::Constant(Literal::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// The canonical name of this expression, used as the default column name.
    pub fn canonical_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write!(f, "{}", name.to_lowercase()),
            Self::Constant(lit) => write!(f, "{lit}"),
            Self::Function(call) => {
                write!(f, "{}(", call.name.to_lowercase())?;
                write_list(f, &call.args)?;
                write!(f, ")")
            }
            Self::Unary(op) => write!(f, "{}({})", op.op.name(), op.operand),
            Self::Binary(op) => write!(f, "{}({}, {})", op.op.name(), op.left, op.right),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Date(d) => write!(f, "{d}"),
            Self::List(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub const fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub const fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_canonical_names() {
        assert_eq!(
            Expr::function("SUM", vec![Expr::column("Number")]).canonical_name(),
            "sum(number)"
        );
        let expr = Expr::binary(
            Expr::column("number"),
            BinaryOperator::Add,
            Expr::number(dec!(1.5)),
        );
        assert_eq!(expr.canonical_name(), "add(number, 1.5)");
        let expr = Expr::unary(
            UnaryOperator::Not,
            Expr::binary(Expr::column("a"), BinaryOperator::Eq, Expr::string("x")),
        );
        assert_eq!(expr.canonical_name(), "not(equal(a, 'x'))");
    }

    #[test]
    fn test_structural_equality() {
        let a = Expr::function("length", vec![Expr::column("account")]);
        let b = Expr::function("length", vec![Expr::column("account")]);
        assert_eq!(a, b);
        assert_ne!(a, Expr::function("length", vec![Expr::column("payee")]));
    }

    #[test]
    fn test_index() {
        assert_eq!(Expr::integer(2).as_index(), Some(2));
        assert_eq!(Expr::column("date").as_index(), None);
        assert_eq!(Expr::number(dec!(2)).as_index(), None);
    }
}
