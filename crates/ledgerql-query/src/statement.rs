//! Statement compiler.
//!
//! Turns a parsed [`Query`] into a [`CompiledStatement`]: every clause is
//! bound to its catalog, ORDER BY / GROUP BY / PIVOT BY references are
//! resolved to target positions, and the aggregation rules are checked.
//! `BALANCES` and `JOURNAL` are rewritten to plain SELECTs first.

use crate::ast::{
    BalancesQuery, CloseSpec, Expr, FromClause, JournalQuery, OrderSpec, Query, SelectQuery,
    SortDirection, Target, Targets,
};
use crate::catalog::{
    EntriesEnvironment, Environment, PostingsEnvironment, TargetsEnvironment, WILDCARD_COLUMNS,
};
use crate::compiler::{CompiledExpr, ExprCompiler, TargetBinding};
use crate::context::{Allocator, Slot};
use crate::error::CompilationError;
use crate::types::DataType;

use ledgerql_core::NaiveDate;

/// One output (or sort-only) column.
#[derive(Debug, Clone)]
pub struct CompiledTarget {
    /// Output name: the alias, or the canonical expression name.
    pub name: String,
    /// Compiled expression.
    pub expr: CompiledExpr,
    /// Slot holding the value for the current row or group.
    pub slot: Slot,
    /// Whether the column is part of the output.
    pub visible: bool,
}

/// Compiled FROM clause.
#[derive(Debug, Clone)]
pub struct CompiledFrom {
    /// Entry predicate.
    pub filter: Option<CompiledExpr>,
    /// Summarize entries before this date.
    pub open: Option<NaiveDate>,
    /// Truncate and book conversions.
    pub close: Option<CloseSpec>,
    /// Transfer income and expenses to equity.
    pub clear: bool,
}

/// Compiled PIVOT BY clause, as indices into the visible columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPivot {
    /// Columns identifying an output row.
    pub row_keys: Vec<usize>,
    /// Column whose values become output columns.
    pub spread: usize,
}

/// A compiled SELECT.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Visible targets first, then sort-only and group-only ones.
    pub targets: Vec<CompiledTarget>,
    /// FROM clause.
    pub from: Option<CompiledFrom>,
    /// WHERE predicate.
    pub where_clause: Option<CompiledExpr>,
    /// GROUP BY keys as target indices; `Some(vec![])` is never produced.
    pub group_indexes: Option<Vec<usize>>,
    /// HAVING predicate.
    pub having: Option<CompiledExpr>,
    /// Sort keys as target indices.
    pub order_by: Vec<(usize, SortDirection)>,
    /// PIVOT BY clause.
    pub pivot: Option<CompiledPivot>,
    /// Row limit.
    pub limit: Option<usize>,
    /// DISTINCT flag.
    pub distinct: bool,
    /// Whether the query aggregates.
    pub aggregated: bool,
    /// Whether any expression reads the running `balance` column.
    pub uses_balance: bool,
    /// Slot allocator sized for this query.
    pub allocator: Allocator,
}

impl CompiledQuery {
    /// Whether the query aggregates.
    pub const fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    /// Number of row-context slots the query needs.
    pub const fn slot_count(&self) -> usize {
        self.allocator.len()
    }

    /// Output columns: name and type.
    pub fn columns(&self) -> Vec<(String, DataType)> {
        self.visible_targets()
            .map(|t| (t.name.clone(), t.expr.dtype()))
            .collect()
    }

    /// Visible targets, in output order.
    pub fn visible_targets(&self) -> impl Iterator<Item = &CompiledTarget> {
        self.targets.iter().filter(|t| t.visible)
    }

    /// Number of visible targets.
    pub fn visible_count(&self) -> usize {
        self.visible_targets().count()
    }
}

/// A compiled PRINT.
#[derive(Debug, Clone)]
pub struct CompiledPrint {
    /// FROM clause.
    pub from: Option<CompiledFrom>,
}

/// A compiled statement.
#[derive(Debug, Clone)]
pub enum CompiledStatement {
    /// Tabular query.
    Select(CompiledQuery),
    /// Entry listing.
    Print(CompiledPrint),
}

/// Compile a statement against the standard catalogs.
pub fn compile(query: &Query) -> Result<CompiledStatement, CompilationError> {
    let statement = match query {
        Query::Select(select) => CompiledStatement::Select(compile_select(
            select,
            &TargetsEnvironment,
            &PostingsEnvironment,
            &EntriesEnvironment,
        )?),
        Query::Balances(balances) => CompiledStatement::Select(compile_select(
            &balances_query(balances),
            &TargetsEnvironment,
            &PostingsEnvironment,
            &EntriesEnvironment,
        )?),
        Query::Journal(journal) => CompiledStatement::Select(compile_select(
            &journal_query(journal),
            &TargetsEnvironment,
            &PostingsEnvironment,
            &EntriesEnvironment,
        )?),
        Query::Print(print) => {
            let mut allocator = Allocator::new();
            CompiledStatement::Print(CompiledPrint {
                from: compile_from(print.from.as_ref(), &EntriesEnvironment, &mut allocator)?,
            })
        }
    };
    if let CompiledStatement::Select(compiled) = &statement {
        tracing::debug!(
            "compiled query: {} columns, aggregated: {}, {} slots",
            compiled.visible_count(),
            compiled.aggregated,
            compiled.slot_count()
        );
    }
    Ok(statement)
}

/// Rewrite `BALANCES` as a grouped SELECT.
pub fn balances_query(balances: &BalancesQuery) -> SelectQuery {
    let sum = Expr::function("sum", vec![Expr::column("position")]);
    let balance = match &balances.at_function {
        Some(function) => Expr::function(function.to_lowercase(), vec![sum]),
        None => sum,
    };
    let mut select = SelectQuery::new(vec![
        Target::new(Expr::column("account")),
        Target::with_alias(balance, "balance"),
    ])
    .group_by(vec![Expr::column("account")])
    .order_by(vec![OrderSpec::asc(Expr::column("account"))]);
    select.from.clone_from(&balances.from);
    select.where_clause.clone_from(&balances.where_clause);
    select
}

/// Rewrite `JOURNAL` as a posting listing with running balances.
pub fn journal_query(journal: &JournalQuery) -> SelectQuery {
    let summarize = |column: &str| {
        let expr = Expr::column(column);
        match &journal.at_function {
            Some(function) => Expr::function(function.to_lowercase(), vec![expr]),
            None => expr,
        }
    };
    let mut select = SelectQuery::new(vec![
        Target::new(Expr::column("date")),
        Target::new(Expr::column("flag")),
        Target::new(Expr::column("payee")),
        Target::new(Expr::column("narration")),
        Target::new(Expr::column("account")),
        Target::with_alias(summarize("position"), "position"),
        Target::with_alias(summarize("balance"), "balance"),
    ]);
    select.from.clone_from(&journal.from);
    if let Some(pattern) = &journal.account {
        select = select.where_clause(Expr::binary(
            Expr::column("account"),
            crate::ast::BinaryOperator::Match,
            Expr::string(pattern.clone()),
        ));
    }
    select
}

fn compile_from(
    from: Option<&FromClause>,
    entries: &dyn Environment,
    allocator: &mut Allocator,
) -> Result<Option<CompiledFrom>, CompilationError> {
    let Some(from) = from else {
        return Ok(None);
    };
    if from.is_empty() {
        return Err(CompilationError::InvalidFrom("empty FROM clause".to_string()));
    }
    let filter = from
        .expr
        .as_ref()
        .map(|expr| ExprCompiler::new(entries, allocator, "FROM").compile(expr))
        .transpose()?;
    Ok(Some(CompiledFrom {
        filter,
        open: from.open,
        close: from.close,
        clear: from.clear,
    }))
}

struct TargetList {
    targets: Vec<CompiledTarget>,
    sources: Vec<Expr>,
}

impl TargetList {
    fn push(
        &mut self,
        name: String,
        expr: CompiledExpr,
        source: Expr,
        slot: Slot,
        visible: bool,
    ) -> usize {
        self.targets.push(CompiledTarget {
            name,
            expr,
            slot,
            visible,
        });
        self.sources.push(source);
        self.targets.len() - 1
    }

    fn visible_len(&self) -> usize {
        self.targets.iter().filter(|t| t.visible).count()
    }

    /// Resolve a GROUP BY / ORDER BY entry: a 1-based index, an output
    /// name, or an expression equal to a target's.
    fn find(&self, expr: &Expr, clause: &'static str) -> Result<Option<usize>, CompilationError> {
        if let Some(index) = expr.as_index() {
            let visible = self.visible_len();
            return usize::try_from(index)
                .ok()
                .filter(|i| (1..=visible).contains(i))
                .map(|i| Some(i - 1))
                .ok_or_else(|| CompilationError::InvalidReference {
                    clause,
                    reason: format!("column index {index} is out of range 1..={visible}"),
                });
        }
        if let Expr::Column(name) = expr {
            if let Some(i) = self
                .targets
                .iter()
                .position(|t| t.visible && t.name.eq_ignore_ascii_case(name))
            {
                return Ok(Some(i));
            }
        }
        Ok(self.sources.iter().position(|source| source == expr))
    }

    fn bindings(&self) -> Vec<TargetBinding> {
        self.targets
            .iter()
            .zip(&self.sources)
            .map(|(target, source)| TargetBinding {
                name: target.name.clone(),
                expr: source.clone(),
                slot: target.slot,
                dtype: target.expr.dtype(),
                aggregate: target.expr.is_aggregate(),
            })
            .collect()
    }
}

/// Compile a SELECT with explicit catalogs for targets, WHERE and FROM.
pub fn compile_select(
    select: &SelectQuery,
    targets_env: &dyn Environment,
    postings_env: &dyn Environment,
    entries_env: &dyn Environment,
) -> Result<CompiledQuery, CompilationError> {
    let mut allocator = Allocator::new();

    // Targets
    let ast_targets: Vec<Target> = match &select.targets {
        Targets::Wildcard => WILDCARD_COLUMNS
            .iter()
            .map(|column| Target::new(Expr::column(*column)))
            .collect(),
        Targets::List(targets) => targets.clone(),
    };
    let mut list = TargetList {
        targets: Vec::with_capacity(ast_targets.len()),
        sources: Vec::with_capacity(ast_targets.len()),
    };
    for target in &ast_targets {
        let expr = ExprCompiler::new(targets_env, &mut allocator, "SELECT").compile(&target.expr)?;
        let name = target
            .alias
            .clone()
            .unwrap_or_else(|| target.expr.canonical_name());
        let slot = allocator.allocate();
        list.push(name, expr, target.expr.clone(), slot, true);
    }

    let from = compile_from(select.from.as_ref(), entries_env, &mut allocator)?;

    let where_clause = select
        .where_clause
        .as_ref()
        .map(|expr| ExprCompiler::new(postings_env, &mut allocator, "WHERE").compile(expr))
        .transpose()?;

    // GROUP BY
    let group_indexes = match &select.group_by {
        None => None,
        Some(group_by) => {
            let mut indexes = Vec::with_capacity(group_by.columns.len());
            for column in &group_by.columns {
                let index = match list.find(column, "GROUP BY")? {
                    Some(index) => index,
                    None => {
                        let expr = ExprCompiler::new(targets_env, &mut allocator, "GROUP BY")
                            .compile(column)?;
                        let slot = allocator.allocate();
                        list.push(column.canonical_name(), expr, column.clone(), slot, false)
                    }
                };
                let key = &list.targets[index];
                if key.expr.is_aggregate() {
                    return Err(CompilationError::AggregateNotAllowed {
                        expr: key.expr.name(),
                        clause: "GROUP BY",
                    });
                }
                if !indexes.contains(&index) {
                    indexes.push(index);
                }
            }
            Some(indexes)
        }
    };

    // ORDER BY
    let mut order_by = Vec::new();
    for spec in select.order_by.iter().flatten() {
        let index = match list.find(&spec.expr, "ORDER BY")? {
            Some(index) => index,
            None => {
                let expr =
                    ExprCompiler::new(targets_env, &mut allocator, "ORDER BY").compile(&spec.expr)?;
                let slot = allocator.allocate();
                list.push(spec.expr.canonical_name(), expr, spec.expr.clone(), slot, false)
            }
        };
        order_by.push((index, spec.direction));
    }

    let aggregated =
        group_indexes.is_some() || list.targets.iter().any(|t| t.expr.is_aggregate());

    // HAVING
    let bindings = list.bindings();
    let having = select
        .group_by
        .as_ref()
        .and_then(|g| g.having.as_ref())
        .map(|expr| {
            ExprCompiler::new(targets_env, &mut allocator, "HAVING")
                .with_targets(&bindings)
                .compile(expr)
        })
        .transpose()?;

    if aggregated {
        let keys: Vec<&Expr> = group_indexes
            .iter()
            .flatten()
            .map(|&k| &list.sources[k])
            .collect();
        for (target, source) in list.targets.iter().zip(&list.sources) {
            let grouped = keys.contains(&source);
            if !target.expr.is_aggregate() && !target.expr.is_constant() && !grouped {
                return Err(CompilationError::NotInGroupBy {
                    expr: target.name.clone(),
                });
            }
        }
    }

    let pivot = select
        .pivot_by
        .as_ref()
        .map(|pivot_by| compile_pivot(pivot_by, &list, group_indexes.as_deref()))
        .transpose()?;

    let limit = select
        .limit
        .map(|n| usize::try_from(n).map_err(|_| CompilationError::InvalidLimit(n)))
        .transpose()?;

    let uses_balance = list
        .targets
        .iter()
        .map(|t| &t.expr)
        .chain(where_clause.as_ref())
        .chain(having.as_ref())
        .any(|expr| expr.references_column("balance"));

    Ok(CompiledQuery {
        targets: list.targets,
        from,
        where_clause,
        group_indexes,
        having,
        order_by,
        pivot,
        limit,
        distinct: select.distinct,
        aggregated,
        uses_balance,
        allocator,
    })
}

fn compile_pivot(
    pivot_by: &[Expr],
    list: &TargetList,
    group_indexes: Option<&[usize]>,
) -> Result<CompiledPivot, CompilationError> {
    let invalid = |reason: String| CompilationError::InvalidReference {
        clause: "PIVOT BY",
        reason,
    };
    let Some(keys) = group_indexes else {
        return Err(invalid("PIVOT BY requires GROUP BY".to_string()));
    };
    if !(1..=2).contains(&pivot_by.len()) {
        return Err(invalid(format!(
            "expected one or two columns, got {}",
            pivot_by.len()
        )));
    }

    let visible = list.visible_len();
    let mut indexes = Vec::with_capacity(pivot_by.len());
    for expr in pivot_by {
        let index = match expr {
            Expr::Column(name) => list
                .targets
                .iter()
                .position(|t| t.visible && t.name.eq_ignore_ascii_case(name)),
            _ => expr
                .as_index()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| (1..=visible).contains(i))
                .map(|i| i - 1),
        }
        .ok_or_else(|| invalid(format!("{expr} is not an output column")))?;
        if !keys.contains(&index) {
            return Err(invalid(format!(
                "{} is not a GROUP BY key",
                list.targets[index].name
            )));
        }
        if indexes.contains(&index) {
            return Err(invalid(format!(
                "{} is used twice",
                list.targets[index].name
            )));
        }
        indexes.push(index);
    }

    // Every GROUP BY key must land in the row key or the spread column,
    // otherwise two groups would share one cell.
    let pivot = match indexes[..] {
        [row, spread] => CompiledPivot {
            row_keys: vec![row],
            spread,
        },
        [spread] => CompiledPivot {
            row_keys: keys.iter().copied().filter(|&k| k != spread).collect(),
            spread,
        },
        _ => return Err(invalid("expected one or two columns".to_string())),
    };
    for &key in keys {
        let name = &list.targets[key].name;
        if key >= visible {
            return Err(invalid(format!(
                "GROUP BY key {name} must be an output column"
            )));
        }
        if key != pivot.spread && !pivot.row_keys.contains(&key) {
            return Err(invalid(format!(
                "GROUP BY key {name} is neither the pivot row nor the pivot column"
            )));
        }
    }
    Ok(pivot)
}
