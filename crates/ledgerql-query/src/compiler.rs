//! Expression compiler.
//!
//! Binds AST expressions to catalog entries and infers a static type for
//! every node. The result is a [`CompiledExpr`] tree that evaluates against a
//! [`Row`] and a [`RowContext`] without any further name lookups.

use chrono::Days;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;

use crate::aggregate::AggregateKind;
use crate::ast::{BinaryOperator, Expr, Literal, UnaryOperator};
use crate::catalog::{is_aggregate_name, ColumnDef, Environment, FunctionKind, ScalarImpl};
use crate::context::{Allocator, Row, RowContext, Slot};
use crate::error::{ArithmeticError, CompilationError};
use crate::types::{DataType, Value};

/// A typed, executable expression node.
#[derive(Debug, Clone)]
pub enum CompiledExpr {
    /// Column read.
    Column {
        /// Resolved column.
        def: &'static ColumnDef,
    },
    /// Literal value.
    Constant {
        /// The value.
        value: Value,
        /// Its type.
        dtype: DataType,
    },
    /// Scalar function call.
    Call {
        /// Canonical name.
        name: String,
        /// Implementation of the resolved overload.
        function: ScalarImpl,
        /// Result is null whenever an operand is null.
        strict: bool,
        /// Compiled operands.
        operands: Vec<CompiledExpr>,
        /// Result type.
        dtype: DataType,
        /// Pattern of a pattern function whose operand is a constant.
        regex: Option<Regex>,
    },
    /// Aggregate function call, accumulating into its own slot.
    Aggregate {
        /// Canonical name.
        name: String,
        /// Aggregation kind.
        kind: AggregateKind,
        /// The row-level operand.
        operand: Box<CompiledExpr>,
        /// Accumulator slot.
        slot: Slot,
        /// Result type.
        dtype: DataType,
    },
    /// Unary operator.
    Unary {
        /// Canonical name.
        name: String,
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        operand: Box<CompiledExpr>,
        /// Result type.
        dtype: DataType,
    },
    /// Binary operator.
    Binary {
        /// Canonical name.
        name: String,
        /// Operator.
        op: BinaryOperator,
        /// Left operand.
        left: Box<CompiledExpr>,
        /// Right operand.
        right: Box<CompiledExpr>,
        /// Result type.
        dtype: DataType,
        /// Pattern of a `~` whose right side is a constant.
        regex: Option<Regex>,
    },
    /// Reference to the value of a SELECT target, used by HAVING.
    TargetRef {
        /// Canonical name of the referenced expression.
        name: String,
        /// Slot holding the target value.
        slot: Slot,
        /// Target type.
        dtype: DataType,
        /// Whether the target aggregates.
        aggregate: bool,
    },
}

impl CompiledExpr {
    /// Static result type.
    pub const fn dtype(&self) -> DataType {
        match self {
            Self::Column { def } => def.dtype,
            Self::Constant { dtype, .. }
            | Self::Call { dtype, .. }
            | Self::Aggregate { dtype, .. }
            | Self::Unary { dtype, .. }
            | Self::Binary { dtype, .. }
            | Self::TargetRef { dtype, .. } => *dtype,
        }
    }

    /// Canonical name of the node.
    pub fn name(&self) -> String {
        match self {
            Self::Column { def } => def.name.to_string(),
            Self::Constant { value, .. } => match value {
                Value::String(s) => format!("'{s}'"),
                other => other.to_string(),
            },
            Self::Call { name, .. }
            | Self::Aggregate { name, .. }
            | Self::Unary { name, .. }
            | Self::Binary { name, .. }
            | Self::TargetRef { name, .. } => name.clone(),
        }
    }

    /// Whether this node or a descendant aggregates.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Self::Column { .. } | Self::Constant { .. } => false,
            Self::Aggregate { .. } => true,
            Self::TargetRef { aggregate, .. } => *aggregate,
            Self::Call { operands, .. } => operands.iter().any(Self::is_aggregate),
            Self::Unary { operand, .. } => operand.is_aggregate(),
            Self::Binary { left, right, .. } => left.is_aggregate() || right.is_aggregate(),
        }
    }

    /// Whether the node only combines literals with operators. Function
    /// calls never count, `today()` being the obvious case.
    pub fn is_constant(&self) -> bool {
        match self {
            Self::Constant { .. } => true,
            Self::Unary { operand, .. } => operand.is_constant(),
            Self::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
            _ => false,
        }
    }

    /// Evaluate against one row. Aggregate nodes read their finished value
    /// from the context.
    pub fn evaluate(&self, row: &Row<'_>, ctx: &RowContext) -> Result<Value, ArithmeticError> {
        match self {
            Self::Column { def } => Ok((def.accessor)(row)),
            Self::Constant { value, .. } => Ok(value.clone()),
            Self::Aggregate { slot, .. } | Self::TargetRef { slot, .. } => Ok(ctx.value(*slot)),
            Self::Call {
                name,
                function,
                strict,
                operands,
                regex,
                ..
            } => {
                let args = operands
                    .iter()
                    .map(|operand| operand.evaluate(row, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                if *strict && args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                match *function {
                    ScalarImpl::Total(f) => Ok(f(&args, row)),
                    ScalarImpl::Checked(f) => f(&args, row).ok_or_else(|| {
                        ArithmeticError::Overflow {
                            expr: name.clone(),
                        }
                    }),
                    ScalarImpl::Pattern(f) => Ok(match (regex, args.first()) {
                        (Some(regex), _) => f(regex, row),
                        (None, Some(Value::String(pattern))) => {
                            build_regex(pattern).map_or(Value::Null, |regex| f(&regex, row))
                        }
                        _ => Value::Null,
                    }),
                }
            }
            Self::Unary {
                name,
                op,
                operand,
                dtype,
            } => {
                let value = operand.evaluate(row, ctx)?;
                eval_unary(*op, value, *dtype, name)
            }
            Self::Binary {
                name,
                op,
                left,
                right,
                dtype,
                regex,
            } => {
                let l = left.evaluate(row, ctx)?;
                match (op, l.truthy()) {
                    (BinaryOperator::And, false) => return Ok(Value::Boolean(false)),
                    (BinaryOperator::Or, true) => return Ok(Value::Boolean(true)),
                    _ => {}
                }
                let r = right.evaluate(row, ctx)?;
                eval_binary(*op, l, r, *dtype, regex.as_ref(), name)
            }
        }
    }

    /// Feed one row to every accumulator under this node.
    pub fn update(&self, row: &Row<'_>, ctx: &mut RowContext) -> Result<(), ArithmeticError> {
        match self {
            Self::Aggregate {
                name,
                kind,
                operand,
                slot,
                ..
            } => {
                let value = operand.evaluate(row, ctx)?;
                ctx.update(*slot, *kind, operand.dtype(), value, name)
            }
            Self::Call { operands, .. } => operands.iter().try_for_each(|o| o.update(row, ctx)),
            Self::Unary { operand, .. } => operand.update(row, ctx),
            Self::Binary { left, right, .. } => {
                left.update(row, ctx)?;
                right.update(row, ctx)
            }
            Self::Column { .. } | Self::Constant { .. } | Self::TargetRef { .. } => Ok(()),
        }
    }

    /// Create the accumulators under this node without feeding any row.
    pub fn prepare(&self, ctx: &mut RowContext) {
        match self {
            Self::Aggregate {
                kind, operand, slot, ..
            } => ctx.prepare(*slot, *kind, operand.dtype()),
            Self::Call { operands, .. } => operands.iter().for_each(|o| o.prepare(ctx)),
            Self::Unary { operand, .. } => operand.prepare(ctx),
            Self::Binary { left, right, .. } => {
                left.prepare(ctx);
                right.prepare(ctx);
            }
            Self::Column { .. } | Self::Constant { .. } | Self::TargetRef { .. } => {}
        }
    }

    /// Whether the node reads the named column.
    pub fn references_column(&self, column: &str) -> bool {
        match self {
            Self::Column { def } => def.name == column,
            Self::Constant { .. } | Self::TargetRef { .. } => false,
            Self::Aggregate { operand, .. } | Self::Unary { operand, .. } => {
                operand.references_column(column)
            }
            Self::Call { operands, .. } => operands.iter().any(|o| o.references_column(column)),
            Self::Binary { left, right, .. } => {
                left.references_column(column) || right.references_column(column)
            }
        }
    }
}

/// A SELECT target visible to HAVING, by alias or by expression.
#[derive(Debug, Clone)]
pub struct TargetBinding {
    /// Output name.
    pub name: String,
    /// Source expression.
    pub expr: Expr,
    /// Slot holding the target's value.
    pub slot: Slot,
    /// Target type.
    pub dtype: DataType,
    /// Whether the target aggregates.
    pub aggregate: bool,
}

/// Compiles expressions of one clause against one catalog.
pub struct ExprCompiler<'c> {
    env: &'c dyn Environment,
    allocator: &'c mut Allocator,
    clause: &'static str,
    scope: &'c [TargetBinding],
    in_aggregate: bool,
}

impl<'c> ExprCompiler<'c> {
    /// Compiler for `clause`, resolving names through `env`.
    pub fn new(
        env: &'c dyn Environment,
        allocator: &'c mut Allocator,
        clause: &'static str,
    ) -> Self {
        Self {
            env,
            allocator,
            clause,
            scope: &[],
            in_aggregate: false,
        }
    }

    /// Make SELECT targets resolvable by alias and by expression.
    #[must_use]
    pub fn with_targets(mut self, scope: &'c [TargetBinding]) -> Self {
        self.scope = scope;
        self
    }

    /// Compile one expression.
    pub fn compile(&mut self, expr: &Expr) -> Result<CompiledExpr, CompilationError> {
        if let Some(binding) = self.lookup_target(expr) {
            return Ok(CompiledExpr::TargetRef {
                name: binding.name.clone(),
                slot: binding.slot,
                dtype: binding.dtype,
                aggregate: binding.aggregate,
            });
        }
        match expr {
            Expr::Column(name) => Ok(CompiledExpr::Column {
                def: self.env.resolve_column(name)?,
            }),
            Expr::Constant(literal) => {
                let value = literal_value(literal);
                let dtype = value.data_type();
                Ok(CompiledExpr::Constant { value, dtype })
            }
            Expr::Function(call) => self.compile_call(expr, &call.name, &call.args),
            Expr::Unary(unary) => {
                let operand = self.compile(&unary.operand)?;
                let dtype = unary_type(unary.op, operand.dtype()).ok_or_else(|| {
                    CompilationError::InvalidOperands {
                        expr: expr.canonical_name(),
                        operand_types: vec![operand.dtype()],
                    }
                })?;
                Ok(CompiledExpr::Unary {
                    name: expr.canonical_name(),
                    op: unary.op,
                    operand: Box::new(operand),
                    dtype,
                })
            }
            Expr::Binary(binary) => {
                let left = self.compile(&binary.left)?;
                let right = self.compile(&binary.right)?;
                let name = expr.canonical_name();
                let dtype = binary_type(binary.op, left.dtype(), right.dtype()).ok_or_else(|| {
                    CompilationError::InvalidOperands {
                        expr: name.clone(),
                        operand_types: vec![left.dtype(), right.dtype()],
                    }
                })?;
                let regex = match binary.op {
                    BinaryOperator::Match => constant_regex(&right, &name)?,
                    _ => None,
                };
                Ok(CompiledExpr::Binary {
                    name,
                    op: binary.op,
                    left: Box::new(left),
                    right: Box::new(right),
                    dtype,
                    regex,
                })
            }
        }
    }

    fn lookup_target(&self, expr: &Expr) -> Option<&'c TargetBinding> {
        let scope: &'c [TargetBinding] = self.scope;
        scope.iter().find(|b| b.expr == *expr).or_else(|| match expr {
            Expr::Column(name) => scope.iter().find(|b| b.name.eq_ignore_ascii_case(name)),
            _ => None,
        })
    }

    fn compile_call(
        &mut self,
        expr: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Result<CompiledExpr, CompilationError> {
        let canonical = expr.canonical_name();
        let aggregate = is_aggregate_name(name);
        if aggregate {
            if !self.env.allows_aggregates() {
                return Err(CompilationError::AggregateNotAllowed {
                    expr: canonical,
                    clause: self.clause,
                });
            }
            if self.in_aggregate {
                return Err(CompilationError::NestedAggregate { expr: canonical });
            }
        }

        let outer = self.in_aggregate;
        self.in_aggregate = outer || aggregate;
        let operands = args
            .iter()
            .map(|arg| self.compile(arg))
            .collect::<Result<Vec<_>, _>>();
        self.in_aggregate = outer;
        let mut operands = operands?;

        let types: Vec<DataType> = operands.iter().map(CompiledExpr::dtype).collect();
        let function = self.env.resolve_function(name, &types, &canonical)?;
        let dtype = function.result_type(&types);
        match function.kind {
            FunctionKind::Scalar(implementation) => {
                let regex = match (implementation, operands.as_slice()) {
                    (ScalarImpl::Pattern(_), [pattern]) => constant_regex(pattern, &canonical)?,
                    _ => None,
                };
                Ok(CompiledExpr::Call {
                    name: canonical,
                    function: implementation,
                    strict: function.strict,
                    operands,
                    dtype,
                    regex,
                })
            }
            FunctionKind::Aggregate(kind) => {
                let operand = operands.pop().ok_or_else(|| CompilationError::NoMatchingOverload {
                    expr: canonical.clone(),
                    operand_types: types.clone(),
                })?;
                Ok(CompiledExpr::Aggregate {
                    name: canonical,
                    kind,
                    operand: Box::new(operand),
                    slot: self.allocator.allocate(),
                    dtype,
                })
            }
        }
    }
}

/// The value of a literal.
pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(n) => Value::Integer(*n),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Date(d) => Value::Date(*d),
        Literal::List(items) => Value::Set(items.iter().map(literal_value).collect()),
    }
}

fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Compile a constant pattern operand up front. Other operands are compiled
/// per row.
fn constant_regex(operand: &CompiledExpr, name: &str) -> Result<Option<Regex>, CompilationError> {
    let CompiledExpr::Constant {
        value: Value::String(pattern),
        ..
    } = operand
    else {
        return Ok(None);
    };
    build_regex(pattern)
        .map(Some)
        .map_err(|e| CompilationError::InvalidRegex {
            expr: name.to_string(),
            reason: e.to_string(),
        })
}

fn unary_type(op: UnaryOperator, operand: DataType) -> Option<DataType> {
    match op {
        UnaryOperator::Not | UnaryOperator::IsNull | UnaryOperator::IsNotNull => {
            Some(DataType::Bool)
        }
        UnaryOperator::Neg => match operand {
            DataType::Object => Some(DataType::Decimal),
            DataType::Null
            | DataType::Int
            | DataType::Decimal
            | DataType::Amount
            | DataType::Position
            | DataType::Inventory => Some(operand),
            _ => None,
        },
    }
}

fn comparable(left: DataType, right: DataType) -> bool {
    left == right
        || (left.is_numeric() && right.is_numeric())
        || matches!(left, DataType::Object | DataType::Null)
        || matches!(right, DataType::Object | DataType::Null)
}

fn binary_type(op: BinaryOperator, left: DataType, right: DataType) -> Option<DataType> {
    use BinaryOperator as Op;
    use DataType as T;

    match op {
        Op::And | Op::Or => Some(T::Bool),
        Op::Eq | Op::Gt | Op::Ge | Op::Lt | Op::Le => comparable(left, right).then_some(T::Bool),
        Op::Match => {
            let stringish = |t| matches!(t, T::Str | T::Object | T::Null);
            (stringish(left) && stringish(right)).then_some(T::Bool)
        }
        Op::In => match (left, right) {
            (_, T::Set | T::Object | T::Null) | (T::Str | T::Object | T::Null, T::Str) => {
                Some(T::Bool)
            }
            _ => None,
        },
        Op::Add | Op::Sub | Op::Mul | Op::Div => {
            let l = if left == T::Null { right } else { left };
            let r = if right == T::Null { left } else { right };
            arithmetic_type(op, l, r)
        }
    }
}

fn arithmetic_type(op: BinaryOperator, left: DataType, right: DataType) -> Option<DataType> {
    use BinaryOperator as Op;
    use DataType as T;

    match (left, right) {
        (T::Null, T::Null) => Some(T::Null),
        (T::Int, T::Int) if op == Op::Div => Some(T::Decimal),
        (T::Int, T::Int) => Some(T::Int),
        (l, r) if l.is_numeric() && r.is_numeric() => Some(T::Decimal),
        (T::Object, other) | (other, T::Object) if other == T::Object || other.is_numeric() => {
            Some(T::Decimal)
        }
        (T::Date, T::Int) if matches!(op, Op::Add | Op::Sub) => Some(T::Date),
        (T::Int, T::Date) if op == Op::Add => Some(T::Date),
        (T::Date, T::Date) if op == Op::Sub => Some(T::Int),
        (T::Amount, T::Amount) if matches!(op, Op::Add | Op::Sub) => Some(T::Amount),
        (T::Amount, n) if n.is_numeric() && matches!(op, Op::Mul | Op::Div) => Some(T::Amount),
        (n, T::Amount) if n.is_numeric() && op == Op::Mul => Some(T::Amount),
        _ => None,
    }
}

fn eval_unary(
    op: UnaryOperator,
    value: Value,
    dtype: DataType,
    name: &str,
) -> Result<Value, ArithmeticError> {
    Ok(match op {
        UnaryOperator::Not => Value::Boolean(!value.truthy()),
        UnaryOperator::IsNull => Value::Boolean(value.is_null()),
        UnaryOperator::IsNotNull => Value::Boolean(!value.is_null()),
        // The result follows the node type, so an Object operand only ever
        // negates to a decimal.
        UnaryOperator::Neg => match (dtype, value) {
            (DataType::Int, Value::Integer(n)) => Value::Integer(n.checked_neg().ok_or_else(|| {
                ArithmeticError::Overflow {
                    expr: name.to_string(),
                }
            })?),
            (DataType::Amount, Value::Amount(a)) => Value::Amount(-&a),
            (DataType::Position, Value::Position(p)) => Value::Position(p.neg()),
            (DataType::Inventory, Value::Inventory(inv)) => Value::Inventory(inv.neg()),
            (DataType::Decimal, other) => {
                other.coerce_decimal().map_or(Value::Null, |n| Value::Number(-n))
            }
            _ => Value::Null,
        },
    })
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn eval_binary(
    op: BinaryOperator,
    left: Value,
    right: Value,
    dtype: DataType,
    regex: Option<&Regex>,
    name: &str,
) -> Result<Value, ArithmeticError> {
    use BinaryOperator as Op;

    let ordered = |accept: fn(std::cmp::Ordering) -> bool| {
        left.compare(&right)
            .map_or(Value::Null, |o| Value::Boolean(accept(o)))
    };
    Ok(match op {
        Op::And => Value::Boolean(left.truthy() && right.truthy()),
        Op::Or => Value::Boolean(left.truthy() || right.truthy()),
        Op::Eq => Value::Boolean(left.equals(&right)),
        Op::Gt => ordered(std::cmp::Ordering::is_gt),
        Op::Ge => ordered(std::cmp::Ordering::is_ge),
        Op::Lt => ordered(std::cmp::Ordering::is_lt),
        Op::Le => ordered(std::cmp::Ordering::is_le),
        Op::Match => {
            let (Some(text), Some(pattern)) = (as_text(&left), as_text(&right)) else {
                return Ok(Value::Boolean(false));
            };
            let found = match regex {
                Some(regex) => regex.is_match(&text),
                None => build_regex(&pattern).is_ok_and(|regex| regex.is_match(&text)),
            };
            Value::Boolean(found)
        }
        Op::In => Value::Boolean(match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => false,
            (_, Value::Set(items)) => items.iter().any(|item| item.equals(&left)),
            (Value::String(needle), Value::String(haystack)) => haystack.contains(needle.as_str()),
            _ => false,
        }),
        Op::Add | Op::Sub | Op::Mul | Op::Div => arithmetic(op, &left, &right, dtype, name)?,
    })
}

fn arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    dtype: DataType,
    name: &str,
) -> Result<Value, ArithmeticError> {
    use BinaryOperator as Op;

    let overflow = || ArithmeticError::Overflow {
        expr: name.to_string(),
    };
    let division_by_zero = || ArithmeticError::DivisionByZero {
        expr: name.to_string(),
    };
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match (dtype, left, right) {
        (DataType::Int, Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                Op::Add => a.checked_add(*b),
                Op::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            result.map(Value::Integer).ok_or_else(overflow)
        }
        (DataType::Int, Value::Date(a), Value::Date(b)) => {
            Ok(Value::Integer(a.signed_duration_since(*b).num_days()))
        }
        (DataType::Date, Value::Date(date), Value::Integer(days))
        | (DataType::Date, Value::Integer(days), Value::Date(date)) => {
            let forward = (op == Op::Add) == (*days >= 0);
            let delta = Days::new(days.unsigned_abs());
            let result = if forward {
                date.checked_add_days(delta)
            } else {
                date.checked_sub_days(delta)
            };
            result.map(Value::Date).ok_or_else(overflow)
        }
        (DataType::Amount, Value::Amount(a), Value::Amount(b)) => {
            if a.currency != b.currency {
                return Ok(Value::Null);
            }
            let number = match op {
                Op::Add => a.number.checked_add(b.number),
                _ => a.number.checked_sub(b.number),
            };
            number
                .map(|n| Value::Amount(ledgerql_core::Amount::new(n, a.currency.clone())))
                .ok_or_else(overflow)
        }
        (DataType::Amount, Value::Amount(a), factor)
        | (DataType::Amount, factor, Value::Amount(a)) => {
            let Some(factor) = factor.as_decimal() else {
                return Ok(Value::Null);
            };
            let number = if op == Op::Div {
                if factor.is_zero() {
                    return Err(division_by_zero());
                }
                a.number.checked_div(factor)
            } else {
                a.number.checked_mul(factor)
            };
            number
                .map(|n| Value::Amount(ledgerql_core::Amount::new(n, a.currency.clone())))
                .ok_or_else(overflow)
        }
        _ => {
            let (Some(a), Some(b)) = (left.coerce_decimal(), right.coerce_decimal()) else {
                return Ok(Value::Null);
            };
            decimal_op(op, a, b, name).map(Value::Number)
        }
    }
}

fn decimal_op(
    op: BinaryOperator,
    a: Decimal,
    b: Decimal,
    name: &str,
) -> Result<Decimal, ArithmeticError> {
    let overflow = || ArithmeticError::Overflow {
        expr: name.to_string(),
    };
    match op {
        BinaryOperator::Add => a.checked_add(b).ok_or_else(overflow),
        BinaryOperator::Sub => a.checked_sub(b).ok_or_else(overflow),
        BinaryOperator::Mul => a.checked_mul(b).ok_or_else(overflow),
        _ => {
            if b.is_zero() {
                return Err(ArithmeticError::DivisionByZero {
                    expr: name.to_string(),
                });
            }
            a.checked_div(b).ok_or_else(overflow)
        }
    }
}
