//! Query parser.
//!
//! Uses chumsky for parser combinators. Keywords are case-insensitive and
//! reserved; identifiers are lower-cased.

use chumsky::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::ast::{
    BalancesQuery, BinaryOperator, CloseSpec, Expr, FromClause, GroupBy, JournalQuery, Literal,
    OrderSpec, PrintQuery, Query, SelectQuery, SortDirection, Target, Targets, UnaryOperator,
};
use crate::error::{ParseError, ParseErrorKind};
use ledgerql_core::NaiveDate;

type ParserInput<'a> = &'a str;
type ParserExtra<'a> = extra::Err<Rich<'a, char>>;

/// Reserved words; none of them can be used as a column or function name.
const KEYWORDS: &[&str] = &[
    "select", "as", "from", "where", "open", "close", "clear", "on", "balances", "journal",
    "print", "at", "group", "by", "having", "order", "asc", "desc", "pivot", "limit",
    "distinct", "and", "or", "not", "in", "is", "true", "false", "null",
];

/// Parse a query string.
///
/// # Errors
///
/// Returns a `ParseError` if the query string is malformed.
pub fn parse(source: &str) -> Result<Query, ParseError> {
    let (result, errs) = query_parser()
        .then_ignore(ws())
        .then_ignore(end())
        .parse(source)
        .into_output_errors();

    if let Some(query) = result {
        Ok(query)
    } else {
        let end = source.trim_end().len();
        let err = errs.first().map(|e| {
            let kind = if e.span().start >= end {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::SyntaxError(e.to_string())
            };
            ParseError::new(kind, e.span().start)
        });
        Err(err.unwrap_or_else(|| ParseError::new(ParseErrorKind::UnexpectedEof, 0)))
    }
}

/// Parse whitespace (spaces, tabs, newlines).
fn ws<'a>() -> impl Parser<'a, ParserInput<'a>, (), ParserExtra<'a>> + Clone {
    one_of(" \t\r\n").repeated().ignored()
}

/// Parse required whitespace.
fn ws1<'a>() -> impl Parser<'a, ParserInput<'a>, (), ParserExtra<'a>> + Clone {
    one_of(" \t\r\n").repeated().at_least(1).ignored()
}

/// Case-insensitive keyword parser.
fn kw<'a>(keyword: &'static str) -> impl Parser<'a, ParserInput<'a>, (), ParserExtra<'a>> + Clone {
    text::ident()
        .try_map(move |word: &str, span| {
            if word.eq_ignore_ascii_case(keyword) {
                Ok(())
            } else {
                Err(Rich::custom(span, format!("expected {keyword}")))
            }
        })
}

/// Two keywords separated by whitespace, such as `GROUP BY`.
fn kw2<'a>(
    first: &'static str,
    second: &'static str,
) -> impl Parser<'a, ParserInput<'a>, (), ParserExtra<'a>> + Clone {
    kw(first).then(ws1()).then(kw(second)).ignored()
}

/// Parse digits.
fn digits<'a>() -> impl Parser<'a, ParserInput<'a>, &'a str, ParserExtra<'a>> + Clone {
    one_of("0123456789").repeated().at_least(1).to_slice()
}

/// A comma with optional surrounding whitespace.
fn comma<'a>() -> impl Parser<'a, ParserInput<'a>, (), ParserExtra<'a>> + Clone {
    ws().then(just(',')).then(ws()).ignored()
}

/// Parse the main query.
fn query_parser<'a>() -> impl Parser<'a, ParserInput<'a>, Query, ParserExtra<'a>> {
    ws().ignore_then(choice((
        select_query().map(Query::Select),
        journal_query().map(Query::Journal),
        balances_query().map(Query::Balances),
        print_query().map(Query::Print),
    )))
    .then_ignore(ws().then(just(';')).or_not())
}

/// Parse a SELECT query.
fn select_query<'a>() -> impl Parser<'a, ParserInput<'a>, SelectQuery, ParserExtra<'a>> {
    kw("SELECT")
        .ignore_then(ws1())
        .ignore_then(
            kw("DISTINCT")
                .then_ignore(ws1())
                .or_not()
                .map(|d| d.is_some()),
        )
        .then(targets())
        .then(from_clause().or_not())
        .then(where_clause().or_not())
        .then(group_by_clause().or_not())
        .then(order_by_clause().or_not())
        .then(pivot_by_clause().or_not())
        .then(limit_clause().or_not())
        .map(
            |(
                ((((((distinct, targets), from), where_clause), group_by), order_by), pivot_by),
                limit,
            )| SelectQuery {
                distinct,
                targets,
                from,
                where_clause,
                group_by,
                order_by,
                pivot_by,
                limit,
            },
        )
}

/// Parse the target list, or `*`.
fn targets<'a>() -> impl Parser<'a, ParserInput<'a>, Targets, ParserExtra<'a>> {
    choice((
        just('*').to(Targets::Wildcard),
        target()
            .separated_by(comma())
            .at_least(1)
            .collect()
            .map(Targets::List),
    ))
}

/// Parse a single target.
fn target<'a>() -> impl Parser<'a, ParserInput<'a>, Target, ParserExtra<'a>> {
    expr()
        .then(
            ws1()
                .ignore_then(kw("AS"))
                .ignore_then(ws1())
                .ignore_then(identifier())
                .or_not(),
        )
        .map(|(expr, alias)| Target { expr, alias })
}

/// Parse FROM clause.
fn from_clause<'a>() -> impl Parser<'a, ParserInput<'a>, FromClause, ParserExtra<'a>> {
    ws1().ignore_then(kw("FROM")).ignore_then(from_body())
}

/// Parse the parts of a FROM clause: filter, OPEN ON, CLOSE [ON], CLEAR.
fn from_body<'a>() -> impl Parser<'a, ParserInput<'a>, FromClause, ParserExtra<'a>> {
    let open_on = ws1()
        .ignore_then(kw2("OPEN", "ON"))
        .ignore_then(ws1())
        .ignore_then(date_literal());

    let close = ws1().ignore_then(kw("CLOSE")).ignore_then(
        ws1()
            .ignore_then(kw("ON"))
            .ignore_then(ws1())
            .ignore_then(date_literal())
            .or_not()
            .map(|date| date.map_or(CloseSpec::Undated, CloseSpec::On)),
    );

    let clear = ws1().ignore_then(kw("CLEAR"));

    ws1()
        .ignore_then(expr())
        .or_not()
        .then(open_on.or_not())
        .then(close.or_not())
        .then(clear.or_not().map(|c| c.is_some()))
        .try_map(|(((expr, open), close), clear), span| {
            let from = FromClause {
                expr,
                open,
                close,
                clear,
            };
            if from.is_empty() {
                Err(Rich::custom(span, "empty FROM clause"))
            } else {
                Ok(from)
            }
        })
}

/// Parse WHERE clause.
fn where_clause<'a>() -> impl Parser<'a, ParserInput<'a>, Expr, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw("WHERE"))
        .ignore_then(ws1())
        .ignore_then(expr())
}

/// Parse GROUP BY clause with its HAVING.
fn group_by_clause<'a>() -> impl Parser<'a, ParserInput<'a>, GroupBy, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw2("GROUP", "BY"))
        .ignore_then(ws1())
        .ignore_then(expr().separated_by(comma()).at_least(1).collect())
        .then(
            ws1()
                .ignore_then(kw("HAVING"))
                .ignore_then(ws1())
                .ignore_then(expr())
                .or_not(),
        )
        .map(|(columns, having)| GroupBy { columns, having })
}

/// Parse ORDER BY clause.
fn order_by_clause<'a>() -> impl Parser<'a, ParserInput<'a>, Vec<OrderSpec>, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw2("ORDER", "BY"))
        .ignore_then(ws1())
        .ignore_then(order_spec().separated_by(comma()).at_least(1).collect())
}

/// Parse a single ORDER BY spec.
fn order_spec<'a>() -> impl Parser<'a, ParserInput<'a>, OrderSpec, ParserExtra<'a>> {
    expr()
        .then(
            ws1()
                .ignore_then(choice((
                    kw("ASC").to(SortDirection::Asc),
                    kw("DESC").to(SortDirection::Desc),
                )))
                .or_not(),
        )
        .map(|(expr, dir)| OrderSpec {
            expr,
            direction: dir.unwrap_or_default(),
        })
}

/// Parse PIVOT BY clause.
fn pivot_by_clause<'a>() -> impl Parser<'a, ParserInput<'a>, Vec<Expr>, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw2("PIVOT", "BY"))
        .ignore_then(ws1())
        .ignore_then(expr().separated_by(comma()).at_least(1).collect())
}

/// Parse LIMIT clause.
fn limit_clause<'a>() -> impl Parser<'a, ParserInput<'a>, u64, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw("LIMIT"))
        .ignore_then(ws1())
        .ignore_then(digits().try_map(|s: &str, span| {
            s.parse::<u64>()
                .map_err(|_| Rich::custom(span, "invalid limit"))
        }))
}

/// Parse JOURNAL query.
fn journal_query<'a>() -> impl Parser<'a, ParserInput<'a>, JournalQuery, ParserExtra<'a>> {
    kw("JOURNAL")
        .ignore_then(ws1().ignore_then(string_literal()).or_not())
        .then(at_function().or_not())
        .then(from_clause().or_not())
        .map(|((account, at_function), from)| JournalQuery {
            account,
            at_function,
            from,
        })
}

/// Parse BALANCES query.
fn balances_query<'a>() -> impl Parser<'a, ParserInput<'a>, BalancesQuery, ParserExtra<'a>> {
    kw("BALANCES")
        .ignore_then(at_function().or_not())
        .then(from_clause().or_not())
        .then(where_clause().or_not())
        .map(|((at_function, from), where_clause)| BalancesQuery {
            at_function,
            from,
            where_clause,
        })
}

/// Parse PRINT query.
fn print_query<'a>() -> impl Parser<'a, ParserInput<'a>, PrintQuery, ParserExtra<'a>> {
    kw("PRINT")
        .ignore_then(from_clause().or_not())
        .map(|from| PrintQuery { from })
}

/// Parse AT function (e.g., AT cost, AT units).
fn at_function<'a>() -> impl Parser<'a, ParserInput<'a>, String, ParserExtra<'a>> {
    ws1()
        .ignore_then(kw("AT"))
        .ignore_then(ws1())
        .ignore_then(identifier())
}

/// Parse an expression (with precedence climbing).
#[allow(clippy::large_stack_frames)]
fn expr<'a>() -> impl Parser<'a, ParserInput<'a>, Expr, ParserExtra<'a>> + Clone {
    recursive(|expr| {
        let primary = primary_expr(expr.clone());

        // Unary minus; a negated numeric literal folds into the literal.
        let unary = just('-')
            .then_ignore(ws())
            .repeated()
            .collect::<Vec<_>>()
            .then(primary)
            .map(|(negations, e)| negations.into_iter().fold(e, |acc, _| negate(acc)));

        // Multiplicative: * /
        let multiplicative = unary.clone().foldl(
            ws().ignore_then(choice((
                just('*').to(BinaryOperator::Mul),
                just('/').to(BinaryOperator::Div),
            )))
            .then_ignore(ws())
            .then(unary)
            .repeated(),
            |left, (op, right)| Expr::binary(left, op, right),
        );

        // Additive: + -
        let additive = multiplicative.clone().foldl(
            ws().ignore_then(choice((
                just('+').to(BinaryOperator::Add),
                just('-').to(BinaryOperator::Sub),
            )))
            .then_ignore(ws())
            .then(multiplicative)
            .repeated(),
            |left, (op, right)| Expr::binary(left, op, right),
        );

        // Comparison: = != < <= > >= ~ IN, and postfix IS [NOT] NULL
        let is_null = ws1()
            .ignore_then(kw("IS"))
            .ignore_then(ws1().ignore_then(kw("NOT")).or_not())
            .then_ignore(ws1())
            .then_ignore(kw("NULL"))
            .map(|not| {
                if not.is_some() {
                    Comparison::IsNotNull
                } else {
                    Comparison::IsNull
                }
            });
        let binary = ws()
            .ignore_then(comparison_op())
            .then_ignore(ws())
            .then(additive.clone())
            .map(|(op, right)| Comparison::Binary(op, right));
        let comparison = additive
            .then(choice((is_null, binary)).or_not())
            .map(|(left, rest)| match rest {
                None => left,
                Some(Comparison::IsNull) => Expr::unary(UnaryOperator::IsNull, left),
                Some(Comparison::IsNotNull) => Expr::unary(UnaryOperator::IsNotNull, left),
                Some(Comparison::Binary(ComparisonOp::NotEqual, right)) => Expr::unary(
                    UnaryOperator::Not,
                    Expr::binary(left, BinaryOperator::Eq, right),
                ),
                Some(Comparison::Binary(ComparisonOp::Op(op), right)) => {
                    Expr::binary(left, op, right)
                }
            });

        // NOT
        let not_expr = kw("NOT")
            .then_ignore(ws())
            .repeated()
            .collect::<Vec<_>>()
            .then(comparison)
            .map(|(nots, e)| {
                nots.into_iter()
                    .fold(e, |acc, ()| Expr::unary(UnaryOperator::Not, acc))
            });

        // AND
        let and_expr = not_expr.clone().foldl(
            ws().ignore_then(kw("AND"))
                .ignore_then(ws())
                .ignore_then(not_expr)
                .repeated(),
            |left, right| Expr::binary(left, BinaryOperator::And, right),
        );

        // OR (lowest precedence)
        and_expr.clone().foldl(
            ws().ignore_then(kw("OR"))
                .ignore_then(ws())
                .ignore_then(and_expr)
                .repeated(),
            |left, right| Expr::binary(left, BinaryOperator::Or, right),
        )
    })
}

#[derive(Debug, Clone, Copy)]
enum ComparisonOp {
    NotEqual,
    Op(BinaryOperator),
}

#[derive(Debug, Clone)]
enum Comparison {
    IsNull,
    IsNotNull,
    Binary(ComparisonOp, Expr),
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Constant(Literal::Integer(n)) => Expr::integer(-n),
        Expr::Constant(Literal::Number(n)) => Expr::number(-n),
        other => Expr::unary(UnaryOperator::Neg, other),
    }
}

/// Parse comparison operators.
fn comparison_op<'a>() -> impl Parser<'a, ParserInput<'a>, ComparisonOp, ParserExtra<'a>> + Clone
{
    choice((
        just("!=").to(ComparisonOp::NotEqual),
        just("<=").to(ComparisonOp::Op(BinaryOperator::Le)),
        just(">=").to(ComparisonOp::Op(BinaryOperator::Ge)),
        just('=').to(ComparisonOp::Op(BinaryOperator::Eq)),
        just('<').to(ComparisonOp::Op(BinaryOperator::Lt)),
        just('>').to(ComparisonOp::Op(BinaryOperator::Gt)),
        just('~').to(ComparisonOp::Op(BinaryOperator::Match)),
        kw("IN").to(ComparisonOp::Op(BinaryOperator::In)),
    ))
}

/// Parse primary expressions.
fn primary_expr<'a>(
    expr: impl Parser<'a, ParserInput<'a>, Expr, ParserExtra<'a>> + Clone + 'a,
) -> impl Parser<'a, ParserInput<'a>, Expr, ParserExtra<'a>> + Clone {
    choice((
        // Constant list, the right side of IN
        literal_list().map(Expr::Constant),
        // Parenthesized expression
        just('(')
            .ignore_then(ws())
            .ignore_then(expr.clone())
            .then_ignore(ws())
            .then_ignore(just(')')),
        // Literals
        literal().map(Expr::Constant),
        // Function call or column reference
        identifier()
            .then(
                ws().ignore_then(just('('))
                    .ignore_then(ws())
                    .ignore_then(expr.separated_by(comma()).collect::<Vec<_>>())
                    .then_ignore(ws())
                    .then_ignore(just(')'))
                    .or_not(),
            )
            .map(|(name, args)| match args {
                Some(args) => Expr::function(name, args),
                None => Expr::Column(name),
            }),
    ))
}

/// Parse a parenthesized list of two or more literals.
fn literal_list<'a>() -> impl Parser<'a, ParserInput<'a>, Literal, ParserExtra<'a>> + Clone {
    just('(')
        .ignore_then(ws())
        .ignore_then(
            signed_literal()
                .separated_by(comma())
                .at_least(2)
                .collect::<Vec<_>>(),
        )
        .then_ignore(ws())
        .then_ignore(just(')'))
        .map(Literal::List)
}

/// A literal, allowing a leading minus on numbers.
fn signed_literal<'a>() -> impl Parser<'a, ParserInput<'a>, Literal, ParserExtra<'a>> + Clone {
    just('-')
        .ignore_then(ws())
        .ignore_then(number())
        .map(|lit| match lit {
            Literal::Integer(n) => Literal::Integer(-n),
            Literal::Number(n) => Literal::Number(-n),
            other => other,
        })
        .or(literal())
}

/// Parse a literal.
fn literal<'a>() -> impl Parser<'a, ParserInput<'a>, Literal, ParserExtra<'a>> + Clone {
    choice((
        // Keywords first
        kw("TRUE").to(Literal::Boolean(true)),
        kw("FALSE").to(Literal::Boolean(false)),
        kw("NULL").to(Literal::Null),
        // Date literal (must be before number to avoid parsing year as number)
        date_literal().map(Literal::Date),
        number(),
        string_literal().map(Literal::String),
    ))
}

/// Parse an identifier (column name, function name), lower-cased.
fn identifier<'a>() -> impl Parser<'a, ParserInput<'a>, String, ParserExtra<'a>> + Clone {
    text::ident().try_map(|s: &str, span| {
        let name = s.to_lowercase();
        if KEYWORDS.contains(&name.as_str()) {
            Err(Rich::custom(span, format!("reserved keyword '{s}'")))
        } else {
            Ok(name)
        }
    })
}

/// Parse a string literal in single or double quotes.
fn string_literal<'a>() -> impl Parser<'a, ParserInput<'a>, String, ParserExtra<'a>> + Clone {
    let quoted = |quote: char| {
        just(quote)
            .ignore_then(
                none_of([quote, '\\'])
                    .or(just('\\').ignore_then(any()))
                    .repeated()
                    .collect::<String>(),
            )
            .then_ignore(just(quote))
    };
    quoted('\'').or(quoted('"'))
}

/// Parse a date literal (YYYY-MM-DD).
fn date_literal<'a>() -> impl Parser<'a, ParserInput<'a>, NaiveDate, ParserExtra<'a>> + Clone {
    digits()
        .then_ignore(just('-'))
        .then(digits())
        .then_ignore(just('-'))
        .then(digits())
        .try_map(|((year, month), day): ((&str, &str), &str), span| {
            let year: i32 = year
                .parse()
                .map_err(|_| Rich::custom(span, "invalid year"))?;
            let month: u32 = month
                .parse()
                .map_err(|_| Rich::custom(span, "invalid month"))?;
            let day: u32 = day.parse().map_err(|_| Rich::custom(span, "invalid day"))?;
            NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| Rich::custom(span, "invalid date"))
        })
}

/// Parse an unsigned number: an integer, or a decimal when it has a
/// fractional part.
fn number<'a>() -> impl Parser<'a, ParserInput<'a>, Literal, ParserExtra<'a>> + Clone {
    digits()
        .then(just('.').ignore_then(digits()).or_not())
        .try_map(|(int_part, frac_part): (&str, Option<&str>), span| match frac_part {
            Some(frac) => Decimal::from_str(&format!("{int_part}.{frac}"))
                .map(Literal::Number)
                .map_err(|_| Rich::custom(span, "invalid number")),
            None => int_part
                .parse::<i64>()
                .map(Literal::Integer)
                .map_err(|_| Rich::custom(span, "invalid integer")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn select(source: &str) -> SelectQuery {
        match parse(source).unwrap() {
            Query::Select(sel) => sel,
            _ => panic!("Expected SELECT query"),
        }
    }

    fn target_exprs(sel: &SelectQuery) -> Vec<Expr> {
        match &sel.targets {
            Targets::List(targets) => targets.iter().map(|t| t.expr.clone()).collect(),
            Targets::Wildcard => panic!("Expected target list"),
        }
    }

    #[test]
    fn test_simple_select() {
        let sel = select("SELECT *");
        assert_eq!(sel.targets, Targets::Wildcard);
        assert!(!sel.distinct);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let sel = select("select Date, ACCOUNT from year = 2024 order by 1 desc");
        assert_eq!(
            target_exprs(&sel),
            vec![Expr::column("date"), Expr::column("account")]
        );
        assert!(sel.from.is_some());
        let order = sel.order_by.unwrap();
        assert_eq!(order[0].expr, Expr::integer(1));
        assert_eq!(order[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_select_with_alias() {
        let sel = select("SELECT account, length(account) AS Len");
        match &sel.targets {
            Targets::List(targets) => {
                assert_eq!(targets[1].alias.as_deref(), Some("len"));
                assert_eq!(
                    targets[1].expr,
                    Expr::function("length", vec![Expr::column("account")])
                );
            }
            Targets::Wildcard => panic!("Expected target list"),
        }
    }

    #[test]
    fn test_select_distinct() {
        assert!(select("SELECT DISTINCT account").distinct);
    }

    #[test]
    fn test_integer_and_decimal_literals() {
        let sel = select("SELECT 1, 1.0, -2, 'a', \"b\", 2024-01-15, TRUE, NULL");
        assert_eq!(
            target_exprs(&sel),
            vec![
                Expr::integer(1),
                Expr::number(dec!(1.0)),
                Expr::integer(-2),
                Expr::string("a"),
                Expr::string("b"),
                Expr::date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
                Expr::boolean(true),
                Expr::null(),
            ]
        );
    }

    #[test]
    fn test_precedence() {
        let sel = select("SELECT 1 + 2 * 3");
        assert_eq!(
            target_exprs(&sel)[0].canonical_name(),
            "add(1, mul(2, 3))"
        );
        let sel = select("SELECT * WHERE NOT a = 1 OR b AND c");
        assert_eq!(
            sel.where_clause.unwrap().canonical_name(),
            "or(not(equal(a, 1)), and(b, c))"
        );
    }

    #[test]
    fn test_not_equal_desugars() {
        let sel = select("SELECT * WHERE account != 'Assets:Cash'");
        assert_eq!(
            sel.where_clause.unwrap().canonical_name(),
            "not(equal(account, 'Assets:Cash'))"
        );
    }

    #[test]
    fn test_is_null() {
        let sel = select("SELECT * WHERE payee IS NULL AND price IS NOT NULL");
        assert_eq!(
            sel.where_clause.unwrap().canonical_name(),
            "and(isnull(payee), isnotnull(price))"
        );
    }

    #[test]
    fn test_in_list_and_regex() {
        let sel = select("SELECT * WHERE year IN (2023, 2024) AND account ~ 'Expenses'");
        assert_eq!(
            sel.where_clause.unwrap().canonical_name(),
            "and(contains(year, (2023, 2024)), match(account, 'Expenses'))"
        );
        let sel = select("SELECT * WHERE 'trip' IN tags");
        assert_eq!(
            sel.where_clause.unwrap().canonical_name(),
            "contains('trip', tags)"
        );
    }

    #[test]
    fn test_negation_of_column() {
        let sel = select("SELECT -number");
        assert_eq!(target_exprs(&sel)[0].canonical_name(), "neg(number)");
    }

    #[test]
    fn test_nested_function_arguments() {
        let sel = select("SELECT round(sum(number * 2), -1)");
        assert_eq!(
            target_exprs(&sel)[0].canonical_name(),
            "round(sum(mul(number, 2)), -1)"
        );
    }

    #[test]
    fn test_from_open_close_clear() {
        let sel = select("SELECT * FROM year = 2014 OPEN ON 2014-01-01 CLOSE ON 2015-01-01 CLEAR");
        let from = sel.from.unwrap();
        assert!(from.expr.is_some());
        assert_eq!(from.open, NaiveDate::from_ymd_opt(2014, 1, 1));
        assert_eq!(
            from.close,
            Some(CloseSpec::On(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()))
        );
        assert!(from.clear);

        let sel = select("SELECT * FROM CLOSE");
        let from = sel.from.unwrap();
        assert!(from.expr.is_none());
        assert_eq!(from.close, Some(CloseSpec::Undated));
    }

    #[test]
    fn test_empty_from_is_rejected() {
        assert!(parse("SELECT * FROM").is_err());
    }

    #[test]
    fn test_group_by_having_pivot_limit() {
        let sel = select(
            "SELECT account, year, sum(number) GROUP BY 1, 2 HAVING sum(number) > 0 \
             ORDER BY account PIVOT BY account, year LIMIT 10",
        );
        let group_by = sel.group_by.unwrap();
        assert_eq!(group_by.columns, vec![Expr::integer(1), Expr::integer(2)]);
        assert!(group_by.having.is_some());
        assert_eq!(
            sel.pivot_by,
            Some(vec![Expr::column("account"), Expr::column("year")])
        );
        assert_eq!(sel.limit, Some(10));
    }

    #[test]
    fn test_journal_query() {
        match parse("JOURNAL 'Assets:Bank' AT cost").unwrap() {
            Query::Journal(journal) => {
                assert_eq!(journal.account.as_deref(), Some("Assets:Bank"));
                assert_eq!(journal.at_function.as_deref(), Some("cost"));
            }
            _ => panic!("Expected JOURNAL query"),
        }
    }

    #[test]
    fn test_balances_query() {
        match parse("BALANCES AT units FROM year = 2024 WHERE account ~ 'Assets'").unwrap() {
            Query::Balances(balances) => {
                assert_eq!(balances.at_function.as_deref(), Some("units"));
                assert!(balances.from.is_some());
                assert!(balances.where_clause.is_some());
            }
            _ => panic!("Expected BALANCES query"),
        }
    }

    #[test]
    fn test_print_query() {
        assert!(matches!(parse("PRINT").unwrap(), Query::Print(PrintQuery { from: None })));
        assert!(matches!(
            parse("print from clear;").unwrap(),
            Query::Print(PrintQuery { from: Some(_) })
        ));
    }

    #[test]
    fn test_reserved_keyword_is_not_a_column() {
        assert!(parse("SELECT from").is_err());
    }

    #[test]
    fn test_errors() {
        let err = parse("SELECT").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
        let err = parse("SELECT account WHERE").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEof);
        let err = parse("SELECT account garbage").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::SyntaxError(_)));
        assert_eq!(err.position, 15);
        assert!(matches!(
            parse("SELECT ) FROM year = 2024").unwrap_err().kind,
            ParseErrorKind::SyntaxError(_)
        ));
        assert_eq!(parse("SELECT account,  ").unwrap_err().kind, ParseErrorKind::UnexpectedEof);
    }
}
