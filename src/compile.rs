//! Lowers a parsed pipeline into a single SQL statement.
//!
//! The operator list is linearized into a sequence of named subqueries,
//! fusing `sort` and `take` clauses into the previous subquery when it
//! leaves the identifiers in scope unchanged. The subqueries are then
//! emitted as `WITH` common table expressions followed by a terminal
//! `SELECT`.

use crate::ast::{
    BinaryExpr, Expr, Ident, QualifiedIdent, SortOperator, Statement, SummarizeColumn,
    TabularDataSource, TabularExpr, TabularOperator, TakeOperator, TokenKind,
};
use crate::parser::{parse_statements, ParseError};
use crate::span::{line_col, Span};
use crate::sql::{
    builtin_identifier, quote_identifier, write_expression, write_expression_maybe_paren,
    ExprContext, ExprMode, LEFT_JOIN_TABLE_ALIAS, RIGHT_JOIN_TABLE_ALIAS,
};
use std::collections::HashMap;
use std::fmt;

/// An error from [`compile`]: either the query did not parse, or a
/// parsed construct could not be lowered to SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{}", err),
            Error::Compile(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Compile(err) => Some(err),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compile(err)
    }
}

/// A lowering error carrying the offending span.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub span: Span,
    /// 1-based line of the span's start offset, when the span is valid.
    pub line: usize,
    /// 1-based column, with tabs advancing to the next 8-aligned stop.
    pub column: usize,
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(source: &str, span: Span, message: impl Into<String>) -> CompileError {
        let (line, column) = if span.is_valid() {
            line_col(source, (span.start as usize).min(source.len()))
        } else {
            (0, 0)
        };
        CompileError {
            span,
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.span.is_valid() {
            return write!(f, "{}", self.message);
        }
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Optional parameters that configure compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// A map of identifiers to SQL snippets to substitute in. For
    /// example, a `"foo": "$1"` entry replaces unquoted `foo`
    /// identifiers with `$1` in the resulting SQL.
    pub parameters: HashMap<String, String>,
}

impl CompileOptions {
    pub fn new() -> CompileOptions {
        CompileOptions::default()
    }

    /// Converts the given Pipeline Query Language statement into the
    /// equivalent SQL.
    pub fn compile(&self, source: &str) -> Result<String, Error> {
        let statements = parse_statements(source)?;

        let mut scope = self.parameters.clone();
        let mut expr = None;
        for statement in &statements {
            match statement {
                Statement::Let(stmt) => {
                    let Some(x) = &stmt.x else {
                        return Err(CompileError::new(
                            source,
                            stmt.span(),
                            "incomplete expression",
                        )
                        .into());
                    };
                    let mut sql = String::new();
                    {
                        let ctx = ExprContext {
                            source,
                            scope: Some(&scope),
                            mode: ExprMode::Default,
                        };
                        write_expression_maybe_paren(&ctx, &mut sql, x)?;
                    }
                    scope.insert(stmt.name.name.clone(), sql);
                }
                Statement::Tabular(tabular) => {
                    if expr.is_some() {
                        return Err(CompileError::new(
                            source,
                            tabular.span(),
                            "unexpected second tabular expression",
                        )
                        .into());
                    }
                    expr = Some(tabular);
                }
            }
        }
        let Some(expr) = expr else {
            return Err(CompileError::new(
                source,
                Span::at(source.len()),
                "empty query",
            )
            .into());
        };

        let mut subqueries = Vec::new();
        split_queries(&mut subqueries, source, expr)?;
        let Some((query, ctes)) = subqueries.split_last() else {
            return Err(
                CompileError::new(source, Span::at(source.len()), "empty query").into(),
            );
        };

        let ctx = ExprContext {
            source,
            scope: Some(&scope),
            mode: ExprMode::Default,
        };
        let mut sb = String::new();
        if !ctes.is_empty() {
            sb.push_str("WITH ");
            for (i, sub) in ctes.iter().enumerate() {
                quote_identifier(&mut sb, &sub.name);
                sb.push_str(" AS (");
                sub.write(&ctx, &mut sb)?;
                sb.push(')');
                if i < ctes.len() - 1 {
                    sb.push_str(", ");
                } else {
                    sb.push(' ');
                }
            }
        }
        query.write(&ctx, &mut sb)?;
        sb.push(';');
        Ok(sb)
    }
}

/// Converts the given Pipeline Query Language statement into the
/// equivalent SQL. This is equivalent to
/// `CompileOptions::new().compile(source)`.
pub fn compile(source: &str) -> Result<String, Error> {
    CompileOptions::new().compile(source)
}

/// A lowering unit corresponding to a `WITH`-named SELECT or the final
/// SELECT.
struct Subquery<'a> {
    name: String,
    source_sql: String,

    op: Option<&'a TabularOperator>,
    sort: Option<SortOperator>,
    take: Option<TakeOperator>,
}

fn subquery_name(i: usize) -> String {
    format!("__subquery{}", i)
}

/// Reports whether sort and take clauses may fuse into the subquery.
/// They attach only to a subquery with no primary operator (a plain
/// `SELECT *`); ordering and limiting an operator's output must happen
/// in a later subquery where its column names are in scope.
fn can_attach_clauses(sub: &Subquery<'_>) -> bool {
    sub.op.is_none()
}

/// Reports whether the operator emits new column names. Such operators
/// are always closed off as a named subquery so that whatever follows
/// sees the renamed columns.
fn renames_columns(op: &TabularOperator) -> bool {
    matches!(
        op,
        TabularOperator::Project(_) | TabularOperator::Summarize(_) | TabularOperator::As(_)
    )
}

/// Appends subqueries representing the given tabular expression to
/// `dst`. The last element of `dst` afterwards represents the full
/// expression.
fn split_queries<'a>(
    dst: &mut Vec<Subquery<'a>>,
    source: &str,
    expr: &'a TabularExpr,
) -> Result<(), CompileError> {
    let dst_start = dst.len();
    let mut last: Option<usize> = None;
    for op in &expr.operators {
        match op {
            TabularOperator::As(as_op) => {
                let mut sub = chain_subquery(dst, dst_start, &expr.source);
                let Some(name) = &as_op.name else {
                    return Err(CompileError::new(
                        source,
                        as_op.span(),
                        "missing name for 'as' operator",
                    ));
                };
                sub.name = name.name.clone();
                // Treated the same as an empty subquery, except nothing
                // may attach to it.
                sub.op = Some(op);
                dst.push(sub);
                last = Some(dst.len() - 1);
            }
            TabularOperator::Sort(sort_op) => {
                let attach = last.is_some_and(|i| {
                    can_attach_clauses(&dst[i]) && dst[i].sort.is_none() && dst[i].take.is_none()
                });
                if !attach {
                    dst.push(chain_subquery(dst, dst_start, &expr.source));
                    last = Some(dst.len() - 1);
                }
                if let Some(i) = last {
                    dst[i].sort = Some(sort_op.clone());
                }
            }
            TabularOperator::Take(take_op) => {
                let attach = last
                    .is_some_and(|i| can_attach_clauses(&dst[i]) && dst[i].take.is_none());
                if !attach {
                    dst.push(chain_subquery(dst, dst_start, &expr.source));
                    last = Some(dst.len() - 1);
                }
                if let Some(i) = last {
                    dst[i].take = Some(take_op.clone());
                }
            }
            TabularOperator::Top(top_op) => {
                let Some(col) = &top_op.col else {
                    return Err(CompileError::new(
                        source,
                        top_op.span(),
                        "missing sort term for 'top' operator",
                    ));
                };
                let attach = last.is_some_and(|i| {
                    can_attach_clauses(&dst[i]) && dst[i].sort.is_none() && dst[i].take.is_none()
                });
                if !attach {
                    dst.push(chain_subquery(dst, dst_start, &expr.source));
                    last = Some(dst.len() - 1);
                }
                if let Some(i) = last {
                    dst[i].sort = Some(SortOperator {
                        pipe: top_op.pipe,
                        keyword: top_op.keyword,
                        terms: vec![col.clone()],
                    });
                    dst[i].take = Some(TakeOperator {
                        pipe: top_op.pipe,
                        keyword: top_op.keyword,
                        row_count: top_op.row_count.clone(),
                    });
                }
            }
            TabularOperator::Join(join_op) => {
                // The left-hand side must be named: materialize the data
                // source as a subquery when nothing precedes the join.
                if dst.len() == dst_start {
                    dst.push(chain_subquery(dst, dst_start, &expr.source));
                }
                let left = dst.len() - 1;

                let Some(right) = &join_op.right else {
                    return Err(CompileError::new(
                        source,
                        join_op.span(),
                        "missing right-hand expression for 'join' operator",
                    ));
                };
                split_queries(dst, source, right)?;
                let right_name = match dst.last() {
                    Some(sub) => sub.name.clone(),
                    None => String::new(),
                };

                let flavor_name = join_op
                    .flavor
                    .as_ref()
                    .map_or("innerunique", |flavor| flavor.name.as_str());

                let mut join_source = String::new();
                if flavor_name == "innerunique" {
                    join_source.push_str("(SELECT DISTINCT * FROM ");
                }
                quote_identifier(&mut join_source, &dst[left].name);
                if flavor_name == "innerunique" {
                    join_source.push(')');
                }
                join_source.push_str(" AS \"");
                join_source.push_str(LEFT_JOIN_TABLE_ALIAS);
                join_source.push('"');

                match flavor_name {
                    "inner" | "innerunique" => join_source.push_str(" JOIN "),
                    "leftouter" => join_source.push_str(" LEFT JOIN "),
                    _ => {
                        return Err(CompileError::new(
                            source,
                            join_op
                                .flavor
                                .as_ref()
                                .map_or(Span::null(), |flavor| flavor.span),
                            format!("unhandled join type {:?}", flavor_name),
                        ));
                    }
                }
                quote_identifier(&mut join_source, &right_name);

                join_source.push_str(" AS \"");
                join_source.push_str(RIGHT_JOIN_TABLE_ALIAS);
                join_source.push_str("\" ON ");
                let join_ctx = ExprContext {
                    source,
                    scope: None,
                    mode: ExprMode::Join,
                };
                let condition = build_join_condition(&join_op.conditions);
                write_expression(&join_ctx, &mut join_source, &condition)?;

                dst.push(Subquery {
                    name: subquery_name(dst.len()),
                    source_sql: join_source,
                    op: None,
                    sort: None,
                    take: None,
                });
                last = Some(dst.len() - 1);
            }
            _ => {
                let mut sub = chain_subquery(dst, dst_start, &expr.source);
                sub.op = Some(op);
                dst.push(sub);
                last = Some(dst.len() - 1);
            }
        }
    }

    // Ensure that at least one subquery is added, and that a pipeline
    // ending in a renaming operator closes into a plain SELECT * whose
    // scope has the new names.
    let add_final = match dst.last() {
        None => true,
        Some(_) if dst.len() == dst_start => true,
        Some(sub) => sub.op.is_some_and(renames_columns),
    };
    if add_final {
        dst.push(chain_subquery(dst, dst_start, &expr.source));
    }

    Ok(())
}

/// Returns a new subquery that reads from the previous subquery, or
/// from the data source when there is no previous subquery in this
/// chain.
fn chain_subquery<'a>(
    dst: &[Subquery<'a>],
    dst_start: usize,
    src: &TabularDataSource,
) -> Subquery<'a> {
    let mut sb = String::new();
    match dst.last() {
        Some(prev) if dst.len() > dst_start => quote_identifier(&mut sb, &prev.name),
        _ => data_source_sql(&mut sb, src),
    }
    Subquery {
        name: subquery_name(dst.len()),
        source_sql: sb,
        op: None,
        sort: None,
        take: None,
    }
}

fn data_source_sql(sb: &mut String, src: &TabularDataSource) {
    match src {
        TabularDataSource::Table(table) => quote_identifier(sb, &table.table.name),
    }
}

/// ANDs the join conditions together, rewriting any condition that is a
/// single unqualified identifier `k` into `$left.k == $right.k`.
fn build_join_condition(conditions: &[Expr]) -> Expr {
    let Some((first, rest)) = conditions.split_first() else {
        return Expr::Ident(QualifiedIdent {
            parts: vec![Ident {
                name: "true".to_string(),
                span: Span::null(),
                quoted: false,
            }],
        });
    };
    let mut x = rewrite_simple_join_condition(first);
    for y in rest {
        x = Expr::Binary(BinaryExpr {
            x: Some(Box::new(x)),
            op: TokenKind::And,
            op_span: Span::null(),
            y: Some(Box::new(rewrite_simple_join_condition(y))),
        });
    }
    x
}

fn rewrite_simple_join_condition(condition: &Expr) -> Expr {
    let Expr::Ident(id) = condition else {
        return condition.clone();
    };
    let [part] = id.parts.as_slice() else {
        return condition.clone();
    };
    if part.quoted || builtin_identifier(&part.name).is_some() {
        return condition.clone();
    }
    let qualified = |table: &str| {
        Expr::Ident(QualifiedIdent {
            parts: vec![
                Ident {
                    name: table.to_string(),
                    span: Span::null(),
                    quoted: false,
                },
                part.clone(),
            ],
        })
    };
    Expr::Binary(BinaryExpr {
        x: Some(Box::new(qualified(LEFT_JOIN_TABLE_ALIAS))),
        op: TokenKind::Eq,
        op_span: Span::null(),
        y: Some(Box::new(qualified(RIGHT_JOIN_TABLE_ALIAS))),
    })
}

impl<'a> Subquery<'a> {
    fn write(&self, ctx: &ExprContext<'_>, sb: &mut String) -> Result<(), CompileError> {
        match self.op {
            None | Some(TabularOperator::As(_)) => {
                sb.push_str("SELECT * FROM ");
                sb.push_str(&self.source_sql);
            }
            Some(TabularOperator::Project(op)) => {
                sb.push_str("SELECT ");
                for (i, col) in op.cols.iter().enumerate() {
                    if i > 0 {
                        sb.push_str(", ");
                    }
                    match &col.x {
                        // A bare column name selects the existing column.
                        None => {
                            write_expression(ctx, sb, &Expr::Ident(col.name.to_qualified()))?
                        }
                        Some(x) => write_expression(ctx, sb, x)?,
                    }
                    sb.push_str(" AS ");
                    quote_identifier(sb, &col.name.name);
                }
                sb.push_str(" FROM ");
                sb.push_str(&self.source_sql);
            }
            Some(TabularOperator::Extend(op)) => {
                sb.push_str("SELECT *");
                for col in &op.cols {
                    sb.push_str(", ");
                    let Some(x) = &col.x else {
                        return Err(CompileError::new(
                            ctx.source,
                            col.span(),
                            "incomplete expression",
                        ));
                    };
                    write_expression(ctx, sb, x)?;
                    sb.push_str(" AS ");
                    quote_identifier(sb, &col.name.name);
                }
                sb.push_str(" FROM ");
                sb.push_str(&self.source_sql);
            }
            Some(TabularOperator::Summarize(op)) => {
                sb.push_str("SELECT ");
                for (i, col) in op.group_by.iter().enumerate() {
                    if i > 0 {
                        sb.push_str(", ");
                    }
                    write_summarize_column(ctx, sb, col)?;
                }
                for (i, col) in op.cols.iter().enumerate() {
                    if i > 0 || !op.group_by.is_empty() {
                        sb.push_str(", ");
                    }
                    write_summarize_column(ctx, sb, col)?;
                }

                sb.push_str(" FROM ");
                sb.push_str(&self.source_sql);

                if !op.group_by.is_empty() {
                    sb.push_str(" GROUP BY ");
                    for (i, col) in op.group_by.iter().enumerate() {
                        if i > 0 {
                            sb.push_str(", ");
                        }
                        let Some(x) = &col.x else {
                            return Err(CompileError::new(
                                ctx.source,
                                col.span(),
                                "incomplete expression",
                            ));
                        };
                        write_expression(ctx, sb, x)?;
                    }
                }
            }
            Some(TabularOperator::Where(op)) => {
                sb.push_str("SELECT * FROM ");
                sb.push_str(&self.source_sql);
                sb.push_str(" WHERE ");
                let Some(predicate) = &op.predicate else {
                    return Err(CompileError::new(
                        ctx.source,
                        op.span(),
                        "incomplete expression",
                    ));
                };
                write_expression(ctx, sb, predicate)?;
            }
            Some(TabularOperator::Count(_)) => {
                sb.push_str("SELECT COUNT(*) AS \"count()\" FROM ");
                sb.push_str(&self.source_sql);
            }
            Some(op) => {
                return Err(CompileError::new(ctx.source, op.span(), "unhandled operator"));
            }
        }

        if let Some(sort) = &self.sort {
            sb.push_str(" ORDER BY ");
            for (i, term) in sort.terms.iter().enumerate() {
                write_expression(ctx, sb, &term.x)?;
                sb.push_str(if term.asc { " ASC" } else { " DESC" });
                sb.push_str(if term.nulls_first {
                    " NULLS FIRST"
                } else {
                    " NULLS LAST"
                });
                if i < sort.terms.len() - 1 {
                    sb.push_str(", ");
                }
            }
        }

        if let Some(take) = &self.take {
            sb.push_str(" LIMIT ");
            let Some(row_count) = &take.row_count else {
                return Err(CompileError::new(
                    ctx.source,
                    take.span(),
                    "incomplete expression",
                ));
            };
            sb.push_str(&row_count.value);
        }

        Ok(())
    }
}

/// Writes `expr AS "name"` for a summarize column, deriving the name
/// from the expression's source text when no explicit name was given.
fn write_summarize_column(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    col: &SummarizeColumn,
) -> Result<(), CompileError> {
    let Some(x) = &col.x else {
        return Err(CompileError::new(
            ctx.source,
            col.span(),
            "incomplete expression",
        ));
    };
    write_expression(ctx, sb, x)?;
    sb.push_str(" AS ");
    match &col.name {
        Some(name) => quote_identifier(sb, &name.name),
        None => quote_identifier(sb, x.span().slice(ctx.source)),
    }
    Ok(())
}
