//! Rewrites AST expressions into SQL fragments.
//!
//! The writer discards the parentheses the user wrote and reinserts its
//! own wherever a sub-expression could capture a neighboring binary
//! operator. Equality is flattened out of three-valued logic with
//! `coalesce(… , FALSE)`, except between the two sides of a join's ON
//! clause.

use crate::ast::{BasicLit, CallExpr, Expr, QualifiedIdent, TokenKind};
use crate::compile::CompileError;
use crate::span::Span;
use std::collections::HashMap;

pub(crate) const LEFT_JOIN_TABLE_ALIAS: &str = "$left";
pub(crate) const RIGHT_JOIN_TABLE_ALIAS: &str = "$right";

/// The expression-writing mode. Inside a join's ON clause the reserved
/// `$left`/`$right` qualifiers are legal and plain equality between the
/// two tables is kept bare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExprMode {
    Default,
    Join,
}

pub(crate) struct ExprContext<'a> {
    pub(crate) source: &'a str,
    /// Identifier substitutions: caller parameters and `let` bindings.
    pub(crate) scope: Option<&'a HashMap<String, String>>,
    pub(crate) mode: ExprMode,
}

impl<'a> ExprContext<'a> {
    fn lookup_scope(&self, name: &str) -> Option<&'a str> {
        self.scope?.get(name).map(String::as_str)
    }
}

pub(crate) fn builtin_identifier(name: &str) -> Option<&'static str> {
    match name {
        "true" => Some("TRUE"),
        "false" => Some("FALSE"),
        "null" => Some("NULL"),
        _ => None,
    }
}

fn binary_op_sql(op: TokenKind) -> Option<&'static str> {
    match op {
        TokenKind::And => Some("AND"),
        TokenKind::Or => Some("OR"),
        TokenKind::Plus => Some("+"),
        TokenKind::Minus => Some("-"),
        TokenKind::Star => Some("*"),
        TokenKind::Slash => Some("/"),
        TokenKind::Mod => Some("%"),
        TokenKind::Lt => Some("<"),
        TokenKind::Le => Some("<="),
        TokenKind::Gt => Some(">"),
        TokenKind::Ge => Some(">="),
        _ => None,
    }
}

fn unwrap_parens(x: &Expr) -> &Expr {
    let mut x = x;
    while let Expr::Paren(paren) = x {
        match &paren.x {
            Some(inner) => x = inner,
            None => break,
        }
    }
    x
}

fn required<'x>(
    ctx: &ExprContext<'_>,
    x: &'x Option<Box<Expr>>,
    span: Span,
) -> Result<&'x Expr, CompileError> {
    match x {
        Some(x) => Ok(x),
        None => Err(CompileError::new(ctx.source, span, "incomplete expression")),
    }
}

pub(crate) fn write_expression(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    x: &Expr,
) -> Result<(), CompileError> {
    let x = unwrap_parens(x);
    match x {
        Expr::Paren(paren) => Err(CompileError::new(
            ctx.source,
            paren.span(),
            "incomplete expression",
        )),
        Expr::Ident(id) => write_qualified_ident(ctx, sb, id),
        Expr::Literal(lit) => write_literal(ctx, sb, lit),
        Expr::Unary(unary) => {
            match unary.op {
                TokenKind::Plus => sb.push('+'),
                TokenKind::Minus => sb.push('-'),
                _ => {
                    return Err(CompileError::new(
                        ctx.source,
                        unary.op_span,
                        "unhandled unary operator",
                    ));
                }
            }
            let operand = required(ctx, &unary.x, unary.span())?;
            write_expression_maybe_paren(ctx, sb, operand)
        }
        Expr::Binary(binary) => {
            let left = required(ctx, &binary.x, binary.span())?;
            let right = required(ctx, &binary.y, binary.span())?;
            match binary.op {
                TokenKind::Eq => {
                    if ctx.mode == ExprMode::Join {
                        let (xl, xr) = has_join_terms(left);
                        let (yl, yr) = has_join_terms(right);
                        if (xl || yl) && (xr || yr) {
                            // ClickHouse only recognizes plain equality
                            // between the left and right tables in an ON
                            // clause, so the coalesce wrapper must go.
                            write_expression_maybe_paren(ctx, sb, left)?;
                            sb.push_str(" = ");
                            write_expression_maybe_paren(ctx, sb, right)?;
                            return Ok(());
                        }
                    }

                    sb.push_str("coalesce(");
                    write_expression_maybe_paren(ctx, sb, left)?;
                    sb.push_str(" = ");
                    write_expression_maybe_paren(ctx, sb, right)?;
                    sb.push_str(", FALSE)");
                    Ok(())
                }
                TokenKind::Ne => {
                    sb.push_str("coalesce(");
                    write_expression_maybe_paren(ctx, sb, left)?;
                    sb.push_str(" <> ");
                    write_expression_maybe_paren(ctx, sb, right)?;
                    sb.push_str(", FALSE)");
                    Ok(())
                }
                TokenKind::CaseInsensitiveEq => {
                    sb.push_str("lower(");
                    write_expression(ctx, sb, left)?;
                    sb.push_str(") = lower(");
                    write_expression(ctx, sb, right)?;
                    sb.push(')');
                    Ok(())
                }
                TokenKind::CaseInsensitiveNe => {
                    sb.push_str("lower(");
                    write_expression(ctx, sb, left)?;
                    sb.push_str(") <> lower(");
                    write_expression(ctx, sb, right)?;
                    sb.push(')');
                    Ok(())
                }
                op => match binary_op_sql(op) {
                    Some(sql_op) => {
                        write_expression_maybe_paren(ctx, sb, left)?;
                        sb.push(' ');
                        sb.push_str(sql_op);
                        sb.push(' ');
                        write_expression_maybe_paren(ctx, sb, right)
                    }
                    None => Err(CompileError::new(
                        ctx.source,
                        binary.op_span,
                        "unhandled binary operator",
                    )),
                },
            }
        }
        Expr::In(in_expr) => {
            let left = required(ctx, &in_expr.x, in_expr.span())?;
            write_expression_maybe_paren(ctx, sb, left)?;
            sb.push_str(" IN (");
            for (i, val) in in_expr.vals.iter().enumerate() {
                if i > 0 {
                    sb.push_str(", ");
                }
                write_expression_maybe_paren(ctx, sb, val)?;
            }
            sb.push(')');
            Ok(())
        }
        Expr::Index(index) => {
            write_expression_maybe_paren(ctx, sb, &index.x)?;
            sb.push('[');
            let i = required(ctx, &index.index, index.span())?;
            write_expression(ctx, sb, i)?;
            sb.push(']');
            Ok(())
        }
        Expr::Call(call) => match known_function(&call.func.name) {
            Some(f) => (f.write)(ctx, sb, call),
            None => {
                sb.push_str(&call.func.name);
                sb.push('(');
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        sb.push_str(", ");
                    }
                    write_expression(ctx, sb, arg)?;
                }
                sb.push(')');
                Ok(())
            }
        },
    }
}

/// Like [`write_expression`], but wraps the output in parentheses when
/// the expression could capture a neighboring operator.
pub(crate) fn write_expression_maybe_paren(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    x: &Expr,
) -> Result<(), CompileError> {
    let x = unwrap_parens(x);
    match x {
        Expr::Ident(_) | Expr::Unary(_) | Expr::Literal(_) => return write_expression(ctx, sb, x),
        Expr::Call(call) => {
            let needs_parens = known_function(&call.func.name).is_some_and(|f| f.needs_parens);
            if !needs_parens {
                return write_expression(ctx, sb, x);
            }
        }
        _ => {}
    }

    sb.push('(');
    write_expression(ctx, sb, x)?;
    sb.push(')');
    Ok(())
}

fn write_qualified_ident(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    id: &QualifiedIdent,
) -> Result<(), CompileError> {
    if let [part] = id.parts.as_slice() {
        if !part.quoted {
            if let Some(sql) = ctx.lookup_scope(&part.name) {
                sb.push_str(sql);
                return Ok(());
            }
            if let Some(sql) = builtin_identifier(&part.name) {
                sb.push_str(sql);
                return Ok(());
            }
        }
    }

    for (i, part) in id.parts.iter().enumerate() {
        if i > 0 {
            sb.push('.');
        }
        if !part.quoted
            && (part.name == LEFT_JOIN_TABLE_ALIAS || part.name == RIGHT_JOIN_TABLE_ALIAS)
            && ctx.mode != ExprMode::Join
        {
            return Err(CompileError::new(
                ctx.source,
                id.parts[0].span,
                format!("{} used in non-join context", part.name),
            ));
        }
        quote_identifier(sb, &part.name);
    }
    Ok(())
}

fn write_literal(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    lit: &BasicLit,
) -> Result<(), CompileError> {
    match lit.kind {
        TokenKind::Number => {
            sb.push_str(&lit.value);
            Ok(())
        }
        TokenKind::String => {
            quote_sql_string(sb, &lit.value);
            Ok(())
        }
        _ => Err(CompileError::new(ctx.source, lit.span, "unhandled literal")),
    }
}

/// Reports whether the expression references the `$left` or `$right`
/// join qualifiers anywhere.
pub(crate) fn has_join_terms(x: &Expr) -> (bool, bool) {
    fn walk(x: &Expr, left: &mut bool, right: &mut bool) {
        match x {
            Expr::Ident(id) => {
                for part in &id.parts {
                    match part.name.as_str() {
                        LEFT_JOIN_TABLE_ALIAS => *left = true,
                        RIGHT_JOIN_TABLE_ALIAS => *right = true,
                        _ => {}
                    }
                }
            }
            Expr::Literal(_) => {}
            Expr::Unary(unary) => walk_opt(&unary.x, left, right),
            Expr::Binary(binary) => {
                walk_opt(&binary.x, left, right);
                walk_opt(&binary.y, left, right);
            }
            Expr::In(in_expr) => {
                walk_opt(&in_expr.x, left, right);
                for val in &in_expr.vals {
                    walk(val, left, right);
                }
            }
            Expr::Paren(paren) => walk_opt(&paren.x, left, right),
            Expr::Index(index) => {
                walk(&index.x, left, right);
                walk_opt(&index.index, left, right);
            }
            Expr::Call(call) => {
                for arg in &call.args {
                    walk(arg, left, right);
                }
            }
        }
    }

    fn walk_opt(x: &Option<Box<Expr>>, left: &mut bool, right: &mut bool) {
        if let Some(x) = x {
            walk(x, left, right);
        }
    }

    let (mut left, mut right) = (false, false);
    walk(x, &mut left, &mut right);
    (left, right)
}

/// Emits a double-quoted identifier; an embedded `"` is doubled.
pub(crate) fn quote_identifier(sb: &mut String, name: &str) {
    sb.push('"');
    for c in name.chars() {
        if c == '"' {
            sb.push_str("\"\"");
        } else {
            sb.push(c);
        }
    }
    sb.push('"');
}

/// Emits a single-quoted SQL string; an embedded `'` is doubled.
pub(crate) fn quote_sql_string(sb: &mut String, s: &str) {
    sb.push('\'');
    for c in s.chars() {
        if c == '\'' {
            sb.push_str("''");
        } else {
            sb.push(c);
        }
    }
    sb.push('\'');
}

struct FunctionRewrite {
    write: fn(&ExprContext<'_>, &mut String, &CallExpr) -> Result<(), CompileError>,
    /// True when the rewritten SQL can contain a binary operator.
    needs_parens: bool,
}

/// The registry of scalar functions with dedicated rewrites. Unknown
/// functions pass through verbatim.
fn known_function(name: &str) -> Option<&'static FunctionRewrite> {
    static COUNT: FunctionRewrite = FunctionRewrite {
        write: write_count_function,
        needs_parens: false,
    };
    static COUNT_IF: FunctionRewrite = FunctionRewrite {
        write: write_count_if_function,
        needs_parens: false,
    };
    static IFF: FunctionRewrite = FunctionRewrite {
        write: write_if_function,
        needs_parens: true,
    };
    static IS_NOT_NULL: FunctionRewrite = FunctionRewrite {
        write: write_is_not_null_function,
        needs_parens: true,
    };
    static IS_NULL: FunctionRewrite = FunctionRewrite {
        write: write_is_null_function,
        needs_parens: true,
    };
    static NOT: FunctionRewrite = FunctionRewrite {
        write: write_not_function,
        needs_parens: false,
    };
    static NOW: FunctionRewrite = FunctionRewrite {
        write: write_now_function,
        needs_parens: false,
    };
    static STRCAT: FunctionRewrite = FunctionRewrite {
        write: write_strcat_function,
        needs_parens: true,
    };
    static TO_LOWER: FunctionRewrite = FunctionRewrite {
        write: write_to_lower_function,
        needs_parens: true,
    };
    static TO_UPPER: FunctionRewrite = FunctionRewrite {
        write: write_to_upper_function,
        needs_parens: true,
    };

    match name {
        "count" => Some(&COUNT),
        "countif" => Some(&COUNT_IF),
        "iif" | "iff" => Some(&IFF),
        "isnotnull" => Some(&IS_NOT_NULL),
        "isnull" => Some(&IS_NULL),
        "not" => Some(&NOT),
        "now" => Some(&NOW),
        "strcat" => Some(&STRCAT),
        "tolower" => Some(&TO_LOWER),
        "toupper" => Some(&TO_UPPER),
        _ => None,
    }
}

/// The span between a call's parentheses, used for argument-count
/// mismatch reports.
fn argument_span(call: &CallExpr) -> Span {
    Span::new(call.lparen.end, call.rparen.start)
}

fn write_not_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!("not(x) takes a single argument (got {})", call.args.len()),
        ));
    };
    sb.push_str("NOT ");
    write_expression_maybe_paren(ctx, sb, arg)
}

fn write_now_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    if !call.args.is_empty() {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!("now() takes no arguments (got {})", call.args.len()),
        ));
    }
    sb.push_str("CURRENT_TIMESTAMP");
    Ok(())
}

fn write_is_null_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!("isnull(x) takes a single argument (got {})", call.args.len()),
        ));
    };
    write_expression_maybe_paren(ctx, sb, arg)?;
    sb.push_str(" IS NULL");
    Ok(())
}

fn write_is_not_null_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!(
                "isnotnull(x) takes a single argument (got {})",
                call.args.len()
            ),
        ));
    };
    write_expression_maybe_paren(ctx, sb, arg)?;
    sb.push_str(" IS NOT NULL");
    Ok(())
}

fn write_strcat_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let Some((first, rest)) = call.args.split_first() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            "strcat(x) takes at least one argument",
        ));
    };
    write_expression_maybe_paren(ctx, sb, first)?;
    for arg in rest {
        sb.push_str(" || ");
        write_expression_maybe_paren(ctx, sb, arg)?;
    }
    Ok(())
}

fn write_count_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    if !call.args.is_empty() {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!("count() takes no arguments (got {})", call.args.len()),
        ));
    }
    sb.push_str("count()");
    Ok(())
}

fn write_count_if_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!(
                "countif(x) takes a single argument (got {})",
                call.args.len()
            ),
        ));
    };
    sb.push_str("count() FILTER (WHERE ");
    write_expression(ctx, sb, arg)?;
    sb.push(')');
    Ok(())
}

fn write_if_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [condition, then, otherwise] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!(
                "{}(if, then, else) takes 3 arguments (got {})",
                call.func.name,
                call.args.len()
            ),
        ));
    };
    sb.push_str("CASE WHEN coalesce(");
    write_expression(ctx, sb, condition)?;
    sb.push_str(", FALSE) THEN ");
    write_expression(ctx, sb, then)?;
    sb.push_str(" ELSE ");
    write_expression(ctx, sb, otherwise)?;
    sb.push_str(" END");
    Ok(())
}

fn write_to_lower_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!(
                "tolower(x) takes a single argument (got {})",
                call.args.len()
            ),
        ));
    };
    sb.push_str("LOWER(");
    write_expression(ctx, sb, arg)?;
    sb.push(')');
    Ok(())
}

fn write_to_upper_function(
    ctx: &ExprContext<'_>,
    sb: &mut String,
    call: &CallExpr,
) -> Result<(), CompileError> {
    let [arg] = call.args.as_slice() else {
        return Err(CompileError::new(
            ctx.source,
            argument_span(call),
            format!(
                "toupper(x) takes a single argument (got {})",
                call.args.len()
            ),
        ));
    };
    sb.push_str("UPPER(");
    write_expression(ctx, sb, arg)?;
    sb.push(')');
    Ok(())
}
