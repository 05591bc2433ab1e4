use crate::ast::expressions::{Expr, Ident};
use crate::ast::query::TabularExpr;
use crate::span::{union_spans, Span};

/// A single statement in a semicolon-separated source.
///
/// A source consists of zero or more `let` bindings followed by a tabular
/// expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = expr`
    Let(LetStatement),
    /// A pipeline query.
    Tabular(TabularExpr),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Let(stmt) => stmt.span(),
            Statement::Tabular(expr) => expr.span(),
        }
    }
}

/// A `let` binding.
///
/// The bound name can be used wherever a scalar is expected in the
/// statements that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct LetStatement {
    pub keyword: Span,
    pub name: Ident,
    pub assign: Span,
    pub x: Option<Expr>,
}

impl LetStatement {
    pub fn span(&self) -> Span {
        union_spans([
            self.keyword,
            self.name.span,
            self.assign,
            self.x.as_ref().map_or(Span::null(), Expr::span),
        ])
    }
}
