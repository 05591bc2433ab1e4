use crate::ast::expressions::{BasicLit, Expr, Ident};
use crate::ast::query::TabularExpr;
use crate::ast::tokens::{Token, TokenKind};
use crate::span::{union_spans, Span};

/// A transformation stage in a tabular expression.
///
/// Operators appear in source order; each carries the span of the pipe
/// that introduced it.
#[derive(Debug, Clone, PartialEq)]
pub enum TabularOperator {
    /// `| count`
    Count(CountOperator),
    /// `| where EXPR` (alias `filter`)
    Where(WhereOperator),
    /// `| sort by TERM, …` (alias `order`)
    Sort(SortOperator),
    /// `| take N` (alias `limit`)
    Take(TakeOperator),
    /// `| top N by TERM`
    Top(TopOperator),
    /// `| project COL, …`
    Project(ProjectOperator),
    /// `| extend NAME = EXPR, …`
    Extend(ExtendOperator),
    /// `| summarize COL, … by COL, …`
    Summarize(SummarizeOperator),
    /// `| join kind=FLAVOR (EXPR) on COND, …`
    Join(JoinOperator),
    /// `| as NAME`
    As(AsOperator),
    /// An operator the parser could not recognize, kept verbatim for
    /// error recovery and completion.
    Unknown(UnknownOperator),
}

impl TabularOperator {
    pub fn span(&self) -> Span {
        match self {
            TabularOperator::Count(op) => op.span(),
            TabularOperator::Where(op) => op.span(),
            TabularOperator::Sort(op) => op.span(),
            TabularOperator::Take(op) => op.span(),
            TabularOperator::Top(op) => op.span(),
            TabularOperator::Project(op) => op.span(),
            TabularOperator::Extend(op) => op.span(),
            TabularOperator::Summarize(op) => op.span(),
            TabularOperator::Join(op) => op.span(),
            TabularOperator::As(op) => op.span(),
            TabularOperator::Unknown(op) => op.span(),
        }
    }
}

/// A `| count` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct CountOperator {
    pub pipe: Span,
    pub keyword: Span,
}

impl CountOperator {
    pub fn span(&self) -> Span {
        union_spans([self.pipe, self.keyword])
    }
}

/// A `| where` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub predicate: Option<Expr>,
}

impl WhereOperator {
    pub fn span(&self) -> Span {
        union_spans([
            self.pipe,
            self.keyword,
            self.predicate.as_ref().map_or(Span::null(), Expr::span),
        ])
    }
}

/// A `| sort by` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOperator {
    pub pipe: Span,
    /// Covers both the `sort`/`order` keyword and the `by` that follows.
    pub keyword: Span,
    pub terms: Vec<SortTerm>,
}

impl SortOperator {
    pub fn span(&self) -> Span {
        union_spans(
            [self.pipe, self.keyword]
                .into_iter()
                .chain(self.terms.iter().map(SortTerm::span)),
        )
    }
}

/// A single sort constraint in a [`SortOperator`] or [`TopOperator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SortTerm {
    pub x: Expr,
    /// True for `asc`. When neither `asc` nor `desc` was written, both
    /// this and `nulls_first` stay false.
    pub asc: bool,
    pub asc_desc_span: Span,
    pub nulls_first: bool,
    pub nulls_span: Span,
}

impl SortTerm {
    pub fn span(&self) -> Span {
        union_spans([self.x.span(), self.asc_desc_span, self.nulls_span])
    }
}

/// A `| take` operator. The row count must be an integer literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub row_count: Option<BasicLit>,
}

impl TakeOperator {
    pub fn span(&self) -> Span {
        union_spans([
            self.pipe,
            self.keyword,
            self.row_count.as_ref().map_or(Span::null(), |lit| lit.span),
        ])
    }
}

/// A `| top` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TopOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub row_count: Option<BasicLit>,
    pub by: Span,
    pub col: Option<SortTerm>,
}

impl TopOperator {
    pub fn span(&self) -> Span {
        union_spans([
            self.pipe,
            self.keyword,
            self.row_count.as_ref().map_or(Span::null(), |lit| lit.span),
            self.by,
            self.col.as_ref().map_or(Span::null(), SortTerm::span),
        ])
    }
}

/// A `| project` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub cols: Vec<ProjectColumn>,
}

impl ProjectOperator {
    pub fn span(&self) -> Span {
        union_spans(
            [self.pipe, self.keyword]
                .into_iter()
                .chain(self.cols.iter().map(ProjectColumn::span)),
        )
    }
}

/// A single column term in a [`ProjectOperator`]: a column name,
/// optionally followed by an expression computing the column. If the
/// expression is omitted, the name selects an existing column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectColumn {
    pub name: Ident,
    pub assign: Span,
    pub x: Option<Expr>,
}

impl ProjectColumn {
    pub fn span(&self) -> Span {
        union_spans([
            self.name.span,
            self.assign,
            self.x.as_ref().map_or(Span::null(), Expr::span),
        ])
    }
}

/// An `| extend` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub cols: Vec<ExtendColumn>,
}

impl ExtendOperator {
    pub fn span(&self) -> Span {
        union_spans(
            [self.pipe, self.keyword]
                .into_iter()
                .chain(self.cols.iter().map(ExtendColumn::span)),
        )
    }
}

/// A single column term in an [`ExtendOperator`]. Unlike `project`, the
/// assignment is mandatory; `x` is `None` only in trees returned
/// alongside a parse error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendColumn {
    pub name: Ident,
    pub assign: Span,
    pub x: Option<Expr>,
}

impl ExtendColumn {
    pub fn span(&self) -> Span {
        union_spans([
            self.name.span,
            self.assign,
            self.x.as_ref().map_or(Span::null(), Expr::span),
        ])
    }
}

/// A `| summarize` operator.
///
/// The `by` span is null iff there are no group-by columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub cols: Vec<SummarizeColumn>,
    pub by: Span,
    pub group_by: Vec<SummarizeColumn>,
}

impl SummarizeOperator {
    pub fn span(&self) -> Span {
        union_spans(
            [self.pipe, self.keyword]
                .into_iter()
                .chain(self.cols.iter().map(SummarizeColumn::span))
                .chain([self.by])
                .chain(self.group_by.iter().map(SummarizeColumn::span)),
        )
    }
}

/// A single column term in a [`SummarizeOperator`]: an expression,
/// optionally preceded by a column name. If the name is omitted, one is
/// derived from the expression's source text.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeColumn {
    pub name: Option<Ident>,
    pub assign: Span,
    pub x: Option<Expr>,
}

impl SummarizeColumn {
    pub fn span(&self) -> Span {
        union_spans([
            self.name.as_ref().map_or(Span::null(), |name| name.span),
            self.assign,
            self.x.as_ref().map_or(Span::null(), Expr::span),
        ])
    }
}

/// A `| join` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOperator {
    pub pipe: Span,
    pub keyword: Span,

    pub kind: Span,
    pub kind_assign: Span,
    /// The type of join to use. If absent, `innerunique` is implied.
    pub flavor: Option<Ident>,

    pub lparen: Span,
    pub right: Option<Box<TabularExpr>>,
    pub rparen: Span,

    pub on: Span,
    /// One or more AND-ed conditions. A condition that is a single
    /// identifier `x` is treated as `$left.x == $right.x`.
    pub conditions: Vec<Expr>,
}

impl JoinOperator {
    pub fn span(&self) -> Span {
        union_spans(
            [
                self.pipe,
                self.keyword,
                self.kind,
                self.kind_assign,
                self.flavor.as_ref().map_or(Span::null(), |f| f.span),
                self.lparen,
                self.right.as_ref().map_or(Span::null(), |r| r.span()),
                self.rparen,
                self.on,
            ]
            .into_iter()
            .chain(self.conditions.iter().map(Expr::span)),
        )
    }
}

/// An `| as` operator, binding a name to the pipeline so far.
#[derive(Debug, Clone, PartialEq)]
pub struct AsOperator {
    pub pipe: Span,
    pub keyword: Span,
    pub name: Option<Ident>,
}

impl AsOperator {
    pub fn span(&self) -> Span {
        union_spans([
            self.pipe,
            self.keyword,
            self.name.as_ref().map_or(Span::null(), |name| name.span),
        ])
    }
}

/// An operator whose name the parser did not recognize (or that was
/// missing entirely). The raw tokens after the pipe are kept so that
/// completion can still work inside the region.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownOperator {
    pub pipe: Span,
    pub tokens: Vec<Token>,
}

impl UnknownOperator {
    pub fn span(&self) -> Span {
        union_spans([self.pipe].into_iter().chain(self.tokens.iter().map(|tok| tok.span)))
    }

    /// The leading identifier of the region, if there is one.
    pub fn name(&self) -> Option<&Token> {
        match self.tokens.first() {
            Some(tok) if tok.kind == TokenKind::Identifier => Some(tok),
            _ => None,
        }
    }
}
