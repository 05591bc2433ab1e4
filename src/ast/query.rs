use crate::ast::expressions::Ident;
use crate::ast::operators::TabularOperator;
use crate::span::{union_spans, Span};

/// A query expression that produces a table: a data source followed by
/// zero or more pipe-delimited operators.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularExpr {
    pub source: TabularDataSource,
    pub operators: Vec<TabularOperator>,
}

impl TabularExpr {
    pub fn span(&self) -> Span {
        union_spans(
            [self.source.span()]
                .into_iter()
                .chain(self.operators.iter().map(TabularOperator::span)),
        )
    }
}

/// The data source of a [`TabularExpr`].
///
/// At the moment, this can only be a reference to a table.
#[derive(Debug, Clone, PartialEq)]
pub enum TabularDataSource {
    Table(TableRef),
}

impl TabularDataSource {
    pub fn span(&self) -> Span {
        match self {
            TabularDataSource::Table(table) => table.span(),
        }
    }
}

/// A reference to a specific table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: Ident,
}

impl TableRef {
    pub fn span(&self) -> Span {
        self.table.span
    }
}
