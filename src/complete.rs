//! Column- and keyword-aware completion for editor integration.
//!
//! The engine reuses the lexer and parser on possibly-malformed input
//! and works with whatever AST fragments are available: all parse
//! errors are silently tolerated.

use crate::ast::{
    Statement, TabularDataSource, TabularExpr, TabularOperator, Token, TokenKind,
};
use crate::lexer::scan;
use crate::parser::recover_statements;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The schema information completions are drawn from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub tables: HashMap<String, AnalysisTable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisTable {
    pub columns: Vec<AnalysisColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisColumn {
    pub name: String,
}

/// A single completion: `text` replaces the source range `span`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub label: String,
    pub text: String,
    pub span: Span,
}

const SORTED_OPERATOR_NAMES: [&str; 12] = [
    "as",
    "count",
    "extend",
    "join",
    "limit",
    "order",
    "project",
    "sort",
    "summarize",
    "take",
    "top",
    "where",
];

impl AnalysisContext {
    /// Suggests insertions for the cursor position in the given source.
    pub fn suggest_completions(&self, source: &str, cursor: Span) -> Vec<Completion> {
        let pos = (cursor.end.max(0) as usize).min(source.len());
        let tokens = scan(source);
        let statements = recover_statements(source, &tokens);

        // Find the statement the cursor sits in, collecting the names
        // bound by preceding `let` statements along the way.
        let mut lets = Vec::new();
        let mut current: Option<&Statement> = None;
        for statement in &statements {
            let span = statement.span();
            if span.is_valid() && span.start > pos as isize {
                break;
            }
            if let Statement::Let(stmt) = statement {
                lets.push(stmt.name.name.clone());
            }
            current = Some(statement);
        }

        match current {
            Some(Statement::Tabular(expr)) => {
                self.suggest_in_expr(source, &tokens, expr, pos, &lets)
            }
            Some(Statement::Let(_)) => Vec::new(),
            None => {
                let prefix = completion_prefix(source, &tokens, pos);
                self.complete_table_names(source, prefix)
            }
        }
    }

    fn suggest_in_expr(
        &self,
        source: &str,
        tokens: &[Token],
        expr: &TabularExpr,
        pos: usize,
        lets: &[String],
    ) -> Vec<Completion> {
        let pos_span = Span::at(pos);
        let source_span = expr.source.span();
        if pos_span.overlaps(source_span)
            || (source_span.is_valid() && (pos as isize) < source_span.start)
        {
            // The cursor names the data source.
            let prefix = completion_prefix(source, tokens, pos);
            return self.complete_table_names(source, prefix);
        }

        // The last operator whose span starts before the cursor. An
        // operator starting exactly at the cursor belongs to whatever
        // precedes it.
        let i = expr.operators.partition_point(|op| {
            let span = op.span();
            span.is_valid() && span.start < pos as isize
        });
        if i == 0 {
            return complete_operators("| ", Span::at(pos), "");
        }
        let op = &expr.operators[i - 1];
        let columns = self.columns_in_scope(source, &expr.source, &expr.operators[..i - 1]);

        if let TabularOperator::Unknown(unknown) = op {
            if pos as isize == unknown.pipe.end {
                return complete_operators(" ", Span::at(pos), "");
            }
            if let Some(name) = unknown.name() {
                if name.span.overlaps(pos_span) {
                    let prefix = completion_prefix(source, tokens, pos);
                    return complete_operators("", prefix, prefix.slice(source));
                }
            }
            if unknown.tokens.is_empty() || (pos as isize) < unknown.tokens[0].span.start {
                return complete_operators("", Span::at(pos), "");
            }
            return Vec::new();
        }

        let (pipe, keyword) = operator_spans(op);
        if pos as isize <= keyword.start {
            // Between the pipe and the operator keyword.
            if pos as isize == pipe.end {
                return complete_operators(" ", Span::at(pos), "");
            }
            return complete_operators("", Span::at(pos), "");
        }
        if pos as isize <= keyword.end {
            return Vec::new();
        }

        let prefix = completion_prefix(source, tokens, pos);
        match op {
            TabularOperator::Count(_) | TabularOperator::As(_) => Vec::new(),
            TabularOperator::Where(_)
            | TabularOperator::Sort(_)
            | TabularOperator::Project(_)
            | TabularOperator::Extend(_)
            | TabularOperator::Summarize(_) => complete_names(source, prefix, columns),
            TabularOperator::Take(_) => complete_names(source, prefix, lets.to_vec()),
            TabularOperator::Top(top) => {
                if top.by.is_valid() && pos as isize > top.by.end {
                    complete_names(source, prefix, columns)
                } else {
                    complete_names(source, prefix, lets.to_vec())
                }
            }
            TabularOperator::Join(join) => {
                if join.lparen.is_valid()
                    && (pos as isize) > join.lparen.start
                    && (!join.rparen.is_valid() || pos as isize <= join.rparen.start)
                {
                    // Inside the right-hand parenthesized expression.
                    if let Some(right) = &join.right {
                        return self.suggest_in_expr(source, tokens, right, pos, lets);
                    }
                    return self.complete_table_names(source, prefix);
                }
                if join.on.is_valid() && (pos as isize) > join.on.end {
                    let mut all = columns;
                    if let Some(right) = &join.right {
                        all.extend(self.columns_in_scope(
                            source,
                            &right.source,
                            &right.operators,
                        ));
                    }
                    return complete_names(source, prefix, all);
                }
                Vec::new()
            }
            TabularOperator::Unknown(_) => Vec::new(),
        }
    }

    /// Walks the operators preceding the cursor to determine the column
    /// names in scope.
    fn columns_in_scope(
        &self,
        source: &str,
        data_source: &TabularDataSource,
        ops: &[TabularOperator],
    ) -> Vec<String> {
        let TabularDataSource::Table(table) = data_source;
        let mut columns: Vec<String> = self
            .tables
            .get(&table.table.name)
            .map(|table| table.columns.iter().map(|col| col.name.clone()).collect())
            .unwrap_or_default();

        for op in ops {
            match op {
                TabularOperator::Count(_) => {
                    columns = vec!["count()".to_string()];
                }
                TabularOperator::Project(project) => {
                    columns = project
                        .cols
                        .iter()
                        .map(|col| col.name.name.clone())
                        .collect();
                }
                TabularOperator::Extend(extend) => {
                    columns.extend(extend.cols.iter().map(|col| col.name.name.clone()));
                }
                TabularOperator::Summarize(summarize) => {
                    let mut next = Vec::new();
                    next.extend(
                        summarize
                            .cols
                            .iter()
                            .filter_map(|col| summarize_column_name(source, col)),
                    );
                    next.extend(
                        summarize
                            .group_by
                            .iter()
                            .filter_map(|col| summarize_column_name(source, col)),
                    );
                    columns = next;
                }
                TabularOperator::Join(join) => {
                    if let Some(right) = &join.right {
                        columns.extend(self.columns_in_scope(
                            source,
                            &right.source,
                            &right.operators,
                        ));
                    }
                }
                _ => {}
            }
        }
        columns
    }

    fn complete_table_names(&self, source: &str, prefix: Span) -> Vec<Completion> {
        let prefix_text = prefix.slice(source);
        let mut result: Vec<Completion> = self
            .tables
            .keys()
            .filter(|name| has_prefix_fold(name, prefix_text))
            .map(|name| Completion {
                label: name.clone(),
                text: name.clone(),
                span: prefix,
            })
            .collect();
        result.sort_by(|a, b| a.label.cmp(&b.label));
        result
    }
}

fn summarize_column_name(source: &str, col: &crate::ast::SummarizeColumn) -> Option<String> {
    if let Some(name) = &col.name {
        return Some(name.name.clone());
    }
    let x = col.x.as_ref()?;
    Some(x.span().slice(source).to_string())
}

fn operator_spans(op: &TabularOperator) -> (Span, Span) {
    match op {
        TabularOperator::Count(op) => (op.pipe, op.keyword),
        TabularOperator::Where(op) => (op.pipe, op.keyword),
        TabularOperator::Sort(op) => (op.pipe, op.keyword),
        TabularOperator::Take(op) => (op.pipe, op.keyword),
        TabularOperator::Top(op) => (op.pipe, op.keyword),
        TabularOperator::Project(op) => (op.pipe, op.keyword),
        TabularOperator::Extend(op) => (op.pipe, op.keyword),
        TabularOperator::Summarize(op) => (op.pipe, op.keyword),
        TabularOperator::Join(op) => (op.pipe, op.keyword),
        TabularOperator::As(op) => (op.pipe, op.keyword),
        TabularOperator::Unknown(op) => (op.pipe, Span::null()),
    }
}

fn complete_operators(lead: &str, span: Span, prefix_text: &str) -> Vec<Completion> {
    let mut result = Vec::new();
    for name in SORTED_OPERATOR_NAMES {
        if !has_prefix_fold(name, prefix_text) {
            continue;
        }
        let mut text = format!("{}{}", lead, name);
        if name == "order" || name == "sort" {
            text.push_str(" by");
        }
        result.push(Completion {
            label: name.to_string(),
            text,
            span,
        });
    }
    result
}

fn complete_names(source: &str, prefix: Span, names: Vec<String>) -> Vec<Completion> {
    let prefix_text = prefix.slice(source);
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| has_prefix_fold(name, prefix_text))
        .filter(|name| seen.insert(name.clone()))
        .map(|name| Completion {
            label: name.clone(),
            text: name,
            span: prefix,
        })
        .collect()
}

/// Computes the source range the completion text replaces: the token
/// immediately to the left of the cursor when it touches the cursor and
/// is a completable kind, or the zero-length range at the cursor.
fn completion_prefix(source: &str, tokens: &[Token], pos: usize) -> Span {
    let i = tokens.partition_point(|tok| tok.span.is_valid() && (tok.span.start as usize) < pos);
    if i == 0 {
        return Span::at(pos);
    }
    let tok = &tokens[i - 1];
    if !tok.span.overlaps(Span::at(pos)) || !is_completable(tok.kind) {
        // The cursor is not adjacent to a token; assume whitespace.
        return Span::at(pos);
    }
    let mut start = tok.span.start;
    if tok.kind == TokenKind::QuotedIdentifier {
        // Skip past the opening backtick.
        start += 1;
    }
    Span::new(start, pos as isize)
}

fn is_completable(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::QuotedIdentifier
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::In
            | TokenKind::By
    )
}

fn has_prefix_fold(name: &str, prefix: &str) -> bool {
    let mut name_chars = name.chars();
    prefix.chars().all(|p| {
        name_chars
            .next()
            .is_some_and(|c| c.eq_ignore_ascii_case(&p))
    })
}
