//! Recursive-descent parser with error recovery.
//!
//! The parser walks a token slice with a cursor and builds the AST
//! bottom-up. Three mechanisms keep a malformed operator from cascading
//! into later ones:
//!
//! - *Splitting*: before parsing a bounded region (an operator body, a
//!   parenthesized group), the parser forks a sub-parser over the tokens
//!   up to the matching delimiter. Whatever the sub-parser leaves behind
//!   is reported as a single trailing-content error and the outer parser
//!   resumes after the delimiter.
//! - *Not-found probing*: a production that consumed nothing reports a
//!   distinguished not-found error so callers may try alternatives;
//!   once a construct has committed, the marker is stripped.
//! - *Joined errors*: diagnostics accumulate into a flat list and the
//!   best-effort AST is produced alongside them.

use crate::ast::{
    AsOperator, BasicLit, BinaryExpr, CallExpr, CountOperator, Expr, ExtendColumn, ExtendOperator,
    Ident, InExpr, IndexExpr, JoinOperator, LetStatement, ParenExpr, ProjectColumn,
    ProjectOperator, QualifiedIdent, SortOperator, SortTerm, Statement, SummarizeColumn,
    SummarizeOperator, TableRef, TabularDataSource, TabularExpr, TabularOperator, TakeOperator,
    Token, TokenKind, TopOperator, UnaryExpr, UnknownOperator, WhereOperator,
};
use crate::lexer::scan;
use crate::span::{line_col, Span};
use std::fmt;

/// A single located parse diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    /// 1-based line of the diagnostic's start offset.
    pub line: usize,
    /// 1-based column, with tabs advancing to the next 8-aligned stop.
    pub column: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// The joined diagnostics of a failed parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse pipeline query language: ")?;
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Converts a Pipeline Query Language tabular expression into an AST.
pub fn parse(source: &str) -> Result<TabularExpr, ParseError> {
    let tokens = scan(source);
    let (expr, err) = parse_tokens(source, &tokens);
    match (expr, err) {
        (Some(expr), None) => Ok(expr),
        (_, Some(err)) => Err(err.into_parse_error(source)),
        (None, None) => Err(SyntaxError::new(Span::at(source.len()), "empty query")
            .into_parse_error(source)),
    }
}

/// Parses a semicolon-separated sequence of `let` bindings and tabular
/// expressions.
pub fn parse_statements(source: &str) -> Result<Vec<Statement>, ParseError> {
    let tokens = scan(source);
    let (statements, err) = parse_statement_tokens(source, &tokens);
    match err {
        None => Ok(statements),
        Some(err) => Err(err.into_parse_error(source)),
    }
}

/// Best-effort parse for tools that tolerate errors (the completion
/// engine): returns whatever statements could be recovered.
pub(crate) fn recover_statements(source: &str, tokens: &[Token]) -> Vec<Statement> {
    parse_statement_tokens(source, tokens).0
}

fn parse_tokens(source: &str, tokens: &[Token]) -> (Option<TabularExpr>, Option<SyntaxError>) {
    let mut p = Parser::new(source, tokens);
    let (expr, mut err) = p.tabular_expr();
    if p.pos < p.tokens.len() {
        err = join(err, Some(trailing_token_error(&p.tokens[p.pos])));
    } else if is_not_found(&err) {
        err = Some(SyntaxError::new(Span::at(source.len()), "empty query"));
    }
    (expr, err)
}

fn parse_statement_tokens(source: &str, tokens: &[Token]) -> (Vec<Statement>, Option<SyntaxError>) {
    let mut p = Parser::new(source, tokens);
    let mut statements = Vec::new();
    let mut final_err = None;
    loop {
        let (_, ok) = p.next();
        if !ok {
            break;
        }
        p.prev();

        let mut sp = p.split(TokenKind::Semi);
        if !sp.tokens.is_empty() {
            if sp.tokens[0].kind == TokenKind::Identifier && sp.tokens[0].value == "let" {
                let (stmt, err) = sp.let_statement();
                final_err = join(final_err, opaque(err));
                final_err = join(final_err, sp.end_split_error());
                if let Some(stmt) = stmt {
                    statements.push(Statement::Let(stmt));
                }
            } else {
                let (expr, mut err) = sp.tabular_expr();
                if sp.pos < sp.tokens.len() {
                    err = join(err, Some(trailing_token_error(&sp.tokens[sp.pos])));
                }
                final_err = join(final_err, opaque(err));
                if let Some(expr) = expr {
                    statements.push(Statement::Tabular(expr));
                }
            }
        }

        // Consume the separating semicolon, if any.
        let (_, ok) = p.next();
        if !ok {
            break;
        }
    }
    (statements, final_err)
}

fn trailing_token_error(tok: &Token) -> SyntaxError {
    if tok.kind == TokenKind::Error {
        SyntaxError::new(tok.span, tok.value.clone())
    } else {
        SyntaxError::new(tok.span, "unrecognized token")
    }
}

const JOIN_TYPES: [&str; 3] = ["inner", "innerunique", "leftouter"];

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    split_kind: Option<TokenKind>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, tokens: &'a [Token]) -> Parser<'a> {
        Parser {
            source,
            tokens,
            pos: 0,
            split_kind: None,
        }
    }

    fn next(&mut self) -> (Token, bool) {
        if self.pos >= self.tokens.len() {
            // Once EOF is produced, don't permit rewinding.
            self.pos = self.tokens.len() + 1;
            return (
                Token::error(Span::at(self.source.len()), "EOF"),
                false,
            );
        }
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        (tok, true)
    }

    fn prev(&mut self) {
        if self.pos > 0 && self.pos <= self.tokens.len() {
            self.pos -= 1;
        }
    }

    /// Advances the parser to right before the next token of the given
    /// kind and returns a new parser over the tokens that were skipped.
    /// Tokens inside parenthetical groups opened after the initial
    /// position are ignored. If no such token is found, the parser
    /// advances to EOF.
    fn split(&mut self, search: TokenKind) -> Parser<'a> {
        // The expected closing parentheses/brackets. A closing token pops
        // the stack down to its first matching opener.
        let mut stack: Vec<TokenKind> = Vec::new();

        let start = self.pos.min(self.tokens.len());
        loop {
            let (tok, ok) = self.next();
            if !ok {
                return Parser {
                    source: self.source,
                    tokens: &self.tokens[start..],
                    pos: 0,
                    split_kind: Some(search),
                };
            }
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket => {
                    if search == tok.kind {
                        self.prev();
                        break;
                    }
                    stack.push(if tok.kind == TokenKind::LParen {
                        TokenKind::RParen
                    } else {
                        TokenKind::RBracket
                    });
                }
                TokenKind::RParen | TokenKind::RBracket => {
                    if !stack.is_empty() {
                        while let Some(k) = stack.pop() {
                            if k == tok.kind {
                                break;
                            }
                        }
                    } else if search == tok.kind {
                        self.prev();
                        break;
                    }
                }
                kind if kind == search => {
                    if stack.is_empty() {
                        self.prev();
                        break;
                    }
                }
                _ => {}
            }
        }

        Parser {
            source: self.source,
            tokens: &self.tokens[start..self.pos],
            pos: 0,
            split_kind: Some(search),
        }
    }

    /// Reports any content a split-off sub-parser left unconsumed.
    fn end_split_error(&self) -> Option<SyntaxError> {
        let Some(split_kind) = self.split_kind else {
            return Some(SyntaxError::new(
                Span::null(),
                "internal error: end of split checked on a non-split parser",
            ));
        };
        if self.pos < self.tokens.len() {
            let delim = match split_kind {
                TokenKind::Pipe => "'|'",
                TokenKind::RParen => "')'",
                TokenKind::RBracket => "']'",
                TokenKind::Semi => "';'",
                _ => "delimiter",
            };
            let tok = &self.tokens[self.pos];
            return Some(SyntaxError::new(
                tok.span,
                format!("expected {}, got {}", delim, format_token(self.source, tok)),
            ));
        }
        None
    }

    fn tabular_expr(&mut self) -> (Option<TabularExpr>, Option<SyntaxError>) {
        let (table_name, err) = self.ident();
        let Some(table_name) = table_name else {
            return (None, err);
        };
        let mut expr = TabularExpr {
            source: TabularDataSource::Table(TableRef { table: table_name }),
            operators: Vec::new(),
        };

        let mut final_err = None;
        loop {
            let (pipe_token, _) = self.next();
            if pipe_token.kind != TokenKind::Pipe {
                self.prev();
                return (Some(expr), final_err);
            }

            let mut op_parser = self.split(TokenKind::Pipe);

            let (operator_name, ok) = op_parser.next();
            if !ok {
                expr.operators.push(TabularOperator::Unknown(UnknownOperator {
                    pipe: pipe_token.span,
                    tokens: Vec::new(),
                }));
                final_err = join(
                    final_err,
                    Some(SyntaxError::new(
                        pipe_token.span,
                        "missing operator name after pipe",
                    )),
                );
                continue;
            }
            if operator_name.kind != TokenKind::Identifier {
                expr.operators.push(TabularOperator::Unknown(UnknownOperator {
                    pipe: pipe_token.span,
                    tokens: op_parser.tokens.to_vec(),
                }));
                final_err = join(
                    final_err,
                    Some(SyntaxError::new(
                        operator_name.span,
                        format!(
                            "expected operator name, got {}",
                            format_token(op_parser.source, &operator_name)
                        ),
                    )),
                );
                continue;
            }
            let (op, err) = match operator_name.value.as_str() {
                "count" => op_parser.count_operator(&pipe_token, &operator_name),
                "where" | "filter" => op_parser.where_operator(&pipe_token, &operator_name),
                "sort" | "order" => op_parser.sort_operator(&pipe_token, &operator_name),
                "take" | "limit" => op_parser.take_operator(&pipe_token, &operator_name),
                "top" => op_parser.top_operator(&pipe_token, &operator_name),
                "project" => op_parser.project_operator(&pipe_token, &operator_name),
                "extend" => op_parser.extend_operator(&pipe_token, &operator_name),
                "summarize" => op_parser.summarize_operator(&pipe_token, &operator_name),
                "join" => op_parser.join_operator(&pipe_token, &operator_name),
                "as" => op_parser.as_operator(&pipe_token, &operator_name),
                _ => {
                    expr.operators.push(TabularOperator::Unknown(UnknownOperator {
                        pipe: pipe_token.span,
                        tokens: op_parser.tokens.to_vec(),
                    }));
                    final_err = join(
                        final_err,
                        Some(SyntaxError::new(
                            operator_name.span,
                            format!("unknown operator name {:?}", operator_name.value),
                        )),
                    );
                    continue;
                }
            };
            expr.operators.push(op);
            final_err = join(final_err, err);
            final_err = join(final_err, op_parser.end_split_error());
        }
    }

    fn let_statement(&mut self) -> (Option<LetStatement>, Option<SyntaxError>) {
        let (keyword, _) = self.next();
        let (name, err) = self.ident();
        let Some(name) = name else {
            return (None, opaque(err));
        };
        let (tok, _) = self.next();
        if tok.kind != TokenKind::Assign {
            let stmt = LetStatement {
                keyword: keyword.span,
                name,
                assign: Span::null(),
                x: None,
            };
            return (
                Some(stmt),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected '=', got {}", format_token(self.source, &tok)),
                )),
            );
        }
        let (x, err) = self.expr();
        let stmt = LetStatement {
            keyword: keyword.span,
            name,
            assign: tok.span,
            x,
        };
        (Some(stmt), opaque(err))
    }

    fn count_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        (
            TabularOperator::Count(CountOperator {
                pipe: pipe.span,
                keyword: keyword.span,
            }),
            None,
        )
    }

    fn where_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let (x, err) = self.expr();
        (
            TabularOperator::Where(WhereOperator {
                pipe: pipe.span,
                keyword: keyword.span,
                predicate: x,
            }),
            opaque(err),
        )
    }

    fn sort_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let (by, _) = self.next();
        if by.kind != TokenKind::By {
            let op = SortOperator {
                pipe: pipe.span,
                keyword: keyword.span,
                terms: Vec::new(),
            };
            return (
                TabularOperator::Sort(op),
                Some(SyntaxError::new(
                    by.span,
                    format!("expected 'by', got {}", format_token(self.source, &by)),
                )),
            );
        }

        let mut op = SortOperator {
            pipe: pipe.span,
            keyword: Span::new(keyword.span.start, by.span.end),
            terms: Vec::new(),
        };
        loop {
            let (term, err) = self.sort_term();
            if let Some(term) = term {
                op.terms.push(term);
            }
            if err.is_some() {
                return (TabularOperator::Sort(op), opaque(err));
            }

            // A comma means another term follows.
            let (tok, _) = self.next();
            if tok.kind != TokenKind::Comma {
                self.prev();
                return (TabularOperator::Sort(op), None);
            }
        }
    }

    fn sort_term(&mut self) -> (Option<SortTerm>, Option<SyntaxError>) {
        let (x, err) = self.expr();
        if err.is_some() {
            return (None, err);
        }
        let Some(x) = x else {
            return (None, None);
        };
        let mut term = SortTerm {
            x,
            asc: false,
            asc_desc_span: Span::null(),
            nulls_first: false,
            nulls_span: Span::null(),
        };

        // asc/desc
        let (tok, ok) = self.next();
        if !ok {
            return (Some(term), None);
        }
        if tok.kind != TokenKind::Identifier {
            self.prev();
            return (Some(term), None);
        }
        match tok.value.as_str() {
            "asc" => {
                term.asc = true;
                term.asc_desc_span = tok.span;
                term.nulls_first = true;
            }
            "desc" => {
                term.asc = false;
                term.asc_desc_span = tok.span;
                term.nulls_first = false;
            }
            "nulls" => {
                // Good, handled below.
                self.prev();
            }
            _ => {
                self.prev();
                return (Some(term), None);
            }
        }

        // nulls first/last
        let (tok, ok) = self.next();
        if !ok {
            return (Some(term), None);
        }
        if tok.kind != TokenKind::Identifier || tok.value != "nulls" {
            self.prev();
            return (Some(term), None);
        }
        let (tok2, _) = self.next();
        match (tok2.kind, tok2.value.as_str()) {
            (TokenKind::Identifier, "first") => {
                term.nulls_first = true;
                term.nulls_span = Span::new(tok.span.start, tok2.span.end);
            }
            (TokenKind::Identifier, "last") => {
                term.nulls_first = false;
                term.nulls_span = Span::new(tok.span.start, tok2.span.end);
            }
            _ => {
                self.prev();
                return (
                    Some(term),
                    Some(SyntaxError::new(
                        tok2.span,
                        format!(
                            "expected 'first' or 'last', got {}",
                            format_token(self.source, &tok2)
                        ),
                    )),
                );
            }
        }

        (Some(term), None)
    }

    fn take_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let mut op = TakeOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            row_count: None,
        };

        let (tok, _) = self.next();
        if tok.kind != TokenKind::Number {
            return (
                TabularOperator::Take(op),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected integer, got {}", format_token(self.source, &tok)),
                )),
            );
        }
        let row_count = BasicLit {
            kind: tok.kind,
            value: tok.value.clone(),
            span: tok.span,
        };
        let is_integer = row_count.is_integer();
        op.row_count = Some(row_count);
        if !is_integer {
            return (
                TabularOperator::Take(op),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected integer, got {}", format_token(self.source, &tok)),
                )),
            );
        }
        (TabularOperator::Take(op), None)
    }

    fn top_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let mut op = TopOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            row_count: None,
            by: Span::null(),
            col: None,
        };

        let (tok, _) = self.next();
        if tok.kind != TokenKind::Number {
            self.prev();
            return (
                TabularOperator::Top(op),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected integer, got {}", format_token(self.source, &tok)),
                )),
            );
        }
        let row_count = BasicLit {
            kind: tok.kind,
            value: tok.value.clone(),
            span: tok.span,
        };
        let is_integer = row_count.is_integer();
        op.row_count = Some(row_count);
        if !is_integer {
            return (
                TabularOperator::Top(op),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected integer, got {}", format_token(self.source, &tok)),
                )),
            );
        }

        let (tok, _) = self.next();
        if tok.kind != TokenKind::By {
            self.prev();
            return (
                TabularOperator::Top(op),
                Some(SyntaxError::new(
                    tok.span,
                    format!("expected 'by', got {}", format_token(self.source, &tok)),
                )),
            );
        }
        op.by = tok.span;

        let (col, err) = self.sort_term();
        op.col = col;
        (TabularOperator::Top(op), opaque(err))
    }

    fn project_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let mut op = ProjectOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            cols: Vec::new(),
        };

        loop {
            let (col_name, err) = self.ident();
            let Some(col_name) = col_name else {
                return (TabularOperator::Project(op), opaque(err));
            };
            op.cols.push(ProjectColumn {
                name: col_name,
                assign: Span::null(),
                x: None,
            });

            let (sep, ok) = self.next();
            if !ok {
                return (TabularOperator::Project(op), None);
            }
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::Assign => {
                    let (x, err) = self.expr();
                    if let Some(col) = op.cols.last_mut() {
                        col.assign = sep.span;
                        col.x = x;
                    }
                    if err.is_some() {
                        return (TabularOperator::Project(op), opaque(err));
                    }
                    let (sep, ok) = self.next();
                    if !ok {
                        return (TabularOperator::Project(op), None);
                    }
                    if sep.kind != TokenKind::Comma {
                        return (
                            TabularOperator::Project(op),
                            Some(SyntaxError::new(
                                sep.span,
                                format!(
                                    "expected ',' or EOF, got {}",
                                    format_token(self.source, &sep)
                                ),
                            )),
                        );
                    }
                }
                _ => {
                    self.prev();
                    return (TabularOperator::Project(op), None);
                }
            }
        }
    }

    fn extend_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        const ASSIGN_MESSAGE: &str = "expected '=' followed by expression for assignment, got EOF";

        let mut op = ExtendOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            cols: Vec::new(),
        };

        loop {
            let (col_name, err) = self.ident();
            let Some(col_name) = col_name else {
                return (TabularOperator::Extend(op), opaque(err));
            };
            op.cols.push(ExtendColumn {
                name: col_name,
                assign: Span::null(),
                x: None,
            });

            let (sep, ok) = self.next();
            if !ok {
                return (
                    TabularOperator::Extend(op),
                    Some(SyntaxError::new(
                        Span::at(self.source.len()),
                        ASSIGN_MESSAGE,
                    )),
                );
            }
            // Unlike in project, the column name must be followed by an
            // assignment, and terms must be separated by commas.
            if sep.kind != TokenKind::Assign {
                return (
                    TabularOperator::Extend(op),
                    Some(SyntaxError::new(sep.span, ASSIGN_MESSAGE)),
                );
            }

            let (x, err) = self.expr();
            if let Some(col) = op.cols.last_mut() {
                col.assign = sep.span;
                col.x = x;
            }
            if err.is_some() {
                return (TabularOperator::Extend(op), opaque(err));
            }
            let (sep, ok) = self.next();
            if !ok {
                return (TabularOperator::Extend(op), None);
            }
            if sep.kind != TokenKind::Comma {
                return (
                    TabularOperator::Extend(op),
                    Some(SyntaxError::new(sep.span, ASSIGN_MESSAGE)),
                );
            }
        }
    }

    fn summarize_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let mut op = SummarizeOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            cols: Vec::new(),
            by: Span::null(),
            group_by: Vec::new(),
        };

        loop {
            let (col, err) = self.summarize_column();
            if is_not_found(&err) {
                break;
            }
            op.cols.push(col);
            if err.is_some() {
                return (TabularOperator::Summarize(op), opaque(err));
            }

            let (sep, ok) = self.next();
            if !ok {
                return (TabularOperator::Summarize(op), None);
            }
            if sep.kind != TokenKind::Comma {
                self.prev();
                break;
            }
        }

        let (sep, ok) = self.next();
        if !ok {
            if op.cols.is_empty() {
                return (
                    TabularOperator::Summarize(op),
                    Some(SyntaxError::new(
                        sep.span,
                        "expected expression or 'by', got EOF",
                    )),
                );
            }
            return (TabularOperator::Summarize(op), None);
        }
        if sep.kind != TokenKind::By {
            self.prev();
            if op.cols.is_empty() {
                return (
                    TabularOperator::Summarize(op),
                    Some(SyntaxError::new(
                        sep.span,
                        format!(
                            "expected expression or 'by', got {}",
                            format_token(self.source, &sep)
                        ),
                    )),
                );
            }
            return (TabularOperator::Summarize(op), None);
        }
        op.by = sep.span;

        loop {
            let (col, err) = self.summarize_column();
            if is_not_found(&err) {
                return (TabularOperator::Summarize(op), opaque(err));
            }
            op.group_by.push(col);
            if err.is_some() {
                return (TabularOperator::Summarize(op), opaque(err));
            }

            let (sep, ok) = self.next();
            if !ok {
                return (TabularOperator::Summarize(op), None);
            }
            if sep.kind != TokenKind::Comma {
                self.prev();
                return (TabularOperator::Summarize(op), None);
            }
        }
    }

    fn summarize_column(&mut self) -> (SummarizeColumn, Option<SyntaxError>) {
        let restore_pos = self.pos;

        let mut col = SummarizeColumn {
            name: None,
            assign: Span::null(),
            x: None,
        };

        let (name, _) = self.ident();
        if let Some(name) = name {
            let (assign, _) = self.next();
            if assign.kind == TokenKind::Assign {
                col.name = Some(name);
                col.assign = assign.span;
            } else {
                self.pos = restore_pos;
            }
        }

        let (x, err) = self.expr();
        col.x = x;
        let err = if col.name.is_some() { opaque(err) } else { err };
        (col, err)
    }

    fn join_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let mut op = JoinOperator {
            pipe: pipe.span,
            keyword: keyword.span,
            kind: Span::null(),
            kind_assign: Span::null(),
            flavor: None,
            lparen: Span::null(),
            right: None,
            rparen: Span::null(),
            on: Span::null(),
            conditions: Vec::new(),
        };

        let (tok, ok) = self.next();
        if !ok {
            return (
                TabularOperator::Join(op),
                Some(SyntaxError::new(
                    Span::at(self.source.len()),
                    "expected 'kind' or '(', got EOF",
                )),
            );
        }

        // Optional "kind = FLAVOR" clause.
        let mut final_err = None;
        if tok.kind == TokenKind::Identifier && tok.value == "kind" {
            op.kind = tok.span;
            let (tok, _) = self.next();
            if tok.kind != TokenKind::Assign {
                return (
                    TabularOperator::Join(op),
                    join(
                        final_err,
                        Some(SyntaxError::new(
                            tok.span,
                            format!("expected '=', got {}", format_token(self.source, &tok)),
                        )),
                    ),
                );
            }
            op.kind_assign = tok.span;
            let (tok, _) = self.next();
            if tok.kind != TokenKind::Identifier {
                return (
                    TabularOperator::Join(op),
                    join(
                        final_err,
                        Some(SyntaxError::new(
                            tok.span,
                            format!(
                                "expected join flavor, got {}",
                                format_token(self.source, &tok)
                            ),
                        )),
                    ),
                );
            }
            op.flavor = Some(Ident {
                name: tok.value.clone(),
                span: tok.span,
                quoted: false,
            });
            if !JOIN_TYPES.contains(&tok.value.as_str()) {
                final_err = join(
                    final_err,
                    Some(SyntaxError::new(
                        tok.span,
                        format!(
                            "expected join flavor (one of {}), got {}",
                            JOIN_TYPES.join(", "),
                            tok.value
                        ),
                    )),
                );
            }
        } else {
            self.prev();
        }

        // Right-hand table.
        let (tok, _) = self.next();
        if tok.kind != TokenKind::LParen {
            return (
                TabularOperator::Join(op),
                join(
                    final_err,
                    Some(SyntaxError::new(
                        tok.span,
                        format!("expected '(', got {}", format_token(self.source, &tok)),
                    )),
                ),
            );
        }
        op.lparen = tok.span;
        let mut right_parser = self.split(TokenKind::RParen);
        let (right, err) = right_parser.tabular_expr();
        op.right = right.map(Box::new);
        final_err = join(final_err, opaque(err));
        final_err = join(final_err, right_parser.end_split_error());
        let (tok, _) = self.next();
        if tok.kind != TokenKind::RParen {
            return (
                TabularOperator::Join(op),
                join(
                    final_err,
                    Some(SyntaxError::new(
                        tok.span,
                        format!("expected ')', got {}", format_token(self.source, &tok)),
                    )),
                ),
            );
        }
        op.rparen = tok.span;

        // Conditions.
        let (tok, _) = self.next();
        if tok.kind != TokenKind::Identifier || tok.value != "on" {
            return (
                TabularOperator::Join(op),
                join(
                    final_err,
                    Some(SyntaxError::new(
                        tok.span,
                        format!("expected 'on', got {}", format_token(self.source, &tok)),
                    )),
                ),
            );
        }
        op.on = tok.span;
        let (conditions, err) = self.expr_list();
        op.conditions = conditions;
        final_err = join(final_err, opaque(err));

        (TabularOperator::Join(op), final_err)
    }

    fn as_operator(
        &mut self,
        pipe: &Token,
        keyword: &Token,
    ) -> (TabularOperator, Option<SyntaxError>) {
        let (name, err) = self.ident();
        (
            TabularOperator::As(AsOperator {
                pipe: pipe.span,
                keyword: keyword.span,
                name,
            }),
            opaque(err),
        )
    }

    /// Parses one or more comma-separated expressions.
    fn expr_list(&mut self) -> (Vec<Expr>, Option<SyntaxError>) {
        let (first, err) = self.expr();
        if err.is_some() {
            return (Vec::new(), err);
        }
        let mut result = Vec::new();
        if let Some(first) = first {
            result.push(first);
        }
        loop {
            let restore_pos = self.pos;
            let (tok, ok) = self.next();
            if !ok {
                return (result, None);
            }
            if tok.kind != TokenKind::Comma {
                self.prev();
                return (result, None);
            }
            let (x, err) = self.expr();
            if is_not_found(&err) {
                self.pos = restore_pos;
                return (result, None);
            }
            if let Some(x) = x {
                result.push(x);
            }
            if err.is_some() {
                // Mask any not-found marker from the caller.
                return (result, opaque(err));
            }
        }
    }

    fn expr(&mut self) -> (Option<Expr>, Option<SyntaxError>) {
        let (x, err1) = self.unary_expr();
        if is_not_found(&err1) {
            return (x, err1);
        }
        let (x, err2) = self.expr_binary_trail(x, 0);
        (x, join(err1, err2))
    }

    /// Parses zero or more (binary operator, unary expression) sequences
    /// by precedence climbing.
    fn expr_binary_trail(
        &mut self,
        mut x: Option<Expr>,
        min_precedence: i8,
    ) -> (Option<Expr>, Option<SyntaxError>) {
        let mut final_err = None;
        loop {
            let (op1, ok) = self.next();
            if !ok {
                return (x, final_err);
            }
            let precedence1 = operator_precedence(op1.kind);
            if precedence1 < 0 || precedence1 < min_precedence {
                // Not a binary operator or below the precedence threshold.
                self.prev();
                return (x, final_err);
            }

            if op1.kind == TokenKind::In {
                let (lparen, _) = self.next();
                if lparen.kind != TokenKind::LParen {
                    x = Some(Expr::In(InExpr {
                        x: x.map(Box::new),
                        in_span: op1.span,
                        lparen: Span::null(),
                        vals: Vec::new(),
                        rparen: Span::null(),
                    }));
                    final_err = join(
                        final_err,
                        Some(SyntaxError::new(
                            lparen.span,
                            format!("expected '(', got {}", format_token(self.source, &lparen)),
                        )),
                    );
                    return (x, final_err);
                }
                let mut val_parser = self.split(TokenKind::RParen);
                let (vals, err) = val_parser.expr_list();
                final_err = join(final_err, opaque(err));
                final_err = join(final_err, val_parser.end_split_error());
                let (rparen, _) = self.next();
                if rparen.kind != TokenKind::RParen {
                    x = Some(Expr::In(InExpr {
                        x: x.map(Box::new),
                        in_span: op1.span,
                        lparen: lparen.span,
                        vals,
                        rparen: Span::null(),
                    }));
                    final_err = join(
                        final_err,
                        Some(SyntaxError::new(
                            lparen.span,
                            format!("expected ')', got {}", format_token(self.source, &rparen)),
                        )),
                    );
                    return (x, final_err);
                }
                x = Some(Expr::In(InExpr {
                    x: x.map(Box::new),
                    in_span: op1.span,
                    lparen: lparen.span,
                    vals,
                    rparen: rparen.span,
                }));
                continue;
            }

            let (mut y, err) = self.unary_expr();
            if err.is_some() {
                final_err = join(final_err, opaque(err));
            }

            // Resolve any higher precedence operators first.
            loop {
                let (op2, ok) = self.next();
                if !ok {
                    break;
                }
                self.prev();

                let precedence2 = operator_precedence(op2.kind);
                if precedence2 < 0 || precedence2 <= precedence1 {
                    break;
                }
                let (y2, err) = self.expr_binary_trail(y, precedence1 + 1);
                y = y2;
                if err.is_some() {
                    final_err = join(final_err, opaque(err));
                }
            }

            x = Some(Expr::Binary(BinaryExpr {
                x: x.map(Box::new),
                op: op1.kind,
                op_span: op1.span,
                y: y.map(Box::new),
            }));
        }
    }

    fn unary_expr(&mut self) -> (Option<Expr>, Option<SyntaxError>) {
        let (tok, ok) = self.next();
        if !ok {
            return (
                None,
                Some(SyntaxError::not_found(
                    Span::at(self.source.len()),
                    "expected expression, got EOF",
                )),
            );
        }
        match tok.kind {
            TokenKind::Plus | TokenKind::Minus => {
                let (x, err) = self.primary_expr();
                // A symbol was already consumed, so the production found
                // something.
                let err = opaque(err);
                (
                    Some(Expr::Unary(UnaryExpr {
                        op: tok.kind,
                        op_span: tok.span,
                        x: x.map(Box::new),
                    })),
                    err,
                )
            }
            _ => {
                self.prev();
                self.primary_expr()
            }
        }
    }

    /// Parses a primary expression along with any trailing index
    /// expressions.
    fn primary_expr(&mut self) -> (Option<Expr>, Option<SyntaxError>) {
        let (x, err) = self.inner_primary_expr();
        if err.is_some() {
            return (x, err);
        }
        let mut x = x;

        loop {
            let (tok, ok) = self.next();
            if !ok {
                return (x, None);
            }
            if tok.kind != TokenKind::LBracket {
                self.prev();
                return (x, None);
            }
            let Some(inner) = x else {
                self.prev();
                return (x, None);
            };

            let mut index_parser = self.split(TokenKind::RBracket);
            let (index, err) = index_parser.expr();
            let mut err = join(err, index_parser.end_split_error());
            let (end_tok, _) = self.next();
            let rbracket = if end_tok.kind == TokenKind::RBracket {
                end_tok.span
            } else {
                err = join(
                    err,
                    Some(SyntaxError::new(
                        end_tok.span,
                        format!("expected ']', got {}", format_token(self.source, &end_tok)),
                    )),
                );
                Span::null()
            };
            x = Some(Expr::Index(IndexExpr {
                x: Box::new(inner),
                lbracket: tok.span,
                index: index.map(Box::new),
                rbracket,
            }));
            if err.is_some() {
                return (x, err);
            }
        }
    }

    /// Parses the first element of a primary expression (one without any
    /// trailing index expressions).
    fn inner_primary_expr(&mut self) -> (Option<Expr>, Option<SyntaxError>) {
        let (tok, ok) = self.next();
        if !ok {
            return (
                None,
                Some(SyntaxError::not_found(
                    Span::at(self.source.len()),
                    "expected expression, got EOF",
                )),
            );
        }
        match tok.kind {
            TokenKind::Number | TokenKind::String => (
                Some(Expr::Literal(BasicLit {
                    kind: tok.kind,
                    value: tok.value,
                    span: tok.span,
                })),
                None,
            ),
            TokenKind::Identifier => {
                // Look ahead for a dot-separated identifier.
                self.prev();
                let (id, err) = self.qualified_ident();
                if err.is_some() {
                    return (id.map(Expr::Ident), err);
                }
                let Some(id) = id else {
                    return (None, None);
                };
                if id.parts.len() > 1 {
                    // Dot-separated identifiers cannot be called.
                    return (Some(Expr::Ident(id)), None);
                }

                // A plain identifier may be followed by an opening
                // parenthesis for a function call.
                let (next_tok, _) = self.next();
                if next_tok.kind != TokenKind::LParen {
                    self.prev();
                    return (Some(Expr::Ident(id)), None);
                }

                let mut arg_parser = self.split(TokenKind::RParen);
                let (args, mut err) = arg_parser.expr_list();
                if is_not_found(&err) {
                    err = None;
                } else if err.is_none() {
                    // Permit a trailing comma after the last argument.
                    let (tok, _) = arg_parser.next();
                    if tok.kind != TokenKind::Comma {
                        arg_parser.prev();
                    }
                }
                err = join(err, arg_parser.end_split_error());

                let mut rparen = Span::null();
                let (final_tok, _) = self.next();
                if final_tok.kind == TokenKind::RParen {
                    rparen = final_tok.span;
                } else {
                    self.prev();
                    err = join(
                        err,
                        Some(SyntaxError::new(
                            final_tok.span,
                            format!(
                                "expected ')', got {}",
                                format_token(self.source, &final_tok)
                            ),
                        )),
                    );
                }
                (
                    Some(Expr::Call(CallExpr {
                        func: Ident {
                            name: tok.value,
                            span: tok.span,
                            quoted: false,
                        },
                        lparen: next_tok.span,
                        args,
                        rparen,
                    })),
                    err,
                )
            }
            TokenKind::QuotedIdentifier => {
                self.prev();
                let (id, err) = self.qualified_ident();
                (id.map(Expr::Ident), err)
            }
            TokenKind::LParen => {
                let mut expr_parser = self.split(TokenKind::RParen);
                let (x, err) = expr_parser.expr();
                // A parenthesis was already consumed.
                let mut err = opaque(err);
                err = join(err, expr_parser.end_split_error());

                let (end_tok, _) = self.next();
                if end_tok.kind != TokenKind::RParen {
                    err = join(
                        err,
                        Some(SyntaxError::new(
                            end_tok.span,
                            format!("expected ')', got {}", format_token(self.source, &end_tok)),
                        )),
                    );
                    return (
                        Some(Expr::Paren(ParenExpr {
                            lparen: tok.span,
                            x: x.map(Box::new),
                            rparen: Span::null(),
                        })),
                        err,
                    );
                }
                (
                    Some(Expr::Paren(ParenExpr {
                        lparen: tok.span,
                        x: x.map(Box::new),
                        rparen: end_tok.span,
                    })),
                    err,
                )
            }
            _ => {
                self.prev();
                (
                    None,
                    Some(SyntaxError::not_found(
                        tok.span,
                        format!(
                            "expected expression, got {}",
                            format_token(self.source, &tok)
                        ),
                    )),
                )
            }
        }
    }

    fn ident(&mut self) -> (Option<Ident>, Option<SyntaxError>) {
        let (tok, _) = self.next();
        if tok.kind != TokenKind::Identifier && tok.kind != TokenKind::QuotedIdentifier {
            self.prev();
            return (
                None,
                Some(SyntaxError::not_found(
                    Span::at(self.source.len()),
                    format!(
                        "expected identifier, got {}",
                        format_token(self.source, &tok)
                    ),
                )),
            );
        }
        let quoted = tok.kind == TokenKind::QuotedIdentifier;
        (
            Some(Ident {
                name: tok.value,
                span: tok.span,
                quoted,
            }),
            None,
        )
    }

    /// Parses one or more dot-separated identifiers.
    fn qualified_ident(&mut self) -> (Option<QualifiedIdent>, Option<SyntaxError>) {
        let (id, err) = self.ident();
        let Some(id) = id else {
            return (None, err);
        };

        let mut qid = QualifiedIdent { parts: vec![id] };
        loop {
            let (tok, _) = self.next();
            if tok.kind != TokenKind::Dot {
                self.prev();
                return (Some(qid), None);
            }
            let (sel, err) = self.ident();
            match sel {
                Some(sel) => qid.parts.push(sel),
                None => return (Some(qid), opaque(err)),
            }
        }
    }
}

fn operator_precedence(op: TokenKind) -> i8 {
    match op {
        TokenKind::Star | TokenKind::Slash | TokenKind::Mod => 4,
        TokenKind::Plus | TokenKind::Minus => 3,
        TokenKind::Eq
        | TokenKind::Ne
        | TokenKind::Lt
        | TokenKind::Le
        | TokenKind::Gt
        | TokenKind::Ge
        | TokenKind::CaseInsensitiveEq
        | TokenKind::CaseInsensitiveNe
        | TokenKind::In => 2,
        TokenKind::And => 1,
        TokenKind::Or => 0,
        _ => -1,
    }
}

fn format_token(source: &str, tok: &Token) -> String {
    if tok.span.start as usize == source.len() && tok.span.end as usize == source.len() {
        return "EOF".to_string();
    }
    if tok.span.len() == 0 {
        if tok.kind == TokenKind::Error {
            return "<scan error>".to_string();
        }
        return "''".to_string();
    }
    format!("'{}'", tok.span.slice(source))
}

/// Accumulated diagnostics of a production, with the not-found marker
/// indicating that the production consumed nothing.
#[derive(Debug, Clone)]
pub(crate) struct SyntaxError {
    diagnostics: Vec<(Span, String)>,
    not_found: bool,
}

impl SyntaxError {
    fn new(span: Span, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            diagnostics: vec![(span, message.into())],
            not_found: false,
        }
    }

    fn not_found(span: Span, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            diagnostics: vec![(span, message.into())],
            not_found: true,
        }
    }

    pub(crate) fn into_parse_error(self, source: &str) -> ParseError {
        let diagnostics = self
            .diagnostics
            .into_iter()
            .map(|(span, message)| {
                let pos = span.start.max(0) as usize;
                let (line, column) = line_col(source, pos.min(source.len()));
                Diagnostic {
                    span,
                    line,
                    column,
                    message,
                }
            })
            .collect();
        ParseError { diagnostics }
    }
}

/// Joins errors into a single flat diagnostic list.
fn join(a: Option<SyntaxError>, b: Option<SyntaxError>) -> Option<SyntaxError> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(mut a), Some(b)) => {
            a.diagnostics.extend(b.diagnostics);
            a.not_found = a.not_found || b.not_found;
            Some(a)
        }
    }
}

/// Strips the not-found marker once a construct has committed to a
/// production.
fn opaque(err: Option<SyntaxError>) -> Option<SyntaxError> {
    err.map(|mut err| {
        err.not_found = false;
        err
    })
}

fn is_not_found(err: &Option<SyntaxError>) -> bool {
    err.as_ref().is_some_and(|err| err.not_found)
}
