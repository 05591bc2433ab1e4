//! Hand-written scanner turning query text into positioned tokens.
//!
//! Scanning never fails: a malformed literal or unrecognized character
//! becomes a token of [`TokenKind::Error`] whose value holds the reason,
//! and scanning resumes at the next character so downstream tools always
//! see the remainder of the source.

use crate::ast::{Token, TokenKind};
use crate::span::Span;

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    last: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            pos: 0,
            last: 0,
        }
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.source[self.pos..].chars().next()?;
        self.last = self.pos;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn prev_char(&mut self) {
        self.pos = self.last;
    }

    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
        self.last = pos;
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as isize, self.pos as isize)
    }

    /// Produces the next token, or `None` at end of input.
    ///
    /// Whitespace and `// …` comments are discarded.
    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            let start = self.pos;
            let c = self.next_char()?;

            if c.is_whitespace() {
                continue;
            }
            if is_alpha(c) || c == '_' || c == '$' {
                self.prev_char();
                return Some(self.ident());
            }
            if c.is_ascii_digit() || c == '.' {
                self.prev_char();
                return Some(self.number_or_dot());
            }

            return Some(match c {
                ',' => Token::new(TokenKind::Comma, self.span_from(start)),
                '"' | '\'' => {
                    self.prev_char();
                    self.string_literal()
                }
                '`' => {
                    self.prev_char();
                    self.quoted_ident()
                }
                '|' => Token::new(TokenKind::Pipe, self.span_from(start)),
                '(' => Token::new(TokenKind::LParen, self.span_from(start)),
                ')' => Token::new(TokenKind::RParen, self.span_from(start)),
                '[' => Token::new(TokenKind::LBracket, self.span_from(start)),
                ']' => Token::new(TokenKind::RBracket, self.span_from(start)),
                '\\' => Token::new(TokenKind::Backslash, self.span_from(start)),
                ';' => Token::new(TokenKind::Semi, self.span_from(start)),
                '+' => Token::new(TokenKind::Plus, self.span_from(start)),
                '-' => Token::new(TokenKind::Minus, self.span_from(start)),
                '*' => Token::new(TokenKind::Star, self.span_from(start)),
                '%' => Token::new(TokenKind::Mod, self.span_from(start)),
                '=' => match self.next_char() {
                    Some('=') => Token::new(TokenKind::Eq, self.span_from(start)),
                    Some('~') => Token::new(TokenKind::CaseInsensitiveEq, self.span_from(start)),
                    other => {
                        if other.is_some() {
                            self.prev_char();
                        }
                        Token::new(TokenKind::Assign, self.span_from(start))
                    }
                },
                '!' => match self.next_char() {
                    Some('=') => Token::new(TokenKind::Ne, self.span_from(start)),
                    Some('~') => Token::new(TokenKind::CaseInsensitiveNe, self.span_from(start)),
                    other => {
                        if other.is_some() {
                            self.prev_char();
                        }
                        Token::error(self.span_from(start), "unrecognized token '!'")
                    }
                },
                '<' => match self.next_char() {
                    Some('=') => Token::new(TokenKind::Le, self.span_from(start)),
                    other => {
                        if other.is_some() {
                            self.prev_char();
                        }
                        Token::new(TokenKind::Lt, self.span_from(start))
                    }
                },
                '>' => match self.next_char() {
                    Some('=') => Token::new(TokenKind::Ge, self.span_from(start)),
                    other => {
                        if other.is_some() {
                            self.prev_char();
                        }
                        Token::new(TokenKind::Gt, self.span_from(start))
                    }
                },
                '/' => match self.next_char() {
                    None => Token::new(TokenKind::Slash, self.span_from(start)),
                    Some('/') => {
                        // A comment: consume to end of line.
                        while let Some(c) = self.next_char() {
                            if c == '\n' {
                                break;
                            }
                        }
                        continue;
                    }
                    Some(_) => {
                        self.prev_char();
                        Token::new(TokenKind::Slash, self.span_from(start))
                    }
                },
                _ => {
                    let span = self.span_from(start);
                    Token::error(
                        span,
                        format!("unrecognized character {:?}", span.slice(self.source)),
                    )
                }
            });
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        let _ = self.next_char(); // the caller validated the first character
        while let Some(c) = self.next_char() {
            if !(is_alpha(c) || c.is_ascii_digit() || c == '_') {
                self.prev_char();
                break;
            }
        }
        let span = self.span_from(start);
        let value = span.slice(self.source);
        match keyword_kind(value) {
            Some(kind) => Token::new(kind, span),
            None => Token {
                kind: TokenKind::Identifier,
                span,
                value: value.to_string(),
            },
        }
    }

    fn quoted_ident(&mut self) -> Token {
        let start = self.pos;
        let _ = self.next_char(); // opening backtick
        loop {
            let Some(c) = self.next_char() else {
                return Token::error(
                    self.span_from(start),
                    "parse quoted identifier: unexpected EOF",
                );
            };
            match c {
                '`' => {
                    // A doubled backtick is one literal backtick.
                    match self.next_char() {
                        Some('`') => {}
                        other => {
                            if other.is_some() {
                                self.prev_char();
                            }
                            let span = self.span_from(start);
                            let inner = &self.source[start + 1..self.pos - 1];
                            return Token {
                                kind: TokenKind::QuotedIdentifier,
                                span,
                                value: inner.replace("``", "`"),
                            };
                        }
                    }
                }
                '\n' => {
                    self.prev_char();
                    return Token::error(
                        self.span_from(start),
                        "parse quoted identifier: unexpected end of line",
                    );
                }
                _ => {}
            }
        }
    }

    fn number_or_dot(&mut self) -> Token {
        let start = self.pos;
        let Some(c) = self.next_char() else {
            return Token::error(Span::at(start), "parse numeric literal: unexpected EOF");
        };

        let mut has_decimal_point = false;
        match c {
            '0' => match self.next_char() {
                None => {
                    return Token {
                        kind: TokenKind::Number,
                        span: self.span_from(start),
                        value: "0".to_string(),
                    };
                }
                Some('.') => has_decimal_point = true,
                Some('e') | Some('E') => {
                    self.prev_char();
                    self.number_exponent();
                    let span = self.span_from(start);
                    return Token {
                        kind: TokenKind::Number,
                        span,
                        value: normalize_number_value(span.slice(self.source)),
                    };
                }
                Some('x') | Some('X') => return self.hex_literal(start),
                Some(c) if !c.is_ascii_digit() => self.prev_char(),
                Some(_) => {}
            },
            '.' => {
                // Must be followed by a digit to count as a numeric literal.
                has_decimal_point = true;
                match self.next_char() {
                    None => return Token::new(TokenKind::Dot, self.span_from(start)),
                    Some(c) if !c.is_ascii_digit() => {
                        self.prev_char();
                        return Token::new(TokenKind::Dot, self.span_from(start));
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }

        // Subsequent decimal digits.
        loop {
            match self.next_char() {
                None => {
                    let span = self.span_from(start);
                    return Token {
                        kind: TokenKind::Number,
                        span,
                        value: normalize_number_value(span.slice(self.source)),
                    };
                }
                Some('.') if !has_decimal_point => has_decimal_point = true,
                Some(c) if !c.is_ascii_digit() => {
                    self.prev_char();
                    self.number_exponent();
                    let span = self.span_from(start);
                    return Token {
                        kind: TokenKind::Number,
                        span,
                        value: normalize_number_value(span.slice(self.source)),
                    };
                }
                Some(_) => {}
            }
        }
    }

    /// Scans the hexadecimal digits of a `0x` literal; `start` is the
    /// position of the leading zero.
    fn hex_literal(&mut self, start: usize) -> Token {
        let hex_digit_start = self.pos;
        match self.next_char() {
            Some(c) if is_hex_digit(c) => {}
            _ => {
                self.set_pos(start + 2);
                return Token::error(self.span_from(start), "invalid hex literal");
            }
        }
        while let Some(c) = self.next_char() {
            if !is_hex_digit(c) {
                self.prev_char();
                break;
            }
        }
        let span = self.span_from(start);
        match u64::from_str_radix(&self.source[hex_digit_start..self.pos], 16) {
            Ok(n) => Token {
                kind: TokenKind::Number,
                span,
                value: n.to_string(),
            },
            Err(err) => Token::error(span, format!("parse hex literal: {}", err)),
        }
    }

    /// Consumes an `e`/`E` exponent if one follows, restoring the position
    /// when the characters do not form a complete exponent.
    fn number_exponent(&mut self) -> bool {
        let start = self.pos;
        let found = self.exponent_tail();
        if !found {
            self.set_pos(start);
        }
        found
    }

    fn exponent_tail(&mut self) -> bool {
        match self.next_char() {
            Some('e') | Some('E') => {}
            _ => return false,
        }
        // Must have at least one digit.
        let mut c = match self.next_char() {
            Some(c) => c,
            None => return false,
        };
        if c == '+' || c == '-' {
            c = match self.next_char() {
                Some(c) => c,
                None => return false,
            };
        }
        if !c.is_ascii_digit() {
            return false;
        }
        loop {
            match self.next_char() {
                None => return true,
                Some(c) if !c.is_ascii_digit() => {
                    self.prev_char();
                    return true;
                }
                Some(_) => {}
            }
        }
    }

    fn string_literal(&mut self) -> Token {
        let start = self.pos;
        let Some(quote) = self.next_char() else {
            return Token::error(Span::at(start), "unexpected EOF (expected string)");
        };

        let value_start = self.pos;
        // Stays borrowed from the source until the first escape sequence.
        let mut decoded: Option<String> = None;
        loop {
            let Some(c) = self.next_char() else {
                return Token::error(self.span_from(start), "unterminated string");
            };
            match c {
                c if c == quote => {
                    let value = match decoded {
                        Some(s) => s,
                        None => self.source[value_start..self.last].to_string(),
                    };
                    return Token {
                        kind: TokenKind::String,
                        span: self.span_from(start),
                        value,
                    };
                }
                '\n' => {
                    self.prev_char();
                    return Token::error(self.span_from(start), "unterminated string");
                }
                '\\' => {
                    let buf = decoded
                        .get_or_insert_with(|| self.source[value_start..self.last].to_string());
                    match self.next_char() {
                        None => {
                            return Token::error(self.span_from(start), "unterminated string");
                        }
                        Some('\n') => {
                            self.prev_char();
                            return Token::error(self.span_from(start), "unterminated string");
                        }
                        Some('n') => buf.push('\n'),
                        Some('t') => buf.push('\t'),
                        Some(c) => buf.push(c),
                    }
                }
                c => {
                    if let Some(buf) = decoded.as_mut() {
                        buf.push(c);
                    }
                }
            }
        }
    }
}

/// Turns a query into a sequence of tokens.
///
/// Errors are indicated inline with the [`TokenKind::Error`] kind.
pub fn scan(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token() {
        tokens.push(tok);
    }
    tokens
}

/// Splits the given source on backslash tokens.
///
/// Used by drivers to frame statements; the scan itself is unaffected.
pub fn split_statements(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for tok in scan(source) {
        if tok.kind == TokenKind::Backslash {
            parts.push(&source[start..tok.span.start as usize]);
            start = tok.span.end as usize;
        }
    }
    parts.push(&source[start..]);
    parts
}

/// Keyword recognition happens after an identifier is scanned.
fn keyword_kind(ident: &str) -> Option<TokenKind> {
    match ident {
        "and" => Some(TokenKind::And),
        "by" => Some(TokenKind::By),
        "in" => Some(TokenKind::In),
        "or" => Some(TokenKind::Or),
        _ => None,
    }
}

fn normalize_number_value(s: &str) -> String {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return "0".to_string();
    }
    if trimmed.starts_with(['.', 'e', 'E']) {
        return format!("0{}", trimmed);
    }
    trimmed.to_string()
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

#[test]
fn test_keywords_promoted() {
    let tokens = scan("x and y or z in (1) by w");
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert!(kinds.contains(&TokenKind::And));
    assert!(kinds.contains(&TokenKind::Or));
    assert!(kinds.contains(&TokenKind::In));
    assert!(kinds.contains(&TokenKind::By));
}

#[test]
fn test_dollar_starts_identifier() {
    let tokens = scan("$left.Key");
    assert_eq!(tokens[0].kind, TokenKind::Identifier);
    assert_eq!(tokens[0].value, "$left");
    assert_eq!(tokens[1].kind, TokenKind::Dot);
    assert_eq!(tokens[2].value, "Key");
}
