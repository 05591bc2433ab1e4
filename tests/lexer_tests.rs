// tests/lexer_tests.rs

use pqlc::{scan, split_statements, Span, Token, TokenKind};

fn token(kind: TokenKind, start: isize, end: isize) -> Token {
    Token {
        kind,
        span: Span::new(start, end),
        value: String::new(),
    }
}

fn value_token(kind: TokenKind, start: isize, end: isize, value: &str) -> Token {
    Token {
        kind,
        span: Span::new(start, end),
        value: value.to_string(),
    }
}

/// Error token values are human-readable messages; compare everything
/// except the message text.
fn shape(tokens: &[Token]) -> Vec<(TokenKind, isize, isize)> {
    tokens
        .iter()
        .map(|tok| (tok.kind, tok.span.start, tok.span.end))
        .collect()
}

// ============================================================================
// Identifiers and keywords
// ============================================================================

#[test]
fn test_empty() {
    assert_eq!(scan(""), vec![]);
}

#[test]
fn test_single_ident() {
    assert_eq!(
        scan("StormEvents\n"),
        vec![value_token(TokenKind::Identifier, 0, 11, "StormEvents")]
    );
}

#[test]
fn test_pipeline() {
    assert_eq!(
        scan("foo | bar"),
        vec![
            value_token(TokenKind::Identifier, 0, 3, "foo"),
            token(TokenKind::Pipe, 4, 5),
            value_token(TokenKind::Identifier, 6, 9, "bar"),
        ]
    );
}

#[test]
fn test_quoted_ident() {
    assert_eq!(
        scan("`foo`\n"),
        vec![value_token(TokenKind::QuotedIdentifier, 0, 5, "foo")]
    );
}

#[test]
fn test_quoted_ident_double_backtick() {
    assert_eq!(
        scan("`foo``bar`"),
        vec![value_token(TokenKind::QuotedIdentifier, 0, 10, "foo`bar")]
    );
}

#[test]
fn test_unterminated_quoted_ident() {
    assert_eq!(shape(&scan("`foo")), vec![(TokenKind::Error, 0, 4)]);
}

#[test]
fn test_line_split_quoted_ident() {
    let got = scan("`foo\nbar`");
    assert_eq!(
        shape(&got),
        vec![
            (TokenKind::Error, 0, 4),
            (TokenKind::Identifier, 5, 8),
            (TokenKind::Error, 8, 9),
        ]
    );
}

#[test]
fn test_keywords() {
    assert_eq!(
        scan("this and that"),
        vec![
            value_token(TokenKind::Identifier, 0, 4, "this"),
            token(TokenKind::And, 5, 8),
            value_token(TokenKind::Identifier, 9, 13, "that"),
        ]
    );
    assert_eq!(
        scan("this or that"),
        vec![
            value_token(TokenKind::Identifier, 0, 4, "this"),
            token(TokenKind::Or, 5, 7),
            value_token(TokenKind::Identifier, 8, 12, "that"),
        ]
    );
}

#[test]
fn test_comments_discarded() {
    assert_eq!(
        scan("StormEvents // the table name\n// Another comment\n| count"),
        vec![
            value_token(TokenKind::Identifier, 0, 11, "StormEvents"),
            token(TokenKind::Pipe, 49, 50),
            value_token(TokenKind::Identifier, 51, 56, "count"),
        ]
    );
}

#[test]
fn test_slash_is_not_a_comment() {
    assert_eq!(
        scan("foo / bar"),
        vec![
            value_token(TokenKind::Identifier, 0, 3, "foo"),
            token(TokenKind::Slash, 4, 5),
            value_token(TokenKind::Identifier, 6, 9, "bar"),
        ]
    );
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn test_zero() {
    assert_eq!(scan("0"), vec![value_token(TokenKind::Number, 0, 1, "0")]);
}

#[test]
fn test_leading_zeroes_trimmed() {
    assert_eq!(scan("007"), vec![value_token(TokenKind::Number, 0, 3, "7")]);
}

#[test]
fn test_integer() {
    assert_eq!(
        scan("123"),
        vec![value_token(TokenKind::Number, 0, 3, "123")]
    );
}

#[test]
fn test_float() {
    assert_eq!(
        scan("3.14"),
        vec![value_token(TokenKind::Number, 0, 4, "3.14")]
    );
}

#[test]
fn test_exponent() {
    assert_eq!(
        scan("1e-9"),
        vec![value_token(TokenKind::Number, 0, 4, "1e-9")]
    );
}

#[test]
fn test_zero_exponent() {
    assert_eq!(
        scan("0e9"),
        vec![value_token(TokenKind::Number, 0, 3, "0e9")]
    );
}

#[test]
fn test_leading_dot() {
    assert_eq!(
        scan(".001"),
        vec![value_token(TokenKind::Number, 0, 4, "0.001")]
    );
}

#[test]
fn test_zero_dot_decimal() {
    assert_eq!(
        scan("0.001"),
        vec![value_token(TokenKind::Number, 0, 5, "0.001")]
    );
}

#[test]
fn test_leading_dot_identifier() {
    assert_eq!(
        scan(".foo"),
        vec![
            token(TokenKind::Dot, 0, 1),
            value_token(TokenKind::Identifier, 1, 4, "foo"),
        ]
    );
}

#[test]
fn test_hexadecimal() {
    assert_eq!(
        scan("0xdeadbeef"),
        vec![value_token(TokenKind::Number, 0, 10, "3735928559")]
    );
}

#[test]
fn test_unterminated_hex() {
    assert_eq!(shape(&scan("0x")), vec![(TokenKind::Error, 0, 2)]);
}

#[test]
fn test_broken_hex() {
    assert_eq!(
        shape(&scan("0xy")),
        vec![(TokenKind::Error, 0, 2), (TokenKind::Identifier, 2, 3)]
    );
}

#[test]
fn test_just_dot() {
    assert_eq!(scan("."), vec![token(TokenKind::Dot, 0, 1)]);
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_single_quoted_literal() {
    assert_eq!(
        scan("'abc'"),
        vec![value_token(TokenKind::String, 0, 5, "abc")]
    );
}

#[test]
fn test_double_quoted_literal() {
    assert_eq!(
        scan("\"abc\""),
        vec![value_token(TokenKind::String, 0, 5, "abc")]
    );
}

#[test]
fn test_unterminated_string() {
    assert_eq!(shape(&scan("\"abc")), vec![(TokenKind::Error, 0, 4)]);
}

#[test]
fn test_string_with_newline() {
    // Scanning resumes on the line after the unterminated string.
    assert_eq!(
        shape(&scan("\"abc\ndef\"")),
        vec![
            (TokenKind::Error, 0, 4),
            (TokenKind::Identifier, 5, 8),
            (TokenKind::Error, 8, 9),
        ]
    );
}

#[test]
fn test_string_with_escapes() {
    assert_eq!(
        scan(r#""abc\"\n\t\\def""#),
        vec![value_token(TokenKind::String, 0, 16, "abc\"\n\t\\def")]
    );
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_comparison_operators() {
    assert_eq!(
        shape(&scan("== != < <= > >= =~ !~ =")),
        vec![
            (TokenKind::Eq, 0, 2),
            (TokenKind::Ne, 3, 5),
            (TokenKind::Lt, 6, 7),
            (TokenKind::Le, 8, 10),
            (TokenKind::Gt, 11, 12),
            (TokenKind::Ge, 13, 15),
            (TokenKind::CaseInsensitiveEq, 16, 18),
            (TokenKind::CaseInsensitiveNe, 19, 21),
            (TokenKind::Assign, 22, 23),
        ]
    );
}

#[test]
fn test_arithmetic_operators() {
    assert_eq!(
        shape(&scan("+ - * / %")),
        vec![
            (TokenKind::Plus, 0, 1),
            (TokenKind::Minus, 2, 3),
            (TokenKind::Star, 4, 5),
            (TokenKind::Slash, 6, 7),
            (TokenKind::Mod, 8, 9),
        ]
    );
}

#[test]
fn test_lone_bang_is_an_error() {
    assert_eq!(shape(&scan("!")), vec![(TokenKind::Error, 0, 1)]);
}

#[test]
fn test_parentheses() {
    assert_eq!(
        scan("(x)"),
        vec![
            token(TokenKind::LParen, 0, 1),
            value_token(TokenKind::Identifier, 1, 2, "x"),
            token(TokenKind::RParen, 2, 3),
        ]
    );
}

#[test]
fn test_where_clause() {
    assert_eq!(
        scan("where EventType == \"Tornado\" or EventType != \"Thunderstorm Wind\""),
        vec![
            value_token(TokenKind::Identifier, 0, 5, "where"),
            value_token(TokenKind::Identifier, 6, 15, "EventType"),
            token(TokenKind::Eq, 16, 18),
            value_token(TokenKind::String, 19, 28, "Tornado"),
            token(TokenKind::Or, 29, 31),
            value_token(TokenKind::Identifier, 32, 41, "EventType"),
            token(TokenKind::Ne, 42, 44),
            value_token(TokenKind::String, 45, 64, "Thunderstorm Wind"),
        ]
    );
}

#[test]
fn test_unrecognized_character() {
    assert_eq!(shape(&scan("&")), vec![(TokenKind::Error, 0, 1)]);
}

// ============================================================================
// Statement splitting
// ============================================================================

#[test]
fn test_split_statements_no_separator() {
    assert_eq!(split_statements("foo | count"), vec!["foo | count"]);
}

#[test]
fn test_split_statements() {
    assert_eq!(
        split_statements("foo | count \\ bar | take 1"),
        vec!["foo | count ", " bar | take 1"]
    );
}

#[test]
fn test_split_statements_ignores_backslash_in_string() {
    // A backslash inside a string literal is an escape, not a separator.
    assert_eq!(split_statements("foo | where x == 'a\\\\b'").len(), 1);
}
