use crate::span::Span;

/// The type of a [`Token`] produced by scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A plain identifier that might be a keyword, depending on position.
    /// The token value is the identifier itself.
    Identifier,
    /// An identifier surrounded by backticks. The token value is the
    /// content between the backticks with any double backticks reduced.
    QuotedIdentifier,
    /// A numeric literal like `123`, `3.14`, `1e-9`, or `0xdeadbeef`.
    /// The token value is a decimal formatted string.
    Number,
    /// A string literal enclosed by single or double quotes. The token
    /// value is the literal's value (escape sequences are evaluated).
    String,

    /// The keyword `and`.
    And,
    /// The keyword `or`.
    Or,
    /// The keyword `in`.
    In,
    /// The keyword `by`.
    By,

    /// A single pipe character (`|`).
    Pipe,
    /// A period character (`.`).
    Dot,
    /// A comma character (`,`).
    Comma,
    /// A semicolon character (`;`), the in-source statement separator.
    Semi,
    /// The character `\`, the driver-level statement separator.
    Backslash,

    /// A single plus character (`+`).
    Plus,
    /// A single hyphen character (`-`).
    Minus,
    /// A single asterisk character (`*`).
    Star,
    /// A single forward slash character (`/`).
    Slash,
    /// A single percent sign character (`%`).
    Mod,
    /// A single equals sign character (`=`).
    Assign,
    /// Two equals signs (`==`).
    Eq,
    /// The sequence `!=`, an inequality test.
    Ne,
    /// The less than symbol (`<`).
    Lt,
    /// The sequence `<=`.
    Le,
    /// The greater than symbol (`>`).
    Gt,
    /// The sequence `>=`.
    Ge,
    /// The sequence `=~`, a case-insensitive equality test.
    CaseInsensitiveEq,
    /// The sequence `!~`, a case-insensitive inequality test.
    CaseInsensitiveNe,

    /// A left parenthesis.
    LParen,
    /// A right parenthesis.
    RParen,
    /// A left bracket (`[`).
    LBracket,
    /// A right bracket (`]`).
    RBracket,

    /// A marker for a scan error. The token value contains the error
    /// message.
    Error,
}

/// A syntactical element in a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token's type.
    pub kind: TokenKind,
    /// The location of the token.
    pub span: Span,
    /// Kind-specific information about the token. See the docs for
    /// [`TokenKind`] for what the value represents.
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            span,
            value: String::new(),
        }
    }

    pub(crate) fn error(span: Span, message: impl Into<String>) -> Token {
        Token {
            kind: TokenKind::Error,
            span,
            value: message.into(),
        }
    }
}
