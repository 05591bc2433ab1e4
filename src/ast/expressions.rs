use crate::ast::tokens::TokenKind;
use crate::span::{union_spans, Span};

/// An identifier with its source location.
///
/// `Ident` is not itself an expression; a [`QualifiedIdent`] is. Use
/// [`Ident::to_qualified`] to wrap a single identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    /// True if the identifier was written with backticks.
    pub quoted: bool,
}

impl Ident {
    /// Wraps the identifier as a [`QualifiedIdent`] with a single part.
    pub fn to_qualified(&self) -> QualifiedIdent {
        QualifiedIdent {
            parts: vec![self.clone()],
        }
    }
}

/// One or more dot-separated identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedIdent {
    pub parts: Vec<Ident>,
}

impl QualifiedIdent {
    pub fn span(&self) -> Span {
        union_spans(self.parts.iter().map(|part| part.span))
    }
}

/// An expression node.
///
/// Sub-expressions that the parser could not complete are `None`; such
/// holes only appear in trees that were returned alongside a parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A (possibly dotted) identifier reference.
    Ident(QualifiedIdent),
    /// A numeric or string literal.
    Literal(BasicLit),
    /// A unary `+` or `-` expression.
    Unary(UnaryExpr),
    /// A binary expression.
    Binary(BinaryExpr),
    /// An `x in (…)` expression.
    In(InExpr),
    /// A parenthesized expression.
    Paren(ParenExpr),
    /// An array or map index like `x[i]`.
    Index(IndexExpr),
    /// A function call.
    Call(CallExpr),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Ident(id) => id.span(),
            Expr::Literal(lit) => lit.span,
            Expr::Unary(x) => x.span(),
            Expr::Binary(x) => x.span(),
            Expr::In(x) => x.span(),
            Expr::Paren(x) => x.span(),
            Expr::Index(x) => x.span(),
            Expr::Call(x) => x.span(),
        }
    }
}

pub(crate) fn expr_span(x: &Option<Box<Expr>>) -> Span {
    match x {
        Some(x) => x.span(),
        None => Span::null(),
    }
}

/// A numeric or string literal.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicLit {
    /// [`TokenKind::Number`] or [`TokenKind::String`].
    pub kind: TokenKind,
    /// The decoded value, as produced by the lexer.
    pub value: String,
    pub span: Span,
}

impl BasicLit {
    /// Reports whether the literal is a floating point literal.
    pub fn is_float(&self) -> bool {
        self.kind == TokenKind::Number && self.value.contains(['.', 'e', 'E'])
    }

    /// Reports whether the literal is an integer literal.
    pub fn is_integer(&self) -> bool {
        self.kind == TokenKind::Number && !self.is_float()
    }

    /// The numeric value of the literal as an unsigned integer, or 0 if
    /// the literal is not a number.
    pub fn as_u64(&self) -> u64 {
        if self.kind != TokenKind::Number {
            return 0;
        }
        if self.is_float() {
            return self.as_f64() as u64;
        }
        self.value.parse().unwrap_or(0)
    }

    /// The numeric value of the literal as a float, or 0 if the literal
    /// is not a number.
    pub fn as_f64(&self) -> f64 {
        if self.kind != TokenKind::Number {
            return 0.0;
        }
        self.value.parse().unwrap_or(0.0)
    }
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    /// [`TokenKind::Plus`] or [`TokenKind::Minus`].
    pub op: TokenKind,
    pub op_span: Span,
    pub x: Option<Box<Expr>>,
}

impl UnaryExpr {
    pub fn span(&self) -> Span {
        union_spans([self.op_span, expr_span(&self.x)])
    }
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub x: Option<Box<Expr>>,
    pub op: TokenKind,
    pub op_span: Span,
    pub y: Option<Box<Expr>>,
}

impl BinaryExpr {
    pub fn span(&self) -> Span {
        union_spans([expr_span(&self.x), self.op_span, expr_span(&self.y)])
    }
}

/// An `in` operator expression with a parenthesized value list.
#[derive(Debug, Clone, PartialEq)]
pub struct InExpr {
    pub x: Option<Box<Expr>>,
    pub in_span: Span,
    pub lparen: Span,
    pub vals: Vec<Expr>,
    pub rparen: Span,
}

impl InExpr {
    pub fn span(&self) -> Span {
        union_spans(
            [expr_span(&self.x), self.in_span, self.lparen]
                .into_iter()
                .chain(self.vals.iter().map(Expr::span))
                .chain([self.rparen]),
        )
    }
}

/// A parenthesized expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParenExpr {
    pub lparen: Span,
    pub x: Option<Box<Expr>>,
    pub rparen: Span,
}

impl ParenExpr {
    pub fn span(&self) -> Span {
        union_spans([self.lparen, expr_span(&self.x), self.rparen])
    }
}

/// An array or map index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub x: Box<Expr>,
    pub lbracket: Span,
    pub index: Option<Box<Expr>>,
    pub rbracket: Span,
}

impl IndexExpr {
    pub fn span(&self) -> Span {
        union_spans([
            self.x.span(),
            self.lbracket,
            expr_span(&self.index),
            self.rbracket,
        ])
    }
}

/// An unquoted identifier followed by an argument list.
///
/// Dotted names are never callable.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub func: Ident,
    pub lparen: Span,
    pub args: Vec<Expr>,
    pub rparen: Span,
}

impl CallExpr {
    pub fn span(&self) -> Span {
        union_spans(
            [self.func.span, self.lparen]
                .into_iter()
                .chain(self.args.iter().map(Expr::span))
                .chain([self.rparen]),
        )
    }
}
