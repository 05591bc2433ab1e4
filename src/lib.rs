//! A compiler from a pipelined query language (PQL), modeled on the
//! Kusto Query Language, into portable SQL.
//!
//! A PQL source is a tabular expression: a table reference followed by
//! pipe-delimited transformation operators. [`compile`] turns one into a
//! single SQL statement made of named common table expressions and a
//! terminal `SELECT`:
//!
//! ```
//! let sql = pqlc::compile("StormEvents | count").unwrap();
//! assert_eq!(sql, "SELECT COUNT(*) AS \"count()\" FROM \"StormEvents\";");
//! ```
//!
//! For editor integration, [`AnalysisContext::suggest_completions`]
//! produces ranked insertions for a cursor position, tolerating
//! incomplete input.

pub mod ast;
pub mod cli;
pub mod compile;
pub mod complete;
pub mod lexer;
pub mod parser;
pub mod span;
mod sql;

pub use ast::{Token, TokenKind};
pub use compile::{compile, CompileError, CompileOptions, Error};
pub use complete::{AnalysisColumn, AnalysisContext, AnalysisTable, Completion};
pub use lexer::{scan, split_statements, Lexer};
pub use parser::{parse, parse_statements, Diagnostic, ParseError};
pub use span::Span;
