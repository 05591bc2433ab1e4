//! CLI support for the PQL compiler.
//!
//! Provides programmatic access to the `pqlc` commands for embedding in
//! other tools.

mod suggest;
mod translate;

pub use suggest::{execute_suggest, SuggestOptions};
pub use translate::{execute_translate, TranslateOutcome};

use std::io;

/// Errors that can occur during CLI operations.
#[derive(Debug)]
pub enum CliError {
    /// Compilation error
    Compile(crate::Error),
    /// JSON parsing error
    Json(serde_json::Error),
    /// IO error
    Io(io::Error),
    /// No input provided
    NoInput,
    /// A malformed `name=SQL` parameter definition
    BadParameter(String),
    /// One or more statements failed to compile (each already reported)
    Statements,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Compile(err) => write!(f, "{}", err),
            CliError::Json(err) => write!(f, "invalid JSON: {}", err),
            CliError::Io(err) => write!(f, "{}", err),
            CliError::NoInput => {
                write!(f, "no input provided; pass a file or pipe PQL to stdin")
            }
            CliError::BadParameter(p) => {
                write!(f, "invalid parameter {:?} (expected name=SQL)", p)
            }
            CliError::Statements => {
                write!(f, "one or more statements could not be compiled")
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Compile(err) => Some(err),
            CliError::Json(err) => Some(err),
            CliError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<crate::Error> for CliError {
    fn from(err: crate::Error) -> Self {
        CliError::Compile(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err)
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        CliError::Io(err)
    }
}
