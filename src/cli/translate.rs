use crate::compile::{CompileOptions, Error};
use crate::lexer::split_statements;

/// The result of translating a source: the SQL of every statement that
/// compiled, and the errors of those that did not.
#[derive(Debug, Default)]
pub struct TranslateOutcome {
    pub sql: String,
    pub errors: Vec<Error>,
}

/// Compiles each backslash-separated statement of `source`.
///
/// Statements that fail to compile are skipped and their errors
/// collected, so one bad statement does not hide the rest.
pub fn execute_translate(source: &str, options: &CompileOptions) -> TranslateOutcome {
    let mut outcome = TranslateOutcome::default();
    for statement in split_statements(source) {
        if statement.trim().is_empty() {
            continue;
        }
        match options.compile(statement) {
            Ok(sql) => {
                outcome.sql.push_str(&sql);
                outcome.sql.push_str("\n\n");
            }
            Err(err) => outcome.errors.push(err),
        }
    }
    outcome
}
