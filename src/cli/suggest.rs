use crate::cli::CliError;
use crate::complete::AnalysisContext;
use crate::span::Span;

pub struct SuggestOptions {
    /// JSON describing the tables and columns in scope, in the shape
    /// `{"tables": {"name": {"columns": [{"name": "col"}]}}}`.
    pub schema_json: String,
    /// Byte offset of the cursor in the source.
    pub cursor: usize,
}

/// Computes completions for the source and renders them as JSON.
pub fn execute_suggest(source: &str, options: &SuggestOptions) -> Result<String, CliError> {
    let context: AnalysisContext = serde_json::from_str(&options.schema_json)?;
    let completions = context.suggest_completions(source, Span::at(options.cursor));
    Ok(serde_json::to_string_pretty(&completions)?)
}
