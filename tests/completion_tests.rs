// tests/completion_tests.rs

use pqlc::{AnalysisColumn, AnalysisContext, AnalysisTable, Completion, Span};

fn table(columns: &[&str]) -> AnalysisTable {
    AnalysisTable {
        columns: columns
            .iter()
            .map(|name| AnalysisColumn {
                name: name.to_string(),
            })
            .collect(),
    }
}

fn foo_bar_context() -> AnalysisContext {
    let mut context = AnalysisContext::default();
    context.tables.insert("foo".to_string(), table(&["id", "n"]));
    context.tables.insert("bar".to_string(), table(&["id"]));
    context
}

fn completion(label: &str, text: &str, start: isize, end: isize) -> Completion {
    Completion {
        label: label.to_string(),
        text: text.to_string(),
        span: Span::new(start, end),
    }
}

/// Suggests at the end of `source_before` within the concatenated
/// source, and sorts for order-insensitive comparison.
fn suggest(context: &AnalysisContext, source_before: &str, source_after: &str) -> Vec<Completion> {
    let source = format!("{}{}", source_before, source_after);
    let cursor = Span::new(source_before.len() as isize, source_before.len() as isize);
    let mut got = context.suggest_completions(&source, cursor);
    got.sort_by(|a, b| {
        (a.span.start, a.span.end, &a.label, &a.text).cmp(&(
            b.span.start,
            b.span.end,
            &b.label,
            &b.text,
        ))
    });
    got
}

fn sorted(mut completions: Vec<Completion>) -> Vec<Completion> {
    completions.sort_by(|a, b| {
        (a.span.start, a.span.end, &a.label, &a.text).cmp(&(
            b.span.start,
            b.span.end,
            &b.label,
            &b.text,
        ))
    });
    completions
}

/// The twelve operator completions with the given insertion prefix and
/// replacement span. `order` and `sort` insert a trailing ` by`.
fn operator_completions(lead: &str, start: isize, end: isize) -> Vec<Completion> {
    [
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
    ]
    .iter()
    .map(|name| {
        let mut text = format!("{}{}", lead, name);
        if *name == "order" || *name == "sort" {
            text.push_str(" by");
        }
        completion(name, &text, start, end)
    })
    .collect()
}

// ============================================================================
// Table names
// ============================================================================

#[test]
fn test_empty_source() {
    let got = suggest(&foo_bar_context(), "", "");
    assert_eq!(
        got,
        vec![completion("bar", "bar", 0, 0), completion("foo", "foo", 0, 0)]
    );
}

#[test]
fn test_initial_source_ref() {
    let got = suggest(&foo_bar_context(), "f", "");
    assert_eq!(got, vec![completion("foo", "foo", 0, 1)]);
}

#[test]
fn test_source_ref_with_pipe_after() {
    let got = suggest(&foo_bar_context(), "", " | count");
    assert_eq!(
        got,
        vec![completion("bar", "bar", 0, 0), completion("foo", "foo", 0, 0)]
    );
}

#[test]
fn test_before_complete_expr() {
    let got = suggest(&foo_bar_context(), "", "o | count");
    assert_eq!(
        got,
        vec![completion("bar", "bar", 0, 0), completion("foo", "foo", 0, 0)]
    );
}

#[test]
fn test_before_space_then_complete_expr() {
    let got = suggest(&foo_bar_context(), "", " x | count");
    assert_eq!(
        got,
        vec![completion("bar", "bar", 0, 0), completion("foo", "foo", 0, 0)]
    );
}

// ============================================================================
// Operator keywords
// ============================================================================

#[test]
fn test_first_operator() {
    let got = suggest(&foo_bar_context(), "foo ", "");
    assert_eq!(got, sorted(operator_completions("| ", 4, 4)));
}

#[test]
fn test_first_operator_after_pipe() {
    let got = suggest(&foo_bar_context(), "foo |", "");
    assert_eq!(got, sorted(operator_completions(" ", 5, 5)));
}

#[test]
fn test_first_operator_after_pipe_space() {
    let got = suggest(&foo_bar_context(), "foo |  ", "");
    assert_eq!(got, sorted(operator_completions("", 7, 7)));
}

#[test]
fn test_partial_operator_name() {
    let got = suggest(&foo_bar_context(), "foo | whe", "");
    assert_eq!(got, vec![completion("where", "where", 6, 9)]);
}

// ============================================================================
// Columns
// ============================================================================

fn foo_name_context() -> AnalysisContext {
    let mut context = AnalysisContext::default();
    context
        .tables
        .insert("foo".to_string(), table(&["id", "name"]));
    context.tables.insert("bar".to_string(), table(&["id"]));
    context
}

#[test]
fn test_where_expression() {
    let got = suggest(&foo_name_context(), "foo | where n", "");
    assert_eq!(got, vec![completion("name", "name", 12, 13)]);
}

#[test]
fn test_project_uses_scope_before_operator() {
    let mut context = AnalysisContext::default();
    context
        .tables
        .insert("People".to_string(), table(&["FirstName", "LastName"]));
    let got = suggest(&context, "People\n| project F", ", LastName");
    assert_eq!(got, vec![completion("FirstName", "FirstName", 17, 18)]);
}

#[test]
fn test_scope_after_project() {
    let mut context = AnalysisContext::default();
    context
        .tables
        .insert("People".to_string(), table(&["FirstName", "LastName"]));
    // After a project, only the projected names remain in scope.
    let got = suggest(&context, "People | project Full = FirstName | where F", "");
    assert_eq!(got, vec![completion("Full", "Full", 42, 43)]);
}

#[test]
fn test_scope_after_count() {
    let mut context = AnalysisContext::default();
    context.tables.insert("foo".to_string(), table(&["id"]));
    let got = suggest(&context, "foo | count | where c", "");
    assert_eq!(got, vec![completion("count()", "count()", 20, 21)]);
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_join_right_table_name() {
    let got = suggest(&foo_name_context(), "foo | join (b", "");
    assert_eq!(got, vec![completion("bar", "bar", 12, 13)]);
}

#[test]
fn test_join_on_columns() {
    let got = suggest(&foo_name_context(), "foo | join (bar) on i", "");
    // Both sides have an `id` column; only one suggestion survives.
    assert_eq!(got, vec![completion("id", "id", 20, 21)]);
}

// ============================================================================
// Let bindings
// ============================================================================

#[test]
fn test_let_bound_name_for_take() {
    let mut context = AnalysisContext::default();
    context
        .tables
        .insert("People".to_string(), table(&["FirstName", "LastName"]));
    let got = suggest(&context, "let foo = 5;\nPeople\n| take ", "");
    assert_eq!(got, vec![completion("foo", "foo", 27, 27)]);
}
