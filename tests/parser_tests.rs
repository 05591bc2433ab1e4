// tests/parser_tests.rs

use pqlc::ast::{Expr, Statement, TabularDataSource, TabularOperator, TokenKind};
use pqlc::{parse, parse_statements};

fn operators(query: &str) -> Vec<TabularOperator> {
    parse(query).expect("query should parse").operators
}

fn single_operator(query: &str) -> TabularOperator {
    let mut ops = operators(query);
    assert_eq!(ops.len(), 1, "expected a single operator in {:?}", query);
    ops.remove(0)
}

fn error_text(query: &str) -> String {
    parse(query).expect_err("query should not parse").to_string()
}

// ============================================================================
// Data sources
// ============================================================================

#[test]
fn test_bare_table() {
    let expr = parse("StormEvents").unwrap();
    let TabularDataSource::Table(table) = &expr.source;
    assert_eq!(table.table.name, "StormEvents");
    assert!(!table.table.quoted);
    assert!(expr.operators.is_empty());
}

#[test]
fn test_quoted_table() {
    let expr = parse("`StormEvents`").unwrap();
    let TabularDataSource::Table(table) = &expr.source;
    assert_eq!(table.table.name, "StormEvents");
    assert!(table.table.quoted);
}

#[test]
fn test_empty_query() {
    assert!(error_text("").contains("empty query"));
}

#[test]
fn test_lex_error_surfaces() {
    assert!(parse("!").is_err());
}

// ============================================================================
// count / where
// ============================================================================

#[test]
fn test_count() {
    let op = single_operator("StormEvents | count");
    assert!(matches!(op, TabularOperator::Count(_)));
}

#[test]
fn test_chained_count() {
    let ops = operators("StormEvents | count | count");
    assert_eq!(ops.len(), 2);
}

#[test]
fn test_count_operator_span() {
    let op = single_operator("StormEvents | count");
    // Pipe through end of keyword.
    assert_eq!(op.span().start, 12);
    assert_eq!(op.span().end, 19);
}

#[test]
fn test_where_predicate() {
    let TabularOperator::Where(op) = single_operator("StormEvents | where DamageProperty > 0")
    else {
        panic!("expected where operator");
    };
    let Some(Expr::Binary(cmp)) = op.predicate else {
        panic!("expected binary predicate");
    };
    assert_eq!(cmp.op, TokenKind::Gt);
}

#[test]
fn test_filter_is_where_alias() {
    let op = single_operator("StormEvents | filter DamageProperty > 0");
    assert!(matches!(op, TabularOperator::Where(_)));
}

#[test]
fn test_where_unary_minus() {
    let TabularOperator::Where(op) = single_operator("StormEvents | where -42") else {
        panic!("expected where operator");
    };
    let Some(Expr::Unary(unary)) = op.predicate else {
        panic!("expected unary predicate");
    };
    assert_eq!(unary.op, TokenKind::Minus);
}

#[test]
fn test_where_call() {
    let TabularOperator::Where(op) = single_operator("StormEvents | where not(false)") else {
        panic!("expected where operator");
    };
    let Some(Expr::Call(call)) = op.predicate else {
        panic!("expected call predicate");
    };
    assert_eq!(call.func.name, "not");
    assert_eq!(call.args.len(), 1);
}

// ============================================================================
// Expression precedence
// ============================================================================

#[test]
fn test_multiplicative_left_associative() {
    // x / y * z groups as (x / y) * z.
    let TabularOperator::Where(op) = single_operator("foo | where x / y * z == 1") else {
        panic!("expected where operator");
    };
    let Some(Expr::Binary(eq)) = op.predicate else {
        panic!("expected == at the top");
    };
    assert_eq!(eq.op, TokenKind::Eq);
    let Some(mul) = eq.x.as_deref() else {
        panic!("missing left operand");
    };
    let Expr::Binary(mul) = mul else {
        panic!("expected * on the left");
    };
    assert_eq!(mul.op, TokenKind::Star);
    assert!(matches!(mul.x.as_deref(), Some(Expr::Binary(div)) if div.op == TokenKind::Slash));
}

#[test]
fn test_parens_override_precedence() {
    let TabularOperator::Where(op) = single_operator("foo | where x / (y * z) == 1") else {
        panic!("expected where operator");
    };
    let Some(Expr::Binary(eq)) = op.predicate else {
        panic!("expected == at the top");
    };
    let Some(Expr::Binary(div)) = eq.x.as_deref() else {
        panic!("expected / on the left");
    };
    assert_eq!(div.op, TokenKind::Slash);
    assert!(matches!(div.y.as_deref(), Some(Expr::Paren(_))));
}

#[test]
fn test_additive_binds_looser_than_multiplicative() {
    // 2 + 3 * 4 + 5 groups as (2 + (3 * 4)) + 5.
    let TabularOperator::Where(op) = single_operator("foo | where 2 + 3 * 4 + 5 == 19") else {
        panic!("expected where operator");
    };
    let Some(Expr::Binary(eq)) = op.predicate else {
        panic!("expected == at the top");
    };
    let Some(Expr::Binary(outer_add)) = eq.x.as_deref() else {
        panic!("expected + on the left");
    };
    assert_eq!(outer_add.op, TokenKind::Plus);
    let Some(Expr::Binary(inner_add)) = outer_add.x.as_deref() else {
        panic!("expected nested +");
    };
    assert_eq!(inner_add.op, TokenKind::Plus);
    assert!(
        matches!(inner_add.y.as_deref(), Some(Expr::Binary(mul)) if mul.op == TokenKind::Star)
    );
}

#[test]
fn test_in_expression() {
    let TabularOperator::Where(op) =
        single_operator("StormEvents | where State in ('GEORGIA', 'MISSISSIPPI')")
    else {
        panic!("expected where operator");
    };
    let Some(Expr::In(in_expr)) = op.predicate else {
        panic!("expected in expression");
    };
    assert_eq!(in_expr.vals.len(), 2);
    assert!(matches!(in_expr.x.as_deref(), Some(Expr::Ident(_))));
}

#[test]
fn test_index_expression() {
    let TabularOperator::Where(op) = single_operator("foo | where arr[0] == 1") else {
        panic!("expected where operator");
    };
    let Some(Expr::Binary(eq)) = op.predicate else {
        panic!("expected == at the top");
    };
    assert!(matches!(eq.x.as_deref(), Some(Expr::Index(_))));
}

#[test]
fn test_dotted_name_is_not_callable() {
    // a.b(x) parses a.b as a qualified identifier; the parenthesis is a
    // trailing-content error, not a call.
    assert!(parse("foo | where a.b(x)").is_err());
}

// ============================================================================
// sort / take / top
// ============================================================================

#[test]
fn test_sort_defaults() {
    let TabularOperator::Sort(op) = single_operator("foo | sort by bar") else {
        panic!("expected sort operator");
    };
    assert_eq!(op.terms.len(), 1);
    let term = &op.terms[0];
    assert!(!term.asc);
    assert!(!term.nulls_first);
    assert!(!term.asc_desc_span.is_valid());
    assert!(!term.nulls_span.is_valid());
}

#[test]
fn test_order_is_sort_alias() {
    assert!(matches!(
        single_operator("foo | order by bar"),
        TabularOperator::Sort(_)
    ));
}

#[test]
fn test_sort_asc_desc() {
    let TabularOperator::Sort(op) =
        single_operator("StormEvents | sort by State asc, StartTime desc")
    else {
        panic!("expected sort operator");
    };
    assert_eq!(op.terms.len(), 2);
    assert!(op.terms[0].asc);
    assert!(op.terms[0].nulls_first);
    assert!(!op.terms[1].asc);
    assert!(!op.terms[1].nulls_first);
}

#[test]
fn test_sort_nulls_first() {
    let TabularOperator::Sort(op) = single_operator("foo | sort by bar nulls first") else {
        panic!("expected sort operator");
    };
    assert!(!op.terms[0].asc);
    assert!(op.terms[0].nulls_first);
    assert!(op.terms[0].nulls_span.is_valid());
}

#[test]
fn test_sort_requires_by() {
    assert!(error_text("foo | sort bar").contains("expected 'by'"));
}

#[test]
fn test_take() {
    let TabularOperator::Take(op) = single_operator("StormEvents | take 5") else {
        panic!("expected take operator");
    };
    let row_count = op.row_count.expect("take should carry a row count");
    assert!(row_count.is_integer());
    assert_eq!(row_count.as_u64(), 5);
}

#[test]
fn test_limit_is_take_alias() {
    assert!(matches!(
        single_operator("StormEvents | limit 5"),
        TabularOperator::Take(_)
    ));
}

#[test]
fn test_take_requires_integer() {
    assert!(error_text("foo | take 3.5").contains("expected integer"));
    assert!(error_text("foo | take x").contains("expected integer"));
}

#[test]
fn test_top() {
    let TabularOperator::Top(op) = single_operator("StormEvents | top 3 by InjuriesDirect")
    else {
        panic!("expected top operator");
    };
    assert_eq!(op.row_count.expect("row count").as_u64(), 3);
    assert!(op.by.is_valid());
    let col = op.col.expect("top should carry a sort term");
    assert!(matches!(col.x, Expr::Ident(_)));
}

// ============================================================================
// project / extend / summarize
// ============================================================================

#[test]
fn test_project_bare_columns() {
    let TabularOperator::Project(op) =
        single_operator("StormEvents | project EventId, State, EventType")
    else {
        panic!("expected project operator");
    };
    let names: Vec<&str> = op.cols.iter().map(|col| col.name.name.as_str()).collect();
    assert_eq!(names, ["EventId", "State", "EventType"]);
    assert!(op.cols.iter().all(|col| col.x.is_none()));
}

#[test]
fn test_project_assignment() {
    let TabularOperator::Project(op) =
        single_operator("StormEvents | project TotalInjuries = InjuriesDirect + InjuriesIndirect")
    else {
        panic!("expected project operator");
    };
    assert_eq!(op.cols.len(), 1);
    assert_eq!(op.cols[0].name.name, "TotalInjuries");
    assert!(op.cols[0].assign.is_valid());
    assert!(matches!(&op.cols[0].x, Some(Expr::Binary(_))));
}

#[test]
fn test_project_missing_comma() {
    assert!(error_text("StormEvents | project EventId=1 State").contains("expected ',' or EOF"));
}

#[test]
fn test_extend_assignment() {
    let TabularOperator::Extend(op) =
        single_operator("StormEvents | extend TotalInjuries = InjuriesDirect + InjuriesIndirect")
    else {
        panic!("expected extend operator");
    };
    assert_eq!(op.cols.len(), 1);
    assert!(op.cols[0].assign.is_valid());
    assert!(op.cols[0].x.is_some());
}

#[test]
fn test_extend_requires_assignment() {
    let message = "expected '=' followed by expression for assignment, got EOF";
    assert!(error_text("StormEvents | extend Foo").contains(message));
    // The same message is used even when the offending token is not EOF.
    assert!(error_text("StormEvents | extend FooFooF=1 State").contains(message));
}

#[test]
fn test_summarize_by_only() {
    let TabularOperator::Summarize(op) =
        single_operator("StormEvents | summarize by State, EventType")
    else {
        panic!("expected summarize operator");
    };
    assert!(op.cols.is_empty());
    assert!(op.by.is_valid());
    assert_eq!(op.group_by.len(), 2);
}

#[test]
fn test_summarize_aggregations_only() {
    let TabularOperator::Summarize(op) =
        single_operator("StormEvents | summarize Min = min(Duration), Max = max(Duration)")
    else {
        panic!("expected summarize operator");
    };
    assert_eq!(op.cols.len(), 2);
    assert!(op.group_by.is_empty());
    // The by span is null iff there are no group-by columns.
    assert!(!op.by.is_valid());
}

#[test]
fn test_summarize_aggregation_with_group_by() {
    let TabularOperator::Summarize(op) =
        single_operator("StormEvents | summarize TypesOfStorms = dcount(EventType) by State")
    else {
        panic!("expected summarize operator");
    };
    assert_eq!(op.cols.len(), 1);
    assert_eq!(
        op.cols[0].name.as_ref().map(|name| name.name.as_str()),
        Some("TypesOfStorms")
    );
    assert_eq!(op.group_by.len(), 1);
}

#[test]
fn test_summarize_unnamed_column() {
    let TabularOperator::Summarize(op) = single_operator("StormEvents | summarize count()")
    else {
        panic!("expected summarize operator");
    };
    assert_eq!(op.cols.len(), 1);
    assert!(op.cols[0].name.is_none());
}

#[test]
fn test_summarize_requires_a_side() {
    assert!(error_text("StormEvents | summarize").contains("expected expression or 'by'"));
    assert!(error_text("StormEvents | summarize and").contains("expected expression or 'by'"));
}

// ============================================================================
// join / as
// ============================================================================

#[test]
fn test_join_default_flavor() {
    let TabularOperator::Join(op) = single_operator("X | join (Y) on Key") else {
        panic!("expected join operator");
    };
    assert!(op.flavor.is_none());
    let right = op.right.expect("join should carry a right-hand expression");
    let TabularDataSource::Table(table) = &right.source;
    assert_eq!(table.table.name, "Y");
    assert_eq!(op.conditions.len(), 1);
    assert!(matches!(&op.conditions[0], Expr::Ident(_)));
}

#[test]
fn test_join_leftouter() {
    let TabularOperator::Join(op) = single_operator("X | join kind=leftouter (Y) on Key")
    else {
        panic!("expected join operator");
    };
    assert_eq!(op.flavor.expect("flavor").name, "leftouter");
}

#[test]
fn test_join_unknown_flavor() {
    let text = error_text("X | join kind=salt (Y) on Key");
    assert!(text.contains("expected join flavor (one of inner, innerunique, leftouter)"));
}

#[test]
fn test_join_nested_pipeline() {
    let TabularOperator::Join(op) = single_operator("X | join (Y | where z == 5) on Key")
    else {
        panic!("expected join operator");
    };
    let right = op.right.expect("right-hand expression");
    assert_eq!(right.operators.len(), 1);
    assert!(matches!(right.operators[0], TabularOperator::Where(_)));
}

#[test]
fn test_join_explicit_condition() {
    let TabularOperator::Join(op) =
        single_operator("X | join (Y) on $left.Key == $right.Key")
    else {
        panic!("expected join operator");
    };
    let Expr::Binary(eq) = &op.conditions[0] else {
        panic!("expected == condition");
    };
    assert_eq!(eq.op, TokenKind::Eq);
    let Some(Expr::Ident(left)) = eq.x.as_deref() else {
        panic!("expected qualified identifier");
    };
    assert_eq!(left.parts.len(), 2);
    assert_eq!(left.parts[0].name, "$left");
}

#[test]
fn test_join_then_count() {
    let ops = operators("X | join (Y) on Key | count");
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[1], TabularOperator::Count(_)));
}

#[test]
fn test_as_operator() {
    let TabularOperator::As(op) = single_operator("X | as Y") else {
        panic!("expected as operator");
    };
    assert_eq!(op.name.expect("name").name, "Y");
}

// ============================================================================
// Error recovery
// ============================================================================

#[test]
fn test_missing_operator_name() {
    assert!(error_text("X |").contains("missing operator name after pipe"));
}

#[test]
fn test_unknown_operator() {
    assert!(error_text("X | xyzzy").contains("unknown operator name"));
}

#[test]
fn test_unknown_operator_does_not_cascade() {
    // The unknown operator is bounded by the next pipe; the trailing
    // count still parses, so its error list names only the bad stage.
    let err = parse("X | xyzzy (Y | Z) | count").expect_err("xyzzy should error");
    assert!(err.to_string().contains("unknown operator name"));
    assert!(!err.to_string().contains("count"));
}

#[test]
fn test_error_position_prefix() {
    let text = error_text("StormEvents | take abc");
    assert!(
        text.starts_with("parse pipeline query language: 1:20:"),
        "unexpected error text: {}",
        text
    );
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_let_then_tabular() {
    let statements =
        parse_statements("let min_damage = 500; StormEvents | where DamageProperty > min_damage")
            .unwrap();
    assert_eq!(statements.len(), 2);
    let Statement::Let(stmt) = &statements[0] else {
        panic!("expected let statement");
    };
    assert_eq!(stmt.name.name, "min_damage");
    assert!(matches!(&stmt.x, Some(Expr::Literal(_))));
    assert!(matches!(&statements[1], Statement::Tabular(_)));
}

#[test]
fn test_trailing_semicolon() {
    let statements = parse_statements("foo | count;").unwrap();
    assert_eq!(statements.len(), 1);
}

#[test]
fn test_let_requires_assignment() {
    assert!(parse_statements("let foo 5; bar").is_err());
}
