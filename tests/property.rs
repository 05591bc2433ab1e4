// tests/property.rs

use pqlc::ast::TabularOperator;
use pqlc::{compile, parse, scan};
use proptest::prelude::*;

/// Identifiers that cannot stand alone as plain column or table
/// references.
fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "in" | "by" | "let" | "true" | "false" | "null"
    )
}

fn arb_ident() -> impl Strategy<Value = String> {
    "[A-Za-z_][0-9A-Za-z_]{0,8}".prop_filter("reserved word", |name| !is_reserved(name))
}

proptest! {
    #[test]
    fn scan_spans_are_contained(source in ".*") {
        for token in scan(&source) {
            prop_assert!(token.span.is_valid(), "invalid span {}", token.span);
            prop_assert!(token.span.end as usize <= source.len());
        }
    }

    #[test]
    fn take_row_count_roundtrips(n in 0u64..(1 << 63)) {
        let expr = parse(&format!("T | take {}", n)).expect("take should parse");
        let TabularOperator::Take(op) = &expr.operators[0] else {
            panic!("expected take operator");
        };
        let row_count = op.row_count.as_ref().expect("row count");
        prop_assert!(row_count.is_integer());
        prop_assert_eq!(row_count.as_u64(), n);
    }

    #[test]
    fn identifier_quoting_roundtrips(table in arb_ident(), column in arb_ident()) {
        let sql = compile(&format!("{} | project {}", table, column))
            .expect("projection should compile");
        let quoted_table = format!("\"{}\"", table);
        let quoted_column = format!("\"{}\"", column);
        prop_assert!(sql.contains(&quoted_table));
        prop_assert!(sql.contains(&quoted_column));
    }

    #[test]
    fn string_literals_roundtrip(value in "[ 0-9A-Za-z]{0,20}") {
        let sql = compile(&format!("T | where x == \"{}\"", value))
            .expect("comparison should compile");
        let quoted_value = format!("'{}'", value);
        prop_assert!(sql.contains(&quoted_value));
    }

    #[test]
    fn compile_is_deterministic_and_single_statement(
        table in arb_ident(),
        column in arb_ident(),
        threshold in 0u32..1000,
        limit in 1u32..100,
    ) {
        let query = format!(
            "{} | where {} > {} | sort by {} | take {}",
            table, column, threshold, column, limit
        );
        let first = compile(&query).expect("query should compile");
        let second = compile(&query).expect("query should compile");
        prop_assert_eq!(&first, &second);
        prop_assert!(first.starts_with("WITH ") || first.starts_with("SELECT "));
        prop_assert!(first.ends_with(';'));
        // A single statement: the only semicolon is the terminator.
        prop_assert_eq!(first.matches(';').count(), 1);
    }
}
