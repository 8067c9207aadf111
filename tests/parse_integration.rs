//! End-to-end DSL parsing scenarios.

use metrisql::dsl::ast::{Item, MetricExpr};
use metrisql::dsl::parse;

#[test]
fn parses_a_single_metric_declaration() {
    let result = parse("metric total_sales on sales = sum(amount)");
    assert!(result.errors.is_empty());
    assert_eq!(result.program.items.len(), 1);

    let Item::Metric(decl) = &result.program.items[0].value else {
        panic!("expected a metric declaration");
    };
    assert_eq!(decl.name.value, "total_sales");
    assert_eq!(decl.base_fact.value, "sales");
    match &decl.expr.value {
        MetricExpr::Call(name, args) => {
            assert_eq!(name.value, "sum");
            assert_eq!(args.len(), 1);
            assert!(matches!(&args[0].value, MetricExpr::AttrRef(a) if a == "amount"));
        }
        other => panic!("expected a call expression, got {other:?}"),
    }
}

#[test]
fn parses_a_query_with_dimensions_metrics_where_and_having() {
    let source = r#"
        query revenue_by_region {
            dimensions: region_name
            metrics: total_revenue
            where: amount > 40
            having: total_revenue > 100
        }
    "#;
    let result = parse(source);
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.program.items.len(), 1);

    let Item::Query(decl) = &result.program.items[0].value else {
        panic!("expected a query declaration");
    };
    assert_eq!(decl.name.value, "revenue_by_region");
    assert_eq!(decl.dimensions.len(), 1);
    assert_eq!(decl.metrics.len(), 1);
    assert!(decl.where_clause.is_some());
    assert!(decl.having.is_some());
}

#[test]
fn malformed_declaration_reports_a_located_error() {
    let result = parse("metric on sales = sum(amount)");
    assert!(!result.errors.is_empty());
    assert!(result.errors[0].line >= 1);
}
