//! End-to-end logical-plan-building scenarios: unknown references,
//! metric dependency ordering, and cycle detection.

use metrisql::dsl::ast::{ArithOp, MetricExpr};
use metrisql::dsl::span::Spanned;
use metrisql::model::SemanticModelBuilder;
use metrisql::planner::{build_logical_plan, PlanBuilderOptions, PlanError, QuerySpec};
use metrisql::transform::{self, TransformOptions, TransformationError};

fn sum_amount() -> MetricExpr {
    MetricExpr::Call(
        Spanned::new("sum".into(), 0..0),
        vec![Spanned::new(MetricExpr::AttrRef("amount".into()), 0..0)],
    )
}

fn base_model() -> metrisql::model::SemanticModel {
    SemanticModelBuilder::new()
        .fact("sales", "sales")
        .attribute("amount", "sales", None)
        .metric("total_sales", Some("sales".to_string()), sum_amount())
        .build()
        .unwrap()
}

#[test]
fn unknown_attribute_reference_is_rejected_by_the_transform() {
    let model = base_model();
    let err = transform::syntax_to_logical(
        &MetricExpr::AttrRef("foo".into()),
        &model,
        None,
        TransformOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err, TransformationError::UnknownAttribute("foo".to_string()));
    assert!(err.to_string().contains("foo"));
}

#[test]
fn unknown_dimension_aborts_plan_construction() {
    let model = base_model();
    let query = QuerySpec {
        dimensions: vec!["foo".to_string()],
        metrics: vec!["total_sales".to_string()],
        where_clause: None,
        having: None,
    };
    let err = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap_err();
    assert!(matches!(err, PlanError::UnknownDimension(ref d) if d == "foo"));
}

#[test]
fn derived_metric_dependencies_resolve_to_a_topological_phase_order() {
    let model = SemanticModelBuilder::new()
        .fact("sales", "sales")
        .dimension("regions", "regions")
        .attribute("amount", "sales", None)
        .attribute("region_name", "regions", Some("name".to_string()))
        .attribute("region_id", "sales", None)
        .join("sales", "regions", "region_id", "region_id")
        .metric("total_sales", Some("sales".to_string()), sum_amount())
        .metric(
            "order_count",
            Some("sales".to_string()),
            MetricExpr::Call(
                Spanned::new("count".into(), 0..0),
                vec![Spanned::new(MetricExpr::AttrRef("*".into()), 0..0)],
            ),
        )
        .metric(
            "avg_ticket",
            None,
            MetricExpr::BinaryOp(
                ArithOp::Div,
                Box::new(Spanned::new(MetricExpr::MetricRef("total_sales".into()), 0..0)),
                Box::new(Spanned::new(MetricExpr::MetricRef("order_count".into()), 0..0)),
            ),
        )
        .build()
        .unwrap();

    let query = QuerySpec {
        dimensions: vec!["region_name".to_string()],
        metrics: vec![
            "total_sales".to_string(),
            "order_count".to_string(),
            "avg_ticket".to_string(),
        ],
        where_clause: None,
        having: None,
    };
    let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();

    assert_eq!(
        plan.metric_eval_order,
        vec!["total_sales".to_string(), "order_count".to_string(), "avg_ticket".to_string()]
    );
    for name in ["total_sales", "order_count"] {
        let m = plan.output_metrics.iter().find(|m| m.name == name).unwrap();
        assert_eq!(m.execution_phase, 0);
    }
    let avg_ticket = plan.output_metrics.iter().find(|m| m.name == "avg_ticket").unwrap();
    assert_eq!(avg_ticket.execution_phase, 1);
}

#[test]
fn circular_metric_dependencies_are_rejected() {
    let model = SemanticModelBuilder::new()
        .fact("sales", "sales")
        .attribute("amount", "sales", None)
        .metric(
            "a",
            None,
            MetricExpr::BinaryOp(
                ArithOp::Add,
                Box::new(Spanned::new(MetricExpr::MetricRef("b".into()), 0..0)),
                Box::new(Spanned::new(MetricExpr::Literal(1.0), 0..0)),
            ),
        )
        .metric(
            "b",
            None,
            MetricExpr::BinaryOp(
                ArithOp::Add,
                Box::new(Spanned::new(MetricExpr::MetricRef("a".into()), 0..0)),
                Box::new(Spanned::new(MetricExpr::Literal(1.0), 0..0)),
            ),
        )
        .build()
        .unwrap();

    let query = QuerySpec {
        dimensions: vec![],
        metrics: vec!["a".to_string(), "b".to_string()],
        where_clause: None,
        having: None,
    };
    let err = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap_err();
    match err {
        PlanError::Cycle(cycle_err) => {
            assert!(cycle_err.cycle.contains(&"a".to_string()));
            assert!(cycle_err.cycle.contains(&"b".to_string()));
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}
