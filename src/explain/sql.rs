//! Best-effort SQL rendering of a logical query plan. Targets a single
//! ANSI-ish dialect (double-quoted identifiers, single-quote-doubled
//! string literals) and does not claim broader dialect compatibility.

use crate::logical::expr::{AggregateOp, ComparisonOp, LogicalExpr, LogicalOpKind, ScalarOpKind};
use crate::logical::plan::LogicalPlanNode;
use crate::planner::LogicalQueryPlan;
use crate::value::Value;

fn quote_ident(name: &str) -> String {
    format!("\"{name}\"")
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn value_literal(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Str(s) => quote_string(s),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Null | Value::Undefined => "NULL".to_string(),
    }
}

fn aggregate_sql(op: AggregateOp) -> &'static str {
    match op {
        AggregateOp::Sum => "SUM",
        AggregateOp::Avg => "AVG",
        AggregateOp::Min => "MIN",
        AggregateOp::Max => "MAX",
        AggregateOp::Count | AggregateOp::CountDistinct => "COUNT",
    }
}

fn scalar_op_sql(op: ScalarOpKind) -> &'static str {
    match op {
        ScalarOpKind::Add => "+",
        ScalarOpKind::Sub => "-",
        ScalarOpKind::Mul => "*",
        ScalarOpKind::Div => "/",
        ScalarOpKind::Mod => "%",
        ScalarOpKind::Pow => "^",
    }
}

fn comparison_sql(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "=",
        ComparisonOp::Ne => "<>",
        ComparisonOp::Lt => "<",
        ComparisonOp::Le => "<=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Ge => ">=",
    }
}

/// Render a single `LogicalExpr` to SQL text.
fn expr_to_sql(expr: &LogicalExpr) -> String {
    match expr {
        LogicalExpr::Constant { value, .. } => value_literal(value),
        LogicalExpr::AttributeRef { attribute_id, .. } => quote_ident(attribute_id),
        LogicalExpr::MetricRef { metric_name, .. } => quote_ident(metric_name),
        LogicalExpr::Aggregate { op, input, distinct, .. } => {
            if matches!(op, AggregateOp::Count) && matches!(input.as_ref(), LogicalExpr::AttributeRef { attribute_id, .. } if attribute_id == "*")
            {
                "COUNT(*)".to_string()
            } else if *distinct {
                format!("{}(DISTINCT {})", aggregate_sql(*op), expr_to_sql(input))
            } else {
                format!("{}({})", aggregate_sql(*op), expr_to_sql(input))
            }
        }
        LogicalExpr::ScalarOp { op, left, right, .. } => {
            format!("({} {} {})", expr_to_sql(left), scalar_op_sql(*op), expr_to_sql(right))
        }
        LogicalExpr::ScalarFunction { func, args, .. } => {
            format!("{}({})", func.to_uppercase(), args.iter().map(expr_to_sql).collect::<Vec<_>>().join(", "))
        }
        LogicalExpr::Conditional {
            condition,
            then_branch,
            else_branch,
            ..
        } => format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            expr_to_sql(condition),
            expr_to_sql(then_branch),
            expr_to_sql(else_branch)
        ),
        LogicalExpr::Coalesce { args, .. } => {
            format!("COALESCE({})", args.iter().map(expr_to_sql).collect::<Vec<_>>().join(", "))
        }
        LogicalExpr::Comparison { op, left, right } => {
            format!("{} {} {}", expr_to_sql(left), comparison_sql(*op), expr_to_sql(right))
        }
        LogicalExpr::LogicalOp { op, operands } => match op {
            LogicalOpKind::Not => format!("NOT {}", expr_to_sql(&operands[0])),
            LogicalOpKind::And => format!(
                "({})",
                operands.iter().map(expr_to_sql).collect::<Vec<_>>().join(" AND ")
            ),
            LogicalOpKind::Or => format!(
                "({})",
                operands.iter().map(expr_to_sql).collect::<Vec<_>>().join(" OR ")
            ),
        },
        LogicalExpr::InList { expr, list, negated } => {
            let items = list.iter().map(expr_to_sql).collect::<Vec<_>>().join(", ");
            let not = if *negated { "NOT " } else { "" };
            format!("{} {not}IN ({items})", expr_to_sql(expr))
        }
        LogicalExpr::Between { expr, low, high, negated } => {
            let not = if *negated { "NOT " } else { "" };
            format!("{} {not}BETWEEN {} AND {}", expr_to_sql(expr), expr_to_sql(low), expr_to_sql(high))
        }
        LogicalExpr::IsNull { expr, negated } => {
            let suffix = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {suffix}", expr_to_sql(expr))
        }
    }
}

/// Walk the DAG from `node_id`, emitting `FROM`/`JOIN` clauses and
/// collecting filter predicates, classifying each as `WHERE` (below the
/// aggregate) or `HAVING` (above it) depending on whether an `Aggregate`
/// node is present in its own input subtree. Returns `(from_clause,
/// where_preds, having_preds, contains_aggregate)`.
fn walk_from(plan: &LogicalQueryPlan, node_id: &str) -> (String, Vec<String>, Vec<String>, bool) {
    match &plan.nodes[node_id] {
        LogicalPlanNode::FactScan { table, .. } | LogicalPlanNode::DimensionScan { table, .. } => {
            (quote_ident(table), Vec::new(), Vec::new(), false)
        }
        LogicalPlanNode::Join {
            left_input_id,
            right_input_id,
            join_keys,
            ..
        } => {
            let (left_from, left_where, left_having, left_agg) = walk_from(plan, left_input_id);
            let (right_from, right_where, right_having, right_agg) = walk_from(plan, right_input_id);
            let on = join_keys
                .iter()
                .map(|(l, r)| format!("{} = {}", quote_ident(l), quote_ident(r)))
                .collect::<Vec<_>>()
                .join(" AND ");
            let mut where_preds = left_where;
            where_preds.extend(right_where);
            let mut having_preds = left_having;
            having_preds.extend(right_having);
            (
                format!("{left_from} JOIN {right_from} ON {on}"),
                where_preds,
                having_preds,
                left_agg || right_agg,
            )
        }
        LogicalPlanNode::Filter { input_id, predicate } => {
            let (from, mut where_preds, mut having_preds, contains_agg) = walk_from(plan, input_id);
            if contains_agg {
                having_preds.push(expr_to_sql(predicate));
            } else {
                where_preds.push(expr_to_sql(predicate));
            }
            (from, where_preds, having_preds, contains_agg)
        }
        LogicalPlanNode::Aggregate { input_id, .. } => {
            let (from, where_preds, having_preds, _) = walk_from(plan, input_id);
            (from, where_preds, having_preds, true)
        }
        LogicalPlanNode::Window { input_id, .. }
        | LogicalPlanNode::Transform { input_id, .. }
        | LogicalPlanNode::Project { input_id, .. } => walk_from(plan, input_id),
    }
}

/// Render `plan` as a single SQL `SELECT` statement: dimension ids and
/// metric expressions projected, `FROM`/`JOIN` walked from the DAG,
/// pre-aggregate filters as `WHERE`, post-aggregate/`having` filters as
/// `HAVING`, and `GROUP BY` on the output dimensions.
pub fn plan_to_sql(plan: &LogicalQueryPlan) -> String {
    let mut select_items: Vec<String> = plan
        .output_grain
        .dimensions
        .iter()
        .map(|d| quote_ident(d))
        .collect();
    select_items.extend(
        plan.output_metrics
            .iter()
            .map(|m| format!("{} AS {}", expr_to_sql(&m.expr), quote_ident(&m.name))),
    );

    let (from_clause, where_preds, having_preds, _) = walk_from(plan, &plan.root_node_id);

    let mut sql = format!("SELECT {}\nFROM {from_clause}", select_items.join(", "));
    if !where_preds.is_empty() {
        sql.push_str(&format!("\nWHERE {}", where_preds.join(" AND ")));
    }
    if !plan.output_grain.dimensions.is_empty() {
        let group_by = plan
            .output_grain
            .dimensions
            .iter()
            .map(|d| quote_ident(d))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!("\nGROUP BY {group_by}"));
    }
    if !having_preds.is_empty() {
        sql.push_str(&format!("\nHAVING {}", having_preds.join(" AND ")));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::{CmpOp, LiteralValue, MetricExpr};
    use crate::dsl::ast::BoolExpr;
    use crate::dsl::span::Spanned;
    use crate::model::SemanticModelBuilder;
    use crate::planner::{build_logical_plan, PlanBuilderOptions, QuerySpec};

    fn model() -> crate::model::SemanticModel {
        SemanticModelBuilder::new()
            .fact("sales", "sales")
            .dimension("regions", "regions")
            .attribute("amount", "sales", None)
            .attribute("region_id", "sales", None)
            .attribute("region_name", "regions", Some("name".to_string()))
            .join("sales", "regions", "region_id", "region_id")
            .metric(
                "total_revenue",
                Some("sales".to_string()),
                MetricExpr::Call(
                    Spanned::new("sum".into(), 0..0),
                    vec![Spanned::new(MetricExpr::AttrRef("amount".into()), 0..0)],
                ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_to_sql_basic_shape() {
        let model = model();
        let query = QuerySpec {
            dimensions: vec!["region_name".to_string()],
            metrics: vec!["total_revenue".to_string()],
            where_clause: None,
            having: None,
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        let sql = plan_to_sql(&plan);
        assert!(sql.starts_with("SELECT \"region_name\", SUM(\"amount\") AS \"total_revenue\""));
        assert!(sql.contains("JOIN"));
        assert!(sql.contains("GROUP BY \"region_name\""));
    }

    #[test]
    fn test_plan_to_sql_where_and_having() {
        let model = model();
        let query = QuerySpec {
            dimensions: vec!["region_name".to_string()],
            metrics: vec!["total_revenue".to_string()],
            where_clause: Some(BoolExpr::Compare {
                ident: Spanned::new("amount".into(), 0..0),
                op: CmpOp::Gt,
                literal: Spanned::new(LiteralValue::Number(40.0), 0..0),
            }),
            having: Some(BoolExpr::Compare {
                ident: Spanned::new("total_revenue".into(), 0..0),
                op: CmpOp::Gt,
                literal: Spanned::new(LiteralValue::Number(100.0), 0..0),
            }),
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        let sql = plan_to_sql(&plan);
        assert!(sql.contains("WHERE \"amount\" > 40"));
        assert!(sql.contains("HAVING \"total_revenue\" > 100"));
    }

    #[test]
    fn test_not_equal_translates_to_angle_brackets() {
        let expr = LogicalExpr::Comparison {
            op: ComparisonOp::Ne,
            left: Box::new(LogicalExpr::constant(Value::Number(1.0))),
            right: Box::new(LogicalExpr::constant(Value::Number(2.0))),
        };
        assert_eq!(expr_to_sql(&expr), "1 <> 2");
    }

    #[test]
    fn test_string_literal_doubles_quotes() {
        assert_eq!(quote_string("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_plan_to_sql_snapshot() {
        use insta::assert_snapshot;

        let model = model();
        let query = QuerySpec {
            dimensions: vec!["region_name".to_string()],
            metrics: vec!["total_revenue".to_string()],
            where_clause: Some(BoolExpr::Compare {
                ident: Spanned::new("amount".into(), 0..0),
                op: CmpOp::Gt,
                literal: Spanned::new(LiteralValue::Number(40.0), 0..0),
            }),
            having: None,
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        assert_snapshot!(plan_to_sql(&plan));
    }
}
