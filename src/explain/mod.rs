//! Human-readable `EXPLAIN` rendering of a logical query plan.

pub mod sql;

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::logical::expr::{AggregateOp, ComparisonOp, LogicalExpr, LogicalOpKind, ScalarOpKind};
use crate::logical::plan::{JoinType, LogicalPlanNode};
use crate::planner::LogicalQueryPlan;

/// Options controlling `explain_plan`'s verbosity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainOptions {
    /// Include attribute lists and column sets on scan/aggregate nodes.
    pub verbose: bool,
    /// Include a per-metric dependency summary below the tree.
    pub show_expressions: bool,
}

fn describe_expr(expr: &LogicalExpr) -> String {
    match expr {
        LogicalExpr::Constant { value, .. } => value.to_string(),
        LogicalExpr::AttributeRef { attribute_id, .. } => attribute_id.clone(),
        LogicalExpr::MetricRef { metric_name, .. } => metric_name.clone(),
        LogicalExpr::Aggregate { op, input, distinct, .. } => {
            let name = aggregate_name(*op);
            if *distinct {
                format!("{name}(distinct {})", describe_expr(input))
            } else {
                format!("{name}({})", describe_expr(input))
            }
        }
        LogicalExpr::ScalarOp { op, left, right, .. } => {
            format!("({} {} {})", describe_expr(left), scalar_op_symbol(*op), describe_expr(right))
        }
        LogicalExpr::ScalarFunction { func, args, .. } => {
            format!("{func}({})", args.iter().map(describe_expr).collect::<Vec<_>>().join(", "))
        }
        LogicalExpr::Conditional {
            condition,
            then_branch,
            else_branch,
            ..
        } => format!(
            "if {} then {} else {}",
            describe_expr(condition),
            describe_expr(then_branch),
            describe_expr(else_branch)
        ),
        LogicalExpr::Coalesce { args, .. } => {
            format!("coalesce({})", args.iter().map(describe_expr).collect::<Vec<_>>().join(", "))
        }
        LogicalExpr::Comparison { op, left, right } => {
            format!("{} {} {}", describe_expr(left), comparison_symbol(*op), describe_expr(right))
        }
        LogicalExpr::LogicalOp { op, operands } => match op {
            LogicalOpKind::Not => format!("not {}", describe_expr(&operands[0])),
            LogicalOpKind::And => operands.iter().map(describe_expr).collect::<Vec<_>>().join(" and "),
            LogicalOpKind::Or => operands.iter().map(describe_expr).collect::<Vec<_>>().join(" or "),
        },
        LogicalExpr::InList { expr, list, negated } => {
            let items = list.iter().map(describe_expr).collect::<Vec<_>>().join(", ");
            let not = if *negated { "not " } else { "" };
            format!("{} {not}in ({items})", describe_expr(expr))
        }
        LogicalExpr::Between { expr, low, high, negated } => {
            let not = if *negated { "not " } else { "" };
            format!("{} {not}between {} and {}", describe_expr(expr), describe_expr(low), describe_expr(high))
        }
        LogicalExpr::IsNull { expr, negated } => {
            let suffix = if *negated { "is not null" } else { "is null" };
            format!("{} {suffix}", describe_expr(expr))
        }
    }
}

fn aggregate_name(op: AggregateOp) -> &'static str {
    match op {
        AggregateOp::Sum => "sum",
        AggregateOp::Avg => "avg",
        AggregateOp::Min => "min",
        AggregateOp::Max => "max",
        AggregateOp::Count => "count",
        AggregateOp::CountDistinct => "count_distinct",
    }
}

fn scalar_op_symbol(op: ScalarOpKind) -> &'static str {
    match op {
        ScalarOpKind::Add => "+",
        ScalarOpKind::Sub => "-",
        ScalarOpKind::Mul => "*",
        ScalarOpKind::Div => "/",
        ScalarOpKind::Mod => "%",
        ScalarOpKind::Pow => "^",
    }
}

fn comparison_symbol(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "==",
        ComparisonOp::Ne => "!=",
        ComparisonOp::Lt => "<",
        ComparisonOp::Le => "<=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Ge => ">=",
    }
}

fn join_type_name(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "inner",
        JoinType::Left => "left",
        JoinType::Right => "right",
        JoinType::Full => "full",
    }
}

fn node_header(node: &LogicalPlanNode, options: ExplainOptions) -> String {
    match node {
        LogicalPlanNode::FactScan {
            table,
            required_columns,
            inline_filters,
            ..
        }
        | LogicalPlanNode::DimensionScan {
            table,
            required_columns,
            inline_filters,
            ..
        } => {
            let kind = if matches!(node, LogicalPlanNode::FactScan { .. }) {
                "FactScan"
            } else {
                "DimensionScan"
            };
            let mut s = format!("{kind} [{table}]");
            if options.verbose {
                let _ = write!(s, " columns=[{}]", required_columns.join(", "));
            }
            if !inline_filters.is_empty() {
                let preds = inline_filters.iter().map(describe_expr).collect::<Vec<_>>().join(" and ");
                let _ = write!(s, " inline_filter=({preds})");
            }
            s
        }
        LogicalPlanNode::Join {
            join_type,
            join_keys,
            cardinality,
            ..
        } => {
            let keys = join_keys
                .iter()
                .map(|(l, r)| format!("{l}={r}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Join [{} {:?}] on ({keys})", join_type_name(*join_type), cardinality)
        }
        LogicalPlanNode::Filter { predicate, .. } => format!("Filter [{}]", describe_expr(predicate)),
        LogicalPlanNode::Aggregate {
            group_by, aggregates, ..
        } => {
            let aggs = aggregates
                .iter()
                .map(|a| format!("{}={}", a.output_name, describe_expr(&a.expr)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Aggregate group_by=[{}] aggregates=[{aggs}]", group_by.join(", "))
        }
        LogicalPlanNode::Window {
            partition_by,
            order_by,
            frame,
            window_functions,
            ..
        } => {
            let funcs = window_functions
                .iter()
                .map(|w| format!("{}={}", w.output_name, describe_expr(&w.expr)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Window partition_by=[{}] order_by=[{}] frame={:?} functions=[{funcs}]",
                partition_by.join(", "),
                order_by.join(", "),
                frame
            )
        }
        LogicalPlanNode::Transform {
            transform_kind,
            transform_id,
            input_attr,
            output_attr,
            ..
        } => format!("Transform [{transform_id}] kind={transform_kind:?} {input_attr}->{output_attr}"),
        LogicalPlanNode::Project { outputs, .. } => {
            let cols = outputs
                .iter()
                .map(|o| format!("{}={}", o.name, describe_expr(&o.expr)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Project [{cols}]")
        }
    }
}

fn write_node(
    out: &mut String,
    plan: &LogicalQueryPlan,
    node_id: &str,
    depth: usize,
    visited: &mut HashSet<String>,
    options: ExplainOptions,
) {
    let indent = "  ".repeat(depth);
    let node = &plan.nodes[node_id];

    if !visited.insert(node_id.to_string()) {
        let _ = writeln!(out, "{indent}[{node_id}] (see above)");
        return;
    }

    let _ = writeln!(out, "{indent}{} [{node_id}]", node_header(node, options));
    for input_id in node.input_ids() {
        write_node(out, plan, input_id, depth + 1, visited, options);
    }
}

/// Render `plan` as a depth-first, indented `EXPLAIN` tree. Revisited DAG
/// nodes (shared sub-plans) are rendered as `(see above)` rather than
/// re-printed.
pub fn explain_plan(plan: &LogicalQueryPlan, options: ExplainOptions) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    write_node(&mut out, plan, &plan.root_node_id, 0, &mut visited, options);

    if options.show_expressions {
        let _ = writeln!(out);
        let _ = writeln!(out, "metrics:");
        for metric in &plan.output_metrics {
            let deps = if metric.dependencies.is_empty() {
                "none".to_string()
            } else {
                metric.dependencies.join(", ")
            };
            let _ = writeln!(
                out,
                "  {} (phase {}) depends_on=[{deps}] expr={}",
                metric.name,
                metric.execution_phase,
                describe_expr(&metric.expr)
            );
        }
    }

    out
}
