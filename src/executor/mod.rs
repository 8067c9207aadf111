//! The plan executor: groups rows, evaluates metric phases, applies
//! pre/post predicates, and returns result rows.

pub mod aggregate;

use std::collections::HashMap;
use std::time::Duration;

use crate::logical::expr::{ComparisonOp, LogicalExpr, LogicalOpKind, ScalarOpKind};
use crate::logical::plan::LogicalPlanNode;
use crate::model::SemanticModel;
use crate::planner::LogicalQueryPlan;
use crate::transform::{self, TransformOptions};
use crate::value::Value;

/// A single row: a mapping from column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub HashMap<String, Value>);

impl Row {
    pub fn get(&self, column: &str) -> Value {
        self.0.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn merged_with(&self, other: &Row) -> Row {
        let mut merged = self.0.clone();
        merged.extend(other.0.clone());
        Row(merged)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Row(iter.into_iter().collect())
    }
}

/// An ordered collection of rows for one physical table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rows: Vec<Row>,
}

/// The full set of in-memory tables supplied to a query at execution
/// time. Never retained by the plan.
#[derive(Debug, Clone, Default)]
pub struct Tables(pub HashMap<String, Table>);

impl Tables {
    pub fn get(&self, table: &str) -> &[Row] {
        self.0.get(table).map(|t| t.rows.as_slice()).unwrap_or(&[])
    }
}

/// An error aborting the top-level execution pipeline. Per-row/per-group
/// evaluation failures are contained (they surface as `Value::Undefined`
/// in a result row); this type is reserved for pipeline-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("unknown metric referenced at execution time: {0:?}")]
    UnknownMetric(String),
}

/// The result of running a query: output columns (dimensions then
/// metrics, in declared order), result rows, timing, and an optional
/// top-level error.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub execution_time: Duration,
    pub error: Option<String>,
}

fn is_truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// Type mismatches yield `false` rather than an error.
fn compare(op: ComparisonOp, left: &Value, right: &Value) -> bool {
    if let (Value::Number(l), Value::Number(r)) = (left, right) {
        return match op {
            ComparisonOp::Eq => l == r,
            ComparisonOp::Ne => l != r,
            ComparisonOp::Lt => l < r,
            ComparisonOp::Le => l <= r,
            ComparisonOp::Gt => l > r,
            ComparisonOp::Ge => l >= r,
        };
    }
    if let (Value::Str(l), Value::Str(r)) = (left, right) {
        return match op {
            ComparisonOp::Eq => l == r,
            ComparisonOp::Ne => l != r,
            ComparisonOp::Lt => l < r,
            ComparisonOp::Le => l <= r,
            ComparisonOp::Gt => l > r,
            ComparisonOp::Ge => l >= r,
        };
    }
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        return match op {
            ComparisonOp::Eq => l == r,
            ComparisonOp::Ne => l != r,
            _ => false,
        };
    }
    false
}

/// Division by zero yields `Undefined`, not infinity. Any `Undefined`
/// operand propagates.
fn apply_scalar_op(op: ScalarOpKind, left: Value, right: Value) -> Value {
    if matches!(left, Value::Undefined) || matches!(right, Value::Undefined) {
        return Value::Undefined;
    }
    let (Some(l), Some(r)) = (left.as_number(), right.as_number()) else {
        return Value::Undefined;
    };
    match op {
        ScalarOpKind::Add => Value::Number(l + r),
        ScalarOpKind::Sub => Value::Number(l - r),
        ScalarOpKind::Mul => Value::Number(l * r),
        ScalarOpKind::Div => {
            if r == 0.0 {
                Value::Undefined
            } else {
                Value::Number(l / r)
            }
        }
        ScalarOpKind::Mod => {
            if r == 0.0 {
                Value::Undefined
            } else {
                Value::Number(l % r)
            }
        }
        ScalarOpKind::Pow => Value::Number(l.powf(r)),
    }
}

/// Evaluate an expression against a single row. Valid for pre-aggregate
/// predicates (whose leaves are `AttributeRef`s) and for post-aggregate
/// predicates evaluated against already-aggregated result rows (whose
/// leaves are `MetricRef`s resolved by column name).
pub fn eval_row(expr: &LogicalExpr, row: &Row) -> Value {
    match expr {
        LogicalExpr::Constant { value, .. } => value.clone(),
        LogicalExpr::AttributeRef { physical_column, .. } => row.get(physical_column),
        LogicalExpr::MetricRef { metric_name, .. } => row.get(metric_name),
        LogicalExpr::Aggregate { .. } => Value::Undefined,
        LogicalExpr::ScalarOp { op, left, right, .. } => {
            apply_scalar_op(*op, eval_row(left, row), eval_row(right, row))
        }
        LogicalExpr::ScalarFunction { .. } => Value::Undefined,
        LogicalExpr::Conditional {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            if is_truthy(&eval_row(condition, row)) {
                eval_row(then_branch, row)
            } else {
                eval_row(else_branch, row)
            }
        }
        LogicalExpr::Coalesce { args, .. } => args
            .iter()
            .map(|a| eval_row(a, row))
            .find(|v| !matches!(v, Value::Null | Value::Undefined))
            .unwrap_or(Value::Null),
        LogicalExpr::Comparison { op, left, right } => {
            Value::Bool(compare(*op, &eval_row(left, row), &eval_row(right, row)))
        }
        LogicalExpr::LogicalOp { op, operands } => eval_logical_op(*op, operands, |e| eval_row(e, row)),
        LogicalExpr::InList { expr, list, negated } => {
            let v = eval_row(expr, row);
            let found = list.iter().any(|l| values_equal(&eval_row(l, row), &v));
            Value::Bool(found != *negated)
        }
        LogicalExpr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = eval_row(expr, row);
            let within = matches!((&v, &eval_row(low, row), &eval_row(high, row)),
                (Value::Number(x), Value::Number(lo), Value::Number(hi)) if x >= lo && x <= hi);
            Value::Bool(within != *negated)
        }
        LogicalExpr::IsNull { expr, negated } => {
            let is_null = matches!(eval_row(expr, row), Value::Null);
            Value::Bool(is_null != *negated)
        }
    }
}

fn eval_logical_op(op: LogicalOpKind, operands: &[LogicalExpr], mut eval: impl FnMut(&LogicalExpr) -> Value) -> Value {
    match op {
        LogicalOpKind::Not => Value::Bool(!is_truthy(&eval(&operands[0]))),
        LogicalOpKind::And => Value::Bool(operands.iter().all(|o| is_truthy(&eval(o)))),
        LogicalOpKind::Or => Value::Bool(operands.iter().any(|o| is_truthy(&eval(o)))),
    }
}

/// Evaluates metric expressions for a single group, memoizing each
/// metric by name. Dropped at group exit; never shared across groups.
struct GroupEvaluator<'a> {
    rows: &'a [Row],
    model: &'a SemanticModel,
    plan: &'a LogicalQueryPlan,
    memo: HashMap<String, Value>,
}

impl<'a> GroupEvaluator<'a> {
    fn new(rows: &'a [Row], model: &'a SemanticModel, plan: &'a LogicalQueryPlan) -> Self {
        Self {
            rows,
            model,
            plan,
            memo: HashMap::new(),
        }
    }

    fn eval_metric(&mut self, name: &str) -> Value {
        if let Some(v) = self.memo.get(name) {
            return v.clone();
        }
        let expr = self
            .plan
            .output_metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.expr.clone())
            .or_else(|| {
                self.model.metric(name).and_then(|def| {
                    transform::syntax_to_logical(
                        &def.expr,
                        self.model,
                        def.base_fact.as_deref(),
                        TransformOptions::default(),
                    )
                    .ok()
                })
            });
        let value = match expr {
            Some(e) => self.eval(&e),
            None => Value::Undefined,
        };
        self.memo.insert(name.to_string(), value.clone());
        value
    }

    fn eval_aggregate(&self, op: crate::logical::expr::AggregateOp, input: &LogicalExpr, distinct: bool) -> Value {
        let is_wildcard_count = matches!(op, crate::logical::expr::AggregateOp::Count)
            && matches!(input, LogicalExpr::AttributeRef { attribute_id, .. } if attribute_id == transform::WILDCARD);
        if is_wildcard_count {
            return Value::Number(self.rows.len() as f64);
        }
        let values: Vec<Value> = self.rows.iter().map(|r| eval_row(input, r)).collect();
        aggregate::apply(op, &values, distinct)
    }

    fn eval(&mut self, expr: &LogicalExpr) -> Value {
        match expr {
            LogicalExpr::Constant { value, .. } => value.clone(),
            LogicalExpr::AttributeRef { .. } => Value::Undefined,
            LogicalExpr::MetricRef { metric_name, .. } => self.eval_metric(metric_name),
            LogicalExpr::Aggregate { op, input, distinct, .. } => self.eval_aggregate(*op, input, *distinct),
            LogicalExpr::ScalarOp { op, left, right, .. } => {
                let l = self.eval(left);
                let r = self.eval(right);
                apply_scalar_op(*op, l, r)
            }
            LogicalExpr::ScalarFunction { .. } => Value::Undefined,
            LogicalExpr::Conditional {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let c = self.eval(condition);
                if is_truthy(&c) {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            LogicalExpr::Coalesce { args, .. } => {
                for a in args {
                    let v = self.eval(a);
                    if !matches!(v, Value::Null | Value::Undefined) {
                        return v;
                    }
                }
                Value::Null
            }
            LogicalExpr::Comparison { op, left, right } => {
                let l = self.eval(left);
                let r = self.eval(right);
                Value::Bool(compare(*op, &l, &r))
            }
            LogicalExpr::LogicalOp { op, operands } => {
                let values: Vec<Value> = operands.iter().map(|o| self.eval(o)).collect();
                match op {
                    LogicalOpKind::Not => Value::Bool(!is_truthy(&values[0])),
                    LogicalOpKind::And => Value::Bool(values.iter().all(is_truthy)),
                    LogicalOpKind::Or => Value::Bool(values.iter().any(is_truthy)),
                }
            }
            LogicalExpr::InList { expr, list, negated } => {
                let v = self.eval(expr);
                let found = list.iter().any(|l| values_equal(&self.eval(l), &v));
                Value::Bool(found != *negated)
            }
            LogicalExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = self.eval(expr);
                let lo = self.eval(low);
                let hi = self.eval(high);
                let within =
                    matches!((&v, &lo, &hi), (Value::Number(x), Value::Number(l), Value::Number(h)) if x >= l && x <= h);
                Value::Bool(within != *negated)
            }
            LogicalExpr::IsNull { expr, negated } => {
                let is_null = matches!(self.eval(expr), Value::Null);
                Value::Bool(is_null != *negated)
            }
        }
    }
}

/// Execute a plan node (and, recursively, its inputs), returning its
/// output row stream. `Aggregate` nodes perform grouping and full metric
/// evaluation (all of `plan.metric_eval_order`, not just the node's own
/// base-metric `aggregates` list) in one step.
fn execute_node(
    node_id: &str,
    plan: &LogicalQueryPlan,
    model: &SemanticModel,
    tables: &Tables,
) -> Vec<Row> {
    let node = &plan.nodes[node_id];
    match node {
        LogicalPlanNode::FactScan {
            table,
            inline_filters,
            ..
        }
        | LogicalPlanNode::DimensionScan {
            table,
            inline_filters,
            ..
        } => tables
            .get(table)
            .iter()
            .filter(|row| inline_filters.iter().all(|f| is_truthy(&eval_row(f, row))))
            .cloned()
            .collect(),

        LogicalPlanNode::Join {
            left_input_id,
            right_input_id,
            join_keys,
            ..
        } => {
            let left_rows = execute_node(left_input_id, plan, model, tables);
            let right_rows = execute_node(right_input_id, plan, model, tables);

            let mut right_by_key: HashMap<String, Vec<&Row>> = HashMap::new();
            for row in &right_rows {
                let key = encode_join_key(row, join_keys, false);
                right_by_key.entry(key).or_default().push(row);
            }

            let mut out = Vec::new();
            for left_row in &left_rows {
                let key = encode_join_key(left_row, join_keys, true);
                if let Some(matches) = right_by_key.get(&key) {
                    for right_row in matches {
                        out.push(left_row.merged_with(right_row));
                    }
                }
            }
            out
        }

        LogicalPlanNode::Filter { input_id, predicate } => execute_node(input_id, plan, model, tables)
            .into_iter()
            .filter(|row| is_truthy(&eval_row(predicate, row)))
            .collect(),

        LogicalPlanNode::Aggregate {
            input_id, group_by, ..
        } => {
            let input_rows = execute_node(input_id, plan, model, tables);
            let attr_columns: Vec<String> = group_by
                .iter()
                .map(|attr_id| {
                    model
                        .attribute(attr_id)
                        .map(|a| a.column.clone())
                        .unwrap_or_else(|| attr_id.clone())
                })
                .collect();

            let mut group_order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
            for row in input_rows {
                let key = attr_columns
                    .iter()
                    .map(|c| row.get(c).canonical_key())
                    .collect::<Vec<_>>()
                    .join("|");
                if !groups.contains_key(&key) {
                    group_order.push(key.clone());
                }
                groups.entry(key).or_default().push(row);
            }

            group_order
                .into_iter()
                .map(|key| {
                    let group_rows = &groups[&key];
                    let mut evaluator = GroupEvaluator::new(group_rows, model, plan);
                    let mut out: HashMap<String, Value> = HashMap::new();
                    for (attr_id, column) in group_by.iter().zip(attr_columns.iter()) {
                        out.insert(attr_id.clone(), group_rows[0].get(column));
                    }
                    for metric_name in &plan.metric_eval_order {
                        out.insert(metric_name.clone(), evaluator.eval_metric(metric_name));
                    }
                    Row(out)
                })
                .collect()
        }

        LogicalPlanNode::Window { input_id, .. }
        | LogicalPlanNode::Transform { input_id, .. }
        | LogicalPlanNode::Project { input_id, .. } => execute_node(input_id, plan, model, tables),
    }
}

fn encode_join_key(row: &Row, join_keys: &[(String, String)], is_left: bool) -> String {
    join_keys
        .iter()
        .map(|(fact_col, dim_col)| {
            let col = if is_left { fact_col } else { dim_col };
            row.get(col).canonical_key()
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Run a built plan against in-memory tables, returning result rows.
pub fn run_query(plan: &LogicalQueryPlan, model: &SemanticModel, tables: &Tables) -> QueryResult {
    let start = std::time::Instant::now();
    let rows = execute_node(&plan.root_node_id, plan, model, tables);

    let mut columns = plan.output_grain.dimensions.clone();
    columns.extend(plan.output_metrics.iter().map(|m| m.name.clone()));

    QueryResult {
        columns,
        rows,
        execution_time: start.elapsed(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::{ArithOp, CmpOp, LiteralValue, MetricExpr};
    use crate::dsl::span::Spanned;
    use crate::model::SemanticModelBuilder;
    use crate::planner::{build_logical_plan, PlanBuilderOptions, QuerySpec};
    use crate::dsl::ast::BoolExpr;

    fn model() -> SemanticModel {
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

    fn tables() -> Tables {
        let sales_rows = vec![
            Row::from_iter([
                ("region_id".to_string(), Value::Number(1.0)),
                ("amount".to_string(), Value::Number(100.0)),
            ]),
            Row::from_iter([
                ("region_id".to_string(), Value::Number(1.0)),
                ("amount".to_string(), Value::Number(50.0)),
            ]),
            Row::from_iter([
                ("region_id".to_string(), Value::Number(2.0)),
                ("amount".to_string(), Value::Number(30.0)),
            ]),
        ];
        let region_rows = vec![
            Row::from_iter([
                ("region_id".to_string(), Value::Number(1.0)),
                ("name".to_string(), Value::Str("N".to_string())),
            ]),
            Row::from_iter([
                ("region_id".to_string(), Value::Number(2.0)),
                ("name".to_string(), Value::Str("S".to_string())),
            ]),
        ];
        Tables(HashMap::from([
            ("sales".to_string(), Table { rows: sales_rows }),
            ("regions".to_string(), Table { rows: region_rows }),
        ]))
    }

    #[test]
    fn test_end_to_end_aggregation() {
        let model = model();
        let tables = tables();
        let query = QuerySpec {
            dimensions: vec!["region_name".to_string()],
            metrics: vec!["total_revenue".to_string()],
            where_clause: None,
            having: None,
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        let result = run_query(&plan, &model, &tables);

        let mut by_region: HashMap<String, f64> = HashMap::new();
        for row in &result.rows {
            if let (Value::Str(name), Value::Number(total)) =
                (row.get("region_name"), row.get("total_revenue"))
            {
                by_region.insert(name, total);
            }
        }
        assert_eq!(by_region.get("N"), Some(&150.0));
        assert_eq!(by_region.get("S"), Some(&30.0));
    }

    #[test]
    fn test_pre_and_post_aggregate_filters() {
        let model = model();
        let tables = tables();
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
        let result = run_query(&plan, &model, &tables);

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("region_name"), Value::Str("N".to_string()));
        assert_eq!(result.rows[0].get("total_revenue"), Value::Number(150.0));
    }

    #[test]
    fn test_empty_rows_input_produces_zero_result_rows() {
        let model = model();
        let tables = Tables::default();
        let query = QuerySpec {
            dimensions: vec!["region_name".to_string()],
            metrics: vec!["total_revenue".to_string()],
            where_clause: None,
            having: None,
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        let result = run_query(&plan, &model, &tables);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_division_by_zero_is_undefined_not_infinity() {
        assert_eq!(
            apply_scalar_op(ScalarOpKind::Div, Value::Number(1.0), Value::Number(0.0)),
            Value::Undefined
        );
    }

    #[test]
    fn test_scalar_op_propagates_undefined() {
        assert_eq!(
            apply_scalar_op(ScalarOpKind::Add, Value::Undefined, Value::Number(1.0)),
            Value::Undefined
        );
    }

    #[test]
    fn test_comparison_type_mismatch_is_false() {
        assert!(!compare(ComparisonOp::Eq, &Value::Number(1.0), &Value::Str("1".into())));
    }

    #[test]
    fn test_derived_metric_avg_ticket() {
        let model = SemanticModelBuilder::new()
            .fact("sales", "sales")
            .attribute("amount", "sales", None)
            .metric(
                "total_sales",
                Some("sales".to_string()),
                MetricExpr::Call(
                    Spanned::new("sum".into(), 0..0),
                    vec![Spanned::new(MetricExpr::AttrRef("amount".into()), 0..0)],
                ),
            )
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

        let tables = Tables(HashMap::from([(
            "sales".to_string(),
            Table {
                rows: vec![
                    Row::from_iter([("amount".to_string(), Value::Number(100.0))]),
                    Row::from_iter([("amount".to_string(), Value::Number(50.0))]),
                ],
            },
        )]));

        let query = QuerySpec {
            dimensions: vec![],
            metrics: vec![
                "total_sales".to_string(),
                "order_count".to_string(),
                "avg_ticket".to_string(),
            ],
            where_clause: None,
            having: None,
        };
        let plan = build_logical_plan(&query, &model, PlanBuilderOptions::default()).unwrap();
        let result = run_query(&plan, &model, &tables);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("total_sales"), Value::Number(150.0));
        assert_eq!(result.rows[0].get("order_count"), Value::Number(2.0));
        assert_eq!(result.rows[0].get("avg_ticket"), Value::Number(75.0));
    }
}
