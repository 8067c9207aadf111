//! Filter classification: pre- vs post-aggregate, and push-down
//! eligibility (plan builder phase 5).

use std::collections::HashSet;

use crate::logical::expr::LogicalExpr;

/// Whether a predicate must run before grouping (over joined raw rows)
/// or after (over per-group aggregate results).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    PreAggregate,
    PostAggregate,
}

/// Classify a predicate: post-aggregate if it references any metric or
/// aggregate, pre-aggregate otherwise. `having:` predicates are always
/// post-aggregate regardless of this classification — callers should not
/// call this for `having` clauses.
pub fn classify(predicate: &LogicalExpr) -> FilterClass {
    if predicate.contains_metric_ref() || predicate.contains_aggregate() {
        FilterClass::PostAggregate
    } else {
        FilterClass::PreAggregate
    }
}

/// The set of physical tables a predicate's attribute references span.
fn referenced_tables(predicate: &LogicalExpr, out: &mut HashSet<String>) {
    match predicate {
        LogicalExpr::AttributeRef { physical_table, .. } => {
            out.insert(physical_table.clone());
        }
        LogicalExpr::Constant { .. } | LogicalExpr::MetricRef { .. } => {}
        LogicalExpr::Aggregate { input, .. } => referenced_tables(input, out),
        LogicalExpr::ScalarOp { left, right, .. } => {
            referenced_tables(left, out);
            referenced_tables(right, out);
        }
        LogicalExpr::ScalarFunction { args, .. } => {
            for a in args {
                referenced_tables(a, out);
            }
        }
        LogicalExpr::Conditional {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            referenced_tables(condition, out);
            referenced_tables(then_branch, out);
            referenced_tables(else_branch, out);
        }
        LogicalExpr::Coalesce { args, .. } => {
            for a in args {
                referenced_tables(a, out);
            }
        }
        LogicalExpr::Comparison { left, right, .. } => {
            referenced_tables(left, out);
            referenced_tables(right, out);
        }
        LogicalExpr::LogicalOp { operands, .. } => {
            for o in operands {
                referenced_tables(o, out);
            }
        }
        LogicalExpr::InList { expr, list, .. } => {
            referenced_tables(expr, out);
            for l in list {
                referenced_tables(l, out);
            }
        }
        LogicalExpr::Between { expr, low, high, .. } => {
            referenced_tables(expr, out);
            referenced_tables(low, out);
            referenced_tables(high, out);
        }
        LogicalExpr::IsNull { expr, .. } => referenced_tables(expr, out),
    }
}

/// If `predicate` refers exclusively to columns of a single scan table,
/// return that table name — eligible for push-down into the scan's
/// `inlineFilters` when the `pushDownFilters` option is set.
pub fn single_scan_table(predicate: &LogicalExpr) -> Option<String> {
    let mut tables = HashSet::new();
    referenced_tables(predicate, &mut tables);
    if tables.len() == 1 {
        tables.into_iter().next()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::expr::{ComparisonOp, SourceKind};
    use crate::value::{DataType, Value};

    fn attr(table: &str, name: &str) -> LogicalExpr {
        LogicalExpr::AttributeRef {
            attribute_id: name.to_string(),
            physical_table: table.to_string(),
            physical_column: name.to_string(),
            source_kind: SourceKind::Fact,
            data_type: DataType::Unknown,
        }
    }

    #[test]
    fn test_classify_pre_aggregate() {
        let pred = LogicalExpr::Comparison {
            op: ComparisonOp::Gt,
            left: Box::new(attr("sales", "amount")),
            right: Box::new(LogicalExpr::constant(Value::Number(40.0))),
        };
        assert_eq!(classify(&pred), FilterClass::PreAggregate);
    }

    #[test]
    fn test_classify_post_aggregate_via_metric_ref() {
        let pred = LogicalExpr::Comparison {
            op: ComparisonOp::Gt,
            left: Box::new(LogicalExpr::MetricRef {
                metric_name: "total_sales".into(),
                base_fact: None,
                result_type: DataType::Number,
            }),
            right: Box::new(LogicalExpr::constant(Value::Number(100.0))),
        };
        assert_eq!(classify(&pred), FilterClass::PostAggregate);
    }

    #[test]
    fn test_single_scan_table() {
        let pred = LogicalExpr::Comparison {
            op: ComparisonOp::Gt,
            left: Box::new(attr("sales", "amount")),
            right: Box::new(LogicalExpr::constant(Value::Number(40.0))),
        };
        assert_eq!(single_scan_table(&pred), Some("sales".to_string()));
    }

    #[test]
    fn test_multi_table_not_single_scan() {
        let pred = LogicalExpr::Comparison {
            op: ComparisonOp::Gt,
            left: Box::new(attr("sales", "amount")),
            right: Box::new(attr("regions", "min_amount")),
        };
        assert_eq!(single_scan_table(&pred), None);
    }
}
