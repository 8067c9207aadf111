//! Aggregate function semantics.

use std::collections::HashSet;

use crate::logical::expr::AggregateOp;
use crate::value::Value;

/// Apply an aggregate operator to a column of values already extracted
/// from a group's rows (one value per row, in row order).
///
/// `sum/avg/min/max` operate over the numeric subset (non-numeric values
/// are skipped). `count` counts non-null values (its `count(*)` form is
/// handled by the caller before values are ever extracted, since it
/// counts rows rather than any column). `avg` over an empty numeric set
/// is undefined. `count_distinct` counts distinct non-null values.
pub fn apply(op: AggregateOp, values: &[Value], distinct: bool) -> Value {
    match op {
        AggregateOp::Sum => {
            let numerics: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
            Value::Number(numerics.iter().sum())
        }
        AggregateOp::Avg => {
            let numerics: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
            if numerics.is_empty() {
                Value::Undefined
            } else {
                Value::Number(numerics.iter().sum::<f64>() / numerics.len() as f64)
            }
        }
        AggregateOp::Min => {
            let numerics: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
            numerics
                .into_iter()
                .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.min(n))))
                .map(Value::Number)
                .unwrap_or(Value::Undefined)
        }
        AggregateOp::Max => {
            let numerics: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
            numerics
                .into_iter()
                .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.max(n))))
                .map(Value::Number)
                .unwrap_or(Value::Undefined)
        }
        AggregateOp::Count => {
            if distinct {
                count_distinct(values)
            } else {
                Value::Number(values.iter().filter(|v| !v.is_null()).count() as f64)
            }
        }
        AggregateOp::CountDistinct => count_distinct(values),
    }
}

fn count_distinct(values: &[Value]) -> Value {
    let mut seen: HashSet<String> = HashSet::new();
    for v in values {
        if !v.is_null() {
            seen.insert(v.canonical_key());
        }
    }
    Value::Number(seen.len() as f64)
}
