//! The logical plan builder: scan/join inference, dependency analysis,
//! filter classification, and DAG assembly.

pub mod dependency;
pub mod filter;
pub mod join;

use std::collections::{HashMap, HashSet};

use crate::dsl::ast::BoolExpr;
use crate::logical::expr::LogicalExpr;
use crate::logical::plan::{AggregateOutput, LogicalPlanNode, NodeId, NodeIdGenerator};
use crate::logical::grain_id;
use crate::model::{MetricDefinition, SemanticModel};
use crate::transform::{self, TransformOptions, TransformationError};

pub use dependency::MetricCycleError;

/// The shape of a query: which dimensions and metrics to project, and
/// optional pre-/post-aggregate predicates.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub where_clause: Option<BoolExpr>,
    pub having: Option<BoolExpr>,
}

/// Options controlling plan construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilderOptions {
    /// When set, a pre-aggregate predicate referring exclusively to one
    /// scan's table is pushed into that scan's `inlineFilters` instead of
    /// becoming a standalone `Filter` node above the join.
    pub push_down_filters: bool,
}

/// `{name, expr, baseFact, dependencies, requiredAttrs, executionPhase}`
/// for one metric in a built query plan.
#[derive(Debug, Clone)]
pub struct LogicalMetricPlan {
    pub name: String,
    pub expr: LogicalExpr,
    pub base_fact: Option<String>,
    pub dependencies: Vec<String>,
    pub required_attrs: Vec<String>,
    pub execution_phase: usize,
}

/// The resolved output dimensional grain.
#[derive(Debug, Clone)]
pub struct OutputGrain {
    pub dimensions: Vec<String>,
    pub grain_id: String,
}

/// A complete, per-query logical plan: a DAG of nodes keyed by id, plus
/// the metric metadata needed to drive execution.
#[derive(Debug, Clone)]
pub struct LogicalQueryPlan {
    pub root_node_id: NodeId,
    pub nodes: HashMap<NodeId, LogicalPlanNode>,
    pub output_grain: OutputGrain,
    pub output_metrics: Vec<LogicalMetricPlan>,
    pub metric_eval_order: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// An error aborting plan construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("unknown dimension: {0:?}")]
    UnknownDimension(String),

    #[error("unknown metric: {0:?}")]
    UnknownMetric(String),

    #[error(transparent)]
    Transformation(#[from] TransformationError),

    #[error(transparent)]
    Cycle(#[from] MetricCycleError),

    #[error("no base fact could be determined for this query")]
    NoBaseFact,

    #[error("multiple candidate base facts found: {0:?}; this builder supports exactly one per plan")]
    MultipleBaseFacts(Vec<String>),
}

fn collect_attribute_refs(expr: &LogicalExpr, out: &mut Vec<(String, String)>) {
    match expr {
        LogicalExpr::AttributeRef {
            attribute_id,
            physical_table,
            ..
        } => {
            if attribute_id != transform::WILDCARD {
                out.push((attribute_id.clone(), physical_table.clone()));
            }
        }
        LogicalExpr::Constant { .. } | LogicalExpr::MetricRef { .. } => {}
        LogicalExpr::Aggregate { input, .. } => collect_attribute_refs(input, out),
        LogicalExpr::ScalarOp { left, right, .. } => {
            collect_attribute_refs(left, out);
            collect_attribute_refs(right, out);
        }
        LogicalExpr::ScalarFunction { args, .. } => {
            for a in args {
                collect_attribute_refs(a, out);
            }
        }
        LogicalExpr::Conditional {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            collect_attribute_refs(condition, out);
            collect_attribute_refs(then_branch, out);
            collect_attribute_refs(else_branch, out);
        }
        LogicalExpr::Coalesce { args, .. } => {
            for a in args {
                collect_attribute_refs(a, out);
            }
        }
        LogicalExpr::Comparison { left, right, .. } => {
            collect_attribute_refs(left, out);
            collect_attribute_refs(right, out);
        }
        LogicalExpr::LogicalOp { operands, .. } => {
            for o in operands {
                collect_attribute_refs(o, out);
            }
        }
        LogicalExpr::InList { expr, list, .. } => {
            collect_attribute_refs(expr, out);
            for l in list {
                collect_attribute_refs(l, out);
            }
        }
        LogicalExpr::Between { expr, low, high, .. } => {
            collect_attribute_refs(expr, out);
            collect_attribute_refs(low, out);
            collect_attribute_refs(high, out);
        }
        LogicalExpr::IsNull { expr, .. } => collect_attribute_refs(expr, out),
    }
}

/// Build a `LogicalQueryPlan` from a query spec and semantic model.
pub fn build_logical_plan(
    query: &QuerySpec,
    model: &SemanticModel,
    options: PlanBuilderOptions,
) -> Result<LogicalQueryPlan, PlanError> {
    let mut node_gen = NodeIdGenerator::new();
    let mut diagnostics = Vec::new();

    // Phase 1: resolve shape.
    let mut dimension_attr_ids = Vec::new();
    let mut dimension_tables_in_order = Vec::new();
    let mut seen_dim_tables = HashSet::new();
    for dim in &query.dimensions {
        let attr = model
            .attribute(dim)
            .ok_or_else(|| PlanError::UnknownDimension(dim.clone()))?;
        dimension_attr_ids.push(attr.name.clone());
        if seen_dim_tables.insert(attr.table.clone()) {
            dimension_tables_in_order.push(attr.table.clone());
        }
    }
    let output_grain = OutputGrain {
        dimensions: dimension_attr_ids.clone(),
        grain_id: grain_id(&dimension_attr_ids),
    };

    let mut resolved_metrics: Vec<(MetricDefinition, LogicalExpr)> = Vec::new();
    for name in &query.metrics {
        let def = model
            .metric(name)
            .ok_or_else(|| PlanError::UnknownMetric(name.clone()))?
            .clone();
        let resolved = transform::syntax_to_logical(
            &def.expr,
            model,
            def.base_fact.as_deref(),
            TransformOptions::default(),
        )?;
        resolved_metrics.push((def, resolved));
    }

    let mut required_by_table: HashMap<String, Vec<String>> = HashMap::new();
    for (_, expr) in &resolved_metrics {
        let mut refs = Vec::new();
        collect_attribute_refs(expr, &mut refs);
        for (attr_id, table) in refs {
            let attr = model.attribute(&attr_id);
            let column = attr.map(|a| a.column.clone()).unwrap_or(attr_id);
            let entry = required_by_table.entry(table).or_default();
            if !entry.contains(&column) {
                entry.push(column);
            }
        }
    }
    for dim in &query.dimensions {
        let attr = model.attribute(dim).expect("validated above");
        let entry = required_by_table.entry(attr.table.clone()).or_default();
        if !entry.contains(&attr.column) {
            entry.push(attr.column.clone());
        }
    }

    // Phase 2: dependency graph and phases.
    let all_metrics: HashMap<String, MetricDefinition> =
        model.metrics().map(|m| (m.name.clone(), m.clone())).collect();
    let (eval_order, phase_of) = dependency::build_phases(&query.metrics, &all_metrics)?;

    // Phase 3: base fact selection.
    let metric_anchors: Vec<&str> = resolved_metrics
        .iter()
        .filter(|(_, expr)| expr.contains_aggregate() || expr.contains_metric_ref())
        .filter_map(|(def, _)| def.base_fact.as_deref())
        .collect();
    let required_tables: Vec<String> = required_by_table.keys().cloned().collect();
    let base_fact_table = join::select_base_fact(metric_anchors.into_iter(), &required_tables, model)?;

    // Phase 4: scan + join construction.
    let (mut root, mut nodes, join_diagnostics) = join::build_scan_chain(
        &base_fact_table,
        &required_by_table,
        &dimension_tables_in_order,
        model,
        &mut node_gen,
    );
    diagnostics.extend(join_diagnostics);

    // Phase 5: pre-aggregate filter.
    let mut post_aggregate_predicates: Vec<LogicalExpr> = Vec::new();
    if let Some(where_syntax) = &query.where_clause {
        let predicate = transform::transform_predicate(where_syntax, model, Some(&base_fact_table), false)?;
        match filter::classify(&predicate) {
            filter::FilterClass::PreAggregate => {
                let pushed = options.push_down_filters
                    && filter::single_scan_table(&predicate).as_deref() == Some(base_fact_table.as_str());
                if pushed {
                    if let Some(LogicalPlanNode::FactScan { inline_filters, .. }) = nodes.get_mut(&root) {
                        inline_filters.push(predicate);
                    } else {
                        let filter_id = node_gen.filter();
                        nodes.insert(
                            filter_id.clone(),
                            LogicalPlanNode::Filter {
                                id: filter_id.clone(),
                                input_id: root.clone(),
                                predicate,
                            },
                        );
                        root = filter_id;
                    }
                } else {
                    let filter_id = node_gen.filter();
                    nodes.insert(
                        filter_id.clone(),
                        LogicalPlanNode::Filter {
                            id: filter_id.clone(),
                            input_id: root.clone(),
                            predicate,
                        },
                    );
                    root = filter_id;
                }
            }
            filter::FilterClass::PostAggregate => post_aggregate_predicates.push(predicate),
        }
    }

    // Phase 6: aggregate.
    let mut aggregates = Vec::new();
    for (def, expr) in &resolved_metrics {
        if def.is_base() {
            aggregates.push(AggregateOutput {
                output_name: def.name.clone(),
                expr: expr.clone(),
            });
        }
    }
    let agg_id = node_gen.agg();
    nodes.insert(
        agg_id.clone(),
        LogicalPlanNode::Aggregate {
            id: agg_id.clone(),
            input_id: root.clone(),
            group_by: dimension_attr_ids.clone(),
            aggregates,
        },
    );
    root = agg_id;

    // `having:` is always post-aggregate.
    if let Some(having_syntax) = &query.having {
        let predicate = transform::transform_predicate(having_syntax, model, Some(&base_fact_table), true)?;
        post_aggregate_predicates.push(predicate);
    }

    for predicate in post_aggregate_predicates {
        let filter_id = node_gen.filter();
        nodes.insert(
            filter_id.clone(),
            LogicalPlanNode::Filter {
                id: filter_id.clone(),
                input_id: root.clone(),
                predicate,
            },
        );
        root = filter_id;
    }

    // Phase 7: finalization.
    let output_metrics = resolved_metrics
        .into_iter()
        .map(|(def, expr)| {
            let mut required_attrs = Vec::new();
            let mut refs = Vec::new();
            collect_attribute_refs(&expr, &mut refs);
            for (attr_id, _) in refs {
                if !required_attrs.contains(&attr_id) {
                    required_attrs.push(attr_id);
                }
            }
            LogicalMetricPlan {
                execution_phase: phase_of[&def.name],
                dependencies: def.direct_dependencies(),
                name: def.name.clone(),
                base_fact: def.base_fact.clone(),
                expr,
                required_attrs,
            }
        })
        .collect();

    Ok(LogicalQueryPlan {
        root_node_id: root,
        nodes,
        output_grain,
        output_metrics,
        metric_eval_order: eval_order,
        diagnostics,
    })
}
