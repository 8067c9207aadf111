//! Scan and join inference: base-fact selection and left-deep chain
//! construction (plan builder phases 3–4).

use std::collections::HashMap;

use crate::logical::plan::{Cardinality, JoinType, LogicalPlanNode, NodeIdGenerator};
use crate::model::SemanticModel;
use crate::planner::PlanError;

/// Select the single base fact table for a query. Prefers the `baseFact`
/// declared by any metric whose expression aggregates or references
/// another metric; falls back to any required-attribute table that is
/// itself a fact table. Multiple distinct candidates are rejected rather
/// than guessed at (see design notes on conflicting fact anchors).
pub fn select_base_fact<'a>(
    metric_base_facts: impl Iterator<Item = &'a str>,
    required_tables: &[String],
    model: &SemanticModel,
) -> Result<String, PlanError> {
    let mut candidates: Vec<String> = metric_base_facts.map(|s| s.to_string()).collect();
    candidates.sort();
    candidates.dedup();

    if candidates.is_empty() {
        candidates = required_tables
            .iter()
            .filter(|t| model.is_fact_table(t))
            .cloned()
            .collect();
        candidates.sort();
        candidates.dedup();
    }

    match candidates.len() {
        0 => Err(PlanError::NoBaseFact),
        1 => Ok(candidates.into_iter().next().unwrap()),
        _ => Err(PlanError::MultipleBaseFacts(candidates)),
    }
}

/// Build the left-deep scan/join chain rooted at `base_fact_table`.
///
/// `required_by_table` maps physical table name to the required column
/// list for that table. `dimension_tables_in_order` lists the dimension
/// tables to join, in the order their attributes first appear among the
/// resolved query attributes; a table with no direct `JoinEdge` from the
/// base fact is skipped (diagnostic only, not a hard error).
pub fn build_scan_chain(
    base_fact_table: &str,
    required_by_table: &HashMap<String, Vec<String>>,
    dimension_tables_in_order: &[String],
    model: &SemanticModel,
    node_gen: &mut NodeIdGenerator,
) -> (String, HashMap<String, LogicalPlanNode>, Vec<String>) {
    let mut nodes = HashMap::new();
    let mut diagnostics = Vec::new();

    let fact_columns = required_by_table
        .get(base_fact_table)
        .cloned()
        .unwrap_or_default();
    let fact_scan_id = node_gen.fact_scan();
    nodes.insert(
        fact_scan_id.clone(),
        LogicalPlanNode::FactScan {
            id: fact_scan_id.clone(),
            table: base_fact_table.to_string(),
            required_columns: fact_columns,
            inline_filters: Vec::new(),
        },
    );

    let mut current_input = fact_scan_id;

    for dim_table in dimension_tables_in_order {
        if dim_table == base_fact_table {
            continue;
        }
        let Some(edge) = model.join_between(base_fact_table, dim_table) else {
            diagnostics.push(format!(
                "no join edge from {base_fact_table:?} to {dim_table:?}; dimension skipped"
            ));
            continue;
        };

        let mut dim_columns = required_by_table.get(dim_table).cloned().unwrap_or_default();
        if !dim_columns.contains(&edge.dimension_key) {
            dim_columns.push(edge.dimension_key.clone());
        }

        let dim_scan_id = node_gen.dim_scan();
        nodes.insert(
            dim_scan_id.clone(),
            LogicalPlanNode::DimensionScan {
                id: dim_scan_id.clone(),
                table: dim_table.clone(),
                required_columns: dim_columns,
                inline_filters: Vec::new(),
            },
        );

        let join_id = node_gen.join();
        nodes.insert(
            join_id.clone(),
            LogicalPlanNode::Join {
                id: join_id.clone(),
                join_type: JoinType::Inner,
                left_input_id: current_input.clone(),
                right_input_id: dim_scan_id,
                join_keys: vec![(edge.fact_key.clone(), edge.dimension_key.clone())],
                cardinality: Cardinality::ManyToOne,
            },
        );
        current_input = join_id;
    }

    (current_input, nodes, diagnostics)
}
