//! The logical intermediate representation: typed expressions and plan
//! DAG node types.

pub mod expr;
pub mod plan;

pub use expr::{
    AggregateOp, ComparisonOp, LogicalExpr, LogicalExprError, LogicalOpKind, ScalarOpKind,
    SourceKind,
};
pub use plan::{
    AggregateOutput, Cardinality, JoinKey, JoinType, LogicalPlanNode, NodeId, NodeIdGenerator,
    ProjectOutput, TransformKind, WindowFrame, WindowFunctionOutput,
};

/// The canonical `grainId` of a dimension list: the alphabetically
/// sorted, comma-joined, lowercased sequence of attribute ids.
pub fn grain_id(dimension_attribute_ids: &[String]) -> String {
    let mut ids: Vec<String> = dimension_attribute_ids
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    ids.sort();
    ids.join(",")
}
