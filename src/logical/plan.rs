//! `LogicalPlanNode`: the plan DAG's node types, and the id generator
//! used to produce stable `<prefix>_<n>` identifiers.

use std::collections::HashMap;

use crate::logical::expr::LogicalExpr;

pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrame {
    Rolling(u32),
    Cumulative,
    Offset(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Rowset,
    Table,
}

/// A `{outputName, expr}` pair inside an `Aggregate` node.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutput {
    pub output_name: String,
    pub expr: LogicalExpr,
}

/// A `{outputName, expr}` pair inside a `Window` node.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunctionOutput {
    pub output_name: String,
    pub expr: LogicalExpr,
}

/// A `{name, expr}` pair inside a `Project` node.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectOutput {
    pub name: String,
    pub expr: LogicalExpr,
}

/// A single join key pair, `(fact_column, dimension_column)`.
pub type JoinKey = (String, String);

/// A node in the logical plan DAG. Node sharing is expressed through
/// `*_input_id` string ids into `LogicalQueryPlan::nodes`, never through
/// back-pointers.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlanNode {
    FactScan {
        id: NodeId,
        table: String,
        required_columns: Vec<String>,
        inline_filters: Vec<LogicalExpr>,
    },
    DimensionScan {
        id: NodeId,
        table: String,
        required_columns: Vec<String>,
        inline_filters: Vec<LogicalExpr>,
    },
    Join {
        id: NodeId,
        join_type: JoinType,
        left_input_id: NodeId,
        right_input_id: NodeId,
        join_keys: Vec<JoinKey>,
        cardinality: Cardinality,
    },
    Filter {
        id: NodeId,
        input_id: NodeId,
        predicate: LogicalExpr,
    },
    Aggregate {
        id: NodeId,
        input_id: NodeId,
        group_by: Vec<String>,
        aggregates: Vec<AggregateOutput>,
    },
    Window {
        id: NodeId,
        input_id: NodeId,
        partition_by: Vec<String>,
        order_by: Vec<String>,
        frame: WindowFrame,
        window_functions: Vec<WindowFunctionOutput>,
    },
    Transform {
        id: NodeId,
        input_id: NodeId,
        transform_kind: TransformKind,
        transform_id: String,
        input_attr: String,
        output_attr: String,
    },
    Project {
        id: NodeId,
        input_id: NodeId,
        outputs: Vec<ProjectOutput>,
    },
}

impl LogicalPlanNode {
    pub fn id(&self) -> &str {
        match self {
            LogicalPlanNode::FactScan { id, .. }
            | LogicalPlanNode::DimensionScan { id, .. }
            | LogicalPlanNode::Join { id, .. }
            | LogicalPlanNode::Filter { id, .. }
            | LogicalPlanNode::Aggregate { id, .. }
            | LogicalPlanNode::Window { id, .. }
            | LogicalPlanNode::Transform { id, .. }
            | LogicalPlanNode::Project { id, .. } => id,
        }
    }

    /// The `inputId`s this node directly references, in emission order.
    pub fn input_ids(&self) -> Vec<&str> {
        match self {
            LogicalPlanNode::FactScan { .. } | LogicalPlanNode::DimensionScan { .. } => vec![],
            LogicalPlanNode::Join {
                left_input_id,
                right_input_id,
                ..
            } => vec![left_input_id.as_str(), right_input_id.as_str()],
            LogicalPlanNode::Filter { input_id, .. }
            | LogicalPlanNode::Aggregate { input_id, .. }
            | LogicalPlanNode::Window { input_id, .. }
            | LogicalPlanNode::Transform { input_id, .. }
            | LogicalPlanNode::Project { input_id, .. } => vec![input_id.as_str()],
        }
    }
}

/// Produces stable `<prefix>_<n>` node ids, with `n` starting at 1 and
/// counted independently per prefix. Confined to a single plan build: a
/// fresh `NodeIdGenerator` is created per `buildLogicalPlan` call rather
/// than sharing a process-global counter, so concurrent builds never
/// interleave ids.
#[derive(Debug, Clone, Default)]
pub struct NodeIdGenerator {
    counters: HashMap<&'static str, usize>,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, prefix: &'static str) -> NodeId {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{prefix}_{counter}")
    }

    pub fn fact_scan(&mut self) -> NodeId {
        self.next("fact_scan")
    }

    pub fn dim_scan(&mut self) -> NodeId {
        self.next("dim_scan")
    }

    pub fn join(&mut self) -> NodeId {
        self.next("join")
    }

    pub fn filter(&mut self) -> NodeId {
        self.next("filter")
    }

    pub fn agg(&mut self) -> NodeId {
        self.next("agg")
    }

    pub fn window(&mut self) -> NodeId {
        self.next("window")
    }

    pub fn transform(&mut self) -> NodeId {
        self.next("transform")
    }

    pub fn project(&mut self) -> NodeId {
        self.next("project")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increment_per_prefix() {
        let mut gen = NodeIdGenerator::new();
        assert_eq!(gen.fact_scan(), "fact_scan_1");
        assert_eq!(gen.fact_scan(), "fact_scan_2");
        assert_eq!(gen.join(), "join_1");
    }

    #[test]
    fn test_fresh_generator_resets_counters() {
        let mut gen = NodeIdGenerator::new();
        gen.fact_scan();
        gen.fact_scan();
        let mut gen2 = NodeIdGenerator::new();
        assert_eq!(gen2.fact_scan(), "fact_scan_1");
    }

    #[test]
    fn test_join_input_ids() {
        let node = LogicalPlanNode::Join {
            id: "join_1".into(),
            join_type: JoinType::Inner,
            left_input_id: "fact_scan_1".into(),
            right_input_id: "dim_scan_1".into(),
            join_keys: vec![("region_id".into(), "region_id".into())],
            cardinality: Cardinality::ManyToOne,
        };
        assert_eq!(node.input_ids(), vec!["fact_scan_1", "dim_scan_1"]);
    }
}
