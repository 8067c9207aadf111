//! The semantic model: a passive, read-only registry of facts, dimensions,
//! attributes, joins, and named metric definitions.

mod builder;
mod error;

pub use builder::SemanticModelBuilder;
pub use error::ModelError;

use std::collections::HashMap;

use crate::dsl::ast::MetricExpr;

/// The source kind of a physical table: a many-row fact, or a lookup
/// dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Fact,
    Dimension,
}

/// A logical name mapped to a physical (table, column) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub table: String,
    pub column: String,
}

impl Attribute {
    /// Column defaults to the logical name when omitted.
    pub fn new(name: impl Into<String>, table: impl Into<String>, column: Option<String>) -> Self {
        let name = name.into();
        let column = column.unwrap_or_else(|| name.clone());
        Self {
            name,
            table: table.into(),
            column,
        }
    }
}

/// A named reference to a physical table treated as a base (many-row)
/// relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub name: String,
    pub table: String,
}

/// A named reference to a physical table treated as a lookup relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub table: String,
}

/// A directed fact→dimension edge used to infer join keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub fact: String,
    pub dimension: String,
    pub fact_key: String,
    pub dimension_key: String,
}

/// A metric's declaration: name, optional base fact (anchor), and its
/// unresolved syntax expression. `base_fact` is `None` for constant-only
/// or purely derived expressions with no anchor; in practice every
/// aggregate-bearing metric carries one.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub base_fact: Option<String>,
    pub expr: MetricExpr,
}

impl MetricDefinition {
    /// A metric is *base* when its expression contains only attribute
    /// references and aggregate calls (no `MetricRef`); *derived*
    /// otherwise.
    pub fn is_base(&self) -> bool {
        !Self::references_metric(&self.expr)
    }

    fn references_metric(expr: &MetricExpr) -> bool {
        match expr {
            MetricExpr::MetricRef(_) => true,
            MetricExpr::Literal(_) | MetricExpr::AttrRef(_) => false,
            MetricExpr::BinaryOp(_, l, r) => {
                Self::references_metric(&l.value) || Self::references_metric(&r.value)
            }
            MetricExpr::Call(_, args) => args.iter().any(|a| Self::references_metric(&a.value)),
        }
    }

    /// The set of other metric names this metric's expression directly
    /// references.
    pub fn direct_dependencies(&self) -> Vec<String> {
        let mut deps = Vec::new();
        Self::collect_metric_refs(&self.expr, &mut deps);
        deps
    }

    fn collect_metric_refs(expr: &MetricExpr, out: &mut Vec<String>) {
        match expr {
            MetricExpr::MetricRef(name) => out.push(name.clone()),
            MetricExpr::Literal(_) | MetricExpr::AttrRef(_) => {}
            MetricExpr::BinaryOp(_, l, r) => {
                Self::collect_metric_refs(&l.value, out);
                Self::collect_metric_refs(&r.value, out);
            }
            MetricExpr::Call(_, args) => {
                for a in args {
                    Self::collect_metric_refs(&a.value, out);
                }
            }
        }
    }
}

/// The semantic model: a passive registry built once and treated as
/// read-only during query processing.
#[derive(Debug, Clone, Default)]
pub struct SemanticModel {
    attributes: HashMap<String, Attribute>,
    facts: HashMap<String, Fact>,
    dimensions: HashMap<String, Dimension>,
    metrics: HashMap<String, MetricDefinition>,
    joins: Vec<JoinEdge>,
}

impl SemanticModel {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn fact(&self, name: &str) -> Option<&Fact> {
        self.facts.get(name)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.get(name)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    pub fn joins_by_fact(&self, fact: &str) -> Vec<&JoinEdge> {
        self.joins.iter().filter(|j| j.fact == fact).collect()
    }

    pub fn join_between(&self, fact_table: &str, dim_table: &str) -> Option<&JoinEdge> {
        self.joins
            .iter()
            .find(|j| j.fact == fact_table && j.dimension == dim_table)
    }

    /// Returns whether `table` is known as a fact table.
    pub fn is_fact_table(&self, table: &str) -> bool {
        self.facts.values().any(|f| f.table == table)
    }

    /// Returns whether `table` is known as a dimension table.
    pub fn is_dimension_table(&self, table: &str) -> bool {
        self.dimensions.values().any(|d| d.table == table)
    }
}
