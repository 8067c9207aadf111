use std::collections::HashMap;

use crate::dsl::ast::MetricExpr;
use crate::model::error::ModelError;
use crate::model::{Attribute, Dimension, Fact, JoinEdge, MetricDefinition, SemanticModel};

/// Incrementally assembles a [`SemanticModel`]. Construction never
/// throws on a single problem: every call records state, and `build()`
/// performs all referential-integrity and uniqueness validation in one
/// pass, returning the complete list of violations.
#[derive(Debug, Clone, Default)]
pub struct SemanticModelBuilder {
    attributes: Vec<Attribute>,
    facts: Vec<Fact>,
    dimensions: Vec<Dimension>,
    metrics: Vec<MetricDefinition>,
    joins: Vec<JoinEdge>,
}

impl SemanticModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fact(mut self, name: impl Into<String>, table: impl Into<String>) -> Self {
        self.facts.push(Fact {
            name: name.into(),
            table: table.into(),
        });
        self
    }

    pub fn dimension(mut self, name: impl Into<String>, table: impl Into<String>) -> Self {
        self.dimensions.push(Dimension {
            name: name.into(),
            table: table.into(),
        });
        self
    }

    pub fn attribute(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        column: Option<String>,
    ) -> Self {
        self.attributes.push(Attribute::new(name, table, column));
        self
    }

    pub fn join(
        mut self,
        fact: impl Into<String>,
        dimension: impl Into<String>,
        fact_key: impl Into<String>,
        dimension_key: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinEdge {
            fact: fact.into(),
            dimension: dimension.into(),
            fact_key: fact_key.into(),
            dimension_key: dimension_key.into(),
        });
        self
    }

    pub fn metric(
        mut self,
        name: impl Into<String>,
        base_fact: Option<String>,
        expr: MetricExpr,
    ) -> Self {
        self.metrics.push(MetricDefinition {
            name: name.into(),
            base_fact,
            expr,
        });
        self
    }

    /// Validate and finalize the model. Collects every violation rather
    /// than aborting at the first.
    pub fn build(self) -> Result<SemanticModel, Vec<ModelError>> {
        let mut errors = Vec::new();

        let mut facts: HashMap<String, Fact> = HashMap::new();
        for f in self.facts {
            if facts.contains_key(&f.name) {
                errors.push(ModelError::DuplicateFact(f.name.clone()));
            }
            facts.insert(f.name.clone(), f);
        }

        let mut dimensions: HashMap<String, Dimension> = HashMap::new();
        for d in self.dimensions {
            if dimensions.contains_key(&d.name) {
                errors.push(ModelError::DuplicateDimension(d.name.clone()));
            }
            dimensions.insert(d.name.clone(), d);
        }

        let mut attributes: HashMap<String, Attribute> = HashMap::new();
        for a in self.attributes {
            if attributes.contains_key(&a.name) {
                errors.push(ModelError::DuplicateAttribute(a.name.clone()));
            }
            let table_known = facts.values().any(|f| f.table == a.table)
                || dimensions.values().any(|d| d.table == a.table);
            if !table_known {
                errors.push(ModelError::UnknownAttributeTable {
                    attribute: a.name.clone(),
                    table: a.table.clone(),
                });
            }
            attributes.insert(a.name.clone(), a);
        }

        for j in &self.joins {
            if !facts.contains_key(&j.fact) {
                errors.push(ModelError::UnknownJoinFact(j.fact.clone()));
            }
            if !dimensions.contains_key(&j.dimension) {
                errors.push(ModelError::UnknownJoinDimension(j.dimension.clone()));
            }
        }

        let mut metrics: HashMap<String, MetricDefinition> = HashMap::new();
        for m in self.metrics {
            if metrics.contains_key(&m.name) {
                errors.push(ModelError::DuplicateMetric(m.name.clone()));
            }
            if let Some(fact) = &m.base_fact {
                if !facts.contains_key(fact) {
                    errors.push(ModelError::MetricUnknownBaseFact {
                        metric: m.name.clone(),
                        fact: fact.clone(),
                    });
                }
            }
            metrics.insert(m.name.clone(), m);
        }

        for m in metrics.values() {
            for dep in m.direct_dependencies() {
                if !metrics.contains_key(&dep) {
                    errors.push(ModelError::MetricUnknownMetric {
                        metric: m.name.clone(),
                        referenced: dep,
                    });
                }
            }
            for attr in collect_attr_refs(&m.expr) {
                if attr == "*" {
                    continue;
                }
                if !attributes.contains_key(&attr) {
                    errors.push(ModelError::MetricUnknownAttribute {
                        metric: m.name.clone(),
                        attribute: attr,
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SemanticModel {
            attributes,
            facts,
            dimensions,
            metrics,
            joins: self.joins,
        })
    }
}

fn collect_attr_refs(expr: &MetricExpr) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(expr: &MetricExpr, out: &mut Vec<String>) {
        match expr {
            MetricExpr::AttrRef(name) => out.push(name.clone()),
            MetricExpr::Literal(_) | MetricExpr::MetricRef(_) => {}
            MetricExpr::BinaryOp(_, l, r) => {
                walk(&l.value, out);
                walk(&r.value, out);
            }
            MetricExpr::Call(_, args) => {
                for a in args {
                    walk(&a.value, out);
                }
            }
        }
    }
    walk(expr, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::span::Spanned;

    fn sum_amount() -> MetricExpr {
        MetricExpr::Call(
            Spanned::new("sum".into(), 0..0),
            vec![Spanned::new(MetricExpr::AttrRef("amount".into()), 0..0)],
        )
    }

    #[test]
    fn test_build_valid_model() {
        let model = SemanticModelBuilder::new()
            .fact("sales", "sales")
            .dimension("regions", "regions")
            .attribute("amount", "sales", None)
            .attribute("region_id", "sales", None)
            .attribute("region_name", "regions", Some("name".to_string()))
            .join("sales", "regions", "region_id", "region_id")
            .metric("total_sales", Some("sales".to_string()), sum_amount())
            .build()
            .expect("model should build");

        assert!(model.fact("sales").is_some());
        assert!(model.metric("total_sales").is_some());
        assert_eq!(model.join_between("sales", "regions").unwrap().fact_key, "region_id");
    }

    #[test]
    fn test_build_rejects_unknown_join_fact() {
        let errors = SemanticModelBuilder::new()
            .dimension("regions", "regions")
            .join("sales", "regions", "region_id", "region_id")
            .build()
            .unwrap_err();
        assert!(errors.contains(&ModelError::UnknownJoinFact("sales".to_string())));
    }

    #[test]
    fn test_build_rejects_unknown_attribute_table() {
        let errors = SemanticModelBuilder::new()
            .attribute("amount", "sales", None)
            .build()
            .unwrap_err();
        assert!(matches!(
            errors[0],
            ModelError::UnknownAttributeTable { .. }
        ));
    }

    #[test]
    fn test_build_rejects_duplicate_metric() {
        let errors = SemanticModelBuilder::new()
            .fact("sales", "sales")
            .attribute("amount", "sales", None)
            .metric("total_sales", Some("sales".to_string()), sum_amount())
            .metric("total_sales", Some("sales".to_string()), sum_amount())
            .build()
            .unwrap_err();
        assert!(errors.contains(&ModelError::DuplicateMetric("total_sales".to_string())));
    }

    #[test]
    fn test_build_rejects_metric_unknown_attribute() {
        let errors = SemanticModelBuilder::new()
            .fact("sales", "sales")
            .metric("total_sales", Some("sales".to_string()), sum_amount())
            .build()
            .unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ModelError::MetricUnknownAttribute { .. })));
    }
}
