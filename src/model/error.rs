//! Errors produced while validating a [`super::SemanticModel`] under
//! construction.

/// A referential-integrity or uniqueness violation detected while
/// building a [`super::SemanticModel`]. Construction never throws for a
/// single violation: `SemanticModelBuilder::build` collects all of them
/// and returns the list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate attribute name: {0}")]
    DuplicateAttribute(String),

    #[error("duplicate fact name: {0}")]
    DuplicateFact(String),

    #[error("duplicate dimension name: {0}")]
    DuplicateDimension(String),

    #[error("duplicate metric name: {0}")]
    DuplicateMetric(String),

    #[error("join references unknown fact: {0}")]
    UnknownJoinFact(String),

    #[error("join references unknown dimension: {0}")]
    UnknownJoinDimension(String),

    #[error("attribute {attribute:?} references unknown table: {table:?}")]
    UnknownAttributeTable { attribute: String, table: String },

    #[error("metric {metric:?} references unknown attribute: {attribute:?}")]
    MetricUnknownAttribute { metric: String, attribute: String },

    #[error("metric {metric:?} references unknown metric: {referenced:?}")]
    MetricUnknownMetric { metric: String, referenced: String },

    #[error("metric {metric:?} declares unknown base fact: {fact:?}")]
    MetricUnknownBaseFact { metric: String, fact: String },
}
