//! `metrisql`: a semantic metrics engine — DSL parsing, a typed logical
//! IR, a logical query plan builder, and an in-memory executor, plus an
//! `EXPLAIN`/SQL emitter.
//!
//! ```text
//! DSL text -> dsl::parse -> MetricExpr/BoolExpr syntax
//!          -> transform::syntax_to_logical -> LogicalExpr
//!          -> planner::build_logical_plan -> LogicalQueryPlan (DAG)
//!          -> executor::run_query | explain::explain_plan | explain::sql::plan_to_sql
//! ```

pub mod config;
pub mod dsl;
pub mod executor;
pub mod explain;
pub mod logical;
pub mod model;
pub mod planner;
pub mod transform;
pub mod value;

/// Unifies every module's error type at the host/CLI boundary. Library
/// code returns the specific error type of its own module; this exists
/// only where callers need one error type across the whole pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("model configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("model validation failed: {0:?}")]
    Model(Vec<model::ModelError>),

    #[error(transparent)]
    Transformation(#[from] transform::TransformationError),

    #[error(transparent)]
    Plan(#[from] planner::PlanError),
}

impl From<Vec<model::ModelError>> for Error {
    fn from(errors: Vec<model::ModelError>) -> Self {
        Error::Model(errors)
    }
}
