//! Loads the CLI's `model.toml`: a thin, ambient description of facts,
//! dimensions, attributes, and joins. Metrics are never declared here —
//! they come from DSL text (`metric ... on ... = ...`) and are merged in
//! by the caller after parsing a query file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::model::{ModelError, SemanticModel, SemanticModelBuilder};

#[derive(Debug, Clone, Deserialize)]
pub struct FactConfig {
    pub name: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionConfig {
    pub name: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub table: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    pub fact: String,
    pub dimension: String,
    pub fact_key: String,
    pub dimension_key: String,
}

/// The deserialized shape of `model.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub facts: Vec<FactConfig>,
    #[serde(default)]
    pub dimensions: Vec<DimensionConfig>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read model config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("model.toml describes an invalid schema: {0:?}")]
    Model(Vec<ModelError>),
}

/// Read and parse a `model.toml` file from disk.
pub fn load_model_config(path: impl AsRef<Path>) -> Result<ModelConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Fold a `ModelConfig` into a fresh `SemanticModelBuilder`, ready for the
/// caller to add metrics before calling `.build()`.
pub fn builder_from_config(config: &ModelConfig) -> SemanticModelBuilder {
    let mut builder = SemanticModelBuilder::new();
    for fact in &config.facts {
        builder = builder.fact(fact.name.clone(), fact.table.clone());
    }
    for dimension in &config.dimensions {
        builder = builder.dimension(dimension.name.clone(), dimension.table.clone());
    }
    for attribute in &config.attributes {
        builder = builder.attribute(attribute.name.clone(), attribute.table.clone(), attribute.column.clone());
    }
    for join in &config.joins {
        builder = builder.join(
            join.fact.clone(),
            join.dimension.clone(),
            join.fact_key.clone(),
            join.dimension_key.clone(),
        );
    }
    builder
}

/// Build a `SemanticModel` directly from a `model.toml` file, with no
/// metrics. Callers that also have DSL-declared metrics should use
/// `builder_from_config` and add `.metric(...)` calls before `.build()`.
pub fn load_model(path: impl AsRef<Path>) -> Result<SemanticModel, ConfigError> {
    let config = load_model_config(path)?;
    // Metric-free models are only useful for schema-only validation; real
    // CLI flows merge DSL metrics in before calling `.build()`.
    builder_from_config(&config).build().map_err(ConfigError::Model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_minimal_model_toml() {
        let toml_text = r#"
            [[facts]]
            name = "sales"
            table = "sales"

            [[dimensions]]
            name = "regions"
            table = "regions"

            [[attributes]]
            name = "amount"
            table = "sales"

            [[attributes]]
            name = "region_name"
            table = "regions"
            column = "name"

            [[joins]]
            fact = "sales"
            dimension = "regions"
            fact_key = "region_id"
            dimension_key = "region_id"
        "#;
        let config: ModelConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.facts.len(), 1);
        assert_eq!(config.attributes[1].column.as_deref(), Some("name"));

        let builder = builder_from_config(&config);
        let model = builder
            .attribute("region_id", "sales", None)
            .build()
            .expect("schema-only model should build without metrics");
        assert!(model.fact("sales").is_some());
        assert!(model.join_between("sales", "regions").is_some());
    }

    #[test]
    fn test_invalid_schema_is_returned_as_an_error_not_a_panic() {
        let config = ModelConfig {
            joins: vec![JoinConfig {
                fact: "nonexistent".to_string(),
                dimension: "regions".to_string(),
                fact_key: "region_id".to_string(),
                dimension_key: "region_id".to_string(),
            }],
            ..ModelConfig::default()
        };
        let result: Result<SemanticModel, ConfigError> =
            builder_from_config(&config).build().map_err(ConfigError::Model);
        match result {
            Err(ConfigError::Model(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected ConfigError::Model, got {other:?}"),
        }
    }
}
