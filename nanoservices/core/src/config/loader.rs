use std::path::Path;

use pypeline_utils::error::ConfigError;

use crate::config::types::PipelineDefinition;

/// Load a definition document from a YAML file.
pub fn load_definition(path: impl AsRef<Path>) -> Result<PipelineDefinition, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_definition(&content)
}

/// Parse a definition document from a YAML string.
pub fn parse_definition(yaml: &str) -> Result<PipelineDefinition, ConfigError> {
    let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;
    Ok(definition)
}
