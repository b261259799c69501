use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use pypeline_utils::error::ConfigError;

pub const DEFAULT_BULK_SIZE: usize = 2000;
pub const DEFAULT_PYPE_NAME: &str = "pype";

/// A parsed definition document: named pype configurations plus named,
/// ordered lists of pype names.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub pypes: HashMap<String, PypeConfig>,
    #[serde(default)]
    pub pypelines: HashMap<String, Vec<String>>,
}

/// How a pype writes each transformed batch to the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Upsert,
    Update,
    Delete,
}

/// Configuration of a single extract/transform/load unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PypeConfig {
    pub extract_query: String,
    pub target_table: String,
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Column matched by deletes; required when `write_mode` is `delete`.
    pub identifier_column: Option<String>,
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    #[serde(default)]
    pub fields_excluded_from_update: Vec<String>,
    pub post_query: Option<String>,
    /// Explicit column order for writes. Taken from the first record when absent.
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub transformers: Vec<String>,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub debug: bool,
}

fn default_bulk_size() -> usize {
    DEFAULT_BULK_SIZE
}

fn default_name() -> String {
    DEFAULT_PYPE_NAME.to_string()
}

impl PypeConfig {
    /// A config with every optional field at its default.
    pub fn new(extract_query: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            extract_query: extract_query.into(),
            target_table: target_table.into(),
            write_mode: WriteMode::default(),
            identifier_column: None,
            bulk_size: DEFAULT_BULK_SIZE,
            fields_excluded_from_update: Vec::new(),
            post_query: None,
            fields: None,
            transformers: Vec::new(),
            name: default_name(),
            debug: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_size == 0 {
            return Err(ConfigError::InvalidBulkSize(self.name.clone()));
        }
        if self.write_mode == WriteMode::Delete && self.identifier_column.is_none() {
            return Err(ConfigError::MissingIdentifierColumn(self.name.clone()));
        }
        Ok(())
    }

    pub fn excluded_from_update(&self) -> HashSet<String> {
        self.fields_excluded_from_update.iter().cloned().collect()
    }
}
