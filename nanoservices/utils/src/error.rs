use thiserror::Error;
use tokio_postgres::Error as PostgresError;
use serde_json::Error as JsonError;

/// Problems with a definition document or a pype configuration.
///
/// These are always raised before a pype touches either connection.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read definition file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse definition YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no pypeline named `{0}`")]
    UnknownPypeline(String),

    #[error("pypeline `{pypeline}` references undefined pype `{pype}`")]
    UnknownPype { pypeline: String, pype: String },

    #[error("pype `{0}` uses write_mode delete but has no identifier_column")]
    MissingIdentifierColumn(String),

    #[error("pype `{0}` has bulk_size 0, it must be a positive integer")]
    InvalidBulkSize(String),

    #[error("pype `{pype}` references unknown transformer `{transformer}`")]
    UnknownTransform { pype: String, transformer: String },

    #[error("update of `{0}` has no field left to SET after exclusions")]
    NoUpdatableFields(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transform Error in `{step}`: {message}")]
    Transform { step: String, message: String },

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Postgres Error: {0}")]
    Postgres(#[from] PostgresError),

    #[error("MySQL Error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Json Error: {0}")]
    Json(#[from] JsonError),
}

impl Error {
    pub fn transform(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transform { step: step.into(), message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }

    /// True for failures raised before any I/O.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
