pub mod loader;
pub mod types;

pub use loader::{load_definition, parse_definition};
pub use types::{PipelineDefinition, PypeConfig, WriteMode};
