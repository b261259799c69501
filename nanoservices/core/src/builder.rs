use std::path::PathBuf;

use pypeline_utils::error::ConfigError;

use crate::config::{load_definition, PipelineDefinition};
use crate::destinations::DestinationConnection;
use crate::engine::Pypeline;
use crate::query::Placeholders;
use crate::sources::SourceConnection;
use crate::transforms::TransformRegistry;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("a definition or definition file is required")]
    NoDefinition,
    #[error("a source connection is required")]
    NoSource,
    #[error("a destination connection is required")]
    NoDestination,
    #[error("definition failed to load: {0}")]
    Config(#[from] ConfigError),
}

enum DefinitionInput {
    Parsed(PipelineDefinition),
    File(PathBuf),
}

#[derive(Default)]
pub struct PypelineBuilder {
    definition: Option<DefinitionInput>,
    source: Option<Box<dyn SourceConnection>>,
    destination: Option<Box<dyn DestinationConnection>>,
    placeholders: Placeholders,
    registry: Option<TransformRegistry>,
    debug: bool,
}

impl PypelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definition(mut self, definition: PipelineDefinition) -> Self {
        self.definition = Some(DefinitionInput::Parsed(definition));
        self
    }

    /// Read the definition from a YAML file when `build` is called.
    pub fn definition_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.definition = Some(DefinitionInput::File(path.into()));
        self
    }

    pub fn source(mut self, source: impl SourceConnection + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn destination(mut self, destination: impl DestinationConnection + 'static) -> Self {
        self.destination = Some(Box::new(destination));
        self
    }

    pub fn placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    pub fn placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    pub fn registry(mut self, registry: TransformRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> Result<Pypeline, BuildError> {
        let definition = match self.definition.ok_or(BuildError::NoDefinition)? {
            DefinitionInput::Parsed(definition) => definition,
            DefinitionInput::File(path) => load_definition(path)?,
        };
        let source = self.source.ok_or(BuildError::NoSource)?;
        let destination = self.destination.ok_or(BuildError::NoDestination)?;

        Ok(Pypeline::new(definition, source, destination)
            .with_placeholders(self.placeholders)
            .with_registry(self.registry.unwrap_or_default())
            .debug(self.debug))
    }
}
