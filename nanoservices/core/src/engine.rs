use std::path::Path;
use std::time::{Duration, Instant};

use pypeline_utils::error::ConfigError;
use pypeline_utils::PypelineResult;

use crate::config::{load_definition, PipelineDefinition, PypeConfig};
use crate::destinations::DestinationConnection;
use crate::pipeline::{Pype, PypeReport};
use crate::query::Placeholders;
use crate::sources::SourceConnection;
use crate::transforms::TransformRegistry;

/// Outcome of one pypeline invocation, one entry per pype in run order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PypelineReport {
    pub name: String,
    pub pypes: Vec<PypeReport>,
    pub elapsed: Duration,
}

impl PypelineReport {
    pub fn rows_written(&self) -> usize {
        self.pypes.iter().map(|p| p.rows_written).sum()
    }
}

/// Top-level orchestrator. Owns a parsed definition and one source and one
/// destination connection, and runs named pypelines over them one pype at a
/// time.
pub struct Pypeline {
    definition: PipelineDefinition,
    source: Box<dyn SourceConnection>,
    destination: Box<dyn DestinationConnection>,
    placeholders: Placeholders,
    registry: TransformRegistry,
    debug: bool,
}

impl Pypeline {
    pub fn new(
        definition: PipelineDefinition,
        source: Box<dyn SourceConnection>,
        destination: Box<dyn DestinationConnection>,
    ) -> Self {
        Self {
            definition,
            source,
            destination,
            placeholders: Placeholders::new(),
            registry: TransformRegistry::default(),
            debug: false,
        }
    }

    /// Load the definition document at `path`.
    pub fn from_file(
        path: impl AsRef<Path>,
        source: Box<dyn SourceConnection>,
        destination: Box<dyn DestinationConnection>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(load_definition(path)?, source, destination))
    }

    /// Placeholders used by every run that does not bring its own.
    pub fn with_placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    pub fn with_registry(mut self, registry: TransformRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stamp every resolved pype with `debug`, turning on per-batch timing events.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Names of the defined pypelines, sorted.
    pub fn pypeline_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definition.pypelines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The pype configurations of `name`, in run order, each stamped with
    /// its own pype name and this orchestrator's debug flag and validated.
    pub fn resolve(&self, name: &str) -> Result<Vec<PypeConfig>, ConfigError> {
        let pype_names = self
            .definition
            .pypelines
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPypeline(name.to_string()))?;

        pype_names
            .iter()
            .map(|pype_name| -> Result<PypeConfig, ConfigError> {
                let mut config = self
                    .definition
                    .pypes
                    .get(pype_name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownPype {
                        pypeline: name.to_string(),
                        pype: pype_name.clone(),
                    })?;
                config.name = pype_name.clone();
                config.debug = self.debug;
                config.validate()?;
                Ok(config)
            })
            .collect()
    }

    /// Run every pype of `name` in order. A non-empty `placeholders` map
    /// replaces the stored one for this call only.
    ///
    /// Every pype is built before the first one runs, so configuration
    /// errors surface before any connection I/O. The first failing pype
    /// stops the run; pypes and batches already committed stay committed.
    pub async fn run(&mut self, name: &str, placeholders: Placeholders) -> PypelineResult<PypelineReport> {
        let started = Instant::now();
        let placeholders = if placeholders.is_empty() { self.placeholders.clone() } else { placeholders };

        let mut pypes = self
            .resolve(name)?
            .into_iter()
            .map(|config| Pype::new(config, &self.registry, placeholders.clone()))
            .collect::<PypelineResult<Vec<_>>>()?;

        tracing::info!(pypeline = %name, pypes = pypes.len(), "pypeline started");

        let mut report = PypelineReport { name: name.to_string(), ..PypelineReport::default() };
        for pype in pypes.iter_mut() {
            let pype_report = pype.run(self.source.as_mut(), self.destination.as_mut()).await?;
            report.pypes.push(pype_report);
        }
        report.elapsed = started.elapsed();

        tracing::info!(
            pypeline = %name,
            rows_written = report.rows_written(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pypeline finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_definition;
    use crate::destinations::MemoryDestination;
    use crate::sources::MemorySource;
    use pypeline_utils::record::record;
    use pypeline_utils::Value;

    const DEFINITION: &str = r#"
pypes:
  users:
    extract_query: "SELECT * FROM users WHERE day = {day}"
    target_table: dw.users
  orders:
    extract_query: "SELECT * FROM orders WHERE day = {day}"
    target_table: dw.orders
    post_query: "ANALYZE dw.orders"
pypelines:
  nightly: [users, orders]
  broken: [users, ghost]
"#;

    fn placeholders(day: &str) -> Placeholders {
        [("{day}".to_string(), day.to_string())].into_iter().collect()
    }

    fn rows() -> Vec<pypeline_utils::Record> {
        vec![record([("id", Value::from(1)), ("v", Value::from("a"))])]
    }

    #[test]
    fn resolve_stamps_name_and_debug() {
        let pypeline = Pypeline::new(
            parse_definition(DEFINITION).unwrap(),
            Box::new(MemorySource::default()),
            Box::new(MemoryDestination::new()),
        )
        .debug(true);

        let configs = pypeline.resolve("nightly").unwrap();
        let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders"]);
        assert!(configs.iter().all(|c| c.debug));
        assert_eq!(pypeline.pypeline_names(), vec!["broken", "nightly"]);
    }

    #[tokio::test]
    async fn unknown_names_fail_before_io() {
        let source = MemorySource::default();
        let stats = source.stats();
        let dest = MemoryDestination::new();
        let journal = dest.journal();
        let mut pypeline = Pypeline::new(parse_definition(DEFINITION).unwrap(), Box::new(source), Box::new(dest));

        let err = pypeline.run("missing", Placeholders::new()).await.unwrap_err();
        assert!(err.is_config());

        let err = pypeline.run("broken", Placeholders::new()).await.unwrap_err();
        assert!(matches!(
            err,
            pypeline_utils::error::Error::Config(ConfigError::UnknownPype { ref pype, .. }) if pype == "ghost"
        ));

        assert!(stats.untouched());
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn runs_pypes_in_order_with_placeholders() {
        let source = MemorySource::new(rows());
        let stats = source.stats();
        let dest = MemoryDestination::new();
        let journal = dest.journal();

        let mut pypeline = Pypeline::new(parse_definition(DEFINITION).unwrap(), Box::new(source), Box::new(dest))
            .with_placeholders(placeholders("'2020-01-01'"));

        let report = pypeline.run("nightly", Placeholders::new()).await.unwrap();
        assert_eq!(report.pypes.len(), 2);
        assert_eq!(report.pypes[0].name, "users");
        assert_eq!(report.rows_written(), 2);

        let statements = journal.statements();
        assert!(statements[0].sql.starts_with("INSERT INTO dw.users"));
        assert!(statements[1].sql.starts_with("INSERT INTO dw.orders"));
        assert_eq!(statements[2].sql, "ANALYZE dw.orders");

        // A per-call map wins for that call only.
        pypeline.run("nightly", placeholders("'2021-06-30'")).await.unwrap();
        pypeline.run("nightly", Placeholders::new()).await.unwrap();
        assert_eq!(
            stats.queries(),
            vec![
                "SELECT * FROM users WHERE day = '2020-01-01'",
                "SELECT * FROM orders WHERE day = '2020-01-01'",
                "SELECT * FROM users WHERE day = '2021-06-30'",
                "SELECT * FROM orders WHERE day = '2021-06-30'",
                "SELECT * FROM users WHERE day = '2020-01-01'",
                "SELECT * FROM orders WHERE day = '2020-01-01'",
            ]
        );
    }

    #[tokio::test]
    async fn failing_pype_stops_the_pypeline() {
        let source = MemorySource::new(rows());
        let dest = MemoryDestination::new().fail_on("dw.orders");
        let journal = dest.journal();
        let mut pypeline = Pypeline::new(parse_definition(DEFINITION).unwrap(), Box::new(source), Box::new(dest));

        assert!(pypeline.run("nightly", Placeholders::new()).await.is_err());
        // users committed before orders failed
        assert_eq!(journal.commits(), 1);
    }
}
