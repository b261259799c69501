//! The pype: one extract, transform and load run over a pair of connections.
//!
//! A run opens one forward-only cursor on the source and loops:
//! fetch up to `bulk_size` rows, pass the whole batch through every
//! transform in order, write it, commit the destination. A fetch shorter
//! than `bulk_size` is the last one. Each batch is committed on its own, so
//! a failure leaves every earlier batch in place; replays are absorbed by the
//! upsert conflict key.

pub mod helpers;

use std::time::{Duration, Instant};

use pypeline_utils::error::{ConfigError, Error};
use pypeline_utils::{Batch, PypelineResult, Record};

use crate::config::{PypeConfig, WriteMode};
use crate::destinations::DestinationConnection;
use crate::metrics;
use crate::query::{delete_statement, hydrate, LoadQuery, Placeholders, Statement};
use crate::sources::SourceConnection;
use crate::transforms::{Transform, TransformRegistry};

use helpers::{millis, BatchTimings, MemorySampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PypeState {
    Idle,
    Extracting,
    Transforming,
    Writing,
    Finalizing,
    Done,
    Failed,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PypeReport {
    pub name: String,
    /// Fetch round trips, including a final empty one.
    pub fetches: usize,
    pub batches_written: usize,
    pub rows_extracted: usize,
    pub rows_written: usize,
    /// Statements executed on the destination, post query included.
    pub statements: usize,
    pub elapsed: Duration,
}

pub struct Pype {
    config: PypeConfig,
    transforms: Vec<Box<dyn Transform>>,
    placeholders: Placeholders,
    state: PypeState,
}

impl std::fmt::Debug for Pype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pype")
            .field("name", &self.config.name)
            .field("transforms", &self.config.transformers)
            .field("state", &self.state)
            .finish()
    }
}

impl Pype {
    /// Validate `config` and resolve its transform chain. Nothing here
    /// touches a connection.
    pub fn new(config: PypeConfig, registry: &TransformRegistry, placeholders: Placeholders) -> PypelineResult<Self> {
        config.validate()?;
        let transforms = registry.create_chain(&config.name, &config.transformers)?;
        Ok(Self { config, transforms, placeholders, state: PypeState::Idle })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PypeConfig {
        &self.config
    }

    pub fn state(&self) -> PypeState {
        self.state
    }

    /// Run to completion. The pype borrows both connections for the
    /// duration of the call only.
    pub async fn run(
        &mut self,
        source: &mut dyn SourceConnection,
        destination: &mut dyn DestinationConnection,
    ) -> PypelineResult<PypeReport> {
        let started = Instant::now();
        let mut report = PypeReport { name: self.config.name.clone(), ..PypeReport::default() };

        tracing::info!(
            pype = %self.config.name,
            table = %self.config.target_table,
            mode = ?self.config.write_mode,
            source = %source.name(),
            destination = %destination.name(),
            "pype started"
        );
        metrics::inc_run(&self.config.name);

        match self.execute(source, destination, &mut report).await {
            Ok(()) => {
                self.state = PypeState::Done;
                report.elapsed = started.elapsed();
                metrics::observe_duration(&self.config.name, millis(report.elapsed));
                tracing::info!(
                    pype = %self.config.name,
                    rows_extracted = report.rows_extracted,
                    rows_written = report.rows_written,
                    batches = report.batches_written,
                    elapsed_ms = millis(report.elapsed),
                    "pype finished"
                );
                Ok(report)
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = PypeState::Failed;
                metrics::inc_failure(&self.config.name);
                tracing::error!(
                    pype = %self.config.name,
                    state = ?failed_in,
                    batches_committed = report.batches_written,
                    error = %e,
                    "pype failed"
                );
                // The read transaction is still open if the loop was interrupted.
                if matches!(failed_in, PypeState::Extracting | PypeState::Transforming | PypeState::Writing) {
                    if let Err(close) = source.commit().await {
                        tracing::warn!(
                            pype = %self.config.name,
                            source = %source.name(),
                            error = %close,
                            "source transaction not closed after failure"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        source: &mut dyn SourceConnection,
        destination: &mut dyn DestinationConnection,
        report: &mut PypeReport,
    ) -> PypelineResult<()> {
        source.ensure_connected().await?;
        destination.ensure_connected().await?;

        self.state = PypeState::Extracting;
        let bulk_size = self.config.bulk_size;
        let query = hydrate(&self.config.extract_query, &self.placeholders);
        let mut load: Option<LoadQuery> = None;
        let mut sampler = self.config.debug.then(MemorySampler::new);

        {
            let mut cursor = source.query(&query).await?;
            loop {
                let mut timings = BatchTimings::default();

                self.state = PypeState::Extracting;
                let phase = Instant::now();
                let rows = cursor.fetch_many(bulk_size).await?;
                timings.extract = phase.elapsed();
                report.fetches += 1;

                let fetched = rows.len();
                if fetched == 0 {
                    break;
                }
                report.rows_extracted += fetched;
                metrics::add_rows_extracted(&self.config.name, fetched);

                self.state = PypeState::Transforming;
                let phase = Instant::now();
                let batch = self.transform(rows)?;
                timings.transform = phase.elapsed();

                self.state = PypeState::Writing;
                let phase = Instant::now();
                if !batch.is_empty() {
                    let statements = self.statements(&mut load, &batch)?;
                    for statement in &statements {
                        destination.execute(statement).await?;
                    }
                    if !statements.is_empty() {
                        destination.commit().await?;
                        report.statements += statements.len();
                        report.batches_written += 1;
                        report.rows_written += batch.len();
                        metrics::add_rows_written(&self.config.name, batch.len());
                    }
                }
                timings.load = phase.elapsed();

                if let Some(sampler) = sampler.as_mut() {
                    tracing::info!(
                        target: "pypeline::timing",
                        pype = %self.config.name,
                        rows = report.rows_extracted,
                        extract_ms = millis(timings.extract),
                        transform_ms = millis(timings.transform),
                        load_ms = millis(timings.load),
                        memory_bytes = sampler.resident_bytes(),
                        "batch done"
                    );
                }

                if fetched < bulk_size {
                    break;
                }
            }
        }
        source.commit().await?;

        self.state = PypeState::Finalizing;
        if let Some(post_query) = &self.config.post_query {
            let sql = hydrate(post_query, &self.placeholders);
            tracing::debug!(pype = %self.config.name, "running post query");
            destination.execute(&Statement::raw(sql)).await?;
            destination.commit().await?;
            report.statements += 1;
        }

        Ok(())
    }

    /// Each step consumes the previous step's whole output before the next
    /// step runs.
    fn transform(&mut self, mut batch: Batch) -> PypelineResult<Batch> {
        for step in self.transforms.iter_mut() {
            let mut next = Vec::with_capacity(batch.len());
            for record in batch {
                match step.apply(record) {
                    Ok(Some(record)) => next.push(record),
                    Ok(None) => {}
                    Err(e @ Error::Transform { .. }) => return Err(e),
                    Err(e) => return Err(Error::transform(step.name(), e.to_string())),
                }
            }
            batch = next;
        }
        Ok(batch)
    }

    fn statements(&self, load: &mut Option<LoadQuery>, batch: &[Record]) -> PypelineResult<Vec<Statement>> {
        let mode = self.config.write_mode;
        if mode == WriteMode::Delete {
            let column = self
                .config
                .identifier_column
                .as_deref()
                .ok_or_else(|| ConfigError::MissingIdentifierColumn(self.config.name.clone()))?;
            return Ok(delete_statement(&self.config.target_table, column, batch)?.into_iter().collect());
        }

        if load.is_none() {
            *load = Some(self.load_query(mode, batch)?);
        }
        match load {
            Some(query) => query.bind(batch),
            None => Ok(Vec::new()),
        }
    }

    /// The statement shape is fixed by the first non-empty batch.
    fn load_query(&self, mode: WriteMode, batch: &[Record]) -> PypelineResult<LoadQuery> {
        let fields: Vec<String> = match &self.config.fields {
            Some(fields) => fields.clone(),
            None => batch.first().map(|r| r.keys().cloned().collect()).unwrap_or_default(),
        };
        let excluded = self.config.excluded_from_update();
        tracing::debug!(pype = %self.config.name, fields = ?fields, "write fields fixed");

        match mode {
            WriteMode::Update => LoadQuery::update(&self.config.target_table, fields, &excluded),
            _ => LoadQuery::upsert(&self.config.target_table, fields, &excluded),
        }
    }
}
