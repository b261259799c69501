//! pypeline_core — batch table-to-table sync over PostgreSQL
//!
//! A *pype* reads rows with an extract query, runs them through a chain of
//! named transforms and writes them to a target table by upsert, update or
//! delete, one committed batch at a time. A *pypeline* is a named, ordered
//! list of pypes from a YAML definition, run over one source and one
//! destination connection.
//!
//! Basic usage:
//!
//! ```no_run
//! use pypeline_core::builder::PypelineBuilder;
//! use pypeline_core::sources::PostgresSource;
//! use pypeline_core::destinations::PostgresDestination;
//! use pypeline_core::query::Placeholders;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pypeline = PypelineBuilder::new()
//!     .definition_file("pypelines.yaml")
//!     .source(PostgresSource::new("host=src user=etl dbname=app"))
//!     .destination(PostgresDestination::new("host=dw user=etl dbname=dw"))
//!     .placeholder("{day}", "'2024-01-01'")
//!     .build()?;
//! let report = pypeline.run("nightly", Placeholders::new()).await?;
//! println!("{} rows written", report.rows_written());
//! # Ok(())
//! # }
//! ```

pub mod sources;
pub mod destinations;
pub mod transforms;
pub mod query;
pub mod config;
pub mod builder;
pub mod pipeline;
pub mod engine;

mod postgres;

pub mod logging;

pub mod metrics;
