//! Run a pypeline from `demos/pypelines.yaml` into a PostgreSQL database.
//!
//! ```text
//! PYPELINE_SOURCE_URL="host=localhost user=app dbname=app" \
//! PYPELINE_DEST_URL="host=localhost user=dw dbname=dw" \
//! cargo run --example sync_tables -- nightly 2024-01-01
//! ```
//!
//! A `mysql://` source URL extracts from MySQL instead.
//!
//! Without the two URLs the pypeline is dry-run against in-memory
//! connections and the statements it would execute are printed.

use pypeline::core::destinations::{MemoryDestination, PostgresDestination};
use pypeline::core::logging;
use pypeline::core::metrics;
use pypeline::core::query::Placeholders;
use pypeline::core::sources::{MemorySource, MySqlSource, PostgresSource};
use pypeline::utils::record::record;
use pypeline::{PypelineBuilder, Value};

const DEFINITION: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/pypelines.yaml");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "nightly".to_string());
    let since = args.next().unwrap_or_else(|| "2024-01-01".to_string());

    let mut placeholders = Placeholders::new();
    placeholders.insert("{since}".to_string(), format!("'{since}'"));

    let builder = PypelineBuilder::new()
        .definition_file(DEFINITION)
        .placeholders(placeholders)
        .debug(true);

    match (std::env::var("PYPELINE_SOURCE_URL"), std::env::var("PYPELINE_DEST_URL")) {
        (Ok(source_url), Ok(dest_url)) => {
            let builder = if source_url.starts_with("mysql://") {
                builder.source(MySqlSource::from_url(&source_url)?)
            } else {
                builder.source(PostgresSource::new(source_url))
            };
            let mut pypeline = builder
                .destination(PostgresDestination::new(dest_url))
                .build()?;
            let report = pypeline.run(&name, Placeholders::new()).await?;
            for pype in &report.pypes {
                println!("{:<20} {:>8} rows in {:?}", pype.name, pype.rows_written, pype.elapsed);
            }
        }
        _ => {
            let destination = MemoryDestination::new();
            let journal = destination.journal();
            let mut pypeline = builder
                .source(MemorySource::new(sample_rows()))
                .destination(destination)
                .build()?;
            pypeline.run(&name, Placeholders::new()).await?;
            for statement in journal.statements() {
                println!("{}  -- {} params", statement.sql, statement.params.len());
            }
        }
    }

    println!("{}", metrics::gather_text());
    Ok(())
}

fn sample_rows() -> Vec<pypeline::Record> {
    (1..=3)
        .map(|i| {
            record([
                ("id", Value::from(i)),
                ("email", Value::from(format!(" user{i}@example.com "))),
                ("full_name", Value::from(if i == 2 { "" } else { "Ada" })),
                ("created_at", Value::from("2024-01-01 00:00:00")),
                ("updated_at", Value::from("2024-01-02 08:30:00")),
                ("score", Value::from(0.5 * i as f64)),
            ])
        })
        .collect()
}
