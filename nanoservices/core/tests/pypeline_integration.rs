use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pypeline_core::builder::PypelineBuilder;
use pypeline_core::destinations::{JournalEntry, MemoryDestination};
use pypeline_core::query::{Placeholders, SqlParam};
use pypeline_core::sources::MemorySource;
use pypeline_core::transforms::{Transform, TransformRegistry};
use pypeline_utils::error::Error;
use pypeline_utils::record::record;
use pypeline_utils::{PypelineResult, Record, Value};

const DEFINITION: &str = r#"
pypes:
  load_events:
    extract_query: "SELECT * FROM events WHERE day = {day}"
    target_table: analytics.events
    bulk_size: 2
    fields_excluded_from_update: [first_seen]
    transformers: [trim_strings, audit.count]
  purge_events:
    extract_query: "SELECT id FROM events_deleted WHERE day = {day}"
    target_table: analytics.events
    write_mode: delete
    identifier_column: id
    post_query: "ANALYZE analytics.events"
pypelines:
  daily: [load_events, purge_events]
"#;

fn events(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|i| {
            record([
                ("id", Value::from(i)),
                ("kind", Value::from(format!("  click{i} "))),
                ("first_seen", Value::from("2024-03-01 12:00:00")),
            ])
        })
        .collect()
}

fn counting_registry(seen: Arc<AtomicUsize>) -> TransformRegistry {
    struct Count(Arc<AtomicUsize>);

    impl Transform for Count {
        fn name(&self) -> &str { "audit.count" }
        fn apply(&mut self, record: Record) -> PypelineResult<Option<Record>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(record))
        }
    }

    let mut registry = TransformRegistry::default();
    registry.register_fn("audit.count", move || Box::new(Count(seen.clone())));
    registry
}

fn write_definition(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("pypeline-{name}-{}.yaml", std::process::id()));
    std::fs::write(&path, DEFINITION).unwrap();
    path
}

#[tokio::test]
async fn daily_pypeline_from_yaml_file() {
    pypeline_core::logging::init();
    let seen = Arc::new(AtomicUsize::new(0));

    let source = MemorySource::new(events(5))
        .with_result("SELECT id FROM events_deleted WHERE day = '2024-03-01'", vec![
            record([("id", Value::from(2))]),
            record([("id", Value::from(2))]),
            record([("id", Value::Null)]),
        ]);
    let stats = source.stats();
    let destination = MemoryDestination::new();
    let journal = destination.journal();

    let mut pypeline = PypelineBuilder::new()
        .definition_file(write_definition("daily"))
        .source(source)
        .destination(destination)
        .registry(counting_registry(seen.clone()))
        .placeholder("{day}", "'2024-03-01'")
        .debug(true)
        .build()
        .unwrap();

    let report = pypeline.run("daily", Placeholders::new()).await.unwrap();

    // 5 rows at bulk size 2: fetches of 2, 2, 1
    let load = &report.pypes[0];
    assert_eq!(load.fetches, 3);
    assert_eq!(load.batches_written, 3);
    assert_eq!(load.rows_written, 5);
    assert_eq!(seen.load(Ordering::SeqCst), 5);

    let purge = &report.pypes[1];
    assert_eq!(purge.rows_extracted, 3);
    assert_eq!(purge.statements, 2);

    let statements = journal.statements();
    assert_eq!(statements.len(), 5);
    assert_eq!(
        statements[0].sql,
        "INSERT INTO analytics.events (id, kind, first_seen) VALUES ($1, $2, $3), ($4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET kind = excluded.kind"
    );
    assert_eq!(statements[0].params[1], SqlParam::Value(Value::from("click1")));
    assert_eq!(statements[3].sql, "DELETE FROM analytics.events WHERE id = ANY($1)");
    assert_eq!(statements[3].params, vec![SqlParam::Array(vec![Value::from("2")])]);
    assert_eq!(statements[4].sql, "ANALYZE analytics.events");

    // every write is followed by its own commit
    let entries = journal.entries();
    assert_eq!(entries.len(), 10);
    assert!(entries.iter().skip(1).step_by(2).all(|e| *e == JournalEntry::Commit));

    assert_eq!(stats.commits(), 2);
    assert_eq!(
        stats.queries(),
        vec![
            "SELECT * FROM events WHERE day = '2024-03-01'",
            "SELECT id FROM events_deleted WHERE day = '2024-03-01'",
        ]
    );
}

#[tokio::test]
async fn fetch_failure_leaves_earlier_batches_committed() {
    let source = MemorySource::new(events(6)).fail_on_fetch(2);
    let destination = MemoryDestination::new();
    let journal = destination.journal();

    let mut pypeline = PypelineBuilder::new()
        .definition_file(write_definition("partial"))
        .source(source)
        .destination(destination)
        .registry(counting_registry(Arc::new(AtomicUsize::new(0))))
        .build()
        .unwrap();

    let err = pypeline.run("daily", Placeholders::new()).await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(journal.commits(), 2);
    assert!(journal.statements().iter().all(|s| s.sql.starts_with("INSERT")));
}

#[tokio::test]
async fn unregistered_transformer_is_a_config_error() {
    let source = MemorySource::new(events(1));
    let stats = source.stats();

    let mut pypeline = PypelineBuilder::new()
        .definition_file(write_definition("unregistered"))
        .source(source)
        .destination(MemoryDestination::new())
        .build()
        .unwrap();

    let err = pypeline.run("daily", Placeholders::new()).await.unwrap_err();

    assert!(err.is_config());
    assert!(stats.untouched());
}
