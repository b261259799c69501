//! Needs a scratch database:
//! `PYPELINE_TEST_PG_URL="host=localhost user=postgres" cargo test -- --ignored`

use pypeline_core::config::parse_definition;
use pypeline_core::destinations::PostgresDestination;
use pypeline_core::engine::Pypeline;
use pypeline_core::query::Placeholders;
use pypeline_core::sources::PostgresSource;
use tokio_postgres::NoTls;

const DEFINITION: &str = r#"
pypes:
  copy:
    extract_query: "SELECT id, name, score, seen_at FROM {schema}.src ORDER BY id"
    target_table: pypeline_it.dst
    bulk_size: 2
  rescore:
    extract_query: "SELECT id, score * 10 AS score FROM {schema}.src"
    target_table: pypeline_it.dst
    write_mode: update
  purge:
    extract_query: "SELECT id::text AS id FROM {schema}.src WHERE name = 'gone'"
    target_table: pypeline_it.dst
    write_mode: delete
    identifier_column: id
    post_query: "ANALYZE {schema}.dst"
pypelines:
  roundtrip: [copy, rescore, purge]
"#;

#[tokio::test]
#[ignore]
async fn upsert_update_delete_roundtrip() {
    let url = std::env::var("PYPELINE_TEST_PG_URL").expect("PYPELINE_TEST_PG_URL");
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await.unwrap();
    tokio::spawn(connection);

    client
        .batch_execute(
            "DROP SCHEMA IF EXISTS pypeline_it CASCADE;
             CREATE SCHEMA pypeline_it;
             CREATE TABLE pypeline_it.src (id int PRIMARY KEY, name text, score real, seen_at timestamp);
             CREATE TABLE pypeline_it.dst (id int PRIMARY KEY, name text, score real, seen_at timestamp);
             INSERT INTO pypeline_it.src VALUES
               (1, 'a', 1.5, '2024-01-01 10:00'),
               (2, 'gone', 2, NULL),
               (3, 'c', NULL, '2024-01-03 10:00');
             INSERT INTO pypeline_it.dst VALUES (1, 'stale', 0, NULL);",
        )
        .await
        .unwrap();

    let mut pypeline = Pypeline::new(
        parse_definition(DEFINITION).unwrap(),
        Box::new(PostgresSource::new(url.clone())),
        Box::new(PostgresDestination::new(url.clone())),
    )
    .with_placeholders([("{schema}".to_string(), "pypeline_it".to_string())].into_iter().collect());

    let report = pypeline.run("roundtrip", Placeholders::new()).await.unwrap();
    assert_eq!(report.pypes[0].fetches, 2);
    assert_eq!(report.pypes[0].rows_written, 3);

    let rows = client
        .query("SELECT id, name, score FROM pypeline_it.dst ORDER BY id", &[])
        .await
        .unwrap();
    let got: Vec<(i32, Option<String>, Option<f32>)> =
        rows.iter().map(|r| (r.get(0), r.get(1), r.get(2))).collect();

    assert_eq!(
        got,
        vec![(1, Some("a".to_string()), Some(15.0)), (3, Some("c".to_string()), None)]
    );

    client.batch_execute("DROP SCHEMA pypeline_it CASCADE").await.unwrap();
}
