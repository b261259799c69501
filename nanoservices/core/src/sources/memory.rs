//! A source serving pre-seeded records, for dry runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pypeline_utils::error::Error;
use pypeline_utils::{PypelineResult, Record};

use crate::sources::traits::{RowCursor, SourceConnection};

/// Counters shared between a [`MemorySource`] and whoever inspects it.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub pings: AtomicUsize,
    pub fetches: AtomicUsize,
    pub commits: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl SourceStats {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Every query text received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// True while no query has been issued and no fetch made.
    pub fn untouched(&self) -> bool {
        self.pings() == 0 && self.fetches() == 0 && self.queries().is_empty()
    }
}

/// Serves the rows registered for a query (matched on the exact, hydrated
/// text) or the default rows for any other query.
#[derive(Debug, Default)]
pub struct MemorySource {
    default_rows: Vec<Record>,
    results: Vec<(String, Vec<Record>)>,
    fail_on_fetch: Option<usize>,
    stats: Arc<SourceStats>,
}

impl MemorySource {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { default_rows: rows, ..Self::default() }
    }

    /// Rows returned when exactly `sql` is queried.
    pub fn with_result(mut self, sql: impl Into<String>, rows: Vec<Record>) -> Self {
        self.results.push((sql.into(), rows));
        self
    }

    /// Make the fetch with this zero-based index (counted across the
    /// source's lifetime) fail.
    pub fn fail_on_fetch(mut self, fetch: usize) -> Self {
        self.fail_on_fetch = Some(fetch);
        self
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    fn rows_for(&self, sql: &str) -> &[Record] {
        self.results
            .iter()
            .find(|(q, _)| q == sql)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or(&self.default_rows)
    }
}

#[async_trait]
impl SourceConnection for MemorySource {
    fn name(&self) -> &str { "memory" }

    async fn ensure_connected(&mut self) -> PypelineResult<()> {
        self.stats.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query<'a>(&'a mut self, sql: &str) -> PypelineResult<Box<dyn RowCursor + 'a>> {
        self.stats
            .queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());
        Ok(Box::new(MemoryCursor {
            rows: self.rows_for(sql),
            position: 0,
            fail_on_fetch: self.fail_on_fetch,
            stats: &self.stats,
        }))
    }

    async fn commit(&mut self) -> PypelineResult<()> {
        self.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryCursor<'a> {
    rows: &'a [Record],
    position: usize,
    fail_on_fetch: Option<usize>,
    stats: &'a SourceStats,
}

#[async_trait]
impl RowCursor for MemoryCursor<'_> {
    async fn fetch_many(&mut self, max_rows: usize) -> PypelineResult<Vec<Record>> {
        let fetch = self.stats.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_fetch == Some(fetch) {
            return Err(Error::storage(format!("memory source: fetch {fetch} failed")));
        }
        let end = (self.position + max_rows).min(self.rows.len());
        let chunk = self.rows[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}
