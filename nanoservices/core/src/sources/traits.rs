use async_trait::async_trait;
use pypeline_utils::{PypelineResult, Record};

/// The store rows are extracted from.
#[async_trait]
pub trait SourceConnection: Send {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Check the connection is alive, reconnecting if it is not.
    async fn ensure_connected(&mut self) -> PypelineResult<()>;

    /// Run `sql` and open a forward-only cursor over its rows.
    ///
    /// The cursor borrows the connection for as long as it is read from.
    async fn query<'a>(&'a mut self, sql: &str) -> PypelineResult<Box<dyn RowCursor + 'a>>;

    /// Commit the read transaction, releasing any open cursor.
    async fn commit(&mut self) -> PypelineResult<()>;
}

/// An open result set read in bounded chunks.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch up to `max_rows` rows. Fewer rows than asked for means the
    /// result set is exhausted.
    async fn fetch_many(&mut self, max_rows: usize) -> PypelineResult<Vec<Record>>;
}
