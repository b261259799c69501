use async_trait::async_trait;
use tokio_postgres::Client;

use pypeline_utils::error::Error;
use pypeline_utils::{PypelineResult, Record};

use crate::postgres::{connect, decode_row, is_alive};
use crate::sources::traits::{RowCursor, SourceConnection};

/// PostgreSQL source reading through a server-side cursor.
///
/// `query` opens a transaction and declares a `NO SCROLL` cursor over the
/// extract query; each fetch asks the server for the next `n` rows, so only
/// one batch is ever held in memory.
pub struct PostgresSource {
    name: String,
    config: String,
    client: Option<Client>,
    in_transaction: bool,
    cursors_opened: u64,
}

impl PostgresSource {
    /// A source for the given connection string; it connects lazily on
    /// [`SourceConnection::ensure_connected`].
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            name: "postgres-source".to_string(),
            config: config.into(),
            client: None,
            in_transaction: false,
            cursors_opened: 0,
        }
    }

    /// Connect eagerly.
    pub async fn connect(config: impl Into<String>) -> PypelineResult<Self> {
        let mut source = Self::new(config);
        source.ensure_connected().await?;
        Ok(source)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl SourceConnection for PostgresSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_connected(&mut self) -> PypelineResult<()> {
        if !is_alive(self.client.as_ref()).await {
            tracing::info!(source = %self.name, "connecting to source");
            self.client = Some(connect(&self.config).await?);
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn query<'a>(&'a mut self, sql: &str) -> PypelineResult<Box<dyn RowCursor + 'a>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::storage(format!("source `{}` is not connected", self.name)))?;

        if !self.in_transaction {
            client.batch_execute("BEGIN READ ONLY").await?;
            self.in_transaction = true;
        }

        self.cursors_opened += 1;
        let cursor = format!("pypeline_cursor_{}", self.cursors_opened);
        let sql = sql.trim_end().trim_end_matches(';');
        client
            .batch_execute(&format!("DECLARE {cursor} NO SCROLL CURSOR FOR {sql}"))
            .await?;
        tracing::debug!(source = %self.name, cursor = %cursor, "cursor declared");

        Ok(Box::new(PostgresCursor { client, cursor }))
    }

    async fn commit(&mut self) -> PypelineResult<()> {
        if let Some(client) = &self.client {
            if self.in_transaction {
                client.batch_execute("COMMIT").await?;
                self.in_transaction = false;
            }
        }
        Ok(())
    }
}

struct PostgresCursor<'a> {
    client: &'a Client,
    cursor: String,
}

#[async_trait]
impl RowCursor for PostgresCursor<'_> {
    async fn fetch_many(&mut self, max_rows: usize) -> PypelineResult<Vec<Record>> {
        let sql = format!("FETCH FORWARD {max_rows} FROM {}", self.cursor);
        let rows = self.client.query(sql.as_str(), &[]).await?;
        rows.iter().map(decode_row).collect()
    }
}
