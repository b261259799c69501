use async_trait::async_trait;
use postgres_types::ToSql;
use tokio_postgres::Client;

use pypeline_utils::error::Error;
use pypeline_utils::PypelineResult;

use crate::destinations::traits::DestinationConnection;
use crate::postgres::{connect, is_alive, PgParam};
use crate::query::Statement;

/// PostgreSQL destination with explicit transactions.
///
/// The first statement after a commit opens a transaction; `commit` ends it.
/// A failed statement rolls the open transaction back before the error is
/// returned, so the connection stays usable for the next pype.
pub struct PostgresDestination {
    name: String,
    config: String,
    client: Option<Client>,
    in_transaction: bool,
}

impl PostgresDestination {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            name: "postgres-destination".to_string(),
            config: config.into(),
            client: None,
            in_transaction: false,
        }
    }

    /// Connect eagerly.
    pub async fn connect(config: impl Into<String>) -> PypelineResult<Self> {
        let mut destination = Self::new(config);
        destination.ensure_connected().await?;
        Ok(destination)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn client(&self) -> PypelineResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::storage(format!("destination `{}` is not connected", self.name)))
    }

    async fn run(&self, statement: &Statement) -> PypelineResult<u64> {
        let client = self.client()?;
        if statement.params.is_empty() {
            // Simple protocol, so a post query may hold several statements.
            client.batch_execute(&statement.sql).await?;
            return Ok(0);
        }

        let params: Vec<PgParam<'_>> = statement.params.iter().map(PgParam::from).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(PgParam::as_tosql).collect();
        Ok(client.execute(statement.sql.as_str(), &refs).await?)
    }
}

#[async_trait]
impl DestinationConnection for PostgresDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_connected(&mut self) -> PypelineResult<()> {
        if !is_alive(self.client.as_ref()).await {
            tracing::info!(destination = %self.name, "connecting to destination");
            self.client = Some(connect(&self.config).await?);
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> PypelineResult<u64> {
        if !self.in_transaction {
            self.client()?.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }

        match self.run(statement).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                if let Err(rollback) = self.client()?.batch_execute("ROLLBACK").await {
                    tracing::warn!(destination = %self.name, error = %rollback, "rollback failed");
                }
                self.in_transaction = false;
                Err(e)
            }
        }
    }

    async fn commit(&mut self) -> PypelineResult<()> {
        if self.in_transaction {
            self.client()?.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }
}
