use async_trait::async_trait;
use pypeline_utils::PypelineResult;

use crate::query::Statement;

/// The store batches are written to.
#[async_trait]
pub trait DestinationConnection: Send {
    fn name(&self) -> &str;

    /// Check the connection is alive, reconnecting if it is not.
    async fn ensure_connected(&mut self) -> PypelineResult<()> {
        Ok(())
    }

    /// Execute one statement with positional (`$n`) parameters, returning
    /// the number of rows affected when the store reports it.
    async fn execute(&mut self, statement: &Statement) -> PypelineResult<u64>;

    /// Commit everything executed since the last commit.
    async fn commit(&mut self) -> PypelineResult<()>;
}
