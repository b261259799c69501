pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{Journal, JournalEntry, MemoryDestination};
pub use postgres::PostgresDestination;
pub use traits::DestinationConnection;
