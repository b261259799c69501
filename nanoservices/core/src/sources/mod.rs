pub mod memory;
pub mod mysql;
pub mod postgres;
pub mod traits;

pub use memory::MemorySource;
pub use mysql::MySqlSource;
pub use postgres::PostgresSource;
pub use traits::{RowCursor, SourceConnection};
