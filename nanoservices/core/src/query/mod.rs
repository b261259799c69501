pub mod statement;
pub mod template;

pub use statement::{delete_statement, LoadQuery, SqlParam, Statement};
pub use template::{hydrate, hydrate_with_offset, Placeholders};
