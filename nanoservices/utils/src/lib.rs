pub mod error;
pub mod record;

use error::Error;

pub use record::{Record, Value};

pub type PypelineResult<T> = Result<T, Error>;

/// A bounded slice of source rows processed as one extract/transform/load cycle.
pub type Batch = Vec<Record>;
