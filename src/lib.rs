pub use pypeline_core as core;
pub use pypeline_utils as utils;

// Convenience re-exports for common usage
pub use pypeline_core::builder::PypelineBuilder;
pub use pypeline_core::engine::{Pypeline, PypelineReport};
pub use pypeline_core::pipeline::{Pype, PypeReport};
pub use pypeline_core::sources::traits::SourceConnection;
pub use pypeline_core::transforms::traits::Transform;
pub use pypeline_core::destinations::traits::DestinationConnection;
pub use pypeline_utils::{PypelineResult, Record, Value};
