use pypeline_utils::{PypelineResult, Record};

/// One step of a pype's transform chain.
///
/// A step sees one record at a time and returns its replacement, or `None`
/// to drop it. Steps may keep state across calls but must not assume
/// anything about batch boundaries. An error aborts the whole pype run.
pub trait Transform: Send {
    fn name(&self) -> &str;

    fn apply(&mut self, record: Record) -> PypelineResult<Option<Record>>;
}
