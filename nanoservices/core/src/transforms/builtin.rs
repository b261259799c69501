use pypeline_utils::{PypelineResult, Record, Value};

use crate::transforms::traits::Transform;

/// Hands every record through untouched.
#[derive(Debug, Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn name(&self) -> &str { "passthrough" }

    fn apply(&mut self, record: Record) -> PypelineResult<Option<Record>> {
        Ok(Some(record))
    }
}

/// Drop records containing any null value.
#[derive(Debug, Default)]
pub struct DropNulls;

impl Transform for DropNulls {
    fn name(&self) -> &str { "drop_nulls" }

    fn apply(&mut self, record: Record) -> PypelineResult<Option<Record>> {
        if record.values().any(Value::is_null) {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }
}

/// Trim leading and trailing whitespace from text values.
#[derive(Debug, Default)]
pub struct TrimStrings;

impl Transform for TrimStrings {
    fn name(&self) -> &str { "trim_strings" }

    fn apply(&mut self, mut record: Record) -> PypelineResult<Option<Record>> {
        for value in record.values_mut() {
            if let Value::Text(s) = value {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }
        Ok(Some(record))
    }
}

/// Turn empty text values into nulls.
#[derive(Debug, Default)]
pub struct EmptyStringsToNull;

impl Transform for EmptyStringsToNull {
    fn name(&self) -> &str { "empty_strings_to_null" }

    fn apply(&mut self, mut record: Record) -> PypelineResult<Option<Record>> {
        for value in record.values_mut() {
            if matches!(value, Value::Text(s) if s.is_empty()) {
                *value = Value::Null;
            }
        }
        Ok(Some(record))
    }
}
