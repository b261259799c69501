//! A destination that journals statements instead of running them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pypeline_utils::error::Error;
use pypeline_utils::PypelineResult;

use crate::destinations::traits::DestinationConnection;
use crate::query::Statement;

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Execute(Statement),
    Commit,
}

/// Shared, append-only record of what a [`MemoryDestination`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    fn push(&self, entry: JournalEntry) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                JournalEntry::Execute(s) => Some(s),
                JournalEntry::Commit => None,
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.entries().iter().filter(|e| **e == JournalEntry::Commit).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MemoryDestination {
    journal: Journal,
    fail_on: Option<String>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement whose SQL contains `fragment`.
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

#[async_trait]
impl DestinationConnection for MemoryDestination {
    fn name(&self) -> &str { "memory" }

    async fn execute(&mut self, statement: &Statement) -> PypelineResult<u64> {
        if let Some(fragment) = &self.fail_on {
            if statement.sql.contains(fragment.as_str()) {
                return Err(Error::storage(format!("memory destination rejected `{}`", statement.sql)));
            }
        }
        self.journal.push(JournalEntry::Execute(statement.clone()));
        Ok(0)
    }

    async fn commit(&mut self) -> PypelineResult<()> {
        self.journal.push(JournalEntry::Commit);
        Ok(())
    }
}
