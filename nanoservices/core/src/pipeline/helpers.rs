//! Diagnostics for debug-mode pypes: per-batch phase timings and the
//! resident memory of the current process.

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Reads the resident memory of this process (single-PID refresh).
pub struct MemorySampler {
    system: System,
    pid: Pid,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Resident set size in bytes, or 0 when the process cannot be read.
    pub fn resident_bytes(&mut self) -> u64 {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// Wall-clock time spent in each phase of one batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchTimings {
    pub extract: Duration,
    pub transform: Duration,
    pub load: Duration,
}

impl BatchTimings {
    pub fn total(&self) -> Duration {
        self.extract + self.transform + self.load
    }
}

pub(crate) fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
