//! Progress reporting collaborator.
//!
//! The pipeline emits discrete `(phase, processed, total)` events; what is
//! done with them (log lines, a progress bar, nothing) is up to the reporter.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Discovering,
    Learning,
    Filtering,
    Extracting,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Discovering => "discovering",
            RunPhase::Learning => "learning",
            RunPhase::Filtering => "filtering",
            RunPhase::Extracting => "extracting",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: RunPhase,
    pub processed: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn new(phase: RunPhase, processed: usize, total: usize) -> Self {
        Self {
            phase,
            processed,
            total,
        }
    }

    /// Phase boundary marker: nothing processed yet.
    pub fn entered(phase: RunPhase, total: usize) -> Self {
        Self::new(phase, 0, total)
    }
}

/// Receives progress events. Called from worker tasks, so keep it cheap.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Logs phase changes at `info` and every `every`-th item at `debug`.
#[derive(Debug, Clone, Copy)]
pub struct TracingProgress {
    every: usize,
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self { every: 50 }
    }
}

impl TracingProgress {
    pub fn every(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl ProgressReporter for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        if event.processed == 0 || event.phase == RunPhase::Done {
            info!(phase = %event.phase, total = event.total, "phase started");
        } else if event.processed % self.every == 0 || event.processed == event.total {
            debug!(
                phase = %event.phase,
                processed = event.processed,
                total = event.total,
                "progress"
            );
        }
    }
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |e: ProgressEvent| seen.lock().unwrap().push(e);
        reporter.report(ProgressEvent::entered(RunPhase::Learning, 10));
        reporter.report(ProgressEvent::new(RunPhase::Learning, 1, 10));
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].processed, 1);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::Extracting.to_string(), "extracting");
    }
}
