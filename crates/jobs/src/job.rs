//! The job trait and the reports jobs produce.

use serde::{Deserialize, Serialize};

use crate::clip::ClipReport;
use crate::context::JobContext;
use crate::error::Result;
use crate::merge::MergeReport;
use crate::split::SplitReport;

/// How a job that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Interrupted,
}

/// Final report of any job
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    Merge(MergeReport),
    Split(SplitReport),
    Clip(ClipReport),
}

impl JobReport {
    pub fn status(&self) -> JobStatus {
        match self {
            JobReport::Merge(r) => r.status,
            JobReport::Split(r) => r.status,
            JobReport::Clip(r) => r.status,
        }
    }

    /// Accumulated soft errors, one line each. Empty means a clean run.
    pub fn soft_errors(&self) -> Vec<String> {
        match self {
            JobReport::Merge(r) => r
                .skipped
                .iter()
                .map(|s| format!("skipped {}: {}", s.file_name, s.reason))
                .chain(r.errors.iter().cloned())
                .collect(),
            JobReport::Split(r) => r
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.path.display(), e.reason))
                .collect(),
            JobReport::Clip(_) => Vec::new(),
        }
    }
}

/// A unit of work a [`JobRunner`](crate::runner::JobRunner) can execute.
///
/// `run` performs all of its I/O on the calling thread, emits progress
/// through `ctx`, and returns `Err` only for unrecoverable setup failures.
pub trait BatchJob: Send + 'static {
    fn name(&self) -> &str;

    fn run(&mut self, ctx: &JobContext) -> Result<JobReport>;
}
