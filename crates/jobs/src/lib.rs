//! # VecBatch Jobs
//!
//! Batch transforms over vector datasets, run off the calling thread.
//!
//! ## Jobs
//!
//! - **merge**: N input datasets into one output, with schema unification
//! - **split**: one input into one output per distinct value of a field
//! - **clip**: one input cropped to an extent by the external `ogr2ogr` tool
//!
//! Every job reports progress through a [`JobContext`] and checks its
//! [`CancellationToken`] at file or group boundaries. [`JobRunner`] runs a job on
//! a worker thread and hands the events back over a channel.

pub mod clip;
pub mod context;
pub mod error;
pub mod job;
pub mod merge;
pub mod partition;
pub mod runner;
pub mod schema;
pub mod split;

pub use clip::{run_clip, ClipJob, ClipParams, ClipReport, Extent};
pub use context::{CancellationToken, JobContext, JobEvent, JobState};
pub use error::{JobError, Result};
pub use job::{BatchJob, JobReport, JobStatus};
pub use merge::{
    collect_inputs, collect_inputs_by_geometry, run_merge, MergeJob, MergeParams, MergeReport,
    MissingValuePolicy, SkippedInput,
};
pub use partition::distinct_values;
pub use runner::JobRunner;
pub use schema::{unify, SchemaMapping, SchemaUnifier, UnifiedSchema};
pub use split::{run_split, split_output_path, GroupError, SplitJob, SplitOutput, SplitParams, SplitReport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::{CancellationToken, JobContext, JobEvent, JobState};
    pub use crate::job::{BatchJob, JobReport, JobStatus};
    pub use crate::merge::{MergeJob, MergeParams};
    pub use crate::runner::JobRunner;
    pub use crate::split::{SplitJob, SplitParams};
    pub use vecbatch_core::prelude::*;
}
