//! Split one dataset into one output per distinct value of a field
//!
//! Outputs are named `<out_dir>/<layer>_<field>_<value>.<ext>`. Every group
//! re-reads the whole input and keeps the records whose value is raw-equal
//! to the group's value. A group whose stale output cannot be deleted is
//! recorded in [`SplitReport::errors`] and skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vecbatch_core::{AttributeValue, DatasetReader, DatasetWriter, LayerSpec, VectorDriver};

use crate::context::{JobContext, JobState};
use crate::error::{JobError, Result};
use crate::job::{BatchJob, JobReport, JobStatus};
use crate::partition::distinct_values;

/// Parameters for a split job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitParams {
    pub field_name: String,
    /// Encoding of the output datasets
    pub encoding: String,
    pub out_dir: PathBuf,
}

impl SplitParams {
    pub fn new(field_name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            field_name: field_name.into(),
            encoding: "UTF-8".to_string(),
            out_dir: out_dir.into(),
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }
}

/// One written group
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutput {
    pub value: AttributeValue,
    pub path: PathBuf,
    pub records: usize,
}

/// One group that failed without stopping the job
#[derive(Debug, Clone, PartialEq)]
pub struct GroupError {
    pub value: AttributeValue,
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a split job that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReport {
    pub status: JobStatus,
    /// Number of distinct values found
    pub groups: usize,
    pub outputs: Vec<SplitOutput>,
    pub errors: Vec<GroupError>,
}

impl SplitReport {
    /// Completed with no group errors
    pub fn is_clean(&self) -> bool {
        self.status == JobStatus::Completed && self.errors.is_empty()
    }
}

/// Output path for one group.
///
/// The value is stringified and trimmed; path separators in it become `_`.
pub fn split_output_path(
    out_dir: &Path,
    layer_name: &str,
    field_name: &str,
    value: &AttributeValue,
    extension: &str,
) -> PathBuf {
    let value: String = value
        .display_trimmed()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    out_dir.join(format!("{}_{}_{}.{}", layer_name, field_name, value, extension))
}

/// Split `source` by `params.field_name` into `params.out_dir`.
pub fn run_split<D, R>(
    driver: &D,
    source: &mut R,
    params: &SplitParams,
    ctx: &JobContext,
) -> Result<SplitReport>
where
    D: VectorDriver,
    R: DatasetReader + ?Sized,
{
    let field_index = source
        .field_index(&params.field_name)
        .ok_or_else(|| JobError::InvalidField {
            field: params.field_name.clone(),
            reason: format!("not found in layer '{}'", source.layer_name()),
        })?;

    ctx.set_state(JobState::Scanning);
    let values = distinct_values(source, field_index)?;
    ctx.set_range(values.len() as u64);
    info!(
        field = %params.field_name,
        groups = values.len(),
        "splitting layer '{}'",
        source.layer_name()
    );

    ctx.set_state(JobState::Writing);
    let spec = LayerSpec {
        name: source.layer_name().to_string(),
        fields: source.fields().to_vec(),
        geometry_type: source.geometry_type(),
        crs: source.crs().cloned(),
        encoding: params.encoding.clone(),
    };

    let mut outputs = Vec::new();
    let mut errors = Vec::new();
    let mut used_paths = HashSet::new();
    let mut interrupted = false;

    for value in &values {
        let path = split_output_path(
            &params.out_dir,
            &spec.name,
            &params.field_name,
            value,
            driver.file_extension(),
        );
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.file_changed(&file_name);
        if !used_paths.insert(path.clone()) {
            warn!(path = %path.display(), value = ?value, "output name shared with an earlier group; it will be replaced");
            if let Some(pos) = outputs.iter().position(|o: &SplitOutput| o.path == path) {
                let replaced = outputs.remove(pos);
                errors.push(GroupError {
                    reason: format!(
                        "output replaced by group '{}' ({} records lost)",
                        value, replaced.records
                    ),
                    value: replaced.value,
                    path: replaced.path,
                });
            }
        }

        match write_group(driver, source, field_index, value, &path, &spec, &mut errors) {
            Ok(Some(records)) => {
                ctx.file_completed(&file_name);
                outputs.push(SplitOutput {
                    value: value.clone(),
                    path,
                    records,
                });
            }
            Ok(None) => {}
            Err(e) => return Err(e),
        }

        ctx.tick();
        if ctx.is_cancelled() {
            info!(after = %file_name, "split interrupted");
            interrupted = true;
            break;
        }
    }

    Ok(SplitReport {
        status: if interrupted {
            JobStatus::Interrupted
        } else {
            JobStatus::Completed
        },
        groups: values.len(),
        outputs,
        errors,
    })
}

/// Write one group. `Ok(None)` when the stale output could not be deleted.
fn write_group<D, R>(
    driver: &D,
    source: &mut R,
    field_index: usize,
    value: &AttributeValue,
    path: &Path,
    spec: &LayerSpec,
    errors: &mut Vec<GroupError>,
) -> Result<Option<usize>>
where
    D: VectorDriver,
    R: DatasetReader + ?Sized,
{
    let group_error = |reason: String| GroupError {
        value: value.clone(),
        path: path.to_path_buf(),
        reason,
    };

    if driver.exists(path) {
        if let Err(e) = driver.delete(path) {
            warn!(path = %path.display(), error = %e, "cannot delete existing output; group skipped");
            errors.push(group_error(format!("cannot delete existing output: {}", e)));
            return Ok(None);
        }
    }

    let mut writer = driver.create(path, spec)?;
    match source.records() {
        Ok(records) => {
            for (n, record) in records.enumerate() {
                let outcome = record.and_then(|record| {
                    let selected = match record.attributes.get(field_index) {
                        Some(current) => current.raw_eq(value),
                        None => value.is_null(),
                    };
                    if selected {
                        writer.append(record)
                    } else {
                        Ok(())
                    }
                });
                if let Err(e) = outcome {
                    errors.push(group_error(format!("record {}: {}", n, e)));
                }
            }
        }
        Err(e) => errors.push(group_error(e.to_string())),
    }

    Ok(Some(writer.close()?))
}

/// Split job for a [`JobRunner`](crate::runner::JobRunner); opens `input`
/// on the worker thread.
pub struct SplitJob<D> {
    driver: D,
    input: PathBuf,
    input_encoding: String,
    params: SplitParams,
}

impl<D: VectorDriver> SplitJob<D> {
    pub fn new(driver: D, input: impl Into<PathBuf>, params: SplitParams) -> Self {
        Self {
            driver,
            input: input.into(),
            input_encoding: "UTF-8".to_string(),
            params,
        }
    }

    pub fn with_input_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.input_encoding = encoding.into();
        self
    }
}

impl<D: VectorDriver + 'static> BatchJob for SplitJob<D> {
    fn name(&self) -> &str {
        "split"
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobReport> {
        let mut source = self.driver.open(&self.input, &self.input_encoding)?;
        run_split(&self.driver, &mut source, &self.params, ctx).map(JobReport::Split)
    }
}
