//! Merge several datasets into one
//!
//! Two passes over the inputs. The scan pass opens every input and unifies
//! the field lists; inputs that cannot be opened are skipped. The write pass
//! re-opens each input and copies its records into the output, with
//! attributes re-indexed into the merged schema.
//!
//! The output takes geometry type and CRS from the first input that opened.
//! Other inputs are not checked against it; the ones that differ are only
//! listed in [`MergeReport::mismatched_inputs`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vecbatch_core::crs::same_frame;
use vecbatch_core::io::layer_name_from_path;
use vecbatch_core::{
    AttributeValue, DatasetReader, DatasetWriter, FieldSchema, GeometryType, LayerSpec, Record,
    VectorDriver, CRS,
};

use crate::context::{JobContext, JobState};
use crate::error::{JobError, Result};
use crate::job::{BatchJob, JobReport, JobStatus};
use crate::schema::SchemaUnifier;

/// Value written into merged fields an input does not have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingValuePolicy {
    #[default]
    EmptyString,
    Null,
}

impl MissingValuePolicy {
    pub fn fill_value(&self) -> AttributeValue {
        match self {
            MissingValuePolicy::EmptyString => AttributeValue::empty(),
            MissingValuePolicy::Null => AttributeValue::Null,
        }
    }
}

/// Parameters for a merge job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeParams {
    /// Directory the file names are relative to
    pub base_dir: PathBuf,
    pub file_names: Vec<String>,
    pub input_encoding: String,
    pub output_path: PathBuf,
    pub output_encoding: String,
    #[serde(default)]
    pub missing_value: MissingValuePolicy,
}

impl MergeParams {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        file_names: Vec<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_names,
            input_encoding: "UTF-8".to_string(),
            output_path: output_path.into(),
            output_encoding: "UTF-8".to_string(),
            missing_value: MissingValuePolicy::default(),
        }
    }

    pub fn with_encodings(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_encoding = input.into();
        self.output_encoding = output.into();
        self
    }

    pub fn with_missing_value(mut self, policy: MissingValuePolicy) -> Self {
        self.missing_value = policy;
        self
    }
}

/// An input that could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedInput {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of a merge job that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub status: JobStatus,
    pub output_path: PathBuf,
    pub fields: Vec<FieldSchema>,
    /// Inputs fully copied into the output, in order
    pub files_written: Vec<String>,
    pub records_written: usize,
    pub skipped: Vec<SkippedInput>,
    /// Per-record read or write failures
    pub errors: Vec<String>,
    /// Inputs whose geometry type or CRS differs from the first input
    pub mismatched_inputs: Vec<String>,
}

struct ScannedInput {
    file_name: String,
    path: PathBuf,
    geometry_type: GeometryType,
    crs: Option<CRS>,
}

/// Merge `params.file_names` into `params.output_path`.
pub fn run_merge<D: VectorDriver>(
    driver: &D,
    params: &MergeParams,
    ctx: &JobContext,
) -> Result<MergeReport> {
    if params.file_names.is_empty() {
        return Err(JobError::EmptyInput);
    }

    ctx.set_state(JobState::Scanning);
    ctx.set_range(params.file_names.len() as u64);

    let mut unifier = SchemaUnifier::new();
    let mut inputs: Vec<ScannedInput> = Vec::new();
    let mut skipped = Vec::new();

    for file_name in &params.file_names {
        let path = params.base_dir.join(file_name);
        match driver.open(&path, &params.input_encoding) {
            Ok(reader) => {
                unifier.add_dataset(reader.fields());
                inputs.push(ScannedInput {
                    file_name: file_name.clone(),
                    path,
                    geometry_type: reader.geometry_type(),
                    crs: reader.crs().cloned(),
                });
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "skipping input");
                skipped.push(SkippedInput {
                    file_name: file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        ctx.tick();
    }

    let schema = unifier.finish()?;
    let first = inputs.first().ok_or(JobError::EmptyInput)?;
    let mismatched_inputs: Vec<String> = inputs
        .iter()
        .skip(1)
        .filter(|i| {
            i.geometry_type != first.geometry_type
                || !same_frame(i.crs.as_ref(), first.crs.as_ref())
        })
        .map(|i| i.file_name.clone())
        .collect();
    if !mismatched_inputs.is_empty() {
        warn!(
            inputs = ?mismatched_inputs,
            reference = %first.file_name,
            "geometry type or CRS differs from the first input; using the first input's"
        );
    }
    info!(
        inputs = inputs.len(),
        skipped = skipped.len(),
        fields = schema.fields.len(),
        "schema unified"
    );

    ctx.set_state(JobState::Writing);
    remove_existing_output(driver, &params.output_path)?;

    let spec = LayerSpec {
        name: layer_name_from_path(&params.output_path),
        fields: schema.fields.clone(),
        geometry_type: first.geometry_type,
        crs: first.crs.clone(),
        encoding: params.output_encoding.clone(),
    };
    let mut writer = driver.create(&params.output_path, &spec)?;
    let fill = params.missing_value.fill_value();

    let mut files_written = Vec::new();
    let mut errors = Vec::new();
    let mut interrupted = false;

    for (dataset, input) in inputs.iter().enumerate() {
        match driver.open(&input.path, &params.input_encoding) {
            Ok(mut reader) => {
                ctx.set_range(reader.record_count() as u64);
                ctx.file_changed(&input.file_name);
                copy_records(
                    &mut reader,
                    &mut writer,
                    |attrs| schema.remap(dataset, attrs, &fill),
                    &input.file_name,
                    ctx,
                    &mut errors,
                );
                ctx.file_completed(&input.file_name);
                files_written.push(input.file_name.clone());
            }
            Err(e) => {
                warn!(file = %input.file_name, error = %e, "input vanished between passes");
                skipped.push(SkippedInput {
                    file_name: input.file_name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if ctx.is_cancelled() {
            info!(after = %input.file_name, "merge interrupted");
            interrupted = true;
            break;
        }
    }

    let records_written = writer.close()?;

    Ok(MergeReport {
        status: if interrupted {
            JobStatus::Interrupted
        } else {
            JobStatus::Completed
        },
        output_path: params.output_path.clone(),
        fields: schema.fields,
        files_written,
        records_written,
        skipped,
        errors,
        mismatched_inputs,
    })
}

fn copy_records<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    remap: F,
    file_name: &str,
    ctx: &JobContext,
    errors: &mut Vec<String>,
) where
    R: DatasetReader,
    W: DatasetWriter,
    F: Fn(Vec<AttributeValue>) -> Vec<AttributeValue>,
{
    let records = match reader.records() {
        Ok(records) => records,
        Err(e) => {
            errors.push(format!("{}: {}", file_name, e));
            return;
        }
    };
    for (n, record) in records.enumerate() {
        let outcome = record.and_then(|record| {
            writer.append(Record {
                attributes: remap(record.attributes),
                geometry: record.geometry,
            })
        });
        if let Err(e) = outcome {
            debug!(file = %file_name, record = n, error = %e, "record not copied");
            errors.push(format!("{} record {}: {}", file_name, n, e));
        }
        ctx.tick();
    }
}

fn remove_existing_output<D: VectorDriver>(driver: &D, path: &Path) -> Result<()> {
    if !driver.exists(path) {
        return Ok(());
    }
    driver.delete(path).map_err(|e| JobError::OutputDelete {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!(path = %path.display(), "replaced existing output");
    Ok(())
}

/// File names in `dir` whose extension is `extension` (any case), sorted.
pub fn collect_inputs(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Datasets of `driver`'s format in `dir`, sorted, optionally restricted to
/// one geometry family (`MultiPolygon` matches `Polygon` and so on).
///
/// Each candidate is opened to read its geometry type; unreadable ones are
/// skipped. Fails with [`JobError::NoMatchingInputs`] when a filter is given
/// and nothing matches.
pub fn collect_inputs_by_geometry<D: VectorDriver>(
    driver: &D,
    dir: &Path,
    geometry: Option<GeometryType>,
    encoding: &str,
) -> Result<Vec<String>> {
    let names = collect_inputs(dir, driver.file_extension())?;
    let Some(wanted) = geometry else {
        return Ok(names);
    };

    let matching: Vec<String> = names
        .into_iter()
        .filter(|name| match driver.open(&dir.join(name), encoding) {
            Ok(reader) => reader.geometry_type().same_family(&wanted),
            Err(e) => {
                warn!(file = %name, error = %e, "cannot read geometry type; skipped");
                false
            }
        })
        .collect();
    if matching.is_empty() {
        return Err(JobError::NoMatchingInputs {
            dir: dir.to_path_buf(),
            geometry: wanted,
        });
    }
    debug!(geometry = %wanted, inputs = matching.len(), "inputs filtered by geometry");
    Ok(matching)
}

/// Merge job for a [`JobRunner`](crate::runner::JobRunner)
pub struct MergeJob<D> {
    driver: D,
    params: MergeParams,
}

impl<D: VectorDriver> MergeJob<D> {
    pub fn new(driver: D, params: MergeParams) -> Self {
        Self { driver, params }
    }
}

impl<D: VectorDriver + 'static> BatchJob for MergeJob<D> {
    fn name(&self) -> &str {
        "merge"
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobReport> {
        run_merge(&self.driver, &self.params, ctx).map(JobReport::Merge)
    }
}
