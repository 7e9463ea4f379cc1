//! Clip a dataset to a rectangular extent with the external `ogr2ogr` tool.
//!
//! No geometry is touched here: the job builds the command line, runs it on
//! the job's thread and reports the outcome. Cancellation is only honoured
//! before the process starts.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vecbatch_core::io::layer_name_from_path;

use crate::context::{JobContext, JobState};
use crate::error::{JobError, Result};
use crate::job::{BatchJob, JobReport, JobStatus};

/// Axis-aligned clipping extent, in the input's CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse `xmin,ymin,xmax,ymax`
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| JobError::InvalidParameter {
            name: "extent",
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| invalid("expected four numbers"))?;
        match parts.as_slice() {
            [min_x, min_y, max_x, max_y] => Ok(Self::new(*min_x, *min_y, *max_x, *max_y)),
            _ => Err(invalid("expected xmin,ymin,xmax,ymax")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(JobError::InvalidParameter {
                name: "extent",
                value: format!(
                    "{},{},{},{}",
                    self.min_x, self.min_y, self.max_x, self.max_y
                ),
                reason: "min must be below max on both axes".to_string(),
            });
        }
        Ok(())
    }
}

/// Parameters for a clip job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipParams {
    pub input: PathBuf,
    /// Layer to clip; defaults to the input's file stem
    pub layer_name: Option<String>,
    pub extent: Extent,
    pub output: PathBuf,
    /// Extra creation options, passed through verbatim
    pub options: Option<String>,
    /// Program to run
    pub program: String,
}

impl ClipParams {
    pub fn new(input: impl Into<PathBuf>, extent: Extent, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            layer_name: None,
            extent,
            output: output.into(),
            options: None,
            program: "ogr2ogr".to_string(),
        }
    }

    /// Arguments for `ogr2ogr`, program name excluded.
    pub fn arguments(&self) -> Vec<String> {
        let layer = self
            .layer_name
            .clone()
            .unwrap_or_else(|| layer_name_from_path(&self.input));
        let mut args = vec![
            "-spat".to_string(),
            self.extent.min_x.to_string(),
            self.extent.min_y.to_string(),
            self.extent.max_x.to_string(),
            self.extent.max_y.to_string(),
            "-clipsrc".to_string(),
            "spat_extent".to_string(),
            self.output.to_string_lossy().into_owned(),
            self.input.to_string_lossy().into_owned(),
            layer,
        ];
        if let Some(options) = &self.options {
            args.extend(options.split_whitespace().map(str::to_string));
        }
        if let Some(format) = ogr_format_for(&self.output) {
            args.push("-f".to_string());
            args.push(format.to_string());
        }
        args
    }
}

/// OGR driver name for an output path, from its extension
pub fn ogr_format_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let format = match ext.as_str() {
        "shp" => "ESRI Shapefile",
        "gpkg" => "GPKG",
        "geojson" | "json" => "GeoJSON",
        "csv" => "CSV",
        "kml" => "KML",
        "gml" => "GML",
        "fgb" => "FlatGeobuf",
        "sqlite" => "SQLite",
        _ => return None,
    };
    Some(format)
}

/// Outcome of a clip job that did not fail
#[derive(Debug, Clone, PartialEq)]
pub struct ClipReport {
    pub status: JobStatus,
    pub output: PathBuf,
    /// Full command line, program first
    pub command: Vec<String>,
    /// Whatever the tool printed on stderr
    pub stderr: String,
}

/// Run `ogr2ogr` for `params`.
pub fn run_clip(params: &ClipParams, ctx: &JobContext) -> Result<ClipReport> {
    params.extent.validate()?;

    let mut command = vec![params.program.clone()];
    command.extend(params.arguments());

    if ctx.is_cancelled() {
        return Ok(ClipReport {
            status: JobStatus::Interrupted,
            output: params.output.clone(),
            command,
            stderr: String::new(),
        });
    }

    ctx.set_state(JobState::Writing);
    ctx.set_range(1);
    ctx.file_changed(&params.output.to_string_lossy());
    debug!(command = ?command, "launching");

    let output = Command::new(&params.program)
        .args(&command[1..])
        .output()
        .map_err(|e| JobError::Command {
            program: params.program.clone(),
            reason: e.to_string(),
        })?;
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(JobError::Command {
            program: params.program.clone(),
            reason: format!("{}: {}", output.status, stderr),
        });
    }

    ctx.tick();
    info!(output = %params.output.display(), "clip finished");
    Ok(ClipReport {
        status: JobStatus::Completed,
        output: params.output.clone(),
        command,
        stderr,
    })
}

/// Clip job for a [`JobRunner`](crate::runner::JobRunner)
pub struct ClipJob {
    params: ClipParams,
}

impl ClipJob {
    pub fn new(params: ClipParams) -> Self {
        Self { params }
    }
}

impl BatchJob for ClipJob {
    fn name(&self) -> &str {
        "clip"
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobReport> {
        run_clip(&self.params, ctx).map(JobReport::Clip)
    }
}
