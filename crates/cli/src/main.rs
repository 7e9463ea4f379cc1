//! VecBatch CLI - batch merge, split and clip of vector datasets

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vecbatch_core::{DatasetReader, GeometryType, VectorDriver};
use vecbatch_jobs::{
    collect_inputs_by_geometry, BatchJob, CancellationToken, ClipJob, ClipParams, Extent,
    JobEvent, JobReport, JobRunner, JobStatus, MergeJob, MergeParams, MissingValuePolicy,
    SplitJob, SplitParams,
};

#[cfg(feature = "gdal")]
type Driver = vecbatch_core::io::GdalDriver;
#[cfg(not(feature = "gdal"))]
type Driver = vecbatch_core::io::NativeDriver;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vecbatch")]
#[command(author, version, about = "Batch transforms over vector datasets", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show layer, fields and record count of a dataset
    Info {
        /// Input dataset
        input: PathBuf,
        /// Attribute encoding of the input
        #[arg(long, default_value = "UTF-8")]
        encoding: String,
    },
    /// Merge several datasets into one
    Merge {
        /// Output dataset (replaced if it exists)
        #[arg(short, long)]
        output: PathBuf,
        /// Directory the inputs are relative to; with no FILES, every dataset in it
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Input datasets
        files: Vec<String>,
        /// With no FILES, only datasets of this geometry family
        #[arg(long, value_enum, conflicts_with = "files")]
        geometry: Option<GeometryArg>,
        #[arg(long, default_value = "UTF-8")]
        input_encoding: String,
        #[arg(long, default_value = "UTF-8")]
        output_encoding: String,
        /// Write NULL instead of "" into fields an input does not have
        #[arg(long)]
        null_missing: bool,
    },
    /// Write one dataset per distinct value of a field
    Split {
        /// Input dataset
        input: PathBuf,
        /// Field to split on
        #[arg(short, long)]
        field: String,
        /// Output directory (created if missing)
        #[arg(long)]
        out_dir: PathBuf,
        /// Attribute encoding of input and outputs
        #[arg(long, default_value = "UTF-8")]
        encoding: String,
    },
    /// Clip a dataset to an extent with ogr2ogr
    Clip {
        /// Input dataset
        input: PathBuf,
        /// Output dataset; the format follows its extension
        output: PathBuf,
        /// Extent as xmin,ymin,xmax,ymax
        #[arg(long, allow_hyphen_values = true)]
        extent: String,
        /// Layer to clip (default: input file stem)
        #[arg(long)]
        layer: Option<String>,
        /// Extra ogr2ogr options, e.g. "-lco SPATIAL_INDEX=YES"
        #[arg(long, allow_hyphen_values = true)]
        options: Option<String>,
        /// ogr2ogr executable
        #[arg(long, default_value = "ogr2ogr")]
        program: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum GeometryArg {
    Point,
    Line,
    Polygon,
}

impl From<GeometryArg> for GeometryType {
    fn from(arg: GeometryArg) -> Self {
        match arg {
            GeometryArg::Point => GeometryType::Point,
            GeometryArg::Line => GeometryType::LineString,
            GeometryArg::Polygon => GeometryType::Polygon,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Cancel `token` on the first Ctrl-C; exit at once on the second.
fn stop_on_interrupt(token: CancellationToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    std::thread::Builder::new()
        .name("vecbatch-signal".to_string())
        .spawn(move || {
            rt.block_on(async move {
                let mut interrupts = 0;
                while tokio::signal::ctrl_c().await.is_ok() {
                    interrupts += 1;
                    if interrupts > 1 {
                        std::process::exit(130);
                    }
                    warn!("interrupted; stopping after the current file (Ctrl-C again to abort)");
                    token.cancel();
                }
            })
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

/// Run `job` on a [`JobRunner`], drawing its progress until it ends.
/// `on_start` receives the job's cancellation token once it is running.
fn run_job<J, F>(job: J, on_start: F) -> Result<JobReport>
where
    J: BatchJob,
    F: FnOnce(CancellationToken) -> Result<()>,
{
    let mut runner = JobRunner::new();
    runner.start(job).context("Failed to start job")?;
    on_start(runner.cancellation_token())?;
    let pb = progress_bar();

    while let Some(event) = runner.next_event() {
        match event {
            JobEvent::StateChanged(state) => debug!(?state, "job state"),
            JobEvent::RangeChanged(max) => {
                pb.set_length(max);
                pb.set_position(0);
            }
            JobEvent::UnitProcessed => pb.inc(1),
            JobEvent::FileChanged(name) => pb.set_message(name),
            JobEvent::FileCompleted(name) => debug!(file = %name, "done"),
            JobEvent::Finished(report) | JobEvent::Interrupted(report) => {
                pb.finish_and_clear();
                runner.wait()?;
                return Ok(report);
            }
            JobEvent::Failed(message) => {
                pb.abandon();
                runner.wait()?;
                anyhow::bail!(message);
            }
        }
    }

    pb.abandon();
    anyhow::bail!("job ended without a report")
}

fn print_report(report: &JobReport, elapsed: Duration) {
    if report.status() == JobStatus::Interrupted {
        println!("Interrupted; partial output left in place.");
    }
    match report {
        JobReport::Merge(r) => {
            println!(
                "Merged {} records from {} files into: {}",
                r.records_written,
                r.files_written.len(),
                r.output_path.display()
            );
            println!("  Fields:");
            for field in &r.fields {
                println!("    {}", field);
            }
            if !r.mismatched_inputs.is_empty() {
                println!(
                    "  Geometry type or CRS differs from the first input: {}",
                    r.mismatched_inputs.join(", ")
                );
            }
        }
        JobReport::Split(r) => {
            println!("Split into {} of {} groups:", r.outputs.len(), r.groups);
            for output in &r.outputs {
                println!("  {} ({} records)", output.path.display(), output.records);
            }
        }
        JobReport::Clip(r) => {
            println!("Clipped output saved to: {}", r.output.display());
            if !r.stderr.is_empty() {
                println!("  {}", r.stderr);
            }
        }
    }
    println!("  Processing time: {:.2?}", elapsed);

    let errors = report.soft_errors();
    if !errors.is_empty() {
        eprintln!("{} problem(s):", errors.len());
        for e in errors {
            eprintln!("  {}", e);
        }
    }
}

fn run_and_report<J: BatchJob>(job: J) -> Result<()> {
    let start = Instant::now();
    let report = run_job(job, stop_on_interrupt)?;
    print_report(&report, start.elapsed());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let driver = Driver::new();
    debug!(driver = driver.name(), "using driver");

    match cli.command {
        Commands::Info { input, encoding } => {
            let reader = driver
                .open(&input, &encoding)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            println!("File: {}", input.display());
            println!("Layer: {}", reader.layer_name());
            println!("Geometry: {}", reader.geometry_type());
            match reader.crs() {
                Some(crs) => println!("CRS: {}", crs),
                None => println!("CRS: unknown"),
            }
            println!("Records: {}", reader.record_count());
            println!("\nFields:");
            for field in reader.fields() {
                println!("  {}", field);
            }
        }

        Commands::Merge {
            output,
            dir,
            files,
            geometry,
            input_encoding,
            output_encoding,
            null_missing,
        } => {
            let base_dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let files = if files.is_empty() {
                collect_inputs_by_geometry(
                    &driver,
                    &base_dir,
                    geometry.map(GeometryType::from),
                    &input_encoding,
                )
                .with_context(|| format!("Failed to list datasets in {}", base_dir.display()))?
            } else {
                files
            };
            if files.is_empty() {
                anyhow::bail!(
                    "No *.{} datasets found in {}",
                    driver.file_extension(),
                    base_dir.display()
                );
            }
            let policy = if null_missing {
                MissingValuePolicy::Null
            } else {
                MissingValuePolicy::EmptyString
            };
            let params = MergeParams::new(base_dir, files, output)
                .with_encodings(input_encoding, output_encoding)
                .with_missing_value(policy);
            run_and_report(MergeJob::new(driver, params))?;
        }

        Commands::Split {
            input,
            field,
            out_dir,
            encoding,
        } => {
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            let params = SplitParams::new(field, out_dir).with_encoding(encoding.clone());
            let job = SplitJob::new(driver, input, params).with_input_encoding(encoding);
            run_and_report(job)?;
        }

        Commands::Clip {
            input,
            output,
            extent,
            layer,
            options,
            program,
        } => {
            let extent = Extent::parse(&extent).context("Invalid --extent")?;
            let mut params = ClipParams::new(input, extent, output);
            params.layer_name = layer;
            params.options = options;
            params.program = program;
            run_and_report(ClipJob::new(params))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_merge() {
        let cli = Cli::parse_from([
            "vecbatch", "-v", "merge", "-o", "out.jsonl", "--dir", "in", "a.jsonl", "b.jsonl",
            "--null-missing",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Merge {
                output,
                dir,
                files,
                null_missing,
                ..
            } => {
                assert_eq!(output, PathBuf::from("out.jsonl"));
                assert_eq!(dir, Some(PathBuf::from("in")));
                assert_eq!(files, vec!["a.jsonl", "b.jsonl"]);
                assert!(null_missing);
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn test_parse_merge_directory_by_geometry() {
        let cli = Cli::parse_from(["vecbatch", "merge", "-o", "out.jsonl", "--geometry", "line"]);
        match cli.command {
            Commands::Merge {
                files, geometry, ..
            } => {
                assert!(files.is_empty());
                assert_eq!(geometry.map(GeometryType::from), Some(GeometryType::LineString));
            }
            _ => panic!("expected merge"),
        }

        let explicit = Cli::try_parse_from([
            "vecbatch", "merge", "-o", "out.jsonl", "a.jsonl", "--geometry", "point",
        ]);
        assert!(explicit.is_err());
    }

    /// Waits for cancellation, giving up after a few seconds.
    struct WaitForCancel;

    impl BatchJob for WaitForCancel {
        fn name(&self) -> &str {
            "wait"
        }

        fn run(&mut self, ctx: &vecbatch_jobs::JobContext) -> vecbatch_jobs::Result<JobReport> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !ctx.is_cancelled() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            let status = if ctx.is_cancelled() {
                JobStatus::Interrupted
            } else {
                JobStatus::Completed
            };
            Ok(JobReport::Split(vecbatch_jobs::SplitReport {
                status,
                groups: 0,
                outputs: Vec::new(),
                errors: Vec::new(),
            }))
        }
    }

    #[test]
    fn test_cancelled_token_interrupts_running_job() {
        let report = run_job(WaitForCancel, |token| {
            token.cancel();
            Ok(())
        })
        .unwrap();
        assert_eq!(report.status(), JobStatus::Interrupted);
    }

    #[test]
    fn test_parse_clip_with_negative_extent() {
        let cli = Cli::parse_from([
            "vecbatch", "clip", "in.shp", "out.gpkg", "--extent", "-10,-5,10,5",
        ]);
        match cli.command {
            Commands::Clip { extent, program, .. } => {
                assert_eq!(
                    Extent::parse(&extent).unwrap(),
                    Extent::new(-10.0, -5.0, 10.0, 5.0)
                );
                assert_eq!(program, "ogr2ogr");
            }
            _ => panic!("expected clip"),
        }
    }
}
