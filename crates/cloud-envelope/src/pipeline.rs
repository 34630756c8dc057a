//! Per-file envelope pipeline and batch driver.
//!
//! For each input cloud:
//!
//! 1. Load the full cloud and keep it aside
//! 2. Down-sample a copy
//! 3. Build the alpha shape of the sample and repair it
//! 4. Check the repaired envelope against the full cloud
//! 5. Project the sample onto the ground and measure its footprint
//! 6. Export the envelope (and previews) and append a report row
//!
//! Steps 3-4 and step 5 only share the sample, so with `parallel` set they
//! run side by side. Files are independent of each other; a file that fails
//! is logged and skipped, the batch carries on.
//!
//! # Example
//!
//! ```no_run
//! use cloud_envelope::{EnvelopeConfig, run_batch};
//!
//! let config = EnvelopeConfig {
//!     directory: "scans".into(),
//!     alpha: 0.5,
//!     ..Default::default()
//! };
//! let summary = run_batch(&config).unwrap();
//! println!("{} processed, {} failed", summary.files.len(), summary.failures.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info, info_span, warn};

use crate::alpha_shape::build_alpha_shape;
use crate::config::EnvelopeConfig;
use crate::containment::{AccuracyReport, ContainmentParams, check_envelope_accuracy};
use crate::error::{EnvelopeError, EnvelopeResult};
use crate::io::{envelope_mesh_path, footprint_mesh_path, sampled_cloud_path, save_obj, save_xyz};
use crate::pointcloud::PointCloud;
use crate::projection::{Footprint, project_footprint};
use crate::repair::{RepairResult, repair_envelope};
use crate::report::{ReportWriter, ResultsRow};
use crate::tracing_ext::{OperationTimer, log_cloud_stats};

/// Scalar results for one file, as they go into the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnvelopeMetrics {
    /// Enclosed volume, 0 when the envelope could not be closed.
    pub volume: f64,
    /// Surface area, 0 when the envelope could not be closed.
    pub area: f64,
    pub projected_area: f64,
    /// Percentage of original points inside the envelope.
    pub accuracy: f64,
    pub envelope_count: usize,
}

impl EnvelopeMetrics {
    pub fn from_results(
        repair: &RepairResult,
        accuracy: &AccuracyReport,
        footprint: &Footprint,
    ) -> Self {
        Self {
            volume: repair.volume(),
            area: repair.area(),
            projected_area: footprint.area,
            accuracy: accuracy.ratio,
            envelope_count: accuracy.envelope_count,
        }
    }
}

/// Everything known about one processed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub alpha: f64,
    pub points: usize,
    pub sampled_points: usize,
    pub envelope_vertices: usize,
    pub envelope_faces: usize,
    /// The envelope bounds a solid.
    pub watertight: bool,
    /// Repair steps ran on the alpha shape.
    pub repaired: bool,
    pub holes_filled: usize,
    pub closed_shells: usize,
    pub metrics: EnvelopeMetrics,
    pub mesh_path: PathBuf,
    /// Preview files written for an external viewer.
    pub previews: Vec<PathBuf>,
}

impl FileReport {
    pub fn results_row(&self) -> ResultsRow {
        ResultsRow {
            filename: self.input.display().to_string(),
            alpha: self.alpha,
            metrics: self.metrics,
        }
    }
}

/// A file the batch skipped.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub code: String,
    pub message: String,
}

impl FileFailure {
    fn new(path: &Path, err: &EnvelopeError) -> Self {
        Self {
            path: path.to_path_buf(),
            code: err.code().as_str().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of [`run_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub report_path: PathBuf,
    /// Processed files, in input order.
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl BatchSummary {
    /// No file failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Processed files whose envelope could not be closed.
    pub fn open_envelopes(&self) -> usize {
        self.files.iter().filter(|f| !f.watertight).count()
    }
}

/// Regular files in `dir` with one of `extensions`, sorted by path.
pub fn discover_inputs(dir: &Path, extensions: &[String]) -> EnvelopeResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| EnvelopeError::io_read(dir, e))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EnvelopeError::io_read(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Run the pipeline on one cloud and export its envelope.
///
/// No report row is written; see [`FileReport::results_row`].
pub fn process_file(path: &Path, config: &EnvelopeConfig) -> EnvelopeResult<FileReport> {
    let span = info_span!("process_file", path = %path.display());
    let _enter = span.enter();
    let _timer = OperationTimer::new("process_file");

    let original = PointCloud::load(path)?;
    log_cloud_stats(&original, "original");

    let sampled = original.random_down_sample(config.sampling_ratio, config.seed)?;
    log_cloud_stats(&sampled, "sampled");

    let repair_params = config.repair_params();
    let envelope = || -> EnvelopeResult<(RepairResult, AccuracyReport)> {
        let mesh = build_alpha_shape(&sampled, config.alpha)?;
        let repair = repair_envelope(mesh, &repair_params);
        let accuracy =
            check_envelope_accuracy(&original, &repair.mesh, &ContainmentParams::default());
        Ok((repair, accuracy))
    };

    // The projection flattens its input, so it gets its own copy.
    let flat_input = sampled.clone();
    let footprint = move || project_footprint(flat_input, config.alpha);

    let (envelope, footprint) = if config.parallel {
        rayon::join(envelope, footprint)
    } else {
        (envelope(), footprint())
    };
    let (repair, accuracy) = envelope?;
    let footprint = footprint?;

    let mesh_path = envelope_mesh_path(path, config.alpha);
    save_obj(&repair.mesh, &mesh_path)?;

    let mut previews = Vec::new();
    if config.plot_results {
        let cloud_path = sampled_cloud_path(path);
        save_xyz(&sampled, &cloud_path)?;
        previews.push(cloud_path);

        let footprint_path = footprint_mesh_path(path, config.alpha);
        save_obj(&footprint.mesh, &footprint_path)?;
        previews.push(footprint_path);
    }

    let metrics = EnvelopeMetrics::from_results(&repair, &accuracy, &footprint);
    info!(
        target: "cloud_envelope::pipeline",
        volume = metrics.volume,
        area = metrics.area,
        projected_area = metrics.projected_area,
        accuracy = metrics.accuracy,
        envelopes = metrics.envelope_count,
        watertight = repair.is_watertight(),
        "Processed {}",
        path.display()
    );

    Ok(FileReport {
        input: path.to_path_buf(),
        alpha: config.alpha,
        points: original.len(),
        sampled_points: sampled.len(),
        envelope_vertices: repair.mesh.vertex_count(),
        envelope_faces: repair.mesh.face_count(),
        watertight: repair.is_watertight(),
        repaired: repair.repaired,
        holes_filled: repair.holes_filled,
        closed_shells: accuracy.closed_shells,
        metrics,
        mesh_path,
        previews,
    })
}

/// Process every input in `config.directory` and append one report row per
/// file.
///
/// # Errors
///
/// Only an invalid configuration, an unwritable report or an unreadable
/// directory fail the batch. Errors on single files end up in
/// [`BatchSummary::failures`].
pub fn run_batch(config: &EnvelopeConfig) -> EnvelopeResult<BatchSummary> {
    config.validate()?;
    let report_path = config.report_path();
    let writer = Mutex::new(ReportWriter::open(&report_path)?);

    let inputs: Vec<PathBuf> = discover_inputs(&config.directory, &config.extensions)?
        .into_iter()
        .filter(|p| *p != report_path)
        .collect();
    if inputs.is_empty() {
        warn!(
            target: "cloud_envelope::pipeline",
            "No input files with extensions {:?} in {}",
            config.extensions,
            config.directory.display()
        );
    }
    info!(
        target: "cloud_envelope::pipeline",
        files = inputs.len(),
        alpha = config.alpha,
        sampling_ratio = config.sampling_ratio,
        "Starting batch"
    );

    let run_one = |path: &PathBuf| -> Result<FileReport, FileFailure> {
        let record = || -> EnvelopeResult<FileReport> {
            let report = process_file(path, config)?;
            writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(&report.results_row())?;
            Ok(report)
        };
        record().map_err(|err| {
            error!(
                target: "cloud_envelope::pipeline",
                code = err.code().as_str(),
                "Skipping {}: {}",
                path.display(),
                err
            );
            FileFailure::new(path, &err)
        })
    };

    let outcomes: Vec<_> = if config.parallel {
        inputs.par_iter().map(run_one).collect()
    } else {
        inputs.iter().map(run_one).collect()
    };

    let mut files = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(report) => files.push(report),
            Err(failure) => failures.push(failure),
        }
    }

    info!(
        target: "cloud_envelope::pipeline",
        processed = files.len(),
        failed = failures.len(),
        report = %report_path.display(),
        "Batch complete"
    );

    Ok(BatchSummary {
        report_path,
        files,
        failures,
    })
}
