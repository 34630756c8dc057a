//! Tracing helpers shared by the pipeline stages.
//!
//! Targets follow the module layout (`cloud_envelope::timing`,
//! `cloud_envelope::mesh_state`, `cloud_envelope::io`), so a subscriber can
//! filter them independently:
//!
//! ```text
//! RUST_LOG=cloud_envelope=info,cloud_envelope::timing=debug
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: degenerate input, failed repair, skipped files
//! - **INFO**: per-file summaries and stage timing
//! - **DEBUG**: stage start, intermediate mesh state
//! - **TRACE**: per-point and per-cell detail

use std::path::Path;
use std::time::Instant;

use tracing::{Span, debug, info, trace};

use crate::Mesh;
use crate::pointcloud::PointCloud;

/// A stage timer that logs its duration on drop.
///
/// ```
/// use cloud_envelope::tracing_ext::OperationTimer;
///
/// let timer = OperationTimer::new("alpha_shape");
/// assert!(timer.elapsed_ms() >= 0.0);
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("envelope_stage", stage = name);
        debug!(target: "cloud_envelope::timing", stage = name, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Timer whose span also records the input size.
    pub fn with_points(name: &'static str, points: usize) -> Self {
        let span = tracing::info_span!("envelope_stage", stage = name, points);
        debug!(target: "cloud_envelope::timing", stage = name, points, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "cloud_envelope::timing",
            stage = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Stage completed"
        );
    }
}

/// Log mesh size and extent at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min, max) = mesh.bounds().unwrap_or_default();
    let dims = max - min;

    debug!(
        target: "cloud_envelope::mesh_state",
        context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log point count and extent at debug level.
pub fn log_cloud_stats(cloud: &PointCloud, context: &str) {
    let (min, max) = cloud.bounds().unwrap_or_default();
    let dims = max - min;

    debug!(
        target: "cloud_envelope::mesh_state",
        context,
        points = cloud.len(),
        colored = cloud.has_colors(),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Cloud state"
    );
}

/// Log a completed file write.
pub fn log_io_operation(operation: &str, path: &Path, format: &str) {
    trace!(
        target: "cloud_envelope::io",
        operation,
        path = %path.display(),
        format,
        "I/O operation completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::with_points("test_stage", 10);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_stats_on_empty_inputs() {
        log_mesh_stats(&Mesh::new(), "test");
        log_cloud_stats(&PointCloud::new(), "test");
        log_io_operation("save", Path::new("out.obj"), "obj");
    }
}
