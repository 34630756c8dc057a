//! Alpha-shape envelopes of point clouds.
//!
//! This crate turns a raw point cloud into a closed triangle surface that
//! wraps it, and measures that surface: enclosed volume, area, how much of
//! the original cloud it contains, how many separate bodies it has, and the
//! area of the cloud's footprint on the ground plane.
//!
//! # Pipeline
//!
//! | stage                 | entry point                               |
//! |-----------------------|-------------------------------------------|
//! | load and down-sample  | [`PointCloud::load`], [`PointCloud::random_down_sample`] |
//! | alpha shape           | [`build_alpha_shape`]                     |
//! | manifold repair       | [`repair_envelope`]                       |
//! | accuracy check        | [`check_envelope_accuracy`]               |
//! | ground footprint      | [`project_footprint`]                     |
//! | CSV report            | [`ReportWriter`]                          |
//! | whole directory       | [`run_batch`]                             |
//!
//! # Units
//!
//! The library is unit-agnostic. `alpha` is a length in the units of the
//! input cloud; volumes and areas come out in those units cubed and squared.
//! The report header labels them as meters.
//!
//! # Winding
//!
//! Faces are counter-clockwise seen from outside, so normals point outward
//! by the right-hand rule and a closed envelope has positive signed volume.
//!
//! # Quick Start
//!
//! ```no_run
//! use cloud_envelope::{
//!     ContainmentParams, PointCloud, RepairParams, build_alpha_shape, check_envelope_accuracy,
//!     repair_envelope,
//! };
//!
//! let full = PointCloud::load("tree.txt").unwrap();
//! let sampled = full.random_down_sample(0.1, Some(1)).unwrap();
//!
//! let mesh = build_alpha_shape(&sampled, 0.3).unwrap();
//! let repaired = repair_envelope(mesh, &RepairParams::default());
//! let accuracy = check_envelope_accuracy(&full, &repaired.mesh, &ContainmentParams::default());
//!
//! println!(
//!     "volume {:.3}, area {:.3}, {:.1}% enclosed in {} envelope(s)",
//!     repaired.volume(),
//!     repaired.area(),
//!     accuracy.ratio,
//!     accuracy.envelope_count
//! );
//! ```

mod error;
mod types;

pub mod adjacency;
pub mod alpha_shape;
pub mod bvh;
pub mod components;
pub mod config;
pub mod containment;
pub mod holes;
pub mod intersect;
pub mod io;
pub mod pipeline;
pub mod pointcloud;
pub mod projection;
pub mod repair;
pub mod report;
pub mod tetrahedra;
pub mod tracing_ext;
pub mod validate;
pub mod winding;

// Re-export core types at crate root
pub use error::{EnvelopeError, EnvelopeResult, ErrorCode, FileLocation, RecoverySuggestion};
pub use types::{Mesh, Triangle, Vertex, VertexColor};

pub use adjacency::MeshAdjacency;
pub use alpha_shape::build_alpha_shape;
pub use components::{ComponentAnalysis, find_connected_components};
pub use config::EnvelopeConfig;
pub use containment::{AccuracyReport, ContainmentParams, check_envelope_accuracy};
pub use holes::{BoundaryLoop, detect_holes, fill_holes};
pub use intersect::{IntersectionParams, SelfIntersectionResult, detect_self_intersections};
pub use io::{envelope_mesh_path, save_obj, save_xyz};
pub use pipeline::{
    BatchSummary, EnvelopeMetrics, FileFailure, FileReport, discover_inputs, process_file,
    run_batch,
};
pub use pointcloud::{CloudPoint, PointCloud};
pub use projection::{Footprint, project_footprint};
pub use repair::{RepairOutcome, RepairParams, RepairResult, repair_envelope};
pub use report::{ReportWriter, ResultsRow};
pub use validate::{ManifoldReport, check_manifold};
pub use winding::fix_winding_order;
