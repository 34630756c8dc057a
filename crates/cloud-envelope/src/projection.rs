//! Ground footprint of a point cloud.
//!
//! The cloud is flattened onto `z = 0` and triangulated in 2D. Triangles
//! whose circumscribed circle is wider than `alpha` are discarded, which
//! carves concavities out of the convex hull the same way the 3D alpha
//! shape does.

use delaunator::{Point, triangulate};
use tracing::debug;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::pointcloud::PointCloud;
use crate::tracing_ext::{OperationTimer, log_mesh_stats};
use crate::types::{Mesh, Triangle};

/// Flat footprint mesh and its area.
#[derive(Debug, Clone, Default)]
pub struct Footprint {
    /// Triangles on `z = 0`, counter-clockwise seen from +z.
    pub mesh: Mesh,
    /// Total triangle area.
    pub area: f64,
}

/// Flatten `cloud` onto `z = 0` and compute its alpha-filtered footprint.
///
/// The cloud is consumed: its z coordinates are overwritten. Fewer than
/// three distinct points, or collinear points, give an empty footprint.
///
/// # Errors
///
/// `alpha` must be finite and positive.
///
/// # Example
///
/// ```
/// use cloud_envelope::PointCloud;
/// use cloud_envelope::projection::project_footprint;
///
/// let mut cloud = PointCloud::new();
/// cloud.push_coords(0.0, 0.0, 3.0);
/// cloud.push_coords(2.0, 0.0, 1.0);
/// cloud.push_coords(2.0, 2.0, 5.0);
/// cloud.push_coords(0.0, 2.0, 2.0);
///
/// let footprint = project_footprint(cloud, 10.0).unwrap();
/// assert!((footprint.area - 4.0).abs() < 1e-9);
/// ```
pub fn project_footprint(mut cloud: PointCloud, alpha: f64) -> EnvelopeResult<Footprint> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(EnvelopeError::invalid_parameter(
            "alpha",
            alpha,
            "must be a finite positive length",
        ));
    }

    let _timer = OperationTimer::with_points("projection", cloud.len());
    cloud.flatten_z(0.0);

    let coords: Vec<Point> = cloud
        .points
        .iter()
        .map(|p| Point {
            x: p.position.x,
            y: p.position.y,
        })
        .collect();
    let triangulation = triangulate(&coords);
    let candidates = triangulation.triangles.len() / 3;

    let mut remap: Vec<Option<u32>> = vec![None; cloud.len()];
    let mut mesh = Mesh::new();
    let mut area = 0.0;

    for tri in triangulation.triangles.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]];
        let (pa, pb, pc) = (
            cloud.points[a].position,
            cloud.points[b].position,
            cloud.points[c].position,
        );

        let cross = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
        if cross == 0.0 {
            continue;
        }

        let triangle = Triangle::new(pa, pb, pc);
        if triangle.circumradius() > alpha {
            continue;
        }

        let ordered = if cross > 0.0 { [a, b, c] } else { [a, c, b] };
        let face = ordered.map(|v| {
            *remap[v].get_or_insert_with(|| {
                mesh.vertices.push(cloud.points[v].to_vertex());
                (mesh.vertices.len() - 1) as u32
            })
        });
        mesh.faces.push(face);
        area += 0.5 * cross.abs();
    }

    debug!(
        target: "cloud_envelope::projection",
        alpha,
        candidates,
        kept = mesh.face_count(),
        area,
        "Projected footprint"
    );
    log_mesh_stats(&mesh, "footprint");

    Ok(Footprint { mesh, area })
}
