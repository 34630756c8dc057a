//! Alpha shape reconstruction.
//!
//! The solid is the union of the Delaunay tetrahedra whose circumscribed
//! sphere has a radius of at most `alpha`. Its surface is every tetrahedron
//! face that no second kept tetrahedron shares, wound outward. Smaller alpha
//! values carve the solid closer to the points; an alpha larger than every
//! circumradius yields the convex hull.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::tetrahedra::tetrahedralize;
use crate::error::{EnvelopeError, EnvelopeResult};
use crate::pointcloud::PointCloud;
use crate::repair::compute_vertex_normals;
use crate::tracing_ext::{OperationTimer, log_mesh_stats};
use crate::types::Mesh;

/// Build the alpha shape of a point cloud.
///
/// Output vertices are the cloud points the surface touches, with their
/// colors. Area-weighted vertex normals are filled in. Points the surface
/// does not touch are dropped. An alpha smaller than every circumradius
/// gives an empty mesh.
///
/// # Errors
///
/// `alpha` must be finite and positive.
///
/// # Example
///
/// ```
/// use cloud_envelope::{PointCloud, build_alpha_shape};
///
/// let mut cloud = PointCloud::new();
/// cloud.push_coords(0.0, 0.0, 0.0);
/// cloud.push_coords(1.0, 0.0, 0.0);
/// cloud.push_coords(0.0, 1.0, 0.0);
/// cloud.push_coords(0.0, 0.0, 1.0);
///
/// let mesh = build_alpha_shape(&cloud, 10.0).unwrap();
/// assert_eq!(mesh.face_count(), 4);
/// assert!((mesh.volume() - 1.0 / 6.0).abs() < 1e-9);
/// ```
pub fn build_alpha_shape(cloud: &PointCloud, alpha: f64) -> EnvelopeResult<Mesh> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(EnvelopeError::invalid_parameter(
            "alpha",
            alpha,
            "must be a finite positive length",
        ));
    }

    let _timer = OperationTimer::with_points("alpha_shape", cloud.len());

    let positions: Vec<_> = cloud.positions().collect();
    let tetrahedralization = tetrahedralize(&positions);

    let kept: Vec<_> = tetrahedralization
        .tetrahedra
        .iter()
        .filter(|t| t.circumradius <= alpha)
        .collect();

    let mut face_uses: HashMap<[u32; 3], u32> = HashMap::with_capacity(kept.len() * 2);
    for tet in &kept {
        for face in tet.outward_faces() {
            *face_uses.entry(sorted(face)).or_insert(0) += 1;
        }
    }

    // Second pass in tetrahedron order keeps the output deterministic.
    let mut remap: Vec<Option<u32>> = vec![None; cloud.len()];
    let mut mesh = Mesh::new();
    for tet in &kept {
        for face in tet.outward_faces() {
            if face_uses.get(&sorted(face)) != Some(&1) {
                continue;
            }
            let mapped = face.map(|v| {
                *remap[v as usize].get_or_insert_with(|| {
                    mesh.vertices.push(cloud.points[v as usize].to_vertex());
                    (mesh.vertices.len() - 1) as u32
                })
            });
            mesh.faces.push(mapped);
        }
    }

    debug!(
        target: "cloud_envelope::alpha_shape",
        alpha,
        tetrahedra = tetrahedralization.len(),
        kept = kept.len(),
        skipped_points = tetrahedralization.skipped,
        "Selected alpha solid"
    );

    if mesh.is_empty() {
        warn!(
            target: "cloud_envelope::alpha_shape",
            "Alpha shape is empty (alpha = {}, {} points); try a larger alpha",
            alpha,
            cloud.len()
        );
        return Ok(mesh);
    }

    compute_vertex_normals(&mut mesh);
    log_mesh_stats(&mesh, "alpha shape");
    Ok(mesh)
}

fn sorted(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::MeshAdjacency;
    use crate::types::VertexColor;
    use approx::assert_relative_eq;

    fn cube_corners() -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..8 {
            cloud.push_coords(
                (i & 1) as f64,
                ((i >> 1) & 1) as f64,
                ((i >> 2) & 1) as f64,
            );
        }
        cloud
    }

    #[test]
    fn test_large_alpha_gives_hull() {
        let mesh = build_alpha_shape(&cube_corners(), 10.0).unwrap();
        assert!(MeshAdjacency::build(&mesh.faces).is_watertight());
        assert_relative_eq!(mesh.signed_volume(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.surface_area(), 6.0, epsilon = 1e-6);
        assert!(mesh.vertices.iter().all(|v| v.normal.is_some()));
    }

    #[test]
    fn test_small_alpha_gives_empty_mesh() {
        let mesh = build_alpha_shape(&cube_corners(), 0.1).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_invalid_alpha() {
        for alpha in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(build_alpha_shape(&cube_corners(), alpha).is_err());
        }
    }

    #[test]
    fn test_colors_follow_vertices() {
        let mut cloud = cube_corners();
        for (i, p) in cloud.points.iter_mut().enumerate() {
            p.color = Some(VertexColor::from_rgb8(i as f64 * 30.0, 0.0, 0.0));
        }
        let mesh = build_alpha_shape(&cloud, 10.0).unwrap();
        for v in &mesh.vertices {
            let i = cloud
                .points
                .iter()
                .position(|p| p.position == v.position)
                .unwrap();
            assert_eq!(v.color, cloud.points[i].color);
        }
    }

    #[test]
    fn test_unused_points_dropped() {
        let mut cloud = cube_corners();
        cloud.push_coords(0.5, 0.5, 0.5);
        let mesh = build_alpha_shape(&cloud, 10.0).unwrap();
        assert_eq!(mesh.vertex_count(), 8);
    }

    #[test]
    fn test_too_few_points() {
        let mut cloud = PointCloud::new();
        cloud.push_coords(0.0, 0.0, 0.0);
        cloud.push_coords(1.0, 0.0, 0.0);
        let mesh = build_alpha_shape(&cloud, 1.0).unwrap();
        assert!(mesh.is_empty());
    }
}
