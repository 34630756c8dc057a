//! Manifold check for envelope surfaces.

use tracing::{debug, warn};

use crate::Mesh;
use crate::adjacency::MeshAdjacency;
use crate::components::find_connected_components;
use crate::intersect::detect_self_intersections;
use crate::repair::RepairParams;

/// Topology report for a mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifoldReport {
    /// Total vertex count.
    pub vertex_count: usize,

    /// Total face count.
    pub face_count: usize,

    /// Edges with exactly one adjacent face.
    pub boundary_edge_count: usize,

    /// Edges with more than two adjacent faces.
    pub non_manifold_edge_count: usize,

    /// Intersecting face pairs. Always 0 when the check was skipped.
    pub self_intersection_count: usize,

    /// Whether self-intersections were looked for.
    pub self_intersections_checked: bool,

    /// Vertex-connected bodies.
    pub component_count: usize,

    /// Signed enclosed volume (negative = inside-out).
    pub signed_volume: f64,
}

impl ManifoldReport {
    /// No boundary edges.
    pub fn is_watertight(&self) -> bool {
        self.boundary_edge_count == 0
    }

    /// Closed, two faces per edge and free of self-intersections.
    pub fn is_manifold(&self) -> bool {
        self.is_watertight() && self.non_manifold_edge_count == 0 && self.self_intersection_count == 0
    }

    /// Negative enclosed volume.
    pub fn is_inside_out(&self) -> bool {
        self.signed_volume < 0.0
    }
}

impl std::fmt::Display for ManifoldReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Manifold Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        writeln!(f, "  Bodies: {}", self.component_count)?;
        writeln!(
            f,
            "  Watertight: {} (boundary edges: {})",
            if self.is_watertight() { "yes" } else { "NO" },
            self.boundary_edge_count
        )?;
        writeln!(f, "  Non-manifold edges: {}", self.non_manifold_edge_count)?;
        if self.self_intersections_checked {
            writeln!(f, "  Self-intersections: {}", self.self_intersection_count)?;
        } else {
            writeln!(f, "  Self-intersections: not checked")?;
        }
        write!(
            f,
            "  Manifold: {}",
            if self.is_manifold() { "yes" } else { "NO" }
        )
    }
}

/// Check whether a mesh bounds a solid.
///
/// An empty mesh passes trivially.
///
/// # Example
/// ```
/// use cloud_envelope::{Mesh, Vertex};
/// use cloud_envelope::repair::RepairParams;
/// use cloud_envelope::validate::check_manifold;
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let report = check_manifold(&mesh, &RepairParams::default());
/// assert_eq!(report.boundary_edge_count, 3);
/// assert!(!report.is_manifold());
/// ```
pub fn check_manifold(mesh: &Mesh, params: &RepairParams) -> ManifoldReport {
    let adjacency = MeshAdjacency::build(&mesh.faces);

    let self_intersection_count = if params.check_self_intersections {
        detect_self_intersections(mesh, &params.intersection).intersection_count
    } else {
        0
    };

    let report = ManifoldReport {
        vertex_count: mesh.vertex_count(),
        face_count: mesh.face_count(),
        boundary_edge_count: adjacency.boundary_edge_count(),
        non_manifold_edge_count: adjacency.non_manifold_edge_count(),
        self_intersection_count,
        self_intersections_checked: params.check_self_intersections,
        component_count: find_connected_components(mesh).component_count,
        signed_volume: mesh.signed_volume(),
    };

    if !report.is_watertight() {
        debug!(
            target: "cloud_envelope::validate",
            "Mesh is not watertight: {} boundary edges", report.boundary_edge_count
        );
    }
    if report.non_manifold_edge_count > 0 {
        debug!(
            target: "cloud_envelope::validate",
            "Mesh has {} non-manifold edges", report.non_manifold_edge_count
        );
    }
    if report.is_manifold() && report.is_inside_out() {
        warn!(target: "cloud_envelope::validate", "Mesh appears to be inside-out (negative signed volume)");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
        mesh.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        mesh
    }

    #[test]
    fn test_closed_tetrahedron() {
        let report = check_manifold(&tetrahedron(), &RepairParams::default());
        assert!(report.is_manifold());
        assert!(report.self_intersections_checked);
        assert_eq!(report.component_count, 1);
        assert!(!report.is_inside_out());
    }

    #[test]
    fn test_open_tetrahedron() {
        let mut mesh = tetrahedron();
        mesh.faces.pop();
        let report = check_manifold(&mesh, &RepairParams::default());
        assert!(!report.is_watertight());
        assert_eq!(report.boundary_edge_count, 3);
        assert!(!report.is_manifold());
    }

    #[test]
    fn test_inside_out_is_still_manifold() {
        let mut mesh = tetrahedron();
        for face in &mut mesh.faces {
            face.swap(1, 2);
        }
        let report = check_manifold(&mesh, &RepairParams::default());
        assert!(report.is_manifold());
        assert!(report.is_inside_out());
    }

    #[test]
    fn test_empty_mesh_is_trivially_manifold() {
        let report = check_manifold(&Mesh::new(), &RepairParams::default());
        assert!(report.is_manifold());
        assert_eq!(report.face_count, 0);
    }

    #[test]
    fn test_self_intersection_check_can_be_skipped() {
        let params = RepairParams {
            check_self_intersections: false,
            ..Default::default()
        };
        let report = check_manifold(&tetrahedron(), &params);
        assert!(!report.self_intersections_checked);
        assert!(report.to_string().contains("not checked"));
    }
}
