//! Manifold repair of envelope meshes.
//!
//! [`repair_envelope`] checks whether an alpha shape bounds a solid and, if
//! not, tries to make it do so. The result is always a [`RepairResult`]; a
//! surface that cannot be closed is reported as [`RepairOutcome::Failed`]
//! instead of as an error.

use hashbrown::HashSet;
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::holes::fill_holes;
use crate::intersect::IntersectionParams;
use crate::tracing_ext::{OperationTimer, log_mesh_stats};
use crate::validate::{ManifoldReport, check_manifold};
use crate::winding::{fix_winding_order, orient_outward};
use crate::{Mesh, Triangle};

/// Parameters for [`repair_envelope`].
///
/// # Example
///
/// ```
/// use cloud_envelope::RepairParams;
///
/// let params = RepairParams {
///     max_hole_edges: 20,
///     check_self_intersections: false,
///     ..Default::default()
/// };
/// assert_eq!(params.max_hole_edges, 20);
/// ```
#[derive(Debug, Clone)]
pub struct RepairParams {
    /// Largest boundary loop, in edges, that hole filling will close.
    ///
    /// Default: `100`
    pub max_hole_edges: usize,

    /// Faces with a smaller area are dropped before anything else.
    ///
    /// Default: `1e-12`
    pub degenerate_area_threshold: f64,

    /// Count intersecting face pairs as a manifold defect.
    ///
    /// Default: `true`
    pub check_self_intersections: bool,

    /// Settings for the self-intersection search.
    pub intersection: IntersectionParams,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            max_hole_edges: 100,
            degenerate_area_threshold: 1e-12,
            check_self_intersections: true,
            intersection: IntersectionParams::default(),
        }
    }
}

impl RepairParams {
    /// Defaults with a different hole size limit.
    pub fn with_max_hole_edges(max_hole_edges: usize) -> Self {
        Self {
            max_hole_edges,
            ..Default::default()
        }
    }
}

/// Whether the envelope bounds a solid after repair.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// Closed manifold surface with its enclosed volume and surface area.
    Watertight { volume: f64, area: f64 },
    /// The surface could not be made manifold.
    Failed { report: ManifoldReport },
}

impl RepairOutcome {
    pub fn is_watertight(&self) -> bool {
        matches!(self, Self::Watertight { .. })
    }
}

/// Result of [`repair_envelope`].
#[derive(Debug, Clone)]
pub struct RepairResult {
    /// The mesh after repair, or unchanged when it was already manifold.
    pub mesh: Mesh,
    pub outcome: RepairOutcome,
    /// Repair steps ran (the input was not manifold).
    pub repaired: bool,
    pub holes_filled: usize,
    pub faces_removed: usize,
}

impl RepairResult {
    /// Enclosed volume, 0 on failure.
    pub fn volume(&self) -> f64 {
        match self.outcome {
            RepairOutcome::Watertight { volume, .. } => volume,
            RepairOutcome::Failed { .. } => 0.0,
        }
    }

    /// Surface area, 0 on failure.
    pub fn area(&self) -> f64 {
        match self.outcome {
            RepairOutcome::Watertight { area, .. } => area,
            RepairOutcome::Failed { .. } => 0.0,
        }
    }

    pub fn is_watertight(&self) -> bool {
        self.outcome.is_watertight()
    }
}

/// Check an envelope and repair it if it does not bound a solid.
///
/// Repair steps, in order:
///
/// 1. Remove degenerate and duplicate faces
/// 2. Keep the two largest faces on each non-manifold edge
/// 3. Make winding consistent, seeded from the original faces
/// 4. Fill holes up to `max_hole_edges`
/// 5. Remove unreferenced vertices and recompute normals
/// 6. Check again
///
/// An empty mesh is trivially watertight with zero volume and area.
pub fn repair_envelope(mesh: Mesh, params: &RepairParams) -> RepairResult {
    let _timer = OperationTimer::new("repair_envelope");

    let initial = check_manifold(&mesh, params);
    if initial.is_manifold() {
        debug!(target: "cloud_envelope::repair", "Envelope is manifold, no repair needed");
        let outcome = watertight(&mesh);
        return RepairResult {
            mesh,
            outcome,
            repaired: false,
            holes_filled: 0,
            faces_removed: 0,
        };
    }

    info!(
        target: "cloud_envelope::repair",
        "Repairing envelope: {} boundary edges, {} non-manifold edges, {} self-intersections",
        initial.boundary_edge_count,
        initial.non_manifold_edge_count,
        initial.self_intersection_count
    );

    let mut mesh = mesh;
    let initial_faces = mesh.face_count();

    // 1. Degenerate and duplicate faces
    remove_degenerate_triangles(&mut mesh, params.degenerate_area_threshold);
    remove_duplicate_faces(&mut mesh);

    // 2. Non-manifold edges
    fix_non_manifold_edges(&mut mesh);
    let faces_removed = initial_faces - mesh.face_count();

    // 3. Winding
    fix_winding_order(&mut mesh);

    // 4. Holes
    let holes = fill_holes(&mut mesh, params.max_hole_edges);

    // 5. Cleanup
    orient_outward(&mut mesh);
    remove_unreferenced_vertices(&mut mesh);
    compute_vertex_normals(&mut mesh);
    log_mesh_stats(&mesh, "after repair");

    // 6. Re-check
    let report = check_manifold(&mesh, params);
    let outcome = if report.is_manifold() {
        info!(
            target: "cloud_envelope::repair",
            "Repair succeeded: removed {} faces, filled {} hole(s)", faces_removed, holes.filled
        );
        watertight(&mesh)
    } else {
        warn!(
            target: "cloud_envelope::repair",
            "Envelope is not manifold after repair ({} boundary edges, {} non-manifold edges, {} self-intersections); volume and area will be reported as 0",
            report.boundary_edge_count,
            report.non_manifold_edge_count,
            report.self_intersection_count
        );
        RepairOutcome::Failed { report }
    };

    RepairResult {
        mesh,
        outcome,
        repaired: true,
        holes_filled: holes.filled,
        faces_removed,
    }
}

fn watertight(mesh: &Mesh) -> RepairOutcome {
    RepairOutcome::Watertight {
        volume: mesh.volume(),
        area: mesh.surface_area(),
    }
}

/// Remove triangles with area below threshold.
///
/// Returns the number of triangles removed.
pub fn remove_degenerate_triangles(mesh: &mut Mesh, area_threshold: f64) -> usize {
    let original_count = mesh.faces.len();
    let vertices = &mesh.vertices;

    mesh.faces.retain(|&[i0, i1, i2]| {
        Triangle::new(
            vertices[i0 as usize].position,
            vertices[i1 as usize].position,
            vertices[i2 as usize].position,
        )
        .area()
            >= area_threshold
            && i0 != i1
            && i1 != i2
            && i0 != i2
    });

    let removed = original_count - mesh.faces.len();
    if removed > 0 {
        info!(
            target: "cloud_envelope::repair",
            "Removed {} degenerate triangles (area < {:.2e})", removed, area_threshold
        );
    }
    removed
}

/// Remove faces that repeat the vertex set of an earlier face, in either
/// winding.
///
/// Returns the number of faces removed.
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    let original_count = mesh.faces.len();

    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(original_count);
    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });

    let removed = original_count - mesh.faces.len();
    if removed > 0 {
        info!(target: "cloud_envelope::repair", "Removed {} duplicate faces", removed);
    }
    removed
}

/// Keep the two largest faces on every edge shared by more than two.
///
/// Returns the number of faces removed.
pub fn fix_non_manifold_edges(mesh: &mut Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);

    let mut to_remove: HashSet<u32> = HashSet::new();
    let mut edge_count = 0;
    for faces in adjacency.edge_to_faces.values().filter(|f| f.len() > 2) {
        edge_count += 1;
        let mut by_area: Vec<(u32, f64)> = faces
            .iter()
            .map(|&f| (f, mesh.triangle(f as usize).map_or(0.0, |t| t.area())))
            .collect();
        // Largest first, lowest index on ties.
        by_area.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        to_remove.extend(by_area.iter().skip(2).map(|&(f, _)| f));
    }

    if to_remove.is_empty() {
        return 0;
    }

    let mut idx = 0u32;
    mesh.faces.retain(|_| {
        let keep = !to_remove.contains(&idx);
        idx += 1;
        keep
    });

    info!(
        target: "cloud_envelope::repair",
        "Fixed {} non-manifold edges by removing {} faces",
        edge_count,
        to_remove.len()
    );
    to_remove.len()
}

/// Remove unreferenced vertices and compact the vertex array.
///
/// Returns the number of vertices removed.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let original_count = mesh.vertices.len();

    let mut remap: Vec<Option<u32>> = vec![None; original_count];
    for &v in mesh.faces.iter().flatten() {
        remap[v as usize] = Some(0);
    }

    let mut new_vertices = Vec::with_capacity(original_count);
    for (old_idx, vertex) in mesh.vertices.drain(..).enumerate() {
        if let Some(slot) = remap[old_idx].as_mut() {
            *slot = new_vertices.len() as u32;
            new_vertices.push(vertex);
        }
    }

    for v in mesh.faces.iter_mut().flatten() {
        // Every face vertex was marked above.
        *v = remap[*v as usize].unwrap_or(*v);
    }

    let removed = original_count - new_vertices.len();
    mesh.vertices = new_vertices;

    if removed > 0 {
        debug!(target: "cloud_envelope::repair", "Removed {} unreferenced vertices", removed);
    }
    removed
}

/// Compute vertex normals as area-weighted average of adjacent face normals.
pub fn compute_vertex_normals(mesh: &mut Mesh) {
    let mut accum: Vec<Vector3<f64>> = vec![Vector3::zeros(); mesh.vertices.len()];

    for (face, tri) in mesh.faces.iter().zip(mesh.triangles()) {
        // Unnormalized normal has length 2 * area.
        let weighted = tri.normal_unnormalized();
        for &v in face {
            accum[v as usize] += weighted;
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        vertex.normal = normal.try_normalize(f64::EPSILON);
    }
}
