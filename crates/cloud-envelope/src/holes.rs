//! Hole detection and filling.
//!
//! Boundary loops are traced along directed half-edges so that every patch
//! triangle traverses its boundary edge opposite to the face it closes
//! against. Filled holes therefore inherit the orientation of their rim.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::adjacency::MeshAdjacency;
use crate::{Mesh, Triangle};

/// A closed boundary loop, ordered in the winding its patch must use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Outcome of [`fill_holes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleFillSummary {
    pub filled: usize,
    /// Loops larger than the size limit.
    pub skipped: usize,
    pub faces_added: usize,
}

/// Trace all boundary loops of the mesh.
///
/// Open chains (boundary edges that never return to their start) are reported
/// and ignored.
pub fn detect_holes(mesh: &Mesh, adjacency: &MeshAdjacency) -> Vec<BoundaryLoop> {
    // Directed patch half-edges, reversed from the face that owns each edge.
    let mut half_edges: Vec<(u32, u32)> = adjacency
        .boundary_edges()
        .filter_map(|(a, b)| {
            let face = mesh.faces[*adjacency.faces_for_edge(a, b).first()? as usize];
            Some(if runs_forward(&face, a, b) { (b, a) } else { (a, b) })
        })
        .collect();

    if half_edges.is_empty() {
        return Vec::new();
    }
    half_edges.sort_unstable();

    let mut outgoing: HashMap<u32, SmallVec<[u32; 2]>> = HashMap::new();
    for &(from, to) in &half_edges {
        outgoing.entry(from).or_default().push(to);
    }

    let mut used: HashSet<(u32, u32)> = HashSet::with_capacity(half_edges.len());
    let mut loops = Vec::new();

    for &(start, first) in &half_edges {
        if !used.insert((start, first)) {
            continue;
        }

        let mut vertices = vec![start];
        let mut current = first;
        let mut closed = true;

        while current != start {
            vertices.push(current);
            let next = outgoing
                .get(&current)
                .and_then(|targets| targets.iter().copied().find(|&t| !used.contains(&(current, t))));
            match next {
                Some(next) => {
                    used.insert((current, next));
                    current = next;
                }
                None => {
                    closed = false;
                    break;
                }
            }
        }

        if !closed {
            warn!(
                target: "cloud_envelope::repair",
                "Boundary chain starting at vertex {} is not closed", start
            );
        } else if vertices.len() >= 3 {
            loops.push(BoundaryLoop { vertices });
        }
    }

    debug!(
        target: "cloud_envelope::repair",
        holes = loops.len(),
        sizes = ?loops.iter().map(BoundaryLoop::edge_count).collect::<Vec<_>>(),
        "Detected boundary loops"
    );

    loops
}

fn runs_forward(face: &[u32; 3], a: u32, b: u32) -> bool {
    (0..3).any(|i| face[i] == a && face[(i + 1) % 3] == b)
}

/// Triangulate one loop by ear clipping, falling back to a fan when no ear
/// can be found.
pub fn fill_hole_ear_clipping(mesh: &Mesh, boundary: &BoundaryLoop) -> Vec<[u32; 3]> {
    let n = boundary.vertices.len();
    if n < 3 {
        return Vec::new();
    }

    let positions: Vec<Point3<f64>> = boundary
        .vertices
        .iter()
        .map(|&idx| mesh.vertices[idx as usize].position)
        .collect();
    let normal = loop_normal(&positions);

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let next = remaining[(i + 1) % len];
            is_ear(&positions, &remaining, prev, remaining[i], next, &normal)
        });

        let Some(i) = ear else {
            debug!(
                target: "cloud_envelope::repair",
                "Ear clipping stuck with {} vertices remaining, using a fan", len
            );
            break;
        };

        let prev = remaining[(i + len - 1) % len];
        let next = remaining[(i + 1) % len];
        triangles.push([
            boundary.vertices[prev],
            boundary.vertices[remaining[i]],
            boundary.vertices[next],
        ]);
        remaining.remove(i);
    }

    let hub = remaining[0];
    for pair in remaining[1..].windows(2) {
        triangles.push([
            boundary.vertices[hub],
            boundary.vertices[pair[0]],
            boundary.vertices[pair[1]],
        ]);
    }

    triangles
}

/// Newell normal of a polygon, +Z when degenerate.
fn loop_normal(positions: &[Point3<f64>]) -> Vector3<f64> {
    let n = positions.len();
    let normal = (0..n).fold(Vector3::zeros(), |acc, i| {
        let (p, q) = (&positions[i], &positions[(i + 1) % n]);
        acc + Vector3::new(
            (p.y - q.y) * (p.z + q.z),
            (p.z - q.z) * (p.x + q.x),
            (p.x - q.x) * (p.y + q.y),
        )
    });
    normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z)
}

fn is_ear(
    positions: &[Point3<f64>],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    loop_normal: &Vector3<f64>,
) -> bool {
    let (a, b, c) = (positions[prev], positions[curr], positions[next]);
    let Some(tri_normal) = Triangle::new(a, b, c).normal() else {
        return false;
    };
    if tri_normal.dot(loop_normal) <= 0.0 {
        return false;
    }

    !remaining
        .iter()
        .filter(|&&idx| idx != prev && idx != curr && idx != next)
        .any(|&idx| point_in_triangle_projected(&positions[idx], &a, &b, &c, loop_normal))
}

/// Point-in-triangle after dropping the axis most aligned with `normal`.
fn point_in_triangle_projected(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let (u, v) = match normal.iamax() {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let flat = |q: &Point3<f64>| (q[u], q[v]);
    let (p, a, b, c) = (flat(p), flat(a), flat(b), flat(c));

    let side = |p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)| {
        (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1)
    };
    let d1 = side(p, a, b);
    let d2 = side(p, b, c);
    let d3 = side(p, c, a);

    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Fill every boundary loop with at most `max_hole_edges` edges.
///
/// Loops are triangulated in parallel and appended in detection order.
pub fn fill_holes(mesh: &mut Mesh, max_hole_edges: usize) -> HoleFillSummary {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let (fillable, too_large): (Vec<_>, Vec<_>) = detect_holes(mesh, &adjacency)
        .into_iter()
        .partition(|hole| hole.edge_count() <= max_hole_edges);

    for hole in &too_large {
        warn!(
            target: "cloud_envelope::repair",
            "Skipping hole with {} edges (max: {})",
            hole.edge_count(),
            max_hole_edges
        );
    }

    let patches: Vec<Vec<[u32; 3]>> = fillable
        .par_iter()
        .map(|hole| fill_hole_ear_clipping(mesh, hole))
        .collect();

    let faces_added = patches.iter().map(Vec::len).sum();
    for patch in patches {
        mesh.faces.extend(patch);
    }

    if !fillable.is_empty() {
        info!(
            target: "cloud_envelope::repair",
            "Filled {} hole(s) with {} triangles", fillable.len(), faces_added
        );
    }

    HoleFillSummary {
        filled: fillable.len(),
        skipped: too_large.len(),
        faces_added,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use approx::assert_relative_eq;

    /// Outward unit cube without its top (z = 1) face.
    fn open_box_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ] {
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
        mesh.faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        mesh
    }

    #[test]
    fn test_detect_square_hole() {
        let mesh = open_box_mesh();
        let adjacency = MeshAdjacency::build(&mesh.faces);
        let holes = detect_holes(&mesh, &adjacency);

        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].edge_count(), 4);
        // Sorted half-edges start the loop at vertex 4, heading to 5.
        assert_eq!(holes[0].vertices, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_fill_closes_and_orients() {
        let mut mesh = open_box_mesh();
        let summary = fill_holes(&mut mesh, 100);

        assert_eq!(summary.filled, 1);
        assert_eq!(summary.faces_added, 2);
        assert!(MeshAdjacency::build(&mesh.faces).is_watertight());
        assert_relative_eq!(mesh.signed_volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_size_limit() {
        let mut mesh = open_box_mesh();
        let summary = fill_holes(&mut mesh, 3);
        assert_eq!(summary.filled, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(mesh.face_count(), 10);
    }

    #[test]
    fn test_concave_loop() {
        // L-shaped hexagon in the XY plane, counter-clockwise.
        let mut mesh = Mesh::new();
        for &(x, y) in &[(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (1.0, 2.0), (0.0, 2.0)] {
            mesh.vertices.push(Vertex::from_coords(x, y, 0.0));
        }
        let boundary = BoundaryLoop {
            vertices: (0..6).collect(),
        };
        let tris = fill_hole_ear_clipping(&mesh, &boundary);
        assert_eq!(tris.len(), 4);

        let area: f64 = tris
            .iter()
            .map(|t| {
                let tri = Triangle::new(
                    mesh.vertices[t[0] as usize].position,
                    mesh.vertices[t[1] as usize].position,
                    mesh.vertices[t[2] as usize].position,
                );
                assert!(tri.normal_unnormalized().z > 0.0);
                tri.area()
            })
            .sum();
        assert_relative_eq!(area, 3.0, epsilon = 1e-12);
    }
}
