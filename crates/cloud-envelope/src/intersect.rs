//! Self-intersection detection for envelope surfaces.
//!
//! A surface that crosses itself encloses no well-defined solid, so the
//! manifold check treats any intersecting pair of non-neighbouring faces as
//! a defect. Candidate pairs come from a [`Bvh`] broad phase; each candidate
//! is confirmed with a separating-axis test.

use nalgebra::Vector3;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::bvh::{Aabb, Bvh};
use crate::types::{Mesh, Triangle};

/// Result of self-intersection detection.
#[derive(Debug, Clone, Default)]
pub struct SelfIntersectionResult {
    /// Number of intersecting face pairs found.
    pub intersection_count: usize,
    /// Intersecting pairs as (face_a, face_b) with face_a < face_b, sorted.
    /// Limited to `max_reported` pairs.
    pub intersecting_pairs: Vec<(u32, u32)>,
    /// Faces checked.
    pub faces_checked: usize,
    /// The search stopped at `max_reported`.
    pub truncated: bool,
}

impl SelfIntersectionResult {
    /// No intersecting pair was found.
    pub fn is_clean(&self) -> bool {
        self.intersection_count == 0
    }
}

impl std::fmt::Display for SelfIntersectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            write!(f, "No self-intersections detected")
        } else {
            write!(
                f,
                "Self-intersections found: {} pair(s){}",
                self.intersection_count,
                if self.truncated { " (truncated)" } else { "" }
            )
        }
    }
}

/// Parameters for self-intersection detection.
#[derive(Debug, Clone)]
pub struct IntersectionParams {
    /// Stop after this many pairs. 0 means unlimited.
    pub max_reported: usize,
    /// Tolerance for the separating-axis projections.
    pub epsilon: f64,
    /// Skip face pairs that share a vertex. Neighbouring faces always touch.
    pub skip_adjacent: bool,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            max_reported: 100,
            epsilon: 1e-10,
            skip_adjacent: true,
        }
    }
}

/// Detect self-intersecting face pairs.
///
/// # Example
/// ```
/// use cloud_envelope::{Mesh, Vertex};
/// use cloud_envelope::intersect::{detect_self_intersections, IntersectionParams};
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let result = detect_self_intersections(&mesh, &IntersectionParams::default());
/// assert!(result.is_clean());
/// ```
pub fn detect_self_intersections(
    mesh: &Mesh,
    params: &IntersectionParams,
) -> SelfIntersectionResult {
    let face_count = mesh.faces.len();
    if face_count < 2 {
        return SelfIntersectionResult {
            faces_checked: face_count,
            ..Default::default()
        };
    }

    debug!(target: "cloud_envelope::intersect", faces = face_count, "checking self-intersections");

    let triangles: Vec<Triangle> = mesh.triangles().collect();
    let bvh = Bvh::build(&triangles, Bvh::LEAF_SIZE);

    let max_pairs = if params.max_reported == 0 {
        usize::MAX
    } else {
        params.max_reported
    };

    let found = AtomicUsize::new(0);
    let should_stop = AtomicBool::new(false);

    let mut intersecting_pairs: Vec<(u32, u32)> = (0..face_count)
        .into_par_iter()
        .flat_map_iter(|i| {
            let mut local_pairs = Vec::new();
            if should_stop.load(Ordering::Relaxed) {
                return local_pairs;
            }

            let mut candidates = Vec::new();
            bvh.query(&Aabb::from_triangle(&triangles[i]), params.epsilon, &mut candidates);

            for j in candidates.into_iter().map(|j| j as usize) {
                if j <= i {
                    continue;
                }
                if params.skip_adjacent && shares_vertex(&mesh.faces[i], &mesh.faces[j]) {
                    continue;
                }
                if triangles_intersect(&triangles[i], &triangles[j], params.epsilon) {
                    let count = found.fetch_add(1, Ordering::Relaxed);
                    if count < max_pairs {
                        local_pairs.push((i as u32, j as u32));
                    }
                    if count + 1 >= max_pairs {
                        should_stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
            local_pairs
        })
        .collect();

    intersecting_pairs.sort_unstable();
    intersecting_pairs.truncate(max_pairs);

    let intersection_count = found.load(Ordering::Relaxed);
    let truncated = params.max_reported > 0 && intersection_count >= max_pairs;

    if intersection_count > 0 {
        warn!(
            target: "cloud_envelope::intersect",
            "Found {} self-intersecting face pair(s){}",
            intersection_count,
            if truncated { " (search truncated)" } else { "" }
        );
    }

    SelfIntersectionResult {
        intersection_count,
        intersecting_pairs,
        faces_checked: face_count,
        truncated,
    }
}

fn shares_vertex(a: &[u32; 3], b: &[u32; 3]) -> bool {
    a.iter().any(|v| b.contains(v))
}

/// Separating-axis test for two triangles.
///
/// Touching within `epsilon` counts as intersecting.
fn triangles_intersect(t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let n1 = t1.normal_unnormalized();
    let n2 = t2.normal_unnormalized();

    if n1.norm_squared() < epsilon * epsilon || n2.norm_squared() < epsilon * epsilon {
        return false;
    }

    let edges1 = [t1.v1 - t1.v0, t1.v2 - t1.v1, t1.v0 - t1.v2];
    let edges2 = [t2.v1 - t2.v0, t2.v2 - t2.v1, t2.v0 - t2.v2];

    let separates = |axis: Vector3<f64>| {
        axis.norm_squared() > epsilon * epsilon && separated_by_axis(&axis, t1, t2, epsilon)
    };

    let coplanar = n1.cross(&n2).norm_squared()
        < epsilon * epsilon * n1.norm_squared() * n2.norm_squared();

    if coplanar {
        // In-plane edge normals are the only candidate axes.
        let in_plane = edges1
            .iter()
            .map(|e| n1.cross(e))
            .chain(edges2.iter().map(|e| n2.cross(e)));
        return !in_plane.into_iter().any(separates);
    }

    if separated_by_axis(&n1, t1, t2, epsilon) || separated_by_axis(&n2, t1, t2, epsilon) {
        return false;
    }

    !edges1
        .iter()
        .flat_map(|e1| edges2.iter().map(move |e2| e1.cross(e2)))
        .any(separates)
}

fn separated_by_axis(axis: &Vector3<f64>, t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let project = |t: &Triangle| {
        let p = [
            axis.dot(&t.v0.coords),
            axis.dot(&t.v1.coords),
            axis.dot(&t.v2.coords),
        ];
        (p[0].min(p[1]).min(p[2]), p[0].max(p[1]).max(p[2]))
    };
    let (min1, max1) = project(t1);
    let (min2, max2) = project(t2);

    max1 + epsilon < min2 || max2 + epsilon < min1
}
