//! Envelope accuracy: how much of the original cloud the envelope encloses.
//!
//! A point counts as enclosed when it lies within a small tolerance of the
//! surface or when ray parity says it is inside. Parity is decided by a
//! majority vote over three rays with fixed, skewed directions. A ray that
//! grazes an edge or vertex cannot be counted reliably, so it is dropped and
//! the next spare direction is tried instead.
//!
//! Only closed shells that enclose a volume take part in the test. Open
//! bodies and flat shells enclose nothing, so a degenerate envelope scores 0
//! even when every point lies on it.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::info;

use crate::bvh::{Aabb, Bvh};
use crate::components::{ComponentAnalysis, find_connected_components, is_closed_shell};
use crate::pointcloud::PointCloud;
use crate::tracing_ext::OperationTimer;
use crate::types::{Mesh, Triangle};

/// Ray directions, voting ones first, then spares. Not normalized.
const RAY_DIRECTIONS: [[f64; 3]; 7] = [
    [0.5413, 0.3214, 0.7771],
    [-0.4376, 0.8130, -0.3842],
    [0.2718, -0.6180, -0.7379],
    [-0.8311, -0.2236, 0.5090],
    [0.1414, 0.9899, 0.0173],
    [0.7071, -0.1732, -0.6853],
    [-0.3090, -0.9045, 0.2939],
];

const VOTES: usize = 3;

/// Barycentric margin under which a hit is treated as grazing.
const GRAZE_EPSILON: f64 = 1e-9;

/// Shell volume, relative to the cubed bounding-box diagonal, under which a
/// closed shell counts as flat.
const FLAT_VOLUME_EPSILON: f64 = 1e-9;

/// Parameters for [`check_envelope_accuracy`].
#[derive(Debug, Clone)]
pub struct ContainmentParams {
    /// Distance to the surface under which a point counts as enclosed,
    /// relative to the mesh bounding-box diagonal.
    ///
    /// Default: `1e-6`
    pub surface_tolerance: f64,
}

impl Default for ContainmentParams {
    fn default() -> Self {
        Self {
            surface_tolerance: 1e-6,
        }
    }
}

/// Outcome of the accuracy check.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccuracyReport {
    /// Points classified as inside or on the surface.
    pub enclosed: usize,
    /// Points tested.
    pub total: usize,
    /// `100 * enclosed / total`, 0 when nothing was tested.
    pub ratio: f64,
    /// Bodies of the mesh, connected through shared vertices.
    pub envelope_count: usize,
    /// Bodies that are closed shells.
    pub closed_shells: usize,
}

/// Point-in-solid classifier over a triangle mesh.
pub struct SolidClassifier {
    triangles: Vec<Triangle>,
    bvh: Bvh,
    tolerance: f64,
}

impl SolidClassifier {
    pub fn new(mesh: &Mesh, params: &ContainmentParams) -> Self {
        let triangles: Vec<Triangle> = mesh.triangles().collect();
        let bvh = Bvh::build(&triangles, Bvh::LEAF_SIZE);
        let diagonal = bvh.bounds().map_or(0.0, |b| b.diagonal());
        Self {
            triangles,
            bvh,
            tolerance: params.surface_tolerance * diagonal,
        }
    }

    /// Whether `point` is inside the solid or on its surface.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        if let Some(bounds) = self.bvh.bounds()
            && !bounds.intersects(&Aabb::from_point(point), self.tolerance)
        {
            return false;
        }

        let mut candidates = Vec::new();
        if self.on_surface(point, &mut candidates) {
            return true;
        }

        let mut inside_votes = 0;
        let mut votes = 0;
        for dir in RAY_DIRECTIONS {
            if votes == VOTES {
                break;
            }
            let dir = Vector3::from(dir);
            if let Some(crossings) = self.count_crossings(point, &dir, &mut candidates) {
                votes += 1;
                inside_votes += crossings % 2;
            }
        }

        votes > 0 && 2 * inside_votes > votes
    }

    fn on_surface(&self, point: &Point3<f64>, candidates: &mut Vec<u32>) -> bool {
        candidates.clear();
        self.bvh
            .query(&Aabb::from_point(point), self.tolerance, candidates);
        candidates.iter().any(|&t| {
            let tri = &self.triangles[t as usize];
            let closest = closest_point_on_triangle(point, tri);
            (closest - point).norm() <= self.tolerance
        })
    }

    /// Number of surface crossings along the ray, None if the ray grazes.
    fn count_crossings(
        &self,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        candidates: &mut Vec<u32>,
    ) -> Option<usize> {
        candidates.clear();
        self.bvh.query_ray(origin, dir, candidates);

        let mut crossings = 0;
        for &t in candidates.iter() {
            match ray_triangle_intersect(origin, dir, &self.triangles[t as usize]) {
                RayHit::Miss => {}
                RayHit::Crossing => crossings += 1,
                RayHit::Grazing => return None,
            }
        }
        Some(crossings)
    }
}

/// Measure how much of `original` the envelope `mesh` encloses, and count
/// its bodies.
///
/// An empty mesh, an empty cloud, or a mesh without a closed shell of
/// positive volume gives a ratio of 0.
///
/// # Example
///
/// ```
/// use cloud_envelope::{Mesh, PointCloud, Vertex};
/// use cloud_envelope::containment::{ContainmentParams, check_envelope_accuracy};
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
/// mesh.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
///
/// let mut cloud = PointCloud::new();
/// cloud.push_coords(0.1, 0.1, 0.1);
/// cloud.push_coords(2.0, 2.0, 2.0);
///
/// let report = check_envelope_accuracy(&cloud, &mesh, &ContainmentParams::default());
/// assert_eq!(report.enclosed, 1);
/// assert_eq!(report.ratio, 50.0);
/// assert_eq!(report.envelope_count, 1);
/// ```
pub fn check_envelope_accuracy(
    original: &PointCloud,
    mesh: &Mesh,
    params: &ContainmentParams,
) -> AccuracyReport {
    let _timer = OperationTimer::with_points("envelope_accuracy", original.len());

    let components = find_connected_components(mesh);
    let total = original.len();

    let solid = enclosing_shells(mesh, &components);
    let enclosed = if solid.is_empty() || total == 0 {
        0
    } else {
        let classifier = SolidClassifier::new(&solid, params);
        original
            .points
            .par_iter()
            .filter(|p| classifier.contains(&p.position))
            .count()
    };

    let ratio = if total == 0 {
        0.0
    } else {
        100.0 * enclosed as f64 / total as f64
    };

    info!(
        target: "cloud_envelope::containment",
        enclosed,
        total,
        ratio = format!("{:.2}", ratio),
        envelopes = components.component_count,
        closed_shells = components.closed_shells,
        "Envelope accuracy"
    );

    AccuracyReport {
        enclosed,
        total,
        ratio,
        envelope_count: components.component_count,
        closed_shells: components.closed_shells,
    }
}

/// The closed shells of `mesh` that enclose a volume, gathered in one mesh.
fn enclosing_shells(mesh: &Mesh, components: &ComponentAnalysis) -> Mesh {
    let diagonal = mesh.bounds().map_or(0.0, |(lo, hi)| (hi - lo).norm());
    let min_volume = FLAT_VOLUME_EPSILON * diagonal.powi(3);

    let mut solid = Mesh::new();
    for body in &components.components {
        if !is_closed_shell(mesh, body) {
            continue;
        }
        let volume = body
            .iter()
            .map(|&f| {
                let [a, b, c] =
                    mesh.faces[f as usize].map(|v| mesh.vertices[v as usize].position.coords);
                a.dot(&b.cross(&c))
            })
            .sum::<f64>()
            / 6.0;
        if volume.abs() > min_volume {
            solid.faces.extend(body.iter().map(|&f| mesh.faces[f as usize]));
        }
    }

    if !solid.faces.is_empty() {
        solid.vertices = mesh.vertices.clone();
    }
    solid
}

/// Closest point on a triangle (Ericson, Real-Time Collision Detection 5.1.5).
pub fn closest_point_on_triangle(p: &Point3<f64>, tri: &Triangle) -> Point3<f64> {
    let (a, b, c) = (tri.v0, tri.v1, tri.v2);
    let ab = b - a;
    let ac = c - a;

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = va + vb + vc;
    if denom.abs() < f64::MIN_POSITIVE {
        // Degenerate triangle; the nearest corner is close enough.
        return *[a, b, c]
            .iter()
            .min_by(|x, y| (*x - p).norm_squared().total_cmp(&(*y - p).norm_squared()))
            .unwrap_or(&a);
    }
    a + ab * (vb / denom) + ac * (vc / denom)
}

/// Classification of one ray against one triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayHit {
    Miss,
    /// The ray passes through the triangle interior.
    Crossing,
    /// The ray touches an edge or vertex, or runs inside the triangle plane.
    Grazing,
}

/// Möller–Trumbore test for the ray `origin + t * dir`, `t > 0`.
pub fn ray_triangle_intersect(origin: &Point3<f64>, dir: &Vector3<f64>, tri: &Triangle) -> RayHit {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = dir.cross(&edge2);
    let det = edge1.dot(&h);
    let scale = edge1.norm() * edge2.norm() * dir.norm();

    let s = origin - tri.v0;

    if det.abs() <= GRAZE_EPSILON * scale {
        // Parallel: grazing only if the ray runs in the triangle plane.
        let normal = edge1.cross(&edge2);
        let normal_len = normal.norm();
        if normal_len == 0.0 || (normal.dot(&s) / normal_len).abs() > GRAZE_EPSILON * edge1.norm() {
            return RayHit::Miss;
        }
        return RayHit::Grazing;
    }

    let inv = 1.0 / det;
    let u = inv * s.dot(&h);
    let q = s.cross(&edge1);
    let v = inv * dir.dot(&q);
    let t = inv * edge2.dot(&q);

    if t <= 0.0 {
        return RayHit::Miss;
    }
    if u < -GRAZE_EPSILON || v < -GRAZE_EPSILON || u + v > 1.0 + GRAZE_EPSILON {
        return RayHit::Miss;
    }
    if u <= GRAZE_EPSILON || v <= GRAZE_EPSILON || u + v >= 1.0 - GRAZE_EPSILON {
        return RayHit::Grazing;
    }
    RayHit::Crossing
}
