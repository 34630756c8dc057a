//! Delaunay tetrahedra of a point cloud.
//!
//! The triangulation itself comes from the `delaunay` crate. This module
//! prepares its input and reads its cells back: exact duplicates are dropped,
//! every point gets a tiny deterministic perturbation so that co-spherical
//! inputs (scanner grids, voxelized clouds) triangulate consistently, and each
//! cell is mapped back to input indices, positively oriented, with its
//! circumradius measured on the unperturbed points.

use delaunay::prelude::*;
use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Perturbation amplitude, relative to the half-size of the input box.
const JOGGLE: f64 = 1e-6;
const JOGGLE_SEED: u64 = 0x0a1f_a5ea;

type Triangulation3 = DelaunayTriangulation<FastKernel<f64>, (), (), 3>;

/// A tetrahedron of the triangulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tetrahedron {
    /// Input point indices, positively oriented.
    pub vertices: [u32; 4],
    /// Circumscribed sphere radius, in input units.
    pub circumradius: f64,
}

impl Tetrahedron {
    /// The four faces, each wound so its normal points away from the
    /// opposite vertex.
    pub fn outward_faces(&self) -> [[u32; 3]; 4] {
        let [a, b, c, d] = self.vertices;
        [[b, c, d], [a, d, c], [a, b, d], [a, c, b]]
    }
}

/// Result of [`tetrahedralize`].
#[derive(Debug, Clone, Default)]
pub struct Tetrahedralization {
    pub tetrahedra: Vec<Tetrahedron>,
    /// Distinct input points.
    pub unique_points: usize,
    /// Distinct points missing from the triangulation.
    pub skipped: usize,
}

impl Tetrahedralization {
    pub fn len(&self) -> usize {
        self.tetrahedra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tetrahedra.is_empty()
    }
}

/// Compute the Delaunay tetrahedralization of `points`.
///
/// Fewer than four distinct points, or an input the triangulator rejects as
/// degenerate (all points on one plane), produce an empty result.
pub fn tetrahedralize(points: &[Point3<f64>]) -> Tetrahedralization {
    let unique = distinct_indices(points);
    if unique.len() < 4 {
        debug!(unique = unique.len(), "Too few distinct points to tetrahedralize");
        return Tetrahedralization {
            unique_points: unique.len(),
            ..Default::default()
        };
    }

    let jittered = joggle(points, &unique);
    let mut index_of: HashMap<[u64; 3], u32> = HashMap::with_capacity(unique.len());
    let mut vertices = Vec::with_capacity(unique.len());
    for (&index, p) in unique.iter().zip(&jittered) {
        index_of.insert(coordinate_key(p), index);
        vertices.push(delaunay::vertex!([p[0], p[1], p[2]]));
    }

    let dt: Triangulation3 = match DelaunayTriangulation::new(&vertices) {
        Ok(dt) => dt,
        Err(e) => {
            warn!(
                unique = unique.len(),
                "Delaunay triangulation failed, treating input as degenerate: {e}"
            );
            return Tetrahedralization {
                unique_points: unique.len(),
                skipped: unique.len(),
                ..Default::default()
            };
        }
    };

    // Triangulator vertex keys back to input indices.
    let key_to_index: HashMap<_, u32> = dt
        .tds()
        .vertices()
        .filter_map(|(key, vertex)| {
            let coords: [f64; 3] = vertex.into();
            index_of.get(&coordinate_key(&coords)).map(|&i| (key, i))
        })
        .collect();

    let mut tetrahedra = Vec::with_capacity(dt.tds().number_of_cells());
    for (_, cell) in dt.tds().cells() {
        let mut ids = [0u32; 4];
        let mut found = 0;
        for key in cell.vertices() {
            if let Some(&index) = key_to_index.get(key)
                && found < 4
            {
                ids[found] = index;
                found += 1;
            }
        }
        if found == 4 {
            tetrahedra.push(oriented(points, ids));
        }
    }

    let result = Tetrahedralization {
        tetrahedra,
        unique_points: unique.len(),
        skipped: unique.len().saturating_sub(key_to_index.len()),
    };
    debug!(
        points = points.len(),
        unique = result.unique_points,
        tetrahedra = result.len(),
        skipped = result.skipped,
        "Tetrahedralization complete"
    );
    result
}

/// First index of every distinct position, in input order.
fn distinct_indices(points: &[Point3<f64>]) -> Vec<u32> {
    let mut seen: HashSet<[u64; 3]> = HashSet::with_capacity(points.len());
    (0..points.len() as u32)
        .filter(|&i| {
            let p = &points[i as usize];
            p.coords.iter().all(|c| c.is_finite())
                && seen.insert(coordinate_key(&[p.x, p.y, p.z]))
        })
        .collect()
}

/// Perturbed copies of the selected points.
fn joggle(points: &[Point3<f64>], indices: &[u32]) -> Vec<[f64; 3]> {
    let first = points[indices[0] as usize];
    let (min, max) = indices
        .iter()
        .map(|&i| &points[i as usize])
        .fold((first, first), |(lo, hi), p| (lo.inf(p), hi.sup(p)));
    let amplitude = (max - min).amax() * 0.5 * JOGGLE;

    let mut rng = StdRng::seed_from_u64(JOGGLE_SEED);
    indices
        .iter()
        .map(|&i| {
            let p = &points[i as usize];
            [
                p.x + rng.random_range(-1.0..=1.0) * amplitude,
                p.y + rng.random_range(-1.0..=1.0) * amplitude,
                p.z + rng.random_range(-1.0..=1.0) * amplitude,
            ]
        })
        .collect()
}

#[inline]
fn coordinate_key(p: &[f64; 3]) -> [u64; 3] {
    // -0.0 and 0.0 are the same point.
    p.map(|c| (c + 0.0).to_bits())
}

/// Tetrahedron over `ids` with positive orientation on the input points.
fn oriented(points: &[Point3<f64>], mut ids: [u32; 4]) -> Tetrahedron {
    let [a, b, c, d] = ids.map(|i| points[i as usize]);
    if orient3d(&a, &b, &c, &d) < 0.0 {
        ids.swap(2, 3);
    }
    Tetrahedron {
        vertices: ids,
        circumradius: circumradius(&a, &b, &c, &d),
    }
}

/// Six times the signed volume of `abcd`; positive when `d` lies on the side
/// of `abc` that its counter-clockwise normal points to.
#[inline]
pub(crate) fn orient3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

/// Circumradius of `abcd`, infinite for a flat tetrahedron.
pub(crate) fn circumradius(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> f64 {
    let (ab, ac, ad) = (b - a, c - a, d - a);
    let det = ab.dot(&ac.cross(&ad));
    if det == 0.0 {
        return f64::INFINITY;
    }
    let offset = (ac.cross(&ad) * ab.norm_squared()
        + ad.cross(&ab) * ac.norm_squared()
        + ab.cross(&ac) * ad.norm_squared())
        / (2.0 * det);
    let r = offset.norm();
    if r.is_finite() { r } else { f64::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn volume_sum(points: &[Point3<f64>], tets: &Tetrahedralization) -> f64 {
        tets.tetrahedra
            .iter()
            .map(|t| {
                let [a, b, c, d] = t.vertices.map(|v| points[v as usize]);
                orient3d(&a, &b, &c, &d).abs() / 6.0
            })
            .sum()
    }

    fn cube_corners() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for &x in &[0.0, 1.0] {
            for &y in &[0.0, 1.0] {
                for &z in &[0.0, 1.0] {
                    points.push(Point3::new(x, y, z));
                }
            }
        }
        points
    }

    #[test]
    fn test_single_tetrahedron() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let result = tetrahedralize(&points);
        assert_eq!(result.len(), 1);
        assert_eq!(result.skipped, 0);
        assert_relative_eq!(
            result.tetrahedra[0].circumradius,
            0.75_f64.sqrt(),
            epsilon = 1e-9
        );
        let mut vertices = result.tetrahedra[0].vertices;
        vertices.sort_unstable();
        assert_eq!(vertices, [0, 1, 2, 3]);
    }

    #[test]
    fn test_cells_are_positively_oriented() {
        let points = cube_corners();
        let result = tetrahedralize(&points);
        for tet in &result.tetrahedra {
            let [a, b, c, d] = tet.vertices.map(|v| points[v as usize]);
            assert!(orient3d(&a, &b, &c, &d) >= 0.0);
        }
    }

    #[test]
    fn test_cube_corners_fill_the_cube() {
        let points = cube_corners();
        let result = tetrahedralize(&points);
        assert!(result.len() >= 5);
        assert_relative_eq!(volume_sum(&points, &result), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_random_points_fill_their_hull() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut points = cube_corners();
        for _ in 0..200 {
            points.push(Point3::new(
                rng.random_range(0.05..0.95),
                rng.random_range(0.05..0.95),
                rng.random_range(0.05..0.95),
            ));
        }

        let result = tetrahedralize(&points);
        assert_eq!(result.skipped, 0);
        assert_relative_eq!(volume_sum(&points, &result), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut points = cube_corners();
        points.extend(cube_corners());
        let result = tetrahedralize(&points);
        assert_eq!(result.unique_points, 8);
        assert!(result.tetrahedra.iter().all(|t| t.vertices.iter().all(|&v| v < 8)));
        assert_relative_eq!(volume_sum(&points, &result), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let result = tetrahedralize(&points);
        assert!(result.is_empty());
        assert_eq!(result.unique_points, 3);
        assert!(tetrahedralize(&[]).is_empty());
    }

    #[test]
    fn test_flat_input_has_no_volume() {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                points.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        let result = tetrahedralize(&points);
        assert_eq!(volume_sum(&points, &result), 0.0);
    }

    #[test]
    fn test_circumradius() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let c = Point3::new(0.0, 2.0, 0.0);
        let d = Point3::new(0.0, 0.0, 2.0);
        assert_relative_eq!(circumradius(&a, &b, &c, &d), 3.0_f64.sqrt(), epsilon = 1e-12);
        let flat = Point3::new(1.0, 1.0, 0.0);
        assert!(circumradius(&a, &b, &c, &flat).is_infinite());
    }
}
