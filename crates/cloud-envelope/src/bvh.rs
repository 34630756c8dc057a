//! Bounding volume hierarchy over mesh triangles.
//!
//! Used as the broad phase for self-intersection detection, point-to-surface
//! distance queries and ray casting.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;

use crate::types::Triangle;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Inverted box that any `expand` overwrites.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Box around a single point.
    pub fn from_point(p: &Point3<f64>) -> Self {
        Self { min: *p, max: *p }
    }

    /// Tight box around a triangle.
    pub fn from_triangle(tri: &Triangle) -> Self {
        Self {
            min: tri.v0.inf(&tri.v1).inf(&tri.v2),
            max: tri.v0.sup(&tri.v1).sup(&tri.v2),
        }
    }

    /// Grow to include another box.
    pub fn expand(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Grow by `padding` on every side.
    pub fn padded(&self, padding: f64) -> Self {
        let pad = Vector3::repeat(padding);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Overlap test with tolerance.
    pub fn intersects(&self, other: &Self, tolerance: f64) -> bool {
        !(self.max.x + tolerance < other.min.x
            || other.max.x + tolerance < self.min.x
            || self.max.y + tolerance < other.min.y
            || other.max.y + tolerance < self.min.y
            || self.max.z + tolerance < other.min.z
            || other.max.z + tolerance < self.min.z)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Length of the main diagonal, 0 for an empty box.
    pub fn diagonal(&self) -> f64 {
        if self.min.x > self.max.x {
            return 0.0;
        }
        (self.max - self.min).norm()
    }

    /// Index of the longest axis (0=X, 1=Y, 2=Z).
    pub fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Slab test for the ray `origin + t * dir`, `t >= 0`.
    pub fn hit_by_ray(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> bool {
        let mut t_min = 0.0_f64;
        let mut t_max = f64::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d == 0.0 {
                if o < lo || o > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (t0, t1) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

/// BVH node containing either leaf triangles or two children.
#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        triangles: SmallVec<[u32; 8]>,
    },
    Internal {
        bbox: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Median-split BVH over a triangle list.
///
/// Queries return indices into the slice the tree was built from.
#[derive(Debug)]
pub struct Bvh {
    root: Option<BvhNode>,
    boxes: Vec<Aabb>,
}

impl Bvh {
    /// Default number of triangles per leaf.
    pub const LEAF_SIZE: usize = 8;

    /// Build a BVH over `triangles`.
    pub fn build(triangles: &[Triangle], max_leaf_size: usize) -> Self {
        if triangles.is_empty() {
            return Self {
                root: None,
                boxes: Vec::new(),
            };
        }

        let boxes: Vec<(u32, Aabb)> = triangles
            .iter()
            .enumerate()
            .map(|(i, tri)| (i as u32, Aabb::from_triangle(tri)))
            .collect();
        let indices: Vec<usize> = (0..boxes.len()).collect();
        let root = Self::build_recursive(&boxes, indices, max_leaf_size.max(1));

        Self {
            root: Some(root),
            boxes: boxes.into_iter().map(|(_, b)| b).collect(),
        }
    }

    fn build_recursive(boxes: &[(u32, Aabb)], mut indices: Vec<usize>, max_leaf: usize) -> BvhNode {
        let mut bbox = Aabb::empty();
        for &i in &indices {
            bbox.expand(&boxes[i].1);
        }

        if indices.len() <= max_leaf {
            return BvhNode::Leaf {
                bbox,
                triangles: indices.iter().map(|&i| boxes[i].0).collect(),
            };
        }

        let axis = bbox.longest_axis();
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            boxes[a].1.center()[axis].total_cmp(&boxes[b].1.center()[axis])
        });
        let right_indices = indices.split_off(mid);

        BvhNode::Internal {
            bbox,
            left: Box::new(Self::build_recursive(boxes, indices, max_leaf)),
            right: Box::new(Self::build_recursive(boxes, right_indices, max_leaf)),
        }
    }

    /// Number of triangles indexed.
    pub fn triangle_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bounds of everything in the tree.
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.as_ref().map(|r| *r.bbox())
    }

    /// Append to `out` every triangle whose box overlaps `query` within `tolerance`.
    pub fn query(&self, query: &Aabb, tolerance: f64, out: &mut Vec<u32>) {
        let Some(root) = &self.root else { return };
        let mut stack: SmallVec<[&BvhNode; 32]> = SmallVec::new();
        stack.push(root);
        while let Some(node) = stack.pop() {
            if !node.bbox().intersects(query, tolerance) {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => out.extend(
                    triangles
                        .iter()
                        .copied()
                        .filter(|&t| self.boxes[t as usize].intersects(query, tolerance)),
                ),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }

    /// Append to `out` every triangle whose box the ray `origin + t * dir`,
    /// `t >= 0`, passes through.
    pub fn query_ray(&self, origin: &Point3<f64>, dir: &Vector3<f64>, out: &mut Vec<u32>) {
        let Some(root) = &self.root else { return };
        let mut stack: SmallVec<[&BvhNode; 32]> = SmallVec::new();
        stack.push(root);
        while let Some(node) = stack.pop() {
            if !node.bbox().hit_by_ray(origin, dir) {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => out.extend(
                    triangles
                        .iter()
                        .copied()
                        .filter(|&t| self.boxes[t as usize].hit_by_ray(origin, dir)),
                ),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }
}
