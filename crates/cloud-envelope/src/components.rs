//! Connected bodies of an envelope mesh.
//!
//! Two faces belong to the same body when they share a vertex, so shells that
//! only touch at a point are counted once. A body is a closed shell when every
//! edge inside it is shared by exactly two of its faces.

use std::cmp::Reverse;

use hashbrown::HashMap;
use tracing::debug;

use crate::adjacency::MeshAdjacency;
use crate::types::Mesh;

/// Result of connected component analysis.
#[derive(Debug, Clone, Default)]
pub struct ComponentAnalysis {
    /// Number of bodies found.
    pub component_count: usize,
    /// Face indices of each body, largest first.
    pub components: Vec<Vec<u32>>,
    /// Bodies whose edges are all shared by exactly two of their faces.
    pub closed_shells: usize,
}

impl ComponentAnalysis {
    /// Faces of the largest body.
    pub fn largest_component(&self) -> &[u32] {
        self.components.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every body is closed.
    pub fn all_closed(&self) -> bool {
        self.closed_shells == self.component_count
    }
}

impl std::fmt::Display for ComponentAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Component Analysis:")?;
        writeln!(f, "  Bodies: {}", self.component_count)?;
        writeln!(f, "  Closed shells: {}", self.closed_shells)?;
        if self.component_count > 1 {
            for (i, comp) in self.components.iter().enumerate() {
                writeln!(f, "    Body {}: {} faces", i + 1, comp.len())?;
            }
        }
        Ok(())
    }
}

/// Union-find over vertex indices.
struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => self.parent[ra as usize] = rb,
            std::cmp::Ordering::Greater => self.parent[rb as usize] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb as usize] = ra;
                self.rank[ra as usize] += 1;
            }
        }
    }
}

/// Find the bodies of a mesh.
///
/// # Example
/// ```
/// use cloud_envelope::{Mesh, Vertex};
/// use cloud_envelope::components::find_connected_components;
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(11.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(10.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
/// mesh.faces.push([3, 4, 5]);
///
/// let analysis = find_connected_components(&mesh);
/// assert_eq!(analysis.component_count, 2);
/// assert_eq!(analysis.closed_shells, 0);
/// ```
pub fn find_connected_components(mesh: &Mesh) -> ComponentAnalysis {
    if mesh.faces.is_empty() {
        return ComponentAnalysis::default();
    }

    let mut sets = DisjointSet::new(mesh.vertices.len());
    for &[a, b, c] in &mesh.faces {
        sets.union(a, b);
        sets.union(a, c);
    }

    // Bodies are numbered in order of their first face.
    let mut body_of_root: HashMap<u32, usize> = HashMap::new();
    let mut components: Vec<Vec<u32>> = Vec::new();
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        let root = sets.find(face[0]);
        let body = *body_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[body].push(face_idx as u32);
    }

    components.sort_by_key(|c| Reverse(c.len()));

    let closed_shells = components
        .iter()
        .filter(|faces| is_closed_shell(mesh, faces))
        .count();

    debug!(
        target: "cloud_envelope::components",
        bodies = components.len(),
        closed_shells,
        sizes = ?components.iter().map(Vec::len).collect::<Vec<_>>(),
        "component analysis"
    );

    ComponentAnalysis {
        component_count: components.len(),
        components,
        closed_shells,
    }
}

/// Whether the given faces form a closed shell on their own.
pub fn is_closed_shell(mesh: &Mesh, faces: &[u32]) -> bool {
    if faces.is_empty() {
        return false;
    }
    let subset: Vec<[u32; 3]> = faces.iter().map(|&f| mesh.faces[f as usize]).collect();
    MeshAdjacency::build(&subset).is_watertight()
}
