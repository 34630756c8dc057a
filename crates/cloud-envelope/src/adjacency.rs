//! Edge-to-face adjacency.

use hashbrown::HashMap;

/// Undirected edge key with the smaller vertex index first.
#[inline]
pub fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

/// Maps every undirected edge of a face list to the faces using it.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    /// Edge (min, max) to the indices of incident faces, in face order.
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,
}

impl MeshAdjacency {
    /// Build adjacency for a face list.
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
            HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let key = edge_key(face[i], face[(i + 1) % 3]);
                edge_to_faces.entry(key).or_default().push(face_idx as u32);
            }
        }

        Self { edge_to_faces }
    }

    /// Faces incident to an edge, in either vertex order.
    pub fn faces_for_edge(&self, a: u32, b: u32) -> &[u32] {
        self.edge_to_faces
            .get(&edge_key(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edges used by exactly one face.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Number of edges used by exactly one face.
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() == 1).count()
    }

    /// Edges shared by more than two faces.
    pub fn non_manifold_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Number of edges shared by more than two faces.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() > 2).count()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }

    /// Every edge is shared by exactly two faces.
    pub fn is_watertight(&self) -> bool {
        self.edge_to_faces.values().all(|f| f.len() == 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_triangle_is_all_boundary() {
        let adjacency = MeshAdjacency::build(&[[0, 1, 2]]);
        assert_eq!(adjacency.edge_count(), 3);
        assert_eq!(adjacency.boundary_edge_count(), 3);
        assert!(!adjacency.is_watertight());
    }

    #[test]
    fn test_tetrahedron_is_watertight() {
        let faces = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];
        let adjacency = MeshAdjacency::build(&faces);
        assert_eq!(adjacency.edge_count(), 6);
        assert!(adjacency.is_watertight());
        assert_eq!(adjacency.faces_for_edge(3, 0).len(), 2);
    }

    #[test]
    fn test_fin_is_non_manifold() {
        // Three triangles hinged on edge 0-1.
        let faces = [[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let adjacency = MeshAdjacency::build(&faces);
        assert_eq!(adjacency.non_manifold_edge_count(), 1);
        assert_eq!(adjacency.non_manifold_edges().next(), Some((0, 1)));
        assert_eq!(adjacency.boundary_edge_count(), 6);
    }
}
