//! Face orientation: consistent winding and outward-facing shells.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::Mesh;
use crate::adjacency::MeshAdjacency;
use crate::components::find_connected_components;

/// Make winding consistent across shared edges.
///
/// Each edge-connected patch is flood-filled from its lowest-index face, which
/// keeps its orientation. Neighbours that traverse a shared edge in the same
/// direction are flipped. Returns the number of flipped faces.
pub fn fix_winding_order(mesh: &mut Mesh) -> usize {
    if mesh.faces.is_empty() {
        return 0;
    }

    let adjacency = MeshAdjacency::build(&mesh.faces);
    let face_count = mesh.faces.len();

    let mut visited = vec![false; face_count];
    let mut flipped = vec![false; face_count];
    let mut patches = 0;

    for start in 0..face_count {
        if visited[start] {
            continue;
        }
        patches += 1;
        visited[start] = true;
        let mut queue = VecDeque::from([start]);

        while let Some(face_idx) = queue.pop_front() {
            let face = mesh.faces[face_idx];
            for i in 0..3 {
                let (v0, v1) = (face[i], face[(i + 1) % 3]);
                for &neighbor in adjacency.faces_for_edge(v0, v1) {
                    let neighbor = neighbor as usize;
                    if visited[neighbor] {
                        continue;
                    }
                    visited[neighbor] = true;

                    // A flipped face traverses its edges backwards.
                    let same_direction =
                        edge_direction_in_face(&mesh.faces[neighbor], v0, v1).unwrap_or(false);
                    flipped[neighbor] = same_direction != flipped[face_idx];
                    queue.push_back(neighbor);
                }
            }
        }
    }

    let mut flip_count = 0;
    for (face, _) in mesh.faces.iter_mut().zip(&flipped).filter(|(_, f)| **f) {
        face.swap(1, 2);
        flip_count += 1;
    }

    if flip_count > 0 {
        info!(
            target: "cloud_envelope::repair",
            "Fixed winding order: flipped {} faces across {} patch(es)", flip_count, patches
        );
    } else {
        debug!(target: "cloud_envelope::repair", patches, "Winding order already consistent");
    }

    flip_count
}

/// Flip every closed body whose enclosed volume is negative.
///
/// Returns the number of bodies flipped.
pub fn orient_outward(mesh: &mut Mesh) -> usize {
    let analysis = find_connected_components(mesh);
    let mut flipped_bodies = 0;

    for faces in &analysis.components {
        if !crate::components::is_closed_shell(mesh, faces) {
            continue;
        }
        let signed_volume: f64 = faces
            .iter()
            .filter_map(|&f| mesh.triangle(f as usize))
            .map(|t| t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords)) / 6.0)
            .sum();
        if signed_volume < 0.0 {
            for &f in faces {
                mesh.faces[f as usize].swap(1, 2);
            }
            flipped_bodies += 1;
        }
    }

    if flipped_bodies > 0 {
        info!(target: "cloud_envelope::repair", "Turned {} inside-out body(ies) outward", flipped_bodies);
    }
    flipped_bodies
}

/// Some(true) if `face` traverses a -> b, Some(false) for b -> a, None if absent.
fn edge_direction_in_face(face: &[u32; 3], a: u32, b: u32) -> Option<bool> {
    (0..3).find_map(|i| {
        let (v0, v1) = (face[i], face[(i + 1) % 3]);
        if v0 == a && v1 == b {
            Some(true)
        } else if v0 == b && v1 == a {
            Some(false)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn hinge(offset: f64, mesh: &mut Mesh) {
        let base = mesh.vertices.len() as u32;
        mesh.vertices.push(Vertex::from_coords(offset, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(offset + 1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(offset + 0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(offset + 0.5, -1.0, 0.0));
        mesh.faces.push([base, base + 1, base + 2]);
        // Same direction on the shared edge as the first face.
        mesh.faces.push([base, base + 1, base + 3]);
    }

    fn assert_opposite(mesh: &Mesh, f0: usize, f1: usize, a: u32, b: u32) {
        let d0 = edge_direction_in_face(&mesh.faces[f0], a, b);
        let d1 = edge_direction_in_face(&mesh.faces[f1], a, b);
        assert!(d0.is_some() && d1.is_some());
        assert_ne!(d0, d1);
    }

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
    fn test_consistent_mesh_untouched() {
        let mut mesh = tetrahedron();
        let before = mesh.faces.clone();
        assert_eq!(fix_winding_order(&mut mesh), 0);
        assert_eq!(mesh.faces, before);
    }

    #[test]
    fn test_first_face_is_the_seed() {
        let mut mesh = Mesh::new();
        hinge(0.0, &mut mesh);
        assert_eq!(fix_winding_order(&mut mesh), 1);
        assert_eq!(mesh.faces[0], [0, 1, 2]);
        assert_opposite(&mesh, 0, 1, 0, 1);
    }

    #[test]
    fn test_disconnected_patches() {
        let mut mesh = Mesh::new();
        hinge(0.0, &mut mesh);
        hinge(10.0, &mut mesh);
        assert_eq!(fix_winding_order(&mut mesh), 2);
        assert_opposite(&mesh, 0, 1, 0, 1);
        assert_opposite(&mesh, 2, 3, 4, 5);
    }

    #[test]
    fn test_single_flipped_face_repaired() {
        let mut mesh = tetrahedron();
        mesh.faces[2].swap(1, 2);
        assert_eq!(fix_winding_order(&mut mesh), 1);
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_orient_outward() {
        let mut mesh = tetrahedron();
        for face in &mut mesh.faces {
            face.swap(1, 2);
        }
        assert!(mesh.signed_volume() < 0.0);
        assert_eq!(orient_outward(&mut mesh), 1);
        assert!(mesh.signed_volume() > 0.0);
        assert_eq!(orient_outward(&mut mesh), 0);
    }
}
