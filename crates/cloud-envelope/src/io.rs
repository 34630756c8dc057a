//! Mesh export and output naming.
//!
//! Envelopes are written as Wavefront OBJ so any viewer can open them.
//! Output files land next to their input:
//!
//! | output              | name                                  |
//! |---------------------|---------------------------------------|
//! | envelope mesh       | `<stem>_alpha_shape_<alpha>.obj`      |
//! | sampled cloud       | `<stem>_sampled.xyz`                  |
//! | footprint mesh      | `<stem>_footprint_<alpha>.obj`        |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use tracing::info;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::pointcloud::PointCloud;
use crate::tracing_ext::log_io_operation;
use crate::Mesh;

/// Save a mesh as Wavefront OBJ.
///
/// Vertex normals are written when any vertex carries one; faces then
/// reference them as `f a//a b//b c//c`.
pub fn save_obj(mesh: &Mesh, path: &Path) -> EnvelopeResult<()> {
    info!(target: "cloud_envelope::io", "Saving mesh to {:?} (OBJ format)", path);

    let io_err = |e| EnvelopeError::io_write(path, e);
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "# OBJ file exported by cloud-envelope").map_err(io_err)?;
    writeln!(writer, "# Vertices: {}", mesh.vertices.len()).map_err(io_err)?;
    writeln!(writer, "# Faces: {}", mesh.faces.len()).map_err(io_err)?;
    writeln!(writer).map_err(io_err)?;

    for v in &mesh.vertices {
        writeln!(writer, "v {:.6} {:.6} {:.6}", v.position.x, v.position.y, v.position.z)
            .map_err(io_err)?;
    }

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    if has_normals {
        writeln!(writer).map_err(io_err)?;
        for v in &mesh.vertices {
            let n = v.normal.unwrap_or_else(Vector3::zeros);
            writeln!(writer, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z).map_err(io_err)?;
        }
    }

    writeln!(writer).map_err(io_err)?;
    for &[a, b, c] in &mesh.faces {
        // OBJ indices are 1-based
        let (a, b, c) = (a + 1, b + 1, c + 1);
        if has_normals {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}").map_err(io_err)?;
        } else {
            writeln!(writer, "f {a} {b} {c}").map_err(io_err)?;
        }
    }
    writer.flush().map_err(io_err)?;

    log_io_operation("save", path, "obj");
    Ok(())
}

/// Save a point cloud as `x y z r g b` rows.
pub fn save_xyz(cloud: &PointCloud, path: &Path) -> EnvelopeResult<()> {
    cloud.save_xyz(path)?;
    log_io_operation("save", path, "xyz");
    Ok(())
}

/// Format alpha for file names: shortest form, at least one decimal.
pub fn format_alpha(alpha: f64) -> String {
    let s = alpha.to_string();
    if s.contains(['.', 'e', 'E']) || !alpha.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

/// `<dir>/<stem>_alpha_shape_<alpha>.obj`
pub fn envelope_mesh_path(input: &Path, alpha: f64) -> PathBuf {
    sibling(input, &format!("_alpha_shape_{}.obj", format_alpha(alpha)))
}

/// `<dir>/<stem>_sampled.xyz`
pub fn sampled_cloud_path(input: &Path) -> PathBuf {
    sibling(input, "_sampled.xyz")
}

/// `<dir>/<stem>_footprint_<alpha>.obj`
pub fn footprint_mesh_path(input: &Path, alpha: f64) -> PathBuf {
    sibling(input, &format!("_footprint_{}.obj", format_alpha(alpha)))
}

fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use tempfile::TempDir;

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
    fn test_save_obj_without_normals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.obj");
        save_obj(&tetrahedron(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 4);
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 0);
        assert!(text.lines().any(|l| l == "f 1 3 2"));
        assert!(text.contains("v 1.000000 0.000000 0.000000"));
    }

    #[test]
    fn test_save_obj_with_normals() {
        let mut mesh = tetrahedron();
        mesh.vertices[0].normal = Some(Vector3::new(0.0, 0.0, -1.0));
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tet.obj");
        save_obj(&mesh, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 4);
        assert!(text.lines().any(|l| l == "f 1//1 3//3 2//2"));
    }

    #[test]
    fn test_save_obj_unwritable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("tet.obj");
        let err = save_obj(&tetrahedron(), &path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn test_format_alpha() {
        assert_eq!(format_alpha(0.3), "0.3");
        assert_eq!(format_alpha(1.0), "1.0");
        assert_eq!(format_alpha(12.0), "12.0");
        assert_eq!(format_alpha(0.125), "0.125");
    }

    #[test]
    fn test_output_paths() {
        let input = Path::new("/data/scans/tree_01.txt");
        assert_eq!(
            envelope_mesh_path(input, 0.3),
            PathBuf::from("/data/scans/tree_01_alpha_shape_0.3.obj")
        );
        assert_eq!(
            sampled_cloud_path(input),
            PathBuf::from("/data/scans/tree_01_sampled.xyz")
        );
        assert_eq!(
            footprint_mesh_path(input, 2.0),
            PathBuf::from("/data/scans/tree_01_footprint_2.0.obj")
        );
    }
}
