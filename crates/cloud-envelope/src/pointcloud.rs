//! Point cloud loading and down-sampling.
//!
//! Input clouds are plain text, one point per row:
//!
//! ```text
//! # x y z r g b
//! 12.031 4.220 1.875 128 128 117
//! 12.047 4.219 1.881 131 130 119
//! ```
//!
//! Columns are separated by whitespace or commas. Colors are 0-255 and are
//! normalized to [0, 1] on load. Columns after the sixth are ignored.
//!
//! # Example
//!
//! ```ignore
//! use cloud_envelope::PointCloud;
//!
//! let full = PointCloud::load("scan.txt")?;
//! let sampled = full.random_down_sample(0.1, Some(7))?;
//! assert!(sampled.len() <= full.len());
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::{Vertex, VertexColor};

/// Minimum number of numeric columns per row.
pub const REQUIRED_COLUMNS: usize = 6;

/// A point in the cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudPoint {
    /// 3D position.
    pub position: Point3<f64>,

    /// Point color, normalized.
    pub color: Option<VertexColor>,
}

impl CloudPoint {
    /// Create a point with only position.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            color: None,
        }
    }

    /// Create a point from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Convert to a mesh vertex, keeping the color.
    pub fn to_vertex(&self) -> Vertex {
        let mut v = Vertex::new(self.position);
        v.color = self.color;
        v
    }
}

/// An owned collection of points.
///
/// Cloning produces a fully independent copy; there is no shared storage
/// between a cloud and anything derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// The points in the cloud.
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    /// Create a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a list of positions.
    pub fn from_positions(positions: &[Point3<f64>]) -> Self {
        Self {
            points: positions.iter().map(|&p| CloudPoint::new(p)).collect(),
        }
    }

    /// Number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the cloud has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True if any point carries a color.
    pub fn has_colors(&self) -> bool {
        self.points.iter().any(|p| p.color.is_some())
    }

    /// Iterate over positions.
    pub fn positions(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.points.iter().map(|p| p.position)
    }

    /// Axis-aligned bounds, or `None` for an empty cloud.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?.position;
        let (min, max) = self
            .positions()
            .fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)));
        Some((min, max))
    }

    /// Mean position, or `None` for an empty cloud.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .positions()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.len() as f64))
    }

    /// Add a point.
    #[inline]
    pub fn push(&mut self, point: CloudPoint) {
        self.points.push(point);
    }

    /// Add a point from coordinates.
    #[inline]
    pub fn push_coords(&mut self, x: f64, y: f64, z: f64) {
        self.points.push(CloudPoint::from_coords(x, y, z));
    }

    /// Load a cloud from an `x y z r g b` text file.
    ///
    /// Any malformed row fails the whole file with the offending line
    /// number; a file without point rows is [`EnvelopeError::EmptyCloud`].
    pub fn load(path: impl AsRef<Path>) -> EnvelopeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EnvelopeError::io_read(path, e))?;
        let cloud = Self::parse(BufReader::new(file), path)?;

        if cloud.is_empty() {
            return Err(EnvelopeError::empty_cloud(path));
        }

        info!(
            points = cloud.len(),
            path = %path.display(),
            "Loaded point cloud"
        );
        Ok(cloud)
    }

    /// Parse rows from any reader. `path` is only used in error messages.
    pub fn parse(reader: impl BufRead, path: &Path) -> EnvelopeResult<Self> {
        let mut cloud = PointCloud::new();

        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| EnvelopeError::io_read(path, e))?;
            let line_num = line_idx + 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .collect();

            if columns.len() < REQUIRED_COLUMNS {
                return Err(EnvelopeError::parse_error(
                    path,
                    line_num,
                    format!(
                        "expected {} columns (x y z r g b), found {}",
                        REQUIRED_COLUMNS,
                        columns.len()
                    ),
                ));
            }

            let mut values = [0.0_f64; REQUIRED_COLUMNS];
            for (i, (slot, text)) in values.iter_mut().zip(&columns).enumerate() {
                *slot = text
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        EnvelopeError::parse_error(
                            path,
                            line_num,
                            format!("column {} is not a finite number: {:?}", i + 1, text),
                        )
                    })?;
            }

            let [x, y, z, r, g, b] = values;
            cloud.push(CloudPoint {
                position: Point3::new(x, y, z),
                color: Some(VertexColor::from_rgb8(r, g, b)),
            });
        }

        Ok(cloud)
    }

    /// Write the cloud as `x y z r g b` rows readable by [`PointCloud::load`].
    pub fn save_xyz(&self, path: impl AsRef<Path>) -> EnvelopeResult<()> {
        let path = path.as_ref();
        let io_err = |e| EnvelopeError::io_write(path, e);

        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        for point in &self.points {
            let [r, g, b] = point
                .color
                .map(|c| c.to_rgb8())
                .unwrap_or([255, 255, 255]);
            let p = &point.position;
            writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, r, g, b).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;

        debug!(points = self.len(), path = %path.display(), "Saved point cloud");
        Ok(())
    }

    /// Keep a random subset of `round(ratio * len)` points.
    ///
    /// At least one point is kept from a non-empty cloud. Points keep their
    /// original relative order. The result shares nothing with `self`.
    /// With a seed the choice is reproducible.
    pub fn random_down_sample(&self, ratio: f64, seed: Option<u64>) -> EnvelopeResult<Self> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(EnvelopeError::invalid_parameter(
                "sampling_ratio",
                ratio,
                "must be in (0, 1]",
            ));
        }

        let keep = sample_size(self.len(), ratio);
        if keep == self.len() {
            return Ok(self.clone());
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut indices = rand::seq::index::sample(&mut rng, self.len(), keep).into_vec();
        indices.sort_unstable();

        let points = indices.into_iter().map(|i| self.points[i].clone()).collect();

        debug!(
            original = self.len(),
            kept = keep,
            ratio = ratio,
            "Down-sampled point cloud"
        );
        Ok(Self { points })
    }

    /// Set every z coordinate to `value`.
    pub fn flatten_z(&mut self, value: f64) {
        for point in &mut self.points {
            point.position.z = value;
        }
    }
}

/// Number of points kept when sampling `len` points at `ratio`.
pub fn sample_size(len: usize, ratio: f64) -> usize {
    if len == 0 {
        return 0;
    }
    ((ratio * len as f64).round() as usize).clamp(1, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn parse(text: &str) -> EnvelopeResult<PointCloud> {
        PointCloud::parse(Cursor::new(text), Path::new("test.txt"))
    }

    fn line_cloud(n: usize) -> PointCloud {
        let mut cloud = PointCloud::new();
        for i in 0..n {
            cloud.push_coords(i as f64, 0.0, i as f64 * 0.5);
        }
        cloud
    }

    #[test]
    fn test_parse_rows() {
        let cloud = parse("0 0 0 255 0 0\n1.5 2 3 0 255 51\n").unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.points[1].position, Point3::new(1.5, 2.0, 3.0));
        let c = cloud.points[1].color.unwrap();
        assert_relative_eq!(c.g, 1.0);
        assert_relative_eq!(c.b, 0.2);
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let cloud = parse("# header\n\n1 2 3 0 0 0\n   \n").unwrap();
        assert_eq!(cloud.len(), 1);
    }

    #[test]
    fn test_parse_commas_and_extra_columns() {
        let cloud = parse("1,2,3,10,20,30,0.99\n").unwrap();
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.points[0].position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_parse_too_few_columns() {
        let err = parse("1 2 3 0 0 0\n1 2 3\n").unwrap_err();
        match err {
            EnvelopeError::ParseError { line, details, .. } => {
                assert_eq!(line, 2);
                assert!(details.contains("found 3"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_non_numeric() {
        let err = parse("1 2 x 0 0 0\n").unwrap_err();
        assert!(matches!(err, EnvelopeError::ParseError { line: 1, .. }));

        let err = parse("1 2 nan 0 0 0\n").unwrap_err();
        assert!(matches!(err, EnvelopeError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        let err = PointCloud::load(file.path()).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyCloud { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PointCloud::load("/nonexistent/cloud.txt").unwrap_err();
        assert!(matches!(err, EnvelopeError::IoRead { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let mut cloud = line_cloud(4);
        cloud.points[0].color = Some(VertexColor::from_rgb8(10.0, 20.0, 30.0));
        let file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        cloud.save_xyz(file.path()).unwrap();

        let loaded = PointCloud::load(file.path()).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.points[3].position, cloud.points[3].position);
        assert_eq!(loaded.points[0].color.unwrap().to_rgb8(), [10, 20, 30]);
    }

    #[test]
    fn test_sample_size_rounding() {
        assert_eq!(sample_size(0, 0.5), 0);
        assert_eq!(sample_size(10, 0.1), 1);
        assert_eq!(sample_size(10, 0.01), 1);
        assert_eq!(sample_size(15, 0.1), 2);
        assert_eq!(sample_size(25, 0.5), 13);
        assert_eq!(sample_size(7, 1.0), 7);
    }

    #[test]
    fn test_down_sample_count_and_order() {
        let cloud = line_cloud(1000);
        let sampled = cloud.random_down_sample(0.1, Some(42)).unwrap();
        assert_eq!(sampled.len(), 100);
        assert!(
            sampled
                .points
                .windows(2)
                .all(|w| w[0].position.x < w[1].position.x)
        );
    }

    #[test]
    fn test_down_sample_is_reproducible_with_seed() {
        let cloud = line_cloud(500);
        let a = cloud.random_down_sample(0.3, Some(9)).unwrap();
        let b = cloud.random_down_sample(0.3, Some(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_down_sample_does_not_alias() {
        let cloud = line_cloud(50);
        let mut sampled = cloud.random_down_sample(0.5, Some(1)).unwrap();
        sampled.flatten_z(0.0);
        assert!(sampled.positions().all(|p| p.z == 0.0));
        assert_relative_eq!(cloud.points[49].position.z, 24.5);
    }

    #[test]
    fn test_down_sample_rejects_bad_ratio() {
        let cloud = line_cloud(10);
        assert!(cloud.random_down_sample(0.0, None).is_err());
        assert!(cloud.random_down_sample(1.5, None).is_err());
        assert!(cloud.random_down_sample(f64::NAN, None).is_err());
    }

    #[test]
    fn test_bounds_and_centroid() {
        let cloud = line_cloud(3);
        let (min, max) = cloud.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(2.0, 0.0, 1.0));
        assert_eq!(cloud.centroid().unwrap(), Point3::new(1.0, 0.0, 0.5));
        assert!(PointCloud::new().bounds().is_none());
    }
}
