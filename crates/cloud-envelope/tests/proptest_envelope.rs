//! Property-based tests for the envelope stages.
//!
//! Run with: cargo test -p cloud-envelope --test proptest_envelope

use cloud_envelope::pointcloud::sample_size;
use cloud_envelope::{
    ContainmentParams, MeshAdjacency, PointCloud, RepairParams, build_alpha_shape,
    check_envelope_accuracy, project_footprint, repair_envelope,
};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// A point in the unit box.
fn arb_position() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(0.0..1.0f64)
}

fn arb_cloud(min: usize, max: usize) -> impl Strategy<Value = PointCloud> {
    prop::collection::vec(arb_position(), min..=max).prop_map(|positions| {
        let mut cloud = PointCloud::new();
        for [x, y, z] in positions {
            cloud.push_coords(x, y, z);
        }
        cloud
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn down_sample_keeps_rounded_count(
        cloud in arb_cloud(1, 200),
        ratio in 0.01..=1.0f64,
        seed in any::<u64>(),
    ) {
        let before: Vec<_> = cloud.positions().collect();
        let sampled = cloud.random_down_sample(ratio, Some(seed)).unwrap();

        prop_assert_eq!(sampled.len(), sample_size(cloud.len(), ratio));
        let expected = ((ratio * cloud.len() as f64).round() as usize).max(1);
        prop_assert_eq!(sampled.len(), expected);

        // Every sampled point comes from the cloud, and the cloud is untouched.
        for p in sampled.positions() {
            prop_assert!(before.contains(&p));
        }
        prop_assert_eq!(cloud.positions().collect::<Vec<_>>(), before);
    }

    #[test]
    fn alpha_shape_faces_are_valid(cloud in arb_cloud(4, 60), alpha in 0.05..2.0f64) {
        let mesh = build_alpha_shape(&cloud, alpha).unwrap();
        let n = mesh.vertex_count() as u32;
        for &[a, b, c] in &mesh.faces {
            prop_assert!(a < n && b < n && c < n);
            prop_assert!(a != b && b != c && a != c);
        }
        prop_assert!(mesh.vertex_count() <= cloud.len());
    }

    #[test]
    fn large_alpha_hull_is_closed(cloud in arb_cloud(8, 60)) {
        let mesh = build_alpha_shape(&cloud, 1e9).unwrap();
        prop_assume!(!mesh.is_empty());

        let adjacency = MeshAdjacency::build(&mesh.faces);
        prop_assert!(adjacency.is_watertight());
        prop_assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn repaired_metrics_are_non_negative(cloud in arb_cloud(8, 60), alpha in 0.1..1.0f64) {
        let mesh = build_alpha_shape(&cloud, alpha).unwrap();
        let result = repair_envelope(mesh, &RepairParams::default());
        prop_assert!(result.volume() >= 0.0);
        prop_assert!(result.area() >= 0.0);
        if !result.is_watertight() {
            prop_assert_eq!(result.volume(), 0.0);
            prop_assert_eq!(result.area(), 0.0);
        }
    }

    #[test]
    fn accuracy_ratio_is_a_percentage(
        cloud in arb_cloud(8, 40),
        probes in arb_cloud(1, 40),
        alpha in 0.1..2.0f64,
    ) {
        let mesh = build_alpha_shape(&cloud, alpha).unwrap();
        let report = check_envelope_accuracy(&probes, &mesh, &ContainmentParams::default());
        prop_assert!((0.0..=100.0).contains(&report.ratio));
        prop_assert!(report.enclosed <= report.total);
        prop_assert!(report.closed_shells <= report.envelope_count);
    }

    #[test]
    fn footprint_is_deterministic_and_bounded(cloud in arb_cloud(3, 80), alpha in 0.05..2.0f64) {
        let a = project_footprint(cloud.clone(), alpha).unwrap();
        let b = project_footprint(cloud, alpha).unwrap();
        prop_assert_eq!(a.area, b.area);
        prop_assert!(a.area >= 0.0);
        // Everything lies inside the unit square.
        prop_assert!(a.area <= 1.0 + 1e-9);
        for tri in a.mesh.triangles() {
            prop_assert!(tri.normal_unnormalized().z > 0.0);
        }
    }
}
