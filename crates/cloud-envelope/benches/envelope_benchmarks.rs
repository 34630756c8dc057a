//! Benchmarks for the envelope stages.
//!
//! Run with: cargo bench -p cloud-envelope
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p cloud-envelope -- --save-baseline main
//! 2. After changes: cargo bench -p cloud-envelope -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use cloud_envelope::{
    ContainmentParams, PointCloud, RepairParams, build_alpha_shape, check_envelope_accuracy,
    project_footprint, repair_envelope,
};

// =============================================================================
// Test Cloud Generation
// =============================================================================

/// Points on a sphere of radius 1, on a Fibonacci spiral, plus a jittered
/// interior.
fn sphere_cloud(surface: usize) -> PointCloud {
    let mut cloud = PointCloud::new();
    let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    for i in 0..surface {
        let y = 1.0 - 2.0 * (i as f64 + 0.5) / surface as f64;
        let r = (1.0 - y * y).sqrt();
        let theta = golden * i as f64;
        cloud.push_coords(r * theta.cos(), y, r * theta.sin());
    }
    for i in 0..surface / 4 {
        let t = i as f64 * 0.618_033_988_7;
        let s = 0.6 * t.fract();
        cloud.push_coords(s * (7.0 * t).cos(), s * (3.0 * t).sin(), s * (5.0 * t).cos());
    }
    cloud
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_alpha_shape(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_shape");
    for &n in &[500usize, 2_000, 8_000] {
        let cloud = sphere_cloud(n);
        group.throughput(Throughput::Elements(cloud.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &cloud, |b, cloud| {
            b.iter(|| build_alpha_shape(black_box(cloud), 0.3));
        });
    }
    group.finish();
}

fn bench_repair(c: &mut Criterion) {
    let cloud = sphere_cloud(2_000);
    let Ok(mesh) = build_alpha_shape(&cloud, 0.3) else {
        return;
    };
    c.bench_function("repair_envelope/2000", |b| {
        b.iter(|| repair_envelope(black_box(mesh.clone()), &RepairParams::default()));
    });
}

fn bench_accuracy(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_accuracy");
    let envelope_cloud = sphere_cloud(2_000);
    let Ok(mesh) = build_alpha_shape(&envelope_cloud, 0.3) else {
        return;
    };
    for &n in &[1_000usize, 10_000] {
        let probes = sphere_cloud(n);
        group.throughput(Throughput::Elements(probes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &probes, |b, probes| {
            b.iter(|| {
                check_envelope_accuracy(black_box(probes), &mesh, &ContainmentParams::default())
            });
        });
    }
    group.finish();
}

fn bench_footprint(c: &mut Criterion) {
    let cloud = sphere_cloud(8_000);
    c.bench_function("project_footprint/8000", |b| {
        b.iter(|| project_footprint(black_box(cloud.clone()), 0.3));
    });
}

criterion_group!(
    benches,
    bench_alpha_shape,
    bench_repair,
    bench_accuracy,
    bench_footprint
);
criterion_main!(benches);
