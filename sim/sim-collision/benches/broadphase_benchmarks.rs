//! Benchmarks for the three broadphases.
//!
//! Run with: cargo bench -p sim-collision --bench broadphase_benchmarks

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_collision::{
    Aabb, BroadPhase, BroadPhaseAlgorithm, BroadPhaseConfig, BroadPhaseDetector, CollisionFilter,
    ObjectId, PairCache, ProxyHandle,
};

const ALGORITHMS: [(BroadPhaseAlgorithm, &str); 3] = [
    (BroadPhaseAlgorithm::AxisSweep, "axis_sweep"),
    (BroadPhaseAlgorithm::Dbvt, "dbvt"),
    (BroadPhaseAlgorithm::Simple, "simple"),
];

/// Random boxes of size 0.5..2 scattered so that a few percent overlap.
fn random_boxes(count: usize, rng: &mut StdRng) -> Vec<Aabb> {
    let spread = (count as f64).cbrt() * 4.0;
    (0..count)
        .map(|_| {
            let center = Point3::new(
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
            );
            let half = Vector3::new(
                rng.gen_range(0.25..1.0),
                rng.gen_range(0.25..1.0),
                rng.gen_range(0.25..1.0),
            );
            Aabb::from_center(center, half)
        })
        .collect()
}

fn populate(algorithm: BroadPhaseAlgorithm, boxes: &[Aabb]) -> (BroadPhaseDetector, Vec<ProxyHandle>) {
    let mut bp = BroadPhaseDetector::new(&BroadPhaseConfig::with_algorithm(algorithm)).unwrap();
    let handles = boxes
        .iter()
        .enumerate()
        .map(|(i, aabb)| {
            bp.create_proxy(*aabb, ObjectId::new(i as u64), CollisionFilter::default())
                .unwrap()
        })
        .collect();
    bp.calculate_overlapping_pairs();
    (bp, handles)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_build");
    let mut rng = StdRng::seed_from_u64(7);

    for count in [100, 1000, 4000] {
        let boxes = random_boxes(count, &mut rng);
        group.throughput(Throughput::Elements(count as u64));

        for (algorithm, name) in ALGORITHMS {
            if algorithm == BroadPhaseAlgorithm::Simple && count > 1000 {
                continue;
            }
            group.bench_with_input(BenchmarkId::new(name, count), &boxes, |b, boxes| {
                b.iter(|| {
                    let (bp, _) = populate(algorithm, boxes);
                    black_box(bp.pair_cache().len())
                });
            });
        }
    }

    group.finish();
}

fn bench_incremental_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_update");
    let mut rng = StdRng::seed_from_u64(11);

    for count in [1000, 4000] {
        let boxes = random_boxes(count, &mut rng);
        let jitter: Vec<Vector3<f64>> = (0..count)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-0.05..0.05),
                    rng.gen_range(-0.05..0.05),
                    rng.gen_range(-0.05..0.05),
                )
            })
            .collect();
        group.throughput(Throughput::Elements(count as u64));

        for (algorithm, name) in ALGORITHMS {
            if algorithm == BroadPhaseAlgorithm::Simple {
                continue;
            }
            let (mut bp, handles) = populate(algorithm, &boxes);
            let mut flip = false;

            group.bench_function(BenchmarkId::new(name, count), |b| {
                b.iter(|| {
                    // Alternate between two poses so the scene never drifts.
                    flip = !flip;
                    let step = if flip { 1.0 } else { 0.0 };
                    for ((h, aabb), dv) in handles.iter().zip(&boxes).zip(&jitter) {
                        let offset = dv * step;
                        let moved = Aabb::new(aabb.min + offset, aabb.max + offset);
                        bp.set_aabb(*h, moved).unwrap();
                    }
                    bp.calculate_overlapping_pairs();
                    black_box(bp.pair_cache().len())
                });
            });
        }
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_queries");
    let mut rng = StdRng::seed_from_u64(13);
    let boxes = random_boxes(2000, &mut rng);

    for (algorithm, name) in ALGORITHMS {
        let (bp, _) = populate(algorithm, &boxes);
        let probe = Aabb::from_center(Point3::origin(), Vector3::repeat(3.0));

        group.bench_function(BenchmarkId::new("aabb_test", name), |b| {
            b.iter(|| {
                let mut hits = 0_usize;
                bp.aabb_test(black_box(&probe), &mut |_| hits += 1);
                hits
            });
        });

        group.bench_function(BenchmarkId::new("ray_test", name), |b| {
            b.iter(|| {
                let mut hits = 0_usize;
                bp.ray_test(
                    black_box(Point3::new(-50.0, 0.1, 0.2)),
                    Point3::new(50.0, -0.1, 0.3),
                    &mut |_| hits += 1,
                );
                hits
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_incremental_update, bench_queries);
criterion_main!(benches);
