//! Benchmarks for GJK, the penetration fallback and the dispatcher.
//!
//! Run with: cargo bench -p sim-collision --bench narrowphase_benchmarks

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hashbrown::HashMap;
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_collision::{
    BroadPhase, ClosestPointInput, CollisionDispatcher, CollisionFilter, CollisionObject,
    CollisionStats, ConvexShape, DbvtBroadphase, DbvtBroadphaseConfig, DispatcherConfig,
    GjkConfig, GjkPairDetector, ObjectId, PointCollector,
};

fn shapes() -> Vec<(&'static str, ConvexShape)> {
    let hull = (0..32)
        .map(|i| {
            let t = f64::from(i) * 0.7;
            Point3::new(t.cos(), t.sin(), (t * 0.3).sin())
        })
        .collect();
    vec![
        ("sphere", ConvexShape::sphere(0.5).unwrap()),
        ("box", ConvexShape::box_shape(Vector3::new(0.5, 0.4, 0.3)).unwrap()),
        ("capsule", ConvexShape::capsule(0.4, 0.2).unwrap()),
        ("cone", ConvexShape::cone(0.4, 1.0).unwrap()),
        ("cylinder", ConvexShape::cylinder(0.5, 0.3).unwrap()),
        ("hull32", ConvexShape::convex_hull(hull).unwrap()),
    ]
}

fn run_query(
    a: &ConvexShape,
    b: &ConvexShape,
    config: &GjkConfig,
    pose_b: Isometry3<f64>,
    stats: &mut CollisionStats,
) -> f64 {
    let mut detector = GjkPairDetector::new(a, b, config);
    let mut collector = PointCollector::new();
    let input = ClosestPointInput::new(Isometry3::identity(), pose_b);
    detector.closest_points(&input, &mut collector, stats);
    collector.distance
}

fn bench_gjk_separated(c: &mut Criterion) {
    let mut group = c.benchmark_group("gjk_separated");
    let config = GjkConfig::default();
    let shapes = shapes();
    let rotation = UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1);
    let pose_b = Isometry3::from_parts(Vector3::new(2.5, 0.3, 0.1).into(), rotation);

    for (name, shape) in &shapes {
        group.bench_with_input(BenchmarkId::new("vs_box", name), shape, |b, shape| {
            let mut stats = CollisionStats::new();
            b.iter(|| black_box(run_query(shape, &shapes[1].1, &config, pose_b, &mut stats)));
        });
    }

    group.finish();
}

fn bench_gjk_penetrating(c: &mut Criterion) {
    let mut group = c.benchmark_group("gjk_penetrating");
    let config = GjkConfig::default();
    let shapes = shapes();

    for depth in [0.05, 0.3, 0.6] {
        let pose_b = Isometry3::translation(1.0 - depth, 0.0, 0.0);
        for (name, shape) in &shapes {
            group.bench_with_input(
                BenchmarkId::new(*name, format!("{depth}_deep")),
                shape,
                |b, shape| {
                    let mut stats = CollisionStats::new();
                    b.iter(|| {
                        black_box(run_query(shape, &shapes[1].1, &config, pose_b, &mut stats))
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_all_pairs");
    group.sample_size(50);
    let mut rng = StdRng::seed_from_u64(3);
    let shapes = shapes();

    for count in [100, 500] {
        let mut broadphase = DbvtBroadphase::new(DbvtBroadphaseConfig::default()).unwrap();
        let mut objects = HashMap::new();
        let spread = (count as f64).cbrt() * 1.2;

        for i in 0..count {
            let shape = shapes[i % shapes.len()].1.clone();
            let transform = Isometry3::translation(
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
            );
            let object = CollisionObject::new(ObjectId::new(i as u64), shape, transform);
            let proxy = broadphase
                .create_proxy(
                    object.shape.aabb(&object.transform),
                    object.id,
                    CollisionFilter::default(),
                )
                .unwrap();
            objects.insert(proxy, object);
        }
        broadphase.calculate_overlapping_pairs();

        let mut dispatcher = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let pairs = broadphase.pair_cache().len();
        group.throughput(Throughput::Elements(pairs as u64));

        group.bench_function(BenchmarkId::new("mixed_shapes", format!("{count}_objects")), |b| {
            let mut stats = CollisionStats::new();
            b.iter(|| {
                dispatcher.dispatch_all_pairs(broadphase.pair_cache_mut(), &objects, &mut stats);
                black_box(stats.contact_points)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gjk_separated, bench_gjk_penetrating, bench_dispatch);
criterion_main!(benches);
