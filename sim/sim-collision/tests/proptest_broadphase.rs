//! Property tests: every broadphase against the brute-force oracle, and GJK
//! against the analytic sphere distance.
//!
//! Boxes live on a 0.5 grid inside the small-scene world, which is coarse
//! enough that quantization never merges two distinct coordinates. On that
//! grid the sweep-and-prune must agree with the oracle exactly, and the
//! tree may only report more.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::BTreeSet;

use nalgebra::{Isometry3, Point3, Vector3};
use proptest::prelude::*;
use sim_collision::{
    Aabb, AxisSweep, AxisSweepConfig, BroadPhase, CollisionFilter, ConvexShape, DbvtBroadphase,
    DbvtBroadphaseConfig, ObjectId, PairCache, ProxyHandle, SimpleBroadphase,
    SimpleBroadphaseConfig, SortedPairCache, closest_points,
};

// ============================================================================
// Strategies
// ============================================================================

fn arb_box() -> impl Strategy<Value = Aabb> {
    (
        prop::array::uniform3(-190i32..180),
        prop::array::uniform3(1i32..20),
    )
        .prop_map(|(min, extent)| {
            let min = Vector3::new(min[0], min[1], min[2]).map(|v| f64::from(v) * 0.5);
            let extent = Vector3::new(extent[0], extent[1], extent[2]).map(|v| f64::from(v) * 0.5);
            Aabb::new(Point3::from(min), Point3::from(min + extent))
        })
}

#[derive(Debug, Clone)]
enum Op {
    Move(usize, Aabb),
    Destroy(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), arb_box()).prop_map(|(i, aabb)| Op::Move(i, aabb)),
        1 => any::<usize>().prop_map(Op::Destroy),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

type OwnerPairs = BTreeSet<(u64, u64)>;

/// Pairs of the cache expressed as owner ids, so broadphases with different
/// handle allocation can be compared.
fn owner_pairs<B: BroadPhase>(bp: &B) -> OwnerPairs {
    bp.pair_cache()
        .pairs()
        .iter()
        .map(|pair| {
            let a = bp.owner(pair.proxy0).unwrap().raw();
            let b = bp.owner(pair.proxy1).unwrap().raw();
            (a.min(b), a.max(b))
        })
        .collect()
}

/// Run the same script against a broadphase and return its pairs after
/// the initial build and after every operation.
fn replay<B: BroadPhase>(bp: &mut B, boxes: &[Aabb], ops: &[Op]) -> Vec<OwnerPairs> {
    let mut handles: Vec<Option<ProxyHandle>> = boxes
        .iter()
        .enumerate()
        .map(|(i, aabb)| {
            Some(
                bp.create_proxy(*aabb, ObjectId::new(i as u64), CollisionFilter::default())
                    .unwrap(),
            )
        })
        .collect();

    let n = handles.len();

    bp.calculate_overlapping_pairs();
    let mut snapshots = vec![owner_pairs(bp)];

    for op in ops {
        match *op {
            Op::Move(i, aabb) => {
                if let Some(h) = handles[i % n] {
                    bp.set_aabb(h, aabb).unwrap();
                }
            }
            Op::Destroy(i) => {
                if let Some(h) = handles[i % n].take() {
                    bp.destroy_proxy(h).unwrap();
                }
            }
        }
        bp.calculate_overlapping_pairs();
        snapshots.push(owner_pairs(bp));
    }
    snapshots
}

fn oracle() -> SimpleBroadphase {
    SimpleBroadphase::new(SimpleBroadphaseConfig::default()).unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn axis_sweep_matches_oracle(
        boxes in prop::collection::vec(arb_box(), 1..40),
        ops in prop::collection::vec(arb_op(), 0..30),
    ) {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let mut simple = oracle();

        let got = replay(&mut sweep, &boxes, &ops);
        let want = replay(&mut simple, &boxes, &ops);

        for (step, (g, w)) in got.iter().zip(&want).enumerate() {
            prop_assert_eq!(g, w, "pair sets diverge after step {}", step);
        }
    }

    #[test]
    fn axis_sweep_with_deferred_removal_matches_oracle(
        boxes in prop::collection::vec(arb_box(), 1..40),
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut sweep =
            AxisSweep::with_cache(AxisSweepConfig::small_scene(), SortedPairCache::new()).unwrap();
        let mut simple = oracle();

        let got = replay(&mut sweep, &boxes, &ops);
        let want = replay(&mut simple, &boxes, &ops);

        for (step, (g, w)) in got.iter().zip(&want).enumerate() {
            prop_assert_eq!(g, w, "pair sets diverge after step {}", step);
        }
        // Sweeping leaves no duplicates behind.
        prop_assert_eq!(sweep.pair_cache().len(), want.last().map_or(0, BTreeSet::len));
    }

    #[test]
    fn dbvt_reports_every_oracle_pair(
        boxes in prop::collection::vec(arb_box(), 1..40),
        ops in prop::collection::vec(arb_op(), 0..30),
    ) {
        let mut dbvt = DbvtBroadphase::new(DbvtBroadphaseConfig::default()).unwrap();
        let mut simple = oracle();

        let got = replay(&mut dbvt, &boxes, &ops);
        let want = replay(&mut simple, &boxes, &ops);

        for (step, (g, w)) in got.iter().zip(&want).enumerate() {
            prop_assert!(g.is_superset(w), "missing pairs after step {}", step);
        }
    }

    #[test]
    fn dbvt_deferred_pairs_have_touching_leaves(
        boxes in prop::collection::vec(arb_box(), 2..30),
        ops in prop::collection::vec(arb_op(), 0..20),
    ) {
        let config = DbvtBroadphaseConfig {
            cleanup_percent: 100,
            ..DbvtBroadphaseConfig::default()
        };
        let mut dbvt = DbvtBroadphase::with_cache(config, SortedPairCache::new()).unwrap();
        replay(&mut dbvt, &boxes, &ops);

        for pair in dbvt.pair_cache().pairs() {
            let a = dbvt.leaf_volume(pair.proxy0).unwrap();
            let b = dbvt.leaf_volume(pair.proxy1).unwrap();
            prop_assert!(a.overlaps(&b));
        }
    }

    #[test]
    fn dbvt_query_finds_moved_proxy(
        boxes in prop::collection::vec(arb_box(), 1..30),
        moves in prop::collection::vec((any::<usize>(), arb_box()), 1..30),
    ) {
        let mut dbvt = DbvtBroadphase::new(DbvtBroadphaseConfig::default()).unwrap();
        let handles: Vec<ProxyHandle> = boxes
            .iter()
            .enumerate()
            .map(|(i, aabb)| {
                dbvt.create_proxy(*aabb, ObjectId::new(i as u64), CollisionFilter::default())
                    .unwrap()
            })
            .collect();

        for (i, aabb) in moves {
            let h = handles[i % handles.len()];
            dbvt.set_aabb(h, aabb).unwrap();
            dbvt.calculate_overlapping_pairs();

            let mut found = false;
            dbvt.aabb_test(&aabb, &mut |hit| found |= hit == h);
            prop_assert!(found);
        }
    }

    #[test]
    fn quantized_bounds_contain_input(aabb in arb_box()) {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let h = sweep
            .create_proxy(aabb, ObjectId::new(0), CollisionFilter::default())
            .unwrap();
        let q = sweep.unquantized_aabb(h).unwrap();

        for i in 0..3 {
            prop_assert!(q.min[i] <= aabb.min[i] + 1e-9);
            prop_assert!(q.max[i] >= aabb.max[i] - 1e-9);
        }
    }

    #[test]
    fn filtered_groups_never_pair(
        boxes in prop::collection::vec(arb_box(), 2..30),
    ) {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let debris = CollisionFilter::new(
            CollisionFilter::DEBRIS,
            CollisionFilter::ALL ^ CollisionFilter::DEBRIS,
        );
        for (i, aabb) in boxes.iter().enumerate() {
            sweep.create_proxy(*aabb, ObjectId::new(i as u64), debris).unwrap();
        }
        sweep.calculate_overlapping_pairs();
        prop_assert!(sweep.pair_cache().is_empty());
    }
}

// ============================================================================
// Narrow phase
// ============================================================================

fn arb_unit() -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-1.0..1.0f64)
        .prop_filter("direction must not vanish", |v| {
            Vector3::new(v[0], v[1], v[2]).norm() > 0.1
        })
        .prop_map(|v| Vector3::new(v[0], v[1], v[2]).normalize())
}

proptest! {
    #[test]
    fn gjk_sphere_distance_is_exact(
        r1 in 0.1..5.0f64,
        r2 in 0.1..5.0f64,
        gap in 0.05..10.0f64,
        dir in arb_unit(),
    ) {
        let a = ConvexShape::sphere(r1).unwrap();
        let b = ConvexShape::sphere(r2).unwrap();
        let d = r1 + r2 + gap;
        let hit = closest_points(
            &a,
            &Isometry3::identity(),
            &b,
            &Isometry3::translation(dir.x * d, dir.y * d, dir.z * d),
            100.0,
        )
        .unwrap();

        prop_assert!((hit.distance - gap).abs() < 1e-4);
        prop_assert!((hit.normal_on_b + dir).norm() < 1e-4);
    }

    #[test]
    fn gjk_sphere_penetration_is_negative(
        r1 in 0.5..5.0f64,
        r2 in 0.5..5.0f64,
        fraction in 0.1..0.95f64,
        dir in arb_unit(),
    ) {
        let a = ConvexShape::sphere(r1).unwrap();
        let b = ConvexShape::sphere(r2).unwrap();
        let d = (r1 + r2) * fraction;
        let hit = closest_points(
            &a,
            &Isometry3::identity(),
            &b,
            &Isometry3::translation(dir.x * d, dir.y * d, dir.z * d),
            0.0,
        )
        .unwrap();

        prop_assert!(hit.distance < 0.0);
        prop_assert!((hit.distance + (r1 + r2 - d)).abs() < 1e-4);
    }
}
