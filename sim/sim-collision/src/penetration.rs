//! Sampled-direction penetration depth.
//!
//! When the cores of two shapes overlap GJK cannot measure how deep they
//! are. This solver projects the Minkowski difference onto a fixed set of
//! directions (a subdivided icosahedron) plus the shapes' preferred
//! directions, picks the direction of least overlap, pushes A out along it
//! until the shapes are clearly apart, and measures the gap with a second
//! GJK query. The penetration depth is the push minus that gap.

use nalgebra::{Isometry3, Point3, Vector3};
use smallvec::SmallVec;
use tracing::trace;

use crate::config::GjkConfig;
use crate::gjk::{ClosestPointInput, GjkPairDetector, PointCollector};
use crate::shape::ConvexShape;
use crate::stats::CollisionStats;

/// Extra separation added to the push so the second query sees a gap.
const EXTRA_SEPARATION: f64 = 0.5;

/// Directions shorter than this (squared) are skipped.
const MIN_DIRECTION_SQUARED: f64 = 0.01;

/// Unit directions sampled on every query.
#[rustfmt::skip]
const SAMPLE_DIRECTIONS: [[f64; 3]; 42] = [
    [0.000000, -0.000000, -1.000000],
    [0.723608, -0.525725, -0.447219],
    [-0.276388, -0.850649, -0.447219],
    [-0.894426, -0.000000, -0.447216],
    [-0.276388, 0.850649, -0.447220],
    [0.723608, 0.525725, -0.447219],
    [0.276388, -0.850649, 0.447220],
    [-0.723608, -0.525725, 0.447219],
    [-0.723608, 0.525725, 0.447219],
    [0.276388, 0.850649, 0.447219],
    [0.894426, 0.000000, 0.447216],
    [-0.000000, 0.000000, 1.000000],
    [0.425323, -0.309011, -0.850654],
    [-0.162456, -0.499995, -0.850654],
    [0.262869, -0.809012, -0.525738],
    [0.425323, 0.309011, -0.850654],
    [0.850648, -0.000000, -0.525736],
    [-0.525730, -0.000000, -0.850652],
    [-0.688190, -0.499997, -0.525736],
    [-0.162456, 0.499995, -0.850654],
    [-0.688190, 0.499997, -0.525736],
    [0.262869, 0.809012, -0.525738],
    [0.951058, 0.309013, 0.000000],
    [0.951058, -0.309013, 0.000000],
    [0.587786, -0.809017, 0.000000],
    [0.000000, -1.000000, 0.000000],
    [-0.587786, -0.809017, 0.000000],
    [-0.951058, -0.309013, -0.000000],
    [-0.951058, 0.309013, -0.000000],
    [-0.587786, 0.809017, -0.000000],
    [-0.000000, 1.000000, -0.000000],
    [0.587786, 0.809017, -0.000000],
    [0.688190, -0.499997, 0.525736],
    [-0.262869, -0.809012, 0.525738],
    [-0.850648, 0.000000, 0.525736],
    [-0.262869, 0.809012, 0.525738],
    [0.688190, 0.499997, 0.525736],
    [0.525730, 0.000000, 0.850652],
    [0.162456, -0.499995, 0.850654],
    [-0.425323, -0.309011, 0.850654],
    [-0.425323, 0.309011, 0.850654],
    [0.162456, 0.499995, 0.850654],
];

/// Result of a penetration query, in the frame of the input poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Direction of least penetration, pointing from B toward A.
    pub axis: Vector3<f64>,
    /// Deepest point of A inside B.
    pub point_on_a: Point3<f64>,
    /// Matching point on B's surface.
    pub point_on_b: Point3<f64>,
}

impl Penetration {
    /// Penetration depth along `axis`.
    #[must_use]
    pub fn depth(&self) -> f64 {
        (self.point_on_b - self.point_on_a).norm()
    }
}

/// Penetration of `shape_a` at `pose_a` into `shape_b` at `pose_b`.
///
/// Returns `None` when the cores are separated along some sampled
/// direction or the follow-up distance query finds nothing.
pub fn minkowski_penetration(
    shape_a: &ConvexShape,
    pose_a: &Isometry3<f64>,
    shape_b: &ConvexShape,
    pose_b: &Isometry3<f64>,
    config: &GjkConfig,
    stats: &mut CollisionStats,
) -> Option<Penetration> {
    let mut directions: SmallVec<[Vector3<f64>; 64]> = SAMPLE_DIRECTIONS
        .iter()
        .map(|d| Vector3::new(d[0], d[1], d[2]))
        .collect();
    directions.extend(
        shape_a
            .preferred_penetration_directions()
            .into_iter()
            .map(|d| pose_a.rotation * d),
    );
    directions.extend(
        shape_b
            .preferred_penetration_directions()
            .into_iter()
            .map(|d| pose_b.rotation * d),
    );

    let mut min_projection = f64::MAX;
    let mut min_normal = Vector3::zeros();
    for normal in directions.iter().filter(|n| n.norm_squared() > MIN_DIRECTION_SQUARED) {
        let p = shape_a.support_without_margin(pose_a, &-normal);
        let q = shape_b.support_without_margin(pose_b, normal);
        let delta = normal.dot(&(q - p));
        if delta < min_projection {
            min_projection = delta;
            min_normal = *normal;
        }
    }

    if min_projection < 0.0 {
        return None;
    }

    let push = min_projection + EXTRA_SEPARATION + shape_a.margin() + shape_b.margin();
    let mut displaced = *pose_a;
    displaced.translation.vector += min_normal * push;

    let mut detector = GjkPairDetector::new(shape_a, shape_b, config)
        .without_penetration_solver()
        .with_initial_axis(-min_normal);
    let mut result = PointCollector::new();
    detector.closest_points(&ClosestPointInput::new(displaced, *pose_b), &mut result, stats);

    if !result.has_result {
        trace!(push, "penetration solver found no separation");
        return None;
    }

    let corrected = push - result.distance;
    Some(Penetration {
        axis: min_normal,
        point_on_a: result.point_on_b - min_normal * corrected,
        point_on_b: result.point_on_b,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_directions_are_unit() {
        for d in &SAMPLE_DIRECTIONS {
            let n = Vector3::new(d[0], d[1], d[2]).norm();
            assert_relative_eq!(n, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_overlapping_boxes() {
        let a = ConvexShape::box_shape(Vector3::repeat(1.0)).unwrap();
        let b = ConvexShape::box_shape(Vector3::repeat(1.0)).unwrap();
        let mut stats = CollisionStats::new();
        let pen = minkowski_penetration(
            &a,
            &Isometry3::identity(),
            &b,
            &Isometry3::translation(0.0, 0.0, 1.8),
            &GjkConfig::default(),
            &mut stats,
        )
        .unwrap();

        assert_relative_eq!(pen.axis, -Vector3::z(), epsilon = 1e-9);
        assert_relative_eq!(pen.depth(), 0.2, epsilon = 1e-4);
        assert_relative_eq!(pen.point_on_b.z, 0.8, epsilon = 1e-4);
        assert_eq!(stats.gjk_checks, 1);
    }

    #[test]
    fn test_separated_cores_report_nothing() {
        let a = ConvexShape::sphere(1.0).unwrap();
        let b = ConvexShape::sphere(1.0).unwrap();
        let pen = minkowski_penetration(
            &a,
            &Isometry3::identity(),
            &b,
            &Isometry3::translation(1.5, 0.0, 0.0),
            &GjkConfig::default(),
            &mut CollisionStats::new(),
        );
        assert!(pen.is_none());
    }
}
