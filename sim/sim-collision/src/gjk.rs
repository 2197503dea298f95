//! GJK (Gilbert-Johnson-Keerthi) distance queries between convex shapes.
//!
//! # Algorithm Overview
//!
//! Both shapes are split into a margin-less core and a rounding margin. GJK
//! runs on the cores: it repeatedly samples the support point of the
//! Minkowski difference `A - B` against the current separating axis, feeds
//! it to a [`VoronoiSimplex`], and replaces the axis with the simplex point
//! closest to the origin. The loop stops when no sample gets meaningfully
//! closer, and the margins are then subtracted from the core distance.
//!
//! When the cores touch, or the loop ends in a degenerate state while the
//! rounded shapes are in contact, the query is handed to the sampled-direction
//! penetration solver in [`crate::penetration`], and the deeper of the two
//! answers wins.
//!
//! At most one contact point is reported per query, through a
//! [`ContactSink`]. The normal points from B toward A, the point lies on B's
//! surface, and the distance is negative when the shapes overlap.
//!
//! # Usage
//!
//! ```
//! use nalgebra::Isometry3;
//! use sim_collision::{
//!     ClosestPointInput, CollisionStats, ConvexShape, GjkConfig, GjkPairDetector,
//!     PointCollector,
//! };
//!
//! let a = ConvexShape::sphere(1.0).unwrap();
//! let b = ConvexShape::sphere(1.0).unwrap();
//! let config = GjkConfig::default();
//! let mut detector = GjkPairDetector::new(&a, &b, &config);
//!
//! let input = ClosestPointInput::new(Isometry3::identity(), Isometry3::translation(3.0, 0.0, 0.0));
//! let mut result = PointCollector::new();
//! let mut stats = CollisionStats::new();
//! detector.closest_points(&input, &mut result, &mut stats);
//!
//! assert!(result.has_result);
//! assert!((result.distance - 1.0).abs() < 1e-6);
//! ```
//!
//! # References
//!
//! - Gilbert, Johnson, Keerthi: "A Fast Procedure for Computing the Distance
//!   Between Complex Objects in Three-Dimensional Space" (1988)
//! - van den Bergen: "Collision Detection in Interactive 3D Environments" (2003)

use nalgebra::{Isometry3, Point3, Vector3};
use tracing::trace;

use crate::config::GjkConfig;
use crate::penetration::minkowski_penetration;
use crate::shape::ConvexShape;
use crate::simplex::VoronoiSimplex;
use crate::stats::CollisionStats;

/// Squared distance assumed before the first sample.
const LARGE_DISTANCE_SQUARED: f64 = 1e18;

/// Squared axis length below which the reported normal is unreliable.
const SHORT_AXIS_SQUARED: f64 = 1e-4;

/// Receiver of contact points produced by a distance query.
pub trait ContactSink {
    /// Record a contact.
    ///
    /// `normal_on_b` points from B toward A, `point_on_b` lies on B, and
    /// `distance` is negative for penetration.
    fn add_contact_point(&mut self, normal_on_b: &Vector3<f64>, point_on_b: &Point3<f64>, distance: f64);
}

/// Sink that keeps the deepest reported point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCollector {
    /// Normal of the kept point, from B toward A.
    pub normal_on_b: Vector3<f64>,
    /// Kept point on B.
    pub point_on_b: Point3<f64>,
    /// Signed distance of the kept point.
    pub distance: f64,
    /// Whether any point was reported.
    pub has_result: bool,
}

impl Default for PointCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl PointCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            normal_on_b: Vector3::zeros(),
            point_on_b: Point3::origin(),
            distance: LARGE_DISTANCE_SQUARED,
            has_result: false,
        }
    }

    /// Kept point on A, reconstructed from the point on B.
    #[must_use]
    pub fn point_on_a(&self) -> Point3<f64> {
        self.point_on_b + self.normal_on_b * self.distance
    }
}

impl ContactSink for PointCollector {
    fn add_contact_point(&mut self, normal_on_b: &Vector3<f64>, point_on_b: &Point3<f64>, distance: f64) {
        if distance < self.distance {
            self.normal_on_b = *normal_on_b;
            self.point_on_b = *point_on_b;
            self.distance = distance;
            self.has_result = true;
        }
    }
}

/// Poses and distance of interest for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPointInput {
    /// World pose of shape A.
    pub transform_a: Isometry3<f64>,
    /// World pose of shape B.
    pub transform_b: Isometry3<f64>,
    /// Squared distance beyond which no contact is reported.
    pub maximum_distance_squared: f64,
}

impl ClosestPointInput {
    /// Query with an unlimited distance of interest.
    #[must_use]
    pub fn new(transform_a: Isometry3<f64>, transform_b: Isometry3<f64>) -> Self {
        Self {
            transform_a,
            transform_b,
            maximum_distance_squared: f64::MAX,
        }
    }

    /// Limit the distance of interest.
    #[must_use]
    pub fn with_maximum_distance(mut self, distance: f64) -> Self {
        self.maximum_distance_squared = distance * distance;
        self
    }
}

/// Why the GJK loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GjkTermination {
    /// The cores are farther apart than the distance of interest.
    Separated,
    /// The new support point was already in the simplex.
    AlreadyInSimplex,
    /// The new support point did not bring the axis meaningfully closer.
    Converged,
    /// The simplex solver could not find a closest point.
    ClosestPointFailed,
    /// The separating axis shrank to nearly zero: the cores overlap.
    VanishingAxis,
    /// The squared distance stopped decreasing.
    NoProgress,
    /// The simplex became a tetrahedron.
    FullSimplex,
    /// The iteration guard was hit.
    IterationLimit,
}

impl GjkTermination {
    /// Whether the loop ended in a state that may hide a contact.
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        !matches!(self, Self::IterationLimit)
    }

    /// Whether the simplex holds usable witness points.
    const fn has_witnesses(self) -> bool {
        !matches!(self, Self::IterationLimit | Self::FullSimplex)
    }
}

/// Distance query between two convex shapes.
///
/// The detector borrows both shapes for its lifetime and remembers the last
/// separating axis and distance for callers that want to cache them.
#[derive(Debug, Clone)]
pub struct GjkPairDetector<'a> {
    shape_a: &'a ConvexShape,
    shape_b: &'a ConvexShape,
    config: &'a GjkConfig,
    simplex: VoronoiSimplex,
    initial_axis: Vector3<f64>,
    use_penetration_solver: bool,
    cached_separating_axis: Vector3<f64>,
    cached_separating_distance: f64,
    iterations: usize,
    last_termination: Option<GjkTermination>,
    used_penetration_solver: bool,
    witness_on_a: Point3<f64>,
}

impl<'a> GjkPairDetector<'a> {
    /// Create a detector for `shape_a` against `shape_b`.
    #[must_use]
    pub fn new(shape_a: &'a ConvexShape, shape_b: &'a ConvexShape, config: &'a GjkConfig) -> Self {
        Self {
            shape_a,
            shape_b,
            config,
            simplex: VoronoiSimplex::new(),
            initial_axis: Vector3::y(),
            use_penetration_solver: true,
            cached_separating_axis: Vector3::y(),
            cached_separating_distance: 0.0,
            iterations: 0,
            last_termination: None,
            used_penetration_solver: false,
            witness_on_a: Point3::origin(),
        }
    }

    /// Start every query from `axis` instead of `+Y`.
    #[must_use]
    pub fn with_initial_axis(mut self, axis: Vector3<f64>) -> Self {
        if axis.norm_squared() > 0.0 {
            self.initial_axis = axis;
        }
        self
    }

    /// Disable the penetration fallback; overlapping cores report nothing.
    #[must_use]
    pub fn without_penetration_solver(mut self) -> Self {
        self.use_penetration_solver = false;
        self
    }

    /// Separating axis at the end of the last query.
    #[must_use]
    pub fn cached_separating_axis(&self) -> Vector3<f64> {
        self.cached_separating_axis
    }

    /// Distance reported by the last query, or zero if none was reported.
    #[must_use]
    pub fn cached_separating_distance(&self) -> f64 {
        self.cached_separating_distance
    }

    /// Iterations run by the last query.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Why the last GJK loop stopped.
    #[must_use]
    pub fn last_termination(&self) -> Option<GjkTermination> {
        self.last_termination
    }

    /// Whether the last query's answer came from the penetration solver.
    #[must_use]
    pub fn used_penetration_solver(&self) -> bool {
        self.used_penetration_solver
    }

    /// Point on A of the last reported contact.
    #[must_use]
    pub fn witness_on_a(&self) -> Point3<f64> {
        self.witness_on_a
    }

    /// Compute the closest points of the two shapes and report at most one
    /// contact to `sink`.
    pub fn closest_points<S: ContactSink + ?Sized>(
        &mut self,
        input: &ClosestPointInput,
        sink: &mut S,
        stats: &mut CollisionStats,
    ) {
        self.cached_separating_distance = 0.0;
        self.used_penetration_solver = false;
        self.iterations = 0;
        stats.gjk_checks += 1;

        // Work near the origin to keep precision for far-away pairs.
        let position_offset =
            (input.transform_a.translation.vector + input.transform_b.translation.vector) * 0.5;
        let mut local_a = input.transform_a;
        let mut local_b = input.transform_b;
        local_a.translation.vector -= position_offset;
        local_b.translation.vector -= position_offset;

        let margin_a = self.shape_a.margin();
        let margin_b = self.shape_b.margin();
        let margin = margin_a + margin_b;
        let rel_error2 = self.config.relative_error_squared;

        let mut axis = self.initial_axis;
        let mut squared_distance = LARGE_DISTANCE_SQUARED;
        self.simplex.reset();

        let termination = loop {
            let p = self.shape_a.support_without_margin(&local_a, &-axis);
            let q = self.shape_b.support_without_margin(&local_b, &axis);
            let w = p - q;
            let delta = axis.dot(&w);

            if delta > 0.0 && delta * delta > squared_distance * input.maximum_distance_squared {
                break GjkTermination::Separated;
            }
            if self.simplex.in_simplex(&w) {
                break GjkTermination::AlreadyInSimplex;
            }
            let f0 = squared_distance - delta;
            let f1 = squared_distance * rel_error2;
            if f0 <= f1 {
                break GjkTermination::Converged;
            }

            self.simplex.add_vertex(w, p, q);
            let Some(new_axis) = self.simplex.closest() else {
                break GjkTermination::ClosestPointFailed;
            };
            if new_axis.norm_squared() < rel_error2 {
                axis = new_axis;
                break GjkTermination::VanishingAxis;
            }

            let previous = squared_distance;
            squared_distance = new_axis.norm_squared();
            axis = new_axis;
            if previous - squared_distance <= f64::EPSILON * previous {
                axis = self.simplex.backup_closest();
                break GjkTermination::NoProgress;
            }

            self.iterations += 1;
            if self.iterations >= self.config.max_iterations {
                break GjkTermination::IterationLimit;
            }
            if self.simplex.full_simplex() {
                axis = self.simplex.backup_closest();
                break GjkTermination::FullSimplex;
            }
        };
        self.last_termination = Some(termination);

        let mut is_valid = false;
        let mut degenerate = termination.is_degenerate();
        let mut distance = 0.0;
        let mut normal_in_b = Vector3::zeros();
        let mut point_on_a = Point3::origin();
        let mut point_on_b = Point3::origin();

        if termination.has_witnesses() {
            let (pa, pb) = self.simplex.compute_points();
            point_on_a = pa;
            point_on_b = pb;
            normal_in_b = pa - pb;
            let len_sq = axis.norm_squared();
            if len_sq < SHORT_AXIS_SQUARED {
                degenerate = true;
            }
            if len_sq > f64::EPSILON * f64::EPSILON {
                let len = len_sq.sqrt();
                normal_in_b /= len;
                let s = squared_distance.sqrt();
                point_on_a -= axis * (margin_a / s);
                point_on_b += axis * (margin_b / s);
                distance = len - margin;
                is_valid = true;
            }
        }

        let catch_degenerate = self.config.catch_degeneracies
            && degenerate
            && distance + margin < self.config.degenerate_penetration_threshold;

        if self.use_penetration_solver && (!is_valid || catch_degenerate) {
            stats.deep_penetration_checks += 1;
            trace!(
                ?termination,
                iterations = self.iterations,
                is_valid,
                "gjk falling back to penetration solver"
            );
            axis = Vector3::zeros();
            if let Some(pen) = minkowski_penetration(
                self.shape_a,
                &local_a,
                self.shape_b,
                &local_b,
                self.config,
                stats,
            ) {
                axis = pen.axis;
                let mut normal = pen.point_on_b - pen.point_on_a;
                if normal.norm_squared() <= f64::EPSILON * f64::EPSILON {
                    normal = pen.axis;
                }
                if normal.norm_squared() > f64::EPSILON * f64::EPSILON {
                    let depth = -(pen.point_on_a - pen.point_on_b).norm();
                    if !is_valid || depth < distance {
                        distance = depth;
                        point_on_a = pen.point_on_a;
                        point_on_b = pen.point_on_b;
                        normal_in_b = normal.normalize();
                        is_valid = true;
                        self.used_penetration_solver = true;
                    }
                }
            }
        }
        self.cached_separating_axis = axis;

        if is_valid && (distance < 0.0 || distance * distance < input.maximum_distance_squared) {
            self.cached_separating_axis = normal_in_b;
            self.cached_separating_distance = distance;
            self.witness_on_a = point_on_a + position_offset;
            sink.add_contact_point(
                &normal_in_b,
                &(point_on_b + position_offset),
                distance,
            );
        }
    }
}

/// One-shot distance query with default settings.
///
/// Returns the deepest contact or `None` when the shapes are farther apart
/// than `max_distance`.
#[must_use]
pub fn closest_points(
    shape_a: &ConvexShape,
    pose_a: &Isometry3<f64>,
    shape_b: &ConvexShape,
    pose_b: &Isometry3<f64>,
    max_distance: f64,
) -> Option<PointCollector> {
    let config = GjkConfig::default();
    let mut detector = GjkPairDetector::new(shape_a, shape_b, &config);
    // The loop bound applies to the cores, so widen it by both margins.
    let core_distance = max_distance + shape_a.margin() + shape_b.margin();
    let input = ClosestPointInput::new(*pose_a, *pose_b).with_maximum_distance(core_distance);
    let mut collector = PointCollector::new();
    detector.closest_points(&input, &mut collector, &mut CollisionStats::new());
    (collector.has_result && collector.distance <= max_distance).then_some(collector)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn sphere(r: f64) -> ConvexShape {
        ConvexShape::sphere(r).unwrap()
    }

    fn cube(h: f64) -> ConvexShape {
        ConvexShape::box_shape(Vector3::repeat(h)).unwrap()
    }

    fn query(a: &ConvexShape, pa: Isometry3<f64>, b: &ConvexShape, pb: Isometry3<f64>) -> PointCollector {
        let config = GjkConfig::default();
        let mut detector = GjkPairDetector::new(a, b, &config);
        let mut out = PointCollector::new();
        detector.closest_points(&ClosestPointInput::new(pa, pb), &mut out, &mut CollisionStats::new());
        out
    }

    #[test]
    fn test_separated_spheres() {
        let out = query(
            &sphere(1.0),
            Isometry3::translation(0.0, 0.0, 0.0),
            &sphere(0.5),
            Isometry3::translation(0.0, 4.0, 0.0),
        );
        assert!(out.has_result);
        assert_relative_eq!(out.distance, 2.5, epsilon = 1e-6);
        // Normal points from B toward A.
        assert_relative_eq!(out.normal_on_b, -Vector3::y(), epsilon = 1e-6);
        assert_relative_eq!(out.point_on_b, Point3::new(0.0, 3.5, 0.0), epsilon = 1e-6);
        assert_relative_eq!(out.point_on_a(), Point3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_overlapping_spheres() {
        let out = query(
            &sphere(1.0),
            Isometry3::identity(),
            &sphere(1.0),
            Isometry3::translation(1.5, 0.0, 0.0),
        );
        assert!(out.has_result);
        assert_relative_eq!(out.distance, -0.5, epsilon = 1e-6);
        assert_relative_eq!(out.normal_on_b, -Vector3::x(), epsilon = 1e-6);
    }

    #[test]
    fn test_box_box_distance() {
        let out = query(
            &cube(1.0),
            Isometry3::identity(),
            &cube(1.0),
            Isometry3::translation(3.0, 0.5, 0.0),
        );
        assert!(out.has_result);
        assert_relative_eq!(out.distance, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rotated_box_distance() {
        let rotated = Isometry3::from_parts(
            Translation3::new(4.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_4),
        );
        let out = query(&cube(1.0), Isometry3::identity(), &cube(1.0), rotated);
        // The rotated box reaches sqrt(2) toward A, minus its rounded corner.
        assert!(out.has_result);
        assert!(out.distance > 1.0 && out.distance < 4.0 - 1.0 - 2.0_f64.sqrt() + 0.1);
    }

    #[test]
    fn test_deep_box_penetration_uses_fallback() {
        let config = GjkConfig::default();
        let a = cube(1.0);
        let b = cube(1.0);
        let mut detector = GjkPairDetector::new(&a, &b, &config);
        let mut out = PointCollector::new();
        let mut stats = CollisionStats::new();
        let input = ClosestPointInput::new(Isometry3::identity(), Isometry3::translation(1.5, 0.0, 0.0));
        detector.closest_points(&input, &mut out, &mut stats);

        assert!(out.has_result);
        assert!(detector.used_penetration_solver());
        assert_relative_eq!(detector.witness_on_a().x, 1.0, epsilon = 1e-3);
        assert_eq!(stats.deep_penetration_checks, 1);
        assert!(stats.gjk_checks >= 2);
        assert_relative_eq!(out.distance, -0.5, epsilon = 1e-3);
        assert_relative_eq!(out.normal_on_b, -Vector3::x(), epsilon = 1e-3);
    }

    #[test]
    fn test_maximum_distance_suppresses_report() {
        let config = GjkConfig::default();
        let a = sphere(1.0);
        let b = sphere(1.0);
        let mut detector = GjkPairDetector::new(&a, &b, &config);
        let mut out = PointCollector::new();
        let input = ClosestPointInput::new(Isometry3::identity(), Isometry3::translation(10.0, 0.0, 0.0))
            .with_maximum_distance(1.0);
        detector.closest_points(&input, &mut out, &mut CollisionStats::new());
        assert!(!out.has_result);
        assert_eq!(detector.cached_separating_distance(), 0.0);
    }

    #[test]
    fn test_far_from_origin_keeps_precision() {
        let out = query(
            &sphere(1.0),
            Isometry3::translation(1.0e6, 0.0, 0.0),
            &sphere(1.0),
            Isometry3::translation(1.0e6 + 3.0, 0.0, 0.0),
        );
        assert_relative_eq!(out.distance, 1.0, epsilon = 1e-6);
        assert_relative_eq!(out.point_on_b.x, 1.0e6 + 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_capsule_against_box() {
        let capsule = ConvexShape::capsule(1.0, 0.25).unwrap();
        let out = query(
            &capsule,
            Isometry3::translation(0.0, 0.0, 3.0),
            &cube(1.0),
            Isometry3::identity(),
        );
        // Capsule bottom at z = 1.75, box top at z = 1.
        assert_relative_eq!(out.distance, 0.75, epsilon = 1e-4);
        assert_relative_eq!(out.normal_on_b, Vector3::z(), epsilon = 1e-4);
    }

    #[test]
    fn test_one_shot_helper() {
        let a = sphere(1.0);
        let b = sphere(1.0);
        let far = Isometry3::translation(5.0, 0.0, 0.0);
        assert!(closest_points(&a, &Isometry3::identity(), &b, &far, 1.0).is_none());
        assert!(closest_points(&a, &Isometry3::identity(), &b, &far, 2.99).is_none());
        let touching = Isometry3::translation(1.9, 0.0, 0.0);
        let hit = closest_points(&a, &Isometry3::identity(), &b, &touching, 0.0).unwrap();
        assert_relative_eq!(hit.distance, -0.1, epsilon = 1e-6);
        let hit = closest_points(&a, &Isometry3::identity(), &b, &far, 10.0).unwrap();
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_collector_keeps_deepest() {
        let mut c = PointCollector::new();
        c.add_contact_point(&Vector3::x(), &Point3::origin(), 0.3);
        c.add_contact_point(&Vector3::y(), &Point3::origin(), 0.5);
        c.add_contact_point(&Vector3::z(), &Point3::origin(), -0.1);
        assert_eq!(c.distance, -0.1);
        assert_eq!(c.normal_on_b, Vector3::z());
    }

    #[test]
    fn test_iteration_limit_is_inclusive() {
        let a = sphere(1.0);
        let b = sphere(1.0);
        let pose_b = Isometry3::translation(3.0, 0.0, 0.0);
        let run = |max_iterations: usize| {
            let config = GjkConfig {
                max_iterations,
                ..GjkConfig::default()
            };
            let mut detector = GjkPairDetector::new(&a, &b, &config);
            let mut out = PointCollector::new();
            let input = ClosestPointInput::new(Isometry3::identity(), pose_b);
            detector.closest_points(&input, &mut out, &mut CollisionStats::new());
            (detector.last_termination(), detector.iterations())
        };

        // The core points coincide with the centers, so one step reaches
        // the answer and the second finds nothing new.
        assert_eq!(run(1), (Some(GjkTermination::IterationLimit), 1));
        assert_eq!(run(2), (Some(GjkTermination::AlreadyInSimplex), 1));
    }

    #[test]
    fn test_termination_degeneracy() {
        assert!(GjkTermination::Converged.is_degenerate());
        assert!(!GjkTermination::IterationLimit.is_degenerate());
    }
}
