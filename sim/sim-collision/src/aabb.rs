//! Axis-aligned bounding boxes.
//!
//! [`Aabb`] is the currency of every broadphase: proxies are created and
//! moved with one, the dynamic tree stores (slightly fattened) ones in its
//! nodes, and convex shapes report theirs for a given world transform.

use nalgebra::{Point3, Vector3};

use crate::error::{CollisionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest AABB containing every point, or `None` for an empty set.
    #[must_use]
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self::new(first, first);
        for p in iter {
            aabb.min = aabb.min.inf(p);
            aabb.max = aabb.max.sup(p);
        }
        Some(aabb)
    }

    /// Reject inverted or non-finite boxes.
    pub fn validate(&self) -> Result<()> {
        for axis in Axis::all() {
            let (lo, hi) = (self.min_on_axis(axis), self.max_on_axis(axis));
            if !lo.is_finite() || !hi.is_finite() {
                return Err(CollisionError::invalid_aabb(format!(
                    "non-finite bound on {axis:?}"
                )));
            }
            if lo > hi {
                return Err(CollisionError::invalid_aabb(format!(
                    "min > max on {axis:?} ({lo} > {hi})"
                )));
            }
        }
        Ok(())
    }

    /// Check if this AABB overlaps with another AABB (touching counts).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if `other` lies entirely inside this AABB.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Check if a point lies inside (or on) this AABB.
    #[must_use]
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Smallest AABB containing both boxes.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Stretch the box along a motion vector: positive components grow the
    /// max corner, negative ones lower the min corner.
    #[must_use]
    pub fn signed_expanded(&self, motion: &Vector3<f64>) -> Self {
        let mut out = *self;
        for i in 0..3 {
            if motion[i] > 0.0 {
                out.max[i] += motion[i];
            } else {
                out.min[i] += motion[i];
            }
        }
        out
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half of the box size along each axis.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) * 0.5
    }

    /// Sum of the three edge lengths, the cost metric for tree building.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        let d = self.max - self.min;
        d.x + d.y + d.z
    }

    /// L1 distance between the doubled centers of two boxes.
    ///
    /// Used to pick the closer child when descending the dynamic tree.
    #[must_use]
    pub fn proximity(&self, other: &Self) -> f64 {
        let d = (self.min.coords + self.max.coords) - (other.min.coords + other.max.coords);
        d.x.abs() + d.y.abs() + d.z.abs()
    }

    /// Get the extent (size) along a specific axis.
    #[must_use]
    pub fn extent(&self, axis: Axis) -> f64 {
        self.max_on_axis(axis) - self.min_on_axis(axis)
    }

    /// Get the minimum value along a specific axis.
    #[must_use]
    pub fn min_on_axis(&self, axis: Axis) -> f64 {
        self.min[axis.index()]
    }

    /// Get the maximum value along a specific axis.
    #[must_use]
    pub fn max_on_axis(&self, axis: Axis) -> f64 {
        self.max[axis.index()]
    }

    /// Slab test of a precomputed ray against this box.
    #[must_use]
    pub fn intersects_ray(&self, ray: &RaySlab, lambda_min: f64, lambda_max: f64) -> bool {
        let bounds = [self.min, self.max];
        let mut tmin = (bounds[ray.signs[0]].x - ray.origin.x) * ray.inv_direction.x;
        let mut tmax = (bounds[1 - ray.signs[0]].x - ray.origin.x) * ray.inv_direction.x;
        let tymin = (bounds[ray.signs[1]].y - ray.origin.y) * ray.inv_direction.y;
        let tymax = (bounds[1 - ray.signs[1]].y - ray.origin.y) * ray.inv_direction.y;

        if tmin > tymax || tymin > tmax {
            return false;
        }
        tmin = tmin.max(tymin);
        tmax = tmax.min(tymax);

        let tzmin = (bounds[ray.signs[2]].z - ray.origin.z) * ray.inv_direction.z;
        let tzmax = (bounds[1 - ray.signs[2]].z - ray.origin.z) * ray.inv_direction.z;

        if tmin > tzmax || tzmin > tmax {
            return false;
        }
        tmin = tmin.max(tzmin);
        tmax = tmax.min(tzmax);

        tmin < lambda_max && tmax > lambda_min
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// A ray segment prepared for repeated slab tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySlab {
    /// Ray start point.
    pub origin: Point3<f64>,
    /// Component-wise inverse of the unit direction (huge for zero components).
    pub inv_direction: Vector3<f64>,
    /// `1` where the direction component is negative.
    pub signs: [usize; 3],
    /// Parametric length of the segment along the unit direction.
    pub lambda_max: f64,
}

impl RaySlab {
    /// Prepare the segment `from → to`.
    #[must_use]
    pub fn new(from: Point3<f64>, to: Point3<f64>) -> Self {
        const LARGE: f64 = 1e18;

        let delta = to - from;
        let dir = delta.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        let inv = dir.map(|c| if c == 0.0 { LARGE } else { 1.0 / c });
        Self {
            origin: from,
            inv_direction: inv,
            signs: [
                usize::from(inv.x < 0.0),
                usize::from(inv.y < 0.0),
                usize::from(inv.z < 0.0),
            ],
            lambda_max: dir.dot(&delta),
        }
    }
}

/// Coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// X-axis.
    X,
    /// Y-axis.
    Y,
    /// Z-axis.
    Z,
}

impl Axis {
    /// Get all three axes.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::X, Self::Y, Self::Z]
    }

    /// Component index of this axis.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box_at(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::from_center(Point3::new(x, y, z), Vector3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_aabb_overlaps() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_touching_boxes_overlap() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_contains_and_merge() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let b = unit_box_at(3.0, 0.0, 0.0);
        let m = a.merged(&b);

        assert!(m.contains(&a));
        assert!(m.contains(&b));
        assert!(!a.contains(&m));
        assert_eq!(m.min.x, -0.5);
        assert_eq!(m.max.x, 3.5);
    }

    #[test]
    fn test_signed_expand() {
        let a = unit_box_at(0.0, 0.0, 0.0);
        let moved = a.signed_expanded(&Vector3::new(1.0, -2.0, 0.0));

        assert_eq!(moved.max.x, 1.5);
        assert_eq!(moved.min.x, -0.5);
        assert_eq!(moved.min.y, -2.5);
        assert_eq!(moved.max.y, 0.5);
        assert!(moved.contains(&a));
    }

    #[test]
    fn test_validate() {
        assert!(unit_box_at(0.0, 0.0, 0.0).validate().is_ok());

        let inverted = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0));
        assert!(inverted.validate().is_err());

        let nan = Aabb::new(Point3::new(f64::NAN, 0.0, 0.0), Point3::new(0.0, 1.0, 1.0));
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_proximity_prefers_closer_box() {
        let probe = unit_box_at(1.0, 0.0, 0.0);
        let near = unit_box_at(2.0, 0.0, 0.0);
        let far = unit_box_at(8.0, 0.0, 0.0);
        assert!(probe.proximity(&near) < probe.proximity(&far));
        assert_relative_eq!(probe.proximity(&near), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_slab() {
        let b = unit_box_at(5.0, 0.0, 0.0);

        let hit = RaySlab::new(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        assert!(b.intersects_ray(&hit, 0.0, hit.lambda_max));

        let short = RaySlab::new(Point3::origin(), Point3::new(3.0, 0.0, 0.0));
        assert!(!b.intersects_ray(&short, 0.0, short.lambda_max));

        let miss = RaySlab::new(Point3::new(0.0, 2.0, 0.0), Point3::new(10.0, 2.0, 0.0));
        assert!(!b.intersects_ray(&miss, 0.0, miss.lambda_max));

        let backwards = RaySlab::new(Point3::new(10.0, 0.0, 0.0), Point3::origin());
        assert!(b.intersects_ray(&backwards, 0.0, backwards.lambda_max));
    }

    #[test]
    fn test_from_points() {
        let pts = [
            Point3::new(1.0, -2.0, 0.0),
            Point3::new(-1.0, 3.0, 0.5),
            Point3::new(0.0, 0.0, -4.0),
        ];
        let aabb = Aabb::from_points(&pts).unwrap();
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, -4.0));
        assert_eq!(aabb.max, Point3::new(1.0, 3.0, 0.5));
        assert!(Aabb::from_points(&[] as &[Point3<f64>]).is_none());
    }
}
