//! Convex collision shapes.
//!
//! Every shape is described the way GJK consumes it: a *core* support
//! mapping without margin plus a scalar margin that rounds the core. The
//! full shape is the Minkowski sum of the core and a sphere of radius
//! `margin`.
//!
//! Spheres and capsules are pure margin around a point and a segment.
//! Boxes and cylinders shrink their core by the margin so the rounded
//! shape keeps the requested dimensions. Cones and hulls grow by the margin.
//!
//! Axis-aligned shapes use the local Z axis as their long axis.

use nalgebra::{Isometry3, Point3, Vector3};
use smallvec::SmallVec;

use crate::aabb::Aabb;
use crate::error::{CollisionError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Margin given to shapes whose margin is not implied by their dimensions.
pub const DEFAULT_MARGIN: f64 = 0.04;

/// Directions shorter than this are treated as zero.
const DIRECTION_EPSILON: f64 = 1e-12;

/// Tag identifying the variant of a [`ConvexShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeKind {
    /// Sphere.
    Sphere,
    /// Box.
    Box,
    /// Capsule.
    Capsule,
    /// Cone.
    Cone,
    /// Cylinder.
    Cylinder,
    /// Convex hull of a point cloud.
    ConvexHull,
}

impl ShapeKind {
    /// Number of shape kinds.
    pub const COUNT: usize = 6;

    /// Every kind, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Sphere,
        Self::Box,
        Self::Capsule,
        Self::Cone,
        Self::Cylinder,
        Self::ConvexHull,
    ];

    /// Row/column of this kind in dispatch tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Sphere => 0,
            Self::Box => 1,
            Self::Capsule => 2,
            Self::Cone => 3,
            Self::Cylinder => 4,
            Self::ConvexHull => 5,
        }
    }
}

/// A convex shape in its local frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvexShape {
    /// Sphere centered at the origin.
    Sphere {
        /// Radius; also the margin.
        radius: f64,
    },
    /// Box centered at the origin.
    Box {
        /// Half-extents along each local axis, margin included.
        half_extents: Vector3<f64>,
        /// Rounding radius of the corners.
        margin: f64,
    },
    /// Capsule (line segment with radius) along local Z.
    Capsule {
        /// Half-length of the segment.
        half_length: f64,
        /// Radius; also the margin.
        radius: f64,
    },
    /// Cone along local Z, apex up, centered at half height.
    Cone {
        /// Base radius.
        radius: f64,
        /// Height from base to apex.
        height: f64,
        /// Rounding radius added around the cone.
        margin: f64,
    },
    /// Cylinder along local Z.
    Cylinder {
        /// Half-length along Z, margin included.
        half_length: f64,
        /// Radius, margin included.
        radius: f64,
        /// Rounding radius of the rims.
        margin: f64,
    },
    /// Convex hull of a set of points.
    ConvexHull {
        /// Hull points in the local frame.
        points: Vec<Point3<f64>>,
        /// Rounding radius added around the hull.
        margin: f64,
    },
}

impl ConvexShape {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a sphere.
    pub fn sphere(radius: f64) -> Result<Self> {
        positive("sphere radius", radius)?;
        Ok(Self::Sphere { radius })
    }

    /// Create a box from its half-extents.
    ///
    /// The margin is [`DEFAULT_MARGIN`], reduced to the smallest half-extent
    /// for very thin boxes.
    pub fn box_shape(half_extents: Vector3<f64>) -> Result<Self> {
        for (axis, value) in ["x", "y", "z"].into_iter().zip(half_extents.iter()) {
            positive(&format!("box half-extent {axis}"), *value)?;
        }
        Ok(Self::Box {
            half_extents,
            margin: DEFAULT_MARGIN.min(half_extents.min()),
        })
    }

    /// Create a capsule along local Z.
    pub fn capsule(half_length: f64, radius: f64) -> Result<Self> {
        non_negative("capsule half-length", half_length)?;
        positive("capsule radius", radius)?;
        Ok(Self::Capsule {
            half_length,
            radius,
        })
    }

    /// Create a cone along local Z.
    pub fn cone(radius: f64, height: f64) -> Result<Self> {
        positive("cone radius", radius)?;
        positive("cone height", height)?;
        Ok(Self::Cone {
            radius,
            height,
            margin: DEFAULT_MARGIN,
        })
    }

    /// Create a cylinder along local Z.
    pub fn cylinder(half_length: f64, radius: f64) -> Result<Self> {
        positive("cylinder half-length", half_length)?;
        positive("cylinder radius", radius)?;
        Ok(Self::Cylinder {
            half_length,
            radius,
            margin: DEFAULT_MARGIN.min(half_length).min(radius),
        })
    }

    /// Create the convex hull of `points`.
    pub fn convex_hull(points: Vec<Point3<f64>>) -> Result<Self> {
        if points.is_empty() {
            return Err(CollisionError::invalid_shape("convex hull needs at least one point"));
        }
        if points.iter().any(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(CollisionError::invalid_shape("convex hull points must be finite"));
        }
        Ok(Self::ConvexHull {
            points,
            margin: DEFAULT_MARGIN,
        })
    }

    /// Replace the margin.
    ///
    /// Spheres and capsules carry their radius as margin and reject this.
    /// Boxes and cylinders reject margins larger than their dimensions.
    pub fn with_margin(mut self, new_margin: f64) -> Result<Self> {
        non_negative("margin", new_margin)?;
        match &mut self {
            Self::Sphere { .. } | Self::Capsule { .. } => {
                return Err(CollisionError::invalid_shape(
                    "sphere and capsule margins are their radius",
                ));
            }
            Self::Box {
                half_extents,
                margin,
            } => {
                if new_margin > half_extents.min() {
                    return Err(CollisionError::invalid_shape(
                        "box margin exceeds a half-extent",
                    ));
                }
                *margin = new_margin;
            }
            Self::Cylinder {
                half_length,
                radius,
                margin,
            } => {
                if new_margin > half_length.min(*radius) {
                    return Err(CollisionError::invalid_shape(
                        "cylinder margin exceeds its dimensions",
                    ));
                }
                *margin = new_margin;
            }
            Self::Cone { margin, .. } | Self::ConvexHull { margin, .. } => *margin = new_margin,
        }
        Ok(self)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Kind tag of this shape.
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Box { .. } => ShapeKind::Box,
            Self::Capsule { .. } => ShapeKind::Capsule,
            Self::Cone { .. } => ShapeKind::Cone,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::ConvexHull { .. } => ShapeKind::ConvexHull,
        }
    }

    /// Rounding radius around the core.
    #[must_use]
    pub fn margin(&self) -> f64 {
        match self {
            Self::Sphere { radius } | Self::Capsule { radius, .. } => *radius,
            Self::Box { margin, .. }
            | Self::Cone { margin, .. }
            | Self::Cylinder { margin, .. }
            | Self::ConvexHull { margin, .. } => *margin,
        }
    }

    /// Farthest core point along `dir` in the local frame.
    ///
    /// `dir` need not be normalized.
    #[must_use]
    pub fn local_support_without_margin(&self, dir: &Vector3<f64>) -> Point3<f64> {
        match self {
            Self::Sphere { .. } => Point3::origin(),
            Self::Box {
                half_extents,
                margin,
            } => {
                let core = half_extents.add_scalar(-margin);
                Point3::new(
                    core.x.copysign(dir.x),
                    core.y.copysign(dir.y),
                    core.z.copysign(dir.z),
                )
            }
            Self::Capsule { half_length, .. } => {
                Point3::new(0.0, 0.0, half_length.copysign(dir.z))
            }
            Self::Cone { radius, height, .. } => support_cone(*radius, *height, dir),
            Self::Cylinder {
                half_length,
                radius,
                margin,
            } => support_cylinder(half_length - margin, radius - margin, dir),
            Self::ConvexHull { points, .. } => support_points(points, dir),
        }
    }

    /// Farthest point of the full shape along `dir` in the local frame.
    #[must_use]
    pub fn local_support(&self, dir: &Vector3<f64>) -> Point3<f64> {
        let core = self.local_support_without_margin(dir);
        let margin = self.margin();
        if margin == 0.0 {
            return core;
        }
        let unit = if dir.norm_squared() < DIRECTION_EPSILON * DIRECTION_EPSILON {
            Vector3::new(-1.0, -1.0, -1.0).normalize()
        } else {
            dir.normalize()
        };
        core + unit * margin
    }

    /// Farthest core point along the world direction `dir` with the shape
    /// placed at `pose`.
    #[must_use]
    pub fn support_without_margin(&self, pose: &Isometry3<f64>, dir: &Vector3<f64>) -> Point3<f64> {
        let local_dir = pose.rotation.inverse_transform_vector(dir);
        pose.transform_point(&self.local_support_without_margin(&local_dir))
    }

    /// Farthest point of the full shape along the world direction `dir`.
    #[must_use]
    pub fn support(&self, pose: &Isometry3<f64>, dir: &Vector3<f64>) -> Point3<f64> {
        let local_dir = pose.rotation.inverse_transform_vector(dir);
        pose.transform_point(&self.local_support(&local_dir))
    }

    /// Local directions the penetration solver should try in addition to its
    /// fixed sample set.
    #[must_use]
    pub fn preferred_penetration_directions(&self) -> SmallVec<[Vector3<f64>; 6]> {
        match self {
            Self::Box { .. } => SmallVec::from_buf([
                Vector3::x(),
                -Vector3::x(),
                Vector3::y(),
                -Vector3::y(),
                Vector3::z(),
                -Vector3::z(),
            ]),
            _ => SmallVec::new(),
        }
    }

    /// World-space bounds of the shape at `pose`, margin included.
    #[must_use]
    pub fn aabb(&self, pose: &Isometry3<f64>) -> Aabb {
        if let Self::Sphere { radius } = self {
            let center = Point3::from(pose.translation.vector);
            return Aabb::from_center(center, Vector3::repeat(*radius));
        }

        let mut min = Point3::origin();
        let mut max = Point3::origin();
        for axis in 0..3 {
            let dir = Vector3::ith(axis, 1.0);
            max[axis] = self.support(pose, &dir)[axis];
            min[axis] = self.support(pose, &(-dir))[axis];
        }
        Aabb::new(min, max)
    }
}

// =============================================================================
// Support helpers
// =============================================================================

fn support_cone(radius: f64, height: f64, dir: &Vector3<f64>) -> Point3<f64> {
    let half_height = 0.5 * height;
    let sin_angle = radius / radius.hypot(height);
    if dir.z > dir.norm() * sin_angle {
        return Point3::new(0.0, 0.0, half_height);
    }
    let radial = dir.x.hypot(dir.y);
    if radial > DIRECTION_EPSILON {
        let scale = radius / radial;
        Point3::new(dir.x * scale, dir.y * scale, -half_height)
    } else {
        Point3::new(0.0, 0.0, -half_height)
    }
}

fn support_cylinder(half_length: f64, radius: f64, dir: &Vector3<f64>) -> Point3<f64> {
    let z = half_length.copysign(dir.z);
    let radial = dir.x.hypot(dir.y);
    if radial > DIRECTION_EPSILON {
        let scale = radius / radial;
        Point3::new(dir.x * scale, dir.y * scale, z)
    } else {
        Point3::new(radius, 0.0, z)
    }
}

fn support_points(points: &[Point3<f64>], dir: &Vector3<f64>) -> Point3<f64> {
    let mut best = Point3::origin();
    let mut best_dot = f64::NEG_INFINITY;
    for point in points {
        let dot = point.coords.dot(dir);
        if dot > best_dot {
            best_dot = dot;
            best = *point;
        }
    }
    best
}

fn positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CollisionError::invalid_shape(format!(
            "{what} must be finite and positive, got {value}"
        )))
    }
}

fn non_negative(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CollisionError::invalid_shape(format!(
            "{what} must be finite and non-negative, got {value}"
        )))
    }
}
