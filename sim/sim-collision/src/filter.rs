//! Collision group filtering.
//!
//! Two proxies may form a pair only if
//! `(a.group & b.mask) != 0 && (b.group & a.mask) != 0`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Group membership and the groups a proxy is willing to pair with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionFilter {
    /// Groups this proxy belongs to.
    pub group: u32,
    /// Groups this proxy collides with.
    pub mask: u32,
}

impl CollisionFilter {
    /// Ordinary dynamic bodies.
    pub const DEFAULT: u32 = 1;
    /// Immovable geometry.
    pub const STATIC: u32 = 1 << 1;
    /// Bodies moved by the application rather than the solver.
    pub const KINEMATIC: u32 = 1 << 2;
    /// Small bodies that should not collide with each other.
    pub const DEBRIS: u32 = 1 << 3;
    /// Trigger volumes.
    pub const SENSOR_TRIGGER: u32 = 1 << 4;
    /// Character controllers.
    pub const CHARACTER: u32 = 1 << 5;
    /// Every group.
    pub const ALL: u32 = u32::MAX;

    /// Create a filter.
    #[must_use]
    pub const fn new(group: u32, mask: u32) -> Self {
        Self { group, mask }
    }

    /// Filter for static geometry: collides with everything except other
    /// static geometry.
    #[must_use]
    pub const fn static_geometry() -> Self {
        Self {
            group: Self::STATIC,
            mask: Self::ALL ^ Self::STATIC,
        }
    }

    /// Filter that never pairs with anything.
    #[must_use]
    pub const fn none() -> Self {
        Self { group: 0, mask: 0 }
    }

    /// Replace the group bits.
    #[must_use]
    pub const fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    /// Replace the mask bits.
    #[must_use]
    pub const fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Whether two filters accept each other.
    #[must_use]
    pub const fn can_collide_with(&self, other: &Self) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            group: Self::DEFAULT,
            mask: Self::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides_with_default() {
        let a = CollisionFilter::default();
        assert!(a.can_collide_with(&CollisionFilter::default()));
    }

    #[test]
    fn test_static_geometry_ignores_itself() {
        let ground = CollisionFilter::static_geometry();
        let wall = CollisionFilter::static_geometry();
        assert!(!ground.can_collide_with(&wall));
        assert!(ground.can_collide_with(&CollisionFilter::default()));
    }

    #[test]
    fn test_filter_must_accept_both_ways() {
        // Debris accepts everything, but the body refuses debris.
        let debris = CollisionFilter::new(CollisionFilter::DEBRIS, CollisionFilter::ALL);
        let body = CollisionFilter::default().with_mask(CollisionFilter::ALL ^ CollisionFilter::DEBRIS);
        assert!(!debris.can_collide_with(&body));
        assert!(!body.can_collide_with(&debris));
        assert!(!CollisionFilter::none().can_collide_with(&CollisionFilter::default()));
    }
}
