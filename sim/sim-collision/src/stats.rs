//! Narrow-phase counters.
//!
//! The caller owns a [`CollisionStats`] and passes it by `&mut` into the
//! narrow phase, so several worlds can run side by side without sharing
//! counters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters accumulated by GJK, the penetration solver and the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionStats {
    /// GJK distance queries run.
    pub gjk_checks: u64,
    /// Queries that fell back to the penetration solver.
    pub deep_penetration_checks: u64,
    /// Contact manifolds currently allocated by the dispatcher.
    pub live_manifolds: usize,
    /// Contact points produced during the last dispatch.
    pub contact_points: usize,
    /// Pairs the dispatcher ran a narrow-phase algorithm on.
    pub dispatched_pairs: u64,
}

impl CollisionStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the cumulative counters, keeping the live manifold count.
    pub fn reset_counters(&mut self) {
        *self = Self {
            live_manifolds: self.live_manifolds,
            ..Self::default()
        };
    }

    /// Fraction of GJK queries that needed the penetration solver.
    #[must_use]
    pub fn penetration_ratio(&self) -> f64 {
        if self.gjk_checks == 0 {
            0.0
        } else {
            self.deep_penetration_checks as f64 / self.gjk_checks as f64
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_live_manifolds() {
        let mut stats = CollisionStats {
            gjk_checks: 10,
            deep_penetration_checks: 5,
            live_manifolds: 3,
            contact_points: 4,
            dispatched_pairs: 7,
        };
        assert_eq!(stats.penetration_ratio(), 0.5);
        stats.reset_counters();
        assert_eq!(stats.gjk_checks, 0);
        assert_eq!(stats.live_manifolds, 3);
        assert_eq!(stats.penetration_ratio(), 0.0);
    }
}
