//! Broad-phase collision detection.
//!
//! A broadphase tracks one proxy per collision object and keeps an
//! [`PairCache`] filled with every pair of proxies whose AABBs overlap. The
//! narrow phase then only looks at those pairs.
//!
//! # Algorithms
//!
//! | Type | Update cost | Notes |
//! |------|-------------|-------|
//! | [`AxisSweep`] | O(moved edges) | Quantized 3-axis sweep-and-prune, pairs reported as edges swap |
//! | [`DbvtBroadphase`] | O(log n) per moved proxy | Two dynamic AABB trees with staged migration |
//! | [`SimpleBroadphase`] | O(n²) per pass | Reference oracle and tiny scenes |
//!
//! [`BroadPhaseDetector`] selects one of them at construction time.
//!
//! # Example
//!
//! ```
//! use sim_collision::{Aabb, AxisSweep, AxisSweepConfig, BroadPhase, CollisionFilter, ObjectId, PairCache};
//! use nalgebra::Point3;
//!
//! let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
//! let a = sweep
//!     .create_proxy(
//!         Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
//!         ObjectId::new(1),
//!         CollisionFilter::default(),
//!     )
//!     .unwrap();
//! let b = sweep
//!     .create_proxy(
//!         Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(1.5, 1.5, 1.5)),
//!         ObjectId::new(2),
//!         CollisionFilter::default(),
//!     )
//!     .unwrap();
//!
//! sweep.calculate_overlapping_pairs();
//! assert_eq!(sweep.pair_cache().len(), 1);
//! assert!(sweep.test_aabb_overlap(a, b));
//! ```

mod axis_sweep;
mod dbvt_broadphase;
mod simple;

pub use axis_sweep::AxisSweep;
pub use dbvt_broadphase::{DbvtBroadphase, DbvtUpdateStats, STAGE_COUNT};
pub use simple::SimpleBroadphase;

use nalgebra::Point3;

use crate::aabb::Aabb;
use crate::config::{BroadPhaseAlgorithm, BroadPhaseConfig};
use crate::error::Result;
use crate::filter::CollisionFilter;
use crate::handle::{ObjectId, ProxyHandle};
use crate::pair_cache::{HashedPairCache, PairCache, PairProxy};

#[cfg(debug_assertions)]
use crate::observer::BroadphaseObserver;

/// What every broadphase records about a proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyInfo {
    /// Current world-space bounds.
    pub aabb: Aabb,
    /// Object the proxy stands for.
    pub owner: ObjectId,
    /// Collision groups.
    pub filter: CollisionFilter,
}

impl ProxyInfo {
    /// Create proxy info.
    #[must_use]
    pub const fn new(aabb: Aabb, owner: ObjectId, filter: CollisionFilter) -> Self {
        Self {
            aabb,
            owner,
            filter,
        }
    }

    pub(crate) const fn pair_proxy(&self, handle: ProxyHandle) -> PairProxy {
        PairProxy::new(handle, self.filter)
    }
}

/// Common contract of all broadphases.
///
/// All mutation goes through `&mut self`; a broadphase and its pair cache
/// are updated completely before the narrow phase reads the pairs.
pub trait BroadPhase {
    /// Pair cache the broadphase reports into.
    type Cache: PairCache;

    /// Start tracking an object.
    ///
    /// # Errors
    ///
    /// [`CapacityExceeded`](crate::CollisionError::CapacityExceeded) when
    /// the handle pool is full, [`InvalidAabb`](crate::CollisionError::InvalidAabb)
    /// for inverted or non-finite bounds.
    fn create_proxy(
        &mut self,
        aabb: Aabb,
        owner: ObjectId,
        filter: CollisionFilter,
    ) -> Result<ProxyHandle>;

    /// Stop tracking an object. Its pairs are removed (or, with a deferred
    /// cache, swept by the next `calculate_overlapping_pairs`).
    fn destroy_proxy(&mut self, handle: ProxyHandle) -> Result<()>;

    /// Move a proxy.
    fn set_aabb(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()>;

    /// Bounds last given to the proxy.
    fn aabb(&self, handle: ProxyHandle) -> Result<Aabb>;

    /// Owner of the proxy.
    fn owner(&self, handle: ProxyHandle) -> Result<ObjectId>;

    /// Bring the pair cache up to date.
    fn calculate_overlapping_pairs(&mut self);

    /// Pair cache.
    fn pair_cache(&self) -> &Self::Cache;

    /// Pair cache, mutably (for the narrow phase to attach state).
    fn pair_cache_mut(&mut self) -> &mut Self::Cache;

    /// Whether two live proxies overlap according to this broadphase.
    /// Stale handles never overlap.
    fn test_aabb_overlap(&self, a: ProxyHandle, b: ProxyHandle) -> bool;

    /// Report proxies whose bounds may intersect `aabb`.
    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ProxyHandle));

    /// Report proxies whose bounds may be crossed by the segment `from → to`.
    fn ray_test(&self, from: Point3<f64>, to: Point3<f64>, callback: &mut dyn FnMut(ProxyHandle));

    /// Bounds of everything the broadphase covers.
    fn broadphase_aabb(&self) -> Aabb;

    /// Reset internal allocation state. Only acts when no proxy is alive.
    fn reset_pool(&mut self);

    /// Number of live proxies.
    fn proxy_count(&self) -> usize;
}

/// Broadphase selected at runtime from a [`BroadPhaseConfig`].
#[derive(Debug)]
pub enum BroadPhaseDetector {
    /// Quantized sweep-and-prune.
    AxisSweep(AxisSweep<HashedPairCache>),
    /// Brute force.
    Simple(SimpleBroadphase<HashedPairCache>),
    /// Dynamic AABB trees.
    Dbvt(DbvtBroadphase<HashedPairCache>),
}

macro_rules! dispatch {
    ($self:expr, $bp:ident => $body:expr) => {
        match $self {
            BroadPhaseDetector::AxisSweep($bp) => $body,
            BroadPhaseDetector::Simple($bp) => $body,
            BroadPhaseDetector::Dbvt($bp) => $body,
        }
    };
}

impl BroadPhaseDetector {
    /// Build the configured broadphase with its own hashed pair cache.
    pub fn new(config: &BroadPhaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(match config.algorithm {
            BroadPhaseAlgorithm::AxisSweep => Self::AxisSweep(AxisSweep::new(config.axis_sweep.clone())?),
            BroadPhaseAlgorithm::Simple => Self::Simple(SimpleBroadphase::new(config.simple.clone())?),
            BroadPhaseAlgorithm::Dbvt => Self::Dbvt(DbvtBroadphase::new(config.dbvt.clone())?),
        })
    }

    /// Algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> BroadPhaseAlgorithm {
        match self {
            Self::AxisSweep(_) => BroadPhaseAlgorithm::AxisSweep,
            Self::Simple(_) => BroadPhaseAlgorithm::Simple,
            Self::Dbvt(_) => BroadPhaseAlgorithm::Dbvt,
        }
    }

    /// Attach an observer for pair and staging events.
    #[cfg(debug_assertions)]
    pub fn set_observer(&mut self, observer: Option<Box<dyn BroadphaseObserver>>) {
        dispatch!(self, bp => bp.set_observer(observer));
    }
}

impl BroadPhase for BroadPhaseDetector {
    type Cache = HashedPairCache;

    fn create_proxy(
        &mut self,
        aabb: Aabb,
        owner: ObjectId,
        filter: CollisionFilter,
    ) -> Result<ProxyHandle> {
        dispatch!(self, bp => bp.create_proxy(aabb, owner, filter))
    }

    fn destroy_proxy(&mut self, handle: ProxyHandle) -> Result<()> {
        dispatch!(self, bp => bp.destroy_proxy(handle))
    }

    fn set_aabb(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()> {
        dispatch!(self, bp => bp.set_aabb(handle, aabb))
    }

    fn aabb(&self, handle: ProxyHandle) -> Result<Aabb> {
        dispatch!(self, bp => bp.aabb(handle))
    }

    fn owner(&self, handle: ProxyHandle) -> Result<ObjectId> {
        dispatch!(self, bp => bp.owner(handle))
    }

    fn calculate_overlapping_pairs(&mut self) {
        dispatch!(self, bp => bp.calculate_overlapping_pairs());
    }

    fn pair_cache(&self) -> &HashedPairCache {
        dispatch!(self, bp => bp.pair_cache())
    }

    fn pair_cache_mut(&mut self) -> &mut HashedPairCache {
        dispatch!(self, bp => bp.pair_cache_mut())
    }

    fn test_aabb_overlap(&self, a: ProxyHandle, b: ProxyHandle) -> bool {
        dispatch!(self, bp => bp.test_aabb_overlap(a, b))
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ProxyHandle)) {
        dispatch!(self, bp => bp.aabb_test(aabb, callback));
    }

    fn ray_test(&self, from: Point3<f64>, to: Point3<f64>, callback: &mut dyn FnMut(ProxyHandle)) {
        dispatch!(self, bp => bp.ray_test(from, to, callback));
    }

    fn broadphase_aabb(&self) -> Aabb {
        dispatch!(self, bp => bp.broadphase_aabb())
    }

    fn reset_pool(&mut self) {
        dispatch!(self, bp => bp.reset_pool());
    }

    fn proxy_count(&self) -> usize {
        dispatch!(self, bp => bp.proxy_count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cube(x: f64) -> Aabb {
        Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
    }

    fn sorted_pairs(bp: &BroadPhaseDetector) -> Vec<(ProxyHandle, ProxyHandle)> {
        let mut pairs: Vec<_> = bp.pair_cache().pairs().iter().map(|p| p.key()).collect();
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn test_every_algorithm_finds_the_same_pairs() {
        let mut results = Vec::new();
        for algorithm in [
            BroadPhaseAlgorithm::AxisSweep,
            BroadPhaseAlgorithm::Simple,
            BroadPhaseAlgorithm::Dbvt,
        ] {
            let mut config = BroadPhaseConfig::with_algorithm(algorithm);
            // Validate every pair on each pass so stale tree pairs go away at once.
            config.dbvt.cleanup_percent = 100;
            let mut bp = BroadPhaseDetector::new(&config).unwrap();
            assert_eq!(bp.algorithm(), algorithm);
            let handles: Vec<_> = (0..6u32)
                .map(|i| {
                    bp.create_proxy(cube(f64::from(i) * 0.75), ObjectId::new(i.into()), CollisionFilter::default())
                        .unwrap()
                })
                .collect();
            bp.set_aabb(handles[5], cube(50.0)).unwrap();
            bp.destroy_proxy(handles[0]).unwrap();
            bp.calculate_overlapping_pairs();
            assert_eq!(bp.proxy_count(), 5);
            assert_eq!(bp.owner(handles[3]).unwrap(), ObjectId::new(3));
            results.push(sorted_pairs(&bp));
        }
        // 1-2, 2-3, 3-4 remain after 0 is destroyed and 5 is moved away.
        assert_eq!(results[0].len(), 3);
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BroadPhaseConfig::with_algorithm(BroadPhaseAlgorithm::Dbvt);
        config.dbvt.cleanup_percent = 500;
        assert!(BroadPhaseDetector::new(&config).unwrap_err().is_config_error());
    }
}
