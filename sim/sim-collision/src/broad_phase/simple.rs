//! Brute-force broadphase.
//!
//! Tests every pair of proxies on each call to
//! [`calculate_overlapping_pairs`](BroadPhase::calculate_overlapping_pairs).
//! Fine for a few dozen objects and used as the reference the incremental
//! broadphases are checked against.

use nalgebra::Point3;
use tracing::{debug, trace, warn};

use super::{BroadPhase, ProxyInfo};
use crate::aabb::Aabb;
use crate::config::SimpleBroadphaseConfig;
use crate::error::Result;
use crate::filter::CollisionFilter;
use crate::handle::{Arena, ObjectId, ProxyHandle};
use crate::observer::{ObserverSlot, observe};
use crate::pair_cache::{HashedPairCache, PairCache};

#[cfg(debug_assertions)]
use crate::observer::BroadphaseObserver;

/// O(n²) broadphase.
#[derive(Debug)]
pub struct SimpleBroadphase<C: PairCache = HashedPairCache> {
    config: SimpleBroadphaseConfig,
    proxies: Arena<ProxyHandle, ProxyInfo>,
    pair_cache: C,
    observer: ObserverSlot,
    /// Proxy snapshot reused by every pass.
    scratch: Vec<(ProxyHandle, ProxyInfo)>,
}

impl SimpleBroadphase<HashedPairCache> {
    /// Create a broadphase with its own hashed pair cache.
    pub fn new(config: SimpleBroadphaseConfig) -> Result<Self> {
        Self::with_cache(config, HashedPairCache::new())
    }
}

impl<C: PairCache> SimpleBroadphase<C> {
    /// Create a broadphase reporting into `cache`.
    pub fn with_cache(config: SimpleBroadphaseConfig, cache: C) -> Result<Self> {
        config.validate()?;
        debug!(max_proxies = config.max_proxies, "created simple broadphase");
        Ok(Self {
            proxies: Arena::with_limit(config.max_proxies),
            config,
            pair_cache: cache,
            observer: ObserverSlot::default(),
            scratch: Vec::new(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimpleBroadphaseConfig {
        &self.config
    }

    /// Attach an observer for pair events.
    #[cfg(debug_assertions)]
    pub fn set_observer(&mut self, observer: Option<Box<dyn BroadphaseObserver>>) {
        self.observer.set(observer);
    }
}

impl<C: PairCache> BroadPhase for SimpleBroadphase<C> {
    type Cache = C;

    fn create_proxy(
        &mut self,
        aabb: Aabb,
        owner: ObjectId,
        filter: CollisionFilter,
    ) -> Result<ProxyHandle> {
        aabb.validate()?;
        self.proxies
            .insert(ProxyInfo::new(aabb, owner, filter))
            .inspect_err(|e| warn!(error = %e, %owner, "simple broadphase is full"))
    }

    fn destroy_proxy(&mut self, handle: ProxyHandle) -> Result<()> {
        self.proxies.remove(handle)?;
        self.pair_cache.remove_pairs_containing(handle);
        Ok(())
    }

    fn set_aabb(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()> {
        aabb.validate()?;
        self.proxies.get_mut(handle)?.aabb = aabb;
        Ok(())
    }

    fn aabb(&self, handle: ProxyHandle) -> Result<Aabb> {
        Ok(self.proxies.get(handle)?.aabb)
    }

    fn owner(&self, handle: ProxyHandle) -> Result<ObjectId> {
        Ok(self.proxies.get(handle)?.owner)
    }

    fn calculate_overlapping_pairs(&mut self) {
        let immediate = !self.pair_cache.has_deferred_removal();
        let mut snapshot = std::mem::take(&mut self.scratch);
        snapshot.clear();
        snapshot.extend(self.proxies.iter().map(|(h, info)| (h, *info)));

        for (i, (ha, a)) in snapshot.iter().enumerate() {
            for (hb, b) in &snapshot[i + 1..] {
                if a.aabb.overlaps(&b.aabb) {
                    if self.pair_cache.find_pair(*ha, *hb).is_none()
                        && self
                            .pair_cache
                            .add_pair(a.pair_proxy(*ha), b.pair_proxy(*hb))
                    {
                        observe!(self.observer, pair_added(*ha, *hb));
                    }
                } else if immediate && self.pair_cache.remove_pair(*ha, *hb) {
                    observe!(self.observer, pair_removed(*ha, *hb));
                }
            }
        }
        self.scratch = snapshot;

        if !immediate {
            let Self {
                proxies,
                pair_cache,
                observer,
                ..
            } = self;
            let removed = pair_cache.sweep_pairs(&mut |pair| {
                let lost = match (proxies.get(pair.proxy0), proxies.get(pair.proxy1)) {
                    (Ok(a), Ok(b)) => !a.aabb.overlaps(&b.aabb),
                    _ => true,
                };
                if lost {
                    observe!(observer, pair_removed(pair.proxy0, pair.proxy1));
                }
                lost
            });
            trace!(removed, "swept deferred pairs");
        }
    }

    fn pair_cache(&self) -> &C {
        &self.pair_cache
    }

    fn pair_cache_mut(&mut self) -> &mut C {
        &mut self.pair_cache
    }

    fn test_aabb_overlap(&self, a: ProxyHandle, b: ProxyHandle) -> bool {
        match (self.proxies.get(a), self.proxies.get(b)) {
            (Ok(pa), Ok(pb)) => pa.aabb.overlaps(&pb.aabb),
            _ => false,
        }
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ProxyHandle)) {
        for (handle, info) in self.proxies.iter() {
            if info.aabb.overlaps(aabb) {
                callback(handle);
            }
        }
    }

    fn ray_test(&self, _from: Point3<f64>, _to: Point3<f64>, callback: &mut dyn FnMut(ProxyHandle)) {
        for (handle, _) in self.proxies.iter() {
            callback(handle);
        }
    }

    fn broadphase_aabb(&self) -> Aabb {
        self.proxies
            .iter()
            .map(|(_, info)| info.aabb)
            .reduce(|acc, aabb| acc.merged(&aabb))
            .unwrap_or_default()
    }

    fn reset_pool(&mut self) {
        if self.proxies.is_empty() {
            self.proxies.clear();
        }
    }

    fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::pair_cache::SortedPairCache;

    fn cube(x: f64) -> Aabb {
        Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_pairs_follow_aabbs() {
        let mut bp = SimpleBroadphase::new(SimpleBroadphaseConfig::default()).unwrap();
        let f = CollisionFilter::default();
        let a = bp.create_proxy(cube(0.0), ObjectId::new(1), f).unwrap();
        let b = bp.create_proxy(cube(0.5), ObjectId::new(2), f).unwrap();
        let c = bp.create_proxy(cube(1.0), ObjectId::new(3), f).unwrap();

        // Nothing happens until the pass runs.
        assert!(bp.pair_cache().is_empty());
        bp.calculate_overlapping_pairs();
        // a and c touch at x = 1.
        assert_eq!(bp.pair_cache().len(), 3);

        bp.set_aabb(c, cube(9.0)).unwrap();
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.pair_cache().len(), 1);
        assert!(bp.pair_cache_mut().find_pair(a, b).is_some());
        assert_eq!(bp.owner(c).unwrap(), ObjectId::new(3));

        bp.destroy_proxy(a).unwrap();
        assert!(bp.pair_cache().is_empty());
        assert!(!bp.test_aabb_overlap(a, b));
    }

    #[test]
    fn test_deferred_cache() {
        let mut bp =
            SimpleBroadphase::with_cache(SimpleBroadphaseConfig::default(), SortedPairCache::new())
                .unwrap();
        let f = CollisionFilter::default();
        let a = bp.create_proxy(cube(0.0), ObjectId::new(1), f).unwrap();
        bp.create_proxy(cube(0.5), ObjectId::new(2), f).unwrap();
        bp.calculate_overlapping_pairs();
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.pair_cache().len(), 1);

        bp.set_aabb(a, cube(-5.0)).unwrap();
        bp.calculate_overlapping_pairs();
        assert!(bp.pair_cache().is_empty());
    }

    #[test]
    fn test_queries_and_bounds() {
        let mut bp = SimpleBroadphase::new(SimpleBroadphaseConfig { max_proxies: 2 }).unwrap();
        let f = CollisionFilter::default();
        assert_eq!(bp.broadphase_aabb(), Aabb::default());
        let a = bp.create_proxy(cube(0.0), ObjectId::new(1), f).unwrap();
        let b = bp.create_proxy(cube(4.0), ObjectId::new(2), f).unwrap();
        assert!(
            bp.create_proxy(cube(8.0), ObjectId::new(3), f)
                .unwrap_err()
                .is_capacity_exceeded()
        );

        let mut hits = Vec::new();
        bp.aabb_test(&cube(3.5), &mut |h| hits.push(h));
        assert_eq!(hits, vec![b]);

        let mut hits = Vec::new();
        bp.ray_test(Point3::origin(), Point3::new(0.0, 0.0, 1.0), &mut |h| hits.push(h));
        assert_eq!(hits, vec![a, b]);

        let bounds = bp.broadphase_aabb();
        assert_eq!(bounds.min.x, 0.0);
        assert_eq!(bounds.max.x, 5.0);
    }

    #[test]
    fn test_snapshot_buffer_is_reused() {
        let mut bp = SimpleBroadphase::new(SimpleBroadphaseConfig::default()).unwrap();
        let f = CollisionFilter::default();
        for i in 0..8u32 {
            bp.create_proxy(cube(f64::from(i) * 0.5), ObjectId::new(u64::from(i)), f)
                .unwrap();
        }
        bp.calculate_overlapping_pairs();
        let buffer = bp.scratch.as_ptr();
        assert!(bp.scratch.capacity() >= 8);

        let pairs = bp.pair_cache().len();
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.scratch.as_ptr(), buffer);
        assert_eq!(bp.pair_cache().len(), pairs);
    }

    #[test]
    fn test_invalid_aabb_rejected() {
        let mut bp = SimpleBroadphase::new(SimpleBroadphaseConfig::default()).unwrap();
        let inverted = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::origin());
        assert!(
            bp.create_proxy(inverted, ObjectId::default(), CollisionFilter::default())
                .is_err()
        );
        assert_eq!(bp.proxy_count(), 0);
    }
}
