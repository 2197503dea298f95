//! Broadphase built on two dynamic AABB trees.
//!
//! Proxies start in the *dynamic* tree. Every call to
//! [`calculate_overlapping_pairs`](BroadPhase::calculate_overlapping_pairs)
//! advances a rotating stage counter; proxies that have not moved for
//! [`STAGE_COUNT`] passes migrate to the *fixed* tree, where they no longer
//! pay for rebalancing. Moving a fixed proxy brings it back.
//!
//! Small moves that stay inside a proxy's fattened leaf volume cost nothing;
//! larger ones refit the leaf with a margin and a velocity stretch. Pairs
//! are found eagerly on create and move (unless `deferred_collide` is set),
//! while stale pairs are removed by a cleanup pass that validates a bounded
//! slice of the pair array per call.

use nalgebra::{Point3, Vector3};
use tracing::{debug, trace, warn};

use super::{BroadPhase, ProxyInfo};
use crate::aabb::Aabb;
use crate::config::DbvtBroadphaseConfig;
use crate::dbvt::{Dbvt, NodeId};
use crate::error::Result;
use crate::filter::CollisionFilter;
use crate::handle::{Arena, ObjectId, ProxyHandle};
use crate::observer::{ObserverSlot, observe};
use crate::pair_cache::{HashedPairCache, PairCache};

#[cfg(debug_assertions)]
use crate::observer::BroadphaseObserver;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of rotating stages a proxy passes through before it is moved to
/// the fixed tree. Stage `STAGE_COUNT` itself means "in the fixed tree".
pub const STAGE_COUNT: usize = 2;

const DYNAMIC_SET: usize = 0;
const FIXED_SET: usize = 1;

/// Bottom-up threshold used by [`DbvtBroadphase::optimize`].
const TOP_DOWN_BOTTOM_UP_THRESHOLD: usize = 128;

#[derive(Debug, Clone)]
struct DbvtProxy {
    info: ProxyInfo,
    leaf: NodeId,
    stage: usize,
    /// Previous and next slot index in the stage list.
    links: [Option<u32>; 2],
}

impl DbvtProxy {
    const fn set(&self) -> usize {
        if self.stage == STAGE_COUNT {
            FIXED_SET
        } else {
            DYNAMIC_SET
        }
    }
}

/// Refit counters of a [`DbvtBroadphase`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DbvtUpdateStats {
    /// Moves of dynamic proxies (halved every pass).
    pub updates_call: u64,
    /// Moves that actually refit a leaf (halved every pass).
    pub updates_done: u64,
    /// `updates_done / updates_call` at the end of the last pass.
    pub updates_ratio: f64,
    /// Number of completed passes.
    pub pass_id: u64,
}

impl DbvtUpdateStats {
    #[allow(clippy::cast_precision_loss)]
    fn end_pass(&mut self) {
        self.updates_ratio = if self.updates_call > 0 {
            self.updates_done as f64 / self.updates_call as f64
        } else {
            0.0
        };
        self.updates_done /= 2;
        self.updates_call /= 2;
    }
}

// ============================================================================
// Stage lists
// ============================================================================

/// Heads of the doubly linked stage lists, indexed by stage.
#[derive(Debug, Clone, Default)]
struct StageLists {
    heads: [Option<u32>; STAGE_COUNT + 1],
}

impl StageLists {
    /// Prepend slot `index` to the list of `stage`.
    fn append(&mut self, proxies: &mut Arena<ProxyHandle, DbvtProxy>, index: u32, stage: usize) {
        let head = self.heads[stage];
        if let Some(p) = proxies.get_by_index_mut(index) {
            p.links = [None, head];
        }
        if let Some(h) = head.and_then(|h| proxies.get_by_index_mut(h)) {
            h.links[0] = Some(index);
        }
        self.heads[stage] = Some(index);
    }

    /// Unlink slot `index` from the list of `stage`.
    fn remove(&mut self, proxies: &mut Arena<ProxyHandle, DbvtProxy>, index: u32, stage: usize) {
        let Some([prev, next]) = proxies.get_by_index(index).map(|p| p.links) else {
            return;
        };
        match prev.and_then(|i| proxies.get_by_index_mut(i)) {
            Some(p) => p.links[1] = next,
            None => self.heads[stage] = next,
        }
        if let Some(n) = next.and_then(|i| proxies.get_by_index_mut(i)) {
            n.links[0] = prev;
        }
        if let Some(p) = proxies.get_by_index_mut(index) {
            p.links = [None, None];
        }
    }
}

// ============================================================================
// Pair reporting
// ============================================================================

/// Reports leaf/leaf overlaps to the pair cache.
struct TreeCollider<'a, C> {
    proxies: &'a Arena<ProxyHandle, DbvtProxy>,
    cache: &'a mut C,
    observer: &'a mut ObserverSlot,
    new_pairs: &'a mut usize,
}

impl<C: PairCache> TreeCollider<'_, C> {
    fn process(&mut self, a: ProxyHandle, b: ProxyHandle) {
        if a == b {
            return;
        }
        let (Ok(pa), Ok(pb)) = (self.proxies.get(a), self.proxies.get(b)) else {
            return;
        };
        if self
            .cache
            .add_pair(pa.info.pair_proxy(a), pb.info.pair_proxy(b))
        {
            observe!(self.observer, pair_added(a.min(b), a.max(b)));
        }
        *self.new_pairs += 1;
    }
}

// ============================================================================
// DbvtBroadphase
// ============================================================================

/// Broadphase over a dynamic and a fixed AABB tree.
#[derive(Debug)]
pub struct DbvtBroadphase<C: PairCache = HashedPairCache> {
    config: DbvtBroadphaseConfig,
    sets: [Dbvt<ProxyHandle>; 2],
    stages: StageLists,
    proxies: Arena<ProxyHandle, DbvtProxy>,
    pair_cache: C,
    stage_current: usize,
    fixed_left: usize,
    new_pairs: usize,
    cleanup_cursor: usize,
    needs_cleanup: bool,
    stats: DbvtUpdateStats,
    observer: ObserverSlot,
}

impl DbvtBroadphase<HashedPairCache> {
    /// Create a broadphase with its own hashed pair cache.
    pub fn new(config: DbvtBroadphaseConfig) -> Result<Self> {
        Self::with_cache(config, HashedPairCache::new())
    }
}

impl<C: PairCache> DbvtBroadphase<C> {
    /// Create a broadphase reporting into `cache`.
    ///
    /// Pass `&mut cache` to share a cache owned elsewhere.
    pub fn with_cache(config: DbvtBroadphaseConfig, cache: C) -> Result<Self> {
        config.validate()?;
        let proxies = match config.max_proxies {
            Some(limit) => Arena::with_limit(limit),
            None => Arena::new(),
        };
        debug!(
            margin = config.margin,
            prediction = config.prediction,
            deferred = config.deferred_collide,
            "created DBVT broadphase"
        );
        Ok(Self {
            config,
            sets: [Dbvt::new(), Dbvt::new()],
            stages: StageLists::default(),
            proxies,
            pair_cache: cache,
            stage_current: 0,
            fixed_left: 0,
            new_pairs: 1,
            cleanup_cursor: 0,
            needs_cleanup: true,
            stats: DbvtUpdateStats::default(),
            observer: ObserverSlot::default(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DbvtBroadphaseConfig {
        &self.config
    }

    /// Refit counters.
    #[must_use]
    pub fn update_stats(&self) -> DbvtUpdateStats {
        self.stats
    }

    /// Tree holding recently created or moved proxies.
    #[must_use]
    pub fn dynamic_tree(&self) -> &Dbvt<ProxyHandle> {
        &self.sets[DYNAMIC_SET]
    }

    /// Tree holding proxies that have been still for a while.
    #[must_use]
    pub fn fixed_tree(&self) -> &Dbvt<ProxyHandle> {
        &self.sets[FIXED_SET]
    }

    /// Stage of a proxy; [`STAGE_COUNT`] means it lives in the fixed tree.
    pub fn stage(&self, handle: ProxyHandle) -> Result<usize> {
        Ok(self.proxies.get(handle)?.stage)
    }

    /// Volume of the tree leaf standing for a proxy. Always contains the
    /// proxy's AABB.
    pub fn leaf_volume(&self, handle: ProxyHandle) -> Result<Aabb> {
        let proxy = self.proxies.get(handle)?;
        Ok(self.sets[proxy.set()]
            .volume(proxy.leaf)
            .unwrap_or(proxy.info.aabb))
    }

    /// Attach an observer for pair and staging events.
    #[cfg(debug_assertions)]
    pub fn set_observer(&mut self, observer: Option<Box<dyn BroadphaseObserver>>) {
        self.observer.set(observer);
    }

    /// Rebuild both trees top-down.
    pub fn optimize(&mut self) {
        for set in &mut self.sets {
            set.optimize_top_down(TOP_DOWN_BOTTOM_UP_THRESHOLD);
        }
    }

    /// Move a proxy and refit its leaf exactly, skipping the lazy path.
    pub fn set_aabb_force_update(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()> {
        aabb.validate()?;
        let proxy = self.proxies.get(handle)?;
        let (leaf, stage) = (proxy.leaf, proxy.stage);

        let leaf = if stage == STAGE_COUNT {
            self.sets[FIXED_SET].remove(leaf);
            self.sets[DYNAMIC_SET].insert(aabb, handle)
        } else {
            self.stats.updates_call += 1;
            self.sets[DYNAMIC_SET].update_volume(leaf, aabb);
            self.stats.updates_done += 1;
            leaf
        };
        self.restage(handle, leaf, aabb);
        self.after_move(handle, leaf);
        Ok(())
    }

    /// Put a moved proxy into the current stage with its new bounds.
    fn restage(&mut self, handle: ProxyHandle, leaf: NodeId, aabb: Aabb) {
        let index = handle.index();
        let old_stage = self.proxies.get(handle).map_or(self.stage_current, |p| p.stage);
        self.stages.remove(&mut self.proxies, index, old_stage);
        if let Ok(proxy) = self.proxies.get_mut(handle) {
            proxy.info.aabb = aabb;
            proxy.leaf = leaf;
            proxy.stage = self.stage_current;
        }
        self.stages
            .append(&mut self.proxies, index, self.stage_current);
        observe!(self.observer, proxy_staged(handle, self.stage_current));
    }

    /// Collide a freshly refit leaf against both trees.
    fn after_move(&mut self, handle: ProxyHandle, leaf: NodeId) {
        self.needs_cleanup = true;
        if self.config.deferred_collide {
            return;
        }
        let [dynamic, fixed] = &self.sets;
        let mut collider = TreeCollider {
            proxies: &self.proxies,
            cache: &mut self.pair_cache,
            observer: &mut self.observer,
            new_pairs: &mut self.new_pairs,
        };
        fixed.collide_tree_tree(fixed.root(), dynamic, Some(leaf), |a, b| {
            collider.process(a, b);
        });
        dynamic.collide_tree_tree(dynamic.root(), dynamic, Some(leaf), |a, b| {
            collider.process(a, b);
        });
        trace!(%handle, "collided moved proxy");
    }

    fn leaves_intersect(&self, a: ProxyHandle, b: ProxyHandle) -> bool {
        match (self.leaf_volume(a), self.leaf_volume(b)) {
            (Ok(va), Ok(vb)) => va.overlaps(&vb),
            _ => false,
        }
    }

    /// One incremental pass: optimize, migrate a stage, collide (when
    /// deferred), then validate a slice of the pair array.
    pub fn collide(&mut self) {
        let dynamic_passes =
            1 + self.sets[DYNAMIC_SET].leaves() * self.config.dynamic_update_percent / 100;
        self.sets[DYNAMIC_SET].optimize_incremental(dynamic_passes);
        if self.fixed_left > 0 {
            let count = 1 + self.sets[FIXED_SET].leaves() * self.config.fixed_update_percent / 100;
            self.sets[FIXED_SET].optimize_incremental(count);
            self.fixed_left = self.fixed_left.saturating_sub(count);
        }

        self.stage_current = (self.stage_current + 1) % STAGE_COUNT;
        self.migrate_stage(self.stage_current);

        if self.config.deferred_collide {
            let [dynamic, fixed] = &self.sets;
            let mut collider = TreeCollider {
                proxies: &self.proxies,
                cache: &mut self.pair_cache,
                observer: &mut self.observer,
                new_pairs: &mut self.new_pairs,
            };
            dynamic.collide_tree_tree(dynamic.root(), fixed, fixed.root(), |a, b| {
                collider.process(a, b);
            });
            dynamic.collide_tree_tree(dynamic.root(), dynamic, dynamic.root(), |a, b| {
                collider.process(a, b);
            });
        }

        if self.needs_cleanup {
            self.cleanup_pairs();
        }

        self.stats.pass_id += 1;
        self.new_pairs = 1;
        self.needs_cleanup = false;
        self.stats.end_pass();

        debug_assert_eq!(
            self.sets[DYNAMIC_SET].leaves() + self.sets[FIXED_SET].leaves(),
            self.proxies.len(),
            "every proxy lives in exactly one tree"
        );
        trace!(
            pass = self.stats.pass_id,
            dynamic = self.sets[DYNAMIC_SET].leaves(),
            fixed = self.sets[FIXED_SET].leaves(),
            pairs = self.pair_cache.len(),
            "DBVT pass complete"
        );
    }

    /// Move every proxy of `stage` into the fixed tree.
    fn migrate_stage(&mut self, stage: usize) {
        let mut cursor = self.stages.heads[stage];
        if cursor.is_none() {
            return;
        }
        while let Some(index) = cursor {
            let Some(proxy) = self.proxies.get_by_index(index) else {
                break;
            };
            let (next, leaf, aabb) = (proxy.links[1], proxy.leaf, proxy.info.aabb);
            let Some(handle) = self.proxies.key_at(index) else {
                break;
            };

            self.stages.remove(&mut self.proxies, index, stage);
            self.stages.append(&mut self.proxies, index, STAGE_COUNT);
            self.sets[DYNAMIC_SET].remove(leaf);
            let leaf = self.sets[FIXED_SET].insert(aabb, handle);
            if let Some(proxy) = self.proxies.get_by_index_mut(index) {
                proxy.leaf = leaf;
                proxy.stage = STAGE_COUNT;
            }
            observe!(self.observer, proxy_staged(handle, STAGE_COUNT));
            cursor = next;
        }
        self.fixed_left = self.sets[FIXED_SET].leaves();
        self.needs_cleanup = true;
    }

    /// Remove pairs whose leaf volumes no longer touch, looking at a
    /// bounded window of the pair array that rotates between passes.
    fn cleanup_pairs(&mut self) {
        let count = self.pair_cache.len();
        if count == 0 {
            return;
        }
        let mut budget = count.min(
            self.new_pairs
                .max(count * self.config.cleanup_percent / 100),
        );
        let mut i = 0;
        while i < budget {
            let len = self.pair_cache.len();
            if len == 0 {
                break;
            }
            let pair = self.pair_cache.pairs()[(self.cleanup_cursor + i) % len];
            if !self.leaves_intersect(pair.proxy0, pair.proxy1)
                && self.pair_cache.remove_pair(pair.proxy0, pair.proxy1)
            {
                observe!(self.observer, pair_removed(pair.proxy0, pair.proxy1));
                budget -= 1;
            } else {
                i += 1;
            }
        }
        let len = self.pair_cache.len();
        self.cleanup_cursor = if len > 0 {
            (self.cleanup_cursor + budget) % len
        } else {
            0
        };
    }
}

impl<C: PairCache> BroadPhase for DbvtBroadphase<C> {
    type Cache = C;

    fn create_proxy(
        &mut self,
        aabb: Aabb,
        owner: ObjectId,
        filter: CollisionFilter,
    ) -> Result<ProxyHandle> {
        aabb.validate()?;
        let stage = self.stage_current;
        let handle = self
            .proxies
            .insert(DbvtProxy {
                info: ProxyInfo::new(aabb, owner, filter),
                // Replaced below once the leaf exists.
                leaf: NodeId::default(),
                stage,
                links: [None, None],
            })
            .inspect_err(|e| warn!(error = %e, %owner, "DBVT broadphase is full"))?;

        let leaf = self.sets[DYNAMIC_SET].insert(aabb, handle);
        if let Ok(proxy) = self.proxies.get_mut(handle) {
            proxy.leaf = leaf;
        }
        self.stages
            .append(&mut self.proxies, handle.index(), stage);
        observe!(self.observer, proxy_staged(handle, stage));

        if !self.config.deferred_collide {
            let [dynamic, fixed] = &self.sets;
            let mut collider = TreeCollider {
                proxies: &self.proxies,
                cache: &mut self.pair_cache,
                observer: &mut self.observer,
                new_pairs: &mut self.new_pairs,
            };
            for tree in [dynamic, fixed] {
                tree.collide_tree_volume(tree.root(), &aabb, |other| {
                    collider.process(other, handle);
                });
            }
        }
        Ok(handle)
    }

    fn destroy_proxy(&mut self, handle: ProxyHandle) -> Result<()> {
        let proxy = self.proxies.get(handle)?;
        let (leaf, set, stage) = (proxy.leaf, proxy.set(), proxy.stage);
        self.sets[set].remove(leaf);
        self.stages.remove(&mut self.proxies, handle.index(), stage);
        self.pair_cache.remove_pairs_containing(handle);
        self.proxies.remove(handle)?;
        self.needs_cleanup = true;
        Ok(())
    }

    fn set_aabb(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()> {
        aabb.validate()?;
        let proxy = self.proxies.get(handle)?;
        let (leaf, stage, old) = (proxy.leaf, proxy.stage, proxy.info.aabb);

        let (leaf, moved) = if stage == STAGE_COUNT {
            self.sets[FIXED_SET].remove(leaf);
            (self.sets[DYNAMIC_SET].insert(aabb, handle), true)
        } else {
            self.stats.updates_call += 1;
            let volume = self.sets[DYNAMIC_SET].volume(leaf).unwrap_or(old);
            let refit = if volume.overlaps(&aabb) {
                let delta = aabb.min - old.min;
                let mut velocity: Vector3<f64> = old.half_extents() * self.config.prediction;
                for axis in 0..3 {
                    if delta[axis] < 0.0 {
                        velocity[axis] = -velocity[axis];
                    }
                }
                self.sets[DYNAMIC_SET].update_with_velocity(leaf, aabb, &velocity, self.config.margin)
            } else {
                self.sets[DYNAMIC_SET].update_volume(leaf, aabb);
                true
            };
            if refit {
                self.stats.updates_done += 1;
            }
            (leaf, refit)
        };

        self.restage(handle, leaf, aabb);
        if moved {
            self.after_move(handle, leaf);
        }
        Ok(())
    }

    fn aabb(&self, handle: ProxyHandle) -> Result<Aabb> {
        Ok(self.proxies.get(handle)?.info.aabb)
    }

    fn owner(&self, handle: ProxyHandle) -> Result<ObjectId> {
        Ok(self.proxies.get(handle)?.info.owner)
    }

    fn calculate_overlapping_pairs(&mut self) {
        self.collide();
        if self.pair_cache.has_deferred_removal() {
            let Self {
                sets,
                proxies,
                pair_cache,
                observer,
                ..
            } = self;
            let leaf = |h: ProxyHandle| {
                proxies
                    .get(h)
                    .ok()
                    .and_then(|p| sets[p.set()].volume(p.leaf))
            };
            let removed = pair_cache.sweep_pairs(&mut |pair| {
                let lost = match (leaf(pair.proxy0), leaf(pair.proxy1)) {
                    (Some(a), Some(b)) => !a.overlaps(&b),
                    _ => true,
                };
                if lost {
                    observe!(observer, pair_removed(pair.proxy0, pair.proxy1));
                }
                lost
            });
            if removed > 0 {
                trace!(removed, "swept deferred pairs");
            }
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
            (Ok(pa), Ok(pb)) => pa.info.aabb.overlaps(&pb.info.aabb),
            _ => false,
        }
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ProxyHandle)) {
        for set in &self.sets {
            set.collide_tree_volume(set.root(), aabb, &mut *callback);
        }
    }

    fn ray_test(&self, from: Point3<f64>, to: Point3<f64>, callback: &mut dyn FnMut(ProxyHandle)) {
        for set in &self.sets {
            set.ray_test(from, to, &mut *callback);
        }
    }

    fn broadphase_aabb(&self) -> Aabb {
        match (
            self.sets[DYNAMIC_SET].root_volume(),
            self.sets[FIXED_SET].root_volume(),
        ) {
            (Some(a), Some(b)) => a.merged(&b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => Aabb::default(),
        }
    }

    fn reset_pool(&mut self) {
        if !self.proxies.is_empty() {
            return;
        }
        for set in &mut self.sets {
            set.clear();
        }
        self.proxies.clear();
        self.stages = StageLists::default();
        self.stage_current = 0;
        self.fixed_left = 0;
        self.new_pairs = 1;
        self.cleanup_cursor = 0;
        self.needs_cleanup = true;
        self.stats = DbvtUpdateStats::default();
    }

    fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::pair_cache::SortedPairCache;

    fn cube(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    fn add(bp: &mut DbvtBroadphase<impl PairCache>, aabb: Aabb) -> ProxyHandle {
        bp.create_proxy(aabb, ObjectId::default(), CollisionFilter::default())
            .unwrap()
    }

    fn eager() -> DbvtBroadphaseConfig {
        DbvtBroadphaseConfig {
            cleanup_percent: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_pairs_found_on_create() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        let b = add(&mut bp, cube(0.5, 0.5, 0.5));
        let _c = add(&mut bp, cube(10.0, 0.0, 0.0));
        assert_eq!(bp.pair_cache().len(), 1);
        assert!(bp.pair_cache_mut().find_pair(a, b).is_some());
    }

    #[test]
    fn test_deferred_collide_waits_for_calculate() {
        let mut bp = DbvtBroadphase::new(eager().deferred()).unwrap();
        add(&mut bp, cube(0.0, 0.0, 0.0));
        add(&mut bp, cube(0.5, 0.0, 0.0));
        assert!(bp.pair_cache().is_empty());
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.pair_cache().len(), 1);
    }

    #[test]
    fn test_proxies_migrate_to_fixed_tree_and_back() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        assert_eq!(bp.stage(a).unwrap(), 0);

        for _ in 0..STAGE_COUNT {
            bp.calculate_overlapping_pairs();
        }
        assert_eq!(bp.stage(a).unwrap(), STAGE_COUNT);
        assert_eq!(bp.fixed_tree().leaves(), 1);
        assert_eq!(bp.dynamic_tree().leaves(), 0);

        bp.set_aabb(a, cube(0.2, 0.0, 0.0)).unwrap();
        assert_ne!(bp.stage(a).unwrap(), STAGE_COUNT);
        assert_eq!(bp.fixed_tree().leaves(), 0);
        assert_eq!(bp.dynamic_tree().leaves(), 1);
    }

    #[test]
    fn test_small_moves_stay_inside_fattened_leaf() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));

        // Leaves start exact; the first move fattens by the margin.
        bp.set_aabb(a, cube(0.01, 0.0, 0.0)).unwrap();
        assert_eq!(bp.stats.updates_done, 1);
        let fat = bp.leaf_volume(a).unwrap();
        assert!(fat.contains(&cube(0.01, 0.0, 0.0)));

        bp.set_aabb(a, cube(0.02, 0.0, 0.0)).unwrap();
        assert_eq!(bp.stats.updates_done, 1);
        assert_eq!(bp.stats.updates_call, 2);
        assert_eq!(bp.leaf_volume(a).unwrap(), fat);

        bp.calculate_overlapping_pairs();
        let stats = bp.update_stats();
        assert_eq!(stats.updates_ratio, 0.5);
        assert_eq!(stats.updates_call, 1);
        assert_eq!(stats.pass_id, 1);
    }

    #[test]
    fn test_refit_is_sound() {
        let mut bp = DbvtBroadphase::new(DbvtBroadphaseConfig::default().prediction(0.5)).unwrap();
        let handles: Vec<_> = (0..20)
            .map(|i| add(&mut bp, cube(i as f64 * 0.7, 0.0, 0.0)))
            .collect();
        for step in 0..10 {
            for (i, &h) in handles.iter().enumerate() {
                let target = cube(i as f64 * 0.7 + step as f64 * 0.3, (i % 3) as f64, 0.0);
                bp.set_aabb(h, target).unwrap();
                assert!(bp.leaf_volume(h).unwrap().contains(&target));

                let mut found = false;
                bp.aabb_test(&target, &mut |p| found |= p == h);
                assert!(found, "proxy missing from its own AABB query");
            }
            bp.calculate_overlapping_pairs();
        }
    }

    #[test]
    fn test_cleanup_removes_separated_pairs() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        let b = add(&mut bp, cube(0.5, 0.0, 0.0));
        assert_eq!(bp.pair_cache().len(), 1);

        bp.set_aabb(b, cube(30.0, 0.0, 0.0)).unwrap();
        assert_eq!(bp.pair_cache().len(), 1);
        bp.calculate_overlapping_pairs();
        assert!(bp.pair_cache().is_empty());
        assert!(!bp.test_aabb_overlap(a, b));
    }

    #[test]
    fn test_bounded_cleanup_takes_several_passes() {
        let config = DbvtBroadphaseConfig {
            cleanup_percent: 0,
            ..Default::default()
        };
        let mut bp = DbvtBroadphase::new(config).unwrap();
        for i in 0..4 {
            add(&mut bp, cube(f64::from(i) * 10.0, 0.0, 0.0));
        }
        let movers: Vec<_> = (0..4)
            .map(|i| add(&mut bp, cube(f64::from(i) * 10.0 + 0.5, 0.0, 0.0)))
            .collect();
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.pair_cache().len(), 4);

        // Separate every pair without creating new ones.
        for (i, &m) in movers.iter().enumerate() {
            bp.set_aabb(m, cube(i as f64 * 10.0 + 0.5, 50.0, 0.0)).unwrap();
        }
        bp.calculate_overlapping_pairs();
        assert_eq!(bp.pair_cache().len(), 3);

        for step in 1..=3 {
            bp.set_aabb(movers[0], cube(0.5, 50.0 + f64::from(step) * 5.0, 0.0))
                .unwrap();
            bp.calculate_overlapping_pairs();
            assert_eq!(bp.pair_cache().len(), 3 - step as usize);
        }
    }

    #[test]
    fn test_destroy_and_stale_handles() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        let b = add(&mut bp, cube(0.5, 0.0, 0.0));
        bp.destroy_proxy(a).unwrap();
        assert!(bp.pair_cache().is_empty());
        assert!(bp.destroy_proxy(a).unwrap_err().is_stale_handle());
        assert!(bp.set_aabb(a, cube(0.0, 0.0, 0.0)).is_err());
        assert!(!bp.test_aabb_overlap(a, b));

        let c = add(&mut bp, cube(0.0, 0.0, 0.0));
        assert_eq!(c.index(), a.index());
        assert!(bp.aabb(a).is_err());
        assert_eq!(bp.proxy_count(), 2);
    }

    #[test]
    fn test_capacity_limit() {
        let mut bp = DbvtBroadphase::new(DbvtBroadphaseConfig::default().max_proxies(2)).unwrap();
        add(&mut bp, cube(0.0, 0.0, 0.0));
        add(&mut bp, cube(5.0, 0.0, 0.0));
        let err = bp
            .create_proxy(cube(9.0, 0.0, 0.0), ObjectId::default(), CollisionFilter::default())
            .unwrap_err();
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn test_sorted_cache_is_swept() {
        let mut cache = SortedPairCache::new();
        {
            let mut bp = DbvtBroadphase::with_cache(eager(), &mut cache).unwrap();
            let a = add(&mut bp, cube(0.0, 0.0, 0.0));
            let b = add(&mut bp, cube(0.5, 0.0, 0.0));
            // Moving b re-reports the pair; the sorted cache keeps both copies.
            bp.set_aabb(b, cube(0.6, 0.0, 0.0)).unwrap();
            bp.set_aabb(a, cube(0.1, 0.0, 0.0)).unwrap();
            assert!(bp.pair_cache().len() >= 2);
            bp.calculate_overlapping_pairs();
            assert_eq!(bp.pair_cache().len(), 1);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_queries_and_bounds() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        let b = add(&mut bp, cube(5.0, 0.0, 0.0));
        for _ in 0..STAGE_COUNT {
            bp.calculate_overlapping_pairs();
        }
        let c = add(&mut bp, cube(10.0, 0.0, 0.0));

        let mut hits = Vec::new();
        bp.ray_test(Point3::new(-1.0, 0.5, 0.5), Point3::new(20.0, 0.5, 0.5), &mut |h| hits.push(h));
        hits.sort_unstable();
        assert_eq!(hits, vec![a, b, c]);

        let mut hits = Vec::new();
        bp.aabb_test(&cube(4.5, 0.0, 0.0), &mut |h| hits.push(h));
        assert_eq!(hits, vec![b]);

        let bounds = bp.broadphase_aabb();
        assert_eq!(bounds.min.x, 0.0);
        assert_eq!(bounds.max.x, 11.0);

        bp.optimize();
        let mut hits = Vec::new();
        bp.aabb_test(&cube(9.5, 0.0, 0.0), &mut |h| hits.push(h));
        assert_eq!(hits, vec![c]);
    }

    #[test]
    fn test_reset_pool_only_when_empty() {
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        bp.calculate_overlapping_pairs();
        bp.reset_pool();
        assert_eq!(bp.proxy_count(), 1);

        bp.destroy_proxy(a).unwrap();
        bp.reset_pool();
        assert_eq!(bp.update_stats(), DbvtUpdateStats::default());
        let b = add(&mut bp, cube(0.0, 0.0, 0.0));
        assert_eq!(b.index(), 0);
        assert!(bp.aabb(a).is_err());
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_observer_sees_staging() {
        use crate::observer::{ObservedEvent, RecordingObserver};

        let recorder = RecordingObserver::default();
        let mut bp = DbvtBroadphase::new(eager()).unwrap();
        bp.set_observer(Some(Box::new(recorder.clone())));
        let a = add(&mut bp, cube(0.0, 0.0, 0.0));
        let b = add(&mut bp, cube(0.5, 0.0, 0.0));
        for _ in 0..STAGE_COUNT {
            bp.calculate_overlapping_pairs();
        }

        let events = recorder.events.borrow();
        assert!(events.contains(&ObservedEvent::PairAdded(a, b)));
        assert!(events.contains(&ObservedEvent::ProxyStaged(a, STAGE_COUNT)));
    }
}
