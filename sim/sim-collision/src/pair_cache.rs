//! Overlapping pair caches.
//!
//! Broadphases report pair add/remove events into a [`PairCache`]; the
//! narrow phase reads the pair array back and hangs its per-pair state off
//! each pair's `algorithm` slot.
//!
//! Three caches are provided:
//!
//! - [`HashedPairCache`]: hash index over a dense array. Adds are idempotent
//!   and removals happen immediately.
//! - [`SortedPairCache`]: a plain array that accepts duplicates and defers
//!   removal. The broadphase reconciles it in `calculate_overlapping_pairs`
//!   with [`PairCache::sweep_pairs`].
//! - [`NullPairCache`]: drops everything. Used where a broadphase only
//!   answers queries.
//!
//! Narrow-phase slots freed by the cache are queued and handed back through
//! [`PairCache::take_released_algorithms`].

use hashbrown::HashMap;

use crate::filter::CollisionFilter;
use crate::handle::{AlgorithmId, ProxyHandle};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A proxy as seen by the pair filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairProxy {
    /// Handle of the proxy.
    pub handle: ProxyHandle,
    /// Filter of the proxy.
    pub filter: CollisionFilter,
}

impl PairProxy {
    /// Create a pair proxy.
    #[must_use]
    pub const fn new(handle: ProxyHandle, filter: CollisionFilter) -> Self {
        Self { handle, filter }
    }
}

/// Two proxies whose bounds overlap, in canonical order (`proxy0 < proxy1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OverlappingPair {
    /// Smaller handle.
    pub proxy0: ProxyHandle,
    /// Larger handle.
    pub proxy1: ProxyHandle,
    /// Narrow-phase state attached by the dispatcher.
    pub algorithm: Option<AlgorithmId>,
}

impl OverlappingPair {
    /// Create a pair, ordering the handles.
    #[must_use]
    pub fn new(a: ProxyHandle, b: ProxyHandle) -> Self {
        let (proxy0, proxy1) = canonical(a, b);
        Self {
            proxy0,
            proxy1,
            algorithm: None,
        }
    }

    /// Ordered handles of this pair.
    #[must_use]
    pub const fn key(&self) -> (ProxyHandle, ProxyHandle) {
        (self.proxy0, self.proxy1)
    }

    /// Whether `proxy` is one of the two members.
    #[must_use]
    pub fn contains(&self, proxy: ProxyHandle) -> bool {
        self.proxy0 == proxy || self.proxy1 == proxy
    }
}

/// Narrow-phase slots of a cache's pairs, yielded with their (read-only)
/// handles.
#[derive(Debug)]
pub struct AlgorithmSlots<'a> {
    pairs: std::slice::IterMut<'a, OverlappingPair>,
}

impl<'a> AlgorithmSlots<'a> {
    fn new(pairs: &'a mut [OverlappingPair]) -> Self {
        Self {
            pairs: pairs.iter_mut(),
        }
    }
}

impl<'a> Iterator for AlgorithmSlots<'a> {
    type Item = (ProxyHandle, ProxyHandle, &'a mut Option<AlgorithmId>);

    fn next(&mut self) -> Option<Self::Item> {
        self.pairs
            .next()
            .map(|pair| (pair.proxy0, pair.proxy1, &mut pair.algorithm))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pairs.size_hint()
    }
}

impl ExactSizeIterator for AlgorithmSlots<'_> {}

/// Order two handles.
#[must_use]
pub fn canonical(a: ProxyHandle, b: ProxyHandle) -> (ProxyHandle, ProxyHandle) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Counters kept by every cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairCacheStats {
    /// Pairs inserted.
    pub added: u64,
    /// Pairs removed.
    pub removed: u64,
    /// Calls to `find_pair`.
    pub find_calls: u64,
}

/// User callback that replaces the group/mask test.
pub type OverlapFilterCallback = Box<dyn Fn(&PairProxy, &PairProxy) -> bool>;

/// Group/mask test with an optional user override.
#[derive(Default)]
struct OverlapFilter {
    callback: Option<OverlapFilterCallback>,
}

impl OverlapFilter {
    fn accepts(&self, a: &PairProxy, b: &PairProxy) -> bool {
        match &self.callback {
            Some(callback) => callback(a, b),
            None => a.filter.can_collide_with(&b.filter),
        }
    }
}

impl std::fmt::Debug for OverlapFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapFilter")
            .field("custom", &self.callback.is_some())
            .finish()
    }
}

/// Store of candidate pairs shared by every broadphase.
pub trait PairCache {
    /// Insert the pair `(a, b)` if the filter accepts it.
    ///
    /// Returns `true` when the cache now holds a new entry.
    fn add_pair(&mut self, a: PairProxy, b: PairProxy) -> bool;

    /// Remove the pair `(a, b)`, releasing its narrow-phase slot.
    ///
    /// Returns `true` if an entry was removed.
    fn remove_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> bool;

    /// Remove every pair that contains `proxy`.
    fn remove_pairs_containing(&mut self, proxy: ProxyHandle);

    /// Look up the pair `(a, b)`.
    fn find_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> Option<&OverlappingPair>;

    /// Current pairs, in unspecified order.
    fn pairs(&self) -> &[OverlappingPair];

    /// Narrow-phase slot of every pair, in [`PairCache::pairs`] order.
    fn algorithm_slots(&mut self) -> AlgorithmSlots<'_>;

    /// Whether removals are deferred to [`PairCache::sweep_pairs`].
    fn has_deferred_removal(&self) -> bool;

    /// Release the narrow-phase slot of the pair at `index`.
    fn clean_pair(&mut self, index: usize);

    /// Release the narrow-phase slots of every pair containing `proxy`,
    /// keeping the pairs themselves.
    fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle);

    /// Sort the pairs, then drop adjacent duplicates and every pair for
    /// which `overlap_lost` returns `true`.
    ///
    /// Returns the number of pairs removed.
    fn sweep_pairs(&mut self, overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool) -> usize;

    /// Drain the narrow-phase slots released since the last call.
    fn take_released_algorithms(&mut self) -> Vec<AlgorithmId>;

    /// Cache counters.
    fn stats(&self) -> PairCacheStats;

    /// Number of pairs.
    fn len(&self) -> usize {
        self.pairs().len()
    }

    /// Whether the cache holds no pairs.
    fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }
}

impl<C: PairCache + ?Sized> PairCache for &mut C {
    fn add_pair(&mut self, a: PairProxy, b: PairProxy) -> bool {
        (**self).add_pair(a, b)
    }

    fn remove_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> bool {
        (**self).remove_pair(a, b)
    }

    fn remove_pairs_containing(&mut self, proxy: ProxyHandle) {
        (**self).remove_pairs_containing(proxy);
    }

    fn find_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> Option<&OverlappingPair> {
        (**self).find_pair(a, b)
    }

    fn pairs(&self) -> &[OverlappingPair] {
        (**self).pairs()
    }

    fn algorithm_slots(&mut self) -> AlgorithmSlots<'_> {
        (**self).algorithm_slots()
    }

    fn has_deferred_removal(&self) -> bool {
        (**self).has_deferred_removal()
    }

    fn clean_pair(&mut self, index: usize) {
        (**self).clean_pair(index);
    }

    fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle) {
        (**self).clean_proxy_from_pairs(proxy);
    }

    fn sweep_pairs(&mut self, overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool) -> usize {
        (**self).sweep_pairs(overlap_lost)
    }

    fn take_released_algorithms(&mut self) -> Vec<AlgorithmId> {
        (**self).take_released_algorithms()
    }

    fn stats(&self) -> PairCacheStats {
        (**self).stats()
    }
}

// ============================================================================
// Shared array helpers
// ============================================================================

fn release(pair: &mut OverlappingPair, released: &mut Vec<AlgorithmId>) {
    if let Some(id) = pair.algorithm.take() {
        released.push(id);
    }
}

/// Sort, then drop duplicates and lost pairs. Pairs carrying narrow-phase
/// state sort ahead of their duplicates, so the survivor keeps the state.
fn sweep_vec(
    pairs: &mut Vec<OverlappingPair>,
    released: &mut Vec<AlgorithmId>,
    overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool,
) -> usize {
    pairs.sort_by_key(|p| (p.proxy0, p.proxy1, p.algorithm.is_none()));

    let before = pairs.len();
    let mut previous: Option<(ProxyHandle, ProxyHandle)> = None;
    pairs.retain_mut(|pair| {
        let duplicate = previous == Some(pair.key());
        previous = Some(pair.key());
        let remove = if duplicate {
            debug_assert!(
                pair.algorithm.is_none(),
                "duplicate pair {} / {} carries narrow-phase state",
                pair.proxy0,
                pair.proxy1
            );
            true
        } else {
            overlap_lost(pair)
        };
        if remove {
            release(pair, released);
        }
        !remove
    });
    before - pairs.len()
}

// ============================================================================
// HashedPairCache
// ============================================================================

/// Hash-indexed pair cache with immediate removal.
#[derive(Debug, Default)]
pub struct HashedPairCache {
    pairs: Vec<OverlappingPair>,
    index: HashMap<(ProxyHandle, ProxyHandle), usize>,
    released: Vec<AlgorithmId>,
    filter: OverlapFilter,
    stats: PairCacheStats,
}

impl HashedPairCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the group/mask test with a user callback.
    #[must_use]
    pub fn with_overlap_filter(mut self, callback: OverlapFilterCallback) -> Self {
        self.filter.callback = Some(callback);
        self
    }

    /// Install or clear the overlap filter callback.
    pub fn set_overlap_filter(&mut self, callback: Option<OverlapFilterCallback>) {
        self.filter.callback = callback;
    }

    fn swap_remove_at(&mut self, idx: usize) {
        let mut pair = self.pairs.swap_remove(idx);
        self.index.remove(&pair.key());
        if let Some(moved) = self.pairs.get(idx) {
            self.index.insert(moved.key(), idx);
        }
        release(&mut pair, &mut self.released);
        self.stats.removed += 1;
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, pair) in self.pairs.iter().enumerate() {
            self.index.insert(pair.key(), i);
        }
    }
}

impl PairCache for HashedPairCache {
    fn add_pair(&mut self, a: PairProxy, b: PairProxy) -> bool {
        if !self.filter.accepts(&a, &b) {
            return false;
        }
        let pair = OverlappingPair::new(a.handle, b.handle);
        if self.index.contains_key(&pair.key()) {
            return false;
        }
        self.index.insert(pair.key(), self.pairs.len());
        self.pairs.push(pair);
        self.stats.added += 1;
        true
    }

    fn remove_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> bool {
        match self.index.get(&canonical(a, b)) {
            Some(&idx) => {
                self.swap_remove_at(idx);
                true
            }
            None => false,
        }
    }

    fn remove_pairs_containing(&mut self, proxy: ProxyHandle) {
        let mut i = 0;
        while i < self.pairs.len() {
            if self.pairs[i].contains(proxy) {
                self.swap_remove_at(i);
            } else {
                i += 1;
            }
        }
    }

    fn find_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> Option<&OverlappingPair> {
        self.stats.find_calls += 1;
        let idx = *self.index.get(&canonical(a, b))?;
        self.pairs.get(idx)
    }

    fn pairs(&self) -> &[OverlappingPair] {
        &self.pairs
    }

    fn algorithm_slots(&mut self) -> AlgorithmSlots<'_> {
        AlgorithmSlots::new(&mut self.pairs)
    }

    fn has_deferred_removal(&self) -> bool {
        false
    }

    fn clean_pair(&mut self, index: usize) {
        if let Some(pair) = self.pairs.get_mut(index) {
            release(pair, &mut self.released);
        }
    }

    fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle) {
        for pair in self.pairs.iter_mut().filter(|p| p.contains(proxy)) {
            release(pair, &mut self.released);
        }
    }

    fn sweep_pairs(&mut self, overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool) -> usize {
        let removed = sweep_vec(&mut self.pairs, &mut self.released, overlap_lost);
        self.stats.removed += removed as u64;
        self.rebuild_index();
        removed
    }

    fn take_released_algorithms(&mut self) -> Vec<AlgorithmId> {
        std::mem::take(&mut self.released)
    }

    fn stats(&self) -> PairCacheStats {
        self.stats
    }
}

// ============================================================================
// SortedPairCache
// ============================================================================

/// Array-backed pair cache that tolerates duplicates and, by default,
/// defers removal to a sweep.
#[derive(Debug)]
pub struct SortedPairCache {
    pairs: Vec<OverlappingPair>,
    released: Vec<AlgorithmId>,
    deferred_removal: bool,
    filter: OverlapFilter,
    stats: PairCacheStats,
}

impl Default for SortedPairCache {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            released: Vec::new(),
            deferred_removal: true,
            filter: OverlapFilter::default(),
            stats: PairCacheStats::default(),
        }
    }
}

impl SortedPairCache {
    /// Create an empty cache with deferred removal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache that removes pairs immediately.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            deferred_removal: false,
            ..Self::default()
        }
    }

    /// Replace the group/mask test with a user callback.
    #[must_use]
    pub fn with_overlap_filter(mut self, callback: OverlapFilterCallback) -> Self {
        self.filter.callback = Some(callback);
        self
    }

    fn position(&self, a: ProxyHandle, b: ProxyHandle) -> Option<usize> {
        let key = canonical(a, b);
        self.pairs.iter().position(|p| p.key() == key)
    }
}

impl PairCache for SortedPairCache {
    fn add_pair(&mut self, a: PairProxy, b: PairProxy) -> bool {
        if !self.filter.accepts(&a, &b) {
            return false;
        }
        self.pairs.push(OverlappingPair::new(a.handle, b.handle));
        self.stats.added += 1;
        true
    }

    fn remove_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> bool {
        if self.deferred_removal {
            return false;
        }
        match self.position(a, b) {
            Some(idx) => {
                let mut pair = self.pairs.swap_remove(idx);
                release(&mut pair, &mut self.released);
                self.stats.removed += 1;
                true
            }
            None => false,
        }
    }

    fn remove_pairs_containing(&mut self, proxy: ProxyHandle) {
        let released = &mut self.released;
        let before = self.pairs.len();
        self.pairs.retain_mut(|pair| {
            if pair.contains(proxy) {
                release(pair, released);
                false
            } else {
                true
            }
        });
        self.stats.removed += (before - self.pairs.len()) as u64;
    }

    fn find_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> Option<&OverlappingPair> {
        self.stats.find_calls += 1;
        let idx = self.position(a, b)?;
        self.pairs.get(idx)
    }

    fn pairs(&self) -> &[OverlappingPair] {
        &self.pairs
    }

    fn algorithm_slots(&mut self) -> AlgorithmSlots<'_> {
        AlgorithmSlots::new(&mut self.pairs)
    }

    fn has_deferred_removal(&self) -> bool {
        self.deferred_removal
    }

    fn clean_pair(&mut self, index: usize) {
        if let Some(pair) = self.pairs.get_mut(index) {
            release(pair, &mut self.released);
        }
    }

    fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle) {
        for pair in self.pairs.iter_mut().filter(|p| p.contains(proxy)) {
            release(pair, &mut self.released);
        }
    }

    fn sweep_pairs(&mut self, overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool) -> usize {
        let removed = sweep_vec(&mut self.pairs, &mut self.released, overlap_lost);
        self.stats.removed += removed as u64;
        removed
    }

    fn take_released_algorithms(&mut self) -> Vec<AlgorithmId> {
        std::mem::take(&mut self.released)
    }

    fn stats(&self) -> PairCacheStats {
        self.stats
    }
}

// ============================================================================
// NullPairCache
// ============================================================================

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPairCache;

impl PairCache for NullPairCache {
    fn add_pair(&mut self, _a: PairProxy, _b: PairProxy) -> bool {
        false
    }

    fn remove_pair(&mut self, _a: ProxyHandle, _b: ProxyHandle) -> bool {
        false
    }

    fn remove_pairs_containing(&mut self, _proxy: ProxyHandle) {}

    fn find_pair(&mut self, _a: ProxyHandle, _b: ProxyHandle) -> Option<&OverlappingPair> {
        None
    }

    fn pairs(&self) -> &[OverlappingPair] {
        &[]
    }

    fn algorithm_slots(&mut self) -> AlgorithmSlots<'_> {
        AlgorithmSlots::new(&mut [])
    }

    fn has_deferred_removal(&self) -> bool {
        true
    }

    fn clean_pair(&mut self, _index: usize) {}

    fn clean_proxy_from_pairs(&mut self, _proxy: ProxyHandle) {}

    fn sweep_pairs(&mut self, _overlap_lost: &mut dyn FnMut(&OverlappingPair) -> bool) -> usize {
        0
    }

    fn take_released_algorithms(&mut self) -> Vec<AlgorithmId> {
        Vec::new()
    }

    fn stats(&self) -> PairCacheStats {
        PairCacheStats::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::handle::{Arena, ArenaKey};

    fn proxy(index: u32) -> PairProxy {
        PairProxy::new(ProxyHandle::from_parts(index, 0), CollisionFilter::default())
    }

    fn algorithm(index: u32) -> AlgorithmId {
        AlgorithmId::from_parts(index, 0)
    }

    #[test]
    fn test_hashed_add_is_idempotent_and_symmetric() {
        let mut cache = HashedPairCache::new();
        assert!(cache.add_pair(proxy(1), proxy(2)));
        assert!(!cache.add_pair(proxy(1), proxy(2)));
        assert!(!cache.add_pair(proxy(2), proxy(1)));
        assert_eq!(cache.len(), 1);

        let pair = cache.pairs()[0];
        assert!(pair.proxy0 < pair.proxy1);
        assert!(cache.find_pair(proxy(2).handle, proxy(1).handle).is_some());
        assert_eq!(cache.stats().added, 1);
        assert_eq!(cache.stats().find_calls, 1);
    }

    #[test]
    fn test_hashed_remove_keeps_index_consistent() {
        let mut cache = HashedPairCache::new();
        cache.add_pair(proxy(1), proxy(2));
        cache.add_pair(proxy(1), proxy(3));
        cache.add_pair(proxy(2), proxy(3));

        assert!(cache.remove_pair(proxy(2).handle, proxy(1).handle));
        assert!(!cache.remove_pair(proxy(1).handle, proxy(2).handle));
        assert_eq!(cache.len(), 2);
        // The swapped-in pair must still be addressable.
        assert!(cache.find_pair(proxy(2).handle, proxy(3).handle).is_some());
        assert!(cache.remove_pair(proxy(3).handle, proxy(2).handle));
        assert!(cache.remove_pair(proxy(1).handle, proxy(3).handle));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_algorithm_slots_leave_keys_intact() {
        let mut cache = HashedPairCache::new();
        cache.add_pair(proxy(4), proxy(1));
        cache.add_pair(proxy(2), proxy(3));
        let keys: Vec<_> = cache.pairs().iter().map(OverlappingPair::key).collect();

        for (i, (proxy0, proxy1, slot)) in cache.algorithm_slots().enumerate() {
            assert_eq!((proxy0, proxy1), keys[i]);
            assert!(proxy0 < proxy1);
            *slot = Some(algorithm(i as u32));
        }

        for (i, (a, b)) in keys.into_iter().enumerate() {
            let pair = cache.find_pair(b, a).unwrap();
            assert_eq!(pair.algorithm, Some(algorithm(i as u32)));
        }
    }

    #[test]
    fn test_remove_pairs_containing_releases_algorithms() {
        let mut cache = HashedPairCache::new();
        cache.add_pair(proxy(1), proxy(2));
        cache.add_pair(proxy(1), proxy(3));
        cache.add_pair(proxy(2), proxy(3));
        for (i, (_, _, slot)) in cache.algorithm_slots().enumerate() {
            *slot = Some(algorithm(i as u32));
        }

        cache.remove_pairs_containing(proxy(1).handle);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take_released_algorithms().len(), 2);
        assert!(cache.take_released_algorithms().is_empty());
        assert!(cache.find_pair(proxy(2).handle, proxy(3).handle).is_some());
    }

    #[test]
    fn test_filter_rejects_pair() {
        let mut cache = HashedPairCache::new();
        let a = PairProxy::new(
            ProxyHandle::from_parts(1, 0),
            CollisionFilter::static_geometry(),
        );
        let b = PairProxy::new(
            ProxyHandle::from_parts(2, 0),
            CollisionFilter::static_geometry(),
        );
        assert!(!cache.add_pair(a, b));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overlap_filter_callback() {
        let mut cache = HashedPairCache::new().with_overlap_filter(Box::new(
            |a: &PairProxy, b: &PairProxy| a.handle.index() + b.handle.index() != 5,
        ));
        assert!(!cache.add_pair(proxy(2), proxy(3)));
        assert!(cache.add_pair(proxy(1), proxy(3)));

        cache.set_overlap_filter(None);
        assert!(cache.add_pair(proxy(2), proxy(3)));
    }

    #[test]
    fn test_sorted_cache_coalesces_duplicates_on_sweep() {
        let mut cache = SortedPairCache::new();
        assert!(cache.has_deferred_removal());
        cache.add_pair(proxy(1), proxy(2));
        cache.add_pair(proxy(2), proxy(1));
        cache.add_pair(proxy(3), proxy(4));
        assert_eq!(cache.len(), 3);
        *cache.algorithm_slots().next().unwrap().2 = Some(algorithm(7));

        // Removal is deferred.
        assert!(!cache.remove_pair(proxy(3).handle, proxy(4).handle));

        let lost = proxy(3).handle;
        let removed = cache.sweep_pairs(&mut |pair| pair.contains(lost));
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pairs()[0].algorithm, Some(algorithm(7)));
        assert!(cache.take_released_algorithms().is_empty());
    }

    #[test]
    fn test_sorted_cache_immediate_mode() {
        let mut cache = SortedPairCache::immediate();
        assert!(!cache.has_deferred_removal());
        cache.add_pair(proxy(1), proxy(2));
        assert!(cache.remove_pair(proxy(2).handle, proxy(1).handle));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clean_proxy_keeps_pairs() {
        let mut cache = SortedPairCache::new();
        cache.add_pair(proxy(1), proxy(2));
        *cache.algorithm_slots().next().unwrap().2 = Some(algorithm(0));
        cache.clean_proxy_from_pairs(proxy(2).handle);
        assert_eq!(cache.len(), 1);
        assert!(cache.pairs()[0].algorithm.is_none());
        assert_eq!(cache.take_released_algorithms(), vec![algorithm(0)]);
    }

    #[test]
    fn test_null_cache_stores_nothing() {
        let mut cache = NullPairCache;
        assert!(!cache.add_pair(proxy(1), proxy(2)));
        assert!(cache.is_empty());
        assert!(cache.has_deferred_removal());
        assert_eq!(cache.algorithm_slots().len(), 0);
    }

    #[test]
    fn test_mut_reference_is_a_cache() {
        fn fill(mut cache: impl PairCache) {
            cache.add_pair(proxy(1), proxy(2));
        }
        let mut cache = HashedPairCache::new();
        fill(&mut cache);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_released_ids_match_arena_keys() {
        let mut arena: Arena<AlgorithmId, ()> = Arena::new();
        let id = arena.insert(()).unwrap();
        let mut cache = HashedPairCache::new();
        cache.add_pair(proxy(1), proxy(2));
        *cache.algorithm_slots().next().unwrap().2 = Some(id);
        cache.clean_pair(0);
        for released in cache.take_released_algorithms() {
            arena.remove(released).unwrap();
        }
        assert!(arena.is_empty());
    }
}
