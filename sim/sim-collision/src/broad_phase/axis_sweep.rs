//! Quantized sweep-and-prune over three axes.
//!
//! Every proxy owns a min and a max edge on each axis. Edge positions are
//! 16-bit grid coordinates inside the configured world bounds, with the low
//! bit set on max edges so that a min and a max at the same world position
//! always sort min first. Each axis keeps its edges sorted between two
//! sentinels owned by the null handle 0:
//!
//! ```text
//!   index:  0     1     2     3     4    ...  2n    2n+1
//!   edge:  [S0] [a↓]  [b↓]  [a↑]  [b↑]  ...  [..]  [S∞]
//! ```
//!
//! Moving a proxy shifts its edges with adjacent swaps. Crossing another
//! proxy's edge is exactly the moment an overlap starts or ends on that
//! axis; the other two axes are checked through the stored edge indices and
//! the pair cache is told.

use nalgebra::{Point3, Vector3};
use tracing::{debug, trace, warn};

use super::{BroadPhase, DbvtBroadphase, ProxyInfo};
use crate::aabb::Aabb;
use crate::config::{AxisSweepConfig, DbvtBroadphaseConfig};
use crate::error::Result;
use crate::filter::CollisionFilter;
use crate::handle::{Arena, ArenaKey, ObjectId, ProxyHandle};
use crate::observer::{ObserverSlot, observe};
use crate::pair_cache::{HashedPairCache, NullPairCache, PairCache};

#[cfg(debug_assertions)]
use crate::observer::BroadphaseObserver;

/// Largest grid coordinate; also the position of the upper sentinel.
const HANDLE_SENTINEL: u16 = 0xffff;
/// Clears the min/max tag bit.
const HANDLE_MASK: u16 = 0xfffe;
/// Owner of both sentinels.
const NULL_HANDLE: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    pos: u16,
    handle: u16,
}

impl Edge {
    const LOWER_SENTINEL: Self = Self {
        pos: 0,
        handle: NULL_HANDLE,
    };
    const UPPER_SENTINEL: Self = Self {
        pos: HANDLE_SENTINEL,
        handle: NULL_HANDLE,
    };

    const fn is_max(self) -> bool {
        self.pos & 1 == 1
    }
}

#[derive(Debug, Clone)]
struct SweepProxy {
    info: ProxyInfo,
    min_edges: [u16; 3],
    max_edges: [u16; 3],
    /// Mirror in the query accelerator.
    accel: Option<ProxyHandle>,
}

/// The two axes other than `axis`, in cyclic order.
const fn other_axes(axis: usize) -> (usize, usize) {
    let axis1 = (1 << axis) & 3;
    let axis2 = (1 << axis1) & 3;
    (axis1, axis2)
}

fn edges_overlap(a: &SweepProxy, b: &SweepProxy) -> bool {
    (0..3).all(|axis| a.max_edges[axis] >= b.min_edges[axis] && b.max_edges[axis] >= a.min_edges[axis])
}

#[allow(clippy::cast_possible_truncation)]
fn edge_index(index: usize) -> u16 {
    debug_assert!(index < usize::from(HANDLE_SENTINEL));
    index as u16
}

/// Sweep handle of an arena key. Slot `i` is sweep handle `i + 1`; the
/// arena's limit keeps it inside `u16`.
#[allow(clippy::cast_possible_truncation)]
fn sweep_handle(handle: ProxyHandle) -> u16 {
    debug_assert!(handle.index() < u32::from(HANDLE_SENTINEL));
    (handle.index() + 1) as u16
}

/// Map one scaled coordinate onto the grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize_coord(v: f64, is_max: u16) -> u16 {
    if v <= 0.0 {
        is_max
    } else if v >= f64::from(HANDLE_SENTINEL) {
        (HANDLE_SENTINEL & HANDLE_MASK) | is_max
    } else {
        ((v as u16) & HANDLE_MASK) | is_max
    }
}

/// Accelerator proxies carry the outer handle as their owner id.
fn encode_handle(handle: ProxyHandle) -> ObjectId {
    ObjectId::new((u64::from(handle.index()) << 32) | u64::from(handle.generation()))
}

#[allow(clippy::cast_possible_truncation)]
fn decode_handle(owner: ObjectId) -> ProxyHandle {
    let raw = owner.raw();
    ProxyHandle::from_parts((raw >> 32) as u32, raw as u32)
}

// ============================================================================
// Edge arrays
// ============================================================================

/// Where pair events go while edges are sorted.
struct PairSink<'a, C> {
    cache: &'a mut C,
    observer: &'a mut ObserverSlot,
}

/// Sorted edge arrays plus the proxies they point at.
#[derive(Debug)]
struct Sweep {
    edges: [Vec<Edge>; 3],
    proxies: Arena<ProxyHandle, SweepProxy>,
    num_handles: usize,
}

impl Sweep {
    fn new(max_handles: usize) -> Self {
        let mut axis = vec![Edge::LOWER_SENTINEL; 2 * max_handles + 2];
        axis[1] = Edge::UPPER_SENTINEL;
        Self {
            edges: [axis.clone(), axis.clone(), axis],
            proxies: Arena::with_limit(max_handles),
            num_handles: 0,
        }
    }

    fn proxy(&self, h: u16) -> Option<&SweepProxy> {
        if h == NULL_HANDLE {
            return None;
        }
        self.proxies.get_by_index(u32::from(h) - 1)
    }

    fn proxy_mut(&mut self, h: u16) -> Option<&mut SweepProxy> {
        if h == NULL_HANDLE {
            return None;
        }
        self.proxies.get_by_index_mut(u32::from(h) - 1)
    }

    fn key(&self, h: u16) -> Option<ProxyHandle> {
        if h == NULL_HANDLE {
            return None;
        }
        self.proxies.key_at(u32::from(h) - 1)
    }

    fn overlap_2d(&self, a: u16, b: u16, axis1: usize, axis2: usize) -> bool {
        let (Some(pa), Some(pb)) = (self.proxy(a), self.proxy(b)) else {
            return false;
        };
        [axis1, axis2]
            .iter()
            .all(|&ax| pa.max_edges[ax] >= pb.min_edges[ax] && pb.max_edges[ax] >= pa.min_edges[ax])
    }

    fn add_pair<C: PairCache>(&self, a: u16, b: u16, sink: &mut PairSink<'_, C>) {
        let (Some(ka), Some(kb), Some(pa), Some(pb)) =
            (self.key(a), self.key(b), self.proxy(a), self.proxy(b))
        else {
            return;
        };
        if sink
            .cache
            .add_pair(pa.info.pair_proxy(ka), pb.info.pair_proxy(kb))
        {
            observe!(sink.observer, pair_added(ka.min(kb), ka.max(kb)));
        }
    }

    fn remove_pair<C: PairCache>(&self, a: u16, b: u16, sink: &mut PairSink<'_, C>) {
        let (Some(ka), Some(kb)) = (self.key(a), self.key(b)) else {
            return;
        };
        if sink.cache.remove_pair(ka, kb) {
            observe!(sink.observer, pair_removed(ka.min(kb), ka.max(kb)));
        }
    }

    fn sort_min_down<C: PairCache>(
        &mut self,
        axis: usize,
        mut index: usize,
        sink: &mut PairSink<'_, C>,
        update: bool,
    ) {
        let (axis1, axis2) = other_axes(axis);
        let moving = self.edges[axis][index].handle;

        while self.edges[axis][index].pos < self.edges[axis][index - 1].pos {
            let prev = self.edges[axis][index - 1];
            if prev.is_max() {
                // Min passes below a max: the intervals start to overlap.
                if update && self.overlap_2d(moving, prev.handle, axis1, axis2) {
                    self.add_pair(moving, prev.handle, sink);
                }
                if let Some(p) = self.proxy_mut(prev.handle) {
                    p.max_edges[axis] += 1;
                }
            } else if let Some(p) = self.proxy_mut(prev.handle) {
                p.min_edges[axis] += 1;
            }
            if let Some(p) = self.proxy_mut(moving) {
                p.min_edges[axis] -= 1;
            }
            self.edges[axis].swap(index, index - 1);
            index -= 1;
        }
    }

    fn sort_min_up<C: PairCache>(
        &mut self,
        axis: usize,
        mut index: usize,
        sink: &mut PairSink<'_, C>,
        update: bool,
    ) {
        let moving = self.edges[axis][index].handle;

        loop {
            let (edge, next) = (self.edges[axis][index], self.edges[axis][index + 1]);
            if next.handle == NULL_HANDLE || edge.pos < next.pos {
                break;
            }
            if next.is_max() {
                // Min passes above a max: the overlap ends.
                if update {
                    self.remove_pair(moving, next.handle, sink);
                }
                if let Some(p) = self.proxy_mut(next.handle) {
                    p.max_edges[axis] -= 1;
                }
            } else if let Some(p) = self.proxy_mut(next.handle) {
                p.min_edges[axis] -= 1;
            }
            if let Some(p) = self.proxy_mut(moving) {
                p.min_edges[axis] += 1;
            }
            self.edges[axis].swap(index, index + 1);
            index += 1;
        }
    }

    fn sort_max_down<C: PairCache>(
        &mut self,
        axis: usize,
        mut index: usize,
        sink: &mut PairSink<'_, C>,
        update: bool,
    ) {
        let moving = self.edges[axis][index].handle;

        while self.edges[axis][index].pos < self.edges[axis][index - 1].pos {
            let prev = self.edges[axis][index - 1];
            if prev.is_max() {
                if let Some(p) = self.proxy_mut(prev.handle) {
                    p.max_edges[axis] += 1;
                }
            } else {
                // Max passes below a min: the overlap ends.
                if update {
                    self.remove_pair(moving, prev.handle, sink);
                }
                if let Some(p) = self.proxy_mut(prev.handle) {
                    p.min_edges[axis] += 1;
                }
            }
            if let Some(p) = self.proxy_mut(moving) {
                p.max_edges[axis] -= 1;
            }
            self.edges[axis].swap(index, index - 1);
            index -= 1;
        }
    }

    fn sort_max_up<C: PairCache>(
        &mut self,
        axis: usize,
        mut index: usize,
        sink: &mut PairSink<'_, C>,
        update: bool,
    ) {
        let (axis1, axis2) = other_axes(axis);
        let moving = self.edges[axis][index].handle;

        loop {
            let (edge, next) = (self.edges[axis][index], self.edges[axis][index + 1]);
            if next.handle == NULL_HANDLE || edge.pos < next.pos {
                break;
            }
            if next.is_max() {
                if let Some(p) = self.proxy_mut(next.handle) {
                    p.max_edges[axis] -= 1;
                }
            } else {
                // Max passes above a min: the intervals start to overlap.
                if update && self.overlap_2d(moving, next.handle, axis1, axis2) {
                    self.add_pair(moving, next.handle, sink);
                }
                if let Some(p) = self.proxy_mut(next.handle) {
                    p.min_edges[axis] -= 1;
                }
            }
            if let Some(p) = self.proxy_mut(moving) {
                p.max_edges[axis] += 1;
            }
            self.edges[axis].swap(index, index + 1);
            index += 1;
        }
    }

    /// Check edge order and back-references.
    #[cfg(debug_assertions)]
    fn debug_validate(&self) {
        let end = 2 * self.num_handles + 1;
        for (axis, edges) in self.edges.iter().enumerate() {
            debug_assert_eq!(edges[0], Edge::LOWER_SENTINEL);
            debug_assert_eq!(edges[end], Edge::UPPER_SENTINEL);
            for i in 1..=end {
                debug_assert!(edges[i - 1].pos <= edges[i].pos, "axis {axis} unsorted at {i}");
            }
            for (i, edge) in edges.iter().enumerate().take(end).skip(1) {
                let Some(p) = self.proxy(edge.handle) else {
                    debug_assert!(false, "edge {i} on axis {axis} has no proxy");
                    continue;
                };
                let stored = if edge.is_max() {
                    p.max_edges[axis]
                } else {
                    p.min_edges[axis]
                };
                debug_assert_eq!(usize::from(stored), i, "stale edge index on axis {axis}");
                debug_assert!(p.min_edges[axis] < p.max_edges[axis]);
            }
        }
    }
}

// ============================================================================
// AxisSweep
// ============================================================================

/// Incremental 3-axis sweep-and-prune broadphase.
///
/// Capacity and world bounds are fixed at construction. Boxes outside the
/// world are clamped onto its border, never rejected, so far-away proxies
/// may report conservative pairs.
#[derive(Debug)]
pub struct AxisSweep<C: PairCache = HashedPairCache> {
    config: AxisSweepConfig,
    scale: Vector3<f64>,
    sweep: Sweep,
    pair_cache: C,
    accelerator: Option<DbvtBroadphase<NullPairCache>>,
    observer: ObserverSlot,
}

impl AxisSweep<HashedPairCache> {
    /// Create a sweep with its own hashed pair cache.
    pub fn new(config: AxisSweepConfig) -> Result<Self> {
        Self::with_cache(config, HashedPairCache::new())
    }
}

impl<C: PairCache> AxisSweep<C> {
    /// Create a sweep reporting into `cache`.
    pub fn with_cache(config: AxisSweepConfig, cache: C) -> Result<Self> {
        config.validate()?;
        let size = config.world_max - config.world_min;
        let scale = size.map(|s| f64::from(HANDLE_SENTINEL) / s);
        let accelerator = if config.raycast_accelerator {
            Some(DbvtBroadphase::with_cache(
                DbvtBroadphaseConfig::accelerator(),
                NullPairCache,
            )?)
        } else {
            None
        };
        debug!(
            max_handles = config.max_handles,
            accelerator = config.raycast_accelerator,
            "created axis sweep"
        );
        Ok(Self {
            sweep: Sweep::new(config.max_handles),
            config,
            scale,
            pair_cache: cache,
            accelerator,
            observer: ObserverSlot::default(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &AxisSweepConfig {
        &self.config
    }

    /// Whether ray and AABB queries go through the internal tree.
    #[must_use]
    pub fn has_accelerator(&self) -> bool {
        self.accelerator.is_some()
    }

    /// Attach an observer for pair events.
    #[cfg(debug_assertions)]
    pub fn set_observer(&mut self, observer: Option<Box<dyn BroadphaseObserver>>) {
        self.observer.set(observer);
    }

    fn quantize(&self, point: &Point3<f64>, is_max: u16) -> [u16; 3] {
        let v = (point - self.config.world_min).component_mul(&self.scale);
        [
            quantize_coord(v.x, is_max),
            quantize_coord(v.y, is_max),
            quantize_coord(v.z, is_max),
        ]
    }

    /// Bounds the proxy occupies on the grid, mapped back to world space.
    ///
    /// Contains the proxy's AABB clamped to the world bounds.
    pub fn unquantized_aabb(&self, handle: ProxyHandle) -> Result<Aabb> {
        let proxy = self.sweep.proxies.get(handle)?;
        let world_min = self.config.world_min;
        let mut min = world_min;
        let mut max = world_min;
        for axis in 0..3 {
            let lo = self.sweep.edges[axis][usize::from(proxy.min_edges[axis])].pos;
            let hi = self.sweep.edges[axis][usize::from(proxy.max_edges[axis])].pos;
            min[axis] = f64::from(lo) / self.scale[axis] + world_min[axis];
            max[axis] = (f64::from(hi) + 1.0) / self.scale[axis] + world_min[axis];
        }
        Ok(Aabb::new(min, max))
    }
}

impl<C: PairCache> BroadPhase for AxisSweep<C> {
    type Cache = C;

    fn create_proxy(
        &mut self,
        aabb: Aabb,
        owner: ObjectId,
        filter: CollisionFilter,
    ) -> Result<ProxyHandle> {
        aabb.validate()?;
        let qmin = self.quantize(&aabb.min, 0);
        let qmax = self.quantize(&aabb.max, 1);

        let handle = self
            .sweep
            .proxies
            .insert(SweepProxy {
                info: ProxyInfo::new(aabb, owner, filter),
                min_edges: [0; 3],
                max_edges: [0; 3],
                accel: None,
            })
            .inspect_err(|e| warn!(error = %e, %owner, "axis sweep is full"))?;
        let h = sweep_handle(handle);

        self.sweep.num_handles += 1;
        let limit = 2 * self.sweep.num_handles;
        for (axis, edges) in self.sweep.edges.iter_mut().enumerate() {
            edges[limit + 1] = edges[limit - 1];
            edges[limit - 1] = Edge {
                pos: qmin[axis],
                handle: h,
            };
            edges[limit] = Edge {
                pos: qmax[axis],
                handle: h,
            };
        }
        let proxy = self.sweep.proxies.get_mut(handle)?;
        proxy.min_edges = [edge_index(limit - 1); 3];
        proxy.max_edges = [edge_index(limit); 3];

        let mut sink = PairSink {
            cache: &mut self.pair_cache,
            observer: &mut self.observer,
        };
        // Pairs are only reported on the last axis, once the other two are
        // in place.
        for axis in 0..3 {
            let update = axis == 2;
            self.sweep.sort_min_down(axis, limit - 1, &mut sink, update);
            self.sweep.sort_max_down(axis, limit, &mut sink, update);
        }

        if let Some(accelerator) = &mut self.accelerator {
            let inner = accelerator.create_proxy(aabb, encode_handle(handle), filter)?;
            self.sweep.proxies.get_mut(handle)?.accel = Some(inner);
        }

        #[cfg(debug_assertions)]
        self.sweep.debug_validate();
        Ok(handle)
    }

    fn destroy_proxy(&mut self, handle: ProxyHandle) -> Result<()> {
        let proxy = self.sweep.proxies.get(handle)?;
        let accel = proxy.accel;

        if !self.pair_cache.has_deferred_removal() {
            self.pair_cache.remove_pairs_containing(handle);
        }

        let limit = 2 * self.sweep.num_handles;
        let mut sink = PairSink {
            cache: &mut self.pair_cache,
            observer: &mut self.observer,
        };
        for axis in 0..3 {
            let max = usize::from(self.sweep.proxies.get(handle)?.max_edges[axis]);
            self.sweep.edges[axis][max].pos = HANDLE_SENTINEL;
            self.sweep.sort_max_up(axis, max, &mut sink, false);

            let min = usize::from(self.sweep.proxies.get(handle)?.min_edges[axis]);
            self.sweep.edges[axis][min].pos = HANDLE_SENTINEL;
            self.sweep.sort_min_up(axis, min, &mut sink, false);

            self.sweep.edges[axis][limit - 1] = Edge::UPPER_SENTINEL;
        }

        self.sweep.proxies.remove(handle)?;
        self.sweep.num_handles -= 1;

        if let (Some(accelerator), Some(inner)) = (&mut self.accelerator, accel) {
            accelerator.destroy_proxy(inner)?;
        }

        #[cfg(debug_assertions)]
        self.sweep.debug_validate();
        Ok(())
    }

    fn set_aabb(&mut self, handle: ProxyHandle, aabb: Aabb) -> Result<()> {
        aabb.validate()?;
        let proxy = self.sweep.proxies.get_mut(handle)?;
        proxy.info.aabb = aabb;
        let (min_edges, max_edges, accel) = (proxy.min_edges, proxy.max_edges, proxy.accel);

        let qmin = self.quantize(&aabb.min, 0);
        let qmax = self.quantize(&aabb.max, 1);
        let mut sink = PairSink {
            cache: &mut self.pair_cache,
            observer: &mut self.observer,
        };
        for axis in 0..3 {
            let (emin, emax) = (usize::from(min_edges[axis]), usize::from(max_edges[axis]));
            let edges = &mut self.sweep.edges[axis];
            let dmin = i32::from(qmin[axis]) - i32::from(edges[emin].pos);
            let dmax = i32::from(qmax[axis]) - i32::from(edges[emax].pos);
            edges[emin].pos = qmin[axis];
            edges[emax].pos = qmax[axis];

            // Growing edges can only add overlaps, shrinking ones only
            // remove them.
            if dmin < 0 {
                self.sweep.sort_min_down(axis, emin, &mut sink, true);
            }
            if dmax > 0 {
                self.sweep.sort_max_up(axis, emax, &mut sink, true);
            }
            if dmin > 0 {
                self.sweep.sort_min_up(axis, emin, &mut sink, true);
            }
            if dmax < 0 {
                self.sweep.sort_max_down(axis, emax, &mut sink, true);
            }
        }

        if let (Some(accelerator), Some(inner)) = (&mut self.accelerator, accel) {
            accelerator.set_aabb(inner, aabb)?;
        }

        #[cfg(debug_assertions)]
        self.sweep.debug_validate();
        Ok(())
    }

    fn aabb(&self, handle: ProxyHandle) -> Result<Aabb> {
        Ok(self.sweep.proxies.get(handle)?.info.aabb)
    }

    fn owner(&self, handle: ProxyHandle) -> Result<ObjectId> {
        Ok(self.sweep.proxies.get(handle)?.info.owner)
    }

    fn calculate_overlapping_pairs(&mut self) {
        if !self.pair_cache.has_deferred_removal() {
            return;
        }
        let Self {
            sweep,
            pair_cache,
            observer,
            ..
        } = self;
        let removed = pair_cache.sweep_pairs(&mut |pair| {
            let lost = match (sweep.proxies.get(pair.proxy0), sweep.proxies.get(pair.proxy1)) {
                (Ok(a), Ok(b)) => !edges_overlap(a, b),
                _ => true,
            };
            if lost {
                observe!(observer, pair_removed(pair.proxy0, pair.proxy1));
            }
            lost
        });
        if removed > 0 {
            trace!(removed, remaining = pair_cache.len(), "swept deferred pairs");
        }
    }

    fn pair_cache(&self) -> &C {
        &self.pair_cache
    }

    fn pair_cache_mut(&mut self) -> &mut C {
        &mut self.pair_cache
    }

    fn test_aabb_overlap(&self, a: ProxyHandle, b: ProxyHandle) -> bool {
        match (self.sweep.proxies.get(a), self.sweep.proxies.get(b)) {
            (Ok(pa), Ok(pb)) => edges_overlap(pa, pb),
            _ => false,
        }
    }

    fn aabb_test(&self, aabb: &Aabb, callback: &mut dyn FnMut(ProxyHandle)) {
        if let Some(accelerator) = &self.accelerator {
            accelerator.aabb_test(aabb, &mut |inner| {
                if let Ok(owner) = accelerator.owner(inner) {
                    callback(decode_handle(owner));
                }
            });
            return;
        }
        let end = 2 * self.sweep.num_handles + 1;
        for edge in &self.sweep.edges[0][1..end] {
            if !edge.is_max() {
                continue;
            }
            if let (Some(key), Some(proxy)) = (self.sweep.key(edge.handle), self.sweep.proxy(edge.handle)) {
                if proxy.info.aabb.overlaps(aabb) {
                    callback(key);
                }
            }
        }
    }

    fn ray_test(&self, from: Point3<f64>, to: Point3<f64>, callback: &mut dyn FnMut(ProxyHandle)) {
        if let Some(accelerator) = &self.accelerator {
            accelerator.ray_test(from, to, &mut |inner| {
                if let Ok(owner) = accelerator.owner(inner) {
                    callback(decode_handle(owner));
                }
            });
            return;
        }
        // Without the tree every proxy is a candidate.
        let end = 2 * self.sweep.num_handles + 1;
        for edge in &self.sweep.edges[0][1..end] {
            if edge.is_max() {
                if let Some(key) = self.sweep.key(edge.handle) {
                    callback(key);
                }
            }
        }
    }

    fn broadphase_aabb(&self) -> Aabb {
        Aabb::new(self.config.world_min, self.config.world_max)
    }

    fn reset_pool(&mut self) {
        if self.sweep.num_handles != 0 {
            return;
        }
        self.sweep.proxies.clear();
        if let Some(accelerator) = &mut self.accelerator {
            accelerator.reset_pool();
        }
    }

    fn proxy_count(&self) -> usize {
        self.sweep.num_handles
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
    use approx::assert_relative_eq;

    fn cube(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    fn add<C: PairCache>(sweep: &mut AxisSweep<C>, aabb: Aabb) -> ProxyHandle {
        sweep
            .create_proxy(aabb, ObjectId::default(), CollisionFilter::default())
            .unwrap()
    }

    fn assert_sorted<C: PairCache>(sweep: &AxisSweep<C>) {
        let end = 2 * sweep.sweep.num_handles + 1;
        for axis in 0..3 {
            let edges = &sweep.sweep.edges[axis];
            assert_eq!(edges[end], Edge::UPPER_SENTINEL);
            for i in 1..=end {
                assert!(edges[i - 1].pos <= edges[i].pos);
            }
            for (i, edge) in edges.iter().enumerate().take(end).skip(1) {
                let proxy = sweep.sweep.proxy(edge.handle).unwrap();
                let stored = if edge.is_max() {
                    proxy.max_edges[axis]
                } else {
                    proxy.min_edges[axis]
                };
                assert_eq!(usize::from(stored), i);
            }
        }
    }

    #[test]
    fn test_other_axes_cycle() {
        assert_eq!(other_axes(0), (1, 2));
        assert_eq!(other_axes(1), (2, 0));
        assert_eq!(other_axes(2), (0, 1));
    }

    #[test]
    fn test_quantize_clamps_and_tags() {
        assert_eq!(quantize_coord(-5.0, 0), 0);
        assert_eq!(quantize_coord(-5.0, 1), 1);
        assert_eq!(quantize_coord(70_000.0, 0), 0xfffe);
        assert_eq!(quantize_coord(70_000.0, 1), 0xffff);
        assert_eq!(quantize_coord(10.4, 0), 10);
        assert_eq!(quantize_coord(11.0, 0), 10);
        assert_eq!(quantize_coord(11.0, 1), 11);
        // A min and a max at the same spot sort min first.
        assert!(quantize_coord(42.0, 0) < quantize_coord(42.0, 1));
    }

    #[test]
    fn test_two_box_scenario() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
        let b = add(&mut sweep, cube(0.5, 0.5, 0.5));
        sweep.calculate_overlapping_pairs();
        assert_eq!(sweep.pair_cache().len(), 1);
        assert!(sweep.pair_cache_mut().find_pair(b, a).is_some());

        sweep.set_aabb(b, cube(5.0, 5.0, 5.0)).unwrap();
        sweep.calculate_overlapping_pairs();
        assert!(sweep.pair_cache().is_empty());
        assert!(!sweep.test_aabb_overlap(a, b));
        assert_sorted(&sweep);
    }

    #[test]
    fn test_moves_keep_edges_sorted() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let handles: Vec<_> = (0..12)
            .map(|i| add(&mut sweep, cube(f64::from(i) * 0.8, 0.0, 0.0)))
            .collect();
        assert_eq!(sweep.pair_cache().len(), 11);

        for step in 0..8 {
            for (i, &h) in handles.iter().enumerate() {
                let offset = if (i + step) % 2 == 0 { 3.0 } else { -2.5 };
                let aabb = cube(i as f64 * 0.8 + offset, (i % 3) as f64 * 0.4, 0.0);
                sweep.set_aabb(h, aabb).unwrap();
            }
            assert_sorted(&sweep);
            for (i, &a) in handles.iter().enumerate() {
                for &b in &handles[i + 1..] {
                    let expected = sweep.aabb(a).unwrap().overlaps(&sweep.aabb(b).unwrap());
                    let found = sweep.pair_cache_mut().find_pair(a, b).is_some();
                    // Grid rounding is conservative: never a missed pair.
                    if expected {
                        assert!(found);
                    }
                    assert_eq!(found, sweep.test_aabb_overlap(a, b));
                }
            }
        }
    }

    #[test]
    fn test_destroy_restores_sentinel() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
        let b = add(&mut sweep, cube(0.5, 0.0, 0.0));
        let c = add(&mut sweep, cube(1.2, 0.0, 0.0));
        assert_eq!(sweep.pair_cache().len(), 2);

        sweep.destroy_proxy(b).unwrap();
        assert_eq!(sweep.proxy_count(), 2);
        assert!(sweep.pair_cache().is_empty());
        for axis in 0..3 {
            assert_eq!(sweep.sweep.edges[axis][5], Edge::UPPER_SENTINEL);
        }
        assert_sorted(&sweep);
        assert!(sweep.destroy_proxy(b).unwrap_err().is_stale_handle());

        sweep.set_aabb(c, cube(0.5, 0.0, 0.0)).unwrap();
        assert_eq!(sweep.pair_cache().len(), 1);
        assert!(sweep.test_aabb_overlap(a, c));
    }

    #[test]
    fn test_unquantized_aabb_is_conservative() {
        let sweep_config = AxisSweepConfig::small_scene();
        let mut sweep = AxisSweep::new(sweep_config).unwrap();
        let aabb = Aabb::new(Point3::new(-3.21, 7.77, 0.013), Point3::new(-1.0, 8.5, 99.99));
        let h = add(&mut sweep, aabb);
        let grid = sweep.unquantized_aabb(h).unwrap();
        assert!(grid.contains(&aabb));
        // Never more than two grid cells larger.
        let cell = 200.0 / 65_535.0;
        for axis in 0..3 {
            assert!(aabb.min[axis] - grid.min[axis] <= 2.0 * cell);
            assert!(grid.max[axis] - aabb.max[axis] <= 2.0 * cell);
        }
    }

    #[test]
    fn test_out_of_world_boxes_are_clamped() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let a = add(&mut sweep, cube(200.0, 0.0, 0.0));
        let b = add(&mut sweep, cube(300.0, 0.0, 0.0));
        // Both collapse onto the upper border of the x axis.
        assert!(sweep.test_aabb_overlap(a, b));
        let grid = sweep.unquantized_aabb(a).unwrap();
        assert_relative_eq!(grid.min.x, 100.0, epsilon = 0.01);
    }

    #[test]
    fn test_capacity_and_reuse() {
        let config = AxisSweepConfig::small_scene().max_handles(2);
        let mut sweep = AxisSweep::new(config).unwrap();
        let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
        add(&mut sweep, cube(3.0, 0.0, 0.0));
        let err = sweep
            .create_proxy(cube(6.0, 0.0, 0.0), ObjectId::new(3), CollisionFilter::default())
            .unwrap_err();
        assert!(err.is_capacity_exceeded());

        sweep.destroy_proxy(a).unwrap();
        let c = add(&mut sweep, cube(6.0, 0.0, 0.0));
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(sweep.aabb(a).is_err());
    }

    #[test]
    fn test_filters_suppress_pairs() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let ground = CollisionFilter::static_geometry();
        sweep
            .create_proxy(cube(0.0, 0.0, 0.0), ObjectId::new(1), ground)
            .unwrap();
        sweep
            .create_proxy(cube(0.5, 0.0, 0.0), ObjectId::new(2), ground)
            .unwrap();
        assert!(sweep.pair_cache().is_empty());
        sweep
            .create_proxy(cube(0.2, 0.0, 0.0), ObjectId::new(3), CollisionFilter::default())
            .unwrap();
        assert_eq!(sweep.pair_cache().len(), 2);
    }

    #[test]
    fn test_deferred_cache_swept_on_calculate() {
        let mut sweep =
            AxisSweep::with_cache(AxisSweepConfig::small_scene(), SortedPairCache::new()).unwrap();
        let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
        let b = add(&mut sweep, cube(0.5, 0.0, 0.0));
        // Leave and come back: the sorted cache now holds two copies.
        sweep.set_aabb(b, cube(5.0, 0.0, 0.0)).unwrap();
        sweep.set_aabb(b, cube(0.5, 0.0, 0.0)).unwrap();
        assert_eq!(sweep.pair_cache().len(), 2);
        sweep.calculate_overlapping_pairs();
        assert_eq!(sweep.pair_cache().len(), 1);

        sweep.set_aabb(b, cube(5.0, 0.0, 0.0)).unwrap();
        assert_eq!(sweep.pair_cache().len(), 1);
        sweep.calculate_overlapping_pairs();
        assert!(sweep.pair_cache().is_empty());

        // Destroyed proxies' pairs go on the next sweep.
        sweep.set_aabb(b, cube(0.5, 0.0, 0.0)).unwrap();
        sweep.destroy_proxy(a).unwrap();
        assert_eq!(sweep.pair_cache().len(), 1);
        sweep.calculate_overlapping_pairs();
        assert!(sweep.pair_cache().is_empty());
    }

    #[test]
    fn test_queries_with_and_without_accelerator() {
        let configs = [
            AxisSweepConfig::small_scene(),
            AxisSweepConfig::small_scene().without_accelerator(),
        ];
        for config in configs {
            let accelerated = config.raycast_accelerator;
            let mut sweep = AxisSweep::new(config).unwrap();
            assert_eq!(sweep.has_accelerator(), accelerated);
            let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
            let b = add(&mut sweep, cube(5.0, 0.0, 0.0));
            let c = add(&mut sweep, cube(10.0, 0.0, 0.0));
            sweep.set_aabb(c, cube(10.0, 20.0, 0.0)).unwrap();

            let mut hits = Vec::new();
            sweep.aabb_test(&cube(4.5, 0.0, 0.0), &mut |h| hits.push(h));
            assert_eq!(hits, vec![b]);

            let mut hits = Vec::new();
            sweep.ray_test(
                Point3::new(-1.0, 0.5, 0.5),
                Point3::new(20.0, 0.5, 0.5),
                &mut |h| hits.push(h),
            );
            hits.sort_unstable();
            if accelerated {
                assert_eq!(hits, vec![a, b]);
            } else {
                assert_eq!(hits, vec![a, b, c]);
            }
        }
    }

    #[test]
    fn test_reset_pool_only_when_empty() {
        let mut sweep = AxisSweep::new(AxisSweepConfig::small_scene()).unwrap();
        let a = add(&mut sweep, cube(0.0, 0.0, 0.0));
        sweep.reset_pool();
        assert!(sweep.aabb(a).is_ok());

        sweep.destroy_proxy(a).unwrap();
        sweep.reset_pool();
        let b = add(&mut sweep, cube(0.0, 0.0, 0.0));
        assert_eq!(b.index(), 0);
        assert!(sweep.aabb(a).is_err());
        assert_eq!(
            sweep.broadphase_aabb(),
            Aabb::new(Point3::new(-100.0, -100.0, -100.0), Point3::new(100.0, 100.0, 100.0))
        );
    }

    #[test]
    fn test_handle_encoding_round_trips() {
        let handle = ProxyHandle::from_parts(7, 3);
        assert_eq!(decode_handle(encode_handle(handle)), handle);
    }
}
