//! Narrow-phase dispatch over the broadphase pair cache.
//!
//! The [`CollisionDispatcher`] walks the overlapping pairs produced by a
//! broadphase, looks up the two [`CollisionObject`]s behind each pair, picks
//! an algorithm from a table indexed by both shape kinds, and fills a
//! [`ContactManifold`] for the pair. Manifolds live in a generational arena;
//! their ids sit in each pair's `algorithm` slot and come back through
//! [`PairCache::take_released_algorithms`] when the broadphase drops the pair.

use std::cmp::Ordering;
use std::hash::BuildHasher;

use hashbrown::HashMap;
use nalgebra::{Isometry3, Point3, Vector3};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::gjk::{ClosestPointInput, ContactSink, GjkPairDetector};
use crate::handle::{AlgorithmId, Arena, ObjectId, ProxyHandle};
use crate::pair_cache::PairCache;
use crate::shape::{ConvexShape, ShapeKind};
use crate::stats::CollisionStats;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Points kept per manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

// ============================================================================
// Collision objects
// ============================================================================

/// How an object takes part in contact response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectFlags {
    /// Immovable.
    pub is_static: bool,
    /// Moved by the application, not by contacts.
    pub is_kinematic: bool,
    /// Generates contacts but no response (triggers).
    pub no_contact_response: bool,
}

impl ObjectFlags {
    /// Flags of a static object.
    #[must_use]
    pub const fn static_object() -> Self {
        Self {
            is_static: true,
            is_kinematic: false,
            no_contact_response: false,
        }
    }

    /// Flags of a kinematic object.
    #[must_use]
    pub const fn kinematic_object() -> Self {
        Self {
            is_static: false,
            is_kinematic: true,
            no_contact_response: false,
        }
    }

    /// Whether the object never moves in response to contacts.
    #[must_use]
    pub const fn is_static_or_kinematic(&self) -> bool {
        self.is_static || self.is_kinematic
    }
}

/// A shape placed in the world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionObject {
    /// Owner id, matching the proxy's owner.
    pub id: ObjectId,
    /// Collision shape.
    pub shape: ConvexShape,
    /// World pose of the shape.
    pub transform: Isometry3<f64>,
    /// Response flags.
    pub flags: ObjectFlags,
    /// Whether the object is awake.
    pub active: bool,
    /// Simulation island, if assigned.
    pub island_tag: Option<u32>,
}

impl CollisionObject {
    /// Create an active dynamic object.
    #[must_use]
    pub fn new(id: ObjectId, shape: ConvexShape, transform: Isometry3<f64>) -> Self {
        Self {
            id,
            shape,
            transform,
            flags: ObjectFlags::default(),
            active: true,
            island_tag: None,
        }
    }

    /// Set the response flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the island tag.
    #[must_use]
    pub fn with_island(mut self, tag: u32) -> Self {
        self.island_tag = Some(tag);
        self
    }

    /// Mark the object asleep.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether contacts with this object produce a response.
    #[must_use]
    pub fn has_contact_response(&self) -> bool {
        !self.flags.no_contact_response
    }
}

/// Lookup of the object behind a broadphase proxy.
pub trait ObjectLookup {
    /// Object registered for `proxy`.
    fn object(&self, proxy: ProxyHandle) -> Option<&CollisionObject>;
}

impl<S: BuildHasher> ObjectLookup for HashMap<ProxyHandle, CollisionObject, S> {
    fn object(&self, proxy: ProxyHandle) -> Option<&CollisionObject> {
        self.get(&proxy)
    }
}

// ============================================================================
// Manifolds
// ============================================================================

/// One contact between two objects.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Point on object 0.
    pub point_on_a: Point3<f64>,
    /// Point on object 1.
    pub point_on_b: Point3<f64>,
    /// Normal on object 1, pointing toward object 0.
    pub normal_on_b: Vector3<f64>,
    /// Signed distance; negative when penetrating.
    pub distance: f64,
}

/// Contact points between two objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    body0: ObjectId,
    body1: ObjectId,
    island_tag: Option<u32>,
    responds: bool,
    breaking_threshold: f64,
    points: SmallVec<[ContactPoint; MAX_MANIFOLD_POINTS]>,
}

impl ContactManifold {
    /// Create an empty manifold between two objects.
    #[must_use]
    pub fn new(body0: ObjectId, body1: ObjectId, breaking_threshold: f64) -> Self {
        Self {
            body0,
            body1,
            island_tag: None,
            responds: true,
            breaking_threshold,
            points: SmallVec::new(),
        }
    }

    /// First object.
    #[must_use]
    pub fn body0(&self) -> ObjectId {
        self.body0
    }

    /// Second object.
    #[must_use]
    pub fn body1(&self) -> ObjectId {
        self.body1
    }

    /// Island the manifold belongs to.
    #[must_use]
    pub fn island_tag(&self) -> Option<u32> {
        self.island_tag
    }

    /// Whether the solver should respond to these contacts.
    #[must_use]
    pub fn needs_response(&self) -> bool {
        self.responds
    }

    /// Separation beyond which points are discarded.
    #[must_use]
    pub fn breaking_threshold(&self) -> f64 {
        self.breaking_threshold
    }

    /// Current contact points.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Number of contact points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Deepest contact point.
    #[must_use]
    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.points
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Drop every point.
    pub fn clear_points(&mut self) {
        self.points.clear();
    }
}

impl ContactSink for ContactManifold {
    fn add_contact_point(&mut self, normal_on_b: &Vector3<f64>, point_on_b: &Point3<f64>, distance: f64) {
        if distance > self.breaking_threshold {
            return;
        }
        let point = ContactPoint {
            point_on_a: point_on_b + normal_on_b * distance,
            point_on_b: *point_on_b,
            normal_on_b: *normal_on_b,
            distance,
        };
        if self.points.len() < MAX_MANIFOLD_POINTS {
            self.points.push(point);
            return;
        }
        // Full: replace the shallowest point if the new one is deeper.
        if let Some((index, shallowest)) = self
            .points
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
        {
            if distance < shallowest.distance {
                self.points[index] = point;
            }
        }
    }
}

/// Island ordering of two manifolds: by island, then by the two bodies.
///
/// A manifold's island is body 0's tag, or body 1's when body 0 has none.
/// Untagged manifolds sort first.
#[must_use]
pub fn island_order(a: &ContactManifold, b: &ContactManifold) -> Ordering {
    (a.island_tag, a.body0, a.body1).cmp(&(b.island_tag, b.body0, b.body1))
}

/// Sort manifolds so that each island's manifolds are contiguous.
pub fn sort_manifolds_by_island(manifolds: &mut [&ContactManifold]) {
    manifolds.sort_by(|a, b| island_order(a, b));
}

// ============================================================================
// Algorithm table
// ============================================================================

/// Narrow-phase algorithm run for a pair of shape kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlgorithmKind {
    /// GJK with the penetration fallback.
    ConvexConvex,
    /// Closed-form sphere against sphere.
    SphereSphere,
    /// No contacts.
    Empty,
}

type AlgorithmTable = [[AlgorithmKind; ShapeKind::COUNT]; ShapeKind::COUNT];

fn default_table() -> AlgorithmTable {
    let mut table = [[AlgorithmKind::ConvexConvex; ShapeKind::COUNT]; ShapeKind::COUNT];
    let sphere = ShapeKind::Sphere.index();
    table[sphere][sphere] = AlgorithmKind::SphereSphere;
    table
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs narrow-phase algorithms on broadphase pairs and owns their manifolds.
#[derive(Debug)]
pub struct CollisionDispatcher {
    config: DispatcherConfig,
    table: AlgorithmTable,
    manifolds: Arena<AlgorithmId, ContactManifold>,
}

impl CollisionDispatcher {
    /// Create a dispatcher.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            contact_breaking_threshold = config.contact_breaking_threshold,
            "created collision dispatcher"
        );
        Ok(Self {
            config,
            table: default_table(),
            manifolds: Arena::new(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Algorithm used for a pair of shape kinds.
    #[must_use]
    pub fn algorithm_for(&self, a: ShapeKind, b: ShapeKind) -> AlgorithmKind {
        self.table[a.index()][b.index()]
    }

    /// Override the algorithm for a pair of shape kinds, in both orders.
    pub fn register_algorithm(&mut self, a: ShapeKind, b: ShapeKind, kind: AlgorithmKind) {
        self.table[a.index()][b.index()] = kind;
        self.table[b.index()][a.index()] = kind;
    }

    /// Whether two objects should be tested at all.
    #[must_use]
    pub fn needs_collision(&self, a: &CollisionObject, b: &CollisionObject) -> bool {
        a.active || b.active
    }

    /// Whether contacts between two objects need a solver response.
    #[must_use]
    pub fn needs_response(&self, a: &CollisionObject, b: &CollisionObject) -> bool {
        a.has_contact_response()
            && b.has_contact_response()
            && !(a.flags.is_static_or_kinematic() && b.flags.is_static_or_kinematic())
    }

    /// Number of live manifolds.
    #[must_use]
    pub fn manifold_count(&self) -> usize {
        self.manifolds.len()
    }

    /// Manifold behind an algorithm id.
    #[must_use]
    pub fn manifold(&self, id: AlgorithmId) -> Option<&ContactManifold> {
        self.manifolds.get(id).ok()
    }

    /// Every live manifold.
    pub fn manifolds(&self) -> impl Iterator<Item = (AlgorithmId, &ContactManifold)> {
        self.manifolds.iter()
    }

    /// Manifolds with at least one point, ordered by island.
    #[must_use]
    pub fn manifolds_by_island(&self) -> Vec<&ContactManifold> {
        let mut sorted: Vec<&ContactManifold> = self
            .manifolds
            .iter()
            .map(|(_, m)| m)
            .filter(|m| !m.is_empty())
            .collect();
        sort_manifolds_by_island(&mut sorted);
        sorted
    }

    /// Free manifolds whose pairs the cache has dropped.
    pub fn release_manifolds<C: PairCache + ?Sized>(&mut self, cache: &mut C) -> usize {
        let released = cache.take_released_algorithms();
        let mut freed = 0;
        for id in released {
            if self.manifolds.remove(id).is_ok() {
                freed += 1;
            } else {
                warn!(?id, "released algorithm id has no manifold");
            }
        }
        freed
    }

    /// Run the narrow phase on every pair in `cache`.
    ///
    /// Manifolds released by the cache are freed first. Each remaining pair
    /// gets a manifold on first use, and its points are recomputed from
    /// scratch.
    pub fn dispatch_all_pairs<C, L>(&mut self, cache: &mut C, objects: &L, stats: &mut CollisionStats)
    where
        C: PairCache + ?Sized,
        L: ObjectLookup + ?Sized,
    {
        let freed = self.release_manifolds(cache);
        stats.contact_points = 0;

        for (proxy0, proxy1, algorithm) in cache.algorithm_slots() {
            let (Some(a), Some(b)) = (objects.object(proxy0), objects.object(proxy1)) else {
                trace!(%proxy0, %proxy1, "pair without objects");
                continue;
            };
            if !self.needs_collision(a, b) {
                continue;
            }
            let kind = self.algorithm_for(a.shape.kind(), b.shape.kind());
            if kind == AlgorithmKind::Empty {
                continue;
            }

            let id = match algorithm.filter(|id| self.manifolds.contains(*id)) {
                Some(id) => id,
                None => {
                    let manifold =
                        ContactManifold::new(a.id, b.id, self.config.contact_breaking_threshold);
                    match self.manifolds.insert(manifold) {
                        Ok(id) => {
                            *algorithm = Some(id);
                            id
                        }
                        Err(e) => {
                            warn!(error = %e, "cannot allocate contact manifold");
                            continue;
                        }
                    }
                }
            };
            let responds = self.needs_response(a, b);
            let Ok(manifold) = self.manifolds.get_mut(id) else {
                continue;
            };
            manifold.island_tag = a.island_tag.or(b.island_tag);
            manifold.responds = responds;
            manifold.clear_points();

            match kind {
                AlgorithmKind::SphereSphere => sphere_sphere(a, b, manifold),
                AlgorithmKind::ConvexConvex => {
                    convex_convex(a, b, &self.config, manifold, stats);
                }
                AlgorithmKind::Empty => {}
            }
            stats.dispatched_pairs += 1;
            stats.contact_points += manifold.len();
        }

        stats.live_manifolds = self.manifolds.len();
        trace!(
            freed,
            live = stats.live_manifolds,
            contacts = stats.contact_points,
            "dispatched pairs"
        );
    }

    /// Drop every manifold. Ids held by pair caches become stale.
    pub fn clear(&mut self) {
        self.manifolds.clear();
    }
}

// ============================================================================
// Algorithms
// ============================================================================

fn convex_convex(
    a: &CollisionObject,
    b: &CollisionObject,
    config: &DispatcherConfig,
    manifold: &mut ContactManifold,
    stats: &mut CollisionStats,
) {
    let reach = a.shape.margin() + b.shape.margin() + config.contact_breaking_threshold;
    let input = ClosestPointInput::new(a.transform, b.transform).with_maximum_distance(reach);
    GjkPairDetector::new(&a.shape, &b.shape, &config.gjk).closest_points(&input, manifold, stats);
}

fn sphere_sphere(a: &CollisionObject, b: &CollisionObject, manifold: &mut ContactManifold) {
    let (ConvexShape::Sphere { radius: ra }, ConvexShape::Sphere { radius: rb }) = (&a.shape, &b.shape)
    else {
        return;
    };
    let diff = a.transform.translation.vector - b.transform.translation.vector;
    let len = diff.norm();
    let distance = len - (ra + rb);
    if distance > manifold.breaking_threshold() {
        return;
    }
    let normal = if len > f64::EPSILON { diff / len } else { Vector3::x() };
    let point_on_b = Point3::from(b.transform.translation.vector + normal * *rb);
    manifold.add_contact_point(&normal, &point_on_b, distance);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::filter::CollisionFilter;
    use crate::handle::ArenaKey;
    use crate::pair_cache::{HashedPairCache, PairProxy};
    use approx::assert_relative_eq;

    fn proxy(index: u32) -> ProxyHandle {
        ProxyHandle::from_parts(index, 0)
    }

    fn add(cache: &mut HashedPairCache, a: u32, b: u32) {
        let f = CollisionFilter::default();
        cache.add_pair(PairProxy::new(proxy(a), f), PairProxy::new(proxy(b), f));
    }

    fn sphere_at(id: u64, x: f64) -> CollisionObject {
        CollisionObject::new(
            ObjectId::new(id),
            ConvexShape::sphere(1.0).unwrap(),
            Isometry3::translation(x, 0.0, 0.0),
        )
    }

    fn box_at(id: u64, x: f64) -> CollisionObject {
        CollisionObject::new(
            ObjectId::new(id),
            ConvexShape::box_shape(Vector3::repeat(1.0)).unwrap(),
            Isometry3::translation(x, 0.0, 0.0),
        )
    }

    #[test]
    fn test_default_table() {
        let d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        assert_eq!(
            d.algorithm_for(ShapeKind::Sphere, ShapeKind::Sphere),
            AlgorithmKind::SphereSphere
        );
        assert_eq!(
            d.algorithm_for(ShapeKind::Box, ShapeKind::Sphere),
            AlgorithmKind::ConvexConvex
        );
    }

    #[test]
    fn test_register_algorithm_is_symmetric() {
        let mut d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        d.register_algorithm(ShapeKind::Cone, ShapeKind::Box, AlgorithmKind::Empty);
        assert_eq!(d.algorithm_for(ShapeKind::Box, ShapeKind::Cone), AlgorithmKind::Empty);
    }

    #[test]
    fn test_needs_collision_and_response() {
        let d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let a = sphere_at(1, 0.0);
        let b = sphere_at(2, 1.0);
        assert!(d.needs_collision(&a, &b));
        assert!(!d.needs_collision(&a.clone().inactive(), &b.clone().inactive()));
        assert!(d.needs_collision(&a.clone().inactive(), &b));

        assert!(d.needs_response(&a, &b));
        let ground = b.clone().with_flags(ObjectFlags::static_object());
        let mover = a.clone().with_flags(ObjectFlags::kinematic_object());
        assert!(d.needs_response(&a, &ground));
        assert!(!d.needs_response(&mover, &ground));
        let trigger = a.with_flags(ObjectFlags {
            no_contact_response: true,
            ..ObjectFlags::default()
        });
        assert!(!d.needs_response(&trigger, &b));
    }

    #[test]
    fn test_manifold_lifecycle() {
        let mut d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let mut objects = HashMap::new();
        objects.insert(proxy(0), sphere_at(10, 0.0));
        objects.insert(proxy(1), sphere_at(11, 1.5));
        objects.insert(proxy(2), box_at(12, 10.0));
        objects.insert(proxy(3), box_at(13, 11.9));

        let mut cache = HashedPairCache::new();
        add(&mut cache, 0, 1);
        add(&mut cache, 2, 3);
        let mut stats = CollisionStats::new();
        d.dispatch_all_pairs(&mut cache, &objects, &mut stats);

        assert_eq!(d.manifold_count(), 2);
        assert_eq!(stats.live_manifolds, 2);
        assert_eq!(stats.dispatched_pairs, 2);
        assert_eq!(stats.contact_points, 2);
        assert!(cache.pairs().iter().all(|p| p.algorithm.is_some()));

        let spheres = cache.find_pair(proxy(0), proxy(1)).unwrap().algorithm.unwrap();
        let deepest = *d.manifold(spheres).unwrap().deepest().unwrap();
        assert_relative_eq!(deepest.distance, -0.5, epsilon = 1e-12);
        assert_relative_eq!(deepest.normal_on_b, -Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(deepest.point_on_b, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);

        let boxes = cache.find_pair(proxy(2), proxy(3)).unwrap().algorithm.unwrap();
        let deepest = *d.manifold(boxes).unwrap().deepest().unwrap();
        assert_relative_eq!(deepest.distance, -0.1, epsilon = 1e-3);

        // Re-dispatch reuses manifolds.
        d.dispatch_all_pairs(&mut cache, &objects, &mut stats);
        assert_eq!(d.manifold_count(), 2);
        assert_eq!(cache.find_pair(proxy(0), proxy(1)).unwrap().algorithm, Some(spheres));

        // Dropping the pair frees its manifold on the next pass.
        cache.remove_pair(proxy(0), proxy(1));
        d.dispatch_all_pairs(&mut cache, &objects, &mut stats);
        assert_eq!(d.manifold_count(), 1);
        assert!(d.manifold(spheres).is_none());
        assert_eq!(stats.live_manifolds, 1);
    }

    #[test]
    fn test_separated_pair_keeps_empty_manifold() {
        let mut d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let mut objects = HashMap::new();
        objects.insert(proxy(0), box_at(1, 0.0));
        objects.insert(proxy(1), box_at(2, 2.5));
        let mut cache = HashedPairCache::new();
        add(&mut cache, 0, 1);
        let mut stats = CollisionStats::new();
        d.dispatch_all_pairs(&mut cache, &objects, &mut stats);

        assert_eq!(d.manifold_count(), 1);
        assert_eq!(stats.contact_points, 0);
        assert!(d.manifolds_by_island().is_empty());
    }

    #[test]
    fn test_inactive_and_missing_objects_are_skipped() {
        let mut d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let mut objects = HashMap::new();
        objects.insert(proxy(0), sphere_at(1, 0.0).inactive());
        objects.insert(proxy(1), sphere_at(2, 1.0).inactive());
        let mut cache = HashedPairCache::new();
        add(&mut cache, 0, 1);
        add(&mut cache, 0, 7);
        let mut stats = CollisionStats::new();
        d.dispatch_all_pairs(&mut cache, &objects, &mut stats);
        assert_eq!(d.manifold_count(), 0);
        assert_eq!(stats.dispatched_pairs, 0);
    }

    #[test]
    fn test_manifold_caps_points() {
        let mut m = ContactManifold::new(ObjectId::new(1), ObjectId::new(2), 0.02);
        for depth in [-0.1, -0.2, -0.05, -0.3, -0.4] {
            m.add_contact_point(&Vector3::z(), &Point3::origin(), depth);
        }
        // Beyond the breaking threshold.
        m.add_contact_point(&Vector3::z(), &Point3::origin(), 0.5);
        assert_eq!(m.len(), MAX_MANIFOLD_POINTS);
        assert!(m.points().iter().all(|p| p.distance != -0.05));
        assert_eq!(m.deepest().unwrap().distance, -0.4);
    }

    #[test]
    fn test_island_order_is_total() {
        let tagged = |tag: Option<u32>, a: u64, b: u64| {
            let mut m = ContactManifold::new(ObjectId::new(a), ObjectId::new(b), 0.0);
            m.island_tag = tag;
            m
        };
        let m0 = tagged(Some(2), 1, 2);
        let m1 = tagged(Some(1), 5, 6);
        let m2 = tagged(None, 3, 4);
        let m3 = tagged(Some(1), 4, 9);
        let mut list = vec![&m0, &m1, &m2, &m3];
        sort_manifolds_by_island(&mut list);
        let order: Vec<_> = list.iter().map(|m| (m.island_tag(), m.body0().raw())).collect();
        assert_eq!(order, vec![(None, 3), (Some(1), 4), (Some(1), 5), (Some(2), 1)]);

        // Antisymmetric and consistent.
        for x in [&m0, &m1, &m2, &m3] {
            assert_eq!(island_order(x, x), Ordering::Equal);
            for y in [&m0, &m1, &m2, &m3] {
                assert_eq!(island_order(x, y), island_order(y, x).reverse());
            }
        }
    }

    #[test]
    fn test_island_tag_falls_back_to_body1() {
        let mut d = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
        let mut objects = HashMap::new();
        objects.insert(proxy(0), sphere_at(1, 0.0));
        objects.insert(proxy(1), sphere_at(2, 1.0).with_island(7));
        let mut cache = HashedPairCache::new();
        add(&mut cache, 0, 1);
        d.dispatch_all_pairs(&mut cache, &objects, &mut CollisionStats::new());
        let sorted = d.manifolds_by_island();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].island_tag(), Some(7));
    }
}
