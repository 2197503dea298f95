//! Rigid-body collision detection: broad phase and convex narrow phase.
//!
//! This crate answers two questions every simulation step:
//!
//! - **Broad phase**: which pairs of moving objects *may* be touching? Three
//!   interchangeable broadphases keep a [`PairCache`] of overlapping AABB
//!   pairs up to date as proxies are created, moved and destroyed.
//! - **Narrow phase**: for each candidate pair, what is the exact contact
//!   geometry? [`GjkPairDetector`] computes distance, penetration depth and
//!   contact point between two [`ConvexShape`]s, and the
//!   [`CollisionDispatcher`] runs it over a whole pair cache, keeping one
//!   [`ContactManifold`] per pair.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  BroadPhase: AxisSweep | DbvtBroadphase | SimpleBroadphase  │
//! │  create_proxy / set_aabb / calculate_overlapping_pairs      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ add / remove pair
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PairCache: Hashed | Sorted (deferred) | Null               │
//! │  OverlappingPair { proxy0, proxy1, algorithm }              │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ dispatch_all_pairs
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CollisionDispatcher: shape-kind table → GJK / analytic     │
//! │  ContactManifold per pair, sorted by island                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is single-threaded and synchronous. Handles are
//! generation-checked, so a handle kept past `destroy_proxy` is reported as
//! [`CollisionError::StaleHandle`] instead of aliasing a new proxy.
//!
//! # Quick Start
//!
//! ```
//! use hashbrown::HashMap;
//! use nalgebra::Isometry3;
//! use sim_collision::{
//!     BroadPhase, CollisionDispatcher, CollisionFilter, CollisionObject, CollisionStats,
//!     ConvexShape, DbvtBroadphase, DbvtBroadphaseConfig, DispatcherConfig, ObjectId,
//! };
//!
//! let mut broadphase = DbvtBroadphase::new(DbvtBroadphaseConfig::default()).unwrap();
//! let mut dispatcher = CollisionDispatcher::new(DispatcherConfig::default()).unwrap();
//! let mut objects = HashMap::new();
//!
//! for (i, x) in [0.0, 1.5].into_iter().enumerate() {
//!     let object = CollisionObject::new(
//!         ObjectId::new(i as u64),
//!         ConvexShape::sphere(1.0).unwrap(),
//!         Isometry3::translation(x, 0.0, 0.0),
//!     );
//!     let aabb = object.shape.aabb(&object.transform);
//!     let proxy = broadphase
//!         .create_proxy(aabb, object.id, CollisionFilter::default())
//!         .unwrap();
//!     objects.insert(proxy, object);
//! }
//!
//! broadphase.calculate_overlapping_pairs();
//! let mut stats = CollisionStats::new();
//! dispatcher.dispatch_all_pairs(broadphase.pair_cache_mut(), &objects, &mut stats);
//!
//! assert_eq!(stats.contact_points, 1);
//! let manifold = dispatcher.manifolds_by_island()[0];
//! assert!(manifold.deepest().unwrap().distance < 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-collision/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,       // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,           // mul_add style changes aren't always clearer
    clippy::neg_cmp_op_on_partial_ord,  // !(x > 0.0) is intentional for NaN rejection
    clippy::option_if_let_else,         // if-let is often more readable than map_or_else
    clippy::too_many_lines,             // Incremental sorts naturally have many steps
    clippy::doc_markdown,               // Not all technical terms need backticks
    clippy::cast_precision_loss,        // Statistics ratios over u64 counters
    clippy::module_name_repetitions,    // BroadPhaseConfig, DbvtBroadphaseConfig, ...
)]

// Geometry primitives and handles
pub mod aabb;
pub mod filter;
pub mod handle;
pub mod shape;

// Configuration and errors
pub mod config;
pub mod error;

// Broad phase
pub mod broad_phase;
pub mod dbvt;
pub mod observer;
pub mod pair_cache;

// Narrow phase
pub mod dispatch;
pub mod gjk;
pub mod penetration;
pub mod simplex;
pub mod stats;

pub use aabb::{Aabb, Axis, RaySlab};
pub use broad_phase::{
    AxisSweep, BroadPhase, BroadPhaseDetector, DbvtBroadphase, DbvtUpdateStats, ProxyInfo,
    STAGE_COUNT, SimpleBroadphase,
};
pub use config::{
    AXIS_SWEEP_MAX_HANDLES, AxisSweepConfig, BroadPhaseAlgorithm, BroadPhaseConfig,
    DbvtBroadphaseConfig, DispatcherConfig, GjkConfig, SimpleBroadphaseConfig,
};
pub use dbvt::{Dbvt, NodeId};
pub use dispatch::{
    AlgorithmKind, CollisionDispatcher, CollisionObject, ContactManifold, ContactPoint,
    MAX_MANIFOLD_POINTS, ObjectFlags, ObjectLookup, island_order, sort_manifolds_by_island,
};
pub use error::{CollisionError, Result};
pub use filter::CollisionFilter;
pub use gjk::{
    ClosestPointInput, ContactSink, GjkPairDetector, GjkTermination, PointCollector,
    closest_points,
};
pub use handle::{AlgorithmId, ObjectId, ProxyHandle};
pub use pair_cache::{
    AlgorithmSlots, HashedPairCache, NullPairCache, OverlapFilterCallback, OverlappingPair,
    PairCache, PairCacheStats, PairProxy, SortedPairCache,
};
pub use penetration::{Penetration, minkowski_penetration};
pub use shape::{ConvexShape, DEFAULT_MARGIN, ShapeKind};
pub use simplex::VoronoiSimplex;
pub use stats::CollisionStats;

#[cfg(debug_assertions)]
pub use observer::{BroadphaseObserver, ObservedEvent, RecordingObserver};
