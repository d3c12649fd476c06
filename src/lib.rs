// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Turn-by-turn routing over offline binary map tiles.
//!
//! A road network is stored in per-region tile files ([tile]), lazily
//! memory-mapped and decoded by a [TileLoader]. Per-tile adjacency is
//! exposed by an [IndexGraph] over directed half-edges of road features
//! ([Segment]), weighted by an [EdgeEstimator] driven by a data-only
//! [VehicleProfile]. Shortest paths are found with bidirectional A*
//! ([astar]), across tile borders if needed ([world]), and the raw
//! segment path is turned into a [Route] with human-readable turn
//! instructions ([turns]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! let mut router = routier::Router::new(
//!     "path/to/tiles",
//!     &routier::profile::CAR,
//! ).expect("failed to open tile directory");
//!
//! let cancel = AtomicBool::new(false);
//! let route = router
//!     .build_route(
//!         routier::LatLon::new(52.2297, 21.0122),
//!         routier::LatLon::new(52.2370, 21.0175),
//!         &cancel,
//!     )
//!     .expect("failed to build route");
//!
//! for turn in route.turns() {
//!     println!("{:?} at point {}", turn.direction, turn.point_index);
//! }
//! ```

pub mod astar;
mod distance;
pub mod estimator;
pub mod geometry;
mod graph;
mod kd;
mod loader;
pub mod profile;
mod route;
mod router;
mod session;
mod starter;
pub mod tile;
pub mod turns;
mod world;

pub use distance::earth_distance;
pub use estimator::{EdgeEstimator, TrafficOverlay};
pub use geometry::{Geometry, RoadGeometry};
pub use graph::{Edge, IndexGraph, Restriction, RestrictionKind, RoadAccess, RoadAccessKind};
pub use kd::{SegmentTree, SnappedPoint};
pub use loader::{LoadedTile, TileLoader, TileRegistry};
pub use profile::VehicleProfile;
pub use route::{Route, RouteCamera};
pub use router::Router;
pub use session::{RouteRequest, Session};
pub use starter::Starter;
pub use world::{CheckedLeg, CheckedPath, WorldGraph, WorldRoute};

/// Numeric identifier of one loaded tile, assigned by a [TileRegistry].
///
/// Tiles are identified on disk by their file name; the registry maps those
/// names onto dense indices so that a [Segment] stays a small value type.
pub type TileId = u32;

/// Identifier of one [Joint](geometry::Joint) inside a single tile.
pub type JointId = u32;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another position, in meters.
    pub fn distance(&self, other: &LatLon) -> f64 {
        earth_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Identifies one endpoint of a road feature: `(featureId, pointIdx)`.
///
/// Used to define [Joints](geometry::Joint) - sets of road points which
/// coincide at the same real-world location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoadPoint {
    pub feature: u32,
    pub point: u32,
}

impl RoadPoint {
    pub const fn new(feature: u32, point: u32) -> Self {
        Self { feature, point }
    }
}

/// A directed half-edge between two consecutive points of one road feature.
///
/// `Segment { tile, feature, idx, forward }` identifies the edge between
/// feature points `idx` and `idx + 1`, traversed in point order when
/// `forward` and against it otherwise. A segment is valid only if
/// `idx < points.len() - 1` for the corresponding [RoadGeometry].
///
/// Segments are pure keys: equality, ordering and hashing are total, so they
/// can be used in maps and priority queues. Feature ids at or above
/// [FAKE_FEATURE_ID] never occur in tile data and are reserved for the
/// synthetic start/finish vertices spliced in by a [Starter].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    pub tile: TileId,
    pub feature: u32,
    pub idx: u32,
    pub forward: bool,
}

/// First feature id reserved for fake (synthetic) segments.
pub const FAKE_FEATURE_ID: u32 = 1 << 30;

impl Segment {
    pub const fn new(tile: TileId, feature: u32, idx: u32, forward: bool) -> Self {
        Self {
            tile,
            feature,
            idx,
            forward,
        }
    }

    /// The same edge traversed in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            forward: !self.forward,
            ..*self
        }
    }

    /// Road point at the rear (entry) end of the segment.
    pub fn rear_point(&self) -> RoadPoint {
        RoadPoint::new(
            self.feature,
            if self.forward { self.idx } else { self.idx + 1 },
        )
    }

    /// Road point at the front (exit) end of the segment.
    pub fn front_point(&self) -> RoadPoint {
        RoadPoint::new(
            self.feature,
            if self.forward { self.idx + 1 } else { self.idx },
        )
    }

    /// Whether this is a synthetic segment created by a [Starter].
    pub fn is_fake(&self) -> bool {
        self.feature >= FAKE_FEATURE_ID
    }
}

/// Error conditions surfaced by [Router::build_route].
///
/// Malformed but recoverable tile records (a dangling restriction, a camera
/// with unsupported conditions) are logged and skipped during load and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// A required tile, or a required section of it, is missing or corrupt.
    /// Contains the tile name, so the caller can suggest downloading it.
    #[error("tile unavailable: {0}")]
    TileUnavailable(String),

    /// No road segment was found within the search radius of the start point.
    #[error("no road near the start point")]
    StartPointNotFound,

    /// No road segment was found within the search radius of the finish point.
    #[error("no road near the finish point")]
    EndPointNotFound,

    /// The search exhausted the graph without connecting start and finish.
    /// Also returned when any leg of a cross-tile route fails.
    #[error("no route exists between the given points")]
    RouteNotFound,

    /// The cooperative cancellation flag was observed. Not an error to log:
    /// the result is simply discarded.
    #[error("route computation was cancelled")]
    Cancelled,
}

impl From<astar::SearchError> for RouterError {
    fn from(err: astar::SearchError) -> Self {
        match err {
            astar::SearchError::Cancelled => RouterError::Cancelled,
            // Exhausting the step budget without connecting the endpoints
            // is indistinguishable from a disconnected graph for callers.
            astar::SearchError::StepLimitExceeded => RouterError::RouteNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_endpoints() {
        let fwd = Segment::new(0, 7, 2, true);
        assert_eq!(fwd.rear_point(), RoadPoint::new(7, 2));
        assert_eq!(fwd.front_point(), RoadPoint::new(7, 3));

        let bwd = fwd.reversed();
        assert_eq!(bwd.rear_point(), RoadPoint::new(7, 3));
        assert_eq!(bwd.front_point(), RoadPoint::new(7, 2));
        assert_eq!(bwd.reversed(), fwd);
    }

    #[test]
    fn segment_ordering_is_total() {
        let a = Segment::new(0, 1, 0, false);
        let b = Segment::new(0, 1, 0, true);
        let c = Segment::new(0, 2, 0, false);
        assert!(a < b && b < c);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }
}
