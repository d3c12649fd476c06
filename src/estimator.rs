// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Edge weights and search heuristics.
//!
//! All functions here are pure: identical inputs always yield identical
//! outputs. The pathfinder re-evaluates edges from both search directions
//! and any hidden state would break its determinism guarantee.

use std::collections::HashMap;

use crate::geometry::RoadGeometry;
use crate::{LatLon, Segment, VehicleProfile};

/// Traffic factor modelling a temporarily blocked road. Large enough to
/// route around anything, but finite, so that a fully blocked area still
/// yields some route rather than none.
const TEMP_BLOCK_FACTOR: f64 = 1e4;

/// Real-time traffic overlay: per-segment slowdown factors.
///
/// A factor of `1.0` means free flow; `2.0` means half the base speed.
/// Factors below one are clamped away - traffic may never make a road
/// faster than its base speed, which would break heuristic admissibility.
#[derive(Debug, Clone, Default)]
pub struct TrafficOverlay {
    factors: HashMap<Segment, f64>,
}

impl TrafficOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_factor(&mut self, segment: Segment, factor: f64) {
        self.factors.insert(segment, factor.max(1.0));
    }

    pub fn set_blocked(&mut self, segment: Segment) {
        self.factors.insert(segment, TEMP_BLOCK_FACTOR);
    }

    pub fn factor(&self, segment: &Segment) -> f64 {
        self.factors.get(segment).copied().unwrap_or(1.0)
    }
}

/// Computes edge weights (travel time in seconds) and admissible lower
/// bounds for the A* search.
#[derive(Debug, Clone)]
pub struct EdgeEstimator<'a> {
    profile: &'a VehicleProfile<'a>,
    traffic: Option<&'a TrafficOverlay>,
}

impl<'a> EdgeEstimator<'a> {
    pub fn new(profile: &'a VehicleProfile<'a>) -> Self {
        Self {
            profile,
            traffic: None,
        }
    }

    pub fn with_traffic(profile: &'a VehicleProfile<'a>, traffic: &'a TrafficOverlay) -> Self {
        Self {
            profile,
            traffic: Some(traffic),
        }
    }

    pub fn profile(&self) -> &VehicleProfile<'a> {
        self.profile
    }

    /// Time to traverse one segment of `road`, in seconds.
    /// Impassable roads get an infinite weight.
    pub fn segment_weight(&self, segment: &Segment, road: &RoadGeometry) -> f64 {
        if !road.is_passable() || road.speed_kmh() <= 0.0 {
            return f64::INFINITY;
        }

        let distance = road.segment_len(segment.idx);
        let mut weight = distance / (road.speed_kmh() / 3.6);

        if let Some(traffic) = self.traffic {
            weight *= traffic.factor(segment);
        }

        weight
    }

    /// Admissible lower bound of the remaining travel time between two
    /// positions: great-circle distance at the profile's maximum speed.
    pub fn heuristic(&self, from: LatLon, to: LatLon) -> f64 {
        from.distance(&to) / self.profile.max_speed_mps()
    }

    /// Weight for a leap edge across a tile in cross-tile search.
    /// Assumes half the maximum speed, since intra-tile paths are never
    /// straight lines.
    pub fn leap_weight(&self, from: LatLon, to: LatLon) -> f64 {
        from.distance(&to) / (self.profile.max_speed_mps() / 2.0)
    }

    /// Time to travel from a requested position to the nearest road.
    pub fn offroad_weight(&self, from: LatLon, to: LatLon) -> f64 {
        from.distance(&to) / self.profile.offroad_speed_mps()
    }

    /// Fixed additive cost of turning around mid-route.
    pub fn uturn_penalty(&self) -> f64 {
        self.profile.uturn_penalty_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::HighwayClass;
    use crate::profile::CAR;

    fn residential_road() -> RoadGeometry {
        RoadGeometry::new(
            vec![LatLon::new(52.0, 21.0), LatLon::new(52.0, 21.01)],
            false,
            true,
            31.4,
            HighwayClass::Residential,
            false,
            false,
            String::new(),
            vec![],
        )
    }

    #[test]
    fn weight_is_distance_over_speed() {
        let est = EdgeEstimator::new(&CAR);
        let road = residential_road();
        let seg = Segment::new(0, 0, 0, true);

        let expected = road.segment_len(0) / (31.4 / 3.6);
        assert!((est.segment_weight(&seg, &road) - expected).abs() < 1e-9);
    }

    #[test]
    fn impassable_road_is_infinite() {
        let est = EdgeEstimator::new(&CAR);
        let road = RoadGeometry::new(
            vec![LatLon::new(52.0, 21.0), LatLon::new(52.0, 21.01)],
            false,
            false,
            0.0,
            HighwayClass::Path,
            false,
            false,
            String::new(),
            vec![],
        );
        let seg = Segment::new(0, 0, 0, true);
        assert!(est.segment_weight(&seg, &road).is_infinite());
    }

    #[test]
    fn traffic_only_slows_down() {
        let seg = Segment::new(0, 0, 0, true);
        let road = residential_road();

        let mut traffic = TrafficOverlay::new();
        traffic.set_factor(seg, 0.5); // clamped to 1.0
        let est = EdgeEstimator::with_traffic(&CAR, &traffic);
        let base = EdgeEstimator::new(&CAR).segment_weight(&seg, &road);
        assert!((est.segment_weight(&seg, &road) - base).abs() < 1e-9);

        let mut traffic = TrafficOverlay::new();
        traffic.set_factor(seg, 3.0);
        let est = EdgeEstimator::with_traffic(&CAR, &traffic);
        assert!((est.segment_weight(&seg, &road) - 3.0 * base).abs() < 1e-9);
    }

    #[test]
    fn heuristic_is_admissible() {
        // The heuristic must not overestimate the true cost of any segment:
        // true cost uses at most the profile's maximum speed over a path at
        // least as long as the great-circle distance.
        let est = EdgeEstimator::new(&CAR);
        let road = residential_road();
        let seg = Segment::new(0, 0, 0, true);

        let h = est.heuristic(road.point(0), road.point(1));
        assert!(h <= est.segment_weight(&seg, &road));

        // Leap weight is also a lower bound of the real traversal time.
        let leap = est.leap_weight(road.point(0), road.point(1));
        assert!(h <= leap);
    }
}
