// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Fake start and finish vertices for in-tile searches.
//!
//! Routes rarely begin or end exactly at a feature point, so the [Starter]
//! wraps an [IndexGraph] with two synthetic segments: the start, which emits
//! edges onto the snapped host segment priced at the remaining part of it,
//! and the finish, which intercepts edges entering its host segment and
//! prices them at the part up to the snapped point. The rest of the graph
//! passes through untouched.

use crate::astar::RoutingGraph;
use crate::estimator::EdgeEstimator;
use crate::graph::{Edge, IndexGraph};
use crate::kd::SnappedPoint;
use crate::{LatLon, Segment, FAKE_FEATURE_ID};

#[derive(Debug)]
pub struct Starter<'a> {
    graph: &'a IndexGraph,
    estimator: &'a EdgeEstimator<'a>,
    start: SnappedPoint,
    finish: SnappedPoint,
    start_segment: Segment,
    finish_segment: Segment,
}

impl<'a> Starter<'a> {
    pub fn new(
        graph: &'a IndexGraph,
        estimator: &'a EdgeEstimator<'a>,
        start: SnappedPoint,
        finish: SnappedPoint,
    ) -> Self {
        Self {
            graph,
            estimator,
            start,
            finish,
            start_segment: Segment::new(graph.tile(), FAKE_FEATURE_ID, 0, true),
            finish_segment: Segment::new(graph.tile(), FAKE_FEATURE_ID + 1, 0, true),
        }
    }

    /// The synthetic segment every route begins with.
    pub fn start_segment(&self) -> Segment {
        self.start_segment
    }

    /// The synthetic segment every route ends with.
    pub fn finish_segment(&self) -> Segment {
        self.finish_segment
    }

    pub fn start_point(&self) -> LatLon {
        self.start.point
    }

    pub fn finish_point(&self) -> LatLon {
        self.finish.point
    }

    pub fn start_snap(&self) -> &SnappedPoint {
        &self.start
    }

    pub fn finish_snap(&self) -> &SnappedPoint {
        &self.finish
    }

    /// Fraction of the directed segment that remains after the start snap.
    fn remaining_after_start(&self, directed: Segment) -> f64 {
        if directed.forward {
            1.0 - self.start.fraction
        } else {
            self.start.fraction
        }
    }

    /// Fraction of the directed segment covered up to the finish snap.
    fn covered_till_finish(&self, directed: Segment) -> f64 {
        if directed.forward {
            self.finish.fraction
        } else {
            1.0 - self.finish.fraction
        }
    }

    fn directed_weight(&self, directed: Segment) -> Option<f64> {
        let road = self.graph.geometry().road(directed.feature)?;
        let weight = self.estimator.segment_weight(&directed, road);
        weight.is_finite().then_some(weight)
    }

    /// Both traversal directions of the snapped host segment that the
    /// profile may enter. Snapping always yields the forward orientation.
    fn host_directions(&self, host: Segment) -> Vec<Segment> {
        [host, host.reversed()]
            .into_iter()
            .filter(|&d| self.graph.can_enter(self.estimator, d))
            .collect()
    }

    fn same_host(&self) -> bool {
        self.start.segment == self.finish.segment
    }

    /// Direct start-to-finish edges when both snaps share a host segment.
    fn direct_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        if !self.same_host() {
            return edges;
        }
        for directed in self.host_directions(self.start.segment) {
            let along = if directed.forward {
                self.finish.fraction - self.start.fraction
            } else {
                self.start.fraction - self.finish.fraction
            };
            if along < 0.0 {
                continue;
            }
            if let Some(weight) = self.directed_weight(directed) {
                edges.push(Edge {
                    to: self.finish_segment,
                    weight: weight * along,
                });
            }
        }
        edges
    }
}

impl Starter<'_> {
    /// The directed finish-host segment a route arriving from `pred` must
    /// have entered, or `None` for the direct start-to-finish hop.
    ///
    /// The fake finish erases the entered direction from the search result;
    /// this recovers it the same way the redirect edges were priced, so an
    /// ambiguous junction resolves to the direction the search chose.
    pub(crate) fn finish_entry(&self, pred: Segment) -> Option<Segment> {
        if pred == self.start_segment {
            return None;
        }
        let edges = self.graph.edges(self.estimator, pred, true);
        let mut best: Option<(f64, Segment)> = None;
        for directed in self.host_directions(self.finish.segment) {
            if !edges.iter().any(|e| e.to == directed) {
                continue;
            }
            let Some(weight) = self.directed_weight(directed) else {
                continue;
            };
            let cost = weight * self.covered_till_finish(directed);
            if best.map(|(b, _)| cost < b).unwrap_or(true) {
                best = Some((cost, directed));
            }
        }
        best.map(|(_, directed)| directed)
    }

    /// Strips the fake endpoints off a search result and re-attaches the
    /// finish-host segment the route actually ends on.
    pub(crate) fn realize_path(&self, raw: &[Segment]) -> Vec<Segment> {
        let mut real: Vec<Segment> = raw.iter().copied().filter(|s| !s.is_fake()).collect();
        if raw.last() == Some(&self.finish_segment) {
            let pred = real.last().copied().unwrap_or(self.start_segment);
            if let Some(entered) = self.finish_entry(pred) {
                real.push(entered);
            }
        }
        real
    }
}

impl RoutingGraph for Starter<'_> {
    fn out_edges(&self, from: Segment) -> Vec<Edge> {
        if from == self.finish_segment {
            return Vec::new();
        }
        if from == self.start_segment {
            let mut edges = self.direct_edges();
            for directed in self.host_directions(self.start.segment) {
                if let Some(weight) = self.directed_weight(directed) {
                    edges.push(Edge {
                        to: directed,
                        weight: weight * self.remaining_after_start(directed),
                    });
                }
            }
            return edges;
        }

        let mut edges = self.graph.edges(self.estimator, from, true);
        // Edges entering the finish host also terminate at the fake finish.
        let mut redirected = Vec::new();
        for edge in &edges {
            if edge.to.feature == self.finish.segment.feature && edge.to.idx == self.finish.segment.idx
            {
                if let Some(weight) = self.directed_weight(edge.to) {
                    // Keep any u-turn penalty baked into the full edge.
                    redirected.push(Edge {
                        to: self.finish_segment,
                        weight: weight * self.covered_till_finish(edge.to)
                            + (edge.weight - weight).max(0.0),
                    });
                }
            }
        }
        edges.extend(redirected);
        edges
    }

    fn in_edges(&self, to: Segment) -> Vec<Edge> {
        if to == self.start_segment {
            return Vec::new();
        }
        if to == self.finish_segment {
            let mut edges: Vec<Edge> = self
                .direct_edges()
                .into_iter()
                .map(|edge| Edge {
                    to: self.start_segment,
                    weight: edge.weight,
                })
                .collect();
            for directed in self.host_directions(self.finish.segment) {
                let Some(weight) = self.directed_weight(directed) else {
                    continue;
                };
                let partial = weight * self.covered_till_finish(directed);
                for pred in self.graph.edges(self.estimator, directed, false) {
                    // Keep any u-turn penalty baked into the full edge.
                    edges.push(Edge {
                        to: pred.to,
                        weight: partial + (pred.weight - weight).max(0.0),
                    });
                }
            }
            return edges;
        }

        let mut edges = self.graph.edges(self.estimator, to, false);
        if to.feature == self.start.segment.feature && to.idx == self.start.segment.idx {
            if self.graph.can_enter(self.estimator, to) {
                if let Some(weight) = self.directed_weight(to) {
                    edges.push(Edge {
                        to: self.start_segment,
                        weight: weight * self.remaining_after_start(to),
                    });
                }
            }
        }
        edges
    }

    fn estimate_to_finish(&self, v: Segment) -> f64 {
        let pos = self.position_of(v);
        self.estimator.heuristic(pos, self.finish.point)
    }

    fn estimate_from_start(&self, v: Segment) -> f64 {
        let pos = self.position_of(v);
        self.estimator.heuristic(self.start.point, pos)
    }
}

impl Starter<'_> {
    fn position_of(&self, v: Segment) -> LatLon {
        if v == self.start_segment {
            return self.start.point;
        }
        if v == self.finish_segment {
            return self.finish.point;
        }
        self.graph
            .geometry()
            .point(v.front_point())
            .unwrap_or(self.finish.point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astar::{find_route_bidirectional, DEFAULT_STEP_LIMIT};
    use crate::geometry::{Geometry, HighwayClass, Joint, RoadGeometry};
    use crate::graph::RoadAccess;
    use crate::kd::SegmentTree;
    use crate::profile::CAR;
    use crate::LatLon;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn road(points: Vec<LatLon>, one_way: bool) -> RoadGeometry {
        RoadGeometry::new(
            points,
            one_way,
            true,
            36.0, // 10 m/s, convenient for weight arithmetic
            HighwayClass::Residential,
            false,
            false,
            String::new(),
            Vec::new(),
        )
    }

    /// One straight west-east road with points every ~111 m.
    fn straight_graph(one_way: bool) -> IndexGraph {
        let geometry = Geometry::new(vec![road(
            vec![
                LatLon::new(0.0, 0.000),
                LatLon::new(0.0, 0.001),
                LatLon::new(0.0, 0.002),
                LatLon::new(0.0, 0.003),
            ],
            one_way,
        )]);
        IndexGraph::new(0, Arc::new(geometry), Vec::new(), RoadAccess::new())
    }

    fn snap(graph: &IndexGraph, point: LatLon) -> SnappedPoint {
        SegmentTree::from_geometry(graph.tile(), graph.geometry())
            .nearest(point, f64::INFINITY)
            .unwrap()
    }

    fn run(starter: &Starter<'_>) -> Vec<Segment> {
        let cancel = AtomicBool::new(false);
        find_route_bidirectional(
            starter,
            starter.start_segment(),
            starter.finish_segment(),
            DEFAULT_STEP_LIMIT,
            &cancel,
        )
        .unwrap()
    }

    #[test]
    fn routes_between_mid_road_points() {
        let graph = straight_graph(false);
        let estimator = EdgeEstimator::new(&CAR);
        let starter = Starter::new(
            &graph,
            &estimator,
            snap(&graph, LatLon::new(0.0, 0.0005)),
            snap(&graph, LatLon::new(0.0, 0.0025)),
        );

        let path = run(&starter);
        assert_eq!(path.first(), Some(&starter.start_segment()));
        assert_eq!(path.last(), Some(&starter.finish_segment()));
        // start host (0), middle (1), finish host (2) redirected into the fake
        assert!(path.contains(&Segment::new(0, 0, 1, true)));
        assert!(!path.iter().any(|s| !s.is_fake() && !s.forward));
    }

    #[test]
    fn same_segment_forward_is_a_single_hop() {
        let graph = straight_graph(false);
        let estimator = EdgeEstimator::new(&CAR);
        let starter = Starter::new(
            &graph,
            &estimator,
            snap(&graph, LatLon::new(0.0, 0.0002)),
            snap(&graph, LatLon::new(0.0, 0.0008)),
        );

        let path = run(&starter);
        assert_eq!(path, vec![starter.start_segment(), starter.finish_segment()]);
    }

    #[test]
    fn same_segment_backward_stays_direct_on_a_two_way_road() {
        let graph = straight_graph(false);
        let estimator = EdgeEstimator::new(&CAR);
        let starter = Starter::new(
            &graph,
            &estimator,
            snap(&graph, LatLon::new(0.0, 0.0008)),
            snap(&graph, LatLon::new(0.0, 0.0002)),
        );

        let path = run(&starter);
        assert_eq!(path, vec![starter.start_segment(), starter.finish_segment()]);
    }

    #[test]
    fn finish_behind_start_on_a_one_way_road_has_no_route() {
        let graph = straight_graph(true);
        let estimator = EdgeEstimator::new(&CAR);
        let starter = Starter::new(
            &graph,
            &estimator,
            snap(&graph, LatLon::new(0.0, 0.0008)),
            snap(&graph, LatLon::new(0.0, 0.0002)),
        );

        assert!(run(&starter).is_empty());
    }

    #[test]
    fn partial_weights_add_up_to_the_full_distance() {
        let graph = straight_graph(false);
        let estimator = EdgeEstimator::new(&CAR);
        let start = snap(&graph, LatLon::new(0.0, 0.0005));
        let finish = snap(&graph, LatLon::new(0.0, 0.0025));
        let starter = Starter::new(&graph, &estimator, start, finish);

        let path = run(&starter);
        let mut total = 0.0;
        for pair in path.windows(2) {
            let edge = starter
                .out_edges(pair[0])
                .into_iter()
                .find(|e| e.to == pair[1])
                .unwrap();
            total += edge.weight;
        }
        // ~222 m at 10 m/s
        let expected = start.point.distance(&finish.point) / 10.0;
        assert!((total - expected).abs() < expected * 0.05, "total {}", total);
    }

    #[test]
    fn detour_via_junction_when_the_straight_path_is_restricted() {
        // Start on a one-way pointing away from the finish: the route must
        // leave through the junction at the far end and return on the
        // parallel road.
        let geometry = Geometry::new(vec![
            road(
                vec![LatLon::new(0.0, 0.000), LatLon::new(0.0, 0.001), LatLon::new(0.0, 0.002)],
                true,
            ),
            road(
                vec![LatLon::new(0.0, 0.002), LatLon::new(0.001, 0.001), LatLon::new(0.0, 0.000)],
                false,
            ),
        ]);
        let joints = vec![
            Joint::new(vec![crate::RoadPoint::new(0, 2), crate::RoadPoint::new(1, 0)]),
            Joint::new(vec![crate::RoadPoint::new(0, 0), crate::RoadPoint::new(1, 2)]),
        ];
        let graph = IndexGraph::new(0, Arc::new(geometry), joints, RoadAccess::new());
        let estimator = EdgeEstimator::new(&CAR);

        let tree = SegmentTree::from_geometry(0, graph.geometry());
        let start = tree.nearest(LatLon::new(0.0, 0.0015), f64::INFINITY).unwrap();
        let finish = tree.nearest(LatLon::new(0.0, 0.0005), f64::INFINITY).unwrap();
        assert_eq!(start.segment.feature, 0);
        assert_eq!(finish.segment.feature, 0);

        let starter = Starter::new(&graph, &estimator, start, finish);
        let path = run(&starter);
        assert!(!path.is_empty());
        assert!(path.iter().any(|s| s.feature == 1), "path: {:?}", path);
    }
}
