// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! A* search over abstract segment graphs.
//!
//! Both searches are generic over [RoutingGraph], so the same code routes
//! within a single tile (through a [Starter](crate::Starter)) and over the
//! cross-tile meta graph.

mod bidirectional;
mod unidirectional;

pub use bidirectional::find_route_bidirectional;
pub use unidirectional::find_route;

use crate::graph::Edge;
use crate::Segment;

/// Recommended number of allowed segment expansions before
/// [SearchError::StepLimitExceeded] is returned.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// A directed graph of [Segment] transitions with admissible cost estimates.
///
/// `out_edges` and `in_edges` must agree: `v` lists `u -> v` among its
/// incoming edges with the same weight that `u` lists for it. The estimates
/// must never overestimate the true remaining cost, otherwise the search may
/// return a suboptimal route.
pub trait RoutingGraph {
    /// Edges leaving `from`; `Edge::to` is the successor.
    fn out_edges(&self, from: Segment) -> Vec<Edge>;

    /// Edges entering `to`; `Edge::to` is the predecessor.
    fn in_edges(&self, to: Segment) -> Vec<Edge>;

    /// Lower bound on the cost from `v` to the search's finish.
    fn estimate_to_finish(&self, v: Segment) -> f64;

    /// Lower bound on the cost from the search's start to `v`.
    fn estimate_from_start(&self, v: Segment) -> f64;
}

/// Error conditions which may occur during route search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// Route search has exceeded its limit of steps.
    /// Either the endpoints are really far apart, or no route exists.
    ///
    /// Concluding that no route exists requires traversing the whole graph,
    /// which can result in a denial-of-service. The step limit protects
    /// against resource exhaustion.
    #[error("step limit exceeded")]
    StepLimitExceeded,

    /// The cooperative cancellation flag was raised.
    #[error("search was cancelled")]
    Cancelled,
}

/// Priority queue entry. Lower scores are considered better ("higher"),
/// as Rust's BinaryHeap is a max-heap. Ties resolve to the entry with the
/// higher known cost, then to the smaller segment, which keeps expansion
/// order (and thus the returned route) fully deterministic.
#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: Segment,
    cost: f64,
    score: f64,
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.cost.total_cmp(&other.cost))
            .then_with(|| other.at.cmp(&self.at))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for QueueItem {}

#[cfg(test)]
pub(crate) mod test_graph {
    use super::*;
    use std::collections::HashMap;

    /// Node-and-arc fixture: vertices are segments `(0, id, 0, true)` and
    /// estimates come from a per-vertex potential table (zero by default,
    /// which degrades the search to Dijkstra).
    #[derive(Debug, Default)]
    pub struct FixtureGraph {
        pub out: HashMap<Segment, Vec<Edge>>,
        pub into: HashMap<Segment, Vec<Edge>>,
        pub to_finish: HashMap<Segment, f64>,
        pub from_start: HashMap<Segment, f64>,
    }

    pub fn v(id: u32) -> Segment {
        Segment::new(0, id, 0, true)
    }

    impl FixtureGraph {
        pub fn arc(&mut self, from: u32, to: u32, weight: f64) {
            self.out
                .entry(v(from))
                .or_default()
                .push(Edge { to: v(to), weight });
            self.into
                .entry(v(to))
                .or_default()
                .push(Edge { to: v(from), weight });
        }
    }

    impl RoutingGraph for FixtureGraph {
        fn out_edges(&self, from: Segment) -> Vec<Edge> {
            self.out.get(&from).cloned().unwrap_or_default()
        }

        fn in_edges(&self, to: Segment) -> Vec<Edge> {
            self.into.get(&to).cloned().unwrap_or_default()
        }

        fn estimate_to_finish(&self, s: Segment) -> f64 {
            self.to_finish.get(&s).copied().unwrap_or(0.0)
        }

        fn estimate_from_start(&self, s: Segment) -> f64 {
            self.from_start.get(&s).copied().unwrap_or(0.0)
        }
    }
}
