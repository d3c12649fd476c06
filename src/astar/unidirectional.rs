// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{QueueItem, RoutingGraph, SearchError};
use crate::graph::Edge;
use crate::Segment;

fn reconstruct_path(came_from: &HashMap<Segment, Segment>, mut last: Segment) -> Vec<Segment> {
    let mut path = vec![last];

    while let Some(&prev) = came_from.get(&last) {
        path.push(prev);
        last = prev;
    }

    path.reverse();
    return path;
}

/// Uses the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm)
/// to find the cheapest sequence of segments between `from` and `to`.
///
/// Returns an empty vector if there is no route between the two segments.
///
/// `step_limit` limits how many segments may be expanded before giving up
/// with [SearchError::StepLimitExceeded]; the recommended value is
/// [DEFAULT_STEP_LIMIT](super::DEFAULT_STEP_LIMIT). The `cancel` flag is
/// polled on every expansion.
pub fn find_route<G: RoutingGraph>(
    g: &G,
    from: Segment,
    to: Segment,
    step_limit: usize,
    cancel: &AtomicBool,
) -> Result<Vec<Segment>, SearchError> {
    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
    let mut came_from: HashMap<Segment, Segment> = HashMap::default();
    let mut known_costs: HashMap<Segment, f64> = HashMap::default();
    let mut steps: usize = 0;

    queue.push(QueueItem {
        at: from,
        cost: 0.0,
        score: g.estimate_to_finish(from),
    });
    known_costs.insert(from, 0.0);

    while let Some(item) = queue.pop() {
        if item.at == to {
            return Ok(reconstruct_path(&came_from, to));
        }

        // Contrary to the wikipedia definition, we might keep multiple items
        // in the queue for the same segment.
        if item.cost > known_costs.get(&item.at).cloned().unwrap_or(f64::INFINITY) {
            continue;
        }

        if cancel.load(Ordering::Relaxed) {
            return Err(SearchError::Cancelled);
        }
        steps += 1;
        if steps > step_limit {
            return Err(SearchError::StepLimitExceeded);
        }

        for Edge {
            to: neighbor,
            weight,
        } in g.out_edges(item.at)
        {
            // Check if this is the cheapest way to the neighbor
            let neighbor_cost = item.cost + weight;
            if neighbor_cost >= known_costs.get(&neighbor).cloned().unwrap_or(f64::INFINITY) {
                continue;
            }

            // Push the new item into the queue
            came_from.insert(neighbor, item.at);
            known_costs.insert(neighbor, neighbor_cost);
            queue.push(QueueItem {
                at: neighbor,
                cost: neighbor_cost,
                score: neighbor_cost + g.estimate_to_finish(neighbor),
            });
        }
    }

    return Ok(vec![]);
}

#[cfg(test)]
mod tests {
    use super::super::test_graph::{v, FixtureGraph};
    use super::*;

    fn diamond() -> FixtureGraph {
        // 1 -> 2 -> 4 costs 3, 1 -> 3 -> 4 costs 4
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        g.arc(2, 4, 2.0);
        g.arc(1, 3, 1.0);
        g.arc(3, 4, 3.0);
        g
    }

    #[test]
    fn picks_the_cheaper_path() {
        let g = diamond();
        let cancel = AtomicBool::new(false);
        let path = find_route(&g, v(1), v(4), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1), v(2), v(4)]);
    }

    #[test]
    fn start_equals_finish() {
        let g = diamond();
        let cancel = AtomicBool::new(false);
        let path = find_route(&g, v(1), v(1), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1)]);
    }

    #[test]
    fn no_route_is_an_empty_path() {
        let mut g = diamond();
        g.arc(5, 6, 1.0);
        let cancel = AtomicBool::new(false);
        let path = find_route(&g, v(1), v(6), 100, &cancel).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn step_limit_is_enforced() {
        let mut g = FixtureGraph::default();
        for id in 0..100 {
            g.arc(id, id + 1, 1.0);
        }
        let cancel = AtomicBool::new(false);
        assert_eq!(
            find_route(&g, v(0), v(100), 10, &cancel),
            Err(SearchError::StepLimitExceeded),
        );
    }

    #[test]
    fn cancellation_wins_over_search() {
        let g = diamond();
        let cancel = AtomicBool::new(true);
        assert_eq!(
            find_route(&g, v(1), v(4), 100, &cancel),
            Err(SearchError::Cancelled),
        );
    }

    #[test]
    fn heuristic_steers_but_does_not_change_the_result() {
        let mut g = diamond();
        // Admissible potentials: true remaining costs.
        g.to_finish.insert(v(1), 3.0);
        g.to_finish.insert(v(2), 2.0);
        g.to_finish.insert(v(3), 3.0);
        let cancel = AtomicBool::new(false);
        let path = find_route(&g, v(1), v(4), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1), v(2), v(4)]);
    }
}
