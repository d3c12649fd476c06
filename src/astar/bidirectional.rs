// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{QueueItem, RoutingGraph, SearchError};
use crate::graph::Edge;
use crate::Segment;

/// One direction of the bidirectional search.
struct Side {
    queue: BinaryHeap<QueueItem>,
    came_from: HashMap<Segment, Segment>,
    known_costs: HashMap<Segment, f64>,
}

impl Side {
    fn new(source: Segment, initial_score: f64) -> Self {
        let mut queue = BinaryHeap::default();
        queue.push(QueueItem {
            at: source,
            cost: 0.0,
            score: initial_score,
        });
        let mut known_costs = HashMap::default();
        known_costs.insert(source, 0.0);
        Self {
            queue,
            came_from: HashMap::default(),
            known_costs,
        }
    }

    fn top_score(&self) -> f64 {
        self.queue.peek().map(|item| item.score).unwrap_or(f64::INFINITY)
    }
}

/// Uses [bidirectional A*](https://en.wikipedia.org/wiki/Bidirectional_search)
/// to find the cheapest sequence of segments between `from` and `to`.
///
/// Both frontiers are ordered by a single consistent potential,
/// `½(estimate_to_finish − estimate_from_start)`, negated for the backward
/// side, so a forward key and a backward key of the same segment always sum
/// to the cost of the path through it. The search stops once the best meeting
/// cost can no longer be improved by either frontier.
///
/// Returns an empty vector if there is no route between the two segments.
pub fn find_route_bidirectional<G: RoutingGraph>(
    g: &G,
    from: Segment,
    to: Segment,
    step_limit: usize,
    cancel: &AtomicBool,
) -> Result<Vec<Segment>, SearchError> {
    if from == to {
        return Ok(vec![from]);
    }

    let potential = |v: Segment| 0.5 * (g.estimate_to_finish(v) - g.estimate_from_start(v));

    let mut forward = Side::new(from, potential(from));
    let mut backward = Side::new(to, -potential(to));
    let mut best: Option<(f64, Segment)> = None;
    let mut steps: usize = 0;

    loop {
        let top_f = forward.top_score();
        let top_r = backward.top_score();
        if let Some((mu, _)) = best {
            if top_f + top_r >= mu {
                break;
            }
        }
        if top_f.is_infinite() && top_r.is_infinite() {
            break;
        }

        // Balance the frontiers by always advancing the cheaper one.
        let is_forward = top_f <= top_r;
        let (this, other) = if is_forward {
            (&mut forward, &backward)
        } else {
            (&mut backward, &forward)
        };
        let Some(item) = this.queue.pop() else {
            break;
        };

        // Contrary to the wikipedia definition, we might keep multiple items
        // in the queue for the same segment.
        if item.cost > this.known_costs.get(&item.at).cloned().unwrap_or(f64::INFINITY) {
            continue;
        }

        if cancel.load(Ordering::Relaxed) {
            return Err(SearchError::Cancelled);
        }
        steps += 1;
        if steps > step_limit {
            return Err(SearchError::StepLimitExceeded);
        }

        // The frontiers meet wherever the other side already knows a cost.
        if let Some(&other_cost) = other.known_costs.get(&item.at) {
            let mu = item.cost + other_cost;
            if best.map(|(best_mu, _)| mu < best_mu).unwrap_or(true) {
                best = Some((mu, item.at));
            }
        }

        let edges = if is_forward {
            g.out_edges(item.at)
        } else {
            g.in_edges(item.at)
        };
        for Edge {
            to: neighbor,
            weight,
        } in edges
        {
            let neighbor_cost = item.cost + weight;
            if neighbor_cost
                >= this
                    .known_costs
                    .get(&neighbor)
                    .cloned()
                    .unwrap_or(f64::INFINITY)
            {
                continue;
            }

            this.came_from.insert(neighbor, item.at);
            this.known_costs.insert(neighbor, neighbor_cost);
            let score = if is_forward {
                neighbor_cost + potential(neighbor)
            } else {
                neighbor_cost - potential(neighbor)
            };
            this.queue.push(QueueItem {
                at: neighbor,
                cost: neighbor_cost,
                score,
            });
        }
    }

    let Some((_, meeting)) = best else {
        return Ok(vec![]);
    };

    // Forward half, from the start up to the meeting segment...
    let mut path = vec![meeting];
    let mut cur = meeting;
    while let Some(&prev) = forward.came_from.get(&cur) {
        path.push(prev);
        cur = prev;
    }
    path.reverse();
    // ...then the backward half out to the finish.
    cur = meeting;
    while let Some(&next) = backward.came_from.get(&cur) {
        path.push(next);
        cur = next;
    }
    return Ok(path);
}

#[cfg(test)]
mod tests {
    use super::super::test_graph::{v, FixtureGraph};
    use super::super::find_route;
    use super::*;

    #[test]
    fn picks_the_cheaper_path() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        g.arc(2, 4, 2.0);
        g.arc(1, 3, 1.0);
        g.arc(3, 4, 3.0);
        let cancel = AtomicBool::new(false);
        let path = find_route_bidirectional(&g, v(1), v(4), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1), v(2), v(4)]);
    }

    #[test]
    fn frontiers_meet_in_the_middle_of_a_chain() {
        let mut g = FixtureGraph::default();
        for id in 0..10 {
            g.arc(id, id + 1, 1.0);
        }
        let cancel = AtomicBool::new(false);
        let path = find_route_bidirectional(&g, v(0), v(10), 100, &cancel).unwrap();
        let expected: Vec<_> = (0..=10).map(v).collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn equal_cost_paths_resolve_deterministically() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        g.arc(2, 4, 1.0);
        g.arc(1, 3, 1.0);
        g.arc(3, 4, 1.0);
        let cancel = AtomicBool::new(false);
        for _ in 0..10 {
            let path = find_route_bidirectional(&g, v(1), v(4), 100, &cancel).unwrap();
            assert_eq!(path, vec![v(1), v(2), v(4)]);
        }
    }

    #[test]
    fn agrees_with_the_unidirectional_search() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 2.0);
        g.arc(1, 3, 1.0);
        g.arc(3, 2, 0.5);
        g.arc(2, 5, 3.0);
        g.arc(3, 4, 4.0);
        g.arc(4, 5, 0.5);
        let cancel = AtomicBool::new(false);
        let uni = find_route(&g, v(1), v(5), 100, &cancel).unwrap();
        let bi = find_route_bidirectional(&g, v(1), v(5), 100, &cancel).unwrap();
        assert_eq!(uni, bi);
    }

    #[test]
    fn potentials_do_not_change_the_result() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        g.arc(2, 4, 2.0);
        g.arc(1, 3, 1.0);
        g.arc(3, 4, 3.0);
        // Admissible in both directions: the true remaining/elapsed costs.
        for (id, to_finish, from_start) in [(1, 3.0, 0.0), (2, 2.0, 1.0), (3, 3.0, 1.0), (4, 0.0, 3.0)] {
            g.to_finish.insert(v(id), to_finish);
            g.from_start.insert(v(id), from_start);
        }
        let cancel = AtomicBool::new(false);
        let path = find_route_bidirectional(&g, v(1), v(4), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1), v(2), v(4)]);
    }

    #[test]
    fn no_route_is_an_empty_path() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        g.arc(3, 4, 1.0);
        let cancel = AtomicBool::new(false);
        let path = find_route_bidirectional(&g, v(1), v(4), 100, &cancel).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn start_equals_finish() {
        let g = FixtureGraph::default();
        let cancel = AtomicBool::new(false);
        let path = find_route_bidirectional(&g, v(1), v(1), 100, &cancel).unwrap();
        assert_eq!(path, vec![v(1)]);
    }

    #[test]
    fn cancellation_wins_over_search() {
        let mut g = FixtureGraph::default();
        g.arc(1, 2, 1.0);
        let cancel = AtomicBool::new(true);
        assert_eq!(
            find_route_bidirectional(&g, v(1), v(2), 100, &cancel),
            Err(SearchError::Cancelled),
        );
    }
}
