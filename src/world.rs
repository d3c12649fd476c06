// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Cross-tile routing.
//!
//! When the start and finish fall into different tiles, the route is found
//! in two phases. A meta search first walks the graph of border transitions:
//! within one tile, crossings connect by optimistic leap edges, and a
//! crossing hops onto its twin segment in the neighbouring tile at zero
//! cost, since both describe the same physical piece of road. The winning
//! sequence of crossings becomes a [CheckedPath]; a real in-tile A* then
//! routes every leg, and the legs concatenate into a single segment path.
//! Twin segments stay in the path and later collapse into zero-length
//! traversals during route assembly, which keeps the shared border point
//! from being counted twice.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::astar::{find_route, find_route_bidirectional, RoutingGraph};
use crate::estimator::EdgeEstimator;
use crate::graph::{Edge, IndexGraph};
use crate::kd::SnappedPoint;
use crate::loader::{LoadedTile, TileLoader};
use crate::starter::Starter;
use crate::tile::Transition;
use crate::{LatLon, RouterError, Segment, TileId};

/// One leg of a cross-tile route: a stretch inside a single tile, from the
/// segment the route enters the tile on to the one it leaves it on. The
/// first leg enters on the snapped start host, the last one exits on the
/// snapped finish host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedLeg {
    pub tile: TileId,
    pub enter: Segment,
    pub exit: Segment,
}

/// The per-tile legs of a cross-tile route, in travel order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckedPath {
    pub legs: Vec<CheckedLeg>,
}

impl CheckedPath {
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

/// A finished cross-tile search: the concatenated segment path (twin border
/// segments included), its legs, every tile the path touches, and the names
/// of tiles which could not be loaded and had to be routed around.
#[derive(Debug)]
pub struct WorldRoute {
    pub path: Vec<Segment>,
    pub checked: CheckedPath,
    pub tiles: HashMap<TileId, Arc<LoadedTile>>,
    pub absent: Vec<String>,
}

/// Vertex of the meta search. Border crossings are identified by their
/// own-side directed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum MetaNode {
    Start,
    Border(Segment),
    Finish,
}

/// Max-heap entry flipped into a min-heap on cost, with the node as a
/// deterministic tie-breaker.
#[derive(Debug, Clone, Copy)]
struct MetaItem {
    node: MetaNode,
    cost: f64,
}

impl Ord for MetaItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for MetaItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MetaItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for MetaItem {}

fn own_segment(tile: TileId, t: &Transition) -> Segment {
    Segment::new(tile, t.feature, t.idx, t.forward)
}

fn transition_of(tile: &LoadedTile, seg: Segment) -> Option<&Transition> {
    tile.transitions
        .iter()
        .find(|t| t.feature == seg.feature && t.idx == seg.idx && t.forward == seg.forward)
}

/// A synthetic snap at the front point of a directed segment, so that a
/// border crossing can serve as a [Starter] endpoint. The fraction is
/// expressed on the forward host, like a real snap.
fn snap_at_front(tile: &LoadedTile, seg: Segment) -> Option<SnappedPoint> {
    Some(SnappedPoint {
        segment: Segment::new(seg.tile, seg.feature, seg.idx, true),
        point: tile.geometry.point(seg.front_point())?,
        fraction: if seg.forward { 1.0 } else { 0.0 },
        distance_m: 0.0,
    })
}

/// In-tile search space for middle legs, whose endpoints are real border
/// segments rather than snapped positions.
struct TileGraph<'g> {
    graph: &'g IndexGraph,
    estimator: &'g EdgeEstimator<'g>,
    from_point: LatLon,
    to_point: LatLon,
}

impl RoutingGraph for TileGraph<'_> {
    fn out_edges(&self, from: Segment) -> Vec<Edge> {
        self.graph.edges(self.estimator, from, true)
    }

    fn in_edges(&self, to: Segment) -> Vec<Edge> {
        self.graph.edges(self.estimator, to, false)
    }

    fn estimate_to_finish(&self, v: Segment) -> f64 {
        match self.graph.geometry().point(v.front_point()) {
            Some(pos) => self.estimator.heuristic(pos, self.to_point),
            None => 0.0,
        }
    }

    fn estimate_from_start(&self, v: Segment) -> f64 {
        match self.graph.geometry().point(v.front_point()) {
            Some(pos) => self.estimator.heuristic(self.from_point, pos),
            None => 0.0,
        }
    }
}

/// Routing over the whole map: a loader for on-demand tile access plus the
/// estimator shared with the in-tile searches.
#[derive(Debug)]
pub struct WorldGraph<'a, 'p> {
    loader: &'a mut TileLoader<'p>,
    estimator: &'a EdgeEstimator<'a>,
}

impl<'a, 'p> WorldGraph<'a, 'p> {
    pub fn new(loader: &'a mut TileLoader<'p>, estimator: &'a EdgeEstimator<'a>) -> Self {
        Self { loader, estimator }
    }

    /// Finds a route between snapped points in two different tiles.
    ///
    /// Unloadable tiles encountered during the meta search are skipped and
    /// recorded; when no route exists without them, the first such tile is
    /// reported as [RouterError::TileUnavailable] so the caller can suggest
    /// downloading it.
    pub fn route(
        &mut self,
        start: &SnappedPoint,
        finish: &SnappedPoint,
        step_limit: usize,
        cancel: &AtomicBool,
    ) -> Result<WorldRoute, RouterError> {
        debug_assert_ne!(start.segment.tile, finish.segment.tile);

        let mut tiles: HashMap<TileId, Arc<LoadedTile>> = HashMap::new();
        let mut absent: Vec<String> = Vec::new();

        let start_tile = self.loader.load_by_id(start.segment.tile)?;
        let finish_tile = self.loader.load_by_id(finish.segment.tile)?;
        tiles.insert(start_tile.tile, start_tile.clone());
        tiles.insert(finish_tile.tile, finish_tile.clone());

        let borders =
            match self.meta_search(start, finish, &mut tiles, &mut absent, step_limit, cancel)? {
                Some(borders) => borders,
                None => {
                    return Err(match absent.first() {
                        Some(name) => RouterError::TileUnavailable(name.clone()),
                        None => RouterError::RouteNotFound,
                    });
                }
            };
        log::debug!("meta search crosses {} borders", borders.len());

        let mut path: Vec<Segment> = Vec::new();
        let mut legs: Vec<CheckedLeg> = Vec::new();

        // First leg: snapped start to the first border crossing.
        let first_exit = borders[0];
        let exit_snap = snap_at_front(&start_tile, first_exit).ok_or(RouterError::RouteNotFound)?;
        let starter = Starter::new(&start_tile.graph, self.estimator, *start, exit_snap);
        let raw = find_route(&starter, starter.start_segment(), first_exit, step_limit, cancel)?;
        if raw.is_empty() {
            return Err(RouterError::RouteNotFound);
        }
        path.extend(starter.realize_path(&raw));
        legs.push(CheckedLeg {
            tile: start_tile.tile,
            enter: start.segment,
            exit: first_exit,
        });

        for (i, &border) in borders.iter().enumerate() {
            let (tile, entry) = self
                .twin_of(&tiles, border)
                .ok_or(RouterError::RouteNotFound)?;
            path.push(entry);

            if let Some(&next_exit) = borders.get(i + 1) {
                // Middle leg, fully inside `tile`.
                let from_point = tile
                    .geometry
                    .point(entry.front_point())
                    .ok_or(RouterError::RouteNotFound)?;
                let to_point = tile
                    .geometry
                    .point(next_exit.front_point())
                    .ok_or(RouterError::RouteNotFound)?;
                let leg = TileGraph {
                    graph: tile.graph.as_ref(),
                    estimator: self.estimator,
                    from_point,
                    to_point,
                };
                let raw = find_route(&leg, entry, next_exit, step_limit, cancel)?;
                if raw.is_empty() {
                    return Err(RouterError::RouteNotFound);
                }
                path.extend(raw.into_iter().skip(1));
                legs.push(CheckedLeg {
                    tile: tile.tile,
                    enter: entry,
                    exit: next_exit,
                });
            } else {
                // Last leg: border entry to the snapped finish.
                let entry_snap =
                    snap_at_front(&tile, entry).ok_or(RouterError::RouteNotFound)?;
                let starter = Starter::new(&tile.graph, self.estimator, entry_snap, *finish);
                let raw = find_route_bidirectional(
                    &starter,
                    starter.start_segment(),
                    starter.finish_segment(),
                    step_limit,
                    cancel,
                )?;
                if raw.is_empty() {
                    return Err(RouterError::RouteNotFound);
                }
                for seg in starter.realize_path(&raw) {
                    if path.last() != Some(&seg) {
                        path.push(seg);
                    }
                }
                legs.push(CheckedLeg {
                    tile: tile.tile,
                    enter: entry,
                    exit: finish.segment,
                });
            }
        }

        Ok(WorldRoute {
            path,
            checked: CheckedPath { legs },
            tiles,
            absent,
        })
    }

    /// Dijkstra over border crossings. Returns the crossings of the best
    /// route in travel order, or `None` when the crossings do not connect
    /// the two tiles.
    fn meta_search(
        &mut self,
        start: &SnappedPoint,
        finish: &SnappedPoint,
        tiles: &mut HashMap<TileId, Arc<LoadedTile>>,
        absent: &mut Vec<String>,
        step_limit: usize,
        cancel: &AtomicBool,
    ) -> Result<Option<Vec<Segment>>, RouterError> {
        let mut queue: BinaryHeap<MetaItem> = BinaryHeap::new();
        let mut came_from: HashMap<MetaNode, MetaNode> = HashMap::new();
        let mut known_costs: HashMap<MetaNode, f64> = HashMap::new();

        known_costs.insert(MetaNode::Start, 0.0);
        queue.push(MetaItem {
            node: MetaNode::Start,
            cost: 0.0,
        });

        let mut steps = 0usize;
        while let Some(item) = queue.pop() {
            if cancel.load(Ordering::Relaxed) {
                return Err(RouterError::Cancelled);
            }
            steps += 1;
            if steps > step_limit {
                return Ok(None);
            }
            if known_costs
                .get(&item.node)
                .is_some_and(|&c| c < item.cost)
            {
                continue;
            }

            if item.node == MetaNode::Finish {
                let mut borders = Vec::new();
                let mut at = MetaNode::Finish;
                while let Some(&prev) = came_from.get(&at) {
                    if let MetaNode::Border(seg) = prev {
                        borders.push(seg);
                    }
                    at = prev;
                }
                borders.reverse();
                return Ok(Some(borders));
            }

            for (next, weight) in self.meta_neighbors(item.node, start, finish, tiles, absent) {
                let cost = item.cost + weight;
                if known_costs.get(&next).is_some_and(|&c| cost >= c) {
                    continue;
                }
                known_costs.insert(next, cost);
                came_from.insert(next, item.node);
                queue.push(MetaItem { node: next, cost });
            }
        }

        Ok(None)
    }

    fn meta_neighbors(
        &mut self,
        node: MetaNode,
        start: &SnappedPoint,
        finish: &SnappedPoint,
        tiles: &mut HashMap<TileId, Arc<LoadedTile>>,
        absent: &mut Vec<String>,
    ) -> Vec<(MetaNode, f64)> {
        let mut next = Vec::new();
        match node {
            MetaNode::Start => {
                let Some(tile) = tiles.get(&start.segment.tile).cloned() else {
                    return next;
                };
                for t in &tile.transitions {
                    let exit = own_segment(tile.tile, t);
                    let Some(pos) = tile.geometry.point(exit.front_point()) else {
                        continue;
                    };
                    next.push((
                        MetaNode::Border(exit),
                        self.estimator.leap_weight(start.point, pos),
                    ));
                }
            }
            MetaNode::Border(seg) => {
                let Some(tile) = tiles.get(&seg.tile).cloned() else {
                    return next;
                };
                let Some(t) = transition_of(&tile, seg) else {
                    return next;
                };
                let twin = match self.loader.load(&t.twin_tile) {
                    Ok(twin) => twin,
                    Err(_) => {
                        if !absent.contains(&t.twin_tile) {
                            absent.push(t.twin_tile.clone());
                        }
                        return next;
                    }
                };
                tiles.insert(twin.tile, twin.clone());

                let entry = Segment::new(twin.tile, t.twin_feature, t.twin_idx, t.twin_forward);
                let Some(entry_pos) = twin.geometry.point(entry.front_point()) else {
                    return next;
                };
                if twin.tile == finish.segment.tile {
                    next.push((
                        MetaNode::Finish,
                        self.estimator.leap_weight(entry_pos, finish.point),
                    ));
                }
                for t2 in &twin.transitions {
                    let exit = own_segment(twin.tile, t2);
                    // Bouncing straight back over the same border is never useful.
                    if exit == entry.reversed() {
                        continue;
                    }
                    let Some(pos) = twin.geometry.point(exit.front_point()) else {
                        continue;
                    };
                    next.push((
                        MetaNode::Border(exit),
                        self.estimator.leap_weight(entry_pos, pos),
                    ));
                }
            }
            MetaNode::Finish => {}
        }
        next
    }

    /// The segment a border crossing continues onto in its twin tile, which
    /// by now must sit in `tiles`.
    fn twin_of(
        &self,
        tiles: &HashMap<TileId, Arc<LoadedTile>>,
        border: Segment,
    ) -> Option<(Arc<LoadedTile>, Segment)> {
        let tile = tiles.get(&border.tile)?;
        let t = transition_of(tile, border)?;
        let twin_id = self.loader.registry().id(&t.twin_tile)?;
        let twin = tiles.get(&twin_id)?.clone();
        let entry = Segment::new(twin.tile, t.twin_feature, t.twin_idx, t.twin_forward);
        Some((twin, entry))
    }
}
