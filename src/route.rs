// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Assembly of a finished [Route] from a segment path.
//!
//! The search produces directed segments; this module turns them into a
//! polyline with cumulative travel times, street names, speed cameras along
//! the way and turn instructions. Border twin segments contribute no
//! geometry of their own, so a cross-tile route has no duplicated points.

use std::collections::HashMap;
use std::sync::Arc;

use crate::estimator::EdgeEstimator;
use crate::kd::SnappedPoint;
use crate::loader::LoadedTile;
use crate::turns::{self, JunctionInfo, TurnItem};
use crate::{LatLon, RouterError, Segment, TileId};

/// A speed camera on the route, positioned by distance from the start.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCamera {
    pub distance_m: f64,
    /// Enforced limit in km/h, 0 when unknown.
    pub speed_kmh: u8,
}

/// A finished, annotated route.
#[derive(Debug, Clone, Default)]
pub struct Route {
    points: Vec<LatLon>,
    /// Cumulative travel time at every polyline point, in seconds.
    times_s: Vec<f64>,
    turns: Vec<TurnItem>,
    /// Street names keyed by the polyline index where they begin.
    streets: Vec<(u32, String)>,
    cameras: Vec<RouteCamera>,
    distance_m: f64,
    absent_tiles: Vec<String>,
}

impl Route {
    pub fn points(&self) -> &[LatLon] {
        &self.points
    }

    pub fn times_s(&self) -> &[f64] {
        &self.times_s
    }

    /// Estimated total travel time in seconds.
    pub fn total_time_s(&self) -> f64 {
        self.times_s.last().copied().unwrap_or(0.0)
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn turns(&self) -> &[TurnItem] {
        &self.turns
    }

    pub fn streets(&self) -> &[(u32, String)] {
        &self.streets
    }

    pub fn cameras(&self) -> &[RouteCamera] {
        &self.cameras
    }

    /// Tiles that were needed but missing; empty for complete routes.
    pub fn absent_tiles(&self) -> &[String] {
        &self.absent_tiles
    }

    pub(crate) fn set_absent_tiles(&mut self, absent: Vec<String>) {
        self.absent_tiles = absent;
    }
}

/// Span of one directed segment covered by the route, in fractions along
/// the direction of travel.
#[derive(Debug, Clone, Copy)]
struct Traversal {
    segment: Segment,
    from: f64,
    to: f64,
}

fn directional_fraction(forward_fraction: f64, segment: Segment) -> f64 {
    if segment.forward {
        forward_fraction
    } else {
        1.0 - forward_fraction
    }
}

fn position_on(tile: &LoadedTile, segment: Segment, fraction: f64) -> Option<LatLon> {
    let rear = tile.geometry.point(segment.rear_point())?;
    let front = tile.geometry.point(segment.front_point())?;
    Some(LatLon::new(
        rear.lat + fraction * (front.lat - rear.lat),
        rear.lon + fraction * (front.lon - rear.lon),
    ))
}

fn tile_of<'t>(
    tiles: &'t HashMap<TileId, Arc<LoadedTile>>,
    segment: Segment,
) -> Result<&'t Arc<LoadedTile>, RouterError> {
    tiles
        .get(&segment.tile)
        .ok_or_else(|| RouterError::TileUnavailable(format!("#{}", segment.tile)))
}

/// Builds the final route from a fake-free segment path.
///
/// An empty path means start and finish share a host segment; the path is
/// then the partial traversal between the two snapped fractions.
pub(crate) fn assemble(
    tiles: &HashMap<TileId, Arc<LoadedTile>>,
    estimator: &EdgeEstimator<'_>,
    path: &[Segment],
    start: &SnappedPoint,
    finish: &SnappedPoint,
) -> Result<Route, RouterError> {
    let traversals = plan_traversals(path, start, finish);
    if traversals.is_empty() {
        return Err(RouterError::RouteNotFound);
    }

    let mut points: Vec<LatLon> = Vec::with_capacity(traversals.len() + 1);
    let mut times_s: Vec<f64> = Vec::with_capacity(traversals.len() + 1);
    let mut streets: Vec<(u32, String)> = Vec::new();
    let mut cameras: Vec<RouteCamera> = Vec::new();
    let mut exit_index: Vec<u32> = Vec::with_capacity(traversals.len());
    let mut distance_m = 0.0;

    points.push(start.point);
    times_s.push(0.0);

    for (i, t) in traversals.iter().enumerate() {
        let tile = tile_of(tiles, t.segment)?;
        let road = tile
            .geometry
            .road(t.segment.feature)
            .ok_or(RouterError::RouteNotFound)?;
        let seg_len = road.segment_len(t.segment.idx);
        let covered = (t.to - t.from).max(0.0);

        for cam in tile.cameras_on(t.segment) {
            if cam.coef >= t.from - 1e-9 && cam.coef <= t.to + 1e-9 {
                cameras.push(RouteCamera {
                    distance_m: distance_m + (cam.coef - t.from).max(0.0) * seg_len,
                    speed_kmh: cam.speed_kmh,
                });
            }
        }

        if !road.name().is_empty()
            && streets.last().map(|(_, name)| name.as_str()) != Some(road.name())
        {
            streets.push(((points.len() - 1) as u32, road.name().to_string()));
        }

        distance_m += covered * seg_len;
        let time = estimator.segment_weight(&t.segment, road);
        let added = if time.is_finite() { time * covered } else { 0.0 };

        let exit = if i + 1 == traversals.len() {
            finish.point
        } else {
            position_on(tile, t.segment, t.to).ok_or(RouterError::RouteNotFound)?
        };
        // Merge zero-length hops (border twins) into the previous point.
        let prev = *points.last().unwrap_or(&exit);
        if prev.distance(&exit) < 0.01 {
            exit_index.push((points.len() - 1) as u32);
        } else {
            points.push(exit);
            times_s.push(times_s.last().copied().unwrap_or(0.0) + added);
            exit_index.push((points.len() - 1) as u32);
        }
    }

    if points.len() < 2 {
        return Err(RouterError::RouteNotFound);
    }

    let junctions = plan_junctions(tiles, estimator, &traversals, &exit_index)?;
    let turns = turns::annotate(&points, &junctions);

    Ok(Route {
        points,
        times_s,
        turns,
        streets,
        cameras,
        distance_m,
        absent_tiles: Vec::new(),
    })
}

fn plan_traversals(path: &[Segment], start: &SnappedPoint, finish: &SnappedPoint) -> Vec<Traversal> {
    if path.is_empty() {
        // Same host segment: pick the direction that goes forward in time.
        let host = start.segment;
        let directed = if finish.fraction >= start.fraction {
            host
        } else {
            host.reversed()
        };
        return vec![Traversal {
            segment: directed,
            from: directional_fraction(start.fraction, directed),
            to: directional_fraction(finish.fraction, directed),
        }];
    }

    let mut traversals = Vec::with_capacity(path.len());
    for (i, &segment) in path.iter().enumerate() {
        let is_twin_hop = i > 0 && segment.tile != path[i - 1].tile;
        let from = if is_twin_hop {
            1.0
        } else if i == 0 {
            directional_fraction(start.fraction, segment)
        } else {
            0.0
        };
        let to = if is_twin_hop {
            1.0
        } else if i + 1 == path.len() {
            directional_fraction(finish.fraction, segment)
        } else {
            1.0
        };
        traversals.push(Traversal { segment, from, to });
    }
    traversals
}

/// How many segments ahead to look for the returning half of a u-turn made
/// over a short link between parallel carriageways.
const UTURN_LOOK_AHEAD: usize = 3;
/// Headings this close to opposite count as the same road going back.
const UTURN_HEADING_TOLERANCE_DEG: f64 = 18.0;

fn heading_of(tile: &LoadedTile, segment: Segment) -> Option<f64> {
    let rear = tile.geometry.point(segment.rear_point())?;
    let front = tile.geometry.point(segment.front_point())?;
    Some(turns::bearing_deg(rear, front))
}

/// Looks ahead from the junction after `traversals[at]` for a segment of the
/// same street heading back the opposite way. Returns the index of the
/// returning segment and whether the loop runs clockwise.
fn detect_link_uturn(
    tiles: &HashMap<TileId, Arc<LoadedTile>>,
    traversals: &[Traversal],
    at: usize,
) -> Result<Option<(usize, bool)>, RouterError> {
    let here = traversals[at].segment;
    let tile = tile_of(tiles, here)?;
    let road_here = tile
        .geometry
        .road(here.feature)
        .ok_or(RouterError::RouteNotFound)?;
    // Unnamed roads give no evidence of being the same street, so a route
    // around an unnamed block must not read as a turnaround.
    if road_here.name().is_empty() || road_here.is_roundabout() {
        return Ok(None);
    }
    let Some(heading) = heading_of(tile, here) else {
        return Ok(None);
    };

    let last = (at + UTURN_LOOK_AHEAD).min(traversals.len() - 1);
    for j in at + 1..=last {
        let cand = traversals[j].segment;
        if cand.tile != here.tile {
            break;
        }
        let Some(road_cand) = tile.geometry.road(cand.feature) else {
            continue;
        };
        if road_cand.name() != road_here.name()
            || road_cand.highway_class() != road_here.highway_class()
        {
            continue;
        }
        let Some(cand_heading) = heading_of(tile, cand) else {
            continue;
        };
        if turns::normalize_angle(cand_heading - heading).abs()
            < 180.0 - UTURN_HEADING_TOLERANCE_DEG
        {
            continue;
        }
        // Clockwise when the first deviation off the street turns right.
        let right = match heading_of(tile, traversals[at + 1].segment) {
            Some(first) => turns::normalize_angle(first - heading) > 0.0,
            None => false,
        };
        return Ok(Some((j, right)));
    }
    Ok(None)
}

fn plan_junctions(
    tiles: &HashMap<TileId, Arc<LoadedTile>>,
    estimator: &EdgeEstimator<'_>,
    traversals: &[Traversal],
    exit_index: &[u32],
) -> Result<Vec<JunctionInfo>, RouterError> {
    let mut junctions = Vec::new();
    let mut i = 0;
    while i + 1 < traversals.len() {
        let here = traversals[i].segment;
        let next = traversals[i + 1].segment;
        if here.tile != next.tile {
            // Border twin hop, not a junction.
            i += 1;
            continue;
        }
        let tile = tile_of(tiles, here)?;
        let road_here = tile
            .geometry
            .road(here.feature)
            .ok_or(RouterError::RouteNotFound)?;
        let road_next = tile
            .geometry
            .road(next.feature)
            .ok_or(RouterError::RouteNotFound)?;

        let mut is_uturn = next == here.reversed();
        let mut uturn_right = false;
        let mut advance = 1;
        if !is_uturn && next.feature != here.feature {
            if let Some((j, right)) = detect_link_uturn(tiles, traversals, i)? {
                // One maneuver; the link's own junctions are skipped.
                is_uturn = true;
                uturn_right = right;
                advance = j - i;
            }
        }

        let alternatives = tile
            .graph
            .edges(estimator, here, true)
            .iter()
            .filter(|e| e.to != next && e.to != here.reversed())
            .count() as u32;
        // Lane markings describe the feature's point order.
        let lanes = if here.forward {
            road_here.lanes().to_vec()
        } else {
            Vec::new()
        };
        junctions.push(JunctionInfo {
            point_index: exit_index[i],
            is_uturn,
            uturn_right,
            roundabout_before: road_here.is_roundabout(),
            roundabout_after: road_next.is_roundabout(),
            alternatives,
            same_road: !road_here.name().is_empty()
                && road_here.name() == road_next.name()
                && road_here.highway_class() == road_next.highway_class(),
            lanes,
        });
        i += advance;
    }
    Ok(junctions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{HighwayClass, Joint};
    use crate::loader::TileLoader;
    use crate::profile::CAR;
    use crate::tile::{
        sections::{self, RoadRecord},
        tags, SpeedCamera, TileWriter,
    };
    use crate::turns::CarDirection;
    use crate::RoadPoint;

    fn residential(points: Vec<LatLon>, name: &str) -> RoadRecord {
        RoadRecord {
            points,
            class: HighwayClass::Residential,
            name: name.to_string(),
            surface: 1.0,
            ..Default::default()
        }
    }

    fn load_tile(
        roads: &[RoadRecord],
        joints: &[Joint],
        cams: &[SpeedCamera],
    ) -> (HashMap<TileId, Arc<LoadedTile>>, Arc<LoadedTile>) {
        let dir = tempfile::tempdir().unwrap();
        let mut w = TileWriter::new();
        w.add_section(
            tags::GEOMETRY,
            sections::GEOMETRY_VERSION,
            sections::encode_geometry(roads),
        );
        w.add_section(
            tags::JOINTS,
            sections::JOINTS_VERSION,
            sections::encode_joints(joints),
        );
        if !cams.is_empty() {
            w.add_section(
                tags::SPEED_CAMS,
                sections::SPEED_CAMS_VERSION,
                sections::encode_speed_cams(cams),
            );
        }
        w.write_to(&dir.path().join("Fixture.rtil")).unwrap();

        let mut loader = TileLoader::new(dir.path(), &CAR);
        let tile = loader.load("Fixture").unwrap();
        let mut tiles = HashMap::new();
        tiles.insert(tile.tile, tile.clone());
        (tiles, tile)
    }

    #[test]
    fn straight_route_accumulates_distance_and_time() {
        let (tiles, tile) = load_tile(
            &[residential(
                vec![
                    LatLon::new(0.0, 0.000),
                    LatLon::new(0.0, 0.001),
                    LatLon::new(0.0, 0.002),
                    LatLon::new(0.0, 0.003),
                ],
                "Main Street",
            )],
            &[],
            &[],
        );
        let estimator = EdgeEstimator::new(&CAR);
        let start = tile.tree.nearest(LatLon::new(0.0, 0.0), 100.0).unwrap();
        let finish = tile.tree.nearest(LatLon::new(0.0, 0.003), 100.0).unwrap();
        let path = [
            Segment::new(tile.tile, 0, 0, true),
            Segment::new(tile.tile, 0, 1, true),
            Segment::new(tile.tile, 0, 2, true),
        ];

        let route = assemble(&tiles, &estimator, &path, &start, &finish).unwrap();
        assert_eq!(route.points().len(), 4);
        assert!((route.distance_m() - 333.6).abs() < 5.0, "{}", route.distance_m());
        assert!(route.total_time_s() > 0.0);
        assert_eq!(route.times_s().len(), route.points().len());
        assert!(route
            .times_s()
            .windows(2)
            .all(|pair| pair[1] >= pair[0]));
        assert_eq!(route.streets(), &[(0, "Main Street".to_string())]);
        assert_eq!(route.turns().len(), 1);
        assert_eq!(
            route.turns()[0].direction,
            CarDirection::ReachedYourDestination,
        );
    }

    #[test]
    fn camera_sits_at_its_offset_coefficient() {
        let (tiles, tile) = load_tile(
            &[residential(
                vec![
                    LatLon::new(0.0, 0.000),
                    LatLon::new(0.0, 0.001),
                    LatLon::new(0.0, 0.002),
                ],
                "",
            )],
            &[],
            &[SpeedCamera {
                feature: 0,
                segment_idx: 1,
                coef: 0.5,
                speed_kmh: 50,
            }],
        );
        let estimator = EdgeEstimator::new(&CAR);
        let start = tile.tree.nearest(LatLon::new(0.0, 0.0), 100.0).unwrap();
        let finish = tile.tree.nearest(LatLon::new(0.0, 0.002), 100.0).unwrap();
        let path = [
            Segment::new(tile.tile, 0, 0, true),
            Segment::new(tile.tile, 0, 1, true),
        ];

        let route = assemble(&tiles, &estimator, &path, &start, &finish).unwrap();
        assert_eq!(route.cameras().len(), 1);
        let cam = &route.cameras()[0];
        assert_eq!(cam.speed_kmh, 50);
        // One full segment plus half of the next, ~111 + ~56 m.
        assert!((cam.distance_m - 166.8).abs() < 3.0, "{}", cam.distance_m);
    }

    #[test]
    fn right_turn_at_a_junction_is_annotated() {
        let (tiles, tile) = load_tile(
            &[
                residential(
                    vec![
                        LatLon::new(0.0, 0.000),
                        LatLon::new(0.0, 0.002),
                        LatLon::new(0.0, 0.004),
                    ],
                    "East Street",
                ),
                residential(
                    vec![LatLon::new(0.0, 0.002), LatLon::new(-0.002, 0.002)],
                    "South Street",
                ),
            ],
            &[Joint::new(vec![RoadPoint::new(0, 1), RoadPoint::new(1, 0)])],
            &[],
        );
        let estimator = EdgeEstimator::new(&CAR);
        let start = tile.tree.nearest(LatLon::new(0.0, 0.0), 100.0).unwrap();
        let finish = tile.tree.nearest(LatLon::new(-0.002, 0.002), 100.0).unwrap();
        let path = [
            Segment::new(tile.tile, 0, 0, true),
            Segment::new(tile.tile, 1, 0, true),
        ];

        let route = assemble(&tiles, &estimator, &path, &start, &finish).unwrap();
        let turn = &route.turns()[0];
        assert_eq!(turn.direction, CarDirection::TurnRight);
        assert_eq!(turn.point_index, 1);
        assert_eq!(
            route.streets(),
            &[
                (0, "East Street".to_string()),
                (1, "South Street".to_string()),
            ],
        );
    }

    #[test]
    fn uturn_over_a_link_is_one_instruction() {
        // Two parallel one-way carriageways of the same street, joined by a
        // short unnamed link at their far ends.
        let (tiles, tile) = load_tile(
            &[
                RoadRecord {
                    points: vec![
                        LatLon::new(0.0, 0.000),
                        LatLon::new(0.0, 0.001),
                        LatLon::new(0.0, 0.002),
                    ],
                    one_way: true,
                    class: HighwayClass::Residential,
                    name: "Dual Way".to_string(),
                    surface: 1.0,
                    ..Default::default()
                },
                RoadRecord {
                    points: vec![LatLon::new(0.0, 0.002), LatLon::new(0.0002, 0.002)],
                    one_way: true,
                    link: true,
                    class: HighwayClass::Residential,
                    surface: 1.0,
                    ..Default::default()
                },
                RoadRecord {
                    points: vec![
                        LatLon::new(0.0002, 0.002),
                        LatLon::new(0.0002, 0.001),
                        LatLon::new(0.0002, 0.000),
                    ],
                    one_way: true,
                    class: HighwayClass::Residential,
                    name: "Dual Way".to_string(),
                    surface: 1.0,
                    ..Default::default()
                },
            ],
            &[
                Joint::new(vec![RoadPoint::new(0, 2), RoadPoint::new(1, 0)]),
                Joint::new(vec![RoadPoint::new(1, 1), RoadPoint::new(2, 0)]),
            ],
            &[],
        );
        let estimator = EdgeEstimator::new(&CAR);
        let start = tile.tree.nearest(LatLon::new(0.0, 0.0), 100.0).unwrap();
        let finish = tile.tree.nearest(LatLon::new(0.0002, 0.0), 100.0).unwrap();
        let path = [
            Segment::new(tile.tile, 0, 0, true),
            Segment::new(tile.tile, 0, 1, true),
            Segment::new(tile.tile, 1, 0, true),
            Segment::new(tile.tile, 2, 0, true),
            Segment::new(tile.tile, 2, 1, true),
        ];

        let route = assemble(&tiles, &estimator, &path, &start, &finish).unwrap();
        assert_eq!(route.turns().len(), 2);
        assert_eq!(route.turns()[0].direction, CarDirection::UTurnLeft);
        assert_eq!(route.turns()[0].point_index, 2);
        assert_eq!(
            route.turns()[1].direction,
            CarDirection::ReachedYourDestination,
        );
    }

    #[test]
    fn same_host_route_is_a_two_point_polyline() {
        let (tiles, tile) = load_tile(
            &[residential(
                vec![LatLon::new(0.0, 0.000), LatLon::new(0.0, 0.001)],
                "",
            )],
            &[],
            &[],
        );
        let estimator = EdgeEstimator::new(&CAR);
        let start = tile.tree.nearest(LatLon::new(0.0, 0.0002), 100.0).unwrap();
        let finish = tile.tree.nearest(LatLon::new(0.0, 0.0008), 100.0).unwrap();

        let route = assemble(&tiles, &estimator, &[], &start, &finish).unwrap();
        assert_eq!(route.points().len(), 2);
        assert!((route.distance_m() - 66.7).abs() < 2.0, "{}", route.distance_m());
        assert_eq!(route.turns().len(), 1);
    }
}
