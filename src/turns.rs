// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Turn-by-turn instruction generation.
//!
//! The route assembler describes every junction the route passes through
//! ([JunctionInfo]); this module classifies them into [TurnItems](TurnItem)
//! by the turn angle, collapses roundabouts into enter/leave pairs with an
//! exit number, and recommends lanes where the map carries lane markings.

use crate::LatLon;

/// Driving instruction attached to one point of the route polyline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarDirection {
    None,
    GoStraight,
    TurnRight,
    TurnSlightRight,
    TurnSharpRight,
    TurnLeft,
    TurnSlightLeft,
    TurnSharpLeft,
    UTurnLeft,
    UTurnRight,
    EnterRoundAbout,
    LeaveRoundAbout,
    ReachedYourDestination,
}

/// A single direction a marked lane allows, ordered like OSM `turn:lanes`
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneWay {
    None = 0,
    Reverse = 1,
    SharpLeft = 2,
    Left = 3,
    SlightLeft = 4,
    MergeToRight = 5,
    Through = 6,
    MergeToLeft = 7,
    SlightRight = 8,
    Right = 9,
    SharpRight = 10,
}

impl LaneWay {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Reverse),
            2 => Some(Self::SharpLeft),
            3 => Some(Self::Left),
            4 => Some(Self::SlightLeft),
            5 => Some(Self::MergeToRight),
            6 => Some(Self::Through),
            7 => Some(Self::MergeToLeft),
            8 => Some(Self::SlightRight),
            9 => Some(Self::Right),
            10 => Some(Self::SharpRight),
            _ => None,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "" | "none" => Some(Self::None),
            "reverse" => Some(Self::Reverse),
            "sharp_left" => Some(Self::SharpLeft),
            "left" => Some(Self::Left),
            "slight_left" => Some(Self::SlightLeft),
            "merge_to_right" => Some(Self::MergeToRight),
            "through" => Some(Self::Through),
            "merge_to_left" => Some(Self::MergeToLeft),
            "slight_right" => Some(Self::SlightRight),
            "right" => Some(Self::Right),
            "sharp_right" => Some(Self::SharpRight),
            _ => None,
        }
    }
}

/// Parses an OSM `turn:lanes` value, e.g. `"left;through|through|right"`.
/// Lanes are separated by `|`, the directions of one lane by `;`.
/// Returns `None` if any token is unknown.
pub fn parse_lanes(value: &str) -> Option<Vec<Vec<LaneWay>>> {
    let mut lanes = Vec::new();
    for lane in value.split('|') {
        let mut ways = Vec::new();
        for token in lane.split(';') {
            ways.push(LaneWay::from_token(token.trim().to_lowercase().as_str())?);
        }
        lanes.push(ways);
    }
    Some(lanes)
}

/// One driving instruction of a finished route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnItem {
    /// Index into the route polyline where the maneuver happens.
    pub point_index: u32,
    pub direction: CarDirection,
    /// Which exit to take, counted from 1; only set for roundabouts.
    pub exit_num: u32,
    /// Lanes of the approaching road that lead into the maneuver.
    pub lanes: Vec<Vec<LaneWay>>,
}

impl TurnItem {
    fn new(point_index: u32, direction: CarDirection) -> Self {
        Self {
            point_index,
            direction,
            exit_num: 0,
            lanes: Vec::new(),
        }
    }
}

/// What the route assembler knows about one junction along the route.
#[derive(Debug, Clone, Default)]
pub struct JunctionInfo {
    /// Index into the route polyline.
    pub point_index: u32,
    /// The taken transition reverses the previous road, either directly or
    /// over a short link between parallel carriageways.
    pub is_uturn: bool,
    /// The u-turn goes clockwise; only meaningful with `is_uturn`.
    pub uturn_right: bool,
    /// The road entering the junction is part of a roundabout.
    pub roundabout_before: bool,
    /// The road leaving the junction is part of a roundabout.
    pub roundabout_after: bool,
    /// Ways out of the junction other than the taken one and the u-turn.
    pub alternatives: u32,
    /// The ingoing and outgoing roads share a name and highway class, so a
    /// slight bend here is just the street curving, not a maneuver.
    pub same_road: bool,
    /// Lane markings of the approaching road, empty when untagged.
    pub lanes: Vec<Vec<LaneWay>>,
}

// How far along the polyline to look when computing the approach and exit
// headings of a junction. The approach direction is averaged over a longer
// stretch than the exit, which must react to the closest link.
const MAX_INGOING_POINTS: usize = 5;
const MIN_INGOING_DIST_M: f64 = 200.0;
const MAX_OUTGOING_POINTS: usize = 3;
const MIN_OUTGOING_DIST_M: f64 = 30.0;

/// Instructions closer than this get merged into the more significant one.
const MERGE_DIST_M: f64 = 30.0;

pub(crate) fn bearing_deg(from: LatLon, to: LatLon) -> f64 {
    let dlat = to.lat - from.lat;
    let dlon = (to.lon - from.lon) * from.lat.to_radians().cos();
    dlon.atan2(dlat).to_degrees()
}

pub(crate) fn normalize_angle(mut angle: f64) -> f64 {
    while angle > 180.0 {
        angle -= 360.0;
    }
    while angle <= -180.0 {
        angle += 360.0;
    }
    angle
}

/// Walks the polyline away from `at` until at least `min_dist_m` meters or
/// `max_points` vertices have been covered, and returns the reached point.
fn point_for_turn(
    points: &[LatLon],
    at: usize,
    forward: bool,
    max_points: usize,
    min_dist_m: f64,
) -> LatLon {
    let mut covered = 0.0;
    let mut prev = points[at];
    let mut reached = prev;
    for step in 1..=max_points {
        let idx = if forward {
            at + step
        } else {
            match at.checked_sub(step) {
                Some(idx) => idx,
                None => break,
            }
        };
        let Some(&point) = points.get(idx) else {
            break;
        };
        covered += prev.distance(&point);
        prev = point;
        reached = point;
        if covered >= min_dist_m {
            break;
        }
    }
    reached
}

/// Signed turn angle at polyline vertex `at`, positive for right turns.
pub fn turn_angle(points: &[LatLon], at: usize) -> f64 {
    let junction = points[at];
    let before = point_for_turn(points, at, false, MAX_INGOING_POINTS, MIN_INGOING_DIST_M);
    let after = point_for_turn(points, at, true, MAX_OUTGOING_POINTS, MIN_OUTGOING_DIST_M);
    normalize_angle(bearing_deg(junction, after) - bearing_deg(before, junction))
}

/// Buckets a turn angle into an instruction, following the usual navigation
/// convention of ±10° being "straight" and ±157° the sharp-turn boundary.
pub fn direction_by_angle(angle_deg: f64) -> CarDirection {
    if angle_deg >= 157.0 {
        CarDirection::TurnSharpRight
    } else if angle_deg >= 50.0 {
        CarDirection::TurnRight
    } else if angle_deg >= 10.0 {
        CarDirection::TurnSlightRight
    } else if angle_deg > -10.0 {
        CarDirection::GoStraight
    } else if angle_deg > -50.0 {
        CarDirection::TurnSlightLeft
    } else if angle_deg > -157.0 {
        CarDirection::TurnLeft
    } else {
        CarDirection::TurnSharpLeft
    }
}

fn conforms_exactly(way: LaneWay, direction: CarDirection) -> bool {
    matches!(
        (direction, way),
        (CarDirection::GoStraight, LaneWay::Through)
            | (CarDirection::TurnRight, LaneWay::Right)
            | (CarDirection::TurnSharpRight, LaneWay::SharpRight)
            | (CarDirection::TurnSlightRight, LaneWay::SlightRight)
            | (CarDirection::TurnLeft, LaneWay::Left)
            | (CarDirection::TurnSharpLeft, LaneWay::SharpLeft)
            | (CarDirection::TurnSlightLeft, LaneWay::SlightLeft)
            | (CarDirection::UTurnLeft, LaneWay::Reverse)
            | (CarDirection::UTurnRight, LaneWay::Reverse)
    )
}

fn conforms_approximately(way: LaneWay, direction: CarDirection) -> bool {
    match direction {
        CarDirection::GoStraight => matches!(way, LaneWay::Through | LaneWay::None),
        CarDirection::TurnRight => {
            matches!(way, LaneWay::Right | LaneWay::SharpRight | LaneWay::SlightRight)
        }
        CarDirection::TurnSharpRight => matches!(way, LaneWay::SharpRight | LaneWay::Right),
        CarDirection::TurnSlightRight => {
            matches!(way, LaneWay::SlightRight | LaneWay::Through | LaneWay::None)
        }
        CarDirection::TurnLeft => {
            matches!(way, LaneWay::Left | LaneWay::SharpLeft | LaneWay::SlightLeft)
        }
        CarDirection::TurnSharpLeft => matches!(way, LaneWay::SharpLeft | LaneWay::Left),
        CarDirection::TurnSlightLeft => {
            matches!(way, LaneWay::SlightLeft | LaneWay::Through | LaneWay::None)
        }
        CarDirection::UTurnLeft => matches!(way, LaneWay::Reverse | LaneWay::SharpLeft),
        CarDirection::UTurnRight => matches!(way, LaneWay::Reverse | LaneWay::SharpRight),
        _ => false,
    }
}

/// Lanes of the approaching road that lead into the maneuver.
///
/// Prefers lanes with an exactly matching marking; if there are none, falls
/// back to markings that roughly point the right way.
pub fn recommended_lanes(lanes: &[Vec<LaneWay>], direction: CarDirection) -> Vec<Vec<LaneWay>> {
    let exact: Vec<_> = lanes
        .iter()
        .filter(|lane| lane.iter().any(|&w| conforms_exactly(w, direction)))
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    lanes
        .iter()
        .filter(|lane| lane.iter().any(|&w| conforms_approximately(w, direction)))
        .cloned()
        .collect()
}

/// Generates the instruction list for a finished route.
///
/// `junctions` must be ordered by `point_index`. The result always ends with
/// a [CarDirection::ReachedYourDestination] item at the last polyline point.
pub fn annotate(points: &[LatLon], junctions: &[JunctionInfo]) -> Vec<TurnItem> {
    let mut turns = Vec::new();
    let mut roundabout_enter: Option<usize> = None;
    let mut exits_passed = 0u32;

    for junction in junctions {
        let at = junction.point_index as usize;
        if at == 0 || at + 1 >= points.len() {
            continue;
        }

        // Roundabouts collapse into an enter/leave pair carrying the number
        // of the exit to take.
        if junction.roundabout_after {
            if !junction.roundabout_before {
                let mut item = TurnItem::new(junction.point_index, CarDirection::EnterRoundAbout);
                item.lanes = recommended_lanes(&junction.lanes, CarDirection::EnterRoundAbout);
                roundabout_enter = Some(turns.len());
                exits_passed = 0;
                turns.push(item);
            } else if junction.alternatives > 0 {
                exits_passed += 1;
            }
            continue;
        }
        if junction.roundabout_before {
            let exit_num = exits_passed + 1;
            if let Some(enter_idx) = roundabout_enter.take() {
                turns[enter_idx].exit_num = exit_num;
            }
            let mut item = TurnItem::new(junction.point_index, CarDirection::LeaveRoundAbout);
            item.exit_num = exit_num;
            turns.push(item);
            continue;
        }

        if junction.is_uturn {
            let direction = if junction.uturn_right {
                CarDirection::UTurnRight
            } else {
                CarDirection::UTurnLeft
            };
            let mut item = TurnItem::new(junction.point_index, direction);
            item.lanes = recommended_lanes(&junction.lanes, direction);
            turns.push(item);
            continue;
        }

        // A junction with no other way out never deserves an instruction,
        // no matter how sharply the road bends.
        if junction.alternatives == 0 {
            continue;
        }
        let direction = direction_by_angle(turn_angle(points, at));
        if direction == CarDirection::GoStraight {
            continue;
        }
        // A slight bend where the street keeps its name and class is the
        // road curving, not a turn.
        if is_slight(direction) && junction.same_road {
            continue;
        }
        let mut item = TurnItem::new(junction.point_index, direction);
        item.lanes = recommended_lanes(&junction.lanes, direction);
        turns.push(item);
    }

    turns.push(TurnItem::new(
        (points.len() - 1) as u32,
        CarDirection::ReachedYourDestination,
    ));
    fixup_turns(points, &mut turns);
    turns
}

fn distance_along(points: &[LatLon], from: usize, to: usize) -> f64 {
    points[from..to]
        .windows(2)
        .map(|pair| pair[0].distance(&pair[1]))
        .sum()
}

fn is_slight(direction: CarDirection) -> bool {
    matches!(
        direction,
        CarDirection::TurnSlightLeft | CarDirection::TurnSlightRight | CarDirection::GoStraight
    )
}

/// Post-processes generated instructions: a slight turn immediately followed
/// by another maneuver is noise from a split junction, so only the later,
/// more significant instruction is kept. The pass is idempotent.
pub fn fixup_turns(points: &[LatLon], turns: &mut Vec<TurnItem>) {
    let mut idx = 0;
    while idx + 1 < turns.len() {
        let here = &turns[idx];
        let next = &turns[idx + 1];
        let close = distance_along(
            points,
            here.point_index as usize,
            next.point_index as usize,
        ) < MERGE_DIST_M;
        if close
            && is_slight(here.direction)
            && next.direction != CarDirection::ReachedYourDestination
        {
            turns.remove(idx);
        } else {
            idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = 0.001; // ~111 m

    fn junction(point_index: u32, alternatives: u32) -> JunctionInfo {
        JunctionInfo {
            point_index,
            alternatives,
            ..Default::default()
        }
    }

    #[test]
    fn angle_buckets() {
        assert_eq!(direction_by_angle(0.0), CarDirection::GoStraight);
        assert_eq!(direction_by_angle(30.0), CarDirection::TurnSlightRight);
        assert_eq!(direction_by_angle(90.0), CarDirection::TurnRight);
        assert_eq!(direction_by_angle(170.0), CarDirection::TurnSharpRight);
        assert_eq!(direction_by_angle(-30.0), CarDirection::TurnSlightLeft);
        assert_eq!(direction_by_angle(-90.0), CarDirection::TurnLeft);
        assert_eq!(direction_by_angle(-170.0), CarDirection::TurnSharpLeft);
    }

    #[test]
    fn right_angle_polyline_is_a_right_turn() {
        // North, then east.
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(2.0 * STEP, 0.0),
            LatLon::new(2.0 * STEP, STEP),
            LatLon::new(2.0 * STEP, 2.0 * STEP),
        ];
        let angle = turn_angle(&points, 2);
        assert!((angle - 90.0).abs() < 5.0, "angle {}", angle);

        let turns = annotate(&points, &[junction(2, 1)]);
        assert_eq!(turns[0].direction, CarDirection::TurnRight);
        assert_eq!(turns[0].point_index, 2);
        assert_eq!(
            turns.last().unwrap().direction,
            CarDirection::ReachedYourDestination,
        );
    }

    #[test]
    fn forced_bend_is_not_an_instruction() {
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(STEP, STEP),
            LatLon::new(STEP, 2.0 * STEP),
        ];
        let turns = annotate(&points, &[junction(1, 0)]);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].direction, CarDirection::ReachedYourDestination);
    }

    #[test]
    fn uturn_is_a_single_instruction() {
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(2.0 * STEP, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(0.0, 0.0),
        ];
        let mut uturn = junction(2, 0);
        uturn.is_uturn = true;
        let turns = annotate(&points, &[uturn]);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].direction, CarDirection::UTurnLeft);
        assert_eq!(turns[0].point_index, 2);
    }

    #[test]
    fn clockwise_uturn_turns_right() {
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(2.0 * STEP, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(0.0, 0.0),
        ];
        let mut uturn = junction(2, 0);
        uturn.is_uturn = true;
        uturn.uturn_right = true;
        let turns = annotate(&points, &[uturn]);
        assert_eq!(turns[0].direction, CarDirection::UTurnRight);
    }

    #[test]
    fn slight_bend_on_the_same_street_is_suppressed() {
        // The street bends ~30 degrees right at index 2.
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(2.0 * STEP, 0.0),
            LatLon::new(3.0 * STEP, 0.6 * STEP),
            LatLon::new(4.0 * STEP, 1.2 * STEP),
        ];
        let mut bend = junction(2, 1);
        bend.same_road = true;
        let turns = annotate(&points, &[bend]);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].direction, CarDirection::ReachedYourDestination);

        // The same bend onto a differently named street stays.
        let turns = annotate(&points, &[junction(2, 1)]);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].direction, CarDirection::TurnSlightRight);
    }

    #[test]
    fn roundabout_collapses_to_enter_and_leave() {
        // Square "roundabout" with an exit at every corner; ours is the 3rd.
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),        // enter
            LatLon::new(2.0 * STEP, STEP), // 1st exit passed
            LatLon::new(STEP, 2.0 * STEP), // 2nd exit passed
            LatLon::new(0.0, STEP),        // leave here: 3rd exit
            LatLon::new(-STEP, STEP),
        ];
        let junctions = vec![
            JunctionInfo {
                point_index: 1,
                roundabout_after: true,
                ..Default::default()
            },
            JunctionInfo {
                point_index: 2,
                roundabout_before: true,
                roundabout_after: true,
                alternatives: 1,
                ..Default::default()
            },
            JunctionInfo {
                point_index: 3,
                roundabout_before: true,
                roundabout_after: true,
                alternatives: 1,
                ..Default::default()
            },
            JunctionInfo {
                point_index: 4,
                roundabout_before: true,
                alternatives: 1,
                ..Default::default()
            },
        ];
        let turns = annotate(&points, &junctions);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].direction, CarDirection::EnterRoundAbout);
        assert_eq!(turns[0].exit_num, 3);
        assert_eq!(turns[1].direction, CarDirection::LeaveRoundAbout);
        assert_eq!(turns[1].exit_num, 3);
        assert_eq!(turns[1].point_index, 4);
    }

    #[test]
    fn close_slight_turn_gets_merged_away() {
        let points = vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(STEP, 0.0),
            LatLon::new(STEP + 0.0001, 0.00003),  // slight kink, ~11 m on
            LatLon::new(STEP + 0.0001, STEP),     // then a hard right
            LatLon::new(STEP + 0.0001, 2.0 * STEP),
        ];
        let mut turns = vec![
            TurnItem::new(1, CarDirection::TurnSlightRight),
            TurnItem::new(2, CarDirection::TurnRight),
            TurnItem::new(4, CarDirection::ReachedYourDestination),
        ];
        fixup_turns(&points, &mut turns);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].direction, CarDirection::TurnRight);

        // Idempotent: a second pass changes nothing.
        let again = turns.clone();
        fixup_turns(&points, &mut turns);
        assert_eq!(turns, again);
    }

    #[test]
    fn lane_string_parsing() {
        let lanes = parse_lanes("left;through|through|right").unwrap();
        assert_eq!(
            lanes,
            vec![
                vec![LaneWay::Left, LaneWay::Through],
                vec![LaneWay::Through],
                vec![LaneWay::Right],
            ],
        );
        assert_eq!(parse_lanes("|"), Some(vec![vec![LaneWay::None]; 2]));
        assert_eq!(parse_lanes("sideways"), None);
    }

    #[test]
    fn lane_recommendation_prefers_exact_matches() {
        let lanes = vec![
            vec![LaneWay::Left, LaneWay::Through],
            vec![LaneWay::Through],
            vec![LaneWay::Right],
        ];
        assert_eq!(
            recommended_lanes(&lanes, CarDirection::TurnLeft),
            vec![vec![LaneWay::Left, LaneWay::Through]],
        );
        // No exact slight-right lane: the through lanes roughly conform.
        assert_eq!(
            recommended_lanes(&lanes, CarDirection::TurnSlightRight),
            vec![vec![LaneWay::Left, LaneWay::Through], vec![LaneWay::Through]],
        );
    }
}
