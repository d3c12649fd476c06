// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Per-tile road geometry: immutable point sequences and per-feature
//! road attributes, decoded once per tile by the [TileLoader](crate::TileLoader).

use crate::turns::LaneWay;
use crate::{LatLon, RoadPoint};

/// Coarse road importance, ordered from the biggest roads to the smallest.
///
/// The numeric ordering is used by the turn generator to decide whether a
/// junction is "meaningful": turning from a primary road onto another primary
/// road while only service roads branch off is not worth an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum HighwayClass {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    Residential = 5,
    LivingStreet = 6,
    Service = 7,
    Track = 8,
    Path = 9,
    #[default]
    Unknown = 10,
}

impl HighwayClass {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Motorway,
            1 => Self::Trunk,
            2 => Self::Primary,
            3 => Self::Secondary,
            4 => Self::Tertiary,
            5 => Self::Residential,
            6 => Self::LivingStreet,
            7 => Self::Service,
            8 => Self::Track,
            9 => Self::Path,
            _ => Self::Unknown,
        }
    }
}

/// Immutable geometry and road attributes of one road feature.
///
/// Created when the tile's geometry section is decoded and cached for the
/// lifetime of the tile cache entry. The speed is already resolved against
/// the active [VehicleProfile](crate::VehicleProfile): features the profile
/// cannot use at all are marked impassable instead of being dropped, so that
/// feature ids keep indexing the geometry table densely.
#[derive(Debug, Clone, Default)]
pub struct RoadGeometry {
    points: Vec<LatLon>,
    one_way: bool,
    passable: bool,
    /// Effective speed in km/h (profile base speed scaled by the surface
    /// factor). Zero only when `passable` is false.
    speed_kmh: f64,
    highway_class: HighwayClass,
    link: bool,
    roundabout: bool,
    name: String,
    /// Lane markings of the feature in point order, empty when untagged.
    lanes: Vec<Vec<LaneWay>>,
}

impl RoadGeometry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        points: Vec<LatLon>,
        one_way: bool,
        passable: bool,
        speed_kmh: f64,
        highway_class: HighwayClass,
        link: bool,
        roundabout: bool,
        name: String,
        lanes: Vec<Vec<LaneWay>>,
    ) -> Self {
        Self {
            points,
            one_way,
            passable,
            speed_kmh,
            highway_class,
            link,
            roundabout,
            name,
            lanes,
        }
    }

    pub fn points_count(&self) -> u32 {
        self.points.len() as u32
    }

    pub fn point(&self, idx: u32) -> LatLon {
        self.points[idx as usize]
    }

    pub fn points(&self) -> &[LatLon] {
        &self.points
    }

    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    pub fn is_passable(&self) -> bool {
        self.passable
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn highway_class(&self) -> HighwayClass {
        self.highway_class
    }

    pub fn is_link(&self) -> bool {
        self.link
    }

    pub fn is_roundabout(&self) -> bool {
        self.roundabout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lanes(&self) -> &[Vec<LaneWay>] {
        &self.lanes
    }

    /// Whether a [Segment](crate::Segment) with the given index and direction
    /// may be traversed over this feature.
    pub fn is_valid_segment(&self, idx: u32) -> bool {
        self.points.len() >= 2 && idx < self.points.len() as u32 - 1
    }

    /// Length of the segment between points `idx` and `idx + 1`, in meters.
    pub fn segment_len(&self, idx: u32) -> f64 {
        let a = self.point(idx);
        let b = self.point(idx + 1);
        a.distance(&b)
    }
}

/// A set of [RoadPoints](RoadPoint) which coincide at the same real-world
/// location - the graph's vertex abstraction.
///
/// Every road point belongs to at most one joint; points without a joint are
/// implicit dead ends or mid-feature points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Joint {
    pub points: Vec<RoadPoint>,
}

impl Joint {
    pub fn new(points: Vec<RoadPoint>) -> Self {
        Self { points }
    }
}

/// All road geometries of one tile, indexed densely by feature id.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    roads: Vec<RoadGeometry>,
}

impl Geometry {
    pub fn new(roads: Vec<RoadGeometry>) -> Self {
        Self { roads }
    }

    pub fn roads_count(&self) -> u32 {
        self.roads.len() as u32
    }

    pub fn road(&self, feature: u32) -> Option<&RoadGeometry> {
        self.roads.get(feature as usize)
    }

    /// Position of a road point, `None` when the feature or point index is
    /// out of range (e.g. a corrupt joint record).
    pub fn point(&self, rp: RoadPoint) -> Option<LatLon> {
        self.road(rp.feature)
            .and_then(|r| r.points().get(rp.point as usize).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_validity() {
        let road = RoadGeometry::new(
            vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.01), LatLon::new(0.0, 0.02)],
            false,
            true,
            50.0,
            HighwayClass::Residential,
            false,
            false,
            String::new(),
            vec![],
        );
        assert!(road.is_valid_segment(0));
        assert!(road.is_valid_segment(1));
        assert!(!road.is_valid_segment(2));
    }

    #[test]
    fn segment_length_roughly_matches_haversine() {
        let road = RoadGeometry::new(
            vec![LatLon::new(52.0, 21.0), LatLon::new(52.0, 21.01)],
            false,
            true,
            50.0,
            HighwayClass::Residential,
            false,
            false,
            String::new(),
            vec![],
        );
        // 0.01 degree of longitude at 52N is about 685 m.
        let len = road.segment_len(0);
        assert!((len - 685.0).abs() < 5.0, "got {}", len);
    }

    #[test]
    fn highway_class_ordering() {
        assert!(HighwayClass::Motorway < HighwayClass::Service);
        assert!(HighwayClass::Residential < HighwayClass::Unknown);
        assert_eq!(HighwayClass::from_u8(3), HighwayClass::Secondary);
        assert_eq!(HighwayClass::from_u8(200), HighwayClass::Unknown);
    }
}
