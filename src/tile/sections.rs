// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Encoding and decoding of the individual tile sections.
//!
//! Every section is independently versioned. Decoders are strict about
//! structure (a truncated table is an error) but lenient about content:
//! records the decoder does not understand are logged and skipped where the
//! format allows it.

use std::collections::HashMap;

use super::codec::{self, Reader};
use super::{Section, TileError};
use crate::geometry::{Geometry, HighwayClass, Joint, RoadGeometry};
use crate::graph::{Restriction, RestrictionKind, RoadAccess, RoadAccessKind};
use crate::profile::VehicleProfile;
use crate::turns::LaneWay;
use crate::{LatLon, RoadPoint};

pub const GEOMETRY_VERSION: u16 = 1;
pub const JOINTS_VERSION: u16 = 1;
pub const RESTRICTIONS_VERSION: u16 = 1;
pub const ROAD_ACCESS_VERSION: u16 = 1;
pub const SPEED_CAMS_VERSION: u16 = 1;
pub const TRANSITIONS_VERSION: u16 = 1;

/// Coordinates are stored as zig-zag deltas of 1e-7 degree units,
/// which keeps sub-centimeter precision worldwide.
const COORD_SCALE: f64 = 1e7;

const FLAG_ONE_WAY: u8 = 1 << 0;
const FLAG_LINK: u8 = 1 << 1;
const FLAG_ROUNDABOUT: u8 = 1 << 2;

fn checked_reader<'a>(section: Section<'a>, expected: u16, tag: &str) -> Result<Reader<'a>, TileError> {
    if section.version != expected {
        return Err(TileError::UnsupportedSectionVersion {
            tag: tag.to_string(),
            version: section.version,
        });
    }
    Ok(Reader::new(section.data))
}

/// Profile-independent road attributes, as written during tile generation.
#[derive(Debug, Clone, Default)]
pub struct RoadRecord {
    pub points: Vec<LatLon>,
    pub one_way: bool,
    pub link: bool,
    pub roundabout: bool,
    pub class: HighwayClass,
    pub name: String,
    /// Speed scaling in [0, 1] from the surface quality, 1.0 for paved roads.
    pub surface: f64,
    pub lanes: Vec<Vec<LaneWay>>,
}

pub fn encode_geometry(roads: &[RoadRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_varint(&mut out, roads.len() as u64);
    for road in roads {
        let mut flags = 0u8;
        if road.one_way {
            flags |= FLAG_ONE_WAY;
        }
        if road.link {
            flags |= FLAG_LINK;
        }
        if road.roundabout {
            flags |= FLAG_ROUNDABOUT;
        }
        out.push(flags);
        out.push(road.class as u8);
        codec::write_string(&mut out, &road.name);
        out.push((road.surface.clamp(0.0, 1.0) * 100.0).round() as u8);

        codec::write_varint(&mut out, road.lanes.len() as u64);
        for lane in &road.lanes {
            codec::write_varint(&mut out, lane.len() as u64);
            for way in lane {
                out.push(*way as u8);
            }
        }

        codec::write_varint(&mut out, road.points.len() as u64);
        let mut prev_lat = 0i64;
        let mut prev_lon = 0i64;
        for point in &road.points {
            let lat = (point.lat * COORD_SCALE).round() as i64;
            let lon = (point.lon * COORD_SCALE).round() as i64;
            codec::write_signed_varint(&mut out, lat - prev_lat);
            codec::write_signed_varint(&mut out, lon - prev_lon);
            prev_lat = lat;
            prev_lon = lon;
        }
    }
    out
}

/// Decodes the geometry section, resolving speeds against `profile`.
///
/// Features the profile cannot drive on stay in the table as impassable
/// roads, so feature ids remain dense indices.
pub fn decode_geometry(
    section: Section<'_>,
    profile: &VehicleProfile<'_>,
) -> Result<Geometry, TileError> {
    let mut r = checked_reader(section, GEOMETRY_VERSION, super::tags::GEOMETRY)?;
    let road_count = r.read_varint()? as usize;
    let mut roads = Vec::with_capacity(road_count);

    for feature in 0..road_count {
        let flags = r.read_u8()?;
        let class = HighwayClass::from_u8(r.read_u8()?);
        let name = r.read_string()?;
        let surface = f64::from(r.read_u8()?).min(100.0) / 100.0;

        let lane_count = r.read_varint()? as usize;
        let mut lanes = Vec::with_capacity(lane_count);
        for _ in 0..lane_count {
            let way_count = r.read_varint()? as usize;
            let mut ways = Vec::with_capacity(way_count);
            for _ in 0..way_count {
                let raw = r.read_u8()?;
                match LaneWay::from_u8(raw) {
                    Some(way) => ways.push(way),
                    None => log::warn!("feature {}: unknown lane way {}, ignoring", feature, raw),
                }
            }
            lanes.push(ways);
        }

        let point_count = r.read_varint()? as usize;
        let mut points = Vec::with_capacity(point_count);
        let mut lat = 0i64;
        let mut lon = 0i64;
        for _ in 0..point_count {
            lat += r.read_signed_varint()?;
            lon += r.read_signed_varint()?;
            points.push(LatLon::new(
                lat as f64 / COORD_SCALE,
                lon as f64 / COORD_SCALE,
            ));
        }
        if point_count < 2 {
            log::warn!("feature {}: fewer than 2 points, marking impassable", feature);
        }

        let base = profile.speed_for(class);
        let speed_kmh = base
            .map(|s| (s * surface).min(profile.max_speed_kmh))
            .unwrap_or(0.0);
        let passable = speed_kmh > 0.0 && point_count >= 2;

        roads.push(RoadGeometry::new(
            points,
            flags & FLAG_ONE_WAY != 0,
            passable,
            speed_kmh,
            class,
            flags & FLAG_LINK != 0,
            flags & FLAG_ROUNDABOUT != 0,
            name,
            lanes,
        ));
    }
    Ok(Geometry::new(roads))
}

pub fn encode_joints(joints: &[Joint]) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_varint(&mut out, joints.len() as u64);
    for joint in joints {
        codec::write_varint(&mut out, joint.points.len() as u64);
        for rp in &joint.points {
            codec::write_varint(&mut out, u64::from(rp.feature));
            codec::write_varint(&mut out, u64::from(rp.point));
        }
    }
    out
}

pub fn decode_joints(section: Section<'_>) -> Result<Vec<Joint>, TileError> {
    let mut r = checked_reader(section, JOINTS_VERSION, super::tags::JOINTS)?;
    let joint_count = r.read_varint()? as usize;
    let mut joints = Vec::with_capacity(joint_count);
    for _ in 0..joint_count {
        let point_count = r.read_varint()? as usize;
        let mut points = Vec::with_capacity(point_count);
        for _ in 0..point_count {
            let feature = r.read_varint()? as u32;
            let point = r.read_varint()? as u32;
            points.push(RoadPoint::new(feature, point));
        }
        joints.push(Joint::new(points));
    }
    Ok(joints)
}

pub fn encode_restrictions(restrictions: &[Restriction]) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_varint(&mut out, restrictions.len() as u64);
    for r in restrictions {
        out.push(match r.kind {
            RestrictionKind::No => 0,
            RestrictionKind::Only => 1,
        });
        codec::write_varint(&mut out, u64::from(r.from_feature));
        codec::write_varint(&mut out, u64::from(r.to_feature));
    }
    out
}

pub fn decode_restrictions(section: Section<'_>) -> Result<Vec<Restriction>, TileError> {
    let mut r = checked_reader(section, RESTRICTIONS_VERSION, super::tags::RESTRICTIONS)?;
    let count = r.read_varint()? as usize;
    let mut restrictions = Vec::with_capacity(count);
    for _ in 0..count {
        let raw_kind = r.read_u8()?;
        let from_feature = r.read_varint()? as u32;
        let to_feature = r.read_varint()? as u32;
        let kind = match raw_kind {
            0 => RestrictionKind::No,
            1 => RestrictionKind::Only,
            other => {
                log::warn!("unknown restriction kind {}, ignoring", other);
                continue;
            }
        };
        restrictions.push(Restriction {
            kind,
            from_feature,
            to_feature,
        });
    }
    Ok(restrictions)
}

pub fn encode_road_access(access: &RoadAccess) -> Vec<u8> {
    let mut out = Vec::new();
    let mut features: Vec<_> = access.features().collect();
    features.sort_unstable_by_key(|&(feature, _)| feature);
    let mut points: Vec<_> = access.points().collect();
    points.sort_unstable_by_key(|&(rp, _)| rp);

    codec::write_varint(&mut out, (features.len() + points.len()) as u64);
    for (feature, kind) in features {
        out.push(0);
        codec::write_varint(&mut out, u64::from(feature));
        codec::write_varint(&mut out, 0);
        out.push(kind as u8);
    }
    for (rp, kind) in points {
        out.push(1);
        codec::write_varint(&mut out, u64::from(rp.feature));
        codec::write_varint(&mut out, u64::from(rp.point));
        out.push(kind as u8);
    }
    out
}

pub fn decode_road_access(section: Section<'_>) -> Result<RoadAccess, TileError> {
    let mut r = checked_reader(section, ROAD_ACCESS_VERSION, super::tags::ROAD_ACCESS)?;
    let count = r.read_varint()? as usize;
    let mut access = RoadAccess::new();
    for _ in 0..count {
        let scope = r.read_u8()?;
        let feature = r.read_varint()? as u32;
        let point = r.read_varint()? as u32;
        let raw_kind = r.read_u8()?;
        let kind = match RoadAccessKind::from_u8(raw_kind) {
            Some(kind) => kind,
            None => {
                log::warn!("unknown road access kind {}, ignoring", raw_kind);
                continue;
            }
        };
        match scope {
            0 => access.insert_feature(feature, kind),
            1 => access.insert_point(RoadPoint::new(feature, point), kind),
            other => log::warn!("unknown road access scope {}, ignoring", other),
        }
    }
    Ok(access)
}

/// A speed camera pinned to a fraction of one road segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedCamera {
    pub feature: u32,
    pub segment_idx: u32,
    /// Position along the forward-oriented segment, in [0, 1].
    pub coef: f64,
    /// Enforced limit in km/h, 0 when the limit is unknown.
    pub speed_kmh: u8,
}

pub fn encode_speed_cams(cameras: &[SpeedCamera]) -> Vec<u8> {
    let mut sorted = cameras.to_vec();
    sorted.sort_by(|a, b| {
        (a.feature, a.segment_idx)
            .cmp(&(b.feature, b.segment_idx))
            .then(a.coef.total_cmp(&b.coef))
    });

    let mut out = Vec::new();
    codec::write_varint(&mut out, sorted.len() as u64);
    let mut prev_feature = 0u32;
    for cam in &sorted {
        codec::write_varint(&mut out, u64::from(cam.feature - prev_feature));
        codec::write_varint(&mut out, u64::from(cam.segment_idx));
        codec::write_u32(&mut out, (cam.coef.clamp(0.0, 1.0) * f64::from(u32::MAX)).round() as u32);
        out.push(cam.speed_kmh);
        // Conditional enforcement (time windows etc.) is not produced yet,
        // so the condition list is always empty.
        codec::write_varint(&mut out, 0);
        prev_feature = cam.feature;
    }
    out
}

/// Decodes speed cameras, grouped by `(feature, segment_idx)`.
///
/// A record with a non-empty condition list uses a layout this decoder does
/// not know, so decoding stops there and everything read so far is kept.
pub fn decode_speed_cams(
    section: Section<'_>,
) -> Result<HashMap<(u32, u32), Vec<SpeedCamera>>, TileError> {
    let mut r = checked_reader(section, SPEED_CAMS_VERSION, super::tags::SPEED_CAMS)?;
    let count = r.read_varint()? as usize;
    let mut cameras: HashMap<(u32, u32), Vec<SpeedCamera>> = HashMap::new();
    let mut feature = 0u32;
    for read in 0..count {
        feature += r.read_varint()? as u32;
        let segment_idx = r.read_varint()? as u32;
        let coef = f64::from(r.read_u32()?) / f64::from(u32::MAX);
        let speed_kmh = r.read_u8()?;
        let condition_count = r.read_varint()?;
        if condition_count != 0 {
            log::warn!(
                "conditional speed camera on feature {}, dropping it and {} following records",
                feature,
                count - read - 1,
            );
            break;
        }
        cameras.entry((feature, segment_idx)).or_default().push(SpeedCamera {
            feature,
            segment_idx,
            coef,
            speed_kmh,
        });
    }
    Ok(cameras)
}

/// One side of a border crossing: a segment of this tile together with its
/// twin feature in the neighbouring tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub feature: u32,
    pub idx: u32,
    pub forward: bool,
    pub twin_tile: String,
    pub twin_feature: u32,
    pub twin_idx: u32,
    pub twin_forward: bool,
}

pub fn encode_transitions(transitions: &[Transition]) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_varint(&mut out, transitions.len() as u64);
    for t in transitions {
        codec::write_varint(&mut out, u64::from(t.feature));
        codec::write_varint(&mut out, u64::from(t.idx));
        out.push(u8::from(t.forward));
        codec::write_string(&mut out, &t.twin_tile);
        codec::write_varint(&mut out, u64::from(t.twin_feature));
        codec::write_varint(&mut out, u64::from(t.twin_idx));
        out.push(u8::from(t.twin_forward));
    }
    out
}

pub fn decode_transitions(section: Section<'_>) -> Result<Vec<Transition>, TileError> {
    let mut r = checked_reader(section, TRANSITIONS_VERSION, super::tags::TRANSITIONS)?;
    let count = r.read_varint()? as usize;
    let mut transitions = Vec::with_capacity(count);
    for _ in 0..count {
        transitions.push(Transition {
            feature: r.read_varint()? as u32,
            idx: r.read_varint()? as u32,
            forward: r.read_u8()? != 0,
            twin_tile: r.read_string()?,
            twin_feature: r.read_varint()? as u32,
            twin_idx: r.read_varint()? as u32,
            twin_forward: r.read_u8()? != 0,
        });
    }
    Ok(transitions)
}
