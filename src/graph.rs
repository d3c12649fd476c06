// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Per-tile routing graph over [Segment] vertices.
//!
//! The [IndexGraph] owns a tile's decoded [Geometry], its joint table and
//! access overrides, and enumerates directed segment-to-segment transitions.
//! Turn restrictions are resolved once at load time into a set of blocked
//! `(from feature, to feature, joint)` triples, so the hot edge-enumeration
//! path only does set lookups.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::estimator::EdgeEstimator;
use crate::geometry::{Geometry, Joint};
use crate::{JointId, RoadPoint, Segment, TileId};

/// Access override carried by a feature or a single road point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoadAccessKind {
    No = 0,
    Private = 1,
    Destination = 2,
}

impl RoadAccessKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::No),
            1 => Some(Self::Private),
            2 => Some(Self::Destination),
            _ => None,
        }
    }
}

/// Access overrides of one tile, keyed by feature or by road point.
#[derive(Debug, Clone, Default)]
pub struct RoadAccess {
    features: HashMap<u32, RoadAccessKind>,
    points: HashMap<RoadPoint, RoadAccessKind>,
}

impl RoadAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_feature(&mut self, feature: u32, kind: RoadAccessKind) {
        self.features.insert(feature, kind);
    }

    pub fn insert_point(&mut self, point: RoadPoint, kind: RoadAccessKind) {
        self.points.insert(point, kind);
    }

    pub fn feature_access(&self, feature: u32) -> Option<RoadAccessKind> {
        self.features.get(&feature).copied()
    }

    pub fn point_access(&self, point: RoadPoint) -> Option<RoadAccessKind> {
        self.points.get(&point).copied()
    }

    pub fn features(&self) -> impl Iterator<Item = (u32, RoadAccessKind)> + '_ {
        self.features.iter().map(|(&f, &k)| (f, k))
    }

    pub fn points(&self) -> impl Iterator<Item = (RoadPoint, RoadAccessKind)> + '_ {
        self.points.iter().map(|(&p, &k)| (p, k))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionKind {
    /// The from-to turn is forbidden.
    No,
    /// Of all turns off the from-feature, only the to-feature is allowed.
    Only,
}

/// A turn restriction between two features, as stored in the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restriction {
    pub kind: RestrictionKind,
    pub from_feature: u32,
    pub to_feature: u32,
}

/// A directed transition to (or from) a neighbouring segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: Segment,
    pub weight: f64,
}

/// Routing graph of a single tile.
#[derive(Debug)]
pub struct IndexGraph {
    tile: TileId,
    geometry: Arc<Geometry>,
    joints: Vec<Joint>,
    joint_at: HashMap<RoadPoint, JointId>,
    access: RoadAccess,
    blocked_turns: HashSet<(u32, u32, JointId)>,
}

impl IndexGraph {
    pub fn new(tile: TileId, geometry: Arc<Geometry>, joints: Vec<Joint>, access: RoadAccess) -> Self {
        let mut joint_at = HashMap::new();
        for (id, joint) in joints.iter().enumerate() {
            for &rp in &joint.points {
                joint_at.insert(rp, id as JointId);
            }
        }
        Self {
            tile,
            geometry,
            joints,
            joint_at,
            access,
            blocked_turns: HashSet::new(),
        }
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    pub fn joint_at(&self, rp: RoadPoint) -> Option<JointId> {
        self.joint_at.get(&rp).copied()
    }

    /// Resolves turn restrictions into blocked joint transitions.
    ///
    /// `Only(a, b)` is rewritten into `No(a, x)` for every other feature `x`
    /// meeting `a` and `b` at the same joint. Restrictions whose features
    /// never share a joint are dangling tile data; they are logged and
    /// dropped rather than failing the whole tile.
    pub fn set_restrictions(&mut self, restrictions: &[Restriction]) {
        let mut feature_joints: HashMap<u32, Vec<JointId>> = HashMap::new();
        for (id, joint) in self.joints.iter().enumerate() {
            for &rp in &joint.points {
                let joints = feature_joints.entry(rp.feature).or_default();
                if joints.last() != Some(&(id as JointId)) {
                    joints.push(id as JointId);
                }
            }
        }

        let mut dropped = 0usize;
        for restriction in restrictions {
            let mut applied = false;
            let from_joints = feature_joints
                .get(&restriction.from_feature)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for &joint_id in from_joints {
                let joint = &self.joints[joint_id as usize];
                if !joint.points.iter().any(|rp| rp.feature == restriction.to_feature) {
                    continue;
                }
                applied = true;
                match restriction.kind {
                    RestrictionKind::No => {
                        self.blocked_turns.insert((
                            restriction.from_feature,
                            restriction.to_feature,
                            joint_id,
                        ));
                    }
                    RestrictionKind::Only => {
                        for &rp in &joint.points {
                            if rp.feature != restriction.to_feature {
                                self.blocked_turns.insert((
                                    restriction.from_feature,
                                    rp.feature,
                                    joint_id,
                                ));
                            }
                        }
                    }
                }
            }
            if !applied {
                dropped += 1;
                log::warn!(
                    "tile {}: dangling restriction {:?} from {} to {}, ignoring",
                    self.tile,
                    restriction.kind,
                    restriction.from_feature,
                    restriction.to_feature,
                );
            }
        }
        if dropped != 0 {
            log::warn!("tile {}: dropped {} dangling restriction(s)", self.tile, dropped);
        }
    }

    fn is_turn_blocked(&self, from_feature: u32, to_feature: u32, via: RoadPoint) -> bool {
        match self.joint_at(via) {
            Some(joint_id) => self
                .blocked_turns
                .contains(&(from_feature, to_feature, joint_id)),
            None => false,
        }
    }

    fn feature_usable(&self, estimator: &EdgeEstimator<'_>, feature: u32) -> bool {
        let Some(road) = self.geometry.road(feature) else {
            return false;
        };
        if !road.is_passable() {
            return false;
        }
        match self.access.feature_access(feature) {
            Some(kind) => !estimator.profile().is_access_blocked(kind),
            None => true,
        }
    }

    fn point_usable(&self, estimator: &EdgeEstimator<'_>, rp: RoadPoint) -> bool {
        match self.access.point_access(rp) {
            Some(kind) => !estimator.profile().is_access_blocked(kind),
            None => true,
        }
    }

    /// Whether the profile may enter and traverse the given directed segment.
    pub(crate) fn can_enter(&self, estimator: &EdgeEstimator<'_>, segment: Segment) -> bool {
        let Some(road) = self.geometry.road(segment.feature) else {
            return false;
        };
        if !road.is_valid_segment(segment.idx) || !self.feature_usable(estimator, segment.feature) {
            return false;
        }
        segment.forward || !(road.is_one_way() && estimator.profile().obey_one_way)
    }

    /// Directed segments leaving the junction at `rp`.
    fn departures(&self, estimator: &EdgeEstimator<'_>, rp: RoadPoint, out: &mut Vec<Segment>) {
        let Some(road) = self.geometry.road(rp.feature) else {
            return;
        };
        if !self.feature_usable(estimator, rp.feature) {
            return;
        }
        if rp.point + 1 < road.points_count() {
            out.push(Segment::new(self.tile, rp.feature, rp.point, true));
        }
        if rp.point > 0 && !(road.is_one_way() && estimator.profile().obey_one_way) {
            out.push(Segment::new(self.tile, rp.feature, rp.point - 1, false));
        }
    }

    /// Directed segments arriving at the junction at `rp`.
    fn arrivals(&self, estimator: &EdgeEstimator<'_>, rp: RoadPoint, out: &mut Vec<Segment>) {
        let Some(road) = self.geometry.road(rp.feature) else {
            return;
        };
        if !self.feature_usable(estimator, rp.feature) {
            return;
        }
        if rp.point > 0 {
            out.push(Segment::new(self.tile, rp.feature, rp.point - 1, true));
        }
        if rp.point + 1 < road.points_count() && !(road.is_one_way() && estimator.profile().obey_one_way) {
            out.push(Segment::new(self.tile, rp.feature, rp.point, false));
        }
    }

    /// Enumerates transitions of `segment`.
    ///
    /// With `outgoing`, the edges are `segment -> to` and each weight is the
    /// cost of traversing `to`; otherwise the edges are `to -> segment` and
    /// each weight is the cost of traversing `segment`. A u-turn onto the
    /// reversed segment carries the profile's penalty on top.
    pub fn edges(
        &self,
        estimator: &EdgeEstimator<'_>,
        segment: Segment,
        outgoing: bool,
    ) -> Vec<Edge> {
        let junction = if outgoing {
            segment.front_point()
        } else {
            segment.rear_point()
        };
        if !self.point_usable(estimator, junction) {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        match self.joint_at(junction) {
            Some(joint_id) => {
                for &rp in &self.joints[joint_id as usize].points {
                    if outgoing {
                        self.departures(estimator, rp, &mut candidates);
                    } else {
                        self.arrivals(estimator, rp, &mut candidates);
                    }
                }
            }
            None => {
                // Mid-feature point: the only neighbours are the continuation
                // and the u-turn, both on the segment's own feature.
                if outgoing {
                    self.departures(estimator, junction, &mut candidates);
                } else {
                    self.arrivals(estimator, junction, &mut candidates);
                }
            }
        }

        let mut edges = Vec::with_capacity(candidates.len());
        for to in candidates {
            let uturn = to == segment.reversed();
            let (from_feature, to_feature) = if outgoing {
                (segment.feature, to.feature)
            } else {
                (to.feature, segment.feature)
            };
            if self.is_turn_blocked(from_feature, to_feature, junction) {
                continue;
            }
            let entered = if outgoing { to } else { segment };
            let Some(road) = self.geometry.road(entered.feature) else {
                continue;
            };
            let mut weight = estimator.segment_weight(&entered, road);
            if !weight.is_finite() {
                continue;
            }
            if uturn {
                weight += estimator.uturn_penalty();
            }
            edges.push(Edge { to, weight });
        }
        edges
    }
}
