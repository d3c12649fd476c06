// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Data-driven vehicle profiles.
//!
//! A [VehicleProfile] is a plain table of speeds and access rules - there is
//! no trait object or per-vehicle subclass. The profile is applied twice:
//! once when a tile's geometry is decoded (resolving each road's effective
//! speed and passability) and once per search (maximum speed for the A*
//! heuristic, U-turn penalty, road-access checks).

use crate::geometry::HighwayClass;
use crate::graph::RoadAccessKind;

/// Speed assigned to one [HighwayClass], in km/h.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassSpeed {
    pub class: HighwayClass,
    pub speed_kmh: f64,
}

/// Describes how a vehicle may use the road network.
///
/// Roads whose highway class has no entry in [VehicleProfile::speeds] are
/// impassable for the profile. All speeds must be finite and positive, and
/// no entry may exceed [VehicleProfile::max_speed_kmh] - the heuristic of
/// the A* search divides by the maximum speed and would lose admissibility
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleProfile<'a> {
    /// Human readable name of the profile, e.g. "car".
    pub name: &'a str,

    /// Speed table per highway class. A class missing from this table makes
    /// the road impassable for this profile.
    pub speeds: &'a [ClassSpeed],

    /// Upper bound of any achievable speed, in km/h. Used for the A*
    /// heuristic lower bound and for leap edges in cross-tile search.
    pub max_speed_kmh: f64,

    /// Speed used for the virtual connection between a requested position
    /// and the nearest road, in km/h.
    pub offroad_speed_kmh: f64,

    /// Fixed additive cost of a U-turn, in seconds. Discourages but does
    /// not forbid turning around mid-route.
    pub uturn_penalty_s: f64,

    /// Whether one-way markings apply to this profile. Pedestrians ignore
    /// them.
    pub obey_one_way: bool,

    /// Road-access kinds which make a road or point impassable.
    pub blocked_access: &'a [RoadAccessKind],
}

impl<'a> VehicleProfile<'a> {
    /// Returns the profile speed for the given class, or `None` when roads
    /// of this class are impassable.
    pub fn speed_for(&self, class: HighwayClass) -> Option<f64> {
        self.speeds
            .iter()
            .find_map(|cs| (cs.class == class).then_some(cs.speed_kmh))
    }

    /// Checks whether a road-access kind blocks this profile.
    pub fn is_access_blocked(&self, kind: RoadAccessKind) -> bool {
        self.blocked_access.contains(&kind)
    }

    pub fn max_speed_mps(&self) -> f64 {
        self.max_speed_kmh / 3.6
    }

    pub fn offroad_speed_mps(&self) -> f64 {
        self.offroad_speed_kmh / 3.6
    }
}

/// Routing profile for cars.
pub const CAR: VehicleProfile = VehicleProfile {
    name: "car",
    speeds: &[
        ClassSpeed {
            class: HighwayClass::Motorway,
            speed_kmh: 117.8,
        },
        ClassSpeed {
            class: HighwayClass::Trunk,
            speed_kmh: 83.4,
        },
        ClassSpeed {
            class: HighwayClass::Primary,
            speed_kmh: 63.1,
        },
        ClassSpeed {
            class: HighwayClass::Secondary,
            speed_kmh: 52.3,
        },
        ClassSpeed {
            class: HighwayClass::Tertiary,
            speed_kmh: 45.5,
        },
        ClassSpeed {
            class: HighwayClass::Residential,
            speed_kmh: 31.4,
        },
        ClassSpeed {
            class: HighwayClass::LivingStreet,
            speed_kmh: 10.0,
        },
        ClassSpeed {
            class: HighwayClass::Service,
            speed_kmh: 15.0,
        },
        ClassSpeed {
            class: HighwayClass::Track,
            speed_kmh: 10.0,
        },
    ],
    max_speed_kmh: 130.0,
    offroad_speed_kmh: 10.0,
    uturn_penalty_s: 120.0,
    obey_one_way: true,
    blocked_access: &[RoadAccessKind::No, RoadAccessKind::Private],
};

/// Routing profile for walking. One-way markings and U-turn penalties do
/// not apply; private roads are avoided but destination-only roads are fine.
pub const PEDESTRIAN: VehicleProfile = VehicleProfile {
    name: "pedestrian",
    speeds: &[
        ClassSpeed {
            class: HighwayClass::Trunk,
            speed_kmh: 4.0,
        },
        ClassSpeed {
            class: HighwayClass::Primary,
            speed_kmh: 4.5,
        },
        ClassSpeed {
            class: HighwayClass::Secondary,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::Tertiary,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::Residential,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::LivingStreet,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::Service,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::Track,
            speed_kmh: 5.0,
        },
        ClassSpeed {
            class: HighwayClass::Path,
            speed_kmh: 5.0,
        },
    ],
    max_speed_kmh: 5.0,
    offroad_speed_kmh: 3.0,
    uturn_penalty_s: 0.0,
    obey_one_way: false,
    blocked_access: &[RoadAccessKind::No],
};

/// Routing profile for bicycles.
pub const BICYCLE: VehicleProfile = VehicleProfile {
    name: "bicycle",
    speeds: &[
        ClassSpeed {
            class: HighwayClass::Trunk,
            speed_kmh: 18.0,
        },
        ClassSpeed {
            class: HighwayClass::Primary,
            speed_kmh: 18.0,
        },
        ClassSpeed {
            class: HighwayClass::Secondary,
            speed_kmh: 20.0,
        },
        ClassSpeed {
            class: HighwayClass::Tertiary,
            speed_kmh: 20.0,
        },
        ClassSpeed {
            class: HighwayClass::Residential,
            speed_kmh: 20.0,
        },
        ClassSpeed {
            class: HighwayClass::LivingStreet,
            speed_kmh: 15.0,
        },
        ClassSpeed {
            class: HighwayClass::Service,
            speed_kmh: 15.0,
        },
        ClassSpeed {
            class: HighwayClass::Track,
            speed_kmh: 12.0,
        },
        ClassSpeed {
            class: HighwayClass::Path,
            speed_kmh: 10.0,
        },
    ],
    max_speed_kmh: 30.0,
    offroad_speed_kmh: 4.0,
    uturn_penalty_s: 20.0,
    obey_one_way: true,
    blocked_access: &[RoadAccessKind::No, RoadAccessKind::Private],
};
