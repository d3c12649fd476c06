// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! The top-level routing facade.
//!
//! A [Router] owns a [TileLoader] for one map directory and one vehicle
//! profile, snaps requested positions onto the road network, runs the
//! bidirectional A* (within one tile, or over the [world](crate::world)
//! when the endpoints land in different tiles) and assembles the winning
//! segment path into a [Route].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::astar::{find_route_bidirectional, DEFAULT_STEP_LIMIT};
use crate::estimator::{EdgeEstimator, TrafficOverlay};
use crate::kd::SnappedPoint;
use crate::loader::TileLoader;
use crate::profile::VehicleProfile;
use crate::route::{self, Route};
use crate::starter::Starter;
use crate::world::WorldGraph;
use crate::{LatLon, RouterError};

/// How far from the requested position a road may be to count as a match.
const SNAP_RADIUS_M: f64 = 200.0;

pub struct Router<'p> {
    loader: TileLoader<'p>,
    traffic: Option<TrafficOverlay>,
    step_limit: usize,
}

impl<'p> Router<'p> {
    /// Opens a map directory and registers every tile in it. Tiles are
    /// decoded lazily, on the first request that needs them.
    pub fn new(
        dir: impl Into<PathBuf>,
        profile: &'p VehicleProfile<'p>,
    ) -> Result<Self, RouterError> {
        let mut loader = TileLoader::new(dir, profile);
        loader.discover()?;
        Ok(Self {
            loader,
            traffic: None,
            step_limit: DEFAULT_STEP_LIMIT,
        })
    }

    pub fn profile(&self) -> &'p VehicleProfile<'p> {
        self.loader.profile()
    }

    /// Replaces the real-time traffic overlay used by subsequent requests.
    pub fn set_traffic(&mut self, traffic: TrafficOverlay) {
        self.traffic = Some(traffic);
    }

    pub fn clear_traffic(&mut self) {
        self.traffic = None;
    }

    pub fn set_step_limit(&mut self, step_limit: usize) {
        self.step_limit = step_limit;
    }

    /// Re-scans the map directory, dropping every decoded tile.
    pub fn refresh(&mut self) -> Result<(), RouterError> {
        self.loader.clear();
        self.loader.discover()?;
        Ok(())
    }

    /// Computes a route between two positions.
    ///
    /// The search polls `cancel` cooperatively; raising it makes the request
    /// fail with [RouterError::Cancelled] shortly after.
    pub fn build_route(
        &mut self,
        start: LatLon,
        finish: LatLon,
        cancel: &AtomicBool,
    ) -> Result<Route, RouterError> {
        let snapped_start = self.snap(start).ok_or(RouterError::StartPointNotFound)?;
        let snapped_finish = self.snap(finish).ok_or(RouterError::EndPointNotFound)?;

        let estimator = match &self.traffic {
            Some(traffic) => EdgeEstimator::with_traffic(self.loader.profile(), traffic),
            None => EdgeEstimator::new(self.loader.profile()),
        };

        if snapped_start.segment.tile == snapped_finish.segment.tile {
            let tile = self.loader.load_by_id(snapped_start.segment.tile)?;
            let starter = Starter::new(&tile.graph, &estimator, snapped_start, snapped_finish);
            let raw = find_route_bidirectional(
                &starter,
                starter.start_segment(),
                starter.finish_segment(),
                self.step_limit,
                cancel,
            )?;
            if raw.is_empty() {
                return Err(RouterError::RouteNotFound);
            }
            let path = starter.realize_path(&raw);
            let mut tiles = HashMap::new();
            tiles.insert(tile.tile, tile.clone());
            return route::assemble(&tiles, &estimator, &path, &snapped_start, &snapped_finish);
        }

        let found = WorldGraph::new(&mut self.loader, &estimator).route(
            &snapped_start,
            &snapped_finish,
            self.step_limit,
            cancel,
        )?;
        let mut built = route::assemble(
            &found.tiles,
            &estimator,
            &found.path,
            &snapped_start,
            &snapped_finish,
        )?;
        built.set_absent_tiles(found.absent);
        Ok(built)
    }

    /// The closest road position over all tiles, within [SNAP_RADIUS_M].
    /// Tiles which fail to load are skipped here; a route through them
    /// would fail anyway and a nearby healthy tile may still match.
    fn snap(&mut self, point: LatLon) -> Option<SnappedPoint> {
        let mut best: Option<SnappedPoint> = None;
        for id in 0..self.loader.registry().len() as crate::TileId {
            let Ok(tile) = self.loader.load_by_id(id) else {
                log::debug!("snap: skipping unavailable tile #{}", id);
                continue;
            };
            let Some(snap) = tile.tree.nearest(point, SNAP_RADIUS_M) else {
                continue;
            };
            if best
                .as_ref()
                .map(|b| snap.distance_m < b.distance_m)
                .unwrap_or(true)
            {
                best = Some(snap);
            }
        }
        best
    }
}
