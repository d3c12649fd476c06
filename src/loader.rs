// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Lazy, cached access to map tiles on disk.
//!
//! Tiles are identified by name (the file stem of `<name>.rtil` inside the
//! map directory) and by a dense numeric [TileId] assigned on first sight by
//! the [TileRegistry]. A tile is decoded at most once per loader: repeated
//! loads hand out the same `Arc<LoadedTile>`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::graph::IndexGraph;
use crate::kd::SegmentTree;
use crate::profile::VehicleProfile;
use crate::tile::{sections, tags, SpeedCamera, TileContainer, Transition};
use crate::{Geometry, RouterError, Segment, TileId};

/// Bidirectional mapping between tile names and dense [TileId]s.
///
/// Ids are stable for the registry's lifetime, so they can be embedded in
/// [Segments](Segment) and compared cheaply.
#[derive(Debug, Default)]
pub struct TileRegistry {
    names: Vec<String>,
    ids: HashMap<String, TileId>,
}

impl TileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, assigning a fresh one on first sight.
    pub fn register(&mut self, name: &str) -> TileId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as TileId;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<TileId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: TileId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A fully decoded tile: geometry, routing graph, snapping index and the
/// optional overlays. Shared between the loader's cache and all consumers.
#[derive(Debug)]
pub struct LoadedTile {
    pub tile: TileId,
    pub name: String,
    pub geometry: Arc<Geometry>,
    pub graph: Arc<IndexGraph>,
    pub tree: SegmentTree,
    pub transitions: Vec<Transition>,
    cameras: HashMap<(u32, u32), Vec<SpeedCamera>>,
}

impl LoadedTile {
    /// Speed cameras on the given directed segment, in traversal order.
    ///
    /// For a backward segment the stored forward positions are mirrored.
    /// Duplicate records at the same position collapse to the strictest
    /// (lowest) limit.
    pub fn cameras_on(&self, segment: Segment) -> Vec<SpeedCamera> {
        let mut cams = self
            .cameras
            .get(&(segment.feature, segment.idx))
            .cloned()
            .unwrap_or_default();
        if cams.is_empty() {
            return cams;
        }

        // Decoded records are sorted by position already.
        cams.dedup_by(|next, kept| {
            if (next.coef - kept.coef).abs() < 1e-6 {
                kept.speed_kmh = kept.speed_kmh.min(next.speed_kmh);
                true
            } else {
                false
            }
        });

        if !segment.forward {
            for cam in &mut cams {
                cam.coef = 1.0 - cam.coef;
            }
            cams.reverse();
        }
        cams
    }
}

/// Loads and caches tiles from a map directory for one vehicle profile.
#[derive(Debug)]
pub struct TileLoader<'a> {
    dir: PathBuf,
    profile: &'a VehicleProfile<'a>,
    registry: TileRegistry,
    cache: HashMap<TileId, Arc<LoadedTile>>,
}

impl<'a> TileLoader<'a> {
    pub fn new(dir: impl Into<PathBuf>, profile: &'a VehicleProfile<'a>) -> Self {
        Self {
            dir: dir.into(),
            profile,
            registry: TileRegistry::new(),
            cache: HashMap::new(),
        }
    }

    pub fn profile(&self) -> &'a VehicleProfile<'a> {
        self.profile
    }

    pub fn registry(&self) -> &TileRegistry {
        &self.registry
    }

    /// Registers every `*.rtil` file in the map directory without decoding
    /// anything, and returns the ids of all known tiles.
    pub fn discover(&mut self) -> Result<Vec<TileId>, RouterError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|_| RouterError::TileUnavailable(self.dir.display().to_string()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("rtil") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                self.registry.register(stem);
            }
        }
        Ok((0..self.registry.len() as TileId).collect())
    }

    /// Loads the named tile, registering it if needed.
    pub fn load(&mut self, name: &str) -> Result<Arc<LoadedTile>, RouterError> {
        let tile = self.registry.register(name);
        self.load_by_id(tile)
    }

    pub fn load_by_id(&mut self, tile: TileId) -> Result<Arc<LoadedTile>, RouterError> {
        if let Some(loaded) = self.cache.get(&tile) {
            return Ok(loaded.clone());
        }
        let name = self
            .registry
            .name(tile)
            .ok_or_else(|| RouterError::TileUnavailable(format!("#{}", tile)))?
            .to_string();

        let path = self.dir.join(format!("{}.rtil", name));
        let loaded = match self.decode(tile, &name, &path) {
            Ok(loaded) => loaded,
            Err(err) => {
                log::warn!("tile {}: {}", name, err);
                return Err(RouterError::TileUnavailable(name));
            }
        };
        let loaded = Arc::new(loaded);
        self.cache.insert(tile, loaded.clone());
        Ok(loaded)
    }

    pub fn cached(&self, tile: TileId) -> Option<Arc<LoadedTile>> {
        self.cache.get(&tile).cloned()
    }

    /// Drops all decoded tiles, e.g. after the map directory changed.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn decode(
        &self,
        tile: TileId,
        name: &str,
        path: &std::path::Path,
    ) -> Result<LoadedTile, crate::tile::TileError> {
        let container = TileContainer::open(path)?;

        let geometry = Arc::new(sections::decode_geometry(
            container.required_section(tags::GEOMETRY)?,
            self.profile,
        )?);
        let joints = sections::decode_joints(container.required_section(tags::JOINTS)?)?;

        let access = match container.section(tags::ROAD_ACCESS)? {
            Some(section) => sections::decode_road_access(section)?,
            None => Default::default(),
        };
        let mut graph = IndexGraph::new(tile, geometry.clone(), joints, access);
        if let Some(section) = container.section(tags::RESTRICTIONS)? {
            graph.set_restrictions(&sections::decode_restrictions(section)?);
        }

        let cameras = match container.section(tags::SPEED_CAMS)? {
            Some(section) => sections::decode_speed_cams(section)?,
            None => HashMap::new(),
        };
        let transitions = match container.section(tags::TRANSITIONS)? {
            Some(section) => sections::decode_transitions(section)?,
            None => Vec::new(),
        };

        let tree = SegmentTree::from_geometry(tile, &geometry);
        log::debug!(
            "loaded tile {} ({} roads, {} transitions)",
            name,
            geometry.roads_count(),
            transitions.len(),
        );
        Ok(LoadedTile {
            tile,
            name: name.to_string(),
            geometry,
            graph: Arc::new(graph),
            tree,
            transitions,
            cameras,
        })
    }
}
