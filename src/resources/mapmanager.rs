//! Map and grid registry.
//!
//! [`MapManager`] knows which entity owns each map and which grids live on it.
//! It answers the lookups the hierarchy needs: map entity for a [`MapId`],
//! grids of a map, and (through [`try_find_grid_at`]) the grid with a
//! non-empty tile under a world position.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::components::mapgrid::MapGrid;
use crate::error::TransformError;
use crate::systems::transform::inv_world_matrix;

/// Identifier of a map. [`MapId::NULLSPACE`] is the map of detached entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub u32);

impl MapId {
    pub const NULLSPACE: MapId = MapId(0);

    pub fn is_nullspace(self) -> bool {
        self == MapId::NULLSPACE
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

#[derive(Resource, Debug, Default)]
pub struct MapManager {
    maps: BTreeMap<MapId, Entity>,
    grids: BTreeMap<MapId, BTreeSet<Entity>>,
    next_map: u32,
}

impl MapManager {
    /// Reserve a fresh map id. Ids start at 1; 0 is null-space.
    pub fn allocate_map_id(&mut self) -> MapId {
        self.next_map = self.next_map.max(1);
        while self.maps.contains_key(&MapId(self.next_map)) {
            self.next_map += 1;
        }
        let id = MapId(self.next_map);
        self.next_map += 1;
        id
    }

    pub fn register_map(&mut self, map_id: MapId, entity: Entity) {
        self.maps.insert(map_id, entity);
        self.grids.entry(map_id).or_default();
    }

    pub fn unregister_map(&mut self, map_id: MapId) -> Option<Entity> {
        self.grids.remove(&map_id);
        self.maps.remove(&map_id)
    }

    pub fn has_map_entity(&self, map_id: MapId) -> bool {
        self.maps.contains_key(&map_id)
    }

    pub fn get_map_entity(&self, map_id: MapId) -> Option<Entity> {
        self.maps.get(&map_id).copied()
    }

    pub fn get_map_entity_or_err(&self, map_id: MapId) -> Result<Entity, TransformError> {
        self.get_map_entity(map_id)
            .ok_or(TransformError::MissingMap(map_id))
    }

    pub fn map_ids(&self) -> impl Iterator<Item = MapId> + '_ {
        self.maps.keys().copied()
    }

    /// Index `grid` under `map_id`. Null-space keeps no grid index.
    pub fn register_grid(&mut self, map_id: MapId, grid: Entity) {
        if map_id.is_nullspace() {
            return;
        }
        self.grids.entry(map_id).or_default().insert(grid);
    }

    pub fn unregister_grid(&mut self, map_id: MapId, grid: Entity) {
        if let Some(grids) = self.grids.get_mut(&map_id) {
            grids.remove(&grid);
        }
    }

    pub fn grids_on(&self, map_id: MapId) -> impl Iterator<Item = Entity> + '_ {
        self.grids
            .get(&map_id)
            .into_iter()
            .flat_map(|grids| grids.iter().copied())
    }
}

/// The grid component of `grid`, if it still exists.
pub fn try_get_grid(world: &World, grid: Entity) -> Option<&MapGrid> {
    world.get::<MapGrid>(grid)
}

/// First grid on `map_id` with a non-empty tile under `world_position`.
///
/// Grids are tried in entity order so the answer is deterministic when grids
/// overlap.
pub fn try_find_grid_at(world: &World, map_id: MapId, world_position: Vec2) -> Option<Entity> {
    if map_id.is_nullspace() {
        return None;
    }
    let manager = world.get_resource::<MapManager>()?;
    manager.grids_on(map_id).find(|&grid_entity| {
        let Some(grid) = try_get_grid(world, grid_entity) else {
            return false;
        };
        let Ok(inverse) = inv_world_matrix(world, grid_entity) else {
            return false;
        };
        let local = inverse.transform_point2(world_position);
        grid.has_tile(grid.tile_indices_for(local))
    })
}
