//! Anchoring entities to grid tiles.
//!
//! An anchored entity is parented to a grid, sits on a tile centre and ignores
//! position writes until it is unanchored. Anchoring registers the entity in
//! the grid's snap-grid index; entities without a [`SnapGrid`] tracker get one
//! for the duration of the anchor.

use bevy_ecs::prelude::*;
use glam::IVec2;
use log::{error, warn};

use crate::components::mapgrid::MapGrid;
use crate::components::snapgrid::{SnapGrid, SnapGridOffset};
use crate::components::transformnode::{TransformLifeStage, TransformNode};
use crate::error::TransformError;
use crate::events::raise;
use crate::events::transform::AnchorStateChangedEvent;
use crate::resources::mapmanager::{try_find_grid_at, try_get_grid};
use crate::systems::hierarchy::attach_parent;
use crate::systems::snapgrid::{grid_local_position, snapgrid_refresh, snapgrid_shutdown};
use crate::systems::transform::{set_local_position, world_position};

/// Anchor or unanchor `entity`.
///
/// Before initialization the flag is only stored; it is applied when the node
/// starts running. Anchoring fails unless a grid tile lies under the entity.
pub fn set_anchored(world: &mut World, entity: Entity, anchored: bool) -> Result<(), TransformError> {
    let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
        warn!("set_anchored: {entity:?} has no transform node");
        return Err(TransformError::MissingTransform(entity));
    };
    if node.life_stage < TransformLifeStage::Running {
        node.anchored = anchored;
        return Ok(());
    }
    if node.anchored == anchored {
        return Ok(());
    }
    if anchored {
        anchor_entity(world, entity)
    } else {
        unanchor(world, entity);
        Ok(())
    }
}

/// Anchor `entity` to the tile under its world position.
pub fn anchor_entity(world: &mut World, entity: Entity) -> Result<(), TransformError> {
    let Some(node) = world.get::<TransformNode>(entity) else {
        return Err(TransformError::MissingTransform(entity));
    };
    let position = world_position(&*world, entity)?;
    let candidate = node
        .grid_id
        .filter(|grid| *grid != entity)
        .or_else(|| try_find_grid_at(world, node.map_id, position));
    let Some(grid_entity) = candidate else {
        return Err(TransformError::NoTileUnderEntity(entity));
    };
    let Some(local) = grid_local_position(&*world, grid_entity, entity) else {
        return Err(TransformError::NoTileUnderEntity(entity));
    };
    let Some(grid) = try_get_grid(world, grid_entity) else {
        return Err(TransformError::MissingGrid {
            entity,
            grid: grid_entity,
        });
    };
    let tile = grid.tile_indices_for(local);
    anchor_entity_at(world, entity, grid_entity, tile)
}

/// Anchor `entity` to `tile` of `grid_entity`.
///
/// The anchor is committed only once the entity is parented to the grid,
/// snapped to the tile centre and registered in the tile's cell.
pub fn anchor_entity_at(
    world: &mut World,
    entity: Entity,
    grid_entity: Entity,
    tile: IVec2,
) -> Result<(), TransformError> {
    let Some(grid) = world.get::<MapGrid>(grid_entity) else {
        warn!("{entity:?} cannot anchor to missing grid {grid_entity:?}");
        return Err(TransformError::MissingGrid {
            entity,
            grid: grid_entity,
        });
    };
    if !grid.has_tile(tile) {
        return Err(TransformError::NoTileUnderEntity(entity));
    }
    let centre = grid.grid_tile_to_local(tile);

    if world
        .get::<TransformNode>(entity)
        .is_some_and(|node| node.anchored)
    {
        release_anchor(world, entity, false);
    }
    if world.get::<SnapGrid>(entity).is_none() {
        world.entity_mut(entity).insert(SnapGrid {
            offset: SnapGridOffset::Center,
            position: None,
            anchor_owned: true,
        });
    }

    let result = attach_parent(world, entity, grid_entity)
        .and_then(|_| set_local_position(world, entity, centre));
    if let Err(err) = result {
        drop_anchor_tracker(world, entity);
        return Err(err);
    }

    let running = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(TransformError::MissingTransform(entity));
        };
        node.anchored = true;
        node.is_running()
    };
    snapgrid_refresh(world, entity);
    if running {
        raise(
            world,
            AnchorStateChangedEvent {
                entity,
                anchored: true,
                detaching: false,
            },
        );
    }
    Ok(())
}

/// Release the anchor of `entity`, if any.
pub fn unanchor(world: &mut World, entity: Entity) {
    release_anchor(world, entity, false);
}

/// `detaching` is reported on the event when the entity is leaving its parent.
pub(crate) fn release_anchor(world: &mut World, entity: Entity, detaching: bool) {
    let (grid, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        if !node.anchored {
            return;
        }
        node.anchored = false;
        (node.parent, node.is_running())
    };

    match grid.filter(|grid| try_get_grid(world, *grid).is_some()) {
        Some(_) => drop_anchor_tracker(world, entity),
        None => error!("{entity:?} was anchored but its grid {grid:?} no longer exists"),
    }

    if running {
        raise(
            world,
            AnchorStateChangedEvent {
                entity,
                anchored: false,
                detaching,
            },
        );
    }
}

// Trackers inserted by anchoring leave with the anchor; others keep tracking.
fn drop_anchor_tracker(world: &mut World, entity: Entity) {
    if world
        .get::<SnapGrid>(entity)
        .is_some_and(|tracker| tracker.anchor_owned)
    {
        snapgrid_shutdown(world, entity);
        world.entity_mut(entity).remove::<SnapGrid>();
    }
}
