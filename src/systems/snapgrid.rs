//! Snap-grid index maintenance and adjacency queries.
//!
//! Entities with a [`SnapGrid`] tracker are registered in one cell of their
//! grid's [`SnapGridIndex`](crate::components::snapgrid::SnapGridIndex).
//! [`update_snapgrid_positions`] keeps the registration current by reading the
//! tick's [`MoveEvent`]s, and writes a [`SnapGridPositionChangedEvent`] only
//! when the resolved cell actually changes.

use arrayvec::ArrayVec;
use bevy_ecs::prelude::*;
use glam::{IVec2, Vec2};
use log::warn;

use crate::components::mapgrid::MapGrid;
use crate::components::snapgrid::{SnapGrid, SnapGridOffset};
use crate::components::transformnode::TransformNode;
use crate::events::raise;
use crate::events::snapgrid::SnapGridPositionChangedEvent;
use crate::events::transform::MoveEvent;
use crate::maths::Direction;
use crate::systems::transform::{TransformLookup, inv_world_matrix, world_position};

/// Position of `entity` in the local frame of `grid`.
pub fn grid_local_position<L: TransformLookup + ?Sized>(
    lookup: &L,
    grid: Entity,
    entity: Entity,
) -> Option<Vec2> {
    let inverse = inv_world_matrix(lookup, grid).ok()?;
    let position = world_position(lookup, entity).ok()?;
    Some(inverse.transform_point2(position))
}

fn resolve_cell<L: TransformLookup + ?Sized>(
    lookup: &L,
    grid_entity: Entity,
    grid: &MapGrid,
    entity: Entity,
    offset: SnapGridOffset,
) -> Option<IVec2> {
    let local = grid_local_position(lookup, grid_entity, entity)?;
    Some(grid.snap_grid_cell_for(local, offset))
}

// Grid and cell the tracker of `entity` should be registered in right now.
fn desired_cell(world: &World, entity: Entity, offset: SnapGridOffset) -> Option<(Entity, IVec2)> {
    let grid_entity = world.get::<TransformNode>(entity)?.grid_id?;
    if grid_entity == entity {
        return None;
    }
    let grid = world.get::<MapGrid>(grid_entity)?;
    let cell = resolve_cell(world, grid_entity, grid, entity, offset)?;
    Some((grid_entity, cell))
}

/// Register a freshly started tracker in its starting cell.
pub fn snapgrid_startup(world: &mut World, entity: Entity) {
    let Some(offset) = world.get::<SnapGrid>(entity).map(|t| t.offset) else {
        return;
    };
    let Some((grid_entity, cell)) = desired_cell(world, entity, offset) else {
        return;
    };
    if let Some(mut grid) = world.get_mut::<MapGrid>(grid_entity) {
        grid.index.add(offset, cell, entity);
    }
    if let Some(mut tracker) = world.get_mut::<SnapGrid>(entity) {
        tracker.position = Some((grid_entity, cell));
    }
}

/// Re-resolve the tracker's cell now, outside the per-tick system.
///
/// Returns true when the registration changed.
pub fn snapgrid_refresh(world: &mut World, entity: Entity) -> bool {
    let Some((offset, previous)) = world.get::<SnapGrid>(entity).map(|t| (t.offset, t.position)) else {
        return false;
    };
    let desired = desired_cell(world, entity, offset);
    if desired == previous {
        return false;
    }
    if let Some((old_grid, old_cell)) = previous
        && let Some(mut grid) = world.get_mut::<MapGrid>(old_grid)
    {
        grid.index.remove(offset, old_cell, entity);
    }
    if let Some((new_grid, new_cell)) = desired
        && let Some(mut grid) = world.get_mut::<MapGrid>(new_grid)
    {
        grid.index.add(offset, new_cell, entity);
    }
    if let Some(mut tracker) = world.get_mut::<SnapGrid>(entity) {
        tracker.position = desired;
    }
    if let Some((grid, new_cell)) = desired {
        raise(
            world,
            SnapGridPositionChangedEvent {
                entity,
                grid,
                old_cell: previous.map(|(_, cell)| cell),
                new_cell,
            },
        );
    }
    true
}

/// Remove the tracker's registration. A grid that is already gone is logged.
pub fn snapgrid_shutdown(world: &mut World, entity: Entity) {
    let Some((offset, previous)) = world.get::<SnapGrid>(entity).map(|t| (t.offset, t.position)) else {
        return;
    };
    let Some((grid_entity, cell)) = previous else {
        return;
    };
    match world.get_mut::<MapGrid>(grid_entity) {
        Some(mut grid) => {
            grid.index.remove(offset, cell, entity);
        }
        None => warn!("snap-grid shutdown of {entity:?}: grid {grid_entity:?} no longer exists"),
    }
    if let Some(mut tracker) = world.get_mut::<SnapGrid>(entity) {
        tracker.position = None;
    }
}

/// Move trackers between cells in response to this tick's moves.
pub fn update_snapgrid_positions(
    mut moves: MessageReader<MoveEvent>,
    nodes: Query<&TransformNode>,
    mut trackers: Query<&mut SnapGrid>,
    mut grids: Query<&mut MapGrid>,
    mut changed: MessageWriter<SnapGridPositionChangedEvent>,
) {
    for event in moves.read() {
        let entity = event.entity;
        let Ok(mut tracker) = trackers.get_mut(entity) else {
            continue;
        };
        let offset = tracker.offset;
        let previous = tracker.position;

        let desired = nodes
            .get(entity)
            .ok()
            .and_then(|node| node.grid_id)
            .filter(|grid| *grid != entity)
            .and_then(|grid_entity| {
                let grid = grids.get(grid_entity).ok()?;
                resolve_cell(&nodes, grid_entity, grid, entity, offset)
                    .map(|cell| (grid_entity, cell))
            });
        if desired == previous {
            continue;
        }

        if let Some((old_grid, old_cell)) = previous
            && let Ok(mut grid) = grids.get_mut(old_grid)
        {
            grid.index.remove(offset, old_cell, entity);
        }
        if let Some((new_grid, new_cell)) = desired
            && let Ok(mut grid) = grids.get_mut(new_grid)
        {
            grid.index.add(offset, new_cell, entity);
        }
        tracker.position = desired;

        if let Some((grid, new_cell)) = desired {
            changed.write(SnapGridPositionChangedEvent {
                entity,
                grid,
                old_cell: previous.map(|(_, cell)| cell),
                new_cell,
            });
        }
    }
}

/// Occupants of `cell` in one lane of `grid`.
pub fn get_cell_occupants(
    world: &World,
    grid: Entity,
    offset: SnapGridOffset,
    cell: IVec2,
) -> Vec<Entity> {
    world
        .get::<MapGrid>(grid)
        .map(|grid| grid.index.cell(offset, cell).collect())
        .unwrap_or_default()
}

/// Occupants of the neighbouring cell of `entity` in `dir`, same lane.
pub fn get_in_dir(world: &World, entity: Entity, dir: Direction) -> Vec<Entity> {
    let Some(tracker) = world.get::<SnapGrid>(entity) else {
        return Vec::new();
    };
    let Some((grid, cell)) = tracker.position else {
        return Vec::new();
    };
    get_cell_occupants(world, grid, tracker.offset, cell + dir.offset())
}

/// Non-empty neighbouring cells of `entity`, in [`Direction::ALL`] order.
pub fn neighbours(world: &World, entity: Entity) -> ArrayVec<(Direction, Vec<Entity>), 8> {
    Direction::ALL
        .into_iter()
        .map(|dir| (dir, get_in_dir(world, entity, dir)))
        .filter(|(_, occupants)| !occupants.is_empty())
        .collect()
}
