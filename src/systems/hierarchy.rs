//! Reparenting and derived membership.
//!
//! Every structural change keeps three things true:
//! - `child ∈ parent.children` exactly when `child.parent == Some(parent)`
//! - no node is its own ancestor (checked by an ancestor walk at attach time)
//! - cached `map_id` and `grid_id` match what a fresh walk would compute
//!
//! Reparenting preserves the world position and rotation of the moved node.

use bevy_ecs::prelude::*;
use log::{debug, warn};
use smallvec::SmallVec;

use crate::components::mapcomponent::MapComponent;
use crate::components::mapgrid::MapGrid;
use crate::components::transformnode::{TransformLifeStage, TransformNode};
use crate::error::{TransformError, report_violation};
use crate::events::raise;
use crate::events::transform::{MapIdChangedEvent, ParentChangedEvent};
use crate::maths::Angle;
use crate::resources::mapmanager::{MapId, MapManager, try_find_grid_at};
use crate::systems::anchoring::release_anchor;
use crate::systems::transform::{
    announce_structural_move, world_position, world_position_rotation,
    world_position_rotation_inv_matrix,
};

type WalkStack = SmallVec<[Entity; 16]>;

/// True if `ancestor` appears on the parent chain of `entity`.
pub fn contains_entity(world: &World, ancestor: Entity, entity: Entity) -> bool {
    let mut current = world.get::<TransformNode>(entity).and_then(|n| n.parent);
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        current = world.get::<TransformNode>(parent).and_then(|n| n.parent);
    }
    false
}

/// Grid an entity belongs to, resolved from scratch.
///
/// 1. the entity's own grid if it owns one
/// 2. none for map owners
/// 3. the parent's grid id when the parent is not a map
/// 4. otherwise the grid with a tile under the entity's world position
pub fn find_grid_id(world: &World, entity: Entity) -> Option<Entity> {
    if world.get::<MapGrid>(entity).is_some() {
        return Some(entity);
    }
    if world.get::<MapComponent>(entity).is_some() {
        return None;
    }
    let node = world.get::<TransformNode>(entity)?;
    if let Some(parent) = node.parent
        && world.get::<MapComponent>(parent).is_none()
    {
        if world.get::<MapGrid>(parent).is_some() {
            return Some(parent);
        }
        return world.get::<TransformNode>(parent).and_then(|p| p.grid_id);
    }
    let position = world_position(world, entity).ok()?;
    try_find_grid_at(world, node.map_id, position).filter(|grid| *grid != entity)
}

/// Map an entity belongs to: the map owned by its ultimate ancestor.
pub fn find_map_id(world: &World, entity: Entity) -> MapId {
    let mut current = entity;
    loop {
        if let Some(map) = world.get::<MapComponent>(current) {
            return map.map_id;
        }
        match world.get::<TransformNode>(current).and_then(|n| n.parent) {
            Some(parent) => current = parent,
            None => return MapId::NULLSPACE,
        }
    }
}

/// Set `grid_id` on `entity` and its subtree.
///
/// Descendants that own a grid keep pointing at themselves, and so does
/// everything below them.
pub fn set_grid_id(world: &mut World, entity: Entity, grid_id: Option<Entity>) {
    let mut stack: WalkStack = SmallVec::new();
    stack.push(entity);
    while let Some(current) = stack.pop() {
        let children: WalkStack = {
            let Some(mut node) = world.get_mut::<TransformNode>(current) else {
                continue;
            };
            if node.grid_id == grid_id {
                continue;
            }
            node.grid_id = grid_id;
            node.children.iter().copied().collect()
        };
        stack.extend(
            children
                .into_iter()
                .filter(|child| world.get::<MapGrid>(*child).is_none()),
        );
    }
}

/// Move `entity` and its subtree to `map_id`, one [`MapIdChangedEvent`] per
/// node whose map actually changed.
///
/// Grids in the subtree are re-indexed under the new map (null-space only
/// drops them), and map children on both sides re-derive their grid.
pub fn change_map_id(world: &mut World, entity: Entity, map_id: MapId) {
    let mut stack: WalkStack = SmallVec::new();
    let mut moved_grids: SmallVec<[(Entity, MapId); 2]> = SmallVec::new();
    stack.push(entity);
    while let Some(current) = stack.pop() {
        let changed = {
            let Some(mut node) = world.get_mut::<TransformNode>(current) else {
                continue;
            };
            stack.extend(node.children.iter().copied());
            let old = node.map_id;
            if old == map_id {
                None
            } else {
                node.map_id = map_id;
                Some((old, node.is_running()))
            }
        };
        let Some((old_map_id, running)) = changed else {
            continue;
        };
        if world.get::<MapGrid>(current).is_some() {
            moved_grids.push((current, old_map_id));
        }
        if running {
            raise(
                world,
                MapIdChangedEvent {
                    entity: current,
                    old_map_id,
                    new_map_id: map_id,
                },
            );
        }
    }

    if moved_grids.is_empty() {
        return;
    }
    let mut touched: SmallVec<[MapId; 4]> = SmallVec::new();
    if let Some(mut maps) = world.get_resource_mut::<MapManager>() {
        for &(grid, old_map_id) in &moved_grids {
            maps.unregister_grid(old_map_id, grid);
            maps.register_grid(map_id, grid);
            debug!("{grid:?} re-indexed from {old_map_id} to {map_id}");
            touched.push(old_map_id);
        }
    }
    touched.push(map_id);
    touched.sort();
    touched.dedup();
    for map in touched {
        refresh_map_children(world, map);
    }
}

/// Re-derive the grid of every node parented straight to the map `map_id`.
fn refresh_map_children(world: &mut World, map_id: MapId) {
    let Some(map_entity) = world
        .get_resource::<MapManager>()
        .and_then(|maps| maps.get_map_entity(map_id))
    else {
        return;
    };
    let children: WalkStack = match world.get::<TransformNode>(map_entity) {
        Some(node) => node.children.iter().copied().collect(),
        None => return,
    };
    for child in children {
        rederive_map_child(world, child);
    }
}

/// Nodes parented straight to a map pick their grid by position, so a move can
/// change it. A moving grid re-derives the map children around it.
pub(crate) fn refresh_grid_after_move(world: &mut World, entity: Entity) {
    let Some(node) = world.get::<TransformNode>(entity) else {
        return;
    };
    if world.get::<MapGrid>(entity).is_some() {
        let map_id = node.map_id;
        refresh_map_children(world, map_id);
    } else {
        rederive_map_child(world, entity);
    }
}

fn rederive_map_child(world: &mut World, entity: Entity) {
    let Some(node) = world.get::<TransformNode>(entity) else {
        return;
    };
    let on_map = node
        .parent
        .is_some_and(|parent| world.get::<MapComponent>(parent).is_some());
    if !on_map {
        return;
    }
    let current = node.grid_id;
    let derived = find_grid_id(world, entity);
    if derived != current {
        debug!("{entity:?} moved from grid {current:?} to {derived:?}");
        set_grid_id(world, entity, derived);
    }
}

/// Attach `entity` to `new_parent`, keeping its world position and rotation.
///
/// Self-parenting, cycles and parents without a live transform are invariant
/// violations. Attaching to the current parent is a no-op. An anchored entity
/// is unanchored first, since anchoring ties it to its current grid parent.
pub fn attach_parent(
    world: &mut World,
    entity: Entity,
    new_parent: Entity,
) -> Result<(), TransformError> {
    let Some(node) = world.get::<TransformNode>(entity) else {
        warn!("attach_parent: {entity:?} has no transform node");
        return Err(TransformError::MissingTransform(entity));
    };
    if entity == new_parent {
        return Err(report_violation(world, entity, TransformError::SelfParent(entity)));
    }
    let Some(parent_node) = world.get::<TransformNode>(new_parent) else {
        let err = TransformError::UnknownParent {
            entity,
            parent: new_parent,
        };
        return Err(report_violation(world, entity, err));
    };
    if parent_node.life_stage >= TransformLifeStage::ShuttingDown {
        let err = TransformError::TerminatingParent {
            entity,
            parent: new_parent,
        };
        return Err(report_violation(world, entity, err));
    }
    if node.parent == Some(new_parent) {
        return Ok(());
    }
    if contains_entity(world, entity, new_parent) {
        let err = TransformError::CyclicParent {
            entity,
            parent: new_parent,
        };
        return Err(report_violation(world, entity, err));
    }

    let no_local_rotation = node.no_local_rotation;
    let anchored = node.anchored;
    let (world_pos, world_rot) = world_position_rotation(&*world, entity)?;
    let (_, parent_rot, _, parent_inv) = world_position_rotation_inv_matrix(&*world, new_parent)?;
    let parent_map = parent_node.map_id;

    if anchored {
        release_anchor(world, entity, false);
    }

    let (old_parent, old_coords, old_rotation, old_map_id, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(TransformError::MissingTransform(entity));
        };
        let old = (
            node.parent,
            node.coordinates(),
            node.local_rotation,
            node.map_id,
            node.is_running(),
        );
        node.parent = Some(new_parent);
        node.local_position = parent_inv.transform_point2(world_pos);
        node.local_rotation = if no_local_rotation {
            Angle::ZERO
        } else {
            (world_rot - parent_rot).reduced()
        };
        node.invalidate();
        old
    };
    if let Some(old_parent) = old_parent
        && let Some(mut old_parent_node) = world.get_mut::<TransformNode>(old_parent)
    {
        old_parent_node.children.remove(&entity);
    }
    if let Some(mut parent_node) = world.get_mut::<TransformNode>(new_parent) {
        parent_node.children.insert(entity);
    }

    if parent_map != old_map_id {
        change_map_id(world, entity, parent_map);
    }
    let grid_id = find_grid_id(world, entity);
    set_grid_id(world, entity, grid_id);

    if running {
        raise(
            world,
            ParentChangedEvent {
                entity,
                old_parent,
                new_parent: Some(new_parent),
                old_map_id,
            },
        );
    }
    announce_structural_move(world, entity, old_coords, old_rotation);
    Ok(())
}

/// Remove `entity` from its parent and place it in null-space.
///
/// Releases any anchor, clears interpolation, and resets map and grid
/// membership for the whole subtree.
pub fn detach_to_null(world: &mut World, entity: Entity) -> Result<(), TransformError> {
    let Some(node) = world.get::<TransformNode>(entity) else {
        warn!("detach_to_null: {entity:?} has no transform node");
        return Err(TransformError::MissingTransform(entity));
    };
    if node.parent.is_none() {
        return Ok(());
    }
    if node.anchored {
        release_anchor(world, entity, true);
    }

    let (old_parent, old_coords, old_rotation, old_map_id, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(TransformError::MissingTransform(entity));
        };
        let old = (
            node.parent,
            node.coordinates(),
            node.local_rotation,
            node.map_id,
            node.is_running(),
        );
        node.parent = None;
        node.lerp_target = None;
        node.lerp_parent = None;
        node.invalidate();
        old
    };
    if let Some(old_parent) = old_parent
        && let Some(mut parent_node) = world.get_mut::<TransformNode>(old_parent)
    {
        parent_node.children.remove(&entity);
    }

    change_map_id(world, entity, MapId::NULLSPACE);
    let grid_id = find_grid_id(world, entity);
    set_grid_id(world, entity, grid_id);

    if running {
        raise(
            world,
            ParentChangedEvent {
                entity,
                old_parent,
                new_parent: None,
                old_map_id,
            },
        );
    }
    announce_structural_move(world, entity, old_coords, old_rotation);
    Ok(())
}

/// Reparent `entity` to the grid under its world position, or else to its
/// map. Falls back to null-space when the map is gone.
pub fn attach_to_grid_or_map(world: &mut World, entity: Entity) -> Result<(), TransformError> {
    let Some(node) = world.get::<TransformNode>(entity) else {
        warn!("attach_to_grid_or_map: {entity:?} has no transform node");
        return Err(TransformError::MissingTransform(entity));
    };
    let map_id = node.map_id;
    let position = world_position(&*world, entity)?;

    let grid = try_find_grid_at(world, map_id, position)
        .filter(|grid| *grid != entity && !contains_entity(world, entity, *grid));
    if let Some(grid) = grid {
        return attach_parent(world, entity, grid);
    }

    let map_entity = world
        .get_resource::<MapManager>()
        .and_then(|maps| maps.get_map_entity(map_id))
        .filter(|map| *map != entity);
    match map_entity {
        Some(map) => attach_parent(world, entity, map),
        None => {
            warn!("{entity:?} has no grid or map under it on {map_id}; detaching to null-space");
            detach_to_null(world, entity)
        }
    }
}

/// Move every child of `entity` to `new_parent` (null-space when `None`),
/// preserving their world placement.
pub fn reparent_children(
    world: &mut World,
    entity: Entity,
    new_parent: Option<Entity>,
) -> Result<(), TransformError> {
    let children: WalkStack = match world.get::<TransformNode>(entity) {
        Some(node) => node.children.iter().copied().collect(),
        None => return Err(TransformError::MissingTransform(entity)),
    };
    for child in children {
        match new_parent {
            Some(parent) => attach_parent(world, child, parent)?,
            None => detach_to_null(world, child)?,
        }
    }
    Ok(())
}
