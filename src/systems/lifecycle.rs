//! Spawning, initialization and teardown of spatial entities.
//!
//! A node moves through `Uninitialized → Initializing → Running →
//! ShuttingDown → Removed`. Writes are accepted at every stage, but
//! notifications only fire while `Running`.
//!
//! Children of a removed node are re-parented to the removed node's parent,
//! keeping their world placement. Children of a root are detached to
//! null-space.

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, info, warn};

use crate::components::mapcomponent::MapComponent;
use crate::components::mapgrid::MapGrid;
use crate::components::netentity::NetEntity;
use crate::components::snapgrid::SnapGrid;
use crate::components::transformnode::{EntityCoordinates, TransformLifeStage, TransformNode};
use crate::error::{TransformError, report_violation};
use crate::events::raise;
use crate::events::render::RenderCmd;
use crate::events::transform::ParentChangedEvent;
use crate::resources::mapmanager::{MapId, MapManager};
use crate::resources::netentitymap::NetEntityMap;
use crate::resources::pendingdeletions::PendingDeletions;
use crate::resources::renderbridge::RenderBridge;
use crate::resources::spatialconfig::SpatialConfig;
use crate::systems::anchoring::{anchor_entity, release_anchor};
use crate::systems::hierarchy::{detach_to_null, find_grid_id, find_map_id, reparent_children};
use crate::systems::snapgrid::{snapgrid_shutdown, snapgrid_startup};

/// Spawn a map owner and its root node.
pub fn spawn_map(world: &mut World) -> Result<Entity, TransformError> {
    let map_id = world
        .get_resource_or_insert_with(MapManager::default)
        .allocate_map_id();
    let entity = world
        .spawn((MapComponent { map_id }, TransformNode::new(None)))
        .id();
    initialize_transform(world, entity)?;
    info!("spawned {map_id} as {entity:?}");
    Ok(entity)
}

/// Spawn a grid on `map_id` at `position` (map-local).
pub fn spawn_grid(
    world: &mut World,
    map_id: MapId,
    position: Vec2,
    grid: MapGrid,
) -> Result<Entity, TransformError> {
    let map_entity = match world.get_resource::<MapManager>() {
        Some(maps) => maps.get_map_entity_or_err(map_id)?,
        None => return Err(TransformError::MissingMap(map_id)),
    };
    let node = TransformNode::new(Some(map_entity)).with_position(position);
    spawn_entity_with(world, node, grid)
}

/// Grid with the configured default tile size.
pub fn default_grid(world: &World) -> MapGrid {
    let tile_size = world
        .get_resource::<SpatialConfig>()
        .map(|config| config.default_tile_size)
        .unwrap_or(1);
    MapGrid::new(tile_size)
}

/// Spawn a plain placed entity at `coords`.
pub fn spawn_entity(world: &mut World, coords: EntityCoordinates) -> Result<Entity, TransformError> {
    let node = TransformNode::new(coords.parent).with_position(coords.position);
    spawn_entity_with(world, node, ())
}

/// Spawn `node` together with `bundle` and initialize it.
pub fn spawn_entity_with<B: Bundle>(
    world: &mut World,
    node: TransformNode,
    bundle: B,
) -> Result<Entity, TransformError> {
    let entity = world.spawn((node, bundle)).id();
    initialize_transform(world, entity)?;
    Ok(entity)
}

/// Bring an `Uninitialized` node to `Running`.
///
/// Validates and links the parent, resolves map and grid membership, builds
/// the matrices, registers map/grid ownership, applies a requested anchor and
/// starts the snap-grid tracker.
pub fn initialize_transform(world: &mut World, entity: Entity) -> Result<(), TransformError> {
    let (parent, wants_anchor) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(TransformError::MissingTransform(entity));
        };
        if node.life_stage != TransformLifeStage::Uninitialized {
            return Ok(());
        }
        node.life_stage = TransformLifeStage::Initializing;
        let wants_anchor = node.anchored;
        node.anchored = false;
        (node.parent, wants_anchor)
    };

    if let Some(parent) = parent
        && let Err(err) = validate_parent(world, entity, parent)
    {
        if let Some(mut node) = world.get_mut::<TransformNode>(entity) {
            node.parent = None;
        }
        return Err(report_violation(world, entity, err));
    }
    if let Some(parent) = parent
        && let Some(mut parent_node) = world.get_mut::<TransformNode>(parent)
    {
        parent_node.children.insert(entity);
    }

    let map_id = find_map_id(world, entity);
    if let Some(mut node) = world.get_mut::<TransformNode>(entity) {
        node.map_id = map_id;
    }
    let grid_id = find_grid_id(world, entity);
    {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(TransformError::MissingTransform(entity));
        };
        node.grid_id = grid_id;
        node.deferred = None;
        node.rebuild();
        node.lerp_source = (node.local_position, node.local_rotation);
    }

    register_ownership(world, entity, map_id);

    if let Some(mut node) = world.get_mut::<TransformNode>(entity) {
        node.life_stage = TransformLifeStage::Running;
    }
    debug!("{entity:?} running on {map_id}, grid {grid_id:?}");

    if let Some(parent) = parent {
        raise(
            world,
            ParentChangedEvent {
                entity,
                old_parent: None,
                new_parent: Some(parent),
                old_map_id: MapId::NULLSPACE,
            },
        );
    }

    if wants_anchor && let Err(err) = anchor_entity(world, entity) {
        warn!("{entity:?} requested anchoring at spawn but could not anchor: {err}");
    }
    if world
        .get::<SnapGrid>(entity)
        .is_some_and(|tracker| !tracker.is_registered())
    {
        snapgrid_startup(world, entity);
    }
    Ok(())
}

fn validate_parent(world: &World, entity: Entity, parent: Entity) -> Result<(), TransformError> {
    if parent == entity {
        return Err(TransformError::SelfParent(entity));
    }
    let Some(parent_node) = world.get::<TransformNode>(parent) else {
        return Err(TransformError::UnknownParent { entity, parent });
    };
    if parent_node.life_stage >= TransformLifeStage::ShuttingDown {
        return Err(TransformError::TerminatingParent { entity, parent });
    }
    Ok(())
}

fn register_ownership(world: &mut World, entity: Entity, map_id: MapId) {
    let owns_map = world.get::<MapComponent>(entity).map(|map| map.map_id);
    let owns_grid = world.get::<MapGrid>(entity).is_some();
    let net_id = world.get::<NetEntity>(entity).copied();
    {
        let mut maps = world.get_resource_or_insert_with(MapManager::default);
        if let Some(own_map) = owns_map {
            maps.register_map(own_map, entity);
        }
        if owns_grid {
            maps.register_grid(map_id, entity);
        }
    }
    if let Some(net_id) = net_id {
        world
            .get_resource_or_insert_with(NetEntityMap::default)
            .insert(net_id, entity);
    }
}

fn unregister_ownership(world: &mut World, entity: Entity) {
    let map_id = world
        .get::<TransformNode>(entity)
        .map(|node| node.map_id)
        .unwrap_or_default();
    let owns_map = world.get::<MapComponent>(entity).map(|map| map.map_id);
    let owns_grid = world.get::<MapGrid>(entity).is_some();
    let net_id = world.get::<NetEntity>(entity).copied();
    if let Some(mut maps) = world.get_resource_mut::<MapManager>() {
        if owns_grid {
            maps.unregister_grid(map_id, entity);
        }
        if let Some(own_map) = owns_map {
            maps.unregister_map(own_map);
        }
    }
    if let Some(net_id) = net_id
        && let Some(mut nets) = world.get_resource_mut::<NetEntityMap>()
    {
        nets.remove(net_id);
    }
}

/// Take a node out of the hierarchy ahead of removal.
///
/// Unregisters from the snap-grid, releases the anchor, drops map/grid
/// ownership, hands the children to the parent (or null-space) and detaches.
pub fn shutdown_transform(world: &mut World, entity: Entity) {
    let grandparent = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        if node.life_stage >= TransformLifeStage::ShuttingDown {
            return;
        }
        node.life_stage = TransformLifeStage::ShuttingDown;
        node.parent
    };

    snapgrid_shutdown(world, entity);
    release_anchor(world, entity, true);

    // Orphans must not resolve back onto a dying grid.
    unregister_ownership(world, entity);
    if let Err(err) = reparent_children(world, entity, grandparent) {
        warn!("orphans of {entity:?} could not all be re-parented: {err}");
    }

    if let Err(err) = detach_to_null(world, entity) {
        warn!("detaching {entity:?} during shutdown failed: {err}");
    }

    if let Some(mut node) = world.get_mut::<TransformNode>(entity) {
        node.life_stage = TransformLifeStage::Removed;
    }
}

/// Shut the node down and despawn the entity.
pub fn despawn_spatial(world: &mut World, entity: Entity) {
    shutdown_transform(world, entity);
    if let Some(bridge) = world.get_resource::<RenderBridge>() {
        let _ = bridge.tx_cmd.send(RenderCmd::Forget { entity });
    }
    if world.get_entity(entity).is_ok() {
        world.despawn(entity);
    }
}

/// Despawn everything queued for deletion by tolerated violations.
pub fn process_pending_deletions(world: &mut World) {
    let Some(queued) = world
        .get_resource_mut::<PendingDeletions>()
        .map(|mut pending| pending.drain())
    else {
        return;
    };
    for entity in queued {
        if world.get_entity(entity).is_err() {
            continue;
        }
        info!("deleting {entity:?} after an invariant violation");
        despawn_spatial(world, entity);
    }
}
