//! Network state reconciliation.
//!
//! The server captures a [`TransformState`] per networked entity; clients
//! apply them with [`apply_state`]. Application only writes values that
//! actually differ, so an unchanged snapshot produces no notifications. Moves
//! caused by applying a snapshot are held in the [`NetStateQueue`] and written
//! by [`flush_state_moves`] with `from_state_handling` set.
//!
//! An optional second snapshot sets the render-side interpolation target. It
//! never touches authoritative state.

use bevy_ecs::prelude::*;
use log::{debug, error, warn};

use crate::components::netentity::NetEntity;
use crate::components::snapgrid::{SnapGrid, SnapGridOffset};
use crate::components::transformnode::{TransformLifeStage, TransformNode};
use crate::components::transformstate::{EntitySnapshot, TransformState, WorldSnapshot};
use crate::error::{TransformError, report_violation, strict_invariants};
use crate::events::raise;
use crate::events::transform::{AnchorStateChangedEvent, StartLerpNotification};
use crate::maths::vec_approx_eq;
use crate::resources::netentitymap::NetEntityMap;
use crate::resources::netstatequeue::NetStateQueue;
use crate::systems::anchoring::release_anchor;
use crate::systems::hierarchy::{attach_parent, detach_to_null};
use crate::systems::lifecycle::spawn_entity_with;
use crate::systems::snapgrid::snapgrid_refresh;
use crate::systems::transform::{set_local_position, set_local_rotation, set_no_local_rotation};

/// Snapshot of `entity` for the wire.
///
/// Fails with a protocol error when the parent has no network identity.
pub fn get_state(world: &World, entity: Entity) -> Result<TransformState, TransformError> {
    let node = world
        .get::<TransformNode>(entity)
        .ok_or(TransformError::MissingTransform(entity))?;
    let parent_id = match node.parent {
        Some(parent) => match world.get::<NetEntity>(parent) {
            Some(net_id) => Some(*net_id),
            None => {
                let err = TransformError::ClientLocalParent { entity, parent };
                error!("{err}");
                return Err(err);
            }
        },
        None => None,
    };
    Ok(TransformState {
        parent_id,
        local_position: node.local_position,
        local_rotation: node.local_rotation,
        no_local_rotation: node.no_local_rotation,
        anchored: node.anchored,
    })
}

fn resolve_net_parent(
    world: &World,
    entity: Entity,
    parent_id: Option<NetEntity>,
) -> Result<Option<Entity>, TransformError> {
    let Some(net_id) = parent_id else {
        return Ok(None);
    };
    world
        .get_resource::<NetEntityMap>()
        .and_then(|nets| nets.get(net_id))
        .map(Some)
        .ok_or(TransformError::UnknownNetEntity {
            entity,
            net_id: net_id.0,
        })
}

/// Apply an authoritative snapshot and, optionally, the next one as the
/// interpolation target.
pub fn apply_state(
    world: &mut World,
    entity: Entity,
    current: &TransformState,
    next: Option<&TransformState>,
) -> Result<(), TransformError> {
    if world.get::<TransformNode>(entity).is_none() {
        warn!("state for {entity:?} ignored: no transform node");
        return Err(TransformError::MissingTransform(entity));
    }

    world
        .get_resource_or_insert_with(NetStateQueue::default)
        .applying = true;
    let applied = apply_current(world, entity, current);
    if let Some(mut queue) = world.get_resource_mut::<NetStateQueue>() {
        queue.applying = false;
    }
    applied?;

    check_networked_parent(world, entity)?;
    apply_next_state(world, entity, next);
    Ok(())
}

fn apply_current(
    world: &mut World,
    entity: Entity,
    state: &TransformState,
) -> Result<(), TransformError> {
    let new_parent = match resolve_net_parent(world, entity, state.parent_id) {
        Ok(parent) => parent,
        Err(err) => return Err(report_violation(world, entity, err)),
    };

    let (parent, anchored, no_local_rotation) = {
        let node = world
            .get::<TransformNode>(entity)
            .ok_or(TransformError::MissingTransform(entity))?;
        (node.parent, node.anchored, node.no_local_rotation)
    };

    if anchored && !state.anchored {
        release_anchor(world, entity, false);
    }
    if new_parent != parent {
        match new_parent {
            Some(new_parent) => attach_parent(world, entity, new_parent)?,
            None => detach_to_null(world, entity)?,
        }
    }

    if no_local_rotation && !state.no_local_rotation {
        set_no_local_rotation(world, entity, false)?;
    }
    set_local_rotation(world, entity, state.local_rotation)?;
    set_position_unlocked(world, entity, state)?;

    let anchored_now = world
        .get::<TransformNode>(entity)
        .is_some_and(|node| node.anchored);
    if state.anchored && !anchored_now {
        apply_anchor_flag(world, entity);
    }
    if state.no_local_rotation {
        set_no_local_rotation(world, entity, true)?;
    }
    Ok(())
}

// Anchored nodes ignore position writes; the server's value wins regardless.
fn set_position_unlocked(
    world: &mut World,
    entity: Entity,
    state: &TransformState,
) -> Result<(), TransformError> {
    let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
        return Err(TransformError::MissingTransform(entity));
    };
    if vec_approx_eq(node.local_position, state.local_position) {
        return Ok(());
    }
    let was_anchored = std::mem::replace(&mut node.anchored, false);
    let result = set_local_position(world, entity, state.local_position);
    if let Some(mut node) = world.get_mut::<TransformNode>(entity) {
        node.anchored = was_anchored;
    }
    result
}

// The server already anchored the entity; mirror the flag and the cell.
fn apply_anchor_flag(world: &mut World, entity: Entity) {
    if world.get::<SnapGrid>(entity).is_none() {
        world.entity_mut(entity).insert(SnapGrid {
            offset: SnapGridOffset::Center,
            position: None,
            anchor_owned: true,
        });
    }
    let running = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
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
}

// A networked entity must never end up under a client-local one.
fn check_networked_parent(world: &mut World, entity: Entity) -> Result<(), TransformError> {
    let Some(parent) = world.get::<TransformNode>(entity).and_then(|n| n.parent) else {
        return Ok(());
    };
    if world.get::<NetEntity>(entity).is_none() || world.get::<NetEntity>(parent).is_some() {
        return Ok(());
    }
    let err = TransformError::ClientLocalParent { entity, parent };
    if strict_invariants(world) {
        panic!("network protocol violated: {err}");
    }
    error!("{err}; detaching to null-space");
    detach_to_null(world, entity)?;
    Err(err)
}

/// Set or clear the interpolation target without touching authoritative state.
pub fn apply_next_state(world: &mut World, entity: Entity, next: Option<&TransformState>) {
    let lerp_parent = match next {
        Some(next) => match resolve_net_parent(world, entity, next.parent_id) {
            Ok(parent) => Some(parent),
            Err(err) => {
                debug!("no lerp for {entity:?}: {err}");
                None
            }
        },
        None => None,
    };

    let started = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        node.lerp_source = (node.local_position, node.local_rotation);
        match (next, lerp_parent) {
            (Some(next), Some(parent))
                if !vec_approx_eq(next.local_position, node.local_position)
                    || !next.local_rotation.equals_approx(node.local_rotation) =>
            {
                let target = (next.local_position, next.local_rotation);
                node.lerp_target = Some(target);
                node.lerp_parent = parent;
                node.is_running().then_some((node.lerp_source, target))
            }
            _ => {
                node.lerp_target = None;
                node.lerp_parent = None;
                None
            }
        }
    };
    if let Some((source, target)) = started {
        raise(
            world,
            StartLerpNotification {
                entity,
                source,
                target,
            },
        );
    }
}

/// Write the moves held back while snapshots were applied.
pub fn flush_state_moves(world: &mut World) {
    let moves = match world.get_resource_mut::<NetStateQueue>() {
        Some(mut queue) => std::mem::take(&mut queue.moves),
        None => return,
    };
    for event in moves {
        raise(world, event);
    }
}

fn depth(world: &World, entity: Entity) -> usize {
    let mut depth = 0;
    let mut current = world.get::<TransformNode>(entity).and_then(|n| n.parent);
    while let Some(parent) = current {
        depth += 1;
        current = world.get::<TransformNode>(parent).and_then(|n| n.parent);
    }
    depth
}

/// Snapshot of every running networked entity, parents before children.
pub fn capture_snapshot(world: &mut World, tick: u64) -> WorldSnapshot {
    let mut query = world.query::<(Entity, &NetEntity, &TransformNode)>();
    let mut networked: Vec<(usize, NetEntity, Entity)> = query
        .iter(world)
        .filter(|(_, _, node)| node.life_stage() == TransformLifeStage::Running)
        .map(|(entity, net_id, _)| (0, *net_id, entity))
        .collect();
    for entry in networked.iter_mut() {
        entry.0 = depth(world, entry.2);
    }
    networked.sort();

    let entities = networked
        .into_iter()
        .filter_map(|(_, net_id, entity)| {
            get_state(world, entity)
                .ok()
                .map(|state| EntitySnapshot { net_id, state })
        })
        .collect();
    WorldSnapshot { tick, entities }
}

/// Apply a whole snapshot, spawning networked entities seen for the first time.
///
/// Returns the number of entities whose state failed to apply.
pub fn apply_snapshot(world: &mut World, current: &WorldSnapshot, next: Option<&WorldSnapshot>) -> usize {
    let mut failures = 0;
    for snapshot in &current.entities {
        let known = world
            .get_resource::<NetEntityMap>()
            .and_then(|nets| nets.get(snapshot.net_id));
        let entity = match known {
            Some(entity) => entity,
            None => match spawn_entity_with(world, TransformNode::new(None), snapshot.net_id) {
                Ok(entity) => entity,
                Err(err) => {
                    warn!("could not spawn {:?}: {err}", snapshot.net_id);
                    failures += 1;
                    continue;
                }
            },
        };
        let next_state = next.and_then(|next| next.find(snapshot.net_id));
        if let Err(err) = apply_state(world, entity, &snapshot.state, next_state) {
            warn!("state for {:?} not applied: {err}", snapshot.net_id);
            failures += 1;
        }
    }
    failures
}

/// Give an already running entity a network identity.
pub fn register_net_entity(world: &mut World, entity: Entity, net_id: NetEntity) {
    world.entity_mut(entity).insert(net_id);
    world
        .get_resource_or_insert_with(NetEntityMap::default)
        .insert(net_id, entity);
}
