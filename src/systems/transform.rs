//! Local writes and world-space reads of transform nodes.
//!
//! World values are composed on demand by a single walk from the node to its
//! root. The walkers are generic over [`TransformLookup`] so they run both on a
//! `&World` and inside systems holding a `Query<&TransformNode>`.
//!
//! Local setters follow the same pattern:
//! - no-op when the new value is within epsilon of the current one
//! - inside a deferred window, stage the pre-window value and return
//! - otherwise rebuild the matrices and emit the change right away
//!
//! Notifications only fire for nodes in the `Running` stage.

use bevy_ecs::prelude::*;
use glam::{Mat3, Vec2};
use log::warn;

use crate::components::transformnode::{EntityCoordinates, TransformNode};
use crate::error::TransformError;
use crate::events::raise;
use crate::events::transform::{MoveEvent, RotateEvent};
use crate::maths::{Angle, Box2, translation_of, vec_approx_eq};
use crate::resources::netstatequeue::NetStateQueue;
use crate::systems::deferred::{is_deferring, stage};
use crate::systems::hierarchy::refresh_grid_after_move;

/// Read access to transform nodes by entity.
pub trait TransformLookup {
    fn node(&self, entity: Entity) -> Option<&TransformNode>;
}

impl TransformLookup for World {
    fn node(&self, entity: Entity) -> Option<&TransformNode> {
        self.get::<TransformNode>(entity)
    }
}

impl TransformLookup for Query<'_, '_, &TransformNode> {
    fn node(&self, entity: Entity) -> Option<&TransformNode> {
        self.get(entity).ok()
    }
}

// Rotation, world matrix and (optionally) inverse world matrix in one pass.
fn walk<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
    with_inverse: bool,
) -> Result<(Angle, Mat3, Mat3), TransformError> {
    let node = lookup
        .node(entity)
        .ok_or(TransformError::MissingTransform(entity))?;
    let mut rotation = node.local_rotation;
    let mut matrix = node.local_matrix();
    let mut inverse = if with_inverse {
        node.inv_local_matrix()
    } else {
        Mat3::IDENTITY
    };
    let mut current = node.parent;
    while let Some(parent) = current {
        let parent_node = lookup
            .node(parent)
            .ok_or(TransformError::MissingTransform(parent))?;
        matrix = parent_node.local_matrix() * matrix;
        if with_inverse {
            inverse *= parent_node.inv_local_matrix();
        }
        rotation += parent_node.local_rotation;
        current = parent_node.parent;
    }
    Ok((rotation, matrix, inverse))
}

/// World position, rotation and matrix from one walk.
pub fn world_position_rotation_matrix<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<(Vec2, Angle, Mat3), TransformError> {
    let (rotation, matrix, _) = walk(lookup, entity, false)?;
    Ok((translation_of(&matrix), rotation, matrix))
}

/// World position, rotation, matrix and inverse matrix from one walk.
pub fn world_position_rotation_inv_matrix<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<(Vec2, Angle, Mat3, Mat3), TransformError> {
    let (rotation, matrix, inverse) = walk(lookup, entity, true)?;
    Ok((translation_of(&matrix), rotation, matrix, inverse))
}

pub fn world_position_rotation<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<(Vec2, Angle), TransformError> {
    world_position_rotation_matrix(lookup, entity).map(|(position, rotation, _)| (position, rotation))
}

pub fn world_position<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<Vec2, TransformError> {
    world_position_rotation_matrix(lookup, entity).map(|(position, _, _)| position)
}

pub fn world_rotation<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<Angle, TransformError> {
    walk(lookup, entity, false).map(|(rotation, _, _)| rotation)
}

pub fn world_matrix<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<Mat3, TransformError> {
    walk(lookup, entity, false).map(|(_, matrix, _)| matrix)
}

pub fn inv_world_matrix<L: TransformLookup + ?Sized>(
    lookup: &L,
    entity: Entity,
) -> Result<Mat3, TransformError> {
    walk(lookup, entity, true).map(|(_, _, inverse)| inverse)
}

pub fn coordinates(world: &World, entity: Entity) -> Option<EntityCoordinates> {
    world.get::<TransformNode>(entity).map(TransformNode::coordinates)
}

fn missing(entity: Entity) -> TransformError {
    warn!("{entity:?} has no transform node; write ignored");
    TransformError::MissingTransform(entity)
}

/// Write a move notification, or hold it back while a snapshot is applied.
pub(crate) fn emit_move(world: &mut World, mut event: MoveEvent) {
    if let Some(mut queue) = world.get_resource_mut::<NetStateQueue>()
        && queue.applying
    {
        event.from_state_handling = true;
        queue.moves.push(event);
        return;
    }
    raise(world, event);
}

pub(crate) fn emit_rotate(
    world: &mut World,
    entity: Entity,
    old_rotation: Angle,
    new_rotation: Angle,
    hint_aabb: Option<Box2>,
) {
    raise(
        world,
        RotateEvent {
            entity,
            old_rotation,
            new_rotation,
            hint_aabb,
        },
    );
}

/// Set the position relative to the parent.
///
/// Ignored when anchored or when `position` is within epsilon of the current
/// value.
pub fn set_local_position(
    world: &mut World,
    entity: Entity,
    position: Vec2,
) -> Result<(), TransformError> {
    let deferring = is_deferring(world);
    let (old, new, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(missing(entity));
        };
        if node.anchored || vec_approx_eq(node.local_position, position) {
            return Ok(());
        }
        let old = node.coordinates();
        node.local_position = position;
        node.invalidate();
        if !deferring {
            node.rebuild();
        }
        (old, node.coordinates(), node.is_running())
    };

    if deferring {
        stage(world, entity, Some(old), None);
        return Ok(());
    }
    if running {
        emit_move(
            world,
            MoveEvent {
                entity,
                old_position: old,
                new_position: new,
                hint_aabb: None,
                from_state_handling: false,
            },
        );
        refresh_grid_after_move(world, entity);
    }
    Ok(())
}

/// Set the rotation relative to the parent.
///
/// Silently ignored while `no_local_rotation` is set.
pub fn set_local_rotation(
    world: &mut World,
    entity: Entity,
    rotation: Angle,
) -> Result<(), TransformError> {
    let deferring = is_deferring(world);
    let (old, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return Err(missing(entity));
        };
        if node.no_local_rotation || node.local_rotation.equals_approx(rotation) {
            return Ok(());
        }
        let old = node.local_rotation;
        node.local_rotation = rotation;
        node.invalidate();
        if !deferring {
            node.rebuild();
        }
        (old, node.is_running())
    };

    if deferring {
        stage(world, entity, None, Some(old));
    } else if running {
        emit_rotate(world, entity, old, rotation, None);
    }
    Ok(())
}

/// Enabling the flag resets the rotation to zero first.
pub fn set_no_local_rotation(
    world: &mut World,
    entity: Entity,
    no_local_rotation: bool,
) -> Result<(), TransformError> {
    if no_local_rotation {
        set_local_rotation(world, entity, Angle::ZERO)?;
    }
    let mut node = world
        .get_mut::<TransformNode>(entity)
        .ok_or_else(|| missing(entity))?;
    node.no_local_rotation = no_local_rotation;
    Ok(())
}

/// Place the entity at `position` in world space, keeping its parent.
pub fn set_world_position(
    world: &mut World,
    entity: Entity,
    position: Vec2,
) -> Result<(), TransformError> {
    let parent = world
        .get::<TransformNode>(entity)
        .ok_or_else(|| missing(entity))?
        .parent;
    let local = match parent {
        Some(parent) => inv_world_matrix(&*world, parent)?.transform_point2(position),
        None => position,
    };
    set_local_position(world, entity, local)
}

pub fn set_world_rotation(
    world: &mut World,
    entity: Entity,
    rotation: Angle,
) -> Result<(), TransformError> {
    let current = world_rotation(&*world, entity)?;
    let local = world
        .get::<TransformNode>(entity)
        .ok_or_else(|| missing(entity))?
        .local_rotation;
    set_local_rotation(world, entity, local + (rotation - current))
}

/// Rebuild and announce a structural change that was already written.
///
/// Values staged by an open deferred window predate the change, so they
/// become the reported old values and are consumed.
pub(crate) fn announce_structural_move(
    world: &mut World,
    entity: Entity,
    old_coords: EntityCoordinates,
    old_rotation: Angle,
) {
    let (old_coords, old_rotation, new_coords, new_rotation, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        let (old_coords, old_rotation) = match node.deferred.as_mut() {
            Some(staged) => (
                staged.old_coords.take().unwrap_or(old_coords),
                staged.old_rotation.take().unwrap_or(old_rotation),
            ),
            None => (old_coords, old_rotation),
        };
        node.rebuild();
        (
            old_coords,
            old_rotation,
            node.coordinates(),
            node.local_rotation,
            node.is_running(),
        )
    };
    if !running {
        return;
    }
    if !old_coords.equals_approx(&new_coords) {
        emit_move(
            world,
            MoveEvent {
                entity,
                old_position: old_coords,
                new_position: new_coords,
                hint_aabb: None,
                from_state_handling: false,
            },
        );
    }
    if !old_rotation.equals_approx(new_rotation) {
        emit_rotate(world, entity, old_rotation, new_rotation, None);
    }
}
