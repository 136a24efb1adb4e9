//! Deferred-update batching.
//!
//! A physics step opens a window with [`begin_deferred`] and writes freely.
//! Each node remembers the values it had before its first write in the window.
//! When the outermost [`DeferredScope`] drops, every staged node is flushed:
//! matrices are rebuilt once and at most one [`MoveEvent`] and one
//! [`RotateEvent`] are written per node, whatever the number of writes.
//!
//! The scope flushes from `Drop`, so early returns and `?` inside the window
//! still publish the staged changes.
//!
//! [`RotateEvent`]: crate::events::transform::RotateEvent

use std::ops::{Deref, DerefMut};

use bevy_ecs::prelude::*;
use log::debug;

use crate::components::transformnode::{EntityCoordinates, StagedChange, TransformNode};
use crate::events::transform::MoveEvent;
use crate::maths::{Angle, Box2};
use crate::resources::deferredmoves::DeferredMoves;
use crate::systems::hierarchy::refresh_grid_after_move;
use crate::systems::transform::{emit_move, emit_rotate};

/// Open deferred window. Derefs to the [`World`] it borrows.
pub struct DeferredScope<'w> {
    world: &'w mut World,
}

impl DeferredScope<'_> {
    /// Bounds handed to physics with the flushed events.
    pub fn with_hint(self, hint: Box2) -> Self {
        self.world
            .get_resource_or_insert_with(DeferredMoves::default)
            .hint = Some(hint);
        self
    }
}

impl Deref for DeferredScope<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        &*self.world
    }
}

impl DerefMut for DeferredScope<'_> {
    fn deref_mut(&mut self) -> &mut World {
        &mut *self.world
    }
}

impl Drop for DeferredScope<'_> {
    fn drop(&mut self) {
        end_deferred(self.world);
    }
}

/// Open a (possibly nested) deferred window.
pub fn begin_deferred(world: &mut World) -> DeferredScope<'_> {
    world
        .get_resource_or_insert_with(DeferredMoves::default)
        .depth += 1;
    DeferredScope { world }
}

/// Close one level of nesting; the outermost close flushes every staged node.
///
/// Called by [`DeferredScope`] on drop. Calling it without a matching
/// [`begin_deferred`] does nothing.
pub fn end_deferred(world: &mut World) {
    let (staged, hint) = {
        let Some(mut moves) = world.get_resource_mut::<DeferredMoves>() else {
            return;
        };
        if moves.depth == 0 {
            return;
        }
        moves.depth -= 1;
        if moves.depth > 0 {
            return;
        }
        (std::mem::take(&mut moves.staged), moves.hint.take())
    };
    if !staged.is_empty() {
        debug!("flushing {} deferred transform(s)", staged.len());
    }
    for entity in staged {
        flush_deferred(world, entity, hint);
    }
}

pub fn is_deferring(world: &World) -> bool {
    world
        .get_resource::<DeferredMoves>()
        .is_some_and(DeferredMoves::is_active)
}

/// Record pre-window values for `entity`; later writes never overwrite them.
pub(crate) fn stage(
    world: &mut World,
    entity: Entity,
    old_coords: Option<EntityCoordinates>,
    old_rotation: Option<Angle>,
) {
    let newly_staged = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        let newly_staged = node.deferred.is_none();
        let staged = node.deferred.get_or_insert_with(StagedChange::default);
        if staged.old_coords.is_none() {
            staged.old_coords = old_coords;
        }
        if staged.old_rotation.is_none() {
            staged.old_rotation = old_rotation;
        }
        newly_staged
    };
    if newly_staged {
        world
            .get_resource_or_insert_with(DeferredMoves::default)
            .staged
            .push(entity);
    }
}

/// Publish the staged change of one node.
///
/// No-op when nothing was staged or the values came back to where they
/// started.
pub fn flush_deferred(world: &mut World, entity: Entity, hint_aabb: Option<Box2>) {
    if let Some(mut moves) = world.get_resource_mut::<DeferredMoves>()
        && moves.depth > 0
    {
        moves.staged.retain(|staged| *staged != entity);
    }

    let (staged, new_coords, new_rotation, running) = {
        let Some(mut node) = world.get_mut::<TransformNode>(entity) else {
            return;
        };
        let Some(staged) = node.deferred.take() else {
            return;
        };
        node.rebuild();
        (
            staged,
            node.coordinates(),
            node.local_rotation,
            node.is_running(),
        )
    };
    if !running {
        return;
    }

    let mut moved = false;
    if let Some(old) = staged.old_coords
        && !old.equals_approx(&new_coords)
    {
        emit_move(
            world,
            MoveEvent {
                entity,
                old_position: old,
                new_position: new_coords,
                hint_aabb,
                from_state_handling: false,
            },
        );
        moved = true;
    }
    if let Some(old) = staged.old_rotation
        && !old.equals_approx(new_rotation)
    {
        emit_rotate(world, entity, old, new_rotation, hint_aabb);
    }
    if moved {
        refresh_grid_after_move(world, entity);
    }
}
