//! Transform change notifications.
//!
//! All messages carry the entity they describe. Positions are reported as
//! [`EntityCoordinates`] so a reader can tell a plain move from a move that
//! also changed the parent frame.

use bevy_ecs::message::Message;
use bevy_ecs::prelude::Entity;
use glam::Vec2;

use crate::components::transformnode::EntityCoordinates;
use crate::maths::{Angle, Box2};
use crate::resources::mapmanager::MapId;

/// The entity's local coordinates changed.
///
/// `hint_aabb` is filled by deferred flushes issued from a physics step and
/// lets the broadphase skip recomputing bounds. `from_state_handling` marks
/// moves replayed after a network snapshot was applied.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MoveEvent {
    pub entity: Entity,
    pub old_position: EntityCoordinates,
    pub new_position: EntityCoordinates,
    pub hint_aabb: Option<Box2>,
    pub from_state_handling: bool,
}

impl MoveEvent {
    pub fn parent_changed(&self) -> bool {
        self.old_position.parent != self.new_position.parent
    }
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct RotateEvent {
    pub entity: Entity,
    pub old_rotation: Angle,
    pub new_rotation: Angle,
    pub hint_aabb: Option<Box2>,
}

/// The entity was attached to a new parent or detached to null-space.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChangedEvent {
    pub entity: Entity,
    pub old_parent: Option<Entity>,
    pub new_parent: Option<Entity>,
    pub old_map_id: MapId,
}

/// `detaching` is set when the anchor is released because the entity is
/// leaving its parent.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorStateChangedEvent {
    pub entity: Entity,
    pub anchored: bool,
    pub detaching: bool,
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapIdChangedEvent {
    pub entity: Entity,
    pub old_map_id: MapId,
    pub new_map_id: MapId,
}

/// A render-side interpolation target was set for the entity.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct StartLerpNotification {
    pub entity: Entity,
    pub source: (Vec2, Angle),
    pub target: (Vec2, Angle),
}
