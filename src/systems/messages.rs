//! Per-tick advancement of the spatial message queues.
//!
//! Bevy ECS' [`Messages`] API requires calling `update()` once per tick so
//! readers see this tick's messages and older ones are dropped. Run
//! [`update_spatial_messages`] last in the tick schedule.

use bevy_ecs::prelude::{Messages, ResMut};

use crate::events::render::RenderMessage;
use crate::events::snapgrid::SnapGridPositionChangedEvent;
use crate::events::transform::{
    AnchorStateChangedEvent, MapIdChangedEvent, MoveEvent, ParentChangedEvent, RotateEvent,
    StartLerpNotification,
};

/// Advance every transform and snap-grid message queue.
#[allow(clippy::too_many_arguments)]
pub fn update_spatial_messages(
    mut moves: ResMut<Messages<MoveEvent>>,
    mut rotations: ResMut<Messages<RotateEvent>>,
    mut parents: ResMut<Messages<ParentChangedEvent>>,
    mut anchors: ResMut<Messages<AnchorStateChangedEvent>>,
    mut maps: ResMut<Messages<MapIdChangedEvent>>,
    mut lerps: ResMut<Messages<StartLerpNotification>>,
    mut cells: ResMut<Messages<SnapGridPositionChangedEvent>>,
) {
    moves.update();
    rotations.update();
    parents.update();
    anchors.update();
    maps.update();
    lerps.update();
    cells.update();
}

/// Advance the render report queue.
pub fn update_render_messages(mut reports: ResMut<Messages<RenderMessage>>) {
    reports.update();
}
