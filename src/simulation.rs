//! World setup and the per-tick schedule.
//!
//! [`setup_spatial`] inserts every resource and message queue the spatial core
//! uses. [`build_tick_schedule`] returns the systems that run once per tick,
//! after gameplay and physics have done their writes:
//!
//! 1. delete entities queued by tolerated violations
//! 2. write moves held back while snapshots were applied
//! 3. move snap-grid registrations for this tick's moves
//! 4. publish interpolation frames and collect render reports
//! 5. advance the clock and the message queues

use bevy_ecs::prelude::*;

use crate::components::snapgrid::SnapGrid;
use crate::components::transformnode::TransformNode;
use crate::events::render::RenderMessage;
use crate::events::snapgrid::SnapGridPositionChangedEvent;
use crate::events::transform::{
    AnchorStateChangedEvent, MapIdChangedEvent, MoveEvent, ParentChangedEvent, RotateEvent,
    StartLerpNotification,
};
use crate::resources::debugregistry::DebugRegistry;
use crate::resources::deferredmoves::DeferredMoves;
use crate::resources::mapmanager::MapManager;
use crate::resources::netentitymap::NetEntityMap;
use crate::resources::netstatequeue::NetStateQueue;
use crate::resources::pendingdeletions::PendingDeletions;
use crate::resources::spatialconfig::SpatialConfig;
use crate::resources::worldtime::WorldTime;
use crate::systems::lerp::{poll_render_messages, publish_lerp_frames};
use crate::systems::lifecycle::process_pending_deletions;
use crate::systems::messages::{update_render_messages, update_spatial_messages};
use crate::systems::netstate::flush_state_moves;
use crate::systems::snapgrid::update_snapgrid_positions;

/// Insert the spatial resources and message queues into `world`.
pub fn setup_spatial(world: &mut World, config: SpatialConfig) {
    world.insert_resource(config);
    world.init_resource::<MapManager>();
    world.init_resource::<DeferredMoves>();
    world.init_resource::<PendingDeletions>();
    world.init_resource::<NetEntityMap>();
    world.init_resource::<NetStateQueue>();
    world.init_resource::<WorldTime>();

    let mut registry = DebugRegistry::default();
    registry.register::<TransformNode>("transform");
    registry.register::<SnapGrid>("snapgrid");
    world.insert_resource(registry);

    world.init_resource::<Messages<MoveEvent>>();
    world.init_resource::<Messages<RotateEvent>>();
    world.init_resource::<Messages<ParentChangedEvent>>();
    world.init_resource::<Messages<AnchorStateChangedEvent>>();
    world.init_resource::<Messages<MapIdChangedEvent>>();
    world.init_resource::<Messages<StartLerpNotification>>();
    world.init_resource::<Messages<SnapGridPositionChangedEvent>>();
    world.init_resource::<Messages<RenderMessage>>();
}

fn advance_world_time(mut time: ResMut<WorldTime>) {
    time.advance();
}

/// Systems run once per tick, in order.
pub fn build_tick_schedule() -> Schedule {
    let mut tick = Schedule::default();
    tick.add_systems(
        (
            process_pending_deletions,
            flush_state_moves,
            update_snapgrid_positions,
            publish_lerp_frames,
            poll_render_messages,
            advance_world_time,
            update_spatial_messages,
            update_render_messages,
        )
            .chain(),
    );
    tick
}

/// Run one tick and clear change trackers for the next one.
pub fn run_tick(world: &mut World, schedule: &mut Schedule) {
    schedule.run(world);
    world.clear_trackers();
}
