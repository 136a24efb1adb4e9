//! Integration tests for network state capture, application and interpolation.
//!
//! Each test runs a server world and a client world sharing a map (net id 1)
//! and a grid (net id 2) at (10, 10).
//!
//! # Usage
//!
//! ```sh
//! cargo test --test netstate_integration
//! ```

use bevy_ecs::message::Message;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemState;
use glam::{IVec2, Vec2};

use spatialcore::components::mapgrid::MapGrid;
use spatialcore::components::netentity::NetEntity;
use spatialcore::components::snapgrid::{SnapGrid, SnapGridOffset};
use spatialcore::components::transformnode::{EntityCoordinates, TransformNode};
use spatialcore::components::transformstate::{TransformState, WorldSnapshot};
use spatialcore::error::TransformError;
use spatialcore::events::transform::{
    MoveEvent, ParentChangedEvent, RotateEvent, StartLerpNotification,
};
use spatialcore::maths::Angle;
use spatialcore::resources::netentitymap::NetEntityMap;
use spatialcore::resources::netstatequeue::NetStateQueue;
use spatialcore::resources::pendingdeletions::PendingDeletions;
use spatialcore::resources::spatialconfig::SpatialConfig;
use spatialcore::simulation::setup_spatial;
use spatialcore::systems::lerp::sample_node;
use spatialcore::systems::lifecycle::{spawn_entity, spawn_entity_with, spawn_grid, spawn_map};
use spatialcore::systems::netstate::{
    apply_snapshot, apply_state, capture_snapshot, flush_state_moves, get_state,
    register_net_entity,
};
use spatialcore::systems::snapgrid::get_cell_occupants;
use spatialcore::systems::transform::{set_local_position, set_local_rotation, world_position};

const EPSILON: f32 = 1e-4;
const MAP_NET: NetEntity = NetEntity(1);
const GRID_NET: NetEntity = NetEntity(2);

fn vec_eq(a: Vec2, b: Vec2) -> bool {
    (a - b).abs().max_element() < EPSILON
}

fn spatial_world(strict: bool) -> (World, Entity, Entity) {
    let mut world = World::new();
    let config = SpatialConfig {
        strict_invariants: strict,
        ..SpatialConfig::new()
    };
    setup_spatial(&mut world, config);
    let map = spawn_map(&mut world).unwrap();
    register_net_entity(&mut world, map, MAP_NET);
    let map_id = world.get::<TransformNode>(map).unwrap().map_id();
    let tiles = MapGrid::new(1).with_tiles(IVec2::splat(-4), IVec2::splat(3));
    let grid = spawn_grid(&mut world, map_id, Vec2::new(10.0, 10.0), tiles).unwrap();
    register_net_entity(&mut world, grid, GRID_NET);
    (world, map, grid)
}

fn spawn_networked(world: &mut World, node: TransformNode) -> (Entity, NetEntity) {
    let net_id = world.resource_mut::<NetEntityMap>().allocate();
    let entity = spawn_entity_with(world, node, net_id).unwrap();
    (entity, net_id)
}

fn remote(world: &World, net_id: NetEntity) -> Entity {
    world.resource::<NetEntityMap>().get(net_id).unwrap()
}

fn read_messages<M: Message + Clone>(world: &mut World) -> Vec<M> {
    let mut state = SystemState::<MessageReader<M>>::new(world);
    let mut reader = state.get_mut(world);
    reader.read().cloned().collect()
}

fn clear_messages(world: &mut World) {
    world.resource_mut::<Messages<MoveEvent>>().clear();
    world.resource_mut::<Messages<RotateEvent>>().clear();
    world.resource_mut::<Messages<ParentChangedEvent>>().clear();
    world.resource_mut::<Messages<StartLerpNotification>>().clear();
}

// =============================================================================
// Capture
// =============================================================================

#[test]
fn snapshot_lists_parents_before_children() {
    let (mut server, _, grid) = spatial_world(false);
    let (cart, cart_net) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid)).with_position(Vec2::new(1.0, 2.0)),
    );
    let (_, wheel_net) = spawn_networked(
        &mut server,
        TransformNode::new(Some(cart)).with_position(Vec2::new(0.5, 0.0)),
    );

    let snapshot = capture_snapshot(&mut server, 4);

    let order: Vec<NetEntity> = snapshot.entities.iter().map(|e| e.net_id).collect();
    assert_eq!(order, vec![MAP_NET, GRID_NET, cart_net, wheel_net]);
    assert_eq!(snapshot.tick, 4);
    let wheel = snapshot.find(wheel_net).unwrap();
    assert_eq!(wheel.parent_id, Some(cart_net));
    assert!(vec_eq(wheel.local_position, Vec2::new(0.5, 0.0)));
}

#[test]
fn state_with_local_parent_is_a_protocol_error() {
    let (mut server, _, grid) = spatial_world(false);
    let local = spawn_entity(&mut server, EntityCoordinates::new(Some(grid), Vec2::ZERO)).unwrap();
    let (child, _) = spawn_networked(&mut server, TransformNode::new(Some(local)));

    let err = get_state(&server, child).unwrap_err();
    assert_eq!(err, TransformError::ClientLocalParent { entity: child, parent: local });
    assert!(err.is_protocol_error());
}

#[test]
fn snapshot_survives_json() {
    let (mut server, _, grid) = spatial_world(false);
    spawn_networked(
        &mut server,
        TransformNode::new(Some(grid))
            .with_position(Vec2::new(-1.25, 3.0))
            .with_rotation(Angle(0.5)),
    );
    let snapshot = capture_snapshot(&mut server, 9);

    let json = serde_json::to_string(&snapshot).unwrap();
    let back: WorldSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}

// =============================================================================
// Application
// =============================================================================

#[test]
fn client_converges_on_server_placement() {
    let (mut server, _, grid) = spatial_world(false);
    let (mut client, _, _) = spatial_world(false);
    let (crate_entity, crate_net) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid))
            .with_position(Vec2::new(2.0, -1.0))
            .with_rotation(Angle(0.3)),
    );

    let failures = apply_snapshot(&mut client, &capture_snapshot(&mut server, 1), None);

    assert_eq!(failures, 0);
    let mirrored = remote(&client, crate_net);
    assert_eq!(client.get::<NetEntity>(mirrored), Some(&crate_net));
    assert!(vec_eq(
        world_position(&client, mirrored).unwrap(),
        world_position(&server, crate_entity).unwrap()
    ));
    let node = client.get::<TransformNode>(mirrored).unwrap();
    assert_eq!(node.parent(), Some(remote(&client, GRID_NET)));
    assert!(node.local_rotation().equals_approx(Angle(0.3)));
}

#[test]
fn reapplying_unchanged_state_is_silent() {
    let (mut server, _, grid) = spatial_world(false);
    let (mut client, _, _) = spatial_world(false);
    spawn_networked(
        &mut server,
        TransformNode::new(Some(grid)).with_position(Vec2::new(1.5, 1.5)),
    );
    spawn_networked(
        &mut server,
        TransformNode::new(Some(grid))
            .with_position(Vec2::new(-2.2, 0.7))
            .anchored(),
    );
    let snapshot = capture_snapshot(&mut server, 1);
    apply_snapshot(&mut client, &snapshot, None);
    flush_state_moves(&mut client);
    clear_messages(&mut client);

    let failures = apply_snapshot(&mut client, &snapshot, None);
    flush_state_moves(&mut client);

    assert_eq!(failures, 0);
    assert!(read_messages::<MoveEvent>(&mut client).is_empty());
    assert!(read_messages::<RotateEvent>(&mut client).is_empty());
    assert!(read_messages::<ParentChangedEvent>(&mut client).is_empty());
}

#[test]
fn moves_from_state_are_held_until_flushed() {
    let (mut server, _, grid) = spatial_world(false);
    let (mut client, _, _) = spatial_world(false);
    let (body, body_net) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid)).with_position(Vec2::ZERO),
    );
    apply_snapshot(&mut client, &capture_snapshot(&mut server, 1), None);
    flush_state_moves(&mut client);
    clear_messages(&mut client);

    set_local_position(&mut server, body, Vec2::new(1.0, 0.0)).unwrap();
    apply_snapshot(&mut client, &capture_snapshot(&mut server, 2), None);

    assert!(read_messages::<MoveEvent>(&mut client).is_empty());
    assert_eq!(client.resource::<NetStateQueue>().len(), 1);
    assert!(!client.resource::<NetStateQueue>().is_applying());

    flush_state_moves(&mut client);

    let moves = read_messages::<MoveEvent>(&mut client);
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].entity, remote(&client, body_net));
    assert!(moves[0].from_state_handling);
    assert!(client.resource::<NetStateQueue>().is_empty());
}

#[test]
fn anchored_state_is_mirrored_with_cell() {
    let (mut server, _, grid) = spatial_world(false);
    let (mut client, _, client_grid) = spatial_world(false);
    let (_, net_id) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid))
            .with_position(Vec2::new(1.2, 0.3))
            .anchored(),
    );

    apply_snapshot(&mut client, &capture_snapshot(&mut server, 1), None);

    let mirrored = remote(&client, net_id);
    let node = client.get::<TransformNode>(mirrored).unwrap();
    assert!(node.is_anchored());
    assert!(vec_eq(node.local_position(), Vec2::new(1.5, 0.5)));
    assert!(client.get::<SnapGrid>(mirrored).is_some());
    assert_eq!(
        get_cell_occupants(&client, client_grid, SnapGridOffset::Center, IVec2::new(1, 0)),
        vec![mirrored]
    );
}

#[test]
fn unanchoring_state_releases_cell() {
    let (mut client, _, grid) = spatial_world(false);
    let (body, _) = spawn_networked(
        &mut client,
        TransformNode::new(Some(grid))
            .with_position(Vec2::new(0.5, 0.5))
            .anchored(),
    );
    let state = TransformState::new(Some(GRID_NET), Vec2::new(3.0, 0.0), Angle::ZERO);

    apply_state(&mut client, body, &state, None).unwrap();

    let node = client.get::<TransformNode>(body).unwrap();
    assert!(!node.is_anchored());
    assert!(vec_eq(node.local_position(), Vec2::new(3.0, 0.0)));
    assert!(get_cell_occupants(&client, grid, SnapGridOffset::Center, IVec2::ZERO).is_empty());
}

// =============================================================================
// Violations
// =============================================================================

#[test]
fn unknown_parent_id_is_a_tolerated_violation() {
    let (mut client, _, grid) = spatial_world(false);
    let (body, _) = spawn_networked(&mut client, TransformNode::new(Some(grid)));
    let state = TransformState::new(Some(NetEntity(99)), Vec2::ONE, Angle::ZERO);

    let err = apply_state(&mut client, body, &state, None).unwrap_err();

    assert_eq!(err, TransformError::UnknownNetEntity { entity: body, net_id: 99 });
    assert!(client.resource::<PendingDeletions>().contains(body));
    assert!(!client.resource::<NetStateQueue>().is_applying());
}

fn client_with_local_parent(strict: bool) -> (World, Entity, TransformState) {
    let (mut client, _, grid) = spatial_world(strict);
    let local = spawn_entity(&mut client, EntityCoordinates::new(Some(grid), Vec2::ONE)).unwrap();
    client.resource_mut::<NetEntityMap>().insert(NetEntity(50), local);
    let (body, _) = spawn_networked(&mut client, TransformNode::new(Some(grid)));
    let state = TransformState::new(Some(NetEntity(50)), Vec2::ZERO, Angle::ZERO);
    (client, body, state)
}

#[test]
fn local_parent_detaches_in_tolerant_mode() {
    let (mut client, body, state) = client_with_local_parent(false);

    let err = apply_state(&mut client, body, &state, None).unwrap_err();

    assert!(err.is_protocol_error());
    assert_eq!(client.get::<TransformNode>(body).unwrap().parent(), None);
}

#[test]
#[should_panic(expected = "network protocol violated")]
fn local_parent_panics_in_strict_mode() {
    let (mut client, body, state) = client_with_local_parent(true);
    let _ = apply_state(&mut client, body, &state, None);
}

// =============================================================================
// Interpolation
// =============================================================================

#[test]
fn next_state_starts_interpolation() {
    let (mut server, _, grid) = spatial_world(false);
    let (mut client, _, _) = spatial_world(false);
    let (body, net_id) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid)).with_position(Vec2::new(0.0, 0.0)),
    );
    let first = capture_snapshot(&mut server, 1);
    set_local_position(&mut server, body, Vec2::new(2.0, 0.0)).unwrap();
    set_local_rotation(&mut server, body, Angle(1.0)).unwrap();
    let second = capture_snapshot(&mut server, 2);

    apply_snapshot(&mut client, &first, Some(&second));

    let mirrored = remote(&client, net_id);
    let node = client.get::<TransformNode>(mirrored).unwrap();
    assert!(vec_eq(node.local_position(), Vec2::ZERO));
    assert_eq!(node.lerp_target().map(|t| t.0), Some(Vec2::new(2.0, 0.0)));
    let (pos, rot) = sample_node(node, 0.5);
    assert!(vec_eq(pos, Vec2::new(1.0, 0.0)));
    assert!(rot.equals_approx(Angle(0.5)));

    let started = read_messages::<StartLerpNotification>(&mut client);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].entity, mirrored);

    apply_snapshot(&mut client, &second, None);
    let node = client.get::<TransformNode>(mirrored).unwrap();
    assert_eq!(node.lerp_target(), None);
    assert_eq!(sample_node(node, 0.5).0, node.local_position());
}

#[test]
fn target_under_another_parent_is_not_sampled() {
    let (mut server, map, grid) = spatial_world(false);
    let (mut client, _, _) = spatial_world(false);
    let (body, net_id) = spawn_networked(
        &mut server,
        TransformNode::new(Some(grid)).with_position(Vec2::new(1.0, 1.0)),
    );
    let first = capture_snapshot(&mut server, 1);
    spatialcore::systems::hierarchy::attach_parent(&mut server, body, map).unwrap();
    let second = capture_snapshot(&mut server, 2);

    apply_snapshot(&mut client, &first, Some(&second));

    let node = client.get::<TransformNode>(remote(&client, net_id)).unwrap();
    assert!(node.lerp_target().is_some());
    assert_eq!(sample_node(node, 0.5).0, node.local_position());
}
