//! Integration tests for the snap-grid index and anchoring.
//!
//! # Usage
//!
//! ```sh
//! cargo test --test snapgrid_integration
//! ```

use bevy_ecs::message::Message;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemState;
use glam::{IVec2, Vec2};

use spatialcore::components::mapgrid::MapGrid;
use spatialcore::components::snapgrid::{SnapGrid, SnapGridOffset};
use spatialcore::components::transformnode::TransformNode;
use spatialcore::error::TransformError;
use spatialcore::events::snapgrid::SnapGridPositionChangedEvent;
use spatialcore::events::transform::AnchorStateChangedEvent;
use spatialcore::maths::Direction;
use spatialcore::resources::spatialconfig::SpatialConfig;
use spatialcore::simulation::{build_tick_schedule, run_tick, setup_spatial};
use spatialcore::systems::anchoring::{anchor_entity_at, set_anchored, unanchor};
use spatialcore::systems::lifecycle::{despawn_spatial, spawn_entity_with, spawn_grid, spawn_map};
use spatialcore::systems::snapgrid::{get_cell_occupants, get_in_dir, neighbours};
use spatialcore::systems::transform::{set_local_position, world_position};

const EPSILON: f32 = 1e-4;

fn vec_eq(a: Vec2, b: Vec2) -> bool {
    (a - b).abs().max_element() < EPSILON
}

struct Fixture {
    world: World,
    schedule: Schedule,
    map: Entity,
    grid: Entity,
}

/// Map with an 8x8 grid (tiles -4..=3) at (10, 10).
fn fixture() -> Fixture {
    let mut world = World::new();
    setup_spatial(&mut world, SpatialConfig::tolerant());
    let map = spawn_map(&mut world).unwrap();
    let map_id = world.get::<TransformNode>(map).unwrap().map_id();
    let tiles = MapGrid::new(1).with_tiles(IVec2::splat(-4), IVec2::splat(3));
    let grid = spawn_grid(&mut world, map_id, Vec2::new(10.0, 10.0), tiles).unwrap();
    Fixture {
        world,
        schedule: build_tick_schedule(),
        map,
        grid,
    }
}

fn tracked(world: &mut World, parent: Entity, position: Vec2, offset: SnapGridOffset) -> Entity {
    spawn_entity_with(
        world,
        TransformNode::new(Some(parent)).with_position(position),
        SnapGrid::new(offset),
    )
    .unwrap()
}

fn read_messages<M: Message + Clone>(world: &mut World) -> Vec<M> {
    let mut state = SystemState::<MessageReader<M>>::new(world);
    let mut reader = state.get_mut(world);
    reader.read().cloned().collect()
}

fn occupants(world: &World, grid: Entity, cell: IVec2) -> Vec<Entity> {
    get_cell_occupants(world, grid, SnapGridOffset::Center, cell)
}

// =============================================================================
// Occupancy
// =============================================================================

#[test]
fn tracker_registers_starting_cell() {
    let mut f = fixture();
    let pipe = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);

    assert_eq!(occupants(&f.world, f.grid, IVec2::ZERO), vec![pipe]);
    let tracker = f.world.get::<SnapGrid>(pipe).unwrap();
    assert_eq!(tracker.position(), Some((f.grid, IVec2::ZERO)));
}

#[test]
fn move_updates_cell_and_notifies_only_on_cell_change() {
    let mut f = fixture();
    let pipe = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);
    run_tick(&mut f.world, &mut f.schedule);
    f.world
        .resource_mut::<Messages<SnapGridPositionChangedEvent>>()
        .clear();

    set_local_position(&mut f.world, pipe, Vec2::new(0.9, 0.1)).unwrap();
    run_tick(&mut f.world, &mut f.schedule);
    assert!(read_messages::<SnapGridPositionChangedEvent>(&mut f.world).is_empty());
    assert_eq!(occupants(&f.world, f.grid, IVec2::ZERO), vec![pipe]);

    set_local_position(&mut f.world, pipe, Vec2::new(2.5, -0.5)).unwrap();
    run_tick(&mut f.world, &mut f.schedule);

    let changes = read_messages::<SnapGridPositionChangedEvent>(&mut f.world);
    assert_eq!(
        changes,
        vec![SnapGridPositionChangedEvent {
            entity: pipe,
            grid: f.grid,
            old_cell: Some(IVec2::ZERO),
            new_cell: IVec2::new(2, -1),
        }]
    );
    assert!(occupants(&f.world, f.grid, IVec2::ZERO).is_empty());
    assert_eq!(occupants(&f.world, f.grid, IVec2::new(2, -1)), vec![pipe]);
    assert_eq!(
        f.world.get::<MapGrid>(f.grid).unwrap().index().registrations_of(pipe),
        1
    );
}

#[test]
fn lanes_are_independent() {
    let mut f = fixture();
    let pipe = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);
    let wall = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Edge);

    assert_eq!(occupants(&f.world, f.grid, IVec2::ZERO), vec![pipe]);
    assert_eq!(
        get_cell_occupants(&f.world, f.grid, SnapGridOffset::Edge, IVec2::new(1, 1)),
        vec![wall]
    );
}

#[test]
fn directional_queries_find_neighbours() {
    let mut f = fixture();
    let centre = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);
    let east = tracked(&mut f.world, f.grid, Vec2::new(1.5, 0.5), SnapGridOffset::Center);
    let north = tracked(&mut f.world, f.grid, Vec2::new(0.5, 1.5), SnapGridOffset::Center);
    let south_west = tracked(&mut f.world, f.grid, Vec2::new(-0.5, -0.5), SnapGridOffset::Center);

    assert_eq!(get_in_dir(&f.world, centre, Direction::East), vec![east]);
    assert_eq!(get_in_dir(&f.world, centre, Direction::North), vec![north]);
    assert_eq!(get_in_dir(&f.world, centre, Direction::SouthWest), vec![south_west]);
    assert!(get_in_dir(&f.world, centre, Direction::West).is_empty());
    assert_eq!(get_in_dir(&f.world, east, Direction::West), vec![centre]);

    let found: Vec<Direction> = neighbours(&f.world, centre).into_iter().map(|(d, _)| d).collect();
    assert_eq!(found, vec![Direction::East, Direction::North, Direction::SouthWest]);
}

#[test]
fn despawn_removes_registration() {
    let mut f = fixture();
    let pipe = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);

    despawn_spatial(&mut f.world, pipe);

    assert!(occupants(&f.world, f.grid, IVec2::ZERO).is_empty());
}

#[test]
fn tracker_outlives_its_grid_without_panicking() {
    let mut f = fixture();
    let pipe = tracked(&mut f.world, f.grid, Vec2::new(0.5, 0.5), SnapGridOffset::Center);

    despawn_spatial(&mut f.world, f.grid);
    assert_eq!(f.world.get::<TransformNode>(pipe).unwrap().parent(), Some(f.map));

    despawn_spatial(&mut f.world, pipe);
    assert!(f.world.get_entity(pipe).is_err());
}

// =============================================================================
// Anchoring
// =============================================================================

#[test]
fn anchor_then_unanchor_restores_cell() {
    let mut f = fixture();
    let e = spawn_entity_with(
        &mut f.world,
        TransformNode::new(Some(f.map)).with_position(Vec2::new(11.2, 10.7)),
        (),
    )
    .unwrap();

    set_anchored(&mut f.world, e, true).unwrap();

    let node = f.world.get::<TransformNode>(e).unwrap();
    assert!(node.is_anchored());
    assert_eq!(node.parent(), Some(f.grid));
    assert!(vec_eq(node.local_position(), Vec2::new(1.5, 0.5)));
    assert!(vec_eq(world_position(&f.world, e).unwrap(), Vec2::new(11.5, 10.5)));
    assert_eq!(occupants(&f.world, f.grid, IVec2::new(1, 0)), vec![e]);

    set_anchored(&mut f.world, e, false).unwrap();

    assert!(!f.world.get::<TransformNode>(e).unwrap().is_anchored());
    assert!(occupants(&f.world, f.grid, IVec2::new(1, 0)).is_empty());
    assert!(f.world.get::<SnapGrid>(e).is_none());

    let anchors = read_messages::<AnchorStateChangedEvent>(&mut f.world);
    let states: Vec<bool> = anchors.iter().map(|a| a.anchored).collect();
    assert_eq!(states, vec![true, false]);
}

#[test]
fn anchored_entity_ignores_position_writes() {
    let mut f = fixture();
    let e = spawn_entity_with(
        &mut f.world,
        TransformNode::new(Some(f.grid))
            .with_position(Vec2::new(-2.3, 1.1))
            .anchored(),
        (),
    )
    .unwrap();
    assert!(f.world.get::<TransformNode>(e).unwrap().is_anchored());
    let before = f.world.get::<TransformNode>(e).unwrap().local_position();
    assert!(vec_eq(before, Vec2::new(-2.5, 1.5)));

    set_local_position(&mut f.world, e, Vec2::new(3.0, 3.0)).unwrap();

    assert!(vec_eq(f.world.get::<TransformNode>(e).unwrap().local_position(), before));
}

#[test]
fn anchoring_off_grid_fails_cleanly() {
    let mut f = fixture();
    let e = spawn_entity_with(
        &mut f.world,
        TransformNode::new(Some(f.map)).with_position(Vec2::new(-50.0, 0.0)),
        (),
    )
    .unwrap();

    let err = set_anchored(&mut f.world, e, true).unwrap_err();

    assert_eq!(err, TransformError::NoTileUnderEntity(e));
    assert!(!f.world.get::<TransformNode>(e).unwrap().is_anchored());
    assert!(f.world.get::<SnapGrid>(e).is_none());
}

#[test]
fn anchoring_keeps_an_existing_tracker() {
    let mut f = fixture();
    let wall = tracked(&mut f.world, f.grid, Vec2::new(0.2, 0.2), SnapGridOffset::Edge);

    anchor_entity_at(&mut f.world, wall, f.grid, IVec2::new(2, 2)).unwrap();
    assert_eq!(
        get_cell_occupants(&f.world, f.grid, SnapGridOffset::Edge, IVec2::new(3, 3)),
        vec![wall]
    );

    unanchor(&mut f.world, wall);
    let tracker = f.world.get::<SnapGrid>(wall).unwrap();
    assert_eq!(tracker.offset, SnapGridOffset::Edge);
    assert!(tracker.is_registered());
}

#[test]
fn reanchoring_moves_registration_between_cells() {
    let mut f = fixture();
    let cell_a = IVec2::ZERO;
    let cell_b = IVec2::new(2, 1);

    // Anchor-owned tracker, Center lane: tile cells match snap cells.
    let crate_entity = spawn_entity_with(
        &mut f.world,
        TransformNode::new(Some(f.grid)).with_position(Vec2::new(-1.5, -1.5)),
        (),
    )
    .unwrap();
    let west_of_b = tracked(&mut f.world, f.grid, Vec2::new(1.5, 1.5), SnapGridOffset::Center);

    anchor_entity_at(&mut f.world, crate_entity, f.grid, cell_a).unwrap();
    assert_eq!(occupants(&f.world, f.grid, cell_a), vec![crate_entity]);
    anchor_entity_at(&mut f.world, crate_entity, f.grid, cell_b).unwrap();
    run_tick(&mut f.world, &mut f.schedule);

    assert!(f.world.get::<TransformNode>(crate_entity).unwrap().is_anchored());
    assert!(f.world.get::<SnapGrid>(crate_entity).unwrap().is_anchor_owned());
    assert!(occupants(&f.world, f.grid, cell_a).is_empty());
    assert_eq!(occupants(&f.world, f.grid, cell_b), vec![crate_entity]);
    let grid = f.world.get::<MapGrid>(f.grid).unwrap();
    assert_eq!(grid.index().registrations_of(crate_entity), 1);
    assert_eq!(get_in_dir(&f.world, west_of_b, Direction::East), vec![crate_entity]);

    // Existing Edge tracker: tile (x, y) snaps to edge cell (x + 1, y + 1).
    let wall = tracked(&mut f.world, f.grid, Vec2::new(-2.8, -2.8), SnapGridOffset::Edge);
    let south_of_b = tracked(&mut f.world, f.grid, Vec2::new(2.9, 0.9), SnapGridOffset::Edge);
    let edge_a = IVec2::new(-1, -1);
    let edge_b = IVec2::new(3, 2);

    anchor_entity_at(&mut f.world, wall, f.grid, IVec2::new(-2, -2)).unwrap();
    assert_eq!(
        get_cell_occupants(&f.world, f.grid, SnapGridOffset::Edge, edge_a),
        vec![wall]
    );
    anchor_entity_at(&mut f.world, wall, f.grid, cell_b).unwrap();
    run_tick(&mut f.world, &mut f.schedule);

    assert!(!f.world.get::<SnapGrid>(wall).unwrap().is_anchor_owned());
    assert!(get_cell_occupants(&f.world, f.grid, SnapGridOffset::Edge, edge_a).is_empty());
    assert_eq!(
        get_cell_occupants(&f.world, f.grid, SnapGridOffset::Edge, edge_b),
        vec![wall]
    );
    let grid = f.world.get::<MapGrid>(f.grid).unwrap();
    assert_eq!(grid.index().registrations_of(wall), 1);
    assert_eq!(get_in_dir(&f.world, south_of_b, Direction::North), vec![wall]);
}
