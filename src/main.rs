//! Spatial core headless demo.
//!
//! Runs two worlds side by side:
//! - a **server** world where a handful of entities random-walk over a grid
//!   inside deferred windows, some of them anchored to tiles
//! - a **client** world that receives the server's snapshots as JSON, applies
//!   them one tick behind and interpolates towards the newest one on a render
//!   thread
//!
//! At the end both worlds are compared entity by entity.
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- --ticks 300 --entities 32 --seed 9
//! RUST_LOG=debug cargo run -- --config spatial.ini --dump-state
//! ```

use bevy_ecs::prelude::*;
use clap::Parser;
use glam::{IVec2, Vec2};
use log::{info, warn};
use std::path::PathBuf;

use spatialcore::components::netentity::NetEntity;
use spatialcore::components::snapgrid::{SnapGrid, SnapGridOffset};
use spatialcore::components::transformnode::TransformNode;
use spatialcore::components::transformstate::WorldSnapshot;
use spatialcore::error::TransformError;
use spatialcore::maths::{Angle, Box2, vec_approx_eq};
use spatialcore::resources::debugregistry::debug_strings;
use spatialcore::resources::mapmanager::MapId;
use spatialcore::resources::netentitymap::NetEntityMap;
use spatialcore::resources::renderbridge::{setup_render_bridge, shutdown_render_bridge};
use spatialcore::resources::spatialconfig::SpatialConfig;
use spatialcore::simulation::{build_tick_schedule, run_tick, setup_spatial};
use spatialcore::systems::deferred::begin_deferred;
use spatialcore::systems::hierarchy::attach_to_grid_or_map;
use spatialcore::systems::lifecycle::{default_grid, spawn_entity_with, spawn_grid, spawn_map};
use spatialcore::systems::netstate::{apply_snapshot, capture_snapshot, register_net_entity};
use spatialcore::systems::transform::{set_local_position, set_local_rotation, world_position};

const MAP_NET_ID: NetEntity = NetEntity(1);
const GRID_NET_ID: NetEntity = NetEntity(2);
const GRID_HALF_EXTENT: i32 = 8;
const RENDER_SUB_FRAMES: u32 = 4;

/// Spatial core demo
#[derive(Parser)]
#[command(
    version,
    about = "Headless server/client demo of the spatial hierarchy core"
)]
struct Cli {
    /// INI configuration file (default: ./spatial.ini).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of ticks to simulate, overriding the config file.
    #[arg(long)]
    ticks: Option<u32>,

    /// Number of wandering entities, overriding the config file.
    #[arg(long)]
    entities: Option<u32>,

    /// Random walk seed, overriding the config file.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the last snapshot as JSON.
    #[arg(long)]
    dump_state: bool,
}

/// Map and grid shared by both worlds under the same network ids.
struct Layout {
    map_id: MapId,
    grid: Entity,
}

fn build_layout(world: &mut World) -> Result<Layout, TransformError> {
    let map = spawn_map(world)?;
    let map_id = world
        .get::<TransformNode>(map)
        .map(|node| node.map_id())
        .unwrap_or_default();
    register_net_entity(world, map, MAP_NET_ID);

    let tiles = default_grid(world).with_tiles(
        IVec2::splat(-GRID_HALF_EXTENT),
        IVec2::splat(GRID_HALF_EXTENT - 1),
    );
    let grid = spawn_grid(world, map_id, Vec2::new(10.0, 10.0), tiles)?;
    register_net_entity(world, grid, GRID_NET_ID);
    Ok(Layout { map_id, grid })
}

fn spawn_wanderers(
    world: &mut World,
    layout: &Layout,
    count: u32,
    rng: &mut fastrand::Rng,
) -> Result<Vec<Entity>, TransformError> {
    let extent = GRID_HALF_EXTENT as f32 - 1.0;
    let mut wanderers = Vec::with_capacity(count as usize);
    for i in 0..count {
        let position = Vec2::new(
            (rng.f32() * 2.0 - 1.0) * extent,
            (rng.f32() * 2.0 - 1.0) * extent,
        );
        let net_id = world.resource_mut::<NetEntityMap>().allocate();
        let mut node = TransformNode::new(Some(layout.grid)).with_position(position);
        if i % 4 == 0 {
            node = node.anchored();
        }
        let entity = if i % 3 == 0 {
            spawn_entity_with(world, node, (net_id, SnapGrid::new(SnapGridOffset::Edge)))?
        } else {
            spawn_entity_with(world, node, net_id)?
        };
        wanderers.push(entity);
    }
    Ok(wanderers)
}

fn random_walk(
    world: &mut World,
    wanderers: &[Entity],
    rng: &mut fastrand::Rng,
) -> Result<(), TransformError> {
    let extent = GRID_HALF_EXTENT as f32 - 0.5;
    let hint = Box2::centered(Vec2::ZERO, Vec2::splat(GRID_HALF_EXTENT as f32));
    let mut scope = begin_deferred(world).with_hint(hint);
    for &entity in wanderers {
        let Some(node) = scope.get::<TransformNode>(entity) else {
            continue;
        };
        let step = Vec2::new(rng.f32() - 0.5, rng.f32() - 0.5);
        let position = (node.local_position() + step).clamp(Vec2::splat(-extent), Vec2::splat(extent));
        let rotation = node.local_rotation() + Angle((rng.f32() - 0.5) * 0.2);
        set_local_position(&mut scope, entity, position)?;
        set_local_rotation(&mut scope, entity, rotation)?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match cli.config {
        Some(path) => SpatialConfig::with_path(path),
        None => SpatialConfig::new(),
    };
    if let Err(e) = config.load_from_file() {
        warn!("{e}; using defaults");
    }
    config.demo_ticks = cli.ticks.unwrap_or(config.demo_ticks);
    config.demo_entities = cli.entities.unwrap_or(config.demo_entities);
    config.demo_seed = cli.seed.unwrap_or(config.demo_seed);

    let mut server = World::new();
    setup_spatial(&mut server, config.clone());
    let mut client = World::new();
    setup_spatial(&mut client, config.clone());
    setup_render_bridge(&mut client, RENDER_SUB_FRAMES);

    let server_layout = build_layout(&mut server)?;
    build_layout(&mut client)?;

    let mut rng = fastrand::Rng::with_seed(config.demo_seed);
    let wanderers = spawn_wanderers(&mut server, &server_layout, config.demo_entities, &mut rng)?;
    info!(
        "server: {} wanderers on {} grid {:?}",
        wanderers.len(),
        server_layout.map_id,
        server_layout.grid
    );

    let mut server_tick = build_tick_schedule();
    let mut client_tick = build_tick_schedule();
    let mut previous: Option<WorldSnapshot> = None;
    let mut wire_bytes = 0usize;
    let mut failures = 0usize;

    for tick in 0..u64::from(config.demo_ticks) {
        random_walk(&mut server, &wanderers, &mut rng)?;
        if tick % 30 == 29
            && let Some(&hopper) = wanderers.get((tick / 30) as usize % wanderers.len().max(1))
        {
            attach_to_grid_or_map(&mut server, hopper)?;
        }
        run_tick(&mut server, &mut server_tick);

        let json = serde_json::to_string(&capture_snapshot(&mut server, tick))?;
        wire_bytes += json.len();
        let current: WorldSnapshot = serde_json::from_str(&json)?;
        if let Some(previous) = previous.take() {
            failures += apply_snapshot(&mut client, &previous, Some(&current));
        }
        run_tick(&mut client, &mut client_tick);
        previous = Some(current);
    }
    if let Some(last) = previous.take() {
        failures += apply_snapshot(&mut client, &last, None);
        run_tick(&mut client, &mut client_tick);
        if cli.dump_state {
            println!("{}", serde_json::to_string_pretty(&last)?);
        }
    }

    let mut mismatches = 0;
    for &entity in &wanderers {
        let Some(net_id) = server.get::<NetEntity>(entity).copied() else {
            continue;
        };
        let Some(remote) = client.resource::<NetEntityMap>().get(net_id) else {
            mismatches += 1;
            continue;
        };
        let here = world_position(&server, entity)?;
        let there = world_position(&client, remote)?;
        if !vec_approx_eq(here, there) {
            warn!("{net_id:?} diverged: server {here:?}, client {there:?}");
            mismatches += 1;
        }
    }
    if let Some(&first) = wanderers.first() {
        for (name, text) in debug_strings(&server, first) {
            info!("{first:?} {name}: {text}");
        }
    }

    let render_report = shutdown_render_bridge(&mut client);
    info!(
        "{} ticks, {} bytes on the wire, {} failed applies, {} mismatches, render: {:?}",
        config.demo_ticks, wire_bytes, failures, mismatches, render_report
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("demo failed: {e}");
        std::process::exit(1);
    }
}
