//! Render-side interpolation.
//!
//! The simulation publishes one [`LerpFrame`] per interpolating entity each
//! tick through the [`RenderBridge`]. The render thread keeps the latest frame
//! per entity and samples it at its own sub-tick fractions. Frames travel whole
//! over the channel, so a source and target from different ticks are never
//! mixed.

use bevy_ecs::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use glam::Vec2;
use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::components::transformnode::TransformNode;
use crate::events::render::{LerpFrame, RenderCmd, RenderMessage};
use crate::maths::Angle;
use crate::resources::renderbridge::RenderBridge;
use crate::resources::spatialconfig::SpatialConfig;
use crate::resources::worldtime::WorldTime;

/// Interpolate between two poses. `fraction` is clamped to `[0, 1]`.
pub fn sample_lerp(source: (Vec2, Angle), target: (Vec2, Angle), fraction: f32) -> (Vec2, Angle) {
    let t = fraction.clamp(0.0, 1.0);
    (source.0.lerp(target.0, t), source.1.lerp(target.1, t))
}

/// Pose to draw for `node` at `fraction` of the way to the next tick.
///
/// Without a target, or when the target was recorded under another parent,
/// the authoritative local pose is returned.
pub fn sample_node(node: &TransformNode, fraction: f32) -> (Vec2, Angle) {
    match node.lerp_target {
        Some(target) if node.lerp_parent == node.parent => sample_lerp(node.lerp_source, target, fraction),
        _ => (node.local_position, node.local_rotation),
    }
}

/// Send this tick's interpolation pairs to the render thread.
pub fn publish_lerp_frames(
    bridge: Option<Res<RenderBridge>>,
    config: Option<Res<SpatialConfig>>,
    time: Option<Res<WorldTime>>,
    nodes: Query<(Entity, &TransformNode)>,
) {
    let Some(bridge) = bridge else {
        return;
    };
    if config.is_some_and(|config| !config.publish_lerp) {
        return;
    }
    let frames: Vec<LerpFrame> = nodes
        .iter()
        .filter(|(_, node)| node.is_running())
        .filter_map(|(entity, node)| {
            node.lerp_target.map(|target| LerpFrame {
                entity,
                parent: node.parent,
                source: node.lerp_source,
                target,
            })
        })
        .collect();
    let tick = time.map(|time| time.tick).unwrap_or_default();
    // Ignore send errors on shutdown
    let _ = bridge.tx_cmd.send(RenderCmd::Frames { tick, frames });
}

/// Drain reports from the render thread into `Messages<RenderMessage>`.
pub fn poll_render_messages(bridge: Option<Res<RenderBridge>>, mut writer: MessageWriter<RenderMessage>) {
    if let Some(bridge) = bridge {
        writer.write_batch(bridge.rx_msg.try_iter());
    }
}

/// Entry point of the render thread.
///
/// Blocks on commands until [`RenderCmd::Shutdown`] or until the sender is
/// dropped, then reports how many ticks it presented.
pub fn render_thread(rx_cmd: Receiver<RenderCmd>, tx_msg: Sender<RenderMessage>, sub_frames: u32) {
    let sub_frames = sub_frames.max(1);
    let mut latest: FxHashMap<Entity, LerpFrame> = FxHashMap::default();
    let mut poses: FxHashMap<Entity, (Vec2, Angle)> = FxHashMap::default();
    let mut presented_ticks = 0u64;

    debug!("render thread starting (id={:?})", std::thread::current().id());

    for cmd in rx_cmd.iter() {
        match cmd {
            RenderCmd::Frames { tick, frames } => {
                latest.clear();
                latest.extend(frames.into_iter().map(|frame| (frame.entity, frame)));
                poses.retain(|entity, _| latest.contains_key(entity));

                for step in 1..=sub_frames {
                    let fraction = step as f32 / sub_frames as f32;
                    for frame in latest.values() {
                        poses.insert(frame.entity, sample_lerp(frame.source, frame.target, fraction));
                    }
                }
                trace!("tick {tick}: {} interpolated pose(s)", poses.len());
                presented_ticks += 1;
                let mut last_poses: Vec<(Entity, Vec2, Angle)> = poses
                    .iter()
                    .map(|(&entity, &(position, rotation))| (entity, position, rotation))
                    .collect();
                last_poses.sort_unstable_by_key(|(entity, _, _)| *entity);
                let _ = tx_msg.send(RenderMessage::Presented {
                    tick,
                    tracked: latest.len(),
                    sub_frames,
                    poses: last_poses,
                });
            }
            RenderCmd::Forget { entity } => {
                latest.remove(&entity);
                poses.remove(&entity);
            }
            RenderCmd::Shutdown => break,
        }
    }

    debug!("render thread exiting after {presented_ticks} tick(s)");
    let _ = tx_msg.send(RenderMessage::Stopped { presented_ticks });
}
