//! ECS resources that bridge the simulation with the render thread.
//!
//! Use [`setup_render_bridge`] once during initialization to spawn the render
//! thread and insert the [`RenderBridge`] and `Messages<RenderMessage>`
//! resources. Call [`shutdown_render_bridge`] during teardown to stop the
//! thread and join it.

use bevy_ecs::prelude::*;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::events::render::{RenderCmd, RenderMessage};
use crate::systems::lerp::render_thread;

/// Shared bridge between the ECS world and the render thread.
#[derive(Resource)]
pub struct RenderBridge {
    /// Sender for [`RenderCmd`] messages (ECS -> render thread).
    pub tx_cmd: Sender<RenderCmd>,
    /// Receiver for [`RenderMessage`] reports (render thread -> ECS).
    pub rx_msg: Receiver<RenderMessage>,
    /// Join handle for the background render thread.
    pub handle: std::thread::JoinHandle<()>,
}

/// Spawn the render thread and register bridge resources.
pub fn setup_render_bridge(world: &mut World, sub_frames: u32) {
    let (tx_cmd, rx_cmd) = unbounded::<RenderCmd>();
    let (tx_msg, rx_msg) = unbounded::<RenderMessage>();

    let handle = std::thread::spawn(move || render_thread(rx_cmd, tx_msg, sub_frames));

    world.insert_resource(RenderBridge {
        tx_cmd,
        rx_msg,
        handle,
    });
    world.init_resource::<Messages<RenderMessage>>();
}

/// Request shutdown of the render thread and join it.
///
/// Returns the thread's final report if one arrived before it exited.
pub fn shutdown_render_bridge(world: &mut World) -> Option<RenderMessage> {
    let bridge = world.remove_resource::<RenderBridge>()?;
    let _ = bridge.tx_cmd.send(RenderCmd::Shutdown);
    let _ = bridge.handle.join();
    bridge
        .rx_msg
        .try_iter()
        .filter(|msg| matches!(msg, RenderMessage::Stopped { .. }))
        .last()
}
