//! Messages exchanged with the render thread.

use bevy_ecs::message::Message;
use bevy_ecs::prelude::Entity;
use glam::Vec2;

use crate::maths::Angle;

/// One entity's interpolation pair, sent whole so the render thread never sees
/// a source from one tick with a target from another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LerpFrame {
    pub entity: Entity,
    pub parent: Option<Entity>,
    pub source: (Vec2, Angle),
    pub target: (Vec2, Angle),
}

/// Commands sent *to* the render thread
#[derive(Debug, Clone)]
pub enum RenderCmd {
    Frames { tick: u64, frames: Vec<LerpFrame> },
    Forget { entity: Entity },
    Shutdown,
}

/// Reports sent *back* from the render thread
#[derive(Message, Debug, Clone, PartialEq)]
pub enum RenderMessage {
    /// `poses` holds the last sub-frame's pose per entity, ordered by entity.
    Presented {
        tick: u64,
        tracked: usize,
        sub_frames: u32,
        poses: Vec<(Entity, Vec2, Angle)>,
    },
    Stopped {
        presented_ticks: u64,
    },
}
