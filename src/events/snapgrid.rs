use bevy_ecs::message::Message;
use bevy_ecs::prelude::Entity;
use glam::IVec2;

/// Raised only when the resolved snap-grid cell actually differs.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapGridPositionChangedEvent {
    pub entity: Entity,
    pub grid: Entity,
    pub old_cell: Option<IVec2>,
    pub new_cell: IVec2,
}
