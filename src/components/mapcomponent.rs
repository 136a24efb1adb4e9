use bevy_ecs::prelude::Component;

use crate::resources::mapmanager::MapId;

/// Marks the entity that owns a map. Its [`TransformNode`] is the root of
/// every placement on that map.
///
/// [`TransformNode`]: super::transformnode::TransformNode
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapComponent {
    pub map_id: MapId,
}
