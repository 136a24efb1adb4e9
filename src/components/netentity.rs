use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Network identity shared by server and clients.
///
/// Entities without a `NetEntity` exist only on the local side; a networked
/// entity must never end up parented to one of them.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetEntity(pub u32);
