//! Wire snapshot of a transform.
//!
//! [`TransformState`] is the shape exchanged between server and clients. The
//! field set and order are the compatibility contract; serde writes them in
//! declaration order.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::netentity::NetEntity;
use crate::maths::Angle;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    pub parent_id: Option<NetEntity>,
    pub local_position: Vec2,
    pub local_rotation: Angle,
    pub no_local_rotation: bool,
    pub anchored: bool,
}

impl TransformState {
    pub fn new(parent_id: Option<NetEntity>, local_position: Vec2, local_rotation: Angle) -> Self {
        Self {
            parent_id,
            local_position,
            local_rotation,
            no_local_rotation: false,
            anchored: false,
        }
    }
}

/// One networked entity's state within a [`WorldSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub net_id: NetEntity,
    pub state: TransformState,
}

/// All networked transforms of a world at one tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    pub fn find(&self, net_id: NetEntity) -> Option<&TransformState> {
        self.entities
            .iter()
            .find(|snapshot| snapshot.net_id == net_id)
            .map(|snapshot| &snapshot.state)
    }
}
