//! Mapping between network ids and local entities.

use bevy_ecs::prelude::*;
use rustc_hash::FxHashMap;

use crate::components::netentity::NetEntity;

#[derive(Resource, Debug, Default)]
pub struct NetEntityMap {
    by_net: FxHashMap<NetEntity, Entity>,
    next: u32,
}

impl NetEntityMap {
    /// Hand out the next unused network id. Ids start at 1.
    pub fn allocate(&mut self) -> NetEntity {
        self.next = self.next.max(1);
        while self.by_net.contains_key(&NetEntity(self.next)) {
            self.next += 1;
        }
        let id = NetEntity(self.next);
        self.next += 1;
        id
    }

    pub fn insert(&mut self, net_id: NetEntity, entity: Entity) {
        self.by_net.insert(net_id, entity);
    }

    pub fn remove(&mut self, net_id: NetEntity) -> Option<Entity> {
        self.by_net.remove(&net_id)
    }

    pub fn get(&self, net_id: NetEntity) -> Option<Entity> {
        self.by_net.get(&net_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_net.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }
}
