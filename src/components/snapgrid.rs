//! Snap-grid occupancy tracking.
//!
//! Every grid keeps a [`SnapGridIndex`] with two lanes of cells:
//! - `Center` cells line up with tiles (pipes, wires, machines)
//! - `Edge` cells are shifted half a tile so they sit on tile borders (walls)
//!
//! An entity takes part in the index by carrying a [`SnapGrid`] tracker. The
//! tracker remembers the cell it was last registered in so moves can remove it
//! from the old cell before inserting it in the new one.

use std::collections::BTreeSet;

use bevy_ecs::prelude::{Component, Entity};
use glam::IVec2;
use rustc_hash::FxHashMap;

use crate::resources::debugregistry::ComponentDebug;

/// Lane an entity occupies on its grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SnapGridOffset {
    #[default]
    Center,
    Edge,
}

/// Cell to occupants maps for both lanes of one grid.
#[derive(Clone, Debug, Default)]
pub struct SnapGridIndex {
    center: FxHashMap<IVec2, BTreeSet<Entity>>,
    edge: FxHashMap<IVec2, BTreeSet<Entity>>,
}

impl SnapGridIndex {
    fn lane(&self, offset: SnapGridOffset) -> &FxHashMap<IVec2, BTreeSet<Entity>> {
        match offset {
            SnapGridOffset::Center => &self.center,
            SnapGridOffset::Edge => &self.edge,
        }
    }

    fn lane_mut(&mut self, offset: SnapGridOffset) -> &mut FxHashMap<IVec2, BTreeSet<Entity>> {
        match offset {
            SnapGridOffset::Center => &mut self.center,
            SnapGridOffset::Edge => &mut self.edge,
        }
    }

    /// Returns false if the entity was already in the cell.
    pub fn add(&mut self, offset: SnapGridOffset, cell: IVec2, entity: Entity) -> bool {
        self.lane_mut(offset).entry(cell).or_default().insert(entity)
    }

    pub fn remove(&mut self, offset: SnapGridOffset, cell: IVec2, entity: Entity) -> bool {
        let lane = self.lane_mut(offset);
        let Some(occupants) = lane.get_mut(&cell) else {
            return false;
        };
        let removed = occupants.remove(&entity);
        if occupants.is_empty() {
            lane.remove(&cell);
        }
        removed
    }

    pub fn cell(&self, offset: SnapGridOffset, cell: IVec2) -> impl Iterator<Item = Entity> + '_ {
        self.lane(offset)
            .get(&cell)
            .into_iter()
            .flat_map(|occupants| occupants.iter().copied())
    }

    pub fn contains(&self, offset: SnapGridOffset, cell: IVec2, entity: Entity) -> bool {
        self.lane(offset)
            .get(&cell)
            .is_some_and(|occupants| occupants.contains(&entity))
    }

    /// Number of (cell, entity) registrations for `entity` across both lanes.
    pub fn registrations_of(&self, entity: Entity) -> usize {
        self.center
            .values()
            .chain(self.edge.values())
            .filter(|occupants| occupants.contains(&entity))
            .count()
    }
}

/// Per-entity snap-grid tracker.
///
/// # Fields
/// - `offset` - Which lane of the grid the entity lives in
/// - `position` - Grid entity and cell the entity is currently registered in
/// - `anchor_owned` - Inserted by anchoring; removed again when the entity unanchors
#[derive(Component, Clone, Debug, Default)]
pub struct SnapGrid {
    pub offset: SnapGridOffset,
    pub(crate) position: Option<(Entity, IVec2)>,
    pub(crate) anchor_owned: bool,
}

impl SnapGrid {
    pub fn new(offset: SnapGridOffset) -> Self {
        Self {
            offset,
            position: None,
            anchor_owned: false,
        }
    }

    pub fn position(&self) -> Option<(Entity, IVec2)> {
        self.position
    }

    pub fn is_registered(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_anchor_owned(&self) -> bool {
        self.anchor_owned
    }
}

impl ComponentDebug for SnapGrid {
    fn debug_string(&self) -> String {
        match self.position {
            Some((grid, cell)) => format!("{:?} lane, grid {:?} cell ({}, {})", self.offset, grid, cell.x, cell.y),
            None => format!("{:?} lane, unregistered", self.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::world::World;

    #[test]
    fn lanes_are_independent() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let mut index = SnapGridIndex::default();
        assert!(index.add(SnapGridOffset::Center, IVec2::ZERO, a));
        assert!(!index.add(SnapGridOffset::Center, IVec2::ZERO, a));
        assert!(index.contains(SnapGridOffset::Center, IVec2::ZERO, a));
        assert!(!index.contains(SnapGridOffset::Edge, IVec2::ZERO, a));
    }

    #[test]
    fn removing_last_occupant_drops_the_cell() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let mut index = SnapGridIndex::default();
        index.add(SnapGridOffset::Edge, IVec2::new(2, 3), a);
        assert!(index.remove(SnapGridOffset::Edge, IVec2::new(2, 3), a));
        assert_eq!(index.cell(SnapGridOffset::Edge, IVec2::new(2, 3)).count(), 0);
        assert_eq!(index.registrations_of(a), 0);
    }
}
