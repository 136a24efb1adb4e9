//! Grid ownership component.
//!
//! A [`MapGrid`] turns its entity into a tile grid: children of the entity are
//! placed in grid-local space, tiles are square with side `tile_size`, and tile
//! `(x, y)` covers `[x * size, (x + 1) * size)` on both axes. The grid also
//! carries the snap-grid occupancy index for everything anchored or tracked on
//! it.

use bevy_ecs::prelude::Component;
use glam::{IVec2, Vec2};
use rustc_hash::FxHashSet;

use super::snapgrid::{SnapGridIndex, SnapGridOffset};

#[derive(Component, Clone, Debug)]
pub struct MapGrid {
    pub tile_size: u16,
    tiles: FxHashSet<IVec2>,
    pub(crate) index: SnapGridIndex,
}

impl MapGrid {
    pub fn new(tile_size: u16) -> Self {
        Self {
            tile_size: tile_size.max(1),
            tiles: FxHashSet::default(),
            index: SnapGridIndex::default(),
        }
    }

    /// Fill every tile in the inclusive rectangle `min..=max`.
    pub fn with_tiles(mut self, min: IVec2, max: IVec2) -> Self {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                self.tiles.insert(IVec2::new(x, y));
            }
        }
        self
    }

    pub fn set_tile(&mut self, tile: IVec2, filled: bool) {
        if filled {
            self.tiles.insert(tile);
        } else {
            self.tiles.remove(&tile);
        }
    }

    pub fn has_tile(&self, tile: IVec2) -> bool {
        self.tiles.contains(&tile)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn size(&self) -> f32 {
        f32::from(self.tile_size)
    }

    /// Tile containing a grid-local position.
    pub fn tile_indices_for(&self, local: Vec2) -> IVec2 {
        (local / self.size()).floor().as_ivec2()
    }

    /// Grid-local position of a tile's centre.
    pub fn grid_tile_to_local(&self, tile: IVec2) -> Vec2 {
        (tile.as_vec2() + Vec2::splat(0.5)) * self.size()
    }

    /// Snap-grid cell for a grid-local position. Edge cells are shifted half a
    /// tile so that a tile border falls in the middle of a cell.
    pub fn snap_grid_cell_for(&self, local: Vec2, offset: SnapGridOffset) -> IVec2 {
        match offset {
            SnapGridOffset::Center => self.tile_indices_for(local),
            SnapGridOffset::Edge => self.tile_indices_for(local + Vec2::splat(self.size() / 2.0)),
        }
    }

    pub fn index(&self) -> &SnapGridIndex {
        &self.index
    }
}
