use bevy_ecs::prelude::*;

use crate::maths::Box2;

/// Bookkeeping for the open deferred window.
///
/// `depth` counts nested [`begin_deferred`] scopes; writes stage instead of
/// emitting while it is non-zero. `staged` lists nodes holding staged values in
/// first-write order, so the closing flush is deterministic.
///
/// [`begin_deferred`]: crate::systems::deferred::begin_deferred
#[derive(Resource, Debug, Default)]
pub struct DeferredMoves {
    pub(crate) depth: u32,
    pub(crate) staged: Vec<Entity>,
    pub(crate) hint: Option<Box2>,
}

impl DeferredMoves {
    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }
}
