use bevy_ecs::prelude::*;

/// Entities queued for deletion after a tolerated invariant violation.
///
/// Drained by [`process_pending_deletions`] at the start of each tick.
///
/// [`process_pending_deletions`]: crate::systems::lifecycle::process_pending_deletions
#[derive(Resource, Debug, Default)]
pub struct PendingDeletions {
    queue: Vec<Entity>,
}

impl PendingDeletions {
    pub fn queue(&mut self, entity: Entity) {
        if !self.queue.contains(&entity) {
            self.queue.push(entity);
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.queue.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.queue)
    }
}
