use bevy_ecs::prelude::*;

use crate::events::transform::MoveEvent;

/// Holds back moves produced while a network snapshot is being applied.
///
/// While `applying` is set, [`MoveEvent`]s are pushed here instead of being
/// written. [`flush_state_moves`] writes them afterwards, in order, with
/// `from_state_handling` set.
///
/// [`flush_state_moves`]: crate::systems::netstate::flush_state_moves
#[derive(Resource, Debug, Default)]
pub struct NetStateQueue {
    pub(crate) applying: bool,
    pub(crate) moves: Vec<MoveEvent>,
}

impl NetStateQueue {
    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}
