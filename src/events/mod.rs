//! Notifications published by the spatial core.
//!
//! Every mutation that changes what other subsystems observe writes a typed
//! message into that type's `Messages<T>` queue. Listener systems read them
//! with a `MessageReader` after the mutation phase, and `Messages::update()`
//! runs once per tick in [`crate::systems::messages`].
//!
//! Submodules:
//! - [`render`] – lerp frames sent to the render thread and its reports
//! - [`snapgrid`] – snap-grid cell changes
//! - [`transform`] – moves, rotations, reparenting, anchoring and map changes
pub mod render;
pub mod snapgrid;
pub mod transform;

use bevy_ecs::message::{Message, Messages};
use bevy_ecs::world::World;
use log::warn;

/// Write `message` into its queue.
///
/// Worlds that never registered the queue drop the message with a warning
/// instead of failing the mutation that produced it.
pub fn raise<M: Message>(world: &mut World, message: M) {
    match world.get_resource_mut::<Messages<M>>() {
        Some(mut queue) => {
            queue.write(message);
        }
        None => warn!(
            "no message queue for {}; notification dropped",
            std::any::type_name::<M>()
        ),
    }
}
