//! Spatial-hierarchy core of an entity-component game runtime.
//!
//! This library tracks every placed entity's position and rotation relative to
//! a parent, composes them into world space, keeps map/grid membership and the
//! snap-grid occupancy index current, and reconciles networked snapshots.
//! Change notifications are bevy_ecs messages read by other subsystems.

pub mod components;
pub mod error;
pub mod events;
pub mod maths;
pub mod resources;
pub mod simulation;
pub mod systems;
