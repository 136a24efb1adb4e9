//! Spatial systems and operations.
//!
//! Most operations here take `&mut World` and run synchronously on the
//! simulation thread; the few per-tick systems are wired up in
//! [`crate::simulation`].
//!
//! Submodules overview
//! - [`anchoring`] – lock entities to grid tiles and release them
//! - [`deferred`] – scoped batching of transform writes
//! - [`hierarchy`] – reparenting, detaching and map/grid membership
//! - [`lerp`] – interpolation sampling and the render thread
//! - [`lifecycle`] – spawn, initialize, shut down and delete spatial entities
//! - [`messages`] – advance message queues once per tick
//! - [`netstate`] – capture and apply network snapshots
//! - [`snapgrid`] – snap-grid registration and adjacency queries
//! - [`transform`] – local writes and world-space reads

pub mod anchoring;
pub mod deferred;
pub mod hierarchy;
pub mod lerp;
pub mod lifecycle;
pub mod messages;
pub mod netstate;
pub mod snapgrid;
pub mod transform;
