//! ECS components for spatially placed entities.
//!
//! Submodules overview:
//! - [`mapcomponent`] – marks the entity that owns a map
//! - [`mapgrid`] – tile grid ownership and the grid's snap-grid index
//! - [`netentity`] – network identity of replicated entities
//! - [`snapgrid`] – per-entity snap-grid tracker and the per-grid cell index
//! - [`transformnode`] – local placement, parent/children and cached matrices
//! - [`transformstate`] – serializable wire snapshot of a transform

pub mod mapcomponent;
pub mod mapgrid;
pub mod netentity;
pub mod snapgrid;
pub mod transformnode;
pub mod transformstate;
