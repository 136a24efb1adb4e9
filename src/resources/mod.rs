//! ECS resources made available to systems.
//!
//! Overview
//! - `debugregistry` – capability probes for per-component debug strings
//! - `deferredmoves` – depth and staged nodes of the open deferred window
//! - `mapmanager` – map ids, map owners and grids per map
//! - `netentitymap` – network id to local entity lookup
//! - `netstatequeue` – moves held back while a snapshot is applied
//! - `pendingdeletions` – entities queued for deletion after a violation
//! - `renderbridge` – channels and join handle of the render thread
//! - `spatialconfig` – INI-backed settings and the violation policy
//! - `worldtime` – simulation tick counter and delta
pub mod debugregistry;
pub mod deferredmoves;
pub mod mapmanager;
pub mod netentitymap;
pub mod netstatequeue;
pub mod pendingdeletions;
pub mod renderbridge;
pub mod spatialconfig;
pub mod worldtime;
