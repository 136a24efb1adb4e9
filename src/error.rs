//! Error type for transform and hierarchy operations.
//!
//! Failures fall into three families:
//! - soft inconsistencies (a grid, map or node is gone, usually a teardown race):
//!   logged as warnings and the single operation is aborted
//! - invariant violations (self-parenting, cycles, unknown parents): handled by
//!   [`report_violation`] according to [`SpatialConfig::strict_invariants`]
//! - protocol errors (a snapshot that would parent a networked entity to a
//!   client-local one): handled by the network reconciler
//!
//! No error is ever written to the message queues; subscribers only see
//! well-formed events.

use bevy_ecs::prelude::*;
use log::error;
use thiserror::Error;

use crate::resources::mapmanager::MapId;
use crate::resources::pendingdeletions::PendingDeletions;
use crate::resources::spatialconfig::SpatialConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("entity {0:?} has no transform node")]
    MissingTransform(Entity),
    #[error("grid {grid:?} referenced by {entity:?} no longer exists")]
    MissingGrid { entity: Entity, grid: Entity },
    #[error("map {0:?} has no map entity")]
    MissingMap(MapId),
    #[error("no grid tile under {0:?}")]
    NoTileUnderEntity(Entity),

    #[error("entity {0:?} cannot be its own parent")]
    SelfParent(Entity),
    #[error("parenting {entity:?} to {parent:?} would create a cycle")]
    CyclicParent { entity: Entity, parent: Entity },
    #[error("parent {parent:?} of {entity:?} has no transform node")]
    UnknownParent { entity: Entity, parent: Entity },
    #[error("parent {parent:?} of {entity:?} is shutting down")]
    TerminatingParent { entity: Entity, parent: Entity },
    #[error("snapshot for {entity:?} names unknown net entity {net_id}")]
    UnknownNetEntity { entity: Entity, net_id: u32 },

    #[error("{entity:?} would be parented to client-local entity {parent:?}")]
    ClientLocalParent { entity: Entity, parent: Entity },
}

impl TransformError {
    /// True for errors that break a structural invariant of the tree.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            TransformError::SelfParent(_)
                | TransformError::CyclicParent { .. }
                | TransformError::UnknownParent { .. }
                | TransformError::TerminatingParent { .. }
                | TransformError::UnknownNetEntity { .. }
        )
    }

    pub fn is_protocol_error(&self) -> bool {
        matches!(self, TransformError::ClientLocalParent { .. })
    }
}

/// Whether invariant violations should panic in this world.
pub fn strict_invariants(world: &World) -> bool {
    world
        .get_resource::<SpatialConfig>()
        .map(|config| config.strict_invariants)
        .unwrap_or(cfg!(debug_assertions))
}

/// Apply the violation policy to `err` raised while mutating `entity`.
///
/// Strict worlds panic. Tolerant worlds log the violation, queue `entity`
/// for deletion and hand the error back to the caller.
pub fn report_violation(world: &mut World, entity: Entity, err: TransformError) -> TransformError {
    if strict_invariants(world) {
        panic!("transform invariant violated: {err}");
    }
    error!("{err}; queueing {entity:?} for deletion");
    world
        .get_resource_or_insert_with(PendingDeletions::default)
        .queue(entity);
    err
}
