//! Per-entity spatial record.
//!
//! The [`TransformNode`] component stores a position and rotation relative to a
//! parent entity, the ordered set of children, and cached local matrices. World
//! space values are never stored; they are composed on demand by the walkers in
//! [`crate::systems::transform`].
//!
//! Fields are crate-private. All writes go through the functions in
//! [`crate::systems`] so that parent/child symmetry, derived map/grid ids and
//! change notifications stay consistent.

use std::collections::BTreeSet;

use bevy_ecs::prelude::{Component, Entity};
use glam::{Mat3, Vec2};

use crate::maths::{Angle, create_inverse_transform, create_transform};
use crate::resources::debugregistry::ComponentDebug;
use crate::resources::mapmanager::MapId;

/// Where a node is in its life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformLifeStage {
    #[default]
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Removed,
}

/// A position expressed in the frame of `parent`.
///
/// `parent == None` means null-space coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityCoordinates {
    pub parent: Option<Entity>,
    pub position: Vec2,
}

impl EntityCoordinates {
    pub fn new(parent: Option<Entity>, position: Vec2) -> Self {
        Self { parent, position }
    }

    /// Same parent and positions within epsilon.
    pub fn equals_approx(&self, other: &EntityCoordinates) -> bool {
        self.parent == other.parent && crate::maths::vec_approx_eq(self.position, other.position)
    }
}

/// Values captured by the first write of a deferred window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StagedChange {
    pub old_coords: Option<EntityCoordinates>,
    pub old_rotation: Option<Angle>,
}

/// Position, rotation and place in the hierarchy of one entity.
///
/// # Fields
/// - `parent` - Entity whose frame `local_position` is expressed in; `None` for roots
/// - `local_position` / `local_rotation` - Placement relative to the parent
/// - `no_local_rotation` - When set, rotation writes are ignored and the rotation stays zero
/// - `anchored` - Locked to a grid tile; position writes are ignored
/// - `children` - Entities whose parent is this node, kept sorted
/// - `map_id` / `grid_id` - Cached membership, equal to what a fresh walk would compute
/// - `lerp_source` / `lerp_target` / `lerp_parent` - Render-side interpolation pair
/// - `deferred` - Staged old values while a deferred window is open
///
/// # Example
/// ```ignore
/// let node = TransformNode::new(Some(grid))
///     .with_position(Vec2::new(2.5, 0.5))
///     .with_rotation(Angle::from_degrees(90.0));
/// let entity = spawn_entity_with(&mut world, node, ())?;
/// ```
#[derive(Component, Clone, Debug)]
pub struct TransformNode {
    pub(crate) parent: Option<Entity>,
    pub(crate) local_position: Vec2,
    pub(crate) local_rotation: Angle,
    pub(crate) no_local_rotation: bool,
    pub(crate) anchored: bool,
    local_matrix: Mat3,
    inv_local_matrix: Mat3,
    matrices_dirty: bool,
    pub(crate) children: BTreeSet<Entity>,
    pub(crate) map_id: MapId,
    pub(crate) grid_id: Option<Entity>,
    pub(crate) lerp_source: (Vec2, Angle),
    pub(crate) lerp_target: Option<(Vec2, Angle)>,
    pub(crate) lerp_parent: Option<Entity>,
    pub(crate) deferred: Option<StagedChange>,
    pub(crate) life_stage: TransformLifeStage,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TransformNode {
    /// A node at the origin of `parent`, not yet initialized.
    pub fn new(parent: Option<Entity>) -> Self {
        Self {
            parent,
            local_position: Vec2::ZERO,
            local_rotation: Angle::ZERO,
            no_local_rotation: false,
            anchored: false,
            local_matrix: Mat3::IDENTITY,
            inv_local_matrix: Mat3::IDENTITY,
            matrices_dirty: false,
            children: BTreeSet::new(),
            map_id: MapId::NULLSPACE,
            grid_id: None,
            lerp_source: (Vec2::ZERO, Angle::ZERO),
            lerp_target: None,
            lerp_parent: None,
            deferred: None,
            life_stage: TransformLifeStage::Uninitialized,
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.local_position = position;
        self.rebuild();
        self
    }

    pub fn with_rotation(mut self, rotation: Angle) -> Self {
        if !self.no_local_rotation {
            self.local_rotation = rotation;
            self.rebuild();
        }
        self
    }

    /// Request anchoring at initialization.
    pub fn anchored(mut self) -> Self {
        self.anchored = true;
        self
    }

    pub fn no_local_rotation(mut self) -> Self {
        self.no_local_rotation = true;
        self.local_rotation = Angle::ZERO;
        self.rebuild();
        self
    }

    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    pub fn local_position(&self) -> Vec2 {
        self.local_position
    }

    pub fn local_rotation(&self) -> Angle {
        self.local_rotation
    }

    pub fn is_no_local_rotation(&self) -> bool {
        self.no_local_rotation
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    pub fn children(&self) -> impl Iterator<Item = Entity> + '_ {
        self.children.iter().copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_child(&self, child: Entity) -> bool {
        self.children.contains(&child)
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn grid_id(&self) -> Option<Entity> {
        self.grid_id
    }

    pub fn lerp_source(&self) -> (Vec2, Angle) {
        self.lerp_source
    }

    pub fn lerp_target(&self) -> Option<(Vec2, Angle)> {
        self.lerp_target
    }

    pub fn lerp_parent(&self) -> Option<Entity> {
        self.lerp_parent
    }

    pub fn life_stage(&self) -> TransformLifeStage {
        self.life_stage
    }

    pub fn is_running(&self) -> bool {
        self.life_stage == TransformLifeStage::Running
    }

    /// Whether a deferred window has staged values on this node.
    pub fn has_staged_change(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn coordinates(&self) -> EntityCoordinates {
        EntityCoordinates::new(self.parent, self.local_position)
    }

    /// Roots are never displaced, only rotated.
    fn effective_position(&self) -> Vec2 {
        if self.parent.is_some() {
            self.local_position
        } else {
            Vec2::ZERO
        }
    }

    /// Recompute the cached local matrix and its inverse.
    pub fn rebuild(&mut self) {
        let position = self.effective_position();
        self.local_matrix = create_transform(position, self.local_rotation);
        self.inv_local_matrix = create_inverse_transform(position, self.local_rotation);
        self.matrices_dirty = false;
    }

    pub(crate) fn invalidate(&mut self) {
        self.matrices_dirty = true;
    }

    pub fn matrices_dirty(&self) -> bool {
        self.matrices_dirty
    }

    /// Local-to-parent matrix. A stale cache is bypassed, not returned.
    pub fn local_matrix(&self) -> Mat3 {
        if self.matrices_dirty {
            create_transform(self.effective_position(), self.local_rotation)
        } else {
            self.local_matrix
        }
    }

    pub fn inv_local_matrix(&self) -> Mat3 {
        if self.matrices_dirty {
            create_inverse_transform(self.effective_position(), self.local_rotation)
        } else {
            self.inv_local_matrix
        }
    }
}

impl ComponentDebug for TransformNode {
    fn debug_string(&self) -> String {
        format!(
            "pos {:?} rot {:.4} parent {:?} map {} grid {:?}{}",
            self.local_position,
            self.local_rotation.theta(),
            self.parent,
            self.map_id.0,
            self.grid_id,
            if self.anchored { " anchored" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rebuilds_matrices() {
        let node = TransformNode::new(None).with_position(Vec2::new(4.0, 2.0));
        // Roots ignore their local position in the matrix.
        assert!(node.local_matrix().abs_diff_eq(Mat3::IDENTITY, 1e-6));
        assert!(!node.matrices_dirty());
    }

    #[test]
    fn dirty_node_recomputes_on_read() {
        let parent = bevy_ecs::world::World::new().spawn_empty().id();
        let mut node = TransformNode::new(Some(parent));
        node.local_position = Vec2::new(3.0, 0.0);
        node.invalidate();
        let m = node.local_matrix();
        assert!(m.transform_point2(Vec2::ZERO).abs_diff_eq(Vec2::new(3.0, 0.0), 1e-6));
        assert!((m * node.inv_local_matrix()).abs_diff_eq(Mat3::IDENTITY, 1e-5));
    }

    #[test]
    fn no_local_rotation_ignores_builder_rotation() {
        let node = TransformNode::new(None)
            .no_local_rotation()
            .with_rotation(Angle(1.0));
        assert_eq!(node.local_rotation(), Angle::ZERO);
    }
}
