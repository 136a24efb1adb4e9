//! 2D math primitives shared by the transform hierarchy.
//!
//! Vectors and matrices come from [`glam`]. This module adds the pieces glam
//! does not model directly:
//! - [`Angle`] – a rotation in radians with tolerant comparison
//! - [`Direction`] – the eight compass directions used by snap-grid queries
//! - [`Box2`] – an axis-aligned box used as a physics hint on move events
//! - [`create_transform`] / [`create_inverse_transform`] – affine matrices for a
//!   position/rotation pair, the inverse computed analytically
//!
//! Matrices use glam's column-vector convention: a local matrix maps a point in
//! the node's frame into its parent's frame, and a world matrix is the product
//! `root · … · parent · local`.

use std::f32::consts::{FRAC_PI_4, PI, TAU};
use std::ops::{Add, AddAssign, Neg, Sub};

use glam::{IVec2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Tolerance used by every approximate comparison of positions and angles.
pub const EPSILON: f32 = 1e-5;

/// Returns true when both components differ by less than [`EPSILON`].
pub fn vec_approx_eq(a: Vec2, b: Vec2) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

/// A rotation angle in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle(pub f32);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn from_degrees(degrees: f32) -> Self {
        Angle(degrees.to_radians())
    }

    pub fn theta(self) -> f32 {
        self.0
    }

    pub fn degrees(self) -> f32 {
        self.0.to_degrees()
    }

    /// The same rotation expressed in `(-PI, PI]`.
    pub fn reduced(self) -> Self {
        let mut theta = self.0 % TAU;
        if theta > PI {
            theta -= TAU;
        } else if theta <= -PI {
            theta += TAU;
        }
        Angle(theta)
    }

    /// Compares two rotations modulo a full turn.
    pub fn equals_approx(self, other: Angle) -> bool {
        (self - other).reduced().0.abs() < EPSILON
    }

    /// Rotates `v` counter-clockwise by this angle.
    pub fn rotate_vec(self, v: Vec2) -> Vec2 {
        let (sin, cos) = self.0.sin_cos();
        Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
    }

    /// Interpolates along the shortest arc from `self` to `to`.
    pub fn lerp(self, to: Angle, t: f32) -> Angle {
        let delta = (to - self).reduced();
        Angle(self.0 + delta.0 * t)
    }

    /// The compass direction closest to this angle (0 rad points east).
    pub fn to_direction(self) -> Direction {
        let reduced = self.reduced().0;
        let sector = ((reduced + TAU) % TAU / FRAC_PI_4).round() as i32 % 8;
        Direction::COUNTER_CLOCKWISE[sector as usize]
    }
}

impl Add for Angle {
    type Output = Angle;
    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Angle) {
        self.0 += rhs.0;
    }
}

impl Sub for Angle {
    type Output = Angle;
    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl Neg for Angle {
    type Output = Angle;
    fn neg(self) -> Angle {
        Angle(-self.0)
    }
}

/// The eight compass directions on a tile grid (north is +Y).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    South,
    SouthEast,
    East,
    NorthEast,
    North,
    NorthWest,
    West,
    SouthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::South,
        Direction::SouthEast,
        Direction::East,
        Direction::NorthEast,
        Direction::North,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
    ];

    // Starting at east, in the order angles grow.
    const COUNTER_CLOCKWISE: [Direction; 8] = [
        Direction::East,
        Direction::NorthEast,
        Direction::North,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::South,
        Direction::SouthEast,
    ];

    /// Tile offset of the neighbouring cell in this direction.
    pub fn offset(self) -> IVec2 {
        match self {
            Direction::South => IVec2::new(0, -1),
            Direction::SouthEast => IVec2::new(1, -1),
            Direction::East => IVec2::new(1, 0),
            Direction::NorthEast => IVec2::new(1, 1),
            Direction::North => IVec2::new(0, 1),
            Direction::NorthWest => IVec2::new(-1, 1),
            Direction::West => IVec2::new(-1, 0),
            Direction::SouthWest => IVec2::new(-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::South => Direction::North,
            Direction::SouthEast => Direction::NorthWest,
            Direction::East => Direction::West,
            Direction::NorthEast => Direction::SouthWest,
            Direction::North => Direction::South,
            Direction::NorthWest => Direction::SouthEast,
            Direction::West => Direction::East,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    pub fn to_angle(self) -> Angle {
        let index = Direction::COUNTER_CLOCKWISE
            .iter()
            .position(|d| *d == self)
            .unwrap_or(0);
        Angle(index as f32 * FRAC_PI_4)
    }
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Box2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Box2 {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn centered(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Local-to-parent matrix for a translation followed by a rotation: `T(p) · R(θ)`.
pub fn create_transform(position: Vec2, rotation: Angle) -> Mat3 {
    let (sin, cos) = rotation.0.sin_cos();
    Mat3::from_cols(
        Vec3::new(cos, sin, 0.0),
        Vec3::new(-sin, cos, 0.0),
        Vec3::new(position.x, position.y, 1.0),
    )
}

/// Exact inverse of [`create_transform`]: `R(θ)ᵀ · T(-p)`.
pub fn create_inverse_transform(position: Vec2, rotation: Angle) -> Mat3 {
    let (sin, cos) = rotation.0.sin_cos();
    let tx = -(cos * position.x + sin * position.y);
    let ty = -(-sin * position.x + cos * position.y);
    Mat3::from_cols(
        Vec3::new(cos, -sin, 0.0),
        Vec3::new(sin, cos, 0.0),
        Vec3::new(tx, ty, 1.0),
    )
}

/// Translation part of an affine matrix.
pub fn translation_of(matrix: &Mat3) -> Vec2 {
    matrix.z_axis.truncate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_transform_undoes_transform() {
        let pos = Vec2::new(3.5, -2.0);
        let rot = Angle::from_degrees(37.0);
        let product = create_transform(pos, rot) * create_inverse_transform(pos, rot);
        assert!(product.abs_diff_eq(Mat3::IDENTITY, 1e-5));
    }

    #[test]
    fn transform_rotates_then_translates() {
        let m = create_transform(Vec2::new(10.0, 0.0), Angle::from_degrees(90.0));
        let p = m.transform_point2(Vec2::new(1.0, 0.0));
        assert!(vec_approx_eq(p, Vec2::new(10.0, 1.0)));
    }

    #[test]
    fn angle_equality_wraps_full_turns() {
        assert!(Angle(0.0).equals_approx(Angle(TAU)));
        assert!(Angle(PI).equals_approx(Angle(-PI)));
        assert!(!Angle(0.0).equals_approx(Angle(0.1)));
    }

    #[test]
    fn angle_lerp_takes_shortest_arc() {
        let from = Angle::from_degrees(170.0);
        let to = Angle::from_degrees(-170.0);
        let mid = from.lerp(to, 0.5);
        assert!(mid.equals_approx(Angle::from_degrees(180.0)));
    }

    #[test]
    fn direction_round_trips_through_angle() {
        for dir in Direction::ALL {
            assert_eq!(dir.to_angle().to_direction(), dir);
            assert_eq!(dir.offset(), -dir.opposite().offset());
        }
    }

    #[test]
    fn box_contains_its_corners() {
        let b = Box2::centered(Vec2::ZERO, Vec2::splat(1.0));
        assert!(b.contains(Vec2::new(1.0, -1.0)));
        assert!(!b.contains(Vec2::new(1.5, 0.0)));
    }
}
