//! Per-step rigid body table shared by every constraint solver.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Quat, Vec3};

/// Index of a body in the per-step body table.
pub type BodyIndex = u16;

/// Solver-facing state of one rigid body for the current step.
///
/// Pose, mass properties and the center of gravity are read-only while
/// solving. Only the two velocities are mutated, by every constraint that
/// references the body.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable)]
pub struct RigidBodyState {
    pub rotation: Quat,
    /// Offset from the body origin to its center of gravity, in body space.
    pub local_cog_position: Vec3,
    /// World position of the center of gravity.
    pub position: Vec3,
    /// World-space inverse inertia tensor.
    pub inv_inertia: Mat3,
    pub inv_mass: f32,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl RigidBodyState {
    /// The immovable sentinel body. Every impulse applied to it is multiplied by zero.
    pub const DUMMY: Self = Self {
        rotation: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        local_cog_position: Vec3::ZERO,
        position: Vec3::ZERO,
        inv_inertia: Mat3::ZERO,
        inv_mass: 0.0,
        linear_velocity: Vec3::ZERO,
        angular_velocity: Vec3::ZERO,
    };

    /// A free body with diagonal local inertia `inertia`, oriented by `rotation`.
    pub fn new(position: Vec3, rotation: Quat, mass: f32, inertia: Vec3) -> Self {
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        let inv_local = Mat3::from_diagonal(Vec3::new(
            crate::math::inverse_or_zero(inertia.x),
            crate::math::inverse_or_zero(inertia.y),
            crate::math::inverse_or_zero(inertia.z),
        ));
        let r = Mat3::from_quat(rotation);
        Self {
            rotation,
            local_cog_position: Vec3::ZERO,
            position,
            inv_inertia: r * inv_local * r.transpose(),
            inv_mass,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }

    /// An infinite-mass body at a fixed pose. Joint anchors on it still resolve through its rotation.
    pub fn immovable(position: Vec3, rotation: Quat) -> Self {
        Self {
            rotation,
            position,
            ..Self::DUMMY
        }
    }

    /// Velocity of the world point `position + r`.
    #[inline]
    pub fn point_velocity(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// True when no impulse can move this body.
    #[inline]
    pub fn is_immovable(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia == Mat3::ZERO
    }
}

/// The two body-table indices coupled by one constraint instance. Either may be the dummy.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ConstraintBodyPair {
    pub a: BodyIndex,
    pub b: BodyIndex,
}

impl ConstraintBodyPair {
    pub const fn new(a: BodyIndex, b: BodyIndex) -> Self {
        Self { a, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_is_all_zero() {
        let zeroed = RigidBodyState::zeroed();
        assert_eq!(
            bytemuck::bytes_of(&ConstraintBodyPair::new(0, 0)),
            &[0u8; 4]
        );
        assert_eq!(RigidBodyState::DUMMY, zeroed);
        assert!(RigidBodyState::DUMMY.is_immovable());
    }

    #[test]
    fn test_world_inertia_rotates() {
        let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let body = RigidBodyState::new(Vec3::ZERO, rotation, 2.0, Vec3::new(1.0, 4.0, 4.0));
        assert_eq!(body.inv_mass, 0.5);
        // Local X maps to world Y.
        assert!((body.inv_inertia.y_axis.y - 1.0).abs() < 1e-5);
        assert!((body.inv_inertia.x_axis.x - 0.25).abs() < 1e-5);
    }
}
