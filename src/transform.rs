//! Rigid transform of a body origin.

use glam::{Mat4, Quat, Vec3};

/// Position and orientation of an entity in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Map a body-space point to world space.
    #[inline]
    pub fn transform_position(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Map a world-space point into body space.
    #[inline]
    pub fn inverse_transform_position(&self, global: Vec3) -> Vec3 {
        self.rotation.conjugate() * (global - self.position)
    }

    /// Map a world-space direction into body space.
    #[inline]
    pub fn inverse_transform_direction(&self, global: Vec3) -> Vec3 {
        self.rotation.conjugate() * global
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_roundtrip_point() {
        let t = Transform::from_position_rotation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.6),
        );
        let p = Vec3::new(-4.0, 0.5, 2.0);
        assert_relative_eq!(t.transform_position(t.inverse_transform_position(p)), p, epsilon = 1e-5);
        assert_relative_eq!(
            t.to_matrix().transform_point3(Vec3::X),
            t.transform_position(Vec3::X),
            epsilon = 1e-5
        );
    }
}
