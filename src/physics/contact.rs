//! Contact data handed to the solver by the narrow phase.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Fixed-point scale for the packed friction and restitution coefficients.
const COEFFICIENT_SCALE: f32 = 0xFFFF as f32;

/// A single contact point between two bodies.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CollisionContact {
    /// Contact point in world space.
    pub point: Vec3,
    /// Penetration depth. Positive when the shapes overlap.
    pub penetration_depth: f32,
    /// Unit contact normal pointing from body A to body B.
    pub normal: Vec3,
    /// Friction in the high 16 bits, restitution in the low 16 bits, both fixed-point in `[0, 1]`.
    pub friction_restitution: u32,
}

impl CollisionContact {
    pub fn new(point: Vec3, normal: Vec3, penetration_depth: f32, friction: f32, restitution: f32) -> Self {
        Self {
            point,
            penetration_depth,
            normal,
            friction_restitution: pack_friction_restitution(friction, restitution),
        }
    }

    /// Coulomb friction coefficient.
    #[inline]
    pub fn friction(&self) -> f32 {
        (self.friction_restitution >> 16) as f32 / COEFFICIENT_SCALE
    }

    /// Coefficient of restitution.
    #[inline]
    pub fn restitution(&self) -> f32 {
        (self.friction_restitution & 0xFFFF) as f32 / COEFFICIENT_SCALE
    }
}

/// Pack two coefficients in `[0, 1]` into one word. Values outside the range are clamped.
pub fn pack_friction_restitution(friction: f32, restitution: f32) -> u32 {
    let quantize = |x: f32| (x.clamp(0.0, 1.0) * COEFFICIENT_SCALE).round() as u32;
    (quantize(friction) << 16) | quantize(restitution)
}

/// Contacts between two scene entities, as produced by the narrow phase.
#[cfg(feature = "ecs")]
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub entity_a: hecs::Entity,
    pub entity_b: hecs::Entity,
    pub contacts: Vec<CollisionContact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_coefficients() {
        let c = CollisionContact::new(Vec3::ZERO, Vec3::Y, 0.0, 0.5, 0.25);
        assert!((c.friction() - 0.5).abs() < 1e-4);
        assert!((c.restitution() - 0.25).abs() < 1e-4);

        let c = CollisionContact::new(Vec3::ZERO, Vec3::Y, 0.0, 1.0, 0.0);
        assert_eq!(c.friction_restitution, 0xFFFF_0000);
        assert_eq!(c.friction(), 1.0);
        assert_eq!(c.restitution(), 0.0);
    }

    #[test]
    fn test_coefficients_clamped() {
        let c = CollisionContact::new(Vec3::ZERO, Vec3::Y, 0.0, 3.0, -1.0);
        assert_eq!(c.friction(), 1.0);
        assert_eq!(c.restitution(), 0.0);
    }
}
